pub mod inbound;
pub mod sendgrid;
pub mod threading;

pub use inbound::{extract_email_address, InboundEmail, VerifiedEmail};
pub use sendgrid::{EmailSender, OutboundEmail, SendGridClient, SendReceipt};
pub use threading::{generate_threading_id, normalize_subject, reply_subject, subject_matches};
