pub mod error;
pub mod types;

pub use error::{ErrorKind, HelpdeskError, Result, ResultExt};
