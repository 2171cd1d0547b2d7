use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{Customer, Ticket};
use mail::{normalize_subject, subject_matches};
use std::sync::Arc;
use storage::SqliteStorage;
use tracing::info;

/// How many of a customer's most recently updated open tickets are considered
/// when matching an incoming subject.
const RECENT_TICKETS: i64 = 5;

/// `jane.doe-smith@x.com` -> `Jane Doe Smith`
pub fn customer_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .split(|c| c == '.' || c == '_' || c == '-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct ResolvedTicket {
    pub ticket: Ticket,
    pub created: bool,
}

/// Finds or creates the customer and ticket an inbound email belongs to.
pub struct TicketResolver {
    sqlite: Arc<SqliteStorage>,
}

impl TicketResolver {
    pub fn new(sqlite: Arc<SqliteStorage>) -> Self {
        Self { sqlite }
    }

    pub async fn resolve_customer(&self, email: &str) -> Result<Customer> {
        if let Some(customer) = self.sqlite.find_customer_by_email(email).await? {
            return Ok(customer);
        }

        let customer = Customer::new(email, customer_name_from_email(email));
        match self.sqlite.create_customer(&customer).await {
            Ok(()) => {
                info!(customer = %customer.email, "Created customer");
                Ok(customer)
            }
            // Another task created it between the lookup and the insert.
            Err(HelpdeskError::AlreadyExists { .. }) => self
                .sqlite
                .find_customer_by_email(email)
                .await?
                .ok_or_else(|| HelpdeskError::NotFound {
                    entity: "Customer",
                    id: email.to_string(),
                }),
            Err(e) => Err(e),
        }
    }

    /// First of the customer's recent non-closed tickets whose subject overlaps
    /// the incoming one.
    pub async fn find_matching_ticket(&self, customer_id: &str, subject: &str) -> Result<Option<Ticket>> {
        let recent = self
            .sqlite
            .recent_unclosed_tickets(customer_id, RECENT_TICKETS)
            .await?;
        Ok(recent.into_iter().find(|t| subject_matches(&t.subject, subject)))
    }

    /// Reuses a matching ticket (refreshing it, and reopening it if RESOLVED)
    /// or opens a new one under the normalized subject.
    pub async fn resolve_ticket(&self, customer: &Customer, subject: &str, description: &str) -> Result<ResolvedTicket> {
        if let Some(existing) = self.find_matching_ticket(&customer.id, subject).await? {
            let ticket = self.sqlite.touch_ticket(&existing.id).await?;
            return Ok(ResolvedTicket { ticket, created: false });
        }

        let ticket = Ticket::new(&customer.id, normalize_subject(subject), description);
        self.sqlite.create_ticket(&ticket).await?;
        info!(ticket_id = %ticket.id, customer = %customer.email, "Opened ticket");
        Ok(ResolvedTicket { ticket, created: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_core::types::TicketStatus;

    async fn resolver() -> (Arc<SqliteStorage>, TicketResolver) {
        let db = Arc::new(SqliteStorage::in_memory().await.unwrap());
        (db.clone(), TicketResolver::new(db))
    }

    #[test]
    fn names_are_title_cased_from_the_local_part() {
        assert_eq!(customer_name_from_email("jane@x.com"), "Jane");
        assert_eq!(customer_name_from_email("JANE.doe_smith-jr@x.com"), "Jane Doe Smith Jr");
        assert_eq!(customer_name_from_email("a..b@x.com"), "A B");
    }

    #[tokio::test]
    async fn customer_is_created_once() {
        let (db, resolver) = resolver().await;
        let first = resolver.resolve_customer("jane@x.com").await.unwrap();
        let second = resolver.resolve_customer("jane@x.com").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.name, "Jane");
        assert_eq!(db.count_customers().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replies_reuse_the_ticket() {
        let (_, resolver) = resolver().await;
        let jane = resolver.resolve_customer("jane@x.com").await.unwrap();

        let first = resolver.resolve_ticket(&jane, "Help with login", "a").await.unwrap();
        let reply = resolver.resolve_ticket(&jane, "Re: Help with login", "b").await.unwrap();
        assert!(first.created);
        assert!(!reply.created);
        assert_eq!(first.ticket.id, reply.ticket.id);
    }

    #[tokio::test]
    async fn same_subject_from_other_customer_opens_new_ticket() {
        let (_, resolver) = resolver().await;
        let jane = resolver.resolve_customer("jane@x.com").await.unwrap();
        let john = resolver.resolve_customer("john@x.com").await.unwrap();

        let a = resolver.resolve_ticket(&jane, "Help", "a").await.unwrap();
        let b = resolver.resolve_ticket(&john, "Help", "b").await.unwrap();
        assert_ne!(a.ticket.id, b.ticket.id);
    }

    #[tokio::test]
    async fn resolved_ticket_reopens_and_closed_ticket_is_skipped() {
        let (db, resolver) = resolver().await;
        let jane = resolver.resolve_customer("jane@x.com").await.unwrap();

        let first = resolver.resolve_ticket(&jane, "Refund", "a").await.unwrap().ticket;
        db.update_ticket_status(&first.id, TicketStatus::Resolved).await.unwrap();
        let reopened = resolver.resolve_ticket(&jane, "Re: Refund", "b").await.unwrap();
        assert_eq!(reopened.ticket.id, first.id);
        assert_eq!(reopened.ticket.status, TicketStatus::Open);

        db.update_ticket_status(&first.id, TicketStatus::Closed).await.unwrap();
        let fresh = resolver.resolve_ticket(&jane, "Refund", "c").await.unwrap();
        assert!(fresh.created);
        assert_ne!(fresh.ticket.id, first.id);
    }

    #[tokio::test]
    async fn new_ticket_uses_normalized_subject() {
        let (_, resolver) = resolver().await;
        let jane = resolver.resolve_customer("jane@x.com").await.unwrap();
        let resolved = resolver.resolve_ticket(&jane, "Fwd: Invoice 42", "a").await.unwrap();
        assert_eq!(resolved.ticket.subject, "Invoice 42");
    }
}
