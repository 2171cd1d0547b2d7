mod common;

use agent::{EmailProcessingPayload, RetryPolicy, TaskRunner};
use common::{harness, FakeSender, SendFailure, REPLY};
use helpdesk_core::error::HelpdeskError;
use helpdesk_core::types::{DocumentMetadata, MessageStatus, SenderType, TicketStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn jane(subject: &str, text: &str, message_id: &str) -> EmailProcessingPayload {
    EmailProcessingPayload {
        from: "<jane@x.com>".into(),
        to: "help@x.com".into(),
        subject: subject.into(),
        text: text.into(),
        message_id: Some(message_id.into()),
        ..Default::default()
    }
}

fn fast_runner(h: &common::Harness) -> TaskRunner {
    TaskRunner::new(
        h.pipeline.clone(),
        RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(5),
            ..Default::default()
        },
        Duration::from_secs(30),
    )
}

#[tokio::test]
async fn inbound_email_becomes_ticket_and_sent_reply() {
    let h = harness(FakeSender::reliable()).await;
    h.knowledge
        .add_document(
            "kb-1",
            "Password reset",
            "To reset your password use the forgot password link on the login page.",
            DocumentMetadata::default(),
        )
        .await
        .unwrap();

    let result = h
        .pipeline
        .process(&jane("Cannot log in", "I forgot my password", "inbound_1_a"))
        .await
        .unwrap();

    let customer = h.db.find_customer_by_email("jane@x.com").await.unwrap().unwrap();
    assert_eq!(customer.name, "Jane");
    assert_eq!(result.customer_id, customer.id);

    let ticket = h.db.get_ticket(&result.ticket_id).await.unwrap();
    assert_eq!(ticket.subject, "Cannot log in");
    assert_eq!(ticket.status, TicketStatus::InProgress);
    assert!(ticket.last_response_at.is_some());

    let messages = h.db.list_ticket_messages(&ticket.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender_type, SenderType::Customer);
    assert_eq!(messages[0].content, "I forgot my password");
    assert_eq!(messages[1].sender_type, SenderType::System);
    assert_eq!(messages[1].status, MessageStatus::Sent);
    assert!(messages[1].metadata.generated_by_ai);
    assert_eq!(messages[1].metadata.search_results_used, Some(1));
    assert_eq!(messages[1].metadata.provider_message_id.as_deref(), Some("sg-0"));

    assert!(result.email_sent);
    assert_eq!(result.search_result_count, 1);
    assert!(result.ai_response.used_knowledge_base);
    assert_eq!(result.ai_response.confidence, 0.9);

    let sent = h.sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "jane@x.com");
    assert_eq!(sent[0].subject, "Re: Cannot log in");
    assert_eq!(sent[0].in_reply_to.as_deref(), Some("inbound_1_a"));
    assert!(sent[0].html.as_deref().unwrap().contains("&quot;Esqueci minha senha&quot;"));
    assert!(sent[0].text.as_deref().unwrap().contains(REPLY));

    let prompt = h.ai.prompts.lock().unwrap().last().cloned().unwrap();
    assert!(prompt.contains("Password reset"));
    assert!(prompt.contains("Cliente: Jane"));
}

#[tokio::test]
async fn follow_up_reuses_ticket_and_sees_history() {
    let h = harness(FakeSender::reliable()).await;

    let first = h
        .pipeline
        .process(&jane("Help with login", "It says wrong password", "inbound_1"))
        .await
        .unwrap();
    let second = h
        .pipeline
        .process(&jane("Re: Help with login", "Still broken", "inbound_2"))
        .await
        .unwrap();

    assert_eq!(first.ticket_id, second.ticket_id);
    assert_eq!(h.db.count_tickets().await.unwrap(), 1);
    assert_eq!(h.db.list_ticket_messages(&first.ticket_id).await.unwrap().len(), 4);

    let prompt = h.ai.prompts.lock().unwrap().last().cloned().unwrap();
    assert!(prompt.contains("HISTÓRICO DA CONVERSA"));
    assert!(prompt.contains("It says wrong password"));
}

#[tokio::test]
async fn invalid_payload_fails_without_retry_and_is_logged() {
    let h = harness(FakeSender::reliable()).await;
    let runner = fast_runner(&h);

    let err = runner.run(jane("Hi", "   ", "inbound_1")).await.unwrap_err();
    assert!(matches!(err.root(), HelpdeskError::Validation(_)));
    assert_eq!(h.db.count_customers().await.unwrap(), 0);
    assert_eq!(h.sender.attempts.load(Ordering::SeqCst), 0);

    let logs = h.db.get_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].source, "EMAIL_PROCESSING");
    assert_eq!(logs[0].metadata.as_ref().unwrap()["payload"]["subject"], "Hi");
}

#[tokio::test]
async fn sender_without_address_is_rejected() {
    let h = harness(FakeSender::reliable()).await;
    let mut payload = jane("Hi", "hello", "inbound_1");
    payload.from = "Jane Doe".into();

    let err = h.pipeline.process(&payload).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(h.db.count_customers().await.unwrap(), 0);
}

#[tokio::test]
async fn transient_send_failure_reruns_the_pipeline() {
    let h = harness(FakeSender::failing(1, SendFailure::Transient)).await;
    let runner = fast_runner(&h);

    let result = runner
        .run(jane("Cannot log in", "I forgot my password", "inbound_1_a"))
        .await
        .unwrap();

    assert_eq!(h.sender.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(h.db.count_customers().await.unwrap(), 1);
    assert_eq!(h.db.count_tickets().await.unwrap(), 1);
    assert_eq!(h.db.get_logs(10).await.unwrap().len(), 1);

    let messages = h.db.list_ticket_messages(&result.ticket_id).await.unwrap();
    let from_customer = messages.iter().filter(|m| m.is_from_customer()).count();
    assert_eq!(from_customer, 1);
    // The draft from the failed attempt stays behind.
    let replies: Vec<_> = messages.iter().filter(|m| !m.is_from_customer()).collect();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies.iter().filter(|m| m.status == MessageStatus::Sent).count(), 1);
    assert_eq!(
        h.db.get_ticket(&result.ticket_id).await.unwrap().status,
        TicketStatus::InProgress
    );
}

#[tokio::test]
async fn missing_email_credentials_keep_the_draft_unsent() {
    let h = harness(FakeSender::failing(5, SendFailure::Unconfigured)).await;
    let runner = fast_runner(&h);

    let result = runner
        .run(jane("Cannot log in", "I forgot my password", "inbound_1_a"))
        .await
        .unwrap();
    assert!(!result.email_sent);
    assert_eq!(h.sender.attempts.load(Ordering::SeqCst), 1);
    assert!(h.db.get_logs(10).await.unwrap().is_empty());

    // Ticket stays open with an unsent draft.
    let ticket = h.db.get_ticket(&result.ticket_id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert!(ticket.last_response_at.is_none());
    let reply = h.db.get_message(&result.response_id).await.unwrap();
    assert_eq!(reply.status, MessageStatus::Draft);
    assert!(reply.metadata.provider_message_id.is_none());
}

#[tokio::test]
async fn dispatched_task_reports_its_outcome() {
    let h = harness(FakeSender::reliable()).await;
    let runner = fast_runner(&h);

    let handle = runner.dispatch(jane("Cannot log in", "I forgot my password", "inbound_1_a"));
    let result = handle.await.unwrap().unwrap();
    assert!(result.email_sent);
}
