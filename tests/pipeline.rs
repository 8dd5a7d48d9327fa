//! End-to-end pipeline tests against mocked provider APIs

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use commdispatch::config::GatewayConfig;
use commdispatch::models::{
    Customer, Quote, QuoteStatus, Receivable, ReceivableStatus,
};
use commdispatch::{
    Channel, CommsConfig, CommsPlugin, CommunicationSettings, DeliveryStatus, EmailAddress, MemoryStore,
    MessageContent, Priority, QueueStatus, ReminderRunOptions, RetryPolicy, SendRequest, Stores, TenantDomain,
};

fn config(server: &MockServer) -> CommsConfig {
    let mut config = CommsConfig::default();
    config.email.api_base = server.uri();
    config.email.api_key = Some("re_test".to_string());
    config.email.default_from = Some(EmailAddress::with_name("noreply@vibenet.shop", "Vibenet"));
    config.whatsapp = GatewayConfig {
        endpoint: Some(format!("{}/{{sender}}/messages", server.uri())),
        token: Some("wa_test".to_string()),
        sender: Some("10001".to_string()),
    };
    config
}

async fn plugin_with(config: CommsConfig) -> (CommsPlugin, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let plugin = CommsPlugin::from_config(config, Stores::memory(store.clone())).unwrap();
    plugin.initialize().await.unwrap();
    (plugin, store)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[tokio::test]
async fn disabled_whatsapp_is_refused_without_provider_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (plugin, store) = plugin_with(config(&server)).await;
    store
        .put_settings(
            CommunicationSettings::defaults("t1")
                .with_channel(Channel::Email, true)
                .with_channel(Channel::Whatsapp, false),
        )
        .await;

    let request = SendRequest::builder()
        .tenant("t1")
        .channel(Channel::Whatsapp)
        .to("+15551234567")
        .text("hi")
        .build()
        .unwrap();
    let outcome = plugin.send(request).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("whatsapp communication is disabled in business settings")
    );
    assert!(store.queue_entries().await.is_empty());
    assert!(store.log_rows().await.is_empty());
}

#[tokio::test]
async fn enabled_whatsapp_is_delivered_through_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/10001/messages"))
        .and(header("authorization", "Bearer wa_test"))
        .and(body_partial_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": "+15551234567",
            "text": { "body": "Your order shipped" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [{ "id": "wamid.abc" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (plugin, store) = plugin_with(config(&server)).await;
    store
        .put_settings(CommunicationSettings::defaults("t1").with_channel(Channel::Whatsapp, true))
        .await;

    let request = SendRequest::builder()
        .tenant("t1")
        .channel(Channel::Whatsapp)
        .to("+1 (555) 123-4567")
        .text("Your order shipped")
        .build()
        .unwrap();
    let outcome = plugin.send(request).await;

    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.external_id.as_deref(), Some("wamid.abc"));

    let entry = &store.queue_entries().await[0];
    assert_eq!(entry.status, QueueStatus::Sent);
    assert_eq!(entry.provider.as_deref(), Some("whatsapp-cloud"));
}

#[tokio::test]
async fn resolves_tenant_urls_with_and_without_custom_domain() {
    let server = MockServer::start().await;
    let (plugin, store) = plugin_with(config(&server)).await;
    let resolver = plugin.comms().resolver();

    let content = MessageContent::plain("Hello {{user_name}}, visit {{login_url}}");
    let variables = [("user_name".to_string(), "Amy".to_string())].into_iter().collect();

    let resolved = resolver.resolve(content, &variables, "abc123").await;
    assert_eq!(
        resolved.content.text_body.as_deref(),
        Some("Hello Amy, visit https://tenant-abc123.vibenet.shop/auth")
    );

    store.add_domain(TenantDomain::custom("shop1", "shop.example.com", false)).await;
    let urls = resolver.tenant_urls("shop1").await;
    assert_eq!(urls.tenant_url, "https://tenant-shop1.vibenet.shop");

    store.add_domain(TenantDomain::custom("shop2", "https://shop2.example.com/", true)).await;
    let urls = resolver.tenant_urls("shop2").await;
    assert_eq!(urls.tenant_url, "https://shop2.example.com");
    assert_eq!(urls.support_url, "https://shop2.example.com/support");
}

#[tokio::test]
async fn quote_reminder_is_queued_and_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_test"))
        .and(body_partial_json(serde_json::json!({ "to": ["c@x.com"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_123" })))
        .expect(1)
        .mount(&server)
        .await;

    let (plugin, store) = plugin_with(config(&server)).await;
    let customer_id = Uuid::new_v4();
    store
        .add_customer(Customer {
            id: customer_id,
            tenant_id: "t1".to_string(),
            name: "Acme".to_string(),
            email: Some("c@x.com".to_string()),
        })
        .await;
    store
        .add_quote(Quote {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            quote_number: "Q-1001".to_string(),
            customer_id: Some(customer_id),
            customer_name: None,
            status: QuoteStatus::Sent,
            valid_until: today().checked_add_days(Days::new(1)).unwrap(),
            total_amount: Decimal::new(99900, 2),
            currency: "USD".to_string(),
        })
        .await;

    let summary = plugin.run_reminders(ReminderRunOptions::default()).await.unwrap();
    assert_eq!(summary.quotes_notified, 1);

    let entries = store.queue_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].recipient, "c@x.com");
    assert_eq!(entries[0].priority, Priority::Medium);
    assert!(entries[0].subject.contains("Q-1001"));
    assert_eq!(entries[0].status, QueueStatus::Sent);
    assert_eq!(entries[0].external_id.as_deref(), Some("em_123"));

    // overlapping run on the same day
    let again = plugin.run_reminders(ReminderRunOptions::default()).await.unwrap();
    assert_eq!(again.quotes_notified, 0);
    assert_eq!(again.skipped_already_reminded, 1);
}

#[tokio::test]
async fn overdue_invoice_without_any_email_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (plugin, store) = plugin_with(config(&server)).await;
    let customer_id = Uuid::new_v4();
    store
        .add_customer(Customer {
            id: customer_id,
            tenant_id: "t1".to_string(),
            name: "No Mail Ltd".to_string(),
            email: None,
        })
        .await;
    store
        .add_receivable(Receivable {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            invoice_number: "INV-1".to_string(),
            customer_id: Some(customer_id),
            customer_name: None,
            status: ReceivableStatus::Outstanding,
            due_date: today().pred_opt().unwrap(),
            amount_due: Decimal::new(100, 0),
            currency: "USD".to_string(),
        })
        .await;

    let summary = plugin.run_reminders(ReminderRunOptions::default()).await.unwrap();
    assert_eq!(summary.invoices_notified, 0);
    assert_eq!(summary.skipped_no_email, 1);
    assert!(store.queue_entries().await.is_empty());
}

#[tokio::test]
async fn provider_500_is_logged_as_failed_and_not_marked_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "internal server error"
        })))
        .mount(&server)
        .await;

    let (plugin, store) = plugin_with(config(&server)).await;
    let request = SendRequest::builder()
        .tenant("t1")
        .channel(Channel::Email)
        .to("c@x.com")
        .subject("Hello")
        .text("Hello")
        .build()
        .unwrap();

    let outcome = plugin.send(request).await;
    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("provider returned 500: internal server error")
    );

    let logs = store.log_rows().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, DeliveryStatus::Failed);
    assert_eq!(logs[0].provider, "resend");

    let entry = &store.queue_entries().await[0];
    assert_ne!(entry.status, QueueStatus::Sent);
    assert_eq!(entry.status, QueueStatus::RetryScheduled);
    assert!(entry.sent_at.is_none());
}

#[tokio::test]
async fn retry_scheduled_entry_is_delivered_by_process_queue() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_retry" })))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.retry = RetryPolicy {
        max_attempts: 3,
        initial_delay_secs: 0,
        ..Default::default()
    };
    let (plugin, store) = plugin_with(config).await;

    let request = SendRequest::builder()
        .tenant("t1")
        .channel(Channel::Email)
        .to("c@x.com")
        .subject("Hello")
        .text("Hello")
        .build()
        .unwrap();
    let first = plugin.send(request).await;
    assert_eq!(first.status, Some(QueueStatus::RetryScheduled));

    let result = plugin.process_queue(10).await.unwrap();
    assert_eq!(result.sent, 1);

    let entry = &store.queue_entries().await[0];
    assert_eq!(entry.status, QueueStatus::Sent);
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.external_id.as_deref(), Some("em_retry"));

    let attempts: Vec<_> = store.log_rows().await.iter().map(|l| (l.attempt, l.status)).collect();
    assert_eq!(
        attempts,
        vec![(1, DeliveryStatus::Failed), (2, DeliveryStatus::Sent)]
    );
}

async fn add_quote_for(store: &MemoryStore, email: &str) {
    let customer_id = Uuid::new_v4();
    store
        .add_customer(Customer {
            id: customer_id,
            tenant_id: "t1".to_string(),
            name: "Acme".to_string(),
            email: Some(email.to_string()),
        })
        .await;
    store
        .add_quote(Quote {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            quote_number: "Q-2001".to_string(),
            customer_id: Some(customer_id),
            customer_name: None,
            status: QuoteStatus::Sent,
            valid_until: today().checked_add_days(Days::new(1)).unwrap(),
            total_amount: Decimal::new(12000, 2),
            currency: "USD".to_string(),
        })
        .await;
}

#[tokio::test]
async fn rescheduled_reminder_is_sent_by_the_next_trigger_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_again" })))
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.retry = RetryPolicy {
        initial_delay_secs: 0,
        ..Default::default()
    };
    let (plugin, store) = plugin_with(config).await;
    add_quote_for(&store, "c@x.com").await;

    let first = plugin.reminder_handler().handle("POST", "{}").await;
    assert_eq!(first.status, 200);
    let first: serde_json::Value = serde_json::from_str(&first.body).unwrap();
    assert_eq!(first["failed"], 1);
    assert_eq!(store.queue_entries().await[0].status, QueueStatus::RetryScheduled);

    let second = plugin.reminder_handler().handle("POST", "{}").await;
    assert_eq!(second.status, 200);
    let second: serde_json::Value = serde_json::from_str(&second.body).unwrap();
    assert_eq!(second["quotesNotified"], 0);
    assert_eq!(second["skippedAlreadyReminded"], 1);
    assert_eq!(second["redispatchedSent"], 1);

    let entries = store.queue_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, QueueStatus::Sent);
    assert_eq!(entries[0].external_id.as_deref(), Some("em_again"));
}

#[tokio::test]
async fn reminders_work_without_explicit_initialize() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_boot" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let plugin = CommsPlugin::from_config(config(&server), Stores::memory(store.clone())).unwrap();
    add_quote_for(&store, "c@x.com").await;

    let summary = plugin.run_reminders(ReminderRunOptions::default()).await.unwrap();
    assert_eq!(summary.quotes_notified, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.queue_entries().await[0].status, QueueStatus::Sent);
}

#[tokio::test]
async fn send_handler_reports_bulk_results_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_bulk" })))
        .mount(&server)
        .await;

    let (plugin, _store) = plugin_with(config(&server)).await;
    let bodies = serde_json::from_value(serde_json::json!([
        { "tenant_id": "t1", "channel": "email", "to": "a@x.com", "subject": "Hi", "text_body": "Hi" },
        { "tenant_id": "t1", "channel": "fax", "to": "b@x.com", "text_body": "Hi" },
        { "tenant_id": "t1", "channel": "sms", "to": "+15550001111", "text_body": "Hi" }
    ]))
    .unwrap();

    let response = plugin.send_handler().send_bulk(bodies).await;
    assert_eq!(response.total, 3);
    assert_eq!(response.sent, 1);
    assert_eq!(response.failed, 2);
    assert_eq!(
        response.errors.iter().map(|e| e.index).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(response.errors[1].error.contains("sms communication is disabled"));
}
