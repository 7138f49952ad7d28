use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::activity_log::{LogsResponse, DEFAULT_QUERY_LIMIT, LOG_CAPACITY};
use crate::error::AppError;
use crate::event::{is_failure_event, FailureEvent, PaymentFailureRecord};
use crate::stripe::StripeEvent;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub stripe_connected: bool,
    pub gmail_connected: bool,
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub limit: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct TestResponse {
    pub success: bool,
    pub message: String,
    pub test_data: PaymentFailureRecord,
}

#[derive(Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(rename = "type")]
    pub event_type: String,
}

pub async fn service_info() -> Json<serde_json::Value> {
    Json(json!({
        "service": "Stripe Payment Failure Alerts",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "GET /health",
            "webhook": "POST /webhook",
            "logs": "GET /logs",
            "test": "POST /test",
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        stripe_connected: state.stripe_connected,
        gmail_connected: state.gmail_connected,
    })
}

pub async fn logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Json<LogsResponse> {
    // Unparsable limits fall back to the default instead of rejecting the query.
    let limit = query
        .limit
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, LOG_CAPACITY);
    Json(state.log.query(limit))
}

pub fn test_record() -> PaymentFailureRecord {
    PaymentFailureRecord {
        payment_intent_id: format!("pi_test_{}", Uuid::new_v4().simple()),
        amount: 2999,
        currency: "usd".to_string(),
        failure_code: Some("card_declined".to_string()),
        failure_message: Some("Your card was declined.".to_string()),
        payment_method_type: Some("card".to_string()),
        created: chrono::Utc::now().timestamp(),
        customer_name: "Test Customer".to_string(),
        customer_email: "test@example.com".to_string(),
    }
}

pub async fn send_test_alert(State(state): State<AppState>) -> Json<TestResponse> {
    state.log.info("Manual test alert triggered");

    let record = test_record();
    let success = state.alerts.send_alert(&record).await;

    Json(TestResponse {
        success,
        message: if success {
            "Test alert sent successfully".to_string()
        } else {
            "Failed to send test alert".to_string()
        },
        test_data: record,
    })
}

/// Verifies, then acknowledges. Once the signature checks out the reply is
/// always 200; alerting problems only reach the activity log.
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = match state.verifier.construct_event(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            state
                .log
                .error(format!("Webhook signature verification failed: {}", e));
            return Err(AppError::BadSignature(e));
        }
    };

    state.log.info(format!(
        "Received webhook event {} ({})",
        event.event_type, event.id
    ));

    if is_failure_event(&event.event_type) {
        // A panic while alerting stays inside this task.
        let task = {
            let state = state.clone();
            let event = event.clone();
            tokio::spawn(async move { relay_failure(&state, &event).await })
        };

        match task.await {
            Ok(true) => state
                .log
                .info(format!("Processed {} event {}", event.event_type, event.id)),
            Ok(false) => state.log.error(format!(
                "Alert for {} event {} was not delivered",
                event.event_type, event.id
            )),
            Err(e) if e.is_panic() => state.log.error(format!(
                "Webhook processing for event {} panicked: {}",
                event.id,
                crate::panic_message(&*e.into_panic())
            )),
            Err(e) => state.log.error(format!(
                "Webhook processing for event {} was aborted: {}",
                event.id, e
            )),
        }
    } else {
        state
            .log
            .info(format!("Ignoring event type {}", event.event_type));
    }

    Ok(Json(WebhookAck {
        received: true,
        event_type: event.event_type,
    }))
}

/// Normalizes a failure event, enriches it with customer details when the
/// event references a customer, and sends the alert. Returns whether the mail
/// went out.
async fn relay_failure(state: &AppState, event: &StripeEvent) -> bool {
    let Some(failure) = FailureEvent::from_event(event) else {
        return false;
    };

    let mut record = failure.to_record();
    state.log.info(format!(
        "Payment failure {} for {} {}",
        record.payment_intent_id,
        record.amount,
        record.currency.to_uppercase()
    ));

    if let Some(customer_id) = failure.customer_id() {
        match state.customers.retrieve_customer(customer_id).await {
            Ok(customer) => record = record.with_customer(&customer),
            Err(e) => state.log.error(format!(
                "Failed to retrieve customer {}: {}",
                customer_id, e
            )),
        }
    }

    state.alerts.send_alert(&record).await
}

pub async fn not_found() -> AppError {
    AppError::NotFound
}
