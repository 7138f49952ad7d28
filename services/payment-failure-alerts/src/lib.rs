use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod activity_log;
pub mod alert;
pub mod config;
pub mod error;
pub mod event;
pub mod mailer;
pub mod routes;
pub mod stripe;

use activity_log::ActivityLog;
use alert::AlertSender;
use config::AppConfig;
use error::AppError;
use mailer::{GmailMailer, Mailer};
use crate::stripe::{CustomerDirectory, StripeClient, WebhookVerifier};

#[derive(Clone)]
pub struct AppState {
    pub log: Arc<ActivityLog>,
    pub verifier: WebhookVerifier,
    pub customers: Arc<dyn CustomerDirectory>,
    pub alerts: AlertSender,
    pub stripe_connected: bool,
    pub gmail_connected: bool,
}

impl AppState {
    /// Wires the real Stripe and Gmail clients from configuration.
    pub fn from_config(cfg: &AppConfig) -> Self {
        let customers = Arc::new(StripeClient::new(cfg.stripe_secret_key.clone()));
        let mailer = Arc::new(GmailMailer::new(cfg.gmail.clone()));
        Self::new(cfg, customers, mailer)
    }

    pub fn new(
        cfg: &AppConfig,
        customers: Arc<dyn CustomerDirectory>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let log = Arc::new(ActivityLog::new());
        Self {
            verifier: WebhookVerifier::new(
                cfg.stripe_webhook_secret.clone(),
                cfg.webhook_tolerance_secs,
            ),
            customers,
            alerts: AlertSender {
                mailer,
                log: log.clone(),
                recipient: cfg.alert_email.clone(),
                dashboard_url: cfg.dashboard_url.clone(),
            },
            stripe_connected: cfg.stripe_connected(),
            gmail_connected: cfg.gmail_connected(),
            log,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let panic_log = state.log.clone();

    Router::new()
        .route("/", get(routes::service_info))
        .route("/health", get(routes::health))
        .route("/logs", get(routes::logs))
        .route("/test", post(routes::send_test_alert))
        .route("/webhook", post(routes::receive_webhook))
        .fallback(routes::not_found)
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            panic_log.error(format!("Unhandled error: {}", panic_message(&*panic)));
            AppError::Internal.into_response()
        }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    }
}
