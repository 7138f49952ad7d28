use tracing::warn;

const DEFAULT_ALERT_EMAIL: &str = "admin@example.com";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DASHBOARD_URL: &str = "https://dashboard.stripe.com";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Clone, Debug)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub gmail: Option<GmailCredentials>,
    pub alert_email: String,
    pub port: u16,
    pub dashboard_url: String,
    pub webhook_tolerance_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gmail = match (
            get("GMAIL_CLIENT_ID"),
            get("GMAIL_CLIENT_SECRET"),
            get("GMAIL_REFRESH_TOKEN"),
        ) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Some(GmailCredentials {
                client_id,
                client_secret,
                refresh_token,
            }),
            _ => None,
        };

        Self {
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            gmail,
            alert_email: get("ALERT_EMAIL").unwrap_or_else(|| DEFAULT_ALERT_EMAIL.to_string()),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT),
            dashboard_url: get("STRIPE_DASHBOARD_URL")
                .unwrap_or_else(|| DEFAULT_DASHBOARD_URL.to_string()),
            webhook_tolerance_secs: parse_or(
                get("WEBHOOK_TOLERANCE_SECS"),
                "WEBHOOK_TOLERANCE_SECS",
                DEFAULT_WEBHOOK_TOLERANCE_SECS,
            ),
        }
    }

    pub fn stripe_connected(&self) -> bool {
        self.stripe_secret_key.is_some()
    }

    pub fn gmail_connected(&self) -> bool {
        self.gmail.is_some()
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    raw: Option<String>,
    key: &str,
    default: T,
) -> T {
    match raw {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} value {:?}, using {}", key, value, default);
            default
        }),
        None => default,
    }
}
