use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

use crate::activity_log::ActivityLog;
use crate::event::PaymentFailureRecord;
use crate::mailer::Mailer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertEmail {
    pub subject: String,
    pub body: String,
}

impl AlertEmail {
    pub fn to_rfc5322(&self, to: &str) -> String {
        let headers = [
            format!("To: {}", header_value(to)),
            format!("Subject: {}", encode_header(&header_value(&self.subject))),
            "MIME-Version: 1.0".to_string(),
            "Content-Type: text/plain; charset=utf-8".to_string(),
        ];
        format!(
            "{}\r\n\r\n{}",
            headers.join("\r\n"),
            self.body.replace("\r\n", "\n").replace('\n', "\r\n")
        )
    }
}

/// Header values come from customer data, so line breaks and other control
/// characters are flattened to spaces to keep them on a single header line.
fn header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

fn or_placeholder<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value.filter(|v| !v.is_empty()).unwrap_or(placeholder)
}

pub fn format_amount(amount: i64, currency: &str) -> String {
    let currency = if currency.is_empty() {
        "USD".to_string()
    } else {
        currency.to_uppercase()
    };
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}${}.{:02} {}", sign, abs / 100, abs % 100, currency)
}

pub fn format_timestamp(epoch_secs: i64) -> String {
    chrono::DateTime::from_timestamp(epoch_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch_secs.to_string())
}

pub fn render_alert(record: &PaymentFailureRecord, dashboard_url: &str) -> AlertEmail {
    let subject = format!(
        "Payment Failed: {}",
        or_placeholder(Some(record.customer_name.as_str()), "Unknown Customer")
    );

    let body = format!(
        "Payment Failure Alert\n\
         \n\
         Customer: {customer}\n\
         Email: {email}\n\
         Amount: {amount}\n\
         Payment Method: {method}\n\
         Failure Code: {code}\n\
         Failure Message: {message}\n\
         Payment Intent ID: {id}\n\
         Time: {time}\n\
         \n\
         View in Stripe Dashboard: {dashboard}/payments/{id}\n",
        customer = or_placeholder(Some(record.customer_name.as_str()), "Unknown"),
        email = or_placeholder(Some(record.customer_email.as_str()), "N/A"),
        amount = format_amount(record.amount, &record.currency),
        method = or_placeholder(record.payment_method_type.as_deref(), "Unknown"),
        code = or_placeholder(record.failure_code.as_deref(), "N/A"),
        message = or_placeholder(record.failure_message.as_deref(), "N/A"),
        id = record.payment_intent_id,
        time = format_timestamp(record.created),
        dashboard = dashboard_url.trim_end_matches('/'),
    );

    AlertEmail { subject, body }
}

/// Renders a record and hands it to the mailer exactly once.
#[derive(Clone)]
pub struct AlertSender {
    pub mailer: Arc<dyn Mailer>,
    pub log: Arc<ActivityLog>,
    pub recipient: String,
    pub dashboard_url: String,
}

impl AlertSender {
    pub async fn send_alert(&self, record: &PaymentFailureRecord) -> bool {
        let email = render_alert(record, &self.dashboard_url);
        let raw = email.to_rfc5322(&self.recipient);

        match self.mailer.send(&raw).await {
            Ok(()) => {
                self.log.info(format!(
                    "Alert email sent to {} for {}",
                    self.recipient, record.payment_intent_id
                ));
                true
            }
            Err(e) => {
                self.log.error(format!(
                    "Failed to send alert email for {}: {}",
                    record.payment_intent_id, e
                ));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::LogLevel;
    use crate::mailer::MailError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn record() -> PaymentFailureRecord {
        PaymentFailureRecord {
            payment_intent_id: "pi_123".into(),
            amount: 1999,
            currency: "usd".into(),
            failure_code: None,
            failure_message: None,
            payment_method_type: None,
            created: 1_700_000_000,
            customer_name: String::new(),
            customer_email: String::new(),
        }
    }

    #[test]
    fn renders_unknown_customer_and_amount() {
        let email = render_alert(&record(), "https://dashboard.stripe.com");
        assert_eq!(email.subject, "Payment Failed: Unknown Customer");
        assert!(email.body.contains("Amount: $19.99 USD"));
        assert!(email.body.contains("Customer: Unknown\n"));
        assert!(email.body.contains("Email: N/A"));
        assert!(email.body.contains("Payment Method: Unknown"));
        assert!(email.body.contains("Time: 2023-11-14 22:13:20 UTC"));
        assert!(email
            .body
            .contains("View in Stripe Dashboard: https://dashboard.stripe.com/payments/pi_123"));
    }

    #[test]
    fn renders_customer_details_when_present() {
        let mut r = record();
        r.customer_name = "Jane Doe".into();
        r.customer_email = "jane@example.com".into();
        r.failure_code = Some("card_declined".into());
        r.payment_method_type = Some("card".into());
        let email = render_alert(&r, "https://dashboard.stripe.com/");
        assert_eq!(email.subject, "Payment Failed: Jane Doe");
        assert!(email.body.contains("Customer: Jane Doe"));
        assert!(email.body.contains("Email: jane@example.com"));
        assert!(email.body.contains("Failure Code: card_declined"));
        assert!(email.body.contains("Payment Method: card"));
        assert!(email.body.contains("https://dashboard.stripe.com/payments/pi_123"));
    }

    #[test]
    fn amount_formatting() {
        assert_eq!(format_amount(5, ""), "$0.05 USD");
        assert_eq!(format_amount(100_000, "eur"), "$1000.00 EUR");
        assert_eq!(format_amount(-250, "usd"), "-$2.50 USD");
    }

    #[test]
    fn rfc5322_envelope_has_headers_and_crlf_body() {
        let email = AlertEmail {
            subject: "Payment Failed: Zoë".into(),
            body: "line one\nline two\n".into(),
        };
        let raw = email.to_rfc5322("ops@example.com");
        assert!(raw.starts_with("To: ops@example.com\r\n"));
        assert!(raw.contains("Subject: =?UTF-8?B?"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8\r\n\r\nline one\r\nline two\r\n"));
    }

    #[test]
    fn line_breaks_in_customer_name_cannot_add_headers() {
        let mut failure = record();
        failure.customer_name = "Mallory\r\nBcc: attacker@evil.test".into();
        let raw = render_alert(&failure, "https://dashboard.stripe.com")
            .to_rfc5322("ops@example.com\nCc: other@evil.test");

        let (head, _) = raw.split_once("\r\n\r\n").unwrap();
        let headers: Vec<&str> = head.split("\r\n").collect();
        assert_eq!(headers.len(), 4);
        assert_eq!(headers[0], "To: ops@example.com Cc: other@evil.test");
        assert_eq!(headers[1], "Subject: Payment Failed: Mallory  Bcc: attacker@evil.test");
        assert!(headers.iter().all(|h| !h.contains('\n') && !h.contains('\r')));
    }

    struct RecordingMailer {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, raw_message: &str) -> Result<(), MailError> {
            self.sent.lock().push(raw_message.to_string());
            if self.fail {
                Err(MailError::NotConfigured)
            } else {
                Ok(())
            }
        }
    }

    fn sender(fail: bool) -> (AlertSender, Arc<RecordingMailer>, Arc<ActivityLog>) {
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
            fail,
        });
        let log = Arc::new(ActivityLog::new());
        let sender = AlertSender {
            mailer: mailer.clone(),
            log: log.clone(),
            recipient: "admin@example.com".into(),
            dashboard_url: "https://dashboard.stripe.com".into(),
        };
        (sender, mailer, log)
    }

    #[tokio::test]
    async fn successful_send_is_logged() {
        let (sender, mailer, log) = sender(false);
        assert!(sender.send_alert(&record()).await);
        assert_eq!(mailer.sent.lock().len(), 1);
        let entry = &log.query(1).logs[0];
        assert_eq!(entry.level, LogLevel::Info);
        assert!(entry.message.contains("pi_123"));
    }

    #[tokio::test]
    async fn failed_send_is_attempted_once_and_logged() {
        let (sender, mailer, log) = sender(true);
        assert!(!sender.send_alert(&record()).await);
        assert_eq!(mailer.sent.lock().len(), 1);
        let entry = &log.query(1).logs[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert!(entry.message.contains("Gmail credentials are not configured"));
    }
}
