//! Maps the three Stripe failure events onto one [`PaymentFailureRecord`].
//!
//! Normalization never fails. Every field on the embedded objects is optional,
//! and a field holding the wrong JSON type is read as missing, so a malformed
//! failure event still produces an alert with placeholders.

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};

use crate::stripe::{Customer, StripeEvent};

pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_FAILED: &str = "charge.failed";
pub const INVOICE_PAYMENT_FAILED: &str = "invoice.payment_failed";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailureRecord {
    pub payment_intent_id: String,
    pub amount: i64,
    pub currency: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
    pub payment_method_type: Option<String>,
    pub created: i64,
    pub customer_name: String,
    pub customer_email: String,
}

impl PaymentFailureRecord {
    pub fn with_customer(self, customer: &Customer) -> Self {
        Self {
            customer_name: customer.name.clone().unwrap_or_default(),
            customer_email: customer.email.clone().unwrap_or_default(),
            ..self
        }
    }
}

/// Reads a field as `None` when its value does not fit the expected type.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// A reference that Stripe sends either as a bare id or as the expanded object.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Id(String),
    Expanded { id: String },
}

impl ObjectRef {
    pub fn id(&self) -> &str {
        match self {
            ObjectRef::Id(id) => id,
            ObjectRef::Expanded { id } => id,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TypedObject {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorObject {
    #[serde(default, deserialize_with = "lenient")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method: Option<TypedObject>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaymentIntentObject {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub customer: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub failure_code: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub failure_message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_payment_error: Option<ErrorObject>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method_types: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChargeObject {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_intent: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub customer: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub failure_code: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub failure_message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method_details: Option<TypedObject>,
    #[serde(default, deserialize_with = "lenient")]
    pub source: Option<TypedObject>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method_types: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceObject {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_intent: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount_due: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    pub customer: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_finalization_error: Option<ErrorObject>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_settings: Option<PaymentSettings>,
}

#[derive(Clone, Debug)]
pub enum FailureEvent {
    PaymentIntentFailed(PaymentIntentObject),
    ChargeFailed(ChargeObject),
    InvoicePaymentFailed(InvoiceObject),
}

pub fn is_failure_event(event_type: &str) -> bool {
    matches!(
        event_type,
        PAYMENT_INTENT_FAILED | CHARGE_FAILED | INVOICE_PAYMENT_FAILED
    )
}

impl FailureEvent {
    /// Returns `None` for event types this service does not alert on. A
    /// `data.object` that is not a JSON object normalizes to all defaults.
    pub fn from_event(event: &StripeEvent) -> Option<Self> {
        let parsed = match event.event_type.as_str() {
            PAYMENT_INTENT_FAILED => {
                let mut pi: PaymentIntentObject = shape(event);
                pi.created = pi.created.or(event.created);
                FailureEvent::PaymentIntentFailed(pi)
            }
            CHARGE_FAILED => {
                let mut charge: ChargeObject = shape(event);
                charge.created = charge.created.or(event.created);
                FailureEvent::ChargeFailed(charge)
            }
            INVOICE_PAYMENT_FAILED => {
                let mut invoice: InvoiceObject = shape(event);
                invoice.created = invoice.created.or(event.created);
                FailureEvent::InvoicePaymentFailed(invoice)
            }
            _ => return None,
        };

        Some(parsed)
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            FailureEvent::PaymentIntentFailed(_) => PAYMENT_INTENT_FAILED,
            FailureEvent::ChargeFailed(_) => CHARGE_FAILED,
            FailureEvent::InvoicePaymentFailed(_) => INVOICE_PAYMENT_FAILED,
        }
    }

    pub fn customer_id(&self) -> Option<&str> {
        let customer = match self {
            FailureEvent::PaymentIntentFailed(pi) => pi.customer.as_ref(),
            FailureEvent::ChargeFailed(charge) => charge.customer.as_ref(),
            FailureEvent::InvoicePaymentFailed(invoice) => invoice.customer.as_ref(),
        };
        customer.map(ObjectRef::id).filter(|id| !id.is_empty())
    }

    pub fn to_record(&self) -> PaymentFailureRecord {
        match self {
            FailureEvent::PaymentIntentFailed(pi) => from_payment_intent(pi),
            FailureEvent::ChargeFailed(charge) => from_charge(charge),
            FailureEvent::InvoicePaymentFailed(invoice) => from_invoice(invoice),
        }
    }
}

fn shape<T: DeserializeOwned + Default>(event: &StripeEvent) -> T {
    serde_json::from_value(event.data.object.clone()).unwrap_or_default()
}

fn resolve_id(own: &Option<String>, payment_intent: Option<&ObjectRef>) -> String {
    own.clone()
        .filter(|id| !id.is_empty())
        .or_else(|| payment_intent.map(|r| r.id().to_string()))
        .unwrap_or_default()
}

fn first_method_type(types: Option<&Vec<String>>) -> Option<String> {
    types.and_then(|t| t.first().cloned())
}

fn from_payment_intent(pi: &PaymentIntentObject) -> PaymentFailureRecord {
    let error = pi.last_payment_error.as_ref();
    PaymentFailureRecord {
        payment_intent_id: resolve_id(&pi.id, None),
        amount: pi.amount.unwrap_or_default(),
        currency: pi.currency.clone().unwrap_or_default(),
        failure_code: pi
            .failure_code
            .clone()
            .or_else(|| error.and_then(|e| e.code.clone())),
        failure_message: pi
            .failure_message
            .clone()
            .or_else(|| error.and_then(|e| e.message.clone())),
        payment_method_type: first_method_type(pi.payment_method_types.as_ref()).or_else(|| {
            error
                .and_then(|e| e.payment_method.as_ref())
                .and_then(|pm| pm.kind.clone())
        }),
        created: pi.created.unwrap_or_default(),
        customer_name: String::new(),
        customer_email: String::new(),
    }
}

fn from_charge(charge: &ChargeObject) -> PaymentFailureRecord {
    PaymentFailureRecord {
        payment_intent_id: resolve_id(&charge.id, charge.payment_intent.as_ref()),
        amount: charge.amount.unwrap_or_default(),
        currency: charge.currency.clone().unwrap_or_default(),
        failure_code: charge.failure_code.clone(),
        failure_message: charge.failure_message.clone(),
        payment_method_type: charge
            .payment_method_details
            .as_ref()
            .and_then(|d| d.kind.clone())
            .or_else(|| charge.source.as_ref().and_then(|s| s.kind.clone())),
        created: charge.created.unwrap_or_default(),
        customer_name: String::new(),
        customer_email: String::new(),
    }
}

fn from_invoice(invoice: &InvoiceObject) -> PaymentFailureRecord {
    let error = invoice.last_finalization_error.as_ref();
    PaymentFailureRecord {
        payment_intent_id: resolve_id(&invoice.id, invoice.payment_intent.as_ref()),
        amount: invoice.amount.or(invoice.amount_due).unwrap_or_default(),
        currency: invoice.currency.clone().unwrap_or_default(),
        failure_code: error.and_then(|e| e.code.clone()),
        failure_message: error.and_then(|e| e.message.clone()),
        payment_method_type: first_method_type(
            invoice
                .payment_settings
                .as_ref()
                .and_then(|s| s.payment_method_types.as_ref()),
        )
        .or_else(|| {
            error
                .and_then(|e| e.payment_method.as_ref())
                .and_then(|pm| pm.kind.clone())
        }),
        created: invoice.created.unwrap_or_default(),
        customer_name: String::new(),
        customer_email: String::new(),
    }
}
