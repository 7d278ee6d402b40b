use {
    super::error::EscrowError,
    super::id::PaymentId,
    super::money::MoneyAmount,
    super::payment::PaymentStatus,
    chrono::{DateTime, Utc},
    std::{collections::BTreeMap, str::FromStr},
};

pub const FIELD_PAYMENT_ID: &str = "m_payment_id";
pub const FIELD_PROVIDER_PAYMENT_ID: &str = "pf_payment_id";
pub const FIELD_STATUS: &str = "payment_status";
pub const FIELD_SIGNATURE: &str = "signature";
pub const FIELD_AMOUNT: &str = "amount_gross";
pub const FIELD_TIMESTAMP: &str = "timestamp";

/// Verified-shape provider callback. Lives only for the duration of one delivery.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub payment_id: Option<PaymentId>,
    pub provider_payment_id: Option<String>,
    pub reported_status: String,
    pub signature: String,
    pub amount: Option<MoneyAmount>,
    pub provider_timestamp: Option<DateTime<Utc>>,
    pub raw_body: String,
}

impl WebhookEvent {
    pub fn from_fields(
        raw_fields: &BTreeMap<String, String>,
        raw_body: String,
    ) -> Result<Self, EscrowError> {
        let get = |k: &str| raw_fields.get(k).filter(|v| !v.is_empty()).cloned();

        let signature = get(FIELD_SIGNATURE)
            .ok_or_else(|| EscrowError::Validation(format!("missing field: {FIELD_SIGNATURE}")))?;
        let reported_status = get(FIELD_STATUS)
            .ok_or_else(|| EscrowError::Validation(format!("missing field: {FIELD_STATUS}")))?;
        let payment_id = get(FIELD_PAYMENT_ID).map(PaymentId::new).transpose()?;
        let provider_payment_id = get(FIELD_PROVIDER_PAYMENT_ID);
        if payment_id.is_none() && provider_payment_id.is_none() {
            return Err(EscrowError::Validation(format!(
                "one of {FIELD_PAYMENT_ID} or {FIELD_PROVIDER_PAYMENT_ID} is required"
            )));
        }
        let amount = get(FIELD_AMOUNT)
            .map(|a| MoneyAmount::parse_decimal(&a))
            .transpose()?;
        let provider_timestamp = get(FIELD_TIMESTAMP)
            .map(|t| parse_timestamp(&t))
            .transpose()?;

        Ok(Self {
            payment_id,
            provider_payment_id,
            reported_status,
            signature,
            amount,
            provider_timestamp,
            raw_body,
        })
    }
}

/// Unix seconds or RFC 3339.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, EscrowError> {
    if let Ok(secs) = s.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| EscrowError::Validation(format!("timestamp out of range: {s}")));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| EscrowError::Validation(format!("unparseable timestamp: {s}")))
}

/// Source of the HTTP delivery, recorded in the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub source_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedStatus {
    Apply(PaymentStatus),
    /// Acknowledge the delivery without touching the payment.
    Ignore,
}

/// Maps the provider's status vocabulary onto payment statuses.
pub trait StatusMapper: Send + Sync {
    fn map(&self, reported: &str) -> MappedStatus;
}

/// What to do with intermediate provider states such as `PENDING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    #[default]
    Fail,
    Ignore,
}

impl FromStr for PendingPolicy {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail" => Ok(Self::Fail),
            "ignore" => Ok(Self::Ignore),
            other => Err(EscrowError::Validation(format!(
                "unknown pending status policy: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderStatusMapper {
    pub pending: PendingPolicy,
}

impl ProviderStatusMapper {
    pub fn new(pending: PendingPolicy) -> Self {
        Self { pending }
    }
}

impl StatusMapper for ProviderStatusMapper {
    fn map(&self, reported: &str) -> MappedStatus {
        match reported.trim().to_ascii_uppercase().as_str() {
            "COMPLETE" | "COMPLETED" => MappedStatus::Apply(PaymentStatus::Completed),
            "REFUNDED" => MappedStatus::Apply(PaymentStatus::Refunded),
            "FAILED" | "CANCELLED" => MappedStatus::Apply(PaymentStatus::Failed),
            _ => match self.pending {
                PendingPolicy::Fail => MappedStatus::Apply(PaymentStatus::Failed),
                PendingPolicy::Ignore => MappedStatus::Ignore,
            },
        }
    }
}

/// What the reconciliation engine did with a verified delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        payment_id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    /// Redelivery of an already-applied event. No side effects.
    Duplicate(PaymentId),
    /// Not a legal transition from the current state; acknowledged, alerted.
    Rejected {
        payment_id: PaymentId,
        current: PaymentStatus,
        attempted: PaymentStatus,
    },
    Ignored(PaymentId),
}
