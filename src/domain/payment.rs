use {
    super::audit::NewAuditEntry,
    super::error::EscrowError,
    super::escrow::EscrowIntent,
    super::id::{PaymentId, UserId},
    super::money::Money,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    /// `pending → completed | failed`, `completed → refunded`. Nothing else.
    pub fn can_transition_to(&self, next: &PaymentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed)
                | (Self::Pending, Self::Failed)
                | (Self::Completed, Self::Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentStatus {
    type Error = EscrowError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(EscrowError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }
}

/// Financial record of a single payment attempt. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub money: Money,
    pub status: PaymentStatus,
    pub provider_payment_id: Option<String>,
    pub provider_signature: Option<String>,
    pub provider_timestamp: Option<DateTime<Utc>>,
    /// Provider body stored verbatim, never re-derived from parsed fields.
    pub raw_provider_response: Option<String>,
    pub user_id: UserId,
    pub escrow_intent: Option<EscrowIntent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A pending payment as recorded when the checkout is initiated.
    pub fn initiate(new: NewPayment) -> Self {
        let now = Utc::now();
        Self {
            id: new.id,
            money: new.money,
            status: PaymentStatus::Pending,
            provider_payment_id: None,
            provider_signature: None,
            provider_timestamp: None,
            raw_provider_response: None,
            user_id: new.user_id,
            escrow_intent: new.escrow_intent,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when `update` is a redelivery of the event that produced the current state.
    pub fn is_same_delivery(&self, update: &ProviderUpdate) -> bool {
        self.status == update.status
            && self.provider_payment_id == update.provider_payment_id
            && self.provider_signature.as_deref() == Some(update.provider_signature.as_str())
    }

    pub fn apply(&mut self, update: &ProviderUpdate) {
        self.status = update.status;
        self.provider_payment_id = update.provider_payment_id.clone();
        self.provider_signature = Some(update.provider_signature.clone());
        self.provider_timestamp = Some(update.provider_timestamp);
        self.raw_provider_response = Some(update.raw_provider_response.clone());
        self.updated_at = Utc::now();
    }

    pub fn audit_entry(&self, actor: &str, action: &str) -> NewAuditEntry {
        NewAuditEntry::new(
            "payment",
            self.id.as_str(),
            action,
            actor,
            serde_json::json!({
                "amount": self.money.amount().cents(),
                "currency": self.money.currency().as_str(),
                "status": self.status.as_str(),
            }),
        )
    }
}

/// For INSERT. Payment initiation lives outside the reconciliation core.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub money: Money,
    pub escrow_intent: Option<EscrowIntent>,
}

/// Fields written by a verified provider callback in one conditional update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderUpdate {
    pub status: PaymentStatus,
    pub provider_payment_id: Option<String>,
    pub provider_signature: String,
    pub provider_timestamp: DateTime<Utc>,
    pub raw_provider_response: String,
}

/// One row per completed payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub money: Money,
    pub provider_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn for_payment(payment: &Payment) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_id: payment.id.clone(),
            user_id: payment.user_id.clone(),
            money: payment.money.clone(),
            provider_payment_id: payment.provider_payment_id.clone(),
            created_at: Utc::now(),
        }
    }
}
