use {
    super::id::UserId,
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentConfirmed,
    PaymentFailed,
    RefundIssued,
    EscrowCreated,
    EscrowReleased,
    EscrowCancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentConfirmed => "payment_confirmed",
            Self::PaymentFailed => "payment_failed",
            Self::RefundIssued => "refund_issued",
            Self::EscrowCreated => "escrow_created",
            Self::EscrowReleased => "escrow_released",
            Self::EscrowCancelled => "escrow_cancelled",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User-facing message. The dispatcher has no dedup obligation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}
