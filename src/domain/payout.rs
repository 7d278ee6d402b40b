use {
    super::id::{EscrowId, UserId},
    super::money::Money,
    serde::Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutKind {
    /// Escrow released: funds go to the seller.
    Transfer,
    /// Escrow cancelled: funds go back to the buyer.
    Refund,
}

impl PayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayoutInstruction {
    pub escrow_id: EscrowId,
    pub kind: PayoutKind,
    pub recipient: UserId,
    pub money: Money,
}

impl PayoutInstruction {
    /// Stable per escrow, so a retried payout can be deduplicated downstream.
    pub fn idempotency_key(&self) -> String {
        format!("escrow:{}:{}", self.escrow_id, self.kind.as_str())
    }
}
