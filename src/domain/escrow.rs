use {
    super::audit::NewAuditEntry,
    super::error::EscrowError,
    super::id::{EscrowId, PaymentId, ProjectId, UserId},
    super::money::{Money, MoneyAmount},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::{fmt, str::FromStr},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    Active,
    Released,
    Cancelled,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
            Self::Cancelled => "cancelled",
        }
    }

    /// Only `active` is mutable; `released` and `cancelled` are terminal.
    pub fn can_transition_to(&self, next: &EscrowStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Released) | (Self::Active, Self::Cancelled)
        )
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for EscrowStatus {
    type Error = EscrowError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "active" => Ok(Self::Active),
            "released" => Ok(Self::Released),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(EscrowError::Validation(format!(
                "unknown escrow status: {other}"
            ))),
        }
    }
}

/// What must hold before funds move. Consumed by the authorization policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Users besides the buyer allowed to approve the release.
    #[serde(default)]
    pub approvers: Vec<UserId>,
    /// When set, the seller cannot cancel on their own.
    #[serde(default)]
    pub requires_admin_cancel: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub payment_id: PaymentId,
    pub money: Money,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub project_id: ProjectId,
    pub release_conditions: ReleaseConditions,
    pub status: EscrowStatus,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Escrow {
    /// Build an `active` escrow held in the owning payment's currency.
    pub fn open(new: NewEscrow, payment_money: &Money) -> Self {
        let now = Utc::now();
        Self {
            id: EscrowId::generate(),
            payment_id: new.payment_id,
            money: Money::new(new.amount, payment_money.currency()),
            seller_id: new.seller_id,
            buyer_id: new.buyer_id,
            project_id: new.project_id,
            release_conditions: new.release_conditions,
            status: EscrowStatus::Active,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_party(&self, user: &UserId) -> bool {
        &self.buyer_id == user || &self.seller_id == user
    }

    pub fn audit_entry(&self, actor: &str, action: &str, old: Option<EscrowStatus>) -> NewAuditEntry {
        NewAuditEntry::new(
            "escrow",
            &self.id.to_string(),
            action,
            actor,
            serde_json::json!({
                "payment_id": self.payment_id.as_str(),
                "amount": self.money.amount().cents(),
                "currency": self.money.currency().as_str(),
                "old_status": old.map(|s| s.as_str()),
                "new_status": self.status.as_str(),
            }),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewEscrow {
    pub payment_id: PaymentId,
    pub amount: MoneyAmount,
    pub seller_id: UserId,
    pub buyer_id: UserId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub release_conditions: ReleaseConditions,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Escrow requested at checkout, opened once the payment completes.
/// The buyer is always the paying user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowIntent {
    pub seller_id: UserId,
    pub project_id: ProjectId,
    pub amount: MoneyAmount,
    #[serde(default)]
    pub release_conditions: ReleaseConditions,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl EscrowIntent {
    pub fn into_new_escrow(self, payment_id: PaymentId, buyer_id: UserId) -> NewEscrow {
        NewEscrow {
            payment_id,
            amount: self.amount,
            seller_id: self.seller_id,
            buyer_id,
            project_id: self.project_id,
            release_conditions: self.release_conditions,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowAction {
    Release,
    Cancel,
}

impl EscrowAction {
    pub fn target(&self) -> EscrowStatus {
        match self {
            Self::Release => EscrowStatus::Released,
            Self::Cancel => EscrowStatus::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Cancel => "cancel",
        }
    }
}

impl FromStr for EscrowAction {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(Self::Release),
            "cancel" => Ok(Self::Cancel),
            other => Err(EscrowError::Validation(format!(
                "unknown escrow action: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    User,
    Admin,
    /// In-process caller such as the webhook engine. Never set from HTTP.
    System,
}

/// Authenticated caller of an escrow operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn user(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::User,
        }
    }

    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Admin,
        }
    }

    pub fn system(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::System,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn is_system(&self) -> bool {
        self.role == ActorRole::System
    }

    pub fn audit_label(&self) -> String {
        match self.role {
            ActorRole::Admin => format!("admin:{}", self.id),
            ActorRole::User => format!("user:{}", self.id),
            ActorRole::System => self.id.to_string(),
        }
    }
}
