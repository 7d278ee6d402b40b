use {
    super::error::EscrowError,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

const MAX_ID_LEN: usize = 128;

fn validate_token(kind: &str, id: &str) -> Result<(), EscrowError> {
    if id.is_empty() {
        return Err(EscrowError::Validation(format!("{kind} must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(EscrowError::Validation(format!(
            "{kind} exceeds {MAX_ID_LEN} characters"
        )));
    }
    if id.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(EscrowError::Validation(format!(
            "{kind} contains whitespace or control characters, got: {id:?}"
        )));
    }
    Ok(())
}

/// Internal payment identifier, echoed back by the provider as `m_payment_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Result<Self, EscrowError> {
        let id = id.into();
        validate_token("PaymentId", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentId {
    type Error = EscrowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PaymentId> for String {
    fn from(id: PaymentId) -> Self {
        id.0
    }
}

/// Platform user (buyer, seller, approver or admin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self, EscrowError> {
        let id = id.into();
        validate_token("UserId", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = EscrowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Result<Self, EscrowError> {
        let id = id.into();
        validate_token("ProjectId", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectId {
    type Error = EscrowError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ProjectId> for String {
    fn from(id: ProjectId) -> Self {
        id.0
    }
}

/// Escrow identifier, generated in Rust via `Uuid::now_v7()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EscrowId(Uuid);

impl EscrowId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::str::FromStr for EscrowId {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| EscrowError::Validation(format!("EscrowId must be a UUID, got: {s}")))
    }
}
