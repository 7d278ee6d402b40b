use {
    super::error::EscrowError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Amount in minor units (cents). Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub fn new(cents: i64) -> Result<Self, EscrowError> {
        if cents < 0 {
            return Err(EscrowError::Validation(format!(
                "MoneyAmount cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Parse a provider decimal string such as `"1000.00"` into minor units.
    pub fn parse_decimal(s: &str) -> Result<Self, EscrowError> {
        let invalid = || EscrowError::Validation(format!("invalid decimal amount: {s:?}"));
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty()
            || frac.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(MoneyAmount)
            .ok_or_else(invalid)
    }
}

impl TryFrom<i64> for MoneyAmount {
    type Error = EscrowError;

    fn try_from(cents: i64) -> Result<Self, Self::Error> {
        Self::new(cents)
    }
}

impl From<MoneyAmount> for i64 {
    fn from(amount: MoneyAmount) -> Self {
        amount.0
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Zar,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zar => "zar",
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = EscrowError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "zar" => Ok(Self::Zar),
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            other => Err(EscrowError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: MoneyAmount,
    currency: Currency,
}

impl Money {
    pub fn new(amount: MoneyAmount, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn amount(&self) -> MoneyAmount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_amount_rejected() {
        assert!(MoneyAmount::new(-1).is_err());
    }

    #[test]
    fn parse_decimal_handles_provider_formats() {
        assert_eq!(MoneyAmount::parse_decimal("1000.00").unwrap().cents(), 100_000);
        assert_eq!(MoneyAmount::parse_decimal("10.5").unwrap().cents(), 1050);
        assert_eq!(MoneyAmount::parse_decimal("7").unwrap().cents(), 700);
        assert!(MoneyAmount::parse_decimal("-1.00").is_err());
        assert!(MoneyAmount::parse_decimal("1.005").is_err());
        assert!(MoneyAmount::parse_decimal(".50").is_err());
        assert!(MoneyAmount::parse_decimal("abc").is_err());
    }
}
