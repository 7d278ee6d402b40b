//! Webhook authenticity gate.
//!
//! The provider signs every callback with HMAC-SHA256 over the canonical
//! field string: all fields except `signature`, sorted by key, URL-decoded
//! values, joined as `k=v` pairs with `&`. The signature travels hex-encoded.

use {
    crate::domain::webhook::{
        FIELD_PAYMENT_ID, FIELD_PROVIDER_PAYMENT_ID, FIELD_SIGNATURE, FIELD_STATUS,
    },
    hmac::{Hmac, Mac},
    sha2::Sha256,
    std::collections::BTreeMap,
    subtle::ConstantTimeEq,
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;

pub fn canonical_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .filter(|(k, _)| k.as_str() != FIELD_SIGNATURE)
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn mac_for(fields: &BTreeMap<String, String>, secret: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(canonical_string(fields).as_bytes());
    Some(mac)
}

/// Hex signature the provider would attach to `fields`.
pub fn sign(fields: &BTreeMap<String, String>, secret: &str) -> String {
    mac_for(fields, secret)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default()
}

/// Pure, fails closed. Any missing field, bad encoding or mismatch is `false`.
pub fn verify(fields: &BTreeMap<String, String>, signature: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let present = |k: &str| fields.get(k).is_some_and(|v| !v.is_empty());
    if !present(FIELD_STATUS) || !(present(FIELD_PAYMENT_ID) || present(FIELD_PROVIDER_PAYMENT_ID))
    {
        return false;
    }

    let provided = match hex::decode(signature.trim()) {
        Ok(bytes) if bytes.len() == SIGNATURE_LEN => bytes,
        _ => return false,
    };
    let Some(mac) = mac_for(fields, secret) else {
        return false;
    };
    let expected = mac.finalize().into_bytes();

    expected.as_slice().ct_eq(&provided).into()
}
