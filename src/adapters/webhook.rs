use {
    crate::{
        AppState,
        adapters::api_errors::WebhookError,
        domain::{
            error::EscrowError,
            webhook::{ReconcileOutcome, RequestContext},
        },
    },
    axum::{
        extract::State,
        http::{HeaderMap, StatusCode, header},
    },
    std::collections::BTreeMap,
};

/// Provider-facing callback. 200 for applied, duplicate, ignored and rejected
/// transitions; the body is always empty.
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, WebhookError> {
    let fields = if is_json(&headers) {
        parse_json(&body)?
    } else {
        parse_form(&body)?
    };
    let ctx = request_context(&headers);

    match state.webhooks.handle(fields, body, &ctx).await? {
        ReconcileOutcome::Applied { payment_id, to, .. } => {
            tracing::info!(payment_id = %payment_id, status = %to, "webhook applied");
        }
        ReconcileOutcome::Duplicate(payment_id) => {
            tracing::info!(payment_id = %payment_id, "webhook duplicate");
        }
        ReconcileOutcome::Rejected { payment_id, .. } => {
            tracing::info!(payment_id = %payment_id, "webhook acknowledged without change");
        }
        ReconcileOutcome::Ignored(payment_id) => {
            tracing::info!(payment_id = %payment_id, "webhook ignored");
        }
    }
    Ok(StatusCode::OK)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Form fields, URL-decoded. A repeated key is ambiguous under signing and rejected.
pub fn parse_form(body: &str) -> Result<BTreeMap<String, String>, EscrowError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)
        .map_err(|e| EscrowError::Validation(format!("malformed form body: {e}")))?;

    let mut fields = BTreeMap::new();
    for (key, value) in pairs {
        if fields.contains_key(&key) {
            return Err(EscrowError::Validation(format!("duplicate field: {key}")));
        }
        fields.insert(key, value);
    }
    Ok(fields)
}

/// Flat JSON object; scalars are stringified, nested values rejected.
pub fn parse_json(body: &str) -> Result<BTreeMap<String, String>, EscrowError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| EscrowError::Validation(format!("malformed json body: {e}")))?;
    let serde_json::Value::Object(map) = value else {
        return Err(EscrowError::Validation("json body must be an object".into()));
    };

    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => String::new(),
                _ => {
                    return Err(EscrowError::Validation(format!(
                        "field {key} must be a scalar"
                    )));
                }
            };
            Ok((key, value))
        })
        .collect()
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let source_ip = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| header_str("x-real-ip"))
        .map(str::to_string);

    RequestContext {
        source_ip,
        user_agent: header_str(header::USER_AGENT.as_str()).map(str::to_string),
    }
}
