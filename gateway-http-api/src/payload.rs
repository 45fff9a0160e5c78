//! Request payload of the execution endpoint.
//!
//! POST bodies carry native JSON; GET requests carry the same fields as
//! query-string text, so flags, numbers, `event` and `secrets` are also
//! accepted in string form.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use gateway_runtime::{SecretMap, WalletCredentials};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayload {
    pub user_code: Option<String>,
    #[serde(default, deserialize_with = "json_or_text")]
    pub event: Option<Value>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub debug: bool,
    #[serde(rename = "AESKey")]
    pub aes_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_secrets")]
    pub secrets: SecretMap,
    pub wallet_private_key: Option<String>,
    pub wallet_public_key: Option<String>,
    pub account_id: Option<String>,
    pub kb_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub max_amount: Option<u64>,
}

impl ExecutionPayload {
    /// Payload of a GET request, read from its query string.
    pub fn from_query(query: &HashMap<String, String>) -> Result<Self, serde_json::Error> {
        let fields: Map<String, Value> = query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        serde_json::from_value(Value::Object(fields))
    }

    /// Payload of a POST request. An empty body is an empty payload.
    pub fn from_body(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
    }

    /// Wallet material for this request's transaction authorizations.
    pub fn credentials(&self) -> WalletCredentials {
        WalletCredentials {
            encrypted_private_key: self.wallet_private_key.clone(),
            public_key: self.wallet_public_key.clone(),
            aes_key: self.aes_key.clone(),
            account_id: self.account_id.clone(),
            tenant_id: self.kb_id.clone(),
            max_amount: self.max_amount,
        }
    }
}

fn json_or_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(text)) => {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        }
        other => other,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(s.trim(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    use serde::de::Error;

    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("expected a non-negative integer, got {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid integer '{s}': {e}"))),
        Some(other) => Err(D::Error::custom(format!("expected an integer, got {other}"))),
    }
}

fn lenient_secrets<'de, D: Deserializer<'de>>(d: D) -> Result<SecretMap, D::Error> {
    use serde::de::Error;

    let value = match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => return Ok(SecretMap::new()),
        Some(Value::String(s)) => serde_json::from_str(&s).map_err(D::Error::custom)?,
        Some(other) => other,
    };
    let Value::Object(map) = value else {
        return Err(D::Error::custom("secrets must be an object of name to value"));
    };

    Ok(map
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect())
}
