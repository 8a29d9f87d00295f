//! resolves a user's chat id to the pots they own
//!
//! `GET {base_url}{chat_id}` answers `{"pot_ids": ["a1", "b2"]}`. called once
//! per login, never per cycle.

use anyhow::{ensure, Context};
use serde_json::Value;
use std::time::Duration;

use crate::config::IdentityConfig;
use crate::domain::DeviceId;
use crate::error::json_type;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("please enter a chat id")]
    MissingUser,
    #[error("chat id {0} was rejected by the identity service")]
    AuthFailure(String),
    #[error("no pots found for chat id {0}")]
    NotFound(String),
    #[error("invalid response format from identity service: {0}")]
    InvalidResponse(String),
    #[error("could not reach identity service: {0}")]
    Network(#[from] reqwest::Error),
}

pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = base_url.into();
        ensure!(!base_url.is_empty(), "identity base url is empty");
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build identity http client")?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(identity: &IdentityConfig) -> anyhow::Result<Self> {
        Self::new(identity.base_url.clone(), identity.timeout())
    }

    pub async fn resolve(&self, user: &str) -> Result<Vec<DeviceId>, IdentityError> {
        let user = user.trim();
        if user.is_empty() {
            return Err(IdentityError::MissingUser);
        }

        let url = format!("{}{}", self.base_url, user);
        tracing::info!(%url, "resolving pots for chat id");

        let response = self.client.get(&url).send().await?;
        match response.status().as_u16() {
            401 | 403 => return Err(IdentityError::AuthFailure(user.to_string())),
            404 => return Err(IdentityError::NotFound(user.to_string())),
            _ => {}
        }

        let body: Value = response.error_for_status()?.json().await?;
        let devices = pot_ids(user, &body)?;
        tracing::info!(user, pots = devices.len(), "login resolved");
        Ok(devices)
    }
}

/// pull the pot ids out of a lookup response
///
/// ids may be strings or numbers; anything else makes the response invalid.
pub fn pot_ids(user: &str, body: &Value) -> Result<Vec<DeviceId>, IdentityError> {
    let ids = body
        .get("pot_ids")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            IdentityError::InvalidResponse(format!(
                "expected an object with a pot_ids array, got {}",
                json_type(body)
            ))
        })?;

    let devices = ids
        .iter()
        .map(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Ok(DeviceId::new(s.trim())),
            Value::Number(n) => Ok(DeviceId::new(n.to_string())),
            other => Err(IdentityError::InvalidResponse(format!("unusable pot id {other}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if devices.is_empty() {
        tracing::warn!(user, "no pots found for chat id");
        return Err(IdentityError::NotFound(user.to_string()));
    }
    Ok(devices)
}

/// ids given directly on the command line, trimmed, blanks dropped
pub fn explicit_ids<S: AsRef<str>>(ids: &[S]) -> Vec<DeviceId> {
    ids.iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .map(DeviceId::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    #[test]
    fn reads_string_and_numeric_ids() {
        let devices = pot_ids("42", &json!({"pot_ids": ["a1", 7]})).unwrap();
        assert_eq!(devices, vec![DeviceId::from("a1"), DeviceId::from("7")]);
    }

    #[test]
    fn explicit_ids_drop_blanks() {
        let devices = explicit_ids(&[" pot-1 ", " ", "", "pot-2"]);
        assert_eq!(devices, vec![DeviceId::from("pot-1"), DeviceId::from("pot-2")]);
        assert!(explicit_ids(&["  "]).is_empty());
    }

    #[test]
    fn empty_list_is_not_found() {
        assert!(matches!(
            pot_ids("42", &json!({"pot_ids": []})),
            Err(IdentityError::NotFound(u)) if u == "42"
        ));
    }

    #[test]
    fn wrong_shape_is_invalid() {
        assert!(matches!(pot_ids("42", &json!(["a1"])), Err(IdentityError::InvalidResponse(_))));
        assert!(matches!(
            pot_ids("42", &json!({"pot_ids": "a1"})),
            Err(IdentityError::InvalidResponse(_))
        ));
        assert!(matches!(
            pot_ids("42", &json!({"pot_ids": [null]})),
            Err(IdentityError::InvalidResponse(_))
        ));
    }

    async fn spawn_identity() -> String {
        let app = Router::new().route(
            "/find/user/:chat",
            get(|Path(chat): Path<String>| async move {
                match chat.as_str() {
                    "banned" => (StatusCode::FORBIDDEN, Json(json!({}))),
                    "ghost" => (StatusCode::NOT_FOUND, Json(json!({}))),
                    _ => (StatusCode::OK, Json(json!({"pot_ids": ["p1", "p2"]}))),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/find/user/")
    }

    #[tokio::test]
    async fn resolves_over_http() {
        let client = IdentityClient::new(spawn_identity().await, Duration::from_secs(5)).unwrap();

        let devices = client.resolve(" 12345 ").await.unwrap();
        assert_eq!(devices, vec![DeviceId::from("p1"), DeviceId::from("p2")]);

        assert!(matches!(client.resolve("banned").await, Err(IdentityError::AuthFailure(_))));
        assert!(matches!(client.resolve("ghost").await, Err(IdentityError::NotFound(_))));
        assert!(matches!(client.resolve("  ").await, Err(IdentityError::MissingUser)));
    }
}
