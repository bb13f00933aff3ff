//! Endpoint resolution settings.

use serde::{Deserialize, Serialize};

/// How the WebSocket endpoint URL is derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointSettings {
    /// Explicit endpoint; when set, environment detection is skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Endpoint used when the environment is a local development host.
    pub dev_url: String,
    /// Path appended to the same-origin production endpoint.
    pub path: String,
    /// Query parameter carrying the access token.
    pub token_param: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            url: None,
            dev_url: "ws://localhost:8000/ws".to_string(),
            path: "/ws".to_string(),
            token_param: "token".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = EndpointSettings::default();
        assert!(settings.url.is_none());
        assert_eq!(settings.dev_url, "ws://localhost:8000/ws");
    }

    #[test]
    fn url_omitted_when_none() {
        let value = serde_json::to_value(EndpointSettings::default()).unwrap();
        assert!(value.get("url").is_none());
    }

    #[test]
    fn explicit_url_parses() {
        let settings: EndpointSettings =
            serde_json::from_str(r#"{"url":"wss://example.com/rt"}"#).unwrap();
        assert_eq!(settings.url.as_deref(), Some("wss://example.com/rt"));
        assert_eq!(settings.path, "/ws");
    }
}
