//! Endpoint URL resolution.
//!
//! Precedence:
//! 1. An explicit `endpoint.url` setting
//! 2. `endpoint.dev_url` when the host environment is a loopback name
//! 3. Same-origin `ws://` / `wss://` (secure origins get `wss`) plus
//!    `endpoint.path`
//!
//! The access token is appended as a query parameter in every case.

use relay_core::errors::TransportError;
use relay_settings::EndpointSettings;
use url::Url;

const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1", "[::1]"];

/// Where the client is running, used to derive a same-origin endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    /// The hosting origin is served over TLS.
    pub secure: bool,
    /// Host name (IPv6 literals in brackets).
    pub hostname: String,
    /// Explicit port, if the origin carries one.
    pub port: Option<u16>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::local()
    }
}

impl Environment {
    /// A local development host.
    pub fn local() -> Self {
        Self {
            secure: false,
            hostname: "localhost".to_string(),
            port: None,
        }
    }

    /// Derive from an origin such as `https://app.example.com:8443`.
    pub fn from_origin(origin: &str) -> Result<Self, TransportError> {
        let url = Url::parse(origin).map_err(|e| TransportError::InvalidUrl(format!("{origin}: {e}")))?;
        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransportError::InvalidUrl(format!("{origin}: missing host")))?
            .to_string();
        Ok(Self {
            secure: matches!(url.scheme(), "https" | "wss"),
            hostname,
            port: url.port(),
        })
    }

    /// Whether the host is a loopback development name.
    pub fn is_local_dev(&self) -> bool {
        LOCAL_HOSTS.contains(&self.hostname.as_str())
    }
}

/// Resolve the endpoint without credentials.
pub fn resolve_base_url(
    settings: &EndpointSettings,
    environment: &Environment,
) -> Result<Url, TransportError> {
    if let Some(explicit) = settings.url.as_deref().filter(|u| !u.is_empty()) {
        return parse_ws_url(explicit);
    }
    if environment.is_local_dev() {
        return parse_ws_url(&settings.dev_url);
    }
    if environment.hostname.is_empty() {
        return Err(TransportError::InvalidUrl("environment has no hostname".into()));
    }

    let scheme = if environment.secure { "wss" } else { "ws" };
    let authority = match environment.port {
        Some(port) => format!("{}:{port}", environment.hostname),
        None => environment.hostname.clone(),
    };
    let path = if settings.path.starts_with('/') {
        settings.path.clone()
    } else {
        format!("/{}", settings.path)
    };
    parse_ws_url(&format!("{scheme}://{authority}{path}"))
}

/// Resolve the endpoint and attach the access token.
pub fn connect_url(
    settings: &EndpointSettings,
    environment: &Environment,
    token: &str,
) -> Result<Url, TransportError> {
    let mut url = resolve_base_url(settings, environment)?;
    let _ = url
        .query_pairs_mut()
        .append_pair(&settings.token_param, token);
    Ok(url)
}

fn parse_ws_url(raw: &str) -> Result<Url, TransportError> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::InvalidUrl(format!(
            "{raw}: unsupported scheme {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn production(secure: bool) -> Environment {
        Environment {
            secure,
            hostname: "app.example.com".into(),
            port: None,
        }
    }

    #[test]
    fn explicit_url_wins() {
        let settings = EndpointSettings {
            url: Some("wss://override.example.com/rt".into()),
            ..Default::default()
        };
        let url = resolve_base_url(&settings, &Environment::local()).unwrap();
        assert_eq!(url.as_str(), "wss://override.example.com/rt");
    }

    #[test]
    fn localhost_uses_dev_url() {
        let url = resolve_base_url(&EndpointSettings::default(), &Environment::local()).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws");
    }

    #[test]
    fn loopback_addresses_are_local() {
        for host in ["127.0.0.1", "::1", "[::1]"] {
            let env = Environment {
                secure: false,
                hostname: host.into(),
                port: Some(3000),
            };
            assert!(env.is_local_dev(), "{host} not treated as local");
        }
    }

    #[test]
    fn secure_origin_uses_wss() {
        let url = resolve_base_url(&EndpointSettings::default(), &production(true)).unwrap();
        assert_eq!(url.as_str(), "wss://app.example.com/ws");
    }

    #[test]
    fn insecure_origin_uses_ws_with_port() {
        let env = Environment {
            port: Some(8080),
            ..production(false)
        };
        let url = resolve_base_url(&EndpointSettings::default(), &env).unwrap();
        assert_eq!(url.as_str(), "ws://app.example.com:8080/ws");
    }

    #[test]
    fn relative_path_gets_leading_slash() {
        let settings = EndpointSettings {
            path: "realtime".into(),
            ..Default::default()
        };
        let url = resolve_base_url(&settings, &production(true)).unwrap();
        assert_eq!(url.path(), "/realtime");
    }

    #[test]
    fn token_is_query_encoded() {
        let url = connect_url(&EndpointSettings::default(), &production(true), "a b&c").unwrap();
        assert_eq!(url.query(), Some("token=a+b%26c"));
    }

    #[test]
    fn custom_token_param() {
        let settings = EndpointSettings {
            token_param: "access_token".into(),
            ..Default::default()
        };
        let url = connect_url(&settings, &Environment::local(), "xyz").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/ws?access_token=xyz");
    }

    #[test]
    fn http_scheme_rejected() {
        let settings = EndpointSettings {
            url: Some("https://example.com/ws".into()),
            ..Default::default()
        };
        assert_matches!(
            resolve_base_url(&settings, &Environment::local()),
            Err(TransportError::InvalidUrl(_))
        );
    }

    #[test]
    fn empty_hostname_rejected() {
        let env = Environment {
            secure: true,
            hostname: String::new(),
            port: None,
        };
        assert_matches!(
            resolve_base_url(&EndpointSettings::default(), &env),
            Err(TransportError::InvalidUrl(_))
        );
    }

    #[test]
    fn from_origin_parses_https() {
        let env = Environment::from_origin("https://app.example.com:8443").unwrap();
        assert!(env.secure);
        assert_eq!(env.hostname, "app.example.com");
        assert_eq!(env.port, Some(8443));
    }

    #[test]
    fn from_origin_rejects_garbage() {
        assert_matches!(
            Environment::from_origin("not a url"),
            Err(TransportError::InvalidUrl(_))
        );
    }
}
