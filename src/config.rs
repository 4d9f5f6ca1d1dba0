use std::fmt;

use anyhow::Context;
use zeroize::Zeroizing;

use crate::middleware::token::{TokenFormat, DEFAULT_SESSION_COOKIES};

const SECRET_PLACEHOLDER: &str = "CHANGE_ME_GATE_AUTH_SECRET";

pub struct Config {
    pub port: u16,
    /// Front-end application that passed-through requests are forwarded to.
    pub upstream_url: String,
    /// Shared secret session cookies are encrypted or signed with.
    pub auth_secret: Zeroizing<String>,
    pub token_format: TokenFormat,
    /// Public origin used for callback URLs instead of request headers.
    pub public_origin: Option<String>,
    pub login_path: String,
    pub logout_path: String,
    /// Candidate session cookie names, tried in order.
    pub session_cookies: Vec<String>,
    /// Extra public prefixes on top of the built-in ones.
    pub public_paths: Vec<String>,
    /// App-specific sub-paths the gate never runs on.
    pub excluded_paths: Vec<String>,
    /// Total upstream timeout in seconds.
    pub upstream_timeout_secs: u64,
    /// Forward the session user's id and email to the upstream as headers.
    pub forward_identity: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("upstream_url", &self.upstream_url)
            .field("auth_secret", &"****")
            .field("token_format", &self.token_format)
            .field("public_origin", &self.public_origin)
            .field("login_path", &self.login_path)
            .field("logout_path", &self.logout_path)
            .field("session_cookies", &self.session_cookies)
            .field("public_paths", &self.public_paths)
            .field("excluded_paths", &self.excluded_paths)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("forward_identity", &self.forward_identity)
            .finish()
    }
}

impl Config {
    /// Builds the configuration from any key lookup. `load()` feeds it the
    /// process environment; tests feed it a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let auth_secret = var("GATE_AUTH_SECRET")
            .or_else(|| var("AUTH_SECRET"))
            .or_else(|| var("NEXTAUTH_SECRET"))
            .unwrap_or_else(|| SECRET_PLACEHOLDER.into());

        if auth_secret == SECRET_PLACEHOLDER {
            let env_mode = var("GATE_ENV").or_else(|| var("RUST_ENV")).unwrap_or_default();
            if env_mode == "production" {
                anyhow::bail!(
                    "GATE_AUTH_SECRET is not set. \
                     Set the secret session cookies are protected with before running in production."
                );
            }
            tracing::warn!("GATE_AUTH_SECRET is not set, using insecure placeholder");
        }

        let upstream_url = var("GATE_UPSTREAM_URL").unwrap_or_else(|| "http://127.0.0.1:3000".into());
        validate_http_url(&upstream_url).context("invalid GATE_UPSTREAM_URL")?;

        let public_origin = match var("GATE_PUBLIC_ORIGIN") {
            Some(origin) => {
                validate_http_url(&origin).context("invalid GATE_PUBLIC_ORIGIN")?;
                Some(origin.trim_end_matches('/').to_string())
            }
            None => None,
        };

        let login_path = var("GATE_LOGIN_PATH").unwrap_or_else(|| "/login".into());
        let logout_path = var("GATE_LOGOUT_PATH").unwrap_or_else(|| "/logout".into());
        for (name, path) in [("GATE_LOGIN_PATH", &login_path), ("GATE_LOGOUT_PATH", &logout_path)] {
            if !path.starts_with('/') {
                anyhow::bail!("{} must be root-relative, got '{}'", name, path);
            }
        }

        let token_format = var("GATE_TOKEN_FORMAT")
            .map(|v| v.parse::<TokenFormat>())
            .transpose()
            .context("invalid GATE_TOKEN_FORMAT")?
            .unwrap_or_default();

        let mut session_cookies = split_list(var("GATE_SESSION_COOKIES"));
        if session_cookies.is_empty() {
            session_cookies = DEFAULT_SESSION_COOKIES.iter().map(|s| s.to_string()).collect();
        }

        let upstream_timeout_secs: u64 = var("GATE_UPSTREAM_TIMEOUT")
            .map(|v| v.parse().context("invalid GATE_UPSTREAM_TIMEOUT"))
            .transpose()?
            .unwrap_or(30);
        if upstream_timeout_secs == 0 {
            anyhow::bail!("GATE_UPSTREAM_TIMEOUT must be at least 1 second");
        }

        Ok(Config {
            port: var("GATE_PORT")
                .map(|p| p.parse().context("invalid GATE_PORT"))
                .transpose()?
                .unwrap_or(8080),
            upstream_url: upstream_url.trim_end_matches('/').to_string(),
            auth_secret: Zeroizing::new(auth_secret),
            token_format,
            public_origin,
            login_path,
            logout_path,
            session_cookies,
            public_paths: split_list(var("GATE_PUBLIC_PATHS")),
            excluded_paths: split_list(var("GATE_EXCLUDED_PATHS")),
            upstream_timeout_secs,
            forward_identity: parse_bool(var("GATE_FORWARD_IDENTITY")),
        })
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_lookup(|key| std::env::var(key).ok())
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn parse_bool(raw: Option<String>) -> bool {
    matches!(
        raw.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn validate_http_url(raw: &str) -> anyhow::Result<()> {
    let url = url::Url::parse(raw)?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("expected an http(s) URL, got scheme '{}'", url.scheme());
    }
    if url.host_str().is_none() {
        anyhow::bail!("URL has no host");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.upstream_url, "http://127.0.0.1:3000");
        assert_eq!(cfg.login_path, "/login");
        assert_eq!(cfg.logout_path, "/logout");
        assert_eq!(cfg.session_cookies.len(), DEFAULT_SESSION_COOKIES.len());
        assert!(cfg.public_origin.is_none());
        assert!(!cfg.forward_identity);
        assert_eq!(cfg.upstream_timeout_secs, 30);
        assert_eq!(cfg.token_format, TokenFormat::Jwe);
    }

    #[test]
    fn test_token_format() {
        let cfg = config(&[("GATE_TOKEN_FORMAT", "JWS")]).unwrap();
        assert_eq!(cfg.token_format, TokenFormat::Jws);
        assert!(config(&[("GATE_TOKEN_FORMAT", "paseto")]).is_err());
    }

    #[test]
    fn test_placeholder_secret_refused_in_production() {
        let err = config(&[("GATE_ENV", "production")]).unwrap_err();
        assert!(err.to_string().contains("GATE_AUTH_SECRET"));
    }

    #[test]
    fn test_secret_fallback_chain() {
        let cfg = config(&[("NEXTAUTH_SECRET", "legacy"), ("GATE_ENV", "production")]).unwrap();
        assert_eq!(cfg.auth_secret.as_str(), "legacy");

        let cfg = config(&[("NEXTAUTH_SECRET", "legacy"), ("GATE_AUTH_SECRET", "primary")]).unwrap();
        assert_eq!(cfg.auth_secret.as_str(), "primary");
    }

    #[test]
    fn test_public_origin_is_validated_and_trimmed() {
        let cfg = config(&[("GATE_PUBLIC_ORIGIN", "https://apps.example.org/")]).unwrap();
        assert_eq!(cfg.public_origin.as_deref(), Some("https://apps.example.org"));

        assert!(config(&[("GATE_PUBLIC_ORIGIN", "apps.example.org")]).is_err());
        assert!(config(&[("GATE_PUBLIC_ORIGIN", "ftp://apps.example.org")]).is_err());
    }

    #[test]
    fn test_lists_and_flags() {
        let cfg = config(&[
            ("GATE_SESSION_COOKIES", " a , ,b "),
            ("GATE_PUBLIC_PATHS", "/docs,/about"),
            ("GATE_FORWARD_IDENTITY", "TRUE"),
            ("GATE_PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(cfg.session_cookies, vec!["a", "b"]);
        assert_eq!(cfg.public_paths, vec!["/docs", "/about"]);
        assert!(cfg.forward_identity);
        assert_eq!(cfg.port, 9000);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(config(&[("GATE_PORT", "eighty")]).is_err());
    }

    #[test]
    fn test_upstream_timeout_is_validated() {
        let cfg = config(&[("GATE_UPSTREAM_TIMEOUT", "5")]).unwrap();
        assert_eq!(cfg.upstream_timeout_secs, 5);

        let err = config(&[("GATE_UPSTREAM_TIMEOUT", "30s")]).unwrap_err();
        assert!(err.to_string().contains("GATE_UPSTREAM_TIMEOUT"));
        let err = config(&[("GATE_UPSTREAM_TIMEOUT", "0")]).unwrap_err();
        assert!(err.to_string().contains("GATE_UPSTREAM_TIMEOUT"));
    }

    #[test]
    fn test_relative_login_path_rejected() {
        assert!(config(&[("GATE_LOGIN_PATH", "login")]).is_err());
    }

    #[test]
    fn test_debug_masks_secret() {
        let cfg = config(&[("GATE_AUTH_SECRET", "super-secret-value")]).unwrap();
        let out = format!("{:?}", cfg);
        assert!(!out.contains("super-secret-value"));
        assert!(out.contains("****"));
    }
}
