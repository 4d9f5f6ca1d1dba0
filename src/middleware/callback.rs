use axum::http::{HeaderMap, Uri};

/// Query parameter the login page reads to send the user back.
pub const CALLBACK_PARAM: &str = "callbackUrl";

/// Path, query and fragment of the request being gated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl RequestTarget {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            fragment: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    /// Request URIs never carry a fragment, so only path and query survive.
    pub fn from_uri(uri: &Uri) -> Self {
        Self {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            fragment: None,
        }
    }

    /// Parses a relative reference such as `/a/b?x=1#top`.
    pub fn parse(raw: &str) -> Self {
        let (rest, fragment) = match raw.split_once('#') {
            Some((r, f)) => (r, Some(f.to_string())),
            None => (raw, None),
        };
        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (rest, None),
        };
        Self {
            path: path.to_string(),
            query,
            fragment,
        }
    }

    /// `path[?query][#fragment]`, with empty parts omitted.
    pub fn relative(&self) -> String {
        let mut out = self.path.clone();
        if let Some(q) = self.query.as_deref().filter(|q| !q.is_empty()) {
            out.push('?');
            out.push_str(q);
        }
        if let Some(f) = self.fragment.as_deref().filter(|f| !f.is_empty()) {
            out.push('#');
            out.push_str(f);
        }
        out
    }
}

/// Builds login/logout redirect targets and the callback URL they carry.
#[derive(Debug, Clone)]
pub struct RedirectBuilder {
    public_origin: Option<String>,
    login_path: String,
    logout_path: String,
}

impl RedirectBuilder {
    pub fn new(
        public_origin: Option<&str>,
        login_path: impl Into<String>,
        logout_path: impl Into<String>,
    ) -> Self {
        let public_origin = public_origin
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty());
        Self {
            public_origin,
            login_path: login_path.into(),
            logout_path: logout_path.into(),
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn logout_path(&self) -> &str {
        &self.logout_path
    }

    /// Configured origin first, then forwarded headers, then `Host` over http.
    pub fn origin(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(origin) = &self.public_origin {
            return Some(origin.clone());
        }

        let host = first_header_value(headers, "x-forwarded-host")
            .filter(|h| is_plausible_host(h))
            .or_else(|| first_header_value(headers, "host").filter(|h| is_plausible_host(h)))?;

        let proto = first_header_value(headers, "x-forwarded-proto")
            .map(|p| p.to_ascii_lowercase())
            .filter(|p| p == "http" || p == "https")
            .unwrap_or_else(|| "http".to_string());

        Some(format!("{}://{}", proto, host))
    }

    /// Absolute URL of the original request when an origin is derivable,
    /// the root-relative reference otherwise.
    pub fn callback_url(&self, target: &RequestTarget, headers: &HeaderMap) -> String {
        let relative = target.relative();
        match self.origin(headers) {
            Some(origin) if relative.starts_with('/') => format!("{}{}", origin, relative),
            Some(origin) => format!("{}/", origin),
            None if relative.starts_with('/') => relative,
            None => "/".to_string(),
        }
    }

    /// `<login>?callbackUrl=<encoded callback>`
    pub fn login_location(&self, target: &RequestTarget, headers: &HeaderMap) -> String {
        let callback = self.callback_url(target, headers);
        let sep = if self.login_path.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            self.login_path,
            sep,
            CALLBACK_PARAM,
            urlencoding::encode(&callback)
        )
    }

    pub fn logout_location(&self) -> String {
        self.logout_path.clone()
    }
}

/// First entry of a possibly comma-separated header, trimmed.
fn first_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_plausible_host(host: &str) -> bool {
    !host
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '/' | '\\' | '@' | '?' | '#'))
}
