/// Prefixes that are public together with every sub-path below them.
pub const PUBLIC_PREFIXES: &[&str] = &["/login", "/logout", "/api/auth"];

/// Roots whose descendants are always public.
const PUBLIC_ROOTS: &[&str] = &["/api/auth/", "/_next/", "/static/"];

/// Decides whether a request path needs an authenticated session.
#[derive(Debug, Clone)]
pub struct PathClassifier {
    prefixes: Vec<String>,
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self {
            prefixes: PUBLIC_PREFIXES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl PathClassifier {
    /// Built-in prefixes plus `extra`. Any query or fragment is cut off,
    /// then empty entries and trailing slashes are normalised away;
    /// duplicates are dropped.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classifier = Self::default();
        for p in extra {
            let p = p.as_ref();
            let p = p[..p.find(['?', '#']).unwrap_or(p.len())]
                .trim()
                .trim_end_matches('/');
            if p.is_empty() || !p.starts_with('/') {
                continue;
            }
            if !classifier.prefixes.iter().any(|existing| existing == p) {
                classifier.prefixes.push(p.to_string());
            }
        }
        classifier
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Any match exempts the path from authentication.
    pub fn is_public(&self, path: &str) -> bool {
        if self.prefixes.iter().any(|p| matches_prefix(path, p)) {
            return true;
        }
        if PUBLIC_ROOTS.iter().any(|root| path.starts_with(root)) {
            return true;
        }
        // anything with a dot is treated as a static asset
        path.contains('.')
    }
}

/// `path` equals `prefix` or sits below it (`/login` matches `/login/sso`
/// but not `/loginx`).
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
