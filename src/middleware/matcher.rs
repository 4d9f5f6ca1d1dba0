use once_cell::sync::Lazy;
use regex::Regex;

/// Paths the gate never runs on. Each entry excludes itself and everything
/// below it.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "/api",
    "/_next/static",
    "/_next/image",
    "/favicon.ico",
    "/health",
    "/healthz",
    "/readyz",
    "/metrics",
];

/// Last path segment carries a file extension.
static FILE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[^/]*$").expect("static regex is valid"));

/// Decides whether the gate runs for a path at all.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    excluded: Regex,
}

impl RouteMatcher {
    /// Built-in exclusions plus app-specific sub-paths.
    pub fn new<I, S>(extra: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut prefixes: Vec<String> = EXCLUDED_PREFIXES.iter().map(|p| p.to_string()).collect();
        for p in extra {
            let p = p.as_ref().trim().trim_end_matches('/');
            if p.starts_with('/') && p.len() > 1 {
                prefixes.push(p.to_string());
            }
        }

        let alternation = prefixes
            .iter()
            .map(|p| regex::escape(p))
            .collect::<Vec<_>>()
            .join("|");
        let excluded = Regex::new(&format!("^(?:{})(?:/|$)", alternation))?;
        Ok(Self { excluded })
    }

    /// True when the gate should evaluate this path.
    pub fn applies(&self, path: &str) -> bool {
        !(self.excluded.is_match(path) || FILE_EXTENSION.is_match(path))
    }
}

impl Default for RouteMatcher {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>()).expect("built-in exclusions form a valid regex")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_exclusions() {
        let m = RouteMatcher::default();
        for path in [
            "/api",
            "/api/users",
            "/_next/static/chunks/main.js",
            "/_next/image",
            "/favicon.ico",
            "/health",
            "/healthz",
            "/readyz",
            "/metrics",
        ] {
            assert!(!m.applies(path), "{} should be excluded", path);
        }
    }

    #[test]
    fn test_exclusions_respect_segment_boundary() {
        let m = RouteMatcher::default();
        assert!(m.applies("/apiary"));
        assert!(m.applies("/healthcheck-report"));
        assert!(m.applies("/_next/data/x"));
    }

    #[test]
    fn test_file_extensions_excluded() {
        let m = RouteMatcher::default();
        assert!(!m.applies("/robots.txt"));
        assert!(!m.applies("/assets/logo.svg"));
        assert!(m.applies("/v1.2/dashboard"));
    }

    #[test]
    fn test_pages_are_gated() {
        let m = RouteMatcher::default();
        assert!(m.applies("/"));
        assert!(m.applies("/dashboard"));
        assert!(m.applies("/login"));
    }

    #[test]
    fn test_app_specific_sub_paths() {
        let m = RouteMatcher::new(["/igrp/", "/embed", "nope", "/"]).unwrap();
        assert!(!m.applies("/igrp"));
        assert!(!m.applies("/igrp/runtime"));
        assert!(!m.applies("/embed/frame"));
        assert!(m.applies("/nope"));
        assert!(m.applies("/dashboard"));
    }
}
