use anyhow::Context;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::middleware::callback::RequestTarget;
use crate::middleware::gate::Gate;

/// Access Gate — session-cookie authentication gate for the Applications Center
#[derive(Parser)]
#[command(name = "access-gate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gate in front of the upstream application
    Serve {
        /// Port to bind (defaults to GATE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Evaluate a single request against the gate and print the decision
    Check {
        /// Request target, e.g. `/dashboard?tab=2`
        target: String,
        /// Raw Cookie header value
        #[arg(long)]
        cookie: Option<String>,
        /// Host header
        #[arg(long)]
        host: Option<String>,
        /// X-Forwarded-Host header
        #[arg(long)]
        forwarded_host: Option<String>,
        /// X-Forwarded-Proto header
        #[arg(long)]
        forwarded_proto: Option<String>,
    },
}

/// Evaluates `target` against a gate built from `cfg` and returns the
/// decision as pretty-printed JSON.
pub async fn run_check(cfg: &Config, target: &str, headers: &HeaderMap) -> anyhow::Result<String> {
    let gate = Gate::from_config(cfg);
    let target = RequestTarget::parse(target);
    let decision = gate.evaluate(&target, headers).await;
    Ok(serde_json::to_string_pretty(&decision)?)
}

/// Request headers for `check` from the optional flag values.
pub fn check_headers(pairs: &[(&'static str, Option<String>)]) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let Some(v) = value {
            let v = HeaderValue::from_str(v).with_context(|| format!("invalid {} header", name))?;
            headers.insert(HeaderName::from_static(*name), v);
        }
    }
    Ok(headers)
}
