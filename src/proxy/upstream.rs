//! HTTP client for forwarding passed-through requests to the front-end
//! application. No retries: a forwarded request may not be idempotent.

use std::time::Duration;

use crate::errors::AppError;

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(32)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            // redirects from the application belong to the browser
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `path_and_query` must be root-relative.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    pub async fn forward(
        &self,
        method: reqwest::Method,
        path_and_query: &str,
        headers: reqwest::header::HeaderMap,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, AppError> {
        let url = self.url_for(path_and_query);
        let resp = self
            .client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_without_double_slash() {
        let c = UpstreamClient::new("http://127.0.0.1:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.base_url(), "http://127.0.0.1:3000");
        assert_eq!(c.url_for("/dashboard?tab=2"), "http://127.0.0.1:3000/dashboard?tab=2");
    }
}
