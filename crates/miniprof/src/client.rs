use anyhow::Context;
use miniprof_core::model::record::ResultSet;

/// HTTP client for the results endpoint of a running `miniprof run`.
pub struct ResultsClient {
    http: reqwest::Client,
    results_url: String,
}

impl ResultsClient {
    pub fn new(addr: &str, base_path: &str) -> Self {
        let addr = addr.trim_end_matches('/');
        let origin = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        Self {
            http: reqwest::Client::new(),
            results_url: format!("{origin}{base_path}results"),
        }
    }

    pub async fn fetch(&self, ids: &str) -> anyhow::Result<ResultSet> {
        let response = self
            .http
            .get(&self.results_url)
            .query(&[("ids", ids)])
            .send()
            .await
            .with_context(|| format!("connect {}", self.results_url))?;

        if !response.status().is_success() {
            anyhow::bail!("results request failed with status {}", response.status());
        }
        response
            .json::<ResultSet>()
            .await
            .context("decode results response")
    }
}
