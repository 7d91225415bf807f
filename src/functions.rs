//! Client for the edge functions service.

use crate::{error::Error, headers::SharedHeaders};
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Client for the edge functions service.
#[derive(Clone)]
pub struct FunctionsClient {
    http_client: reqwest::Client,
    base_url: String,
    headers: SharedHeaders,
}

impl FunctionsClient {
    pub(crate) fn new(
        http_client: reqwest::Client,
        base_url: String,
        headers: SharedHeaders,
    ) -> Self {
        Self {
            http_client,
            base_url,
            headers,
        }
    }

    /// Returns a snapshot of the headers this client sends.
    pub fn headers(&self) -> HeaderMap {
        self.headers.snapshot()
    }

    /// Invokes a function by name with a JSON body and returns its JSON
    /// response. Non-success statuses surface as [`Error::Http`].
    pub async fn invoke(&self, function: &str, body: Value) -> Result<Value, Error> {
        let url = format!("{}/{}", self.base_url, function);
        let res = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }

        // Functions may legitimately return nothing.
        let text = res.text().await?;
        if text.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}
