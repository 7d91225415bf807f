//! Client for the object storage service.

use crate::{error::Error, headers::SharedHeaders};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

/// Client for the object storage service.
#[derive(Clone)]
pub struct StorageClient {
    http_client: reqwest::Client,
    base_url: String,
    headers: SharedHeaders,
}

impl StorageClient {
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

    /// Scopes object operations to one bucket.
    pub fn from(&self, bucket: &str) -> BucketClient {
        BucketClient {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            bucket: bucket.to_string(),
            headers: self.headers.clone(),
        }
    }
}

/// Object metadata returned by [`BucketClient::list`].
#[derive(Clone, Debug, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Object operations scoped to one bucket.
#[derive(Clone)]
pub struct BucketClient {
    http_client: reqwest::Client,
    base_url: String,
    bucket: String,
    headers: SharedHeaders,
}

impl BucketClient {
    /// Uploads an object to the given path within the bucket.
    pub async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), Error> {
        let url = format!("{}/object/{}/{}", self.base_url, self.bucket, path);
        let mut request = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .body(data);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let res = request.send().await?;
        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }
        Ok(())
    }

    /// Downloads an object.
    ///
    /// If the object does not exist, `Ok(None)` is returned.
    pub async fn download(&self, path: &str) -> Result<Option<Vec<u8>>, Error> {
        let url = format!("{}/object/{}/{}", self.base_url, self.bucket, path);
        let res = self
            .http_client
            .get(&url)
            .headers(self.headers.snapshot())
            .send()
            .await?;

        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }

        Ok(Some(res.bytes().await?.to_vec()))
    }

    /// Removes the given objects from the bucket.
    pub async fn remove(&self, paths: &[&str]) -> Result<(), Error> {
        let url = format!("{}/object/{}", self.base_url, self.bucket);
        let res = self
            .http_client
            .delete(&url)
            .headers(self.headers.snapshot())
            .json(&serde_json::json!({ "prefixes": paths }))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }
        Ok(())
    }

    /// Lists objects under a prefix.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectInfo>, Error> {
        let url = format!("{}/object/list/{}", self.base_url, self.bucket);
        let res = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .json(&serde_json::json!({ "prefix": prefix.unwrap_or("") }))
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }
        Ok(res.json().await?)
    }
}
