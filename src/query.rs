//! Client for the relational query service.
//!
//! Requests are expressed through a [`QueryBuilder`] that composes the
//! service's filter operators (`eq.`, `gt.`, ...) and preference headers, then
//! executes against `/rest/v1` with the shared header set.

use crate::{error::Error, headers::SharedHeaders};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Method;
use serde_json::Value;

/// Client for the relational query service.
#[derive(Clone)]
pub struct QueryClient {
    http_client: reqwest::Client,
    base_url: String,
    headers: SharedHeaders,
    schema: String,
}

impl QueryClient {
    pub(crate) fn new(
        http_client: reqwest::Client,
        base_url: String,
        headers: SharedHeaders,
        schema: String,
    ) -> Self {
        Self {
            http_client,
            base_url,
            headers,
            schema,
        }
    }

    /// Returns a snapshot of the headers this client sends.
    pub fn headers(&self) -> HeaderMap {
        self.headers.snapshot()
    }

    /// Starts a request against a table or view.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(
            self.http_client.clone(),
            format!("{}/{}", self.base_url, table),
            self.headers.clone(),
            self.schema.clone(),
        )
    }

    /// Calls a stored procedure.
    pub async fn rpc(&self, function: &str, params: Value) -> Result<Value, Error> {
        let url = format!("{}/rpc/{}", self.base_url, function);
        let res = self
            .http_client
            .post(&url)
            .headers(self.headers.snapshot())
            .header("Content-Profile", self.schema.as_str())
            .json(&params)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }
        parse_body(res).await
    }
}

/// Builder for one table request.
pub struct QueryBuilder {
    http_client: reqwest::Client,
    url: String,
    headers: SharedHeaders,
    schema: String,
    method: Method,
    query: Vec<(String, String)>,
    prefer: Vec<&'static str>,
    body: Option<Value>,
    single: bool,
}

impl QueryBuilder {
    fn new(
        http_client: reqwest::Client,
        url: String,
        headers: SharedHeaders,
        schema: String,
    ) -> Self {
        Self {
            http_client,
            url,
            headers,
            schema,
            method: Method::GET,
            query: Vec::new(),
            prefer: Vec::new(),
            body: None,
            single: false,
        }
    }

    /// Reads rows, returning the given columns.
    pub fn select(mut self, columns: &str) -> Self {
        self.method = Method::GET;
        self.query.push(("select".to_string(), columns.to_string()));
        self
    }

    /// Inserts one row or an array of rows.
    pub fn insert(mut self, values: Value) -> Self {
        self.method = Method::POST;
        self.prefer.push("return=representation");
        self.body = Some(values);
        self
    }

    /// Inserts rows, merging with existing rows on conflict.
    pub fn upsert(mut self, values: Value) -> Self {
        self.method = Method::POST;
        self.prefer.push("return=representation");
        self.prefer.push("resolution=merge-duplicates");
        self.body = Some(values);
        self
    }

    /// Updates rows matched by the applied filters.
    pub fn update(mut self, values: Value) -> Self {
        self.method = Method::PATCH;
        self.prefer.push("return=representation");
        self.body = Some(values);
        self
    }

    /// Deletes rows matched by the applied filters.
    pub fn delete(mut self) -> Self {
        self.method = Method::DELETE;
        self.prefer.push("return=representation");
        self
    }

    fn filter(mut self, column: &str, op: &str, value: &str) -> Self {
        self.query
            .push((column.to_string(), format!("{op}.{value}")));
        self
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn neq(self, column: &str, value: &str) -> Self {
        self.filter(column, "neq", value)
    }

    pub fn gt(self, column: &str, value: &str) -> Self {
        self.filter(column, "gt", value)
    }

    pub fn gte(self, column: &str, value: &str) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lt(self, column: &str, value: &str) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn lte(self, column: &str, value: &str) -> Self {
        self.filter(column, "lte", value)
    }

    pub fn like(self, column: &str, pattern: &str) -> Self {
        self.filter(column, "like", pattern)
    }

    /// Matches `null`, `true`, or `false`.
    pub fn is(self, column: &str, value: &str) -> Self {
        self.filter(column, "is", value)
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.query
            .push(("order".to_string(), format!("{column}.{direction}")));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.query.push(("limit".to_string(), count.to_string()));
        self
    }

    pub fn offset(mut self, count: usize) -> Self {
        self.query.push(("offset".to_string(), count.to_string()));
        self
    }

    /// Expects exactly one row and returns it as an object instead of an
    /// array.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Sends the request and returns the response rows as JSON.
    pub async fn execute(self) -> Result<Value, Error> {
        // Reads route the schema via Accept-Profile, writes via
        // Content-Profile.
        let profile_header = if self.method == Method::GET {
            "Accept-Profile"
        } else {
            "Content-Profile"
        };

        let mut request = self
            .http_client
            .request(self.method, &self.url)
            .headers(self.headers.snapshot())
            .query(&self.query)
            .header(profile_header, self.schema.as_str());

        if self.single {
            request = request.header(
                ACCEPT,
                HeaderValue::from_static("application/vnd.pgrst.object+json"),
            );
        }
        if !self.prefer.is_empty() {
            request = request.header("Prefer", self.prefer.join(","));
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        let res = request.send().await?;
        if !res.status().is_success() {
            return Err(Error::Http(res.status()));
        }
        parse_body(res).await
    }
}

async fn parse_body(res: reqwest::Response) -> Result<Value, Error> {
    // Minimal-preference responses have no body.
    let text = res.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;

    fn builder() -> QueryBuilder {
        QueryBuilder::new(
            reqwest::Client::new(),
            "http://localhost/rest/v1/todos".to_string(),
            SharedHeaders::new(HeaderMap::new()),
            "public".to_string(),
        )
    }

    #[test]
    fn filters_compose_query_operators() {
        let b = builder()
            .select("id,name")
            .eq("status", "done")
            .gt("id", "10")
            .order("id", false)
            .limit(5);

        assert_eq!(b.method, Method::GET);
        assert!(b
            .query
            .contains(&("select".to_string(), "id,name".to_string())));
        assert!(b
            .query
            .contains(&("status".to_string(), "eq.done".to_string())));
        assert!(b.query.contains(&("id".to_string(), "gt.10".to_string())));
        assert!(b.query.contains(&("order".to_string(), "id.desc".to_string())));
        assert!(b.query.contains(&("limit".to_string(), "5".to_string())));
    }

    #[test]
    fn upsert_requests_merge_duplicates() {
        let b = builder().upsert(serde_json::json!({"id": 1}));
        assert_eq!(b.method, Method::POST);
        assert!(b.prefer.contains(&"resolution=merge-duplicates"));
        assert!(b.body.is_some());
    }

    #[test]
    fn delete_matches_filters_only() {
        let b = builder().delete().eq("id", "1");
        assert_eq!(b.method, Method::DELETE);
        assert!(b.body.is_none());
        assert!(b.query.contains(&("id".to_string(), "eq.1".to_string())));
    }
}
