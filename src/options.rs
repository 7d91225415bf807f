use reqwest::header::{HeaderMap, HeaderValue, IntoHeaderName};

/// Configuration for [`Client::with_options`](crate::Client::with_options).
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Extra headers merged over the computed defaults. The overlay wins on
    /// conflicting names, except `apiKey`, which is always derived from the
    /// credentials.
    pub headers: HeaderMap,
    /// The schema queries run against.
    pub schema: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            schema: "public".to_string(),
        }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header to the overlay.
    pub fn header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Selects the schema queries run against.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::AUTHORIZATION;

    #[test]
    fn defaults_to_public_schema() {
        let options = ClientOptions::default();
        assert_eq!(options.schema, "public");
        assert!(options.headers.is_empty());
    }

    #[test]
    fn builder_collects_headers() {
        let options = ClientOptions::new()
            .header(AUTHORIZATION, HeaderValue::from_static("Bearer jwt"))
            .schema("analytics");
        assert_eq!(options.headers.get(AUTHORIZATION).unwrap(), "Bearer jwt");
        assert_eq!(options.schema, "analytics");
    }
}
