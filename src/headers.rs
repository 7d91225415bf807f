use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::{Arc, RwLock};

/// The canonical header set shared by every sub-client.
///
/// Each sub-client holds a clone of this handle rather than a private copy, so
/// an update published here is visible to all of them on their next request.
/// Updates replace whole entries under the write lock; readers take a
/// point-in-time snapshot per request and never observe a partial write.
#[derive(Clone, Debug)]
pub struct SharedHeaders {
    inner: Arc<RwLock<HeaderMap>>,
}

impl SharedHeaders {
    pub(crate) fn new(map: HeaderMap) -> Self {
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Returns a point-in-time copy of the header set.
    pub fn snapshot(&self) -> HeaderMap {
        self.inner.read().expect("header lock poisoned").clone()
    }

    /// Returns the value of a header, if present and valid UTF-8.
    ///
    /// Lookup is case-insensitive, matching HTTP header semantics.
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .expect("header lock poisoned")
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(String::from)
    }

    /// Publishes a new `Authorization` value as a single atomic write.
    pub(crate) fn set_authorization(&self, value: HeaderValue) {
        self.inner
            .write()
            .expect("header lock poisoned")
            .insert(AUTHORIZATION, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_swap_is_visible_to_clones() {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_static("Bearer old"));
        let headers = SharedHeaders::new(map);
        let clone = headers.clone();

        headers.set_authorization(HeaderValue::from_static("Bearer new"));

        assert_eq!(clone.get("Authorization").as_deref(), Some("Bearer new"));
        assert_eq!(
            clone.snapshot().get(AUTHORIZATION).unwrap(),
            "Bearer new"
        );
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert("apikey", HeaderValue::from_static("anon"));
        let headers = SharedHeaders::new(map);

        assert_eq!(headers.get("apiKey").as_deref(), Some("anon"));
        assert_eq!(headers.get("APIKEY").as_deref(), Some("anon"));
    }
}
