// Request fingerprinting.
// Builds stable cache/dedup keys from an endpoint and its query parameters.

/// Flat query parameter mapping. Entries with no value are kept so callers can
/// pass optional fields straight through; they are dropped on serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, Option<String>)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter with a value.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), Some(value.to_string())));
        self
    }

    /// Add a parameter that may be absent.
    pub fn with_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.0.push((key.into(), value.map(|v| v.to_string())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.present().is_empty()
    }

    /// Parameters that carry a value, sorted by key name.
    pub fn present(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .0
            .iter()
            .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)))
            .collect();
        // Stable sort keeps repeated keys in insertion order.
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

/// Build a deterministic key for a request.
///
/// The same logical request always yields the same key regardless of the
/// order parameters were added in.
pub fn build_key(endpoint: &str, params: Option<&QueryParams>) -> String {
    let query = params
        .map(|p| {
            p.present()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        })
        .unwrap_or_default();

    if query.is_empty() {
        endpoint.to_string()
    } else {
        format!("{}?{}", endpoint, query)
    }
}
