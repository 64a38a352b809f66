use serde_json::Value;

use crate::transport::FetchResponse;

/// URL substring identifying the entitlements search endpoint.
pub const DEFAULT_TARGET_PATH: &str = "/i/library/entitlements/search";

/// What the interceptor looks for on the wire.
#[derive(Debug, Clone)]
pub struct SniffConfig {
    target_path: String,
}

impl SniffConfig {
    /// Target path from `FAB_TARGET_PATH`, falling back to the default.
    pub fn from_env() -> Self {
        let target_path = std::env::var("FAB_TARGET_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_TARGET_PATH.to_string());
        SniffConfig { target_path }
    }

    pub fn with_target_path(target_path: impl Into<String>) -> Self {
        SniffConfig {
            target_path: target_path.into(),
        }
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// Entitlement records carried by `resp`: present only for a
    /// successful JSON response from the target endpoint whose `results`
    /// array is non-empty. Everything else, malformed bodies included,
    /// yields `None`; the peek never surfaces an error.
    pub fn extract(&self, resp: &FetchResponse) -> Option<Vec<Value>> {
        if !resp.url.contains(&self.target_path) {
            return None;
        }
        if !resp.is_success() {
            return None;
        }
        if !resp.content_type().unwrap_or("").contains("application/json") {
            return None;
        }
        let parsed: Value = serde_json::from_slice(&resp.body).ok()?;
        match parsed.get("results") {
            Some(Value::Array(results)) if !results.is_empty() => Some(results.clone()),
            _ => None,
        }
    }
}

impl Default for SniffConfig {
    fn default() -> Self {
        SniffConfig::with_target_path(DEFAULT_TARGET_PATH)
    }
}
