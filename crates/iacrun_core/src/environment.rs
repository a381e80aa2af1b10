//! Per-request tool environment.

use std::collections::BTreeMap;

/// Region variable consulted by the AWS provider.
pub const REGION_VAR: &str = "AWS_REGION";

/// Region used when neither the request nor the ambient environment has one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Immutable environment handed to every invocation of one request.
///
/// Built by overlaying caller overrides onto a snapshot of the ambient
/// environment. The server process environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolEnvironment {
    vars: BTreeMap<String, String>,
}

impl ToolEnvironment {
    /// Overlay `overrides` onto `ambient`, then apply the automation flag and
    /// fall back to `region` for [`REGION_VAR`] when nothing else set it.
    pub fn build(
        ambient: &BTreeMap<String, String>,
        overrides: &BTreeMap<String, String>,
        region: Option<&str>,
    ) -> Self {
        let mut vars = ambient.clone();
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.insert("TF_IN_AUTOMATION".to_string(), "1".to_string());

        let has_region = vars.get(REGION_VAR).is_some_and(|v| !v.is_empty());
        if !has_region {
            if let Some(region) = region.filter(|r| !r.is_empty()) {
                vars.insert(REGION_VAR.to_string(), region.to_string());
            }
        }

        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn into_vars(self) -> BTreeMap<String, String> {
        self.vars
    }
}

/// Snapshot the current process environment.
pub fn ambient_snapshot() -> BTreeMap<String, String> {
    std::env::vars().collect()
}
