//! `key=value` string parsing for node selectors and resource quantities

use crate::{ConfigError, Result};
use std::collections::BTreeMap;

/// Parse `key=value[,key=value...]` into a map.
///
/// Empty segments are ignored; a segment without `=` or with an empty key is
/// an error.
pub fn parse_labels(s: &str) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                labels.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "invalid label '{}', expected key=value",
                    part
                )))
            }
        }
    }

    Ok(labels)
}

/// Resource requests and limits keyed by resource name (`cpu`, `memory`, ...)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceQuantities {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl ResourceQuantities {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }
}

/// Parse `requests.cpu=1,limits.memory=2Gi,...`.
///
/// Malformed entries are skipped with a warning rather than failing the run.
pub fn parse_resources(s: &str) -> ResourceQuantities {
    let mut resources = ResourceQuantities::default();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            tracing::warn!("Ignoring resource '{}': expected key=value", part);
            continue;
        };

        let (bucket, name) = match key.trim().split_once('.') {
            Some(("requests", name)) => (&mut resources.requests, name),
            Some(("limits", name)) => (&mut resources.limits, name),
            _ => {
                tracing::warn!(
                    "Ignoring resource '{}': key must start with requests. or limits.",
                    part
                );
                continue;
            }
        };

        if name.is_empty() || value.trim().is_empty() {
            tracing::warn!("Ignoring resource '{}': empty name or quantity", part);
            continue;
        }

        bucket.insert(name.to_string(), value.trim().to_string());
    }

    resources
}
