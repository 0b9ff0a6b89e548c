//! Resource naming and ownership labels
//!
//! The persistent volume claim and the pod share one name derived from the
//! workspace labels, so a second `run` for the same workspace finds the same
//! volume and the API server rejects a duplicate create.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Label carrying the workspace id assigned by the workspace manager
pub const WORKSPACE_ID_LABEL: &str = "dev.containers.id";

const NAME_PREFIX: &str = "devpod-";

/// Kubernetes object names are DNS-1123 labels
const MAX_NAME_LEN: usize = 63;

/// Derive the resource name for a workspace from its `key=value` labels.
///
/// Uses the workspace id label when present, otherwise a hash of the sorted
/// label set. The same set of labels always yields the same name, regardless
/// of order.
pub fn derive_identity(labels: &[String]) -> String {
    let from_label = labels
        .iter()
        .filter_map(|label| label.split_once('='))
        .find(|(key, _)| *key == WORKSPACE_ID_LABEL)
        .map(|(_, value)| sanitize(value))
        .filter(|value| !value.is_empty());

    let suffix = from_label.unwrap_or_else(|| label_hash(labels));
    let mut name = format!("{}{}", NAME_PREFIX, suffix);
    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches('-').to_string()
}

fn label_hash(labels: &[String]) -> String {
    let mut sorted: Vec<&str> = labels.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let digest = Sha256::digest(sorted.join("\n").as_bytes());
    hex::encode(digest)[..20].to_string()
}

/// Lowercase, replace anything outside `[a-z0-9-]` with `-`, trim dashes
fn sanitize(value: &str) -> String {
    let mapped: String = value
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    mapped.trim_matches('-').to_string()
}

/// Labels applied to every resource the driver creates, so external tooling
/// can enumerate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLabels(BTreeMap<String, String>);

impl ResourceLabels {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }
}

impl Default for ResourceLabels {
    fn default() -> Self {
        Self(BTreeMap::from([(
            "devpod.sh/created".to_string(),
            "true".to_string(),
        )]))
    }
}
