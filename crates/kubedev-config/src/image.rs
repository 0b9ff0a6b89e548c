//! Image metadata used to resolve the container's entrypoint

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Details extracted from the container image by the caller
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageDetails {
    /// Image ID (digest)
    pub id: String,
    pub config: ImageConfig,
}

/// The `Config` section of an image
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ImageConfig {
    pub user: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
}

impl ImageDetails {
    /// Load image details from a JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        crate::devcontainer::read_json(path)
    }
}
