//! devcontainer.json and merged configuration
//!
//! Only the fields the Kubernetes driver consumes are modelled explicitly;
//! everything else is carried through `extra` so a snapshot written today can
//! still be read after fields are added.

use crate::{ConfigError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Parsed devcontainer.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevContainerConfig {
    /// Name of the dev container
    pub name: Option<String>,

    /// Docker image to use
    pub image: Option<String>,

    /// Environment variables for the container
    pub container_env: Option<HashMap<String, String>>,

    /// User to run as in the container
    pub remote_user: Option<String>,

    /// Container user
    pub container_user: Option<String>,

    /// Working directory inside the container
    pub workspace_folder: Option<String>,

    /// Workspace mount override
    pub workspace_mount: Option<String>,

    /// Mounts to add to the container
    pub mounts: Option<Vec<Mount>>,

    /// Run container in privileged mode
    pub privileged: Option<bool>,

    /// Linux capabilities to add
    pub cap_add: Option<Vec<String>>,

    /// Whether to override the default command
    pub override_command: Option<bool>,

    /// Path of the devcontainer.json this was read from. Relative bind
    /// sources are resolved against its directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<PathBuf>,

    /// Additional options we don't explicitly handle
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl DevContainerConfig {
    /// Load devcontainer.json from a specific file, recording it as the origin
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config = Self::parse(&content, path)?;
        config.origin = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse devcontainer.json content
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        // Strip comments (devcontainer.json supports JSONC)
        let content = strip_json_comments(content);

        serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Directory local paths are resolved against (the devcontainer.json's parent)
    pub fn origin_dir(&self) -> Option<&Path> {
        self.origin
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Configuration after features and image metadata have been merged in.
///
/// Produced by the caller; the driver treats it as read-only input.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MergedDevContainerConfig {
    /// Mounts in declaration order
    pub mounts: Vec<Mount>,
    /// Environment for the container process
    pub container_env: HashMap<String, String>,
    /// Capabilities to add (never drop)
    pub cap_add: Vec<String>,
    pub privileged: Option<bool>,
    /// Shell snippets run before the main command (from features)
    pub entrypoints: Vec<String>,
    pub override_command: Option<bool>,
    pub remote_user: Option<String>,
    pub container_user: Option<String>,
}

impl MergedDevContainerConfig {
    /// Load a merged configuration from a JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

impl From<&DevContainerConfig> for MergedDevContainerConfig {
    fn from(config: &DevContainerConfig) -> Self {
        Self {
            mounts: config.mounts.clone().unwrap_or_default(),
            container_env: config.container_env.clone().unwrap_or_default(),
            cap_add: config.cap_add.clone().unwrap_or_default(),
            privileged: config.privileged,
            entrypoints: Vec::new(),
            override_command: config.override_command,
            remote_user: config.remote_user.clone(),
            container_user: config.container_user.clone(),
        }
    }
}

/// Mount type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountType {
    Bind,
    Volume,
    /// Anything else (tmpfs, npipe, unset, ...)
    Other(String),
}

impl MountType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bind => "bind",
            Self::Volume => "volume",
            Self::Other(s) => s,
        }
    }
}

impl Default for MountType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<&str> for MountType {
    fn from(s: &str) -> Self {
        match s {
            "bind" => Self::Bind,
            "volume" => Self::Volume,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MountType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MountType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// A single mount, either from devcontainer.json or the workspace mount string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMount")]
pub struct Mount {
    #[serde(rename = "type")]
    pub mount_type: MountType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
    pub target: String,
    /// Options we don't interpret, kept verbatim (`readonly`, `consistency=...`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

impl Mount {
    /// Parse the docker `--mount` string form:
    /// `type=bind,source=/path,target=/path[,readonly]`
    pub fn parse(s: &str) -> Self {
        let mut mount = Self::default();

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some(("type", value)) => mount.mount_type = MountType::from(value),
                Some(("src" | "source", value)) => mount.source = value.to_string(),
                Some(("dst" | "destination" | "target", value)) => {
                    mount.target = value.to_string()
                }
                _ => mount.other.push(part.to_string()),
            }
        }

        mount
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type={},src={},dst={}", self.mount_type, self.source, self.target)?;
        for opt in &self.other {
            write!(f, ",{}", opt)?;
        }
        Ok(())
    }
}

/// Mounts appear either as strings or as objects in JSON
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMount {
    String(String),
    Object(MountObject),
}

#[derive(Deserialize)]
struct MountObject {
    #[serde(rename = "type", default)]
    mount_type: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    target: String,
    #[serde(default)]
    other: Vec<String>,
}

impl From<RawMount> for Mount {
    fn from(raw: RawMount) -> Self {
        match raw {
            RawMount::String(s) => Mount::parse(&s),
            RawMount::Object(obj) => Mount {
                mount_type: obj
                    .mount_type
                    .as_deref()
                    .map(MountType::from)
                    .unwrap_or_default(),
                source: obj.source.unwrap_or_default(),
                target: obj.target,
                other: obj.other,
            },
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::JsonParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Strip JSON comments (// and /* */) for JSONC support
fn strip_json_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                while chars.peek().is_some_and(|&nc| nc != '\n') {
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for nc in chars.by_ref() {
                    if prev == '*' && nc == '/' {
                        break;
                    }
                    prev = nc;
                }
            }
            _ => result.push(c),
        }
    }

    result
}
