//! Configuration parsing for kubedev
//!
//! This crate handles:
//! - devcontainer.json files (VSCode compatible) and mount strings
//! - The merged configuration and image metadata handed to the driver
//! - Driver configuration (`~/.config/kubedev/config.toml` plus environment)
//! - `key=value` label and resource strings

mod devcontainer;
mod driver;
mod error;
mod image;
mod labels;

pub use devcontainer::*;
pub use driver::*;
pub use error::*;
pub use image::*;
pub use labels::*;
