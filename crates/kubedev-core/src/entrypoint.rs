//! Command line of the main devcontainer process

use kubedev_config::{ImageDetails, MergedDevContainerConfig};

/// Resolve the main container's command and arguments.
///
/// The container always starts a small shell wrapper that runs the merged
/// feature entrypoints, then `exec`s its positional arguments and otherwise
/// sleeps until SIGTERM. With `overrideCommand: false` the image's own
/// entrypoint and cmd become those positional arguments.
pub fn container_entrypoint_and_args(
    merged: &MergedDevContainerConfig,
    image_details: &ImageDetails,
) -> (String, Vec<String>) {
    let script = format!(
        "echo Container started\ntrap \"exit 0\" 15\n{}\nexec \"$@\"\nwhile sleep 1 & wait $!; do :; done",
        merged.entrypoints.join("\n")
    );

    let mut args = vec!["-c".to_string(), script, "-".to_string()];
    if merged.override_command == Some(false) {
        args.extend(image_details.config.entrypoint.iter().cloned());
        args.extend(image_details.config.cmd.iter().cloned());
    }

    ("/bin/sh".to_string(), args)
}
