use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

/// Read a run configuration, or the defaults when no file is given.
///
/// `.json` files are parsed as JSON, anything else as YAML.
pub fn read_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg = if ext == "json" {
        serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid JSON config {}", path.display()))?
    } else {
        serde_yaml_ng::from_slice(&bytes)
            .with_context(|| format!("invalid YAML config {}", path.display()))?
    };
    Ok(cfg)
}
