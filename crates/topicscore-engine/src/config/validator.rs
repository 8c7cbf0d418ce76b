//! Semantic validation for parsed engine configuration values.

use anyhow::{bail, Result};

use crate::config::types::{EngineConfig, WorkerCount};
use crate::source::parse_base_uri;

/// Validate a parsed engine configuration.
///
/// # Errors
///
/// Returns an error listing every validation failure found.
pub fn validate_config(config: &EngineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.storage.base_uri.trim().is_empty() {
        errors.push("storage.base_uri must not be empty".to_string());
    } else if let Err(e) = parse_base_uri(&config.storage.base_uri) {
        errors.push(format!("storage.base_uri: {e}"));
    }

    if config.storage.partition_lines == 0 {
        errors.push("storage.partition_lines must be > 0".to_string());
    }

    if let WorkerCount::Manual(0) = config.compute.workers {
        errors.push("compute.workers must be >= 1 or 'auto'".to_string());
    }

    if config.compute.max_workers == 0 {
        errors.push("compute.max_workers must be > 0".to_string());
    }

    if let WorkerCount::Manual(n) = config.compute.workers {
        if n > config.compute.max_workers {
            errors.push(format!(
                "compute.workers ({n}) exceeds compute.max_workers ({})",
                config.compute.max_workers
            ));
        }
    }

    if config.compute.channel_capacity == 0 {
        errors.push("compute.channel_capacity must be > 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Engine config validation failed:\n  - {}", errors.join("\n  - "))
    }
}
