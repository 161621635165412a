//! Configuration validation

use globset::Glob;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_manifest(config)?;
    validate_workspace(config)?;
    validate_runner(config)?;
    validate_selection(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        message: message.into(),
    }
}

fn validate_manifest(config: &Config) -> Result<()> {
    if config.manifest.branch.is_empty() {
        return Err(invalid("manifest.branch", "branch cannot be empty").into());
    }

    if config.manifest.remote.is_empty() {
        return Err(invalid("manifest.remote", "remote cannot be empty").into());
    }

    if let Some(manifest_url) = &config.manifest.url {
        // scp-style and local paths are left to the checkout tool
        if manifest_url.contains("://") {
            url::Url::parse(manifest_url)
                .map_err(|e| invalid("manifest.url", format!("not a valid URL: {}", e)))?;
        }
    }

    Ok(())
}

fn validate_workspace(config: &Config) -> Result<()> {
    if config.workspace.root.as_os_str().is_empty() {
        return Err(invalid("workspace.root", "root cannot be empty").into());
    }
    if config.workspace.results_dir.is_absolute() {
        return Err(invalid(
            "workspace.results_dir",
            "must be relative to the workspace root",
        )
        .into());
    }
    if config.workspace.venv_dir.is_absolute() {
        return Err(invalid("workspace.venv_dir", "must be relative to the workspace root").into());
    }
    // The workspace root is deleted at teardown
    if config.workspace.archive_dir.starts_with(&config.workspace.root) {
        return Err(invalid(
            "workspace.archive_dir",
            "must live outside the workspace root",
        )
        .into());
    }
    Ok(())
}

fn validate_runner(config: &Config) -> Result<()> {
    if !config.runner.args.iter().any(|a| a.contains("{board}")) {
        return Err(invalid("runner.args", "must contain {board} placeholder").into());
    }

    if config.runner.result_file.trim().is_empty() {
        return Err(invalid("runner.result_file", "result file name cannot be empty").into());
    }

    if config.runner.binary.trim().is_empty() {
        return Err(invalid("runner.binary", "binary cannot be empty").into());
    }

    if config.runner.timeout_secs == Some(0) {
        return Err(invalid("runner.timeout_secs", "timeout must be positive").into());
    }

    Ok(())
}

fn validate_selection(config: &Config) -> Result<()> {
    if config.selection.module_patterns.is_empty() {
        return Err(invalid("selection.module_patterns", "at least one pattern is required").into());
    }

    let patterns = config
        .selection
        .module_patterns
        .iter()
        .map(|p| ("selection.module_patterns", p))
        .chain(config.selection.exclude.iter().map(|p| ("selection.exclude", p)));
    for (field, pattern) in patterns {
        Glob::new(pattern).map_err(|e| invalid(field, format!("invalid glob '{}': {}", pattern, e)))?;
    }

    Ok(())
}
