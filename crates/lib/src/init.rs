//! Initialize the configuration directory and the session storage directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with `{}` if missing.
/// - Creates `session_dir` so the sidecar can persist credentials there.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path, session_dir: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    if !session_dir.exists() {
        std::fs::create_dir_all(session_dir)
            .with_context(|| format!("creating session directory {}", session_dir.display()))?;
        log::info!("created session directory at {}", session_dir.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_config_and_session_dir_once() {
        let root = std::env::temp_dir().join(format!("groupbridge-init-{}", uuid::Uuid::new_v4()));
        let config_path = root.join("cfg").join("config.json");
        let session_dir = root.join("session");

        let dir = init_config_dir(&config_path, &session_dir).unwrap();
        assert_eq!(dir, root.join("cfg"));
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "{}");
        assert!(session_dir.is_dir());

        std::fs::write(&config_path, r#"{"gateway":{"port":4000}}"#).unwrap();
        init_config_dir(&config_path, &session_dir).unwrap();
        assert_eq!(
            std::fs::read_to_string(&config_path).unwrap(),
            r#"{"gateway":{"port":4000}}"#
        );
        let _ = std::fs::remove_dir_all(&root);
    }
}
