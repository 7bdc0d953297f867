use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::constants;
use crate::error::AdvisorError;

/// An API key for the completion service. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for an empty or whitespace-only key.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Resolved settings, built once in `main` and handed to constructors.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub model: String,
    pub secrets_path: PathBuf,
    /// Ask the model to append a fenced JSON block for the dashboard.
    pub dashboard: bool,
    pub reveal_step: usize,
    pub reveal_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: constants::API_BASE.clone(),
            model: constants::ADVISOR_MODEL.clone(),
            secrets_path: PathBuf::from(constants::SECRETS_PATH.as_str()),
            dashboard: true,
            reveal_step: constants::REVEAL_STEP,
            reveal_delay: Duration::from_millis(*constants::REVEAL_DELAY_MS),
        }
    }
}

/// Reads the API key from the deployment secret store, a `KEY=value` file.
///
/// The file is parsed without touching the process environment. A missing
/// file or a missing/empty key is not an error: the caller falls back to
/// asking the user.
pub fn load_secret(path: &Path) -> Result<Option<ApiKey>, AdvisorError> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => {
            debug!(path = %path.display(), "No secret store found");
            return Ok(None);
        }
        Err(e) => {
            return Err(AdvisorError::SecretStore(format!(
                "failed to open {}: {}",
                path.display(),
                e
            )))
        }
    };

    for entry in entries {
        let (name, value) = entry.map_err(|e| {
            AdvisorError::SecretStore(format!("failed to parse {}: {}", path.display(), e))
        })?;
        if name == constants::SECRET_KEY_NAME {
            let key = ApiKey::new(value);
            if key.is_some() {
                info!(path = %path.display(), "Loaded API key from secret store");
            }
            return Ok(key);
        }
    }

    debug!(path = %path.display(), key = constants::SECRET_KEY_NAME, "Secret store has no API key");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn api_key_rejects_blank() {
        assert!(ApiKey::new("   ").is_none());
        assert_eq!(ApiKey::new(" abc ").unwrap().expose(), "abc");
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("super-secret").unwrap();
        assert!(!format!("{:?}", key).contains("super-secret"));
    }

    #[test]
    fn load_secret_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let key = load_secret(&dir.path().join("secrets.env")).unwrap();
        assert!(key.is_none());
    }

    #[test]
    fn load_secret_reads_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.env");
        fs::write(&path, "OTHER=1\nGEMINI_API_KEY=\"abc123\"\n").unwrap();
        let key = load_secret(&path).unwrap().unwrap();
        assert_eq!(key.expose(), "abc123");
    }

    #[test]
    fn load_secret_without_key_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.env");
        fs::write(&path, "OTHER=1\n").unwrap();
        assert!(load_secret(&path).unwrap().is_none());
    }

    #[test]
    fn load_secret_does_not_set_env() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secrets.env");
        fs::write(&path, "GEMINI_API_KEY=from-file\n").unwrap();
        load_secret(&path).unwrap();
        assert_ne!(std::env::var(constants::SECRET_KEY_NAME).ok().as_deref(), Some("from-file"));
    }
}
