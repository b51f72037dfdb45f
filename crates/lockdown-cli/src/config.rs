use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lockdown_core::crypto::MIN_ITERATIONS;
use lockdown_core::{CoordinatorConfig, KdfParams, VaultConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockdownConfig {
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub security: SecuritySection,
    #[serde(default)]
    pub ui: UiSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultSection {
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub session_timeout_minutes: i64,
    pub kdf_iterations: u32,
    pub max_password_attempts: u32,
    pub cache_passwords: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            session_timeout_minutes: VaultConfig::default().timeout_minutes,
            kdf_iterations: MIN_ITERATIONS,
            max_password_attempts: CoordinatorConfig::default().max_password_attempts,
            cache_passwords: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiSection {
    #[serde(default)]
    pub ascii: bool,
    pub color: Option<bool>,
}

impl LockdownConfig {
    pub fn new(root: PathBuf, session_timeout_minutes: i64) -> Self {
        Self {
            vault: VaultSection {
                root: Some(root.to_string_lossy().to_string()),
            },
            security: SecuritySection {
                session_timeout_minutes,
                ..SecuritySection::default()
            },
            ui: UiSection::default(),
        }
    }

    pub fn kdf_params(&self) -> lockdown_core::Result<KdfParams> {
        KdfParams::new(self.security.kdf_iterations)
    }

    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            timeout_minutes: self.security.session_timeout_minutes,
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_password_attempts: self.security.max_password_attempts,
            cache_passwords: self.security.cache_passwords,
            ..CoordinatorConfig::default()
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn read_config(path: &Path) -> anyhow::Result<LockdownConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn write_config(path: &Path, config: &LockdownConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            )
        })?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    std::fs::write(path, contents)
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
    Ok(())
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("lockdown"));
        }
    }
    Ok(home_dir()?.join(".config").join("lockdown"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [vault]
            root = "/tmp/notes"

            [security]
            session_timeout_minutes = 5
            kdf_iterations = 2000000
            max_password_attempts = 1
            cache_passwords = false

            [ui]
            ascii = true
            color = false
        "#;
        let config: LockdownConfig = toml::from_str(toml).expect("parse config");
        assert_eq!(config.vault.root.as_deref(), Some("/tmp/notes"));
        assert_eq!(config.security.session_timeout_minutes, 5);
        assert_eq!(config.security.kdf_iterations, 2_000_000);
        assert_eq!(config.coordinator_config().max_password_attempts, 1);
        assert!(!config.coordinator_config().cache_passwords);
        assert!(config.ui.ascii);
        assert_eq!(config.ui.color, Some(false));
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: LockdownConfig = toml::from_str("[vault]\nroot = \"/v\"\n").expect("parse");
        assert_eq!(config.security, SecuritySection::default());
        assert_eq!(config.vault_config().timeout_minutes, 15);
        assert_eq!(
            config.kdf_params().expect("default params").iterations(),
            MIN_ITERATIONS
        );
    }

    #[test]
    fn test_iterations_below_floor_are_rejected() {
        let mut config = LockdownConfig::default();
        config.security.kdf_iterations = 10;
        assert!(config.kdf_params().is_err());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let config = LockdownConfig::new(PathBuf::from("/srv/vault"), 30);

        write_config(&path, &config).expect("write");
        assert_eq!(read_config(&path).expect("read"), config);
    }

    #[test]
    fn test_xdg_config_dir_uses_env() {
        let _guard = ENV_LOCK.lock().expect("env lock");
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/lockdown-config-test");
        let dir = xdg_config_dir().expect("config dir");
        assert_eq!(dir, PathBuf::from("/tmp/lockdown-config-test").join("lockdown"));
    }
}
