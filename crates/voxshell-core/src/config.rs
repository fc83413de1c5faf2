//! Shell configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, ResultExt};
use crate::intent::OsFamily;
use crate::safety::{AllowEntry, SafetyPolicy, DEFAULT_MAX_COMMAND_LENGTH};

/// Default subprocess timeout in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default per-stream output limit in bytes
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 5000;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Target OS family; the running OS when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsFamily>,

    /// Intent library file; the built-in library when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intents_path: Option<PathBuf>,

    /// Language of spoken replies
    pub language: ReplyLanguage,

    /// Entries kept by the in-memory audit log
    pub audit_capacity: usize,

    /// Validator settings
    pub safety: SafetySettings,

    /// Executor settings
    pub execution: ExecutionSettings,

    /// Confirmation gate settings
    pub confirmation: ConfirmationSettings,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            os: None,
            intents_path: None,
            language: ReplyLanguage::default(),
            audit_capacity: 1000,
            safety: SafetySettings::default(),
            execution: ExecutionSettings::default(),
            confirmation: ConfirmationSettings::default(),
        }
    }
}

impl ShellConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_os(mut self, os: OsFamily) -> Self {
        self.os = Some(os);
        self
    }

    pub fn with_intents_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.intents_path = Some(path.into());
        self
    }

    pub fn with_language(mut self, language: ReplyLanguage) -> Self {
        self.language = language;
        self
    }

    /// Set the subprocess timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.execution.timeout_secs = secs;
        self
    }

    /// Set the confirmation wait
    pub fn with_confirmation_secs(mut self, secs: u64) -> Self {
        self.confirmation.timeout_secs = secs;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.execution.dry_run = dry_run;
        self
    }

    /// Effective target OS
    pub fn os_family(&self) -> OsFamily {
        self.os.unwrap_or_else(OsFamily::current)
    }

    /// Reject values that would make the pipeline unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "execution.timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.confirmation.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "confirmation.timeout_secs".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.confirmation.confirm_words.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "confirmation.confirm_words".to_string(),
                message: "at least one confirmation word is required".to_string(),
            });
        }
        if self.safety.max_command_length == 0 {
            return Err(ConfigError::InvalidValue {
                field: "safety.max_command_length".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Build the validator policy for the effective OS
    pub fn safety_policy(&self) -> Result<SafetyPolicy, ConfigError> {
        let mut policy = SafetyPolicy::new(self.os_family())
            .with_max_command_length(self.safety.max_command_length);

        if let Some(entries) = &self.safety.allow {
            policy = policy.with_allow_list(entries.clone());
        }
        for program in &self.safety.extra_allowed {
            policy = policy.with_allowed(program.as_str());
        }
        for root in &self.safety.permitted_roots {
            policy = policy.with_permitted_root(root.as_str());
        }
        for pattern in &self.safety.deny_patterns {
            policy = policy.with_deny_pattern(pattern)?;
        }
        Ok(policy)
    }

    /// Load configuration from a TOML or JSON file (by extension)
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config: Self = match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string()))?,
            Some("toml") | None => {
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            Some(other) => return Err(ConfigError::UnsupportedFormat(other.to_string()).into()),
        };

        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a TOML or JSON file (by extension)
    pub fn to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let path = path.as_ref();
        let content = match extension(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(self)
                .map_err(|e| ConfigError::Parse(e.to_string()))?,
            Some("toml") | None => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            Some(other) => return Err(ConfigError::UnsupportedFormat(other.to_string()).into()),
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Reply language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyLanguage {
    /// Traditional Chinese
    #[default]
    Zh,
    /// English
    En,
}

impl std::str::FromStr for ReplyLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" | "zh-tw" | "zh_tw" | "chinese" => Ok(ReplyLanguage::Zh),
            "en" | "english" => Ok(ReplyLanguage::En),
            other => Err(format!("unknown reply language: {}", other)),
        }
    }
}

/// Validator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    /// Programs added on top of the allow-list
    pub extra_allowed: Vec<String>,

    /// Absolute paths under these roots are permitted
    pub permitted_roots: Vec<String>,

    /// Longest accepted command line
    pub max_command_length: usize,

    /// Extra deny regexes matched against the whole command line
    pub deny_patterns: Vec<String>,

    /// Replaces the built-in allow-list when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<AllowEntry>>,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            extra_allowed: Vec::new(),
            permitted_roots: Vec::new(),
            max_command_length: DEFAULT_MAX_COMMAND_LENGTH,
            deny_patterns: Vec::new(),
            allow: None,
        }
    }
}

/// Executor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Wall-clock limit per command
    pub timeout_secs: u64,

    /// Bytes kept per output stream
    pub max_output_bytes: usize,

    /// Starting directory of the session; the process cwd when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Print commands instead of running them
    pub dry_run: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            working_dir: None,
            dry_run: false,
        }
    }
}

impl ExecutionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Confirmation gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationSettings {
    /// How long a destructive command waits for confirmation
    pub timeout_secs: u64,

    /// Replies that confirm
    pub confirm_words: Vec<String>,

    /// Replies that cancel
    pub cancel_words: Vec<String>,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|w| w.to_string()).collect() };
        Self {
            timeout_secs: 15,
            confirm_words: words(&[
                "確認", "確定", "是", "是的", "好", "好的", "執行", "yes", "y", "confirm", "ok",
                "sure",
            ]),
            cancel_words: words(&[
                "取消", "算了", "不要", "不", "否", "離開", "退出", "cancel", "no", "n", "stop",
                "exit", "quit",
            ]),
        }
    }
}

impl ConfirmationSettings {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::{RejectionReason, SafetyVerdict};
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = ShellConfig::default();
        assert_eq!(config.execution.timeout_secs, 30);
        assert_eq!(config.execution.max_output_bytes, 5000);
        assert_eq!(config.safety.max_command_length, 1000);
        assert_eq!(config.confirmation.timeout_secs, 15);
        assert_eq!(config.language, ReplyLanguage::Zh);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ShellConfig::new()
            .with_os(OsFamily::Windows)
            .with_language(ReplyLanguage::En)
            .with_timeout_secs(5)
            .with_confirmation_secs(2)
            .with_dry_run(true);

        assert_eq!(config.os_family(), OsFamily::Windows);
        assert_eq!(config.execution.timeout(), Duration::from_secs(5));
        assert_eq!(config.confirmation.wait(), Duration::from_secs(2));
        assert!(config.execution.dry_run);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ShellConfig = toml::from_str(
            r#"
            language = "en"

            [safety]
            permitted_roots = ["/srv/data"]
            "#,
        )
        .unwrap();

        assert_eq!(config.language, ReplyLanguage::En);
        assert_eq!(config.safety.permitted_roots, vec!["/srv/data"]);
        assert_eq!(config.execution.timeout_secs, 30);
    }

    #[test]
    fn test_safety_policy_from_settings() {
        let mut config = ShellConfig::new().with_os(OsFamily::Unix);
        config.safety.extra_allowed = vec!["sleep".to_string()];
        config.safety.permitted_roots = vec!["/srv/data".to_string()];
        config.safety.deny_patterns = vec!["secret".to_string()];

        let policy = config.safety_policy().unwrap();
        assert_eq!(policy.validate_line("sleep 1", false), SafetyVerdict::Allowed);
        assert_eq!(policy.validate_line("ls /srv/data/a", false), SafetyVerdict::Allowed);
        assert_eq!(
            policy.validate_line("cat secret.txt", false),
            SafetyVerdict::Rejected(RejectionReason::DangerousPattern)
        );

        config.safety.deny_patterns = vec!["[".to_string()];
        assert!(matches!(
            config.safety_policy(),
            Err(ConfigError::InvalidDenyPattern { .. })
        ));
    }

    #[test]
    fn test_allow_list_override() {
        let mut config = ShellConfig::new().with_os(OsFamily::Unix);
        config.safety.allow = Some(vec![AllowEntry::program("ls")]);

        let policy = config.safety_policy().unwrap();
        assert_eq!(policy.validate_line("ls", false), SafetyVerdict::Allowed);
        assert_eq!(
            policy.validate_line("pwd", false),
            SafetyVerdict::Rejected(RejectionReason::NotWhitelisted)
        );
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ShellConfig::new().with_timeout_secs(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "execution.timeout_secs"
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let config = ShellConfig::new()
            .with_os(OsFamily::Unix)
            .with_language(ReplyLanguage::En)
            .with_timeout_secs(10);

        for name in ["voxshell.toml", "voxshell.json"] {
            let path = dir.path().join(name);
            config.to_file(&path).unwrap();
            let loaded = ShellConfig::from_file(&path).unwrap();
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voxshell.yaml");
        std::fs::write(&path, "language: en").unwrap();

        let err = ShellConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("yaml"));
    }
}
