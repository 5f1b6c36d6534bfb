use std::path::{Path, PathBuf};
use std::time::Duration;

use pkgbump_core::{
    Backoff, DecisionConfig, ExtractorCommand, ReleaseEndpoint, RetryPolicy, RuntimeResolver,
};
use pkgbump_recipe::RecipeTemplate;
use serde::Deserialize;
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_SETTINGS_FILE: &str = "pkgbump.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_release_api_url")]
    pub release_api_url: String,

    #[serde(default = "default_platform")]
    pub platform: String,

    #[serde(default = "default_release_track")]
    pub release_track: String,

    #[serde(default = "default_release_attempts")]
    pub release_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub release_retry_delay_secs: u64,

    #[serde(default = "default_mirror_url")]
    pub mirror_url: String,

    #[serde(default = "default_mirror_attempts")]
    pub mirror_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub mirror_retry_delay_secs: u64,

    #[serde(default = "default_artifact_url_template")]
    pub artifact_url_template: String,

    #[serde(default = "default_artifact_source_alias")]
    pub artifact_source_alias: String,

    #[serde(default = "default_secondary_checksum")]
    pub secondary_checksum: String,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_release_attempts")]
    pub download_attempts: u32,

    #[serde(default = "default_retry_delay")]
    pub download_retry_delay_secs: u64,

    #[serde(default = "default_extractor_program")]
    pub extractor_program: String,

    #[serde(default = "default_extractor_args")]
    pub extractor_args: Vec<String>,

    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,

    #[serde(default = "default_descriptor_member")]
    pub descriptor_member: String,

    #[serde(default = "default_descriptor_field")]
    pub descriptor_field: String,

    #[serde(default = "default_manifest_url_template")]
    pub manifest_url_template: String,

    #[serde(default = "default_manifest_attempts")]
    pub manifest_attempts: u32,

    #[serde(default = "default_manifest_retry_delay")]
    pub manifest_retry_delay_secs: u64,

    #[serde(default = "default_runtime_package")]
    pub runtime_package: String,

    #[serde(default = "default_runtime_fallback")]
    pub runtime_fallback: String,

    #[serde(default = "default_true")]
    pub commit_based_updates: bool,

    #[serde(default)]
    pub version_protection: bool,

    #[serde(default)]
    pub track_runtime: bool,

    /// Applies to every retried request: `fixed` or `exponential`.
    #[serde(default)]
    pub retry_backoff: Backoff,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_true() -> bool {
    true
}

fn default_release_api_url() -> String {
    "https://cursor.com/api/download".to_string()
}

fn default_platform() -> String {
    "linux-x64".to_string()
}

fn default_release_track() -> String {
    "stable".to_string()
}

fn default_release_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_mirror_url() -> String {
    "https://aur.archlinux.org/cgit/aur.git/plain/PKGBUILD?h=cursor-bin".to_string()
}

fn default_mirror_attempts() -> u32 {
    2
}

fn default_artifact_url_template() -> String {
    "https://downloads.cursor.com/production/{commit}/linux/x64/Cursor-{version}-x86_64.AppImage"
        .to_string()
}

fn default_artifact_source_alias() -> String {
    "${_appimage}".to_string()
}

fn default_secondary_checksum() -> String {
    "937299c6cb6be2f8d25f7dbc95cf77423875c5f8353b8bd6cd7cc8e5603cbf84\
     05b14dbf8bd615db2e3b36ed680fc8e1909410815f7f8587b7267a699e00ab37"
        .to_string()
}

fn default_download_timeout() -> u64 {
    600
}

fn default_extractor_program() -> String {
    "7z".to_string()
}

fn default_extractor_args() -> Vec<String> {
    ["e", "-so", "{archive}", "{member}"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_extract_timeout() -> u64 {
    60
}

fn default_descriptor_member() -> String {
    "usr/share/cursor/resources/app/product.json".to_string()
}

fn default_descriptor_field() -> String {
    "vscodeVersion".to_string()
}

fn default_manifest_url_template() -> String {
    "https://raw.githubusercontent.com/microsoft/vscode/refs/tags/{tag}/package-lock.json"
        .to_string()
}

fn default_manifest_attempts() -> u32 {
    4
}

fn default_manifest_retry_delay() -> u64 {
    2
}

fn default_runtime_package() -> String {
    "electron".to_string()
}

fn default_runtime_fallback() -> String {
    "electron34".to_string()
}

fn default_user_agent() -> String {
    concat!("pkgbump/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

pub fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            release_api_url: default_release_api_url(),
            platform: default_platform(),
            release_track: default_release_track(),
            release_attempts: default_release_attempts(),
            release_retry_delay_secs: default_retry_delay(),
            mirror_url: default_mirror_url(),
            mirror_attempts: default_mirror_attempts(),
            mirror_retry_delay_secs: default_retry_delay(),
            artifact_url_template: default_artifact_url_template(),
            artifact_source_alias: default_artifact_source_alias(),
            secondary_checksum: default_secondary_checksum(),
            download_timeout_secs: default_download_timeout(),
            download_attempts: default_release_attempts(),
            download_retry_delay_secs: default_retry_delay(),
            extractor_program: default_extractor_program(),
            extractor_args: default_extractor_args(),
            extract_timeout_secs: default_extract_timeout(),
            descriptor_member: default_descriptor_member(),
            descriptor_field: default_descriptor_field(),
            manifest_url_template: default_manifest_url_template(),
            manifest_attempts: default_manifest_attempts(),
            manifest_retry_delay_secs: default_manifest_retry_delay(),
            runtime_package: default_runtime_package(),
            runtime_fallback: default_runtime_fallback(),
            commit_based_updates: true,
            version_protection: false,
            track_runtime: false,
            retry_backoff: Backoff::Fixed,
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout(),
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl Settings {
    /// Load settings from `explicit`, or from [`DEFAULT_SETTINGS_FILE`] in the
    /// working directory when present. Without either, defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !candidate.exists() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn release_endpoint(&self) -> ReleaseEndpoint {
        ReleaseEndpoint {
            url: self.release_api_url.clone(),
            platform: self.platform.clone(),
            release_track: self.release_track.clone(),
        }
    }

    pub fn release_retry(&self) -> RetryPolicy {
        self.retry_policy(self.release_attempts, self.release_retry_delay_secs)
    }

    pub fn mirror_retry(&self) -> RetryPolicy {
        self.retry_policy(self.mirror_attempts, self.mirror_retry_delay_secs)
    }

    pub fn download_retry(&self) -> RetryPolicy {
        self.retry_policy(self.download_attempts, self.download_retry_delay_secs)
    }

    fn retry_policy(&self, attempts: u32, delay_secs: u64) -> RetryPolicy {
        RetryPolicy::with_backoff(attempts, Duration::from_secs(delay_secs), self.retry_backoff)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            commit_based: self.commit_based_updates,
            version_protection: self.version_protection,
        }
    }

    pub fn recipe_template(&self) -> RecipeTemplate {
        RecipeTemplate {
            source_url: self.artifact_url_template.clone(),
            source_alias: self.artifact_source_alias.clone(),
            secondary_checksum: self.secondary_checksum.clone(),
        }
    }

    pub fn runtime_resolver(&self) -> RuntimeResolver {
        RuntimeResolver {
            extractor: ExtractorCommand {
                program: self.extractor_program.clone(),
                args: self.extractor_args.clone(),
                timeout: Duration::from_secs(self.extract_timeout_secs),
            },
            descriptor_member: self.descriptor_member.clone(),
            descriptor_field: self.descriptor_field.clone(),
            manifest_url: self.manifest_url_template.clone(),
            package: self.runtime_package.clone(),
            fallback: self.runtime_fallback.clone(),
            manifest_retry: self
                .retry_policy(self.manifest_attempts, self.manifest_retry_delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use pkgbump_core::Backoff;

    use super::{Settings, SettingsError};

    #[test]
    fn settings_defaults_match_expected_endpoints_and_limits() {
        let settings = Settings::default();

        assert_eq!(settings.release_api_url, "https://cursor.com/api/download");
        assert_eq!(settings.release_attempts, 3);
        assert_eq!(settings.release_retry_delay_secs, 5);
        assert_eq!(settings.mirror_attempts, 2);
        assert_eq!(settings.download_timeout_secs, 600);
        assert_eq!(settings.extract_timeout_secs, 60);
        assert_eq!(settings.manifest_attempts, 4);
        assert_eq!(settings.manifest_retry_delay_secs, 2);
        assert_eq!(settings.runtime_fallback, "electron34");
        assert_eq!(settings.secondary_checksum.len(), 128);
        assert!(settings.commit_based_updates);
        assert!(!settings.version_protection);
        assert!(!settings.track_runtime);
    }

    #[test]
    fn partial_settings_fill_in_defaults() {
        let value = json!({
            "mirror_url": "http://127.0.0.1:8080/PKGBUILD",
            "release_attempts": 1,
            "version_protection": true
        });

        let settings: Settings =
            serde_json::from_value(value).expect("settings JSON should deserialize");

        assert_eq!(settings.mirror_url, "http://127.0.0.1:8080/PKGBUILD");
        assert_eq!(settings.release_attempts, 1);
        assert!(settings.version_protection);
        assert_eq!(settings.platform, "linux-x64");
        assert_eq!(settings.extractor_args, vec!["e", "-so", "{archive}", "{member}"]);
    }

    #[test]
    fn conversions_carry_configured_values() {
        let settings = Settings {
            manifest_attempts: 6,
            manifest_retry_delay_secs: 1,
            commit_based_updates: false,
            ..Settings::default()
        };

        let resolver = settings.runtime_resolver();
        assert_eq!(resolver.manifest_retry.attempts(), 6);
        assert_eq!(resolver.manifest_retry.delay, Duration::from_secs(1));
        assert_eq!(resolver.extractor.program, "7z");
        assert!(!settings.decision_config().commit_based);

        let endpoint = settings.release_endpoint();
        assert_eq!(endpoint.release_track, "stable");

        let template = settings.recipe_template();
        assert_eq!(
            template.artifact_url("1.3.0", "bbb"),
            "https://downloads.cursor.com/production/bbb/linux/x64/Cursor-1.3.0-x86_64.AppImage"
        );
    }

    #[test]
    fn retry_backoff_applies_to_every_policy() {
        let settings: Settings = serde_json::from_value(json!({
            "retry_backoff": "exponential",
            "release_retry_delay_secs": 1,
            "manifest_retry_delay_secs": 3
        }))
        .expect("settings JSON should deserialize");

        assert_eq!(settings.retry_backoff, Backoff::Exponential);
        let release = settings.release_retry();
        assert_eq!(release.delay_after(1), Duration::from_secs(1));
        assert_eq!(release.delay_after(3), Duration::from_secs(4));
        assert_eq!(settings.mirror_retry().backoff, Backoff::Exponential);
        assert_eq!(settings.download_retry().backoff, Backoff::Exponential);
        assert_eq!(
            settings.runtime_resolver().manifest_retry.delay_after(2),
            Duration::from_secs(6)
        );

        let fixed = Settings::default().release_retry();
        assert_eq!(fixed.backoff, Backoff::Fixed);
        assert_eq!(fixed.delay_after(3), Duration::from_secs(5));
    }

    #[test]
    fn unknown_backoff_is_rejected() {
        let result = serde_json::from_value::<Settings>(json!({"retry_backoff": "linear"}));
        assert!(result.is_err());
    }

    #[test]
    fn explicit_settings_file_is_loaded() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("pkgbump.json");
        std::fs::write(&path, r#"{"platform": "linux-arm64"}"#)
            .expect("settings file should be written");

        let settings = Settings::load(Some(&path)).expect("settings should load");
        assert_eq!(settings.platform, "linux-arm64");
    }

    #[test]
    fn missing_explicit_settings_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let err = Settings::load(Some(&temp_dir.path().join("missing.json"))).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn malformed_settings_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("pkgbump.json");
        std::fs::write(&path, "{ not json").expect("settings file should be written");

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }
}
