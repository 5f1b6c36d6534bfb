//! Resolve the Electron runtime a release bundles.
//!
//! The artifact carries a product descriptor naming the editor tag it was
//! built from; the editor's lockfile for that tag pins the Electron version.
//! Every failure along the way degrades to a fixed fallback identifier.

use std::io::Write as _;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::http::{FetchError, fetch_json};
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("extraction tool `{0}` was not found on PATH")]
    ExtractorMissing(String),
    #[error("failed to stage artifact in a temporary file: {0}")]
    Stage(#[source] std::io::Error),
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },
    #[error("`{program}` exited with {status}: {stderr}")]
    ExtractFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("bundled descriptor is not valid JSON: {0}")]
    Descriptor(#[source] serde_json::Error),
    #[error("bundled descriptor has no `{0}` field")]
    DescriptorField(String),
    #[error("failed to fetch manifest for {tag}: {source}")]
    Manifest {
        tag: String,
        #[source]
        source: FetchError,
    },
    #[error("manifest for {tag} does not pin `{package}`")]
    PackageNotFound { tag: String, package: String },
    #[error("unrecognized {package} version `{version}`")]
    InvalidVersion { package: String, version: String },
}

/// External unpack utility invocation. `{archive}` and `{member}` in `args`
/// are replaced with the staged artifact path and the member to extract; the
/// member's content is expected on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorCommand {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ExtractorCommand {
    /// Run the extractor against `archive` and return its stdout.
    ///
    /// # Errors
    /// Returns an error if the tool is missing, cannot be spawned, exceeds the
    /// timeout or exits unsuccessfully.
    pub async fn extract(&self, archive: &Path, member: &str) -> Result<Vec<u8>, RuntimeError> {
        let program = which::which(&self.program)
            .map_err(|_| RuntimeError::ExtractorMissing(self.program.clone()))?;
        let archive = archive.to_string_lossy();

        let mut command = tokio::process::Command::new(&program);
        command
            .args(self.args.iter().map(|arg| {
                arg.replace("{archive}", &archive)
                    .replace("{member}", member)
            }))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} to extract {member}", self.program);
        let child = command.spawn().map_err(|source| RuntimeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                program: self.program.clone(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(200)
                .collect();
            return Err(RuntimeError::ExtractFailed {
                program: self.program.clone(),
                status: output.status,
                stderr,
            });
        }

        Ok(output.stdout)
    }
}

/// Places a package version can live in an npm lockfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLookup {
    /// Legacy flat map: `dependencies.<pkg>.version`.
    RootDependencies,
    /// Root package descriptor: `packages[""].(dev)dependencies.<pkg>`.
    RootPackageEntry,
    /// Namespaced entry: `packages["node_modules/<pkg>"].version`.
    NamespacedPackage,
}

impl ManifestLookup {
    pub const ORDERED: [Self; 3] = [
        Self::RootDependencies,
        Self::RootPackageEntry,
        Self::NamespacedPackage,
    ];

    #[must_use]
    pub fn find<'a>(self, manifest: &'a Value, package: &str) -> Option<&'a str> {
        match self {
            Self::RootDependencies => manifest
                .get("dependencies")?
                .get(package)?
                .get("version")?
                .as_str(),
            Self::RootPackageEntry => {
                let root = manifest.get("packages")?.get("")?;
                ["dependencies", "devDependencies"]
                    .into_iter()
                    .find_map(|section| root.get(section)?.get(package)?.as_str())
            }
            Self::NamespacedPackage => manifest
                .get("packages")?
                .get(format!("node_modules/{package}").as_str())?
                .get("version")?
                .as_str(),
        }
    }

    /// Try every lookup in order; the first hit wins.
    #[must_use]
    pub fn find_first<'a>(manifest: &'a Value, package: &str) -> Option<(Self, &'a str)> {
        Self::ORDERED
            .into_iter()
            .find_map(|lookup| lookup.find(manifest, package).map(|version| (lookup, version)))
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeResolver {
    pub extractor: ExtractorCommand,
    /// Path of the product descriptor inside the artifact.
    pub descriptor_member: String,
    /// Descriptor field holding the editor tag.
    pub descriptor_field: String,
    /// Editor manifest URL with a `{tag}` placeholder.
    pub manifest_url: String,
    /// Runtime package name in the manifest, also the identifier prefix.
    pub package: String,
    pub fallback: String,
    pub manifest_retry: RetryPolicy,
}

impl RuntimeResolver {
    /// Resolve the runtime identifier, falling back to the configured default
    /// on any failure.
    pub async fn resolve(&self, client: &reqwest::Client, artifact: &[u8]) -> String {
        match self.try_resolve(client, artifact).await {
            Ok(identifier) => {
                info!("Bundled runtime resolved to {identifier}");
                identifier
            }
            Err(error) => {
                warn!(
                    "Failed to determine bundled runtime, using {}: {error}",
                    self.fallback
                );
                self.fallback.clone()
            }
        }
    }

    /// # Errors
    /// Returns the first failure among extraction, descriptor parsing,
    /// manifest fetching and version lookup.
    pub async fn try_resolve(
        &self,
        client: &reqwest::Client,
        artifact: &[u8],
    ) -> Result<String, RuntimeError> {
        let descriptor = self.read_descriptor(artifact).await?;
        let tag = descriptor_tag(&descriptor, &self.descriptor_field)?;
        debug!("Artifact was built from editor tag {tag}");

        let manifest = self.fetch_manifest(client, &tag).await?;
        let (lookup, version) = ManifestLookup::find_first(&manifest, &self.package)
            .ok_or_else(|| RuntimeError::PackageNotFound {
                tag: tag.clone(),
                package: self.package.clone(),
            })?;
        debug!("Found {} {version} via {lookup:?}", self.package);

        runtime_identifier(&self.package, version)
    }

    /// Stage the artifact in a temporary file and extract the descriptor. The
    /// temporary file is removed whether or not extraction succeeds.
    async fn read_descriptor(&self, artifact: &[u8]) -> Result<Vec<u8>, RuntimeError> {
        let staged = stage_artifact(artifact)?;
        let extracted = self
            .extractor
            .extract(staged.path(), &self.descriptor_member)
            .await;

        if let Err(error) = staged.close() {
            warn!("Failed to remove temporary artifact: {error}");
        }

        extracted
    }

    async fn fetch_manifest(
        &self,
        client: &reqwest::Client,
        tag: &str,
    ) -> Result<Value, RuntimeError> {
        let url = self.manifest_url.replace("{tag}", tag);
        let url = url.as_str();
        debug!("Fetching {} version for editor {tag}", self.package);

        self.manifest_retry
            .run(
                "editor manifest fetch",
                |_| fetch_json::<Value>(client, url),
                FetchError::is_retryable,
            )
            .await
            .map_err(|source| RuntimeError::Manifest {
                tag: tag.to_string(),
                source,
            })
    }
}

fn stage_artifact(artifact: &[u8]) -> Result<NamedTempFile, RuntimeError> {
    let mut staged = tempfile::Builder::new()
        .prefix("pkgbump-artifact-")
        .tempfile()
        .map_err(RuntimeError::Stage)?;
    staged.write_all(artifact).map_err(RuntimeError::Stage)?;
    staged.flush().map_err(RuntimeError::Stage)?;
    Ok(staged)
}

fn descriptor_tag(descriptor: &[u8], field: &str) -> Result<String, RuntimeError> {
    let descriptor: Value = serde_json::from_slice(descriptor).map_err(RuntimeError::Descriptor)?;
    descriptor
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RuntimeError::DescriptorField(field.to_string()))
}

/// `electron` + `34.3.2` becomes `electron34`. Range operators in front of
/// the version are ignored.
fn runtime_identifier(package: &str, version: &str) -> Result<String, RuntimeError> {
    let bare = version.trim().trim_start_matches(['^', '~', '=', '>', '<', 'v', ' ']);
    let major_end = bare.find(|c: char| !c.is_ascii_digit()).unwrap_or(bare.len());

    if major_end == 0 {
        return Err(RuntimeError::InvalidVersion {
            package: package.to_string(),
            version: version.to_string(),
        });
    }

    Ok(format!("{package}{}", &bare[..major_end]))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn cat_extractor(timeout: Duration) -> ExtractorCommand {
        ExtractorCommand {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "cat \"$0\"".to_string(),
                "{archive}".to_string(),
            ],
            timeout,
        }
    }

    fn shell_extractor(script: &str, timeout: Duration) -> ExtractorCommand {
        ExtractorCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "{archive}".to_string()],
            timeout,
        }
    }

    fn resolver(extractor: ExtractorCommand, manifest_url: &str) -> RuntimeResolver {
        RuntimeResolver {
            extractor,
            descriptor_member: "usr/share/cursor/resources/app/product.json".to_string(),
            descriptor_field: "vscodeVersion".to_string(),
            manifest_url: manifest_url.to_string(),
            package: "electron".to_string(),
            fallback: "electron34".to_string(),
            manifest_retry: RetryPolicy::fixed(1, Duration::ZERO),
        }
    }

    #[test]
    fn root_dependencies_lookup() {
        let manifest = json!({"dependencies": {"electron": {"version": "32.2.6"}}});
        assert_eq!(
            ManifestLookup::find_first(&manifest, "electron"),
            Some((ManifestLookup::RootDependencies, "32.2.6"))
        );
    }

    #[test]
    fn root_package_entry_lookup_checks_dev_dependencies() {
        let manifest = json!({
            "packages": {"": {"devDependencies": {"electron": "34.3.2"}}}
        });
        assert_eq!(
            ManifestLookup::find_first(&manifest, "electron"),
            Some((ManifestLookup::RootPackageEntry, "34.3.2"))
        );
    }

    #[test]
    fn namespaced_package_lookup() {
        let manifest = json!({
            "packages": {
                "": {"name": "code-oss-dev"},
                "node_modules/electron": {"version": "35.5.1"}
            }
        });
        assert_eq!(
            ManifestLookup::find_first(&manifest, "electron"),
            Some((ManifestLookup::NamespacedPackage, "35.5.1"))
        );
    }

    #[test]
    fn first_matching_lookup_wins() {
        let manifest = json!({
            "dependencies": {"electron": {"version": "30.0.0"}},
            "packages": {"node_modules/electron": {"version": "31.0.0"}}
        });
        assert_eq!(
            ManifestLookup::find_first(&manifest, "electron"),
            Some((ManifestLookup::RootDependencies, "30.0.0"))
        );
    }

    #[test]
    fn lookup_misses_unrelated_manifest() {
        let manifest = json!({"packages": {"node_modules/left-pad": {"version": "1.3.0"}}});
        assert_eq!(ManifestLookup::find_first(&manifest, "electron"), None);
    }

    #[test]
    fn runtime_identifier_uses_major_version() {
        assert_eq!(runtime_identifier("electron", "34.3.2").unwrap(), "electron34");
        assert_eq!(runtime_identifier("electron", "^35.1.0").unwrap(), "electron35");
        assert!(matches!(
            runtime_identifier("electron", "latest"),
            Err(RuntimeError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn descriptor_tag_requires_field() {
        assert_eq!(
            descriptor_tag(br#"{"vscodeVersion": "1.96.2"}"#, "vscodeVersion").unwrap(),
            "1.96.2"
        );
        assert!(matches!(
            descriptor_tag(br#"{"nameShort": "Cursor"}"#, "vscodeVersion"),
            Err(RuntimeError::DescriptorField(_))
        ));
        assert!(matches!(
            descriptor_tag(b"not json", "vscodeVersion"),
            Err(RuntimeError::Descriptor(_))
        ));
    }

    #[tokio::test]
    async fn extractor_output_is_returned() {
        let extractor = cat_extractor(Duration::from_secs(10));
        let staged = stage_artifact(b"{\"vscodeVersion\":\"1.96.2\"}").unwrap();

        let output = extractor.extract(staged.path(), "product.json").await.unwrap();
        assert_eq!(output, b"{\"vscodeVersion\":\"1.96.2\"}");
    }

    #[tokio::test]
    async fn extractor_failure_reports_stderr() {
        let extractor = shell_extractor("echo broken archive >&2; exit 3", Duration::from_secs(10));
        let staged = stage_artifact(b"").unwrap();

        let err = extractor.extract(staged.path(), "product.json").await.unwrap_err();
        assert!(matches!(err, RuntimeError::ExtractFailed { ref stderr, .. } if stderr == "broken archive"));
    }

    #[tokio::test]
    async fn extractor_is_bounded_by_timeout() {
        let extractor = shell_extractor("sleep 5", Duration::from_millis(100));
        let staged = stage_artifact(b"").unwrap();

        let err = extractor.extract(staged.path(), "product.json").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn missing_extractor_is_reported() {
        let extractor = ExtractorCommand {
            program: "pkgbump-no-such-extractor".to_string(),
            args: vec![],
            timeout: Duration::from_secs(1),
        };
        let staged = stage_artifact(b"").unwrap();

        let err = extractor.extract(staged.path(), "product.json").await.unwrap_err();
        assert!(matches!(err, RuntimeError::ExtractorMissing(_)));
    }

    #[tokio::test]
    async fn staged_artifact_is_removed_after_success() {
        let resolver = resolver(
            shell_extractor("printf %s \"$0\"", Duration::from_secs(10)),
            "http://127.0.0.1:9/{tag}",
        );

        let output = resolver.read_descriptor(b"payload").await.unwrap();
        let staged_path = String::from_utf8(output).unwrap();
        assert!(staged_path.contains("pkgbump-artifact-"));
        assert!(!Path::new(&staged_path).exists());
    }

    #[tokio::test]
    async fn staged_artifact_is_removed_after_failure() {
        let resolver = resolver(
            shell_extractor("printf %s \"$0\" >&2; exit 1", Duration::from_secs(10)),
            "http://127.0.0.1:9/{tag}",
        );

        let err = resolver.read_descriptor(b"payload").await.unwrap_err();
        let RuntimeError::ExtractFailed { stderr, .. } = err else {
            panic!("expected extraction failure, got {err:?}");
        };
        assert!(!Path::new(&stderr).exists());
    }

    #[tokio::test]
    async fn resolve_falls_back_when_descriptor_is_unusable() {
        let client = reqwest::Client::new();
        let resolver = resolver(
            cat_extractor(Duration::from_secs(10)),
            "http://127.0.0.1:9/{tag}",
        );

        let identifier = resolver.resolve(&client, b"not a squashfs image").await;
        assert_eq!(identifier, "electron34");
    }
}
