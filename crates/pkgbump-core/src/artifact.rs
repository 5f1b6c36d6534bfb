use std::time::Duration;

use log::{debug, info};
use sha2::{Digest, Sha512};
use thiserror::Error;

use crate::http::{FetchError, fetch_bytes};
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to download release artifact after {attempts} attempts: {source}")]
    Download {
        attempts: u32,
        #[source]
        source: FetchError,
    },
}

/// A downloaded release artifact, buffered once and shared by hashing and
/// inspection.
pub struct Artifact {
    pub url: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    #[must_use]
    pub fn sha512_hex(&self) -> String {
        sha512_hex(&self.bytes)
    }
}

/// Download the release artifact in full.
///
/// # Errors
/// Returns an error when every attempt failed or timed out.
pub async fn download_artifact(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    policy: RetryPolicy,
) -> Result<Artifact, ArtifactError> {
    info!("Downloading release artifact from {url}");

    let bytes = policy
        .run(
            "artifact download",
            |_| fetch_bytes(client, url, Some(timeout)),
            FetchError::is_retryable,
        )
        .await
        .map_err(|source| ArtifactError::Download {
            attempts: policy.attempts(),
            source,
        })?;

    debug!("Download complete: {} bytes", bytes.len());
    Ok(Artifact {
        url: url.to_string(),
        bytes,
    })
}

#[must_use]
pub fn sha512_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha512::digest(bytes))
}
