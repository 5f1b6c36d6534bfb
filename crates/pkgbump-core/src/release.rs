use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{FetchError, fetch_text, parse_json};
use crate::retry::RetryPolicy;

/// Latest upstream release as reported by the distribution API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub commit: String,
    pub download_url: String,
}

/// Distribution API location and the platform/track it is queried for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEndpoint {
    pub url: String,
    pub platform: String,
    pub release_track: String,
}

impl ReleaseEndpoint {
    /// Full request URL including the query parameters.
    ///
    /// # Errors
    /// Returns an error when the base URL cannot be parsed.
    pub fn request_url(&self) -> Result<String, ReleaseError> {
        reqwest::Url::parse_with_params(
            &self.url,
            [
                ("platform", self.platform.as_str()),
                ("releaseTrack", self.release_track.as_str()),
            ],
        )
        .map(String::from)
        .map_err(|error| ReleaseError::InvalidEndpoint {
            url: self.url.clone(),
            details: error.to_string(),
        })
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("invalid release endpoint {url}: {details}")]
    InvalidEndpoint { url: String, details: String },
    #[error("failed to get latest release after {attempts} attempts: {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: FetchError,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRelease {
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    commit_sha: Option<String>,
}

/// Fetch the latest upstream release, retrying transport, status, parse and
/// missing-field failures alike.
///
/// # Errors
/// Returns an error when the endpoint is invalid or every attempt failed.
pub async fn fetch_latest_release(
    client: &reqwest::Client,
    endpoint: &ReleaseEndpoint,
    policy: RetryPolicy,
) -> Result<ReleaseInfo, ReleaseError> {
    let request_url = endpoint.request_url()?;
    let url = request_url.as_str();

    let release = policy
        .run(
            "latest release fetch",
            |_| async move {
                let body = fetch_text(client, url).await?;
                debug!("Release API raw response: {body}");
                parse_release(url, &body)
            },
            FetchError::is_retryable,
        )
        .await
        .map_err(|source| ReleaseError::Unavailable {
            attempts: policy.attempts(),
            source,
        })?;

    debug!(
        "Extracted version: {}, commit: {}",
        release.version, release.commit
    );
    Ok(release)
}

pub(crate) fn parse_release(url: &str, body: &str) -> Result<ReleaseInfo, FetchError> {
    let raw: RawRelease = parse_json(url, body)?;

    let require = |value: Option<String>, field: &'static str| {
        value
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| FetchError::MissingField {
                url: url.to_string(),
                field,
            })
    };

    Ok(ReleaseInfo {
        download_url: require(raw.download_url, "downloadUrl")?,
        version: require(raw.version, "version")?,
        commit: require(raw.commit_sha, "commitSha")?,
    })
}
