use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with HTTP {status}{body_snippet}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("{url} returned an empty response")]
    EmptyBody { url: String },
    #[error("failed to parse response from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response from {url} has no `{field}`")]
    MissingField { url: String, field: &'static str },
}

impl FetchError {
    /// Everything except a broken client may succeed on a later attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ClientBuild(_))
    }
}

/// Build the client shared by every request of a run.
///
/// # Errors
/// Returns an error if the TLS backend or client configuration fails.
pub fn build_client(user_agent: &str, connect_timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(user_agent)
        .build()
        .map_err(FetchError::ClientBuild)
}

/// GET `url` and return the body as text.
///
/// # Errors
/// Returns an error on transport failure or a non-success status.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let response = send(client, url, None).await?;
    response.text().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })
}

/// GET `url` and deserialize the JSON body.
///
/// # Errors
/// Returns an error on transport failure, a non-success status, an empty body
/// or malformed JSON.
pub async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, FetchError> {
    let body = fetch_text(client, url).await?;
    parse_json(url, &body)
}

/// GET `url` and buffer the whole body, optionally bounded by `timeout`.
///
/// # Errors
/// Returns an error on transport failure, timeout or a non-success status.
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, FetchError> {
    let response = send(client, url, timeout).await?;
    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
}

pub(crate) fn parse_json<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, FetchError> {
    if body.trim().is_empty() {
        return Err(FetchError::EmptyBody {
            url: url.to_string(),
        });
    }

    serde_json::from_str(body).map_err(|source| FetchError::Parse {
        url: url.to_string(),
        source,
    })
}

async fn send(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<reqwest::Response, FetchError> {
    debug!("Making request to: {url}");

    let mut request = client.get(url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.map_err(|source| FetchError::Request {
        url: url.to_string(),
        source,
    })?;
    debug!("{url} status code: {}", response.status());

    if !response.status().is_success() {
        let status = response.status();
        let body_snippet = response
            .text()
            .await
            .ok()
            .map(|body| response_snippet(&body, 160))
            .unwrap_or_default();
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
            body_snippet,
        });
    }

    Ok(response)
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.trim().chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_rejects_blank_body() {
        let err = parse_json::<serde_json::Value>("https://example.org", "  \n").unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }));
    }

    #[test]
    fn parse_json_reports_url_on_malformed_body() {
        let err = parse_json::<serde_json::Value>("https://example.org/api", "{oops").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse response from https://example.org/api"));
        assert!(err.is_retryable());
    }

    #[test]
    fn response_snippet_truncates_and_prefixes() {
        assert_eq!(response_snippet("  rate limited  ", 4), ": rate");
        assert_eq!(response_snippet("", 10), "");
    }
}
