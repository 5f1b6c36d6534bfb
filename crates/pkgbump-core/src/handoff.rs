use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use pkgbump_recipe::RecipeState;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mirror::MirrorState;
use crate::policy::{UpdateDecision, UpdateTrigger};
use crate::release::ReleaseInfo;

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("failed to read handoff file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write handoff file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("handoff file {path} is not valid: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize handoff: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Result of the check phase, persisted for the write phase.
///
/// The `aur_*` fields describe the mirror copy of the recipe and are `null`
/// when it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutput {
    pub update_needed: bool,
    #[serde(default)]
    pub trigger: Option<UpdateTrigger>,
    pub local_version: String,
    #[serde(deserialize_with = "release_number")]
    pub local_rel: u32,
    pub local_commit: String,
    pub latest_version: String,
    pub latest_commit: String,
    pub download_url: String,
    pub aur_version: Option<String>,
    #[serde(default, deserialize_with = "optional_release_number")]
    pub aur_rel: Option<u32>,
    pub aur_commit: Option<String>,
    pub new_version: String,
    #[serde(deserialize_with = "release_number")]
    pub new_rel: u32,
    pub new_commit: String,
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
}

/// Release counters are written as numbers, but older check runs wrote them
/// as strings (`"3"`). Both are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReleaseField {
    Number(u32),
    Text(String),
}

impl ReleaseField {
    fn into_release<E: de::Error>(self) -> Result<u32, E> {
        match self {
            Self::Number(release) => Ok(release),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid release counter `{text}`"))),
        }
    }
}

fn release_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    ReleaseField::deserialize(deserializer)?.into_release()
}

fn optional_release_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    Option::<ReleaseField>::deserialize(deserializer)?
        .map(ReleaseField::into_release)
        .transpose()
}

impl CheckOutput {
    #[must_use]
    pub fn new(
        local: &RecipeState,
        mirror: &MirrorState,
        release: &ReleaseInfo,
        decision: &UpdateDecision,
    ) -> Self {
        Self {
            update_needed: decision.update_needed(),
            trigger: decision.trigger,
            local_version: local.version.clone(),
            local_rel: local.release,
            local_commit: local.commit.clone(),
            latest_version: release.version.clone(),
            latest_commit: release.commit.clone(),
            download_url: release.download_url.clone(),
            aur_version: mirror.version().map(str::to_string),
            aur_rel: mirror.release(),
            aur_commit: mirror.commit().map(str::to_string),
            new_version: decision.new.version.clone(),
            new_rel: decision.new.release,
            new_commit: decision.new.commit.clone(),
            checked_at: Some(Utc::now()),
        }
    }

    #[must_use]
    pub fn local_state(&self) -> RecipeState {
        RecipeState {
            version: self.local_version.clone(),
            release: self.local_rel,
            commit: self.local_commit.clone(),
        }
    }

    #[must_use]
    pub fn new_state(&self) -> RecipeState {
        RecipeState {
            version: self.new_version.clone(),
            release: self.new_rel,
            commit: self.new_commit.clone(),
        }
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a valid
    /// handoff document.
    pub fn read(path: &Path) -> Result<Self, HandoffError> {
        let content = fs::read_to_string(path).map_err(|source| HandoffError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| HandoffError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// # Errors
    /// Returns an error if the document cannot be serialized or written.
    pub fn write(&self, path: &Path) -> Result<(), HandoffError> {
        let mut content = serde_json::to_string_pretty(self).map_err(HandoffError::Serialize)?;
        content.push('\n');

        fs::write(path, content).map_err(|source| HandoffError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}
