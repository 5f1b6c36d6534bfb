//! Decide whether the recipe is stale and what it should declare next.
//!
//! Three signals feed the decision:
//! - `commit_changed`: upstream commit differs from the mirror's commit.
//! - `manual_bump`: mirror and local agree on version and commit but the local
//!   release counter is ahead, i.e. someone bumped `pkgrel` by hand.
//! - `version_changed` (version-based mode only): upstream version differs
//!   from the local one, optionally only when strictly newer.
//!
//! An unreachable mirror makes `commit_changed` true, so a missing baseline
//! errs on the side of updating.

use std::cmp::Ordering;

use log::{debug, warn};
use pkgbump_recipe::RecipeState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mirror::MirrorState;
use crate::release::ReleaseInfo;
use crate::version::compare_versions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionConfig {
    /// Detect updates from commit changes (default). When off, fall back to
    /// version-based detection.
    pub commit_based: bool,
    /// In version-based mode, only accept strictly newer upstream versions.
    pub version_protection: bool,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            commit_based: true,
            version_protection: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateTrigger {
    VersionChange,
    CommitChange,
    ManualBump,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateDecision {
    pub trigger: Option<UpdateTrigger>,
    /// Values the recipe should carry after this run.
    pub new: RecipeState,
}

impl UpdateDecision {
    #[must_use]
    pub fn update_needed(&self) -> bool {
        self.trigger.is_some()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("release counter {release} cannot be incremented")]
    ReleaseOverflow { release: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Signals {
    version_changed: bool,
    commit_changed: bool,
    manual_bump: bool,
}

impl Signals {
    fn evaluate(
        config: &DecisionConfig,
        local: &RecipeState,
        mirror: &MirrorState,
        upstream: &ReleaseInfo,
    ) -> Self {
        let manual_bump = mirror.version() == Some(local.version.as_str())
            && mirror.commit() == Some(local.commit.as_str())
            && mirror.release().is_some_and(|release| local.release > release);

        let commit_changed = mirror.commit() != Some(upstream.commit.as_str());

        let version_changed = !config.commit_based
            && upstream.version != local.version
            && (!config.version_protection || is_newer(&upstream.version, &local.version));

        Self {
            version_changed,
            commit_changed,
            manual_bump,
        }
    }

    fn trigger(self, config: &DecisionConfig) -> Option<UpdateTrigger> {
        if config.commit_based {
            if self.manual_bump {
                Some(UpdateTrigger::ManualBump)
            } else if self.commit_changed {
                Some(UpdateTrigger::CommitChange)
            } else {
                None
            }
        } else if self.version_changed {
            Some(UpdateTrigger::VersionChange)
        } else if self.commit_changed {
            Some(UpdateTrigger::CommitChange)
        } else if self.manual_bump {
            Some(UpdateTrigger::ManualBump)
        } else {
            None
        }
    }
}

/// Combine local, mirror and upstream state into an update decision.
///
/// # Errors
/// Returns an error if the local release counter cannot be incremented.
pub fn decide(
    config: &DecisionConfig,
    local: &RecipeState,
    mirror: &MirrorState,
    upstream: &ReleaseInfo,
) -> Result<UpdateDecision, PolicyError> {
    let signals = Signals::evaluate(config, local, mirror, upstream);
    let trigger = signals.trigger(config);

    debug!(
        "Commit-based updates: {}, version protection: {}",
        config.commit_based, config.version_protection
    );
    debug!(
        "Version change: {}, commit change: {}, manual release bump: {}",
        signals.version_changed, signals.commit_changed, signals.manual_bump
    );

    let new = match (trigger, config.commit_based) {
        (None | Some(UpdateTrigger::ManualBump), _) => local.clone(),
        (Some(UpdateTrigger::VersionChange), _) => RecipeState {
            version: upstream.version.clone(),
            release: 1,
            commit: upstream.commit.clone(),
        },
        (Some(UpdateTrigger::CommitChange), true) => RecipeState {
            version: upstream.version.clone(),
            release: next_release(local.release)?,
            commit: upstream.commit.clone(),
        },
        (Some(UpdateTrigger::CommitChange), false) => RecipeState {
            version: local.version.clone(),
            release: next_release(local.release)?,
            commit: upstream.commit.clone(),
        },
    };

    debug!(
        "New version: {}, new release: {}, new commit: {}",
        new.version, new.release, new.commit
    );

    Ok(UpdateDecision { trigger, new })
}

fn next_release(release: u32) -> Result<u32, PolicyError> {
    release
        .checked_add(1)
        .ok_or(PolicyError::ReleaseOverflow { release })
}

fn is_newer(candidate: &str, current: &str) -> bool {
    match compare_versions(candidate, current) {
        Some(ordering) => ordering == Ordering::Greater,
        None => {
            warn!("Invalid version format: {candidate} or {current}");
            false
        }
    }
}
