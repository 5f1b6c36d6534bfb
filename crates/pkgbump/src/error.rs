use pkgbump_core::{ArtifactError, FetchError, HandoffError, PolicyError, ReleaseError};
use pkgbump_recipe::RecipeError;
use thiserror::Error;

use crate::settings::SettingsError;

/// Every failure that aborts a run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Client(#[from] FetchError),
    #[error(transparent)]
    Release(#[from] ReleaseError),
    #[error(transparent)]
    Recipe(#[from] RecipeError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}
