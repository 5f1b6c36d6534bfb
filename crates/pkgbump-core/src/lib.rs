//! Update-check logic for pkgbump.
//!
//! This crate holds everything between the network and the recipe file:
//! - Upstream release discovery and the mirror copy of the recipe.
//! - The update decision policy.
//! - Artifact download, hashing and bundled-runtime resolution.
//! - The handoff file shared by the check and write phases.

pub mod artifact;
mod handoff;
mod http;
mod mirror;
pub mod policy;
mod release;
mod retry;
pub mod runtime;
mod version;

/// Artifact download and digest helpers.
pub use artifact::{Artifact, ArtifactError, download_artifact, sha512_hex};
/// Check-phase output persisted for the write phase.
pub use handoff::{CheckOutput, HandoffError};
/// Shared HTTP client construction and fetch errors.
pub use http::{FetchError, build_client, fetch_json, fetch_text};
/// Public mirror recipe lookup.
pub use mirror::{MirrorState, fetch_mirror_state};
/// Update decision policy.
pub use policy::{DecisionConfig, PolicyError, UpdateDecision, UpdateTrigger, decide};
/// Upstream release model and fetch helper.
pub use release::{ReleaseEndpoint, ReleaseError, ReleaseInfo, fetch_latest_release};
/// Bounded retry policy used by every network call.
pub use retry::{Backoff, RetryPolicy};
/// Bundled runtime resolution.
pub use runtime::{ExtractorCommand, ManifestLookup, RuntimeError, RuntimeResolver};
/// Version ordering used by the version-based policy.
pub use version::compare_versions;
