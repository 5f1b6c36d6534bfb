use log::{debug, info};
use pkgbump_core::{CheckOutput, decide, fetch_latest_release, fetch_mirror_state};
use pkgbump_recipe::RecipeState;

use crate::Session;
use crate::error::AppError;

/// Compare upstream, local and mirror state and persist the outcome to the
/// handoff file.
pub async fn run_check(session: &Session) -> Result<CheckOutput, AppError> {
    let settings = &session.settings;

    let release = fetch_latest_release(
        &session.client,
        &settings.release_endpoint(),
        settings.release_retry(),
    )
    .await?;
    debug!("Latest commit: {}", release.commit);
    debug!("Latest version: {}", release.version);
    debug!("Download URL: {}", release.download_url);

    let local = RecipeState::read(&session.recipe_path)?;
    info!(
        "Local recipe: version {}, release {}, commit {}",
        local.version, local.release, local.commit
    );

    let mirror = fetch_mirror_state(
        &session.client,
        &settings.mirror_url,
        settings.mirror_retry(),
    )
    .await;

    let decision = decide(&session.decision, &local, &mirror, &release)?;
    match decision.trigger {
        Some(trigger) => info!(
            "Update needed ({trigger:?}): version {}, release {}, commit {}",
            decision.new.version, decision.new.release, decision.new.commit
        ),
        None => info!("Recipe is up to date with upstream {}", release.version),
    }

    let output = CheckOutput::new(&local, &mirror, &release, &decision);
    output.write(&session.handoff_path)?;
    debug!(
        "Check output written to {}",
        session.handoff_path.display()
    );

    Ok(output)
}
