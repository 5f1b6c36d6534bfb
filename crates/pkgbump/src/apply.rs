use log::{debug, info, warn};
use pkgbump_core::{CheckOutput, download_artifact};
use pkgbump_recipe::{RecipeFile, RecipeUpdate};

use crate::Session;
use crate::error::AppError;

/// Rewrite the recipe from a handoff document. Returns whether an update was
/// applied. Every value is resolved before the file is touched.
pub async fn run_apply(session: &Session, output: &CheckOutput) -> Result<bool, AppError> {
    if !output.update_needed {
        info!("No update needed.");
        return Ok(false);
    }

    let settings = &session.settings;
    let mut recipe = RecipeFile::load(session.recipe_path.clone())?;
    match recipe.state() {
        Ok(current) if current != output.local_state() => warn!(
            "Recipe changed since the check (now version {}, release {}, commit {})",
            current.version, current.release, current.commit
        ),
        Ok(_) => {}
        Err(error) => warn!("Current recipe is incomplete: {error}"),
    }

    let new = output.new_state();
    let template = settings.recipe_template();
    let artifact_url = template.artifact_url(&new.version, &new.commit);

    let artifact = download_artifact(
        &session.client,
        &artifact_url,
        settings.download_timeout(),
        settings.download_retry(),
    )
    .await?;
    let sha512 = artifact.sha512_hex();
    debug!("Calculated SHA512 of {}: {sha512}", artifact.url);

    let runtime = if session.track_runtime {
        Some(
            settings
                .runtime_resolver()
                .resolve(&session.client, &artifact.bytes)
                .await,
        )
    } else {
        None
    };
    drop(artifact);

    let update = RecipeUpdate {
        version: new.version,
        release: new.release,
        commit: new.commit,
        sha512,
        runtime,
    };

    let edit = recipe.rewrite(&update, &template)?;
    debug!("Recipe changes:\n{}", edit.diff_preview());
    recipe.apply_edit(&edit)?;

    info!(
        "PKGBUILD updated to version {} (release {}) with commit {}",
        update.version, update.release, update.commit
    );
    Ok(true)
}
