use log::{debug, warn};
use pkgbump_recipe::{RecipeFields, RecipeState};

use crate::http::{FetchError, fetch_text};
use crate::retry::RetryPolicy;

/// What the published mirror copy of the recipe declares. Either all three
/// fields are known or none are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorState {
    recipe: Option<RecipeState>,
}

impl MirrorState {
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn known(recipe: RecipeState) -> Self {
        Self {
            recipe: Some(recipe),
        }
    }

    /// Interpret mirror recipe text. An incomplete recipe counts as absent.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let fields = RecipeFields::scan(content);
        if !fields.is_complete() {
            warn!("Unable to find version, release, or commit in mirror recipe");
            return Self::absent();
        }

        match fields.into_state() {
            Ok(recipe) => Self::known(recipe),
            Err(error) => {
                warn!("Mirror recipe is unusable: {error}");
                Self::absent()
            }
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.recipe.is_some()
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.recipe.as_ref().map(|recipe| recipe.version.as_str())
    }

    #[must_use]
    pub fn release(&self) -> Option<u32> {
        self.recipe.as_ref().map(|recipe| recipe.release)
    }

    #[must_use]
    pub fn commit(&self) -> Option<&str> {
        self.recipe.as_ref().map(|recipe| recipe.commit.as_str())
    }
}

/// Fetch the mirror copy of the recipe. Never fails: any error is logged and
/// yields [`MirrorState::absent`].
pub async fn fetch_mirror_state(
    client: &reqwest::Client,
    url: &str,
    policy: RetryPolicy,
) -> MirrorState {
    let fetched = policy
        .run(
            "mirror recipe fetch",
            |_| fetch_text(client, url),
            FetchError::is_retryable,
        )
        .await;

    match fetched {
        Ok(content) => {
            let state = MirrorState::parse(&content);
            debug!(
                "Mirror version: {:?}, release: {:?}, commit: {:?}",
                state.version(),
                state.release(),
                state.commit()
            );
            state
        }
        Err(error) => {
            warn!("Error fetching mirror recipe: {error}");
            MirrorState::absent()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_recipe_is_known() {
        let state = MirrorState::parse("pkgver=1.2.0\npkgrel=2\n_commit=aaa\n");
        assert!(state.is_known());
        assert_eq!(state.version(), Some("1.2.0"));
        assert_eq!(state.release(), Some(2));
        assert_eq!(state.commit(), Some("aaa"));
    }

    #[test]
    fn partial_recipe_is_absent() {
        let state = MirrorState::parse("pkgver=1.2.0\npkgrel=2\n");
        assert_eq!(state, MirrorState::absent());
        assert_eq!(state.version(), None);
    }

    #[test]
    fn error_page_is_absent() {
        let state = MirrorState::parse("<html><body>502 Bad Gateway</body></html>");
        assert!(!state.is_known());
    }
}
