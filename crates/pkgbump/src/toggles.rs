//! Feature toggles read from the environment.
//!
//! CI workflows set these as plain strings, so parsing is lenient: a value
//! that is empty or not a recognized boolean counts as `false` and produces a
//! warning instead of aborting the run.

pub const DEBUG: &str = "DEBUG";
pub const VERSION_PROTECTION: &str = "VERSION_PROTECTION";
pub const COMMIT_BASED_UPDATES: &str = "COMMIT_BASED_UPDATES";
pub const TRACK_RUNTIME: &str = "TRACK_RUNTIME";

/// Toggle values found in the environment. `None` means the variable is unset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvToggles {
    pub debug: Option<bool>,
    pub version_protection: Option<bool>,
    pub commit_based_updates: Option<bool>,
    pub track_runtime: Option<bool>,
    pub warnings: Vec<String>,
}

impl EnvToggles {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| {
            std::env::var_os(name).map(|value| value.to_string_lossy().into_owned())
        })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut warnings = Vec::new();
        let mut read = |name: &str| {
            let raw = lookup(name)?;
            Some(parse_toggle(&raw).unwrap_or_else(|| {
                warnings.push(format!(
                    "Unrecognized value `{raw}` for {name}, treating it as false"
                ));
                false
            }))
        };

        let debug = read(DEBUG);
        let version_protection = read(VERSION_PROTECTION);
        let commit_based_updates = read(COMMIT_BASED_UPDATES);
        let track_runtime = read(TRACK_RUNTIME);

        Self {
            debug,
            version_protection,
            commit_based_updates,
            track_runtime,
            warnings,
        }
    }
}

/// Case-insensitive `true/1/yes/on` and `false/0/no/off`. Anything else,
/// including an empty string, is not a boolean.
pub fn parse_toggle(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A command-line flag wins over the environment, which wins over settings.
pub fn resolve(flag: bool, env: Option<bool>, configured: bool) -> bool {
    flag || env.unwrap_or(configured)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{EnvToggles, parse_toggle, resolve};

    fn toggles(pairs: &[(&str, &str)]) -> EnvToggles {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        EnvToggles::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn boolean_spellings_are_recognized() {
        for raw in ["true", "TRUE", "1", "yes", "On", " true "] {
            assert_eq!(parse_toggle(raw), Some(true), "{raw}");
        }
        for raw in ["false", "False", "0", "no", "OFF"] {
            assert_eq!(parse_toggle(raw), Some(false), "{raw}");
        }
        for raw in ["", "express:*", "maybe", "2"] {
            assert_eq!(parse_toggle(raw), None, "{raw}");
        }
    }

    #[test]
    fn unset_variables_stay_unset() {
        let env = toggles(&[]);
        assert_eq!(env, EnvToggles::default());
    }

    #[test]
    fn unrecognized_values_count_as_false_with_a_warning() {
        let env = toggles(&[
            ("DEBUG", "express:*"),
            ("COMMIT_BASED_UPDATES", ""),
            ("TRACK_RUNTIME", "yes"),
        ]);

        assert_eq!(env.debug, Some(false));
        assert_eq!(env.commit_based_updates, Some(false));
        assert_eq!(env.track_runtime, Some(true));
        assert_eq!(env.version_protection, None);
        assert_eq!(
            env.warnings,
            vec![
                "Unrecognized value `express:*` for DEBUG, treating it as false".to_string(),
                "Unrecognized value `` for COMMIT_BASED_UPDATES, treating it as false".to_string(),
            ]
        );
    }

    #[test]
    fn flag_overrides_environment_which_overrides_settings() {
        assert!(resolve(true, Some(false), false));
        assert!(!resolve(false, Some(false), true));
        assert!(resolve(false, Some(true), false));
        assert!(resolve(false, None, true));
        assert!(!resolve(false, None, false));
    }
}
