use std::fs;
use std::path::Path;
use thiserror::Error;

pub(crate) const VERSION_PREFIX: &str = "pkgver=";
pub(crate) const RELEASE_PREFIX: &str = "pkgrel=";
pub(crate) const COMMIT_PREFIX: &str = "_commit=";

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("failed to read recipe {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write recipe {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recipe has no usable `{0}` line")]
    MissingField(&'static str),

    #[error("recipe checksum block starting at line {line} is never closed")]
    UnterminatedChecksums { line: usize },
}

/// The three fields that identify what a recipe currently packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeState {
    pub version: String,
    pub release: u32,
    pub commit: String,
}

/// Fields found while scanning a recipe. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFields {
    pub version: Option<String>,
    pub release: Option<u32>,
    pub commit: Option<String>,
}

impl RecipeFields {
    /// Scan recipe text line by line. The first usable line for each field
    /// wins; lines that carry the prefix but no usable value are skipped.
    #[must_use]
    pub fn scan(content: &str) -> Self {
        let mut fields = Self::default();

        for line in content.lines() {
            if fields.version.is_none() {
                fields.version = line.strip_prefix(VERSION_PREFIX).and_then(parse_version);
            }
            if fields.release.is_none() {
                fields.release = line.strip_prefix(RELEASE_PREFIX).and_then(parse_release);
            }
            if fields.commit.is_none() {
                fields.commit = line.strip_prefix(COMMIT_PREFIX).and_then(parse_commit);
            }
        }

        fields
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.version.is_some() && self.release.is_some() && self.commit.is_some()
    }

    pub fn into_state(self) -> Result<RecipeState, RecipeError> {
        Ok(RecipeState {
            version: self
                .version
                .ok_or(RecipeError::MissingField(VERSION_PREFIX))?,
            release: self
                .release
                .ok_or(RecipeError::MissingField(RELEASE_PREFIX))?,
            commit: self.commit.ok_or(RecipeError::MissingField(COMMIT_PREFIX))?,
        })
    }
}

impl RecipeState {
    /// Extract version, release counter and commit from recipe text.
    pub fn parse(content: &str) -> Result<Self, RecipeError> {
        RecipeFields::scan(content).into_state()
    }

    pub fn read(path: &Path) -> Result<Self, RecipeError> {
        let content = fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }
}

fn parse_version(rest: &str) -> Option<String> {
    let version = rest.trim();
    (!version.is_empty()).then(|| version.to_string())
}

fn parse_release(rest: &str) -> Option<u32> {
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..digits_end].parse().ok()
}

fn parse_commit(rest: &str) -> Option<String> {
    let hex_end = rest
        .find(|c: char| !matches!(c, '0'..='9' | 'a'..='f'))
        .unwrap_or(rest.len());
    (hex_end > 0).then(|| rest[..hex_end].to_string())
}
