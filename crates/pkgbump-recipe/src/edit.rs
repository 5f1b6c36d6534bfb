use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use crate::state::{COMMIT_PREFIX, RELEASE_PREFIX, RecipeError, RecipeState, VERSION_PREFIX};

const SOURCE_PREFIX: &str = "source=";
const CHECKSUMS_PREFIX: &str = "sha512sums=";
const RUNTIME_PREFIX: &str = "_electron=";
const RUNTIME_TOKEN: &str = "electron";
const CHECKSUM_INDENT: &str = "            ";

/// Package-specific text the rewriter emits besides the resolved values.
#[derive(Debug, Clone)]
pub struct RecipeTemplate {
    /// Artifact URL with `{commit}` and `{version}` placeholders.
    pub source_url: String,
    /// Local file name the artifact is saved under, e.g. `${_appimage}`.
    pub source_alias: String,
    /// Checksum of the second, static source entry.
    pub secondary_checksum: String,
}

impl RecipeTemplate {
    #[must_use]
    pub fn artifact_url(&self, version: &str, commit: &str) -> String {
        self.source_url
            .replace("{commit}", commit)
            .replace("{version}", version)
    }
}

/// Fully resolved values to write into a recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeUpdate {
    pub version: String,
    pub release: u32,
    pub commit: String,
    pub sha512: String,
    /// Runtime identifier such as `electron34`; `None` leaves runtime lines alone.
    pub runtime: Option<String>,
}

pub struct RecipeFile {
    pub path: PathBuf,
    pub content: String,
}

impl RecipeFile {
    pub fn load(path: PathBuf) -> Result<Self, RecipeError> {
        let content = fs::read_to_string(&path).map_err(|source| RecipeError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Ok(Self { path, content })
    }

    pub fn state(&self) -> Result<RecipeState, RecipeError> {
        RecipeState::parse(&self.content)
    }

    /// Compute the rewritten recipe without touching the file.
    pub fn rewrite(
        &self,
        update: &RecipeUpdate,
        template: &RecipeTemplate,
    ) -> Result<RecipeEdit, RecipeError> {
        let mut modified = String::with_capacity(self.content.len() + 256);
        let mut changes = Vec::new();
        let mut checksums: Option<ChecksumBlock> = None;

        for (index, line) in self.content.split_inclusive('\n').enumerate() {
            let (body, ending) = split_line_ending(line);

            if let Some(block) = checksums.as_mut() {
                block.original.push_str(line);
                if closes_array(body) {
                    block.finish(&template.secondary_checksum, ending);
                    if let Some(block) = checksums.take() {
                        block.emit(&mut modified, &mut changes);
                    }
                }
                continue;
            }

            if body.starts_with(CHECKSUMS_PREFIX) {
                let mut block = ChecksumBlock::open(index + 1, line, &update.sha512, ending);
                if closes_array(body) {
                    block.finish(&template.secondary_checksum, ending);
                    block.emit(&mut modified, &mut changes);
                } else {
                    checksums = Some(block);
                }
                continue;
            }

            match replace_line(body, update, template) {
                Some((field, replacement)) => {
                    if replacement != body {
                        changes.push(format!("{field}: {} -> {}", body.trim(), replacement.trim()));
                    }
                    modified.push_str(&replacement);
                    modified.push_str(ending);
                }
                None => modified.push_str(line),
            }
        }

        if let Some(block) = checksums {
            return Err(RecipeError::UnterminatedChecksums { line: block.line });
        }

        Ok(RecipeEdit {
            original: self.content.clone(),
            modified,
            changes,
        })
    }

    /// Persist an edit. Nothing is written when the edit changes nothing.
    pub fn apply_edit(&mut self, edit: &RecipeEdit) -> Result<(), RecipeError> {
        if !edit.has_changes() {
            return Ok(());
        }

        fs::write(&self.path, &edit.modified).map_err(|source| RecipeError::Write {
            path: self.path.display().to_string(),
            source,
        })?;
        self.content.clone_from(&edit.modified);

        Ok(())
    }
}

pub struct RecipeEdit {
    pub original: String,
    pub modified: String,
    pub changes: Vec<String>,
}

impl RecipeEdit {
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.original != self.modified
    }

    #[must_use]
    pub fn diff_preview(&self) -> String {
        if !self.has_changes() {
            return "No changes needed.".to_string();
        }

        let mut preview = String::new();

        for change in &self.changes {
            let _ = writeln!(preview, "+ {change}");
        }

        preview
    }
}

struct ChecksumBlock {
    line: usize,
    original: String,
    replacement: String,
}

impl ChecksumBlock {
    fn open(line: usize, original: &str, sha512: &str, ending: &str) -> Self {
        let ending = if ending.is_empty() { "\n" } else { ending };
        Self {
            line,
            original: original.to_string(),
            replacement: format!("{CHECKSUMS_PREFIX}('{sha512}'{ending}"),
        }
    }

    fn finish(&mut self, secondary_checksum: &str, ending: &str) {
        let _ = write!(
            self.replacement,
            "{CHECKSUM_INDENT}'{secondary_checksum}'){ending}"
        );
    }

    fn emit(self, modified: &mut String, changes: &mut Vec<String>) {
        if self.replacement != self.original {
            changes.push(format!("{CHECKSUMS_PREFIX} block at line {} replaced", self.line));
        }
        modified.push_str(&self.replacement);
    }
}

fn replace_line(
    body: &str,
    update: &RecipeUpdate,
    template: &RecipeTemplate,
) -> Option<(&'static str, String)> {
    if body.starts_with(VERSION_PREFIX) {
        return Some((VERSION_PREFIX, format!("{VERSION_PREFIX}{}", update.version)));
    }
    if body.starts_with(RELEASE_PREFIX) {
        return Some((RELEASE_PREFIX, format!("{RELEASE_PREFIX}{}", update.release)));
    }
    if body.starts_with(COMMIT_PREFIX) {
        return Some((COMMIT_PREFIX, format!("{COMMIT_PREFIX}{}", update.commit)));
    }
    if body.starts_with(SOURCE_PREFIX) {
        let url = template.artifact_url(&update.version, &update.commit);
        return Some((
            SOURCE_PREFIX,
            format!("{SOURCE_PREFIX}(\"{}::{url}\"", template.source_alias),
        ));
    }

    let runtime = update.runtime.as_deref()?;
    if body.starts_with(RUNTIME_PREFIX) {
        return Some((RUNTIME_PREFIX, format!("{RUNTIME_PREFIX}{runtime}")));
    }
    if body.trim_start().starts_with("echo") {
        return replace_runtime_token(body, runtime).map(|line| ("echo", line));
    }

    None
}

/// Replace every `electron<digits>` token in `line`. Returns `None` when the
/// line has no such token.
fn replace_runtime_token(line: &str, runtime: &str) -> Option<String> {
    let mut result = String::with_capacity(line.len());
    let mut rest = line;
    let mut found = false;

    while let Some(start) = rest.find(RUNTIME_TOKEN) {
        let after = &rest[start + RUNTIME_TOKEN.len()..];
        let digits = after
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after.len());

        if digits == 0 {
            result.push_str(&rest[..start + RUNTIME_TOKEN.len()]);
            rest = after;
            continue;
        }

        found = true;
        result.push_str(&rest[..start]);
        result.push_str(runtime);
        rest = &after[digits..];
    }

    result.push_str(rest);
    found.then_some(result)
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

fn closes_array(body: &str) -> bool {
    body.trim_end().ends_with(')')
}
