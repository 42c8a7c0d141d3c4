use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::diff::{unified_diff, Document, Injector, LineRange, PatternOptions, Placement};
use crate::error::{EditError, EditResult};
use crate::utils::fs::{read_snapshot, write_atomic, Snapshot};

/// Knobs shared by every file-level edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOptions {
    /// Compute and report, never write
    pub dry_run: bool,
    /// Injection must find exactly this many matches
    pub expect_matches: Option<usize>,
    /// Abort if the file's digest changed between read and rename
    pub check_unchanged: bool,
    /// Include a unified diff in the summary
    pub with_diff: bool,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            expect_matches: None,
            check_unchanged: true,
            with_diff: false,
        }
    }
}

/// Outcome of [`replace_range`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceSummary {
    pub path: PathBuf,
    pub range: LineRange,
    pub lines_removed: usize,
    pub lines_inserted: usize,
    pub net_delta: isize,
    pub changed: bool,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Outcome of [`inject_by_pattern`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectSummary {
    pub path: PathBuf,
    pub pattern: String,
    pub match_count: usize,
    pub skipped: usize,
    pub changed: bool,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Whether the new text reached disk, plus the optional preview
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Commit {
    pub written: bool,
    pub diff: Option<String>,
}

/// Write `new_text` over the snapshot's file unless nothing changed or this is
/// a dry run.
pub(crate) fn commit(snapshot: &Snapshot, new_text: &str, options: &EditOptions) -> EditResult<Commit> {
    let diff = options
        .with_diff
        .then(|| unified_diff(&snapshot.path.to_string_lossy(), &snapshot.text, new_text));

    if new_text == snapshot.text {
        debug!("No changes for {}", snapshot.path.display());
        return Ok(Commit { written: false, diff });
    }
    if options.dry_run {
        info!("Dry run, not writing {}", snapshot.path.display());
        return Ok(Commit { written: false, diff });
    }

    let expected = options.check_unchanged.then_some(snapshot.digest.as_str());
    write_atomic(&snapshot.path, new_text, expected)?;
    info!("Wrote {} ({} bytes)", snapshot.path.display(), new_text.len());

    Ok(Commit { written: true, diff })
}

/// Fail with `MatchCountMismatch` unless `found` is what the caller expects.
/// `found` counts skipped matches too, so a rerun still sees its anchors.
pub(crate) fn check_match_count(
    injector: &Injector,
    expected: Option<usize>,
    found: usize,
) -> EditResult<()> {
    match expected {
        Some(expected) if expected != found => Err(EditError::MatchCountMismatch {
            expected,
            found,
            pattern: injector.pattern().to_string(),
            path: None,
        }),
        _ => Ok(()),
    }
}

/// Replace lines `[start_line, end_line)` of `document_path` with `replacement_text`
pub fn replace_range(
    document_path: impl AsRef<Path>,
    start_line: usize,
    end_line: usize,
    replacement_text: &str,
) -> EditResult<ReplaceSummary> {
    let range = LineRange::new(start_line, end_line)
        .map_err(|e| e.at_path(document_path.as_ref()))?;
    replace_range_with(document_path, range, replacement_text, &EditOptions::default())
}

/// [`replace_range`] with explicit options
pub fn replace_range_with(
    document_path: impl AsRef<Path>,
    range: LineRange,
    replacement_text: &str,
    options: &EditOptions,
) -> EditResult<ReplaceSummary> {
    let path = document_path.as_ref();
    debug!("Replacing lines {} in {}", range, path.display());

    let snapshot = read_snapshot(path)?;
    let document = Document::parse(&snapshot.text);
    let replacement = Document::parse(replacement_text);

    let (updated, splice) = document
        .replace_range(range, &replacement)
        .map_err(|e| e.at_path(path))?;
    let new_text = updated.to_text();
    let commit = commit(&snapshot, &new_text, options)?;

    info!(
        "Replaced lines {} in {}: removed {}, inserted {}, net {:+}",
        range,
        path.display(),
        splice.lines_removed,
        splice.lines_inserted,
        splice.net_delta()
    );

    Ok(ReplaceSummary {
        path: path.to_path_buf(),
        range,
        lines_removed: splice.lines_removed,
        lines_inserted: splice.lines_inserted,
        net_delta: splice.net_delta(),
        changed: new_text != snapshot.text,
        written: commit.written,
        diff: commit.diff,
    })
}

/// Insert `insertion_template` at every match of `pattern` in `document_path`,
/// positioned by `anchor_context`
pub fn inject_by_pattern(
    document_path: impl AsRef<Path>,
    pattern: &str,
    anchor_context: Placement,
    insertion_template: &str,
) -> EditResult<InjectSummary> {
    let injector = Injector::new(
        pattern,
        PatternOptions::default(),
        anchor_context,
        insertion_template,
    )
    .map_err(|e| e.at_path(document_path.as_ref()))?;
    inject_with(document_path, &injector, &EditOptions::default())
}

/// Run a prepared [`Injector`] against a file
pub fn inject_with(
    document_path: impl AsRef<Path>,
    injector: &Injector,
    options: &EditOptions,
) -> EditResult<InjectSummary> {
    let path = document_path.as_ref();
    debug!(
        "Injecting {} `{}` in {}",
        injector.placement(),
        injector.pattern(),
        path.display()
    );

    let snapshot = read_snapshot(path)?;
    let injection = injector.apply(&snapshot.text).map_err(|e| e.at_path(path))?;
    let match_count = injection.match_count();

    check_match_count(injector, options.expect_matches, injection.matches_found())
        .map_err(|e| e.at_path(path))?;

    if injection.matches_found() == 0 {
        warn!(
            "Pattern `{}` matched nothing in {}; the anchor may be stale",
            injector.pattern(),
            path.display()
        );
    }

    let commit = commit(&snapshot, &injection.text, options)?;

    info!(
        "Injected at {} match(es) of `{}` in {} ({} skipped)",
        match_count,
        injector.pattern(),
        path.display(),
        injection.skipped
    );

    Ok(InjectSummary {
        path: path.to_path_buf(),
        pattern: injector.pattern().to_string(),
        match_count,
        skipped: injection.skipped,
        changed: injection.text != snapshot.text,
        written: commit.written,
        diff: commit.diff,
    })
}
