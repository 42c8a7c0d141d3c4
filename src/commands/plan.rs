// Edit plans: a TOML list of replace/inject steps applied in order to one
// in-memory document, followed by a single atomic write.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::commands::edit_command::{check_match_count, commit, EditOptions};
use crate::diff::{Document, Injector, LineRange, PatternOptions, Placement};
use crate::error::{map_io_err, EditError, EditResult};
use crate::utils::fs::read_snapshot;

/// Plan file as written by the user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditPlan {
    /// File to edit, relative to the plan's directory
    #[serde(default)]
    pub file: Option<PathBuf>,

    #[serde(default, rename = "edit")]
    pub edits: Vec<PlanStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PlanStep {
    Replace(ReplaceStep),
    Inject(InjectStep),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplaceStep {
    /// Zero-based, half-open
    pub start: Option<usize>,
    pub end: Option<usize>,
    /// One-based, inclusive
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub replacement: Option<String>,
    pub replacement_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InjectStep {
    pub pattern: String,
    #[serde(default)]
    pub placement: Option<String>,
    pub template: Option<String>,
    pub template_file: Option<PathBuf>,
    #[serde(default)]
    pub dot_matches_new_line: bool,
    #[serde(default)]
    pub multi_line: bool,
    #[serde(default)]
    pub case_insensitive: bool,
    pub expect: Option<usize>,
    /// Leave matches whose text matches this pattern alone
    pub skip_if: Option<String>,
    /// Leave matches alone when the insertion is already there
    #[serde(default)]
    pub skip_present: bool,
}

/// A step with every input resolved and validated
#[derive(Debug, Clone)]
enum PreparedStep {
    Replace {
        range: LineRange,
        replacement: Document,
    },
    Inject {
        injector: Injector,
        expect: Option<usize>,
    },
}

/// What one step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepOutcome {
    Replace {
        range: LineRange,
        lines_removed: usize,
        lines_inserted: usize,
    },
    Inject {
        pattern: String,
        match_count: usize,
        skipped: usize,
    },
}

/// Outcome of [`apply_plan`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub path: PathBuf,
    pub steps: Vec<StepOutcome>,
    pub changed: bool,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl EditPlan {
    /// Read and parse a plan file
    pub fn load(path: impl AsRef<Path>) -> EditResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(map_io_err(path))?;
        let plan: EditPlan = toml::from_str(&content).map_err(|e| {
            EditError::plan(format!("{}: {}", path.display(), e))
        })?;
        debug!("Loaded plan {} with {} step(s)", path.display(), plan.edits.len());
        Ok(plan)
    }

    pub fn parse(content: &str) -> EditResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve every step relative to `base_dir` and validate patterns,
    /// templates and ranges before the target is read.
    fn prepare(&self, base_dir: &Path) -> EditResult<Vec<PreparedStep>> {
        self.edits
            .iter()
            .enumerate()
            .map(|(index, step)| {
                prepare_step(step, base_dir).map_err(|e| match e {
                    EditError::Plan { message } => {
                        EditError::plan(format!("step {}: {}", index + 1, message))
                    }
                    other => other,
                })
            })
            .collect()
    }
}

fn prepare_step(step: &PlanStep, base_dir: &Path) -> EditResult<PreparedStep> {
    match step {
        PlanStep::Replace(step) => {
            let range = match (step.start, step.end, step.first, step.last) {
                (Some(start), Some(end), None, None) => LineRange::new(start, end)?,
                (None, None, Some(first), Some(last)) => LineRange::from_one_based(first, last)?,
                _ => {
                    return Err(EditError::plan(
                        "replace needs either `start` and `end` or `first` and `last`",
                    ))
                }
            };
            let replacement = text_source(
                step.replacement.as_deref(),
                step.replacement_file.as_deref(),
                base_dir,
                "replacement",
            )?;
            Ok(PreparedStep::Replace {
                range,
                replacement: Document::parse(&replacement),
            })
        }
        PlanStep::Inject(step) => {
            let placement = match &step.placement {
                Some(placement) => placement.parse::<Placement>().map_err(EditError::plan)?,
                None => Placement::default(),
            };
            let template = text_source(
                step.template.as_deref(),
                step.template_file.as_deref(),
                base_dir,
                "template",
            )?;
            let options = PatternOptions {
                dot_matches_new_line: step.dot_matches_new_line,
                multi_line: step.multi_line,
                case_insensitive: step.case_insensitive,
            };
            let mut injector = Injector::new(&step.pattern, options, placement, &template)?
                .with_skip_present(step.skip_present);
            if let Some(guard) = &step.skip_if {
                injector = injector.with_skip_if(guard, options)?;
            }
            Ok(PreparedStep::Inject {
                injector,
                expect: step.expect,
            })
        }
    }
}

/// Exactly one of an inline value or a file holding it
fn text_source(
    inline: Option<&str>,
    file: Option<&Path>,
    base_dir: &Path,
    what: &str,
) -> EditResult<String> {
    match (inline, file) {
        (Some(text), None) => Ok(text.to_string()),
        (None, Some(file)) => {
            let path = base_dir.join(file);
            fs::read_to_string(&path).map_err(map_io_err(path))
        }
        (Some(_), Some(_)) => Err(EditError::plan(format!(
            "give either `{what}` or `{what}_file`, not both"
        ))),
        (None, None) => Err(EditError::plan(format!("missing `{what}` or `{what}_file`"))),
    }
}

/// Load `plan_path` and apply it. `target` overrides the plan's `file`.
pub fn apply_plan_file(
    plan_path: impl AsRef<Path>,
    target: Option<&Path>,
    options: &EditOptions,
) -> EditResult<PlanSummary> {
    let plan_path = plan_path.as_ref();
    let plan = EditPlan::load(plan_path)?;
    let base_dir = match plan_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    apply_plan(&plan, base_dir, target, options)
}

/// Apply every step of `plan` to one document and write it once
pub fn apply_plan(
    plan: &EditPlan,
    base_dir: &Path,
    target: Option<&Path>,
    options: &EditOptions,
) -> EditResult<PlanSummary> {
    let path = match (target, &plan.file) {
        (Some(target), _) => target.to_path_buf(),
        (None, Some(file)) => base_dir.join(file),
        (None, None) => {
            return Err(EditError::plan(
                "no target file: set `file` in the plan or pass one explicitly",
            ))
        }
    };

    let steps = plan.prepare(base_dir).map_err(|e| e.at_path(&path))?;
    if steps.is_empty() {
        warn!("Plan for {} has no steps", path.display());
    }

    let snapshot = read_snapshot(&path)?;
    let mut text = snapshot.text.clone();
    let mut outcomes = Vec::with_capacity(steps.len());

    for (index, step) in steps.iter().enumerate() {
        let outcome = match step {
            PreparedStep::Replace { range, replacement } => {
                let (updated, splice) = Document::parse(&text)
                    .replace_range(*range, replacement)
                    .map_err(|e| e.at_path(&path))?;
                text = updated.to_text();
                StepOutcome::Replace {
                    range: *range,
                    lines_removed: splice.lines_removed,
                    lines_inserted: splice.lines_inserted,
                }
            }
            PreparedStep::Inject { injector, expect } => {
                let injection = injector.apply(&text).map_err(|e| e.at_path(&path))?;
                let expect = expect.or(options.expect_matches);
                check_match_count(injector, expect, injection.matches_found())
                    .map_err(|e| e.at_path(&path))?;
                let match_count = injection.match_count();
                text = injection.text;
                StepOutcome::Inject {
                    pattern: injector.pattern().to_string(),
                    match_count,
                    skipped: injection.skipped,
                }
            }
        };
        debug!("Step {} on {}: {:?}", index + 1, path.display(), outcome);
        outcomes.push(outcome);
    }

    let commit = commit(&snapshot, &text, options)?;
    info!("Applied {} step(s) to {}", outcomes.len(), path.display());

    Ok(PlanSummary {
        path,
        steps: outcomes,
        changed: text != snapshot.text,
        written: commit.written,
        diff: commit.diff,
    })
}
