use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use linesplice::diff::{Injector, LineRange, PatternOptions, Placement};
use linesplice::{
    apply_plan_file, inject_with, replace_range_with, EditError, EditOptions, InjectSummary,
    PlanSummary, ReplaceSummary,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace a range of lines with new text
    Replace {
        /// File to edit
        file: PathBuf,

        /// First line to replace (zero-based)
        #[arg(long, requires = "end", conflicts_with = "lines")]
        start: Option<usize>,

        /// Line after the last one to replace (zero-based, exclusive)
        #[arg(long, requires = "start")]
        end: Option<usize>,

        /// Lines to replace as FIRST-LAST, one-based and inclusive
        #[arg(long, value_name = "FIRST-LAST")]
        lines: Option<LineRange>,

        /// Replacement text (read from stdin when neither --with nor --with-file is given)
        #[arg(long = "with", value_name = "TEXT", conflicts_with = "with_file")]
        with_text: Option<String>,

        /// File holding the replacement text
        #[arg(long, value_name = "PATH")]
        with_file: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Insert text next to every match of a pattern
    Inject {
        /// File to edit
        file: PathBuf,

        /// Regular expression locating the anchor
        #[arg(short, long)]
        pattern: String,

        /// before, after, before-group:N or after-group:N
        #[arg(long, default_value = "after")]
        placement: Placement,

        /// Text to insert; may use $1, ${name}, $$ and \n
        #[arg(short, long, conflicts_with = "template_file")]
        template: Option<String>,

        /// File holding the template
        #[arg(long, value_name = "PATH")]
        template_file: Option<PathBuf>,

        /// Let `.` match newlines
        #[arg(long)]
        dotall: bool,

        /// Let ^ and $ match at line boundaries
        #[arg(long)]
        multiline: bool,

        /// Match case-insensitively
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Fail unless exactly this many matches are found
        #[arg(long, value_name = "N")]
        expect: Option<usize>,

        /// Leave matches whose text matches this pattern alone
        #[arg(long, value_name = "RE")]
        skip_if: Option<String>,

        /// Leave matches alone when the insertion is already there
        #[arg(long)]
        skip_present: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Apply a TOML edit plan in one atomic write
    Apply {
        /// Plan file
        plan: PathBuf,

        /// Target file, overriding the plan's `file`
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Default match count for inject steps without `expect`
        #[arg(long, value_name = "N")]
        expect: Option<usize>,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Clone, Copy)]
struct OutputArgs {
    /// Show what would change without writing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print a unified diff of the change
    #[arg(long)]
    diff: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Skip the check that the file did not change while editing
    #[arg(long)]
    no_check: bool,
}

impl Commands {
    fn output(&self) -> &OutputArgs {
        match self {
            Commands::Replace { output, .. }
            | Commands::Inject { output, .. }
            | Commands::Apply { output, .. } => output,
        }
    }
}

impl OutputArgs {
    fn options(&self, expect_matches: Option<usize>) -> EditOptions {
        EditOptions {
            dry_run: self.dry_run,
            expect_matches,
            check_unchanged: !self.no_check,
            with_diff: self.diff,
        }
    }
}

fn read_text(inline: Option<String>, file: Option<&Path>, what: &str) -> Result<String> {
    if let Some(text) = inline {
        return Ok(text);
    }
    if let Some(file) = file {
        return std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {} from {}", what, file.display()));
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .with_context(|| format!("Failed to read {} from stdin", what))?;
    Ok(text)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_diff(diff: Option<&str>) {
    if let Some(diff) = diff {
        print!("{}", diff);
    }
}

fn verb(written: bool, changed: bool) -> &'static str {
    match (written, changed) {
        (true, _) => "",
        (false, true) => " (dry run)",
        (false, false) => " (no change)",
    }
}

fn report_replace(summary: &ReplaceSummary, output: &OutputArgs) -> Result<()> {
    if output.json {
        return print_json(summary);
    }
    print_diff(summary.diff.as_deref());
    let action = if summary.range.is_empty() {
        format!("Inserted {}", summary.range)
    } else {
        format!("Replaced lines {}", summary.range)
    };
    println!(
        "{} in {}: removed {}, inserted {}, net {:+} lines{}",
        action,
        summary.path.display(),
        summary.lines_removed,
        summary.lines_inserted,
        summary.net_delta,
        verb(summary.written, summary.changed)
    );
    Ok(())
}

fn report_inject(summary: &InjectSummary, output: &OutputArgs) -> Result<()> {
    if output.json {
        return print_json(summary);
    }
    print_diff(summary.diff.as_deref());
    let skipped = match summary.skipped {
        0 => String::new(),
        n => format!(", skipped {} already present", n),
    };
    println!(
        "Injected at {} match(es) of `{}` in {}{}{}",
        summary.match_count,
        summary.pattern,
        summary.path.display(),
        skipped,
        verb(summary.written, summary.changed)
    );
    Ok(())
}

fn report_plan(summary: &PlanSummary, output: &OutputArgs) -> Result<()> {
    if output.json {
        return print_json(summary);
    }
    print_diff(summary.diff.as_deref());
    println!(
        "Applied {} step(s) to {}{}",
        summary.steps.len(),
        summary.path.display(),
        verb(summary.written, summary.changed)
    );
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Replace {
            file,
            start,
            end,
            lines,
            with_text,
            with_file,
            output,
        } => {
            let range = match (start, end, lines) {
                (Some(start), Some(end), None) => {
                    LineRange::new(start, end).map_err(|e| e.at_path(&file))?
                }
                (None, None, Some(lines)) => lines,
                _ => anyhow::bail!("give either --start and --end, or --lines FIRST-LAST"),
            };
            let replacement = read_text(with_text, with_file.as_deref(), "replacement")?;
            let summary = replace_range_with(&file, range, &replacement, &output.options(None))?;
            report_replace(&summary, &output)
        }

        Commands::Inject {
            file,
            pattern,
            placement,
            template,
            template_file,
            dotall,
            multiline,
            ignore_case,
            expect,
            skip_if,
            skip_present,
            output,
        } => {
            if template.is_none() && template_file.is_none() {
                anyhow::bail!("give the insertion text with --template or --template-file");
            }
            let template = read_text(template, template_file.as_deref(), "template")?;
            let options = PatternOptions {
                dot_matches_new_line: dotall,
                multi_line: multiline,
                case_insensitive: ignore_case,
            };
            let mut injector = Injector::new(&pattern, options, placement, &template)
                .map_err(|e| e.at_path(&file))?
                .with_skip_present(skip_present);
            if let Some(guard) = skip_if {
                injector = injector
                    .with_skip_if(&guard, options)
                    .map_err(|e| e.at_path(&file))?;
            }
            let summary = inject_with(&file, &injector, &output.options(expect))?;
            report_inject(&summary, &output)
        }

        Commands::Apply {
            plan,
            file,
            expect,
            output,
        } => {
            let summary = apply_plan_file(&plan, file.as_deref(), &output.options(expect))
                .with_context(|| format!("Failed to apply plan {}", plan.display()))?;
            report_plan(&summary, &output)
        }
    }
}

#[derive(Serialize)]
struct ErrorReport {
    error: &'static str,
    message: String,
}

fn edit_error(err: &anyhow::Error) -> Option<&EditError> {
    err.chain().find_map(|cause| cause.downcast_ref::<EditError>())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    linesplice::init_logging(cli.verbose);
    let json = cli.command.output().json;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let cause = edit_error(&err);
            if json {
                let report = ErrorReport {
                    error: cause.map_or("error", EditError::kind),
                    message: format!("{:#}", err),
                };
                if print_json(&report).is_err() {
                    eprintln!("error: {:#}", err);
                }
            } else {
                eprintln!("error: {:#}", err);
            }
            // a stale anchor is distinguishable from other failures
            let stale_anchor = matches!(cause, Some(EditError::MatchCountMismatch { .. }));
            if stale_anchor {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
