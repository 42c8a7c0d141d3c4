// linesplice - atomic line-range replacement and regex-anchored injection
// for text files

pub mod commands;
pub mod diff;
pub mod error;
pub mod utils;

pub use commands::{
    apply_plan, apply_plan_file, inject_by_pattern, inject_with, replace_range, replace_range_with,
    EditOptions, EditPlan, InjectSummary, PlanSummary, ReplaceSummary,
};
pub use diff::{Document, Injector, LineRange, PatternOptions, Placement};
pub use error::{EditError, EditResult};

use tracing::debug;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Install the stderr log subscriber used by the command-line tool.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between `debug` and
/// `warn` for this crate. Library callers bring their own subscriber.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "linesplice=debug" } else { "linesplice=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so stdout carries only results
    let installed = fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(verbose)
        .without_time()
        .try_init()
        .is_ok();

    if installed {
        debug!("linesplice v{} logging initialized", version());
    }
}
