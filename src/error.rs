use std::path::PathBuf;
use thiserror::Error;

/// Main error type for linesplice edits
#[derive(Error, Debug)]
pub enum EditError {
    #[error("Invalid line range {start}..{end}{}{}", display_len(len), display_path(path))]
    InvalidRange {
        start: usize,
        end: usize,
        len: Option<usize>,
        path: Option<PathBuf>,
    },

    #[error("Invalid pattern `{pattern}`{}: {source}", display_path(path))]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
        path: Option<PathBuf>,
    },

    #[error("Invalid template `{template}`{}: {message}", display_path(path))]
    InvalidTemplate {
        template: String,
        message: String,
        path: Option<PathBuf>,
    },

    #[error("IO error: {source}{}", display_path(path))]
    Io {
        #[source]
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Expected {expected} match(es) of `{pattern}` but found {found}{}", display_path(path))]
    MatchCountMismatch {
        expected: usize,
        found: usize,
        pattern: String,
        path: Option<PathBuf>,
    },

    #[error("File {} changed on disk while the edit was being prepared", path.display())]
    ConcurrentModification { path: PathBuf },

    #[error("Invalid edit plan: {message}")]
    Plan { message: String },
}

fn display_len(len: &Option<usize>) -> String {
    match len {
        Some(len) => format!(" for {}-line document", len),
        None => String::new(),
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" (path: {})", path.display()),
        None => String::new(),
    }
}

impl EditError {
    /// Create a new IO error with path context
    pub fn io_error(err: std::io::Error, path: Option<impl Into<PathBuf>>) -> Self {
        Self::Io {
            source: err,
            path: path.map(|p| p.into()),
        }
    }

    /// Create a range error that is not yet tied to a file. `len` is the
    /// document length when the range was checked against one.
    pub fn invalid_range(start: usize, end: usize, len: Option<usize>) -> Self {
        Self::InvalidRange {
            start,
            end,
            len,
            path: None,
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
            path: None,
        }
    }

    pub fn invalid_template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.into(),
            message: message.into(),
            path: None,
        }
    }

    pub fn plan(message: impl Into<String>) -> Self {
        Self::Plan {
            message: message.into(),
        }
    }

    /// Attach the file being edited to errors raised by the in-memory layer
    pub fn at_path(self, file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        match self {
            Self::InvalidRange {
                start, end, len, ..
            } => Self::InvalidRange {
                start,
                end,
                len,
                path: Some(file),
            },
            Self::InvalidPattern {
                pattern,
                source,
                path: None,
            } => Self::InvalidPattern {
                pattern,
                source,
                path: Some(file),
            },
            Self::InvalidTemplate {
                template,
                message,
                path: None,
            } => Self::InvalidTemplate {
                template,
                message,
                path: Some(file),
            },
            Self::Io { source, path: None } => Self::Io {
                source,
                path: Some(file),
            },
            Self::MatchCountMismatch {
                expected,
                found,
                pattern,
                ..
            } => Self::MatchCountMismatch {
                expected,
                found,
                pattern,
                path: Some(file),
            },
            other => other,
        }
    }

    /// Short machine-readable tag for `--json` error output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRange { .. } => "invalid_range",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::InvalidTemplate { .. } => "invalid_template",
            Self::Io { .. } => "io_error",
            Self::MatchCountMismatch { .. } => "match_count_mismatch",
            Self::ConcurrentModification { .. } => "concurrent_modification",
            Self::Plan { .. } => "invalid_plan",
        }
    }
}

impl From<std::io::Error> for EditError {
    fn from(error: std::io::Error) -> Self {
        EditError::io_error(error, None::<PathBuf>)
    }
}

impl From<toml::de::Error> for EditError {
    fn from(error: toml::de::Error) -> Self {
        EditError::plan(error.to_string())
    }
}

/// Result type alias using EditError
pub type EditResult<T> = Result<T, EditError>;

/// Contextual error mapping function
pub fn map_io_err<P: Into<PathBuf>>(path: P) -> impl FnOnce(std::io::Error) -> EditError {
    let path = path.into();
    move |err| EditError::io_error(err, Some(path))
}
