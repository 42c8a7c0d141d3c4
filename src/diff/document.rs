// In-memory model of a text file as an ordered sequence of lines.
// Every line keeps its own terminator so serialization is byte-exact.

use crate::diff::range::{LineRange, Splice};
use crate::error::EditResult;

/// Full content of a text file, one entry per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
}

impl Document {
    /// Split text into lines. `\n` and `\r\n` stay attached to their line; the
    /// last line may have no terminator. Empty text is a zero-line document.
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.split_inclusive('\n').map(str::to_owned).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Terminator used by the first terminated line, if any
    pub fn line_ending(&self) -> Option<&'static str> {
        self.lines.iter().find_map(|line| terminator_of(line))
    }

    /// Serialized form, the concatenation of all lines
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }

    /// Replace `range` with `replacement`, returning the new document.
    /// `self` is left untouched.
    pub fn replace_range(
        &self,
        range: LineRange,
        replacement: &Document,
    ) -> EditResult<(Document, Splice)> {
        range.check_within(self.len())?;

        let eol = self
            .line_ending()
            .or_else(|| replacement.line_ending())
            .unwrap_or("\n");

        let mut lines =
            Vec::with_capacity(self.len() - range.len() + replacement.len());
        let head = &self.lines[..range.start()];
        let tail = &self.lines[range.end()..];

        for line in head.iter().chain(replacement.lines.iter()).chain(tail) {
            // A line only ends without a terminator when it was the last one;
            // once something follows it, it needs one.
            if let Some(previous) = lines.last_mut() {
                terminate(previous, eol);
            }
            lines.push(line.clone());
        }

        let splice = Splice::new(range, range.len(), replacement.len());
        Ok((Self { lines }, splice))
    }
}

fn terminator_of(line: &str) -> Option<&'static str> {
    if line.ends_with("\r\n") {
        Some("\r\n")
    } else if line.ends_with('\n') {
        Some("\n")
    } else {
        None
    }
}

fn terminate(line: &mut String, eol: &str) {
    if terminator_of(line).is_none() {
        line.push_str(eol);
    }
}
