// Line ranges and the record of a single splice.
// Offsets are zero-based and half-open; one-based inclusive forms are only
// used at the edges (CLI, plans, messages).

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{EditError, EditResult};

/// Half-open span `[start, end)` of zero-based line offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LineRange {
    start: usize,
    end: usize,
}

impl LineRange {
    /// Create a range, rejecting `end < start`
    pub fn new(start: usize, end: usize) -> EditResult<Self> {
        if end < start {
            return Err(EditError::invalid_range(start, end, None));
        }
        Ok(Self { start, end })
    }

    /// Empty range: insert before line `at` without deleting anything
    pub fn insertion(at: usize) -> Self {
        Self { start: at, end: at }
    }

    /// Convert the one-based, inclusive `first..=last` numbering editors show.
    /// `last == first - 1` selects no lines and inserts before `first`.
    pub fn from_one_based(first: usize, last: usize) -> EditResult<Self> {
        if first == 0 || last < first - 1 {
            return Err(EditError::invalid_range(first.saturating_sub(1), last, None));
        }
        Ok(Self {
            start: first - 1,
            end: last,
        })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Fail with `InvalidRange` unless the range fits a document of `len` lines
    pub fn check_within(&self, len: usize) -> EditResult<()> {
        if self.end > len {
            return Err(EditError::invalid_range(self.start, self.end, Some(len)));
        }
        Ok(())
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "before line {}", self.start + 1)
        } else {
            write!(f, "{}-{}", self.start + 1, self.end)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected FIRST-LAST or LINE (one-based), got `{0}`")]
pub struct ParseRangeError(String);

impl FromStr for LineRange {
    type Err = ParseRangeError;

    /// Parse `FIRST-LAST` or a single `LINE`, both one-based and inclusive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRangeError(s.to_string());
        let (first, last) = match s.split_once('-') {
            Some((first, last)) => (first.trim(), last.trim()),
            None => (s.trim(), s.trim()),
        };
        let first = first.parse::<usize>().map_err(|_| err())?;
        let last = last.parse::<usize>().map_err(|_| err())?;
        LineRange::from_one_based(first, last).map_err(|_| err())
    }
}

/// What a replacement did to the line count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Splice {
    pub range: LineRange,
    pub lines_removed: usize,
    pub lines_inserted: usize,
}

impl Splice {
    pub fn new(range: LineRange, lines_removed: usize, lines_inserted: usize) -> Self {
        Self {
            range,
            lines_removed,
            lines_inserted,
        }
    }

    pub fn net_delta(&self) -> isize {
        self.lines_inserted as isize - self.lines_removed as isize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = LineRange::new(4, 2).unwrap_err();
        assert!(matches!(err, EditError::InvalidRange { start: 4, end: 2, .. }));
    }

    #[test]
    fn test_one_based_conversion() {
        // "lines 1160-1684" in an editor
        let range = LineRange::from_one_based(1160, 1684).unwrap();
        assert_eq!(range.start(), 1159);
        assert_eq!(range.end(), 1684);
        assert_eq!(range.len(), 525);
        assert_eq!(range.to_string(), "1160-1684");
    }

    #[test]
    fn test_one_based_insertion() {
        let range = LineRange::from_one_based(3, 2).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.start(), 2);
        assert_eq!(range.to_string(), "before line 3");
    }

    #[test]
    fn test_one_based_rejects_zero_and_inverted() {
        assert!(LineRange::from_one_based(0, 4).is_err());
        assert!(LineRange::from_one_based(5, 2).is_err());
    }

    #[test]
    fn test_one_based_accepts_largest_last_line() {
        let range = LineRange::from_one_based(1, usize::MAX).unwrap();
        assert_eq!(range.start(), 0);
        assert_eq!(range.end(), usize::MAX);

        let parsed: LineRange = format!("1-{}", usize::MAX).parse().unwrap();
        assert_eq!(parsed, range);
        assert!(matches!(
            parsed.check_within(3),
            Err(EditError::InvalidRange { len: Some(3), .. })
        ));
    }

    #[test]
    fn test_check_within() {
        let range = LineRange::new(2, 5).unwrap();
        assert!(range.check_within(5).is_ok());
        assert!(matches!(
            range.check_within(4),
            Err(EditError::InvalidRange { len: Some(4), .. })
        ));
        assert!(LineRange::insertion(0).check_within(0).is_ok());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("994-1066".parse::<LineRange>().unwrap(), LineRange::new(993, 1066).unwrap());
        assert_eq!("7".parse::<LineRange>().unwrap(), LineRange::new(6, 7).unwrap());
        assert!("-3".parse::<LineRange>().is_err());
        assert!("a-b".parse::<LineRange>().is_err());
        assert!("0-2".parse::<LineRange>().is_err());
    }

    #[test]
    fn test_net_delta() {
        let splice = Splice::new(LineRange::new(1159, 1684).unwrap(), 525, 67);
        assert_eq!(splice.net_delta(), -458);
    }
}
