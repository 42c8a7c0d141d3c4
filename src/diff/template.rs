// Insertion templates: literal text with `$N` / `${name}` capture group
// references and a few backslash escapes.

use regex::{Captures, Regex};
use std::fmt;
use std::str::FromStr;

use crate::error::{EditError, EditResult};

/// Reference to a capture group, by index or by name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupRef {
    Index(usize),
    Name(String),
}

impl GroupRef {
    /// Index of the group in `regex`, or `None` if the pattern has no such group
    pub fn resolve(&self, regex: &Regex) -> Option<usize> {
        match self {
            GroupRef::Index(index) => (*index < regex.captures_len()).then_some(*index),
            GroupRef::Name(name) => regex
                .capture_names()
                .position(|candidate| candidate == Some(name.as_str())),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRef::Index(index) => write!(f, "{}", index),
            GroupRef::Name(name) => f.write_str(name),
        }
    }
}

impl FromStr for GroupRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty group reference".to_string());
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(GroupRef::Index)
                .map_err(|_| format!("group index `{}` is too large", s));
        }
        if s.chars().all(is_name_char) {
            return Ok(GroupRef::Name(s.to_string()));
        }
        Err(format!("`{}` is not a valid group name", s))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Group(GroupRef),
}

/// Parsed insertion template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`. Only syntax is checked here; group existence is checked
    /// against a pattern by [`Template::validate`].
    pub fn parse(source: &str) -> EditResult<Self> {
        let fail = |message: String| EditError::invalid_template(source, message);
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => match chars.peek().map(|&(_, next)| next) {
                    Some('n') => {
                        literal.push('\n');
                        chars.next();
                    }
                    Some('t') => {
                        literal.push('\t');
                        chars.next();
                    }
                    Some('\\') => {
                        literal.push('\\');
                        chars.next();
                    }
                    _ => literal.push('\\'),
                },
                '$' => {
                    let group = match chars.peek().map(|&(_, next)| next) {
                        Some('$') => {
                            chars.next();
                            literal.push('$');
                            continue;
                        }
                        Some('{') => {
                            chars.next();
                            let mut name = String::new();
                            loop {
                                match chars.next() {
                                    Some((_, '}')) => break,
                                    Some((_, ch)) => name.push(ch),
                                    None => {
                                        return Err(fail(format!(
                                            "unclosed `${{` at byte {}",
                                            offset
                                        )))
                                    }
                                }
                            }
                            name
                        }
                        _ => {
                            let mut name = String::new();
                            while let Some(&(_, ch)) = chars.peek() {
                                if !is_name_char(ch) {
                                    break;
                                }
                                name.push(ch);
                                chars.next();
                            }
                            if name.is_empty() {
                                return Err(fail(format!(
                                    "`$` at byte {} is not followed by a group reference (use `$$` for a literal `$`)",
                                    offset
                                )));
                            }
                            name
                        }
                    };
                    let group = group.parse::<GroupRef>().map_err(fail)?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Group(group));
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Group references in order of appearance
    pub fn groups(&self) -> impl Iterator<Item = &GroupRef> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Group(group) => Some(group),
            Segment::Literal(_) => None,
        })
    }

    /// Fail with `InvalidTemplate` if any reference names a group `regex` lacks
    pub fn validate(&self, regex: &Regex) -> EditResult<()> {
        for group in self.groups() {
            if group.resolve(regex).is_none() {
                return Err(EditError::invalid_template(
                    &self.source,
                    format!(
                        "group `{}` does not exist in pattern `{}` ({} group(s) defined)",
                        group,
                        regex.as_str(),
                        regex.captures_len() - 1
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Append the expansion for one match to `out`. Groups that did not take
    /// part in the match expand to nothing. Call [`Template::validate`] first.
    pub fn expand(&self, caps: &Captures<'_>, out: &mut String) {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Group(GroupRef::Index(index)) => {
                    if let Some(m) = caps.get(*index) {
                        out.push_str(m.as_str());
                    }
                }
                Segment::Group(GroupRef::Name(name)) => {
                    if let Some(m) = caps.name(name) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
    }
}
