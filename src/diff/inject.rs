// Regex-anchored injection: insert expanded template text next to every
// non-overlapping match, leaving all other bytes alone.
//
// Matching is textual only. Overlapping matches are never produced by the
// regex iterator; if a pattern could match overlapping spans only the
// leftmost-first, non-overlapping ones are used.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::diff::template::{GroupRef, Template};
use crate::error::{EditError, EditResult};

/// Where the insertion goes relative to a match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Placement {
    Before,
    #[default]
    After,
    BeforeGroup(GroupRef),
    AfterGroup(GroupRef),
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Before => f.write_str("before"),
            Placement::After => f.write_str("after"),
            Placement::BeforeGroup(group) => write!(f, "before-group:{}", group),
            Placement::AfterGroup(group) => write!(f, "after-group:{}", group),
        }
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => return Ok(Placement::Before),
            "after" => return Ok(Placement::After),
            _ => {}
        }
        if let Some(group) = s.strip_prefix("before-group:") {
            return group.parse().map(Placement::BeforeGroup);
        }
        if let Some(group) = s.strip_prefix("after-group:") {
            return group.parse().map(Placement::AfterGroup);
        }
        Err(format!(
            "unknown placement `{}` (expected before, after, before-group:N or after-group:N)",
            s
        ))
    }
}

/// Regex flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternOptions {
    pub dot_matches_new_line: bool,
    pub multi_line: bool,
    pub case_insensitive: bool,
}

/// Compile `pattern`, mapping failures to `InvalidPattern`
pub fn compile_pattern(pattern: &str, options: PatternOptions) -> EditResult<Regex> {
    RegexBuilder::new(pattern)
        .dot_matches_new_line(options.dot_matches_new_line)
        .multi_line(options.multi_line)
        .case_insensitive(options.case_insensitive)
        .build()
        .map_err(|e| EditError::invalid_pattern(pattern, e))
}

/// One applied insertion. Offsets are bytes in the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertionSite {
    pub match_start: usize,
    pub match_end: usize,
    pub offset: usize,
    pub inserted_len: usize,
}

/// Result of running an injector over a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub text: String,
    pub sites: Vec<InsertionSite>,
    /// Matches left alone because a skip guard fired
    pub skipped: usize,
}

impl Injection {
    /// Insertions actually made
    pub fn match_count(&self) -> usize {
        self.sites.len()
    }

    /// Every match of the pattern, skipped or not
    pub fn matches_found(&self) -> usize {
        self.sites.len() + self.skipped
    }
}

/// A validated pattern + placement + template triple
#[derive(Debug, Clone)]
pub struct Injector {
    regex: Regex,
    template: Template,
    placement: Placement,
    anchor: Anchor,
    skip_if: Option<Regex>,
    skip_present: bool,
}

/// Placement resolved against the compiled pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Anchor {
    MatchStart,
    MatchEnd,
    GroupStart(usize),
    GroupEnd(usize),
}

impl Injector {
    /// Compile and cross-check everything up front, so a bad pattern or
    /// template fails before any file is read.
    pub fn new(
        pattern: &str,
        options: PatternOptions,
        placement: Placement,
        template: &str,
    ) -> EditResult<Self> {
        let regex = compile_pattern(pattern, options)?;
        let template = Template::parse(template)?;
        template.validate(&regex)?;

        let resolve = |group: &GroupRef| {
            group.resolve(&regex).ok_or_else(|| {
                EditError::invalid_template(
                    template.as_str(),
                    format!(
                        "placement `{}` refers to a group that does not exist in pattern `{}`",
                        placement, pattern
                    ),
                )
            })
        };
        let anchor = match &placement {
            Placement::Before => Anchor::MatchStart,
            Placement::After => Anchor::MatchEnd,
            Placement::BeforeGroup(group) => Anchor::GroupStart(resolve(group)?),
            Placement::AfterGroup(group) => Anchor::GroupEnd(resolve(group)?),
        };

        Ok(Self {
            regex,
            template,
            placement,
            anchor,
            skip_if: None,
            skip_present: false,
        })
    }

    /// Leave a match alone when `guard` matches somewhere in its text
    pub fn with_skip_if(mut self, guard: &str, options: PatternOptions) -> EditResult<Self> {
        self.skip_if = Some(compile_pattern(guard, options)?);
        Ok(self)
    }

    /// Leave a match alone when its expansion already sits at the insertion
    /// point, so running the same injection twice inserts once
    pub fn with_skip_present(mut self, skip_present: bool) -> Self {
        self.skip_present = skip_present;
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Insert at every match of the pattern in `text`
    pub fn apply(&self, text: &str) -> EditResult<Injection> {
        let mut out = String::with_capacity(text.len());
        let mut sites = Vec::new();
        let mut skipped = 0;
        let mut copied_up_to = 0;
        let mut expansion = String::new();

        for caps in self.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if self.skip_if.as_ref().is_some_and(|guard| guard.is_match(whole.as_str())) {
                skipped += 1;
                continue;
            }

            let offset = match self.anchor {
                Anchor::MatchStart => whole.start(),
                Anchor::MatchEnd => whole.end(),
                Anchor::GroupStart(index) | Anchor::GroupEnd(index) => {
                    let group = caps.get(index).ok_or_else(|| {
                        EditError::invalid_template(
                            self.template.as_str(),
                            format!(
                                "placement `{}` group did not participate in the match at byte {}",
                                self.placement,
                                whole.start()
                            ),
                        )
                    })?;
                    if matches!(self.anchor, Anchor::GroupStart(_)) {
                        group.start()
                    } else {
                        group.end()
                    }
                }
            };

            expansion.clear();
            self.template.expand(&caps, &mut expansion);
            if self.skip_present && already_present(text, offset, &expansion) {
                skipped += 1;
                continue;
            }

            out.push_str(&text[copied_up_to..offset]);
            out.push_str(&expansion);
            sites.push(InsertionSite {
                match_start: whole.start(),
                match_end: whole.end(),
                offset,
                inserted_len: expansion.len(),
            });
            copied_up_to = offset;
        }
        out.push_str(&text[copied_up_to..]);

        debug!(
            "Pattern `{}` matched {} time(s), {} skipped, placement {}",
            self.regex.as_str(),
            sites.len() + skipped,
            skipped,
            self.placement
        );

        Ok(Injection {
            text: out,
            sites,
            skipped,
        })
    }
}

/// An earlier run leaves the expansion right after the insertion point
/// (match-end placements) or right before it (match-start placements).
fn already_present(text: &str, offset: usize, expansion: &str) -> bool {
    !expansion.is_empty()
        && (text[offset..].starts_with(expansion) || text[..offset].ends_with(expansion))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inject(
        text: &str,
        pattern: &str,
        options: PatternOptions,
        placement: Placement,
        template: &str,
    ) -> EditResult<Injection> {
        Injector::new(pattern, options, placement, template)?.apply(text)
    }

    #[test]
    fn test_three_anchors_three_insertions() {
        let text = "<div>\n  <b>a</b>\n</div>\n<b>b</b> <b>c</b>\n";
        let result = inject(text, r"<b>\w</b>", PatternOptions::default(), Placement::After, "<i/>").unwrap();

        assert_eq!(result.match_count(), 3);
        assert_eq!(result.text.matches("<i/>").count(), 3);
        assert_eq!(result.text, "<div>\n  <b>a</b><i/>\n</div>\n<b>b</b><i/> <b>c</b><i/>\n");
        // removing the insertions gives back the input byte for byte
        assert_eq!(result.text.replace("<i/>", ""), text);
        for site in &result.sites {
            assert_eq!(site.offset, site.match_end);
            assert_eq!(site.inserted_len, 4);
        }
    }

    #[test]
    fn test_before_placement() {
        let result = inject("x=1;y=2;", r"\w=", PatternOptions::default(), Placement::Before, "let ").unwrap();
        assert_eq!(result.text, "let x=1;let y=2;");
    }

    #[test]
    fn test_insert_between_groups() {
        // marker goes between the closing of one block and the indentation of the next
        let text = "    return null\n  })()}\n  </div>\n";
        let pattern = r"(return null\s+\}\)\(\)\})\n(\s+)</div>";
        let placement = "after-group:1".parse().unwrap();
        let result = inject(text, pattern, PatternOptions::default(), placement, r"\n$2<span/>").unwrap();

        assert_eq!(result.match_count(), 1);
        assert_eq!(result.text, "    return null\n  })()}\n  <span/>\n  </div>\n");
    }

    #[test]
    fn test_dotall_option() {
        let text = "start\nmiddle\nend";
        let plain = inject(text, "start.*end", PatternOptions::default(), Placement::After, "!").unwrap();
        assert_eq!(plain.match_count(), 0);

        let options = PatternOptions {
            dot_matches_new_line: true,
            ..Default::default()
        };
        let dotall = inject(text, "start.*end", options, Placement::After, "!").unwrap();
        assert_eq!(dotall.text, "start\nmiddle\nend!");
    }

    #[test]
    fn test_zero_matches_is_noop() {
        let result = inject("nothing here", "absent", PatternOptions::default(), Placement::After, "x").unwrap();
        assert_eq!(result.match_count(), 0);
        assert_eq!(result.text, "nothing here");
    }

    #[test]
    fn test_malformed_pattern() {
        let err = Injector::new("(unclosed", PatternOptions::default(), Placement::After, "x").unwrap_err();
        assert!(matches!(err, EditError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_unresolved_template_group() {
        let err = Injector::new(r"(a)", PatternOptions::default(), Placement::After, "$2").unwrap_err();
        assert!(matches!(err, EditError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_unresolved_placement_group() {
        let placement = Placement::AfterGroup(GroupRef::Name("tag".into()));
        let err = Injector::new(r"(a)", PatternOptions::default(), placement, "x").unwrap_err();
        assert!(matches!(err, EditError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_placement_group_not_participating() {
        let placement = Placement::BeforeGroup(GroupRef::Index(2));
        let err = inject("a", r"(a)|(b)", PatternOptions::default(), placement, "x").unwrap_err();
        assert!(err.to_string().contains("did not participate"));
    }

    #[test]
    fn test_placement_parse_round_trip() {
        for text in ["before", "after", "before-group:1", "after-group:name"] {
            assert_eq!(text.parse::<Placement>().unwrap().to_string(), text);
        }
        assert!("middle".parse::<Placement>().is_err());
        assert!("after-group:".parse::<Placement>().is_err());
    }

    #[test]
    fn test_skip_present_makes_rerun_a_noop() {
        let text = "<EditableText value={x} />\n";
        let injector = Injector::new(r"<EditableText\s+", PatternOptions::default(), Placement::After, "sectionId={s} ")
            .unwrap()
            .with_skip_present(true);

        let first = injector.apply(text).unwrap();
        assert_eq!(first.text, "<EditableText sectionId={s} value={x} />\n");
        assert_eq!(first.match_count(), 1);

        let second = injector.apply(&first.text).unwrap();
        assert_eq!(second.text, first.text);
        assert_eq!(second.match_count(), 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(second.matches_found(), 1);
    }

    #[test]
    fn test_skip_present_before_placement() {
        let injector = Injector::new(r"\w+\(\)", PatternOptions::default(), Placement::Before, "await ")
            .unwrap()
            .with_skip_present(true);
        let once = injector.apply("a(); b();").unwrap();
        assert_eq!(once.text, "await a(); await b();");
        assert_eq!(injector.apply(&once.text).unwrap().text, once.text);
    }

    #[test]
    fn test_skip_if_guard() {
        let text = "<EditableText sectionId={a} value={x} />\n<EditableText value={y} />\n";
        let injector = Injector::new(r"<EditableText(\s+)[^>]*/>", PatternOptions::default(), "after-group:1".parse().unwrap(), "sectionId={b} ")
            .unwrap()
            .with_skip_if("sectionId=", PatternOptions::default())
            .unwrap();
        let result = injector.apply(text).unwrap();
        assert_eq!(
            result.text,
            "<EditableText sectionId={a} value={x} />\n<EditableText sectionId={b} value={y} />\n"
        );
        assert_eq!(result.match_count(), 1);
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_bad_skip_guard() {
        let err = Injector::new("a", PatternOptions::default(), Placement::After, "x")
            .unwrap()
            .with_skip_if("(", PatternOptions::default())
            .unwrap_err();
        assert!(matches!(err, EditError::InvalidPattern { .. }));
    }

    #[test]
    fn test_case_insensitive() {
        let options = PatternOptions {
            case_insensitive: true,
            ..Default::default()
        };
        let result = inject("TODO todo", "todo", options, Placement::Before, "// ").unwrap();
        assert_eq!(result.text, "// TODO // todo");
    }
}
