//! URI template matcher (spec §4.5, §3 "Resource Template").
//!
//! Patterns are RFC-6570-like: `{name}` captures one path segment,
//! `{name*}` is a wildcard that captures the (possibly multi-segment,
//! possibly empty) remainder, and `{name=default}` marks a variable whose
//! segment may be absent from the incoming URI, substituting `default`
//! when it is. Only `{name*}` may appear as the final segment of a
//! pattern.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{ServerError, ServerResult};

/// A single `{...}` variable parsed out of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVariable {
    /// Variable name.
    pub name: String,
    /// `true` for a `{name*}` wildcard capture.
    pub wildcard: bool,
    /// Default value for a `{name=default}` variable, if any.
    pub default: Option<String>,
}

/// A pattern compiled to a regex plus its ordered variable list.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    /// Variables in pattern (left-to-right) order.
    pub variables: Vec<TemplateVariable>,
}

impl CompiledPattern {
    /// Compile `pattern` into a matchable regex.
    pub fn compile(pattern: &str) -> ServerResult<Self> {
        let segments: Vec<&str> = pattern.split('/').collect();
        let mut variables = Vec::new();
        let mut regex_parts = Vec::new();

        for (idx, segment) in segments.iter().enumerate() {
            let is_last = idx == segments.len() - 1;

            if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if let Some(name) = inner.strip_suffix('*') {
                    if !is_last {
                        return Err(ServerError::handler(format!(
                            "wildcard variable '{name}' must be the final segment of pattern '{pattern}'"
                        )));
                    }
                    variables.push(TemplateVariable {
                        name: name.to_string(),
                        wildcard: true,
                        default: None,
                    });
                    regex_parts.push(format!("(?P<{}>.*)", regex_group_name(name)));
                } else if let Some((name, default)) = inner.split_once('=') {
                    variables.push(TemplateVariable {
                        name: name.to_string(),
                        wildcard: false,
                        default: Some(default.to_string()),
                    });
                    regex_parts.push(format!("(?P<{}>[^/]*)", regex_group_name(name)));
                } else {
                    variables.push(TemplateVariable {
                        name: inner.to_string(),
                        wildcard: false,
                        default: None,
                    });
                    regex_parts.push(format!("(?P<{}>[^/]+)", regex_group_name(inner)));
                }
            } else {
                regex_parts.push(regex::escape(segment));
            }
        }

        let full = format!("^{}$", regex_parts.join("/"));
        let regex = Regex::new(&full)
            .map_err(|e| ServerError::handler(format!("invalid template pattern '{pattern}': {e}")))?;

        Ok(Self { regex, variables })
    }

    /// Attempt to match `uri`, returning bound variable values (with
    /// defaults substituted for absent-but-defaulted variables) on success.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        let mut bindings = HashMap::new();
        for var in &self.variables {
            let group = regex_group_name(&var.name);
            let captured = captures.name(&group).map(|m| m.as_str().to_string());
            let value = match (captured, &var.default) {
                (Some(v), _) if !v.is_empty() => v,
                (_, Some(default)) => default.clone(),
                (Some(v), None) => v,
                (None, None) => continue,
            };
            bindings.insert(var.name.clone(), value);
        }
        Some(bindings)
    }

    /// Number of variables not satisfied by a wildcard or a default — the
    /// minimum arity a handler must accept (spec §4.5 "Handler argument
    /// list ... wildcard and default-only variables reducing the required
    /// arity").
    pub fn required_arity(&self) -> usize {
        self.variables
            .iter()
            .filter(|v| !v.wildcard && v.default.is_none())
            .count()
    }
}

/// `regex`'s named-group syntax only allows `[A-Za-z0-9_]`; template
/// variable names are already identifier-like in every example in this
/// corpus, but sanitize defensively rather than panic on an edge case.
fn regex_group_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Matches an incoming URI against a set of compiled patterns in
/// registration order, first match wins (spec §4.5 "Tie-break: registration
/// order for identical-specificity patterns").
#[derive(Debug, Default)]
pub struct UriTemplateMatcher<Id: Clone> {
    entries: Vec<(Id, CompiledPattern)>,
}

impl<Id: Clone> UriTemplateMatcher<Id> {
    /// Construct an empty matcher.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a compiled pattern under `id`, appended after any existing
    /// entries (preserving registration order for tie-breaking).
    pub fn register(&mut self, id: Id, pattern: CompiledPattern) {
        self.entries.push((id, pattern));
    }

    /// Remove every entry registered under `id`.
    pub fn remove(&mut self, predicate: impl Fn(&Id) -> bool) {
        self.entries.retain(|(id, _)| !predicate(id));
    }

    /// Try each registered pattern in order, returning the first match.
    pub fn match_uri(&self, uri: &str) -> Option<(Id, HashMap<String, String>)> {
        for (id, pattern) in &self.entries {
            if let Some(bindings) = pattern.matches(uri) {
                return Some((id.clone(), bindings));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_variable_captures_one_segment() {
        let pattern = CompiledPattern::compile("/files/{name}").unwrap();
        let bindings = pattern.matches("/files/report.txt").unwrap();
        assert_eq!(bindings["name"], "report.txt");
    }

    #[test]
    fn simple_variable_rejects_extra_segments() {
        let pattern = CompiledPattern::compile("/files/{name}").unwrap();
        assert!(pattern.matches("/files/a/b").is_none());
    }

    #[test]
    fn wildcard_captures_multi_segment_remainder() {
        let pattern = CompiledPattern::compile("/files/{path*}").unwrap();
        let bindings = pattern.matches("/files/a/b/c").unwrap();
        assert_eq!(bindings["path"], "a/b/c");
    }

    #[test]
    fn wildcard_may_capture_empty_remainder() {
        let pattern = CompiledPattern::compile("/files/{path*}").unwrap();
        let bindings = pattern.matches("/files/").unwrap();
        assert_eq!(bindings["path"], "");
    }

    #[test]
    fn default_value_fills_absent_variable() {
        let pattern = CompiledPattern::compile("/list/{page=1}").unwrap();
        let bindings = pattern.matches("/list/").unwrap();
        assert_eq!(bindings["page"], "1");
    }

    #[test]
    fn default_value_is_overridden_when_present() {
        let pattern = CompiledPattern::compile("/list/{page=1}").unwrap();
        let bindings = pattern.matches("/list/7").unwrap();
        assert_eq!(bindings["page"], "7");
    }

    #[test]
    fn wildcard_must_be_final_segment() {
        let err = CompiledPattern::compile("/{path*}/files").unwrap_err();
        assert!(matches!(err, ServerError::Handler { .. }));
    }

    #[test]
    fn required_arity_excludes_wildcard_and_default_variables() {
        let pattern = CompiledPattern::compile("/a/{id}/{page=1}/{rest*}").unwrap();
        assert_eq!(pattern.required_arity(), 1);
    }

    #[test]
    fn first_registered_match_wins_on_tie() {
        let mut matcher: UriTemplateMatcher<&'static str> = UriTemplateMatcher::new();
        matcher.register("first", CompiledPattern::compile("/a/{x}").unwrap());
        matcher.register("second", CompiledPattern::compile("/a/{y}").unwrap());
        let (id, _) = matcher.match_uri("/a/1").unwrap();
        assert_eq!(id, "first");
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    /// A single path segment made of characters that can't themselves
    /// collide with `/`, `{`, or `}` so the pattern stays unambiguous.
    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_-]{1,12}"
    }

    proptest! {
        /// A pattern with one plain variable always round-trips: whatever
        /// segment is substituted for `{name}` is exactly what `matches`
        /// binds back out.
        #[test]
        fn single_variable_round_trips(name in segment()) {
            let pattern = CompiledPattern::compile("/files/{id}").unwrap();
            let uri = format!("/files/{name}");
            let bindings = pattern.matches(&uri).unwrap();
            prop_assert_eq!(&bindings["id"], &name);
        }

        /// A wildcard capture always binds the full, slash-joined
        /// remainder back out verbatim.
        #[test]
        fn wildcard_round_trips_joined_segments(segments in prop::collection::vec(segment(), 0..5)) {
            let pattern = CompiledPattern::compile("/files/{rest*}").unwrap();
            let remainder = segments.join("/");
            let uri = format!("/files/{remainder}");
            let bindings = pattern.matches(&uri).unwrap();
            prop_assert_eq!(&bindings["rest"], &remainder);
        }

        /// A URI with more segments than the pattern never matches,
        /// regardless of what those segments contain.
        #[test]
        fn extra_trailing_segment_never_matches(name in segment(), extra in segment()) {
            let pattern = CompiledPattern::compile("/files/{id}").unwrap();
            let uri = format!("/files/{name}/{extra}");
            prop_assert!(pattern.matches(&uri).is_none());
        }
    }
}
