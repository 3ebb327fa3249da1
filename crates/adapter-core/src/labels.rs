//! Label sets and label selectors.
//!
//! Selectors follow the familiar `key=value,key!=value,key in (a,b)` syntax.
//! A selector is a conjunction: every requirement must hold.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A set of labels attached to a metric.
pub type Labels = BTreeMap<String, String>;

/// Stable string form of a label set: sorted `k=v` pairs joined by `,`.
///
/// Two label maps with the same pairs always produce the same key,
/// regardless of how they were built.
pub fn canonical_labels(labels: &Labels) -> String {
    let mut pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(",")
}

/// A single selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &Labels) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::In(k, values) => labels.get(k).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(k, values) => labels.get(k).is_none_or(|v| !values.contains(v)),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Requirement::Equals(k, v) => write!(f, "{k}={v}"),
            Requirement::NotEquals(k, v) => write!(f, "{k}!={v}"),
            Requirement::In(k, values) => write!(f, "{k} in ({})", join(values)),
            Requirement::NotIn(k, values) => write!(f, "{k} notin ({})", join(values)),
            Requirement::Exists(k) => write!(f, "{k}"),
            Requirement::DoesNotExist(k) => write!(f, "!{k}"),
        }
    }
}

/// A conjunction of label requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// A selector with no requirements; matches every label set.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Equality requirements for every pair in `labels`.
    pub fn from_labels(labels: &Labels) -> Self {
        Self {
            requirements: labels
                .iter()
                .map(|(k, v)| Requirement::Equals(k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn with(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Whether `labels` satisfies every requirement.
    ///
    /// An empty label set only matches a selector without requirements.
    pub fn matches(&self, labels: &Labels) -> bool {
        if labels.is_empty() {
            return self.requirements.is_empty();
        }
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for Selector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut selector = Selector::everything();
        for term in split_terms(s) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            selector.requirements.push(parse_term(s, term)?);
        }
        Ok(selector)
    }
}

/// Split on commas that are not inside a `( … )` value list.
fn split_terms(s: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    terms.push(&s[start..]);
    terms
}

fn parse_term(selector: &str, term: &str) -> Result<Requirement, CoreError> {
    let invalid = |reason: &str| CoreError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{reason} in term {term:?}"),
    };

    for (op, negated) in [(" notin ", true), (" in ", false)] {
        if let Some((key, values)) = split_set_term(term, op) {
            let key = valid_key(key).ok_or_else(|| invalid("empty key"))?;
            let values = parse_set(values).ok_or_else(|| invalid("malformed value list"))?;
            return Ok(if negated {
                Requirement::NotIn(key, values)
            } else {
                Requirement::In(key, values)
            });
        }
    }
    if let Some((key, value)) = term.split_once("!=") {
        let key = valid_key(key).ok_or_else(|| invalid("empty key"))?;
        return Ok(Requirement::NotEquals(key, value.trim().to_string()));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        let key = valid_key(key).ok_or_else(|| invalid("empty key"))?;
        return Ok(Requirement::Equals(key, value.trim().to_string()));
    }
    if let Some(key) = term.strip_prefix('!') {
        let key = valid_key(key).ok_or_else(|| invalid("empty key"))?;
        return Ok(Requirement::DoesNotExist(key));
    }
    let key = valid_key(term).ok_or_else(|| invalid("empty key"))?;
    if key.contains(char::is_whitespace) {
        return Err(invalid("unexpected whitespace"));
    }
    Ok(Requirement::Exists(key))
}

fn split_set_term<'a>(term: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, rest) = term.split_once(op)?;
    Some((key, rest.trim()))
}

fn valid_key(key: &str) -> Option<String> {
    let key = key.trim();
    (!key.is_empty()).then(|| key.to_string())
}

fn parse_set(values: &str) -> Option<BTreeSet<String>> {
    let inner = values.strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
    )
}
