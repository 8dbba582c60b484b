//! Entity filtering and attribute denial
//!
//! Patterns use shell-style globs: `*` matches any run of characters
//! (including `.`), `?` matches one character, and `[...]` a character set.
//! Globs are compiled to anchored regexes once, when the filter is built.

use crate::config::{FilterConfig, FilterMode};
use crate::domain::{RawRecord, Result, StrataError};
use regex::Regex;

/// Translate a glob into an anchored regex
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if c == '\\' || c == '^' || c == '[' {
                        class.push('\\');
                    }
                    class.push(c);
                }
                if closed && !class.is_empty() {
                    pattern.push('[');
                    pattern.push_str(&class);
                    pattern.push(']');
                } else {
                    pattern.push_str(&regex::escape("["));
                    pattern.push_str(&regex::escape(&class));
                }
            }
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|e| StrataError::Configuration(format!("Invalid filter pattern '{glob}': {e}")))
}

/// Compiled entity filter
#[derive(Debug, Clone)]
pub struct EntityFilter {
    mode: FilterMode,
    patterns: Vec<Regex>,
    exclude_units: Vec<String>,
    denied_attributes: Vec<(Regex, Vec<String>)>,
}

impl EntityFilter {
    /// Compile a filter from configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a glob cannot be compiled.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| glob_to_regex(p))
            .collect::<Result<Vec<_>>>()?;
        let denied_attributes = config
            .denied_attributes
            .iter()
            .map(|(glob, attrs)| Ok((glob_to_regex(glob)?, attrs.clone())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mode: config.mode,
            patterns,
            exclude_units: config.exclude_units.clone(),
            denied_attributes,
        })
    }

    /// A filter that keeps everything
    pub fn allow_all() -> Self {
        Self {
            mode: FilterMode::Exclude,
            patterns: Vec::new(),
            exclude_units: Vec::new(),
            denied_attributes: Vec::new(),
        }
    }

    /// Whether an entity id passes the include/exclude patterns
    pub fn matches_entity(&self, entity_id: &str) -> bool {
        let matched = self.patterns.iter().any(|p| p.is_match(entity_id));
        match self.mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        }
    }

    /// Whether a record should be exported
    pub fn accepts(&self, record: &RawRecord) -> bool {
        if !self.matches_entity(record.entity_id.as_str()) {
            return false;
        }
        if self.exclude_units.is_empty() {
            return true;
        }
        let unit = record
            .attributes
            .get("unit_of_measurement")
            .and_then(|v| v.as_str());
        !unit.is_some_and(|u| self.exclude_units.iter().any(|x| x == u))
    }

    /// Drop denied attributes; returns the record unchanged when nothing matches
    pub fn sanitize(&self, mut record: RawRecord) -> RawRecord {
        for (pattern, attrs) in &self.denied_attributes {
            if pattern.is_match(record.entity_id.as_str()) {
                for attr in attrs {
                    record.attributes.remove(attr);
                }
            }
        }
        record
    }

    /// Filter then sanitize; `None` when the record is filtered out
    pub fn apply(&self, record: RawRecord) -> Option<RawRecord> {
        self.accepts(&record).then(|| self.sanitize(record))
    }
}
