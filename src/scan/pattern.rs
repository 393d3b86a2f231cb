//! Glob pattern templates with positional `%s` placeholders.
//!
//! Values fill the placeholders in order: entity, environment, parent namespace, child
//! namespace. Values are inserted verbatim, so a value carrying `*`, `?` or `[` widens or
//! narrows the match.

use thiserror::Error;

/// Most placeholders a template may carry.
pub const MAX_PLACEHOLDERS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern template is empty")]
    Empty,

    #[error("pattern template has {0} placeholders, at most 4 are allowed")]
    TooManyPlaceholders(usize),

    #[error("unsupported format sequence '%{0}' in pattern template")]
    BadSequence(char),

    #[error("pattern template ends with a lone '%'")]
    TrailingPercent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PatternTemplate {
    pub fn parse(template: &str) -> Result<Self, PatternError> {
        if template.is_empty() {
            return Err(PatternError::Empty);
        }
        let mut segments = Vec::new();
        let mut lit = String::new();
        let mut chars = template.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                lit.push(c);
                continue;
            }
            match chars.next() {
                Some('s') => {
                    if !lit.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut lit)));
                    }
                    segments.push(Segment::Slot);
                }
                Some('%') => lit.push('%'),
                Some(other) => return Err(PatternError::BadSequence(other)),
                None => return Err(PatternError::TrailingPercent),
            }
        }
        if !lit.is_empty() {
            segments.push(Segment::Literal(lit));
        }

        let slots = segments.iter().filter(|s| **s == Segment::Slot).count();
        if slots > MAX_PLACEHOLDERS {
            return Err(PatternError::TooManyPlaceholders(slots));
        }
        Ok(Self { raw: template.to_string(), segments })
    }

    pub fn placeholders(&self) -> usize {
        self.segments.iter().filter(|s| **s == Segment::Slot).count()
    }

    /// Substitute entity, environment, parent and child namespace, in that order.
    pub fn render(&self, entity: &str, env: &str, parent: &str, child: &str) -> String {
        let values = [entity, env, parent, child];
        let mut next = values.iter();
        let mut out = String::with_capacity(self.raw.len() + 32);
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push_str(s),
                Segment::Slot => out.push_str(next.next().copied().unwrap_or_default()),
            }
        }
        out
    }
}
