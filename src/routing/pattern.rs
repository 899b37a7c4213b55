//! Route templates: parse, format and concatenate.
//!
//! # Responsibilities
//! - Tokenize `/`-delimited templates into constant and variable segments
//! - Format a [`Parameters`] set into a concrete, percent-encoded path
//! - Parse a concrete path back into [`Parameters`]
//!
//! # Template Syntax
//! ```text
//! /users/{id}            required variable
//! /users/{id}/{tab?}     optional variable (omitted with its slash)
//! /files/{path...}       ellipsis, captures every remaining segment
//! /img/file-{id}.png     literal prefix and suffix around a variable
//! ```
//!
//! # Design Decisions
//! - Malformed templates fail when the pattern is built
//! - A name used by several segments takes successive values
//! - Optional segments are matched with backtracking, so `/a/{x?}/b`
//!   accepts `/a/b`

use std::collections::HashMap;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::routing::error::PatternError;
use crate::routing::parameters::Parameters;

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A `{...}` substitution inside a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSubstitution {
    pub name: String,
    pub ellipsis: bool,
    pub prefix: String,
    pub suffix: String,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Constant(String),
    VariableSubstitution(VariableSubstitution),
}

impl Segment {
    fn parse(text: &str) -> Result<Self, PatternError> {
        let opens = text.matches('{').count();
        let closes = text.matches('}').count();
        if opens == 0 && closes == 0 {
            return Ok(Segment::Constant(text.to_string()));
        }
        if opens != closes {
            return Err(PatternError::MalformedBraces(text.to_string()));
        }
        if opens > 1 {
            let nested = text.find('}').map(|close| text[..close].matches('{').count() > 1);
            return Err(match nested {
                Some(true) => PatternError::MalformedBraces(text.to_string()),
                _ => PatternError::MultipleSubstitutions(text.to_string()),
            });
        }

        let (open, close) = match (text.find('{'), text.find('}')) {
            (Some(open), Some(close)) if open < close => (open, close),
            _ => return Err(PatternError::MalformedBraces(text.to_string())),
        };

        let signature = &text[open + 1..close];
        let (name, optional, ellipsis) = if let Some(name) = signature.strip_suffix("...") {
            (name, false, true)
        } else if let Some(name) = signature.strip_suffix('?') {
            (name, true, false)
        } else {
            (signature, false, false)
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(PatternError::UnnamedSubstitution(text.to_string()));
        }

        let suffix = &text[close + 1..];
        if ellipsis && !suffix.is_empty() {
            return Err(PatternError::MisplacedEllipsis(name.to_string()));
        }

        Ok(Segment::VariableSubstitution(VariableSubstitution {
            name: name.to_string(),
            ellipsis,
            prefix: text[..open].to_string(),
            suffix: suffix.to_string(),
            optional,
        }))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Constant(text) => f.write_str(text),
            Segment::VariableSubstitution(var) => {
                let marker = if var.ellipsis {
                    "..."
                } else if var.optional {
                    "?"
                } else {
                    ""
                };
                write!(f, "{}{{{}{}}}{}", var.prefix, var.name, marker, var.suffix)
            }
        }
    }
}

/// A parsed route template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteLocationPattern {
    segments: Vec<Segment>,
}

impl RouteLocationPattern {
    /// Parse `template`. Empty segments (leading, trailing or doubled
    /// slashes) are ignored.
    pub fn new(template: &str) -> Result<Self, PatternError> {
        let segments = template
            .split('/')
            .filter(|part| !part.is_empty())
            .map(Segment::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_segments(segments)
    }

    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, PatternError> {
        let last = segments.len().saturating_sub(1);
        for (index, segment) in segments.iter().enumerate() {
            if let Segment::VariableSubstitution(var) = segment {
                if var.ellipsis && index != last {
                    return Err(PatternError::MisplacedEllipsis(var.name.clone()));
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Variable substitutions in template order.
    pub fn variables(&self) -> impl Iterator<Item = &VariableSubstitution> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::VariableSubstitution(var) => Some(var),
            Segment::Constant(_) => None,
        })
    }

    /// Distinct variable names in template order.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for var in self.variables() {
            if !names.contains(&var.name.as_str()) {
                names.push(&var.name);
            }
        }
        names
    }

    /// Append `other`'s segments after this pattern's.
    pub fn concat(&self, other: &RouteLocationPattern) -> Result<Self, PatternError> {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self::from_segments(segments)
    }

    /// Build a concrete path from `parameters`.
    pub fn format(&self, parameters: &Parameters) -> Result<String, PatternError> {
        let mut path = String::new();
        let mut used: HashMap<&str, usize> = HashMap::new();

        for segment in &self.segments {
            match segment {
                Segment::Constant(text) => {
                    path.push('/');
                    path.extend(utf8_percent_encode(text, SEGMENT));
                }
                Segment::VariableSubstitution(var) => {
                    let values = parameters.get_all(&var.name);
                    let taken = used.entry(var.name.as_str()).or_insert(0);
                    let remaining = values.get(*taken..).unwrap_or(&[]);

                    if var.ellipsis {
                        *taken = values.len();
                        if remaining.is_empty() {
                            continue;
                        }
                        if remaining.iter().any(String::is_empty) {
                            return Err(PatternError::EmptyValue(var.name.clone()));
                        }
                        path.push('/');
                        path.extend(utf8_percent_encode(&var.prefix, SEGMENT));
                        for (i, value) in remaining.iter().enumerate() {
                            if i > 0 {
                                path.push('/');
                            }
                            path.extend(utf8_percent_encode(value, SEGMENT));
                        }
                        continue;
                    }

                    match remaining.first() {
                        Some(value) if value.is_empty() => {
                            return Err(PatternError::EmptyValue(var.name.clone()));
                        }
                        Some(value) => {
                            *taken += 1;
                            path.push('/');
                            path.extend(utf8_percent_encode(&var.prefix, SEGMENT));
                            path.extend(utf8_percent_encode(value, SEGMENT));
                            path.extend(utf8_percent_encode(&var.suffix, SEGMENT));
                        }
                        None if var.optional => {}
                        None => return Err(PatternError::MissingValue(var.name.clone())),
                    }
                }
            }
        }

        if path.is_empty() {
            path.push('/');
        }
        Ok(path)
    }

    /// Match `path` and extract its parameters.
    pub fn parse(&self, path: &str) -> Result<Parameters, PatternError> {
        let chunks: Vec<&str> = path.split('/').filter(|chunk| !chunk.is_empty()).collect();
        let mut captured = Vec::new();

        if self.match_from(0, &chunks, &mut captured) {
            Ok(captured.into_iter().collect())
        } else {
            Err(PatternError::Mismatch {
                path: path.to_string(),
                pattern: self.to_string(),
            })
        }
    }

    /// True if `path` matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.parse(path).is_ok()
    }

    fn match_from(&self, index: usize, chunks: &[&str], captured: &mut Vec<(String, String)>) -> bool {
        let Some(segment) = self.segments.get(index) else {
            return chunks.is_empty();
        };

        match segment {
            Segment::Constant(text) => match chunks.split_first() {
                Some((chunk, rest)) if decode(chunk) == *text => {
                    self.match_from(index + 1, rest, captured)
                }
                _ => false,
            },
            Segment::VariableSubstitution(var) if var.ellipsis => {
                let Some((first, rest)) = chunks.split_first() else {
                    return true;
                };
                let first = decode(first);
                let Some(first) = first.strip_prefix(var.prefix.as_str()) else {
                    return false;
                };
                captured.push((var.name.clone(), first.to_string()));
                for chunk in rest {
                    captured.push((var.name.clone(), decode(chunk)));
                }
                true
            }
            Segment::VariableSubstitution(var) => {
                let mark = captured.len();
                if let Some((chunk, rest)) = chunks.split_first() {
                    let chunk = decode(chunk);
                    let value = chunk
                        .strip_prefix(var.prefix.as_str())
                        .and_then(|inner| inner.strip_suffix(var.suffix.as_str()))
                        .filter(|inner| !inner.is_empty());
                    if let Some(value) = value {
                        captured.push((var.name.clone(), value.to_string()));
                        if self.match_from(index + 1, rest, captured) {
                            return true;
                        }
                        captured.truncate(mark);
                    }
                }
                var.optional && self.match_from(index + 1, chunks, captured)
            }
        }
    }
}

impl fmt::Display for RouteLocationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for RouteLocationPattern {
    type Err = PatternError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        Self::new(template)
    }
}

/// `parent + child`; fails if the parent ends with an ellipsis.
impl<'a> std::ops::Add for &'a RouteLocationPattern {
    type Output = Result<RouteLocationPattern, PatternError>;

    fn add(self, other: Self) -> Self::Output {
        self.concat(other)
    }
}

fn decode(text: &str) -> String {
    percent_decode_str(text).decode_utf8_lossy().into_owned()
}
