//! Route pattern matching.
//!
//! # Responsibilities
//! - Parse route patterns into segments (`/users/:id?`, `/files/*`, `/(.*)`)
//! - Match request paths and capture path parameters
//!
//! # Design Decisions
//! - Segment matching only, no regex in the request path
//! - Literal segments are case-sensitive
//! - `:name?` may match zero segments; `*` / `(.*)` may match any number
//! - Wildcard captures are keyed "0", "1", ... in pattern order

use std::collections::BTreeMap;

/// Captured path parameters by name.
pub type PathParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param { name: String, optional: bool },
    Wildcard(usize),
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern. Every string is a valid pattern.
    pub fn parse(pattern: &str) -> Self {
        let mut wildcards = 0;
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == "*" || s == "(.*)" {
                    wildcards += 1;
                    Segment::Wildcard(wildcards - 1)
                } else if let Some(name) = s.strip_prefix(':').filter(|n| !n.is_empty()) {
                    match name.strip_suffix('?') {
                        Some(name) => Segment::Param {
                            name: name.to_string(),
                            optional: true,
                        },
                        None => Segment::Param {
                            name: name.to_string(),
                            optional: false,
                        },
                    }
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();

        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning captured parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut captured = Vec::new();
        if match_segments(&self.segments, &parts, &mut captured) {
            Some(captured.into_iter().collect())
        } else {
            None
        }
    }

    /// Names of the optional parameters, in pattern order.
    pub fn optional_params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param { name, optional: true } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Build a concrete path. Missing parameters are filled with their own name.
    pub fn fill(&self, params: &PathParams) -> String {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Literal(lit) => lit.clone(),
                Segment::Param { name, .. } => params.get(name).cloned().unwrap_or_else(|| name.clone()),
                Segment::Wildcard(i) => params.get(&i.to_string()).cloned().unwrap_or_default(),
            })
            .filter(|s| !s.is_empty())
            .collect();
        format!("/{}", parts.join("/"))
    }
}

fn match_segments(segments: &[Segment], parts: &[&str], captured: &mut Vec<(String, String)>) -> bool {
    let Some((segment, rest)) = segments.split_first() else {
        return parts.is_empty();
    };

    match segment {
        Segment::Literal(lit) => {
            parts.first().is_some_and(|p| p == lit) && match_segments(rest, &parts[1..], captured)
        }
        Segment::Param { name, optional } => {
            if let Some(first) = parts.first() {
                captured.push((name.clone(), decode(first)));
                if match_segments(rest, &parts[1..], captured) {
                    return true;
                }
                captured.pop();
            }
            *optional && match_segments(rest, parts, captured)
        }
        Segment::Wildcard(index) => {
            // prefer the longest capture
            for take in (0..=parts.len()).rev() {
                let mark = captured.len();
                captured.push((index.to_string(), parts[..take].join("/")));
                if match_segments(rest, &parts[take..], captured) {
                    return true;
                }
                captured.truncate(mark);
            }
            false
        }
    }
}

fn decode(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned()
}
