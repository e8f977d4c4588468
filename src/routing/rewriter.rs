//! Request path rewriting applied before route lookup.
//!
//! ```text
//! "/api/*"            → "/$1"          wildcard captures by position
//! "/posts/:id/show"   → "/posts/:id"   named parameters, also in the query
//! "/old"              → "/new?x=1"     query pairs are appended to the request
//! ```

use serde_json::{Map, Value};

use crate::routing::matcher::PathPattern;

#[derive(Debug, Clone)]
struct Rule {
    from: PathPattern,
    to: String,
}

/// Ordered rewrite table, first match wins.
#[derive(Debug, Clone, Default)]
pub struct Rewriters {
    rules: Vec<Rule>,
}

impl Rewriters {
    /// Build from a `{ "from": "to" }` object. Non-string targets are skipped.
    pub fn from_json(map: Map<String, Value>) -> Self {
        let rules = map
            .into_iter()
            .filter_map(|(from, to)| match to {
                Value::String(to) => Some(Rule {
                    from: PathPattern::parse(&from),
                    to,
                }),
                other => {
                    tracing::warn!(from = %from, target = %other, "Rewrite target must be a string, skipping");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite a request path. Returns `None` when no rule applies.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| {
            rule.from.matches(path).map(|params| {
                let mut target = rule.to.clone();
                let wildcards = params.keys().filter(|k| k.parse::<usize>().is_ok()).count();
                // highest index first so "$1" does not eat the prefix of "$10"
                for index in (0..wildcards).rev() {
                    if let Some(value) = params.get(&index.to_string()) {
                        target = target.replace(&format!("${}", index + 1), value);
                    }
                }

                let (target_path, query) = match target.split_once('?') {
                    Some((p, q)) => (p.to_string(), Some(q.to_string())),
                    None => (target, None),
                };
                let named = |token: &str| {
                    token
                        .strip_prefix(':')
                        .and_then(|name| params.get(name.trim_end_matches('?')))
                        .cloned()
                        .unwrap_or_else(|| token.to_string())
                };
                let mut rewritten = target_path.split('/').map(&named).collect::<Vec<_>>().join("/");
                if let Some(query) = query {
                    let pairs: Vec<String> = query
                        .split('&')
                        .map(|pair| match pair.split_once('=') {
                            Some((key, value)) => format!("{}={}", key, named(value)),
                            None => pair.to_string(),
                        })
                        .collect();
                    rewritten.push('?');
                    rewritten.push_str(&pairs.join("&"));
                }
                tracing::debug!(from = %path, to = %rewritten, "Rewrote request path");
                rewritten
            })
        })
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.rules
                .iter()
                .map(|r| (r.from.as_str().to_string(), Value::String(r.to.clone())))
                .collect(),
        )
    }
}
