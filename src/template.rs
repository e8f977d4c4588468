//! `${...}` placeholder substitution.
//!
//! Placeholders are plain dotted paths into two bound roots, `req` and
//! `config`; nothing is evaluated. Anything that is not a resolvable path is
//! left in the output verbatim.

use serde_json::{json, Value};

const OPEN: &str = "${";

/// Variables bound for one render.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    req: Value,
    config: Value,
}

impl TemplateContext {
    pub fn new(req: Value, config: Value) -> Self {
        Self { req, config }
    }

    /// Render every placeholder in `input`.
    pub fn render(&self, input: &str) -> String {
        if !input.contains(OPEN) {
            return input.to_string();
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len()..];
            match after.find('}') {
                Some(end) => {
                    let expr = &after[..end];
                    match self.lookup(expr) {
                        Some(value) => out.push_str(&display(&value)),
                        None => {
                            out.push_str(OPEN);
                            out.push_str(expr);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Render strings inside a JSON value. A string that is exactly one
    /// placeholder is replaced by the bound value with its JSON type.
    pub fn render_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => {
                if let Some(expr) = s.strip_prefix(OPEN).and_then(|r| r.strip_suffix('}')) {
                    if !expr.contains('}') {
                        if let Some(bound) = self.lookup(expr) {
                            return bound;
                        }
                    }
                }
                Value::String(self.render(s))
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn lookup(&self, expr: &str) -> Option<Value> {
        let mut parts = expr.trim().split('.');
        let mut current = match parts.next()? {
            "req" => &self.req,
            "config" => &self.config,
            _ => return None,
        };
        for part in parts {
            if part.is_empty() {
                return None;
            }
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Template context with no request bound (console-triggered fetches).
pub fn detached(config: Value) -> TemplateContext {
    TemplateContext::new(json!({}), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        TemplateContext::new(
            json!({
                "params": {"id": "42"},
                "query": {"tags": ["a", "b"]},
                "body": {"count": 3, "user": {"name": "Siva"}}
            }),
            json!({"port": 3000, "base": "/api"}),
        )
    }

    #[test]
    fn test_render_string() {
        assert_eq!(
            ctx().render("http://x:${config.port}${config.base}/users/${req.params.id}"),
            "http://x:3000/api/users/42"
        );
    }

    #[test]
    fn test_unresolved_left_verbatim() {
        assert_eq!(ctx().render("${req.params.missing}/${process.env.HOME}"), "${req.params.missing}/${process.env.HOME}");
        assert_eq!(ctx().render("open ${req.params.id"), "open ${req.params.id");
    }

    #[test]
    fn test_render_value_keeps_types() {
        let value = json!({
            "count": "${req.body.count}",
            "label": "n=${req.body.count}",
            "tags": ["${req.query.tags.1}"],
            "user": "${req.body.user}"
        });
        assert_eq!(
            ctx().render_value(&value),
            json!({"count": 3, "label": "n=3", "tags": ["b"], "user": {"name": "Siva"}})
        );
    }

    #[test]
    fn test_no_expression_evaluation() {
        assert_eq!(ctx().render("${1 + 1}"), "${1 + 1}");
        assert_eq!(ctx().render("${req.params.id.toString()}"), "${req.params.id.toString()}");
    }
}
