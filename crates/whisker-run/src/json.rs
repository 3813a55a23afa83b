//! JSON-backed render callbacks.
//!
//! Name resolution follows Mustache conventions: `.` is the current scope,
//! dotted names descend through objects, and a name missing from the
//! current scope is looked up along the enclosing data contexts.

use serde_json::Value;

use whisker_vm::{Halt, Render, Section};

/// Renders into an owned buffer with `serde_json::Value` scopes.
pub struct JsonRender {
    out: String,
}

impl JsonRender {
    pub fn new() -> Self {
        Self { out: String::new() }
    }

    pub fn output(&self) -> &str {
        &self.out
    }
}

impl Render for JsonRender {
    type Scope = Value;

    fn on_text(&mut self, _section: &Section<'_, Value>, text: &[u8]) -> Result<(), Halt> {
        self.out.push_str(&String::from_utf8_lossy(text));
        Ok(())
    }

    fn on_arg(
        &mut self,
        section: &Section<'_, Value>,
        name: &[u8],
        escape: bool,
    ) -> Result<(), Halt> {
        let Some(value) = resolve(section, name) else {
            return Ok(()); // missing names render as the empty string
        };
        let text = stringify(&value);
        if escape {
            escape_html(&mut self.out, &text);
        } else {
            self.out.push_str(&text);
        }
        Ok(())
    }

    fn on_section_test(
        &mut self,
        section: &mut Section<'_, Value>,
        name: &[u8],
        _callable: bool,
    ) -> Result<u32, Halt> {
        Ok(match resolve(section, name) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => 0,
            Some(Value::Array(items)) => items.len() as u32,
            Some(_) => 1,
        })
    }

    fn on_section_start(
        &mut self,
        section: &mut Section<'_, Value>,
        name: &[u8],
        index: u32,
    ) -> Result<(), Halt> {
        if let Some(value) = resolve(section, name) {
            let element = match value {
                Value::Array(items) => {
                    items.get(index as usize).cloned().unwrap_or(Value::Null)
                }
                other => other,
            };
            section.set_scope(element);
        }
        Ok(())
    }

    fn on_render_error(&mut self, _scope: &Value) {
        self.out.clear();
    }
}

/// Resolve a tag name against the section's scope chain.
fn resolve(section: &Section<'_, Value>, name: &[u8]) -> Option<Value> {
    let name = std::str::from_utf8(name).ok()?;
    if name == "." {
        return Some(section.scope().clone());
    }
    let path: Vec<&str> = name.split('.').collect();
    if let Some(hit) = dig(section.scope(), &path) {
        return Some(hit.clone());
    }
    section
        .ancestors()
        .find_map(|scope| dig(scope, &path))
        .cloned()
}

fn dig<'v>(mut value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    for key in path {
        value = value.as_object()?.get(*key)?;
    }
    Some(value)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}
