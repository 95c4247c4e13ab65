//! Apiary Template Engine
//!
//! Text templates used to render action options from event data and to evaluate
//! template filters. Actions are written inside `{{ }}` delimiters:
//!
//! - `{{.field.path}}`, `{{.}}`, `{{$var}}` and `{{$}}` (root data)
//! - pipelines with `|`, parenthesised sub-pipelines, `$x := ...` declarations
//! - `if` / `else if` / `else`, `range` (lists, maps, ints) and `with` blocks
//! - `{{- ... -}}` whitespace trimming and `{{/* comments */}}`
//! - builtins (`eq`, `ne`, `lt`, `le`, `gt`, `ge`, `and`, `or`, `not`, `len`,
//!   `index`, `print`, `printf`, `println`) plus the string helpers in [`funcs`]
//!
//! Missing fields render as the empty string.

pub mod ast;
pub mod error;
mod exec;
pub mod funcs;
pub mod parser;

pub use error::{Result, TemplateError};
pub use funcs::{FuncMap, TemplateFn};

use apiary_schema::Value;
use ast::Node;
use std::borrow::Cow;

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    source: String,
    nodes: Vec<Node>,
}

impl Template {
    /// Parse template source
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let source = source.into();
        let nodes = parser::parse(&name, &source)?;
        Ok(Self {
            name,
            source,
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the template contains no actions
    pub fn is_static(&self) -> bool {
        self.nodes.iter().all(|node| matches!(node, Node::Text(_)))
    }

    /// Render against `data` with the builtin function map
    pub fn render(&self, data: &Value) -> Result<String> {
        self.render_with(data, FuncMap::builtin())
    }

    /// Render against `data` with a custom function map
    pub fn render_with(&self, data: &Value, funcs: &FuncMap) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        exec::Exec::new(funcs, data).walk(&self.nodes, data, &mut out)?;
        tracing::trace!(template = %self.name, bytes = out.len(), "Rendered template");
        Ok(out)
    }
}

/// Parse and render in one step
pub fn render(source: &str, data: &Value) -> Result<String> {
    Template::parse("inline", source)?.render(data)
}

/// Whether a string contains template actions at all
pub fn has_actions(source: &str) -> bool {
    source.contains("{{")
}

/// Rewrite the `{{test ...}}` shorthand into `{{if ...}}` and append `true{{end}}`
///
/// `{{test eq .x 1}}` becomes `{{if eq .x 1}}true{{end}}`, which renders the
/// literal `true` exactly when the condition holds. Sources without the shorthand
/// are returned unchanged.
pub fn expand_test_directive(source: &str) -> Cow<'_, str> {
    let mut out = String::with_capacity(source.len() + 16);
    let mut rest = source;
    let mut found = false;

    while let Some(pos) = rest.find("{{") {
        let (before, after) = rest.split_at(pos + 2);
        out.push_str(before);

        let body = after.trim_start_matches(|c: char| c == '-' || c.is_whitespace());
        out.push_str(&after[..after.len() - body.len()]);

        match body.strip_prefix("test") {
            Some(tail) if !tail.starts_with(|c: char| c.is_alphanumeric() || c == '_') => {
                out.push_str("if");
                rest = tail;
                found = true;
            }
            _ => rest = body,
        }
    }

    if !found {
        return Cow::Borrowed(source);
    }
    out.push_str(rest);
    out.push_str("true{{end}}");
    Cow::Owned(out)
}
