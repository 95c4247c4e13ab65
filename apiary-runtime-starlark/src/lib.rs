//! Apiary Starlark Runtime
//!
//! Runs scripted filter predicates written in Starlark. A script defines
//! `def main(...)`; every entry of the event context is passed to it as a keyword
//! argument, so `def main(text)` receives the `text` placeholder and
//! `def main(text, **kwargs)` tolerates the rest. Values convert recursively
//! (strings, booleans, integers, floats, lists and string-keyed maps). The result
//! decides the filter by Starlark truthiness.
//!
//! Sources are dedented first, so scripts can be indented inside configuration
//! files. Every evaluation uses a fresh module.

use apiary_schema::{Value, ValueMap};
use starlark::environment::{Globals, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::dict::AllocDict;
use starlark::values::list::AllocList;
use starlark::values::Heap;
use thiserror::Error;
use tracing::trace;

/// Name of the function a filter script must define
pub const ENTRY_POINT: &str = "main";

/// Maximum nesting depth when converting values into Starlark
const MAX_CONVERSION_DEPTH: usize = 32;

/// Starlark runtime errors
#[derive(Debug, Error)]
pub enum StarlarkRuntimeError {
    #[error("Failed to parse Starlark script {name}: {message}")]
    ParseError { name: String, message: String },

    #[error("Execution error in {name}: {message}")]
    ExecutionError { name: String, message: String },

    #[error("Function not found: {0}")]
    FunctionNotFound(String),

    #[error("Value conversion error: {0}")]
    Conversion(String),
}

/// Starlark script engine
#[derive(Debug, Clone, Copy, Default)]
pub struct StarlarkEngine;

impl StarlarkEngine {
    pub fn new() -> Self {
        Self
    }

    /// Call `main` with one keyword argument per context entry and report
    /// whether its result is truthy
    pub fn evaluate(
        &self,
        name: &str,
        script: &str,
        kwargs: &ValueMap,
    ) -> Result<bool, StarlarkRuntimeError> {
        let ast = parse(name, script)?;
        let globals = Globals::standard();
        let module = Module::new();
        let heap = module.heap();

        let args = kwargs
            .iter()
            .map(|(key, value)| Ok((key.as_str(), to_starlark(heap, value, 0)?)))
            .collect::<Result<Vec<_>, StarlarkRuntimeError>>()?;

        let mut eval = Evaluator::new(&module);
        eval.eval_module(ast, &globals)
            .map_err(|e| StarlarkRuntimeError::ExecutionError {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let main = module
            .get(ENTRY_POINT)
            .ok_or_else(|| StarlarkRuntimeError::FunctionNotFound(ENTRY_POINT.to_string()))?;

        let result = eval
            .eval_function(main, &[], &args)
            .map_err(|e| StarlarkRuntimeError::ExecutionError {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let passed = result.to_bool();
        trace!(script = name, passed, "Starlark predicate evaluated");
        Ok(passed)
    }

    /// Check that a script parses and defines the entry point
    pub fn validate(&self, name: &str, script: &str) -> Result<(), StarlarkRuntimeError> {
        let ast = parse(name, script)?;
        let globals = Globals::standard();
        let module = Module::new();
        let mut eval = Evaluator::new(&module);
        eval.eval_module(ast, &globals)
            .map_err(|e| StarlarkRuntimeError::ExecutionError {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        module
            .get(ENTRY_POINT)
            .map(|_| ())
            .ok_or_else(|| StarlarkRuntimeError::FunctionNotFound(ENTRY_POINT.to_string()))
    }
}

fn parse(name: &str, script: &str) -> Result<AstModule, StarlarkRuntimeError> {
    let mut source = dedent(script);
    source.push('\n');
    AstModule::parse(name, source, &Dialect::Standard).map_err(|e| {
        StarlarkRuntimeError::ParseError {
            name: name.to_string(),
            message: e.to_string(),
        }
    })
}

/// Remove the whitespace prefix shared by every non-blank line
///
/// Whitespace-only lines become empty.
pub fn dedent(source: &str) -> String {
    let mut margin: Option<&str> = None;
    for line in source.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent = &line[..line.len() - line.trim_start().len()];
        margin = Some(match margin {
            None => indent,
            Some(current) => common_prefix(current, indent),
        });
    }
    let margin = margin.unwrap_or_default();

    source
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn common_prefix<'a>(a: &'a str, b: &str) -> &'a str {
    let len = a
        .char_indices()
        .zip(b.chars())
        .find(|((_, x), y)| x != y)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| a.len().min(b.len()));
    &a[..len]
}

fn to_starlark<'v>(
    heap: &'v Heap,
    value: &Value,
    depth: usize,
) -> Result<starlark::values::Value<'v>, StarlarkRuntimeError> {
    if depth > MAX_CONVERSION_DEPTH {
        return Err(StarlarkRuntimeError::Conversion(
            "value nesting too deep".to_string(),
        ));
    }
    Ok(match value {
        Value::Null => starlark::values::Value::new_none(),
        Value::Bool(b) => starlark::values::Value::new_bool(*b),
        Value::Int(v) => heap.alloc(*v),
        Value::Float(v) => heap.alloc(*v),
        Value::String(s) => heap.alloc(s.as_str()),
        Value::List(items) => {
            let items = items
                .iter()
                .map(|item| to_starlark(heap, item, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            heap.alloc(AllocList(items))
        }
        Value::Map(map) => {
            let entries = map
                .iter()
                .map(|(key, item)| Ok((key.as_str(), to_starlark(heap, item, depth + 1)?)))
                .collect::<Result<Vec<_>, StarlarkRuntimeError>>()?;
            heap.alloc(AllocDict(entries))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kwargs(json: serde_json::Value) -> ValueMap {
        match Value::from(json) {
            Value::Map(map) => map,
            _ => ValueMap::new(),
        }
    }

    #[test]
    fn test_text_equals_good() {
        let engine = StarlarkEngine::new();
        let script = "def main(text): return text == 'good'";

        assert!(engine
            .evaluate("good", script, &kwargs(json!({"text": "good"})))
            .unwrap());
        assert!(!engine
            .evaluate("good", script, &kwargs(json!({"text": "bad"})))
            .unwrap());
        assert!(!engine
            .evaluate("good", script, &kwargs(json!({"text": 1})))
            .unwrap());
    }

    #[test]
    fn test_indented_source() {
        let engine = StarlarkEngine::new();
        let script = "\n    def main(text, items):\n        return text in items\n    ";
        let input = kwargs(json!({"text": "hi", "items": ["oh", "hi", "mark"]}));
        assert!(engine.evaluate("items", script, &input).unwrap());

        let input = kwargs(json!({"text": "hello", "items": ["oh", "hi", "mark"]}));
        assert!(!engine.evaluate("items", script, &input).unwrap());
    }

    #[test]
    fn test_extra_kwargs_and_maps() {
        let engine = StarlarkEngine::new();
        let script = r#"
            def main(user, **kwargs):
                return user["name"] == "ana" and kwargs["count"] > 2 and kwargs["ratio"] < 1.0
        "#;
        let input = kwargs(json!({"user": {"name": "ana"}, "count": 3, "ratio": 0.5, "flag": null}));
        assert!(engine.evaluate("map", script, &input).unwrap());
    }

    #[test]
    fn test_truthiness_of_results() {
        let engine = StarlarkEngine::new();
        let empty = ValueMap::new();

        for (body, expected) in [
            ("None", false),
            ("0", false),
            ("''", false),
            ("[]", false),
            ("{}", false),
            ("'x'", true),
            ("[1]", true),
            ("True", true),
        ] {
            let script = format!("def main(): return {}", body);
            assert_eq!(
                engine.evaluate("t", &script, &empty).unwrap(),
                expected,
                "{}",
                body
            );
        }
    }

    #[test]
    fn test_errors() {
        let engine = StarlarkEngine::new();
        let empty = ValueMap::new();

        assert!(matches!(
            engine.evaluate("bad", "def main(:", &empty),
            Err(StarlarkRuntimeError::ParseError { .. })
        ));
        assert!(matches!(
            engine.evaluate("boom", "def main(): fail('boom')", &empty),
            Err(StarlarkRuntimeError::ExecutionError { .. })
        ));
        assert!(matches!(
            engine.evaluate("nomain", "x = 1", &empty),
            Err(StarlarkRuntimeError::FunctionNotFound(_))
        ));
        assert!(matches!(
            engine.evaluate(
                "strict",
                "def main(text): return True",
                &kwargs(json!({"text": "a", "other": "b"}))
            ),
            Err(StarlarkRuntimeError::ExecutionError { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let engine = StarlarkEngine::new();
        assert!(engine.validate("ok", "def main(): return True").is_ok());
        assert!(engine.validate("missing", "x = 1").is_err());
    }

    #[test]
    fn test_dedent() {
        assert_eq!(dedent("Hello there.\n  This is indented."), "Hello there.\n  This is indented.");
        assert_eq!(
            dedent("  Hello there.\n\n  How are ya?\n  Oh good.\n"),
            "Hello there.\n\nHow are ya?\nOh good.\n"
        );
        assert_eq!(dedent("\tdef f():\n\t\treturn 1\n  \t"), "def f():\n\treturn 1\n");
        assert_eq!(dedent("    a\n  b"), "  a\nb");
    }
}
