//! Filter registry integration tests

use apiary_config::{FilterConfig, FilterOption, FilterSpec};
use apiary_filters::{FilterError, FilterRegistry};
use apiary_schema::{Value, ValueMap};

fn context(pairs: &[(&str, Value)]) -> ValueMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn always(result: bool) -> serde_json::Value {
    // A missing key never equals "x"; inverse turns that into a constant pass
    if result {
        serde_json::json!({"name": "equals", "options": [{"name": "missing", "value": "x", "inverse": true}]})
    } else {
        serde_json::json!({"name": "equals", "options": [{"name": "missing", "value": "x"}]})
    }
}

fn boolean(operation: &str, filters: Vec<serde_json::Value>) -> FilterConfig {
    let value = Value::from(serde_json::json!({
        "operation": operation,
        "filters": filters,
    }));
    FilterConfig::new("boolean").option(FilterOption::new("", value))
}

#[test]
fn test_builtins_registered() {
    let registry = FilterRegistry::with_builtins();
    for name in [
        "equals",
        "startswith",
        "endswith",
        "contains",
        "matches",
        "template",
        "boolean",
        "starlark",
        "lua",
    ] {
        assert!(registry.contains(name), "missing filter {}", name);
    }
}

#[test]
fn test_string_filters_through_options() {
    let registry = FilterRegistry::with_builtins();
    let ctx = context(&[("text", Value::from("  Hello World "))]);

    let starts = FilterConfig::new("startswith")
        .option(FilterOption::new("text", "hello").trimmed().case_insensitive());
    assert!(registry.evaluate(&starts, &ctx).unwrap());

    let starts_raw = FilterConfig::new("startswith").option(FilterOption::new("text", "Hello"));
    assert!(!registry.evaluate(&starts_raw, &ctx).unwrap());

    let contains = FilterConfig::new("contains").option(FilterOption::new("text", "lo Wo"));
    assert!(registry.evaluate(&contains, &ctx).unwrap());

    let not_contains = FilterConfig::new("contains")
        .option(FilterOption::new("text", "lo Wo").inverse());
    assert!(!registry.evaluate(&not_contains, &ctx).unwrap());

    let equals = FilterConfig::new("equals")
        .option(FilterOption::new("text", "HELLO WORLD").trimmed().case_insensitive());
    assert!(registry.evaluate(&equals, &ctx).unwrap());
}

#[test]
fn test_multiple_options_all_must_pass() {
    let registry = FilterRegistry::with_builtins();
    let ctx = context(&[
        ("channel", Value::from("#rust")),
        ("text", Value::from("!help")),
    ]);

    let config = FilterConfig::new("startswith")
        .option(FilterOption::new("channel", "#"))
        .option(FilterOption::new("text", "!"));
    assert!(registry.evaluate(&config, &ctx).unwrap());

    let config = FilterConfig::new("startswith")
        .option(FilterOption::new("channel", "#"))
        .option(FilterOption::new("text", "?"));
    assert!(!registry.evaluate(&config, &ctx).unwrap());
}

#[test]
fn test_boolean_truth_tables() {
    let registry = FilterRegistry::with_builtins();
    let ctx = ValueMap::new();

    let cases: [(&str, &[bool], bool); 14] = [
        ("AND", &[true, true], true),
        ("AND", &[true, false], false),
        ("AND", &[false, false], false),
        ("OR", &[true, false], true),
        ("OR", &[false, false], false),
        ("XOR", &[true, false], true),
        ("XOR", &[false, true], true),
        ("XOR", &[true, true], false),
        ("XOR", &[false, false], false),
        ("XOR", &[true, false, true], false),
        ("NOT", &[true], false),
        ("NOT", &[false], true),
        ("and", &[], false),
        ("or", &[true], true),
    ];

    for (operation, inputs, expected) in cases {
        let config = boolean(operation, inputs.iter().map(|b| always(*b)).collect());
        assert_eq!(
            registry.evaluate(&config, &ctx).unwrap(),
            expected,
            "{} {:?}",
            operation,
            inputs
        );
    }
}

#[test]
fn test_boolean_errors() {
    let registry = FilterRegistry::with_builtins();
    let ctx = ValueMap::new();

    let not_two = boolean("NOT", vec![always(true), always(false)]);
    assert!(matches!(
        registry.evaluate(&not_two, &ctx),
        Err(FilterError::InvalidValue { .. })
    ));

    let unknown = boolean("NAND", vec![always(true)]);
    assert!(matches!(
        registry.evaluate(&unknown, &ctx),
        Err(FilterError::InvalidValue { .. })
    ));

    let missing_filter = boolean(
        "AND",
        vec![serde_json::json!({"name": "nope", "options": []})],
    );
    assert!(matches!(
        registry.evaluate(&missing_filter, &ctx),
        Err(FilterError::NotFound(_))
    ));
}

#[test]
fn test_boolean_without_sub_filters_fails_before_operation_check() {
    let registry = FilterRegistry::with_builtins();
    let ctx = ValueMap::new();

    let no_operation = Value::from(serde_json::json!({"filters": []}));
    let config = FilterConfig::new("boolean").option(FilterOption::new("", no_operation));
    assert!(!registry.evaluate(&config, &ctx).unwrap());

    let unknown_operation = boolean("NAND", vec![]);
    assert!(!registry.evaluate(&unknown_operation, &ctx).unwrap());
}

#[test]
fn test_boolean_accepts_source_strings() {
    let registry = FilterRegistry::with_builtins();
    let ctx = context(&[("n", Value::Int(5))]);

    let config = boolean(
        "or",
        vec![
            serde_json::json!("{{test lt .n 3}}"),
            serde_json::json!("{{test gt .n 4}}"),
        ],
    );
    assert!(registry.evaluate(&config, &ctx).unwrap());
}

#[test]
fn test_template_source_filter() {
    let registry = FilterRegistry::with_builtins();
    let spec = FilterSpec::Source(r#"{{test eq .text "ping"}}"#.to_string());

    let ping = context(&[("text", Value::from("ping"))]);
    let pong = context(&[("text", Value::from("pong"))]);
    assert!(registry.evaluate(&spec.to_config(), &ping).unwrap());
    assert!(!registry.evaluate(&spec.to_config(), &pong).unwrap());
}

#[test]
fn test_starlark_source_filter() {
    let registry = FilterRegistry::with_builtins();
    let source = "def main(text): return text == 'good'";
    let spec = FilterSpec::Source(source.to_string());
    let config = FilterConfig::new("starlark").option(FilterOption::new("", source));
    assert_eq!(spec.to_config(), config);

    let good = context(&[("text", Value::from("good"))]);
    let bad = context(&[("text", Value::from("bad"))]);
    assert!(registry.evaluate(&spec.to_config(), &good).unwrap());
    assert!(!registry.evaluate(&spec.to_config(), &bad).unwrap());
    assert!(registry.evaluate(&config, &good).unwrap());
}

#[test]
fn test_starlark_indented_source_with_kwargs() {
    let registry = FilterRegistry::with_builtins();
    let spec = FilterSpec::Source(
        r#"
            def main(count, **kwargs):
                return count > 2 and kwargs["tags"][0] == "a"
        "#
        .to_string(),
    );

    let ctx = context(&[
        ("count", Value::Int(3)),
        ("tags", Value::List(vec![Value::from("a"), Value::from("b")])),
    ]);
    assert!(registry.evaluate(&spec.to_config(), &ctx).unwrap());

    let ctx = context(&[("count", Value::Int(1)), ("tags", Value::List(vec![]))]);
    assert!(!registry.evaluate(&spec.to_config(), &ctx).unwrap());
}

#[test]
fn test_starlark_script_error_is_reported() {
    let registry = FilterRegistry::with_builtins();
    let ctx = context(&[("text", Value::from("good"))]);

    let failing = FilterSpec::Source("def main(text): fail('boom')".to_string());
    assert!(matches!(
        registry.evaluate(&failing.to_config(), &ctx),
        Err(FilterError::Script(_))
    ));

    let unparsable = FilterConfig::new("starlark").option(FilterOption::new("", "def main(:"));
    assert!(matches!(
        registry.evaluate(&unparsable, &ctx),
        Err(FilterError::Script(_))
    ));
}

#[test]
fn test_lua_source_filter() {
    let registry = FilterRegistry::with_builtins();
    let spec = FilterSpec::Source(
        r#"function main(args) return args.text == "good" end"#.to_string(),
    );

    let good = context(&[("text", Value::from("good"))]);
    let bad = context(&[("text", Value::from("bad"))]);
    assert!(registry.evaluate(&spec.to_config(), &good).unwrap());
    assert!(!registry.evaluate(&spec.to_config(), &bad).unwrap());
}

#[test]
fn test_lua_script_error_is_reported() {
    let registry = FilterRegistry::with_builtins();
    let spec = FilterSpec::Source("function main(args) error('boom') end".to_string());

    assert!(matches!(
        registry.evaluate(&spec.to_config(), &ValueMap::new()),
        Err(FilterError::Script(_))
    ));
}

#[test]
fn test_matches_filter() {
    let registry = FilterRegistry::with_builtins();
    let ctx = context(&[("url", Value::from("https://example.org/issues/42"))]);

    let config =
        FilterConfig::new("matches").option(FilterOption::new("url", r"/issues/\d+$"));
    assert!(registry.evaluate(&config, &ctx).unwrap());

    let bad = FilterConfig::new("matches").option(FilterOption::new("url", "[unclosed"));
    assert!(matches!(
        registry.evaluate(&bad, &ctx),
        Err(FilterError::Regex { .. })
    ));
}
