//! File-level tests for loading, saving and watching configuration

use apiary_config::{
    load_file, save_file, ActionConfig, BeeConfig, ChainConfig, ChainElement, ConfigError,
    ConfigWatcher, EventPattern, FilterConfig, FilterOption, HiveConfig,
};
use std::time::Duration;

fn sample_config() -> HiveConfig {
    HiveConfig {
        bees: vec![BeeConfig::new("ticker", "timebee").option("interval", 5i64)],
        actions: vec![ActionConfig::new("logger", "log")
            .with_id("say")
            .option("message", "tick {{.count}}")],
        chains: vec![ChainConfig::new("on-tick", EventPattern::new("ticker", "tick"))
            .description("log every tick")
            .element(ChainElement::filter(
                FilterConfig::new("equals").option(FilterOption::new("count", 1i64).inverse()),
            ))
            .element(ChainElement::action(apiary_config::ActionSpec::Reference(
                "say".into(),
            )))],
    }
}

#[test]
fn test_json_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive.json");

    let config = sample_config();
    save_file(&path, &config).unwrap();
    let loaded = load_file(&path).unwrap();

    assert_eq!(loaded, config);
    assert!(!dir.path().join("hive.json.tmp").exists());
}

#[test]
fn test_load_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive.yaml");
    std::fs::write(
        &path,
        r#"
bees:
  - name: ticker
    class: timebee
    options:
      - name: interval
        value: 10
chains:
  - name: echo
    event: { bee: ticker, name: tick }
    filters:
      - "{{test gt .count 2}}"
    actions:
      - bee: logger
        name: log
        options:
          - name: message
            value: "count={{.count}}"
"#,
    )
    .unwrap();

    let config = load_file(&path).unwrap();
    assert_eq!(config.bees[0].options.bind::<i64>("interval").unwrap(), 10);
    let chain = config.chain("echo").unwrap();
    assert_eq!(chain.steps().len(), 2);
}

#[test]
fn test_load_missing_file() {
    let result = load_file("/nonexistent/apiary/hive.json");
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[tokio::test]
async fn test_watcher_reports_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive.json");
    save_file(&path, &HiveConfig::default()).unwrap();

    let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(20));
    let mut changes = watcher.subscribe();
    watcher.start().await;
    assert!(watcher.is_running());

    save_file(&path, &sample_config()).unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
        .await
        .expect("watcher did not report the change")
        .unwrap();
    assert_eq!(change.version, 1);
    assert_eq!(change.path, path);

    watcher.stop();
    assert!(!watcher.is_running());
}
