mod common;

use apiary_config::{ActionConfig, BeeConfig, ChainConfig, ChainElement, EventPattern, HiveConfig};
use apiary_core::BeeState;
use apiary_engine::{ConfigIssue, EngineError, Hive, HiveOptions};
use apiary_filters::FilterRegistry;
use apiary_schema::Value;
use common::{factories, wait_for_actions, Recorded};
use std::time::Duration;

fn hive(recorded: &Recorded) -> Hive {
    Hive::new(
        factories(recorded),
        FilterRegistry::with_builtins(),
        HiveOptions::default(),
    )
}

fn config(messages: &[&str], tag: &str) -> HiveConfig {
    let messages: Vec<String> = messages.iter().map(|m| m.to_string()).collect();
    HiveConfig {
        bees: vec![
            BeeConfig::new("rec", "recorder"),
            BeeConfig::new("src", "source").option("messages", messages),
        ],
        actions: vec![],
        chains: vec![ChainConfig::new("echo", EventPattern::new("src", "message"))
            .element(ChainElement::action(
                ActionConfig::new("rec", "record").option("text", format!("{} {{{{.text}}}}", tag)),
            ))],
    }
}

fn texts(recorded: &Recorded) -> Vec<String> {
    recorded
        .lock()
        .iter()
        .filter_map(|a| a.option("text").and_then(Value::as_str).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_events_flow_from_bee_to_action() {
    let recorded = Recorded::default();
    let hive = hive(&recorded);

    let issues = hive.start(config(&["a", "b", "c"], "v1")).await.unwrap();
    assert!(issues.is_empty(), "{:?}", issues);

    wait_for_actions(&recorded, 3).await;
    assert_eq!(texts(&recorded), vec!["v1 a", "v1 b", "v1 c"]);
    // Counters are bumped after the bee has returned
    tokio::time::sleep(Duration::from_millis(50)).await;

    let states = hive.bee_states().await;
    assert_eq!(states.len(), 2);
    assert!(states.iter().all(|s| s.state == BeeState::Running));
    let rec = states.iter().find(|s| s.config.name == "rec").unwrap();
    assert!(rec.last_action.is_some());

    let stats = hive.stats().await.unwrap();
    assert_eq!(stats.events_handled, 3);
    assert_eq!(stats.actions_dispatched, 3);

    hive.stop().await.unwrap();
    assert!(!hive.is_running().await);
    assert!(hive.bee_states().await.is_empty());
}

#[tokio::test]
async fn test_reload_replaces_chains() {
    let recorded = Recorded::default();
    let hive = hive(&recorded);

    hive.start(config(&["one"], "old")).await.unwrap();
    wait_for_actions(&recorded, 1).await;

    hive.reload(config(&["two"], "new")).await.unwrap();
    wait_for_actions(&recorded, 2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(texts(&recorded), vec!["old one", "new two"]);
    assert_eq!(hive.config().chains.len(), 1);

    hive.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let recorded = Recorded::default();
    let hive = hive(&recorded);

    hive.start(config(&[], "x")).await.unwrap();
    assert!(matches!(
        hive.start(config(&[], "x")).await,
        Err(EngineError::AlreadyRunning)
    ));

    hive.stop().await.unwrap();
    hive.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_reports_issues_and_keeps_running() {
    let recorded = Recorded::default();
    let hive = hive(&recorded);

    let mut config = config(&["hi"], "ok");
    config.bees.push(BeeConfig::new("ghost", "nonexistent"));

    let issues = hive.start(config).await.unwrap();
    assert!(issues
        .iter()
        .any(|i| matches!(i, ConfigIssue::UnknownFactory { bee, .. } if bee == "ghost")));
    assert!(issues
        .iter()
        .any(|i| matches!(i, ConfigIssue::BeeStart { bee, .. } if bee == "ghost")));

    wait_for_actions(&recorded, 1).await;
    hive.stop().await.unwrap();
}

#[tokio::test]
async fn test_persist_writes_current_config() {
    let recorded = Recorded::default();
    let hive = hive(&recorded);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive.json");

    hive.start(config(&[], "saved")).await.unwrap();
    hive.persist(&path).unwrap();
    hive.stop().await.unwrap();

    let loaded = apiary_config::load_file(&path).unwrap();
    assert_eq!(loaded, hive.config());
}

#[test]
fn test_validate_without_starting() {
    let recorded = Recorded::default();
    let hive = hive(&recorded);

    assert!(hive.validate(&config(&[], "v")).is_empty());

    let mut broken = config(&[], "v");
    broken.chains[0].event = EventPattern::new("src", "silence");
    assert_eq!(hive.validate(&broken).len(), 1);
}
