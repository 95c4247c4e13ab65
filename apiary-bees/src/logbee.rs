//! Logging bee: writes action messages through `tracing`

use apiary_config::BeeConfig;
use apiary_core::{Bee, BeeContext, BeeError, BeeFactory, OptionsBinder};
use apiary_event::{Action, ActionError};
use apiary_schema::{ActionDescriptor, PlaceholderDescriptor, PlaceholderType, Placeholders};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct LogBee {
    name: String,
}

#[async_trait]
impl Bee for LogBee {
    async fn run(&self, ctx: BeeContext) -> Result<(), BeeError> {
        ctx.shutdown.recv().await;
        Ok(())
    }

    async fn action(&self, action: &Action) -> Result<Placeholders, ActionError> {
        if action.name != "log" {
            return Err(ActionError::UnknownAction {
                bee: self.name.clone(),
                action: action.name.clone(),
            });
        }

        let message = action.require_str("message")?;
        let level = action.options.str_value("level").unwrap_or("info");
        match level.to_ascii_lowercase().as_str() {
            "debug" => debug!(bee = %self.name, "{}", message),
            "info" => info!(bee = %self.name, "{}", message),
            "warn" | "warning" => warn!(bee = %self.name, "{}", message),
            "error" => error!(bee = %self.name, "{}", message),
            other => {
                return Err(ActionError::InvalidOption {
                    name: "level".to_string(),
                    reason: format!("unknown level {}", other),
                })
            }
        }
        Ok(Placeholders::new())
    }
}

pub struct LogBeeFactory;

impl BeeFactory for LogBeeFactory {
    fn id(&self) -> &str {
        "logbee"
    }

    fn name(&self) -> &str {
        "Logger"
    }

    fn description(&self) -> &str {
        "Writes messages to the hive's log"
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![ActionDescriptor::new(self.id(), "log")
            .description("Writes a message to the log")
            .option(
                PlaceholderDescriptor::new("message", PlaceholderType::String)
                    .description("Text to log")
                    .mandatory(),
            )
            .option(
                PlaceholderDescriptor::new("level", PlaceholderType::String)
                    .description("debug, info, warn or error"),
            )]
    }

    fn create(
        &self,
        config: &BeeConfig,
        _options: &OptionsBinder<'_>,
    ) -> Result<Arc<dyn Bee>, BeeError> {
        Ok(Arc::new(LogBee {
            name: config.name.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bee() -> LogBee {
        LogBee { name: "log".into() }
    }

    #[tokio::test]
    async fn test_log_levels() {
        let bee = bee();
        for level in ["debug", "INFO", "warn", "error"] {
            let action = Action::new("log", "log")
                .with_option("message", PlaceholderType::String, "hello")
                .with_option("level", PlaceholderType::String, level);
            assert!(bee.action(&action).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_actions() {
        let bee = bee();

        let missing = Action::new("log", "log");
        assert!(matches!(
            bee.action(&missing).await,
            Err(ActionError::InvalidOption { name, .. }) if name == "message"
        ));

        let bad_level = Action::new("log", "log")
            .with_option("message", PlaceholderType::String, "x")
            .with_option("level", PlaceholderType::String, "loud");
        assert!(matches!(
            bee.action(&bad_level).await,
            Err(ActionError::InvalidOption { name, .. }) if name == "level"
        ));

        let unknown = Action::new("log", "shout");
        assert!(matches!(
            bee.action(&unknown).await,
            Err(ActionError::UnknownAction { .. })
        ));
    }
}
