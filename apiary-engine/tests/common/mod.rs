//! Test bees shared by the engine tests

#![allow(dead_code)]

use apiary_config::BeeConfig;
use apiary_core::{async_trait, Bee, BeeContext, BeeError, BeeFactory, FactoryRegistry, OptionsBinder};
use apiary_event::{Action, ActionError};
use apiary_schema::{
    ActionDescriptor, EventDescriptor, OptionDescriptor, PlaceholderDescriptor, PlaceholderType,
    Placeholders,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub type Recorded = Arc<Mutex<Vec<Action>>>;

/// Records `record` actions; `fail` returns an error and `explode` panics
struct RecorderBee {
    recorded: Recorded,
}

#[async_trait]
impl Bee for RecorderBee {
    async fn run(&self, ctx: BeeContext) -> Result<(), BeeError> {
        ctx.shutdown.recv().await;
        Ok(())
    }

    async fn action(&self, action: &Action) -> Result<Placeholders, ActionError> {
        match action.name.as_str() {
            "record" => {
                self.recorded.lock().push(action.clone());
                Ok(Placeholders::new())
            }
            "fail" => Err(ActionError::Failed("refused".into())),
            "explode" => panic!("action handler exploded"),
            _ => Err(ActionError::UnknownAction {
                bee: action.bee.clone(),
                action: action.name.clone(),
            }),
        }
    }
}

pub struct RecorderFactory {
    pub recorded: Recorded,
}

impl BeeFactory for RecorderFactory {
    fn id(&self) -> &str {
        "recorder"
    }

    fn name(&self) -> &str {
        "Recorder"
    }

    fn description(&self) -> &str {
        "records the actions it receives"
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor::new("recorder", "record"),
            ActionDescriptor::new("recorder", "fail"),
            ActionDescriptor::new("recorder", "explode"),
            ActionDescriptor::new("recorder", "strict").option(
                PlaceholderDescriptor::new("text", PlaceholderType::String).mandatory(),
            ),
        ]
    }

    fn create(
        &self,
        _config: &BeeConfig,
        _options: &OptionsBinder<'_>,
    ) -> Result<Arc<dyn Bee>, BeeError> {
        Ok(Arc::new(RecorderBee {
            recorded: self.recorded.clone(),
        }))
    }
}

/// Emits one `message` event per configured text, then idles
struct SourceBee {
    messages: Vec<String>,
}

#[async_trait]
impl Bee for SourceBee {
    async fn run(&self, ctx: BeeContext) -> Result<(), BeeError> {
        for text in &self.messages {
            let options = Placeholders::new().with("text", PlaceholderType::String, text.as_str());
            ctx.emitter.emit("message", options).await?;
        }
        ctx.shutdown.recv().await;
        Ok(())
    }
}

pub struct SourceFactory;

impl BeeFactory for SourceFactory {
    fn id(&self) -> &str {
        "source"
    }

    fn name(&self) -> &str {
        "Source"
    }

    fn description(&self) -> &str {
        "emits configured messages"
    }

    fn options(&self) -> Vec<OptionDescriptor> {
        vec![OptionDescriptor::new("messages", PlaceholderType::List)]
    }

    fn events(&self) -> Vec<EventDescriptor> {
        vec![EventDescriptor::new("source", "message")
            .option(PlaceholderDescriptor::new("text", PlaceholderType::String))]
    }

    fn create(
        &self,
        _config: &BeeConfig,
        options: &OptionsBinder<'_>,
    ) -> Result<Arc<dyn Bee>, BeeError> {
        Ok(Arc::new(SourceBee {
            messages: options.bind("messages")?,
        }))
    }
}

pub fn factories(recorded: &Recorded) -> FactoryRegistry {
    let mut factories = FactoryRegistry::new();
    factories.register(Arc::new(RecorderFactory {
        recorded: recorded.clone(),
    }));
    factories.register(Arc::new(SourceFactory));
    factories
}

/// Wait until `count` actions have been recorded
pub async fn wait_for_actions(recorded: &Recorded, count: usize) {
    for _ in 0..200 {
        if recorded.lock().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} actions, got {}",
        count,
        recorded.lock().len()
    );
}
