//! Timer bee: emits `tick` events at a fixed interval

use apiary_config::BeeConfig;
use apiary_core::{Bee, BeeContext, BeeError, BeeFactory, OptionsBinder, PublishError};
use apiary_schema::{EventDescriptor, OptionDescriptor, PlaceholderDescriptor, PlaceholderType, Placeholders};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

const DEFAULT_INTERVAL_SECS: f64 = 60.0;

pub struct TimeBee {
    interval: Duration,
}

#[async_trait]
impl Bee for TimeBee {
    async fn run(&self, ctx: BeeContext) -> Result<(), BeeError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut count: i64 = 0;

        loop {
            tokio::select! {
                _ = ctx.shutdown.recv() => return Ok(()),
                _ = ticker.tick() => {}
            }

            count += 1;
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();
            let options = Placeholders::new()
                .with("timestamp", PlaceholderType::Timestamp, timestamp)
                .with("count", PlaceholderType::Int, count);

            debug!(bee = %ctx.name, count, "Tick");
            match ctx.emitter.emit("tick", options).await {
                Ok(()) => {}
                Err(PublishError::Shutdown) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

pub struct TimeBeeFactory;

impl BeeFactory for TimeBeeFactory {
    fn id(&self) -> &str {
        "timebee"
    }

    fn name(&self) -> &str {
        "Timer"
    }

    fn description(&self) -> &str {
        "Emits an event at a fixed interval"
    }

    fn options(&self) -> Vec<OptionDescriptor> {
        vec![OptionDescriptor::new("interval", PlaceholderType::Float)
            .description("Seconds between two ticks")
            .default_value(DEFAULT_INTERVAL_SECS)]
    }

    fn events(&self) -> Vec<EventDescriptor> {
        vec![EventDescriptor::new(self.id(), "tick")
            .description("The interval has elapsed")
            .option(
                PlaceholderDescriptor::new("timestamp", PlaceholderType::Timestamp)
                    .description("Unix time of the tick"),
            )
            .option(
                PlaceholderDescriptor::new("count", PlaceholderType::Int)
                    .description("Ticks since the bee started"),
            )]
    }

    fn create(
        &self,
        config: &BeeConfig,
        options: &OptionsBinder<'_>,
    ) -> Result<Arc<dyn Bee>, BeeError> {
        let seconds: f64 = options.bind("interval")?;
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(BeeError::runtime(format!(
                "bee {}: interval must be positive, got {}",
                config.name, seconds
            )));
        }
        Ok(Arc::new(TimeBee {
            interval: Duration::from_secs_f64(seconds),
        }))
    }
}
