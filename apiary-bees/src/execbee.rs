//! Command execution bee
//!
//! The `execute` action spawns the command and returns at once; the output is
//! published later as a `result` event from a background task. The bee owns
//! those tasks and `run` does not return before they have finished.

use apiary_config::BeeConfig;
use apiary_core::{Bee, BeeContext, BeeError, BeeFactory, OptionsBinder};
use apiary_event::{Action, ActionError};
use apiary_schema::{
    ActionDescriptor, EventDescriptor, PlaceholderDescriptor, PlaceholderType, Placeholders,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct ExecBee {
    /// Set while `run` is active
    running: Mutex<Option<Running>>,
}

struct Running {
    ctx: BeeContext,
    /// Output collectors of spawned commands
    tasks: JoinSet<()>,
}

#[async_trait]
impl Bee for ExecBee {
    async fn run(&self, ctx: BeeContext) -> Result<(), BeeError> {
        *self.running.lock() = Some(Running {
            ctx: ctx.clone(),
            tasks: JoinSet::new(),
        });
        ctx.shutdown.recv().await;

        let running = self.running.lock().take();
        if let Some(mut running) = running {
            if !running.tasks.is_empty() {
                debug!(bee = %ctx.name, commands = running.tasks.len(), "Waiting for commands");
            }
            while running.tasks.join_next().await.is_some() {}
        }
        Ok(())
    }

    async fn action(&self, action: &Action) -> Result<Placeholders, ActionError> {
        if action.name != "execute" {
            return Err(ActionError::UnknownAction {
                bee: action.bee.clone(),
                action: action.name.clone(),
            });
        }

        let command = action.require_str("command")?;
        let stdin = action.options.str_value("stdin").map(str::to_string);
        let ctx = self
            .running
            .lock()
            .as_ref()
            .map(|running| running.ctx.clone())
            .ok_or_else(not_running)?;

        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| ActionError::InvalidOption {
            name: "command".to_string(),
            reason: "empty command".to_string(),
        })?;

        let child = Command::new(program)
            .args(parts)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        info!(bee = %ctx.name, command, "Executing command");
        // A child dropped here is killed
        let mut guard = self.running.lock();
        let running = guard.as_mut().ok_or_else(not_running)?;
        while running.tasks.try_join_next().is_some() {}
        running.tasks.spawn(collect_output(ctx, child, stdin));
        Ok(Placeholders::new())
    }
}

fn not_running() -> ActionError {
    ActionError::Failed("bee is not running".to_string())
}

/// Wait for the command and publish its output; killed if the bee stops first
async fn collect_output(ctx: BeeContext, mut child: Child, stdin: Option<String>) {
    let pipe = child.stdin.take();
    let write_input = async {
        if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
            if let Err(e) = pipe.write_all(input.as_bytes()).await {
                warn!(bee = %ctx.name, error = %e, "Failed to write command input");
            }
        }
    };
    let wait = async {
        let ((), output) = tokio::join!(write_input, child.wait_with_output());
        output
    };

    let output = tokio::select! {
        output = wait => output,
        _ = ctx.shutdown.recv() => {
            debug!(bee = %ctx.name, "Command cancelled by shutdown");
            return;
        }
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            warn!(bee = %ctx.name, error = %e, "Command failed");
            return;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let options = Placeholders::new()
        .with("stdout", PlaceholderType::String, stdout.trim_end_matches(['\n', '\r']))
        .with("stderr", PlaceholderType::String, stderr.trim_end_matches(['\n', '\r']))
        .with(
            "exit_code",
            PlaceholderType::Int,
            output.status.code().map(i64::from).unwrap_or(-1),
        );

    if let Err(e) = ctx.emitter.emit("result", options).await {
        debug!(bee = %ctx.name, error = %e, "Command result not published");
    }
}

pub struct ExecBeeFactory;

impl BeeFactory for ExecBeeFactory {
    fn id(&self) -> &str {
        "execbee"
    }

    fn name(&self) -> &str {
        "Execute Command"
    }

    fn description(&self) -> &str {
        "Executes commands on the local host"
    }

    fn events(&self) -> Vec<EventDescriptor> {
        vec![EventDescriptor::new(self.id(), "result")
            .description("A command has finished")
            .option(
                PlaceholderDescriptor::new("stdout", PlaceholderType::String)
                    .description("Standard output of the command"),
            )
            .option(
                PlaceholderDescriptor::new("stderr", PlaceholderType::String)
                    .description("Standard error of the command"),
            )
            .option(
                PlaceholderDescriptor::new("exit_code", PlaceholderType::Int)
                    .description("Exit status, -1 when killed by a signal"),
            )]
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![ActionDescriptor::new(self.id(), "execute")
            .description("Executes a command on the local host")
            .option(
                PlaceholderDescriptor::new("command", PlaceholderType::String)
                    .description("Program and arguments, split on whitespace")
                    .mandatory(),
            )
            .option(
                PlaceholderDescriptor::new("stdin", PlaceholderType::String)
                    .description("Data written to the command's standard input"),
            )]
    }

    fn create(
        &self,
        _config: &BeeConfig,
        _options: &OptionsBinder<'_>,
    ) -> Result<Arc<dyn Bee>, BeeError> {
        Ok(Arc::new(ExecBee::default()))
    }
}
