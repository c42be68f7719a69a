//! txlog-standalone: Transaction log operator tool
//!
//! Wires the log pool, the append steps and the restore registry over the
//! in-memory transport, with a logging saga executor standing in for the
//! saga engine. Commands are read from stdin one JSON object per line and
//! each produces one JSON response line on stdout.
//!
//! ## Commands
//! ```text
//! {"op":"put","entity":"Person","id":"p1","body":{"name":"Ada"}}
//! {"op":"delete","entity":"Person","id":"p1"}
//! {"op":"restore","source":"default","fromId":"01H...","toInclusive":false}
//! {"op":"status"}
//! {"op":"stop","source":"default"}
//! {"op":"list"}
//! ```
//!
//! ## Configuration
//! - `--config <path>` or TXLOG_CONFIG: YAML config file (optional)
//! - TXLOG__*: config overrides, e.g. TXLOG__RESTORE__POLL_INTERVAL_MS=500
//! - TXLOG_LOG: tracing filter (default: info)

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use txlog::config::Config;
use txlog::id::TxIdGenerator;
use txlog::operation::{Method, OperationInput};
use txlog::pool::LogPool;
use txlog::restore::{RestoreControl, RestoreRegistry, RestoreRequest};
use txlog::saga::LoggingExecutor;
use txlog::steps::{AppendOnDelete, AppendOnPut, SagaStep, StepContext};
use txlog::transport::MemoryLogTransport;
use txlog::utils::bootstrap::{init_tracing, parse_config_path};

const DEFAULT_SCHEMA: &str = "default";
const DEFAULT_NAMESPACE: &str = "data";

/// A document write as given on the command line.
#[derive(Debug, Deserialize)]
struct WriteCommand {
    source: Option<String>,
    schema: Option<String>,
    namespace: Option<String>,
    entity: String,
    id: String,
    body: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct SourceCommand {
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum Command {
    Put(WriteCommand),
    Delete(WriteCommand),
    Restore(RestoreRequest),
    Status(SourceCommand),
    Stop(SourceCommand),
    List,
}

struct Standalone {
    ids: TxIdGenerator,
    append_put: AppendOnPut,
    append_delete: AppendOnDelete,
    control: RestoreControl,
}

impl Standalone {
    fn new(config: Config) -> Self {
        let transport = Arc::new(MemoryLogTransport::new());
        let pool = Arc::new(LogPool::new(transport, config.txlog));
        let registry = Arc::new(RestoreRegistry::new(
            pool.clone(),
            Arc::new(LoggingExecutor::new()),
            config.restore,
        ));
        Self {
            ids: TxIdGenerator::new(),
            append_put: AppendOnPut::new(pool.clone()),
            append_delete: AppendOnDelete::new(pool),
            control: RestoreControl::new(registry),
        }
    }

    async fn handle(&self, command: Command) -> Value {
        match command {
            Command::Put(write) => self.write(&self.append_put, Method::Put, write).await,
            Command::Delete(write) => self.write(&self.append_delete, Method::Delete, write).await,
            Command::Restore(request) => match self.control.start(&request).await {
                Ok(progress) => json!({"ok": true, "restore": progress}),
                Err(e) => failure(e),
            },
            Command::Status(cmd) => match self.control.status(cmd.source.as_deref()).await {
                Some(progress) => json!({"ok": true, "restore": progress}),
                None => json!({"ok": false, "error": "No restore for source"}),
            },
            Command::Stop(cmd) => match self.control.stop(cmd.source.as_deref()).await {
                Some(progress) => json!({"ok": true, "restore": progress}),
                None => json!({"ok": false, "error": "No restore for source"}),
            },
            Command::List => json!({"ok": true, "restores": self.control.list().await}),
        }
    }

    async fn write(&self, step: &dyn SagaStep, method: Method, write: WriteCommand) -> Value {
        let input = OperationInput {
            tx_id: self.ids.next_id(),
            method,
            schema: write.schema.unwrap_or_else(|| DEFAULT_SCHEMA.to_string()),
            namespace: write.namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            entity: write.entity,
            id: write.id,
            version: Utc::now().fixed_offset(),
            body: write.body,
        };
        let context = StepContext {
            source: write.source,
            input,
        };
        match step.execute(&context).await {
            Ok(appended) => json!({
                "ok": true,
                "topic": appended.topic,
                "txId": appended.id.to_string(),
                "position": appended.position,
            }),
            Err(e) => failure(e),
        }
    }
}

fn failure(e: impl std::error::Error) -> Value {
    let mut message = e.to_string();
    let mut cause = e.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    json!({"ok": false, "error": message})
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        default_source = %config.txlog.default_source,
        poll_interval_ms = config.restore.poll_interval_ms,
        "txlog-standalone started"
    );

    let standalone = Standalone::new(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Command>(line) {
            Ok(command) => standalone.handle(command).await,
            Err(e) => {
                warn!(error = %e, "Unparseable command");
                json!({"ok": false, "error": format!("Invalid command: {}", e)})
            }
        };
        println!("{}", response);
    }

    info!("stdin closed, shutting down");
    Ok(())
}
