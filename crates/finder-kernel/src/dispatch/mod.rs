//! The dispatcher.
//!
//! [`Connector`] owns the volume registry and runs each command through the
//! request lifecycle (see [`RequestState`]):
//!
//! 1. validate the command name (no volume is touched for unknown ones)
//! 2. apply the request's `mimes` filter to every volume
//! 3. run the handler
//! 4. merge removed nodes reported by the handler and by every volume
//! 5. drop hidden and filtered-out nodes from `added`/`changed`
//! 6. attach debug info when enabled, publish `command.<name>`

mod args;
mod batch;
mod handlers;
mod state;

pub use args::Args;
pub use batch::Batch;
pub use state::{Lifecycle, RequestState};

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexSet;
use serde_json::{Map, Value, json};

use finder_types::{CommandError, ErrorKind, FileNode, Request, Response};

use crate::commands::Command;
use crate::config::{ConnectorConfig, RootConfig};
use crate::events::{ConnectorEvent, EventBus, Subscription};
use crate::registry::{MountError, VolumeRegistry};
use crate::volume::{Driver, MemoryDriver};

use handlers::Ctx;

/// Events buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Connector: a registry of mounted volumes plus the command dispatcher.
///
/// Mounting needs `&mut self`; once started, `exec` only needs `&self` and
/// the connector can be shared behind an `Arc`.
pub struct Connector {
    config: ConnectorConfig,
    registry: VolumeRegistry,
    events: EventBus<ConnectorEvent>,
    ready: bool,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("registry", &self.registry)
            .field("ready", &self.ready)
            .finish_non_exhaustive()
    }
}

impl Connector {
    /// Create a connector with the built-in drivers registered. Nothing is
    /// mounted until [`start`](Self::start).
    pub fn new(config: ConnectorConfig) -> Self {
        let mut registry = VolumeRegistry::new();
        let memory: Arc<dyn Driver> = Arc::new(MemoryDriver);
        registry.register_driver("Memory", Arc::clone(&memory));
        registry.register_driver("Test", memory);
        Self {
            config,
            registry,
            events: EventBus::new(EVENT_CAPACITY),
            ready: false,
        }
    }

    /// Create and start a connector.
    pub async fn open(config: ConnectorConfig) -> Self {
        let mut connector = Self::new(config);
        connector.start().await;
        connector
    }

    /// Register an extra driver. Returns `false` when its prefix cannot
    /// lead a volume id.
    pub fn register_driver(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) -> bool {
        self.registry.register_driver(name, driver)
    }

    /// Mount the configured roots and start accepting commands. Roots that
    /// fail to mount are listed in the registry's mount errors.
    pub async fn start(&mut self) {
        let roots = self.config.roots.clone();
        for root in &roots {
            // Failures are recorded by the registry and published.
            let _ = self.mount(root).await;
        }
        self.ready = true;
        tracing::info!(
            volumes = self.registry.len(),
            mount_errors = self.registry.mount_errors().len(),
            "connector ready"
        );
    }

    /// Mount one more root.
    pub async fn mount(&mut self, root: &RootConfig) -> Result<String, MountError> {
        let result = self.registry.mount(root).await;
        self.events.publish(match &result {
            Ok(id) => ConnectorEvent::Mounted {
                volume_id: id.clone(),
                driver: root.driver.clone(),
            },
            Err(err) => ConnectorEvent::MountFailed {
                driver: root.driver.clone(),
                error: err.to_string(),
            },
        });
        result
    }

    pub async fn unmount(&mut self, id: &str) -> bool {
        let unmounted = self.registry.unmount(id).await;
        if unmounted {
            self.events.publish(ConnectorEvent::Unmounted {
                volume_id: id.to_string(),
            });
        }
        unmounted
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus<ConnectorEvent> {
        &self.events
    }

    /// Subscribe to connector events matching `pattern`.
    pub fn subscribe(&self, pattern: &str) -> Subscription<ConnectorEvent> {
        self.events.subscribe(pattern)
    }

    /// Handle a request, turning fatal errors into an error envelope.
    pub async fn handle(&self, request: Request) -> Response {
        self.exec(&request.command, request.args)
            .await
            .unwrap_or_else(Response::from)
    }

    /// Execute one command.
    #[tracing::instrument(skip_all, name = "connector.exec", fields(command = %command))]
    pub async fn exec(
        &self,
        command: &str,
        args: Map<String, Value>,
    ) -> Result<Response, CommandError> {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new();

        if !self.ready {
            lifecycle.advance(RequestState::Error);
            tracing::warn!("command received before the connector was started");
            return Err(CommandError::new(ErrorKind::Unknown));
        }
        let Some(cmd) = Command::from_str(command) else {
            lifecycle.advance(RequestState::Error);
            tracing::warn!("unknown command");
            return Err(CommandError::new(ErrorKind::UnknownCmd));
        };
        let args = Args::new(cmd, args);
        lifecycle.advance(RequestState::Validated);

        if args.has("mimes") {
            let mimes = args.list("mimes");
            for (_, volume) in self.registry.all() {
                volume.set_mimes_filter(mimes.clone());
            }
        }

        lifecycle.advance(RequestState::Executing);
        let ctx = Ctx {
            registry: &self.registry,
            config: &self.config,
            args: &args,
        };
        let mut response = match handlers::run(cmd, &ctx).await {
            Ok(response) => response,
            Err(err) => {
                lifecycle.advance(RequestState::Error);
                self.drain_removed();
                tracing::debug!(error = %err, "command failed");
                return Err(err);
            }
        };

        lifecycle.advance(RequestState::Aggregating);
        let removed = std::mem::take(&mut response.removed);
        response.removed = self.collect_removed(removed);

        lifecycle.advance(RequestState::Filtering);
        self.filter(&mut response);

        if self.config.debug && args.flag("debug") {
            response.debug = Some(self.debug_info(started));
        }

        lifecycle.advance(RequestState::Responded);
        self.publish(cmd, &response);
        Ok(response)
    }

    /// Merge handler-reported removals with every volume's removed buffer,
    /// de-duplicated in first-seen order. Buffers are reset.
    fn collect_removed(&self, reported: Vec<String>) -> Vec<String> {
        let mut removed: IndexSet<String> = reported.into_iter().collect();
        for node in self.drain_removed() {
            removed.insert(node.hash);
        }
        removed.into_iter().collect()
    }

    fn drain_removed(&self) -> Vec<FileNode> {
        let mut nodes = Vec::new();
        for (_, volume) in self.registry.all() {
            nodes.extend(volume.removed());
            volume.reset_removed();
        }
        nodes
    }

    /// Drop hidden nodes and nodes the default volume's mime filter rejects.
    fn filter(&self, response: &mut Response) {
        let default = self.registry.default_volume();
        let keep = |node: &FileNode| {
            !node.hidden
                && default
                    .as_ref()
                    .is_none_or(|volume| volume.mime_accepted(&node.mime))
        };
        response.added.retain(|node| keep(node));
        response.changed.retain(|node| keep(node));
    }

    fn debug_info(&self, started: Instant) -> Value {
        let volumes: Vec<Value> = self.registry.all().map(|(_, v)| v.debug()).collect();
        json!({
            "connector": env!("CARGO_PKG_NAME"),
            "time": started.elapsed().as_secs_f64(),
            "mountErrors": self.registry.mount_errors(),
            "resolutions": self.registry.resolutions(),
            "volumes": volumes,
        })
    }

    fn publish(&self, command: Command, response: &Response) {
        let hashes = |nodes: &[FileNode]| nodes.iter().map(|n| n.hash.clone()).collect::<Vec<_>>();
        let event = ConnectorEvent::Executed {
            command: command.as_str().to_string(),
            added: hashes(&response.added),
            changed: hashes(&response.changed),
            removed: response.removed.clone(),
            warnings: response.warning.len(),
        };
        if command.is_mutating() {
            tracing::info!(
                added = response.added.len(),
                changed = response.changed.len(),
                removed = response.removed.len(),
                warnings = response.warning.len(),
                "command executed"
            );
        } else {
            tracing::debug!(warnings = response.warning.len(), "command executed");
        }
        self.events.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_started_is_unknown_error() {
        let connector = Connector::new(ConnectorConfig::default().with_root(RootConfig::new("Test")));
        let err = connector.exec("open", Map::new()).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Unknown));
        assert!(connector.registry().is_empty());
    }

    #[tokio::test]
    async fn test_builtin_drivers() {
        let connector = Connector::new(ConnectorConfig::default());
        assert_eq!(connector.registry().drivers(), vec!["Memory", "Test"]);
    }

    #[tokio::test]
    async fn test_handle_wraps_errors() {
        let connector = Connector::open(ConnectorConfig::default()).await;
        let response = connector.handle(Request::new("nope")).await;
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"error": "errUnknownCmd"})
        );
    }
}
