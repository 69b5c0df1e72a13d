//! Facade composing listener, bus, registries and command channel

use crate::bus::{EventHandler, EventKey, SubscriptionId};
use crate::{
    AgentClient, AgentRegistry, CommandChannel, ControllerBuilder, ControllerConfig, CorrelationRegistry,
    Dispatcher, EventBus, EventListener, HookwireError, Injector, Result,
};
use hookwire_proto::{Command, EventKind};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handle to a running controller
///
/// Cheap to clone; every clone talks to the same listener and registries.
/// Separate controllers share nothing.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    config: ControllerConfig,
    local_addr: SocketAddr,
    bus: Arc<EventBus>,
    agents: Arc<AgentRegistry>,
    correlation: Arc<CorrelationRegistry>,
    commands: CommandChannel,
    shutdown: CancellationToken,
    server: Mutex<Option<JoinHandle<Result<()>>>>,
    injector: Mutex<Option<Child>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Controller {
    /// Create a controller builder
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Bind the event listener, start serving, and launch the injector if configured
    pub async fn start(config: ControllerConfig) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::new());
        let agents = Arc::new(AgentRegistry::new());
        let correlation = Arc::new(CorrelationRegistry::new());
        let commands = CommandChannel::new(config.command_url(), correlation.clone(), config.timeout, config.request_timeout)?;

        let listener = EventListener::bind(&config.listen_addr()).await?;
        let local_addr = listener.local_addr()?;

        let dispatcher = Arc::new(Dispatcher::new(bus.clone(), agents.clone(), correlation.clone()));
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(listener.serve(dispatcher, shutdown.clone(), config.shutdown_grace));

        let controller = Self {
            inner: Arc::new(Inner {
                config,
                local_addr,
                bus,
                agents,
                correlation,
                commands,
                shutdown,
                server: Mutex::new(Some(server)),
                injector: Mutex::new(None),
            }),
        };

        if let Some(program) = controller.inner.config.injector.clone() {
            let config = &controller.inner.config;
            let child = Injector::new(program).spawn(
                config.pid,
                &config.command_host,
                config.command_port,
                &controller.callback_url(),
            );
            match child {
                Ok(child) => *controller.inner.injector.lock().await = Some(child),
                Err(e) => {
                    controller.shutdown().await?;
                    return Err(e);
                }
            }
        }

        info!("Command server at {}", controller.inner.config.command_url());
        Ok(controller)
    }

    /// Configuration the controller was started with
    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Address the event listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// URL agents should push events to
    pub fn callback_url(&self) -> String {
        format!("http://{}:{}", self.inner.config.listen_host, self.inner.local_addr.port())
    }

    /// Event bus
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Correlation registry
    pub fn correlation(&self) -> &CorrelationRegistry {
        &self.inner.correlation
    }

    /// Command channel, including the service endpoints
    pub fn commands(&self) -> &CommandChannel {
        &self.inner.commands
    }

    /// Subscribe to one kind, or to everything with [`EventKey::All`]
    pub async fn subscribe<H>(&self, key: impl Into<EventKey>, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.inner.bus.subscribe(key, handler).await
    }

    /// Subscribe for a single delivery
    pub async fn subscribe_once<H>(&self, key: impl Into<EventKey>, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.inner.bus.subscribe_once(key, handler).await
    }

    /// Subscribe to several kinds at once; empty means all
    pub async fn subscribe_many<H>(&self, kinds: &[EventKind], handler: H) -> Vec<SubscriptionId>
    where
        H: EventHandler + 'static,
    {
        self.inner.bus.subscribe_many(kinds, handler).await
    }

    /// Subscribe to several kinds, each for a single delivery
    pub async fn subscribe_many_once<H>(&self, kinds: &[EventKind], handler: H) -> Vec<SubscriptionId>
    where
        H: EventHandler + 'static,
    {
        self.inner.bus.subscribe_many_once(kinds, handler).await
    }

    /// Remove a subscription
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.bus.unsubscribe(id).await
    }

    /// Send a command without waiting for its answer
    pub async fn send(&self, client_id: u64, command: &Command) -> Result<Value> {
        self.inner.commands.send(client_id, command).await
    }

    /// Send a command and wait for the agent's response data
    pub async fn send_and_wait(&self, client_id: u64, command: Command, timeout: Option<Duration>) -> Result<Option<Value>> {
        self.inner.commands.send_and_wait(client_id, command, timeout).await
    }

    /// Snapshot of connected agents
    pub async fn agents(&self) -> Vec<AgentClient> {
        self.inner.agents.list().await
    }

    /// Serve until [`Controller::shutdown`] is called
    pub async fn run(&self) -> Result<()> {
        let server = self.inner.server.lock().await.take();
        match server {
            Some(server) => join_server(server).await,
            None => Err(HookwireError::Configuration("Controller is already running or stopped".to_string())),
        }
    }

    /// Stop the listener, cancel outstanding waits and stop the injector
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down controller");
        self.inner.shutdown.cancel();
        self.inner.correlation.cancel_all().await;

        if let Some(mut child) = self.inner.injector.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop injector: {}", e);
            }
        }

        let server = self.inner.server.lock().await.take();
        if let Some(server) = server {
            join_server(server).await?;
        }

        info!("Controller shutdown complete");
        Ok(())
    }

    /// True once shutdown has started
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

async fn join_server(server: JoinHandle<Result<()>>) -> Result<()> {
    server
        .await
        .map_err(|e| HookwireError::Protocol(format!("Event listener task failed: {}", e)))?
}
