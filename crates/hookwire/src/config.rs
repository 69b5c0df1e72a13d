//! Controller configuration and builder

use crate::{Controller, HookwireError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Host of the agent command server
    pub command_host: String,
    /// Port of the agent command server
    pub command_port: u16,
    /// Host the event listener binds to
    pub listen_host: String,
    /// Port the event listener binds to (0 picks a free port)
    pub listen_port: u16,
    /// Default wait for correlated responses
    pub timeout: Duration,
    /// Limit on each HTTP exchange with the command server
    pub request_timeout: Duration,
    /// Target host process id handed to the injector
    pub pid: u32,
    /// Injector tool; when unset nothing is spawned
    pub injector: Option<PathBuf>,
    /// How long in-flight connections may run after shutdown starts
    pub shutdown_grace: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            command_host: "127.0.0.1".to_string(),
            command_port: 19088,
            listen_host: "127.0.0.1".to_string(),
            listen_port: 18999,
            timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            pid: 0,
            injector: None,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ControllerConfig {
    /// Base URL of the command server
    pub fn command_url(&self) -> String {
        format!("http://{}:{}", self.command_host, self.command_port)
    }

    /// Address string for the event listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.command_host.is_empty() {
            return Err(HookwireError::Configuration("command host is empty".to_string()));
        }
        if self.listen_host.is_empty() {
            return Err(HookwireError::Configuration("listen host is empty".to_string()));
        }
        if self.command_port == 0 {
            return Err(HookwireError::Configuration("command port must be non-zero".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(HookwireError::Configuration("timeout must be non-zero".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(HookwireError::Configuration("request timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Builder for [`Controller`]
#[derive(Debug, Clone, Default)]
pub struct ControllerBuilder {
    config: ControllerConfig,
}

impl ControllerBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent command server address
    pub fn with_command_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.command_host = host.into();
        self.config.command_port = port;
        self
    }

    /// Set the event listener bind address
    pub fn with_listen_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.listen_host = host.into();
        self.config.listen_port = port;
        self
    }

    /// Set the default correlation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the HTTP timeout for command server requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the target process id
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.config.pid = pid;
        self
    }

    /// Spawn this injector tool on start
    pub fn with_injector(mut self, path: PathBuf) -> Self {
        self.config.injector = Some(path);
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Build the configuration
    pub fn build_config(self) -> ControllerConfig {
        self.config
    }

    /// Start a controller with this configuration
    pub async fn start(self) -> Result<Controller> {
        Controller::start(self.build_config()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.command_url(), "http://127.0.0.1:19088");
        assert_eq!(config.listen_addr(), "127.0.0.1:18999");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.pid, 0);
        assert!(config.injector.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_configuration() {
        let config = ControllerBuilder::new()
            .with_command_addr("10.0.0.2", 20000)
            .with_listen_addr("0.0.0.0", 0)
            .with_timeout(Duration::from_secs(3))
            .with_request_timeout(Duration::from_secs(7))
            .with_pid(1234)
            .with_injector(PathBuf::from("/opt/tools/hook"))
            .with_shutdown_grace(Duration::from_millis(250))
            .build_config();

        assert_eq!(config.command_url(), "http://10.0.0.2:20000");
        assert_eq!(config.listen_addr(), "0.0.0.0:0");
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.request_timeout, Duration::from_secs(7));
        assert_eq!(config.pid, 1234);
        assert_eq!(config.injector, Some(PathBuf::from("/opt/tools/hook")));
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = ControllerBuilder::new().with_timeout(Duration::ZERO).build_config();
        assert!(matches!(config.validate(), Err(HookwireError::Configuration(_))));

        let config = ControllerBuilder::new().with_request_timeout(Duration::ZERO).build_config();
        assert!(matches!(config.validate(), Err(HookwireError::Configuration(_))));

        let config = ControllerBuilder::new().with_command_addr("", 1).build_config();
        assert!(matches!(config.validate(), Err(HookwireError::Configuration(_))));

        let config = ControllerBuilder::new().with_command_addr("localhost", 0).build_config();
        assert!(matches!(config.validate(), Err(HookwireError::Configuration(_))));
    }
}
