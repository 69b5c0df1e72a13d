//! External injector launcher
//!
//! The injector is an opaque tool that attaches an agent to a target
//! process. We only start it with the right arguments and keep the child
//! handle so it can be stopped with the controller.

use crate::{HookwireError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Launcher for the injector tool
#[derive(Debug, Clone)]
pub struct Injector {
    program: PathBuf,
}

impl Injector {
    /// Use the tool at `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Path of the tool
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the tool: `<pid> <host>:<port> <callback_url>`
    pub fn args(pid: u32, command_host: &str, command_port: u16, callback_url: &str) -> Vec<String> {
        vec![
            pid.to_string(),
            format!("{}:{}", command_host, command_port),
            callback_url.to_string(),
        ]
    }

    /// Start the tool with its output discarded
    pub fn spawn(&self, pid: u32, command_host: &str, command_port: u16, callback_url: &str) -> Result<Child> {
        let args = Self::args(pid, command_host, command_port, callback_url);
        debug!("Spawning injector {:?} {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HookwireError::Inject(format!("Failed to start {}: {}", self.program.display(), e)))?;

        info!("Injector started for pid {} (child {:?})", pid, child.id());
        Ok(child)
    }
}
