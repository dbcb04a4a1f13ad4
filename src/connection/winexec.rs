//! Generic Windows remote-execution connector.
//!
//! Wraps an external remote-exec tool (a `wmiexec`/`psexec`-style helper)
//! invoked per command through `tokio::process`. The tool is taken from the
//! endpoint's `tool` tag and may itself carry arguments, e.g.
//! `python3 /opt/tools/wmiexec.py`. Exec capability only.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{Capability, CommandOutput, Connector, ConnectorError, ConnectorResult, Endpoint};

const CAPABILITIES: &[Capability] = &[Capability::Execute];

const DEFAULT_TOOL: &str = "wmiexec";

/// Windows remote-exec session backed by an external tool.
#[derive(Debug)]
pub struct WinExecConnector {
    identifier: String,
    target: String,
    tool: Vec<String>,
    timeout: Duration,
}

impl WinExecConnector {
    /// Build a session for `endpoint`.
    ///
    /// Fails when the configured tool string cannot be parsed into an
    /// argument vector. Reachability is proven by the resolver's liveness
    /// probe, which runs a trivial command through the tool.
    pub async fn connect(endpoint: &Endpoint) -> ConnectorResult<Self> {
        let identifier = endpoint.identifier();
        let tool_line = endpoint.tool.as_deref().unwrap_or(DEFAULT_TOOL);
        let tool = shell_words::split(tool_line).map_err(|e| {
            ConnectorError::ConnectFailed(format!("invalid tool '{}': {}", tool_line, e))
        })?;
        if tool.is_empty() {
            return Err(ConnectorError::ConnectFailed("empty tool".to_string()));
        }

        // wmiexec-style target syntax: user:password@host
        let target = match &endpoint.password {
            Some(password) => format!("{}:{}@{}", endpoint.user, password, endpoint.addr),
            None => format!("{}@{}", endpoint.user, endpoint.addr),
        };

        debug!(endpoint = %identifier, tool = %tool_line, "Preparing Windows exec session");
        Ok(Self {
            identifier,
            target,
            tool,
            timeout: endpoint.timeout,
        })
    }
}

#[async_trait]
impl Connector for WinExecConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn transport(&self) -> &'static str {
        "winexec"
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    async fn is_alive(&self) -> bool {
        matches!(self.execute("whoami").await, Ok(out) if out.is_success())
    }

    async fn execute(&self, command: &str) -> ConnectorResult<CommandOutput> {
        trace!(endpoint = %self.identifier, command = %command, "Executing via external tool");

        let mut cmd = Command::new(&self.tool[0]);
        cmd.args(&self.tool[1..])
            .arg(&self.target)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| ConnectorError::ExecFailed(format!("spawn {}: {}", self.tool[0], e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ConnectorError::ExecFailed(e.to_string())),
            Err(_) => return Err(ConnectorError::Timeout(self.timeout.as_secs())),
        };

        Ok(CommandOutput::new(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.code().unwrap_or(-1),
        ))
    }

    async fn close(&self) -> ConnectorResult<()> {
        // Tool invocations are per-command; there is no session to tear down.
        trace!(endpoint = %self.identifier, "Windows exec session closed");
        Ok(())
    }
}
