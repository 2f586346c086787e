//! Companion controller
//!
//! Turns each user action into either a store mutation or a single call into
//! the SSH client, then records the result in the store. Remote failures are
//! caught here and stored as text where output would have appeared.

use crate::models::{ConnectionConfig, ConnectionState, LineType, TerminalLine, Workflow};
use crate::ssh::{SshError, SshManager};
use crate::store::{self, AppStore};
use chrono::Utc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("No {kind} with id '{id}'")]
    NotFound { kind: &'static str, id: String },
    #[error(transparent)]
    Ssh(#[from] SshError),
}

/// Outcome of running every step of a workflow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowReport {
    pub executed: usize,
    pub failed: usize,
}

pub struct Companion {
    store: AppStore,
    ssh: SshManager,
}

impl Companion {
    pub fn new(ssh: SshManager) -> Self {
        Self {
            store: AppStore::new(),
            ssh,
        }
    }

    pub fn store(&self) -> &AppStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AppStore {
        &mut self.store
    }

    pub fn is_connected(&self) -> bool {
        self.ssh.is_connected()
    }

    /// Open the login session; the outcome lands in the connection state
    pub async fn connect(&mut self, config: ConnectionConfig) -> bool {
        match self.ssh.connect(config).await {
            Ok(message) => {
                tracing::info!("{}", message);
                self.store.push_terminal_line(&message, LineType::Success);
                self.store.set_connection_state(ConnectionState {
                    is_connected: true,
                    message,
                    last_connected: Some(Utc::now()),
                });
                true
            }
            Err(e) => {
                tracing::warn!("Connection failed: {}", e);
                let message = e.to_string();
                self.store.push_terminal_line(&message, LineType::Error);
                self.store.set_connection_state(ConnectionState {
                    is_connected: false,
                    message,
                    last_connected: None,
                });
                false
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.ssh.disconnect();
        self.store.set_connection_state(ConnectionState {
            is_connected: false,
            message: "Disconnected".to_string(),
            last_connected: None,
        });
    }

    /// Run one command, echoing it and its result into the terminal view.
    ///
    /// The result text (or failure message) also becomes the current command
    /// output.
    pub async fn execute_command(&mut self, command: &str) -> Result<String, SshError> {
        self.store.push_terminal_line(command, LineType::Command);
        self.store.set_executing(true);
        let result = self.ssh.execute_command(command).await;
        self.store.set_executing(false);

        match &result {
            Ok(output) => {
                self.store.set_command_output(output.clone());
                self.store.push_terminal_lines(output_lines(output));
            }
            Err(e) => {
                tracing::warn!("Command failed: {}", e);
                let message = e.to_string();
                self.store.push_terminal_line(&message, LineType::Error);
                self.store.set_command_output(message.clone());

                if self.store.connection_state().is_connected && !self.ssh.is_connected() {
                    self.store.set_connection_state(ConnectionState {
                        is_connected: false,
                        message: format!("Connection lost: {}", message),
                        last_connected: None,
                    });
                }
            }
        }
        result
    }

    /// Run every step in ascending order, one at a time. A failing step does
    /// not stop the ones after it.
    pub async fn execute_workflow(&mut self, workflow: &Workflow) -> WorkflowReport {
        let mut report = WorkflowReport::default();
        tracing::info!(
            "Running workflow '{}' ({} steps)",
            workflow.name,
            workflow.steps.len()
        );

        for step in workflow.ordered_steps() {
            report.executed += 1;
            if self.execute_command(&step.action).await.is_err() {
                report.failed += 1;
            }
        }

        let summary = format!(
            "Workflow '{}' finished: {} step(s), {} failed",
            workflow.name, report.executed, report.failed
        );
        let line_type = if report.failed == 0 {
            LineType::Success
        } else {
            LineType::Error
        };
        self.store.push_terminal_line(&summary, line_type);
        report
    }

    pub async fn run_workflow(&mut self, workflow_id: &str) -> Result<WorkflowReport, CompanionError> {
        let workflow = self
            .store
            .find_workflow(workflow_id)
            .cloned()
            .ok_or_else(|| not_found("workflow", workflow_id))?;
        Ok(self.execute_workflow(&workflow).await)
    }

    pub async fn run_saved_command(&mut self, command_id: &str) -> Result<String, CompanionError> {
        let command = self
            .store
            .find_command(command_id)
            .map(|c| c.command.clone())
            .ok_or_else(|| not_found("command", command_id))?;
        Ok(self.execute_command(&command).await?)
    }

    /// Launch an assistant agent on the remote side
    pub async fn run_agent(&mut self, agent_id: &str) -> Result<String, CompanionError> {
        let command = self
            .store
            .find_agent(agent_id)
            .map(store::agent_command)
            .ok_or_else(|| not_found("agent", agent_id))?;
        Ok(self.execute_command(&command).await?)
    }

    /// Mark a plugin installed and return the command an install would run
    pub fn install_plugin(&mut self, plugin_id: &str) -> Result<String, CompanionError> {
        let plugin = self
            .store
            .find_plugin(plugin_id)
            .cloned()
            .ok_or_else(|| not_found("plugin", plugin_id))?;
        self.store.set_plugin_installed(plugin_id, true);

        let command = store::plugin_install_command(&plugin);
        self.store
            .push_terminal_line(&format!("{} installed ({})", plugin.name, command), LineType::Success);
        Ok(command)
    }

    pub fn uninstall_plugin(&mut self, plugin_id: &str) -> Result<(), CompanionError> {
        let name = self
            .store
            .find_plugin(plugin_id)
            .map(|p| p.name.clone())
            .ok_or_else(|| not_found("plugin", plugin_id))?;
        self.store.set_plugin_installed(plugin_id, false);
        self.store
            .push_terminal_line(&format!("{} uninstalled", name), LineType::Success);
        Ok(())
    }
}

fn not_found(kind: &'static str, id: &str) -> CompanionError {
    CompanionError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Split remote output into terminal lines, dropping ANSI escapes
pub fn output_lines(output: &str) -> Vec<TerminalLine> {
    let stripped = strip_ansi_escapes::strip(output.as_bytes());
    String::from_utf8_lossy(&stripped)
        .lines()
        .map(|line| TerminalLine::new(line, LineType::Output))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowStep;
    use crate::ssh::testing::{test_config, FakeConnector};
    use std::sync::Arc;

    fn companion(fake: &FakeConnector) -> Companion {
        Companion::new(SshManager::with_connector(Arc::new(fake.clone())))
    }

    #[tokio::test]
    async fn test_connect_updates_state() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);

        assert!(app.connect(test_config()).await);
        let state = app.store().connection_state();
        assert!(state.is_connected);
        assert_eq!(state.message, "Connected to pi.local");
        assert!(state.last_connected.is_some());

        app.disconnect();
        let state = app.store().connection_state();
        assert!(!state.is_connected);
        assert_eq!(state.message, "Disconnected");
    }

    #[tokio::test]
    async fn test_failed_connect_stores_message() {
        let fake = FakeConnector::failing("no route");
        let mut app = companion(&fake);

        assert!(!app.connect(test_config()).await);
        let state = app.store().connection_state();
        assert!(!state.is_connected);
        assert!(state.message.contains("no route"));
    }

    #[tokio::test]
    async fn test_execute_without_connection_stores_failure() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);

        assert!(app.execute_command("ls").await.is_err());
        assert_eq!(app.store().command_output(), "Not connected");
        assert_eq!(fake.connects(), 0);

        let lines = app.store().terminal_lines();
        assert_eq!(lines[0], TerminalLine::new("ls", LineType::Command));
        assert_eq!(lines[1], TerminalLine::new("Not connected", LineType::Error));
        assert!(!app.store().is_executing());
    }

    #[tokio::test]
    async fn test_lost_link_clears_connection_state() {
        let fake = FakeConnector::new();
        fake.drop_link_on("git status");
        let mut app = companion(&fake);
        assert!(app.connect(test_config()).await);

        assert!(app.execute_command("git status").await.is_err());
        assert!(!app.is_connected());
        let state = app.store().connection_state();
        assert!(!state.is_connected);
        assert!(state.message.starts_with("Connection lost"));
    }

    #[tokio::test]
    async fn test_failed_command_keeps_connection() {
        let fake = FakeConnector::new();
        fake.respond("false", "", "exit 1");
        let mut app = companion(&fake);
        assert!(app.connect(test_config()).await);

        assert_eq!(app.execute_command("false").await.unwrap(), "exit 1");
        assert!(app.store().connection_state().is_connected);
    }

    #[tokio::test]
    async fn test_output_becomes_terminal_lines() {
        let fake = FakeConnector::new();
        fake.respond("ls", "\x1b[34msrc\x1b[0m\nCargo.toml\n", "");
        let mut app = companion(&fake);
        app.connect(test_config()).await;
        app.store_mut().clear_terminal();

        let output = app.execute_command("ls").await.unwrap();
        assert_eq!(app.store().command_output(), output);

        let texts: Vec<&str> = app
            .store()
            .terminal_lines()
            .iter()
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(texts, vec!["ls", "src", "Cargo.toml"]);
    }

    #[tokio::test]
    async fn test_workflow_runs_steps_in_order() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);
        app.connect(test_config()).await;

        let workflow = Workflow {
            id: "x".to_string(),
            name: "Shuffled".to_string(),
            description: String::new(),
            steps: vec![
                WorkflowStep::new(30, "third"),
                WorkflowStep::new(10, "first"),
                WorkflowStep::new(20, "second"),
            ],
        };

        let report = app.execute_workflow(&workflow).await;
        assert_eq!(report, WorkflowReport { executed: 3, failed: 0 });
        assert_eq!(fake.executed(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_workflow_continues_after_failures() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);

        // Not connected: every step fails, none are skipped
        let report = app.run_workflow("1").await.unwrap();
        assert_eq!(report, WorkflowReport { executed: 3, failed: 3 });
        assert_eq!(fake.connects(), 0);
    }

    #[tokio::test]
    async fn test_default_workflow_substitutes_work_dir() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);
        app.connect(test_config()).await;

        app.run_workflow("0").await.unwrap();
        assert_eq!(
            fake.executed(),
            vec!["cd /srv/project", "claude --version", "claude mcp list"]
        );
    }

    #[tokio::test]
    async fn test_run_agent_and_saved_command() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);
        app.connect(test_config()).await;

        app.run_agent("1").await.unwrap();
        app.run_saved_command("claude3").await.unwrap();
        assert_eq!(
            fake.executed(),
            vec!["claude task explore", "cd /srv/project && claude mcp list"]
        );

        let err = app.run_agent("99").await.unwrap_err();
        assert_eq!(err.to_string(), "No agent with id '99'");
    }

    #[tokio::test]
    async fn test_plugin_install_is_intent_only() {
        let fake = FakeConnector::new();
        let mut app = companion(&fake);
        app.connect(test_config()).await;

        let cmd = app.install_plugin("postgres").unwrap();
        assert!(cmd.contains("@modelcontextprotocol/server-postgres"));
        assert!(app.store().find_plugin("postgres").unwrap().is_installed);
        assert!(fake.executed().is_empty());

        app.uninstall_plugin("postgres").unwrap();
        assert!(!app.store().find_plugin("postgres").unwrap().is_installed);
        assert!(app.install_plugin("nope").is_err());
    }

    #[test]
    fn test_output_lines_empty() {
        assert!(output_lines("").is_empty());
    }
}
