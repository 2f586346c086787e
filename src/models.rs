//! Data model
//!
//! Plain value records shared by the store, the SSH client and the renderer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Token replaced with the configured working directory before a command is sent
pub const WORK_DIR_PLACEHOLDER: &str = "$CLAUDE_DIR";

/// Default SSH port
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default remote working directory
pub const DEFAULT_WORK_DIR: &str = "/home/pi";

/// A to-do item mirrored from the assistant's task list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub status: TaskStatus,
    /// Present-continuous label shown while the task is running ("Running tests")
    pub active_form: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" | "inprogress" | "active" => Some(TaskStatus::InProgress),
            "completed" | "done" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// An assistant sub-agent that can be launched remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent_type: AgentType,
    pub icon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Explore,
    Plan,
    GeneralPurpose,
    CodeReviewer,
    TestRunner,
    Custom,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Explore => "explore",
            AgentType::Plan => "plan",
            AgentType::GeneralPurpose => "general_purpose",
            AgentType::CodeReviewer => "code_reviewer",
            AgentType::TestRunner => "test_runner",
            AgentType::Custom => "custom",
        }
    }
}

/// A named shell command template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub name: String,
    /// Literal shell text, may contain [`WORK_DIR_PLACEHOLDER`]
    pub command: String,
    pub description: String,
    pub category: CommandCategory,
    #[serde(default)]
    pub is_favorite: bool,
}

impl Command {
    pub fn new(
        id: &str,
        name: &str,
        command: &str,
        description: &str,
        category: CommandCategory,
        is_favorite: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            command: command.to_string(),
            description: description.to_string(),
            category,
            is_favorite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Git,
    FileOperations,
    Search,
    Build,
    Test,
    Claude,
    Custom,
}

impl CommandCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::Git => "git",
            CommandCategory::FileOperations => "file_operations",
            CommandCategory::Search => "search",
            CommandCategory::Build => "build",
            CommandCategory::Test => "test",
            CommandCategory::Claude => "claude",
            CommandCategory::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "git" => Some(CommandCategory::Git),
            "file_operations" | "files" | "file" => Some(CommandCategory::FileOperations),
            "search" => Some(CommandCategory::Search),
            "build" => Some(CommandCategory::Build),
            "test" => Some(CommandCategory::Test),
            "claude" => Some(CommandCategory::Claude),
            "custom" => Some(CommandCategory::Custom),
            _ => None,
        }
    }
}

/// A named, ordered sequence of command steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Steps in ascending `order`, independent of how they were listed
    pub fn ordered_steps(&self) -> Vec<&WorkflowStep> {
        let mut steps: Vec<&WorkflowStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub order: u32,
    pub action: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl WorkflowStep {
    pub fn new(order: u32, action: &str) -> Self {
        Self {
            order,
            action: action.to_string(),
            parameters: BTreeMap::new(),
        }
    }
}

/// How to authenticate the login session
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthMethod {
    Password {
        password: String,
    },
    KeyFile {
        path: String,
        #[serde(default)]
        passphrase: Option<String>,
    },
}

// Keep credentials out of logs and panic messages
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { .. } => f.write_str("Password(****)"),
            AuthMethod::KeyFile { path, .. } => write!(f, "KeyFile({})", path),
        }
    }
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Password {
            password: String::new(),
        }
    }
}

/// Connection profile for the remote login session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    /// Substituted for [`WORK_DIR_PLACEHOLDER`] in every executed command
    pub work_dir: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            username: String::new(),
            auth: AuthMethod::default(),
            work_dir: DEFAULT_WORK_DIR.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// `user@host:port` for display
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub message: String,
    pub last_connected: Option<DateTime<Utc>>,
}

/// An installable remote tool package (MCP server) and the sub-commands it exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: String,
    pub name: String,
    pub description: String,
    pub package_name: String,
    pub repository: String,
    pub category: PluginCategory,
    #[serde(default)]
    pub is_installed: bool,
    #[serde(default)]
    pub commands: Vec<PluginCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginCommand {
    pub name: String,
    pub description: String,
    pub parameters: Vec<CommandParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    pub param_type: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginCategory {
    FileSystem,
    Web,
    Database,
    AiTools,
    Development,
    Automation,
    Custom,
}

impl PluginCategory {
    pub const ALL: [PluginCategory; 7] = [
        PluginCategory::FileSystem,
        PluginCategory::Web,
        PluginCategory::Database,
        PluginCategory::AiTools,
        PluginCategory::Development,
        PluginCategory::Automation,
        PluginCategory::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCategory::FileSystem => "file_system",
            PluginCategory::Web => "web",
            PluginCategory::Database => "database",
            PluginCategory::AiTools => "ai_tools",
            PluginCategory::Development => "development",
            PluginCategory::Automation => "automation",
            PluginCategory::Custom => "custom",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }

    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
    }
}

/// A user-added plugin source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRepository {
    pub id: String,
    pub name: String,
    pub url: String,
    pub added_date: DateTime<Utc>,
}

/// One line of the scrollback terminal view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalLine {
    pub text: String,
    pub line_type: LineType,
}

impl TerminalLine {
    pub fn new(text: impl Into<String>, line_type: LineType) -> Self {
        Self {
            text: text.into(),
            line_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Command,
    Output,
    Error,
    Success,
}

impl LineType {
    pub fn prefix(&self) -> &'static str {
        match self {
            LineType::Command => "$ ",
            LineType::Error => "[ERROR] ",
            LineType::Success => "[✓] ",
            LineType::Output => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_steps_ignores_list_order() {
        let workflow = Workflow {
            id: "w".to_string(),
            name: "W".to_string(),
            description: String::new(),
            steps: vec![
                WorkflowStep::new(3, "c"),
                WorkflowStep::new(1, "a"),
                WorkflowStep::new(2, "b"),
            ],
        };
        let actions: Vec<&str> = workflow
            .ordered_steps()
            .iter()
            .map(|s| s.action.as_str())
            .collect();
        assert_eq!(actions, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TaskStatus::parse("done"), Some(TaskStatus::Completed));
        assert_eq!(TaskStatus::parse("in-progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("PENDING"), Some(TaskStatus::Pending));
        assert_eq!(TaskStatus::parse("later"), None);
    }

    #[test]
    fn test_plugin_category_parse_and_label() {
        assert_eq!(PluginCategory::parse("ai-tools"), Some(PluginCategory::AiTools));
        assert_eq!(PluginCategory::parse("File System"), Some(PluginCategory::FileSystem));
        assert_eq!(PluginCategory::AiTools.label(), "AI TOOLS");
    }

    #[test]
    fn test_auth_debug_hides_password() {
        let auth = AuthMethod::Password {
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", auth).contains("hunter2"));
    }

    #[test]
    fn test_connection_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 22);
        assert_eq!(config.work_dir, "/home/pi");
    }

    #[test]
    fn test_task_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
