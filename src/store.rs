//! In-memory application store
//!
//! Every list is replaced wholesale on mutation; nothing is persisted and
//! all state resets when the process exits.

use crate::models::{
    Agent, AgentType, Command, CommandCategory, CommandParameter, ConnectionState,
    CustomRepository, LineType, Plugin, PluginCategory, PluginCommand, Task, TaskStatus,
    TerminalLine, Workflow, WorkflowStep,
};
use chrono::Utc;

/// Scrollback limit for the terminal view
pub const MAX_TERMINAL_LINES: usize = 1000;

/// Task totals shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
}

impl TaskCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed
    }
}

pub struct AppStore {
    tasks: Vec<Task>,
    agents: Vec<Agent>,
    commands: Vec<Command>,
    workflows: Vec<Workflow>,
    plugins: Vec<Plugin>,
    repositories: Vec<CustomRepository>,
    terminal: Vec<TerminalLine>,
    /// Lines ever pushed, including ones since dropped from scrollback
    terminal_pushed: usize,
    connection_state: ConnectionState,
    command_output: String,
    is_executing: bool,
}

impl Default for AppStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStore {
    /// Store seeded with the built-in agents, commands, workflows and plugins
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            agents: default_agents(),
            commands: default_commands(),
            workflows: default_workflows(),
            plugins: default_plugins(),
            repositories: Vec::new(),
            terminal: Vec::new(),
            terminal_pushed: 0,
            connection_state: ConnectionState::default(),
            command_output: String::new(),
            is_executing: false,
        }
    }

    // ---- tasks ----

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Append a pending task and return its id
    pub fn add_task(&mut self, content: &str, active_form: &str) -> String {
        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            status: TaskStatus::Pending,
            active_form: active_form.to_string(),
            timestamp: Utc::now(),
        };
        let id = task.id.clone();

        let mut tasks = self.tasks.clone();
        tasks.push(task);
        self.tasks = tasks;
        id
    }

    /// Returns false when no task has that id
    pub fn update_task_status(&mut self, task_id: &str, status: TaskStatus) -> bool {
        let found = self.tasks.iter().any(|t| t.id == task_id);
        self.tasks = self
            .tasks
            .iter()
            .map(|t| {
                if t.id == task_id {
                    Task {
                        status,
                        ..t.clone()
                    }
                } else {
                    t.clone()
                }
            })
            .collect();
        found
    }

    pub fn delete_task(&mut self, task_id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks = self
            .tasks
            .iter()
            .filter(|t| t.id != task_id)
            .cloned()
            .collect();
        self.tasks.len() != before
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    /// Lookup by full id or unambiguous id prefix
    pub fn find_task(&self, id_or_prefix: &str) -> Option<&Task> {
        find_by_prefix(&self.tasks, id_or_prefix, |t| t.id.as_str())
    }

    pub fn task_counts(&self) -> TaskCounts {
        self.tasks.iter().fold(TaskCounts::default(), |mut acc, t| {
            match t.status {
                TaskStatus::Pending => acc.pending += 1,
                TaskStatus::InProgress => acc.in_progress += 1,
                TaskStatus::Completed => acc.completed += 1,
            }
            acc
        })
    }

    // ---- commands ----

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn find_command(&self, command_id: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.id == command_id)
    }

    /// Flip the favourite flag of one command; others are untouched
    pub fn toggle_command_favorite(&mut self, command_id: &str) -> bool {
        let found = self.commands.iter().any(|c| c.id == command_id);
        self.commands = self
            .commands
            .iter()
            .map(|c| {
                if c.id == command_id {
                    Command {
                        is_favorite: !c.is_favorite,
                        ..c.clone()
                    }
                } else {
                    c.clone()
                }
            })
            .collect();
        found
    }

    /// Case-insensitive match on name or command text, optionally by category
    pub fn filter_commands(
        &self,
        query: &str,
        category: Option<CommandCategory>,
    ) -> Vec<&Command> {
        let query = query.to_lowercase();
        self.commands
            .iter()
            .filter(|c| {
                (query.is_empty()
                    || c.name.to_lowercase().contains(&query)
                    || c.command.to_lowercase().contains(&query))
                    && category.map_or(true, |cat| c.category == cat)
            })
            .collect()
    }

    // ---- workflows ----

    pub fn workflows(&self) -> &[Workflow] {
        &self.workflows
    }

    pub fn find_workflow(&self, workflow_id: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.id == workflow_id)
    }

    // ---- agents ----

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn find_agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    // ---- plugins ----

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn find_plugin(&self, plugin_id: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.id == plugin_id)
    }

    /// Case-insensitive match on name or description, optionally by category
    pub fn filter_plugins(&self, query: &str, category: Option<PluginCategory>) -> Vec<&Plugin> {
        let query = query.to_lowercase();
        self.plugins
            .iter()
            .filter(|p| {
                category.map_or(true, |cat| p.category == cat)
                    && (query.is_empty()
                        || p.name.to_lowercase().contains(&query)
                        || p.description.to_lowercase().contains(&query))
            })
            .collect()
    }

    /// Record install intent; nothing is run remotely
    pub fn set_plugin_installed(&mut self, plugin_id: &str, installed: bool) -> bool {
        let found = self.plugins.iter().any(|p| p.id == plugin_id);
        self.plugins = self
            .plugins
            .iter()
            .map(|p| {
                if p.id == plugin_id {
                    Plugin {
                        is_installed: installed,
                        ..p.clone()
                    }
                } else {
                    p.clone()
                }
            })
            .collect();
        found
    }

    pub fn repositories(&self) -> &[CustomRepository] {
        &self.repositories
    }

    pub fn add_repository(&mut self, name: &str, url: &str) -> String {
        let repo = CustomRepository {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            url: url.to_string(),
            added_date: Utc::now(),
        };
        let id = repo.id.clone();

        let mut repositories = self.repositories.clone();
        repositories.push(repo);
        self.repositories = repositories;
        id
    }

    // ---- terminal ----

    pub fn terminal_lines(&self) -> &[TerminalLine] {
        &self.terminal
    }

    pub fn push_terminal_line(&mut self, text: &str, line_type: LineType) {
        self.push_terminal_lines(vec![TerminalLine::new(text, line_type)]);
    }

    /// Append lines, dropping the oldest past [`MAX_TERMINAL_LINES`]
    pub fn push_terminal_lines(&mut self, lines: Vec<TerminalLine>) {
        self.terminal_pushed += lines.len();
        let mut terminal: Vec<TerminalLine> = self.terminal.iter().cloned().chain(lines).collect();
        if terminal.len() > MAX_TERMINAL_LINES {
            terminal.drain(..terminal.len() - MAX_TERMINAL_LINES);
        }
        self.terminal = terminal;
    }

    pub fn terminal_pushed(&self) -> usize {
        self.terminal_pushed
    }

    /// Lines pushed after the counter read `pushed_before`, as far as scrollback still has them
    pub fn terminal_lines_since(&self, pushed_before: usize) -> &[TerminalLine] {
        let fresh = self.terminal_pushed.saturating_sub(pushed_before);
        &self.terminal[self.terminal.len().saturating_sub(fresh)..]
    }

    pub fn clear_terminal(&mut self) {
        self.terminal = Vec::new();
    }

    pub fn is_executing(&self) -> bool {
        self.is_executing
    }

    pub fn set_executing(&mut self, executing: bool) {
        self.is_executing = executing;
    }

    // ---- connection / output ----

    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection_state
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
    }

    pub fn command_output(&self) -> &str {
        &self.command_output
    }

    pub fn set_command_output(&mut self, output: String) {
        self.command_output = output;
    }
}

/// Remote command that launches an agent
pub fn agent_command(agent: &Agent) -> String {
    format!("claude task {}", agent.agent_type.as_str())
}

/// The `claude mcp add` invocation a plugin install would use
pub fn plugin_install_command(plugin: &Plugin) -> String {
    format!("claude mcp add {} -- npx -y {}", plugin.id, plugin.package_name)
}

fn find_by_prefix<'a, T>(items: &'a [T], needle: &str, id: impl Fn(&T) -> &str) -> Option<&'a T> {
    if needle.is_empty() {
        return None;
    }
    if let Some(exact) = items.iter().find(|item| id(item) == needle) {
        return Some(exact);
    }
    let mut matches = items.iter().filter(|item| id(item).starts_with(needle));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn default_agents() -> Vec<Agent> {
    let agent = |id: &str, name: &str, description: &str, agent_type, icon: &str| Agent {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        agent_type,
        icon: icon.to_string(),
    };
    vec![
        agent(
            "1",
            "Explore",
            "Fast agent specialized for exploring codebases",
            AgentType::Explore,
            "search",
        ),
        agent(
            "2",
            "Plan",
            "Create implementation plans for complex tasks",
            AgentType::Plan,
            "list",
        ),
        agent(
            "3",
            "General Purpose",
            "Multi-step autonomous task handling",
            AgentType::GeneralPurpose,
            "build",
        ),
        agent(
            "4",
            "Code Reviewer",
            "Review code for issues and improvements",
            AgentType::CodeReviewer,
            "code",
        ),
    ]
}

fn default_commands() -> Vec<Command> {
    use CommandCategory::*;
    vec![
        // Assistant
        Command::new("claude1", "Start Claude Session", "cd $CLAUDE_DIR && claude", "Start interactive Claude Code session", Claude, true),
        Command::new("claude2", "Claude Task", "cd $CLAUDE_DIR && claude task 'your task here'", "Execute a Claude task", Claude, true),
        Command::new("claude3", "Claude MCP List", "cd $CLAUDE_DIR && claude mcp list", "List MCP servers", Claude, false),
        Command::new("claude4", "Claude Status", "cd $CLAUDE_DIR && ps aux | grep claude", "Check if Claude is running", Claude, false),
        Command::new("claude5", "Claude Version", "claude --version", "Check Claude Code version", Claude, false),
        // Git
        Command::new("1", "Git Status", "git status", "Check repository status", Git, true),
        Command::new("2", "Git Log", "git log --oneline -10", "View recent commits", Git, false),
        Command::new("7", "Git Diff", "git diff", "View changes", Git, false),
        Command::new("8", "Pull", "git pull", "Pull latest changes", Git, false),
        // Files
        Command::new("3", "List Files", "ls -la", "List all files", FileOperations, false),
        Command::new("4", "Search Code", "grep -r 'pattern' .", "Search in codebase", Search, false),
        // Build & test
        Command::new("5", "Build", "npm run build", "Build the project", Build, false),
        Command::new("6", "Test", "npm test", "Run tests", Test, false),
    ]
}

fn default_workflows() -> Vec<Workflow> {
    let workflow = |id: &str, name: &str, description: &str, actions: &[&str]| Workflow {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        steps: actions
            .iter()
            .enumerate()
            .map(|(i, action)| WorkflowStep::new(i as u32 + 1, action))
            .collect(),
    };
    vec![
        workflow(
            "0",
            "Claude Code Session",
            "Start Claude Code in working directory",
            &["cd $CLAUDE_DIR", "claude --version", "claude mcp list"],
        ),
        workflow(
            "1",
            "Commit & Push",
            "Stage, commit, and push changes",
            &["git add .", "git commit -m 'Update'", "git push"],
        ),
        workflow(
            "2",
            "Build & Test",
            "Build and run tests",
            &["npm install", "npm run build", "npm test"],
        ),
        workflow(
            "3",
            "Pull & Install",
            "Pull latest and install dependencies",
            &["git pull", "npm install"],
        ),
    ]
}

fn default_plugins() -> Vec<Plugin> {
    const MCP_SERVERS: &str = "https://github.com/modelcontextprotocol/servers";
    let param = |name: &str, param_type: &str, description: &str, required: bool| {
        CommandParameter {
            name: name.to_string(),
            param_type: param_type.to_string(),
            description: description.to_string(),
            required,
        }
    };
    let command = |name: &str, description: &str, parameters: Vec<CommandParameter>| {
        PluginCommand {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    };
    let plugin = |id: &str,
                  name: &str,
                  description: &str,
                  package: &str,
                  category: PluginCategory,
                  commands: Vec<PluginCommand>| Plugin {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        package_name: package.to_string(),
        repository: MCP_SERVERS.to_string(),
        category,
        is_installed: false,
        commands,
    };

    vec![
        plugin(
            "filesystem",
            "Filesystem",
            "Read, write and search files in allowed directories",
            "@modelcontextprotocol/server-filesystem",
            PluginCategory::FileSystem,
            vec![
                command(
                    "read_file",
                    "Read a file's contents",
                    vec![param("path", "string", "File to read", true)],
                ),
                command(
                    "search_files",
                    "Find files matching a pattern",
                    vec![
                        param("path", "string", "Directory to search", true),
                        param("pattern", "string", "Glob pattern", true),
                    ],
                ),
            ],
        ),
        plugin(
            "brave-search",
            "Brave Search",
            "Web and local search through the Brave Search API",
            "@modelcontextprotocol/server-brave-search",
            PluginCategory::Web,
            vec![command(
                "brave_web_search",
                "Search the web",
                vec![
                    param("query", "string", "Search terms", true),
                    param("count", "number", "Number of results", false),
                ],
            )],
        ),
        plugin(
            "postgres",
            "PostgreSQL",
            "Read-only database access with schema inspection",
            "@modelcontextprotocol/server-postgres",
            PluginCategory::Database,
            vec![command(
                "query",
                "Run a read-only SQL query",
                vec![param("sql", "string", "SQL statement", true)],
            )],
        ),
        plugin(
            "memory",
            "Memory",
            "Knowledge-graph based persistent memory for the assistant",
            "@modelcontextprotocol/server-memory",
            PluginCategory::AiTools,
            vec![command(
                "create_entities",
                "Store entities in the knowledge graph",
                vec![param("entities", "array", "Entities to create", true)],
            )],
        ),
        plugin(
            "github",
            "GitHub",
            "Repository management, file operations and GitHub API integration",
            "@modelcontextprotocol/server-github",
            PluginCategory::Development,
            vec![command(
                "create_issue",
                "Open an issue",
                vec![
                    param("repo", "string", "owner/name", true),
                    param("title", "string", "Issue title", true),
                    param("body", "string", "Issue body", false),
                ],
            )],
        ),
        plugin(
            "puppeteer",
            "Puppeteer",
            "Browser automation and web scraping",
            "@modelcontextprotocol/server-puppeteer",
            PluginCategory::Automation,
            vec![command(
                "puppeteer_navigate",
                "Open a URL in the browser",
                vec![param("url", "string", "Page to open", true)],
            )],
        ),
    ]
}
