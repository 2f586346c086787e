//! Interactive companion session
//!
//! Lines starting with `/` are app actions; anything else is sent to the
//! remote host and shown in the terminal scrollback.

use crate::companion::Companion;
use crate::models::{CommandCategory, ConnectionConfig, PluginCategory, TaskStatus};
use crate::render;
use colored::Colorize;
use std::io::{self, Write};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Empty,
    Help,
    Dashboard,
    Connect,
    Disconnect,
    Tasks(Option<TaskStatus>),
    AddTask { content: String, active_form: String },
    SetTaskStatus { id: String, status: TaskStatus },
    DeleteTask(String),
    Commands { query: String, category: Option<CommandCategory> },
    RunCommand(String),
    ToggleFavorite(String),
    Workflows,
    RunWorkflow(String),
    Agents,
    RunAgent(String),
    Plugins { query: String, category: Option<PluginCategory> },
    ShowPlugin(String),
    InstallPlugin(String),
    UninstallPlugin(String),
    AddRepository { name: String, url: String },
    Repositories,
    Terminal,
    Clear,
    Quit,
    Remote(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown status '{0}' ({names})", names = status_names())]
    Status(String),
    #[error("Unknown category '{0}'")]
    Category(String),
}

/// Turn one input line into an action
pub fn parse_line(line: &str) -> Result<Action, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Action::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Action::Remote(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let action = match name {
        "help" | "?" => Action::Help,
        "dashboard" | "status" => Action::Dashboard,
        "connect" => Action::Connect,
        "disconnect" => Action::Disconnect,
        "tasks" => {
            if args.is_empty() {
                Action::Tasks(None)
            } else {
                Action::Tasks(Some(parse_status(args)?))
            }
        }
        "task" => parse_task(args)?,
        "commands" | "cmds" => {
            let (query, category) = split_category(args)?;
            let category = category
                .map(|c| CommandCategory::parse(&c).ok_or(ParseError::Category(c)))
                .transpose()?;
            Action::Commands { query, category }
        }
        "run" => Action::RunCommand(required(args, "/run <command-id>")?),
        "fav" => Action::ToggleFavorite(required(args, "/fav <command-id>")?),
        "workflows" => Action::Workflows,
        "workflow" => Action::RunWorkflow(required(args, "/workflow <workflow-id>")?),
        "agents" => Action::Agents,
        "agent" => Action::RunAgent(required(args, "/agent <agent-id>")?),
        "plugins" => {
            let (query, category) = split_category(args)?;
            let category = category
                .map(|c| PluginCategory::parse(&c).ok_or(ParseError::Category(c)))
                .transpose()?;
            Action::Plugins { query, category }
        }
        "plugin" => {
            const USAGE: &str = "/plugin show|install|uninstall <plugin-id>";
            let (verb, id) = args.split_once(' ').ok_or(ParseError::Usage(USAGE))?;
            let id = required(id, USAGE)?;
            match verb {
                "show" => Action::ShowPlugin(id),
                "install" => Action::InstallPlugin(id),
                "uninstall" | "remove" => Action::UninstallPlugin(id),
                _ => return Err(ParseError::Usage(USAGE)),
            }
        }
        "repo" => {
            const USAGE: &str = "/repo add <name> <url>";
            let parts: Vec<&str> = args.split_whitespace().collect();
            match parts.as_slice() {
                ["add", name, url] => Action::AddRepository {
                    name: name.to_string(),
                    url: url.to_string(),
                },
                _ => return Err(ParseError::Usage(USAGE)),
            }
        }
        "repos" => Action::Repositories,
        "terminal" | "term" => Action::Terminal,
        "clear" => Action::Clear,
        "quit" | "exit" | "q" => Action::Quit,
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(action)
}

fn status_names() -> String {
    TaskStatus::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_status(s: &str) -> Result<TaskStatus, ParseError> {
    TaskStatus::parse(s).ok_or_else(|| ParseError::Status(s.to_string()))
}

fn required(args: &str, usage: &'static str) -> Result<String, ParseError> {
    let args = args.trim();
    if args.is_empty() {
        Err(ParseError::Usage(usage))
    } else {
        Ok(args.to_string())
    }
}

fn parse_task(args: &str) -> Result<Action, ParseError> {
    const USAGE: &str = "/task add <text> [| active form] | /task start|done|pending|rm <id>";
    let (verb, rest) = args.split_once(' ').ok_or(ParseError::Usage(USAGE))?;
    let rest = required(rest, USAGE)?;

    let action = match verb {
        "add" => {
            let (content, active_form) = match rest.split_once('|') {
                Some((content, form)) => (content.trim().to_string(), form.trim().to_string()),
                None => (rest.clone(), rest.clone()),
            };
            if content.is_empty() {
                return Err(ParseError::Usage(USAGE));
            }
            Action::AddTask {
                content,
                active_form,
            }
        }
        "start" => Action::SetTaskStatus {
            id: rest,
            status: TaskStatus::InProgress,
        },
        "done" => Action::SetTaskStatus {
            id: rest,
            status: TaskStatus::Completed,
        },
        "pending" => Action::SetTaskStatus {
            id: rest,
            status: TaskStatus::Pending,
        },
        "rm" | "delete" => Action::DeleteTask(rest),
        _ => return Err(ParseError::Usage(USAGE)),
    };
    Ok(action)
}

/// Split `--category <c>` (or `-c <c>`) out of free-text filter arguments
fn split_category(args: &str) -> Result<(String, Option<String>), ParseError> {
    let mut query = Vec::new();
    let mut category = None;
    let mut words = args.split_whitespace();

    while let Some(word) = words.next() {
        if word == "--category" || word == "-c" {
            let value = words
                .next()
                .ok_or(ParseError::Usage("--category <name>"))?;
            category = Some(value.to_string());
        } else {
            query.push(word);
        }
    }
    Ok((query.join(" "), category))
}

pub struct Shell {
    companion: Companion,
    config: Option<ConnectionConfig>,
}

impl Shell {
    pub fn new(companion: Companion, config: Option<ConnectionConfig>) -> Self {
        Self { companion, config }
    }

    #[cfg(test)]
    pub fn companion(&self) -> &Companion {
        &self.companion
    }

    /// Read-eval loop on stdin until `/quit` or end of input
    pub async fn run(mut self) -> io::Result<()> {
        println!(
            "{} {}",
            "Code Companion".cyan().bold(),
            "- type /help for commands".dimmed()
        );

        if self.config.is_some() {
            print!("{}", self.handle(Action::Connect).await.unwrap_or_default());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            self.print_prompt()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };

            let action = match parse_line(&line) {
                Ok(action) => action,
                Err(e) => {
                    println!("{}", e.to_string().yellow());
                    continue;
                }
            };

            match self.handle(action).await {
                Some(output) => print!("{}", output),
                None => break,
            }
        }

        self.companion.disconnect();
        Ok(())
    }

    fn print_prompt(&self) -> io::Result<()> {
        let marker = if self.companion.is_connected() {
            "$".green()
        } else {
            "$".dimmed()
        };
        print!("{} ", marker);
        io::stdout().flush()
    }

    /// Perform one action and return what to print; `None` ends the session
    pub async fn handle(&mut self, action: Action) -> Option<String> {
        let mark = self.companion.store().terminal_pushed();

        let output = match action {
            Action::Empty => String::new(),
            Action::Quit => return None,
            Action::Help => render::help(),
            Action::Dashboard => render::dashboard(self.companion.store()),
            Action::Connect => match self.config.clone() {
                Some(config) => {
                    self.companion.connect(config).await;
                    self.fresh_terminal(mark)
                }
                None => format!(
                    "{}\n",
                    "No connection profile. Run `codecompanion setup` or pass --host/--user."
                        .yellow()
                ),
            },
            Action::Disconnect => {
                self.companion.disconnect();
                format!("{}\n", self.companion.store().connection_state().message.dimmed())
            }
            Action::Tasks(status) => render::task_list(self.companion.store(), status),
            Action::AddTask {
                content,
                active_form,
            } => {
                let id = self.companion.store_mut().add_task(&content, &active_form);
                format!("{} Added task {}\n", "✓".green(), short(&id))
            }
            Action::SetTaskStatus { id, status } => match self.resolve_task(&id) {
                Some(full_id) => {
                    self.companion
                        .store_mut()
                        .update_task_status(&full_id, status);
                    format!("{} {} -> {}\n", "✓".green(), short(&full_id), status.label())
                }
                None => not_found("task", &id),
            },
            Action::DeleteTask(id) => match self.resolve_task(&id) {
                Some(full_id) => {
                    self.companion.store_mut().delete_task(&full_id);
                    format!("{} Deleted {}\n", "✓".green(), short(&full_id))
                }
                None => not_found("task", &id),
            },
            Action::Commands { query, category } => {
                let store = self.companion.store();
                render::command_list(&store.filter_commands(&query, category))
            }
            Action::RunCommand(id) => match self.companion.run_saved_command(&id).await {
                Ok(_) => self.fresh_terminal(mark),
                Err(e) => self.terminal_or_error(mark, e),
            },
            Action::ToggleFavorite(id) => {
                if self.companion.store_mut().toggle_command_favorite(&id) {
                    let starred = self
                        .companion
                        .store()
                        .find_command(&id)
                        .map_or(false, |c| c.is_favorite);
                    let verb = if starred { "Starred" } else { "Unstarred" };
                    format!("{} {} {}\n", "✓".green(), verb, id)
                } else {
                    not_found("command", &id)
                }
            }
            Action::Workflows => render::workflow_list(self.companion.store().workflows()),
            Action::RunWorkflow(id) => match self.companion.run_workflow(&id).await {
                Ok(_) => self.fresh_terminal(mark),
                Err(e) => self.terminal_or_error(mark, e),
            },
            Action::Agents => render::agent_list(self.companion.store().agents()),
            Action::RunAgent(id) => match self.companion.run_agent(&id).await {
                Ok(_) => self.fresh_terminal(mark),
                Err(e) => self.terminal_or_error(mark, e),
            },
            Action::Plugins { query, category } => {
                let store = self.companion.store();
                render::plugin_list(&store.filter_plugins(&query, category), store.repositories())
            }
            Action::ShowPlugin(id) => match self.companion.store().find_plugin(&id) {
                Some(plugin) => render::plugin_detail(plugin),
                None => not_found("plugin", &id),
            },
            Action::InstallPlugin(id) => match self.companion.install_plugin(&id) {
                Ok(_) => self.fresh_terminal(mark),
                Err(e) => format!("{}\n", e.to_string().red()),
            },
            Action::UninstallPlugin(id) => match self.companion.uninstall_plugin(&id) {
                Ok(()) => self.fresh_terminal(mark),
                Err(e) => format!("{}\n", e.to_string().red()),
            },
            Action::AddRepository { name, url } => {
                self.companion.store_mut().add_repository(&name, &url);
                format!("{} Added repository {}\n", "✓".green(), name)
            }
            Action::Repositories => render::repository_list(self.companion.store().repositories()),
            Action::Terminal => {
                let store = self.companion.store();
                render::terminal(store.terminal_lines(), store.is_executing())
            }
            Action::Clear => {
                self.companion.store_mut().clear_terminal();
                String::new()
            }
            Action::Remote(command) => {
                // Failures are already in the scrollback as error lines
                let _ = self.companion.execute_command(&command).await;
                self.fresh_terminal(mark)
            }
        };
        Some(output)
    }

    fn resolve_task(&self, id_or_prefix: &str) -> Option<String> {
        self.companion
            .store()
            .find_task(id_or_prefix)
            .map(|t| t.id.clone())
    }

    fn fresh_terminal(&self, mark: usize) -> String {
        render::terminal(self.companion.store().terminal_lines_since(mark), false)
    }

    /// Lookup failures never reach the scrollback, so print them directly
    fn terminal_or_error(&self, mark: usize, error: impl std::fmt::Display) -> String {
        let fresh = self.fresh_terminal(mark);
        if fresh.is_empty() {
            format!("{}\n", error.to_string().red())
        } else {
            fresh
        }
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn not_found(kind: &str, id: &str) -> String {
    format!("{}\n", format!("No {} with id '{}'", kind, id).red())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::testing::{test_config, FakeConnector};
    use crate::ssh::SshManager;
    use std::sync::Arc;

    fn shell(fake: &FakeConnector, config: Option<ConnectionConfig>) -> Shell {
        let ssh = SshManager::with_connector(Arc::new(fake.clone()));
        Shell::new(Companion::new(ssh), config)
    }

    #[test]
    fn test_parse_remote_and_empty() {
        assert_eq!(parse_line("   "), Ok(Action::Empty));
        assert_eq!(
            parse_line("git status"),
            Ok(Action::Remote("git status".to_string()))
        );
    }

    #[test]
    fn test_parse_task_actions() {
        assert_eq!(
            parse_line("/task add Write tests | Writing tests"),
            Ok(Action::AddTask {
                content: "Write tests".to_string(),
                active_form: "Writing tests".to_string()
            })
        );
        assert_eq!(
            parse_line("/task add Ship it"),
            Ok(Action::AddTask {
                content: "Ship it".to_string(),
                active_form: "Ship it".to_string()
            })
        );
        assert_eq!(
            parse_line("/task done abc123"),
            Ok(Action::SetTaskStatus {
                id: "abc123".to_string(),
                status: TaskStatus::Completed
            })
        );
        assert_eq!(
            parse_line("/tasks in_progress"),
            Ok(Action::Tasks(Some(TaskStatus::InProgress)))
        );
        assert!(matches!(parse_line("/task add"), Err(ParseError::Usage(_))));
        assert!(matches!(parse_line("/tasks someday"), Err(ParseError::Status(_))));
    }

    #[test]
    fn test_status_error_lists_choices() {
        let err = parse_line("/tasks later").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown status 'later' (pending, in_progress, completed)"
        );
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            parse_line("/commands git log --category git"),
            Ok(Action::Commands {
                query: "git log".to_string(),
                category: Some(CommandCategory::Git)
            })
        );
        assert_eq!(
            parse_line("/plugins -c database"),
            Ok(Action::Plugins {
                query: String::new(),
                category: Some(PluginCategory::Database)
            })
        );
        assert_eq!(
            parse_line("/plugins --category nope"),
            Err(ParseError::Category("nope".to_string()))
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line("/fav 2"), Ok(Action::ToggleFavorite("2".to_string())));
        assert_eq!(
            parse_line("/plugin install github"),
            Ok(Action::InstallPlugin("github".to_string()))
        );
        assert_eq!(
            parse_line("/repo add mine https://example.com/r.git"),
            Ok(Action::AddRepository {
                name: "mine".to_string(),
                url: "https://example.com/r.git".to_string()
            })
        );
        assert_eq!(parse_line("/quit"), Ok(Action::Quit));
        assert_eq!(
            parse_line("/frobnicate"),
            Err(ParseError::Unknown("frobnicate".to_string()))
        );
        assert!(matches!(parse_line("/run"), Err(ParseError::Usage(_))));
    }

    #[tokio::test]
    async fn test_remote_line_runs_and_prints() {
        colored::control::set_override(false);
        let fake = FakeConnector::new();
        fake.respond("whoami", "pi\n", "");
        let mut sh = shell(&fake, Some(test_config()));

        let connected = sh.handle(Action::Connect).await.unwrap();
        assert!(connected.contains("Connected to pi.local"));

        let out = sh.handle(Action::Remote("whoami".to_string())).await.unwrap();
        assert_eq!(out, "$ whoami\npi\n");
    }

    #[tokio::test]
    async fn test_connect_without_profile() {
        colored::control::set_override(false);
        let fake = FakeConnector::new();
        let mut sh = shell(&fake, None);

        let out = sh.handle(Action::Connect).await.unwrap();
        assert!(out.contains("No connection profile"));
        assert_eq!(fake.connects(), 0);
    }

    #[tokio::test]
    async fn test_task_round_trip_through_shell() {
        colored::control::set_override(false);
        let fake = FakeConnector::new();
        let mut sh = shell(&fake, None);

        sh.handle(parse_line("/task add Review PR | Reviewing PR").unwrap())
            .await
            .unwrap();
        let id = sh.companion().store().tasks()[0].id.clone();

        let out = sh
            .handle(parse_line(&format!("/task start {}", &id[..6])).unwrap())
            .await
            .unwrap();
        assert!(out.contains("In Progress"));
        assert_eq!(
            sh.companion().store().tasks()[0].status,
            TaskStatus::InProgress
        );

        sh.handle(Action::DeleteTask(id)).await.unwrap();
        assert!(sh.companion().store().tasks().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_ids_reported() {
        colored::control::set_override(false);
        let fake = FakeConnector::new();
        let mut sh = shell(&fake, None);

        let out = sh.handle(Action::RunWorkflow("42".to_string())).await.unwrap();
        assert!(out.contains("No workflow with id '42'"));

        let out = sh.handle(Action::ToggleFavorite("zz".to_string())).await.unwrap();
        assert!(out.contains("No command with id 'zz'"));
    }

    #[tokio::test]
    async fn test_not_connected_shows_error_line() {
        colored::control::set_override(false);
        let fake = FakeConnector::new();
        let mut sh = shell(&fake, None);

        let out = sh.handle(Action::RunCommand("1".to_string())).await.unwrap();
        assert_eq!(out, "$ git status\n[ERROR] Not connected\n");
    }

    #[tokio::test]
    async fn test_quit() {
        let fake = FakeConnector::new();
        let mut sh = shell(&fake, None);
        assert!(sh.handle(Action::Quit).await.is_none());
    }
}
