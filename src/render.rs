//! Text screens
//!
//! Each function renders one view of the store as a coloured string.

use crate::models::{
    Agent, Command, CustomRepository, LineType, Plugin, TaskStatus, TerminalLine, Workflow,
};
use crate::platform;
use crate::store::{self, AppStore};
use colored::{ColoredString, Colorize};
use std::fmt::Write as _;

fn rule() -> String {
    "─".repeat(platform::terminal_width().min(60))
}

fn heading(title: &str) -> String {
    format!("{}\n{}\n", title.bold(), rule().dimmed())
}

fn status_badge(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => "○ Pending".yellow(),
        TaskStatus::InProgress => "◐ In Progress".cyan(),
        TaskStatus::Completed => "● Completed".green(),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Connection status, task totals and what is in flight
pub fn dashboard(store: &AppStore) -> String {
    let mut out = heading("Dashboard");
    let state = store.connection_state();

    if state.is_connected {
        let _ = writeln!(out, "{} {}", "●".green(), state.message);
        if let Some(at) = state.last_connected {
            let minutes = chrono::Utc::now().signed_duration_since(at).num_minutes();
            let _ = writeln!(out, "  {}", format!("connected {}m ago", minutes).dimmed());
        }
    } else if state.message.is_empty() {
        let _ = writeln!(out, "{} Not connected", "○".dimmed());
    } else {
        let _ = writeln!(out, "{} {}", "○".dimmed(), state.message);
    }

    let counts = store.task_counts();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "  {} {}   {} {}   {} {}   {} {}",
        "Tasks:".dimmed(),
        counts.total(),
        "Pending:".dimmed(),
        counts.pending,
        "In progress:".dimmed(),
        counts.in_progress,
        "Completed:".dimmed(),
        counts.completed
    );
    let installed = store.plugins().iter().filter(|p| p.is_installed).count();
    let _ = writeln!(out, "  {} {}", "Plugins installed:".dimmed(), installed);

    let active = store.tasks_with_status(TaskStatus::InProgress);
    if !active.is_empty() {
        let _ = writeln!(out);
        for task in active {
            let _ = writeln!(out, "  {} {}", "→".cyan(), task.active_form);
        }
    }
    out
}

/// Tasks, optionally only those with one status
pub fn task_list(store: &AppStore, status: Option<TaskStatus>) -> String {
    let title = match status {
        Some(s) => format!("Tasks - {}", s.label()),
        None => "Tasks".to_string(),
    };
    let mut out = heading(&title);

    let tasks: Vec<_> = match status {
        Some(s) => store.tasks_with_status(s),
        None => store.tasks().iter().collect(),
    };

    if tasks.is_empty() {
        let _ = writeln!(out, "{}", "  No tasks".dimmed());
        return out;
    }

    for task in tasks {
        let _ = writeln!(
            out,
            "  {} {} {}",
            short_id(&task.id).dimmed(),
            status_badge(task.status),
            task.content
        );
        if task.status == TaskStatus::InProgress && !task.active_form.is_empty() {
            let _ = writeln!(out, "           {}", task.active_form.italic());
        }
    }
    out
}

fn command_row(out: &mut String, command: &Command) {
    let star = if command.is_favorite {
        "★".yellow()
    } else {
        "☆".dimmed()
    };
    let _ = writeln!(
        out,
        "  {} {:<10} {} [{}]  {}",
        star,
        command.id.cyan(),
        command.name.bold(),
        command.category.as_str(),
        command.command.dimmed()
    );
}

/// Favourites first, then everything else
pub fn command_list(commands: &[&Command]) -> String {
    let mut out = heading("Commands");
    if commands.is_empty() {
        let _ = writeln!(out, "{}", "  No commands found".dimmed());
        return out;
    }

    let (favorites, others): (Vec<&Command>, Vec<&Command>) =
        commands.iter().copied().partition(|c| c.is_favorite);

    if !favorites.is_empty() {
        let _ = writeln!(out, "{}", "Favorites".yellow());
        for command in &favorites {
            command_row(&mut out, command);
        }
        let _ = writeln!(out);
    }
    for command in &others {
        command_row(&mut out, command);
    }
    out
}

pub fn workflow_list(workflows: &[Workflow]) -> String {
    let mut out = heading("Workflows");
    for workflow in workflows {
        let _ = writeln!(
            out,
            "  {} {} {}",
            workflow.id.cyan(),
            workflow.name.bold(),
            format!("- {}", workflow.description).dimmed()
        );
        for step in workflow.ordered_steps() {
            let _ = writeln!(out, "      {}. {}", step.order, step.action);
        }
    }
    out
}

pub fn agent_list(agents: &[Agent]) -> String {
    let mut out = heading("Agents");
    for agent in agents {
        let _ = writeln!(
            out,
            "  {} {} {}",
            agent.id.cyan(),
            agent.name.bold(),
            format!("- {}", agent.description).dimmed()
        );
        let _ = writeln!(out, "      {}", store::agent_command(agent).dimmed());
    }
    out
}

pub fn plugin_list(plugins: &[&Plugin], repositories: &[CustomRepository]) -> String {
    let mut out = heading("Plugin Marketplace");
    if plugins.is_empty() {
        let _ = writeln!(out, "{}", "  No plugins found".dimmed());
    }
    for plugin in plugins {
        let installed = if plugin.is_installed {
            "✓ installed".green()
        } else {
            "".normal()
        };
        let _ = writeln!(
            out,
            "  {} {} [{}] {}",
            plugin.id.cyan(),
            plugin.name.bold(),
            plugin.category.label(),
            installed
        );
        let _ = writeln!(out, "      {}", plugin.description.dimmed());
    }

    if !repositories.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Custom Repositories".bold());
        for repo in repositories {
            let _ = writeln!(out, "  {} {}", repo.name, repo.url.dimmed());
        }
    }
    out
}

pub fn repository_list(repositories: &[CustomRepository]) -> String {
    let mut out = heading("Custom Repositories");
    if repositories.is_empty() {
        let _ = writeln!(out, "{}", "  None yet - add one with /repo add <name> <url>".dimmed());
    }
    for repo in repositories {
        let _ = writeln!(out, "  {} {}", repo.name, repo.url.dimmed());
    }
    out
}

/// A plugin's package, install command and sub-commands with their parameters
pub fn plugin_detail(plugin: &Plugin) -> String {
    let mut out = heading(&plugin.name);
    let _ = writeln!(out, "  {} {}", "Package:".dimmed(), plugin.package_name);
    let _ = writeln!(out, "  {} {}", "Repository:".dimmed(), plugin.repository);
    let _ = writeln!(out, "  {} {}", "Category:".dimmed(), plugin.category.label());
    let _ = writeln!(
        out,
        "  {} {}",
        "Install:".dimmed(),
        store::plugin_install_command(plugin)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "  {}", plugin.description);

    if !plugin.commands.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Commands".bold());
        for command in &plugin.commands {
            let _ = writeln!(out, "  {} - {}", command.name.cyan(), command.description);
            for param in &command.parameters {
                let required = if param.required { "" } else { " (optional)" };
                let _ = writeln!(
                    out,
                    "      {}: {}{} {}",
                    param.name,
                    param.param_type,
                    required,
                    format!("- {}", param.description).dimmed()
                );
            }
        }
    }
    out
}

pub fn terminal_line(line: &TerminalLine) -> String {
    let text = format!("{}{}", line.line_type.prefix(), line.text);
    match line.line_type {
        LineType::Command => text.blue().to_string(),
        LineType::Output => text,
        LineType::Error => text.red().to_string(),
        LineType::Success => text.green().to_string(),
    }
}

pub fn terminal(lines: &[TerminalLine], is_executing: bool) -> String {
    let mut out = String::new();
    for line in lines {
        let _ = writeln!(out, "{}", terminal_line(line));
    }
    if is_executing {
        let _ = writeln!(out, "{}", "Executing...".green());
    }
    out
}

pub fn help() -> String {
    let mut out = heading("Commands");
    let rows = [
        ("/dashboard", "Connection status and task totals"),
        ("/connect, /disconnect", "Open or close the SSH session"),
        ("/tasks [status]", "List tasks (pending, in_progress, completed)"),
        ("/task add <text> [| active form]", "Add a pending task"),
        ("/task start|done|pending <id>", "Change a task's status"),
        ("/task rm <id>", "Delete a task"),
        ("/commands [query] [--category c]", "Browse saved commands"),
        ("/run <id>", "Run a saved command"),
        ("/fav <id>", "Toggle a command favourite"),
        ("/workflows, /workflow <id>", "List or run workflows"),
        ("/agents, /agent <id>", "List or launch agents"),
        ("/plugins [query] [--category c]", "Browse the plugin marketplace"),
        ("/plugin show|install|uninstall <id>", "Plugin details and install intent"),
        ("/repo add <name> <url>, /repos", "Custom plugin repositories"),
        ("/terminal, /clear", "Show or clear the terminal scrollback"),
        ("/quit", "Disconnect and exit"),
        ("<anything else>", "Run it on the remote host"),
    ];
    for (usage, description) in rows {
        let _ = writeln!(out, "  {:<38} {}", usage.cyan(), description.dimmed());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_line_prefixes() {
        colored::control::set_override(false);
        assert_eq!(
            terminal_line(&TerminalLine::new("ls", LineType::Command)),
            "$ ls"
        );
        assert_eq!(
            terminal_line(&TerminalLine::new("boom", LineType::Error)),
            "[ERROR] boom"
        );
        assert_eq!(
            terminal_line(&TerminalLine::new("ok", LineType::Success)),
            "[✓] ok"
        );
        assert_eq!(
            terminal_line(&TerminalLine::new("plain", LineType::Output)),
            "plain"
        );
    }

    #[test]
    fn test_command_list_favorites_first() {
        colored::control::set_override(false);
        let store = AppStore::new();
        let commands = store.filter_commands("", None);
        let out = command_list(&commands);

        let favorites_at = out.find("Favorites").unwrap();
        let git_status = out.find("Git Status").unwrap();
        let git_log = out.find("Git Log").unwrap();
        assert!(favorites_at < git_status);
        assert!(git_status < git_log);
    }

    #[test]
    fn test_command_rows_show_category() {
        colored::control::set_override(false);
        let store = AppStore::new();
        let out = command_list(&[store.find_command("1").unwrap()]);
        assert!(out.contains("Git Status [git]"));
    }

    #[test]
    fn test_task_list_empty_and_filled() {
        colored::control::set_override(false);
        let mut store = AppStore::new();
        assert!(task_list(&store, None).contains("No tasks"));

        let id = store.add_task("Refactor parser", "Refactoring parser");
        store.update_task_status(&id, TaskStatus::InProgress);
        let out = task_list(&store, Some(TaskStatus::InProgress));
        assert!(out.contains("Refactor parser"));
        assert!(out.contains("Refactoring parser"));
        assert!(task_list(&store, Some(TaskStatus::Completed)).contains("No tasks"));
    }

    #[test]
    fn test_dashboard_counts() {
        colored::control::set_override(false);
        let mut store = AppStore::new();
        store.add_task("a", "A");
        store.add_task("b", "B");
        let out = dashboard(&store);
        assert!(out.contains("Not connected"));
        assert!(out.contains("Tasks: 2"));
        assert!(out.contains("Pending: 2"));
        assert!(out.contains("Plugins installed: 0"));

        store.set_plugin_installed("github", true);
        assert!(dashboard(&store).contains("Plugins installed: 1"));
    }

    #[test]
    fn test_plugin_detail_lists_parameters() {
        colored::control::set_override(false);
        let store = AppStore::new();
        let out = plugin_detail(store.find_plugin("brave-search").unwrap());
        assert!(out.contains("brave_web_search"));
        assert!(out.contains("count: number (optional)"));
        assert!(out.contains("claude mcp add brave-search"));
    }

    #[test]
    fn test_workflow_list_shows_ordered_steps() {
        colored::control::set_override(false);
        let store = AppStore::new();
        let out = workflow_list(store.workflows());
        assert!(out.contains("1. git add ."));
        assert!(out.contains("3. git push"));
    }
}
