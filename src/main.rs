//! Code Companion - drive a remote coding assistant over SSH
//!
//! Usage:
//!   codecompanion                   # Interactive session
//!   codecompanion setup             # Save a connection profile
//!   codecompanion exec git status   # Run one command and print its output
//!   codecompanion workflow 0        # Run a workflow one-shot
//!   codecompanion commands          # List the command catalogue
//!   codecompanion --help            # Show help

mod companion;
mod crash;
mod models;
mod platform;
mod render;
mod setup;
mod shell;
mod ssh;
mod store;

use clap::{Parser, Subcommand};
use colored::Colorize;
use companion::Companion;
use models::ConnectionConfig;
use ssh::SshManager;
use std::process::ExitCode;

const PASSWORD_ENV: &str = "CODECOMPANION_PASSWORD";

#[derive(Parser)]
#[command(name = "codecompanion")]
#[command(version)]
#[command(about = "Drive a remote coding assistant over SSH", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Overrides for the saved connection profile
#[derive(Debug, Clone, Default, clap::Args)]
struct ConnectionArgs {
    /// Remote host name or IP address
    #[arg(long, global = true)]
    host: Option<String>,

    /// SSH port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Login user
    #[arg(long = "user", short = 'u', global = true)]
    username: Option<String>,

    /// Password, or key passphrase with --key
    #[arg(long, global = true, env = PASSWORD_ENV, hide_env_values = true)]
    password: Option<String>,

    /// Private key file
    #[arg(long, global = true)]
    key: Option<String>,

    /// Directory substituted for $CLAUDE_DIR
    #[arg(long = "work-dir", global = true)]
    work_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the connection setup wizard
    Setup,
    /// Connect, run one command, print its output and disconnect
    ///
    /// A single argument is sent as-is, so pipes and redirects work when the
    /// whole command line is quoted: `exec "ls | wc -l"`. Several arguments
    /// are re-quoted for the remote shell: `exec grep -r 'a b' .`
    Exec {
        /// Command line to run on the remote host
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run one of the built-in workflows
    Workflow {
        /// Workflow id (see `codecompanion commands`)
        id: String,
    },
    /// List saved commands and workflows
    Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codecompanion=info".parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    crash::install();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Some(Commands::Setup) => setup::run_setup_wizard().map(|_| ()).map_err(Into::into),
        Some(Commands::Commands) => {
            list_catalogue();
            Ok(())
        }
        Some(Commands::Exec { command }) => run_exec(&cli.connection, &join_command(&command)).await,
        Some(Commands::Workflow { id }) => run_workflow(&cli.connection, &id).await,
        None => run_interactive(&cli.connection).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Rebuild a remote command line from already-split arguments
fn join_command(args: &[String]) -> String {
    if let [single] = args {
        return single.clone();
    }
    args.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Single-quote `arg` for a POSIX shell unless it is plainly safe
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Saved profile with command-line overrides applied; `None` without a host and user
fn resolve_connection(args: &ConnectionArgs) -> Option<ConnectionConfig> {
    let mut profile = setup::load_config().unwrap_or_default();
    if let Some(host) = &args.host {
        profile.host = host.clone();
    }
    if let Some(port) = args.port {
        profile.port = port;
    }
    if let Some(username) = &args.username {
        profile.username = username.clone();
    }
    if let Some(key) = &args.key {
        profile.key_path = Some(key.clone());
    }
    if let Some(work_dir) = &args.work_dir {
        profile.work_dir = work_dir.clone();
    }
    if !profile.is_complete() {
        return None;
    }

    let secret = match &args.password {
        Some(password) => Some(password.clone()),
        None => {
            let label = if profile.key_path.is_some() {
                "Key passphrase (blank for none)"
            } else {
                "Password"
            };
            Some(setup::prompt_secret(&format!(
                "{} for {}@{}: ",
                label, profile.username, profile.host
            )))
        }
    };
    Some(profile.to_connection_config(secret))
}

fn require_connection(args: &ConnectionArgs) -> Result<ConnectionConfig, Box<dyn std::error::Error>> {
    resolve_connection(args).ok_or_else(|| {
        "No connection profile. Run `codecompanion setup` or pass --host and --user".into()
    })
}

async fn connect(config: ConnectionConfig) -> Result<Companion, Box<dyn std::error::Error>> {
    let mut companion = Companion::new(SshManager::new());
    if !companion.connect(config).await {
        let message = companion.store().connection_state().message.clone();
        return Err(message.into());
    }
    Ok(companion)
}

async fn run_exec(args: &ConnectionArgs, command: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut companion = connect(require_connection(args)?).await?;
    let result = companion.execute_command(command).await;
    companion.disconnect();

    result?;
    let output = companion.store().command_output();
    print!("{}", output);
    if !output.is_empty() && !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

async fn run_workflow(args: &ConnectionArgs, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Resolve the id before asking for credentials
    if store::AppStore::new().find_workflow(id).is_none() {
        return Err(format!("No workflow with id '{}'", id).into());
    }

    let mut companion = connect(require_connection(args)?).await?;
    let mark = companion.store().terminal_pushed();
    let report = companion.run_workflow(id).await?;
    companion.disconnect();

    print!(
        "{}",
        render::terminal(companion.store().terminal_lines_since(mark), false)
    );
    if report.failed > 0 {
        return Err(format!("{} of {} steps failed", report.failed, report.executed).into());
    }
    Ok(())
}

async fn run_interactive(args: &ConnectionArgs) -> Result<(), Box<dyn std::error::Error>> {
    if setup::load_config().is_none() && args.host.is_none() {
        println!();
        println!(
            "{}",
            "Welcome to Code Companion! Let's set up your connection.".cyan().bold()
        );
        setup::run_setup_wizard()?;
    }

    let config = resolve_connection(args);
    let shell = shell::Shell::new(Companion::new(SshManager::new()), config);
    shell.run().await?;
    Ok(())
}

fn list_catalogue() {
    let store = store::AppStore::new();
    let commands: Vec<_> = store.commands().iter().collect();
    print!("{}", render::command_list(&commands));
    println!();
    print!("{}", render::workflow_list(store.workflows()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_join_command_requotes_split_arguments() {
        assert_eq!(
            join_command(&args(&["grep", "-r", "a b", "."])),
            "grep -r 'a b' ."
        );
        assert_eq!(join_command(&args(&["echo", "it's"])), r"echo 'it'\''s'");
        assert_eq!(join_command(&args(&["printf", ""])), "printf ''");
        assert_eq!(join_command(&args(&["git", "log", "--oneline"])), "git log --oneline");
    }

    #[test]
    fn test_single_argument_sent_verbatim() {
        assert_eq!(join_command(&args(&["ls | wc -l"])), "ls | wc -l");
    }

    #[test]
    fn test_exec_parses_trailing_arguments() {
        let cli = Cli::try_parse_from(["codecompanion", "exec", "grep", "-r", "a b", "."]).unwrap();
        match cli.command {
            Some(Commands::Exec { command }) => {
                assert_eq!(join_command(&command), "grep -r 'a b' .")
            }
            _ => panic!("expected exec"),
        }
    }
}
