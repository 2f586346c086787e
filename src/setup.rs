//! Connection profile setup
//!
//! Saves the remote login profile (never the password) to
//! `~/.codecompanion/config.json` and runs the interactive setup wizard.

use crate::models::{AuthMethod, ConnectionConfig, DEFAULT_SSH_PORT, DEFAULT_WORK_DIR};
use crate::platform;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Saved connection profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Private key file; password auth when absent
    #[serde(default)]
    pub key_path: Option<String>,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_work_dir() -> String {
    DEFAULT_WORK_DIR.to_string()
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SSH_PORT,
            username: String::new(),
            key_path: None,
            work_dir: DEFAULT_WORK_DIR.to_string(),
        }
    }
}

impl Profile {
    /// Build the connection config. With a key file the secret is its passphrase.
    pub fn to_connection_config(&self, secret: Option<String>) -> ConnectionConfig {
        let auth = match &self.key_path {
            Some(path) => AuthMethod::KeyFile {
                path: path.clone(),
                passphrase: secret.filter(|s| !s.is_empty()),
            },
            None => AuthMethod::Password {
                password: secret.unwrap_or_default(),
            },
        };
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            auth,
            work_dir: self.work_dir.clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }
}

/// `~/.codecompanion/config.json`
pub fn get_config_path() -> PathBuf {
    platform::config_dir().join("config.json")
}

/// Load the saved profile; `None` when missing or unreadable
pub fn load_config() -> Option<Profile> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(path: &Path) -> Option<Profile> {
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(profile) => Some(profile),
        Err(e) => {
            tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save_config(profile: &Profile) -> io::Result<()> {
    save_config_to(&get_config_path(), profile)
}

pub fn save_config_to(path: &Path, profile: &Profile) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(profile)?)?;
    Ok(())
}

/// Print `message` and read one trimmed line; empty on I/O failure
pub fn prompt(message: &str) -> String {
    print!("{}", message);
    if io::stdout().flush().is_err() {
        return String::new();
    }
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return String::new();
    }
    input.trim().to_string()
}

/// Like [`prompt`], but typed characters are not echoed when stdin is a terminal.
///
/// Only the line ending is stripped; spaces are part of the secret.
pub fn prompt_secret(message: &str) -> String {
    print!("{}", message);
    if io::stdout().flush().is_err() {
        return String::new();
    }

    let stdin = io::stdin();
    let mut input = String::new();
    let read = {
        #[cfg(unix)]
        let _hidden = {
            use std::os::fd::AsFd;
            EchoGuard::new(stdin.as_fd()).ok()
        };
        stdin.read_line(&mut input)
    };
    // The newline the user typed was not echoed either
    println!();

    if read.is_err() {
        return String::new();
    }
    input.trim_end_matches(['\r', '\n']).to_string()
}

/// Turns terminal echo off until dropped
#[cfg(unix)]
struct EchoGuard<'fd> {
    fd: std::os::fd::BorrowedFd<'fd>,
    original: nix::sys::termios::Termios,
}

#[cfg(unix)]
impl<'fd> EchoGuard<'fd> {
    fn new(fd: std::os::fd::BorrowedFd<'fd>) -> nix::Result<Self> {
        use nix::sys::termios::{self, LocalFlags, SetArg};

        let original = termios::tcgetattr(fd)?;
        let mut hidden = original.clone();
        hidden.local_flags.remove(LocalFlags::ECHO);
        termios::tcsetattr(fd, SetArg::TCSANOW, &hidden)?;

        Ok(Self { fd, original })
    }
}

#[cfg(unix)]
impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        use nix::sys::termios::{self, SetArg};

        if let Err(e) = termios::tcsetattr(self.fd, SetArg::TCSANOW, &self.original) {
            tracing::warn!("Failed to restore terminal echo: {}", e);
        }
    }
}

/// Prompt with a default shown in brackets; empty input keeps the default
fn prompt_default(message: &str, default: &str) -> String {
    let input = if default.is_empty() {
        prompt(&format!("{}: ", message))
    } else {
        prompt(&format!("{} [{}]: ", message, default.dimmed()))
    };
    if input.is_empty() {
        default.to_string()
    } else {
        input
    }
}

fn confirm(question: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    match prompt(&format!("{} {} ", question, hint)).to_lowercase().as_str() {
        "" => default,
        answer => answer.starts_with('y'),
    }
}

/// Run the interactive setup wizard, starting from the saved profile if any
pub fn run_setup_wizard() -> io::Result<Profile> {
    let current = load_config().unwrap_or_default();

    println!();
    println!(
        "{}",
        "╔══════════════════════════════════════════════════════════════╗".cyan()
    );
    println!(
        "{}",
        "║              📱 Code Companion Connection Setup              ║".cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════════════════════════╝".cyan()
    );
    println!();
    println!("Where does your coding assistant run?");
    println!();

    let host = loop {
        let host = prompt_default("Host", &current.host);
        if !host.is_empty() {
            break host;
        }
        println!("{}", "Please enter a host name or IP address".yellow());
    };

    let port = loop {
        let input = prompt_default("Port", &current.port.to_string());
        match input.parse::<u16>() {
            Ok(port) if port > 0 => break port,
            _ => println!("{}", "Please enter a port between 1 and 65535".yellow()),
        }
    };

    let username = loop {
        let username = prompt_default("Username", &current.username);
        if !username.is_empty() {
            break username;
        }
        println!("{}", "Please enter a username".yellow());
    };

    let use_key = confirm("Authenticate with a private key file?", current.key_path.is_some());
    let key_path = if use_key {
        let default_key = current.key_path.clone().unwrap_or_else(|| {
            platform::home_dir()
                .map(|h| h.join(".ssh").join("id_ed25519").display().to_string())
                .unwrap_or_default()
        });
        Some(prompt_default("Key file", &default_key))
    } else {
        None
    };

    let work_dir = prompt_default("Working directory ($CLAUDE_DIR)", &current.work_dir);

    let profile = Profile {
        host,
        port,
        username,
        key_path,
        work_dir,
    };
    save_config(&profile)?;

    println!();
    println!("{} Saved to {}", "✓".green(), get_config_path().display());
    println!(
        "{}",
        "Passwords are never saved; you'll be asked when connecting (or set CODECOMPANION_PASSWORD)."
            .dimmed()
    );
    println!();

    Ok(profile)
}
