//! Remote command execution over SSH
//!
//! Opens a login session, runs one command at a time on an exec channel,
//! collects stdout/stderr and hands back the combined text. Protocol,
//! encryption and authentication are libssh2's job (via the `ssh2` crate).
//!
//! The SSH library sits behind [`Connector`] / [`RemoteSession`] so the
//! manager can run against an in-memory fake in tests.

use crate::models::{AuthMethod, ConnectionConfig, WORK_DIR_PLACEHOLDER};
use base64::{engine::general_purpose::STANDARD_NO_PAD as BASE64, Engine};
use ssh2::{Channel, HashType, Session};
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fixed timeout for TCP connect, handshake and authentication
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between channel polls while a command is running
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Not connected")]
    NotConnected,
    #[error("Could not resolve host: {0}")]
    Resolve(String),
    #[error("Connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("Authentication failed for {target}: {reason}")]
    AuthFailed { target: String, reason: String },
    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Captured result of one remote command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
}

impl ExecOutput {
    pub fn combined(&self) -> String {
        combine_output(&self.stdout, &self.stderr)
    }
}

/// An established login session able to run single commands
pub trait RemoteSession: Send {
    fn exec(&mut self, command: &str) -> Result<ExecOutput, SshError>;
    fn close(&mut self);
    fn is_alive(&self) -> bool;
}

/// Opens login sessions from a connection profile
pub trait Connector: Send + Sync {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn RemoteSession>, SshError>;
}

/// Replace every working-directory placeholder with `work_dir`
pub fn substitute_work_dir(command: &str, work_dir: &str) -> String {
    command.replace(WORK_DIR_PLACEHOLDER, work_dir)
}

/// Join the two output streams: stdout first, then stderr on its own line.
///
/// Error-only output comes back unchanged.
pub fn combine_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        return stdout.to_string();
    }
    if stdout.is_empty() {
        return stderr.to_string();
    }
    if stdout.ends_with('\n') {
        format!("{}{}", stdout, stderr)
    } else {
        format!("{}\n{}", stdout, stderr)
    }
}

/// Holds the single shared session handle.
///
/// Every operation takes `&mut self`, so a second remote call cannot start
/// while one is outstanding.
pub struct SshManager {
    connector: Arc<dyn Connector>,
    session: Option<Box<dyn RemoteSession>>,
    current_config: Option<ConnectionConfig>,
}

impl Default for SshManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SshManager {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(Ssh2Connector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            session: None,
            current_config: None,
        }
    }

    /// Establish a session, replacing any existing one. No retry.
    pub async fn connect(&mut self, config: ConnectionConfig) -> Result<String, SshError> {
        self.disconnect();

        tracing::info!("Connecting to {}", config.target());
        let connector = Arc::clone(&self.connector);
        let profile = config.clone();
        let session = tokio::task::spawn_blocking(move || connector.open(&profile))
            .await
            .map_err(|e| SshError::Task(e.to_string()))??;

        let message = format!("Connected to {}", config.host);
        self.session = Some(session);
        self.current_config = Some(config);
        Ok(message)
    }

    /// Run one command and return its combined output.
    ///
    /// Fails with [`SshError::NotConnected`] when no session exists; never
    /// connects on its own.
    pub async fn execute_command(&mut self, command: &str) -> Result<String, SshError> {
        let mut session = self.session.take().ok_or(SshError::NotConnected)?;

        let processed = match &self.current_config {
            Some(config) => substitute_work_dir(command, &config.work_dir),
            None => command.to_string(),
        };
        tracing::debug!("exec: {}", processed);

        let joined = tokio::task::spawn_blocking(move || {
            let result = session.exec(&processed);
            (session, result)
        })
        .await;

        let (mut session, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                // The handle went down with the task
                tracing::error!("Command task aborted, dropping session: {}", e);
                self.current_config = None;
                return Err(SshError::Task(e.to_string()));
            }
        };
        if result.is_err() && !session.is_alive() {
            session.close();
            self.current_config = None;
        } else {
            self.session = Some(session);
        }

        let output = result?;
        if let Some(code) = output.exit_status {
            tracing::debug!("exit status {}", code);
        }
        Ok(output.combined())
    }

    /// Tear down the session. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            tracing::info!("Disconnected");
        }
        self.current_config = None;
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().map_or(false, |s| s.is_alive())
    }
}

/// Production connector backed by libssh2
pub struct Ssh2Connector;

impl Connector for Ssh2Connector {
    fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn RemoteSession>, SshError> {
        let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|source| SshError::Connect {
                host: config.host.clone(),
                source,
            })?
            .collect();
        let tcp = connect_any(&config.host, &addrs, CONNECT_TIMEOUT)?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(CONNECT_TIMEOUT.as_millis() as u32);
        session.handshake()?;

        // Host keys are not verified against known_hosts; record what we saw.
        if let Some(hash) = session.host_key_hash(HashType::Sha256) {
            tracing::info!("Host key for {}: SHA256:{}", config.host, BASE64.encode(hash));
        }

        let auth_result = match &config.auth {
            AuthMethod::Password { password } => {
                session.userauth_password(&config.username, password)
            }
            AuthMethod::KeyFile { path, passphrase } => session.userauth_pubkey_file(
                &config.username,
                None,
                Path::new(path),
                passphrase.as_deref(),
            ),
        };
        auth_result.map_err(|e| SshError::AuthFailed {
            target: config.target(),
            reason: e.message().to_string(),
        })?;

        if !session.authenticated() {
            return Err(SshError::AuthFailed {
                target: config.target(),
                reason: "server rejected credentials".to_string(),
            });
        }

        // Only connecting is bounded; commands may run as long as they need
        session.set_timeout(0);

        Ok(Box::new(Ssh2Session {
            session,
            closed: false,
        }))
    }
}

/// Try each resolved address in turn, sharing one timeout between them
fn connect_any(host: &str, addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream, SshError> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;

    for addr in addrs {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(tcp) => return Ok(tcp),
            Err(e) => {
                tracing::debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(source) => Err(SshError::Connect {
            host: host.to_string(),
            source,
        }),
        None if addrs.is_empty() => Err(SshError::Resolve(host.to_string())),
        None => Err(SshError::Connect {
            host: host.to_string(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
        }),
    }
}

struct Ssh2Session {
    session: Session,
    closed: bool,
}

impl Ssh2Session {
    fn run(&mut self, command: &str) -> Result<ExecOutput, SshError> {
        let mut channel = self.session.channel_session()?;
        channel.exec(command)?;

        self.session.set_blocking(false);
        let polled = poll_until_eof(&mut channel);
        self.session.set_blocking(true);
        let (stdout, stderr) = polled?;

        channel.wait_close()?;
        let exit_status = channel.exit_status().ok();

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_status,
        })
    }
}

impl RemoteSession for Ssh2Session {
    fn exec(&mut self, command: &str) -> Result<ExecOutput, SshError> {
        let result = self.run(command);
        if let Err(e) = &result {
            if is_link_failure(e) {
                tracing::warn!("SSH link lost: {}", e);
                self.closed = true;
            }
        }
        result
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.session.disconnect(None, "client disconnect", None) {
            tracing::debug!("SSH disconnect: {}", e);
        }
        self.closed = true;
    }

    fn is_alive(&self) -> bool {
        !self.closed
    }
}

// libssh2 transport error codes
const LIBSSH2_ERROR_SOCKET_SEND: i32 = -7;
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

/// Whether an exec failure means the session itself is gone
fn is_link_failure(error: &SshError) -> bool {
    match error {
        SshError::Io(_) => true,
        SshError::Ssh(e) => matches!(
            e.code(),
            ssh2::ErrorCode::Session(
                LIBSSH2_ERROR_SOCKET_SEND
                    | LIBSSH2_ERROR_TIMEOUT
                    | LIBSSH2_ERROR_SOCKET_DISCONNECT
                    | LIBSSH2_ERROR_SOCKET_TIMEOUT
                    | LIBSSH2_ERROR_SOCKET_RECV
            )
        ),
        _ => false,
    }
}

/// Read both streams of a non-blocking channel until the remote side closes it
fn poll_until_eof(channel: &mut Channel) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    loop {
        let out = drain(&mut *channel, &mut stdout)?;
        let err = drain(&mut channel.stderr(), &mut stderr)?;

        if channel.eof() {
            drain(&mut *channel, &mut stdout)?;
            drain(&mut channel.stderr(), &mut stderr)?;
            return Ok((stdout, stderr));
        }

        if out == 0 && err == 0 {
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Read whatever is available right now; returns the byte count
fn drain<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut chunk = [0u8; 8192];
    let mut total = 0;
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                total += n;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// In-memory stand-ins for the SSH library
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct FakeLog {
        pub connects: usize,
        pub executed: Vec<String>,
        pub closed: usize,
    }

    /// Records every command it is asked to run and answers from a table
    #[derive(Clone, Default)]
    pub struct FakeConnector {
        pub log: Arc<Mutex<FakeLog>>,
        responses: Arc<Mutex<HashMap<String, ExecOutput>>>,
        link_drops: Arc<Mutex<HashSet<String>>>,
        fail_connect: Option<String>,
    }

    impl FakeConnector {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(reason: &str) -> Self {
            Self {
                fail_connect: Some(reason.to_string()),
                ..Self::default()
            }
        }

        pub fn respond(&self, command: &str, stdout: &str, stderr: &str) {
            self.responses.lock().unwrap().insert(
                command.to_string(),
                ExecOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    exit_status: Some(if stderr.is_empty() { 0 } else { 1 }),
                },
            );
        }

        /// Running `command` fails as if the server hung up
        pub fn drop_link_on(&self, command: &str) {
            self.link_drops.lock().unwrap().insert(command.to_string());
        }

        pub fn executed(&self) -> Vec<String> {
            self.log.lock().unwrap().executed.clone()
        }

        pub fn connects(&self) -> usize {
            self.log.lock().unwrap().connects
        }

        pub fn closed(&self) -> usize {
            self.log.lock().unwrap().closed
        }
    }

    impl Connector for FakeConnector {
        fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn RemoteSession>, SshError> {
            self.log.lock().unwrap().connects += 1;
            if let Some(reason) = &self.fail_connect {
                return Err(SshError::Connect {
                    host: config.host.clone(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, reason.clone()),
                });
            }
            Ok(Box::new(FakeSession {
                log: Arc::clone(&self.log),
                responses: Arc::clone(&self.responses),
                link_drops: Arc::clone(&self.link_drops),
                alive: true,
            }))
        }
    }

    struct FakeSession {
        log: Arc<Mutex<FakeLog>>,
        responses: Arc<Mutex<HashMap<String, ExecOutput>>>,
        link_drops: Arc<Mutex<HashSet<String>>>,
        alive: bool,
    }

    impl RemoteSession for FakeSession {
        fn exec(&mut self, command: &str) -> Result<ExecOutput, SshError> {
            self.log.lock().unwrap().executed.push(command.to_string());
            if self.link_drops.lock().unwrap().contains(command) {
                self.alive = false;
                return Err(SshError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(command)
                .cloned()
                .unwrap_or_default())
        }

        fn close(&mut self) {
            if self.alive {
                self.log.lock().unwrap().closed += 1;
                self.alive = false;
            }
        }

        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    pub fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            host: "pi.local".to_string(),
            username: "pi".to_string(),
            auth: AuthMethod::Password {
                password: "secret".to_string(),
            },
            work_dir: "/srv/project".to_string(),
            ..ConnectionConfig::default()
        }
    }
}
