//! OpenSSH-subprocess transport adapter.
//!
//! The engine only consumes the `Transport`/`CommandChannel` seam; this
//! adapter fills it by driving the system `ssh` client in a persistent
//! interactive session, so pagination state survives across commands.
//! Password auth goes through an `SSH_ASKPASS` helper (the password rides
//! an environment variable, never disk); without a password, key/agent
//! auth in `BatchMode`. Swap in a richer transport by implementing the
//! same traits.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, Instant};
use wirlwind_common::DeviceTarget;
use wirlwind_engine::{CommandChannel, Transport, TransportError};

/// Quiet gap after which a response is considered complete when no prompt
/// was recognized.
const IDLE_GAP: Duration = Duration::from_millis(750);
/// Hard ceiling on one read; the engine's own command timeout is tighter.
const READ_CEILING: Duration = Duration::from_secs(20);
const CONNECT_SETTLE: Duration = Duration::from_secs(3);

pub struct SshSubprocessTransport {
    pub user: String,
    pub key: Option<PathBuf>,
    pub password: Option<String>,
    /// Offer legacy KEX/cipher/host-key algorithms for old device firmware.
    pub legacy: bool,
}

/// Write the askpass helper once per process. It prints the password from
/// the child's environment, so the secret itself never touches disk.
fn askpass_helper() -> std::io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = std::env::temp_dir().join("wirlwind-askpass.sh");
    std::fs::write(&path, "#!/bin/sh\nprintf '%s\\n' \"$WIRLWIND_SSH_PASSWORD\"\n")?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))?;
    Ok(path)
}

#[async_trait]
impl Transport for SshSubprocessTransport {
    async fn connect(
        &self,
        target: &DeviceTarget,
    ) -> Result<Box<dyn CommandChannel>, TransportError> {
        let mut command = Command::new("ssh");
        command
            .arg("-tt")
            .arg("-p")
            .arg(target.port.to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg("ConnectTimeout=15");
        match &self.password {
            Some(password) => {
                let helper = askpass_helper().map_err(|e| TransportError::Connect {
                    host: target.host.clone(),
                    reason: format!("writing askpass helper: {e}"),
                })?;
                command
                    .env("SSH_ASKPASS", helper)
                    .env("SSH_ASKPASS_REQUIRE", "force")
                    .env("WIRLWIND_SSH_PASSWORD", password);
            }
            // No password: never hang on an interactive prompt.
            None => {
                command.arg("-o").arg("BatchMode=yes");
            }
        }
        if self.legacy {
            command
                .arg("-o")
                .arg("KexAlgorithms=+diffie-hellman-group14-sha1,diffie-hellman-group1-sha1")
                .arg("-o")
                .arg("HostKeyAlgorithms=+ssh-rsa")
                .arg("-o")
                .arg("Ciphers=+aes128-cbc,3des-cbc");
        }
        if let Some(key) = &self.key {
            command.arg("-i").arg(key);
        }
        command
            .arg(format!("{}@{}", self.user, target.host))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| TransportError::Connect {
            host: target.host.clone(),
            reason: format!("spawning ssh: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| TransportError::Connect {
            host: target.host.clone(),
            reason: "no stdin pipe".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TransportError::Connect {
            host: target.host.clone(),
            reason: "no stdout pipe".into(),
        })?;

        let mut channel = SshChannel {
            child,
            stdin,
            reader: BufReader::new(stdout),
            prompt: None,
        };
        channel.detect_prompt(&target.host).await?;
        tracing::info!(
            host = %target.host,
            prompt = channel.prompt.as_deref().unwrap_or("<none>"),
            "SSH session established"
        );
        Ok(Box::new(channel))
    }
}

pub struct SshChannel {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    prompt: Option<String>,
}

impl SshChannel {
    /// Nudge the session and take the last non-empty line as the prompt.
    async fn detect_prompt(&mut self, host: &str) -> Result<(), TransportError> {
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| TransportError::Connect {
                host: host.to_string(),
                reason: format!("writing to session: {e}"),
            })?;
        let banner = self.read_response(CONNECT_SETTLE).await?;
        self.prompt = banner
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string);
        Ok(())
    }

    /// Accumulate output until the prompt shows up on the last line, the
    /// stream goes quiet, or the ceiling passes.
    async fn read_response(&mut self, ceiling: Duration) -> Result<String, TransportError> {
        let deadline = Instant::now() + ceiling;
        let mut collected = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining.min(IDLE_GAP), self.reader.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    if collected.is_empty() {
                        return Err(TransportError::Closed);
                    }
                    break;
                }
                Ok(Ok(n)) => {
                    collected.extend_from_slice(&chunk[..n]);
                    if let Some(prompt) = &self.prompt {
                        let text = String::from_utf8_lossy(&collected);
                        if text
                            .lines()
                            .rev()
                            .map(str::trim)
                            .find(|l| !l.is_empty())
                            .is_some_and(|l| l == prompt.as_str())
                        {
                            break;
                        }
                    }
                }
                Ok(Err(e)) => return Err(TransportError::Io(e.to_string())),
                // Stream idle: response complete if anything arrived.
                Err(_) => {
                    if !collected.is_empty() {
                        break;
                    }
                }
            }
        }
        Ok(String::from_utf8_lossy(&collected).into_owned())
    }
}

#[async_trait]
impl CommandChannel for SshChannel {
    async fn execute(&mut self, command: &str) -> Result<String, TransportError> {
        self.stdin
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.read_response(READ_CEILING).await
    }

    fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    async fn close(&mut self) {
        let _ = self.stdin.write_all(b"exit\n").await;
        let _ = timeout(Duration::from_secs(2), self.child.wait()).await;
        let _ = self.child.start_kill();
    }
}
