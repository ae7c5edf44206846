//! One privileged administrative session against the ircd.
//!
//! The server acknowledges none of the intermediate steps on this path, so
//! the sender walks a fixed command sequence with settling delays while a
//! background task collects everything the peer says. That transcript is
//! the only record of what happened; `classify` reads it afterwards.
//!
//! Exactly one connection is opened per command and closed when the
//! session ends.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use crate::classify::AccountAction;
use crate::errors::AdmError;
use crate::tls;

/// Operator login used for OPER escalation.
const OPER_NAME: &str = "admin";

/// Domain for the throwaway registration email addresses.
const EMAIL_DOMAIN: &str = "localhost";

/// Cap on bytes read from the peer per session. Enforced on the transport;
/// bounds the transcript and any unterminated partial line alike.
const MAX_TRANSCRIPT_BYTES: usize = 64 * 1024;

/// Protocol steps that are followed by a settling delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// NICK has been sent.
    Claim,
    /// USER has been sent.
    Announce,
    /// OPER has been sent.
    Escalate,
    /// The privileged NickServ command has been sent.
    Command,
}

/// Settling behavior between protocol steps.
///
/// The wire gives no acknowledgment for the intermediate steps, so the
/// production pacing waits a fixed, empirically calibrated time after each
/// send. A response-triggered implementation can replace this without
/// touching session control flow.
#[async_trait]
pub trait Pacing: Send + Sync {
    async fn settle(&self, step: SessionStep);
}

/// Calibrated fixed delays. Registration services are slowest to absorb
/// the USER line, hence the longer pause there.
pub struct FixedPacing;

#[async_trait]
impl Pacing for FixedPacing {
    async fn settle(&self, step: SessionStep) {
        let wait = match step {
            SessionStep::Claim => Duration::from_secs(1),
            SessionStep::Announce => Duration::from_secs(2),
            SessionStep::Escalate => Duration::from_secs(1),
            SessionStep::Command => Duration::from_secs(1),
        };
        sleep(wait).await;
    }
}

/// No settling at all, for peers that are read back immediately.
pub struct NoPacing;

#[async_trait]
impl Pacing for NoPacing {
    async fn settle(&self, _step: SessionStep) {}
}

/// Connection parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub host: String,
    pub port: u16,
    pub verify_tls: bool,
    /// Overall session budget; also bounds connect and handshake.
    pub timeout: Duration,
}

/// The single privileged command a session issues.
#[derive(Debug)]
pub enum AccountCommand {
    Register {
        username: String,
        password: SecretString,
    },
    Drop {
        username: String,
    },
}

impl AccountCommand {
    pub fn username(&self) -> &str {
        match self {
            Self::Register { username, .. } | Self::Drop { username } => username,
        }
    }

    pub fn action(&self) -> AccountAction {
        match self {
            Self::Register { .. } => AccountAction::Register,
            Self::Drop { .. } => AccountAction::Unregister,
        }
    }

    /// The NickServ services line for this command.
    fn wire_line(&self) -> String {
        match self {
            Self::Register { username, password } => format!(
                "NS SAREGISTER {} {} {}@{}",
                username,
                password.expose_secret(),
                username,
                EMAIL_DOMAIN
            ),
            Self::Drop { username } => format!("NS SADROP {}", username),
        }
    }

    fn quit_line(&self) -> &'static str {
        match self {
            Self::Register { .. } => "QUIT :Registration complete",
            Self::Drop { .. } => "QUIT :Unregistration complete",
        }
    }
}

/// One open administrative connection with its transcript reader running.
pub struct Session {
    nick: String,
    deadline: Instant,
    reader: JoinHandle<()>,
    transcript: Arc<Mutex<String>>,
    writer: WriteHalf<TlsStream<TcpStream>>,
}

impl Session {
    /// Open the TLS transport and start collecting the transcript.
    pub async fn open(opts: &SessionOptions) -> Result<Self, AdmError> {
        let addr = format!("{}:{}", opts.host, opts.port);
        let connector = tls::connector(opts.verify_tls)?;
        let server_name = rustls::pki_types::ServerName::try_from(opts.host.clone())
            .map_err(|e| AdmError::Tls(format!("invalid server name {}: {}", opts.host, e)))?;

        let deadline = Instant::now() + opts.timeout;
        let tcp = match timeout_at(deadline, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AdmError::Connect { addr, source: e }),
            Err(_) => {
                return Err(AdmError::Connect {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                })
            }
        };
        let stream = match timeout_at(deadline, connector.connect(server_name, tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AdmError::Connect { addr, source: e }),
            Err(_) => {
                return Err(AdmError::Connect {
                    addr,
                    source: io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"),
                })
            }
        };

        let (read_half, writer) = tokio::io::split(stream);
        let transcript = Arc::new(Mutex::new(String::new()));
        let reader = tokio::spawn(read_transcript(
            read_half,
            Arc::clone(&transcript),
            deadline,
        ));

        let nick = ephemeral_nick();
        debug!("session {} connected to {}", nick, addr);
        Ok(Self {
            nick,
            deadline,
            reader,
            transcript,
            writer,
        })
    }

    /// Drive the privileged exchange and return whatever the peer said.
    ///
    /// A write failure stops the sequence early but never discards the
    /// transcript collected so far; classification runs on partial data.
    pub async fn run(
        mut self,
        oper_credential: &SecretString,
        command: &AccountCommand,
        pacing: &dyn Pacing,
    ) -> String {
        if let Err(e) = self.send_sequence(oper_credential, command, pacing).await {
            warn!("{}: send sequence ended early: {}", command.username(), e);
        }

        // The server closes the link after QUIT; if it never does, give up
        // at the session deadline and keep what was heard.
        if timeout_at(self.deadline, &mut self.reader).await.is_err() {
            self.reader.abort();
        }

        let transcript = self.transcript.lock().unwrap().clone();
        debug!(
            "transcript for {}: {} byte(s)",
            command.username(),
            transcript.len()
        );
        transcript
    }

    async fn send_sequence(
        &mut self,
        oper_credential: &SecretString,
        command: &AccountCommand,
        pacing: &dyn Pacing,
    ) -> Result<(), AdmError> {
        let nick_line = format!("NICK {}", self.nick);
        self.send(&nick_line).await?;
        pacing.settle(SessionStep::Claim).await;

        self.send("USER operbot 0 * :Operator Bot").await?;
        pacing.settle(SessionStep::Announce).await;

        let oper_line = format!("OPER {} {}", OPER_NAME, oper_credential.expose_secret());
        self.send(&oper_line).await?;
        pacing.settle(SessionStep::Escalate).await;

        self.send(&command.wire_line()).await?;
        pacing.settle(SessionStep::Command).await;

        self.send(command.quit_line()).await
    }

    /// Write one CRLF-terminated line, bounded by the session deadline.
    ///
    /// Only the leading verb is logged; several lines carry credentials.
    async fn send(&mut self, line: &str) -> Result<(), AdmError> {
        debug!("-> {}", line.split_whitespace().next().unwrap_or(""));
        let framed = format!("{}\r\n", line);
        match timeout_at(self.deadline, self.writer.write_all(framed.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AdmError::Io(e)),
            Err(_) => Err(AdmError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "session deadline elapsed",
            ))),
        }
    }
}

/// Accumulate peer lines until the transport closes, the read cap is hit,
/// or the deadline passes.
async fn read_transcript(
    read_half: ReadHalf<TlsStream<TcpStream>>,
    transcript: Arc<Mutex<String>>,
    deadline: Instant,
) {
    let mut reader = BufReader::new(read_half.take(MAX_TRANSCRIPT_BYTES as u64));
    let mut line = String::new();
    loop {
        line.clear();
        let read = match timeout_at(deadline, reader.read_line(&mut line)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                debug!("transcript reader stopped: {}", e);
                return;
            }
            Err(_) => {
                debug!("transcript reader stopped: session deadline");
                return;
            }
        };
        if read == 0 {
            debug!("transcript reader stopped: end of stream");
            return;
        }
        transcript.lock().unwrap().push_str(&line);
    }
}

/// Throwaway operator nick, unique enough for concurrent tool runs.
fn ephemeral_nick() -> String {
    format!("OperBot{}", rand::thread_rng().gen_range(0..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_wire_line_carries_user_password_email() {
        let command = AccountCommand::Register {
            username: "alice".to_string(),
            password: SecretString::new("hunter2".to_string()),
        };
        assert_eq!(
            command.wire_line(),
            "NS SAREGISTER alice hunter2 alice@localhost"
        );
        assert_eq!(command.quit_line(), "QUIT :Registration complete");
        assert_eq!(command.action(), AccountAction::Register);
    }

    #[test]
    fn drop_wire_line_names_only_the_user() {
        let command = AccountCommand::Drop {
            username: "bob".to_string(),
        };
        assert_eq!(command.wire_line(), "NS SADROP bob");
        assert_eq!(command.quit_line(), "QUIT :Unregistration complete");
        assert_eq!(command.action(), AccountAction::Unregister);
    }

    #[test]
    fn ephemeral_nicks_stay_in_range() {
        for _ in 0..100 {
            let nick = ephemeral_nick();
            let suffix = nick.strip_prefix("OperBot").unwrap();
            let n: u32 = suffix.parse().unwrap();
            assert!(n < 1_000_000);
        }
    }

    #[test]
    fn redacted_debug_for_register_command() {
        let command = AccountCommand::Register {
            username: "alice".to_string(),
            password: SecretString::new("hunter2".to_string()),
        };
        let rendered = format!("{:?}", command);
        assert!(!rendered.contains("hunter2"), "password leaked: {}", rendered);
    }
}
