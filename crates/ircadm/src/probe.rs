//! TCP readiness probing.
//!
//! The batch workflows refuse to start talking to an ircd that is not
//! accepting connections, and the database reset has to wait for a freshly
//! started server to open its listeners. Both cases reduce to the same
//! probe: try to connect until it works or a deadline passes.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::errors::AdmError;

/// Per-attempt connect budget.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Pause between failed attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Wait until `host:port` accepts a TCP connection, giving up after
/// `timeout_after`.
///
/// The deadline is checked before every attempt, so a run that is already
/// over budget never starts another connect. The probe connection is closed
/// as soon as it succeeds.
pub async fn wait_for_port(
    host: &str,
    port: u16,
    timeout_after: Duration,
) -> Result<(), AdmError> {
    let addr = format!("{}:{}", host, port);
    let deadline = Instant::now() + timeout_after;

    loop {
        if Instant::now() >= deadline {
            return Err(AdmError::Unreachable {
                addr,
                timeout_secs: timeout_after.as_secs(),
            });
        }

        match timeout(ATTEMPT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => return Ok(()),
            Ok(Err(e)) => debug!("{} not ready: {}", addr, e),
            Err(_) => debug!("{} not ready: connect attempt timed out", addr),
        }

        sleep(RETRY_BACKOFF).await;
    }
}
