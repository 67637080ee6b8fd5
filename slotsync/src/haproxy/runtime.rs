//! HAProxy runtime API client
//!
//! The runtime API is a line-oriented protocol on the `stats socket`. In
//! non-interactive mode HAProxy reads one line, which may hold several
//! `;`-separated commands, writes the replies and closes the connection.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to connect to runtime socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Runtime socket IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Runtime command rejected: {0}")]
    Rejected(String),
}

/// A channel that accepts runtime API command lines
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminChannel: Send + Sync {
    /// Send one command line and return HAProxy's reply
    async fn execute(&self, command: &str) -> Result<String, RuntimeError>;
}

/// Runtime API over the admin Unix socket, one connection per command line
#[derive(Debug, Clone)]
pub struct RuntimeClient {
    socket: PathBuf,
    timeout: Duration,
}

impl RuntimeClient {
    #[must_use]
    pub fn new(socket: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket: socket.into(),
            timeout,
        }
    }

    async fn exchange(&self, command: &str) -> Result<String, RuntimeError> {
        let mut stream = UnixStream::connect(&self.socket)
            .await
            .map_err(|source| RuntimeError::Connect {
                path: self.socket.clone(),
                source,
            })?;

        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        stream.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await?;
        Ok(reply)
    }
}

#[async_trait]
impl AdminChannel for RuntimeClient {
    async fn execute(&self, command: &str) -> Result<String, RuntimeError> {
        let reply = tokio::time::timeout(self.timeout, self.exchange(command))
            .await
            .map_err(|_| RuntimeError::Timeout(self.timeout))??;

        if let Some(line) = reply.lines().find(|line| has_severity_prefix(line)) {
            return Err(RuntimeError::Rejected(line.trim().to_string()));
        }

        Ok(reply)
    }
}

/// Failed commands are reported as `[<level>]: <message>`, levels 0 to 3.
/// Anything else, including the usage text older releases print for
/// unknown keywords, is a normal reply.
fn has_severity_prefix(line: &str) -> bool {
    matches!(line.as_bytes(), [b'[', b'0'..=b'3', b']', b':', ..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixListener;
    use tokio::sync::mpsc;

    /// Accept connections, report each received line and answer with `reply`
    fn fake_runtime(
        listener: UnixListener,
        reply: &'static str,
    ) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (read, mut write) = stream.into_split();
                let mut line = String::new();
                BufReader::new(read).read_line(&mut line).await.unwrap();
                let _ = tx.send(line);
                write.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_execute_sends_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let mut lines = fake_runtime(UnixListener::bind(&path).unwrap(), "\n");

        let client = RuntimeClient::new(&path, Duration::from_secs(1));
        let reply = client
            .execute("set server upstream/be0 state maint;")
            .await
            .unwrap();

        assert_eq!(reply, "\n");
        assert_eq!(
            lines.recv().await.unwrap(),
            "set server upstream/be0 state maint;\n"
        );
    }

    #[tokio::test]
    async fn test_severity_reply_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let _lines = fake_runtime(
            UnixListener::bind(&path).unwrap(),
            "\n[3]: Require 'backend/server'.\n",
        );

        let client = RuntimeClient::new(&path, Duration::from_secs(1));
        let err = client
            .execute("set server be0 state ready;")
            .await
            .unwrap_err();
        let RuntimeError::Rejected(line) = err else {
            panic!("expected Rejected, got {err:?}");
        };
        assert_eq!(line, "[3]: Require 'backend/server'.");
    }

    #[tokio::test]
    async fn test_usage_text_answers_help() {
        // HAProxy 2.3 and older have no `help` keyword and print usage instead
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let _lines = fake_runtime(
            UnixListener::bind(&path).unwrap(),
            "Unknown command. Please enter one of the following commands only :\n  \
             help           : this message\n  \
             prompt         : toggle interactive mode with prompt\n",
        );

        let client = RuntimeClient::new(&path, Duration::from_secs(1));
        let reply = client.execute("help").await.unwrap();
        assert!(reply.starts_with("Unknown command."));
    }

    #[test]
    fn test_has_severity_prefix() {
        assert!(has_severity_prefix("[0]: info"));
        assert!(has_severity_prefix("[3]: No such server."));
        assert!(!has_severity_prefix("[4]: not a level"));
        assert!(!has_severity_prefix(
            "Unknown command. Please enter one of the following commands only :"
        ));
        assert!(!has_severity_prefix(""));
    }

    #[tokio::test]
    async fn test_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let client =
            RuntimeClient::new(dir.path().join("absent.sock"), Duration::from_secs(1));
        let err = client.execute("help").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        let listener = UnixListener::bind(&path).unwrap();
        // Accepts but never replies or closes
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let client = RuntimeClient::new(&path, Duration::from_millis(50));
        let err = client.execute("help").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout(_)));
    }
}
