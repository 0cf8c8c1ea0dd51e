//! Opening raw console connections by address.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use vmprobe_core::{ConsoleStream, Error, Result};

/// Where a console is reachable: `tcp:HOST:PORT` or `unix:PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for ConnectionTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(addr) = s.strip_prefix("tcp:") {
            if addr.rsplit_once(':').is_none_or(|(host, port)| {
                host.is_empty() || port.parse::<u16>().is_err()
            }) {
                return Err(Error::InvalidConfig(format!(
                    "'{s}' is not a valid tcp target (expected tcp:HOST:PORT)"
                )));
            }
            return Ok(ConnectionTarget::Tcp(addr.to_string()));
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(Error::InvalidConfig("unix target needs a path".into()));
            }
            return Ok(ConnectionTarget::Unix(PathBuf::from(path)));
        }
        Err(Error::InvalidConfig(format!(
            "'{s}' is not a console target (expected tcp:HOST:PORT or unix:PATH)"
        )))
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Tcp(addr) => write!(f, "tcp:{addr}"),
            ConnectionTarget::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

impl ConnectionTarget {
    /// Connects within `connect_timeout`.
    ///
    /// Any failure, including the timeout, is [`Error::ConnectFailed`].
    pub async fn connect(&self, connect_timeout: Duration) -> Result<ConsoleStream> {
        match timeout(connect_timeout, self.connect_inner()).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(Error::ConnectFailed {
                target: self.to_string(),
                reason: format!("{e}{}", hint(e.kind())),
            }),
            Err(_) => Err(Error::ConnectFailed {
                target: self.to_string(),
                reason: format!("no connection after {connect_timeout:?}"),
            }),
        }
    }

    async fn connect_inner(&self) -> std::io::Result<ConsoleStream> {
        match self {
            ConnectionTarget::Tcp(addr) => {
                let stream = tokio::net::TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            ConnectionTarget::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            ConnectionTarget::Unix(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }
}

fn hint(kind: std::io::ErrorKind) -> &'static str {
    match kind {
        std::io::ErrorKind::NotFound => " (socket not ready - is the VM console exposed?)",
        std::io::ErrorKind::ConnectionRefused => {
            " (connection refused - console proxy may have stopped)"
        }
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_and_unix_targets() {
        assert_eq!(
            "tcp:127.0.0.1:4555".parse::<ConnectionTarget>().unwrap(),
            ConnectionTarget::Tcp("127.0.0.1:4555".into())
        );
        assert_eq!(
            "unix:/run/vm/serial0.sock"
                .parse::<ConnectionTarget>()
                .unwrap(),
            ConnectionTarget::Unix(PathBuf::from("/run/vm/serial0.sock"))
        );
    }

    #[test]
    fn rejects_malformed_targets() {
        assert!("127.0.0.1:4555".parse::<ConnectionTarget>().is_err());
        assert!("tcp:localhost".parse::<ConnectionTarget>().is_err());
        assert!("tcp::80".parse::<ConnectionTarget>().is_err());
        assert!("unix:".parse::<ConnectionTarget>().is_err());
    }

    #[test]
    fn display_round_trips_prefix() {
        let target: ConnectionTarget = "tcp:vm.local:23".parse().unwrap();
        assert_eq!(target.to_string(), "tcp:vm.local:23");
    }

    #[tokio::test]
    async fn refused_connection_is_connect_failed() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let target = ConnectionTarget::Tcp(addr.to_string());
        let err = target
            .connect(Duration::from_secs(5))
            .await
            .err()
            .expect("connect should fail");
        assert!(matches!(err, Error::ConnectFailed { .. }), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_socket_mentions_hint() {
        let dir = tempfile::tempdir().unwrap();
        let target = ConnectionTarget::Unix(dir.path().join("absent.sock"));
        match target.connect(Duration::from_secs(5)).await {
            Err(Error::ConnectFailed { reason, .. }) => {
                assert!(reason.contains("socket not ready"), "{reason}");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connect should fail"),
        }
    }
}
