//! Minimal DNS client that talks to one nameserver at a time
//!
//! Discovery needs the raw response (response code, answer and additional
//! sections) from a specific nameserver, so queries are sent directly instead
//! of going through a recursive resolver library.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::error::{DiscoveryError, Result};

/// Largest UDP response accepted. Servers that need more set the TC bit.
const MAX_UDP_MESSAGE: usize = 4096;

/// How queries reach the nameserver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    #[must_use]
    pub const fn from_use_tcp(use_tcp: bool) -> Self {
        if use_tcp {
            Self::Tcp
        } else {
            Self::Udp
        }
    }
}

#[derive(Debug, Clone)]
pub struct DnsClient {
    transport: Transport,
    timeout: Duration,
}

impl DnsClient {
    #[must_use]
    pub const fn new(transport: Transport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Send a recursive SRV query for `name` to `server` and return the response,
    /// whatever its response code
    pub async fn query_srv(&self, server: SocketAddr, name: &str) -> Result<Message> {
        let qname = Name::from_ascii(name).map_err(|e| {
            DiscoveryError::Configuration(format!("invalid DNS name '{name}': {e}"))
        })?;

        let mut request = Message::new();
        request
            .set_id(rand::random::<u16>())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(qname, RecordType::SRV));

        let wire = request.to_vec().map_err(|e| DiscoveryError::Protocol {
            server,
            reason: e.to_string(),
        })?;

        let exchange = async {
            match self.transport {
                Transport::Udp => exchange_udp(server, &wire).await,
                Transport::Tcp => exchange_tcp(server, &wire).await,
            }
        };

        let reply = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DiscoveryError::Timeout {
                name: name.to_string(),
                server,
            })?
            .map_err(|source| DiscoveryError::Transport {
                name: name.to_string(),
                server,
                source,
            })?;

        let response = Message::from_vec(&reply).map_err(|e| DiscoveryError::Protocol {
            server,
            reason: e.to_string(),
        })?;

        if response.id() != request.id() {
            return Err(DiscoveryError::Protocol {
                server,
                reason: format!(
                    "response id {} does not match query id {}",
                    response.id(),
                    request.id()
                ),
            });
        }

        Ok(response)
    }
}

async fn exchange_udp(server: SocketAddr, wire: &[u8]) -> std::io::Result<Vec<u8>> {
    let local: SocketAddr = if server.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    // Connected so ICMP port-unreachable surfaces as an error instead of a timeout
    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;
    socket.send(wire).await?;

    let mut buf = vec![0u8; MAX_UDP_MESSAGE];
    let len = socket.recv(&mut buf).await?;
    buf.truncate(len);
    Ok(buf)
}

/// DNS over TCP: every message is prefixed with its length as a big-endian u16
async fn exchange_tcp(server: SocketAddr, wire: &[u8]) -> std::io::Result<Vec<u8>> {
    let len = u16::try_from(wire.len()).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "DNS query too large")
    })?;

    let mut stream = TcpStream::connect(server).await?;
    stream.set_nodelay(true)?;

    let mut framed = Vec::with_capacity(wire.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(wire);
    stream.write_all(&framed).await?;

    let reply_len = stream.read_u16().await?;
    let mut buf = vec![0u8; usize::from(reply_len)];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}
