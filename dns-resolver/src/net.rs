//! Wire-level helpers shared by every task that reads or writes a DNS
//! message over a socket.
//!
//! Unlike framing, truncation is not handled here: a caller that
//! wants truncation semantics (the Request façade, for outgoing
//! client replies) builds the already-truncated message itself and
//! passes it through unmodified. These functions only move bytes.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Read a DNS message from a TCP stream.
///
/// A DNS TCP message is slightly different to a DNS UDP message: it
/// has a big-endian u16 prefix giving the total length of the
/// message. This is redundant (the header is fixed-size and the
/// counts say how many records follow) but it means the entire
/// message can be read before parsing begins.
pub async fn read_tcp_bytes(stream: &mut TcpStream) -> Result<BytesMut, TcpError> {
    let size = stream
        .read_u16()
        .await
        .map_err(|error| TcpError::Io { id: None, error })?;
    let expected = usize::from(size);
    let mut bytes = BytesMut::with_capacity(expected);

    while bytes.len() < expected {
        match stream.read_buf(&mut bytes).await {
            Ok(0) => {
                return Err(TcpError::TooShort {
                    id: message_id(&bytes),
                    expected,
                    actual: bytes.len(),
                });
            }
            Ok(_) => (),
            Err(error) => {
                return Err(TcpError::Io {
                    id: message_id(&bytes),
                    error,
                });
            }
        }
    }

    Ok(bytes)
}

fn message_id(bytes: &[u8]) -> Option<u16> {
    if bytes.len() >= 2 {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// An error reading a DNS TCP message.
#[derive(Debug)]
pub enum TcpError {
    TooShort {
        id: Option<u16>,
        expected: usize,
        actual: usize,
    },
    Io {
        id: Option<u16>,
        error: io::Error,
    },
}

impl TcpError {
    pub fn id(&self) -> Option<u16> {
        match self {
            TcpError::TooShort { id, .. } | TcpError::Io { id, .. } => *id,
        }
    }
}

/// Write a serialised message to a TCP stream with the RFC 1035
/// §4.2.2 two-byte length prefix.
pub async fn send_tcp_bytes(stream: &mut TcpStream, bytes: &[u8]) -> Result<(), io::Error> {
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes[..usize::from(len)]).await?;
    Ok(())
}

/// Send a serialised message over an already-connected UDP socket.
pub async fn send_udp_bytes(sock: &UdpSocket, bytes: &[u8]) -> Result<(), io::Error> {
    sock.send(bytes).await?;
    Ok(())
}

/// Like `send_udp_bytes`, but to an explicit address.
pub async fn send_udp_bytes_to(
    sock: &UdpSocket,
    target: std::net::SocketAddr,
    bytes: &[u8],
) -> Result<(), io::Error> {
    sock.send_to(bytes, target).await?;
    Ok(())
}
