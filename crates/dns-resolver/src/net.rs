//! Low-level UDP/TCP framing helpers used by the Upstream Client.
//!
//! A DNS TCP message has a two-byte big-endian length prefix ahead of
//! the message itself; UDP has none, so truncation is signalled by
//! the TC bit in the header instead.

use std::io;
use std::net::SocketAddr;
use std::process;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// An error reading a DNS TCP message.
#[derive(Debug)]
pub enum TcpError {
    TooShort {
        id: Option<u16>,
        expected: usize,
        actual: usize,
    },
    IO {
        id: Option<u16>,
        error: io::Error,
    },
}

/// Read a length-prefixed DNS message from a TCP stream.
pub async fn read_tcp_bytes(stream: &mut TcpStream) -> Result<BytesMut, TcpError> {
    match stream.read_u16().await {
        Ok(size) => {
            let expected = size as usize;
            let mut bytes = BytesMut::with_capacity(expected);
            while bytes.len() < expected {
                match stream.read_buf(&mut bytes).await {
                    Ok(0) if bytes.len() < expected => {
                        let id = id_of(&bytes);
                        return Err(TcpError::TooShort {
                            id,
                            expected,
                            actual: bytes.len(),
                        });
                    }
                    Err(err) => {
                        let id = id_of(&bytes);
                        return Err(TcpError::IO { id, error: err });
                    }
                    _ => (),
                }
            }
            Ok(bytes)
        }
        Err(err) => Err(TcpError::IO { id: None, error: err }),
    }
}

fn id_of(bytes: &[u8]) -> Option<u16> {
    if bytes.len() >= 2 {
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    } else {
        None
    }
}

/// Send a serialised message over a connected UDP socket, setting or
/// clearing the TC flag as appropriate.
///
/// # Panics (process exit)
/// If `bytes` is shorter than a DNS header -- that can only happen
/// from a bug in the serialiser, so this aborts the process rather
/// than silently emitting garbage on the wire.
pub async fn send_udp_bytes(sock: &UdpSocket, bytes: &mut [u8]) -> Result<(), io::Error> {
    if bytes.len() < 12 {
        tracing::error!(length = %bytes.len(), "message too short");
        process::exit(1);
    }

    if bytes.len() > 512 {
        bytes[2] |= 0b0000_0010;
        sock.send(&bytes[..512]).await?;
    } else {
        bytes[2] &= 0b1111_1101;
        sock.send(bytes).await?;
    }

    Ok(())
}

/// Like `send_udp_bytes` but sends to the given address on an unconnected socket.
pub async fn send_udp_bytes_to(sock: &UdpSocket, target: SocketAddr, bytes: &mut [u8]) -> Result<(), io::Error> {
    if bytes.len() < 12 {
        tracing::error!(length = %bytes.len(), "message too short");
        process::exit(1);
    }

    if bytes.len() > 512 {
        bytes[2] |= 0b0000_0010;
        sock.send_to(&bytes[..512], target).await?;
    } else {
        bytes[2] &= 0b1111_1101;
        sock.send_to(bytes, target).await?;
    }

    Ok(())
}

/// Send a length-prefixed message over a TCP stream.
pub async fn send_tcp_bytes(stream: &mut TcpStream, bytes: &mut [u8]) -> Result<(), io::Error> {
    if bytes.len() < 12 {
        tracing::error!(length = %bytes.len(), "message too short");
        process::exit(1);
    }

    let len = if let Ok(len) = u16::try_from(bytes.len()) {
        bytes[2] &= 0b1111_1101;
        len
    } else {
        bytes[2] |= 0b0000_0010;
        u16::MAX
    };

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&bytes[..(len as usize)]).await?;

    Ok(())
}
