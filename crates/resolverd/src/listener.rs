//! UDP/TCP listener loops, per §4.7. Grounded on
//! `bin-resolved::listen_udp_task`/`listen_tcp_task`: each accepted
//! connection/datagram is handled on its own spawned task, decoding a
//! `Message`, driving every question through
//! `dns_resolver::resolver::handle_question`, and writing the
//! serialised response back to the peer.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;

use dns_resolver::client::UpstreamClient;
use dns_resolver::context::Context;
use dns_resolver::net::{read_tcp_bytes, send_tcp_bytes, send_udp_bytes_to, TcpError};
use dns_resolver::resolver::handle_question;
use dns_types::protocol::types::{Message, Opcode, Rcode};

use crate::metrics::{DNS_REQUESTS_TOTAL, DNS_RESPONSES_TOTAL};

/// Resolve every question in `query` and build the wire response.
pub async fn build_response<CT: UpstreamClient>(ctx: &Context<CT>, query: Message) -> Message {
    let mut response = query.make_response();
    let single_question = query.questions.len() == 1;
    let mut is_refused = false;

    for question in &query.questions {
        if question.is_unknown() {
            is_refused = true;
            tracing::debug!(%question, "refused");
            continue;
        }

        let outcome = handle_question(ctx, question).await;
        response.answers.extend(outcome.answers);
        if !outcome.authoritative {
            response.header.is_authoritative = false;
        }
        if outcome.nxdomain && single_question {
            response.header.rcode = Rcode::NameError;
        }
    }

    if is_refused {
        response.header.rcode = Rcode::Refused;
        response.header.is_authoritative = false;
    } else if response.answers.is_empty() && response.header.rcode == Rcode::NoError {
        response.header.rcode = Rcode::ServerFailure;
        response.header.is_authoritative = false;
    }

    response
}

async fn handle_raw_message<CT: UpstreamClient>(ctx: Arc<Context<CT>>, buf: &[u8]) -> Option<Message> {
    match Message::from_octets(buf) {
        Ok(message) => {
            if message.header.is_response {
                Some(Message::make_format_error_response(message.header.id))
            } else if message.header.opcode == Opcode::Standard {
                Some(build_response(&ctx, message).await)
            } else {
                let mut response = message.make_response();
                response.header.rcode = Rcode::NotImplemented;
                Some(response)
            }
        }
        Err(error) => {
            tracing::debug!(?error, "could not decode message");
            error.id().map(Message::make_format_error_response)
        }
    }
}

pub async fn listen_udp_task<CT: UpstreamClient + 'static>(ctx: Arc<Context<CT>>, socket: UdpSocket) {
    let socket = Arc::new(socket);
    let (tx, mut rx) = mpsc::channel::<(Message, SocketAddr)>(32);
    let mut buf = vec![0u8; 512];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                DNS_REQUESTS_TOTAL.with_label_values(&["udp"]).inc();
                let bytes = BytesMut::from(&buf[..size]);
                let ctx = ctx.clone();
                let reply = tx.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_raw_message(ctx, bytes.as_ref()).await {
                        if reply.send((response, peer)).await.is_err() {
                            tracing::debug!(?peer, "UDP reply channel closed");
                        }
                    }
                });
            }

            Some((message, peer)) = rx.recv() => {
                match message.clone().to_octets() {
                    Ok(mut serialised) => {
                        DNS_RESPONSES_TOTAL
                            .with_label_values(&["udp", &message.header.rcode.to_string()])
                            .inc();
                        if let Err(error) = send_udp_bytes_to(&socket, peer, &mut serialised).await {
                            tracing::debug!(?peer, ?error, "UDP send error");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(?peer, ?error, "could not serialise response");
                    }
                }
            }
        }
    }
}

pub async fn listen_tcp_task<CT: UpstreamClient + 'static>(ctx: Arc<Context<CT>>, socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((mut stream, peer)) => {
                DNS_REQUESTS_TOTAL.with_label_values(&["tcp"]).inc();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let response = match read_tcp_bytes(&mut stream).await {
                        Ok(bytes) => handle_raw_message(ctx, bytes.as_ref()).await,
                        Err(error) => {
                            let id = match error {
                                TcpError::TooShort { id, .. } => id,
                                TcpError::IO { id, .. } => id,
                            };
                            tracing::debug!(?peer, ?error, "TCP read error");
                            id.map(Message::make_format_error_response)
                        }
                    };
                    if let Some(message) = response {
                        match message.clone().to_octets() {
                            Ok(mut serialised) => {
                                DNS_RESPONSES_TOTAL
                                    .with_label_values(&["tcp", &message.header.rcode.to_string()])
                                    .inc();
                                if let Err(error) = send_tcp_bytes(&mut stream, &mut serialised).await {
                                    tracing::debug!(?peer, ?error, "TCP send error");
                                }
                            }
                            Err(error) => {
                                tracing::warn!(?peer, ?error, "could not serialise response");
                            }
                        }
                    }
                });
            }
            Err(error) => tracing::debug!(?error, "TCP accept error"),
        }
    }
}
