//! The Upstream Client, per §2/§6: issues one DNS question to one
//! endpoint with a deadline, returning a message or a categorised
//! error.
//!
//! Exposed as a trait so the Resolver Core depends on the contract in
//! §6 ("Consumed: Upstream Client -- query(ctx, question, host:port) →
//! (message | error) with the deadline honoured"), not on sockets
//! directly: the race in §4.5.2 is then unit-testable against a fake
//! client with no network involved. `UdpTcpClient` is the real
//! implementation, grounded on `query_nameserver`'s UDP-then-TCP
//! fallback.

use std::net::SocketAddr;
use std::time::Duration;

use dns_types::protocol::types::{Message, Question, Rcode};
use rand::Rng;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::error::ResolveError;
use crate::net::{read_tcp_bytes, send_tcp_bytes, send_udp_bytes};

#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Issue `question` to `endpoint`, honouring `deadline`. Returns
    /// `UpstreamTimeout` if the deadline elapses, `UpstreamError` for
    /// any transport/protocol failure.
    async fn query(&self, question: &Question, endpoint: &str, deadline: Duration) -> Result<Message, ResolveError>;
}

/// The real Upstream Client: tries UDP first, falling back to TCP if
/// the UDP response is truncated or unusable, per `query_nameserver`.
#[derive(Debug, Clone, Default)]
pub struct UdpTcpClient;

impl UdpTcpClient {
    pub fn new() -> Self {
        UdpTcpClient
    }
}

#[async_trait::async_trait]
impl UpstreamClient for UdpTcpClient {
    async fn query(&self, question: &Question, endpoint: &str, deadline: Duration) -> Result<Message, ResolveError> {
        let address: SocketAddr = endpoint
            .parse()
            .map_err(|_| ResolveError::InvalidArgs(format!("not a valid endpoint: {endpoint}")))?;

        match timeout(deadline, query_notimeout(address, question)).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(message)) => Err(ResolveError::UpstreamError {
                endpoint: endpoint.to_string(),
                message,
            }),
            Err(_) => Err(ResolveError::UpstreamTimeout {
                endpoint: endpoint.to_string(),
            }),
        }
    }
}

async fn query_notimeout(address: SocketAddr, question: &Question) -> Result<Message, String> {
    let mut request = Message::from_question(rand::thread_rng().gen(), question.clone());
    request.header.recursion_desired = true;

    let mut serialised = request
        .to_octets()
        .map_err(|error| format!("could not serialise request: {error}"))?;

    if let Some(response) = query_udp(address, &mut serialised).await {
        if response_matches_request(&request, &response) {
            return Ok(response);
        }
    }

    if let Some(response) = query_tcp(address, &mut serialised).await {
        if response_matches_request(&request, &response) {
            return Ok(response);
        }
    }

    Err("no usable response from nameserver".to_string())
}

async fn query_udp(address: SocketAddr, serialised_request: &mut [u8]) -> Option<Message> {
    if serialised_request.len() > 512 {
        return None;
    }

    let mut buf = vec![0u8; 512];
    let sock = UdpSocket::bind("0.0.0.0:0").await.ok()?;
    sock.connect(address).await.ok()?;
    send_udp_bytes(&sock, serialised_request).await.ok()?;
    let n = sock.recv(&mut buf).await.ok()?;

    Message::from_octets(&buf[..n]).ok()
}

async fn query_tcp(address: SocketAddr, serialised_request: &mut [u8]) -> Option<Message> {
    let mut stream = TcpStream::connect(address).await.ok()?;
    send_tcp_bytes(&mut stream, serialised_request).await.ok()?;
    let bytes = read_tcp_bytes(&mut stream).await.ok()?;

    Message::from_octets(bytes.as_ref()).ok()
}

/// Basic validation that a nameserver response matches a request:
/// same id, opcode, and questions; is a response; not truncated; and
/// has an rcode we're prepared to act on.
fn response_matches_request(request: &Message, response: &Message) -> bool {
    request.header.id == response.header.id
        && response.header.is_response
        && request.header.opcode == response.header.opcode
        && !response.header.is_truncated
        && (response.header.rcode == Rcode::NoError || response.header.rcode == Rcode::NameError)
        && request.questions == response.questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_types::protocol::types::test_util::*;
    use dns_types::protocol::types::{QueryClass, QueryType, RecordClass, RecordType};
    use std::net::Ipv4Addr;

    fn matching_response() -> (Message, Message) {
        let request = Message::from_question(
            1234,
            Question {
                name: domain("www.example.com"),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            },
        );
        let mut response = request.make_response();
        response.answers = vec![a_record("www.example.com", Ipv4Addr::new(1, 1, 1, 1))];
        (request, response)
    }

    #[test]
    fn response_matches_request_accepts_matching() {
        let (request, response) = matching_response();
        assert!(response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_rejects_id_mismatch() {
        let (request, mut response) = matching_response();
        response.header.id += 1;
        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_rejects_truncated() {
        let (request, mut response) = matching_response();
        response.header.is_truncated = true;
        assert!(!response_matches_request(&request, &response));
    }

    #[test]
    fn response_matches_request_ignores_authoritative_flag() {
        let (request, mut response) = matching_response();
        response.header.is_authoritative = !response.header.is_authoritative;
        assert!(response_matches_request(&request, &response));
    }

    #[tokio::test]
    async fn query_against_closed_port_is_an_error() {
        let client = UdpTcpClient::new();
        let question = Question {
            name: domain("www.example.com"),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        };
        // port 0 never accepts connections/datagrams
        let result = client.query(&question, "127.0.0.1:1", Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
