//! The Delegator: fans a query out to every configured upstream
//! nameserver in parallel, escalating to TCP on truncation, and
//! forwards whatever comes back to its parent Processor.

use std::net::{SocketAddr, SocketAddrV4};

use rand::Rng;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use dns_types::protocol::types::Message;

use crate::context::ResolverConfig;
use crate::net::{read_tcp_bytes, send_tcp_bytes, send_udp_bytes_to};

/// One client task's report back to the Delegator loop: which
/// upstream it talked to, whether the conversation happened over
/// TCP, and the raw reply bytes if it got one.
struct ClientReport {
    upstream: SocketAddrV4,
    via_tcp: bool,
    bytes: Vec<u8>,
}

/// Spawn a Delegator task for `request`. Delegate responses are sent
/// to `to_processor` as they arrive; the returned handle lets the
/// Processor abort the Delegator (and, transitively, whichever client
/// conversations are still in flight) once it no longer needs them.
pub fn spawn(
    request: Message,
    config: ResolverConfig,
    to_processor: mpsc::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(run(request, config, to_processor))
}

async fn run(request: Message, config: ResolverConfig, to_processor: mpsc::Sender<Message>) {
    if config.foreign_name_servers.is_empty() {
        tracing::debug!("no foreign nameservers configured");
        return;
    }

    // a fresh, unpredictable id per delegated query, rather than the
    // client's own id: guards against an off-path attacker guessing
    // which id to spoof a reply with.
    let mut outgoing = request;
    outgoing.header.id = rand::thread_rng().gen();
    let expected_id = outgoing.header.id;

    let serialised = match outgoing.to_octets() {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(?error, "could not serialise request for delegation");
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel(config.foreign_name_servers.len());

    for &upstream in &config.foreign_name_servers {
        tokio::spawn(udp_client(upstream, serialised.clone(), tx.clone()));
    }
    // `tx` itself is kept alive for the lifetime of this loop (rather
    // than dropped once the initial fan-out is spawned) so it can be
    // cloned again for TCP escalation below. The Delegator has no
    // internal timeout; it only ever stops via its parent Processor
    // dropping or aborting it.

    while let Some(report) = rx.recv().await {
        match Message::from_octets(&report.bytes) {
            Ok(reply) if reply.header.id != expected_id => {
                tracing::debug!(upstream = %report.upstream, "dropping reply with mismatched id");
            }
            Ok(reply) => {
                if reply.header.is_truncated && !report.via_tcp {
                    tracing::debug!(upstream = %report.upstream, "truncated, retrying over TCP");
                    tokio::spawn(tcp_client(report.upstream, serialised.clone(), tx.clone()));
                    continue;
                }
                if to_processor.send(reply).await.is_err() {
                    // the Processor has already decided and hung up
                    return;
                }
            }
            Err(error) => {
                tracing::debug!(upstream = %report.upstream, ?error, "dropping unparseable reply");
            }
        }
    }
}

async fn udp_client(upstream: SocketAddrV4, request_bytes: Vec<u8>, tx: mpsc::Sender<ClientReport>) {
    let sock = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(sock) => sock,
        Err(error) => {
            tracing::debug!(%upstream, ?error, "could not bind UDP client socket");
            return;
        }
    };

    let target = SocketAddr::V4(upstream);
    if let Err(error) = send_udp_bytes_to(&sock, target, &request_bytes).await {
        tracing::debug!(%upstream, ?error, "UDP send error");
        return;
    }

    let mut buf = vec![0u8; 65535];
    match sock.recv_from(&mut buf).await {
        Ok((size, from)) => {
            if from != target {
                tracing::debug!(%upstream, %from, "dropping reply from unlisted source");
                return;
            }
            buf.truncate(size);
            let _ = tx
                .send(ClientReport {
                    upstream,
                    via_tcp: false,
                    bytes: buf,
                })
                .await;
        }
        Err(error) => tracing::debug!(%upstream, ?error, "UDP recv error"),
    }
}

async fn tcp_client(upstream: SocketAddrV4, request_bytes: Vec<u8>, tx: mpsc::Sender<ClientReport>) {
    let mut stream = match TcpStream::connect(SocketAddr::V4(upstream)).await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::debug!(%upstream, ?error, "TCP connect error");
            return;
        }
    };

    if let Err(error) = send_tcp_bytes(&mut stream, &request_bytes).await {
        tracing::debug!(%upstream, ?error, "TCP send error");
        return;
    }

    match read_tcp_bytes(&mut stream).await {
        Ok(bytes) => {
            let _ = tx
                .send(ClientReport {
                    upstream,
                    via_tcp: true,
                    bytes: bytes.to_vec(),
                })
                .await;
        }
        Err(error) => tracing::debug!(%upstream, ?error, "TCP recv error"),
    }
}
