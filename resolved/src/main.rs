use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::sleep;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use dns_resolver::cache::SharedCache;
use dns_resolver::context::ResolverContext;
use dns_resolver::{net, request};

mod config;

use config::Settings;

async fn listen_tcp_task(context: ResolverContext, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((mut stream, peer)) => {
                let context = context.clone();
                tokio::spawn(
                    async move {
                        tracing::info!("TCP request");
                        let bytes = match net::read_tcp_bytes(&mut stream).await {
                            Ok(bytes) => bytes,
                            Err(error) => {
                                tracing::debug!(?error, "TCP read error");
                                return;
                            }
                        };
                        let reply = request::handle_tcp_query(&bytes, context).await;
                        if let Err(error) = net::send_tcp_bytes(&mut stream, &reply).await {
                            tracing::debug!(?error, "TCP send error");
                        }
                    }
                    .instrument(tracing::info_span!("request", %peer, transport = "tcp")),
                );
            }
            Err(error) => tracing::debug!(?error, "TCP accept error"),
        }
    }
}

async fn listen_udp_task(context: ResolverContext, socket: UdpSocket) {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; 65535];

    loop {
        let (size, peer) = match socket.recv_from(&mut buf).await {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!(?error, "UDP recv error");
                continue;
            }
        };
        let bytes = buf[..size].to_vec();
        let context = context.clone();
        let socket = socket.clone();
        tokio::spawn(
            async move {
                tracing::info!("UDP request");
                let reply = request::handle_udp_query(&bytes, context).await;
                if let Err(error) = net::send_udp_bytes_to(&socket, peer, &reply).await {
                    tracing::debug!(?error, "UDP send error");
                }
            }
            .instrument(tracing::info_span!("request", %peer, transport = "udp")),
        );
    }
}

/// Delete expired cache entries every 5 minutes. The per-entry timers
/// spawned on insertion should normally beat this to it; this only
/// catches anything left behind by a timer that got starved.
async fn prune_cache_task(cache: SharedCache) {
    loop {
        sleep(Duration::from_secs(60 * 5)).await;
        let pruned = cache.prune_expired(Instant::now());
        if pruned > 0 {
            tracing::info!(%pruned, "pruned cache");
        }
    }
}

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        var.split(',').map(str::to_string).collect::<HashSet<_>>()
    } else {
        HashSet::new()
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
/// A recursive/forwarding DNS resolver.
///
/// resolved listens for queries over UDP and TCP, answers from its
/// cache where it can, and otherwise delegates to the configured
/// upstream nameservers.
struct Args {
    /// Path to the YAML configuration file (without extension)
    #[arg(short, long, default_value = "resolved")]
    config: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    begin_logging();

    let settings = match Settings::new(&args.config) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!(?error, "could not load configuration");
            process::exit(1);
        }
    };

    let context = ResolverContext::new(settings.to_resolver_config(), SharedCache::new());
    let addr = SocketAddr::from((settings.interface, settings.port));

    tracing::info!(%addr, "binding DNS UDP socket");
    let udp = match UdpSocket::bind(addr).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    tracing::info!(%addr, "binding DNS TCP socket");
    let tcp = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS TCP socket");
            process::exit(1);
        }
    };

    tokio::spawn(listen_tcp_task(context.clone(), tcp));
    tokio::spawn(prune_cache_task(context.cache.clone()));
    listen_udp_task(context, udp).await;
}
