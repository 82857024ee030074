//! Configuration shared by every task in the resolution pipeline.

use std::net::SocketAddrV4;
use std::time::Duration;

use crate::cache::SharedCache;

/// Static configuration for one running resolver. Cheap to clone:
/// everything behind a reference is itself reference-counted or
/// `Copy`.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// The upstream nameservers a Delegator fans a query out to, in
    /// the order they were configured.
    pub foreign_name_servers: Vec<SocketAddrV4>,

    /// UDP replies longer than this (in octets) are replaced by an
    /// empty, truncated response; see [`crate::request`].
    pub udp_truncate_length: usize,

    /// Round-tripped from configuration for compatibility; the codec
    /// itself always enforces `LABEL_MAX_LEN`/`NAME_MAX_LEN`, the fixed
    /// limits RFC 1035 sets, regardless of what is configured here.
    pub message_max_label_length: usize,
    pub message_max_name_length: usize,

    /// Opaque identifiers carried over from the source configuration.
    /// Unused by this implementation - there is exactly one cache and
    /// no authoritative master file - but kept so a deployment's
    /// existing configuration file still parses.
    pub cache_table_name: String,
    pub master_table_name: String,

    /// Not part of the core spec: the source never bounds how long a
    /// Processor may wait on its Delegator. A Request that waits
    /// longer than this for its Processor's reply gives up and
    /// answers `server_failure` instead of leaking forever. See the
    /// open question in [`crate::request`].
    pub query_timeout: Duration,
}

impl ResolverConfig {
    pub fn new(foreign_name_servers: Vec<SocketAddrV4>) -> Self {
        Self {
            foreign_name_servers,
            udp_truncate_length: 512,
            message_max_label_length: dns_types::protocol::types::LABEL_MAX_LEN,
            message_max_name_length: dns_types::protocol::types::NAME_MAX_LEN,
            cache_table_name: "dns_cache".to_string(),
            master_table_name: "dns_master".to_string(),
            query_timeout: Duration::from_millis(crate::DEFAULT_QUERY_TIMEOUT_MS),
        }
    }
}

/// Everything a Request task needs to hand off to a fresh Processor:
/// the immutable configuration and the one shared mutable resource.
#[derive(Debug, Clone)]
pub struct ResolverContext {
    pub config: ResolverConfig,
    pub cache: SharedCache,
}

impl ResolverContext {
    pub fn new(config: ResolverConfig, cache: SharedCache) -> Self {
        Self { config, cache }
    }
}
