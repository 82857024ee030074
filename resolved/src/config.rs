//! On-disk configuration for the `resolved` daemon, loaded with the
//! `config` crate the same way the rest of this family of tools does.

use std::net::{Ipv4Addr, SocketAddrV4};

use config::{Config, ConfigError, File};
use serde::Deserialize;

use dns_resolver::context::ResolverConfig;

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_port() -> u16 {
    53
}

fn default_udp_truncate_length() -> usize {
    512
}

fn default_message_max_label_length() -> usize {
    dns_types::protocol::types::LABEL_MAX_LEN
}

fn default_message_max_name_length() -> usize {
    dns_types::protocol::types::NAME_MAX_LEN
}

fn default_query_timeout_ms() -> u64 {
    dns_resolver::DEFAULT_QUERY_TIMEOUT_MS
}

fn default_cache_table_name() -> String {
    "dns_cache".to_string()
}

fn default_master_table_name() -> String {
    "dns_master".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// The upstream nameservers to delegate unanswerable queries to.
    #[serde(default)]
    pub foreign_name_servers: Vec<SocketAddrV4>,

    #[serde(default = "default_udp_truncate_length")]
    pub udp_truncate_length: usize,

    /// Accepted for compatibility with an existing deployment's config
    /// file; the codec always enforces the fixed RFC 1035 limits
    /// regardless of what is configured here (see
    /// [`ResolverConfig::message_max_label_length`]).
    #[serde(default = "default_message_max_label_length")]
    pub message_max_label_length: usize,
    #[serde(default = "default_message_max_name_length")]
    pub message_max_name_length: usize,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Carried over from the configuration this resolver's own config
    /// schema is modelled on; this implementation has exactly one
    /// cache and no authoritative master file, so these are unused
    /// beyond round-tripping a deployment's existing config file.
    #[serde(default = "default_cache_table_name")]
    pub cache_table_name: String,
    #[serde(default = "default_master_table_name")]
    pub master_table_name: String,
}

impl Settings {
    pub fn new(filename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(filename))
            .build()?
            .try_deserialize()
    }

    pub fn to_resolver_config(&self) -> ResolverConfig {
        let mut config = ResolverConfig::new(self.foreign_name_servers.clone());
        config.udp_truncate_length = self.udp_truncate_length;
        config.message_max_label_length = self.message_max_label_length;
        config.message_max_name_length = self.message_max_name_length;
        config.cache_table_name = self.cache_table_name.clone();
        config.master_table_name = self.master_table_name.clone();
        config.query_timeout = std::time::Duration::from_millis(self.query_timeout_ms);
        config
    }
}
