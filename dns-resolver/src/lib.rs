#![warn(clippy::pedantic)]
// Sometimes a redundant else is clearer
#![allow(clippy::redundant_else)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod cache;
pub mod context;
pub mod delegator;
pub mod net;
pub mod processor;
pub mod request;

/// How long a Request façade waits for its Processor to reply before
/// giving up and answering `server_failure` itself. Not part of the
/// core pipeline: see [`request::handle_udp_query`] and
/// [`request::handle_tcp_query`].
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
