use std::net::SocketAddrV4;
use std::process;

use clap::Parser;

use dns_resolver::cache::SharedCache;
use dns_resolver::context::{ResolverConfig, ResolverContext};
use dns_resolver::request;
use dns_types::protocol::types::{
    Label, Name, QueryClass, QueryType, Question, Rcode, RecordClass, RecordType, Resource,
};

fn parse_name(s: &str) -> Result<Name, String> {
    if s == "." {
        return Ok(Name::root());
    }
    let mut labels = Vec::new();
    for part in s.trim_end_matches('.').split('.') {
        labels.push(Label::try_from(part.as_bytes()).map_err(|error| format!("{error:?}"))?);
    }
    Name::from_labels(labels).map_err(|error| format!("{error:?}"))
}

fn parse_qtype(s: &str) -> Result<QueryType, String> {
    if s == "*" {
        return Ok(QueryType::Wildcard);
    }
    let rtype = match s.to_ascii_uppercase().as_str() {
        "A" => RecordType::A,
        "NS" => RecordType::NS,
        "MD" => RecordType::MD,
        "MF" => RecordType::MF,
        "CNAME" => RecordType::CNAME,
        "SOA" => RecordType::SOA,
        "MB" => RecordType::MB,
        "MG" => RecordType::MG,
        "MR" => RecordType::MR,
        "NULL" => RecordType::NULL,
        "WKS" => RecordType::WKS,
        "PTR" => RecordType::PTR,
        "HINFO" => RecordType::HINFO,
        "MINFO" => RecordType::MINFO,
        "MX" => RecordType::MX,
        "TXT" => RecordType::TXT,
        other => return Err(format!("unknown query type {other}")),
    };
    Ok(QueryType::Record(rtype))
}

fn print_section(heading: &str, rrs: &[Resource]) {
    if rrs.is_empty() {
        return;
    }
    println!("\n;; {heading}");
    for rr in rrs {
        println!("{}\t{}\t{}\t{:?}", rr.name, rr.ttl, rr.rclass, rr.rdata);
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// DNS lookup utility.
///
/// Sends a single query directly to an upstream nameserver over UDP
/// (escalating to TCP if the reply is truncated) and prints the
/// decoded response. Does not use a local cache.
struct Args {
    /// Domain name to resolve
    #[arg(value_parser = parse_name)]
    domain: Name,

    /// Query type to resolve
    #[arg(default_value = "A", value_parser = parse_qtype)]
    qtype: QueryType,

    /// Upstream nameserver to query, as `host:port`
    #[arg(short, long, default_value = "8.8.8.8:53")]
    server: SocketAddrV4,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let question = Question {
        qname: args.domain,
        qtype: args.qtype,
        qclass: QueryClass::Record(RecordClass::IN),
    };

    println!(";; QUESTION");
    println!("{question}");

    let config = ResolverConfig::new(vec![args.server]);
    let context = ResolverContext::new(config, SharedCache::new());

    let response = request::resolve_question(question, context).await;
    let rcode = response.header.rcode_or_server_failure();

    println!("\n;; status: {rcode}");
    print_section("ANSWER", &response.answers);
    print_section("AUTHORITY", &response.authority);
    print_section("ADDITIONAL", &response.additional);

    if rcode != Rcode::NoError {
        process::exit(1);
    }
}
