//! The Request façade: the entry point for one inbound query over
//! either transport. Parses bytes into a [`Message`], spawns a
//! Processor, waits (with a bound) for its reply, and re-serialises
//! the reply for the transport it arrived on.

use tokio::sync::oneshot;

use dns_types::protocol::serialise::EncodeError;
use dns_types::protocol::types::{Header, Message, Opcode, Question, Rcode};

use crate::context::ResolverContext;
use crate::processor;

/// Parses, resolves, and re-serialises one query received over UDP.
///
/// If the serialised reply would exceed `context.config.udp_truncate_length`
/// octets, an empty, truncated (`TC=1`) message is returned instead -
/// the caller is expected to retry over TCP to get the full answer.
/// The comparison is against the reply's actual encoded byte length,
/// not any string- or label-count-based proxy for it.
pub async fn handle_udp_query(bytes: &[u8], context: ResolverContext) -> Vec<u8> {
    let reply = resolve(bytes, context.clone()).await;
    match reply.to_octets() {
        Ok(octets) if octets.len() <= context.config.udp_truncate_length => octets,
        Ok(_) => truncated(&reply).unwrap_or_else(|_| server_failure_octets(reply.header.id)),
        Err(_) => server_failure_octets(reply.header.id),
    }
}

/// Parses, resolves, and re-serialises one query received over TCP.
/// TCP has no length limit worth truncating at; the two-byte length
/// prefix required by RFC 1035 §4.2.2 is the caller's concern (see
/// [`crate::net::send_tcp_bytes`]), not this function's.
pub async fn handle_tcp_query(bytes: &[u8], context: ResolverContext) -> Vec<u8> {
    let reply = resolve(bytes, context).await;
    reply
        .to_octets()
        .unwrap_or_else(|_| server_failure_octets(reply.header.id))
}

/// Resolve a single question directly, bypassing the wire entirely.
/// Used by debugging tools that want an answer without standing up a
/// socket.
pub async fn resolve_question(question: Question, context: ResolverContext) -> Message {
    let query = Message {
        header: Header {
            id: 0,
            is_response: false,
            opcode: Opcode::Standard,
            is_authoritative: false,
            is_truncated: false,
            recursion_desired: true,
            recursion_available: false,
            rcode: None,
            qdcount: 1,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        },
        questions: vec![question],
        answers: Vec::new(),
        authority: Vec::new(),
        additional: Vec::new(),
    };

    resolve_message(query, context).await
}

async fn resolve(bytes: &[u8], context: ResolverContext) -> Message {
    let request = match Message::from_octets(bytes) {
        Ok(request) => request,
        Err(error) => return Message::format_error_response(error.id().unwrap_or(0)),
    };
    resolve_message(request, context).await
}

async fn resolve_message(request: Message, context: ResolverContext) -> Message {
    let id = request.header.id;
    let (tx, rx) = oneshot::channel();
    let handle = processor::spawn(request, context.clone(), tx);

    match tokio::time::timeout(context.config.query_timeout, rx).await {
        // the Processor answered in time.
        Ok(Ok(reply)) => reply,
        // the Processor's sender was dropped without a reply, which
        // should only happen if it panicked.
        Ok(Err(_)) => server_failure(id),
        // the Processor is still working; it and everything it spawned
        // (its Delegator, and that Delegator's Client tasks) are
        // abandoned here rather than left to leak. This is the fix for
        // the unbounded wait a Processor with no upstream answer would
        // otherwise impose on its caller.
        Err(_) => {
            handle.abort();
            server_failure(id)
        }
    }
}

fn server_failure(id: u16) -> Message {
    let mut reply = Message::format_error_response(id);
    reply.header.rcode = Some(Rcode::ServerFailure);
    reply
}

fn server_failure_octets(id: u16) -> Vec<u8> {
    server_failure(id)
        .to_octets()
        .expect("a format-error response always serialises")
}

/// Rebuilds `reply` as an empty-sections, `TC=1` message with the same
/// id/opcode/rcode, then serialises it. This is the fix for the
/// original truncation approach of slicing raw bytes and flipping the
/// TC bit in place, which could leave a record half-written on the
/// wire: an empty, flagged message is always well-formed, and a
/// client that honours TC will simply retry over TCP.
fn truncated(reply: &Message) -> Result<Vec<u8>, EncodeError> {
    let mut empty = reply.clone();
    empty.questions.clear();
    empty.answers.clear();
    empty.authority.clear();
    empty.additional.clear();
    empty.header.is_truncated = true;
    empty.fix_metadata();
    empty.to_octets()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::cache::SharedCache;
    use crate::context::ResolverConfig;
    use dns_types::protocol::types::{Label, Name, QueryClass, QueryType, RecordClass, RecordData};

    fn context() -> ResolverContext {
        ResolverContext::new(ResolverConfig::new(Vec::new()), SharedCache::new())
    }

    fn name(labels: &[&str]) -> Name {
        Name::from_labels(
            labels
                .iter()
                .map(|l| Label::try_from(l.as_bytes()).unwrap())
                .collect(),
        )
        .unwrap()
    }

    /// Scenario 6: a reply whose encoded form exceeds the configured
    /// UDP truncate length comes back as a 12-byte header with TC=1
    /// and every count zeroed, not a half-written record.
    #[tokio::test]
    async fn oversized_udp_reply_is_truncated_to_bare_header() {
        let context = context();
        context.cache.store(
            Instant::now(),
            &dns_types::protocol::types::Resource {
                name: name(&["example", "com"]),
                rclass: RecordClass::IN,
                ttl: 120,
                rdlength: 0,
                rdata: RecordData::TXT {
                    strings: vec![dns_types::protocol::types::Charstring::try_from(
                        vec![b'x'; 255].as_slice(),
                    )
                    .unwrap()],
                },
            },
        );

        // Force a reply large enough to exceed the default 512 octet
        // limit by asking for a great many distinct questions, each of
        // which the cache will answer with an oversized TXT record.
        let mut query = Message {
            header: Header {
                id: 7,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                rcode: None,
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        for _ in 0..5 {
            query.questions.push(Question {
                qname: name(&["example", "com"]),
                qtype: QueryType::Record(dns_types::protocol::types::RecordType::TXT),
                qclass: QueryClass::Record(RecordClass::IN),
            });
        }
        query.fix_metadata();
        let bytes = query.to_octets().unwrap();

        let reply_bytes = handle_udp_query(&bytes, context).await;
        let reply = Message::from_octets(&reply_bytes).unwrap();

        assert_eq!(reply_bytes.len(), 12);
        assert!(reply.header.is_truncated);
        assert_eq!(reply.header.qdcount, 0);
        assert_eq!(reply.header.ancount, 0);
        assert!(reply.questions.is_empty());
        assert!(reply.answers.is_empty());
    }

    #[tokio::test]
    async fn small_udp_reply_is_not_truncated() {
        let context = context();
        let question = Question {
            qname: name(&["example", "com"]),
            qtype: QueryType::Record(dns_types::protocol::types::RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        };
        let reply = resolve_question(question, context).await;
        // no upstreams configured and nothing cached: the reply is a
        // tiny server_failure, nowhere near the truncation threshold.
        assert_eq!(reply.header.rcode, Some(Rcode::ServerFailure));
    }

    #[tokio::test]
    async fn not_implemented_opcode_skips_straight_to_reply() {
        let context = context();
        let mut query = Message {
            header: Header {
                id: 99,
                is_response: false,
                opcode: Opcode::Status,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: false,
                rcode: None,
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        query.fix_metadata();
        let bytes = query.to_octets().unwrap();

        let reply_bytes = handle_tcp_query(&bytes, context).await;
        let reply = Message::from_octets(&reply_bytes).unwrap();
        assert_eq!(reply.header.rcode, Some(Rcode::NotImplemented));
    }
}
