//! The Processor: decides how to answer one query, either straight
//! from the cache or by delegating to the configured upstreams, and
//! replies to its parent Request exactly once.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use dns_types::protocol::types::*;

use crate::context::ResolverContext;
use crate::delegator;

/// Spawn a Processor for `request`, replying on `reply_to` exactly
/// once. Returns the task's `JoinHandle` so the caller (the Request
/// façade) can abort it if it gives up waiting on the reply.
pub fn spawn(
    request: Message,
    context: ResolverContext,
    reply_to: oneshot::Sender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(run(request, context, reply_to))
}

async fn run(request: Message, context: ResolverContext, reply_to: oneshot::Sender<Message>) {
    let started_at = Instant::now();
    let id = request.header.id;
    let mut response = request.start_response();
    response.questions = request.questions.clone();

    if !preprocess(&request, &mut response) {
        tracing::debug!(id, "not implemented");
        finish(&context, started_at, response, reply_to);
        return;
    }

    if answer_from_cache(&context, started_at, &request, &mut response) {
        finish(&context, started_at, response, reply_to);
        return;
    }

    delegate(&request, &context, &mut response).await;
    finish(&context, started_at, response, reply_to);
}

/// Rejects opcodes, questions, and inbound records this resolver
/// doesn't implement. Returns `false` (and leaves a `NotImplemented`
/// rcode behind) if the request should go straight to reply without
/// being looked up or delegated.
fn preprocess(request: &Message, response: &mut Message) -> bool {
    if !matches!(request.header.opcode, Opcode::Standard) {
        response.header.rcode = Some(Rcode::NotImplemented);
        return false;
    }
    if request.questions.iter().any(Question::is_not_implemented) {
        response.header.rcode = Some(Rcode::NotImplemented);
        return false;
    }
    if request
        .answers
        .iter()
        .chain(&request.authority)
        .chain(&request.additional)
        .any(Resource::is_not_implemented)
    {
        response.header.rcode = Some(Rcode::NotImplemented);
        return false;
    }
    true
}

/// Looks every question up in the cache, appending whatever is found.
/// Returns `true` (and sets `NoError`) only if every question in the
/// request got at least one hit.
fn answer_from_cache(
    context: &ResolverContext,
    now: Instant,
    request: &Message,
    response: &mut Message,
) -> bool {
    if request.questions.is_empty() {
        return false;
    }

    let mut answered_all = true;
    for question in &request.questions {
        let hits = context.cache.lookup(now, question);
        if hits.is_empty() {
            tracing::debug!(%question.qname, "cache miss");
            answered_all = false;
        } else {
            tracing::debug!(%question.qname, hits = hits.len(), "cache hit");
            response.answers.extend(hits);
        }
    }

    if answered_all {
        response.header.rcode = Some(Rcode::NoError);
    }
    answered_all
}

/// Spawns a Delegator and folds whatever it hears back from upstream
/// nameservers into `response`, stopping as soon as one delegate
/// answers `NoError` - the first upstream to do so wins, whether or
/// not it actually carried an answer record for every question (a
/// NOERROR/NODATA reply, e.g. an A query against a TXT-only name, is
/// still a usable answer). Leaves `response.header.rcode` at `None` if
/// every delegate comes back non-`NoError` (or none answer at all);
/// `finish` treats that as a server failure.
async fn delegate(request: &Message, context: &ResolverContext, response: &mut Message) {
    let mailbox_capacity = context.config.foreign_name_servers.len().max(1);
    let (tx, mut rx) = mpsc::channel(mailbox_capacity);
    let handle = delegator::spawn(request.clone(), context.config.clone(), tx);

    while let Some(delegate_response) = rx.recv().await {
        if apply_delegate_reply(response, &delegate_response) {
            tracing::debug!("delegate answered noerror");
            break;
        }
        tracing::debug!(
            rcode = %delegate_response.header.rcode_or_server_failure(),
            "delegate reply not usable"
        );
    }

    handle.abort();
}

/// Folds one delegate reply into `response` if it is usable. Returns
/// `true` (and sets `response.header.rcode = NoError`) the moment a
/// delegate answers `NoError`, whether or not it carried an answer
/// record for every question - a NOERROR/NODATA reply (e.g. an A query
/// against a TXT-only name) is a settled answer, not a miss to keep
/// waiting past. Returns `false` without touching `response` for any
/// other rcode.
fn apply_delegate_reply(response: &mut Message, delegate_response: &Message) -> bool {
    if delegate_response.header.rcode_or_server_failure() != Rcode::NoError {
        return false;
    }

    merge_section(&mut response.answers, &delegate_response.answers);
    merge_section(&mut response.authority, &delegate_response.authority);
    merge_section(&mut response.additional, &delegate_response.additional);
    response.header.rcode = Some(Rcode::NoError);
    true
}

/// Appends whatever isn't already present (by `(class, type, name,
/// rdata)`) from `from` into `into`, dropping records this resolver
/// doesn't interpret.
fn merge_section(into: &mut Vec<Resource>, from: &[Resource]) {
    for rr in from {
        if rr.is_not_implemented() {
            continue;
        }
        if !into.iter().any(|existing| existing.cache_key() == rr.cache_key()) {
            into.push(rr.clone());
        }
    }
}

fn finish(
    context: &ResolverContext,
    started_at: Instant,
    mut response: Message,
    reply_to: oneshot::Sender<Message>,
) {
    if response.header.rcode.is_none() {
        response.header.rcode = Some(Rcode::ServerFailure);
    }
    response.fix_metadata();

    for rr in &response.answers {
        context.cache.store(started_at, rr);
    }

    tracing::info!(
        id = response.header.id,
        rcode = %response.header.rcode_or_server_failure(),
        answers = response.answers.len(),
        elapsed_us = started_at.elapsed().as_micros() as u64,
        "replying"
    );

    // the Request façade may have given up and dropped its end; that
    // isn't this task's problem to handle.
    let _ = reply_to.send(response);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SharedCache;
    use crate::context::ResolverConfig;

    fn name(labels: &[&str]) -> Name {
        Name::from_labels(
            labels
                .iter()
                .map(|l| Label::try_from(l.as_bytes()).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn question(qname: Name) -> Question {
        Question {
            qname,
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    fn a_resource(owner: Name, ttl: i32, address: &str) -> Resource {
        Resource {
            name: owner,
            rclass: RecordClass::IN,
            ttl,
            rdlength: 0,
            rdata: RecordData::A {
                address: address.to_string(),
            },
        }
    }

    fn blank_query(questions: Vec<Question>) -> Message {
        Message {
            header: Header {
                id: 42,
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
            questions,
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    fn context() -> ResolverContext {
        ResolverContext::new(ResolverConfig::new(Vec::new()), SharedCache::new())
    }

    #[test]
    fn preprocess_rejects_non_standard_opcode() {
        let mut request = blank_query(vec![question(name(&["example", "com"]))]);
        request.header.opcode = Opcode::Status;
        let mut response = request.start_response();

        assert!(!preprocess(&request, &mut response));
        assert_eq!(response.header.rcode, Some(Rcode::NotImplemented));
    }

    #[test]
    fn preprocess_rejects_unknown_query_type() {
        let mut question = question(name(&["example", "com"]));
        question.qtype = QueryType::Record(RecordType::Unknown(65000));
        let request = blank_query(vec![question]);
        let mut response = request.start_response();

        assert!(!preprocess(&request, &mut response));
        assert_eq!(response.header.rcode, Some(Rcode::NotImplemented));
    }

    #[test]
    fn preprocess_rejects_inbound_not_implemented_record() {
        let mut request = blank_query(vec![question(name(&["example", "com"]))]);
        request.additional.push(Resource {
            name: name(&["example", "com"]),
            rclass: RecordClass::IN,
            ttl: 60,
            rdlength: 0,
            rdata: RecordData::Unknown {
                rtype: 65000,
                octets: vec![1, 2, 3],
            },
        });
        let mut response = request.start_response();

        assert!(!preprocess(&request, &mut response));
        assert_eq!(response.header.rcode, Some(Rcode::NotImplemented));
    }

    #[test]
    fn preprocess_accepts_a_standard_question() {
        let request = blank_query(vec![question(name(&["example", "com"]))]);
        let mut response = request.start_response();

        assert!(preprocess(&request, &mut response));
        assert_eq!(response.header.rcode, None);
    }

    #[test]
    fn answer_from_cache_requires_every_question_to_hit() {
        let context = context();
        let t0 = Instant::now();
        context.cache.store(t0, &a_resource(name(&["a", "com"]), 60, "1.1.1.1"));

        let request = blank_query(vec![
            question(name(&["a", "com"])),
            question(name(&["b", "com"])),
        ]);
        let mut response = request.start_response();

        assert!(!answer_from_cache(&context, t0, &request, &mut response));
        assert_eq!(response.header.rcode, None);
        assert_eq!(response.answers.len(), 1);
    }

    #[test]
    fn answer_from_cache_succeeds_when_everything_hits() {
        let context = context();
        let t0 = Instant::now();
        context.cache.store(t0, &a_resource(name(&["a", "com"]), 60, "1.1.1.1"));

        let request = blank_query(vec![question(name(&["a", "com"]))]);
        let mut response = request.start_response();

        assert!(answer_from_cache(&context, t0, &request, &mut response));
        assert_eq!(response.header.rcode, Some(Rcode::NoError));
    }

    #[test]
    fn merge_section_dedupes_and_drops_not_implemented() {
        let mut into = vec![a_resource(name(&["a", "com"]), 60, "1.1.1.1")];
        let from = vec![
            a_resource(name(&["a", "com"]), 60, "1.1.1.1"),
            a_resource(name(&["a", "com"]), 60, "2.2.2.2"),
            Resource {
                name: name(&["a", "com"]),
                rclass: RecordClass::IN,
                ttl: 60,
                rdlength: 0,
                rdata: RecordData::Unknown {
                    rtype: 9999,
                    octets: vec![1, 2, 3],
                },
            },
        ];

        merge_section(&mut into, &from);

        assert_eq!(into.len(), 2);
    }

    #[test]
    fn apply_delegate_reply_ignores_non_noerror() {
        let request = blank_query(vec![question(name(&["a", "com"]))]);
        let mut response = request.start_response();
        let mut delegate_response = request.start_response();
        delegate_response.header.rcode = Some(Rcode::ServerFailure);

        assert!(!apply_delegate_reply(&mut response, &delegate_response));
        assert_eq!(response.header.rcode, None);
        assert!(response.answers.is_empty());
    }

    /// A NOERROR/NODATA delegate reply (e.g. an A query against a
    /// TXT-only name: the name exists, there's just no record of the
    /// requested type) is a settled answer, not a miss to keep
    /// awaiting other upstreams past.
    #[test]
    fn apply_delegate_reply_accepts_noerror_with_no_answers() {
        let request = blank_query(vec![question(name(&["a", "com"]))]);
        let mut response = request.start_response();

        let mut delegate_response = request.start_response();
        delegate_response.header.rcode = Some(Rcode::NoError);
        delegate_response.authority.push(Resource {
            name: name(&["com"]),
            rclass: RecordClass::IN,
            ttl: 60,
            rdlength: 0,
            rdata: RecordData::SOA {
                mname: name(&["ns1", "com"]),
                rname: name(&["hostmaster", "com"]),
                serial: 1,
                refresh: 3600,
                retry: 600,
                expire: 604_800,
                minimum: 60,
            },
        });

        assert!(apply_delegate_reply(&mut response, &delegate_response));
        assert_eq!(response.header.rcode, Some(Rcode::NoError));
        assert!(response.answers.is_empty());
        assert_eq!(response.authority.len(), 1);
    }
}
