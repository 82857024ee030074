use dns_types::protocol::types::*;

fn name(labels: &[&str]) -> Name {
    Name::from_labels(
        labels
            .iter()
            .map(|l| Label::try_from(l.as_bytes()).unwrap())
            .collect(),
    )
    .unwrap()
}

fn question(qname: Name, qtype: QueryType, qclass: QueryClass) -> Question {
    Question {
        qname,
        qtype,
        qclass,
    }
}

fn base_header(id: u16, rcode: Rcode) -> Header {
    Header {
        id,
        is_response: true,
        opcode: Opcode::Standard,
        is_authoritative: false,
        is_truncated: false,
        recursion_desired: false,
        recursion_available: true,
        rcode: Some(rcode),
        qdcount: 0,
        ancount: 0,
        nscount: 0,
        arcount: 0,
    }
}

/// Scenario 1: a simple A-record query round-trips through
/// `fix_metadata`, `to_octets`, and `from_octets` unchanged.
#[test]
fn simple_a_record_roundtrip() {
    let mut msg = Message {
        header: Header {
            id: 123,
            is_response: false,
            opcode: Opcode::Standard,
            is_authoritative: false,
            is_truncated: false,
            recursion_desired: false,
            recursion_available: false,
            rcode: Some(Rcode::NoError),
            qdcount: 0,
            ancount: 0,
            nscount: 0,
            arcount: 0,
        },
        questions: vec![question(
            name(&["example", "com"]),
            QueryType::Record(RecordType::A),
            QueryClass::Record(RecordClass::IN),
        )],
        answers: vec![],
        authority: vec![],
        additional: vec![Resource {
            name: name(&["example", "com"]),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::CNAME {
                cname: name(&["example2", "com"]),
            },
        }],
    };

    msg.fix_metadata();
    let fixed = msg.clone();
    let octets = msg.to_octets().unwrap();
    let decoded = Message::from_octets(&octets).unwrap();

    assert_eq!(decoded, fixed);
}

/// Scenario 2: compressed question decoding. A datagram with three
/// questions, the second and third pointing back into the first
/// question's name via compression pointers.
#[test]
fn compressed_question_decoding() {
    let mut buffer = dns_types::protocol::serialise::WritableBuffer::default();
    // header: id=1, qdcount=3, all other counts 0
    buffer.write_u16(1);
    buffer.write_u8(0); // flags1
    buffer.write_u8(0); // flags2
    buffer.write_u16(3);
    buffer.write_u16(0);
    buffer.write_u16(0);
    buffer.write_u16(0);

    // question 1: test.myapp.com
    let q1_offset = buffer.index();
    for label in ["test", "myapp", "com"] {
        buffer.write_u8(label.len() as u8);
        buffer.write_octets(label.as_bytes());
    }
    buffer.write_u8(0);
    buffer.write_u16(u16::from(QueryType::Record(RecordType::A)));
    buffer.write_u16(u16::from(QueryClass::Record(RecordClass::IN)));

    // "myapp.com" starts 5 bytes into question 1 (skip the "test" label: 1+4)
    let myapp_offset = q1_offset + 5;

    // question 2: subdomain.<pointer to myapp.com>
    buffer.write_u8("subdomain".len() as u8);
    buffer.write_octets(b"subdomain");
    buffer.write_u16(0b1100_0000_0000_0000 | myapp_offset as u16);
    buffer.write_u16(u16::from(QueryType::Record(RecordType::A)));
    buffer.write_u16(u16::from(QueryClass::Record(RecordClass::IN)));

    // question 3: other.<pointer to myapp.com>
    buffer.write_u8("other".len() as u8);
    buffer.write_octets(b"other");
    buffer.write_u16(0b1100_0000_0000_0000 | myapp_offset as u16);
    buffer.write_u16(u16::from(QueryType::Record(RecordType::A)));
    buffer.write_u16(u16::from(QueryClass::Record(RecordClass::IN)));

    let octets = buffer.into_octets();
    let decoded = Message::from_octets(&octets).unwrap();

    assert_eq!(decoded.questions.len(), 3);
    assert_eq!(decoded.questions[0].qname, name(&["test", "myapp", "com"]));
    assert_eq!(
        decoded.questions[1].qname,
        name(&["subdomain", "test", "myapp", "com"])
    );
    assert_eq!(decoded.questions[2].qname, name(&["other", "myapp", "com"]));
}

/// Scenario 3: a response containing one record of every implemented
/// type round-trips through `fix_metadata`.
#[test]
fn all_record_types_roundtrip() {
    let owner = name(&["example", "com"]);
    let answers = vec![
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::A {
                address: "1.2.3.4".to_string(),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::NS {
                nsdname: name(&["ns1", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::CNAME {
                cname: name(&["example2", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::SOA {
                mname: name(&["ns1", "example", "com"]),
                rname: name(&["hostmaster", "example", "com"]),
                serial: 2024010100,
                refresh: 3600,
                retry: 600,
                expire: 604_800,
                minimum: 60,
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MX {
                preference: 10,
                exchange: name(&["mail", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::TXT {
                strings: vec![
                    Charstring::try_from(b"v=spf1".as_slice()).unwrap(),
                    Charstring::try_from(b"more text".as_slice()).unwrap(),
                ],
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::HINFO {
                cpu: Charstring::try_from(b"amd64".as_slice()).unwrap(),
                os: Charstring::try_from(b"linux".as_slice()).unwrap(),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MINFO {
                rmailbx: name(&["admin", "example", "com"]),
                emailbx: name(&["errors", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MB {
                madname: name(&["mb", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MD {
                madname: name(&["md", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MF {
                madname: name(&["mf", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MG {
                mdmname: name(&["mg", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::MR {
                newname: name(&["mr", "example", "com"]),
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::WKS {
                address: "1.2.3.4".to_string(),
                protocol: 6,
                bitmap: vec![0b1110_0000],
            },
        },
        Resource {
            name: owner.clone(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::PTR {
                ptrdname: name(&["ptr", "example", "com"]),
            },
        },
    ];

    let mut msg = Message {
        header: base_header(1, Rcode::NoError),
        questions: vec![],
        answers,
        authority: vec![],
        additional: vec![],
    };
    msg.fix_metadata();
    let fixed = msg.clone();

    let octets = msg.to_octets().unwrap();
    let decoded = Message::from_octets(&octets).unwrap();

    assert_eq!(decoded, fixed);
}

/// Scenario 4: a message with an empty (root) qname/name round-trips.
#[test]
fn empty_qname_roundtrip() {
    let mut msg = Message {
        header: base_header(1, Rcode::NoError),
        questions: vec![question(
            Name::root(),
            QueryType::Record(RecordType::CNAME),
            QueryClass::Record(RecordClass::IN),
        )],
        answers: vec![Resource {
            name: Name::root(),
            rclass: RecordClass::IN,
            ttl: 120,
            rdlength: 0,
            rdata: RecordData::CNAME {
                cname: name(&["example", "com"]),
            },
        }],
        authority: vec![],
        additional: vec![],
    };
    msg.fix_metadata();
    let fixed = msg.clone();

    let octets = msg.to_octets().unwrap();
    let decoded = Message::from_octets(&octets).unwrap();

    assert_eq!(decoded, fixed);
}

#[test]
fn fix_metadata_is_idempotent() {
    let mut msg = Message {
        header: base_header(1, Rcode::NoError),
        questions: vec![question(
            name(&["example", "com"]),
            QueryType::Record(RecordType::A),
            QueryClass::Record(RecordClass::IN),
        )],
        answers: vec![Resource {
            name: name(&["example", "com"]),
            rclass: RecordClass::IN,
            ttl: 60,
            rdlength: 9999, // deliberately wrong; fix_metadata should correct it
            rdata: RecordData::A {
                address: "10.0.0.1".to_string(),
            },
        }],
        authority: vec![],
        additional: vec![],
    };

    msg.fix_metadata();
    let once = msg.clone();
    msg.fix_metadata();

    assert_eq!(msg, once);
    assert_eq!(msg.answers[0].rdlength, 4);
    assert_eq!(msg.header.ancount, 1);
}

#[test]
fn a_record_rejects_ipv6_length_rdata() {
    use dns_types::protocol::deserialise::{ConsumableBuffer, DecodeError};

    let mut buffer = dns_types::protocol::serialise::WritableBuffer::default();
    buffer.write_u16(7); // id
    buffer.write_u8(0b1000_0000); // qr=1 (response)
    buffer.write_u8(0);
    buffer.write_u16(0);
    buffer.write_u16(1); // ancount
    buffer.write_u16(0);
    buffer.write_u16(0);

    // answer: owner = root, type A, class IN, ttl, rdlength 16
    buffer.write_u8(0);
    buffer.write_u16(u16::from(RecordType::A));
    buffer.write_u16(u16::from(RecordClass::IN));
    buffer.write_u32(60);
    buffer.write_u16(16);
    buffer.write_octets(&[0u8; 16]);

    let octets = buffer.into_octets();
    let err = Message::from_octets(&octets).unwrap_err();
    assert_eq!(err, DecodeError::AUnexpectedIpv6(7));
    // exercise the cursor helper directly too
    let _ = ConsumableBuffer::new(&octets);
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut msg = Message {
        header: base_header(1, Rcode::NoError),
        questions: vec![],
        answers: vec![],
        authority: vec![],
        additional: vec![],
    };
    msg.fix_metadata();
    let mut octets = msg.to_octets().unwrap();
    octets.push(0xFF);

    assert!(matches!(
        Message::from_octets(&octets),
        Err(dns_types::protocol::deserialise::DecodeError::TrailingBytes(1))
    ));
}

#[test]
fn pointer_loop_is_rejected() {
    use dns_types::protocol::deserialise::DecodeError;

    // A name that points forward to itself is invalid regardless of
    // depth, since the pointer doesn't target an earlier offset.
    let mut buffer = dns_types::protocol::serialise::WritableBuffer::default();
    buffer.write_u16(9); // id
    buffer.write_u8(0);
    buffer.write_u8(0);
    buffer.write_u16(1); // qdcount
    buffer.write_u16(0);
    buffer.write_u16(0);
    buffer.write_u16(0);

    let name_offset = buffer.index();
    buffer.write_u16(0b1100_0000_0000_0000 | name_offset as u16);
    buffer.write_u16(1);
    buffer.write_u16(1);

    let octets = buffer.into_octets();
    assert_eq!(
        Message::from_octets(&octets),
        Err(DecodeError::PointerInvalid(9))
    );
}
