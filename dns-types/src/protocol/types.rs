//! Basic DNS message format, used for both queries and responses.  See
//! section 4 of RFC 1035.

use std::fmt;

/// Labels are 1 to 63 octets.
pub const LABEL_MAX_LEN: usize = 63;

/// A name is at most 255 octets on the wire, including every length
/// octet and the terminating zero.
pub const NAME_MAX_LEN: usize = 255;

/// How many compression pointers a single name may follow before
/// decoding gives up.  RFC 1035 doesn't specify a number; this is
/// generous enough for any legitimate message and small enough that a
/// malicious pointer chain can't make decoding expensive.
pub const POINTER_DEPTH_LIMIT: usize = 16;

/// A DNS message: the unit of exchange between client and server, and
/// between this resolver and the upstream nameservers it delegates
/// to.
///
/// ```text
///     +---------------------+
///     |        Header       |
///     +---------------------+
///     |       Question      | the question for the name server
///     +---------------------+
///     |        Answer       | RRs answering the question
///     +---------------------+
///     |      Authority      | RRs pointing toward an authority
///     +---------------------+
///     |      Additional     | RRs holding additional information
///     +---------------------+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Resource>,
    pub authority: Vec<Resource>,
    pub additional: Vec<Resource>,
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Message {
    // a plain derive would pick `header.{qd,an,ns,ar}count` and every
    // resource's `rdlength` independently of the sections/rdata they
    // describe; `fix_metadata` brings them back in line so the result
    // round-trips through serialise/deserialise.
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut message = Message {
            header: u.arbitrary()?,
            questions: u.arbitrary()?,
            answers: u.arbitrary()?,
            authority: u.arbitrary()?,
            additional: u.arbitrary()?,
        };
        message.fix_metadata();
        Ok(message)
    }
}

impl Message {
    /// Build the shell of a response to this (presumed query)
    /// message: the id, opcode and recursion-desired bit are copied
    /// over, and the rcode is left undecided.
    pub fn start_response(&self) -> Self {
        Self {
            header: Header {
                id: self.header.id,
                is_response: true,
                opcode: self.header.opcode,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: self.header.recursion_desired,
                recursion_available: true,
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
        }
    }

    pub fn format_error_response(id: u16) -> Self {
        Self {
            header: Header {
                id,
                is_response: true,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: false,
                recursion_available: true,
                rcode: Some(Rcode::FormatError),
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
            },
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Recompute `qdcount`/`ancount`/`nscount`/`arcount` from the
    /// current section lengths, and every resource's `rdlength` from
    /// its current rdata. Idempotent.
    pub fn fix_metadata(&mut self) {
        self.header.qdcount = self.questions.len() as u16;
        self.header.ancount = self.answers.len() as u16;
        self.header.nscount = self.authority.len() as u16;
        self.header.arcount = self.additional.len() as u16;
        for rr in self
            .answers
            .iter_mut()
            .chain(self.authority.iter_mut())
            .chain(self.additional.iter_mut())
        {
            rr.fix_rdlength();
        }
    }
}

/// Common header type for all messages.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Header {
    /// Copied from query to response, otherwise chosen by the
    /// querier.
    pub id: u16,

    /// `false` for a query, `true` for a response.
    pub is_response: bool,

    pub opcode: Opcode,

    /// Valid in responses only: the responding server is an
    /// authority for the queried name. Always `false` here: this
    /// resolver is never authoritative.
    pub is_authoritative: bool,

    /// The message didn't fit in the transport and was truncated;
    /// retry over TCP.
    pub is_truncated: bool,

    /// Set in a query, copied to the response: ask the server to
    /// pursue the query recursively.
    pub recursion_desired: bool,

    /// Set in a response: recursive query support is available.
    pub recursion_available: bool,

    /// `None` only while a response is still being assembled; it is
    /// never serialised in that state (see [`Header::rcode_or_server_failure`]).
    pub rcode: Option<Rcode>,

    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Header {
    // a plain derive can set `rcode` to `None`, but serialising always
    // writes `rcode_or_server_failure()` and deserialising always reads
    // back `Some`, so a `None` header never round-trips.
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Header {
            id: u.arbitrary()?,
            is_response: u.arbitrary()?,
            opcode: u.arbitrary()?,
            is_authoritative: u.arbitrary()?,
            is_truncated: u.arbitrary()?,
            recursion_desired: u.arbitrary()?,
            recursion_available: u.arbitrary()?,
            rcode: Some(u.arbitrary()?),
            qdcount: u.arbitrary()?,
            ancount: u.arbitrary()?,
            nscount: u.arbitrary()?,
            arcount: u.arbitrary()?,
        })
    }
}

impl Header {
    /// The rcode to put on the wire. A `None` rcode at serialisation
    /// time means a response was sent before its resolution finished
    /// deciding on a result; that should never happen, but if it does
    /// we fail safe rather than lie about success.
    pub fn rcode_or_server_failure(&self) -> Rcode {
        self.rcode.unwrap_or(Rcode::ServerFailure)
    }
}

/// A four bit field that specifies kind of query in this message.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub enum Opcode {
    /// `0`: a standard query (`QUERY`).
    Standard,
    /// `1`: an inverse query (`IQUERY`). Not implemented.
    Inverse,
    /// `2`: a server status request (`STATUS`). Not implemented.
    Status,
}

impl Opcode {
    /// `3..=15` are reserved and have no defined meaning; decoding one
    /// is a format error, not a silent default.
    pub fn from_u8(octet: u8) -> Result<Self, u8> {
        match octet & 0b0000_1111 {
            0 => Ok(Opcode::Standard),
            1 => Ok(Opcode::Inverse),
            2 => Ok(Opcode::Status),
            other => Err(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Opcode::Standard => write!(f, "QUERY"),
            Opcode::Inverse => write!(f, "IQUERY"),
            Opcode::Status => write!(f, "STATUS"),
        }
    }
}

/// Response code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
}

impl From<u8> for Rcode {
    /// Unrecognised values (including the `6..=15` reserved range)
    /// decode to `ServerFailure`: a defensive default rather than a
    /// parse error, since an rcode only ever appears in a response we
    /// didn't generate.
    fn from(octet: u8) -> Self {
        match octet & 0b0000_1111 {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            _ => Rcode::ServerFailure,
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
        }
    }
}

impl fmt::Display for Rcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Rcode::NoError => "NOERROR",
            Rcode::FormatError => "FORMERR",
            Rcode::ServerFailure => "SERVFAIL",
            Rcode::NameError => "NXDOMAIN",
            Rcode::NotImplemented => "NOTIMP",
            Rcode::Refused => "REFUSED",
        };
        write!(f, "{s}")
    }
}

/// The question section has a list of questions (usually one)
/// being asked.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                     QNAME                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QTYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     QCLASS                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Question {
    pub qname: Name,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl Question {
    /// Either field decoded to the NOT_IMPLEMENTED sentinel.
    pub fn is_not_implemented(&self) -> bool {
        self.qtype.is_not_implemented() || self.qclass.is_not_implemented()
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

/// The answer, authority, and additional sections are all the same
/// format: a variable number of these.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                                               |
///     /                      NAME                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TYPE                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                     CLASS                     |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      TTL                      |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                   RDLENGTH                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
///     /                     RDATA                     /
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct Resource {
    pub name: Name,
    pub rclass: RecordClass,
    /// Signed per the data model: negative values only appear
    /// transiently, as the result of TTL-aging arithmetic on a cache
    /// lookup (`eol - now`), never on the wire.
    pub ttl: i32,
    pub rdlength: u16,
    pub rdata: RecordData,
}

impl Resource {
    pub fn rtype(&self) -> RecordType {
        self.rdata.rtype()
    }

    pub fn is_not_implemented(&self) -> bool {
        self.rdata.is_not_implemented() || self.rclass.is_not_implemented()
    }

    pub fn matches(&self, question: &Question) -> bool {
        self.rtype().matches(&question.qtype) && self.rclass.matches(&question.qclass)
    }

    /// Recompute `rdlength` from the current rdata. Idempotent.
    pub fn fix_rdlength(&mut self) {
        self.rdlength = self.rdata.encoded_len();
    }

    /// The key a cache stores and looks this record up by:
    /// `(class, type, normalized name, rdata)`.
    pub fn cache_key(&self) -> (RecordClass, RecordType, Name, RecordData) {
        (
            self.rclass,
            self.rtype(),
            self.name.normalized(),
            self.rdata.clone(),
        )
    }
}

/// A record type with its associated, decoded, rdata. This is the
/// RDATA sum type: the wire `TYPE` field is entirely determined by
/// which variant is present, so it is never stored separately (see
/// [`Resource::rtype`]).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum RecordData {
    /// A host address. Stored as a dotted-quad string; IPv6 addresses
    /// are rejected rather than accepted under the `A` type.
    A { address: String },
    /// An authoritative name server.
    NS { nsdname: Name },
    /// A mail destination (obsolete, use MX).
    MD { madname: Name },
    /// A mail forwarder (obsolete, use MX).
    MF { madname: Name },
    /// The canonical name for an alias.
    CNAME { cname: Name },
    /// Marks the start of a zone of authority.
    SOA {
        mname: Name,
        rname: Name,
        serial: u32,
        refresh: i32,
        retry: i32,
        expire: i32,
        minimum: u32,
    },
    /// A mailbox domain name.
    MB { madname: Name },
    /// A mail group member.
    MG { mdmname: Name },
    /// A mail rename domain name.
    MR { newname: Name },
    /// Anything at all, up to 65535 octets; not interpreted.
    NULL { octets: Vec<u8> },
    /// A well known service description; the bitmap is not
    /// interpreted.
    WKS {
        address: String,
        protocol: u8,
        bitmap: Vec<u8>,
    },
    /// A domain name pointer.
    PTR { ptrdname: Name },
    /// Host information; neither field is interpreted.
    HINFO { cpu: Charstring, os: Charstring },
    /// Mailbox or mail list information.
    MINFO { rmailbx: Name, emailbx: Name },
    /// Mail exchange.
    MX { preference: u16, exchange: Name },
    /// Text strings.
    TXT { strings: Vec<Charstring> },
    /// A record type this resolver doesn't interpret the rdata of.
    /// The original `TYPE` value is kept so the record can still be
    /// forwarded/re-serialised unchanged.
    Unknown { rtype: u16, octets: Vec<u8> },
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A { .. } => RecordType::A,
            RecordData::NS { .. } => RecordType::NS,
            RecordData::MD { .. } => RecordType::MD,
            RecordData::MF { .. } => RecordType::MF,
            RecordData::CNAME { .. } => RecordType::CNAME,
            RecordData::SOA { .. } => RecordType::SOA,
            RecordData::MB { .. } => RecordType::MB,
            RecordData::MG { .. } => RecordType::MG,
            RecordData::MR { .. } => RecordType::MR,
            RecordData::NULL { .. } => RecordType::NULL,
            RecordData::WKS { .. } => RecordType::WKS,
            RecordData::PTR { .. } => RecordType::PTR,
            RecordData::HINFO { .. } => RecordType::HINFO,
            RecordData::MINFO { .. } => RecordType::MINFO,
            RecordData::MX { .. } => RecordType::MX,
            RecordData::TXT { .. } => RecordType::TXT,
            RecordData::Unknown { rtype, .. } => RecordType::Unknown(*rtype),
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, RecordData::Unknown { .. })
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordData {
    // a derive here would pick field types independently of the
    // `RecordType` they belong to - e.g. an `A` record whose address
    // is an arbitrary `String` rather than something that parses as a
    // dotted-quad, which `to_octets` would then reject. Building each
    // variant by hand keeps every generated value one this crate's own
    // encoder actually accepts.
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(match RecordType::from(u.arbitrary::<u16>()?) {
            RecordType::A => RecordData::A {
                address: arbitrary_ipv4(u)?,
            },
            RecordType::NS => RecordData::NS {
                nsdname: u.arbitrary()?,
            },
            RecordType::MD => RecordData::MD {
                madname: u.arbitrary()?,
            },
            RecordType::MF => RecordData::MF {
                madname: u.arbitrary()?,
            },
            RecordType::CNAME => RecordData::CNAME {
                cname: u.arbitrary()?,
            },
            RecordType::SOA => RecordData::SOA {
                mname: u.arbitrary()?,
                rname: u.arbitrary()?,
                serial: u.arbitrary()?,
                refresh: u.arbitrary()?,
                retry: u.arbitrary()?,
                expire: u.arbitrary()?,
                minimum: u.arbitrary()?,
            },
            RecordType::MB => RecordData::MB {
                madname: u.arbitrary()?,
            },
            RecordType::MG => RecordData::MG {
                mdmname: u.arbitrary()?,
            },
            RecordType::MR => RecordData::MR {
                newname: u.arbitrary()?,
            },
            RecordType::NULL => RecordData::NULL {
                octets: arbitrary_octets(u, 128)?,
            },
            RecordType::WKS => RecordData::WKS {
                address: arbitrary_ipv4(u)?,
                protocol: u.arbitrary()?,
                bitmap: arbitrary_octets(u, 32)?,
            },
            RecordType::PTR => RecordData::PTR {
                ptrdname: u.arbitrary()?,
            },
            RecordType::HINFO => RecordData::HINFO {
                cpu: u.arbitrary()?,
                os: u.arbitrary()?,
            },
            RecordType::MINFO => RecordData::MINFO {
                rmailbx: u.arbitrary()?,
                emailbx: u.arbitrary()?,
            },
            RecordType::MX => RecordData::MX {
                preference: u.arbitrary()?,
                exchange: u.arbitrary()?,
            },
            RecordType::TXT => {
                let count = u.int_in_range::<usize>(0..=4)?;
                let mut strings = Vec::with_capacity(count);
                for _ in 0..count {
                    strings.push(u.arbitrary()?);
                }
                RecordData::TXT { strings }
            }
            RecordType::Unknown(rtype) => RecordData::Unknown {
                rtype,
                octets: arbitrary_octets(u, 128)?,
            },
        })
    }
}

#[cfg(any(feature = "test-util", test))]
fn arbitrary_ipv4(u: &mut arbitrary::Unstructured) -> arbitrary::Result<String> {
    let octets: [u8; 4] = u.arbitrary()?;
    Ok(std::net::Ipv4Addr::from(octets).to_string())
}

#[cfg(any(feature = "test-util", test))]
fn arbitrary_octets(u: &mut arbitrary::Unstructured, max_len: usize) -> arbitrary::Result<Vec<u8>> {
    let len = u.int_in_range::<usize>(0..=max_len)?;
    Ok(u.bytes(len)?.to_vec())
}

/// A two octet code which specifies the type of a record.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    MD,
    MF,
    CNAME,
    SOA,
    MB,
    MG,
    MR,
    NULL,
    WKS,
    PTR,
    HINFO,
    MINFO,
    MX,
    TXT,
    /// Any type code this resolver has no variant for.
    Unknown(u16),
}

impl RecordType {
    pub fn is_unknown(&self) -> bool {
        matches!(self, RecordType::Unknown(_))
    }

    pub fn matches(&self, qtype: &QueryType) -> bool {
        match qtype {
            QueryType::Wildcard => true,
            QueryType::Record(rtype) => rtype == self,
            _ => false,
        }
    }
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            3 => RecordType::MD,
            4 => RecordType::MF,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            7 => RecordType::MB,
            8 => RecordType::MG,
            9 => RecordType::MR,
            10 => RecordType::NULL,
            11 => RecordType::WKS,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            14 => RecordType::MINFO,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::MD => 3,
            RecordType::MF => 4,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::MB => 7,
            RecordType::MG => 8,
            RecordType::MR => 9,
            RecordType::NULL => 10,
            RecordType::WKS => 11,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::MINFO => 14,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RecordType::A => "A",
            RecordType::NS => "NS",
            RecordType::MD => "MD",
            RecordType::MF => "MF",
            RecordType::CNAME => "CNAME",
            RecordType::SOA => "SOA",
            RecordType::MB => "MB",
            RecordType::MG => "MG",
            RecordType::MR => "MR",
            RecordType::NULL => "NULL",
            RecordType::WKS => "WKS",
            RecordType::PTR => "PTR",
            RecordType::HINFO => "HINFO",
            RecordType::MINFO => "MINFO",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::Unknown(value) => return write!(f, "UNKNOWN({value})"),
        };
        write!(f, "{name}")
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordType {
    // going through the canonical `From<u16>` (rather than deriving,
    // which would pick `Unknown`'s `u16` payload independently of the
    // other variants) guarantees every generated value is one a real
    // decode could actually produce for some wire byte.
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// A superset of [`RecordType`] valid in a question's `QTYPE` field.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum QueryType {
    Record(RecordType),
    /// `252`: a request for a zone transfer. Not implemented.
    AXFR,
    /// `253`: a request for mailbox-related records. Not implemented.
    MAILB,
    /// `254`: a request for mail agent records. Not implemented.
    MAILA,
    /// `255`: matches any type.
    Wildcard,
}

impl QueryType {
    pub fn is_not_implemented(&self) -> bool {
        match self {
            QueryType::Record(rtype) => rtype.is_unknown(),
            _ => false,
        }
    }
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            252 => QueryType::AXFR,
            253 => QueryType::MAILB,
            254 => QueryType::MAILA,
            255 => QueryType::Wildcard,
            _ => QueryType::Record(RecordType::from(value)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::AXFR => 252,
            QueryType::MAILB => 253,
            QueryType::MAILA => 254,
            QueryType::Wildcard => 255,
            QueryType::Record(rtype) => rtype.into(),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryType::Record(rtype) => write!(f, "{rtype}"),
            QueryType::AXFR => write!(f, "AXFR"),
            QueryType::MAILB => write!(f, "MAILB"),
            QueryType::MAILA => write!(f, "MAILA"),
            QueryType::Wildcard => write!(f, "*"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for QueryType {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// Two octets which specify the class of data in a resource's RDATA.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RecordClass {
    /// The Internet.
    IN,
    /// The CSNET class (obsolete).
    CS,
    /// The CHAOS class.
    CH,
    /// Hesiod.
    HS,
    Unknown(u16),
}

impl RecordClass {
    pub fn is_unknown(&self) -> bool {
        matches!(self, RecordClass::Unknown(_))
    }

    pub fn is_not_implemented(&self) -> bool {
        self.is_unknown()
    }

    pub fn matches(&self, qclass: &QueryClass) -> bool {
        match qclass {
            QueryClass::Wildcard => true,
            QueryClass::Record(rclass) => rclass == self,
        }
    }
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            2 => RecordClass::CS,
            3 => RecordClass::CH,
            4 => RecordClass::HS,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::CS => 2,
            RecordClass::CH => 3,
            RecordClass::HS => 4,
            RecordClass::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::CS => write!(f, "CS"),
            RecordClass::CH => write!(f, "CH"),
            RecordClass::HS => write!(f, "HS"),
            RecordClass::Unknown(value) => write!(f, "UNKNOWN({value})"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for RecordClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// A superset of [`RecordClass`] valid in a question's `QCLASS` field.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum QueryClass {
    Record(RecordClass),
    /// `255`: matches any class.
    Wildcard,
}

impl QueryClass {
    pub fn is_not_implemented(&self) -> bool {
        match self {
            QueryClass::Record(rclass) => rclass.is_not_implemented(),
            QueryClass::Wildcard => false,
        }
    }
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryClass::Wildcard,
            _ => QueryClass::Record(RecordClass::from(value)),
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(value: QueryClass) -> Self {
        match value {
            QueryClass::Wildcard => 255,
            QueryClass::Record(rclass) => rclass.into(),
        }
    }
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueryClass::Record(rclass) => write!(f, "{rclass}"),
            QueryClass::Wildcard => write!(f, "*"),
        }
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for QueryClass {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Self::from(u.arbitrary::<u16>()?))
    }
}

/// One component of a domain name: 1 to 63 octets, restricted on
/// output to `[A-Za-z0-9-]`. Case is preserved — normalisation for
/// cache lookups happens separately, in [`Name::normalized`].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Label(Vec<u8>);

impl Label {
    pub fn octets(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn is_valid_char(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'-'
    }

    fn to_lowercase(&self) -> Label {
        Label(self.0.to_ascii_lowercase())
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = NameError;

    fn try_from(octets: &[u8]) -> Result<Self, NameError> {
        if octets.len() > LABEL_MAX_LEN {
            return Err(NameError::LabelTooLong);
        }
        if !octets.iter().copied().all(Label::is_valid_char) {
            return Err(NameError::LabelInvalidCharacters);
        }
        Ok(Label(octets.to_vec()))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Label {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Label> {
        const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789-";
        let len = u.int_in_range::<usize>(1..=20)?;
        let mut octets = Vec::with_capacity(len);
        for _ in 0..len {
            let idx = u.int_in_range::<usize>(0..=ALPHABET.len() - 1)?;
            octets.push(ALPHABET[idx]);
        }
        Ok(Label(octets))
    }
}

/// Errors constructing a [`Label`] or [`Name`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NameError {
    LabelTooLong,
    LabelInvalidCharacters,
    NameTooLong,
}

/// An ordered sequence of labels. The root (empty) name is the empty
/// sequence, and serialises to a single zero octet.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Name {
    labels: Vec<Label>,
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Name {
    // a derive on the bare `Vec<Label>` field could produce enough
    // labels to push `wire_len` past `NAME_MAX_LEN`, which `from_labels`
    // would reject - capping the label count keeps every generated name
    // one this crate's own encoder actually accepts.
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let count = u.int_in_range::<usize>(0..=10)?;
        let mut labels = Vec::with_capacity(count);
        for _ in 0..count {
            labels.push(u.arbitrary()?);
        }
        Ok(Name { labels })
    }
}

impl Name {
    pub fn root() -> Self {
        Name { labels: Vec::new() }
    }

    pub fn from_labels(labels: Vec<Label>) -> Result<Self, NameError> {
        let name = Name { labels };
        if name.wire_len() > NAME_MAX_LEN {
            Err(NameError::NameTooLong)
        } else {
            Ok(name)
        }
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Total length on the wire: every label's length octet plus its
    /// bytes, plus the terminating zero octet.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// The key used to match names in the cache: every label
    /// lowercased. Does not affect the name's own representation.
    pub fn normalized(&self) -> Name {
        Name {
            labels: self.labels.iter().map(Label::to_lowercase).collect(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.labels.is_empty() {
            return write!(f, ".");
        }
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", String::from_utf8_lossy(label.octets()))?;
        }
        Ok(())
    }
}

/// A one-octet-length-prefixed byte string, 0 to 255 octets.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Charstring(pub(crate) Vec<u8>);

impl Charstring {
    pub fn octets(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<&[u8]> for Charstring {
    type Error = NameError;

    fn try_from(octets: &[u8]) -> Result<Self, NameError> {
        if octets.len() > 255 {
            // can't arise from the wire (the length octet is only 8
            // bits) but guards manual construction
            return Err(NameError::NameTooLong);
        }
        Ok(Charstring(octets.to_vec()))
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Charstring {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Charstring> {
        let len = u.int_in_range::<usize>(0..=30)?;
        let mut octets = Vec::with_capacity(len);
        for _ in 0..len {
            octets.push(u.arbitrary::<u8>()?);
        }
        Ok(Charstring(octets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_opcode_roundtrip() {
        for i in 0..3 {
            assert_eq!(u8::from(Opcode::from_u8(i).unwrap()), i);
        }
    }

    #[test]
    fn opcode_reserved_values_are_rejected() {
        for i in 3..16 {
            assert_eq!(Opcode::from_u8(i), Err(i));
        }
    }

    #[test]
    fn u8_rcode_roundtrip() {
        for i in 0..6 {
            assert_eq!(u8::from(Rcode::from(i)), i);
        }
    }

    #[test]
    fn rcode_reserved_values_default_to_server_failure() {
        for i in 6..16 {
            assert_eq!(Rcode::from(i), Rcode::ServerFailure);
        }
    }

    #[test]
    fn u16_recordtype_roundtrip() {
        for i in 1..=16 {
            assert_eq!(u16::from(RecordType::from(i)), i);
        }
    }

    #[test]
    fn recordtype_unknown_implies_querytype_not_implemented() {
        for i in 17..200 {
            assert!(RecordType::from(i).is_unknown());
            assert!(QueryType::from(i).is_not_implemented());
        }
    }

    #[test]
    fn querytype_special_values_are_not_records() {
        assert_eq!(QueryType::from(252), QueryType::AXFR);
        assert_eq!(QueryType::from(253), QueryType::MAILB);
        assert_eq!(QueryType::from(254), QueryType::MAILA);
        assert_eq!(QueryType::from(255), QueryType::Wildcard);
        assert!(!QueryType::AXFR.is_not_implemented());
    }

    #[test]
    fn queryclass_wildcard_matches_anything() {
        assert!(RecordClass::IN.matches(&QueryClass::Wildcard));
        assert!(RecordClass::Unknown(9999).matches(&QueryClass::Wildcard));
    }

    #[test]
    fn label_rejects_overlong_and_invalid_characters() {
        let long = vec![b'a'; LABEL_MAX_LEN + 1];
        assert_eq!(Label::try_from(long.as_slice()), Err(NameError::LabelTooLong));

        assert_eq!(
            Label::try_from(b"exa_mple".as_slice()),
            Err(NameError::LabelInvalidCharacters)
        );

        assert!(Label::try_from(b"example-123".as_slice()).is_ok());
    }

    #[test]
    fn root_name_is_empty() {
        let root = Name::root();
        assert!(root.is_root());
        assert_eq!(root.wire_len(), 1);
        assert_eq!(root.to_string(), ".");
    }

    #[test]
    fn name_normalized_lowercases_every_label() {
        let name = Name::from_labels(vec![
            Label::try_from(b"Example".as_slice()).unwrap(),
            Label::try_from(b"COM".as_slice()).unwrap(),
        ])
        .unwrap();
        let normalized = name.normalized();
        assert_eq!(normalized.to_string(), "example.com");
        // the original is untouched: case is preserved outside the cache key
        assert_eq!(name.to_string(), "Example.COM");
    }

    #[test]
    fn name_too_long_is_rejected() {
        let labels: Vec<Label> = (0..30)
            .map(|_| Label::try_from(b"0123456789".as_slice()).unwrap())
            .collect();
        assert_eq!(Name::from_labels(labels), Err(NameError::NameTooLong));
    }
}
