//! Deserialisation of DNS messages from the wire. See the `types`
//! module for details of the format.

use std::net::Ipv4Addr;

use crate::protocol::types::*;

/// Errors that can arise parsing a message off the wire. Every
/// variant that can be attributed to a particular query carries that
/// query's id, so a format-error response can still be built even
/// when the rest of the message failed to parse.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum DecodeError {
    /// Fewer than 2 octets: there isn't even an id to reply with.
    CompletelyBusted,
    HeaderTooShort,
    /// The opcode was outside `{0, 1, 2}`.
    UnknownOpcode(u16),
    QuestionTooShort(u16),
    ResourceTooShort(u16),
    NameTooShort(u16),
    NameTooLong(u16),
    LabelTooLong(u16),
    LabelInvalidCharacters(u16),
    /// A compression pointer's offset is outside the message, or
    /// doesn't point strictly backwards (so can't be guaranteed to
    /// terminate).
    PointerInvalid(u16),
    /// A name followed more compression pointers than
    /// [`POINTER_DEPTH_LIMIT`] allows.
    PointerLoop(u16),
    CharstringOverrun(u16),
    /// The decoded rdata consumed a different number of octets than
    /// `rdlength` said it should.
    RdataLengthMismatch(u16),
    /// An `A` record's rdata looked like an IPv6 address.
    AUnexpectedIpv6(u16),
    /// The buffer had bytes left over after a complete message was
    /// read.
    TrailingBytes(u16),
}

impl DecodeError {
    pub fn id(&self) -> Option<u16> {
        match self {
            DecodeError::CompletelyBusted | DecodeError::HeaderTooShort => None,
            DecodeError::UnknownOpcode(id)
            | DecodeError::QuestionTooShort(id)
            | DecodeError::ResourceTooShort(id)
            | DecodeError::NameTooShort(id)
            | DecodeError::NameTooLong(id)
            | DecodeError::LabelTooLong(id)
            | DecodeError::LabelInvalidCharacters(id)
            | DecodeError::PointerInvalid(id)
            | DecodeError::PointerLoop(id)
            | DecodeError::CharstringOverrun(id)
            | DecodeError::RdataLengthMismatch(id)
            | DecodeError::AUnexpectedIpv6(id)
            | DecodeError::TrailingBytes(id) => Some(*id),
        }
    }
}

/// A cursor over a whole DNS datagram. `octets` is always the entire
/// message, never just the remaining tail: compression pointers are
/// absolute offsets into it, so decoding a name has to be able to
/// jump anywhere and come back.
#[derive(Debug, Clone, Copy)]
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        Self {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.octets.len() - self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == self.octets.len()
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let b = *self.octets.get(self.position)?;
        self.position += 1;
        Some(b)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let bs = self.take(2)?;
        Some(u16::from_be_bytes([bs[0], bs[1]]))
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        let bs = self.take(4)?;
        Some(u32::from_be_bytes([bs[0], bs[1], bs[2], bs[3]]))
    }

    pub fn next_i32(&mut self) -> Option<i32> {
        self.next_u32().map(|v| v as i32)
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        if self.octets.len() < self.position + size {
            return None;
        }
        let slice = &self.octets[self.position..self.position + size];
        self.position += size;
        Some(slice)
    }

    /// A fresh cursor over the same underlying octets, positioned at
    /// `offset`. Used to follow a compression pointer without
    /// disturbing `self`'s own position.
    pub fn at_offset(&self, offset: usize) -> Option<ConsumableBuffer<'a>> {
        if offset > self.octets.len() {
            None
        } else {
            Some(ConsumableBuffer {
                octets: self.octets,
                position: offset,
            })
        }
    }
}

impl Message {
    /// # Errors
    ///
    /// If the message cannot be parsed, or there are trailing bytes
    /// after a complete message.
    pub fn from_octets(octets: &[u8]) -> Result<Self, DecodeError> {
        let mut buffer = ConsumableBuffer::new(octets);
        let message = Self::deserialise(&mut buffer)?;
        if buffer.is_exhausted() {
            Ok(message)
        } else {
            Err(DecodeError::TrailingBytes(message.header.id))
        }
    }

    pub fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let (mut header, qdcount, ancount, nscount, arcount) = Header::deserialise(buffer)?;

        let mut questions = Vec::with_capacity(qdcount.into());
        for _ in 0..qdcount {
            questions.push(Question::deserialise(header.id, buffer)?);
        }
        let mut answers = Vec::with_capacity(ancount.into());
        for _ in 0..ancount {
            answers.push(Resource::deserialise(header.id, buffer)?);
        }
        let mut authority = Vec::with_capacity(nscount.into());
        for _ in 0..nscount {
            authority.push(Resource::deserialise(header.id, buffer)?);
        }
        let mut additional = Vec::with_capacity(arcount.into());
        for _ in 0..arcount {
            additional.push(Resource::deserialise(header.id, buffer)?);
        }

        header.qdcount = qdcount;
        header.ancount = ancount;
        header.nscount = nscount;
        header.arcount = arcount;

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

impl Header {
    /// Returns the header plus the four wire-level counts, which the
    /// caller uses to know how many questions/records to read (the
    /// counts on the returned `Header` are provisional until
    /// `Message::deserialise` re-derives them from what was actually
    /// read).
    #[allow(clippy::type_complexity)]
    fn deserialise(
        buffer: &mut ConsumableBuffer,
    ) -> Result<(Self, u16, u16, u16, u16), DecodeError> {
        let id = buffer.next_u16().ok_or(DecodeError::CompletelyBusted)?;
        let flags1 = buffer.next_u8().ok_or(DecodeError::HeaderTooShort)?;
        let flags2 = buffer.next_u8().ok_or(DecodeError::HeaderTooShort)?;
        let qdcount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let ancount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let nscount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let arcount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;

        const MASK_QR: u8 = 0b1000_0000;
        const MASK_OPCODE: u8 = 0b0111_1000;
        const MASK_AA: u8 = 0b0000_0100;
        const MASK_TC: u8 = 0b0000_0010;
        const MASK_RD: u8 = 0b0000_0001;
        const MASK_RA: u8 = 0b1000_0000;
        const MASK_RCODE: u8 = 0b0000_1111;

        let opcode = Opcode::from_u8((flags1 & MASK_OPCODE) >> 3)
            .map_err(|_| DecodeError::UnknownOpcode(id))?;

        let header = Header {
            id,
            is_response: flags1 & MASK_QR != 0,
            opcode,
            is_authoritative: flags1 & MASK_AA != 0,
            is_truncated: flags1 & MASK_TC != 0,
            recursion_desired: flags1 & MASK_RD != 0,
            recursion_available: flags2 & MASK_RA != 0,
            rcode: Some(Rcode::from(flags2 & MASK_RCODE)),
            qdcount,
            ancount,
            nscount,
            arcount,
        };
        Ok((header, qdcount, ancount, nscount, arcount))
    }
}

impl Question {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let qname = Name::deserialise(id, buffer)?;
        let qtype = buffer
            .next_u16()
            .ok_or(DecodeError::QuestionTooShort(id))?
            .into();
        let qclass = buffer
            .next_u16()
            .ok_or(DecodeError::QuestionTooShort(id))?
            .into();
        Ok(Self {
            qname,
            qtype,
            qclass,
        })
    }
}

impl Resource {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let name = Name::deserialise(id, buffer)?;
        let rtype = buffer.next_u16().ok_or(DecodeError::ResourceTooShort(id))?;
        let rclass = buffer
            .next_u16()
            .ok_or(DecodeError::ResourceTooShort(id))?
            .into();
        let ttl = buffer.next_i32().ok_or(DecodeError::ResourceTooShort(id))?;
        let rdlength = buffer.next_u16().ok_or(DecodeError::ResourceTooShort(id))?;

        let start = buffer.position();
        let rdata = RecordData::deserialise(id, rtype, rdlength, buffer)?;
        let consumed = buffer.position() - start;
        if consumed != usize::from(rdlength) {
            return Err(DecodeError::RdataLengthMismatch(id));
        }

        Ok(Self {
            name,
            rclass,
            ttl,
            rdlength,
            rdata,
        })
    }
}

impl RecordData {
    fn deserialise(
        id: u16,
        rtype: u16,
        rdlength: u16,
        buffer: &mut ConsumableBuffer,
    ) -> Result<Self, DecodeError> {
        match RecordType::from(rtype) {
            RecordType::A => {
                if rdlength == 16 {
                    return Err(DecodeError::AUnexpectedIpv6(id));
                }
                let octets = buffer
                    .take(4)
                    .ok_or(DecodeError::RdataLengthMismatch(id))?;
                let address = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
                Ok(RecordData::A {
                    address: address.to_string(),
                })
            }
            RecordType::NS => Ok(RecordData::NS {
                nsdname: Name::deserialise(id, buffer)?,
            }),
            RecordType::MD => Ok(RecordData::MD {
                madname: Name::deserialise(id, buffer)?,
            }),
            RecordType::MF => Ok(RecordData::MF {
                madname: Name::deserialise(id, buffer)?,
            }),
            RecordType::CNAME => Ok(RecordData::CNAME {
                cname: Name::deserialise(id, buffer)?,
            }),
            RecordType::SOA => {
                let mname = Name::deserialise(id, buffer)?;
                let rname = Name::deserialise(id, buffer)?;
                let serial = buffer.next_u32().ok_or(DecodeError::ResourceTooShort(id))?;
                let refresh = buffer.next_i32().ok_or(DecodeError::ResourceTooShort(id))?;
                let retry = buffer.next_i32().ok_or(DecodeError::ResourceTooShort(id))?;
                let expire = buffer.next_i32().ok_or(DecodeError::ResourceTooShort(id))?;
                let minimum = buffer.next_u32().ok_or(DecodeError::ResourceTooShort(id))?;
                Ok(RecordData::SOA {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                })
            }
            RecordType::MB => Ok(RecordData::MB {
                madname: Name::deserialise(id, buffer)?,
            }),
            RecordType::MG => Ok(RecordData::MG {
                mdmname: Name::deserialise(id, buffer)?,
            }),
            RecordType::MR => Ok(RecordData::MR {
                newname: Name::deserialise(id, buffer)?,
            }),
            RecordType::NULL => {
                let octets = buffer
                    .take(rdlength.into())
                    .ok_or(DecodeError::RdataLengthMismatch(id))?
                    .to_vec();
                Ok(RecordData::NULL { octets })
            }
            RecordType::WKS => {
                if rdlength < 5 {
                    return Err(DecodeError::RdataLengthMismatch(id));
                }
                let addr_octets = buffer
                    .take(4)
                    .ok_or(DecodeError::RdataLengthMismatch(id))?;
                let address =
                    Ipv4Addr::new(addr_octets[0], addr_octets[1], addr_octets[2], addr_octets[3]);
                let protocol = buffer.next_u8().ok_or(DecodeError::RdataLengthMismatch(id))?;
                let bitmap = buffer
                    .take(usize::from(rdlength) - 5)
                    .ok_or(DecodeError::RdataLengthMismatch(id))?
                    .to_vec();
                Ok(RecordData::WKS {
                    address: address.to_string(),
                    protocol,
                    bitmap,
                })
            }
            RecordType::PTR => Ok(RecordData::PTR {
                ptrdname: Name::deserialise(id, buffer)?,
            }),
            RecordType::HINFO => {
                let cpu = Charstring::deserialise(id, buffer)?;
                let os = Charstring::deserialise(id, buffer)?;
                Ok(RecordData::HINFO { cpu, os })
            }
            RecordType::MINFO => {
                let rmailbx = Name::deserialise(id, buffer)?;
                let emailbx = Name::deserialise(id, buffer)?;
                Ok(RecordData::MINFO { rmailbx, emailbx })
            }
            RecordType::MX => {
                let preference = buffer.next_u16().ok_or(DecodeError::ResourceTooShort(id))?;
                let exchange = Name::deserialise(id, buffer)?;
                Ok(RecordData::MX {
                    preference,
                    exchange,
                })
            }
            RecordType::TXT => {
                let start = buffer.position();
                let mut strings = Vec::new();
                while buffer.position() - start < usize::from(rdlength) {
                    strings.push(Charstring::deserialise(id, buffer)?);
                }
                Ok(RecordData::TXT { strings })
            }
            RecordType::Unknown(rtype) => {
                let octets = buffer
                    .take(rdlength.into())
                    .ok_or(DecodeError::RdataLengthMismatch(id))?
                    .to_vec();
                Ok(RecordData::Unknown { rtype, octets })
            }
        }
    }
}

impl Charstring {
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let len = buffer.next_u8().ok_or(DecodeError::CharstringOverrun(id))?;
        let octets = buffer
            .take(len.into())
            .ok_or(DecodeError::CharstringOverrun(id))?;
        Ok(Charstring(octets.to_vec()))
    }
}

impl Name {
    /// # Errors
    ///
    /// If the name is truncated, a label is invalid, or a compression
    /// pointer is malformed or its chain too deep.
    pub fn deserialise(id: u16, buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        Self::deserialise_at_depth(id, buffer, 0)
    }

    fn deserialise_at_depth(
        id: u16,
        buffer: &mut ConsumableBuffer,
        depth: usize,
    ) -> Result<Self, DecodeError> {
        if depth > POINTER_DEPTH_LIMIT {
            return Err(DecodeError::PointerLoop(id));
        }

        let start = buffer.position();
        let mut labels = Vec::new();

        loop {
            let len = buffer.next_u8().ok_or(DecodeError::NameTooShort(id))?;

            if len & 0b1100_0000 == 0b1100_0000 {
                let lo = buffer.next_u8().ok_or(DecodeError::NameTooShort(id))?;
                let offset = usize::from(u16::from_be_bytes([len & 0b0011_1111, lo]));

                // the pointer must point strictly backwards: this
                // guarantees termination even without the depth limit
                // above, since every hop makes the target offset
                // smaller.
                if offset >= start {
                    return Err(DecodeError::PointerInvalid(id));
                }

                let mut pointee = buffer
                    .at_offset(offset)
                    .ok_or(DecodeError::PointerInvalid(id))?;
                let mut target_labels =
                    Self::deserialise_at_depth(id, &mut pointee, depth + 1)?.labels;
                labels.append(&mut target_labels);
                break;
            } else if len == 0 {
                break;
            } else if usize::from(len) > LABEL_MAX_LEN {
                return Err(DecodeError::LabelTooLong(id));
            } else {
                let octets = buffer
                    .take(len.into())
                    .ok_or(DecodeError::NameTooShort(id))?;
                let label = Label::try_from(octets).map_err(|err| match err {
                    NameError::LabelInvalidCharacters => DecodeError::LabelInvalidCharacters(id),
                    NameError::LabelTooLong | NameError::NameTooLong => {
                        DecodeError::LabelTooLong(id)
                    }
                })?;
                labels.push(label);
            }
        }

        Name::from_labels(labels).map_err(|_| DecodeError::NameTooLong(id))
    }
}
