//! Serialisation of DNS messages to the wire format. See the `types`
//! module for details of the format.
//!
//! Encoding never emits compression pointers: every name is written
//! out in full. The decoder still has to understand them, because
//! other nameservers use them.

use std::net::Ipv4Addr;

use crate::protocol::types::*;

/// Errors that can occur while serialising a [`Message`]. These are
/// all about the *shape* of the data (too many records, a name too
/// long) rather than the wire format, since the wire format is
/// entirely under our control on encode.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum EncodeError {
    /// A section held more entries than fit in a 16-bit count field.
    TooManyRecords,
    /// An rdata encoded to more than 65535 octets.
    RdataTooLong,
    NameTooLong,
    LabelTooLong,
    LabelInvalidCharacters,
    /// An `A` record held something that doesn't parse as a
    /// dotted-quad IPv4 address.
    AddressInvalid,
}

impl From<NameError> for EncodeError {
    fn from(err: NameError) -> Self {
        match err {
            NameError::NameTooLong => EncodeError::NameTooLong,
            NameError::LabelTooLong => EncodeError::LabelTooLong,
            NameError::LabelInvalidCharacters => EncodeError::LabelInvalidCharacters,
        }
    }
}

fn usize_to_u16(n: usize) -> Result<u16, EncodeError> {
    u16::try_from(n).map_err(|_| EncodeError::TooManyRecords)
}

/// An append-only byte buffer, with enough bookkeeping to go back and
/// patch in a length field once the data it measures has been
/// written.
#[derive(Debug, Default)]
pub struct WritableBuffer {
    octets: Vec<u8>,
}

impl WritableBuffer {
    pub fn into_octets(self) -> Vec<u8> {
        self.octets
    }

    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn write_u8(&mut self, octet: u8) {
        self.octets.push(octet);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_octets(&mut self, octets: &[u8]) {
        self.octets.extend_from_slice(octets);
    }

    fn patch_u16_at(&mut self, index: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.octets[index] = hi;
        self.octets[index + 1] = lo;
    }
}

impl Message {
    /// # Errors
    ///
    /// If the message holds more records than fit in a 16-bit count
    /// field, or a name/rdata is invalid.
    ///
    /// Callers should run [`Message::fix_metadata`] first: this does
    /// not depend on the stored counts/rdlength being correct (it
    /// recomputes its own framing as it goes), but a caller relying
    /// on the struct's own fields being consistent should fix them up
    /// first.
    pub fn to_octets(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buffer = WritableBuffer::default();
        self.serialise(&mut buffer)?;
        Ok(buffer.into_octets())
    }

    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), EncodeError> {
        let qdcount = usize_to_u16(self.questions.len())?;
        let ancount = usize_to_u16(self.answers.len())?;
        let nscount = usize_to_u16(self.authority.len())?;
        let arcount = usize_to_u16(self.additional.len())?;

        self.header.serialise(buffer, qdcount, ancount, nscount, arcount);

        for question in &self.questions {
            question.serialise(buffer)?;
        }
        for rr in &self.answers {
            rr.serialise(buffer)?;
        }
        for rr in &self.authority {
            rr.serialise(buffer)?;
        }
        for rr in &self.additional {
            rr.serialise(buffer)?;
        }

        Ok(())
    }
}

impl Header {
    pub fn serialise(
        &self,
        buffer: &mut WritableBuffer,
        qdcount: u16,
        ancount: u16,
        nscount: u16,
        arcount: u16,
    ) {
        const MASK_QR: u8 = 0b1000_0000;
        const MASK_AA: u8 = 0b0000_0100;
        const MASK_TC: u8 = 0b0000_0010;
        const MASK_RD: u8 = 0b0000_0001;
        const MASK_RA: u8 = 0b1000_0000;
        const OFFSET_OPCODE: u8 = 3;

        let flag_qr = if self.is_response { MASK_QR } else { 0 };
        let field_opcode = u8::from(self.opcode) << OFFSET_OPCODE;
        let flag_aa = if self.is_authoritative { MASK_AA } else { 0 };
        let flag_tc = if self.is_truncated { MASK_TC } else { 0 };
        let flag_rd = if self.recursion_desired { MASK_RD } else { 0 };
        let flag_ra = if self.recursion_available { MASK_RA } else { 0 };
        let field_rcode = u8::from(self.rcode_or_server_failure());
        // z is reserved and always zero on send

        buffer.write_u16(self.id);
        buffer.write_u8(flag_qr | field_opcode | flag_aa | flag_tc | flag_rd);
        buffer.write_u8(flag_ra | field_rcode);
        buffer.write_u16(qdcount);
        buffer.write_u16(ancount);
        buffer.write_u16(nscount);
        buffer.write_u16(arcount);
    }
}

impl Question {
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), EncodeError> {
        self.qname.serialise(buffer)?;
        buffer.write_u16(self.qtype.into());
        buffer.write_u16(self.qclass.into());
        Ok(())
    }
}

impl Resource {
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), EncodeError> {
        self.name.serialise(buffer)?;
        buffer.write_u16(self.rtype().into());
        buffer.write_u16(self.rclass.into());
        buffer.write_i32(self.ttl);

        let rdlength_index = buffer.index();
        buffer.write_u16(0); // patched below

        self.rdata.serialise(buffer)?;

        let rdlength = usize_to_u16(buffer.index() - rdlength_index - 2)
            .map_err(|_| EncodeError::RdataTooLong)?;
        buffer.patch_u16_at(rdlength_index, rdlength);

        Ok(())
    }
}

impl RecordData {
    /// The length of this rdata once encoded, without actually
    /// writing it anywhere. Used by [`Resource::fix_rdlength`].
    pub fn encoded_len(&self) -> u16 {
        let mut buffer = WritableBuffer::default();
        // an rdata can't actually fail to serialise in a way that
        // depends on the buffer, so discard the error: a real failure
        // surfaces again (and gets reported) when the resource is
        // serialised for real.
        let _ = self.serialise(&mut buffer);
        buffer.index() as u16
    }

    fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), EncodeError> {
        match self {
            RecordData::A { address } => {
                let addr: Ipv4Addr = address.parse().map_err(|_| EncodeError::AddressInvalid)?;
                buffer.write_octets(&addr.octets());
            }
            RecordData::NS { nsdname } => nsdname.serialise(buffer)?,
            RecordData::MD { madname } => madname.serialise(buffer)?,
            RecordData::MF { madname } => madname.serialise(buffer)?,
            RecordData::CNAME { cname } => cname.serialise(buffer)?,
            RecordData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buffer)?;
                rname.serialise(buffer)?;
                buffer.write_u32(*serial);
                buffer.write_i32(*refresh);
                buffer.write_i32(*retry);
                buffer.write_i32(*expire);
                buffer.write_u32(*minimum);
            }
            RecordData::MB { madname } => madname.serialise(buffer)?,
            RecordData::MG { mdmname } => mdmname.serialise(buffer)?,
            RecordData::MR { newname } => newname.serialise(buffer)?,
            RecordData::NULL { octets } => buffer.write_octets(octets),
            RecordData::WKS {
                address,
                protocol,
                bitmap,
            } => {
                let addr: Ipv4Addr = address.parse().map_err(|_| EncodeError::AddressInvalid)?;
                buffer.write_octets(&addr.octets());
                buffer.write_u8(*protocol);
                buffer.write_octets(bitmap);
            }
            RecordData::PTR { ptrdname } => ptrdname.serialise(buffer)?,
            RecordData::HINFO { cpu, os } => {
                cpu.serialise(buffer);
                os.serialise(buffer);
            }
            RecordData::MINFO { rmailbx, emailbx } => {
                rmailbx.serialise(buffer)?;
                emailbx.serialise(buffer)?;
            }
            RecordData::MX {
                preference,
                exchange,
            } => {
                buffer.write_u16(*preference);
                exchange.serialise(buffer)?;
            }
            RecordData::TXT { strings } => {
                for s in strings {
                    s.serialise(buffer);
                }
            }
            RecordData::Unknown { octets, .. } => buffer.write_octets(octets),
        }
        Ok(())
    }
}

impl Name {
    pub fn serialise(&self, buffer: &mut WritableBuffer) -> Result<(), EncodeError> {
        if self.wire_len() > NAME_MAX_LEN {
            return Err(EncodeError::NameTooLong);
        }
        for label in self.labels() {
            buffer.write_u8(label.len() as u8);
            buffer.write_octets(label.octets());
        }
        buffer.write_u8(0);
        Ok(())
    }
}

impl Charstring {
    pub fn serialise(&self, buffer: &mut WritableBuffer) {
        buffer.write_u8(self.len() as u8);
        buffer.write_octets(self.octets());
    }
}
