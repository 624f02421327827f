//! ASN.1/BER codec for the SNMP message subset the simulator speaks
//!
//! Definite lengths only. Application-class integer types (Counter32,
//! Gauge32, TimeTicks, Counter64) keep their application tags on the wire;
//! exception values are implicit-tagged Null in context class per RFC 1905.

use crate::snmp::message::{PduType, SnmpMessage, SnmpPdu, SnmpVersion, VarBind};
use crate::snmp::oid::Oid;
use crate::snmp::SnmpValue;
use crate::{Error, Result};

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OBJECT_IDENTIFIER: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIMETICKS: u8 = 0x43;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn encode_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
    } else if len <= 0xFF {
        out.push(0x81);
        out.push(len as u8);
    } else if len <= 0xFFFF {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    } else {
        out.push(0x83);
        out.push((len >> 16) as u8);
        out.push((len >> 8) as u8);
        out.push(len as u8);
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    encode_length(out, content.len());
    out.extend_from_slice(content);
}

fn signed_content(value: i64) -> Vec<u8> {
    let mut bytes = Vec::new();
    if value == 0 {
        bytes.push(0);
        return bytes;
    }
    let mut n = value;
    while n != 0 && n != -1 {
        bytes.push((n & 0xFF) as u8);
        n >>= 8;
    }
    if value > 0 && bytes.last().map_or(false, |b| b & 0x80 != 0) {
        bytes.push(0x00);
    } else if value < 0 && bytes.last().map_or(true, |b| b & 0x80 == 0) {
        bytes.push(0xFF);
    }
    bytes.reverse();
    bytes
}

fn unsigned_content(value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut n = value;
    loop {
        bytes.push((n & 0xFF) as u8);
        n >>= 8;
        if n == 0 {
            break;
        }
    }
    // Two's-complement sign octet keeps large values non-negative
    if bytes.last().map_or(false, |b| b & 0x80 != 0) {
        bytes.push(0x00);
    }
    bytes.reverse();
    bytes
}

fn oid_content(oid: &Oid) -> Vec<u8> {
    let comps = oid.components();
    let mut out = Vec::new();

    let first = u64::from(comps.first().copied().unwrap_or(0));
    let second = u64::from(comps.get(1).copied().unwrap_or(0));
    encode_subidentifier(&mut out, first * 40 + second);
    for &component in comps.iter().skip(2) {
        encode_subidentifier(&mut out, u64::from(component));
    }
    out
}

fn encode_subidentifier(out: &mut Vec<u8>, value: u64) {
    if value < 0x80 {
        out.push(value as u8);
        return;
    }
    let mut chunks = Vec::new();
    let mut n = value;
    while n > 0 {
        chunks.push((n & 0x7F) as u8);
        n >>= 7;
    }
    for (i, chunk) in chunks.iter().rev().enumerate() {
        if i < chunks.len() - 1 {
            out.push(chunk | 0x80);
        } else {
            out.push(*chunk);
        }
    }
}

fn encode_value(out: &mut Vec<u8>, value: &SnmpValue) {
    match value {
        SnmpValue::Integer(v) => write_tlv(out, TAG_INTEGER, &signed_content(i64::from(*v))),
        SnmpValue::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
        SnmpValue::Null => write_tlv(out, TAG_NULL, &[]),
        SnmpValue::ObjectIdentifier(oid) => {
            write_tlv(out, TAG_OBJECT_IDENTIFIER, &oid_content(oid))
        }
        SnmpValue::Counter32(v) => write_tlv(out, TAG_COUNTER32, &unsigned_content(u64::from(*v))),
        SnmpValue::Gauge32(v) => write_tlv(out, TAG_GAUGE32, &unsigned_content(u64::from(*v))),
        SnmpValue::TimeTicks(v) => write_tlv(out, TAG_TIMETICKS, &unsigned_content(u64::from(*v))),
        SnmpValue::Counter64(v) => write_tlv(out, TAG_COUNTER64, &unsigned_content(*v)),
        SnmpValue::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
}

/// Encode a single varbind. Exposed for the pipeline's response size
/// accounting.
pub fn encode_varbind(varbind: &VarBind) -> Vec<u8> {
    let mut content = Vec::new();
    write_tlv(
        &mut content,
        TAG_OBJECT_IDENTIFIER,
        &oid_content(&varbind.oid),
    );
    encode_value(&mut content, &varbind.value);

    let mut out = Vec::new();
    write_tlv(&mut out, TAG_SEQUENCE, &content);
    out
}

/// Encoded size of a varbind on the wire.
pub fn encoded_varbind_len(varbind: &VarBind) -> usize {
    encode_varbind(varbind).len()
}

/// Encode a complete SNMP message.
pub fn encode_message(message: &SnmpMessage) -> Vec<u8> {
    let mut varbind_list = Vec::new();
    for varbind in &message.pdu.varbinds {
        varbind_list.extend_from_slice(&encode_varbind(varbind));
    }

    let mut pdu_content = Vec::new();
    write_tlv(
        &mut pdu_content,
        TAG_INTEGER,
        &signed_content(i64::from(message.pdu.request_id)),
    );
    write_tlv(
        &mut pdu_content,
        TAG_INTEGER,
        &signed_content(message.pdu.error_status),
    );
    write_tlv(
        &mut pdu_content,
        TAG_INTEGER,
        &signed_content(message.pdu.error_index),
    );
    write_tlv(&mut pdu_content, TAG_SEQUENCE, &varbind_list);

    let mut msg_content = Vec::new();
    write_tlv(
        &mut msg_content,
        TAG_INTEGER,
        &signed_content(message.version.to_wire()),
    );
    write_tlv(&mut msg_content, TAG_OCTET_STRING, &message.community);
    write_tlv(&mut msg_content, message.pdu.pdu_type.tag(), &pdu_content);

    let mut out = Vec::new();
    write_tlv(&mut out, TAG_SEQUENCE, &msg_content);
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

struct BerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek_tag(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::encoding("truncated message: expected tag"))
    }

    fn read_tag(&mut self) -> Result<u8> {
        let tag = self.peek_tag()?;
        self.pos += 1;
        Ok(tag)
    }

    fn read_length(&mut self) -> Result<usize> {
        let first = self
            .data
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::encoding("truncated message: expected length"))?;
        self.pos += 1;

        if first < 0x80 {
            return Ok(first as usize);
        }
        let num_octets = (first & 0x7F) as usize;
        if num_octets == 0 || num_octets > 4 {
            return Err(Error::encoding(format!(
                "unsupported length form 0x{first:02x}"
            )));
        }
        if self.remaining() < num_octets {
            return Err(Error::encoding("truncated length octets"));
        }
        let mut len = 0usize;
        for _ in 0..num_octets {
            len = (len << 8) | self.data[self.pos] as usize;
            self.pos += 1;
        }
        Ok(len)
    }

    /// Reads a header, checking the tag, and returns the content length.
    fn expect(&mut self, tag: u8) -> Result<usize> {
        let actual = self.read_tag()?;
        if actual != tag {
            return Err(Error::encoding(format!(
                "expected tag 0x{tag:02x}, found 0x{actual:02x}"
            )));
        }
        let len = self.read_length()?;
        if len > self.remaining() {
            return Err(Error::encoding("length exceeds remaining data"));
        }
        Ok(len)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::encoding("truncated content"));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_signed(&mut self) -> Result<i64> {
        let len = self.expect(TAG_INTEGER)?;
        let content = self.take(len)?;
        decode_signed(content)
    }

    fn read_octet_string(&mut self) -> Result<Vec<u8>> {
        let len = self.expect(TAG_OCTET_STRING)?;
        Ok(self.take(len)?.to_vec())
    }

    fn read_oid(&mut self) -> Result<Oid> {
        let len = self.expect(TAG_OBJECT_IDENTIFIER)?;
        let content = self.take(len)?;
        decode_oid_content(content)
    }

    fn read_value(&mut self) -> Result<SnmpValue> {
        let tag = self.read_tag()?;
        let len = self.read_length()?;
        let content = self.take(len)?;

        let value = match tag {
            TAG_INTEGER => {
                let v = decode_signed(content)?;
                let v = i32::try_from(v)
                    .map_err(|_| Error::encoding("Integer32 out of range"))?;
                SnmpValue::Integer(v)
            }
            TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
            TAG_NULL => SnmpValue::Null,
            TAG_OBJECT_IDENTIFIER => SnmpValue::ObjectIdentifier(decode_oid_content(content)?),
            TAG_COUNTER32 => SnmpValue::Counter32(decode_unsigned32(content)?),
            TAG_GAUGE32 => SnmpValue::Gauge32(decode_unsigned32(content)?),
            TAG_TIMETICKS => SnmpValue::TimeTicks(decode_unsigned32(content)?),
            TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned64(content)?),
            TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
            TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
            TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
            other => {
                return Err(Error::encoding(format!("unsupported value tag 0x{other:02x}")))
            }
        };
        Ok(value)
    }
}

fn decode_signed(content: &[u8]) -> Result<i64> {
    if content.is_empty() {
        return Err(Error::encoding("zero-length INTEGER"));
    }
    if content.len() > 8 {
        return Err(Error::encoding("INTEGER too long"));
    }
    let mut n: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in content {
        n = (n << 8) | i64::from(b);
    }
    Ok(n)
}

fn decode_unsigned64(content: &[u8]) -> Result<u64> {
    if content.is_empty() {
        return Err(Error::encoding("zero-length unsigned"));
    }
    // A leading 0x00 is the sign octet for values with the high bit set
    let trimmed = if content[0] == 0 {
        &content[1..]
    } else {
        content
    };
    if trimmed.len() > 8 {
        return Err(Error::encoding("unsigned value too long"));
    }
    let mut n: u64 = 0;
    for &b in trimmed {
        n = (n << 8) | u64::from(b);
    }
    Ok(n)
}

fn decode_unsigned32(content: &[u8]) -> Result<u32> {
    let v = decode_unsigned64(content)?;
    u32::try_from(v).map_err(|_| Error::encoding("unsigned32 out of range"))
}

fn decode_oid_content(content: &[u8]) -> Result<Oid> {
    if content.is_empty() {
        return Err(Error::encoding("zero-length OID"));
    }
    let mut subids = Vec::new();
    let mut i = 0;
    while i < content.len() {
        let mut subid: u64 = 0;
        loop {
            let byte = content
                .get(i)
                .copied()
                .ok_or_else(|| Error::encoding("truncated OID subidentifier"))?;
            i += 1;
            subid = (subid << 7) | u64::from(byte & 0x7F);
            if subid > u64::from(u32::MAX) * 40 {
                return Err(Error::encoding("OID subidentifier overflow"));
            }
            if byte & 0x80 == 0 {
                break;
            }
        }
        subids.push(subid);
    }

    let mut components = Vec::with_capacity(subids.len() + 1);
    let first = subids[0];
    if first < 40 {
        components.push(0);
        components.push(first as u32);
    } else if first < 80 {
        components.push(1);
        components.push((first - 40) as u32);
    } else {
        components.push(2);
        let second = first - 80;
        let second =
            u32::try_from(second).map_err(|_| Error::encoding("OID component overflow"))?;
        components.push(second);
    }
    for subid in subids.into_iter().skip(1) {
        let component =
            u32::try_from(subid).map_err(|_| Error::encoding("OID component overflow"))?;
        components.push(component);
    }
    Ok(Oid::new(components))
}

/// Decode a complete SNMP message from a datagram.
pub fn decode_message(data: &[u8]) -> Result<SnmpMessage> {
    let mut rd = BerReader::new(data);

    rd.expect(TAG_SEQUENCE)?;

    let version = SnmpVersion::from_wire(rd.read_signed()?)
        .ok_or_else(|| Error::protocol("unsupported SNMP version"))?;
    let community = rd.read_octet_string()?;

    let pdu_tag = rd.peek_tag()?;
    let pdu_type = PduType::from_tag(pdu_tag)
        .ok_or_else(|| Error::protocol(format!("unsupported PDU tag 0x{pdu_tag:02x}")))?;
    rd.expect(pdu_tag)?;

    let request_id = rd.read_signed()?;
    let request_id = i32::try_from(request_id)
        .map_err(|_| Error::encoding("request-id out of range"))?;
    let error_status = rd.read_signed()?;
    let error_index = rd.read_signed()?;

    let list_len = rd.expect(TAG_SEQUENCE)?;
    let list_end = rd.pos + list_len;

    let mut varbinds = Vec::new();
    while rd.pos < list_end {
        let vb_len = rd.expect(TAG_SEQUENCE)?;
        let vb_end = rd.pos + vb_len;
        let oid = rd.read_oid()?;
        let value = rd.read_value()?;
        if rd.pos != vb_end {
            return Err(Error::encoding("varbind length mismatch"));
        }
        varbinds.push(VarBind::new(oid, value));
    }

    Ok(SnmpMessage {
        version,
        community,
        pdu: SnmpPdu {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        },
    })
}
