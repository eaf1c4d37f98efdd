//! Minimal DER encoding helpers shared by the RDP (CredSSP), LDAP (bind) and
//! SNMP (BER PDU) modules. Only the handful of TLV shapes those protocols
//! need; not a general-purpose encoder.

pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;

/// tag + definite length + content.
pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    let len = content.len();
    if len < 128 {
        out.push(len as u8);
    } else if len < 256 {
        out.push(0x81);
        out.push(len as u8);
    } else {
        out.push(0x82);
        out.push((len >> 8) as u8);
        out.push((len & 0xff) as u8);
    }
    out.extend_from_slice(content);
    out
}

pub fn sequence(content: &[u8]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, content)
}

pub fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(TAG_OCTET_STRING, content)
}

pub fn integer(v: i64) -> Vec<u8> {
    if (0..128).contains(&v) {
        return tlv(TAG_INTEGER, &[v as u8]);
    }
    let mut bytes = v.to_be_bytes().to_vec();
    while bytes.len() > 1 && bytes[0] == 0 && bytes[1] & 0x80 == 0 {
        bytes.remove(0);
    }
    tlv(TAG_INTEGER, &bytes)
}

pub fn null() -> Vec<u8> {
    tlv(TAG_NULL, &[])
}

/// Context-specific constructed tag `[n]`.
pub fn explicit(n: u8, content: &[u8]) -> Vec<u8> {
    tlv(0xa0 + n, content)
}

/// Encodes a dotted OID string ("1.3.6.1.2.1.1.1.0").
pub fn oid(dotted: &str) -> Vec<u8> {
    let parts: Vec<u64> = dotted
        .split('.')
        .filter_map(|p| p.parse().ok())
        .collect();
    let mut content = Vec::new();
    if parts.len() >= 2 {
        content.push((40 * parts[0] + parts[1]) as u8);
        for &part in &parts[2..] {
            content.extend_from_slice(&base128(part));
        }
    }
    tlv(TAG_OID, &content)
}

fn base128(mut v: u64) -> Vec<u8> {
    let mut bytes = vec![(v & 0x7f) as u8];
    v >>= 7;
    while v > 0 {
        bytes.push((v & 0x7f) as u8 | 0x80);
        v >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Reads one TLV header from `data`. Returns (tag, content-length,
/// header-length) or None if truncated or the length form is unsupported.
pub fn read_header(data: &[u8]) -> Option<(u8, usize, usize)> {
    if data.len() < 2 {
        return None;
    }
    let tag = data[0];
    let first = data[1];
    if first < 128 {
        return Some((tag, first as usize, 2));
    }
    let num_bytes = (first & 0x7f) as usize;
    if num_bytes == 0 || num_bytes > 4 || data.len() < 2 + num_bytes {
        return None;
    }
    let mut len = 0usize;
    for &b in &data[2..2 + num_bytes] {
        len = (len << 8) | b as usize;
    }
    Some((tag, len, 2 + num_bytes))
}
