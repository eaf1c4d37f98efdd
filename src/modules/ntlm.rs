//! NTLMSSP message construction (NTLMv2), shared by the RDP (CredSSP) and
//! SMB (session setup) modules.
//!
//! NT hash = MD4 of the UTF-16LE password. NTProofStr =
//! HMAC-MD5(responseKeyNT, serverChallenge ∥ blob).

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

pub const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const MSG_NEGOTIATE: u32 = 1;
const MSG_AUTHENTICATE: u32 = 3;

const NEG_UNICODE: u32 = 0x0000_0001;
const NEG_REQUEST_TARGET: u32 = 0x0000_0004;
const NEG_SIGN: u32 = 0x0000_0010;
const NEG_SEAL: u32 = 0x0000_0020;
const NEG_NTLM: u32 = 0x0000_0200;
const NEG_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEG_EXTENDED_SESSION: u32 = 0x0008_0000;
const NEG_TARGET_INFO: u32 = 0x0080_0000;
const NEG_128: u32 = 0x2000_0000;
const NEG_KEY_EXCHANGE: u32 = 0x4000_0000;
const NEG_56: u32 = 0x8000_0000;

pub fn to_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// NT hash: MD4 over the UTF-16LE password.
pub fn nt_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(to_utf16le(password));
    hasher.finalize().into()
}

pub fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut mac = <Hmac<Md5> as Mac>::new_from_slice(key)
        .expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Splits "DOMAIN\user" into (domain, user). No backslash means an empty
/// domain.
pub fn split_domain(username: &str) -> (&str, &str) {
    match username.split_once('\\') {
        Some((domain, user)) => (domain, user),
        None => ("", username),
    }
}

/// NTLM Type 1 (Negotiate) message with empty domain and workstation.
pub fn negotiate_message() -> Vec<u8> {
    let flags = NEG_UNICODE
        | NEG_REQUEST_TARGET
        | NEG_SIGN
        | NEG_SEAL
        | NEG_NTLM
        | NEG_ALWAYS_SIGN
        | NEG_EXTENDED_SESSION
        | NEG_TARGET_INFO
        | NEG_128
        | NEG_KEY_EXCHANGE
        | NEG_56;

    let mut msg = Vec::with_capacity(40);
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&MSG_NEGOTIATE.to_le_bytes());
    msg.extend_from_slice(&flags.to_le_bytes());
    // empty domain and workstation field descriptors
    msg.extend_from_slice(&[0u8; 16]);
    msg
}

/// Server challenge and target info pulled out of a Type 2 message.
pub struct Challenge {
    pub server_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

/// Parses an NTLM Type 2 (Challenge) message.
pub fn parse_challenge(msg: &[u8]) -> Result<Challenge> {
    if msg.len() < 32 || &msg[..8] != SIGNATURE {
        return Err(anyhow!("invalid NTLM challenge message"));
    }
    let mut server_challenge = [0u8; 8];
    server_challenge.copy_from_slice(&msg[24..32]);

    let mut target_info = Vec::new();
    if msg.len() >= 48 {
        let ti_len = u16::from_le_bytes([msg[40], msg[41]]) as usize;
        let ti_off = u32::from_le_bytes([msg[44], msg[45], msg[46], msg[47]]) as usize;
        if ti_len > 0 && ti_off + ti_len <= msg.len() {
            target_info = msg[ti_off..ti_off + ti_len].to_vec();
        }
    }

    Ok(Challenge {
        server_challenge,
        target_info,
    })
}

/// Builds an NTLM Type 3 (Authenticate) message carrying an NTLMv2 response.
pub fn authenticate_message(
    challenge: &Challenge,
    domain: &str,
    username: &str,
    password: &str,
) -> Vec<u8> {
    let nt = nt_hash(password);
    let mut identity = to_utf16le(&username.to_uppercase());
    identity.extend_from_slice(&to_utf16le(domain));
    let response_key_nt = hmac_md5(&nt, &identity);

    let client_challenge: [u8; 8] = rand::random();

    // NTLMv2 client blob
    let mut blob = Vec::new();
    blob.push(0x01); // RespType
    blob.push(0x01); // HiRespType
    blob.extend_from_slice(&[0u8; 6]); // reserved
    blob.extend_from_slice(&filetime_now().to_le_bytes());
    blob.extend_from_slice(&client_challenge);
    blob.extend_from_slice(&[0u8; 4]); // reserved
    blob.extend_from_slice(&challenge.target_info);
    blob.extend_from_slice(&[0u8; 4]); // end of target info

    let mut temp = challenge.server_challenge.to_vec();
    temp.extend_from_slice(&blob);
    let nt_proof = hmac_md5(&response_key_nt, &temp);

    let mut nt_response = nt_proof.to_vec();
    nt_response.extend_from_slice(&blob);

    let domain_bytes = to_utf16le(domain);
    let user_bytes = to_utf16le(username);
    let workstation: Vec<u8> = Vec::new();
    let lm_response = [0u8; 24]; // empty LM response for NTLMv2

    // 88-byte header: signature, type, six field descriptors, flags,
    // version, MIC. Payload field order: domain, user, workstation, LM, NT.
    let header_len = 88u32;
    let domain_off = header_len;
    let user_off = domain_off + domain_bytes.len() as u32;
    let ws_off = user_off + user_bytes.len() as u32;
    let lm_off = ws_off + workstation.len() as u32;
    let nt_off = lm_off + lm_response.len() as u32;

    let flags = NEG_UNICODE
        | NEG_NTLM
        | NEG_ALWAYS_SIGN
        | NEG_EXTENDED_SESSION
        | NEG_TARGET_INFO
        | NEG_128
        | NEG_KEY_EXCHANGE
        | NEG_56;

    let mut msg = Vec::new();
    msg.extend_from_slice(SIGNATURE);
    msg.extend_from_slice(&MSG_AUTHENTICATE.to_le_bytes());
    write_field(&mut msg, lm_response.len(), lm_off);
    write_field(&mut msg, nt_response.len(), nt_off);
    write_field(&mut msg, domain_bytes.len(), domain_off);
    write_field(&mut msg, user_bytes.len(), user_off);
    write_field(&mut msg, workstation.len(), ws_off);
    write_field(&mut msg, 0, 0); // encrypted random session key (empty)
    msg.extend_from_slice(&flags.to_le_bytes());
    msg.extend_from_slice(&[0u8; 8]); // version (unset)
    msg.extend_from_slice(&[0u8; 16]); // MIC (unset)

    debug_assert_eq!(msg.len(), header_len as usize);

    msg.extend_from_slice(&domain_bytes);
    msg.extend_from_slice(&user_bytes);
    msg.extend_from_slice(&workstation);
    msg.extend_from_slice(&lm_response);
    msg.extend_from_slice(&nt_response);
    msg
}

fn write_field(msg: &mut Vec<u8>, len: usize, offset: u32) {
    msg.extend_from_slice(&(len as u16).to_le_bytes());
    msg.extend_from_slice(&(len as u16).to_le_bytes());
    msg.extend_from_slice(&offset.to_le_bytes());
}

/// Current time as a Windows FILETIME (100 ns intervals since 1601-01-01).
fn filetime_now() -> u64 {
    let unix_nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    unix_nanos / 100 + 116_444_736_000_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nt_hash_of_known_password() {
        // MD4(UTF-16LE("Password"))
        let hash = nt_hash("Password");
        let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(hex, "a4f49c406510bdcab6824ee7c30fd852");
    }

    #[test]
    fn utf16le_encoding() {
        assert_eq!(to_utf16le("ab"), vec![0x61, 0x00, 0x62, 0x00]);
    }

    #[test]
    fn split_domain_forms() {
        assert_eq!(split_domain("CORP\\alice"), ("CORP", "alice"));
        assert_eq!(split_domain("alice"), ("", "alice"));
    }

    #[test]
    fn negotiate_message_shape() {
        let msg = negotiate_message();
        assert_eq!(&msg[..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes([msg[8], msg[9], msg[10], msg[11]]), 1);
        assert_eq!(msg.len(), 32);
    }

    #[test]
    fn challenge_roundtrip() {
        // Minimal Type 2: signature, type, target name fields, flags,
        // challenge, reserved, target info fields
        let mut msg = Vec::new();
        msg.extend_from_slice(SIGNATURE);
        msg.extend_from_slice(&2u32.to_le_bytes());
        msg.extend_from_slice(&[0u8; 8]); // target name fields
        msg.extend_from_slice(&0u32.to_le_bytes()); // flags
        msg.extend_from_slice(&[9u8; 8]); // server challenge
        msg.extend_from_slice(&[0u8; 8]); // reserved
        let ti = [0x02u8, 0x00, 0x04, 0x00, 0x41, 0x00, 0x42, 0x00];
        msg.extend_from_slice(&(ti.len() as u16).to_le_bytes());
        msg.extend_from_slice(&(ti.len() as u16).to_le_bytes());
        msg.extend_from_slice(&(48u32).to_le_bytes());
        msg.extend_from_slice(&ti);

        let ch = parse_challenge(&msg).unwrap();
        assert_eq!(ch.server_challenge, [9u8; 8]);
        assert_eq!(ch.target_info, ti);
    }

    #[test]
    fn authenticate_message_layout() {
        let ch = Challenge {
            server_challenge: [1u8; 8],
            target_info: vec![],
        };
        let msg = authenticate_message(&ch, "", "user", "pass");
        assert_eq!(&msg[..8], SIGNATURE);
        assert_eq!(u32::from_le_bytes([msg[8], msg[9], msg[10], msg[11]]), 3);
        // NT response offset + length stay inside the message
        let nt_len = u16::from_le_bytes([msg[20], msg[21]]) as usize;
        let nt_off = u32::from_le_bytes([msg[24], msg[25], msg[26], msg[27]]) as usize;
        assert_eq!(nt_off + nt_len, msg.len());
    }
}
