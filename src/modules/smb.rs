//! SMB2 NTLM authentication (port 445). Speaks the wire protocol directly:
//! NEGOTIATE (dialects 2.0.2/2.1, which need no negotiate contexts), then a
//! two-leg SESSION_SETUP carrying SPNEGO-wrapped NTLMSSP negotiate /
//! authenticate messages. STATUS_LOGON_FAILURE and its siblings are
//! rejections; everything else is a connection error.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{asn1, ntlm, Credential, Target};

const SMB2_MAGIC: &[u8; 4] = b"\xfeSMB";
const CMD_NEGOTIATE: u16 = 0x0000;
const CMD_SESSION_SETUP: u16 = 0x0001;

const STATUS_SUCCESS: u32 = 0x0000_0000;
const STATUS_MORE_PROCESSING_REQUIRED: u32 = 0xC000_0016;

/// NT statuses that mean "wrong credentials", not "broken connection".
const REJECTION_STATUSES: [u32; 6] = [
    0xC000_006D, // STATUS_LOGON_FAILURE
    0xC000_006A, // STATUS_WRONG_PASSWORD
    0xC000_0064, // STATUS_NO_SUCH_USER
    0xC000_0022, // STATUS_ACCESS_DENIED
    0xC000_0234, // STATUS_ACCOUNT_LOCKED_OUT
    0xC000_0072, // STATUS_ACCOUNT_DISABLED
];

const SPNEGO_OID: &str = "1.3.6.1.5.5.2";
const NTLMSSP_OID: &str = "1.3.6.1.4.1.311.2.2.10";

fn smb2_header(command: u16, message_id: u64, session_id: u64) -> Vec<u8> {
    let mut h = Vec::with_capacity(64);
    h.extend_from_slice(SMB2_MAGIC);
    h.extend_from_slice(&64u16.to_le_bytes()); // structure size
    h.extend_from_slice(&0u16.to_le_bytes()); // credit charge
    h.extend_from_slice(&0u32.to_le_bytes()); // status
    h.extend_from_slice(&command.to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes()); // credits requested
    h.extend_from_slice(&0u32.to_le_bytes()); // flags
    h.extend_from_slice(&0u32.to_le_bytes()); // next command
    h.extend_from_slice(&message_id.to_le_bytes());
    h.extend_from_slice(&0u32.to_le_bytes()); // reserved
    h.extend_from_slice(&0u32.to_le_bytes()); // tree id
    h.extend_from_slice(&session_id.to_le_bytes());
    h.extend_from_slice(&[0u8; 16]); // signature
    h
}

fn negotiate_request() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&36u16.to_le_bytes()); // structure size
    body.extend_from_slice(&2u16.to_le_bytes()); // dialect count
    body.extend_from_slice(&1u16.to_le_bytes()); // security mode: signing enabled
    body.extend_from_slice(&0u16.to_le_bytes()); // reserved
    body.extend_from_slice(&0u32.to_le_bytes()); // capabilities
    body.extend_from_slice(&rand::random::<[u8; 16]>()); // client guid
    body.extend_from_slice(&[0u8; 8]); // client start time
    body.extend_from_slice(&0x0202u16.to_le_bytes()); // SMB 2.0.2
    body.extend_from_slice(&0x0210u16.to_le_bytes()); // SMB 2.1

    let mut msg = smb2_header(CMD_NEGOTIATE, 0, 0);
    msg.extend_from_slice(&body);
    msg
}

fn session_setup_request(message_id: u64, session_id: u64, security_blob: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&25u16.to_le_bytes()); // structure size
    body.push(0); // flags
    body.push(1); // security mode: signing enabled
    body.extend_from_slice(&0u32.to_le_bytes()); // capabilities
    body.extend_from_slice(&0u32.to_le_bytes()); // channel
    body.extend_from_slice(&(64u16 + 24).to_le_bytes()); // security buffer offset
    body.extend_from_slice(&(security_blob.len() as u16).to_le_bytes());
    body.extend_from_slice(&0u64.to_le_bytes()); // previous session id
    body.extend_from_slice(security_blob);

    let mut msg = smb2_header(CMD_SESSION_SETUP, message_id, session_id);
    msg.extend_from_slice(&body);
    msg
}

/// GSS-API initial token: [APPLICATION 0] { SPNEGO OID, [0] NegTokenInit {
/// [0] mechTypes, [2] mechToken } }
fn spnego_init(ntlm_token: &[u8]) -> Vec<u8> {
    let mech_types = asn1::explicit(0, &asn1::sequence(&asn1::oid(NTLMSSP_OID)));
    let mech_token = asn1::explicit(2, &asn1::octet_string(ntlm_token));
    let mut init = mech_types;
    init.extend_from_slice(&mech_token);
    let neg_token_init = asn1::explicit(0, &asn1::sequence(&init));

    let mut gss = asn1::oid(SPNEGO_OID);
    gss.extend_from_slice(&neg_token_init);
    asn1::tlv(0x60, &gss) // [APPLICATION 0] constructed
}

/// NegTokenResp carrying the authenticate message: [1] { [2] responseToken }
fn spnego_response(ntlm_token: &[u8]) -> Vec<u8> {
    let response_token = asn1::explicit(2, &asn1::octet_string(ntlm_token));
    asn1::explicit(1, &asn1::sequence(&response_token))
}

async fn send_message(conn: &mut TcpStream, msg: &[u8]) -> Result<()> {
    // direct-TCP transport: zero byte + 3-byte big-endian length
    let len = msg.len();
    let framing = [
        0u8,
        ((len >> 16) & 0xff) as u8,
        ((len >> 8) & 0xff) as u8,
        (len & 0xff) as u8,
    ];
    conn.write_all(&framing).await?;
    conn.write_all(msg).await?;
    Ok(())
}

async fn read_message(conn: &mut TcpStream) -> Result<Vec<u8>> {
    let mut framing = [0u8; 4];
    conn.read_exact(&mut framing).await?;
    let len = ((framing[1] as usize) << 16) | ((framing[2] as usize) << 8) | framing[3] as usize;
    if !(64..=1 << 20).contains(&len) {
        return Err(anyhow!("invalid SMB message length {}", len));
    }
    let mut msg = vec![0u8; len];
    conn.read_exact(&mut msg).await?;
    if &msg[..4] != SMB2_MAGIC {
        return Err(anyhow!("not an SMB2 message"));
    }
    Ok(msg)
}

fn header_status(msg: &[u8]) -> u32 {
    u32::from_le_bytes([msg[8], msg[9], msg[10], msg[11]])
}

fn header_session_id(msg: &[u8]) -> u64 {
    u64::from_le_bytes([
        msg[40], msg[41], msg[42], msg[43], msg[44], msg[45], msg[46], msg[47],
    ])
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let (domain, username) = ntlm::split_domain(&credential.username);

    let mut conn = dialer.dial(&target.addr()).await?;

    send_message(&mut conn, &negotiate_request()).await?;
    let negotiate_resp = read_message(&mut conn).await?;
    if header_status(&negotiate_resp) != STATUS_SUCCESS {
        return Err(anyhow!(
            "SMB negotiate failed with status 0x{:08x}",
            header_status(&negotiate_resp)
        ));
    }

    // First leg: NTLM negotiate.
    let blob = spnego_init(&ntlm::negotiate_message());
    send_message(&mut conn, &session_setup_request(1, 0, &blob)).await?;
    let setup_resp = read_message(&mut conn).await?;

    let status = header_status(&setup_resp);
    if status != STATUS_MORE_PROCESSING_REQUIRED {
        if REJECTION_STATUSES.contains(&status) {
            return Ok(false);
        }
        return Err(anyhow!("unexpected session setup status 0x{:08x}", status));
    }
    let session_id = header_session_id(&setup_resp);

    // Pull the NTLM challenge out of the SPNEGO response blob.
    let challenge_token = setup_resp
        .windows(ntlm::SIGNATURE.len())
        .position(|w| w == ntlm::SIGNATURE)
        .map(|idx| &setup_resp[idx..])
        .ok_or_else(|| anyhow!("no NTLM challenge in session setup response"))?;
    let challenge = ntlm::parse_challenge(challenge_token)?;

    // Second leg: NTLM authenticate.
    let auth =
        ntlm::authenticate_message(&challenge, domain, username, &credential.password);
    let blob = spnego_response(&auth);
    send_message(&mut conn, &session_setup_request(2, session_id, &blob)).await?;
    let final_resp = read_message(&mut conn).await?;

    let status = header_status(&final_resp);
    if status == STATUS_SUCCESS {
        return Ok(true);
    }
    if REJECTION_STATUSES.contains(&status) {
        return Ok(false);
    }
    Err(anyhow!("session setup failed with status 0x{:08x}", status))
}
