//! Remote Desktop Protocol NLA authentication (port 3389). X.224 connection
//! request proposing NLA, TLS upgrade, then CredSSP: TSRequest envelopes
//! carrying NTLMv2 negotiate / challenge / authenticate. A TSRequest with
//! the errorCode context tag `[3]` (0xA3), or a dropped connection after
//! the authenticate message, is a rejection.
//!
//! The username may be given as `DOMAIN\username`.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{asn1, ntlm, Credential, Target};

const TPKT_VERSION: u8 = 3;
const TYPE_RDP_NEG_REQ: u8 = 0x01;
const TYPE_RDP_NEG_RSP: u8 = 0x02;
const TYPE_RDP_NEG_FAIL: u8 = 0x03;
const X224_CONNECTION_CONFIRM: u8 = 0xd0;
const PROTO_NLA: u32 = 0x03; // TLS + CredSSP

/// CredSSP frames larger than this are treated as errors.
const MAX_TS_REQUEST: usize = 65_536;

/// X.224 Connection Request with an RDP Negotiation Request proposing NLA.
fn x224_connection_request() -> Vec<u8> {
    let mut neg_req = vec![TYPE_RDP_NEG_REQ, 0x00, 0x08, 0x00];
    neg_req.extend_from_slice(&PROTO_NLA.to_le_bytes());

    let mut x224 = vec![
        (6 + neg_req.len()) as u8, // length indicator
        0xe0, // CR
        0x00, 0x00, // dst-ref
        0x00, 0x00, // src-ref
        0x00, // class
    ];
    x224.extend_from_slice(&neg_req);

    let total = 4 + x224.len();
    let mut pkt = vec![TPKT_VERSION, 0x00, (total >> 8) as u8, (total & 0xff) as u8];
    pkt.extend_from_slice(&x224);
    pkt
}

/// Reads the X.224 Connection Confirm and checks the negotiation response
/// selected NLA (or TLS-with-NLA).
async fn read_connection_confirm(conn: &mut TcpStream) -> Result<bool> {
    let mut tpkt = [0u8; 4];
    conn.read_exact(&mut tpkt).await?;
    if tpkt[0] != TPKT_VERSION {
        return Err(anyhow!("invalid tpkt version {}", tpkt[0]));
    }
    let pkt_len = u16::from_be_bytes([tpkt[2], tpkt[3]]) as usize;
    if !(7..=1024).contains(&pkt_len) {
        return Err(anyhow!("invalid tpkt length {}", pkt_len));
    }

    let mut data = vec![0u8; pkt_len - 4];
    conn.read_exact(&mut data).await?;

    if data.len() < 2 || data[1] != X224_CONNECTION_CONFIRM {
        return Err(anyhow!("not a connection confirm"));
    }

    // Scan for the negotiation response in the payload.
    for i in 1..data.len().saturating_sub(7) {
        if data[i] == TYPE_RDP_NEG_RSP {
            let selected = u32::from_le_bytes([
                data[i + 4],
                data[i + 5],
                data[i + 6],
                data[i + 7],
            ]);
            return Ok(selected & PROTO_NLA != 0);
        }
        if data[i] == TYPE_RDP_NEG_FAIL {
            return Err(anyhow!("RDP negotiation failure"));
        }
    }
    // No response: server speaks only standard RDP security.
    Ok(false)
}

/// TSRequest ::= SEQUENCE { version [0], negoTokens [1] }
fn ts_request(version: i64, nego_token: &[u8]) -> Vec<u8> {
    let mut inner = asn1::explicit(0, &asn1::integer(version));
    let token_seq = asn1::sequence(&asn1::explicit(0, &asn1::octet_string(nego_token)));
    let tokens = asn1::sequence(&token_seq);
    inner.extend_from_slice(&asn1::explicit(1, &tokens));
    asn1::sequence(&inner)
}

/// Reads one DER-framed TSRequest off the TLS stream, enforcing the frame
/// size cap.
async fn read_ts_request(conn: &mut TlsStream<TcpStream>) -> Result<Vec<u8>> {
    let mut head = [0u8; 2];
    conn.read_exact(&mut head).await?;

    let mut msg = head.to_vec();
    let content_len = if head[1] < 128 {
        head[1] as usize
    } else {
        let n = (head[1] & 0x7f) as usize;
        if n == 0 || n > 4 {
            return Err(anyhow!("unsupported TSRequest length encoding"));
        }
        let mut len_bytes = vec![0u8; n];
        conn.read_exact(&mut len_bytes).await?;
        msg.extend_from_slice(&len_bytes);
        len_bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
    };
    if content_len > MAX_TS_REQUEST {
        return Err(anyhow!("TSRequest too large: {}", content_len));
    }
    let mut content = vec![0u8; content_len];
    conn.read_exact(&mut content).await?;
    msg.extend_from_slice(&content);
    Ok(msg)
}

fn extract_ntlm_token(ts_request: &[u8]) -> Result<&[u8]> {
    ts_request
        .windows(ntlm::SIGNATURE.len())
        .position(|w| w == ntlm::SIGNATURE)
        .map(|idx| &ts_request[idx..])
        .ok_or_else(|| anyhow!("no NTLM message in TSRequest"))
}

/// errorCode is `[3]` in TSRequest; its presence means the server refused
/// the credentials.
fn has_credssp_error(ts_request: &[u8]) -> bool {
    ts_request.contains(&0xa3)
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

    conn.write_all(&x224_connection_request()).await?;
    if !read_connection_confirm(&mut conn).await? {
        return Err(anyhow!("server does not support NLA"));
    }

    let connector = crate::common::tls::tls_connector();
    let mut tls_conn = connector
        .connect(&target.sni(), conn)
        .await
        .map_err(|e| anyhow!("tls handshake: {}", e))?;

    // CredSSP exchange: negotiate, challenge, authenticate.
    tls_conn
        .write_all(&ts_request(1, &ntlm::negotiate_message()))
        .await?;

    let challenge_ts = read_ts_request(&mut tls_conn).await?;
    let challenge = ntlm::parse_challenge(extract_ntlm_token(&challenge_ts)?)?;

    let auth_msg =
        ntlm::authenticate_message(&challenge, domain, username, &credential.password);
    tls_conn.write_all(&ts_request(3, &auth_msg)).await?;

    match read_ts_request(&mut tls_conn).await {
        // connection closed after authenticate = refused
        Err(_) => Ok(false),
        Ok(resp) => Ok(!has_credssp_error(&resp)),
    }
}
