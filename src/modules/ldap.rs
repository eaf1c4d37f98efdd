//! LDAP simple bind (port 389, LDAPS on 636). The two PDUs involved are
//! built directly as DER: a BindRequest with the DN as the name and the
//! password in the simple-auth choice, and the BindResponse read back.
//! Result code 49 (invalidCredentials) is a rejection; everything else
//! non-zero is treated as a connection-level failure.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{asn1, dial_maybe_tls, AsyncStream, Credential, Target};

const APPLICATION_BIND_REQUEST: u8 = 0x60;
const APPLICATION_BIND_RESPONSE: u8 = 0x61;
const CONTEXT_SIMPLE_AUTH: u8 = 0x80;
const TAG_ENUMERATED: u8 = 0x0A;

const RESULT_SUCCESS: i64 = 0;
const RESULT_INVALID_CREDENTIALS: i64 = 49;

/// LDAPMessage { messageID 1, bindRequest { version 3, name, simple } }
pub fn bind_request(dn: &str, password: &str) -> Vec<u8> {
    let mut bind = Vec::new();
    bind.extend_from_slice(&asn1::integer(3)); // protocol version
    bind.extend_from_slice(&asn1::octet_string(dn.as_bytes()));
    bind.extend_from_slice(&asn1::tlv(CONTEXT_SIMPLE_AUTH, password.as_bytes()));

    let mut msg = Vec::new();
    msg.extend_from_slice(&asn1::integer(1)); // messageID
    msg.extend_from_slice(&asn1::tlv(APPLICATION_BIND_REQUEST, &bind));
    asn1::sequence(&msg)
}

/// Pulls the resultCode out of a BindResponse message.
pub fn parse_bind_response(data: &[u8]) -> Result<i64> {
    let (tag, len, hdr) = asn1::read_header(data).ok_or_else(|| anyhow!("truncated LDAP message"))?;
    if tag != asn1::TAG_SEQUENCE || data.len() < hdr + len {
        return Err(anyhow!("malformed LDAP message"));
    }
    let mut body = &data[hdr..hdr + len];

    // skip messageID
    let (tag, len, hdr) = asn1::read_header(body).ok_or_else(|| anyhow!("truncated messageID"))?;
    if tag != asn1::TAG_INTEGER {
        return Err(anyhow!("expected messageID integer"));
    }
    body = &body[hdr + len..];

    let (tag, len, hdr) =
        asn1::read_header(body).ok_or_else(|| anyhow!("truncated protocolOp"))?;
    if tag != APPLICATION_BIND_RESPONSE {
        return Err(anyhow!("expected BindResponse, got tag 0x{:02x}", tag));
    }
    let response = &body[hdr..hdr + len.min(body.len() - hdr)];

    let (tag, len, hdr) =
        asn1::read_header(response).ok_or_else(|| anyhow!("truncated resultCode"))?;
    if tag != TAG_ENUMERATED || len == 0 || response.len() < hdr + len {
        return Err(anyhow!("expected resultCode enumerated"));
    }
    let mut code: i64 = 0;
    for &b in &response[hdr..hdr + len] {
        code = (code << 8) | b as i64;
    }
    Ok(code)
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut stream = dial_maybe_tls(dialer, target).await?;

    stream
        .write_all(&bind_request(&credential.username, &credential.password))
        .await?;

    let response = read_message(&mut stream).await?;
    match parse_bind_response(&response)? {
        RESULT_SUCCESS => Ok(true),
        RESULT_INVALID_CREDENTIALS => Ok(false),
        other => Err(anyhow!("LDAP bind failed with result code {}", other)),
    }
}

/// Reads one full DER message (header + content) off the stream.
async fn read_message(stream: &mut Box<dyn AsyncStream>) -> Result<Vec<u8>> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;

    let mut msg = head.to_vec();
    let content_len = if head[1] < 128 {
        head[1] as usize
    } else {
        let n = (head[1] & 0x7f) as usize;
        if n == 0 || n > 4 {
            return Err(anyhow!("unsupported LDAP length encoding"));
        }
        let mut len_bytes = vec![0u8; n];
        stream.read_exact(&mut len_bytes).await?;
        msg.extend_from_slice(&len_bytes);
        len_bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
    };
    if content_len > 1 << 20 {
        return Err(anyhow!("oversized LDAP message"));
    }
    let mut content = vec![0u8; content_len];
    stream.read_exact(&mut content).await?;
    msg.extend_from_slice(&content);
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn bind_response(code: i64) -> Vec<u8> {
        let mut resp = Vec::new();
        resp.extend_from_slice(&asn1::tlv(TAG_ENUMERATED, &[code as u8]));
        resp.extend_from_slice(&asn1::octet_string(b"")); // matchedDN
        resp.extend_from_slice(&asn1::octet_string(b"")); // diagnosticMessage
        let mut msg = Vec::new();
        msg.extend_from_slice(&asn1::integer(1));
        msg.extend_from_slice(&asn1::tlv(APPLICATION_BIND_RESPONSE, &resp));
        asn1::sequence(&msg)
    }

    #[test]
    fn bind_request_shape() {
        let req = bind_request("cn=admin,dc=example,dc=com", "admin");
        assert_eq!(req[0], asn1::TAG_SEQUENCE);
        // DN appears verbatim inside the request
        let needle = b"cn=admin,dc=example,dc=com";
        assert!(req.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn bind_response_parsing() {
        assert_eq!(parse_bind_response(&bind_response(0)).unwrap(), 0);
        assert_eq!(parse_bind_response(&bind_response(49)).unwrap(), 49);
        assert!(parse_bind_response(&[0x30, 0x01]).is_err());
    }

    async fn fake_ldap(listener: TcpListener, password: &'static str) {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let n = conn.read(&mut buf).await.unwrap();
        let pw = password.as_bytes();
        let matched = buf[..n].windows(pw.len() + 2).any(|w| {
            w[0] == CONTEXT_SIMPLE_AUTH && w[1] as usize == pw.len() && &w[2..] == pw
        });
        let code = if matched { 0 } else { 49 };
        conn.write_all(&bind_response(code)).await.unwrap();
    }

    #[tokio::test]
    async fn successful_bind() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(fake_ldap(listener, "admin"));

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("cn=admin,dc=example,dc=com", "admin"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn invalid_credentials_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(fake_ldap(listener, "admin"));

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("cn=admin,dc=example,dc=com", "wrong"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn unwilling_to_perform_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(&bind_response(53)).await.unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let res = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("cn=admin,dc=example,dc=com", "pw"),
        )
        .await;
        assert!(res.is_err());
    }
}
