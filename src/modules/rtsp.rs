//! RTSP authentication (port 554). Tries Basic on a DESCRIBE request first;
//! a 401 carrying a Digest challenge triggers one Digest retry on the same
//! connection.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let addr = target.addr();
    let conn = dialer.dial(&addr).await?;
    let mut stream = BufReader::new(conn);

    let rtsp_url = format!("rtsp://{}/", addr);

    let basic = BASE64.encode(format!("{}:{}", credential.username, credential.password));
    let request = format!(
        "DESCRIBE {} RTSP/1.0\r\nCSeq: 1\r\nAuthorization: Basic {}\r\nAccept: application/sdp\r\n\r\n",
        rtsp_url, basic
    );
    stream.get_mut().write_all(request.as_bytes()).await?;

    let (code, headers) = read_response(&mut stream).await?;
    match code {
        200 => Ok(true),
        403 => Ok(false),
        401 => {
            let www_auth = headers.get("www-authenticate").cloned().unwrap_or_default();
            if !www_auth.to_lowercase().starts_with("digest") {
                return Ok(false); // Basic rejected, no Digest offered
            }
            let auth_header = match build_digest_auth(
                &www_auth,
                &credential.username,
                &credential.password,
                "DESCRIBE",
                &rtsp_url,
            ) {
                Some(h) => h,
                None => return Ok(false), // unparseable challenge
            };
            let digest_req = format!(
                "DESCRIBE {} RTSP/1.0\r\nCSeq: 2\r\nAuthorization: {}\r\nAccept: application/sdp\r\n\r\n",
                rtsp_url, auth_header
            );
            stream.get_mut().write_all(digest_req.as_bytes()).await?;

            let (code2, _) = read_response(&mut stream).await?;
            match code2 {
                200 => Ok(true),
                401 | 403 => Ok(false),
                other => Err(anyhow!("unexpected RTSP status {}", other)),
            }
        }
        other => Err(anyhow!("unexpected RTSP status {}", other)),
    }
}

async fn read_response(
    stream: &mut BufReader<TcpStream>,
) -> Result<(u32, HashMap<String, String>)> {
    let mut status_line = String::new();
    stream.read_line(&mut status_line).await?;
    let mut fields = status_line.split_whitespace();
    let _version = fields
        .next()
        .ok_or_else(|| anyhow!("invalid RTSP response: {:?}", status_line))?;
    let code: u32 = fields
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| anyhow!("non-numeric RTSP status in {:?}", status_line))?;

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        let line = line.trim_end();
        if n == 0 || line.is_empty() {
            break;
        }
        if let Some((key, val)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), val.trim().to_string());
        }
    }
    Ok((code, headers))
}

fn build_digest_auth(
    challenge: &str,
    username: &str,
    password: &str,
    method: &str,
    uri: &str,
) -> Option<String> {
    let params = parse_digest_challenge(challenge);
    let realm = params.get("realm")?;
    let nonce = params.get("nonce")?;

    let ha1 = md5_hex(&format!("{}:{}:{}", username, realm, password));
    let ha2 = md5_hex(&format!("{}:{}", method, uri));
    let cnonce = format!("{:08x}", rand::random::<u32>());
    let nc = "00000001";

    let qop = params.get("qop").map(String::as_str).unwrap_or("");
    let response = if qop.contains("auth") {
        md5_hex(&format!("{}:{}:{}:{}:auth:{}", ha1, nonce, nc, cnonce, ha2))
    } else {
        md5_hex(&format!("{}:{}:{}", ha1, nonce, ha2))
    };

    let mut header = format!(
        r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}""#,
        username, realm, nonce, uri, response
    );
    if qop.contains("auth") {
        header.push_str(&format!(r#", qop=auth, nc={}, cnonce="{}""#, nc, cnonce));
    }
    if let Some(opaque) = params.get("opaque") {
        header.push_str(&format!(r#", opaque="{}""#, opaque));
    }
    Some(header)
}

fn parse_digest_challenge(header: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let body = match header.split_once(' ') {
        Some((_, rest)) => rest,
        None => header,
    };
    for part in body.split(',') {
        if let Some((key, val)) = part.split_once('=') {
            result.insert(
                key.trim().to_lowercase(),
                val.trim().trim_matches('"').to_string(),
            );
        }
    }
    result
}

fn md5_hex(s: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(s.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn digest_challenge_parsing() {
        let params =
            parse_digest_challenge(r#"Digest realm="x", nonce="y", qop="auth""#);
        assert_eq!(params["realm"], "x");
        assert_eq!(params["nonce"], "y");
        assert_eq!(params["qop"], "auth");
    }

    #[test]
    fn digest_response_without_qop() {
        // RFC 2069 style: response = MD5(HA1:nonce:HA2)
        let header =
            build_digest_auth(r#"Digest realm="x", nonce="y""#, "u", "p", "DESCRIBE", "rtsp://h/")
                .unwrap();
        let ha1 = md5_hex("u:x:p");
        let ha2 = md5_hex("DESCRIBE:rtsp://h/");
        let expected = md5_hex(&format!("{}:y:{}", ha1, ha2));
        assert!(header.contains(&format!(r#"response="{}""#, expected)));
        assert!(!header.contains("qop"));
    }

    #[tokio::test]
    async fn basic_accepted_with_200() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = conn.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(req.contains("Authorization: Basic "));
            conn.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").await.unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "admin"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn digest_fallback_after_401() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(
                b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Digest realm=\"x\", nonce=\"y\"\r\n\r\n",
            )
            .await
            .unwrap();

            let n = conn.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).to_string();
            // expected digest response for admin/admin on this challenge
            let ha1 = md5_hex("admin:x:admin");
            let req_uri = req
                .lines()
                .next()
                .unwrap()
                .split_whitespace()
                .nth(1)
                .unwrap()
                .to_string();
            let ha2 = md5_hex(&format!("DESCRIBE:{}", req_uri));
            let expected = md5_hex(&format!("{}:y:{}", ha1, ha2));
            if req.contains(&expected) {
                conn.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n").await.unwrap();
            } else {
                conn.write_all(b"RTSP/1.0 401 Unauthorized\r\nCSeq: 2\r\n\r\n")
                    .await
                    .unwrap();
            }
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "admin"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn plain_401_without_digest_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(
                b"RTSP/1.0 401 Unauthorized\r\nCSeq: 1\r\nWWW-Authenticate: Basic realm=\"x\"\r\n\r\n",
            )
            .await
            .unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "bad"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }
}
