//! POP3 USER/PASS authentication (RFC 1939). Plain TCP on 110, TLS on 995.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, Credential, Target};

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let stream = dial_maybe_tls(dialer, target).await?;
    let mut stream = BufReader::new(stream);

    let mut greeting = String::new();
    stream.read_line(&mut greeting).await?;
    if !greeting.starts_with("+OK") {
        return Err(anyhow!("unexpected POP3 greeting: {:?}", greeting.trim_end()));
    }

    stream
        .get_mut()
        .write_all(format!("USER {}\r\n", credential.username).as_bytes())
        .await?;
    let mut user_resp = String::new();
    stream.read_line(&mut user_resp).await?;
    if !user_resp.starts_with("+OK") {
        // USER rejected: auth failure, not a connection problem
        return Ok(false);
    }

    stream
        .get_mut()
        .write_all(format!("PASS {}\r\n", credential.password).as_bytes())
        .await?;
    let mut pass_resp = String::new();
    stream.read_line(&mut pass_resp).await?;

    // -ERR = wrong password or locked mailbox
    Ok(pass_resp.starts_with("+OK"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn fake_pop3(listener: TcpListener, password: &'static str) {
        let (mut conn, _) = listener.accept().await.unwrap();
        conn.write_all(b"+OK POP3 ready\r\n").await.unwrap();

        let mut buf = [0u8; 256];
        let n = conn.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"USER "));
        conn.write_all(b"+OK\r\n").await.unwrap();

        let n = conn.read(&mut buf).await.unwrap();
        let line = String::from_utf8_lossy(&buf[..n]).to_string();
        if line.trim_end() == format!("PASS {}", password) {
            conn.write_all(b"+OK logged in\r\n").await.unwrap();
        } else {
            conn.write_all(b"-ERR authentication failed\r\n").await.unwrap();
        }
    }

    #[tokio::test]
    async fn correct_password_is_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(fake_pop3(listener, "secret"));

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "secret"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_without_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(fake_pop3(listener, "secret"));

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "wrong"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let target = plain_target(addr);

        let dialer = Dialer::direct(Duration::from_secs(2));
        let res = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("admin", "secret"),
        )
        .await;
        assert!(res.is_err());
    }
}
