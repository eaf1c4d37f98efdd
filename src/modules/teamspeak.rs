//! TeamSpeak 3 ServerQuery login (port 10011). Text protocol: `login user
//! pass`, answered with an `error id=... msg=...` line; id=0 means ok.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
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
    let conn = dialer.dial(&target.addr()).await?;
    let mut stream = BufReader::new(conn);

    let mut greeting = String::new();
    stream.read_line(&mut greeting).await?;
    if !greeting.starts_with("TS3") {
        return Err(anyhow!("unexpected ServerQuery greeting: {:?}", greeting.trim_end()));
    }
    // banner line ("Welcome to the TeamSpeak 3 ServerQuery interface...")
    let mut banner = String::new();
    stream.read_line(&mut banner).await?;

    let cmd = format!(
        "login {} {}\n",
        escape(&credential.username),
        escape(&credential.password)
    );
    stream.get_mut().write_all(cmd.as_bytes()).await?;

    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(anyhow!("ServerQuery closed connection before error line"));
        }
        if line.starts_with("error ") {
            return Ok(line.contains("id=0 "));
        }
    }
}

/// ServerQuery escaping for the handful of characters that can appear in
/// credentials.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('/', "\\/")
        .replace(' ', "\\s")
        .replace('|', "\\p")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn query_escaping() {
        assert_eq!(escape("a b"), "a\\sb");
        assert_eq!(escape("p|w"), "p\\pw");
    }

    #[tokio::test]
    async fn error_id_zero_is_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface\n\r")
                .await
                .unwrap();
            let mut buf = [0u8; 128];
            let n = conn.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"login serveradmin "));
            conn.write_all(b"error id=0 msg=ok\n\r").await.unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("serveradmin", "secret"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn invalid_login_id_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"TS3\n\rWelcome\n\r").await.unwrap();
            let mut buf = [0u8; 128];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b"error id=520 msg=invalid\\sloginname\\sor\\spassword\n\r")
                .await
                .unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("serveradmin", "bad"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }
}
