//! IRC server password authentication. Sends PASS/NICK/USER and waits for
//! 001 (welcome) or 464 (password mismatch).

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

    let registration = format!(
        "PASS {}\r\nNICK {}\r\nUSER {} 0 * :{}\r\n",
        credential.password, credential.username, credential.username, credential.username
    );
    stream.get_mut().write_all(registration.as_bytes()).await?;

    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(anyhow!("IRC server closed connection during registration"));
        }
        if line.contains(" 001 ") {
            return Ok(true); // RPL_WELCOME
        }
        if line.contains(" 464 ") {
            return Ok(false); // ERR_PASSWDMISMATCH
        }
        // 433 ERR_NICKNAMEINUSE and notices: keep reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn welcome_numeric_is_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b":irc.test NOTICE * :*** Looking up your hostname\r\n")
                .await
                .unwrap();
            conn.write_all(b":irc.test 001 netbrute :Welcome to the network\r\n")
                .await
                .unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("netbrute", "secret"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn password_mismatch_numeric_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = conn.read(&mut buf).await.unwrap();
            conn.write_all(b":irc.test 464 * :Password incorrect\r\n")
                .await
                .unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("netbrute", "bad"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }
}
