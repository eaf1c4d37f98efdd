//! BSD rlogin (port 513). Host-based trust: `\0 client-user\0 server-user\0
//! terminal/speed\0`; a 0x00 response byte means the session was accepted
//! without a password.

use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
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
    let mut conn = dialer.dial(&target.addr()).await?;

    let payload = format!(
        "\0{}\0{}\0vt100/9600\0",
        credential.username, credential.username
    );
    conn.write_all(payload.as_bytes()).await?;

    let mut resp = [0u8; 1];
    conn.read_exact(&mut resp).await?;
    Ok(resp[0] == 0x00)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn trusted_user_is_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 128];
            let n = conn.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"\0root\0root\0vt100/9600\0");
            conn.write_all(&[0x00]).await.unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("root", ""),
        )
        .await
        .unwrap();
        assert!(ok);
    }
}
