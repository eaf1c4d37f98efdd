//! XMPP SASL PLAIN authentication (port 5222). Opens the client stream,
//! waits for stream features, sends the PLAIN initial response and reads
//! `<success/>` or `<failure/>`.

use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, AsyncStream, Credential, Target};

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut stream = dial_maybe_tls(dialer, target).await?;

    let domain = target.sni();
    let open = format!(
        "<?xml version='1.0'?><stream:stream to='{}' xmlns='jabber:client' \
         xmlns:stream='http://etherx.jabber.org/streams' version='1.0'>",
        domain
    );
    stream.write_all(open.as_bytes()).await?;

    read_until(&mut stream, &["<stream:features", "</stream:features>"]).await?;

    let sasl = BASE64.encode(format!(
        "\0{}\0{}",
        credential.username, credential.password
    ));
    let auth = format!(
        "<auth xmlns='urn:ietf:params:xml:ns:xmpp-sasl' mechanism='PLAIN'>{}</auth>",
        sasl
    );
    stream.write_all(auth.as_bytes()).await?;

    let reply = read_until(&mut stream, &["<success", "<failure", "</failure>"]).await?;
    if reply.contains("<success") {
        return Ok(true);
    }
    if reply.contains("<failure") {
        return Ok(false); // not-authorized
    }
    Err(anyhow!("unexpected XMPP SASL reply"))
}

async fn read_until(stream: &mut Box<dyn AsyncStream>, markers: &[&str]) -> Result<String> {
    let mut acc = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(anyhow!("XMPP server closed connection"));
        }
        acc.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&acc).to_string();
        if markers.iter().any(|m| text.contains(m)) {
            return Ok(text);
        }
        if acc.len() > 64 * 1024 {
            return Err(anyhow!("oversized XMPP stream header"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn fake_xmpp(listener: TcpListener, expected_sasl: &'static str) {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = conn.read(&mut buf).await.unwrap();
        conn.write_all(
            b"<?xml version='1.0'?><stream:stream from='test' id='x' \
              xmlns='jabber:client' xmlns:stream='http://etherx.jabber.org/streams'>\
              <stream:features><mechanisms xmlns='urn:ietf:params:xml:ns:xmpp-sasl'>\
              <mechanism>PLAIN</mechanism></mechanisms></stream:features>",
        )
        .await
        .unwrap();

        let n = conn.read(&mut buf).await.unwrap();
        let req = String::from_utf8_lossy(&buf[..n]).to_string();
        if req.contains(expected_sasl) {
            conn.write_all(b"<success xmlns='urn:ietf:params:xml:ns:xmpp-sasl'/>")
                .await
                .unwrap();
        } else {
            conn.write_all(
                b"<failure xmlns='urn:ietf:params:xml:ns:xmpp-sasl'><not-authorized/></failure>",
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn sasl_plain_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        // base64("\0admin\0secret")
        let expected = BASE64.encode("\0admin\0secret");
        let leaked: &'static str = Box::leak(expected.into_boxed_str());
        tokio::spawn(fake_xmpp(listener, leaked));

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
    async fn not_authorized_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(fake_xmpp(listener, "nomatch"));

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
