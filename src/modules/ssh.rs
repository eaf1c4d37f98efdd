//! SSH password authentication (port 22). The libssh2 session is blocking,
//! so the handshake and auth run inside `spawn_blocking` on a socket the
//! dialer opened (keeping proxy and interface binding in effect).
//!
//! Servers that only offer publickey auth are reported as a connection
//! error, not a rejection, so the retry budget stops the host instead of
//! burning the whole wordlist.

use std::time::Duration;

use anyhow::{anyhow, Result};
use ssh2::Session;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    // SSH is always encrypted; the target's encryption flag is not consulted.
    let stream = dialer.dial(&target.addr()).await?;
    let std_stream = stream.into_std()?;
    std_stream.set_nonblocking(false)?;

    let username = credential.username.clone();
    let password = credential.password.clone();

    tokio::task::spawn_blocking(move || {
        let mut session = Session::new()?;
        session.set_timeout(timeout.as_millis() as u32);
        session.set_tcp_stream(std_stream);
        session
            .handshake()
            .map_err(|e| anyhow!("ssh handshake: {}", e))?;

        let methods = session
            .auth_methods(&username)
            .map_err(|e| anyhow!("ssh auth methods: {}", e))?;
        if !methods.contains("password") {
            return Err(anyhow!(
                "server does not support password authentication (offers: {})",
                methods
            ));
        }

        match session.userauth_password(&username, &password) {
            Ok(()) => Ok(true),
            // reached the auth decision; a refusal here is a rejection
            Err(_) => Ok(false),
        }
    })
    .await?
}
