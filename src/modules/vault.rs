//! HashiCorp Vault userpass login (port 8200). POSTs to
//! `v1/auth/userpass/login/{username}`. A `client_token` in the response,
//! or the "auth methods cannot create root tokens" refusal, which only
//! appears after a correct password, is a success. When the target was
//! given as a hostname the request carries it in the `Host:` header.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::HOST;
use serde_json::json;
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
    let scheme = if target.encryption() { "https" } else { "http" };
    let url = format!(
        "{}://{}/v1/auth/userpass/login/{}",
        scheme,
        target.addr(),
        credential.username
    );

    let mut request = dialer
        .http_client()
        .post(&url)
        .json(&json!({ "password": credential.password }));

    if let Some(host) = target.hostname() {
        request = request.header(HOST, host.to_string());
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    if (status == 200 && body.contains("client_token"))
        || body.contains("auth methods cannot create root tokens")
    {
        return Ok(true);
    }
    if body.contains("invalid username or password") || body.contains("permission denied") {
        return Ok(false);
    }

    Err(anyhow!(
        "invalid server response (status {}), maybe the target is not a vault server",
        status
    ))
}
