//! Windows Remote Management (ports 5985 HTTP / 5986 HTTPS). POSTs a
//! minimal WS-Man Identify body to `/wsman` with Basic auth, enough to
//! exercise authentication without executing anything. 200 is a success,
//! 401/403 a rejection.

use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::header::{CONTENT_TYPE, HOST};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

const IDENTIFY_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"
            xmlns:wsmid="http://schemas.dmtf.org/wbem/wsman/identity/1/wsmanidentity.xsd">
  <s:Header/>
  <s:Body>
    <wsmid:Identify/>
  </s:Body>
</s:Envelope>"#;

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let scheme = if target.encryption() { "https" } else { "http" };
    let url = format!("{}://{}/wsman", scheme, target.addr());

    let mut request = dialer
        .http_client()
        .post(&url)
        .basic_auth(&credential.username, Some(&credential.password))
        .header(CONTENT_TYPE, "application/soap+xml;charset=UTF-8")
        .body(IDENTIFY_BODY);

    if let Some(host) = target.hostname() {
        request = request.header(HOST, host.to_string());
    }

    let response = request.send().await?;
    match response.status().as_u16() {
        200 => Ok(true),
        401 | 403 => Ok(false),
        other => Err(anyhow!("unexpected status {}", other)),
    }
}
