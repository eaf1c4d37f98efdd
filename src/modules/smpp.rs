//! SMPP bind_transceiver authentication (port 2775). The system_id carries
//! the username. Bind response status ESME_RINVPASWD / ESME_RINVSYSID /
//! ESME_RBINDFAIL / ESME_RINVBNDSTS are rejections; any other non-zero
//! status is a connection-level failure.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, Credential, Target};

const BIND_TRANSCEIVER: u32 = 0x0000_0009;
const BIND_TRANSCEIVER_RESP: u32 = 0x8000_0009;

const ESME_ROK: u32 = 0x0000_0000;
const ESME_RINVBNDSTS: u32 = 0x0000_0004;
const ESME_RBINDFAIL: u32 = 0x0000_000D;
const ESME_RINVPASWD: u32 = 0x0000_000E;
const ESME_RINVSYSID: u32 = 0x0000_000F;

fn c_string(s: &str, max: usize) -> Vec<u8> {
    let mut out = s.as_bytes()[..s.len().min(max)].to_vec();
    out.push(0);
    out
}

pub fn bind_pdu(system_id: &str, password: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&c_string(system_id, 15));
    body.extend_from_slice(&c_string(password, 8));
    body.extend_from_slice(&c_string("", 12)); // system_type
    body.push(0x34); // interface_version 3.4
    body.push(0); // addr_ton
    body.push(0); // addr_npi
    body.extend_from_slice(&c_string("", 40)); // address_range

    let mut pdu = ((16 + body.len()) as u32).to_be_bytes().to_vec();
    pdu.extend_from_slice(&BIND_TRANSCEIVER.to_be_bytes());
    pdu.extend_from_slice(&0u32.to_be_bytes()); // command_status
    pdu.extend_from_slice(&1u32.to_be_bytes()); // sequence_number
    pdu.extend_from_slice(&body);
    pdu
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
        .write_all(&bind_pdu(&credential.username, &credential.password))
        .await?;

    let mut header = [0u8; 16];
    stream.read_exact(&mut header).await?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let command_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let status = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);

    if !(16..=4096).contains(&length) {
        return Err(anyhow!("invalid SMPP PDU length {}", length));
    }
    if command_id != BIND_TRANSCEIVER_RESP {
        return Err(anyhow!("unexpected SMPP command_id 0x{:08x}", command_id));
    }

    match status {
        ESME_ROK => Ok(true),
        ESME_RINVPASWD | ESME_RINVSYSID | ESME_RBINDFAIL | ESME_RINVBNDSTS => Ok(false),
        other => Err(anyhow!("SMPP bind failed with status 0x{:08x}", other)),
    }
}
