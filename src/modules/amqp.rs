//! AMQP 0-9-1 SASL PLAIN authentication (port 5672, TLS on 5671). Speaks
//! the connection handshake directly: protocol header, Connection.Start,
//! Start-Ok with a PLAIN response. Connection.Tune back means the broker
//! accepted the credentials; Connection.Close with reply code 403
//! (ACCESS_REFUSED), or an immediate hangup, means it did not.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{dial_maybe_tls, AsyncStream, Credential, Target};

const PROTOCOL_HEADER: &[u8] = b"AMQP\x00\x00\x09\x01";
const FRAME_METHOD: u8 = 1;
const FRAME_END: u8 = 0xCE;
const CLASS_CONNECTION: u16 = 10;
const METHOD_START: u16 = 10;
const METHOD_START_OK: u16 = 11;
const METHOD_TUNE: u16 = 30;
const METHOD_CLOSE: u16 = 50;
const ACCESS_REFUSED: u16 = 403;

fn shortstr(s: &str) -> Vec<u8> {
    let mut out = vec![s.len() as u8];
    out.extend_from_slice(s.as_bytes());
    out
}

fn longstr(s: &[u8]) -> Vec<u8> {
    let mut out = (s.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(s);
    out
}

/// Connection.Start-Ok with empty client properties and a PLAIN response.
fn start_ok_frame(username: &str, password: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&CLASS_CONNECTION.to_be_bytes());
    payload.extend_from_slice(&METHOD_START_OK.to_be_bytes());
    payload.extend_from_slice(&0u32.to_be_bytes()); // empty client-properties table
    payload.extend_from_slice(&shortstr("PLAIN"));
    let sasl = format!("\0{}\0{}", username, password);
    payload.extend_from_slice(&longstr(sasl.as_bytes()));
    payload.extend_from_slice(&shortstr("en_US"));

    let mut frame = vec![FRAME_METHOD];
    frame.extend_from_slice(&0u16.to_be_bytes()); // channel 0
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    frame.push(FRAME_END);
    frame
}

/// Reads one frame, returning (class, method, arguments).
async fn read_method_frame(stream: &mut Box<dyn AsyncStream>) -> Result<(u16, u16, Vec<u8>)> {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await?;
    if header[0] != FRAME_METHOD {
        return Err(anyhow!("unexpected AMQP frame type {}", header[0]));
    }
    let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;
    if size < 4 || size > 128 * 1024 {
        return Err(anyhow!("invalid AMQP frame size {}", size));
    }
    let mut payload = vec![0u8; size + 1];
    stream.read_exact(&mut payload).await?;
    if payload[size] != FRAME_END {
        return Err(anyhow!("missing AMQP frame end marker"));
    }
    let class = u16::from_be_bytes([payload[0], payload[1]]);
    let method = u16::from_be_bytes([payload[2], payload[3]]);
    payload.truncate(size);
    payload.drain(..4);
    Ok((class, method, payload))
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut stream = dial_maybe_tls(dialer, target).await?;

    stream.write_all(PROTOCOL_HEADER).await?;

    let (class, method, _) = read_method_frame(&mut stream).await?;
    if class != CLASS_CONNECTION || method != METHOD_START {
        return Err(anyhow!(
            "expected Connection.Start, got class {} method {}",
            class,
            method
        ));
    }

    stream
        .write_all(&start_ok_frame(&credential.username, &credential.password))
        .await?;

    match read_method_frame(&mut stream).await {
        Ok((CLASS_CONNECTION, METHOD_TUNE, _)) => Ok(true),
        Ok((CLASS_CONNECTION, METHOD_CLOSE, args)) => {
            if args.len() >= 2 {
                let reply_code = u16::from_be_bytes([args[0], args[1]]);
                if reply_code == ACCESS_REFUSED {
                    return Ok(false);
                }
                return Err(anyhow!("broker closed connection with code {}", reply_code));
            }
            Ok(false)
        }
        Ok((class, method, _)) => Err(anyhow!(
            "unexpected reply to Start-Ok: class {} method {}",
            class,
            method
        )),
        // brokers may hang up without a Close frame on bad credentials
        Err(_) => Ok(false),
    }
}
