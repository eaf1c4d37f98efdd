//! VNC RFB 3.x password authentication. The username is ignored; VNC uses
//! only a password.
//!
//! Handshake: exchange protocol versions, negotiate VNC Authentication
//! (type 2), receive a 16-byte challenge, DES-encrypt both 8-byte halves
//! with a key built from the password's first 8 bytes with every byte's
//! bits reversed (RFB quirk), send the response, read the 4-byte result.

use std::time::Duration;

use anyhow::{anyhow, Result};
use des::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use des::Des;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{Credential, Target};

const SEC_VNC_AUTH: u8 = 2;
const AUTH_OK: u32 = 0;

/// Reverses the bit order of a byte.
pub fn reverse_bits(mut b: u8) -> u8 {
    let mut r = 0u8;
    for _ in 0..8 {
        r = (r << 1) | (b & 1);
        b >>= 1;
    }
    r
}

/// Builds the 8-byte DES key from the password, bits reversed per the RFB
/// spec.
pub fn vnc_des_key(password: &str) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (i, &b) in password.as_bytes().iter().take(8).enumerate() {
        key[i] = reverse_bits(b);
    }
    key
}

/// Encrypts the 16-byte challenge in two DES blocks.
pub fn encrypt_challenge(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    let key = vnc_des_key(password);
    let cipher = Des::new(GenericArray::from_slice(&key));

    let mut response = [0u8; 16];
    for half in 0..2 {
        let mut block = GenericArray::clone_from_slice(&challenge[half * 8..half * 8 + 8]);
        cipher.encrypt_block(&mut block);
        response[half * 8..half * 8 + 8].copy_from_slice(&block);
    }
    response
}

pub async fn check(
    _token: &CancellationToken,
    dialer: &Dialer,
    _timeout: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let mut conn = dialer.dial(&target.addr()).await?;

    // Protocol version handshake.
    let mut ver_buf = [0u8; 12];
    conn.read_exact(&mut ver_buf).await?;
    let server_ver = std::str::from_utf8(&ver_buf)
        .map_err(|_| anyhow!("invalid VNC server version"))?;
    let (major, minor) = parse_version(server_ver)
        .ok_or_else(|| anyhow!("invalid VNC server version: {:?}", server_ver))?;

    // Answer with 3.8 when supported, otherwise match the server.
    let client_ver = if major < 3 || (major == 3 && minor < 7) {
        format!("RFB {:03}.{:03}\n", major, minor)
    } else {
        "RFB 003.008\n".to_string()
    };
    conn.write_all(client_ver.as_bytes()).await?;

    // Security handshake (shape differs by version).
    if major == 3 && minor < 7 {
        // RFB 3.3: single u32 security type chosen by the server.
        let mut sec = [0u8; 4];
        conn.read_exact(&mut sec).await?;
        let sec_type = u32::from_be_bytes(sec);
        if sec_type == 0 {
            return Err(read_failure_reason(&mut conn).await);
        }
        if sec_type != SEC_VNC_AUTH as u32 {
            return Err(anyhow!(
                "server requires security type {}, not VNC auth",
                sec_type
            ));
        }
    } else {
        // RFB 3.7+: list of security types, client picks one.
        let mut num = [0u8; 1];
        conn.read_exact(&mut num).await?;
        if num[0] == 0 {
            return Err(read_failure_reason(&mut conn).await);
        }
        let mut types = vec![0u8; num[0] as usize];
        conn.read_exact(&mut types).await?;
        if !types.contains(&SEC_VNC_AUTH) {
            return Err(anyhow!("server does not support VNC authentication"));
        }
        conn.write_all(&[SEC_VNC_AUTH]).await?;
    }

    // DES challenge-response.
    let mut challenge = [0u8; 16];
    conn.read_exact(&mut challenge).await?;
    let response = encrypt_challenge(&credential.password, &challenge);
    conn.write_all(&response).await?;

    let mut result = [0u8; 4];
    conn.read_exact(&mut result).await?;
    // 1 = failed; some servers send 2 for "too many attempts"
    Ok(u32::from_be_bytes(result) == AUTH_OK)
}

fn parse_version(s: &str) -> Option<(u32, u32)> {
    // "RFB 003.008\n"
    let rest = s.strip_prefix("RFB ")?;
    let (major, minor) = rest.trim_end().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

async fn read_failure_reason(conn: &mut tokio::net::TcpStream) -> anyhow::Error {
    let mut len_buf = [0u8; 4];
    if conn.read_exact(&mut len_buf).await.is_err() {
        return anyhow!("VNC connection failed (could not read reason)");
    }
    let len = (u32::from_be_bytes(len_buf) as usize).min(4096);
    let mut reason = vec![0u8; len];
    if conn.read_exact(&mut reason).await.is_err() {
        return anyhow!("VNC connection failed (could not read reason)");
    }
    anyhow!(
        "VNC server refused: {}",
        String::from_utf8_lossy(&reason).trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::{plain_target, token};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[test]
    fn bit_reversal() {
        assert_eq!(reverse_bits(0b1000_0000), 0b0000_0001);
        assert_eq!(reverse_bits(0b1111_0000), 0b0000_1111);
        assert_eq!(reverse_bits(0b1010_1010), 0b0101_0101);
        assert_eq!(reverse_bits(0xFF), 0xFF);
        assert_eq!(reverse_bits(0x00), 0x00);
    }

    #[test]
    fn key_is_built_from_reversed_password_bytes() {
        let key = vnc_des_key("Password");
        let expected: Vec<u8> = "Password".bytes().map(reverse_bits).collect();
        assert_eq!(&key[..], expected.as_slice());
        // short passwords are zero padded
        let key = vnc_des_key("ab");
        assert_eq!(&key[2..], &[0u8; 6]);
    }

    async fn fake_vnc(mut conn: TcpStream, password: &str) {
        conn.write_all(b"RFB 003.008\n").await.unwrap();
        let mut ver = [0u8; 12];
        conn.read_exact(&mut ver).await.unwrap();

        conn.write_all(&[1, SEC_VNC_AUTH]).await.unwrap();
        let mut sel = [0u8; 1];
        conn.read_exact(&mut sel).await.unwrap();
        assert_eq!(sel[0], SEC_VNC_AUTH);

        let challenge: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        conn.write_all(&challenge).await.unwrap();

        let mut response = [0u8; 16];
        conn.read_exact(&mut response).await.unwrap();

        let expected = encrypt_challenge(password, &challenge);
        let result: u32 = if response == expected { 0 } else { 1 };
        conn.write_all(&result.to_be_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn correct_password_is_accepted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            fake_vnc(conn, "secret").await;
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("", "secret"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            fake_vnc(conn, "secret").await;
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("", "wrong"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn rfb33_single_type_path() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            conn.write_all(b"RFB 003.003\n").await.unwrap();
            let mut ver = [0u8; 12];
            conn.read_exact(&mut ver).await.unwrap();
            // RFB 3.3: server chooses the type directly
            conn.write_all(&2u32.to_be_bytes()).await.unwrap();
            let challenge = [7u8; 16];
            conn.write_all(&challenge).await.unwrap();
            let mut response = [0u8; 16];
            conn.read_exact(&mut response).await.unwrap();
            conn.write_all(&0u32.to_be_bytes()).await.unwrap();
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("", "test"),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn immediate_close_is_not_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = plain_target(listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            drop(conn);
        });

        let dialer = Dialer::direct(Duration::from_secs(2));
        let res = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("", "admin"),
        )
        .await;
        assert!(res.is_err());
    }
}
