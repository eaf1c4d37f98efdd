//! SNMP v2c community string check (port 161/UDP). Sends a GetRequest for
//! sysDescr.0; any well-formed, non-empty response means the community is
//! valid. The password field carries the community string; the username is
//! ignored.
//!
//! SNMP runs over UDP, which cannot flow through a SOCKS5 proxy, so this
//! module always dials directly.

use std::time::Duration;

use anyhow::Result;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::common::dialer::Dialer;
use crate::modules::{asn1, Credential, Target};

const SYS_DESCR_OID: &str = "1.3.6.1.2.1.1.1.0";
const PDU_GET_REQUEST: u8 = 0xA0;
const VERSION_2C: i64 = 1;

pub fn get_request(community: &str, request_id: i64) -> Vec<u8> {
    let varbind = asn1::sequence(
        &[asn1::oid(SYS_DESCR_OID), asn1::null()].concat(),
    );
    let varbinds = asn1::sequence(&varbind);

    let mut pdu_body = Vec::new();
    pdu_body.extend_from_slice(&asn1::integer(request_id));
    pdu_body.extend_from_slice(&asn1::integer(0)); // error-status
    pdu_body.extend_from_slice(&asn1::integer(0)); // error-index
    pdu_body.extend_from_slice(&varbinds);
    let pdu = asn1::tlv(PDU_GET_REQUEST, &pdu_body);

    let mut msg = Vec::new();
    msg.extend_from_slice(&asn1::integer(VERSION_2C));
    msg.extend_from_slice(&asn1::octet_string(community.as_bytes()));
    msg.extend_from_slice(&pdu);
    asn1::sequence(&msg)
}

/// Scans a response for a non-empty OCTET STRING payload (the sysDescr
/// value). Skips the community string echo by requiring a value longer than
/// the community we sent when they match.
pub fn response_has_value(response: &[u8], community: &str) -> bool {
    if response.first() != Some(&asn1::TAG_SEQUENCE) {
        return false;
    }
    let mut i = 0;
    while i + 1 < response.len() {
        if response[i] == asn1::TAG_OCTET_STRING {
            if let Some((_, len, hdr)) = asn1::read_header(&response[i..]) {
                if len > 0 && i + hdr + len <= response.len() {
                    let value = &response[i + hdr..i + hdr + len];
                    if value != community.as_bytes() {
                        return true;
                    }
                }
            }
        }
        i += 1;
    }
    false
}

pub async fn check(
    _token: &CancellationToken,
    _dialer: &Dialer,
    wait: Duration,
    target: &Target,
    credential: &Credential,
) -> Result<bool> {
    let community = &credential.password;
    let request = get_request(community, rand::random::<u16>() as i64);

    let bind_addr = if target.ip.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.send_to(&request, (target.ip, target.port)).await?;

    let mut buf = [0u8; 2048];
    match timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((n, _))) if n > 0 => Ok(response_has_value(&buf[..n], community)),
        Ok(Ok(_)) => Ok(false),
        Ok(Err(e)) => Err(e.into()),
        // no response: wrong community string or SNMP filtered
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::tests_support::token;
    use crate::modules::Target;

    #[test]
    fn get_request_shape() {
        let pkt = get_request("public", 7);
        assert_eq!(pkt[0], asn1::TAG_SEQUENCE);
        // version 2c
        assert_eq!(&pkt[2..5], &[0x02, 0x01, 0x01]);
        // community string follows
        assert_eq!(pkt[5], asn1::TAG_OCTET_STRING);
        assert_eq!(pkt[6] as usize, "public".len());
        assert_eq!(&pkt[7..13], b"public");
        // GetRequest PDU tag present
        assert!(pkt.contains(&PDU_GET_REQUEST));
    }

    #[test]
    fn response_value_detection() {
        // A response embedding a sysDescr string
        let mut varbind = Vec::new();
        varbind.extend_from_slice(&asn1::oid(SYS_DESCR_OID));
        varbind.extend_from_slice(&asn1::octet_string(b"Linux router 5.10"));
        let mut msg = Vec::new();
        msg.extend_from_slice(&asn1::integer(VERSION_2C));
        msg.extend_from_slice(&asn1::octet_string(b"public"));
        msg.extend_from_slice(&asn1::tlv(0xA2, &asn1::sequence(&asn1::sequence(&varbind))));
        let response = asn1::sequence(&msg);

        assert!(response_has_value(&response, "public"));
        // a community echo alone is not a value
        let mut bare = Vec::new();
        bare.extend_from_slice(&asn1::integer(VERSION_2C));
        bare.extend_from_slice(&asn1::octet_string(b"public"));
        let bare = asn1::sequence(&bare);
        assert!(!response_has_value(&bare, "public"));
    }

    #[tokio::test]
    async fn no_response_is_a_rejection() {
        // Nothing listens on this socket; recv must time out into Ok(false)
        let target = Target::new("127.0.0.1".parse().unwrap(), 49163, "127.0.0.1:49163".into());
        let dialer = crate::common::dialer::Dialer::direct(Duration::from_millis(300));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_millis(300),
            &target,
            &Credential::new("", "public"),
        )
        .await
        .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn scripted_agent_response_is_accepted() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut varbind = Vec::new();
            varbind.extend_from_slice(&asn1::oid(SYS_DESCR_OID));
            varbind.extend_from_slice(&asn1::octet_string(b"Test agent"));
            let mut msg = Vec::new();
            msg.extend_from_slice(&asn1::integer(VERSION_2C));
            msg.extend_from_slice(&asn1::octet_string(b"public"));
            msg.extend_from_slice(&asn1::tlv(
                0xA2,
                &asn1::sequence(&asn1::sequence(&varbind)),
            ));
            server.send_to(&asn1::sequence(&msg), peer).await.unwrap();
        });

        let target = Target::new(addr.ip(), addr.port(), addr.to_string());
        let dialer = crate::common::dialer::Dialer::direct(Duration::from_secs(2));
        let ok = check(
            &token(),
            &dialer,
            Duration::from_secs(2),
            &target,
            &Credential::new("", "public"),
        )
        .await
        .unwrap();
        assert!(ok);
    }
}
