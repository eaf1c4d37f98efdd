//! Shared TLS client policy.
//!
//! One template for every module: peer verification off (targets are raided
//! by IP, certs are self-signed more often than not) and a TLS 1.0 floor for
//! legacy appliances. Callers get a fresh connector per call.

use native_tls::{Protocol, TlsConnector};

pub fn tls_connector() -> tokio_native_tls::TlsConnector {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .min_protocol_version(Some(Protocol::Tlsv10))
        .build()
        .expect("TLS connector construction cannot fail with these options");
    tokio_native_tls::TlsConnector::from(connector)
}

/// Same policy as a raw `native_tls` builder, for crates that take their own
/// connector type (suppaftp, postgres-native-tls).
pub fn native_connector() -> TlsConnector {
    TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .min_protocol_version(Some(Protocol::Tlsv10))
        .build()
        .expect("TLS connector construction cannot fail with these options")
}
