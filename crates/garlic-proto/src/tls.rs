//! TLS transport for the link layer.
//!
//! Tor's OR-port TLS is not a PKI in the web sense: relay certificates
//! are self-signed and link-layer security comes from the ntor
//! handshake's own key material, not from chain validation. This
//! client therefore accepts any certificate the peer presents and
//! relies entirely on the ntor handshake (§4.2) for the anonymity
//! properties it does provide. This is a deliberate, documented
//! departure from Web PKI practice, not an oversight.

use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

/// A verifier that accepts every certificate chain, unconditionally.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PKCS1_SHA1,
        ]
    }
}

fn connector() -> TlsConnector {
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// A development hook rewriting `(ip, port)` immediately before the TCP
/// dial, letting a test harness redirect OR
/// connections to a local stub without the protocol engine noticing.
pub type AddressMapFn = dyn Fn(std::net::SocketAddr) -> std::net::SocketAddr + Send + Sync;

static ADDRESS_MAP: std::sync::OnceLock<std::sync::RwLock<Option<Arc<AddressMapFn>>>> = std::sync::OnceLock::new();

fn address_map_slot() -> &'static std::sync::RwLock<Option<Arc<AddressMapFn>>> {
    ADDRESS_MAP.get_or_init(|| std::sync::RwLock::new(None))
}

/// Install (or clear, with `None`) the process-wide address-map hook.
/// Every call to [`connect`] consults this immediately before dialing.
pub fn set_address_map(f: Option<Arc<AddressMapFn>>) {
    *address_map_slot().write().expect("address map lock poisoned") = f;
}

/// Dial `addr` over TCP and upgrade to TLS, accepting whatever
/// certificate the relay presents.
pub async fn connect(addr: std::net::SocketAddr) -> std::io::Result<TlsStream<TcpStream>> {
    let addr = match address_map_slot().read().expect("address map lock poisoned").as_ref() {
        Some(f) => f(addr),
        None => addr,
    };
    let tcp = TcpStream::connect(addr).await?;
    tcp.set_nodelay(true)?;
    let name = ServerName::IpAddress(addr.ip().into());
    connector()
        .connect(name, tcp)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}
