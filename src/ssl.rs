//! SSL certificate tracking
//!
//! The tracker completes a TLS handshake with an HTTPS target, accepting any
//! certificate so that broken chains can still be inspected, and reads the
//! leaf certificate's expiry and issuer. Certificate state belongs to the
//! monitor rather than to a single check, so the cycle writes it onto the
//! monitor record and then evaluates [`SslAlert`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, InvalidDnsNameError, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, trace};

use crate::models::SslInfo;

/// Deadline for the whole inspection (connect + handshake)
pub const INSPECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Days before expiry on which an "expiring soon" alert is sent
pub const EXPIRY_ALERT_DAYS: [i64; 5] = [30, 15, 7, 3, 1];

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, thiserror::Error)]
pub enum SslError {
    #[error("invalid server name: {0}")]
    InvalidName(#[from] InvalidDnsNameError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("server presented no certificate")]
    NoCertificate,

    #[error("failed to parse certificate: {0}")]
    Parse(String),
}

/// Certificate notification due after an inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslAlert {
    ExpiringSoon { days: i64 },
    Expired,
}

impl SslAlert {
    /// Exact day matches only: a cadence that skips over a listed day
    /// produces no alert for it.
    pub fn evaluate(days_until_expiry: i64) -> Option<Self> {
        if EXPIRY_ALERT_DAYS.contains(&days_until_expiry) {
            Some(SslAlert::ExpiringSoon {
                days: days_until_expiry,
            })
        } else if days_until_expiry <= 0 {
            Some(SslAlert::Expired)
        } else {
            None
        }
    }
}

/// Whole days left, rounded down
pub fn days_until(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expiry - now).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Extract [`SslInfo`] from a DER encoded certificate
pub fn certificate_info(der: &[u8], now: DateTime<Utc>) -> Result<SslInfo, SslError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der).map_err(|e| SslError::Parse(e.to_string()))?;

    let not_after = cert.validity().not_after.timestamp();
    let cert_expiry = DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| SslError::Parse(format!("expiry out of range: {not_after}")))?;

    let issuer = cert
        .issuer()
        .iter_organization()
        .chain(cert.issuer().iter_common_name())
        .find_map(|attr| attr.as_str().ok())
        .unwrap_or("Unknown")
        .to_string();

    Ok(SslInfo {
        cert_expiry,
        days_until_expiry: days_until(cert_expiry, now),
        issuer,
        valid: cert_expiry > now,
    })
}

/// Performs the certificate inspection for HTTPS monitors
#[derive(Clone)]
pub struct SslTracker {
    connector: TlsConnector,
    timeout: Duration,
}

impl SslTracker {
    pub fn new() -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout: INSPECTION_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Inspect the certificate behind an `https://` URL
    ///
    /// Returns `None` for other schemes and for any failure.
    pub async fn inspect_url(&self, target: &str) -> Option<SslInfo> {
        let url = url::Url::parse(target).ok()?;
        if url.scheme() != "https" {
            return None;
        }
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        self.inspect(host, port).await
    }

    #[instrument(skip(self))]
    pub async fn inspect(&self, host: &str, port: u16) -> Option<SslInfo> {
        match tokio::time::timeout(self.timeout, self.handshake(host, port)).await {
            Ok(Ok(info)) => {
                trace!(
                    "certificate from {} expires in {} days",
                    info.issuer, info.days_until_expiry
                );
                Some(info)
            }
            Ok(Err(e)) => {
                debug!("certificate inspection failed: {e}");
                None
            }
            Err(_) => {
                debug!("certificate inspection timed out");
                None
            }
        }
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<SslInfo, SslError> {
        // IPv6 literals come bracketed out of `Url::host_str`
        let name = host.trim_start_matches('[').trim_end_matches(']');
        let server_name = ServerName::try_from(name.to_string())?;

        let stream = TcpStream::connect((name, port)).await?;
        let tls = self.connector.connect(server_name, stream).await?;

        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(SslError::NoCertificate)?;

        certificate_info(leaf.as_ref(), Utc::now())
    }
}

/// Verifier that accepts every certificate while still checking handshake
/// signatures, so expired or self-signed certificates can be read.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
