use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use hickory_resolver::TokioResolver;
use reqwest::header::LOCATION;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use url::{Host, Url};
use x509_parser::prelude::*;

use super::types::{CheckDetail, CheckStatus, CheckType, DnsDetail, HealthCheck, HttpDetail, TlsDetail};
use crate::config::Target;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: u32 = 10;
const DEFAULT_TLS_PORT: u16 = 443;

/// A probe for one check type.
///
/// Never fails: every failure mode is a terminal status on the returned check.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, target: &Target) -> HealthCheck;
}

/// HTTP checker, follows redirects itself so they can be counted
pub struct HttpChecker {
    client: reqwest::Client,
}

struct Fetched {
    status_code: u16,
    final_url: String,
    redirects: u32,
    content_length: u64,
    headers: BTreeMap<String, String>,
}

enum FetchError {
    Request(reqwest::Error),
    InvalidUrl(String),
    Redirect(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Request(e)
    }
}

impl HttpChecker {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    async fn fetch(&self, start: &str, request_timeout: Duration) -> Result<Fetched, FetchError> {
        let mut url = Url::parse(start).map_err(|e| FetchError::InvalidUrl(format!("Invalid URL '{start}': {e}")))?;
        let mut redirects = 0;

        loop {
            let response = self.client.get(url.clone()).timeout(request_timeout).send().await?;

            if response.status().is_redirection() && redirects < MAX_REDIRECTS {
                if let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                    url = url
                        .join(location)
                        .map_err(|e| FetchError::Redirect(format!("Invalid redirect location '{location}': {e}")))?;
                    redirects += 1;
                    continue;
                }
            }

            let status_code = response.status().as_u16();
            let final_url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
                .collect();
            let body = response.bytes().await?;

            return Ok(Fetched {
                status_code,
                final_url,
                redirects,
                content_length: body.len() as u64,
                headers,
            });
        }
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &Target) -> HealthCheck {
        let check = HealthCheck::new(CheckType::Http, &target.url);
        let request_timeout = Duration::from_secs(target.timeout);
        let start = Instant::now();

        // Redirect hops each carry the timeout; the outer bound covers the whole chain
        match timeout(request_timeout, self.fetch(&target.url, request_timeout)).await {
            Err(_) => check.failed(CheckStatus::Timeout, target.timeout as f64, "Request timed out"),
            Ok(Err(FetchError::Request(e))) if e.is_timeout() => {
                check.failed(CheckStatus::Timeout, target.timeout as f64, "Request timed out")
            }
            Ok(Err(FetchError::Request(e))) if e.is_connect() => {
                check.failed(CheckStatus::ConnectionError, 0.0, format!("Connection failed: {e}"))
            }
            Ok(Err(FetchError::Request(e))) => check.failed(CheckStatus::Error, 0.0, e.to_string()),
            Ok(Err(FetchError::InvalidUrl(message) | FetchError::Redirect(message))) => {
                check.failed(CheckStatus::Error, 0.0, message)
            }
            Ok(Ok(fetched)) => {
                let status = if fetched.status_code == target.expected_status {
                    CheckStatus::Up
                } else {
                    CheckStatus::Down
                };
                check.completed(
                    status,
                    start.elapsed().as_secs_f64(),
                    CheckDetail::Http(HttpDetail {
                        status_code: fetched.status_code,
                        final_url: fetched.final_url,
                        redirects: fetched.redirects,
                        content_length: fetched.content_length,
                        headers: fetched.headers,
                    }),
                )
            }
        }
    }
}

/// Accepts any certificate chain while still checking handshake signatures.
///
/// Chain trust is not what this probe measures; expiry of the leaf is.
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

/// TLS certificate checker
pub struct TlsChecker {
    connector: TlsConnector,
}

impl TlsChecker {
    pub fn new() -> Result<Self> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        Ok(Self { connector: TlsConnector::from(Arc::new(config)) })
    }

    async fn inspect(&self, host: &str, port: u16) -> Result<TlsDetail> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| anyhow!("Invalid server name '{host}': {e}"))?;

        let tcp = TcpStream::connect((host, port)).await.context("TCP connection failed")?;
        let tls = self.connector.connect(server_name, tcp).await.context("TLS handshake failed")?;

        let (_io, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| anyhow!("No peer certificate"))?;

        let (_, cert) = X509Certificate::from_der(leaf.as_ref())
            .map_err(|e| anyhow!("Failed to parse X.509 certificate: {e}"))?;

        let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
            .ok_or_else(|| anyhow!("Certificate notAfter out of range"))?;

        Ok(TlsDetail {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_after,
            days_until_expiry: days_until(not_after, Utc::now()),
            serial_number: cert.raw_serial_as_string(),
            version: cert.version().0 + 1,
        })
    }
}

/// Whole days until `not_after`, rounded down (negative once expired)
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(86_400)
}

/// Host and port the TLS probe connects to
fn tls_endpoint(url: &str) -> Result<(String, u16)> {
    let url = Url::parse(url)?;
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(anyhow!("URL has no host")),
    };
    Ok((host, url.port().unwrap_or(DEFAULT_TLS_PORT)))
}

#[async_trait::async_trait]
impl Checker for TlsChecker {
    async fn check(&self, target: &Target) -> HealthCheck {
        let (host, port) = match tls_endpoint(&target.url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                return HealthCheck::new(CheckType::Ssl, &target.url).failed(CheckStatus::Error, 0.0, e.to_string());
            }
        };

        let check = HealthCheck::new(CheckType::Ssl, format!("{host}:{port}"));
        let start = Instant::now();

        match timeout(Duration::from_secs(target.timeout), self.inspect(&host, port)).await {
            Err(_) => check.failed(CheckStatus::Error, 0.0, "TLS handshake timed out"),
            Ok(Err(e)) => check.failed(CheckStatus::Error, 0.0, format!("{e:#}")),
            Ok(Ok(detail)) => {
                let status = if Utc::now() > detail.not_after {
                    CheckStatus::Expired
                } else {
                    CheckStatus::Up
                };
                check.completed(status, start.elapsed().as_secs_f64(), CheckDetail::Tls(detail))
            }
        }
    }
}

/// DNS A-record checker
pub struct DnsChecker {
    resolver: TokioResolver,
}

impl DnsChecker {
    pub fn new() -> Result<Self> {
        let resolver = TokioResolver::builder_tokio()
            .context("Failed to create DNS resolver")?
            .build();
        Ok(Self { resolver })
    }
}

#[async_trait::async_trait]
impl Checker for DnsChecker {
    async fn check(&self, target: &Target) -> HealthCheck {
        let hostname = match Url::parse(&target.url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            Some(host) => host,
            None => {
                return HealthCheck::new(CheckType::Dns, &target.url).failed(CheckStatus::Error, 0.0, "URL has no host");
            }
        };

        let check = HealthCheck::new(CheckType::Dns, &hostname);
        let start = Instant::now();

        match timeout(Duration::from_secs(target.timeout), self.resolver.ipv4_lookup(hostname.as_str())).await {
            Err(_) => check.failed(CheckStatus::Error, 0.0, "DNS lookup timed out"),
            Ok(Err(e)) if e.is_nx_domain() => check.failed(CheckStatus::NxDomain, 0.0, "Domain does not exist"),
            Ok(Err(e)) => check.failed(CheckStatus::Error, 0.0, e.to_string()),
            Ok(Ok(lookup)) => {
                let response_time = start.elapsed().as_secs_f64();
                let ip_addresses: Vec<String> = lookup.iter().map(|a| a.0.to_string()).collect();
                if ip_addresses.is_empty() {
                    return check.failed(CheckStatus::Error, response_time, "No A records returned");
                }
                let ttl = lookup.valid_until().saturating_duration_since(Instant::now()).as_secs();

                check.completed(
                    CheckStatus::Up,
                    response_time,
                    CheckDetail::Dns(DnsDetail {
                        hostname,
                        record_count: ip_addresses.len(),
                        ip_addresses,
                        ttl,
                    }),
                )
            }
        }
    }
}
