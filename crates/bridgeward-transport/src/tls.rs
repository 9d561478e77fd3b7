//! TLS setup: self-signed certificate generation and loading.
//!
//! On first run the bridge generates a certificate for its configured
//! host and writes it next to the private key:
//!
//! ```text
//! <cert_dir>/<host>.crt   PEM certificate (SANs: localhost, <host>)
//! <cert_dir>/<host>.key   PEM private key
//! ```
//!
//! Certificates are valid for one year from the day they are generated.
//!
//! Later runs reuse the files as long as both exist. Game server plugins
//! are expected to trust this certificate out of band.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, Utc};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, date_time_ymd};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::TransportError;

const ORGANIZATION: &str = "bridgeward";
const VALIDITY_DAYS: i64 = 365;

/// Whether the listener speaks TLS.
#[derive(Clone)]
pub enum TlsMode {
    /// Plain `ws://`. Meant for tests and trusted loopback setups.
    Disabled,
    /// `wss://` with the given acceptor.
    Enabled(TlsAcceptor),
}

impl TlsMode {
    /// Generates (or reuses) a self-signed certificate for `host` in
    /// `cert_dir` and builds an acceptor from it.
    pub fn self_signed(
        cert_dir: &Path,
        host: &str,
    ) -> Result<Self, TransportError> {
        let paths = ensure_self_signed(cert_dir, host)?;
        Ok(Self::Enabled(load_acceptor(&paths)?))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

impl std::fmt::Debug for TlsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => f.write_str("TlsMode::Disabled"),
            Self::Enabled(_) => f.write_str("TlsMode::Enabled"),
        }
    }
}

/// Locations of a certificate and its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl CertPaths {
    pub fn for_host(cert_dir: &Path, host: &str) -> Self {
        Self {
            cert: cert_dir.join(format!("{host}.crt")),
            key: cert_dir.join(format!("{host}.key")),
        }
    }
}

fn cert_err(context: &str, e: impl std::fmt::Display) -> TransportError {
    TransportError::Certificate(format!("{context}: {e}"))
}

/// Makes sure a certificate for `host` exists in `cert_dir`, generating
/// one if either file is missing.
pub fn ensure_self_signed(
    cert_dir: &Path,
    host: &str,
) -> Result<CertPaths, TransportError> {
    let paths = CertPaths::for_host(cert_dir, host);
    if paths.cert.exists() && paths.key.exists() {
        tracing::debug!(cert = %paths.cert.display(), "reusing existing certificate");
        return Ok(paths);
    }

    fs::create_dir_all(cert_dir)
        .map_err(|e| cert_err("creating certificate directory", e))?;

    let mut names = vec!["localhost".to_string()];
    if host != "localhost" {
        names.push(host.to_string());
    }
    let mut params = CertificateParams::new(names)
        .map_err(|e| cert_err("building certificate parameters", e))?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, host);
    dn.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = dn;
    let today = Utc::now().date_naive();
    let expiry = today + ChronoDuration::days(VALIDITY_DAYS);
    params.not_before =
        date_time_ymd(today.year(), today.month() as u8, today.day() as u8);
    params.not_after =
        date_time_ymd(expiry.year(), expiry.month() as u8, expiry.day() as u8);

    let key_pair =
        KeyPair::generate().map_err(|e| cert_err("generating key pair", e))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| cert_err("signing certificate", e))?;

    fs::write(&paths.cert, cert.pem())
        .map_err(|e| cert_err("writing certificate", e))?;
    fs::write(&paths.key, key_pair.serialize_pem())
        .map_err(|e| cert_err("writing private key", e))?;

    tracing::info!(
        cert = %paths.cert.display(),
        host,
        "generated self-signed certificate"
    );
    Ok(paths)
}

/// Reads a PEM certificate chain and private key into a TLS acceptor.
pub fn load_acceptor(paths: &CertPaths) -> Result<TlsAcceptor, TransportError> {
    let certs = read_certs(&paths.cert)?;
    let key = read_key(&paths.key)?;

    let config =
        ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| cert_err("selecting protocol versions", e))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| cert_err("installing certificate", e))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let file = fs::File::open(path)
        .map_err(|e| cert_err("opening certificate", e))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| cert_err("parsing certificate", e))?;
    if certs.is_empty() {
        return Err(TransportError::Certificate(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let file =
        fs::File::open(path).map_err(|e| cert_err("opening private key", e))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| cert_err("parsing private key", e))?
        .ok_or_else(|| {
            TransportError::Certificate(format!(
                "no private key found in {}",
                path.display()
            ))
        })
}
