//! Client configuration and transport options.
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};
use thiserror::Error;

/// ISS Curitiba NFS-e web service.
pub const DEFAULT_ENDPOINT: &str =
    "https://isscuritiba.curitiba.pr.gov.br/Iss.NfseWebService/nfsews.asmx";

/// Namespace of the service operations, also used to build SOAP actions.
pub const SERVICE_NS: &str = "http://www.e-governeapps2.com.br/";

/// Configuration errors. Raised at construction time, never deferred to a request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    MissingKeyMaterial(&'static str),
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {field}: {input}")]
    InvalidValue { field: &'static str, input: String },
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// SOAP protocol version used by the transport.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use nfse_core::config::SoapVersion;
///
/// let version = SoapVersion::from_str("1.1")?;
/// assert_eq!(version, SoapVersion::Soap11);
/// # Ok::<(), nfse_core::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SoapVersion {
    Soap11,
    #[default]
    Soap12,
}

impl FromStr for SoapVersion {
    type Err = ConfigError;
    fn from_str(version: &str) -> Result<SoapVersion, ConfigError> {
        match version.to_ascii_lowercase().as_str() {
            "1.1" | "soap11" | "soap_1_1" => Ok(SoapVersion::Soap11),
            "1.2" | "soap12" | "soap_1_2" => Ok(SoapVersion::Soap12),
            _ => Err(ConfigError::InvalidValue {
                field: "SOAP version",
                input: version.to_string(),
            }),
        }
    }
}

impl SoapVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "1.1",
            SoapVersion::Soap12 => "1.2",
        }
    }

    pub fn envelope_ns(&self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "http://schemas.xmlsoap.org/soap/envelope/",
            SoapVersion::Soap12 => "http://www.w3.org/2003/05/soap-envelope",
        }
    }
}

/// Server certificate verification mode for the HTTPS transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsVerification {
    Verify,
    /// Accept any server certificate. The municipal endpoints have historically
    /// served chains that do not validate.
    #[default]
    Disabled,
}

impl FromStr for TlsVerification {
    type Err = ConfigError;
    fn from_str(mode: &str) -> Result<TlsVerification, ConfigError> {
        match mode.to_ascii_lowercase().as_str() {
            "verify" => Ok(TlsVerification::Verify),
            "disabled" | "none" => Ok(TlsVerification::Disabled),
            _ => Err(ConfigError::InvalidValue {
                field: "TLS verification mode",
                input: mode.to_string(),
            }),
        }
    }
}

/// Configuration for the request orchestrator and its SOAP transport.
///
/// # Examples
/// ```rust
/// use nfse_core::config::{ClientConfig, SoapVersion};
///
/// let config = ClientConfig::new("https://example.gov.br/nfsews.asmx")
///     .with_soap_version(SoapVersion::Soap11)
///     .with_retry(2);
/// assert_eq!(config.retry(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    endpoint: String,
    #[serde(default)]
    tls_verification: TlsVerification,
    #[serde(default)]
    soap_version: SoapVersion,
    #[serde(default)]
    retry: u32,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default = "default_action_ns")]
    action_ns: String,
}

fn default_action_ns() -> String {
    SERVICE_NS.to_string()
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_tls_verification(mut self, mode: TlsVerification) -> Self {
        self.tls_verification = mode;
        self
    }

    pub fn with_soap_version(mut self, version: SoapVersion) -> Self {
        self.soap_version = version;
        self
    }

    /// Number of extra attempts after a remote fault.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_action_ns(mut self, ns: impl Into<String>) -> Self {
        self.action_ns = ns.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tls_verification(&self) -> TlsVerification {
        self.tls_verification
    }

    pub fn soap_version(&self) -> SoapVersion {
        self.soap_version
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    pub fn action_ns(&self) -> &str {
        &self.action_ns
    }
}

// SOAP 1.2, peer verification off, no retry
impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            tls_verification: TlsVerification::Disabled,
            soap_version: SoapVersion::Soap12,
            retry: 0,
            timeout_secs: None,
            action_ns: SERVICE_NS.to_string(),
        }
    }
}
