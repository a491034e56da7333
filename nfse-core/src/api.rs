//! Request orchestration: build, sign, dispatch with retry, unwrap the response.
use std::{fmt, sync::Arc};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::{ClientConfig, ConfigError},
    document::VariableSet,
    request::{RequestDefinition, RequestKind, ValidationError},
    sign::Signer,
};

mod soap;

pub use soap::{SoapOperation, SoapTransport};

/// Markup handed to the transport as-is, without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyXml(String);

impl AnyXml {
    pub fn new(xml: impl Into<String>) -> Self {
        Self(xml.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Fault reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub message: String,
}

impl SoapFault {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("SOAP fault {0}")]
    Fault(SoapFault),
    #[error("{0}")]
    Other(String),
}

/// Dispatch failures after the retry policy was applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("SOAP fault {0}")]
    Fault(SoapFault),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// A remote operation of the service.
///
/// Closures taking the payload implement it, which is what tests use.
pub trait Operation: Send + Sync {
    fn invoke(&self, payload: &AnyXml) -> Result<Value, CallError>;
}

impl<F> Operation for F
where
    F: Fn(&AnyXml) -> Result<Value, CallError> + Send + Sync,
{
    fn invoke(&self, payload: &AnyXml) -> Result<Value, CallError> {
        self(payload)
    }
}

/// Client for one request type of the NFS-e service.
///
/// # Examples
/// ```rust
/// use nfse_core::api::{AnyXml, CallError, NfseClient};
/// use nfse_core::request::RequestKind;
/// use serde_json::{Value, json};
///
/// let operation = |_: &AnyXml| -> Result<Value, CallError> {
///     Ok(json!({"ConsultarNfsePorRpsResult": {"ListaMensagemRetorno": {"MensagemRetorno": "OK"}}}))
/// };
/// let mut client = NfseClient::new(RequestKind::ConsultarNfsePorRps.definition(), operation);
/// let vars = json!({
///     "Numero": 1, "Serie": "A", "Tipo": 1,
///     "Cnpj": "00000000000191", "InscricaoMunicipal": "123"
/// });
/// client.build_document(vars.as_object().unwrap(), true)?;
/// assert_eq!(client.dispatch(None)?, json!("OK"));
/// # Ok::<(), nfse_core::Error>(())
/// ```
pub struct NfseClient {
    definition: RequestDefinition,
    operation: Arc<dyn Operation>,
    signer: Option<Arc<Signer>>,
    retry: u32,
    document: Option<String>,
}

impl fmt::Debug for NfseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NfseClient")
            .field("method", &self.definition.method())
            .field("signer", &self.signer.is_some())
            .field("retry", &self.retry)
            .field("document", &self.document)
            .finish()
    }
}

impl NfseClient {
    /// Client with no retry and no signer.
    pub fn new(definition: RequestDefinition, operation: impl Operation + 'static) -> Self {
        Self {
            definition,
            operation: Arc::new(operation),
            signer: None,
            retry: 0,
            document: None,
        }
    }

    /// Client for `kind` talking SOAP to the configured endpoint.
    ///
    /// # Errors
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn for_request(kind: RequestKind, config: &ClientConfig) -> Result<Self, ConfigError> {
        let transport = SoapTransport::new(config)?;
        let operation = transport.operation(kind.method());
        Ok(Self::new(kind.definition(), operation).with_retry(config.retry()))
    }

    pub fn with_signer(mut self, signer: Arc<Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Extra attempts after a remote fault.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn definition(&self) -> &RequestDefinition {
        &self.definition
    }

    pub fn retry(&self) -> u32 {
        self.retry
    }

    /// The most recently built or supplied document, unsigned.
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn set_document(&mut self, xml: impl Into<String>) {
        self.document = Some(xml.into());
    }

    /// Validates `vars`, renders the request markup and keeps it as the current
    /// document.
    ///
    /// # Errors
    /// Returns [`ValidationError`] before any markup is produced.
    pub fn build_document(
        &mut self,
        vars: &VariableSet,
        use_layout: bool,
    ) -> Result<&str, ValidationError> {
        let xml = self.definition.build_document(vars, use_layout)?;
        Ok(self.document.insert(xml).as_str())
    }

    /// Signs and sends `xml`, or the current document when `None`.
    ///
    /// Faults are retried up to [`NfseClient::retry`] times with the same
    /// payload; other transport errors are reported as
    /// [`DispatchError::Runtime`] without retrying.
    ///
    /// # Errors
    /// [`ValidationError::MissingDocument`] when there is nothing to send,
    /// signing errors, and [`DispatchError`].
    pub fn dispatch(&self, xml: Option<&str>) -> Result<Value, crate::Error> {
        let xml = xml
            .or(self.document.as_deref())
            .ok_or(ValidationError::MissingDocument)?;
        let xml = match &self.signer {
            Some(signer) => signer.sign(xml)?,
            None => xml.to_string(),
        };
        debug!(method = self.definition.method(), request = %xml, "dispatching request");

        let payload = AnyXml::new(xml);
        let response = self.send(&payload)?;
        debug!(method = self.definition.method(), response = %response, "received response");
        Ok(self.unwrap_response(response))
    }

    fn send(&self, payload: &AnyXml) -> Result<Value, DispatchError> {
        let mut attempt = 0;
        loop {
            match self.operation.invoke(payload) {
                Ok(response) => return Ok(response),
                Err(CallError::Fault(fault)) if attempt < self.retry => {
                    attempt += 1;
                    warn!(
                        method = self.definition.method(),
                        attempt,
                        retry = self.retry,
                        fault = %fault,
                        "remote fault, retrying"
                    );
                }
                Err(CallError::Fault(fault)) => return Err(DispatchError::Fault(fault)),
                Err(CallError::Other(message)) => return Err(DispatchError::Runtime(message)),
            }
        }
    }

    fn unwrap_response(&self, response: Value) -> Value {
        let result_key = format!("{}Result", self.definition.method());
        match response.get(&result_key) {
            Some(result) => result
                .get("ListaMensagemRetorno")
                .and_then(|list| list.get("MensagemRetorno"))
                .cloned()
                .unwrap_or(Value::Null),
            None => response,
        }
    }
}
