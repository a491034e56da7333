//! SOAP over HTTP implementation of [`Operation`].
use std::time::Duration;

use libxml::tree::Node;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use tracing::debug;

use super::{AnyXml, CallError, Operation, SoapFault};
use crate::config::{ClientConfig, ConfigError, SoapVersion, TlsVerification};
use crate::xml;

/// Blocking HTTP client posting SOAP envelopes to one endpoint.
#[derive(Debug, Clone)]
pub struct SoapTransport {
    client: Client,
    endpoint: String,
    version: SoapVersion,
    action_ns: String,
}

impl SoapTransport {
    /// # Errors
    /// Returns [`ConfigError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(
            config.tls_verification() == TlsVerification::Disabled,
        );
        if let Some(secs) = config.timeout_secs() {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|err| ConfigError::HttpClient(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint().to_string(),
            version: config.soap_version(),
            action_ns: config.action_ns().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The remote operation named `method`.
    pub fn operation(&self, method: impl Into<String>) -> SoapOperation {
        SoapOperation {
            transport: self.clone(),
            method: method.into(),
        }
    }

    fn call(&self, method: &str, payload: &AnyXml) -> Result<Value, CallError> {
        let action = format!("{}{}", self.action_ns, method);
        let mut request = self
            .client
            .post(&self.endpoint)
            .body(envelope(self.version, payload.as_str()));
        request = match self.version {
            SoapVersion::Soap12 => request.header(
                CONTENT_TYPE,
                format!("application/soap+xml; charset=utf-8; action=\"{action}\""),
            ),
            SoapVersion::Soap11 => request
                .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                .header("SOAPAction", format!("\"{action}\"")),
        };

        let response = request
            .send()
            .map_err(|err| CallError::Other(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| CallError::Other(err.to_string()))?;
        debug!(method, %status, "SOAP response received");

        match read_envelope(&body) {
            Ok(value) if status.is_success() => Ok(value),
            Err(CallError::Fault(fault)) => Err(CallError::Fault(fault)),
            Ok(_) => Err(CallError::Other(format!("status {status}: {body}"))),
            Err(CallError::Other(_)) if !status.is_success() => {
                Err(CallError::Other(format!("status {status}: {body}")))
            }
            Err(err) => Err(err),
        }
    }
}

/// One remote operation bound to a [`SoapTransport`].
#[derive(Debug, Clone)]
pub struct SoapOperation {
    transport: SoapTransport,
    method: String,
}

impl SoapOperation {
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Operation for SoapOperation {
    fn invoke(&self, payload: &AnyXml) -> Result<Value, CallError> {
        self.transport.call(&self.method, payload)
    }
}

fn envelope(version: SoapVersion, payload: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <soap:Envelope xmlns:soap=\"{}\"><soap:Body>{payload}</soap:Body></soap:Envelope>",
        version.envelope_ns()
    )
}

/// Converts the first element of the SOAP body, or reports the fault it carries.
fn read_envelope(body: &str) -> Result<Value, CallError> {
    let invalid = |reason: String| CallError::Other(format!("invalid SOAP response: {reason}"));
    let doc = xml::parse(body).map_err(|err| invalid(err.to_string()))?;
    let root = xml::root_element(&doc).map_err(|err| invalid(err.to_string()))?;
    if root.get_name() != "Envelope" {
        return Err(invalid(format!("unexpected root element {}", root.get_name())));
    }
    let content = xml::child(&root, "Body")
        .ok_or_else(|| invalid("missing Body".into()))?
        .get_child_elements()
        .into_iter()
        .next();
    match content {
        Some(fault) if fault.get_name() == "Fault" => Err(CallError::Fault(read_fault(&fault))),
        Some(element) => Ok(element_value(&element)),
        None => Ok(Value::Null),
    }
}

fn read_fault(fault: &Node) -> SoapFault {
    let text = |path: &[&str]| {
        xml::descendant(fault, path).map(|element| element.get_content().trim().to_string())
    };
    let code = text(&["faultcode"])
        .or_else(|| text(&["Code", "Value"]))
        .unwrap_or_default();
    let message = text(&["faultstring"])
        .or_else(|| text(&["Reason", "Text"]))
        .unwrap_or_default();
    SoapFault { code, message }
}

// children by local name; repeated names collect into an array
fn element_value(element: &Node) -> Value {
    let children = element.get_child_elements();
    if children.is_empty() {
        return Value::String(element.get_content());
    }
    let mut fields = Map::new();
    for child in children {
        let value = element_value(&child);
        let name = child.get_name();
        match fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(name, value);
            }
        }
    }
    Value::Object(fields)
}
