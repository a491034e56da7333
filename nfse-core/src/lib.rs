//! Client toolkit for municipal NFS-e web services: layout-driven request
//! documents, enveloped XML signatures, and SOAP dispatch with retry.
//!
//! # Examples
//! ```rust
//! use nfse_core::request::RequestKind;
//! use serde_json::json;
//!
//! let definition = RequestKind::ConsultarNfsePorRps.definition();
//! let vars = json!({
//!     "Numero": 10, "Serie": "A", "Tipo": 1,
//!     "Cnpj": "00000000000191", "InscricaoMunicipal": "123"
//! });
//! let xml = definition.build_document(vars.as_object().unwrap(), true)?;
//! assert!(xml.contains("<Numero>10</Numero>"));
//! # Ok::<(), nfse_core::Error>(())
//! ```
pub mod api;
pub mod config;
pub mod document;
pub mod request;
pub mod sign;
pub mod xml;

use thiserror::Error;

pub use api::{DispatchError, NfseClient};
pub use config::{ClientConfig, ConfigError};
pub use request::{RequestKind, ValidationError};
pub use sign::{KeyMaterial, Signer, SigningError, VerifyError};
pub use xml::ParseError;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}
