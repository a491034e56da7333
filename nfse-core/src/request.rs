//! Request definitions: layout, required fields, method name and validation per
//! request type.
use std::{fmt, str::FromStr, sync::Arc};

use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;
use crate::document::{self, Layout, VariableSet};

mod layouts;

/// Validation errors, raised before any document is built or sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("$vars[\"{0}\"] is required")]
    MissingField(String),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("no request document: build or supply one before dispatching")]
    MissingDocument,
}

/// Extra validation run after the required-field check.
pub type Validator = Arc<dyn Fn(&VariableSet) -> Result<(), ValidationError> + Send + Sync>;

/// The operations exposed by the NFS-e web service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    RecepcionarLoteRps,
    ConsultarNfsePorRps,
    CancelarNfse,
    RecepcionarXml,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [
        RequestKind::RecepcionarLoteRps,
        RequestKind::ConsultarNfsePorRps,
        RequestKind::CancelarNfse,
        RequestKind::RecepcionarXml,
    ];

    /// Remote operation name.
    pub fn method(&self) -> &'static str {
        match self {
            RequestKind::RecepcionarLoteRps => "RecepcionarLoteRps",
            RequestKind::ConsultarNfsePorRps => "ConsultarNfsePorRps",
            RequestKind::CancelarNfse => "CancelarNfse",
            RequestKind::RecepcionarXml => "RecepcionarXml",
        }
    }

    pub fn definition(&self) -> RequestDefinition {
        match self {
            RequestKind::RecepcionarLoteRps => RequestDefinition::new(
                self.method(),
                layouts::recepcionar_lote_rps(),
                ["NaturezaOperacao"],
            )
            .with_validator(|vars| require_numeric(vars, "NaturezaOperacao")),
            RequestKind::ConsultarNfsePorRps => RequestDefinition::new(
                self.method(),
                layouts::consultar_nfse_por_rps(),
                ["Numero", "Serie", "Tipo", "Cnpj", "InscricaoMunicipal"],
            ),
            RequestKind::CancelarNfse => RequestDefinition::new(
                self.method(),
                layouts::cancelar_nfse(),
                Vec::<String>::new(),
            ),
            RequestKind::RecepcionarXml => RequestDefinition::new(
                self.method(),
                Value::Object(VariableSet::new()),
                Vec::<String>::new(),
            ),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

impl FromStr for RequestKind {
    type Err = ConfigError;
    fn from_str(method: &str) -> Result<RequestKind, ConfigError> {
        RequestKind::ALL
            .into_iter()
            .find(|kind| kind.method().eq_ignore_ascii_case(method))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "request type",
                input: method.to_string(),
            })
    }
}

/// Everything needed to build the document of one request type.
#[derive(Clone)]
pub struct RequestDefinition {
    method: String,
    layout: Layout,
    required_fields: Vec<String>,
    validator: Option<Validator>,
}

impl fmt::Debug for RequestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDefinition")
            .field("method", &self.method)
            .field("layout", &self.layout)
            .field("required_fields", &self.required_fields)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl RequestDefinition {
    pub fn new<I, S>(method: impl Into<String>, layout: Layout, required_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: method.into(),
            layout,
            required_fields: required_fields.into_iter().map(Into::into).collect(),
            validator: None,
        }
    }

    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&VariableSet) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    /// Checks that every required field is a key of `vars` (its value is not
    /// inspected), then runs the custom validator.
    pub fn validate(&self, vars: &VariableSet) -> Result<(), ValidationError> {
        if let Some(missing) = self
            .required_fields
            .iter()
            .find(|field| !vars.contains_key(field.as_str()))
        {
            return Err(ValidationError::MissingField(missing.clone()));
        }
        match &self.validator {
            Some(validator) => validator(vars),
            None => Ok(()),
        }
    }

    /// Validates `vars` and renders the cleaned, unsigned request markup.
    ///
    /// With `use_layout` false, `vars` itself is serialized as the literal tree.
    pub fn build_document(
        &self,
        vars: &VariableSet,
        use_layout: bool,
    ) -> Result<String, ValidationError> {
        self.validate(vars)?;
        let tree = if use_layout {
            document::bound(&self.layout, vars)
        } else {
            Value::Object(vars.clone())
        };
        Ok(document::clean_markup(&document::serialize(&tree)))
    }
}

fn require_numeric(vars: &VariableSet, field: &str) -> Result<(), ValidationError> {
    match vars.get(field) {
        Some(value) if is_numeric(value) => Ok(()),
        _ => Err(ValidationError::InvalidField {
            field: field.to_string(),
            reason: "must be a numeric value".into(),
        }),
    }
}

/// Numbers, and strings holding a decimal number (sign, fraction and exponent
/// allowed, surrounding whitespace ignored).
fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(text) => {
            let text = text.trim();
            !text.is_empty()
                && text
                    .chars()
                    .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '.' | 'e' | 'E'))
                && text.parse::<f64>().is_ok()
        }
        _ => false,
    }
}
