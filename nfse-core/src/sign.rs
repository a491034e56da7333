//! Enveloped XML-DSig signatures (RSA-SHA1, inclusive C14N) over NFS-e request documents.
//!
//! A document marks every element to be signed with an empty `Signature`
//! child. The signer removes each placeholder and appends a complete
//! signature block to the same parent, referencing the parent's first child.
use std::path::Path;

use base64ct::{Base64, Encoding};
use libxml::tree::{Document, Node};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{debug, warn};
use x509_cert::{
    Certificate,
    der::{DecodePem, Encode},
};

use crate::config::ConfigError;
use crate::xml::{self, CanonicalizationError, ParseError, canonicalize, escape_text};

pub const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const RSA_SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
pub const SHA1_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
pub const ENVELOPED_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

const PLACEHOLDER: &str = "Signature";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
    #[error("failed to edit document tree: {0}")]
    Tree(String),
    #[error("no Id attribute found for <{element}> or its children")]
    MissingReferenceId { element: String },
    #[error("RSA signing failed: {0}")]
    Crypto(String),
}

/// Errors reported by [`verify`].
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Canonicalization(#[from] CanonicalizationError),
    #[error("document carries no XML signature")]
    NoSignature,
    #[error("malformed signature: missing {0}")]
    Malformed(&'static str),
    #[error("reference URI {found:?} does not point at {expected:?}")]
    ReferenceMismatch { expected: String, found: String },
    #[error("digest mismatch for {uri:?}: expected {expected}, computed {computed}")]
    DigestMismatch {
        uri: String,
        expected: String,
        computed: String,
    },
    #[error("invalid signature value: {0}")]
    InvalidSignature(String),
}

/// Private key and certificate used for every signature a [`Signer`] emits.
#[derive(Clone)]
pub struct KeyMaterial {
    private_key: RsaPrivateKey,
    certificate: String,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("certificate", &self.certificate)
            .finish_non_exhaustive()
    }
}

impl KeyMaterial {
    /// `certificate` is embedded verbatim in `X509Certificate`.
    pub fn new(
        private_key: RsaPrivateKey,
        certificate: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let certificate = certificate.into();
        if certificate.trim().is_empty() {
            return Err(ConfigError::MissingKeyMaterial("certificate"));
        }
        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// Loads a PKCS#8 or PKCS#1 PEM private key.
    pub fn from_pem(private_key_pem: &str, certificate: &str) -> Result<Self, ConfigError> {
        if private_key_pem.trim().is_empty() {
            return Err(ConfigError::MissingKeyMaterial("private key"));
        }
        let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;
        Self::new(private_key, certificate)
    }

    pub fn from_files(
        private_key_path: impl AsRef<Path>,
        certificate_path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let private_key_pem = read_file(private_key_path.as_ref())?;
        let certificate = read_file(certificate_path.as_ref())?;
        Self::from_pem(&private_key_pem, &certificate)
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Base64 DER body of a PEM certificate, the canonical `X509Certificate` content.
pub fn certificate_body(certificate_pem: &str) -> Result<String, ConfigError> {
    let cert = Certificate::from_pem(certificate_pem.as_bytes())
        .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;
    let der = cert
        .to_der()
        .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;
    Ok(Base64::encode_string(&der))
}

/// RSA public key of a PEM certificate.
pub fn public_key_from_certificate(certificate_pem: &str) -> Result<RsaPublicKey, ConfigError> {
    let cert = Certificate::from_pem(certificate_pem.as_bytes())
        .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))?;
    RsaPublicKey::from_public_key_der(&spki_der)
        .map_err(|e| ConfigError::InvalidCertificate(e.to_string()))
}

/// Signs every placeholder of a document.
///
/// # Examples
/// ```rust,no_run
/// use nfse_core::sign::{KeyMaterial, Signer};
///
/// let keys = KeyMaterial::from_files("private_key.pem", "certificate.pem")?;
/// let signer = Signer::new(keys);
/// let signed = signer.sign(r#"<P Id="abc"><X>1</X><Signature/></P>"#)?;
/// # let _ = signed;
/// # Ok::<(), nfse_core::Error>(())
/// ```
pub struct Signer {
    signing_key: SigningKey<Sha1>,
    certificate: String,
    require_reference_id: bool,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("certificate", &self.certificate)
            .field("require_reference_id", &self.require_reference_id)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(keys: KeyMaterial) -> Self {
        Self {
            signing_key: SigningKey::<Sha1>::new(keys.private_key),
            // the payload goes out on a single line
            certificate: keys.certificate.replace(['\r', '\n'], ""),
            require_reference_id: false,
        }
    }

    /// Fail instead of emitting an empty reference URI when the signed element
    /// has no `Id`.
    pub fn require_reference_id(mut self, strict: bool) -> Self {
        self.require_reference_id = strict;
        self
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// Returns the signed document on a single line without XML declaration.
    pub fn sign(&self, markup: &str) -> Result<String, SigningError> {
        let mut doc = xml::parse(markup)?;
        let root = xml::root_element(&doc)?;
        let mut placeholders = Vec::new();
        collect_placeholders(&root, &mut placeholders);
        if placeholders.is_empty() {
            return Ok(xml::strip_declaration_and_line_breaks(markup));
        }
        // digests must cover the line-break-free text that is actually sent
        xml::remove_text_line_breaks(&root)?;
        for placeholder in placeholders {
            self.sign_placeholder(&mut doc, placeholder)?;
        }
        Ok(xml::to_single_line(&doc)?)
    }

    // Replaces one placeholder with a signature block over the first child of
    // its parent. Placeholders are handled in document order, so an outer
    // digest covers inner placeholders that are still unsigned.
    fn sign_placeholder(&self, doc: &mut Document, mut placeholder: Node) -> Result<(), SigningError> {
        let Some(mut parent) = placeholder.get_parent() else {
            return Ok(());
        };
        placeholder.unlink();
        let element = parent.get_name();

        let Some(subject) = parent.get_first_child() else {
            warn!(element = %element, "signature placeholder has no sibling to sign, dropped");
            return Ok(());
        };
        let uri = match reference_id(&parent) {
            Some(id) => format!("#{id}"),
            None if self.require_reference_id => {
                return Err(SigningError::MissingReferenceId { element });
            }
            None => {
                warn!(element = %element, "no Id found for signed element, using empty reference URI");
                String::new()
            }
        };

        let digest = digest_base64(&canonicalize(&subject)?);
        debug!(uri = %uri, digest = %digest, "computed reference digest");

        let mut signature = xml::import_fragment(doc, &self.signature_template(&uri, &digest))?;
        parent
            .add_child(&mut signature)
            .map_err(|e| SigningError::Tree(e.to_string()))?;

        let signed_info = xml::child(&signature, "SignedInfo")
            .ok_or_else(|| SigningError::Tree("SignedInfo missing from template".into()))?;
        let canonical_info = canonicalize(&signed_info)?;
        let value: Signature = self
            .signing_key
            .try_sign(canonical_info.as_bytes())
            .map_err(|e| SigningError::Crypto(e.to_string()))?;
        let mut value_node = xml::child(&signature, "SignatureValue")
            .ok_or_else(|| SigningError::Tree("SignatureValue missing from template".into()))?;
        value_node
            .set_content(&Base64::encode_string(&value.to_bytes()))
            .map_err(|e| SigningError::Tree(e.to_string()))
    }

    fn signature_template(&self, uri: &str, digest: &str) -> String {
        format!(
            concat!(
                r#"<Signature xmlns="{ds}"><SignedInfo>"#,
                r#"<CanonicalizationMethod Algorithm="{c14n}"/>"#,
                r#"<SignatureMethod Algorithm="{rsa}"/>"#,
                r#"<Reference URI="{uri}"><Transforms>"#,
                r#"<Transform Algorithm="{enveloped}"/>"#,
                r#"<Transform Algorithm="{c14n}"/>"#,
                r#"</Transforms><DigestMethod Algorithm="{sha1}"/>"#,
                r#"<DigestValue>{digest}</DigestValue></Reference></SignedInfo>"#,
                r#"<SignatureValue></SignatureValue>"#,
                r#"<KeyInfo><X509Data><X509Certificate>{certificate}</X509Certificate></X509Data></KeyInfo>"#,
                r#"</Signature>"#
            ),
            ds = DS_NS,
            c14n = C14N_ALGORITHM,
            rsa = RSA_SHA1_ALGORITHM,
            enveloped = ENVELOPED_ALGORITHM,
            sha1 = SHA1_ALGORITHM,
            uri = escape_text(uri).replace('"', "&quot;"),
            digest = digest,
            certificate = escape_text(&self.certificate),
        )
    }
}

fn digest_base64(canonical: &str) -> String {
    Base64::encode_string(&Sha1::digest(canonical.as_bytes()))
}

/// An unprefixed `Signature` element with no child elements and blank
/// content. Attributes are allowed.
fn is_placeholder(node: &Node) -> bool {
    node.get_name() == PLACEHOLDER
        && node
            .get_namespace()
            .is_none_or(|ns| ns.get_prefix().is_empty())
        && node.get_child_elements().is_empty()
        && node.get_content().trim().is_empty()
}

// Preorder walk below `element`; the root itself is never a placeholder.
fn collect_placeholders(element: &Node, found: &mut Vec<Node>) {
    for child in element.get_child_elements() {
        if is_placeholder(&child) {
            found.push(child);
        } else {
            collect_placeholders(&child, found);
        }
    }
}

/// `Id` of the element itself, else of its first child element carrying one.
fn reference_id(element: &Node) -> Option<String> {
    std::iter::once(element.clone())
        .chain(element.get_child_elements())
        .filter_map(|candidate| candidate.get_property("Id"))
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
}

/// Checks every xmldsig `Signature` of a signed document against `public_key`
/// and returns how many were verified.
pub fn verify(markup: &str, public_key: &RsaPublicKey) -> Result<usize, VerifyError> {
    let doc = xml::parse(markup)?;
    let root = xml::root_element(&doc)?;
    let verifying_key = VerifyingKey::<Sha1>::new(public_key.clone());
    let mut verified = 0;
    verify_element(&root, &verifying_key, &mut verified)?;
    if verified == 0 {
        return Err(VerifyError::NoSignature);
    }
    Ok(verified)
}

fn is_signature_block(node: &Node) -> bool {
    node.get_name() == PLACEHOLDER
        && node.get_namespace().is_some_and(|ns| ns.get_href() == DS_NS)
        && !node.get_child_elements().is_empty()
}

fn verify_element(
    element: &Node,
    key: &VerifyingKey<Sha1>,
    verified: &mut usize,
) -> Result<(), VerifyError> {
    for child in element.get_child_elements() {
        if is_signature_block(&child) {
            verify_signature(element, &child, key)?;
            *verified += 1;
        } else {
            verify_element(&child, key, verified)?;
        }
    }
    Ok(())
}

fn verify_signature(
    parent: &Node,
    signature: &Node,
    key: &VerifyingKey<Sha1>,
) -> Result<(), VerifyError> {
    let signed_info =
        xml::child(signature, "SignedInfo").ok_or(VerifyError::Malformed("SignedInfo"))?;
    let reference =
        xml::child(&signed_info, "Reference").ok_or(VerifyError::Malformed("Reference"))?;
    let uri = reference.get_property("URI").unwrap_or_default();
    let expected_uri = reference_id(parent).map_or_else(String::new, |id| format!("#{id}"));
    if uri != expected_uri {
        return Err(VerifyError::ReferenceMismatch {
            expected: expected_uri,
            found: uri,
        });
    }

    let expected = xml::child(&reference, "DigestValue")
        .ok_or(VerifyError::Malformed("DigestValue"))?
        .get_content();
    let subject = parent
        .get_first_child()
        .ok_or(VerifyError::Malformed("signed element"))?;
    let computed = digest_base64(&canonicalize(&subject)?);
    if expected.trim() != computed {
        return Err(VerifyError::DigestMismatch {
            uri,
            expected: expected.trim().to_string(),
            computed,
        });
    }

    let value = xml::child(signature, "SignatureValue")
        .ok_or(VerifyError::Malformed("SignatureValue"))?
        .get_content();
    let bytes = Base64::decode_vec(value.trim())
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;
    let signature_value = Signature::try_from(bytes.as_slice())
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))?;
    let canonical_info = canonicalize(&signed_info)?;
    key.verify(canonical_info.as_bytes(), &signature_value)
        .map_err(|e| VerifyError::InvalidSignature(e.to_string()))
}
