//! libxml-backed document helpers shared by the signer and the SOAP transport.
use libxml::{
    parser::{Parser, ParserOptions},
    tree::{Document, Node, c14n},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    XmlParse(String),
    #[error("document has no root element")]
    MissingRoot,
}

#[derive(Debug, Error)]
#[error("failed to canonicalize <{0}>")]
pub struct CanonicalizationError(pub String);

/// Parses a complete document. Malformed markup is rejected rather than
/// recovered, and whitespace-only text between elements is dropped.
pub fn parse(xml: &str) -> Result<Document, ParseError> {
    let options = ParserOptions {
        recover: false,
        no_blanks: true,
        ..ParserOptions::default()
    };
    Parser::default()
        .parse_string_with_options(xml, options)
        .map_err(|e| ParseError::XmlParse(format!("{e:?}")))
}

pub fn root_element(doc: &Document) -> Result<Node, ParseError> {
    doc.get_root_element().ok_or(ParseError::MissingRoot)
}

/// Inclusive C14N 1.0 without comments of `node` and its descendants, in the
/// context of the namespaces in scope at its position.
pub fn canonicalize(node: &Node) -> Result<String, CanonicalizationError> {
    let options = c14n::CanonicalizationOptions {
        mode: c14n::CanonicalizationMode::Canonical1_0,
        inclusive_ns_prefixes: vec![],
        with_comments: false,
    };
    node.clone()
        .canonicalize(options)
        .map_err(|_| CanonicalizationError(node.get_name()))
}

/// First child element with the given local name.
pub fn child(node: &Node, name: &str) -> Option<Node> {
    node.get_child_elements()
        .into_iter()
        .find(|child| child.get_name() == name)
}

/// Follows a path of local names through child elements.
pub fn descendant(node: &Node, path: &[&str]) -> Option<Node> {
    path.iter()
        .try_fold(node.clone(), |current, name| child(&current, name))
}

/// Parses `xml` on its own and moves its root into `doc`, unattached.
pub fn import_fragment(doc: &mut Document, xml: &str) -> Result<Node, ParseError> {
    let fragment = parse(xml)?;
    let mut node = root_element(&fragment)?;
    node.unlink();
    doc.import_node(&mut node)
        .map_err(|_| ParseError::XmlParse("failed to import fragment".into()))
}

/// Drops CR and LF from every text node below `node`.
pub fn remove_text_line_breaks(node: &Node) -> Result<(), ParseError> {
    for mut child in node.get_child_nodes() {
        if child.is_element_node() {
            remove_text_line_breaks(&child)?;
        } else if child.is_text_node() {
            let text = child.get_content();
            if text.contains(['\r', '\n']) {
                child
                    .set_content(&text.replace(['\r', '\n'], ""))
                    .map_err(|e| ParseError::XmlParse(e.to_string()))?;
            }
        }
    }
    Ok(())
}

/// Serializes the root element without declaration or line breaks.
pub fn to_single_line(doc: &Document) -> Result<String, ParseError> {
    let root = root_element(doc)?;
    Ok(strip_declaration_and_line_breaks(&doc.node_to_string(&root)))
}

/// Removes an XML declaration and every line break from serialized markup.
pub fn strip_declaration_and_line_breaks(xml: &str) -> String {
    let trimmed = xml.trim_start();
    let body = if trimmed.starts_with("<?xml") {
        trimmed
            .find("?>")
            .map_or(trimmed, |end| &trimmed[end + 2..])
    } else {
        trimmed
    };
    body.replace(['\r', '\n'], "")
}

/// Escapes character data for use inside an element.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
