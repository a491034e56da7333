mod common;

use nfse_core::sign::{
    KeyMaterial, Signer, SigningError, VerifyError, certificate_body, public_key_from_certificate,
    verify,
};
use base64ct::{Base64, Encoding};
use libxml::parser::Parser;
use libxml::xpath;
use nfse_core::{ConfigError, RequestKind};
use serde_json::json;
use sha1::{Digest, Sha1};

const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Text content of every node matching `expr`, with `ds` bound to xmldsig.
fn xpath_values(xml: &str, expr: &str) -> Vec<String> {
    let doc = Parser::default().parse_string(xml).expect("parse signed xml");
    let ctx = xpath::Context::new(&doc).expect("xpath context");
    ctx.register_namespace("ds", DS_NS).expect("ds ns");
    ctx.evaluate(expr)
        .expect("xpath")
        .get_nodes_as_vec()
        .iter()
        .map(|node| node.get_content())
        .collect()
}

#[test]
fn signs_parent_of_placeholder_with_digest_of_first_child() {
    let signer = common::signer();
    let signed = signer
        .sign(r#"<P Id="abc"><X>1</X><Signature/></P>"#)
        .expect("sign");

    assert_eq!(xpath_values(&signed, "/P/ds:Signature").len(), 1);
    assert_eq!(xpath_values(&signed, "/P/*[last()][self::ds:Signature]").len(), 1);
    assert_eq!(
        xpath_values(&signed, "/P/ds:Signature/ds:SignedInfo/ds:Reference/@URI"),
        ["#abc"]
    );
    assert_eq!(
        xpath_values(&signed, "//ds:Reference/ds:DigestValue"),
        ["/+EjC0IZ2TGAK9jOh2y4mpu/FmI="]
    );
    assert!(signed.starts_with(r#"<P Id="abc"><X>1</X><Signature xmlns="http://www.w3.org/2000/09/xmldsig#"><SignedInfo>"#));

    assert_eq!(verify(&signed, &common::public_key()).expect("verify"), 1);
}

#[test]
fn signature_block_carries_algorithms_and_certificate() {
    let signer = common::signer();
    let signed = signer
        .sign(r#"<P Id="abc"><X>1</X><Signature/></P>"#)
        .expect("sign");
    for algorithm in [
        "http://www.w3.org/TR/2001/REC-xml-c14n-20010315",
        "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
        "http://www.w3.org/2000/09/xmldsig#enveloped-signature",
        "http://www.w3.org/2000/09/xmldsig#sha1",
    ] {
        assert!(signed.contains(&format!("Algorithm=\"{algorithm}\"")), "{algorithm}");
    }
    let certificate = xpath_values(&signed, "//ds:KeyInfo/ds:X509Data/ds:X509Certificate");
    assert_eq!(certificate, [signer.certificate()]);
    assert!(certificate[0].starts_with("-----BEGIN CERTIFICATE-----MII"));
}

#[test]
fn attribute_line_breaks_and_tabs_survive_signing() {
    for (markup, kept) in [
        (r#"<P Id="a"><X v="a&#10;b">1</X><Signature/></P>"#, r#"<X v="a&#10;b">"#),
        (r#"<P Id="a"><X v="a&#9;b">1</X><Signature/></P>"#, r#"<X v="a&#9;b">"#),
        (r#"<P Id="a"><X v="a&#13;b">1</X><Signature/></P>"#, r#"<X v="a&#13;b">"#),
    ] {
        let signed = common::signer().sign(markup).expect("sign");
        assert!(signed.contains(kept), "{signed}");
        assert!(!signed.contains('\n'));
        assert_eq!(verify(&signed, &common::public_key()).expect("verify"), 1);
    }
}

#[test]
fn text_line_breaks_are_removed_before_digesting() {
    let signed = common::signer()
        .sign("<P Id=\"a\"><X>a&#10;b\r\nc</X><Signature/></P>")
        .expect("sign");
    assert!(signed.starts_with("<P Id=\"a\"><X>abc</X>"));
    assert_eq!(verify(&signed, &common::public_key()).expect("verify"), 1);
}

#[test]
fn placeholders_are_signed_in_document_order() {
    let signed = common::signer()
        .sign(r#"<P Id="a"><Signature/><X><Y Id="b"><Z/><Signature/></Y></X></P>"#)
        .expect("sign");
    assert_eq!(signed.matches("<SignatureValue>").count(), 2);

    // the outer digest is taken while the inner placeholder is still empty
    let unsigned_subject = r#"<X><Y Id="b"><Z></Z><Signature></Signature></Y></X>"#;
    let expected = Base64::encode_string(&Sha1::digest(unsigned_subject.as_bytes()));
    assert_eq!(
        xpath_values(&signed, "/P/ds:Signature/ds:SignedInfo/ds:Reference/ds:DigestValue"),
        [expected]
    );
    assert_eq!(
        xpath_values(&signed, "//Y/ds:Signature/ds:SignedInfo/ds:Reference/@URI"),
        ["#b"]
    );
    assert!(matches!(
        verify(&signed, &common::public_key()),
        Err(VerifyError::DigestMismatch { uri, .. }) if uri == "#a"
    ));
}

#[test]
fn prefixed_signature_is_not_a_placeholder() {
    let markup = r#"<P Id="a"><X>1</X><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"/></P>"#;
    assert_eq!(common::signer().sign(markup).expect("sign"), markup);
}

#[test]
fn falls_back_to_first_child_id() {
    let signed = common::signer()
        .sign(r#"<Envio><Lote Id=" L1 "><N>1</N></Lote><Signature></Signature></Envio>"#)
        .expect("sign");
    assert!(signed.contains(r##"<Reference URI="#L1">"##));
    assert_eq!(verify(&signed, &common::public_key()).expect("verify"), 1);
}

#[test]
fn missing_id_yields_empty_uri_unless_strict() {
    let markup = r#"<P><IdentificacaoRps><Numero>7</Numero></IdentificacaoRps><Signature/></P>"#;
    let signed = common::signer().sign(markup).expect("sign");
    assert!(signed.contains(r#"<Reference URI="">"#));
    assert!(signed.contains("<DigestValue>EM50p0naV5sfs7KLNpXO8YOnvsQ=</DigestValue>"));

    let strict = Signer::new(common::key_material()).require_reference_id(true);
    assert!(matches!(
        strict.sign(markup),
        Err(SigningError::MissingReferenceId { element }) if element == "P"
    ));
}

#[test]
fn signing_twice_yields_independent_valid_signatures() {
    let signer = common::signer();
    let markup = "<?xml version=\"1.0\"?>\n<P Id=\"abc\">\n<X>1</X>\n<Signature/>\n</P>\n";
    let first = signer.sign(markup).expect("first");
    let second = signer.sign(markup).expect("second");
    assert_eq!(first, second);
    assert!(!first.contains('\n'));
    assert!(!first.starts_with("<?xml"));
    assert_eq!(verify(&first, &common::public_key()).expect("verify"), 1);
}

#[test]
fn document_without_placeholder_is_only_stripped() {
    let signer = common::signer();
    let markup = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<A>\n  <B>1</B>\n</A>";
    assert_eq!(signer.sign(markup).expect("sign"), "<A>  <B>1</B></A>");
    assert!(matches!(
        verify(&signer.sign(markup).expect("sign"), &common::public_key()),
        Err(VerifyError::NoSignature)
    ));
}

#[test]
fn malformed_markup_is_rejected() {
    assert!(matches!(
        common::signer().sign("<A><B></A>"),
        Err(SigningError::Parse(_))
    ));
}

#[test]
fn lote_rps_gets_rps_and_batch_signatures() {
    let definition = RequestKind::RecepcionarLoteRps.definition();
    let xml = definition
        .build_document(
            &common::vars(json!({
                "NaturezaOperacao": 1,
                "Cnpj": "00000000000191",
                "InscricaoMunicipal": "123",
                "Discriminacao": "Consultoria nº 1",
            })),
            true,
        )
        .expect("build");
    assert!(xml.contains("Consultoria n  1"));

    let signed = common::signer().sign(&xml).expect("sign");
    assert_eq!(signed.matches("<SignatureValue>").count(), 2);
    assert!(signed.contains(r#"<InfRps Id="000000001">"#));
    assert!(signed.ends_with("</Signature></EnviarLoteRpsEnvio></RecepcionarLoteRps>"));
    assert_eq!(verify(&signed, &common::public_key()).expect("verify"), 2);
}

#[test]
fn cancelar_nfse_signature_references_empty_id() {
    let xml = RequestKind::CancelarNfse
        .definition()
        .build_document(&common::vars(json!({"Numero": 42, "CodigoCancelamento": 1})), true)
        .expect("build");
    let signed = common::signer().sign(&xml).expect("sign");
    assert!(signed.contains(r#"<Reference URI="">"#));
    assert!(!signed.contains(r#"<Signature Id="""#));
    assert_eq!(verify(&signed, &common::public_key()).expect("verify"), 1);
}

#[test]
fn tampered_document_fails_verification() {
    let signed = common::signer()
        .sign(r#"<P Id="abc"><X>1</X><Signature/></P>"#)
        .expect("sign");
    let tampered = signed.replace("<X>1</X>", "<X>2</X>");
    assert!(matches!(
        verify(&tampered, &common::public_key()),
        Err(VerifyError::DigestMismatch { .. })
    ));
}

#[test]
fn verification_with_other_key_fails() {
    let signed = common::signer()
        .sign(r#"<P Id="abc"><X>1</X><Signature/></P>"#)
        .expect("sign");
    let other_pem = std::fs::read_to_string(common::fixture_path("other_key_pkcs1.pem"))
        .expect("read other key");
    let other = KeyMaterial::from_pem(&other_pem, "cert").expect("pkcs1 key");
    assert!(matches!(
        verify(&signed, &other.public_key()),
        Err(VerifyError::InvalidSignature(_))
    ));
}

#[test]
fn certificate_helpers_read_fixture() {
    let pem = std::fs::read_to_string(common::fixture_path("certificate.pem"))
        .expect("read certificate");
    let body = certificate_body(&pem).expect("body");
    assert!(body.starts_with("MII"));
    assert!(!body.contains('\n'));
    assert_eq!(
        public_key_from_certificate(&pem).expect("public key"),
        common::public_key()
    );
}

#[test]
fn key_material_errors_are_configuration_errors() {
    assert!(matches!(
        KeyMaterial::from_pem("", "cert"),
        Err(ConfigError::MissingKeyMaterial("private key"))
    ));
    assert!(matches!(
        KeyMaterial::from_pem("not a key", "cert"),
        Err(ConfigError::InvalidPrivateKey(_))
    ));
    assert!(matches!(
        KeyMaterial::from_files(common::fixture_path("missing.pem"), common::fixture_path("certificate.pem")),
        Err(ConfigError::Unreadable { .. })
    ));
    let pem = std::fs::read_to_string(common::fixture_path("private_key.pem")).expect("read key");
    assert!(matches!(
        KeyMaterial::from_pem(&pem, "  "),
        Err(ConfigError::MissingKeyMaterial("certificate"))
    ));
}
