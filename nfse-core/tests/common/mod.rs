use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfse_core::document::VariableSet;
use nfse_core::sign::{KeyMaterial, Signer};
use rsa::RsaPublicKey;

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/keys")
        .join(name)
}

#[allow(dead_code)]
pub fn key_material() -> KeyMaterial {
    KeyMaterial::from_files(
        fixture_path("private_key.pem"),
        fixture_path("certificate.pem"),
    )
    .expect("fixture key material")
}

#[allow(dead_code)]
pub fn signer() -> Arc<Signer> {
    Arc::new(Signer::new(key_material()))
}

#[allow(dead_code)]
pub fn public_key() -> RsaPublicKey {
    key_material().public_key()
}

#[allow(dead_code)]
pub fn vars(value: serde_json::Value) -> VariableSet {
    value.as_object().cloned().expect("variables must be an object")
}
