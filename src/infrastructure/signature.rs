use crate::domain::ports::SignatureVerifier;
use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

/// MD5 over the plain concatenation of the signed fields.
///
/// This is the scheme Click uses for `sign_string`; the shared secret is one
/// of the parts, placed by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5SignatureVerifier;

impl Md5SignatureVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for Md5SignatureVerifier {
    fn sign(&self, parts: &[&str]) -> String {
        let mut hasher = Md5::new();
        for part in parts {
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn verify(&self, parts: &[&str], signature: &str) -> bool {
        let expected = self.sign(parts);
        let provided = signature.trim().to_ascii_lowercase();
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}
