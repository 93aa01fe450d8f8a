//! RSA key management
//!
//! Loads the provider's signing key pair from PEM files and provides the
//! RS256 signing used for certificates, along with the public-key export
//! format embedded in the support document.

use crate::{PortaError, Result};
use jsonwebtoken::{crypto, Algorithm, DecodingKey, EncodingKey};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// PEM block type holding a PKCS#1 RSA private key
pub const PRIVATE_KEY_BLOCK: &str = "RSA PRIVATE KEY";

/// PEM block type holding a SubjectPublicKeyInfo public key
pub const PUBLIC_KEY_BLOCK: &str = "PUBLIC KEY";

/// Algorithm tag advertised for the provider's key
pub const KEY_ALGORITHM: &str = "RS";

/// Signing key pair, loaded once and shared read-only by every issuance
#[derive(Clone)]
pub struct KeyStore {
    encoding_key: EncodingKey,
    public_key: PublicKey,
}

impl KeyStore {
    /// Load the key pair from two PEM files
    pub fn load(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let private_pem = read_key_file(private_key_path.as_ref())?;
        let public_pem = read_key_file(public_key_path.as_ref())?;
        Self::from_pem(&private_pem, &public_pem)
    }

    /// Build the key pair from PEM-encoded data
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self> {
        let der = find_block(private_pem, PRIVATE_KEY_BLOCK)?;
        let private_key = RsaPrivateKey::from_pkcs1_der(&der)
            .map_err(|e| PortaError::KeyMaterial(format!("invalid RSA private key: {}", e)))?;

        let public_key = PublicKey::from_pem(public_pem)?;

        // Ensure the keys match
        if RsaPublicKey::from(&private_key) != public_key.key {
            return Err(PortaError::KeyMaterial(
                "public key does not match private key".to_string(),
            ));
        }

        Ok(KeyStore {
            encoding_key: EncodingKey::from_rsa_der(&der),
            public_key,
        })
    }

    /// Sign `data` with RS256 (SHA-256, RSASSA-PKCS1-v1_5).
    ///
    /// The signature is base64url-encoded without padding, as it appears in
    /// a JWS.
    pub fn sign(&self, data: &[u8]) -> Result<String> {
        crypto::sign(data, &self.encoding_key, Algorithm::RS256)
            .map_err(|e| PortaError::Signing(e.to_string()))
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn public_key_descriptor(&self) -> PublicKeyDescriptor {
        self.public_key.descriptor()
    }

    pub fn key_id(&self) -> KeyId {
        self.public_key.key_id()
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// RSA public key for verification operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl PublicKey {
    /// Parse the first `PUBLIC KEY` block, which must carry an RSA key
    pub fn from_pem(pem_data: &[u8]) -> Result<Self> {
        let der = find_block(pem_data, PUBLIC_KEY_BLOCK)?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| PortaError::KeyMaterial(format!("not an RSA public key: {}", e)))?;
        Ok(PublicKey { key })
    }

    /// Key for `jsonwebtoken` verification
    pub fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_rsa_raw_components(&self.modulus_bytes(), &self.exponent_bytes())
    }

    /// Verify a base64url RS256 signature over `data`
    pub fn verify(&self, data: &[u8], signature: &str) -> Result<()> {
        let valid = crypto::verify(signature, data, &self.decoding_key(), Algorithm::RS256)
            .map_err(|e| PortaError::Signing(format!("malformed signature: {}", e)))?;
        if valid {
            Ok(())
        } else {
            Err(PortaError::Signing("signature verification failed".to_string()))
        }
    }

    /// Modulus as a decimal string
    pub fn modulus(&self) -> String {
        self.key.n().to_string()
    }

    /// Public exponent as a decimal string
    pub fn exponent(&self) -> String {
        self.key.e().to_string()
    }

    /// Big-endian modulus bytes
    pub fn modulus_bytes(&self) -> Vec<u8> {
        self.key.n().to_bytes_be()
    }

    /// Big-endian exponent bytes
    pub fn exponent_bytes(&self) -> Vec<u8> {
        self.key.e().to_bytes_be()
    }

    pub fn descriptor(&self) -> PublicKeyDescriptor {
        PublicKeyDescriptor {
            algorithm: KEY_ALGORITHM.to_string(),
            n: self.modulus(),
            e: self.exponent(),
        }
    }

    pub fn key_id(&self) -> KeyId {
        KeyId::from_public_key(&self.key)
    }
}

/// Language-agnostic export of the provider's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyDescriptor {
    pub algorithm: String,
    /// Modulus (decimal)
    pub n: String,
    /// Public exponent (decimal)
    pub e: String,
}

/// Unique identifier for a cryptographic key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId(String);

impl KeyId {
    /// Create key ID from a public key (BLAKE3 hash of the modulus and exponent)
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&key.n().to_bytes_be());
        hasher.update(&key.e().to_bytes_be());
        KeyId(hex::encode(&hasher.finalize().as_bytes()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        PortaError::KeyMaterial(format!("unable to read '{}': {}", path.display(), e))
    })
}

/// Return the contents of the first PEM block of type `tag`
fn find_block(pem_data: &[u8], tag: &str) -> Result<Vec<u8>> {
    let blocks = pem::parse_many(pem_data)
        .map_err(|e| PortaError::KeyMaterial(format!("malformed PEM data: {}", e)))?;

    blocks
        .into_iter()
        .find(|block| block.tag() == tag)
        .map(|block| block.into_contents())
        .ok_or_else(|| PortaError::KeyMaterial(format!("no {} block found", tag)))
}

mod hex {
    use std::fmt::Write;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut output, b| {
            let _ = write!(output, "{:02x}", b);
            output
        })
    }
}
