use std::fmt;
use std::fs;
use std::path::Path;

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use sha2::{Digest as _, Sha256};

use crate::{Error, Result};

pub const HASH_LEN: usize = 32;
/// Length of an uncompressed SEC1 secp256k1 point.
pub const PUBLIC_KEY_LEN: usize = 65;
/// Upper bound of a DER encoded ECDSA signature.
pub const SIGNATURE_MAX_LEN: usize = 72;

pub type Hash = [u8; HASH_LEN];
pub type PublicKey = [u8; PUBLIC_KEY_LEN];

const PRIVATE_KEY_FILE: &str = "key.pem";
const PUBLIC_KEY_FILE: &str = "key_pub.pem";

pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > SIGNATURE_MAX_LEN {
            return Err(Error::InvalidArgument(format!(
                "signature of {} bytes exceeds {} bytes",
                bytes.len(),
                SIGNATURE_MAX_LEN
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0))
    }
}

/// A secp256k1 key pair able to sign transaction ids.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(bytes).map_err(key_store_error)?;
        Ok(Self { signing_key })
    }

    pub fn public_key(&self) -> PublicKey {
        encode_public_key(self.signing_key.verifying_key())
    }

    /// Signs a 32-byte digest. The message is used as the ECDSA prehash as is.
    pub fn sign(&self, message: &[u8]) -> Result<Signature> {
        let signature: EcdsaSignature = self
            .signing_key
            .sign_prehash(message)
            .map_err(|e| Error::SigningFailed(e.to_string()))?;
        Signature::from_bytes(signature.to_der().as_bytes())
    }

    /// Writes `key.pem` (PKCS#8) and `key_pub.pem` (SPKI) into `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(key_store_error)?;

        let private_pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(key_store_error)?;
        fs::write(dir.join(PRIVATE_KEY_FILE), private_pem.as_bytes()).map_err(key_store_error)?;

        let public_pem = self
            .signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(key_store_error)?;
        fs::write(dir.join(PUBLIC_KEY_FILE), public_pem).map_err(key_store_error)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let pem = fs::read_to_string(dir.as_ref().join(PRIVATE_KEY_FILE)).map_err(key_store_error)?;
        let signing_key = SigningKey::from_pkcs8_pem(&pem).map_err(key_store_error)?;
        Ok(Self { signing_key })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyPair [public: {}]", hex::encode(self.public_key()))
    }
}

/// Reads the public key saved next to a private key by [`KeyPair::save`].
pub fn load_public_key<P: AsRef<Path>>(dir: P) -> Result<PublicKey> {
    let pem = fs::read_to_string(dir.as_ref().join(PUBLIC_KEY_FILE)).map_err(key_store_error)?;
    let verifying_key = VerifyingKey::from_public_key_pem(&pem).map_err(key_store_error)?;
    Ok(encode_public_key(&verifying_key))
}

/// Returns false for malformed keys or signatures as well as for signatures that do not verify.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
    let verifying_key = match VerifyingKey::from_sec1_bytes(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match EcdsaSignature::from_der(signature.as_bytes()) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    verifying_key.verify_prehash(message, &signature).is_ok()
}

fn encode_public_key(verifying_key: &VerifyingKey) -> PublicKey {
    let point = verifying_key.to_encoded_point(false);
    let mut public_key = [0u8; PUBLIC_KEY_LEN];
    public_key.copy_from_slice(point.as_bytes());
    public_key
}

fn key_store_error<E: fmt::Display>(e: E) -> Error {
    Error::KeyStore(e.to_string())
}
