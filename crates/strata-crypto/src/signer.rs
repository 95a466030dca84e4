use strata_types::{Link, Version};

use crate::error::{CryptoError, CryptoResult};

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public).
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        use ed25519_dalek::Signer as _;
        self.0.sign(message).to_bytes()
    }
}

impl VerifyingKey {
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        let key =
            ed25519_dalek::VerifyingKey::from_bytes(&arr).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> CryptoResult<()> {
        use ed25519_dalek::Verifier as _;
        let arr: [u8; 64] = signature
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        self.0
            .verify(message, &ed25519_dalek::Signature::from_bytes(&arr))
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", hex::encode(self.0.to_bytes()))
    }
}

/// Signs version roots at commit time.
pub trait Signer: Send + Sync {
    /// Signature over the root link's bytes.
    fn sign(&self, root: &Link) -> Vec<u8>;

    /// Public key recorded next to the signature.
    fn public_key(&self) -> Vec<u8>;

    fn name(&self) -> Option<&str> {
        None
    }

    fn email(&self) -> Option<&str> {
        None
    }
}

/// Ed25519 signer with optional author identity.
#[derive(Debug)]
pub struct Ed25519Signer {
    key: SigningKey,
    name: Option<String>,
    email: Option<String>,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            name: None,
            email: None,
        }
    }

    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.email = Some(email.into());
        self
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, root: &Link) -> Vec<u8> {
        self.key.sign(root.as_bytes()).to_vec()
    }

    fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().as_bytes().to_vec()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Check a recorded signature over `root` against a recorded public key.
pub fn verify_root(root: &Link, public_key: &[u8], signature: &[u8]) -> CryptoResult<()> {
    VerifyingKey::from_bytes(public_key)?.verify(root.as_bytes(), signature)
}

/// Check a recorded version's signature against its recorded public key.
pub fn verify_version(version: &Version) -> CryptoResult<()> {
    match (&version.details.public_key, &version.details.signature) {
        (Some(public_key), Some(signature)) => verify_root(&version.root, public_key, signature),
        _ => Err(CryptoError::Unsigned),
    }
}
