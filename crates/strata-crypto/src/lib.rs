//! Cryptographic collaborators for Strata.
//!
//! Provides domain-separated BLAKE3 hashing behind the [`LinkCodec`] seam,
//! AES-256-GCM value encryption behind the [`Cipher`] seam, and Ed25519
//! version signing behind the [`Signer`] seam.
//!
//! All primitives come from established libraries.

pub mod cipher;
pub mod error;
pub mod hasher;
pub mod signer;

pub use cipher::{AesGcmCipher, Cipher, Secret};
pub use error::{CryptoError, CryptoResult};
pub use hasher::{Blake3LinkCodec, ContentHasher, LinkCodec};
pub use signer::{verify_root, verify_version, Ed25519Signer, Signer, SigningKey, VerifyingKey};
