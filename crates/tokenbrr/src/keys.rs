use std::fmt;

use alloy_primitives::{Bytes, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use k256::{elliptic_curve::sec1::ToEncodedPoint, AffinePoint};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::{
    error::SignError,
    ledger::{AccountKey, HashAlgorithm, SignatureAlgorithm},
};

/// Private key held by an account agent, together with the hash algorithm its
/// on-chain key was registered with.
#[derive(Clone)]
pub struct KeyPair {
    signer: PrivateKeySigner,
    hash_algo: HashAlgorithm,
}

impl KeyPair {
    /// Parses a private key from hex string (with or without 0x prefix)
    pub fn from_hex(hex_key: &str) -> Result<Self, SignError> {
        let key = hex_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        let signer = key
            .parse::<PrivateKeySigner>()
            .map_err(|e| SignError::InvalidKey(e.to_string()))?;
        Ok(Self {
            signer,
            hash_algo: HashAlgorithm::default(),
        })
    }

    /// Generates a fresh key from OS randomness.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
            hash_algo: HashAlgorithm::default(),
        }
    }

    #[must_use]
    pub const fn with_hash_algorithm(mut self, hash_algo: HashAlgorithm) -> Self {
        self.hash_algo = hash_algo;
        self
    }

    pub const fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algo
    }

    pub const fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EcdsaSecp256k1
    }

    /// Uncompressed public key without the SEC1 tag byte (64 bytes).
    pub fn public_key(&self) -> Bytes {
        let affine: &AffinePoint = self.signer.credential().verifying_key().as_ref();
        let encoded = affine.to_encoded_point(false);
        Bytes::copy_from_slice(&encoded.as_bytes()[1..])
    }

    /// Account key describing this key pair, ready to be registered on a new account.
    pub fn account_key(&self, weight: u32) -> AccountKey {
        AccountKey {
            index: 0,
            public_key: self.public_key(),
            sign_algo: self.signature_algorithm(),
            hash_algo: self.hash_algo,
            weight,
            sequence_number: 0,
            revoked: false,
        }
    }

    /// Hashes `message` with the key's hash algorithm and signs the digest.
    /// Returns `r || s`.
    pub fn sign(&self, message: &[u8]) -> Result<Bytes, alloy_signer::Error> {
        let digest = self.digest(message);
        let signature = self.signer.sign_hash_sync(&digest)?;
        let mut raw = Vec::with_capacity(64);
        raw.extend_from_slice(&signature.r().to_be_bytes::<32>());
        raw.extend_from_slice(&signature.s().to_be_bytes::<32>());
        Ok(Bytes::from(raw))
    }

    fn digest(&self, message: &[u8]) -> B256 {
        match self.hash_algo {
            HashAlgorithm::Sha2_256 => B256::from_slice(&Sha256::digest(message)),
            HashAlgorithm::Sha3_256 => B256::from_slice(&Sha3_256::digest(message)),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .field("hash_algo", &self.hash_algo)
            .finish_non_exhaustive()
    }
}
