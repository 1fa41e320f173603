//! Hashing, canonical serialization and the signing identity
//!
//! Everything that is hashed or signed goes through [`canonical_json`] first: the
//! value is lowered to a `serde_json::Value`, whose object map keeps keys sorted,
//! and encoded compactly. Two nodes hashing the same structure therefore hash the
//! same bytes.
//!
//! Identity is ECDSA over secp256k1:
//! - public keys travel as hex of the 33-byte compressed encoding
//! - signatures are DER, hex-encoded, over `SHA256(message)`
//! - addresses are `hex(RIPEMD160(SHA256(public key bytes)))`

use crate::error::{ConsensusError, Result};
use crate::types::{Address, HashHex};
use ripemd::Ripemd160;
use secp256k1::rand::thread_rng;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Serialize `value` as JSON with lexicographically sorted object keys.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| ConsensusError::Serialization(e.to_string()))?;
    serde_json::to_string(&value).map_err(|e| ConsensusError::Serialization(e.to_string()))
}

/// Hex-encoded SHA256 of `data`
pub fn sha256_hex(data: &[u8]) -> HashHex {
    hex::encode(Sha256::digest(data))
}

/// Derive a wallet address from raw public key bytes.
pub fn address_from_public_key(public_key: &[u8]) -> Address {
    let sha256_hash = Sha256::digest(public_key);
    let ripemd160_hash = Ripemd160::digest(sha256_hash);
    hex::encode(ripemd160_hash)
}

/// Derive a wallet address from a hex-encoded public key.
pub fn address_from_public_key_hex(public_key_hex: &str) -> Result<Address> {
    let bytes = hex::decode(public_key_hex).map_err(|e| ConsensusError::InvalidKey(e.to_string()))?;
    Ok(address_from_public_key(&bytes))
}

/// Signing capability handed to transaction construction.
pub trait Signer {
    /// Address owned by this signer
    fn address(&self) -> &str;

    /// Hex-encoded public key used to verify this signer's signatures
    fn public_key_hex(&self) -> String;

    /// Sign `message`, returning a hex-encoded signature
    fn sign(&self, message: &str) -> Result<String>;
}

/// Verify a hex signature over `message` against a hex public key.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_signature(public_key_hex: &str, signature_hex: &str, message: &str) -> bool {
    let public_key = match hex::decode(public_key_hex)
        .ok()
        .and_then(|bytes| PublicKey::from_slice(&bytes).ok())
    {
        Some(pk) => pk,
        None => return false,
    };

    let signature = match hex::decode(signature_hex)
        .ok()
        .and_then(|bytes| Signature::from_der(&bytes).ok())
    {
        Some(sig) => sig,
        None => return false,
    };

    let message = match message_digest(message) {
        Ok(msg) => msg,
        Err(_) => return false,
    };

    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}

fn message_digest(message: &str) -> Result<Message> {
    let digest = Sha256::digest(message.as_bytes());
    Message::from_digest_slice(&digest).map_err(|e| ConsensusError::InvalidSignature(e.to_string()))
}

/// Key pair plus its derived address
pub struct Wallet {
    secp: Secp256k1<All>,
    secret_key: SecretKey,
    public_key: PublicKey,
    address: Address,
}

impl Wallet {
    /// Generate a fresh random key pair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut thread_rng());
        Self::from_parts(secp, secret_key, public_key)
    }

    /// Rebuild a wallet from a hex-encoded 32-byte secret key.
    pub fn from_secret_key_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex).map_err(|e| ConsensusError::InvalidKey(e.to_string()))?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| ConsensusError::InvalidKey(e.to_string()))?;
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Ok(Self::from_parts(secp, secret_key, public_key))
    }

    fn from_parts(secp: Secp256k1<All>, secret_key: SecretKey, public_key: PublicKey) -> Self {
        let address = address_from_public_key(&public_key.serialize());
        Self {
            secp,
            secret_key,
            public_key,
            address,
        }
    }
}

impl Signer for Wallet {
    fn address(&self) -> &str {
        &self.address
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    fn sign(&self, message: &str) -> Result<String> {
        let digest = message_digest(message)?;
        let signature = self.secp.sign_ecdsa(&digest, &self.secret_key);
        Ok(hex::encode(&signature.serialize_der()[..]))
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet").field("address", &self.address).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unsorted {
        zeta: u32,
        alpha: &'static str,
        mid: bool,
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let json = canonical_json(&Unsorted { zeta: 1, alpha: "a", mid: true }).unwrap();
        assert_eq!(json, r#"{"alpha":"a","mid":true,"zeta":1}"#);
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_address_is_ripemd160_hex() {
        let wallet = Wallet::generate();
        assert_eq!(wallet.address().len(), 40);
        assert_eq!(
            address_from_public_key_hex(&wallet.public_key_hex()).unwrap(),
            wallet.address()
        );
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let wallet = Wallet::generate();
        let signature = wallet.sign("payload").unwrap();
        assert!(verify_signature(&wallet.public_key_hex(), &signature, "payload"));
    }

    #[test]
    fn test_verify_mutated_payload_fails() {
        let wallet = Wallet::generate();
        let signature = wallet.sign("payload").unwrap();
        assert!(!verify_signature(&wallet.public_key_hex(), &signature, "payload!"));
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let signer = Wallet::generate();
        let other = Wallet::generate();
        let signature = signer.sign("payload").unwrap();
        assert!(!verify_signature(&other.public_key_hex(), &signature, "payload"));
    }

    #[test]
    fn test_verify_malformed_inputs() {
        let wallet = Wallet::generate();
        let signature = wallet.sign("payload").unwrap();
        assert!(!verify_signature("zz", &signature, "payload"));
        assert!(!verify_signature(&wallet.public_key_hex(), "00", "payload"));
    }

    #[test]
    fn test_from_secret_key_hex_is_deterministic() {
        let secret = "01".repeat(32);
        let a = Wallet::from_secret_key_hex(&secret).unwrap();
        let b = Wallet::from_secret_key_hex(&secret).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(Wallet::from_secret_key_hex("abcd").is_err());
    }
}
