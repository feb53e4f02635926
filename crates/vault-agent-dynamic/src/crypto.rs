//! ECIES-style envelope encryption: an ephemeral X25519 key exchange feeds
//! an HKDF-SHA256 derivation whose output keys a ChaCha20-Poly1305 AEAD.
//! This is the only form in which DB connection strings and dynamic
//! passwords ever enter or leave the agent's address space.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use vault_agent_common::{AgentError, AgentResult};

const HKDF_INFO: &[u8] = b"zn-vault-agent/dynamic-secrets/v1";
const NONCE_LEN: usize = 12;

/// Wire form of an encrypted payload: the ephemeral public key that wraps
/// the per-message symmetric key, a nonce, and the AEAD ciphertext (the
/// Poly1305 tag is appended to the ciphertext by the `chacha20poly1305`
/// crate itself).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncryptedConfigEnvelope {
    #[serde(with = "base64_bytes")]
    pub ephemeral_public_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

fn derive_key(shared_secret: &x25519_dalek::SharedSecret) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared_secret.as_bytes());
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    key
}

/// Decrypts an envelope addressed to `recipient_secret`, the agent's
/// long-term X25519 private key.
pub fn decrypt(
    envelope: &EncryptedConfigEnvelope,
    recipient_secret: &StaticSecret,
) -> AgentResult<Vec<u8>> {
    let sender_public: [u8; 32] = envelope
        .ephemeral_public_key
        .as_slice()
        .try_into()
        .map_err(|_| AgentError::DecryptionFailed("malformed ephemeral public key".to_string()))?;
    let sender_public = PublicKey::from(sender_public);

    let shared_secret = recipient_secret.diffie_hellman(&sender_public);
    let key = derive_key(&shared_secret);

    if envelope.nonce.len() != NONCE_LEN {
        return Err(AgentError::DecryptionFailed("malformed nonce".to_string()));
    }
    let nonce = Nonce::from_slice(&envelope.nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(nonce, envelope.ciphertext.as_slice())
        .map_err(|_| AgentError::DecryptionFailed("authentication tag mismatch".to_string()))
}

/// Encrypts `plaintext` for `recipient_public`, the vault's published
/// X25519 public key (used for the agent's `generate`/`renew` replies).
pub fn encrypt(
    plaintext: &[u8],
    recipient_public: &PublicKey,
) -> AgentResult<EncryptedConfigEnvelope> {
    let ephemeral_secret = StaticSecret::random();
    let ephemeral_public = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(recipient_public);
    let key = derive_key(&shared_secret);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| AgentError::Internal(format!("envelope encryption failed: {e}")))?;

    Ok(EncryptedConfigEnvelope {
        ephemeral_public_key: ephemeral_public.as_bytes().to_vec(),
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_reverses_encrypt_for_the_matching_keypair() {
        let recipient_secret = StaticSecret::random();
        let recipient_public = PublicKey::from(&recipient_secret);

        let envelope = encrypt(b"connection-string", &recipient_public).unwrap();
        let plaintext = decrypt(&envelope, &recipient_secret).unwrap();

        assert_eq!(plaintext, b"connection-string");
    }

    #[test]
    fn decrypt_fails_for_the_wrong_recipient_key() {
        let recipient_secret = StaticSecret::random();
        let recipient_public = PublicKey::from(&recipient_secret);
        let wrong_secret = StaticSecret::random();

        let envelope = encrypt(b"connection-string", &recipient_public).unwrap();
        assert!(decrypt(&envelope, &wrong_secret).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_the_auth_tag_check() {
        let recipient_secret = StaticSecret::random();
        let recipient_public = PublicKey::from(&recipient_secret);

        let mut envelope = encrypt(b"connection-string", &recipient_public).unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0xFF;

        assert!(decrypt(&envelope, &recipient_secret).is_err());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let recipient_secret = StaticSecret::random();
        let recipient_public = PublicKey::from(&recipient_secret);

        let envelope = encrypt(b"payload", &recipient_public).unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: EncryptedConfigEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.ciphertext, envelope.ciphertext);
        let plaintext = decrypt(&parsed, &recipient_secret).unwrap();
        assert_eq!(plaintext, b"payload");
    }
}
