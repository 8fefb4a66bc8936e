//! Passphrase sealing for the on-disk record store.
//!
//! Sealed layout:
//! `magic (6) || version (1) || m_cost (4) || t_cost (4) || p_cost (4) || salt (16) || nonce (12) || ciphertext`.
//! Everything before the ciphertext is authenticated as associated data, so
//! the KDF parameters travel with the file and cannot be tampered with.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use zeroize::Zeroizing;

const MAGIC: &[u8; 6] = b"STAGE\0";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = MAGIC.len() + 1 + 12 + SALT_LEN + NONCE_LEN;

/// Largest accepted Argon2 memory cost, in KiB (1 GiB).
const MAX_M_COST: u32 = 1024 * 1024;
const MAX_T_COST: u32 = 64;
const MAX_P_COST: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    Encryption,
    #[error("wrong passphrase or corrupted data")]
    Decryption,
    #[error("not a stage data file")]
    InvalidFormat,
    #[error("unsupported data file version {0}")]
    UnsupportedVersion(u8),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests.
    pub fn insecure_fast() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Whether the costs are in the range this crate will derive keys with.
    /// Headers are read before anything is authenticated, so [`open`] refuses
    /// anything outside it.
    pub fn is_within_limits(&self) -> bool {
        (Params::MIN_M_COST..=MAX_M_COST).contains(&self.m_cost)
            && (1..=MAX_T_COST).contains(&self.t_cost)
            && (1..=MAX_P_COST).contains(&self.p_cost)
    }

    fn derive(&self, passphrase: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|_| CryptoError::KeyDerivation)?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
            .map_err(|_| CryptoError::KeyDerivation)?;
        Ok(key)
    }
}

fn write_header(params: &KdfParams, salt: &[u8], nonce: &[u8]) -> Vec<u8> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(MAGIC);
    header.push(VERSION);
    header.extend_from_slice(&params.m_cost.to_le_bytes());
    header.extend_from_slice(&params.t_cost.to_le_bytes());
    header.extend_from_slice(&params.p_cost.to_le_bytes());
    header.extend_from_slice(salt);
    header.extend_from_slice(nonce);
    header
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// Seal `plaintext` under a key derived from `passphrase`.
pub fn seal(passphrase: &str, plaintext: &[u8], params: &KdfParams) -> Result<Vec<u8>, CryptoError> {
    if !params.is_within_limits() {
        return Err(CryptoError::KeyDerivation);
    }

    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce);

    let key = params.derive(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Encryption)?;

    let mut sealed = write_header(params, &salt, &nonce);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &sealed,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open data produced by [`seal`]. The plaintext is zeroized when dropped.
pub fn open(passphrase: &str, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < HEADER_LEN || &sealed[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::InvalidFormat);
    }

    let version = sealed[MAGIC.len()];
    if version != VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }

    let params_at = MAGIC.len() + 1;
    let params = KdfParams {
        m_cost: read_u32(sealed, params_at),
        t_cost: read_u32(sealed, params_at + 4),
        p_cost: read_u32(sealed, params_at + 8),
    };
    if !params.is_within_limits() {
        return Err(CryptoError::InvalidFormat);
    }
    let salt_at = params_at + 12;
    let salt = &sealed[salt_at..salt_at + SALT_LEN];
    let nonce = &sealed[salt_at + SALT_LEN..HEADER_LEN];
    let (header, ciphertext) = sealed.split_at(HEADER_LEN);

    let key = params.derive(passphrase, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| CryptoError::Decryption)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> KdfParams {
        KdfParams::insecure_fast()
    }

    #[test]
    fn sealed_data_opens_with_same_passphrase() {
        let sealed = seal("correct horse", b"{\"cycles\":[]}", &params()).unwrap();
        let opened = open("correct horse", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"{\"cycles\":[]}");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = seal("correct", b"secret", &params()).unwrap();
        assert!(matches!(open("wrong", &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn tampered_header_fails() {
        let mut sealed = seal("pass", b"secret", &params()).unwrap();
        // Flip a salt byte: key changes and the AAD no longer matches.
        sealed[MAGIC.len() + 1 + 12] ^= 0xff;
        assert!(open("pass", &sealed).is_err());
    }

    #[test]
    fn short_or_foreign_input_is_rejected() {
        assert!(matches!(open("any", &[0u8; 10]), Err(CryptoError::InvalidFormat)));
        assert!(matches!(
            open("any", &[0u8; HEADER_LEN + 16]),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut sealed = seal("pass", b"secret", &params()).unwrap();
        sealed[MAGIC.len()] = 9;
        assert!(matches!(
            open("pass", &sealed),
            Err(CryptoError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn oversized_kdf_costs_are_rejected_before_derivation() {
        let sealed = seal("pass", b"secret", &params()).unwrap();
        let m_at = MAGIC.len() + 1;

        let cases = [
            (m_at, u32::MAX),
            (m_at + 4, u32::MAX),
            (m_at + 8, u32::MAX),
            (m_at + 4, 0),
        ];
        for (at, value) in cases {
            let mut corrupted = sealed.clone();
            corrupted[at..at + 4].copy_from_slice(&value.to_le_bytes());
            assert!(matches!(
                open("pass", &corrupted),
                Err(CryptoError::InvalidFormat)
            ));
        }
    }

    #[test]
    fn sealing_refuses_out_of_range_costs() {
        let huge = KdfParams {
            m_cost: u32::MAX,
            ..params()
        };
        assert!(matches!(
            seal("pass", b"secret", &huge),
            Err(CryptoError::KeyDerivation)
        ));
        assert!(KdfParams::default().is_within_limits());
        assert!(params().is_within_limits());
    }

    #[test]
    fn each_seal_uses_fresh_salt_and_nonce() {
        let a = seal("pass", b"same", &params()).unwrap();
        let b = seal("pass", b"same", &params()).unwrap();
        assert_ne!(a, b);
    }
}
