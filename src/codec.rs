//! Deterministic reversible encryption for credential secrets and pagination cursors.
//!
//! Output is `BASE64URL_NOPAD(tag || AES-CTR(plaintext))`, where `tag` is a
//! truncated HMAC-SHA256 over the ciphertext. Key and IV are fixed process
//! configuration, so equal plaintexts always produce equal ciphertexts.

use aes::{Aes128, Aes192, Aes256};
use ctr::{
    cipher::{KeyIvInit, StreamCipher},
    Ctr128BE,
};
use data_encoding::{BASE64, BASE64URL_NOPAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Length in bytes of the authentication tag prefix.
pub const TAG_LEN: usize = 16;
/// Length in bytes of the fixed IV.
pub const IV_LEN: usize = 16;

const MAC_KEY_CONTEXT: &[u8] = b"evote symmetric codec mac key";

/// Ciphertext that could not be decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Malformed ciphertext encoding")]
    Encoding,
    #[error("Ciphertext too short")]
    TooShort,
    #[error("Ciphertext failed integrity check")]
    Tampered,
    #[error("Decrypted text is not valid UTF-8")]
    Utf8,
}

/// Invalid codec configuration, detected at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecConfigError {
    #[error("Codec key must be 16, 24 or 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("Codec IV must be base64 of exactly {IV_LEN} bytes")]
    Iv,
}

#[derive(Clone)]
enum CipherKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl CipherKey {
    fn from_slice(key: &[u8]) -> Result<Self, CodecConfigError> {
        let invalid = || CodecConfigError::KeyLength(key.len());
        Ok(match key.len() {
            16 => Self::Aes128(key.try_into().map_err(|_| invalid())?),
            24 => Self::Aes192(key.try_into().map_err(|_| invalid())?),
            32 => Self::Aes256(key.try_into().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        })
    }
}

/// Symmetric stream-cipher codec with a fixed key and IV.
#[derive(Clone)]
pub struct SymmetricCodec {
    key: CipherKey,
    iv: [u8; IV_LEN],
    mac: HmacSha256,
}

impl SymmetricCodec {
    /// Create a codec from a raw key and an IV given as standard base64.
    pub fn new(key: &[u8], iv_base64: &str) -> Result<Self, CodecConfigError> {
        let cipher_key = CipherKey::from_slice(key)?;
        let iv = BASE64
            .decode(iv_base64.as_bytes())
            .map_err(|_| CodecConfigError::Iv)?
            .try_into()
            .map_err(|_| CodecConfigError::Iv)?;

        // The MAC key is derived from the cipher key rather than configured separately.
        let invalid = |_| CodecConfigError::KeyLength(key.len());
        let mut derive = <HmacSha256 as Mac>::new_from_slice(key).map_err(invalid)?;
        derive.update(MAC_KEY_CONTEXT);
        let mac_key = derive.finalize().into_bytes();
        let mac = <HmacSha256 as Mac>::new_from_slice(&mac_key).map_err(invalid)?;

        Ok(Self {
            key: cipher_key,
            iv,
            mac,
        })
    }

    /// Encrypt the given text. Deterministic for a fixed key and IV.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut body = plaintext.as_bytes().to_vec();
        self.apply_keystream(&mut body);

        let mut out = Vec::with_capacity(TAG_LEN + body.len());
        out.extend_from_slice(&self.tag(&body)[..TAG_LEN]);
        out.extend_from_slice(&body);
        BASE64URL_NOPAD.encode(&out)
    }

    /// Decrypt text produced by [`SymmetricCodec::encrypt`] under the same key and IV.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, FormatError> {
        let raw = BASE64URL_NOPAD
            .decode(ciphertext.as_bytes())
            .map_err(|_| FormatError::Encoding)?;
        if raw.len() < TAG_LEN {
            return Err(FormatError::TooShort);
        }
        let (tag, body) = raw.split_at(TAG_LEN);

        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_truncated_left(tag)
            .map_err(|_| FormatError::Tampered)?;

        let mut plain = body.to_vec();
        self.apply_keystream(&mut plain);
        String::from_utf8(plain).map_err(|_| FormatError::Utf8)
    }

    fn tag(&self, body: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }

    fn apply_keystream(&self, buf: &mut [u8]) {
        let iv = self.iv.into();
        match &self.key {
            CipherKey::Aes128(key) => {
                Ctr128BE::<Aes128>::new(&(*key).into(), &iv).apply_keystream(buf)
            }
            CipherKey::Aes192(key) => {
                Ctr128BE::<Aes192>::new(&(*key).into(), &iv).apply_keystream(buf)
            }
            CipherKey::Aes256(key) => {
                Ctr128BE::<Aes256>::new(&(*key).into(), &iv).apply_keystream(buf)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::examples::{IV, KEY};
    use super::*;

    #[test]
    fn round_trip() {
        let codec = SymmetricCodec::example();
        for text in ["", "1", "18446744073709551615", "a8Kp2x", "ünïcödé"] {
            assert_eq!(codec.decrypt(&codec.encrypt(text)).unwrap(), text);
        }
    }

    #[test]
    fn deterministic() {
        let codec = SymmetricCodec::example();
        assert_eq!(codec.encrypt("42"), codec.encrypt("42"));
        assert_ne!(codec.encrypt("42"), codec.encrypt("43"));
    }

    #[test]
    fn all_key_sizes() {
        for len in [16, 24, 32] {
            let codec = SymmetricCodec::new(&KEY[..len], IV).unwrap();
            assert_eq!(codec.decrypt(&codec.encrypt("cursor")).unwrap(), "cursor");
        }
        assert_eq!(
            SymmetricCodec::new(&KEY[..10], IV).err(),
            Some(CodecConfigError::KeyLength(10))
        );
        assert_eq!(
            SymmetricCodec::new(KEY, "AAEC").err(),
            Some(CodecConfigError::Iv)
        );
    }

    #[test]
    fn malformed_input() {
        let codec = SymmetricCodec::example();
        assert_eq!(codec.decrypt("not base64!"), Err(FormatError::Encoding));
        assert_eq!(codec.decrypt(""), Err(FormatError::TooShort));
        assert_eq!(codec.decrypt("AAAA"), Err(FormatError::TooShort));

        let ciphertext = codec.encrypt("12345");
        let truncated = &ciphertext[..ciphertext.len() - 4];
        assert!(codec.decrypt(truncated).is_err());
    }

    #[test]
    fn tampering_is_detected() {
        let codec = SymmetricCodec::example();
        let mut raw = BASE64URL_NOPAD
            .decode(codec.encrypt("12345").as_bytes())
            .unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 1;
        let forged = BASE64URL_NOPAD.encode(&raw);
        assert_eq!(codec.decrypt(&forged), Err(FormatError::Tampered));
    }

    #[test]
    fn other_key_cannot_decrypt() {
        let codec = SymmetricCodec::example();
        let other = SymmetricCodec::new(b"fedcba9876543210", IV).unwrap();
        assert_eq!(
            other.decrypt(&codec.encrypt("7")),
            Err(FormatError::Tampered)
        );
    }
}
