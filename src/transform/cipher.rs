//! The cipher stage (spec.md §4.6 worked scenarios 1 and 2): AES-CBC with a
//! random IV prepended to the ciphertext, the conventional XML Encryption
//! wire shape for block-cipher `EncryptionMethod`s.

use crate::buffer::Buffer;
use crate::crypt::ciphers::{AesCbcCipher, IV_SIZE};
use crate::error::{CryptographyError, TransformError};
use crate::keyinfo::{Key, KeyRequirement};

use super::TransformStage;

/// AES-{128,192,256}-CBC, single-shot like the source's execute-based
/// stages: it needs the whole plaintext (to pad) or the whole ciphertext
/// (to strip IV + unpad) before it can emit anything.
pub struct CipherStage {
    key_bits: usize,
    key: Option<Key>,
}

impl CipherStage {
    pub fn aes(key_bytes: usize) -> Self {
        Self { key_bits: key_bytes * 8, key: None }
    }
}

impl TransformStage for CipherStage {
    fn name(&self) -> &'static str {
        "cipher"
    }

    fn key_req(&self) -> Option<KeyRequirement> {
        Some(KeyRequirement { bits: self.key_bits })
    }

    fn set_key(&mut self, key: &Key) -> Result<(), TransformError> {
        self.key = Some(key.clone());
        Ok(())
    }

    fn execute(
        &mut self,
        in_buf: &mut Buffer,
        out_buf: &mut Buffer,
        encode: bool,
        last: bool,
    ) -> Result<(), TransformError> {
        if !last {
            return Ok(());
        }

        let key = self
            .key
            .as_ref()
            .ok_or(TransformError::InvalidStatus { transform: "cipher", detail: "no key installed" })?;

        if encode {
            let mut iv = [0u8; IV_SIZE];
            getrandom::fill(&mut iv).map_err(CryptographyError::from)?;
            let mut cipher = AesCbcCipher::new(self.key_bits, &key.bytes, &iv)
                .map_err(|e| TransformError::from(CryptographyError::from(e)))?;
            let ciphertext = cipher.encrypt(in_buf.data());
            out_buf.append(&iv);
            out_buf.append(&ciphertext);
        } else {
            let data = in_buf.data();
            if data.len() < IV_SIZE {
                return Err(TransformError::InvalidStatus {
                    transform: "cipher",
                    detail: "ciphertext shorter than one IV",
                });
            }
            let (iv, ciphertext) = data.split_at(IV_SIZE);
            let mut cipher = AesCbcCipher::new(self.key_bits, &key.bytes, iv)
                .map_err(|e| TransformError::from(CryptographyError::from(e)))?;
            let plaintext = cipher.decrypt(ciphertext).map_err(CryptographyError::from)?;
            out_buf.append(&plaintext);
        }

        in_buf.remove_head(in_buf.size());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes128_round_trip_through_the_stage() {
        let key = Key::new(vec![0u8; 16]);

        let mut encryptor = CipherStage::aes(16);
        encryptor.set_key(&key).unwrap();
        let mut in_buf = Buffer::from(b"Hello, World!".to_vec());
        let mut out_buf = Buffer::new();
        encryptor.execute(&mut in_buf, &mut out_buf, true, true).unwrap();
        assert!(out_buf.size() > 13);

        let mut decryptor = CipherStage::aes(16);
        decryptor.set_key(&key).unwrap();
        let mut in_buf2 = Buffer::from(out_buf.into_vec());
        let mut out_buf2 = Buffer::new();
        decryptor.execute(&mut in_buf2, &mut out_buf2, false, true).unwrap();
        assert_eq!(out_buf2.data(), b"Hello, World!");
    }

    #[test]
    fn missing_key_is_invalid_status() {
        let mut stage = CipherStage::aes(16);
        let mut in_buf = Buffer::from(b"data".to_vec());
        let mut out_buf = Buffer::new();
        let err = stage.execute(&mut in_buf, &mut out_buf, true, true).unwrap_err();
        assert!(matches!(err, TransformError::InvalidStatus { .. }));
    }

    #[test]
    fn key_req_reports_expected_bit_length() {
        let stage = CipherStage::aes(32);
        assert_eq!(stage.key_req().unwrap().bits, 256);
    }
}
