//! AES-CBC primitive, generalized over key size (128/192/256 bits) from
//! the teacher's fixed `AES256Cipher`.

use aes::{Aes128, Aes192, Aes256};
use cipher::block_padding::{Pkcs7, UnpadError};
use cipher::{BlockDecryptMut, BlockEncryptMut, InvalidLength, KeyIvInit};

pub(crate) const IV_SIZE: usize = 16;

pub(crate) enum AesCbcCipher {
    Aes128 {
        encryptor: cbc::Encryptor<Aes128>,
        decryptor: cbc::Decryptor<Aes128>,
    },
    Aes192 {
        encryptor: cbc::Encryptor<Aes192>,
        decryptor: cbc::Decryptor<Aes192>,
    },
    Aes256 {
        encryptor: cbc::Encryptor<Aes256>,
        decryptor: cbc::Decryptor<Aes256>,
    },
}

impl AesCbcCipher {
    pub(crate) fn new(key_bits: usize, key: &[u8], iv: &[u8]) -> Result<Self, InvalidLength> {
        Ok(match key_bits {
            128 => AesCbcCipher::Aes128 {
                encryptor: KeyIvInit::new_from_slices(key, iv)?,
                decryptor: KeyIvInit::new_from_slices(key, iv)?,
            },
            192 => AesCbcCipher::Aes192 {
                encryptor: KeyIvInit::new_from_slices(key, iv)?,
                decryptor: KeyIvInit::new_from_slices(key, iv)?,
            },
            _ => AesCbcCipher::Aes256 {
                encryptor: KeyIvInit::new_from_slices(key, iv)?,
                decryptor: KeyIvInit::new_from_slices(key, iv)?,
            },
        })
    }

    pub(crate) fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        match self {
            AesCbcCipher::Aes128 { encryptor, .. } => {
                encryptor.clone().encrypt_padded_vec_mut::<Pkcs7>(plaintext)
            }
            AesCbcCipher::Aes192 { encryptor, .. } => {
                encryptor.clone().encrypt_padded_vec_mut::<Pkcs7>(plaintext)
            }
            AesCbcCipher::Aes256 { encryptor, .. } => {
                encryptor.clone().encrypt_padded_vec_mut::<Pkcs7>(plaintext)
            }
        }
    }

    pub(crate) fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, UnpadError> {
        let mut out = vec![0u8; ciphertext.len()];
        let len = match self {
            AesCbcCipher::Aes128 { decryptor, .. } => {
                decryptor.clone().decrypt_padded_b2b_mut::<Pkcs7>(ciphertext, &mut out)?.len()
            }
            AesCbcCipher::Aes192 { decryptor, .. } => {
                decryptor.clone().decrypt_padded_b2b_mut::<Pkcs7>(ciphertext, &mut out)?.len()
            }
            AesCbcCipher::Aes256 { decryptor, .. } => {
                decryptor.clone().decrypt_padded_b2b_mut::<Pkcs7>(ciphertext, &mut out)?.len()
            }
        };
        out.truncate(len);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aes128_cbc_round_trips() {
        let key = [0u8; 16];
        let iv = [1u8; 16];
        let mut enc = AesCbcCipher::new(128, &key, &iv).unwrap();
        let ciphertext = enc.encrypt(b"Hello, World!");
        let mut dec = AesCbcCipher::new(128, &key, &iv).unwrap();
        let plaintext = dec.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"Hello, World!");
    }

    #[test]
    fn aes256_cbc_round_trips() {
        let key = [7u8; 32];
        let iv = [2u8; 16];
        let mut enc = AesCbcCipher::new(256, &key, &iv).unwrap();
        let ciphertext = enc.encrypt(b"a longer plaintext message here");
        let mut dec = AesCbcCipher::new(256, &key, &iv).unwrap();
        let plaintext = dec.decrypt(&ciphertext).unwrap();
        assert_eq!(plaintext, b"a longer plaintext message here");
    }
}
