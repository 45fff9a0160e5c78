//! Passphrase encryption for wallet private keys.
//!
//! Ciphertexts use the OpenSSL `enc` layout that browser wallets emit:
//! `base64("Salted__" || salt[8] || AES-256-CBC(plaintext))`, with key and IV
//! derived from the passphrase by EVP_BytesToKey (MD5, one round).

use aes::Aes256;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};

use crate::error::GatewayError;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

const SALT_MAGIC: &[u8] = b"Salted__";
const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

fn derive_key_iv(passphrase: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut derived = Vec::with_capacity(KEY_LEN + IV_LEN);
    let mut block: Vec<u8> = Vec::new();

    while derived.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&block);
        hasher.update(passphrase);
        hasher.update(salt);
        block = hasher.finalize().to_vec();
        derived.extend_from_slice(&block);
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&derived[..KEY_LEN]);
    iv.copy_from_slice(&derived[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

/// Decrypt a passphrase-encrypted UTF-8 payload.
pub fn decrypt(ciphertext_b64: &str, passphrase: &str) -> Result<String, GatewayError> {
    let raw = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|e| GatewayError::Crypto(format!("ciphertext is not base64: {e}")))?;

    if raw.len() < SALT_MAGIC.len() + SALT_LEN || !raw.starts_with(SALT_MAGIC) {
        return Err(GatewayError::Crypto("ciphertext is missing the salt header".into()));
    }

    let salt = &raw[SALT_MAGIC.len()..SALT_MAGIC.len() + SALT_LEN];
    let body = &raw[SALT_MAGIC.len() + SALT_LEN..];
    let (key, iv) = derive_key_iv(passphrase.as_bytes(), salt);

    let plaintext = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|e| GatewayError::Crypto(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(body)
        .map_err(|_| GatewayError::Crypto("wrong passphrase or corrupt ciphertext".into()))?;

    String::from_utf8(plaintext)
        .map_err(|_| GatewayError::Crypto("decrypted payload is not UTF-8".into()))
}

/// Encrypt `plaintext` in the same format [`decrypt`] reads.
pub fn encrypt(plaintext: &str, passphrase: &str) -> Result<String, GatewayError> {
    let salt: [u8; SALT_LEN] = rand::random();
    let (key, iv) = derive_key_iv(passphrase.as_bytes(), &salt);

    let body = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|e| GatewayError::Crypto(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut out = Vec::with_capacity(SALT_MAGIC.len() + SALT_LEN + body.len());
    out.extend_from_slice(SALT_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&body);
    Ok(STANDARD.encode(out))
}
