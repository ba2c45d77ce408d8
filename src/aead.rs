//! AEAD: AES-256-GCM, one fresh key per chunk.

extern crate alloc;
use alloc::vec::Vec;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use getrandom::getrandom;
use zeroize::Zeroizing;

use crate::error::{DecryptionError, EncodingError};
use crate::wire::{KEY_BYTES, NONCE_BYTES};

/// Generate a random 12-byte nonce. Used during encryption only.
pub fn nonce() -> Result<[u8; NONCE_BYTES], EncodingError> {
    let mut n = [0u8; NONCE_BYTES];
    getrandom(&mut n).map_err(|_| EncodingError)?;
    Ok(n)
}

/// Generate a random 32-byte chunk key.
pub fn chunk_key() -> Result<Zeroizing<[u8; KEY_BYTES]>, EncodingError> {
    let mut k = Zeroizing::new([0u8; KEY_BYTES]);
    getrandom(&mut k[..]).map_err(|_| EncodingError)?;
    Ok(k)
}

/// Random filler for keyslots nobody can open.
pub fn filler() -> Result<[u8; KEY_BYTES], EncodingError> {
    let mut f = [0u8; KEY_BYTES];
    getrandom(&mut f).map_err(|_| EncodingError)?;
    Ok(f)
}

/// AEAD seal (encrypt path). Returns EncodingError on failure.
pub fn aead_seal(
    key: &[u8; KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncodingError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncodingError)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: plaintext, aad };
    cipher.encrypt(n, payload).map_err(|_| EncodingError)
}

/// AEAD open (decrypt path). Returns DecryptionError on failure.
pub fn aead_open(
    key: &[u8; KEY_BYTES],
    nonce: &[u8],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, DecryptionError> {
    if nonce.len() != NONCE_BYTES {
        return Err(DecryptionError);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| DecryptionError)?;
    let n = Nonce::from_slice(nonce);
    let payload = Payload { msg: ciphertext, aad };
    cipher.decrypt(n, payload).map(Zeroizing::new).map_err(|_| DecryptionError)
}
