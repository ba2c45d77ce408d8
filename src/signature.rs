//! Message signatures.
//!
//! Tree signature: Ed25519 over
//!   SHA-512( SHA-512(chunk_0) || SHA-512(chunk_1) || ... || SHA-512(chunk_n) )
//! binding the structural chunks together in order.
//!
//! Full signature: Ed25519 over a raw byte span of the serialized message.
//!
//! Both are stored as encrypted signature chunks.

extern crate alloc;
use alloc::vec::Vec;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha512};

use crate::chunk::{open_signature, EncryptedChunk};
use crate::error::{DecryptionError, EncodingError};
use crate::kek::KekSet;
use crate::wire::{ChunkType, ChunkView};

const DIGEST_BYTES: usize = 64;

/// Ordered accumulator of chunk buffers.
#[derive(Debug, Default, Clone)]
pub struct SignatureTree {
    leaves: Vec<[u8; DIGEST_BYTES]>,
}

impl SignatureTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, span: &[u8]) -> &mut Self {
        let mut leaf = [0u8; DIGEST_BYTES];
        leaf.copy_from_slice(&Sha512::digest(span));
        self.leaves.push(leaf);
        self
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    fn root(&self) -> [u8; DIGEST_BYTES] {
        let mut hasher = Sha512::new();
        for leaf in &self.leaves {
            hasher.update(leaf);
        }
        let mut root = [0u8; DIGEST_BYTES];
        root.copy_from_slice(&hasher.finalize());
        root
    }

    /// Sign the tree and seal the result as a `SignatureTree` chunk.
    pub fn sign(&self, signing: &SigningKey, keks: &KekSet) -> Result<EncryptedChunk, EncodingError> {
        if self.is_empty() {
            return Err(EncodingError);
        }
        let signature = signing.sign(&self.root());
        EncryptedChunk::seal_signature(ChunkType::SignatureTree, &signature, keks)
    }

    /// Recompute the tree and check it against a stored `SignatureTree` chunk.
    pub fn verify(&self, verifying: &VerifyingKey, keks: &KekSet, chunk: &ChunkView<'_>) -> Result<(), DecryptionError> {
        if self.is_empty() {
            return Err(DecryptionError);
        }
        let signature = open_signature(chunk, ChunkType::SignatureTree, keks)?;
        verifying
            .verify_strict(&self.root(), &signature)
            .map_err(|_| DecryptionError)
    }
}

/// Sign `span` and seal the signature as a chunk of `chunk_type`.
pub fn full_sign(
    chunk_type: ChunkType,
    signing: &SigningKey,
    keks: &KekSet,
    span: &[u8],
) -> Result<EncryptedChunk, EncodingError> {
    let signature = signing.sign(span);
    EncryptedChunk::seal_signature(chunk_type, &signature, keks)
}

/// Check a sealed full signature of `chunk_type` over `span`.
pub fn full_verify(
    chunk_type: ChunkType,
    verifying: &VerifyingKey,
    keks: &KekSet,
    span: &[u8],
    chunk: &ChunkView<'_>,
) -> Result<(), DecryptionError> {
    let signature = open_signature(chunk, chunk_type, keks)?;
    verifying.verify_strict(span, &signature).map_err(|_| DecryptionError)
}
