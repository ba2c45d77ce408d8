//! Chunk codec
//!
//! Encrypted chunk:
//!   type[1] || size[3] || flags[1] || keyslot[32] * n || nonce[12] || aes_gcm(inner)
//!
//!   keyslot_i = chunk_key XOR kek(role_i), or random bytes if role_i has no KEK
//!   aad       = type[1] || size[3] || flags[1]
//!
//! Inner plaintext:
//!   content:   signature[64] || data_len[3] || pad_len[1] || data || zero[pad_len]
//!   signature: signature[64]
//!
//! The content signature covers `type[1] || data`.
//!
//! Ephemeral chunk (cleartext):
//!   type[1] || size[3] || presence[1] || ed25519_pk[32]? || x25519_pk[32]?

extern crate alloc;
use alloc::vec::Vec;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use subtle::{Choice, ConstantTimeEq};
use x25519_dalek::PublicKey as X25519PublicKey;
use zeroize::Zeroizing;

use crate::aead;
use crate::error::{DecryptionError, EncodingError};
use crate::kek::{Kek, KekSet};
use crate::keys::Role;
use crate::wire::{
    chunk_header, chunk_header_read, u24_be, u24_from_be, ChunkType, ChunkView, AEAD_TAG_BYTES,
    CHUNK_HEADER_BYTES, CONTENT_ALIGNMENT, CONTENT_PREFIX_BYTES, FLAGS_BYTES, FLAGS_KNOWN, FLAG_NONE,
    FLAG_SPANNING, KEYSLOT_BYTES, KEY_BYTES, NONCE_BYTES, SIGNATURE_BYTES,
};

/// Largest slice of content a single part may carry.
pub const MAX_PART_BYTES: usize = 0x00FF_0000;

/// Roles that get a keyslot, in slot order.
pub fn slot_roles(chunk_type: ChunkType) -> &'static [Role] {
    match chunk_type {
        ChunkType::Common
        | ChunkType::Headers
        | ChunkType::Body
        | ChunkType::SignatureTree
        | ChunkType::SignatureUser => &[Role::Destination, Role::Recipient],
        ChunkType::Origin => &[Role::Author, Role::Origin],
        ChunkType::Destination => &[Role::Origin, Role::Destination],
        ChunkType::SignatureOrigin | ChunkType::SignatureDestination => &[Role::Recipient],
        ChunkType::Ephemeral => &[],
    }
}

fn wrap(key: &[u8; KEY_BYTES], kek: &Kek) -> [u8; KEY_BYTES] {
    let mut slot = [0u8; KEY_BYTES];
    for (out, (k, w)) in slot.iter_mut().zip(key.iter().zip(kek.iter())) {
        *out = k ^ w;
    }
    slot
}

fn signed_message(chunk_type: ChunkType, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(1 + data.len());
    message.push(chunk_type as u8);
    message.extend_from_slice(data);
    message
}

// ---------------------------------------------------------------------------
// Encrypted chunks
// ---------------------------------------------------------------------------

/// One sealed chunk, header included.
#[derive(Clone, Debug)]
pub struct EncryptedChunk {
    chunk_type: ChunkType,
    flags: u8,
    buffer: Vec<u8>,
}

impl EncryptedChunk {
    /// Sign `data` with `signing`, then encrypt it for every role in `keks`.
    pub fn seal(
        chunk_type: ChunkType,
        signing: &SigningKey,
        keks: &KekSet,
        flags: u8,
        data: &[u8],
    ) -> Result<Self, EncodingError> {
        if chunk_type.is_signature() {
            return Err(EncodingError);
        }

        let signature = signing.sign(&signed_message(chunk_type, data));
        let unpadded = CONTENT_PREFIX_BYTES + data.len();
        let pad = (CONTENT_ALIGNMENT - unpadded % CONTENT_ALIGNMENT) % CONTENT_ALIGNMENT;

        let mut inner = Zeroizing::new(Vec::with_capacity(unpadded + pad));
        inner.extend_from_slice(&signature.to_bytes());
        inner.extend_from_slice(&u24_be(data.len())?);
        inner.push(pad as u8);
        inner.extend_from_slice(data);
        inner.resize(unpadded + pad, 0);

        Self::seal_inner(chunk_type, flags, keks, &inner)
    }

    /// Encrypt a bare signature into a signature chunk.
    pub fn seal_signature(
        chunk_type: ChunkType,
        signature: &Signature,
        keks: &KekSet,
    ) -> Result<Self, EncodingError> {
        if !chunk_type.is_signature() {
            return Err(EncodingError);
        }
        Self::seal_inner(chunk_type, FLAG_NONE, keks, &signature.to_bytes())
    }

    fn seal_inner(chunk_type: ChunkType, flags: u8, keks: &KekSet, inner: &[u8]) -> Result<Self, EncodingError> {
        let roles = slot_roles(chunk_type);
        if roles.is_empty() || flags & !FLAGS_KNOWN != 0 {
            return Err(EncodingError);
        }
        if !roles.iter().any(|role| keks.get(*role).is_some()) {
            tracing::debug!(chunk_type = ?chunk_type, "no kek for any keyslot role");
            return Err(EncodingError);
        }

        let payload_len = FLAGS_BYTES + roles.len() * KEYSLOT_BYTES + NONCE_BYTES + inner.len() + AEAD_TAG_BYTES;
        let header = chunk_header(chunk_type, payload_len)?;

        let mut aad = [0u8; CHUNK_HEADER_BYTES + FLAGS_BYTES];
        aad[..CHUNK_HEADER_BYTES].copy_from_slice(&header);
        aad[CHUNK_HEADER_BYTES] = flags;

        let key = aead::chunk_key()?;
        let nonce = aead::nonce()?;
        let ciphertext = aead::aead_seal(&key, &nonce, inner, &aad)?;

        let mut buffer = Vec::with_capacity(CHUNK_HEADER_BYTES + payload_len);
        buffer.extend_from_slice(&aad);
        for role in roles {
            let slot = match keks.get(*role) {
                Some(kek) => wrap(&key, kek),
                None => aead::filler()?,
            };
            buffer.extend_from_slice(&slot);
        }
        buffer.extend_from_slice(&nonce);
        buffer.extend_from_slice(&ciphertext);

        tracing::trace!(chunk_type = ?chunk_type, bytes = buffer.len(), "sealed chunk");
        Ok(Self {
            chunk_type,
            flags,
            buffer,
        })
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn is_spanning(&self) -> bool {
        self.flags & FLAG_SPANNING != 0
    }

    /// Serialized chunk, header included.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Decrypted content chunk.
pub struct OpenedChunk {
    pub flags: u8,
    pub data: Zeroizing<Vec<u8>>,
}

fn open_inner(view: &ChunkView<'_>, keks: &KekSet) -> Result<(u8, Zeroizing<Vec<u8>>), DecryptionError> {
    let chunk_type = ChunkType::from_u8(view.chunk_type).ok_or(DecryptionError)?;
    let roles = slot_roles(chunk_type);
    let payload = view.payload();

    let slots_end = FLAGS_BYTES + roles.len() * KEYSLOT_BYTES;
    let nonce_end = slots_end + NONCE_BYTES;
    if roles.is_empty() || payload.len() < nonce_end + AEAD_TAG_BYTES {
        return Err(DecryptionError);
    }

    let flags = payload[0];
    if flags & !FLAGS_KNOWN != 0 {
        return Err(DecryptionError);
    }

    let (index, kek) = roles
        .iter()
        .enumerate()
        .find_map(|(i, role)| keks.get(*role).map(|kek| (i, kek)))
        .ok_or(DecryptionError)?;

    let start = FLAGS_BYTES + index * KEYSLOT_BYTES;
    let slot: [u8; KEY_BYTES] = payload[start..start + KEYSLOT_BYTES]
        .try_into()
        .map_err(|_| DecryptionError)?;
    let key = Zeroizing::new(wrap(&slot, kek));

    let aad = &view.bytes[..CHUNK_HEADER_BYTES + FLAGS_BYTES];
    let inner = aead::aead_open(&key, &payload[slots_end..nonce_end], &payload[nonce_end..], aad)?;
    Ok((flags, inner))
}

/// Decrypt a content chunk of type `expected` and check its inner signature.
pub fn open_content(
    view: &ChunkView<'_>,
    expected: ChunkType,
    verifying: &VerifyingKey,
    keks: &KekSet,
) -> Result<OpenedChunk, DecryptionError> {
    if !view.is(expected) || expected.is_signature() {
        return Err(DecryptionError);
    }

    let (flags, inner) = open_inner(view, keks)?;
    if inner.len() < CONTENT_PREFIX_BYTES || inner.len() % CONTENT_ALIGNMENT != 0 {
        return Err(DecryptionError);
    }

    let signature: [u8; SIGNATURE_BYTES] = inner[..SIGNATURE_BYTES].try_into().map_err(|_| DecryptionError)?;
    let data_len = u24_from_be([inner[64], inner[65], inner[66]]);
    let pad = inner[67] as usize;
    if CONTENT_PREFIX_BYTES + data_len + pad != inner.len() {
        return Err(DecryptionError);
    }

    let data = &inner[CONTENT_PREFIX_BYTES..CONTENT_PREFIX_BYTES + data_len];
    let padding = &inner[CONTENT_PREFIX_BYTES + data_len..];
    let zeroed = padding
        .iter()
        .fold(Choice::from(1u8), |acc, byte| acc & byte.ct_eq(&0u8));
    if !bool::from(zeroed) {
        return Err(DecryptionError);
    }

    verifying
        .verify_strict(&signed_message(expected, data), &Signature::from_bytes(&signature))
        .map_err(|_| DecryptionError)?;

    Ok(OpenedChunk {
        flags,
        data: Zeroizing::new(data.to_vec()),
    })
}

/// Decrypt a signature chunk of type `expected`.
pub fn open_signature(
    view: &ChunkView<'_>,
    expected: ChunkType,
    keks: &KekSet,
) -> Result<Signature, DecryptionError> {
    if !view.is(expected) || !expected.is_signature() {
        return Err(DecryptionError);
    }

    let (flags, inner) = open_inner(view, keks)?;
    if flags != FLAG_NONE {
        return Err(DecryptionError);
    }
    let bytes: [u8; SIGNATURE_BYTES] = inner[..].try_into().map_err(|_| DecryptionError)?;
    Ok(Signature::from_bytes(&bytes))
}

// ---------------------------------------------------------------------------
// Spanning content
// ---------------------------------------------------------------------------

/// Split `data` into parts of at most `max_part` bytes, each sealed as its own
/// chunk. Every part but the last is flagged as spanning. Empty content still
/// produces one (empty) part.
pub fn part_encrypt(
    chunk_type: ChunkType,
    signing: &SigningKey,
    keks: &KekSet,
    data: &[u8],
    max_part: usize,
) -> Result<Vec<EncryptedChunk>, EncodingError> {
    if max_part == 0 || max_part > MAX_PART_BYTES {
        return Err(EncodingError);
    }

    if data.is_empty() {
        let mut parts = Vec::with_capacity(1);
        parts.push(EncryptedChunk::seal(chunk_type, signing, keks, FLAG_NONE, data)?);
        return Ok(parts);
    }

    let count = data.len().div_ceil(max_part);
    data.chunks(max_part)
        .enumerate()
        .map(|(i, part)| {
            let flags = if i + 1 < count { FLAG_SPANNING } else { FLAG_NONE };
            EncryptedChunk::seal(chunk_type, signing, keks, flags, part)
        })
        .collect()
}

/// Decrypt the run of `expected` chunks at the front of `data`, following the
/// spanning flag. Returns the joined content and the number of bytes consumed.
pub fn part_decrypt(
    expected: ChunkType,
    verifying: &VerifyingKey,
    keks: &KekSet,
    data: &[u8],
) -> Result<(Zeroizing<Vec<u8>>, usize), DecryptionError> {
    let mut content = Zeroizing::new(Vec::new());
    let mut consumed = 0usize;

    loop {
        let view = chunk_header_read(&data[consumed..])?;
        let opened = open_content(&view, expected, verifying, keks)?;
        content.extend_from_slice(&opened.data);
        consumed += view.len();
        if opened.flags & FLAG_SPANNING == 0 {
            break;
        }
    }

    Ok((content, consumed))
}

/// Concatenate sealed parts in order.
pub fn part_buffer(parts: &[EncryptedChunk]) -> Vec<u8> {
    let total = parts.iter().map(EncryptedChunk::len).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part.buffer());
    }
    out
}

// ---------------------------------------------------------------------------
// Ephemeral chunk
// ---------------------------------------------------------------------------

pub const EPHEMERAL_HAS_SIGNING: u8 = 0x01;
pub const EPHEMERAL_HAS_ENCRYPTION: u8 = 0x02;

/// Throwaway sender identity carried in the clear.
#[derive(Clone, Debug)]
pub struct EphemeralChunk {
    signing: Option<VerifyingKey>,
    encryption: Option<X25519PublicKey>,
    buffer: Vec<u8>,
}

impl EphemeralChunk {
    pub fn new(signing: Option<VerifyingKey>, encryption: Option<X25519PublicKey>) -> Result<Self, EncodingError> {
        let mut presence = 0u8;
        let mut payload = Vec::with_capacity(1 + 2 * KEY_BYTES);
        payload.push(0);
        if let Some(key) = &signing {
            presence |= EPHEMERAL_HAS_SIGNING;
            payload.extend_from_slice(key.as_bytes());
        }
        if let Some(key) = &encryption {
            presence |= EPHEMERAL_HAS_ENCRYPTION;
            payload.extend_from_slice(key.as_bytes());
        }
        if presence == 0 {
            return Err(EncodingError);
        }
        payload[0] = presence;

        let mut buffer = Vec::with_capacity(CHUNK_HEADER_BYTES + payload.len());
        buffer.extend_from_slice(&chunk_header(ChunkType::Ephemeral, payload.len())?);
        buffer.extend_from_slice(&payload);

        Ok(Self {
            signing,
            encryption,
            buffer,
        })
    }

    pub fn parse(view: &ChunkView<'_>) -> Result<Self, DecryptionError> {
        if !view.is(ChunkType::Ephemeral) {
            return Err(DecryptionError);
        }
        let payload = view.payload();
        let (&presence, mut keys) = payload.split_first().ok_or(DecryptionError)?;
        if presence & !(EPHEMERAL_HAS_SIGNING | EPHEMERAL_HAS_ENCRYPTION) != 0 {
            return Err(DecryptionError);
        }
        if keys.len() != presence.count_ones() as usize * KEY_BYTES {
            return Err(DecryptionError);
        }

        let mut signing = None;
        if presence & EPHEMERAL_HAS_SIGNING != 0 {
            let bytes: [u8; KEY_BYTES] = keys[..KEY_BYTES].try_into().map_err(|_| DecryptionError)?;
            signing = Some(VerifyingKey::from_bytes(&bytes).map_err(|_| DecryptionError)?);
            keys = &keys[KEY_BYTES..];
        }

        let mut encryption = None;
        if presence & EPHEMERAL_HAS_ENCRYPTION != 0 {
            let bytes: [u8; KEY_BYTES] = keys[..KEY_BYTES].try_into().map_err(|_| DecryptionError)?;
            encryption = Some(X25519PublicKey::from(bytes));
        }

        Ok(Self {
            signing,
            encryption,
            buffer: view.bytes.to_vec(),
        })
    }

    pub fn signing(&self) -> Option<&VerifyingKey> {
        self.signing.as_ref()
    }

    pub fn encryption(&self) -> Option<&X25519PublicKey> {
        self.encryption.as_ref()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ChunkKeys, UserKey};
    use rand_core::OsRng;
    use x25519_dalek::StaticSecret;

    struct Fixture {
        signing: SigningKey,
        sealed: KekSet,
        opened: KekSet,
    }

    fn fixture() -> Fixture {
        let recipient = UserKey::generate();
        let destination = UserKey::generate();
        let secret = StaticSecret::random_from_rng(OsRng);
        let sender = X25519PublicKey::from(&secret);
        let keys = ChunkKeys {
            encryption: Some(secret),
            destination: Some(destination.signet().encryption),
            recipient: Some(recipient.signet().encryption),
            ..Default::default()
        };
        Fixture {
            signing: SigningKey::generate(&mut OsRng),
            sealed: KekSet::derive(&keys).unwrap(),
            opened: KekSet::for_role(Role::Recipient, &sender, &recipient.encryption).unwrap(),
        }
    }

    #[test]
    fn content_roundtrip() {
        let f = fixture();
        let chunk = EncryptedChunk::seal(ChunkType::Headers, &f.signing, &f.sealed, FLAG_NONE, b"Subject: hi\n\n").unwrap();
        let view = chunk_header_read(chunk.buffer()).unwrap();
        let opened = open_content(&view, ChunkType::Headers, &f.signing.verifying_key(), &f.opened).unwrap();
        assert_eq!(&opened.data[..], b"Subject: hi\n\n");
        assert_eq!(opened.flags, FLAG_NONE);
    }

    #[test]
    fn content_is_padded() {
        let f = fixture();
        for len in [0usize, 1, 15, 16, 17, 100] {
            let data = alloc::vec![0x41u8; len];
            let chunk = EncryptedChunk::seal(ChunkType::Body, &f.signing, &f.sealed, FLAG_NONE, &data).unwrap();
            let overhead = CHUNK_HEADER_BYTES + FLAGS_BYTES + 2 * KEYSLOT_BYTES + NONCE_BYTES + AEAD_TAG_BYTES;
            assert_eq!((chunk.len() - overhead) % CONTENT_ALIGNMENT, 0);
        }
    }

    #[test]
    fn wrong_type_rejected() {
        let f = fixture();
        let chunk = EncryptedChunk::seal(ChunkType::Common, &f.signing, &f.sealed, FLAG_NONE, b"x").unwrap();
        let view = chunk_header_read(chunk.buffer()).unwrap();
        assert!(open_content(&view, ChunkType::Headers, &f.signing.verifying_key(), &f.opened).is_err());
    }

    #[test]
    fn wrong_signer_rejected() {
        let f = fixture();
        let other = SigningKey::generate(&mut OsRng);
        let chunk = EncryptedChunk::seal(ChunkType::Body, &f.signing, &f.sealed, FLAG_NONE, b"body").unwrap();
        let view = chunk_header_read(chunk.buffer()).unwrap();
        assert!(open_content(&view, ChunkType::Body, &other.verifying_key(), &f.opened).is_err());
    }

    #[test]
    fn flipped_flags_rejected() {
        let f = fixture();
        let chunk = EncryptedChunk::seal(ChunkType::Body, &f.signing, &f.sealed, FLAG_NONE, b"body").unwrap();
        let mut bytes = chunk.buffer().to_vec();
        bytes[CHUNK_HEADER_BYTES] = FLAG_SPANNING;
        let view = chunk_header_read(&bytes).unwrap();
        assert!(open_content(&view, ChunkType::Body, &f.signing.verifying_key(), &f.opened).is_err());
    }

    #[test]
    fn signature_chunk_sizes() {
        let f = fixture();
        let sig = f.signing.sign(b"span");
        let tree = EncryptedChunk::seal_signature(ChunkType::SignatureTree, &sig, &f.sealed).unwrap();
        let org = EncryptedChunk::seal_signature(ChunkType::SignatureDestination, &sig, &f.sealed).unwrap();
        assert_eq!(tree.len(), 161);
        assert_eq!(org.len(), 129);

        let view = chunk_header_read(org.buffer()).unwrap();
        assert_eq!(open_signature(&view, ChunkType::SignatureDestination, &f.opened).unwrap(), sig);
    }

    #[test]
    fn signature_type_mismatch_rejected() {
        let f = fixture();
        let sig = f.signing.sign(b"span");
        assert!(EncryptedChunk::seal_signature(ChunkType::Body, &sig, &f.sealed).is_err());
        assert!(EncryptedChunk::seal(ChunkType::SignatureUser, &f.signing, &f.sealed, FLAG_NONE, b"x").is_err());
    }

    #[test]
    fn parts_span_and_rejoin() {
        let f = fixture();
        let data: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let parts = part_encrypt(ChunkType::Body, &f.signing, &f.sealed, &data, 300).unwrap();
        assert_eq!(parts.len(), 4);
        assert!(parts[..3].iter().all(EncryptedChunk::is_spanning));
        assert!(!parts[3].is_spanning());

        let mut buffer = part_buffer(&parts);
        buffer.extend_from_slice(b"trailing");
        let (joined, consumed) = part_decrypt(ChunkType::Body, &f.signing.verifying_key(), &f.opened, &buffer).unwrap();
        assert_eq!(&joined[..], &data[..]);
        assert_eq!(consumed, buffer.len() - b"trailing".len());
    }

    #[test]
    fn empty_content_is_one_part() {
        let f = fixture();
        let parts = part_encrypt(ChunkType::Body, &f.signing, &f.sealed, b"", 300).unwrap();
        assert_eq!(parts.len(), 1);
        assert!(part_encrypt(ChunkType::Body, &f.signing, &f.sealed, b"x", 0).is_err());
    }

    #[test]
    fn truncated_span_rejected() {
        let f = fixture();
        let parts = part_encrypt(ChunkType::Body, &f.signing, &f.sealed, &[7u8; 64], 16).unwrap();
        let buffer = part_buffer(&parts[..2]);
        assert!(part_decrypt(ChunkType::Body, &f.signing.verifying_key(), &f.opened, &buffer).is_err());
    }

    #[test]
    fn ephemeral_roundtrip() {
        let signing = SigningKey::generate(&mut OsRng).verifying_key();
        let encryption = X25519PublicKey::from(&StaticSecret::random_from_rng(OsRng));
        let chunk = EphemeralChunk::new(Some(signing), Some(encryption)).unwrap();
        assert_eq!(chunk.buffer().len(), CHUNK_HEADER_BYTES + 1 + 2 * KEY_BYTES);

        let view = chunk_header_read(chunk.buffer()).unwrap();
        let parsed = EphemeralChunk::parse(&view).unwrap();
        assert_eq!(parsed.signing(), Some(&signing));
        assert_eq!(parsed.encryption(), Some(&encryption));
    }

    #[test]
    fn ephemeral_partial_and_malformed() {
        let signing = SigningKey::generate(&mut OsRng).verifying_key();
        let chunk = EphemeralChunk::new(Some(signing), None).unwrap();
        let view = chunk_header_read(chunk.buffer()).unwrap();
        let parsed = EphemeralChunk::parse(&view).unwrap();
        assert!(parsed.encryption().is_none());

        assert!(EphemeralChunk::new(None, None).is_err());

        let mut bytes = chunk.buffer().to_vec();
        bytes[CHUNK_HEADER_BYTES] = EPHEMERAL_HAS_SIGNING | EPHEMERAL_HAS_ENCRYPTION;
        let view = chunk_header_read(&bytes).unwrap();
        assert!(EphemeralChunk::parse(&view).is_err());
    }
}
