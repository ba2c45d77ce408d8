//! Naked messages: construction and verification.
//!
//! A naked message has no durable author. The sender generates a throwaway
//! Ed25519/X25519 identity, carries its public half in the ephemeral chunk,
//! and seals everything to the destination organization and the recipient.
//!
//! Layout and signature coverage:
//!
//! ```text
//!   type | size | ephemeral | common | headers | body.. | tree | user | org
//!                 \_______________ tree ______________/
//!                 \___________________ user ____________________/
//!                 \______________________ org _____________________________/
//! ```

extern crate alloc;
use alloc::vec::Vec;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::chunk::{open_content, part_buffer, part_decrypt, part_encrypt, EncryptedChunk, EphemeralChunk};
use crate::error::{DecryptionError, EncodingError};
use crate::kek::KekSet;
use crate::keys::{ChunkKeys, OrgKey, OrgSignet, Role, UserKey, UserSignet};
use crate::mail;
use crate::signature::{full_sign, full_verify, SignatureTree};
use crate::wire::{
    chunk_header_read, message_header_read, ChunkType, ChunkView, WireWriter, FLAG_NONE, MESSAGE_HEADER_BYTES,
    MESSAGE_NAKED, MIN_MESSAGE_BYTES, ORG_SIGNATURE_BYTES, TREE_SIGNATURE_BYTES, USER_SIGNATURE_BYTES,
};

/// Default upper bound on the plaintext carried by one body chunk.
pub const DEFAULT_PART_BYTES: usize = 1 << 20;

/// Tunables for message construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Body content larger than this is split across spanning chunks.
    pub max_part_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            max_part_size: DEFAULT_PART_BYTES,
        }
    }
}

impl EncodeOptions {
    pub fn with_max_part_size(mut self, max_part_size: usize) -> Self {
        self.max_part_size = max_part_size;
        self
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Routing and identity chunks.
#[derive(Debug, Default)]
pub struct EnvelopeChunks {
    pub ephemeral: Option<EphemeralChunk>,
    pub origin: Option<EncryptedChunk>,
    pub destination: Option<EncryptedChunk>,
}

#[derive(Debug, Default)]
pub struct MetadataChunks {
    pub common: Option<EncryptedChunk>,
    pub headers: Option<EncryptedChunk>,
}

#[derive(Debug, Default)]
pub struct ContentChunks {
    /// Body parts in wire order; all but the last are spanning.
    pub body: Vec<EncryptedChunk>,
}

#[derive(Debug, Default)]
pub struct SignatureChunks {
    pub tree: Option<EncryptedChunk>,
    pub user: Option<EncryptedChunk>,
    pub org: Option<EncryptedChunk>,
}

/// A sealed message and every piece it was built from.
///
/// Only ever handed out fully built. Secret material is wiped on drop.
#[derive(Default)]
pub struct MessageEnvelope {
    keys: ChunkKeys,
    keks: KekSet,
    envelope: EnvelopeChunks,
    metadata: MetadataChunks,
    content: ContentChunks,
    signatures: SignatureChunks,
    encrypted: Vec<u8>,
}

impl core::fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("keks", &self.keks)
            .field("body_parts", &self.content.body.len())
            .field("encrypted_bytes", &self.encrypted.len())
            .finish_non_exhaustive()
    }
}

fn expect_len(chunk: &EncryptedChunk, expected: usize, signature: &'static str) -> Result<(), EncodingError> {
    if chunk.len() != expected {
        tracing::warn!(signature, expected, actual = chunk.len(), "signature chunk has unexpected length");
        return Err(EncodingError);
    }
    Ok(())
}

impl MessageEnvelope {
    /// Seal `message` for `recipient`, countersigned by the destination
    /// organization, with default options.
    pub fn seal_naked(message: &[u8], destination: &OrgKey, recipient: &UserSignet) -> Result<Self, EncodingError> {
        Self::seal_naked_with(message, destination, recipient, &EncodeOptions::default())
    }

    pub fn seal_naked_with(
        message: &[u8],
        destination: &OrgKey,
        recipient: &UserSignet,
        options: &EncodeOptions,
    ) -> Result<Self, EncodingError> {
        let mut result = Self::default();

        // Throwaway sender identity.
        let signing = SigningKey::generate(&mut OsRng);
        let encryption = StaticSecret::random_from_rng(OsRng);
        result.envelope.ephemeral = Some(EphemeralChunk::new(
            Some(signing.verifying_key()),
            Some(X25519PublicKey::from(&encryption)),
        )?);
        result.keys.signing = Some(signing);
        result.keys.encryption = Some(encryption);

        result.keys.destination = Some(X25519PublicKey::from(&destination.encryption));
        result.keys.recipient = Some(recipient.encryption);
        result.keks = KekSet::derive(&result.keys)?;

        let signing = result.keys.signing.as_ref().ok_or(EncodingError)?;
        let keks = &result.keks;

        let (header, body) = message.split_at(mail::header_end(message));
        let common = Zeroizing::new(mail::common_headers(header));

        result.metadata.common = Some(EncryptedChunk::seal(ChunkType::Common, signing, keks, FLAG_NONE, &common)?);
        result.metadata.headers = Some(EncryptedChunk::seal(ChunkType::Headers, signing, keks, FLAG_NONE, header)?);
        result.content.body = part_encrypt(ChunkType::Body, signing, keks, body, options.max_part_size)?;

        let ephemeral = result.envelope.ephemeral.as_ref().ok_or(EncodingError)?;
        let common = result.metadata.common.as_ref().ok_or(EncodingError)?;
        let headers = result.metadata.headers.as_ref().ok_or(EncodingError)?;

        let mut tree = SignatureTree::new();
        tree.add(ephemeral.buffer()).add(common.buffer()).add(headers.buffer());
        for part in &result.content.body {
            tree.add(part.buffer());
        }
        let tree = tree.sign(signing, keks)?;
        expect_len(&tree, TREE_SIGNATURE_BYTES, "tree")?;

        let body = part_buffer(&result.content.body);
        let capacity = ephemeral.buffer().len()
            + common.len()
            + headers.len()
            + body.len()
            + TREE_SIGNATURE_BYTES
            + USER_SIGNATURE_BYTES
            + ORG_SIGNATURE_BYTES;

        let mut writer = WireWriter::new(MESSAGE_NAKED, capacity);
        writer
            .push(ephemeral.buffer())
            .push(common.buffer())
            .push(headers.buffer())
            .push(&body)
            .push(tree.buffer());

        let user = full_sign(ChunkType::SignatureUser, signing, keks, writer.signed_span())?;
        expect_len(&user, USER_SIGNATURE_BYTES, "user")?;
        writer.push(user.buffer());

        let org = full_sign(ChunkType::SignatureDestination, &destination.signing, keks, writer.signed_span())?;
        expect_len(&org, ORG_SIGNATURE_BYTES, "org")?;
        writer.push(org.buffer());

        result.encrypted = writer.finish()?;
        result.signatures.tree = Some(tree);
        result.signatures.user = Some(user);
        result.signatures.org = Some(org);

        tracing::debug!(
            bytes = result.encrypted.len(),
            body_parts = result.content.body.len(),
            "sealed naked message"
        );
        Ok(result)
    }

    /// The canonical serialized message.
    pub fn encrypted(&self) -> &[u8] {
        &self.encrypted
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        core::mem::take(&mut self.encrypted)
    }

    pub fn keys(&self) -> &ChunkKeys {
        &self.keys
    }

    pub fn keks(&self) -> &KekSet {
        &self.keks
    }

    pub fn envelope(&self) -> &EnvelopeChunks {
        &self.envelope
    }

    pub fn metadata(&self) -> &MetadataChunks {
        &self.metadata
    }

    pub fn content(&self) -> &ContentChunks {
        &self.content
    }

    pub fn signatures(&self) -> &SignatureChunks {
        &self.signatures
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Progress of a decode. Steps run in this order; any failure ends in `Failed`,
/// while [`open_naked_traced`] reports the last stage completed before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Start,
    EphemeralRead,
    CommonRead,
    HeadersRead,
    BodyRead,
    TreeVerified,
    UserVerified,
    OrgVerified,
    Done,
    Failed,
}

struct Decoder<'a> {
    message: &'a [u8],
    offset: usize,
    stage: DecodeStage,
    /// Last stage completed; not overwritten by `Failed`.
    reached: DecodeStage,
}

impl<'a> Decoder<'a> {
    fn new(message: &'a [u8]) -> Self {
        Self {
            message,
            offset: MESSAGE_HEADER_BYTES,
            stage: DecodeStage::Start,
            reached: DecodeStage::Start,
        }
    }

    fn advance(&mut self, next: DecodeStage) {
        tracing::trace!(from = ?self.stage, to = ?next, offset = self.offset, "decode step");
        self.stage = next;
        self.reached = next;
    }

    fn fail(&mut self, reason: &'static str) -> DecryptionError {
        tracing::debug!(stage = ?self.stage, offset = self.offset, reason, "naked message rejected");
        self.stage = DecodeStage::Failed;
        DecryptionError
    }

    /// Read the next chunk and require it to be `expected`.
    fn expect_chunk(&mut self, expected: ChunkType) -> Result<ChunkView<'a>, DecryptionError> {
        let message = self.message;
        let view = match chunk_header_read(&message[self.offset..]) {
            Ok(view) => view,
            Err(_) => return Err(self.fail("truncated chunk")),
        };
        if !view.is(expected) {
            return Err(self.fail("chunk out of sequence"));
        }
        self.offset += view.len();
        Ok(view)
    }

    fn gate(&mut self) -> Result<(), DecryptionError> {
        if self.message.len() < MIN_MESSAGE_BYTES {
            return Err(self.fail("shorter than the minimum message"));
        }
        let (object, size) = message_header_read(self.message).map_err(|_| self.fail("unreadable message header"))?;
        if object != MESSAGE_NAKED {
            return Err(self.fail("not a naked message"));
        }
        if self.message.len() - MESSAGE_HEADER_BYTES != size as usize {
            return Err(self.fail("declared size does not match length"));
        }
        Ok(())
    }

    fn run(&mut self, org: &OrgSignet, recipient: &UserKey) -> Result<Vec<u8>, DecryptionError> {
        let message = self.message;
        self.gate()?;

        // Ephemeral identity; a naked message needs both halves.
        let ephemeral_view = self.expect_chunk(ChunkType::Ephemeral)?;
        let ephemeral = EphemeralChunk::parse(&ephemeral_view).map_err(|_| self.fail("malformed ephemeral chunk"))?;
        let (Some(signing), Some(encryption)) = (ephemeral.signing().copied(), ephemeral.encryption().copied()) else {
            return Err(self.fail("ephemeral chunk lacks a signing or encryption key"));
        };
        let keks = KekSet::for_role(Role::Recipient, &encryption, &recipient.encryption)
            .map_err(|_| self.fail("kek derivation failed"))?;
        self.advance(DecodeStage::EphemeralRead);

        let common_view = self.expect_chunk(ChunkType::Common)?;
        open_content(&common_view, ChunkType::Common, &signing, &keks).map_err(|_| self.fail("common headers did not open"))?;
        self.advance(DecodeStage::CommonRead);

        let headers_view = self.expect_chunk(ChunkType::Headers)?;
        let headers = open_content(&headers_view, ChunkType::Headers, &signing, &keks)
            .map_err(|_| self.fail("headers did not open"))?
            .data;
        self.advance(DecodeStage::HeadersRead);

        let body_start = self.offset;
        let (body, consumed) = part_decrypt(ChunkType::Body, &signing, &keks, &message[body_start..])
            .map_err(|_| self.fail("body did not open"))?;
        self.offset += consumed;
        let body_span = &message[body_start..self.offset];
        self.advance(DecodeStage::BodyRead);

        let tree_view = self.expect_chunk(ChunkType::SignatureTree)?;
        if tree_view.len() != TREE_SIGNATURE_BYTES {
            return Err(self.fail("tree signature has the wrong length"));
        }
        let mut tree = SignatureTree::new();
        tree.add(ephemeral_view.bytes).add(common_view.bytes).add(headers_view.bytes);
        let mut rest = body_span;
        while !rest.is_empty() {
            let part = chunk_header_read(rest).map_err(|_| self.fail("body span did not re-parse"))?;
            tree.add(part.bytes);
            rest = &rest[part.len()..];
        }
        tree.verify(&signing, &keks, &tree_view)
            .map_err(|_| self.fail("tree signature mismatch"))?;
        self.advance(DecodeStage::TreeVerified);

        let user_start = self.offset;
        let user_view = self.expect_chunk(ChunkType::SignatureUser)?;
        if user_view.len() != USER_SIGNATURE_BYTES {
            return Err(self.fail("user signature has the wrong length"));
        }
        full_verify(
            ChunkType::SignatureUser,
            &signing,
            &keks,
            &message[MESSAGE_HEADER_BYTES..user_start],
            &user_view,
        )
        .map_err(|_| self.fail("user signature mismatch"))?;
        self.advance(DecodeStage::UserVerified);

        let org_start = self.offset;
        let org_view = self.expect_chunk(ChunkType::SignatureDestination)?;
        if org_view.len() != ORG_SIGNATURE_BYTES {
            return Err(self.fail("org signature has the wrong length"));
        }
        full_verify(
            ChunkType::SignatureDestination,
            &org.signing,
            &keks,
            &message[MESSAGE_HEADER_BYTES..org_start],
            &org_view,
        )
        .map_err(|_| self.fail("org signature mismatch"))?;
        if self.offset != message.len() {
            return Err(self.fail("trailing bytes after the org signature"));
        }
        self.advance(DecodeStage::OrgVerified);

        let mut result = Vec::with_capacity(headers.len() + body.len());
        result.extend_from_slice(&headers);
        result.extend_from_slice(&body);
        self.advance(DecodeStage::Done);
        Ok(result)
    }
}

/// Verify and decrypt a naked message addressed to `recipient`.
///
/// Returns the original headers followed by the body. Every failure, from a
/// short buffer to a bad organization signature, yields the same error.
pub fn open_naked(message: &[u8], org: &OrgSignet, recipient: &UserKey) -> Result<Vec<u8>, DecryptionError> {
    let mut decoder = Decoder::new(message);
    let result = decoder.run(org, recipient);
    if result.is_ok() {
        tracing::debug!(bytes = message.len(), "opened naked message");
    }
    result
}

/// Build a naked message and return its serialized form.
pub fn naked_message_set(
    message: &[u8],
    destination: &OrgKey,
    recipient: &UserSignet,
) -> Result<Vec<u8>, EncodingError> {
    MessageEnvelope::seal_naked(message, destination, recipient).map(MessageEnvelope::into_bytes)
}

pub fn naked_message_get(message: &[u8], org: &OrgSignet, recipient: &UserKey) -> Result<Vec<u8>, DecryptionError> {
    open_naked(message, org, recipient)
}

/// Same as [`open_naked`], also reporting the last stage completed.
///
/// On success that is `Done`. On failure it is the stage the decoder had
/// reached when the next step was rejected, e.g. `Start` for a buffer that
/// fails the length gate.
pub fn open_naked_traced(
    message: &[u8],
    org: &OrgSignet,
    recipient: &UserKey,
) -> (Result<Vec<u8>, DecryptionError>, DecodeStage) {
    let mut decoder = Decoder::new(message);
    let result = decoder.run(org, recipient);
    debug_assert!(result.is_ok() || decoder.stage == DecodeStage::Failed);
    (result, decoder.reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{CHUNK_HEADER_BYTES, FLAGS_BYTES};

    const MESSAGE: &[u8] = b"Date: Tue, 3 Mar 2026 10:00:00 +0000\r\n\
        From: sender@example.org\r\n\
        To: recipient@example.com\r\n\
        Subject: hello\r\n\
        \r\n\
        Body text.\r\n";

    #[test]
    fn envelope_fields_populated() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let sealed = MessageEnvelope::seal_naked(MESSAGE, &org, &user.signet()).unwrap();

        assert!(sealed.envelope().ephemeral.is_some());
        assert!(sealed.envelope().origin.is_none());
        assert!(sealed.envelope().destination.is_none());
        assert!(sealed.keys().author.is_none());
        assert_eq!(sealed.keks().len(), 2);
        assert_eq!(sealed.content().body.len(), 1);
        assert_eq!(sealed.content().body[0].chunk_type(), ChunkType::Body);
        assert_eq!(sealed.content().body[0].flags(), FLAG_NONE);
        assert_eq!(sealed.metadata().common.as_ref().unwrap().chunk_type(), ChunkType::Common);
        assert_eq!(sealed.metadata().headers.as_ref().unwrap().chunk_type(), ChunkType::Headers);
        assert_eq!(sealed.signatures().tree.as_ref().unwrap().len(), TREE_SIGNATURE_BYTES);
        assert_eq!(sealed.signatures().user.as_ref().unwrap().len(), USER_SIGNATURE_BYTES);
        assert_eq!(sealed.signatures().org.as_ref().unwrap().len(), ORG_SIGNATURE_BYTES);
    }

    #[test]
    fn stages_reach_done() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let sealed = MessageEnvelope::seal_naked(MESSAGE, &org, &user.signet()).unwrap();

        let (result, stage) = open_naked_traced(sealed.encrypted(), &org.signet(), &user);
        assert_eq!(result.unwrap(), MESSAGE);
        assert_eq!(stage, DecodeStage::Done);
    }

    #[test]
    fn wrong_org_fails_at_last_step() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let sealed = MessageEnvelope::seal_naked(MESSAGE, &org, &user.signet()).unwrap();

        let (result, stage) = open_naked_traced(sealed.encrypted(), &OrgKey::generate().signet(), &user);
        assert_eq!(result, Err(DecryptionError));
        assert_eq!(stage, DecodeStage::UserVerified);
    }

    /// Offset of the `index`-th chunk after the message header.
    fn chunk_offset(bytes: &[u8], index: usize) -> usize {
        let mut offset = MESSAGE_HEADER_BYTES;
        for _ in 0..index {
            offset += chunk_header_read(&bytes[offset..]).unwrap().len();
        }
        offset
    }

    #[test]
    fn tampered_body_fails_after_headers() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let sealed = MessageEnvelope::seal_naked(MESSAGE, &org, &user.signet()).unwrap();
        let mut bytes = sealed.encrypted().to_vec();

        // Last byte of the body chunk: inside the AEAD tag.
        let body_end = chunk_offset(&bytes, 4);
        bytes[body_end - 1] ^= 0x01;

        let (result, stage) = open_naked_traced(&bytes, &org.signet(), &user);
        assert_eq!(result, Err(DecryptionError));
        assert_eq!(stage, DecodeStage::HeadersRead);
    }

    #[test]
    fn foreign_keyslot_flip_fails_at_tree() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let sealed = MessageEnvelope::seal_naked(MESSAGE, &org, &user.signet()).unwrap();
        let mut bytes = sealed.encrypted().to_vec();

        // The destination slot is not used by the recipient, so the body
        // still opens and only the tree signature notices.
        let body = chunk_offset(&bytes, 3);
        bytes[body + CHUNK_HEADER_BYTES + FLAGS_BYTES] ^= 0x01;

        let (result, stage) = open_naked_traced(&bytes, &org.signet(), &user);
        assert_eq!(result, Err(DecryptionError));
        assert_eq!(stage, DecodeStage::BodyRead);
    }

    #[test]
    fn each_stage_is_reached_in_order() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let sealed = MessageEnvelope::seal_naked(MESSAGE, &org, &user.signet()).unwrap();
        let bytes = sealed.encrypted();

        // Corrupting the tag of chunk i stops the decoder right after the
        // stage that precedes reading it.
        let expected = [
            DecodeStage::EphemeralRead,
            DecodeStage::CommonRead,
            DecodeStage::HeadersRead,
            DecodeStage::BodyRead,
            DecodeStage::TreeVerified,
            DecodeStage::UserVerified,
        ];
        for (i, stage) in expected.into_iter().enumerate() {
            let mut tampered = bytes.to_vec();
            let end = chunk_offset(bytes, i + 2);
            tampered[end - 1] ^= 0x01;
            let (result, reached) = open_naked_traced(&tampered, &org.signet(), &user);
            assert!(result.is_err());
            assert_eq!(reached, stage, "chunk {}", i + 1);
        }
    }

    #[test]
    fn oversized_declared_length_rejected() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let mut bytes = [0u8; 64];
        bytes[..2].copy_from_slice(&MESSAGE_NAKED.to_be_bytes());
        bytes[2..6].copy_from_slice(&u32::MAX.to_be_bytes());

        let (result, stage) = open_naked_traced(&bytes, &org.signet(), &user);
        assert_eq!(result, Err(DecryptionError));
        assert_eq!(stage, DecodeStage::Start);
    }

    #[test]
    fn short_buffer_fails_before_parsing() {
        let org = OrgKey::generate();
        let user = UserKey::generate();
        let (result, stage) = open_naked_traced(&[0u8; 3], &org.signet(), &user);
        assert!(result.is_err());
        assert_eq!(stage, DecodeStage::Start);
    }
}
