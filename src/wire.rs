//! Wire format
//!
//! Message:
//!   type[2] || size[4] || ephemeral || common || headers || body[1..]
//!   || tree_sig[161] || user_sig[161] || org_sig[129]
//!
//! `size` counts every byte after the size field. All integers are
//! big-endian.
//!
//! Chunk:
//!   type[1] || size[3] || payload[size]

extern crate alloc;
use alloc::vec::Vec;

use crate::error::{DecryptionError, EncodingError};

/// Protocol identifier for KDF domain separation
pub const PROTOCOL_ID: &[u8] = b"citadel-mail-v1";

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// Full message with a durable author identity (not produced by this crate).
pub const MESSAGE_ENCRYPTED: u16 = 1847;

/// Naked message: ephemeral sender identity, single recipient.
pub const MESSAGE_NAKED: u16 = 1976;

// ---------------------------------------------------------------------------
// Component sizes
// ---------------------------------------------------------------------------

/// type[2] + size[4]
pub const MESSAGE_HEADER_BYTES: usize = 2 + 4;

/// type[1] + size[3]
pub const CHUNK_HEADER_BYTES: usize = 1 + 3;

/// Largest payload a 24-bit size field can describe.
pub const CHUNK_MAX_PAYLOAD_BYTES: usize = 0x00FF_FFFF;

pub const KEY_BYTES: usize = 32;
pub const SIGNATURE_BYTES: usize = 64;
pub const KEYSLOT_BYTES: usize = 32;
pub const NONCE_BYTES: usize = 12;
pub const AEAD_TAG_BYTES: usize = 16;
pub const FLAGS_BYTES: usize = 1;

/// Content chunk inner prefix: signature[64] || data_len[3] || pad_len[1]
pub const CONTENT_PREFIX_BYTES: usize = SIGNATURE_BYTES + 3 + 1;

/// Inner plaintext of content chunks is padded to this boundary.
pub const CONTENT_ALIGNMENT: usize = 16;

/// Size of a signature chunk carrying `slots` keyslots.
pub const fn signature_chunk_bytes(slots: usize) -> usize {
    CHUNK_HEADER_BYTES + FLAGS_BYTES + slots * KEYSLOT_BYTES + NONCE_BYTES + SIGNATURE_BYTES + AEAD_TAG_BYTES
}

/// Tree signature chunk: two keyslots (destination, recipient).
pub const TREE_SIGNATURE_BYTES: usize = signature_chunk_bytes(2); // 161

/// User signature chunk: two keyslots (destination, recipient).
pub const USER_SIGNATURE_BYTES: usize = signature_chunk_bytes(2); // 161

/// Organization signature chunk: one keyslot (recipient).
pub const ORG_SIGNATURE_BYTES: usize = signature_chunk_bytes(1); // 129

/// Anything shorter cannot be a message.
pub const MIN_MESSAGE_BYTES: usize = 35;

// ---------------------------------------------------------------------------
// Chunk types and flags
// ---------------------------------------------------------------------------

/// On-wire chunk type tags.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    SignatureTree = 0x01,
    Ephemeral = 0x02,
    Origin = 0x04,
    Destination = 0x05,
    Common = 0x06,
    Headers = 0x07,
    Body = 0x08,
    SignatureUser = 0xF0,
    SignatureOrigin = 0xF1,
    SignatureDestination = 0xF2,
}

impl ChunkType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::SignatureTree),
            0x02 => Some(Self::Ephemeral),
            0x04 => Some(Self::Origin),
            0x05 => Some(Self::Destination),
            0x06 => Some(Self::Common),
            0x07 => Some(Self::Headers),
            0x08 => Some(Self::Body),
            0xF0 => Some(Self::SignatureUser),
            0xF1 => Some(Self::SignatureOrigin),
            0xF2 => Some(Self::SignatureDestination),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SignatureTree => "signature-tree",
            Self::Ephemeral => "ephemeral",
            Self::Origin => "origin",
            Self::Destination => "destination",
            Self::Common => "common",
            Self::Headers => "headers",
            Self::Body => "body",
            Self::SignatureUser => "signature-user",
            Self::SignatureOrigin => "signature-origin",
            Self::SignatureDestination => "signature-destination",
        }
    }

    /// Signature chunks carry a bare 64-byte signature instead of signed content.
    pub fn is_signature(self) -> bool {
        matches!(
            self,
            Self::SignatureTree | Self::SignatureUser | Self::SignatureOrigin | Self::SignatureDestination
        )
    }
}

/// No flags set.
pub const FLAG_NONE: u8 = 0x00;

/// Another part of the same content follows this chunk.
pub const FLAG_SPANNING: u8 = 0x01;

/// Every flag bit this version understands.
pub const FLAGS_KNOWN: u8 = FLAG_SPANNING;

// ---------------------------------------------------------------------------
// Message header
// ---------------------------------------------------------------------------

/// Read `type[2] || size[4]`.
pub fn message_header_read(data: &[u8]) -> Result<(u16, u32), DecryptionError> {
    if data.len() < MESSAGE_HEADER_BYTES {
        return Err(DecryptionError);
    }
    let object = u16::from_be_bytes([data[0], data[1]]);
    let size = u32::from_be_bytes([data[2], data[3], data[4], data[5]]);
    Ok((object, size))
}

// ---------------------------------------------------------------------------
// Chunk header
// ---------------------------------------------------------------------------

/// Borrowed view of one chunk (header included).
#[derive(Debug, Clone, Copy)]
pub struct ChunkView<'a> {
    pub chunk_type: u8,
    pub size: u32,
    pub bytes: &'a [u8],
}

impl<'a> ChunkView<'a> {
    /// Header + payload length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[CHUNK_HEADER_BYTES..]
    }

    pub fn is(&self, expected: ChunkType) -> bool {
        self.chunk_type == expected as u8
    }
}

/// Parse the chunk at the front of `data`.
///
/// Fails if fewer than `4 + size` bytes remain.
pub fn chunk_header_read(data: &[u8]) -> Result<ChunkView<'_>, DecryptionError> {
    if data.len() < CHUNK_HEADER_BYTES {
        return Err(DecryptionError);
    }
    let chunk_type = data[0];
    let size = u32::from_be_bytes([0, data[1], data[2], data[3]]);
    let end = CHUNK_HEADER_BYTES
        .checked_add(size as usize)
        .ok_or(DecryptionError)?;
    if data.len() < end {
        return Err(DecryptionError);
    }
    Ok(ChunkView {
        chunk_type,
        size,
        bytes: &data[..end],
    })
}

/// Encode a chunk header for a payload of `size` bytes.
pub fn chunk_header(chunk_type: ChunkType, size: usize) -> Result<[u8; CHUNK_HEADER_BYTES], EncodingError> {
    if size > CHUNK_MAX_PAYLOAD_BYTES {
        return Err(EncodingError);
    }
    let be = (size as u32).to_be_bytes();
    Ok([chunk_type as u8, be[1], be[2], be[3]])
}

/// Encode a 24-bit big-endian length.
pub(crate) fn u24_be(value: usize) -> Result<[u8; 3], EncodingError> {
    if value > CHUNK_MAX_PAYLOAD_BYTES {
        return Err(EncodingError);
    }
    let be = (value as u32).to_be_bytes();
    Ok([be[1], be[2], be[3]])
}

pub(crate) fn u24_from_be(bytes: [u8; 3]) -> usize {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as usize
}

// ---------------------------------------------------------------------------
// Message writer
// ---------------------------------------------------------------------------

/// Accumulates a message in wire order and patches the size field last.
#[derive(Debug)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    /// Start a message of the given type with a placeholder size.
    pub fn new(message_type: u16, capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(MESSAGE_HEADER_BYTES + capacity);
        buf.extend_from_slice(&message_type.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]);
        Self { buf }
    }

    pub fn push(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Everything after the message header, i.e. the span full signatures cover.
    pub fn signed_span(&self) -> &[u8] {
        &self.buf[MESSAGE_HEADER_BYTES..]
    }

    /// Patch the size field and hand back the finished buffer.
    pub fn finish(mut self) -> Result<Vec<u8>, EncodingError> {
        let size = u32::try_from(self.buf.len() - MESSAGE_HEADER_BYTES).map_err(|_| EncodingError)?;
        self.buf[2..MESSAGE_HEADER_BYTES].copy_from_slice(&size.to_be_bytes());
        Ok(self.buf)
    }
}
