//! Structural inspection without keys.
//!
//! Reads the message header and walks the chunk headers. Nothing is
//! decrypted and no signature is checked, so a layout that inspects cleanly
//! may still fail to open.

extern crate alloc;
use alloc::vec::Vec;
use core::fmt;

use crate::chunk::EphemeralChunk;
use crate::error::DecryptionError;
use crate::wire::{
    chunk_header_read, message_header_read, ChunkType, CHUNK_HEADER_BYTES, FLAG_SPANNING, MESSAGE_ENCRYPTED,
    MESSAGE_HEADER_BYTES, MESSAGE_NAKED, MIN_MESSAGE_BYTES,
};

/// One chunk as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub offset: usize,
    /// Raw type byte; may not name a known chunk type.
    pub chunk_type: u8,
    /// Total bytes including the 4-byte header.
    pub total_bytes: usize,
    /// Flags byte of an encrypted chunk, `None` for cleartext chunks.
    pub flags: Option<u8>,
}

impl ChunkInfo {
    pub fn kind(&self) -> Option<ChunkType> {
        ChunkType::from_u8(self.chunk_type)
    }
}

impl fmt::Display for ChunkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind() {
            Some(kind) => kind.name(),
            None => "unknown",
        };
        write!(f, "@{:<8} {:<22} {:>8} bytes", self.offset, name, self.total_bytes)?;
        if let Some(flags) = self.flags {
            write!(f, "  flags=0x{:02X}", flags)?;
            if flags & FLAG_SPANNING != 0 {
                write!(f, " (spanning)")?;
            }
        }
        Ok(())
    }
}

/// Message metadata extracted without decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    pub message_type: u16,
    pub declared_bytes: u32,
    pub total_bytes: usize,
    pub has_ephemeral_signing: bool,
    pub has_ephemeral_encryption: bool,
    pub chunks: Vec<ChunkInfo>,
}

impl MessageInfo {
    pub fn type_name(&self) -> &'static str {
        match self.message_type {
            MESSAGE_NAKED => "naked",
            MESSAGE_ENCRYPTED => "encrypted",
            _ => "unknown",
        }
    }
}

impl fmt::Display for MessageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Citadel Mail {} message | {} bytes ({} declared) | {} chunks",
            self.type_name(),
            self.total_bytes,
            self.declared_bytes,
            self.chunks.len()
        )?;
        writeln!(
            f,
            "Ephemeral keys: signing={} encryption={}",
            self.has_ephemeral_signing, self.has_ephemeral_encryption
        )?;
        for chunk in &self.chunks {
            writeln!(f, "  {}", chunk)?;
        }
        Ok(())
    }
}

/// Inspect message structure without decrypting.
pub fn inspect(message: &[u8]) -> Result<MessageInfo, DecryptionError> {
    if message.len() < MIN_MESSAGE_BYTES {
        return Err(DecryptionError);
    }
    let (message_type, declared_bytes) = message_header_read(message)?;
    if message.len() - MESSAGE_HEADER_BYTES != declared_bytes as usize {
        return Err(DecryptionError);
    }

    let mut info = MessageInfo {
        message_type,
        declared_bytes,
        total_bytes: message.len(),
        has_ephemeral_signing: false,
        has_ephemeral_encryption: false,
        chunks: Vec::new(),
    };

    let mut offset = MESSAGE_HEADER_BYTES;
    while offset < message.len() {
        let view = chunk_header_read(&message[offset..])?;
        let flags = if view.is(ChunkType::Ephemeral) {
            let ephemeral = EphemeralChunk::parse(&view)?;
            info.has_ephemeral_signing = ephemeral.signing().is_some();
            info.has_ephemeral_encryption = ephemeral.encryption().is_some();
            None
        } else {
            view.bytes.get(CHUNK_HEADER_BYTES).copied()
        };
        info.chunks.push(ChunkInfo {
            offset,
            chunk_type: view.chunk_type,
            total_bytes: view.len(),
            flags,
        });
        offset += view.len();
    }

    Ok(info)
}
