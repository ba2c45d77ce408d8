//! # Citadel Mail
//!
//! Signed, chunked, multi-recipient encrypted mail envelopes.
//!
//! ## Quick Start
//!
//! ```rust
//! use citadel_mail::{open_naked, MessageEnvelope, OrgKey, UserKey};
//!
//! let org = OrgKey::generate();
//! let user = UserKey::generate();
//!
//! let message = b"Subject: hello\r\n\r\nSee you at noon.\r\n";
//! let sealed = MessageEnvelope::seal_naked(message, &org, &user.signet()).unwrap();
//!
//! let opened = open_naked(sealed.encrypted(), &org.signet(), &user).unwrap();
//! assert_eq!(opened, message);
//! ```
//!
//! ## Security Properties
//!
//! - **Per-chunk keys**: every chunk has its own AES-256-GCM key, wrapped once
//!   per reader role
//! - **Three signatures**: tree (structure), user (ephemeral sender), org
//!   (destination countersignature)
//! - **Uniform errors**: all decode failures produce the same error value
//! - **Strict layout**: chunks are read in one fixed order, no trailing bytes
//!
//! ## What's NOT Provided
//!
//! - Author or origin-organization envelopes (naked messages only)
//! - Key distribution or signet lookup
//! - Streaming decode

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(unsafe_code)]
#![doc(html_root_url = "https://docs.rs/citadel-mail/0.1.0")]

extern crate alloc;

// ---------------------------------------------------------------------------
// Internal modules
// ---------------------------------------------------------------------------

mod aead;
mod error;

// Chunk-level building blocks. Exposed for tooling and tests, not stable API.
#[doc(hidden)]
pub mod chunk;
#[doc(hidden)]
pub mod kek;
#[doc(hidden)]
pub mod mail;
#[doc(hidden)]
pub mod signature;
#[doc(hidden)]
pub mod wire;

// ---------------------------------------------------------------------------
// Public interface
// ---------------------------------------------------------------------------

pub mod inspect;
pub mod keys;
pub mod message;

pub use error::{DecryptionError, EncodingError};
pub use inspect::{inspect, ChunkInfo, MessageInfo};
pub use keys::{OrgKey, OrgSignet, UserKey, UserSignet};
pub use message::{
    naked_message_get, naked_message_set, open_naked, DecodeStage, EncodeOptions, MessageEnvelope,
    DEFAULT_PART_BYTES,
};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Smallest buffer the decoder will look at.
pub const MIN_MESSAGE_BYTES: usize = wire::MIN_MESSAGE_BYTES;
