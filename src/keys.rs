//! Identity keys and the per-message key set.
//!
//! Every identity (organization or user) has an Ed25519 signing key and an
//! X25519 encryption key. The public halves form a *signet*.
//!
//! Key serialization:
//!   Signet = ed25519_pk[32] || x25519_pk[32]   (64 bytes)
//!   Key    = ed25519_sk[32] || x25519_sk[32]   (64 bytes)

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::DecryptionError;
use crate::wire::KEY_BYTES;

/// Serialized signet size.
pub const SIGNET_BYTES: usize = KEY_BYTES * 2;

/// Serialized private key size.
pub const PRIVATE_KEY_BYTES: usize = KEY_BYTES * 2;

fn split_pair(bytes: &[u8], expected: usize) -> Result<([u8; KEY_BYTES], [u8; KEY_BYTES]), DecryptionError> {
    if bytes.len() != expected {
        return Err(DecryptionError);
    }
    let first: [u8; KEY_BYTES] = bytes[..KEY_BYTES].try_into().map_err(|_| DecryptionError)?;
    let second: [u8; KEY_BYTES] = bytes[KEY_BYTES..].try_into().map_err(|_| DecryptionError)?;
    Ok((first, second))
}

fn join_pair(first: &[u8; KEY_BYTES], second: &[u8; KEY_BYTES]) -> [u8; KEY_BYTES * 2] {
    let mut out = [0u8; KEY_BYTES * 2];
    out[..KEY_BYTES].copy_from_slice(first);
    out[KEY_BYTES..].copy_from_slice(second);
    out
}

fn signet_from_bytes(bytes: &[u8]) -> Result<(VerifyingKey, X25519PublicKey), DecryptionError> {
    let (signing, encryption) = split_pair(bytes, SIGNET_BYTES)?;
    let signing = VerifyingKey::from_bytes(&signing).map_err(|_| DecryptionError)?;
    Ok((signing, X25519PublicKey::from(encryption)))
}

fn key_from_bytes(bytes: &[u8]) -> Result<(SigningKey, StaticSecret), DecryptionError> {
    let (signing, encryption) = split_pair(bytes, PRIVATE_KEY_BYTES)?;
    let signing = Zeroizing::new(signing);
    let encryption = Zeroizing::new(encryption);
    Ok((SigningKey::from_bytes(&signing), StaticSecret::from(*encryption)))
}

// ---------------------------------------------------------------------------
// Organization
// ---------------------------------------------------------------------------

/// Public half of an organization identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrgSignet {
    pub signing: VerifyingKey,
    pub encryption: X25519PublicKey,
}

impl OrgSignet {
    /// Serialize: ed25519_pk[32] || x25519_pk[32]
    pub fn to_bytes(&self) -> [u8; SIGNET_BYTES] {
        join_pair(self.signing.as_bytes(), self.encryption.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        let (signing, encryption) = signet_from_bytes(bytes)?;
        Ok(Self { signing, encryption })
    }
}

/// Private organization identity. Signs the outermost message signature.
pub struct OrgKey {
    pub signing: SigningKey,
    pub encryption: StaticSecret,
}

impl OrgKey {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            encryption: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn signet(&self) -> OrgSignet {
        OrgSignet {
            signing: self.signing.verifying_key(),
            encryption: X25519PublicKey::from(&self.encryption),
        }
    }

    /// Serialize: ed25519_sk[32] || x25519_sk[32]
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_BYTES]> {
        let encryption = Zeroizing::new(self.encryption.to_bytes());
        Zeroizing::new(join_pair(&self.signing.to_bytes(), &encryption))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        let (signing, encryption) = key_from_bytes(bytes)?;
        Ok(Self { signing, encryption })
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Public half of a user identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSignet {
    pub signing: VerifyingKey,
    pub encryption: X25519PublicKey,
}

impl UserSignet {
    /// Serialize: ed25519_pk[32] || x25519_pk[32]
    pub fn to_bytes(&self) -> [u8; SIGNET_BYTES] {
        join_pair(self.signing.as_bytes(), self.encryption.as_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        let (signing, encryption) = signet_from_bytes(bytes)?;
        Ok(Self { signing, encryption })
    }
}

/// Private user identity. The recipient opens messages with it.
pub struct UserKey {
    pub signing: SigningKey,
    pub encryption: StaticSecret,
}

impl UserKey {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
            encryption: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn signet(&self) -> UserSignet {
        UserSignet {
            signing: self.signing.verifying_key(),
            encryption: X25519PublicKey::from(&self.encryption),
        }
    }

    /// Serialize: ed25519_sk[32] || x25519_sk[32]
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_BYTES]> {
        let encryption = Zeroizing::new(self.encryption.to_bytes());
        Zeroizing::new(join_pair(&self.signing.to_bytes(), &encryption))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        let (signing, encryption) = key_from_bytes(bytes)?;
        Ok(Self { signing, encryption })
    }
}

// ---------------------------------------------------------------------------
// Per-message key set
// ---------------------------------------------------------------------------

/// Roles a message chunk can be readable by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Author,
    Origin,
    Destination,
    Recipient,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Author, Role::Origin, Role::Destination, Role::Recipient];

    /// KDF label.
    pub fn label(self) -> &'static [u8] {
        match self {
            Role::Author => b"author",
            Role::Origin => b"origin",
            Role::Destination => b"destination",
            Role::Recipient => b"recipient",
        }
    }
}

/// Sender-side keys for one message: the signing and encryption key pairs
/// plus the public encryption key of every role the message is sealed to.
#[derive(Default)]
pub struct ChunkKeys {
    pub signing: Option<SigningKey>,
    pub encryption: Option<StaticSecret>,
    pub author: Option<X25519PublicKey>,
    pub origin: Option<X25519PublicKey>,
    pub destination: Option<X25519PublicKey>,
    pub recipient: Option<X25519PublicKey>,
}

impl ChunkKeys {
    pub fn role(&self, role: Role) -> Option<&X25519PublicKey> {
        match role {
            Role::Author => self.author.as_ref(),
            Role::Origin => self.origin.as_ref(),
            Role::Destination => self.destination.as_ref(),
            Role::Recipient => self.recipient.as_ref(),
        }
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signing.as_ref().map(SigningKey::verifying_key)
    }
}
