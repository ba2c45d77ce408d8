//! Key encapsulation keys (v1)
//!
//! shared = X25519(local_secret, peer_public)
//! salt   = SHA3-256(sender_encryption_pk || role_pk)
//! info   = PROTOCOL_ID || b"|kek|" || role_label
//! kek    = HKDF-SHA256(shared, salt, info, len=32)
//!
//! The sender computes one KEK per role from its encryption secret and the
//! role's public key. A role holder computes the same KEK from its own
//! secret and the sender's public encryption key.

extern crate alloc;
use alloc::vec::Vec;

use hkdf::Hkdf;
use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{DecryptionError, EncodingError};
use crate::keys::{ChunkKeys, Role};
use crate::wire::{KEY_BYTES, PROTOCOL_ID};

pub type Kek = [u8; KEY_BYTES];

/// One optional KEK per role. Wiped on drop.
#[derive(Default, Zeroize)]
pub struct KekSet {
    author: Option<Kek>,
    origin: Option<Kek>,
    destination: Option<Kek>,
    recipient: Option<Kek>,
}

impl Drop for KekSet {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl core::fmt::Debug for KekSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KekSet")
            .field("author", &self.author.is_some())
            .field("origin", &self.origin.is_some())
            .field("destination", &self.destination.is_some())
            .field("recipient", &self.recipient.is_some())
            .finish()
    }
}

impl KekSet {
    /// Sender side: one KEK for every role key present in `keys`.
    ///
    /// A role whose exchange fails is left without a KEK; its keyslots get
    /// filler. Fails if `keys` has no encryption secret or no KEK could be
    /// derived at all.
    pub fn derive(keys: &ChunkKeys) -> Result<Self, EncodingError> {
        let secret = keys.encryption.as_ref().ok_or(EncodingError)?;
        let sender = X25519PublicKey::from(secret);

        let mut set = Self::default();
        for role in Role::ALL {
            if let Some(peer) = keys.role(role) {
                if let Ok(kek) = derive_kek(secret, peer, &sender, peer, role) {
                    set.set(role, *kek);
                }
            }
        }

        if set.is_empty() {
            tracing::debug!("no role keys available for kek derivation");
            return Err(EncodingError);
        }
        Ok(set)
    }

    /// Role-holder side: the single KEK `role` can compute from its own secret.
    pub fn for_role(
        role: Role,
        sender_encryption: &X25519PublicKey,
        role_secret: &StaticSecret,
    ) -> Result<Self, DecryptionError> {
        let own = X25519PublicKey::from(role_secret);
        let kek = derive_kek(role_secret, sender_encryption, sender_encryption, &own, role)?;
        let mut set = Self::default();
        set.set(role, *kek);
        Ok(set)
    }

    pub fn get(&self, role: Role) -> Option<&Kek> {
        match role {
            Role::Author => self.author.as_ref(),
            Role::Origin => self.origin.as_ref(),
            Role::Destination => self.destination.as_ref(),
            Role::Recipient => self.recipient.as_ref(),
        }
    }

    fn set(&mut self, role: Role, kek: Kek) {
        let slot = match role {
            Role::Author => &mut self.author,
            Role::Origin => &mut self.origin,
            Role::Destination => &mut self.destination,
            Role::Recipient => &mut self.recipient,
        };
        *slot = Some(kek);
    }

    pub fn len(&self) -> usize {
        Role::ALL.iter().filter(|role| self.get(**role).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn derive_kek(
    local: &StaticSecret,
    peer: &X25519PublicKey,
    sender_pk: &X25519PublicKey,
    role_pk: &X25519PublicKey,
    role: Role,
) -> Result<Zeroizing<Kek>, EncodingError> {
    let shared = local.diffie_hellman(peer);
    if !shared.was_contributory() {
        tracing::debug!(role = ?role, "non-contributory x25519 exchange");
        return Err(EncodingError);
    }

    let mut transcript = Sha3_256::new();
    transcript.update(sender_pk.as_bytes());
    transcript.update(role_pk.as_bytes());
    let salt = transcript.finalize();

    let label = role.label();
    let mut info = Vec::with_capacity(PROTOCOL_ID.len() + 5 + label.len());
    info.extend_from_slice(PROTOCOL_ID);
    info.extend_from_slice(b"|kek|");
    info.extend_from_slice(label);

    let hk = Hkdf::<Sha256>::new(Some(salt.as_slice()), shared.as_bytes());
    let mut out = Zeroizing::new([0u8; KEY_BYTES]);
    hk.expand(&info, &mut out[..]).map_err(|_| EncodingError)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::UserKey;
    use rand_core::OsRng;

    fn sender_keys(recipient: &UserKey, destination: &UserKey) -> ChunkKeys {
        ChunkKeys {
            encryption: Some(StaticSecret::random_from_rng(OsRng)),
            destination: Some(destination.signet().encryption),
            recipient: Some(recipient.signet().encryption),
            ..Default::default()
        }
    }

    #[test]
    fn both_sides_agree() {
        let recipient = UserKey::generate();
        let destination = UserKey::generate();
        let keys = sender_keys(&recipient, &destination);
        let sender_pk = X25519PublicKey::from(keys.encryption.as_ref().unwrap());

        let sealed = KekSet::derive(&keys).unwrap();
        assert_eq!(sealed.len(), 2);
        assert!(sealed.get(Role::Author).is_none());

        let opened = KekSet::for_role(Role::Recipient, &sender_pk, &recipient.encryption).unwrap();
        assert_eq!(opened.get(Role::Recipient), sealed.get(Role::Recipient));

        let org = KekSet::for_role(Role::Destination, &sender_pk, &destination.encryption).unwrap();
        assert_eq!(org.get(Role::Destination), sealed.get(Role::Destination));
    }

    #[test]
    fn roles_get_distinct_keys() {
        let shared = UserKey::generate();
        let keys = sender_keys(&shared, &shared);
        let set = KekSet::derive(&keys).unwrap();
        assert_ne!(set.get(Role::Recipient), set.get(Role::Destination));
    }

    #[test]
    fn no_roles_is_an_error() {
        let keys = ChunkKeys {
            encryption: Some(StaticSecret::random_from_rng(OsRng)),
            ..Default::default()
        };
        assert!(KekSet::derive(&keys).is_err());
    }

    #[test]
    fn missing_encryption_secret_is_an_error() {
        let keys = ChunkKeys {
            recipient: Some(UserKey::generate().signet().encryption),
            ..Default::default()
        };
        assert!(KekSet::derive(&keys).is_err());
    }

    #[test]
    fn low_order_peer_rejected() {
        let keys = ChunkKeys {
            encryption: Some(StaticSecret::random_from_rng(OsRng)),
            recipient: Some(X25519PublicKey::from([0u8; 32])),
            ..Default::default()
        };
        assert!(KekSet::derive(&keys).is_err());
    }

    #[test]
    fn low_order_role_skipped() {
        let recipient = UserKey::generate();
        let keys = ChunkKeys {
            encryption: Some(StaticSecret::random_from_rng(OsRng)),
            destination: Some(X25519PublicKey::from([0u8; 32])),
            recipient: Some(recipient.signet().encryption),
            ..Default::default()
        };
        let set = KekSet::derive(&keys).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get(Role::Destination).is_none());
        assert!(set.get(Role::Recipient).is_some());
    }
}
