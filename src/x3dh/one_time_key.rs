use crate::Error;
use crate::types::{Curve25519PublicKey, Curve25519Secret};
use rand::TryCryptoRng;
use std::collections::BTreeMap;
use x25519_dalek::SharedSecret;

/// A one-time pre-key published for asynchronous session establishment.
///
/// A key is exported by [`crate::Account::one_time_keys`] until it is marked
/// as published, and stays usable for inbound sessions until it is removed.
#[derive(Clone)]
pub(crate) struct OneTimeKey {
    pub(crate) key: Curve25519Secret,
    pub(crate) id: u32,
    pub(crate) published: bool,
}

impl OneTimeKey {
    pub(crate) fn new<R: TryCryptoRng>(id: u32, rng: &mut R) -> Result<Self, Error> {
        Ok(Self {
            key: Curve25519Secret::new(rng)?,
            id,
            published: false,
        })
    }

    pub(crate) fn public_key(&self) -> Curve25519PublicKey {
        self.key.public_key()
    }

    pub(crate) fn dh(&self, public_key: &Curve25519PublicKey) -> Result<SharedSecret, Error> {
        self.key.dh(public_key)
    }
}

/// Ids of the keys touched by a single generation call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OneTimeKeyGenerationResult {
    /// Ids of the freshly generated keys, in ascending order.
    pub created: Vec<u32>,
    /// Ids of the oldest keys evicted to stay within capacity.
    pub removed: Vec<u32>,
}

/// Bounded pool of one-time keys, ordered by id.
///
/// Ids are handed out monotonically and never reused, so iteration order is
/// also insertion order and eviction drops the oldest key first.
#[derive(Clone)]
pub(crate) struct OneTimeKeyStore {
    pub(crate) keys: BTreeMap<u32, OneTimeKey>,
    pub(crate) next_id: u32,
    pub(crate) max_keys: usize,
}

impl OneTimeKeyStore {
    pub(crate) fn new(max_keys: usize) -> Self {
        Self {
            keys: BTreeMap::new(),
            next_id: 1,
            max_keys,
        }
    }

    /// Generates `count` new keys, evicting the oldest ones above capacity.
    ///
    /// All keys are generated before the pool is touched, so a randomness
    /// failure leaves the store as it was.
    pub(crate) fn generate<R: TryCryptoRng>(
        &mut self,
        count: usize,
        rng: &mut R,
    ) -> Result<OneTimeKeyGenerationResult, Error> {
        let mut next_id = self.next_id;
        let mut fresh = Vec::with_capacity(count);
        for _ in 0..count {
            fresh.push(OneTimeKey::new(next_id, rng)?);
            next_id = next_id.wrapping_add(1);
        }

        self.next_id = next_id;

        let mut result = OneTimeKeyGenerationResult::default();
        for key in fresh {
            result.created.push(key.id);
            self.keys.insert(key.id, key);
        }

        while self.keys.len() > self.max_keys {
            match self.keys.pop_first() {
                Some((id, _)) => result.removed.push(id),
                None => break,
            }
        }

        Ok(result)
    }

    /// Public keys of every key not yet marked as published.
    pub(crate) fn unpublished(&self) -> impl Iterator<Item = (u32, Curve25519PublicKey)> + '_ {
        self.keys
            .values()
            .filter(|key| !key.published)
            .map(|key| (key.id, key.public_key()))
    }

    pub(crate) fn mark_as_published(&mut self) {
        for key in self.keys.values_mut() {
            key.published = true;
        }
    }

    /// Looks a key up by its public half.
    pub(crate) fn find(&self, public_key: &Curve25519PublicKey) -> Option<&OneTimeKey> {
        self.keys
            .values()
            .find(|key| key.public_key() == *public_key)
    }

    /// Removes the key with the given public half, returning its id.
    pub(crate) fn remove(&mut self, public_key: &Curve25519PublicKey) -> Option<u32> {
        let id = self.find(public_key)?.id;
        self.keys.remove(&id).map(|key| key.id)
    }

    pub(crate) fn count(&self) -> usize {
        self.keys.len()
    }
}
