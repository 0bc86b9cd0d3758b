//! Cached, trie-backed index from contract address to funding Vin.

use indexmap::IndexMap;
use rlp::{DecoderError, Decodable, Encodable, Rlp, RlpStream};

use crate::collaborators::{AccountTrie, VinTrie};
use crate::errors::{DecodeError, VinStoreError};
use crate::types::{Address, Hash256, Vin};

impl Encodable for Vin {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.hash);
        s.append(&self.n_vout);
        s.append(&self.value);
        s.append(&self.alive);
    }
}

impl Decodable for Vin {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Vin {
            hash: rlp.val_at(0)?,
            n_vout: rlp.val_at(1)?,
            value: rlp.val_at(2)?,
            alive: rlp.val_at(3)?,
        })
    }
}

fn decode_vin(bytes: &[u8]) -> Result<Vin, DecodeError> {
    let rlp = Rlp::new(bytes);
    match rlp.item_count() {
        Ok(4) => rlp::decode(bytes).map_err(|e| DecodeError::MalformedField(e.to_string())),
        Ok(n) => Err(DecodeError::WrongFieldCount(n)),
        Err(e) => Err(DecodeError::MalformedField(e.to_string())),
    }
}

/// Read-through cache over a Merkle-Patricia trie keyed by [`Address`].
///
/// `get` is read-through: an absent cache entry is fetched from the trie,
/// decoded, and remembered, so repeated lookups of the same address within
/// one transaction hit the cache. Nothing reaches the trie until
/// [`VinStore::commit`].
pub struct VinStore<T: VinTrie> {
    trie: T,
    cache: IndexMap<Address, Vin>,
}

impl<T: VinTrie> VinStore<T> {
    /// Wraps an existing persistent trie.
    pub fn new(trie: T) -> Self {
        VinStore {
            trie,
            cache: IndexMap::new(),
        }
    }

    /// Reads the current Vin for `addr`, consulting the stage cache first.
    /// `Ok(None)` means no Vin is recorded for this address. A decode
    /// failure of a persisted record is a [`VinStoreError::Corrupt`] -
    /// unrecoverable at the transaction level.
    pub fn get(&mut self, addr: &Address) -> Result<Option<Vin>, VinStoreError> {
        if let Some(vin) = self.cache.get(addr) {
            return Ok(Some(*vin));
        }
        let Some(encoded) = self.trie.get_encoded(addr) else {
            return Ok(None);
        };
        let vin = decode_vin(&encoded).map_err(|source| VinStoreError::Corrupt {
            address: *addr,
            source,
        })?;
        self.cache.insert(*addr, vin);
        Ok(Some(vin))
    }

    /// Unconditionally stages `vin` under `addr`, overwriting any cached or
    /// persisted value.
    pub fn stage(&mut self, addr: Address, vin: Vin) {
        self.cache.insert(addr, vin);
    }

    /// Loads the current Vin for `addr` (if any) and applies `f` to it in
    /// place, re-staging the result. No-op if `addr` has no Vin.
    pub fn mutate(
        &mut self,
        addr: &Address,
        f: impl FnOnce(&mut Vin),
    ) -> Result<(), VinStoreError> {
        if let Some(mut vin) = self.get(addr)? {
            f(&mut vin);
            self.cache.insert(*addr, vin);
        }
        Ok(())
    }

    /// Flushes every staged entry into the trie: tombstones are removed,
    /// live entries are RLP-encoded and inserted. Returns the addresses
    /// touched, in staging order.
    pub fn commit(&mut self) -> Vec<Address> {
        let touched: Vec<Address> = self.cache.keys().copied().collect();
        for (addr, vin) in self.cache.drain(..) {
            if vin.is_alive() {
                self.trie.insert_encoded(addr, rlp::encode(&vin).to_vec());
            } else {
                self.trie.remove(&addr);
            }
        }
        touched
    }

    /// The trie's current Merkle root (unaffected by uncommitted staged
    /// writes).
    pub fn root(&self) -> Hash256 {
        self.trie.root()
    }

    /// Resets the trie to `root`, discarding all staged writes.
    pub fn set_root(&mut self, root: Hash256) {
        self.cache.clear();
        self.trie.set_root(root);
    }

    /// Union of live staged entries and persisted entries for every
    /// account address not shadowed by the cache. Diagnostic only - never
    /// used by the commit path.
    pub fn snapshot_live(&self, accounts: &impl AccountTrie) -> IndexMap<Address, Vin> {
        let mut out = IndexMap::new();
        for (addr, vin) in self.cache.iter() {
            if vin.is_alive() {
                out.insert(*addr, *vin);
            }
        }
        for addr in accounts.addresses() {
            if out.contains_key(&addr) || self.cache.contains_key(&addr) {
                continue;
            }
            if let Some(encoded) = self.trie.get_encoded(&addr) {
                if let Ok(vin) = decode_vin(&encoded) {
                    out.insert(addr, vin);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeTrie {
        root: Hash256,
        data: HashMap<Address, Vec<u8>>,
    }

    impl VinTrie for FakeTrie {
        fn get_encoded(&self, addr: &Address) -> Option<Vec<u8>> {
            self.data.get(addr).cloned()
        }
        fn insert_encoded(&mut self, addr: Address, encoded: Vec<u8>) {
            self.data.insert(addr, encoded);
        }
        fn remove(&mut self, addr: &Address) {
            self.data.remove(addr);
        }
        fn root(&self) -> Hash256 {
            self.root
        }
        fn set_root(&mut self, root: Hash256) {
            self.root = root;
        }
    }

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[test]
    fn round_trip_encoding() {
        let vin = Vin {
            hash: Hash256::repeat_byte(7),
            n_vout: 3,
            value: crate::types::U256::from(500u64),
            alive: 1,
        };
        let encoded = rlp::encode(&vin).to_vec();
        let decoded: Vin = rlp::decode(&encoded).unwrap();
        assert_eq!(vin, decoded);
    }

    #[test]
    fn get_is_absent_for_unknown_address() {
        let mut store = VinStore::new(FakeTrie::default());
        assert_eq!(store.get(&addr(1)).unwrap(), None);
    }

    #[test]
    fn stage_then_get_returns_staged_value() {
        let mut store = VinStore::new(FakeTrie::default());
        let vin = Vin {
            hash: Hash256::repeat_byte(9),
            n_vout: 1,
            value: crate::types::U256::from(10u64),
            alive: 1,
        };
        store.stage(addr(2), vin);
        assert_eq!(store.get(&addr(2)).unwrap(), Some(vin));
    }

    #[test]
    fn commit_removes_tombstones_and_persists_live_entries() {
        let mut store = VinStore::new(FakeTrie::default());
        store.stage(addr(3), Vin::tombstone());
        store.stage(
            addr(4),
            Vin {
                hash: Hash256::repeat_byte(1),
                n_vout: 0,
                value: crate::types::U256::from(1u64),
                alive: 1,
            },
        );
        let touched = store.commit();
        assert_eq!(touched.len(), 2);
        assert_eq!(store.get(&addr(3)).unwrap(), None);
        assert!(store.get(&addr(4)).unwrap().is_some());
    }

    #[test]
    fn corrupt_record_surfaces_state_integrity_error() {
        let mut trie = FakeTrie::default();
        trie.insert_encoded(addr(5), vec![0xff, 0x01]);
        let mut store = VinStore::new(trie);
        let err = store.get(&addr(5)).unwrap_err();
        assert!(matches!(err, VinStoreError::Corrupt { .. }));
    }
}
