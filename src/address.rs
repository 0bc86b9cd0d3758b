//! Deterministic contract-address derivation for `CREATE`-style
//! transactions.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::{Address, TxId};

/// `RIPEMD160(SHA256(txid || vout_byte))`.
///
/// `vout` is truncated to its low 8 bits before hashing; callers must
/// ensure the funding output's index fits in a byte for contract-creation
/// transactions.
pub fn derive_create_address(txid: TxId, vout: u32) -> Address {
    let mut preimage = Vec::with_capacity(33);
    preimage.extend_from_slice(txid.as_bytes());
    preimage.push(vout as u8);

    let sha = Sha256::digest(&preimage);
    let ripemd = Ripemd160::digest(sha);
    Address::from_slice(&ripemd)
}
