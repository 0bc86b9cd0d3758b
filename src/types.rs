//! Core value types shared by every module in this crate.

use serde::{Deserialize, Serialize};

/// 20-byte account/contract identifier.
pub type Address = primitive_types::H160;

/// 32-byte cryptographic digest.
pub type Hash256 = primitive_types::H256;

/// Unsigned 256-bit integer with checked arithmetic.
pub type U256 = primitive_types::U256;

/// Identifier of a UTXO transaction; an alias of [`Hash256`] so that a Vin's
/// `hash` field reads as "the txid that funds this account".
pub type TxId = Hash256;

/// Per-contract-account record linking an account's balance to the UTXO
/// output currently funding it.
///
/// A Vin whose `alive` is zero is a tombstone: it must not be carried
/// forward past the next commit. `alive` is stored as a byte, not a bool,
/// so that future flags can be packed alongside it without a storage
/// migration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vin {
    /// Txid of the UTXO output that currently funds this account.
    pub hash: TxId,
    /// Output index within `hash`.
    pub n_vout: u32,
    /// Balance reflected by that output.
    pub value: U256,
    /// Zero means tombstoned; nonzero means live.
    pub alive: u8,
}

impl Vin {
    /// A tombstone record: no longer live, carries no funding reference.
    pub fn tombstone() -> Self {
        Vin {
            hash: Hash256::zero(),
            n_vout: 0,
            value: U256::zero(),
            alive: 0,
        }
    }

    /// Whether this record is live (should be carried forward at commit).
    pub fn is_alive(&self) -> bool {
        self.alive != 0
    }
}

/// One balance transfer observed by the executive during execution.
///
/// Recorded in the order the executive produced it. Duplicates and
/// self-transfers (`from == to`) are both permitted; zero-value transfers
/// are recorded too, since they convey a "touched" relationship between
/// the two addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferInfo {
    /// Address debited.
    pub from: Address,
    /// Address credited.
    pub to: Address,
    /// Amount moved.
    pub value: U256,
}

/// The outer UTXO transaction that triggered this contract execution.
///
/// This is the minimal slice of the enclosing chain's transaction format
/// the core needs to read; everything else (signatures, locktime, other
/// inputs/outputs) belongs to the enclosing node and is out of scope here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QtumTransaction {
    /// Address that pays for gas and supplies `value`.
    pub sender: Address,
    /// Address the transaction is addressed to. Meaningless for `CREATE`
    /// transactions until the executive resolves the new contract address.
    pub receive_address: Address,
    /// Whether this transaction creates a new contract account.
    pub is_creation: bool,
    /// Value attached to the call, in addition to any value moved by the
    /// executive during execution.
    pub value: U256,
    /// Gas limit.
    pub gas: U256,
    /// Gas price.
    pub gas_price: U256,
    /// Txid of the UTXO input that funds this execution.
    pub input_txid: TxId,
    /// Output index of that input.
    pub input_vout: u32,
}

impl QtumTransaction {
    /// `tx.value + tx.gas * tx.gasPrice`, the amount pre-credited to the
    /// sender before the executive runs.
    pub fn prefunded_amount(&self) -> U256 {
        self.value + self.gas * self.gas_price
    }
}
