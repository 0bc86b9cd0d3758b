//! Minimal UTXO transaction model.
//!
//! Scripts, inputs and outputs are modeled directly rather than delegated to
//! a collaborator trait: the spec fixes their exact shape, and only script
//! *evaluation* is out of scope, not script *construction*.

use sha2::{Digest, Sha256};

use crate::types::{Address, Hash256, TxId, U256};

/// `OP_TXHASH`: authenticates a condensing-transaction input against the
/// Vin record it spends.
pub const OP_TXHASH: u8 = 0xb4;
/// `OP_CALL`: invokes a contract account with the output's value.
pub const OP_CALL: u8 = 0xc2;
/// `OP_DUP`.
pub const OP_DUP: u8 = 0x76;
/// `OP_HASH160`.
pub const OP_HASH160: u8 = 0xa9;
/// `OP_EQUALVERIFY`.
pub const OP_EQUALVERIFY: u8 = 0x88;
/// `OP_CHECKSIG`.
pub const OP_CHECKSIG: u8 = 0xac;

/// A raw output/input script: an opaque byte string built from a handful of
/// opcode-pushing helpers below. This crate never interprets a `Script`
/// beyond constructing and comparing it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script(pub Vec<u8>);

impl Script {
    /// `OP_TXHASH`-only script authenticating a condensing-tx input.
    pub fn txhash() -> Self {
        Script(vec![OP_TXHASH])
    }

    /// Standard pay-to-pubkey-hash script paying `addr`.
    pub fn p2pkh(addr: &Address) -> Self {
        let mut s = Vec::with_capacity(25);
        s.push(OP_DUP);
        s.push(OP_HASH160);
        s.extend_from_slice(addr.as_bytes());
        s.push(OP_EQUALVERIFY);
        s.push(OP_CHECKSIG);
        Script(s)
    }

    /// Contract-sink script: calls `addr` with no extra call data.
    ///
    /// `PUSH 0 PUSH 0 PUSH 0 PUSH 0x00 PUSH addr OP_CALL`, matching the
    /// four zero-length/zero-valued pushes the enclosing VM's `OP_CALL`
    /// expects ahead of the callee address (gas limit, gas price, call
    /// value already carried by the output amount, and an empty data
    /// push).
    pub fn contract_sink(addr: &Address) -> Self {
        let mut s = Vec::with_capacity(4 + 1 + 20 + 1);
        for _ in 0..3 {
            s.push(0x00); // PUSH <empty>
        }
        s.push(0x01);
        s.push(0x00); // PUSH 0x00
        s.push(0x14); // push next 20 bytes
        s.extend_from_slice(addr.as_bytes());
        s.push(OP_CALL);
        Script(s)
    }
}

/// One input of the condensing transaction: spends the Vin output selected
/// by [`crate::CondensingBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CTxIn {
    /// Txid of the output being spent.
    pub prev_txid: TxId,
    /// Index of the output being spent.
    pub prev_vout: u32,
    /// Script authenticating the spend.
    pub script_sig: Script,
}

/// One output of the condensing transaction: re-establishes a participant's
/// post-transfer balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CTxOut {
    /// Amount carried by this output.
    pub value: U256,
    /// Script gating who/what can spend this output.
    pub script_pubkey: Script,
}

/// The condensing transaction itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CTransaction {
    /// Inputs, one per participant whose selected Vin has nonzero value.
    pub vin: Vec<CTxIn>,
    /// Outputs, one per participant whose post-transfer balance is nonzero.
    pub vout: Vec<CTxOut>,
}

impl CTransaction {
    /// An empty transaction: no inputs, no outputs.
    pub fn empty() -> Self {
        CTransaction::default()
    }

    /// Whether this is the empty sentinel (no inputs and no outputs).
    pub fn is_empty(&self) -> bool {
        self.vin.is_empty() && self.vout.is_empty()
    }

    /// Deterministic transaction id: `SHA256` of the canonical encoding of
    /// inputs and outputs. Two condensing transactions with the same
    /// inputs and outputs, built in the same iteration order, hash equal.
    pub fn txid(&self) -> Hash256 {
        let mut hasher = Sha256::new();
        for input in &self.vin {
            hasher.update(input.prev_txid.as_bytes());
            hasher.update(input.prev_vout.to_be_bytes());
            hasher.update(&input.script_sig.0);
        }
        for output in &self.vout {
            let mut value_bytes = [0u8; 32];
            output.value.to_big_endian(&mut value_bytes);
            hasher.update(value_bytes);
            hasher.update(&output.script_pubkey.0);
        }
        Hash256::from_slice(&hasher.finalize())
    }
}
