//! Hybrid account/UTXO state bridge.
//!
//! This crate drives an account-model smart-contract transaction through an
//! external executive, observes every inter-account value transfer the
//! executive performed, and condenses that transfer graph into a single
//! UTXO transaction ("the condensing transaction") whose inputs and outputs
//! re-establish every participant's post-transaction balance on the base
//! UTXO ledger.
//!
//! The account trie, the executive, and the UTXO transaction format are all
//! external collaborators, consumed here only through the traits in
//! [`collaborators`]. This crate owns exactly three things: the [`VinStore`]
//! (a cached, trie-backed index from contract address to funding UTXO), the
//! [`TransferLog`] recorded during one execution, and the
//! [`CondensingBuilder`] plus [`StateExecutor`] that tie the two ledgers
//! together under one atomic commit.

mod address;
mod collaborators;
mod condensing;
mod errors;
mod executor;
mod transfer_log;
mod types;
mod utxo;
mod vin_store;

pub use address::derive_create_address;
pub use collaborators::{
    AccountTrie, AccountView, ExecutionHost, Executive, LogEntry, TransactionExceptionKind,
    VinTrie, VmStep,
};
pub use condensing::{CondensingBuilder, CondensingOutput};
pub use errors::{CondensingError, ExecutorError, VinStoreError};
pub use executor::{ExecutionResult, Permanence, StateConfig, StateExecutor, TransactionReceipt};
pub use transfer_log::TransferLog;
pub use types::{Address, Hash256, QtumTransaction, TransferInfo, TxId, Vin, U256};
pub use utxo::{CTransaction, CTxIn, CTxOut, Script};
pub use vin_store::VinStore;
