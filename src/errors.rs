//! Error types for each failure domain this crate defines.
//!
//! Mirrors the composition style of the teacher's blockchain state machine
//! errors: one `thiserror`-derived enum per domain, with `From` impls that
//! let the lower-level error wrap into the higher-level one via `?`.

use thiserror::Error;

use crate::collaborators::TransactionExceptionKind;
use crate::types::Address;

/// A malformed persistent Vin record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The RLP list did not contain exactly four items.
    #[error("expected a 4-item RLP list, found {0} items")]
    WrongFieldCount(usize),
    /// One of the four items could not be decoded as its expected type.
    #[error("malformed field in Vin record: {0}")]
    MalformedField(String),
}

/// Errors raised while reading or writing the Vin trie.
#[derive(Debug, Error)]
pub enum VinStoreError {
    /// The persisted record at this address could not be decoded. This is a
    /// state-integrity error: it is not recoverable at the transaction
    /// level and must propagate to the caller.
    #[error("corrupt Vin record for {address:?}: {source}")]
    Corrupt {
        /// Address whose record failed to decode.
        address: Address,
        /// Underlying decode failure.
        #[source]
        source: DecodeError,
    },
}

/// Errors raised while building the condensing transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CondensingError {
    /// A participant's existing Vin value plus incoming credits were less
    /// than its outgoing debits. The condensing transaction is not built;
    /// the caller must treat this the same as a reverted execution.
    #[error("value conservation violated for {address:?}: balance would go negative")]
    InsufficientBalance {
        /// The address whose balance would have gone negative.
        address: Address,
    },
}

/// Errors surfaced by [`crate::StateExecutor::execute`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executive raised a transaction exception (bad nonce, out of gas,
    /// bad instruction, ...). The account trie has already been rolled
    /// forward to a consistent post-exception state; the caller need not
    /// retry anything.
    #[error("transaction exception: {0:?}")]
    Transaction(TransactionExceptionKind),

    /// The executive ran to completion but the resulting transfer graph
    /// could not be condensed into a balanced UTXO transaction.
    #[error("condensing failed: {0}")]
    Conservation(#[from] CondensingError),

    /// A Vin record could not be read back from the trie.
    #[error("Vin store error: {0}")]
    VinStore(#[from] VinStoreError),
}
