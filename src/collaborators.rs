//! Trait boundaries for everything this crate treats as an external
//! collaborator: the account-model trie, the executive (VM driver), and the
//! persistent Vin trie.
//!
//! These are read-only capability interfaces rather than base classes to
//! override or mutable back-pointers to share: the executive receives an
//! [`ExecutionHost`] instead of reaching into the account trie directly,
//! and [`CondensingBuilder`](crate::CondensingBuilder) borrows an
//! [`AccountTrie`] and a [`VinTrie`] for the duration of one call instead of
//! holding a pointer back into the executor.

use crate::types::{Address, Hash256, TransferInfo, U256};

/// A read-only view of one account as held by the account trie.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountView {
    /// Current balance.
    pub balance: U256,
    /// Current nonce.
    pub nonce: U256,
    /// Hash of the account's code (zero for externally-owned accounts).
    pub code_hash: Hash256,
    /// Root of the account's storage trie (zero if it has no storage).
    pub storage_root: Hash256,
}

impl AccountView {
    /// An account is "in use" (a contract, in this bridge's terms) if it has
    /// code, storage, or a nonzero nonce. Used to choose between a
    /// contract-sink output script and a plain P2PKH script.
    pub fn is_in_use(&self) -> bool {
        !self.nonce.is_zero() || !self.code_hash.is_zero() || !self.storage_root.is_zero()
    }
}

/// The account-model trie, consumed only through this trait.
///
/// Implementations back this with a Merkle-Patricia trie; this crate never
/// assumes anything about the underlying storage beyond the operations
/// below, and never persists anything to it except by calling `commit`.
pub trait AccountTrie {
    /// Looks up an account. `None` if it does not exist.
    fn account(&self, addr: &Address) -> Option<AccountView>;

    /// Whether `addr` currently has an account record (used by the
    /// condensing builder to decide which output script to emit).
    fn address_in_use(&self, addr: &Address) -> bool {
        self.account(addr).map(|a| a.is_in_use()).unwrap_or(false)
    }

    /// Materializes a fresh account with the given starting nonce and
    /// balance. No-op if the account already exists.
    fn create_account(&mut self, addr: Address, nonce: U256, balance: U256);

    /// Adds `amount` to `addr`'s balance, creating the account first (with
    /// the trie's configured starting nonce) if it does not yet exist.
    fn add_balance(&mut self, addr: &Address, amount: U256);

    /// Subtracts `amount` from `addr`'s balance. A no-op if the account
    /// does not exist; underflow below zero is the caller's responsibility
    /// to prevent (the executive is expected to never subtract more than
    /// an account holds).
    fn sub_balance(&mut self, addr: &Address, amount: U256);

    /// Marks the account killed. A no-op if the address has no account.
    fn kill(&mut self, addr: &Address);

    /// All addresses with an account record, including ones only staged
    /// in an in-memory cache and not yet committed.
    fn addresses(&self) -> Vec<Address>;

    /// Commits staged changes to the underlying trie and returns its new
    /// root. `sweep_empty_accounts` implements the EIP-158 policy gated by
    /// `StateConfig::eip158_fork_block`.
    fn commit(&mut self, sweep_empty_accounts: bool) -> Hash256;

    /// The trie's current root hash, without committing.
    fn root_hash(&self) -> Hash256;

    /// Discards all staged-but-uncommitted changes, rolling the trie back
    /// to the state as of its last commit.
    fn discard(&mut self);
}

/// The persistent trie backing [`crate::VinStore`], keyed by address.
///
/// Kept separate from [`AccountTrie`] even though both are Merkle-Patricia
/// tries over the same address space: they are committed independently (see
/// `StateExecutor::execute`) and a single implementation may back both with
/// distinct sub-tries of the same database.
pub trait VinTrie {
    /// Looks up the raw, encoded Vin record for `addr`, if any.
    fn get_encoded(&self, addr: &Address) -> Option<Vec<u8>>;

    /// Inserts (overwriting) the raw, encoded Vin record for `addr`.
    fn insert_encoded(&mut self, addr: Address, encoded: Vec<u8>);

    /// Removes any record for `addr`. A no-op if absent.
    fn remove(&mut self, addr: &Address);

    /// The trie's current root hash.
    fn root(&self) -> Hash256;

    /// Resets the trie to a prior root, discarding any uncommitted writes.
    fn set_root(&mut self, root: Hash256);
}

/// One VM log entry, carried through unmodified to the transaction receipt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Address that emitted the log.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<Hash256>,
    /// Opaque log payload.
    pub data: Vec<u8>,
}

/// Categories of failure the executive can raise while driving a
/// transaction. Mirrors the exception taxonomy of account-model VMs this
/// core is bridged to; kept as a flat enum rather than a nested error tree
/// since the core only ever stores it verbatim in the receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionExceptionKind {
    /// Transaction's nonce did not match the sender's expected nonce.
    InvalidNonce,
    /// Sender's balance could not cover `value + gas * gasPrice`.
    NotEnoughCash,
    /// Not enough gas to pay the up-front intrinsic cost.
    OutOfGasIntrinsic,
    /// Execution consumed all the gas before finishing.
    OutOfGas,
    /// The VM attempted to execute an unrecognized opcode.
    BadInstruction,
    /// A `JUMP`/`JUMPI` targeted a non-jumpdest.
    BadJumpDestination,
    /// Stack underflowed during execution.
    StackUnderflow,
    /// Stack would have exceeded its maximum depth.
    OutOfStack,
    /// The contract address for a `CREATE` transaction was already in use.
    AddressAlreadyUsed,
    /// Execution hit an explicit revert instruction.
    RevertInstruction,
    /// A block-level gas limit would have been exceeded.
    BlockGasLimitReached,
    /// Catch-all for exception categories not enumerated above.
    Unknown,
}

/// The capability the executive uses to mutate account balances and report
/// transfers, injected by [`crate::StateExecutor`] for the duration of one
/// `execute` call.
///
/// Routing all balance mutation through this trait (rather than letting the
/// executive touch an [`AccountTrie`] directly) is what lets the executor
/// implement the create-address retargeting in one place: see
/// [`crate::StateExecutor`]'s handling of the pending create address.
pub trait ExecutionHost {
    /// Credits `to` with `amount`. If `to` has no account yet and a
    /// contract-creation address is still pending, the credit is
    /// retargeted to that address instead (consuming it) before the
    /// account is materialized. Returns the address actually credited.
    fn add_balance(&mut self, to: Address, amount: U256) -> Address;

    /// Debits `from` by `amount`.
    fn sub_balance(&mut self, from: Address, amount: U256);

    /// Records a transfer of `value` from `from` to `to`, applying the
    /// corresponding debit/credit and appending a [`TransferInfo`] to the
    /// transaction's transfer log. Returns the address actually credited
    /// (see `add_balance`).
    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Address;
}

/// A single VM execution step, passed to the `on_op` callback during
/// [`Executive::go`]. Opaque to this crate: it exists only so a caller can
/// plug in tracing without this crate needing to understand instruction
/// semantics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VmStep {
    /// Program counter at this step.
    pub pc: u64,
    /// Gas remaining before executing this step's instruction.
    pub gas_remaining: u64,
}

/// The account-model VM driver.
///
/// Deliberately mirrors the `initialize`/`execute`/`go`/`finalize` dance of
/// the account-model executive this core was bridged from, but returns
/// `Result` instead of throwing: every method that can fail reports a
/// [`TransactionExceptionKind`] rather than raising an exception, so
/// `StateExecutor::execute` can propagate failures with `?`.
pub trait Executive {
    /// Validates `tx` against the current account state (nonce, balance,
    /// intrinsic gas) and prepares to run it.
    fn initialize(
        &mut self,
        host: &mut dyn ExecutionHost,
        tx: &crate::types::QtumTransaction,
    ) -> Result<(), TransactionExceptionKind>;

    /// Attempts to run the transaction to completion in one step. Returns
    /// `Ok(true)` if it finished; `Ok(false)` if [`Executive::go`] must be
    /// called to drive it further (e.g. a contract call requiring the VM
    /// loop).
    fn execute(&mut self, host: &mut dyn ExecutionHost) -> Result<bool, TransactionExceptionKind>;

    /// Runs the VM to completion, invoking `on_op` once per executed step.
    fn go(
        &mut self,
        host: &mut dyn ExecutionHost,
        on_op: &mut dyn FnMut(VmStep),
    ) -> Result<(), TransactionExceptionKind>;

    /// Finalizes the transaction (refunds unused gas, pays the miner, ...).
    fn finalize(&mut self, host: &mut dyn ExecutionHost) -> Result<(), TransactionExceptionKind>;

    /// Total gas used so far.
    fn gas_used(&self) -> U256;

    /// Logs emitted so far.
    fn logs(&self) -> Vec<LogEntry>;
}
