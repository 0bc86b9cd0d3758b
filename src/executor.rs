//! Orchestrates one transaction end to end: pre-credit, drive the
//! executive, condense the resulting transfer graph, and commit both
//! tries atomically - or roll everything back.

use serde::{Deserialize, Serialize};

use crate::address::derive_create_address;
use crate::collaborators::{
    AccountTrie, ExecutionHost, Executive, LogEntry, TransactionExceptionKind, VinTrie, VmStep,
};
use crate::condensing::{CondensingBuilder, CondensingOutput};
use crate::errors::ExecutorError;
use crate::transfer_log::TransferLog;
use crate::types::{Address, Hash256, QtumTransaction, TransferInfo, U256};
use crate::vin_store::VinStore;

/// Caller-supplied disposition for one execution.
///
/// `Uncommitted` is treated identically to `Committed` by this core: both
/// tries are advanced in memory either way. Only the enclosing block
/// layer, which this core does not model, distinguishes them when
/// deciding whether to persist the resulting roots to disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permanence {
    /// Commit both tries.
    Committed,
    /// Discard all staged changes; neither trie advances.
    Reverted,
    /// Commit both tries in memory; persistence is the caller's concern.
    Uncommitted,
}

/// Parameters that do not vary per transaction.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StateConfig {
    /// Starting nonce given to newly materialized accounts.
    pub account_start_nonce: U256,
    /// Block height at which empty-account sweeping begins on commit.
    pub eip158_fork_block: u64,
}

/// Everything produced by a transaction's execution, independent of
/// whether it ultimately succeeded.
#[derive(Clone, Debug)]
pub struct TransactionReceipt {
    /// Total gas used, including whatever the executive had already
    /// accounted for before this call.
    pub gas_used: U256,
    /// Logs emitted by the executive, verbatim.
    pub logs: Vec<LogEntry>,
    /// Set if the executive raised a transaction exception.
    pub exception: Option<TransactionExceptionKind>,
}

/// The outcome of a successful (including `Reverted`) execution: the
/// resulting trie roots and, if a condensing transaction was built, its
/// output.
#[derive(Clone, Debug)]
pub struct ExecutionResult {
    /// Account trie root after this call.
    pub state_root: Hash256,
    /// Vin trie root after this call.
    pub vin_root: Hash256,
    /// The condensing transaction and new Vins, if any transfers occurred
    /// and committing was not skipped (`Reverted`, or an empty transfer
    /// log).
    pub condensing: Option<CondensingOutput>,
    /// The contract address this execution resolved to: the reserved
    /// create address for `CREATE` transactions, `tx.receive_address`
    /// otherwise.
    pub new_address: Option<Address>,
}

/// Reserved contract address for a pending `CREATE` transaction.
///
/// Consumed exactly once, by [`Option::take`], the first time an unknown
/// account is credited during execution - replacing the original
/// implicit retargeting with an explicit, ownership-tracked value.
#[derive(Clone, Copy, Debug)]
struct PendingCreateAddress(Address);

impl PendingCreateAddress {
    fn reserve(address: Address) -> Self {
        PendingCreateAddress(address)
    }

    fn address(&self) -> Address {
        self.0
    }
}

/// The [`ExecutionHost`] the executor injects into the executive for the
/// duration of one call. Owns no state of its own beyond borrows: the
/// transfer log and pending-create slot both live in `execute`'s stack
/// frame.
struct Host<'a, A: AccountTrie> {
    accounts: &'a mut A,
    log: &'a mut TransferLog,
    pending_create: &'a mut Option<PendingCreateAddress>,
}

impl<'a, A: AccountTrie> ExecutionHost for Host<'a, A> {
    fn add_balance(&mut self, to: Address, amount: U256) -> Address {
        let mut target = to;
        if self.accounts.account(&to).is_none() {
            if let Some(pending) = self.pending_create.take() {
                if self.accounts.account(&pending.address()).is_none() {
                    target = pending.address();
                } else {
                    *self.pending_create = Some(pending);
                }
            }
        }
        self.accounts.add_balance(&target, amount);
        target
    }

    fn sub_balance(&mut self, from: Address, amount: U256) {
        self.accounts.sub_balance(&from, amount);
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Address {
        self.sub_balance(from, value);
        let actual_to = self.add_balance(to, value);
        self.log.record(TransferInfo {
            from,
            to: actual_to,
            value,
        });
        actual_to
    }
}

/// Ties the account trie and the [`VinStore`] together under one atomic
/// commit per transaction.
pub struct StateExecutor<'a, A: AccountTrie, V: VinTrie> {
    accounts: &'a mut A,
    vins: VinStore<V>,
    config: StateConfig,
}

impl<'a, A: AccountTrie, V: VinTrie> StateExecutor<'a, A, V> {
    /// Borrows the account trie and takes ownership of the Vin store for
    /// the lifetime of this executor.
    pub fn new(accounts: &'a mut A, vins: VinStore<V>, config: StateConfig) -> Self {
        StateExecutor {
            accounts,
            vins,
            config,
        }
    }

    /// The Vin store's current root, without committing.
    pub fn vin_root(&self) -> Hash256 {
        self.vins.root()
    }

    /// The account trie's current root, without committing.
    pub fn state_root(&self) -> Hash256 {
        self.accounts.root_hash()
    }

    /// Drives `tx` through `executive` to completion and, on a
    /// non-reverted outcome, condenses the resulting transfers into a
    /// single UTXO transaction and commits both tries.
    ///
    /// Always returns a receipt, even on failure; the `Result` captures
    /// whether the call succeeded.
    pub fn execute(
        &mut self,
        tx: &QtumTransaction,
        executive: &mut impl Executive,
        permanence: Permanence,
        block_number: u64,
        on_op: &mut dyn FnMut(VmStep),
    ) -> (Result<ExecutionResult, ExecutorError>, TransactionReceipt) {
        let span = tracing::info_span!(
            "execute",
            sender = ?tx.sender,
            is_creation = tx.is_creation,
            ?permanence,
        );
        let _enter = span.enter();

        let reserved_address = if tx.is_creation {
            Some(derive_create_address(tx.input_txid, tx.input_vout))
        } else {
            None
        };
        let mut pending_create = reserved_address.map(PendingCreateAddress::reserve);

        self.accounts.add_balance(&tx.sender, tx.prefunded_amount());

        let start_gas_used = executive.gas_used();
        let mut transfers = TransferLog::new();

        let run_result = Self::drive(
            self.accounts,
            &mut transfers,
            &mut pending_create,
            executive,
            tx,
            on_op,
        );

        let gas_used = start_gas_used + executive.gas_used();
        let logs = executive.logs();
        let sweep = block_number >= self.config.eip158_fork_block;

        if let Err(exception) = run_result {
            tracing::warn!(?exception, "transaction exception");
            if permanence == Permanence::Reverted {
                self.accounts.discard();
            } else {
                self.accounts.kill(&tx.sender);
                self.accounts.commit(sweep);
            }
            let receipt = TransactionReceipt {
                gas_used,
                logs,
                exception: Some(exception),
            };
            return (Err(ExecutorError::Transaction(exception)), receipt);
        }

        let receipt_template = TransactionReceipt {
            gas_used,
            logs,
            exception: None,
        };

        if permanence == Permanence::Reverted {
            tracing::debug!("reverted, discarding staged changes");
            self.accounts.discard();
            let new_address = if tx.is_creation {
                None
            } else {
                Some(tx.receive_address)
            };
            let result = ExecutionResult {
                state_root: self.accounts.root_hash(),
                vin_root: self.vins.root(),
                condensing: None,
                new_address,
            };
            return (Ok(result), receipt_template);
        }

        self.accounts.kill(&tx.sender);

        match CondensingBuilder::build(&transfers, &mut self.vins, &*self.accounts, tx) {
            Ok(condensing) => {
                if let Some(output) = &condensing {
                    for (addr, vin) in output.new_vins.iter() {
                        self.vins.stage(*addr, *vin);
                    }
                }
                let touched = self.vins.commit();
                let vin_root = self.vins.root();
                let state_root = self.accounts.commit(sweep);
                tracing::debug!(touched = touched.len(), "two-trie commit");

                let new_address = if tx.is_creation {
                    reserved_address
                } else {
                    Some(tx.receive_address)
                };

                let result = ExecutionResult {
                    state_root,
                    vin_root,
                    condensing,
                    new_address,
                };
                (Ok(result), receipt_template)
            }
            Err(err @ ExecutorError::Conservation(_)) => {
                tracing::warn!(error = %err, "conservation failure, reverting");
                self.accounts.discard();
                (Err(err), receipt_template)
            }
            Err(err) => {
                self.accounts.discard();
                (Err(err), receipt_template)
            }
        }
    }

    fn drive(
        accounts: &mut A,
        transfers: &mut TransferLog,
        pending_create: &mut Option<PendingCreateAddress>,
        executive: &mut impl Executive,
        tx: &QtumTransaction,
        on_op: &mut dyn FnMut(VmStep),
    ) -> Result<(), TransactionExceptionKind> {
        let mut host = Host {
            accounts,
            log: transfers,
            pending_create,
        };
        executive.initialize(&mut host, tx)?;
        if !executive.execute(&mut host)? {
            executive.go(&mut host, on_op)?;
        }
        executive.finalize(&mut host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AccountView;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct FakeAccounts {
        balances: HashMap<Address, U256>,
        nonces: HashMap<Address, U256>,
        killed: HashSet<Address>,
        committed: bool,
        discarded: bool,
    }

    impl AccountTrie for FakeAccounts {
        fn account(&self, addr: &Address) -> Option<AccountView> {
            if self.killed.contains(addr) {
                return None;
            }
            self.balances.get(addr).map(|balance| AccountView {
                balance: *balance,
                nonce: *self.nonces.get(addr).unwrap_or(&U256::zero()),
                code_hash: Hash256::zero(),
                storage_root: Hash256::zero(),
            })
        }
        fn create_account(&mut self, addr: Address, nonce: U256, balance: U256) {
            self.balances.entry(addr).or_insert(balance);
            self.nonces.entry(addr).or_insert(nonce);
        }
        fn add_balance(&mut self, addr: &Address, amount: U256) {
            *self.balances.entry(*addr).or_insert_with(U256::zero) += amount;
        }
        fn sub_balance(&mut self, addr: &Address, amount: U256) {
            if let Some(balance) = self.balances.get_mut(addr) {
                *balance -= amount;
            }
        }
        fn kill(&mut self, addr: &Address) {
            self.killed.insert(*addr);
        }
        fn addresses(&self) -> Vec<Address> {
            self.balances.keys().copied().collect()
        }
        fn commit(&mut self, _sweep_empty_accounts: bool) -> Hash256 {
            self.committed = true;
            Hash256::repeat_byte(0x42)
        }
        fn root_hash(&self) -> Hash256 {
            Hash256::repeat_byte(0x42)
        }
        fn discard(&mut self) {
            self.discarded = true;
        }
    }

    #[derive(Default)]
    struct FakeVinTrie {
        root: Hash256,
        data: HashMap<Address, Vec<u8>>,
    }

    impl VinTrie for FakeVinTrie {
        fn get_encoded(&self, addr: &Address) -> Option<Vec<u8>> {
            self.data.get(addr).cloned()
        }
        fn insert_encoded(&mut self, addr: Address, encoded: Vec<u8>) {
            self.data.insert(addr, encoded);
        }
        fn remove(&mut self, addr: &Address) {
            self.data.remove(&addr);
        }
        fn root(&self) -> Hash256 {
            self.root
        }
        fn set_root(&mut self, root: Hash256) {
            self.root = root;
        }
    }

    /// Replays a fixed list of transfers, then succeeds; or fails with a
    /// fixed exception after recording none.
    struct ScriptedExecutive {
        transfers: Vec<TransferInfo>,
        exception: Option<TransactionExceptionKind>,
        gas_used: U256,
        logs: Vec<LogEntry>,
    }

    impl Executive for ScriptedExecutive {
        fn initialize(
            &mut self,
            _host: &mut dyn ExecutionHost,
            _tx: &QtumTransaction,
        ) -> Result<(), TransactionExceptionKind> {
            Ok(())
        }
        fn execute(&mut self, host: &mut dyn ExecutionHost) -> Result<bool, TransactionExceptionKind> {
            if let Some(exception) = self.exception {
                return Err(exception);
            }
            for t in self.transfers.drain(..) {
                host.transfer(t.from, t.to, t.value);
            }
            Ok(true)
        }
        fn go(
            &mut self,
            _host: &mut dyn ExecutionHost,
            _on_op: &mut dyn FnMut(VmStep),
        ) -> Result<(), TransactionExceptionKind> {
            Ok(())
        }
        fn finalize(&mut self, _host: &mut dyn ExecutionHost) -> Result<(), TransactionExceptionKind> {
            Ok(())
        }
        fn gas_used(&self) -> U256 {
            self.gas_used
        }
        fn logs(&self) -> Vec<LogEntry> {
            self.logs.clone()
        }
    }

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn config() -> StateConfig {
        StateConfig {
            account_start_nonce: U256::zero(),
            eip158_fork_block: 100,
        }
    }

    fn sample_tx(sender: Address) -> QtumTransaction {
        QtumTransaction {
            sender,
            receive_address: addr(9),
            is_creation: false,
            value: U256::zero(),
            gas: U256::from(21000u64),
            gas_price: U256::from(1u64),
            input_txid: Hash256::repeat_byte(0xAA),
            input_vout: 0,
        }
    }

    #[test]
    fn no_transfers_skips_condensing_and_still_commits_the_account_trie() {
        let mut accounts = FakeAccounts::default();
        let vins = VinStore::new(FakeVinTrie::default());
        let mut executor = StateExecutor::new(&mut accounts, vins, config());

        let sender = addr(1);
        let tx = sample_tx(sender);
        let mut executive = ScriptedExecutive {
            transfers: vec![],
            exception: None,
            gas_used: U256::from(21000u64),
            logs: vec![],
        };

        let (result, receipt) =
            executor.execute(&tx, &mut executive, Permanence::Committed, 0, &mut |_| {});

        let exec_result = result.unwrap();
        assert!(exec_result.condensing.is_none());
        assert!(receipt.exception.is_none());
        assert_eq!(exec_result.new_address, Some(tx.receive_address));
    }

    #[test]
    fn exception_kills_the_sender_and_commits_without_condensing() {
        let mut accounts = FakeAccounts::default();
        let vins = VinStore::new(FakeVinTrie::default());
        let mut executor = StateExecutor::new(&mut accounts, vins, config());

        let sender = addr(2);
        let tx = sample_tx(sender);
        let mut executive = ScriptedExecutive {
            transfers: vec![],
            exception: Some(TransactionExceptionKind::OutOfGas),
            gas_used: U256::from(21000u64),
            logs: vec![],
        };

        let (result, receipt) =
            executor.execute(&tx, &mut executive, Permanence::Committed, 0, &mut |_| {});

        assert!(matches!(result, Err(ExecutorError::Transaction(TransactionExceptionKind::OutOfGas))));
        assert_eq!(receipt.exception, Some(TransactionExceptionKind::OutOfGas));
    }

    #[test]
    fn reverted_permanence_discards_instead_of_committing() {
        let mut accounts = FakeAccounts::default();
        let vins = VinStore::new(FakeVinTrie::default());
        let mut executor = StateExecutor::new(&mut accounts, vins, config());

        let sender = addr(3);
        let receiver = addr(4);
        let tx = sample_tx(sender);
        let mut executive = ScriptedExecutive {
            transfers: vec![TransferInfo {
                from: sender,
                to: receiver,
                value: U256::from(5u64),
            }],
            exception: None,
            gas_used: U256::from(21000u64),
            logs: vec![],
        };

        let (result, _receipt) =
            executor.execute(&tx, &mut executive, Permanence::Reverted, 0, &mut |_| {});

        let exec_result = result.unwrap();
        assert!(exec_result.condensing.is_none());
        assert_eq!(exec_result.new_address, Some(tx.receive_address));
        assert!(executor.accounts.discarded);
        assert!(!executor.accounts.committed);
    }

    #[test]
    fn creation_transaction_resolves_new_address_from_the_funding_input() {
        let mut accounts = FakeAccounts::default();
        let vins = VinStore::new(FakeVinTrie::default());
        let mut executor = StateExecutor::new(&mut accounts, vins, config());

        let sender = addr(5);
        let mut tx = sample_tx(sender);
        tx.is_creation = true;
        tx.value = U256::from(500u64);
        tx.input_txid = Hash256::repeat_byte(0xBB);
        tx.input_vout = 2;

        let expected_address = derive_create_address(tx.input_txid, tx.input_vout);

        let mut executive = ScriptedExecutive {
            transfers: vec![TransferInfo {
                from: sender,
                to: expected_address,
                value: U256::from(500u64),
            }],
            exception: None,
            gas_used: U256::from(32000u64),
            logs: vec![],
        };

        let (result, _receipt) =
            executor.execute(&tx, &mut executive, Permanence::Committed, 0, &mut |_| {});

        let exec_result = result.unwrap();
        assert_eq!(exec_result.new_address, Some(expected_address));
        let condensing = exec_result.condensing.unwrap();
        assert!(condensing.new_vins.contains_key(&expected_address));
    }
}
