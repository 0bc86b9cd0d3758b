//! Condenses one transaction's transfer graph into a single UTXO
//! transaction.

use indexmap::IndexMap;

use crate::collaborators::{AccountTrie, VinTrie};
use crate::errors::{CondensingError, ExecutorError};
use crate::transfer_log::TransferLog;
use crate::types::{Address, QtumTransaction, U256, Vin};
use crate::utxo::{CTransaction, CTxIn, CTxOut, Script};
use crate::vin_store::VinStore;

/// The condensing transaction plus the Vin records it produces, ready to be
/// applied to the [`VinStore`] via `StateExecutor::update_utxo`.
#[derive(Clone, Debug)]
pub struct CondensingOutput {
    /// The synthesized UTXO transaction.
    pub tx: CTransaction,
    /// New Vin record per participant except the outer transaction's
    /// sender (see [`CondensingBuilder::build`], step 6).
    pub new_vins: IndexMap<Address, Vin>,
}

/// Builds a condensing transaction from one execution's transfer log.
pub struct CondensingBuilder;

impl CondensingBuilder {
    /// Runs the full algorithm: Vin selection, plus/minus tally, new
    /// balance computation, input/output construction, and new-Vin
    /// derivation.
    ///
    /// Returns `Ok(None)` if `transfers` is empty - the builder is skipped
    /// entirely in that case, per the edge case in the design notes.
    /// Returns `Err(ExecutorError::Conservation(..))` if some participant's
    /// existing Vin value plus incoming credits fall short of its outgoing
    /// debits; the caller must treat that the same as a reverted execution.
    pub fn build<T: VinTrie>(
        transfers: &TransferLog,
        vin_store: &mut VinStore<T>,
        accounts: &impl AccountTrie,
        tx: &QtumTransaction,
    ) -> Result<Option<CondensingOutput>, ExecutorError> {
        if transfers.is_empty() {
            return Ok(None);
        }

        let selected = Self::select_vins(transfers, vin_store, tx)?;
        let plus_minus = Self::tally(transfers);
        let balances = Self::new_balances(&plus_minus, &selected)?;
        let vin_list = Self::build_inputs(&selected);
        let (vout_list, n_vouts) = Self::build_outputs(&balances, accounts);

        let ctx = CTransaction {
            vin: vin_list,
            vout: vout_list,
        };
        let txid = ctx.txid();

        let new_vins = Self::derive_new_vins(&balances, &n_vouts, txid, tx.sender);

        Ok(Some(CondensingOutput { tx: ctx, new_vins }))
    }

    /// Step 1: for every address appearing as `from` or `to`, load its
    /// current Vin. The outer transaction's sender, if it appears as a
    /// `from` and the outer transaction carries value, is instead given a
    /// synthetic Vin pointing at the outer transaction's own funding
    /// input - this is what lets the condensing transaction also settle
    /// the value the caller attached to the call itself.
    fn select_vins<T: VinTrie>(
        transfers: &TransferLog,
        vin_store: &mut VinStore<T>,
        tx: &QtumTransaction,
    ) -> Result<IndexMap<Address, Vin>, ExecutorError> {
        let mut selected: IndexMap<Address, Vin> = IndexMap::new();
        for t in transfers.entries() {
            if !selected.contains_key(&t.from) {
                if let Some(vin) = vin_store.get(&t.from)? {
                    selected.insert(t.from, vin);
                }
                if t.from == tx.sender && !tx.value.is_zero() {
                    selected.insert(
                        t.from,
                        Vin {
                            hash: tx.input_txid,
                            n_vout: tx.input_vout,
                            value: tx.value,
                            alive: 1,
                        },
                    );
                }
            }
            if !selected.contains_key(&t.to) {
                if let Some(vin) = vin_store.get(&t.to)? {
                    selected.insert(t.to, vin);
                }
            }
        }
        Ok(selected)
    }

    /// Step 2: for every address, the sum received as `to` and the sum
    /// sent as `from`.
    fn tally(transfers: &TransferLog) -> IndexMap<Address, (U256, U256)> {
        let mut plus_minus: IndexMap<Address, (U256, U256)> = IndexMap::new();
        for t in transfers.entries() {
            plus_minus.entry(t.from).or_insert((U256::zero(), U256::zero())).1 += t.value;
            plus_minus.entry(t.to).or_insert((U256::zero(), U256::zero())).0 += t.value;
        }
        plus_minus
    }

    /// Step 3: `balance = vin.value (or 0) + incoming - outgoing`. A
    /// shortfall is a value-conservation failure.
    fn new_balances(
        plus_minus: &IndexMap<Address, (U256, U256)>,
        selected: &IndexMap<Address, Vin>,
    ) -> Result<IndexMap<Address, U256>, ExecutorError> {
        let mut balances = IndexMap::new();
        for (addr, (incoming, outgoing)) in plus_minus.iter() {
            let existing = selected.get(addr).map(|v| v.value).unwrap_or_else(U256::zero);
            let balance = existing + *incoming;
            if balance < *outgoing {
                return Err(CondensingError::InsufficientBalance { address: *addr }.into());
            }
            balances.insert(*addr, balance - *outgoing);
        }
        Ok(balances)
    }

    /// Step 4: one input per selected Vin with nonzero value.
    fn build_inputs(selected: &IndexMap<Address, Vin>) -> Vec<CTxIn> {
        selected
            .values()
            .filter(|vin| !vin.value.is_zero())
            .map(|vin| CTxIn {
                prev_txid: vin.hash,
                prev_vout: vin.n_vout,
                script_sig: Script::txhash(),
            })
            .collect()
    }

    /// Step 5: one output per participant with a nonzero post-transfer
    /// balance, scripted per whether the address is an in-use contract.
    fn build_outputs(
        balances: &IndexMap<Address, U256>,
        accounts: &impl AccountTrie,
    ) -> (Vec<CTxOut>, IndexMap<Address, u32>) {
        let mut vout = Vec::new();
        let mut n_vouts = IndexMap::new();
        for (addr, balance) in balances.iter() {
            if balance.is_zero() {
                continue;
            }
            let script = if accounts.address_in_use(addr) {
                Script::contract_sink(addr)
            } else {
                Script::p2pkh(addr)
            };
            n_vouts.insert(*addr, vout.len() as u32);
            vout.push(CTxOut {
                value: *balance,
                script_pubkey: script,
            });
        }
        (vout, n_vouts)
    }

    /// Step 6: every participant except the outer sender gets a fresh Vin
    /// pointing at the condensing transaction's own output, or a tombstone
    /// if its balance went to zero.
    fn derive_new_vins(
        balances: &IndexMap<Address, U256>,
        n_vouts: &IndexMap<Address, u32>,
        txid: crate::types::Hash256,
        sender: Address,
    ) -> IndexMap<Address, Vin> {
        let mut new_vins = IndexMap::new();
        for (addr, balance) in balances.iter() {
            if *addr == sender {
                continue;
            }
            let vin = if !balance.is_zero() {
                Vin {
                    hash: txid,
                    n_vout: n_vouts[addr],
                    value: *balance,
                    alive: 1,
                }
            } else {
                Vin::tombstone()
            };
            new_vins.insert(*addr, vin);
        }
        new_vins
    }
}
