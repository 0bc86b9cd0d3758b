//! Transaction-scoped log of observed balance transfers.

use crate::types::TransferInfo;

/// Ordered, append-only sequence of transfers observed during one
/// execution. Constructed fresh by [`crate::StateExecutor::execute`] and
/// either consumed by [`crate::CondensingBuilder`] or discarded - it is
/// never a long-lived field shared across transactions.
#[derive(Clone, Debug, Default)]
pub struct TransferLog {
    entries: Vec<TransferInfo>,
}

impl TransferLog {
    /// An empty log.
    pub fn new() -> Self {
        TransferLog::default()
    }

    /// Appends a transfer. Zero-value transfers are recorded too - they
    /// convey that `from` and `to` were touched even though no value moved.
    pub fn record(&mut self, transfer: TransferInfo) {
        self.entries.push(transfer);
    }

    /// Transfers in the order they were recorded.
    pub fn entries(&self) -> &[TransferInfo] {
        &self.entries
    }

    /// Whether any transfer was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of transfers recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, U256};

    #[test]
    fn records_in_append_order_including_zero_value_and_self_transfers() {
        let mut log = TransferLog::new();
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        log.record(TransferInfo {
            from: a,
            to: b,
            value: U256::from(10u64),
        });
        log.record(TransferInfo {
            from: a,
            to: a,
            value: U256::zero(),
        });
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].value, U256::from(10u64));
        assert_eq!(log.entries()[1].from, log.entries()[1].to);
    }
}
