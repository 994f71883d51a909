//! # Ledger Events
//!
//! Every successful state change appends one or more [`LedgerEvent`]s to
//! the ledger's [`EventLog`]. The log is the notification stream: off-ledger
//! observers (the node's journal, WebSocket subscribers, indexers) consume
//! it instead of polling balances.
//!
//! Sequence numbers are per ledger, start at zero at construction and never
//! repeat. They survive persistence; the pending records themselves do not,
//! because once drained they belong to whoever drained them.

use ce_protocol::{Address, Amount};
use serde::{Deserialize, Serialize};

/// A state-change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Value moved between accounts. `from == 0` is a mint, `to == 0` a burn.
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "ce_protocol::amount::decimal")]
        value: Amount,
    },
    /// An allowance was set.
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "ce_protocol::amount::decimal")]
        value: Amount,
    },
    /// The owner changed. `new_owner == 0` is a renunciation.
    OwnershipTransferred {
        previous_owner: Address,
        new_owner: Address,
    },
}

/// An event stamped with the emitting ledger and its position in that
/// ledger's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Address of the emitting ledger.
    pub ledger: Address,
    /// Position in the ledger's stream, starting at 0.
    pub seq: u64,
    /// The event itself.
    pub event: LedgerEvent,
}

/// Append-only event stream owned by a single ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    next_seq: u64,
    #[serde(skip)]
    pending: Vec<EventRecord>,
}

impl EventLog {
    /// Appends an event and returns its sequence number.
    pub fn emit(&mut self, ledger: Address, event: LedgerEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(EventRecord { ledger, seq, event });
        seq
    }

    /// Events emitted since the last [`drain`](Self::drain), oldest first.
    pub fn pending(&self) -> &[EventRecord] {
        &self.pending
    }

    /// Takes every pending event, leaving the log empty.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Sequence number the next event will get. Equal to the total number of
    /// events this ledger has ever emitted.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(n: u64) -> LedgerEvent {
        LedgerEvent::Transfer {
            from: Address::from_low_u64_be(1),
            to: Address::from_low_u64_be(2),
            value: Amount::from(n),
        }
    }

    #[test]
    fn sequence_numbers_are_monotonic_across_drains() {
        let ledger = Address::from_low_u64_be(99);
        let mut log = EventLog::default();
        assert_eq!(log.emit(ledger, transfer(1)), 0);
        assert_eq!(log.emit(ledger, transfer(2)), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.pending().is_empty());

        assert_eq!(log.emit(ledger, transfer(3)), 2);
        assert_eq!(log.pending()[0].seq, 2);
        assert_eq!(log.next_seq(), 3);
    }

    #[test]
    fn persisted_log_keeps_counter_but_not_pending() {
        let mut log = EventLog::default();
        log.emit(Address::from_low_u64_be(1), transfer(5));
        let json = serde_json::to_string(&log).unwrap();
        let restored: EventLog = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.next_seq(), 1);
        assert!(restored.pending().is_empty());
    }

    #[test]
    fn event_json_shape() {
        let json = serde_json::to_value(transfer(10)).unwrap();
        assert_eq!(json["transfer"]["value"], "10");
        assert_eq!(
            json["transfer"]["to"],
            "0x0000000000000000000000000000000000000002"
        );
    }
}
