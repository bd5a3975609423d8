use soroban_sdk::Env;

use crate::accrual::MILLIS_PER_SECOND;
use crate::StreamType;

/// Time source consulted by the engine. Values are milliseconds and must be
/// monotonic non-decreasing for a given stream type.
pub trait Clock {
    fn now(&self, stream_type: StreamType) -> u64;
}

/// Reads the host ledger.
///
/// Time-based streams use the ledger close timestamp. Block-based streams use
/// the ledger sequence, one ledger standing in for one second, so durations
/// and intervals of a block-based stream are counted in ledgers.
pub struct LedgerClock {
    env: Env,
}

impl LedgerClock {
    pub fn new(env: &Env) -> Self {
        Self { env: env.clone() }
    }
}

impl Clock for LedgerClock {
    fn now(&self, stream_type: StreamType) -> u64 {
        let ticks = match stream_type {
            StreamType::TimeBased => self.env.ledger().timestamp(),
            StreamType::BlockBased => self.env.ledger().sequence() as u64,
        };
        ticks.saturating_mul(MILLIS_PER_SECOND)
    }
}
