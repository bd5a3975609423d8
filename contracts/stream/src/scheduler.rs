//! Recurring payment triggers.
//!
//! The host has no timers, so "arming" a trigger records when the next
//! payment for a stream becomes due and a keeper fires it through
//! `fire_trigger`. A trigger cannot be disarmed: the payment handler's own
//! state checks decide whether a firing does anything.

use soroban_sdk::{symbol_short, Env};

use crate::accrual;
use crate::storage::{DataKey, TTL_EXTEND_TO, TTL_THRESHOLD};
use crate::{StreamError, Trigger};

pub trait Scheduler {
    /// Schedules exactly one future payment for `stream_id`, `delay_seconds`
    /// after `now`, replacing any trigger already armed for it. Returns the
    /// due time.
    fn arm(&self, stream_id: u64, now: u64, delay_seconds: u64) -> Result<u64, StreamError>;
}

/// Trigger table kept in persistent storage.
pub struct StorageScheduler {
    env: Env,
}

impl StorageScheduler {
    pub fn new(env: &Env) -> Self {
        Self { env: env.clone() }
    }

    pub fn armed(&self, stream_id: u64) -> Option<Trigger> {
        self.env
            .storage()
            .persistent()
            .get(&DataKey::Trigger(stream_id))
    }

    /// Consumes the armed trigger if it is due at `now`.
    pub fn take_due(&self, stream_id: u64, now: u64) -> Result<Trigger, StreamError> {
        let trigger = self.armed(stream_id).ok_or(StreamError::TriggerNotArmed)?;
        if now < trigger.due_at {
            return Err(StreamError::TriggerNotDue);
        }
        self.env
            .storage()
            .persistent()
            .remove(&DataKey::Trigger(stream_id));
        Ok(trigger)
    }
}

impl Scheduler for StorageScheduler {
    fn arm(&self, stream_id: u64, now: u64, delay_seconds: u64) -> Result<u64, StreamError> {
        let due_at =
            accrual::after_seconds(now, delay_seconds).ok_or(StreamError::ArithmeticOverflow)?;

        let key = DataKey::Trigger(stream_id);
        let trigger = Trigger {
            stream_id,
            armed_at: now,
            due_at,
        };
        self.env.storage().persistent().set(&key, &trigger);
        self.env
            .storage()
            .persistent()
            .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);

        self.env
            .events()
            .publish((symbol_short!("armed"), stream_id), due_at);
        Ok(due_at)
    }
}
