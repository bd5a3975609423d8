#![no_std]

mod accrual;
mod clock;
mod engine;
mod escrow;
mod scheduler;
mod storage;

use soroban_sdk::{contract, contractimpl, contracttype, log, Address, Env, Vec};

use engine::LedgerEngine;
use scheduler::StorageScheduler;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Global configuration, written once by `init`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Token every stream escrows and pays out in.
    pub token: Address,
}

/// Which clock a stream accrues against.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamType {
    /// Ledger close timestamp; durations are wall-clock seconds.
    TimeBased = 0,
    /// Ledger sequence; durations and intervals count ledgers.
    BlockBased = 1,
}

/// Lifecycle position derived from a stream's flags.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StreamStatus {
    Active = 0,
    Paused = 1,
    Completed = 2,
    Cancelled = 3,
}

#[soroban_sdk::contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum StreamError {
    NotFound = 1,
    InvalidAmount = 2,
    InvalidDuration = 3,
    InvalidInterval = 4,
    DegenerateRate = 5,
    Unauthorized = 6,
    InvalidState = 7,
    AlreadyCancelled = 8,
    ArithmeticOverflow = 9,
    TriggerNotArmed = 10,
    TriggerNotDue = 11,
    NotInitialised = 12,
    AlreadyInitialised = 13,
    Reentrant = 14,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StreamEvent {
    Paused(u64),
    Resumed(u64),
    Cancelled(u64),
    Halted(u64),
}

/// Result of one `process_payment` run.
///
/// Only `Regular` and `Final` move funds. The other variants are expected
/// no-op outcomes of a trigger firing and are never surfaced as errors.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PaymentOutcome {
    Regular(i128),
    /// Exact remainder paid at or after `end_time`; the stream is now closed.
    Final(i128),
    /// Nothing accrued since the last checkpoint. The trigger is re-armed.
    Idle,
    /// Stream is paused. The trigger is not re-armed.
    Paused,
    /// Stream was cancelled or has completed.
    Cancelled,
    /// Accrual overflowed, now or on an earlier run. The stream pays nothing
    /// more; only `cancel_stream` releases its escrow.
    Halted,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Stream {
    pub stream_id: u64,
    pub sender: Address,
    pub recipient: Address,
    pub stream_type: StreamType,
    /// Clock values below are milliseconds of the stream's clock.
    pub start_time: u64,
    pub end_time: u64,
    pub interval_seconds: u64,
    pub rate_per_second: i128,
    pub last_payment_time: u64,
    pub total_amount: i128,
    pub withdrawn_amount: i128,
    pub is_paused: bool,
    /// Terminal. Also set when the final payment completes the stream.
    pub is_cancelled: bool,
    /// Set once accrual overflows. A halted stream never pays again.
    pub is_halted: bool,
    pub completed_at: Option<u64>,
    pub cancelled_at: Option<u64>,
}

impl Stream {
    pub fn status(&self) -> StreamStatus {
        if self.completed_at.is_some() {
            StreamStatus::Completed
        } else if self.is_cancelled {
            StreamStatus::Cancelled
        } else if self.is_paused {
            StreamStatus::Paused
        } else {
            StreamStatus::Active
        }
    }
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateStreamParams {
    pub recipient: Address,
    pub duration_seconds: u64,
    pub stream_type: StreamType,
    pub interval_seconds: u64,
    pub total_amount: i128,
}

/// Next scheduled payment of a stream, in the stream's clock.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Trigger {
    pub stream_id: u64,
    pub armed_at: u64,
    pub due_at: u64,
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct StreamLedger;

#[contractimpl]
impl StreamLedger {
    /// Initialise the ledger with the token used for escrow and payouts.
    ///
    /// Must be called exactly once before any stream is created. Sets the
    /// stream counter to 0 so the first stream gets id 1.
    ///
    /// # Errors
    /// - `AlreadyInitialised` if called more than once
    pub fn init(env: Env, token: Address) -> Result<(), StreamError> {
        if storage::has_config(&env) {
            return Err(StreamError::AlreadyInitialised);
        }
        storage::set_config(&env, &Config { token });
        Ok(())
    }

    /// Create a stream that vests `total_amount` to `recipient` over
    /// `duration_seconds`, starting now.
    ///
    /// Pulls `total_amount` from `sender` into escrow, derives
    /// `rate_per_second = total_amount / duration_seconds` (truncating) and
    /// arms the first payment trigger `interval_seconds` from now.
    ///
    /// # Parameters
    /// - `sender`: funds the stream and alone may pause, resume or cancel it
    /// - `recipient`: receives accrued payments
    /// - `duration_seconds`: vesting window (ledgers for `BlockBased`)
    /// - `stream_type`: clock the stream accrues against
    /// - `interval_seconds`: spacing of payment triggers
    /// - `total_amount`: escrowed value
    ///
    /// # Authorization
    /// - Requires authorization from `sender`
    ///
    /// # Errors
    /// - `InvalidAmount` if `total_amount <= 0`
    /// - `InvalidDuration` if `duration_seconds == 0` or the end time overflows
    /// - `InvalidInterval` if `interval_seconds == 0`
    /// - `DegenerateRate` if `total_amount < duration_seconds` (rate truncates to 0)
    ///
    /// A failed creation leaves no record and does not advance the counter.
    /// An insufficient sender balance panics inside the token contract.
    pub fn create_stream(
        env: Env,
        sender: Address,
        recipient: Address,
        duration_seconds: u64,
        stream_type: StreamType,
        interval_seconds: u64,
        total_amount: i128,
    ) -> Result<u64, StreamError> {
        sender.require_auth();

        LedgerEngine::on_ledger(&env)?.create_stream(
            sender,
            CreateStreamParams {
                recipient,
                duration_seconds,
                stream_type,
                interval_seconds,
                total_amount,
            },
        )
    }

    /// Create several streams in one transaction with a single escrow deposit.
    ///
    /// All entries are validated before any funds move, so one invalid entry
    /// rejects the whole batch. Ids are assigned in input order.
    pub fn create_streams(
        env: Env,
        sender: Address,
        streams: Vec<CreateStreamParams>,
    ) -> Result<Vec<u64>, StreamError> {
        sender.require_auth();
        LedgerEngine::on_ledger(&env)?.create_streams(sender, streams)
    }

    /// Pay out what has accrued on a stream since its last checkpoint.
    ///
    /// Normally reached through `fire_trigger`, but safe to call directly:
    /// paused, cancelled and completed streams return a no-op outcome, and a
    /// call with nothing accrued pays nothing. At or after `end_time` the
    /// exact remainder is paid and the stream closes. A halted stream returns
    /// `Halted` and pays nothing, even past `end_time`.
    ///
    /// Re-arms the stream's trigger unless the stream is paused, closed or
    /// halted.
    ///
    /// # Errors
    /// - `NotFound` if the stream does not exist
    pub fn process_payment(env: Env, stream_id: u64) -> Result<PaymentOutcome, StreamError> {
        LedgerEngine::on_ledger(&env)?.process_payment(stream_id)
    }

    /// Fire the armed trigger of a stream. Called by the keeper.
    ///
    /// # Errors
    /// - `TriggerNotArmed` if the stream has no pending trigger
    /// - `TriggerNotDue` if the trigger's due time has not been reached
    pub fn fire_trigger(env: Env, stream_id: u64) -> Result<PaymentOutcome, StreamError> {
        LedgerEngine::on_ledger(&env)?.fire_trigger(stream_id)
    }

    /// Fire every listed trigger that is armed and due; others are skipped.
    ///
    /// Returns the number of triggers fired.
    pub fn fire_due_triggers(env: Env, stream_ids: Vec<u64>) -> Result<u32, StreamError> {
        let engine = LedgerEngine::on_ledger(&env)?;
        let mut fired = 0u32;
        for stream_id in stream_ids.iter() {
            match engine.fire_trigger(stream_id) {
                Ok(_) => fired += 1,
                Err(err) => log!(&env, "trigger skipped", stream_id, err as u32),
            }
        }
        Ok(fired)
    }

    /// Pause a stream.
    ///
    /// Accrual up to now is settled to the recipient first, then the stream
    /// stops paying. Pending triggers still fire but do nothing and do not
    /// re-arm; `resume_stream` restarts the chain.
    ///
    /// # Authorization
    /// - Requires authorization from `caller`, who must be the stream's sender
    ///
    /// # Returns
    /// - The amount settled to the recipient before pausing
    ///
    /// # Errors
    /// - `NotFound`, `Unauthorized`
    /// - `InvalidState` if the stream is closed or already paused
    pub fn pause_stream(env: Env, stream_id: u64, caller: Address) -> Result<i128, StreamError> {
        caller.require_auth();
        LedgerEngine::on_ledger(&env)?.pause_stream(stream_id, &caller)
    }

    /// Resume a paused stream.
    ///
    /// The accrual checkpoint moves to now, so paused time is never paid, and
    /// a new trigger is armed `interval_seconds` out. `end_time` is unchanged.
    ///
    /// # Errors
    /// - `NotFound`, `Unauthorized`
    /// - `InvalidState` if the stream is closed or not paused
    pub fn resume_stream(env: Env, stream_id: u64, caller: Address) -> Result<(), StreamError> {
        caller.require_auth();
        LedgerEngine::on_ledger(&env)?.resume_stream(stream_id, &caller)
    }

    /// Cancel a stream and refund `total_amount - withdrawn_amount` to the
    /// sender. Irreversible.
    ///
    /// # Errors
    /// - `NotFound`, `Unauthorized`
    /// - `AlreadyCancelled` if the stream was cancelled or has completed
    pub fn cancel_stream(env: Env, stream_id: u64, caller: Address) -> Result<i128, StreamError> {
        caller.require_auth();
        LedgerEngine::on_ledger(&env)?.cancel_stream(stream_id, &caller)
    }

    /// Full record of a stream. Fails with `NotFound` for an unknown id.
    pub fn get_stream(env: Env, stream_id: u64) -> Result<Stream, StreamError> {
        storage::load_stream(&env, stream_id)
    }

    /// Lifecycle status of a stream. Fails with `NotFound` for an unknown id.
    pub fn get_stream_status(env: Env, stream_id: u64) -> Result<StreamStatus, StreamError> {
        storage::load_stream(&env, stream_id).map(|stream| stream.status())
    }

    /// Number of streams ever created, which is also the last assigned id.
    pub fn get_stream_count(env: Env) -> u64 {
        storage::get_stream_count(&env)
    }

    /// Amount the next payment would release right now, without paying it.
    ///
    /// Zero for paused, halted or closed streams. Past `end_time` this is the
    /// exact unpaid remainder rather than `min(remaining, elapsed * rate)`, so
    /// it matches what the final payment sends.
    ///
    /// # Errors
    /// - `NotFound` if the stream does not exist
    pub fn get_withdrawable_amount(env: Env, stream_id: u64) -> Result<i128, StreamError> {
        LedgerEngine::on_ledger(&env)?.withdrawable_amount(stream_id)
    }

    /// Pending trigger of a stream, or `None` if nothing is armed.
    pub fn get_trigger(env: Env, stream_id: u64) -> Option<Trigger> {
        StorageScheduler::new(&env).armed(stream_id)
    }

    /// Global configuration. Fails with `NotInitialised` before `init`.
    pub fn get_config(env: Env) -> Result<Config, StreamError> {
        storage::get_config(&env)
    }
}
