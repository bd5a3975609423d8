//! Stream lifecycle state machine.
//!
//! The engine owns every mutation of a stream record. It talks to the outside
//! world only through its three collaborators, so the contract entry points
//! wire in the ledger-backed implementations while unit tests substitute
//! in-memory ones.

use soroban_sdk::{log, symbol_short, Address, Env};

use crate::accrual;
use crate::clock::{Clock, LedgerClock};
use crate::escrow::{EscrowTransfer, TokenEscrow};
use crate::scheduler::{Scheduler, StorageScheduler};
use crate::storage;
use crate::{CreateStreamParams, PaymentOutcome, Stream, StreamError, StreamEvent};

/// Outcome of the regular (pre-`end_time`) accrual formula.
enum Accrual {
    /// Positive amount that fits under the escrow cap.
    Due(i128),
    /// Nothing accrued yet, or the amount would overshoot the cap.
    Nothing,
    Overflow,
}

pub struct Engine<C, E, S> {
    env: Env,
    clock: C,
    escrow: E,
    scheduler: S,
}

pub type LedgerEngine = Engine<LedgerClock, TokenEscrow, StorageScheduler>;

impl LedgerEngine {
    /// Engine backed by the ledger clock, the configured escrow token and the
    /// storage trigger table.
    pub fn on_ledger(env: &Env) -> Result<Self, StreamError> {
        let config = storage::get_config(env)?;
        Ok(Engine::new(
            env,
            LedgerClock::new(env),
            TokenEscrow::new(env, config.token),
            StorageScheduler::new(env),
        ))
    }
}

impl<C: Clock, E: EscrowTransfer> Engine<C, E, StorageScheduler> {
    /// Consumes the stream's due trigger and runs the payment it stands for.
    pub fn fire_trigger(&self, stream_id: u64) -> Result<PaymentOutcome, StreamError> {
        if self.scheduler.armed(stream_id).is_none() {
            return Err(StreamError::TriggerNotArmed);
        }
        let stream = storage::load_stream(&self.env, stream_id)?;
        let now = self.clock.now(stream.stream_type);
        self.scheduler.take_due(stream_id, now)?;
        self.process_payment(stream_id)
    }
}

impl<C: Clock, E: EscrowTransfer, S: Scheduler> Engine<C, E, S> {
    pub fn new(env: &Env, clock: C, escrow: E, scheduler: S) -> Self {
        Self {
            env: env.clone(),
            clock,
            escrow,
            scheduler,
        }
    }

    /// Checks creation parameters against a start time of `now`.
    ///
    /// Returns the derived `(rate_per_second, end_time)`.
    pub fn validate_stream_params(
        params: &CreateStreamParams,
        now: u64,
    ) -> Result<(i128, u64), StreamError> {
        if params.total_amount <= 0 {
            return Err(StreamError::InvalidAmount);
        }
        let end_time = match params.duration_seconds {
            0 => None,
            duration => accrual::after_seconds(now, duration),
        }
        .ok_or(StreamError::InvalidDuration)?;
        // The first trigger must be schedulable.
        if params.interval_seconds == 0
            || accrual::after_seconds(now, params.interval_seconds).is_none()
        {
            return Err(StreamError::InvalidInterval);
        }
        let rate = accrual::rate_per_second(params.total_amount, params.duration_seconds)
            .ok_or(StreamError::InvalidDuration)?;
        if rate <= 0 {
            return Err(StreamError::DegenerateRate);
        }
        Ok((rate, end_time))
    }

    /// Validates, pulls the deposit into escrow and persists the stream.
    pub fn create_stream(
        &self,
        sender: Address,
        params: CreateStreamParams,
    ) -> Result<u64, StreamError> {
        let now = self.clock.now(params.stream_type);
        let (rate, end_time) = Self::validate_stream_params(&params, now)?;

        self.escrow.deposit(&sender, params.total_amount);

        // Ids are only allocated once the deposit has gone through.
        self.persist_new_stream(sender, params, rate, now, end_time)
    }

    /// Creates several streams from one sender with a single escrow deposit.
    ///
    /// Every entry is validated before anything moves; one bad entry rejects
    /// the whole batch.
    pub fn create_streams(
        &self,
        sender: Address,
        streams: soroban_sdk::Vec<CreateStreamParams>,
    ) -> Result<soroban_sdk::Vec<u64>, StreamError> {
        let mut total_deposit: i128 = 0;
        for params in streams.iter() {
            let now = self.clock.now(params.stream_type);
            Self::validate_stream_params(&params, now)?;
            total_deposit = total_deposit
                .checked_add(params.total_amount)
                .ok_or(StreamError::ArithmeticOverflow)?;
        }

        if total_deposit > 0 {
            self.escrow.deposit(&sender, total_deposit);
        }

        let mut created_ids = soroban_sdk::Vec::new(&self.env);
        for params in streams.iter() {
            let now = self.clock.now(params.stream_type);
            let (rate, end_time) = Self::validate_stream_params(&params, now)?;
            let stream_id = self.persist_new_stream(sender.clone(), params, rate, now, end_time)?;
            created_ids.push_back(stream_id);
        }
        Ok(created_ids)
    }

    fn persist_new_stream(
        &self,
        sender: Address,
        params: CreateStreamParams,
        rate_per_second: i128,
        now: u64,
        end_time: u64,
    ) -> Result<u64, StreamError> {
        let stream_id = storage::next_stream_id(&self.env)?;

        let stream = Stream {
            stream_id,
            sender,
            recipient: params.recipient,
            stream_type: params.stream_type,
            start_time: now,
            end_time,
            interval_seconds: params.interval_seconds,
            rate_per_second,
            last_payment_time: now,
            total_amount: params.total_amount,
            withdrawn_amount: 0,
            is_paused: false,
            is_cancelled: false,
            is_halted: false,
            completed_at: None,
            cancelled_at: None,
        };
        storage::save_stream(&self.env, &stream);
        self.scheduler
            .arm(stream_id, now, stream.interval_seconds)?;

        self.env.events().publish(
            (symbol_short!("created"), stream_id),
            (
                stream.sender,
                stream.recipient,
                stream.total_amount,
                params.duration_seconds,
            ),
        );
        Ok(stream_id)
    }

    /// Pays whatever has accrued since the last checkpoint and decides
    /// whether to arm the next trigger.
    ///
    /// Paused, cancelled and completed streams are absorbed as outcomes, not
    /// errors, so a late trigger never fails the keeper.
    pub fn process_payment(&self, stream_id: u64) -> Result<PaymentOutcome, StreamError> {
        self.guarded(stream_id, || {
            let mut stream = storage::load_stream(&self.env, stream_id)?;

            if stream.is_cancelled {
                log!(&self.env, "payment skipped: stream is closed", stream_id);
                return Ok(PaymentOutcome::Cancelled);
            }
            if stream.is_paused {
                // No re-arm: the chain stays broken until resume_stream.
                log!(&self.env, "payment skipped: stream is paused", stream_id);
                return Ok(PaymentOutcome::Paused);
            }
            if stream.is_halted {
                // Only cancel_stream releases the escrow of a halted stream.
                log!(&self.env, "payment skipped: stream is halted", stream_id);
                return Ok(PaymentOutcome::Halted);
            }

            let now = self.clock.now(stream.stream_type);

            if now >= stream.end_time {
                let amount = accrual::remaining(stream.total_amount, stream.withdrawn_amount);
                stream.withdrawn_amount = stream.total_amount;
                stream.last_payment_time = stream.last_payment_time.max(now);
                stream.is_cancelled = true;
                stream.completed_at = Some(now);
                storage::save_stream(&self.env, &stream);

                if amount > 0 {
                    self.escrow.transfer(&stream.recipient, amount);
                }
                let outcome = PaymentOutcome::Final(amount);
                self.env
                    .events()
                    .publish((symbol_short!("payment"), stream_id), outcome.clone());
                return Ok(outcome);
            }

            let outcome = match Self::regular_accrual(&stream, now) {
                Accrual::Due(amount) => {
                    stream.withdrawn_amount += amount;
                    stream.last_payment_time = now;
                    storage::save_stream(&self.env, &stream);

                    self.escrow.transfer(&stream.recipient, amount);
                    let outcome = PaymentOutcome::Regular(amount);
                    self.env
                        .events()
                        .publish((symbol_short!("payment"), stream_id), outcome.clone());
                    outcome
                }
                Accrual::Nothing => {
                    log!(&self.env, "payment skipped: nothing accrued", stream_id);
                    PaymentOutcome::Idle
                }
                Accrual::Overflow => {
                    self.halt(&mut stream);
                    return Ok(PaymentOutcome::Halted);
                }
            };

            if self
                .scheduler
                .arm(stream_id, now, stream.interval_seconds)
                .is_err()
            {
                self.halt(&mut stream);
            }
            Ok(outcome)
        })
    }

    /// Settles outstanding accrual, then pauses. Returns the settled amount.
    pub fn pause_stream(&self, stream_id: u64, caller: &Address) -> Result<i128, StreamError> {
        self.guarded(stream_id, || {
            let mut stream = storage::load_stream(&self.env, stream_id)?;
            Self::require_sender(&stream, caller)?;
            if stream.is_cancelled || stream.is_paused {
                return Err(StreamError::InvalidState);
            }

            let now = self.clock.now(stream.stream_type);
            let settled = match Self::regular_accrual(&stream, now) {
                Accrual::Due(amount) if now < stream.end_time => amount,
                _ => 0,
            };
            if settled > 0 {
                stream.withdrawn_amount += settled;
                stream.last_payment_time = now;
            }
            stream.is_paused = true;
            storage::save_stream(&self.env, &stream);

            if settled > 0 {
                self.escrow.transfer(&stream.recipient, settled);
                self.env.events().publish(
                    (symbol_short!("payment"), stream_id),
                    PaymentOutcome::Regular(settled),
                );
            }
            self.env.events().publish(
                (symbol_short!("paused"), stream_id),
                StreamEvent::Paused(stream_id),
            );
            Ok(settled)
        })
    }

    /// Unpauses, restarts the accrual clock at `now` and re-arms the trigger.
    pub fn resume_stream(&self, stream_id: u64, caller: &Address) -> Result<(), StreamError> {
        self.guarded(stream_id, || {
            let mut stream = storage::load_stream(&self.env, stream_id)?;
            Self::require_sender(&stream, caller)?;
            if stream.is_cancelled || !stream.is_paused {
                return Err(StreamError::InvalidState);
            }

            let now = self.clock.now(stream.stream_type);
            stream.is_paused = false;
            // Paused time is forfeited, never paid retroactively.
            stream.last_payment_time = stream.last_payment_time.max(now);
            storage::save_stream(&self.env, &stream);

            self.scheduler
                .arm(stream_id, now, stream.interval_seconds)?;

            self.env.events().publish(
                (symbol_short!("resumed"), stream_id),
                StreamEvent::Resumed(stream_id),
            );
            Ok(())
        })
    }

    /// Closes the stream and refunds the unpaid remainder to the sender.
    pub fn cancel_stream(&self, stream_id: u64, caller: &Address) -> Result<i128, StreamError> {
        self.guarded(stream_id, || {
            let mut stream = storage::load_stream(&self.env, stream_id)?;
            Self::require_sender(&stream, caller)?;
            if stream.is_cancelled {
                return Err(StreamError::AlreadyCancelled);
            }

            let refund = accrual::remaining(stream.total_amount, stream.withdrawn_amount);
            let now = self.clock.now(stream.stream_type);

            // CEI: update state before external token transfer to reduce reentrancy risk.
            stream.is_cancelled = true;
            stream.cancelled_at = Some(now);
            storage::save_stream(&self.env, &stream);

            if refund > 0 {
                self.escrow.refund(&stream.sender, refund);
                self.env
                    .events()
                    .publish((symbol_short!("refunded"), stream_id), refund);
            }
            self.env.events().publish(
                (symbol_short!("cancelled"), stream_id),
                StreamEvent::Cancelled(stream_id),
            );
            Ok(refund)
        })
    }

    /// Read-only preview of the next payment.
    pub fn withdrawable_amount(&self, stream_id: u64) -> Result<i128, StreamError> {
        let stream = storage::load_stream(&self.env, stream_id)?;
        if stream.is_paused || stream.is_cancelled || stream.is_halted {
            return Ok(0);
        }
        Ok(accrual::withdrawable(
            stream.total_amount,
            stream.withdrawn_amount,
            stream.rate_per_second,
            stream.last_payment_time,
            stream.end_time,
            self.clock.now(stream.stream_type),
        ))
    }

    fn regular_accrual(stream: &Stream, now: u64) -> Accrual {
        let Some(amount) =
            accrual::accrued_since(stream.last_payment_time, now, stream.rate_per_second)
        else {
            return Accrual::Overflow;
        };
        match stream.withdrawn_amount.checked_add(amount) {
            None => Accrual::Overflow,
            Some(after) if amount > 0 && after <= stream.total_amount => Accrual::Due(amount),
            Some(_) => Accrual::Nothing,
        }
    }

    fn require_sender(stream: &Stream, caller: &Address) -> Result<(), StreamError> {
        if *caller != stream.sender {
            return Err(StreamError::Unauthorized);
        }
        Ok(())
    }

    /// Stops all further payment on a stream whose math no longer fits.
    fn halt(&self, stream: &mut Stream) {
        stream.is_halted = true;
        storage::save_stream(&self.env, stream);

        let stream_id = stream.stream_id;
        log!(&self.env, "payment chain halted: arithmetic overflow", stream_id);
        self.env.events().publish(
            (symbol_short!("halted"), stream_id),
            StreamEvent::Halted(stream_id),
        );
    }

    /// Runs `op` while holding the per-stream mutation guard.
    fn guarded<T>(
        &self,
        stream_id: u64,
        op: impl FnOnce() -> Result<T, StreamError>,
    ) -> Result<T, StreamError> {
        storage::acquire_guard(&self.env, stream_id)?;
        let result = op();
        storage::release_guard(&self.env, stream_id);
        result
    }
}
