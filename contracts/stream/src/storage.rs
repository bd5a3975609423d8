use soroban_sdk::{contracttype, Env};

use crate::{Config, Stream, StreamError};

/// Bump an entry once its remaining TTL drops below this many ledgers.
pub const TTL_THRESHOLD: u32 = 17_280;
/// TTL an entry is extended to when bumped (about a week of ledgers).
pub const TTL_EXTEND_TO: u32 = 120_960;

/// Namespace for all contract storage keys.
#[contracttype]
pub enum DataKey {
    Config,       // Instance storage for global settings (escrow token).
    StreamCount,  // Instance storage for the id sequence; last assigned id.
    Stream(u64),  // Persistent storage for individual stream records.
    Trigger(u64), // Persistent storage for the armed trigger of a stream.
    Guard(u64),   // Temporary storage, present while a stream is being mutated.
}

pub fn has_config(env: &Env) -> bool {
    env.storage().instance().has(&DataKey::Config)
}

pub fn get_config(env: &Env) -> Result<Config, StreamError> {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .ok_or(StreamError::NotInitialised)
}

pub fn set_config(env: &Env, config: &Config) {
    env.storage().instance().set(&DataKey::Config, config);
    env.storage().instance().set(&DataKey::StreamCount, &0u64);
    env.storage()
        .instance()
        .extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
}

pub fn get_stream_count(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::StreamCount)
        .unwrap_or(0u64)
}

/// Reserves the next stream id. Ids start at 1 and are never reused.
pub fn next_stream_id(env: &Env) -> Result<u64, StreamError> {
    let id = get_stream_count(env)
        .checked_add(1)
        .ok_or(StreamError::ArithmeticOverflow)?;
    env.storage().instance().set(&DataKey::StreamCount, &id);
    env.storage()
        .instance()
        .extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
    Ok(id)
}

pub fn load_stream(env: &Env, stream_id: u64) -> Result<Stream, StreamError> {
    env.storage()
        .persistent()
        .get(&DataKey::Stream(stream_id))
        .ok_or(StreamError::NotFound)
}

pub fn save_stream(env: &Env, stream: &Stream) {
    let key = DataKey::Stream(stream.stream_id);
    env.storage().persistent().set(&key, stream);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

/// Marks `stream_id` as being mutated.
///
/// Host invocations are already serialized, so the guard only trips on
/// re-entry into the same stream from inside a token callback.
pub fn acquire_guard(env: &Env, stream_id: u64) -> Result<(), StreamError> {
    let key = DataKey::Guard(stream_id);
    if env.storage().temporary().has(&key) {
        return Err(StreamError::Reentrant);
    }
    env.storage().temporary().set(&key, &true);
    Ok(())
}

pub fn release_guard(env: &Env, stream_id: u64) {
    env.storage().temporary().remove(&DataKey::Guard(stream_id));
}
