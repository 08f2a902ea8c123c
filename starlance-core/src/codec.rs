//! Snapshot and packet codecs.
//!
//! The full `GameState` frames as a single msgpack blob behind a schema
//! version; mismatched reads are refused, never migrated. Per-house
//! fog-of-war views additionally carry `(config_schema_version,
//! config_hash)` so a delta is only ever applied over the config it was
//! cut from.

use crate::config::{GameConfig, CONFIG_SCHEMA_VERSION};
use crate::input::CommandPacket;
use crate::report::PlayerState;
use crate::state::GameState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bumped whenever the snapshot layout changes shape.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("snapshot schema {found} does not match engine schema {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
    #[error("view was cut from a different config (schema {found_schema}, hash {found_hash:#x})")]
    ConfigMismatch { found_schema: u32, found_hash: u64 },
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

#[derive(Serialize, Deserialize)]
struct SnapshotEnvelope {
    schema_version: u32,
    state: GameState,
}

pub fn encode_snapshot(state: &GameState) -> Result<Vec<u8>, CodecError> {
    let envelope = SnapshotEnvelope {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        state: state.clone(),
    };
    Ok(rmp_serde::to_vec(&envelope)?)
}

/// Decode and rebuild the skipped slot maps and secondary indices.
pub fn decode_snapshot(bytes: &[u8]) -> Result<GameState, CodecError> {
    let envelope: SnapshotEnvelope = rmp_serde::from_slice(bytes)?;
    if envelope.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return Err(CodecError::SchemaMismatch {
            found: envelope.schema_version,
            expected: SNAPSHOT_SCHEMA_VERSION,
        });
    }
    let mut state = envelope.state;
    state.rebuild_indices();
    Ok(state)
}

pub fn encode_packet(packet: &CommandPacket) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(packet)?)
}

pub fn decode_packet(bytes: &[u8]) -> Result<CommandPacket, CodecError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn encode_player_state(view: &PlayerState) -> Result<Vec<u8>, CodecError> {
    Ok(rmp_serde::to_vec(view)?)
}

/// Decode a fog-of-war view, refusing one cut from a different config.
pub fn decode_player_state(bytes: &[u8], config: &GameConfig) -> Result<PlayerState, CodecError> {
    let view: PlayerState = rmp_serde::from_slice(bytes)?;
    if view.config_schema_version != CONFIG_SCHEMA_VERSION
        || view.config_hash != config.content_hash()
    {
        return Err(CodecError::ConfigMismatch {
            found_schema: view.config_schema_version,
            found_hash: view.config_hash,
        });
    }
    Ok(view)
}
