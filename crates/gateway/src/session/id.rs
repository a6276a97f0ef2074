//! Session identifier generation.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Unique identifier for a session.
pub type SessionId = String;

/// Number of random bytes in a session identifier.
pub const SESSION_ID_BYTES: usize = 16;

/// The OS entropy source could not be read.
#[derive(Debug, Error)]
#[error("entropy source unavailable: {0}")]
pub struct GenerationError(#[from] rand::Error);

/// Generates an unguessable session identifier.
///
/// The identifier is 128 bits from the operating system CSPRNG, hex encoded,
/// so concurrent independent calls do not collide in practice.
pub fn generate_session_id() -> Result<SessionId, GenerationError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}
