//! Fixed-layout datagram codec for [`AgentState`].
//!
//! Layout (little-endian, 29 bytes):
//!
//! ```text
//! offset  size  field
//!      0     4  agent_id          u32
//!      4     8  position          f64
//!     12     8  speed             f64
//!     20     1  flags             bit0 = emergency_brake, bit1 = decoupled
//!     21     8  source_timestamp  i64 (seconds, sender clock)
//! ```
//!
//! No version field, no checksum: every peer on the channel is trusted.

use crate::error::WireError;
use crate::types::{AgentId, AgentState};

/// Encoded size of one state datagram.
pub const WIRE_SIZE: usize = 29;

const FLAG_EMERGENCY: u8 = 0b01;
const FLAG_DECOUPLED: u8 = 0b10;

/// Encodes a state into its fixed-size datagram.
pub fn encode(state: &AgentState) -> [u8; WIRE_SIZE] {
    let mut buf = [0u8; WIRE_SIZE];
    buf[0..4].copy_from_slice(&state.agent_id.0.to_le_bytes());
    buf[4..12].copy_from_slice(&state.position.to_le_bytes());
    buf[12..20].copy_from_slice(&state.speed.to_le_bytes());

    let mut flags = 0u8;
    if state.emergency_brake {
        flags |= FLAG_EMERGENCY;
    }
    if state.decoupled {
        flags |= FLAG_DECOUPLED;
    }
    buf[20] = flags;
    buf[21..29].copy_from_slice(&state.source_timestamp.to_le_bytes());
    buf
}

/// Decodes a datagram produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<AgentState, WireError> {
    if bytes.len() != WIRE_SIZE {
        return Err(WireError::Length {
            expected: WIRE_SIZE,
            actual: bytes.len(),
        });
    }

    let flags = bytes[20];
    if flags & !(FLAG_EMERGENCY | FLAG_DECOUPLED) != 0 {
        return Err(WireError::UnknownFlags(flags));
    }

    Ok(AgentState {
        agent_id: AgentId(u32::from_le_bytes(field(bytes, 0))),
        position: f64::from_le_bytes(field(bytes, 4)),
        speed: f64::from_le_bytes(field(bytes, 12)),
        emergency_brake: flags & FLAG_EMERGENCY != 0,
        decoupled: flags & FLAG_DECOUPLED != 0,
        source_timestamp: i64::from_le_bytes(field(bytes, 21)),
    })
}

// Length is checked by the caller.
fn field<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[offset..offset + N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_offsets() {
        let state = AgentState::new(AgentId(7), -30.0, 12.5, 1_700_000_000)
            .with_decoupled(true);
        let bytes = encode(&state);

        assert_eq!(&bytes[0..4], &7u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &(-30.0f64).to_le_bytes());
        assert_eq!(bytes[20], FLAG_DECOUPLED);
        assert_eq!(&bytes[21..29], &1_700_000_000i64.to_le_bytes());
    }

    #[test]
    fn test_decode_restores_flags() {
        let state = AgentState::new(AgentId(2), 100.0, 9.0, 42)
            .with_emergency(true)
            .with_decoupled(true);

        let decoded = decode(&encode(&state)).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let bytes = encode(&AgentState::new(AgentId(1), 0.0, 0.0, 0));
        assert_eq!(
            decode(&bytes[..20]),
            Err(WireError::Length { expected: WIRE_SIZE, actual: 20 })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_flags() {
        let mut bytes = encode(&AgentState::new(AgentId(1), 0.0, 0.0, 0));
        bytes[20] = 0b100;
        assert_eq!(decode(&bytes), Err(WireError::UnknownFlags(0b100)));
    }
}
