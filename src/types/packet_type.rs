//! Packet type identifiers and the fixed frame length table

use std::time::Duration;

/// Frame preamble, `0xFF 0x55 0xAA`.
pub const PREAMBLE: [u8; 3] = [0xFF, 0x55, 0xAA];

/// Total frame length per type byte (preamble + type + payload + checksum).
/// Negative entries are types the relay cannot frame.
pub const FRAME_LENGTHS: [i8; 18] = [7, -1, 38, 7, 11, 8, 10, 13, 7, 7, -1, 8, 8, 9, -1, 11, 16, 10];

/// Status flags (1 byte).
pub const STATUS: u8 = 0x00;
/// 15 cell voltages plus one unknown word (32 bytes).
pub const CELL_VOLTAGES: u8 = 0x02;
/// BMS-reported state of charge (1 byte).
pub const SOC: u8 = 0x03;
/// 5 temperature probes (5 bytes).
pub const TEMPERATURES: u8 = 0x04;
/// Signed pack current (2 bytes).
pub const CURRENT: u8 = 0x05;
/// BMS serial number (4 bytes).
pub const SERIAL: u8 = 0x06;
/// Sent right before the BMS cuts power.
pub const POWER_OFF: u8 = 0x0B;

/// Total frame length for `packet_type`, or `None` if the type cannot be framed.
pub fn frame_length(packet_type: u8) -> Option<usize> {
    FRAME_LENGTHS
        .get(packet_type as usize)
        .and_then(|&len| usize::try_from(len).ok())
}

/// How long a packet type may stay silent before the relay replays its last copy.
///
/// `None` means the type is never replayed.
pub fn replay_timeout(packet_type: u8) -> Option<Duration> {
    match packet_type {
        STATUS | CURRENT => Some(Duration::from_millis(500)),
        POWER_OFF => None,
        _ => Some(Duration::from_millis(3000)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_match_table() {
        assert_eq!(frame_length(STATUS), Some(7));
        assert_eq!(frame_length(1), None);
        assert_eq!(frame_length(CELL_VOLTAGES), Some(38));
        assert_eq!(frame_length(SERIAL), Some(10));
        assert_eq!(frame_length(POWER_OFF), Some(8));
        assert_eq!(frame_length(14), None);
        assert_eq!(frame_length(17), Some(10));
        assert_eq!(frame_length(18), None);
        assert_eq!(frame_length(0xFF), None);
    }

    #[test]
    fn replay_policy() {
        assert_eq!(replay_timeout(STATUS), Some(Duration::from_millis(500)));
        assert_eq!(replay_timeout(CURRENT), Some(Duration::from_millis(500)));
        assert_eq!(replay_timeout(POWER_OFF), None);
        assert_eq!(replay_timeout(SOC), Some(Duration::from_millis(3000)));
        assert_eq!(replay_timeout(16), Some(Duration::from_millis(3000)));
    }
}
