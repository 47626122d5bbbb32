//! Core types for the BMS wire protocol.
//!
//! Every frame on the BMS line has the same envelope:
//!
//! | offset   | field    | notes                                        |
//! |----------|----------|----------------------------------------------|
//! | 0..=2    | preamble | `0xFF 0x55 0xAA`                             |
//! | 3        | type     | indexes [`FRAME_LENGTHS`]                    |
//! | 4..N-2   | payload  | type specific, big-endian multi-byte fields  |
//! | N-2..N   | checksum | big-endian additive sum of bytes `0..N-2`    |
//!
//! - [`Frame`] is a borrowed, validated view over one such frame
//! - [`packet_type`] names the types the relay understands, their lengths and replay policy
//! - [`StatusFlags`] decodes the status byte
//!
//! ## Usage Example
//!
//! ```rust
//! use bms_relay::types::{Frame, packet_type};
//!
//! let mut bytes = [0xFF, 0x55, 0xAA, 0x06, 0x01, 0x02, 0x03, 0x04, 0x02, 0x0E];
//! let mut frame = Frame::new(&mut bytes);
//! assert_eq!(frame.packet_type(), Some(packet_type::SERIAL));
//!
//! frame.payload_mut().unwrap()[0] = 0x08;
//! frame.recalculate_checksum();
//! assert!(Frame::new(&mut bytes).is_valid());
//! ```

mod frame;
pub mod packet_type;
mod status;

pub use frame::{FRAME_OVERHEAD, Frame, checksum};
pub use packet_type::{FRAME_LENGTHS, PREAMBLE, frame_length, replay_timeout};
pub use status::StatusFlags;
