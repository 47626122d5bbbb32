//! Borrowed view over one BMS protocol frame

/// Preamble + type byte + checksum.
pub const FRAME_OVERHEAD: usize = 6;

/// Offset of the type byte, right after the 3 byte preamble.
const TYPE_OFFSET: usize = 3;

/// Offset of the first payload byte.
const PAYLOAD_OFFSET: usize = 4;

/// Additive 16-bit checksum over `bytes`.
///
/// This is a plain wrapping sum, not a CRC. The motor controller validates frames the
/// same way, so the arithmetic has to match bit for bit.
pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0u16, |sum, &b| sum.wrapping_add(b as u16))
}

/// One protocol frame: `[preamble(3) | type(1) | payload(n) | checksum(2)]`.
///
/// The frame borrows its bytes from whoever framed it (the relay's accumulation buffer or a
/// replay copy) and is validated once on construction. Rewriters may mutate the payload in
/// place; [`Frame::recalculate_checksum`] must run before the bytes leave the relay.
#[derive(Debug)]
pub struct Frame<'a> {
    bytes: &'a mut [u8],
    valid: bool,
    should_forward: bool,
}

impl<'a> Frame<'a> {
    /// Wrap `bytes` and validate the trailing checksum.
    pub fn new(bytes: &'a mut [u8]) -> Self {
        let valid = Self::validate(bytes);
        Self { bytes, valid, should_forward: true }
    }

    fn validate(bytes: &[u8]) -> bool {
        if bytes.len() < FRAME_OVERHEAD {
            return false;
        }
        let split = bytes.len() - 2;
        let expected = u16::from_be_bytes([bytes[split], bytes[split + 1]]);
        expected.wrapping_sub(checksum(&bytes[..split])) == 0
    }

    /// Whether the checksum matched when the frame was constructed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Packet type, `None` for a frame that failed validation.
    pub fn packet_type(&self) -> Option<u8> {
        self.valid.then(|| self.bytes[TYPE_OFFSET])
    }

    pub fn payload(&self) -> Option<&[u8]> {
        if !self.valid {
            return None;
        }
        let end = self.bytes.len() - 2;
        Some(&self.bytes[PAYLOAD_OFFSET..end])
    }

    pub fn payload_mut(&mut self) -> Option<&mut [u8]> {
        if !self.valid {
            return None;
        }
        let end = self.bytes.len() - 2;
        Some(&mut self.bytes[PAYLOAD_OFFSET..end])
    }

    pub fn payload_len(&self) -> Option<usize> {
        self.valid.then(|| self.bytes.len() - FRAME_OVERHEAD)
    }

    /// Every byte of the frame, preamble and checksum included.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn should_forward(&self) -> bool {
        self.should_forward
    }

    pub fn set_should_forward(&mut self, should_forward: bool) {
        self.should_forward = should_forward;
    }

    /// Rewrite the trailing checksum after a payload mutation.
    ///
    /// No-op on an invalid frame: a corrupt frame is never turned into a valid one.
    pub fn recalculate_checksum(&mut self) {
        if !self.valid {
            return;
        }
        let split = self.bytes.len() - 2;
        let sum = checksum(&self.bytes[..split]);
        self.bytes[split..].copy_from_slice(&sum.to_be_bytes());
    }
}
