//! Device datagram codec
//!
//! Sensors speak a compact little-endian protocol. The first byte selects
//! the frame layout:
//!
//! ```text
//! Register  [0x00][type: u8][chip id: u32 LE]    6 bytes
//! Update    [type != 0][value: f32 LE]           5 bytes
//! ```
//!
//! Replies are a single byte, see [`Ack`].

use thiserror::Error;

use crate::devices::DeviceType;

/// Discriminator byte of a Register frame
pub const REGISTER_DISCRIMINATOR: u8 = 0x00;

/// Length of a Register frame in bytes
pub const REGISTER_LEN: usize = 6;

/// Length of an Update frame in bytes
pub const UPDATE_LEN: usize = 5;

/// A decoded device frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// Announce a sensor behind the sender's address
    Register {
        device_type: DeviceType,
        chip_id: u32,
    },
    /// New reading for a previously registered sensor
    Update { device_type: DeviceType, value: f32 },
}

/// Why a datagram could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Zero-length datagram
    #[error("empty datagram")]
    Empty,

    /// Datagram length does not match the layout its discriminator implies
    #[error("{kind} frame expects {expected} bytes, got {actual}")]
    Length {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Single-byte reply sent back to a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ack {
    /// Frame applied
    Accepted = 0xFF,
    /// Update for a device that never registered from this address
    Rejected = 0x00,
}

impl Ack {
    /// Wire representation of the reply
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a reply byte
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xFF => Some(Self::Accepted),
            0x00 => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl Frame {
    /// Decode a datagram payload
    ///
    /// Fails closed: nothing is returned unless the whole frame is present
    /// and no bytes trail it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is empty or has the wrong length
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let (&head, rest) = payload.split_first().ok_or(DecodeError::Empty)?;

        if head == REGISTER_DISCRIMINATOR {
            let &[code, a, b, c, d] = rest else {
                return Err(DecodeError::Length {
                    kind: "register",
                    expected: REGISTER_LEN,
                    actual: payload.len(),
                });
            };
            Ok(Self::Register {
                device_type: DeviceType::from_code(code),
                chip_id: u32::from_le_bytes([a, b, c, d]),
            })
        } else {
            let &[a, b, c, d] = rest else {
                return Err(DecodeError::Length {
                    kind: "update",
                    expected: UPDATE_LEN,
                    actual: payload.len(),
                });
            };
            Ok(Self::Update {
                device_type: DeviceType::from_code(head),
                value: f32::from_le_bytes([a, b, c, d]),
            })
        }
    }

    /// Encode the frame into its wire form
    ///
    /// Code 0 is the Register discriminator, so an Update for
    /// [`DeviceType::Unknown`] has no valid wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::Register {
                device_type,
                chip_id,
            } => {
                let mut out = Vec::with_capacity(REGISTER_LEN);
                out.push(REGISTER_DISCRIMINATOR);
                out.push(device_type.code());
                out.extend_from_slice(&chip_id.to_le_bytes());
                out
            }
            Self::Update { device_type, value } => {
                let mut out = Vec::with_capacity(UPDATE_LEN);
                out.push(device_type.code());
                out.extend_from_slice(&value.to_le_bytes());
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_register() {
        let frame = Frame::decode(&[0x00, 0x01, 42, 0, 0, 0]).unwrap();
        assert_eq!(
            frame,
            Frame::Register {
                device_type: DeviceType::Temperature,
                chip_id: 42,
            }
        );
    }

    #[test]
    fn decode_update() {
        let mut payload = vec![0x02];
        payload.extend_from_slice(&36.5f32.to_le_bytes());

        let frame = Frame::decode(&payload).unwrap();
        assert_eq!(
            frame,
            Frame::Update {
                device_type: DeviceType::Humidity,
                value: 36.5,
            }
        );
    }

    #[test]
    fn short_register_is_rejected() {
        let err = Frame::decode(&[0x00, 0x01, 42]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Length {
                kind: "register",
                expected: 6,
                actual: 3,
            }
        );
    }

    #[test]
    fn short_update_is_rejected() {
        assert!(Frame::decode(&[0x01, 0x00, 0x00]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        assert!(Frame::decode(&[0x00, 0x01, 42, 0, 0, 0, 0]).is_err());
        assert!(Frame::decode(&[0x01, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn empty_is_rejected() {
        assert_eq!(Frame::decode(&[]).unwrap_err(), DecodeError::Empty);
    }

    #[test]
    fn unknown_type_code_is_preserved() {
        let frame = Frame::decode(&[0x00, 0x07, 1, 0, 0, 0]).unwrap();
        assert_eq!(
            frame,
            Frame::Register {
                device_type: DeviceType::Other(7),
                chip_id: 1,
            }
        );
    }

    #[test]
    fn encode_matches_wire_layout() {
        let register = Frame::Register {
            device_type: DeviceType::Temperature,
            chip_id: 0x0102_0304,
        };
        assert_eq!(register.encode(), vec![0x00, 0x01, 0x04, 0x03, 0x02, 0x01]);

        let update = Frame::Update {
            device_type: DeviceType::Humidity,
            value: 36.5,
        };
        let bytes = update.encode();
        assert_eq!(bytes.len(), UPDATE_LEN);
        assert_eq!(Frame::decode(&bytes).unwrap(), update);
    }

    #[test]
    fn ack_bytes() {
        assert_eq!(Ack::Accepted.as_byte(), 0xFF);
        assert_eq!(Ack::Rejected.as_byte(), 0x00);
        assert_eq!(Ack::from_byte(0xFF), Some(Ack::Accepted));
        assert_eq!(Ack::from_byte(0x00), Some(Ack::Rejected));
        assert_eq!(Ack::from_byte(0x10), None);
    }
}
