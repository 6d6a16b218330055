use embedded_can::{Id, StandardId};

use crate::codec::{bytes_to_words, words_to_bytes};

/// Highest standard (11-bit) identifier.
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// A classical CAN data frame with a standard identifier and exactly 8 bytes
/// of payload.
///
/// The payload is handled as two 32-bit words, word 0 carrying bytes 0-3 in
/// big-endian order, which is how the controller lays them out on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    #[cfg_attr(feature = "defmt", defmt(Debug2Format))]
    id: StandardId,
    data: [u8; 8],
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            id: StandardId::ZERO,
            data: [0; 8],
        }
    }
}

impl Frame {
    /// Creates a frame from a raw identifier and two payload words. `id`
    /// must be in the range 0..=0x7FF or else `None` will be returned
    /// instead.
    pub fn new(id: u32, payload: [u32; 2]) -> Option<Self> {
        if id > MAX_STANDARD_ID {
            return None;
        }

        Some(Self::from_parts(
            StandardId::new(id as u16)?,
            payload,
        ))
    }

    pub fn from_parts(id: StandardId, payload: [u32; 2]) -> Self {
        Self {
            id,
            data: words_to_bytes(payload),
        }
    }

    /// Gets the identifier as the raw 32-bit value used by the driver API
    pub fn raw_id(&self) -> u32 {
        self.id.as_raw() as u32
    }

    pub fn standard_id(&self) -> StandardId {
        self.id
    }

    /// Gets the two payload words
    pub fn payload(&self) -> [u32; 2] {
        bytes_to_words(&self.data)
    }

    pub fn bytes(&self) -> &[u8; 8] {
        &self.data
    }
}

/// Only standard data frames with 8 bytes can be built, anything else
/// returns `None`.
impl embedded_can::Frame for Frame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Some(Self {
                id,
                data: data.try_into().ok()?,
            }),
            Id::Extended(_) => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}
