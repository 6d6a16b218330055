use embedded_can::StandardId;

use crate::mailbox::Code;

/* Message buffer words */

const CODE_SHIFT: u32 = 24;
const CODE_MASK: u32 = 0xF << CODE_SHIFT;
const DLC_SHIFT: u32 = 16;
const STD_ID_SHIFT: u32 = 18;

/// Length code of a classical 8-byte frame.
pub const DLC_8: u32 = 8;

pub fn id_to_word(id: StandardId) -> u32 {
    (id.as_raw() as u32) << STD_ID_SHIFT
}

pub fn id_from_word(word: u32) -> StandardId {
    unwrap!(StandardId::new(((word >> STD_ID_SHIFT) & 0x7FF) as u16))
}

/// Control/status word of a classical data frame: no extended data length,
/// no bit rate switch, no error state indicator, no remote request and a
/// standard identifier. Writing it hands the buffer to the controller.
pub fn tx_descriptor(code: Code) -> u32 {
    ((u8::from(code) as u32) << CODE_SHIFT) | (DLC_8 << DLC_SHIFT)
}

/// Returns the raw code nibble when it is not a known [`Code`].
pub fn code_of(cs: u32) -> Result<Code, u8> {
    let raw = ((cs & CODE_MASK) >> CODE_SHIFT) as u8;

    Code::try_from(raw).map_err(|_| raw)
}

/* Filter table */

const FILTER_ID_SHIFT: u32 = 19;
const FILTER_RTR: u32 = 1 << 31;
const FILTER_IDE: u32 = 1 << 30;

/// Format A filter element accepting standard data frames with `id`.
pub fn filter_element(id: StandardId) -> u32 {
    (id.as_raw() as u32) << FILTER_ID_SHIFT
}

/// Individual mask comparing all 11 identifier bits, plus the remote and
/// extended flags so neither kind slips through a standard data filter.
pub const FILTER_EXACT_MASK: u32 = FILTER_RTR | FILTER_IDE | (0x7FF << FILTER_ID_SHIFT);

/* Payload */

pub fn words_to_bytes(words: [u32; 2]) -> [u8; 8] {
    let mut bytes = [0u8; 8];

    bytes[..4].copy_from_slice(&words[0].to_be_bytes());
    bytes[4..].copy_from_slice(&words[1].to_be_bytes());

    bytes
}

pub fn bytes_to_words(bytes: &[u8; 8]) -> [u32; 2] {
    [
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
    ]
}
