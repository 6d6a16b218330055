use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Message buffer `CODE` field (bits 27:24 of the control/status word).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Code {
    /// Receive buffer not taking part in matching
    RxInactive = 0b0000,
    /// Receive buffer holding a frame
    RxFull = 0b0010,
    /// Receive buffer waiting for a frame
    RxEmpty = 0b0100,
    /// Receive buffer overwritten before it was read
    RxOverrun = 0b0110,
    /// Receive buffer answering remote requests
    RxRanswer = 0b1010,
    /// Transmit buffer parked, not taking part in arbitration
    TxInactive = 0b1000,
    /// Transmission aborted
    TxAbort = 0b1001,
    /// Transmit the frame once
    TxData = 0b1100,
    /// Transmit response to a remote request
    TxTanswer = 0b1110,
}

/// Words in one 8-byte message buffer.
pub const WORDS_PER_BUFFER: u8 = 4;

/// Word offsets inside a message buffer.
pub(crate) mod word {
    /// Control and status
    pub const CS: u8 = 0;
    /// Identifier
    pub const ID: u8 = 1;
    /// Payload bytes 0-3
    pub const DATA0: u8 = 2;
    /// Payload bytes 4-7
    pub const DATA1: u8 = 3;
}

/// Buffers reserved by the receive FIFO engine, its output is buffer 0.
pub const FIFO_BUFFERS: u8 = 6;

/// RAM word holding filter table element 0.
pub const FILTER_TABLE_WORD: u8 = FIFO_BUFFERS * WORDS_PER_BUFFER;

/// Buffer holding the receive FIFO output.
pub const FIFO_OUTPUT: u8 = 0;

/// First buffer left free after the FIFO and a filter table of `rffn`.
///
/// The table holds `8 * (rffn + 1)` single-word elements, so it spans
/// `2 * (rffn + 1)` buffers.
pub const fn first_free_buffer(rffn: u8) -> u8 {
    FIFO_BUFFERS + 2 * (rffn + 1)
}

/// Buffer used for transmission with the 8-element filter table.
pub const TX_MAILBOX: u8 = first_free_buffer(0);

/// RAM word index of `word` in buffer `buffer`.
pub const fn ram_word(buffer: u8, word: u8) -> u8 {
    buffer * WORDS_PER_BUFFER + word
}
