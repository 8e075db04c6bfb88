//! Wire-format definitions for protocol datagrams.
//!
//! Every datagram exchanged between peers is a [`Message`]: either a
//! [`DataPacket`] carrying up to [`MAX_LINES`] lines of one item, or an
//! [`Ack`] naming the sequence number it acknowledges.  This module is
//! responsible for:
//! - Defining the fixed on-wire binary layout of both kinds.
//! - Serialising a [`Message`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Message`], returning errors
//!   for malformed, truncated or corrupted input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! All integers are **big-endian** `i32`.  Strings are NUL-padded to their
//! field width; the last byte of every string field is always NUL.
//!
//! ```text
//! Data (815 bytes)
//! +------+----------+--------------+------------+-------------------+----------+----------+
//! | kind | name[32] | start_offset | line_count | lines[3][256]     | sequence | checksum |
//! |  u8  |          |     i32      |    i32     |                   |   i32    |   u16    |
//! +------+----------+--------------+------------+-------------------+----------+----------+
//!
//! Ack (7 bytes)
//! +------+----------------+----------+
//! | kind | acked_sequence | checksum |
//! |  u8  |      i32       |   u16    |
//! +------+----------------+----------+
//! ```
//!
//! The checksum is the RFC 1071 Internet checksum over the whole datagram
//! with the checksum field zeroed.

use thiserror::Error;

/// Kind tags stored in the first byte of every datagram.
pub mod kind {
    /// A chunk of item lines, or the END control packet.
    pub const DATA: u8 = 0x01;
    /// An acknowledgment.
    pub const ACK: u8 = 0x02;
}

/// Longest item name that fits the name field (one byte is reserved for NUL).
pub const MAX_NAME_LEN: usize = NAME_FIELD - 1;
/// Longest line that fits a line field (one byte is reserved for NUL).
pub const MAX_LINE_LEN: usize = LINE_FIELD - 1;
/// Maximum number of lines carried by one data packet.
pub const MAX_LINES: usize = 3;

/// Item name of the end-of-phase control packet.
pub const END_ITEM: &str = "END";
/// Acknowledgment sentinel confirming the END of the upload phase.
pub const UPLOAD_END_ACK: i32 = -2;
/// Acknowledgment sentinel confirming the END of the download phase.
pub const DOWNLOAD_END_ACK: i32 = -1;

const NAME_FIELD: usize = 32;
const LINE_FIELD: usize = 256;

// Byte offsets within a data datagram.
const OFF_KIND: usize = 0;
const OFF_NAME: usize = 1;
const OFF_START: usize = OFF_NAME + NAME_FIELD;
const OFF_COUNT: usize = OFF_START + 4;
const OFF_LINES: usize = OFF_COUNT + 4;
const OFF_SEQ: usize = OFF_LINES + MAX_LINES * LINE_FIELD;
const OFF_DATA_CHECKSUM: usize = OFF_SEQ + 4;

/// Byte length of an encoded data datagram.
pub const DATA_LEN: usize = OFF_DATA_CHECKSUM + 2;

// Byte offsets within an ack datagram.
const OFF_ACKED: usize = 1;
const OFF_ACK_CHECKSUM: usize = OFF_ACKED + 4;

/// Byte length of an encoded ack datagram.
pub const ACK_LEN: usize = OFF_ACK_CHECKSUM + 2;

/// One chunk of an item, or the END control packet.
///
/// `line_count` is not stored separately: it is always `lines.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Item the lines belong to, or [`END_ITEM`].
    pub item: String,
    /// Index within the item of the first carried line.
    pub start_offset: i32,
    /// Up to [`MAX_LINES`] lines, without line terminators.
    pub lines: Vec<String>,
    /// Phase-local sequence number.
    pub sequence: i32,
}

impl DataPacket {
    /// Build the END control packet for the given sequence number.
    pub fn end(sequence: i32) -> Self {
        Self {
            item: END_ITEM.to_string(),
            start_offset: 0,
            lines: Vec::new(),
            sequence,
        }
    }

    /// `true` for the end-of-phase control packet.
    pub fn is_end(&self) -> bool {
        self.item == END_ITEM
    }

    /// Number of lines on the wire.
    pub fn line_count(&self) -> i32 {
        self.lines.len() as i32
    }
}

/// Acknowledgment of one sequence number, or of END via a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub acked: i32,
}

/// A complete protocol datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Data(DataPacket),
    Ack(Ack),
}

impl Message {
    /// Serialise this message into a newly allocated byte vector.
    ///
    /// Fails when a string does not fit its field or when more than
    /// [`MAX_LINES`] lines are attached.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Message::Data(pkt) => encode_data(pkt),
            Message::Ack(ack) => {
                let mut buf = vec![0u8; ACK_LEN];
                buf[OFF_KIND] = kind::ACK;
                buf[OFF_ACKED..OFF_ACKED + 4].copy_from_slice(&ack.acked.to_be_bytes());
                seal(&mut buf, OFF_ACK_CHECKSUM);
                Ok(buf)
            }
        }
    }

    /// Parse a [`Message`] from a raw datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is empty or carries an unknown kind tag,
    /// - the length differs from the kind's fixed size,
    /// - the checksum does not verify, or
    /// - a field is out of range (line count, negative offsets, bad UTF-8).
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        let tag = *buf.first().ok_or(PacketError::BufferTooShort)?;
        match tag {
            kind::DATA => {
                expect_len(buf, DATA_LEN)?;
                verify(buf, OFF_DATA_CHECKSUM)?;
                decode_data(buf).map(Message::Data)
            }
            kind::ACK => {
                expect_len(buf, ACK_LEN)?;
                verify(buf, OFF_ACK_CHECKSUM)?;
                Ok(Message::Ack(Ack {
                    acked: read_i32(buf, OFF_ACKED),
                }))
            }
            other => Err(PacketError::UnknownKind(other)),
        }
    }
}

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too short to contain a kind tag")]
    BufferTooShort,
    #[error("unknown datagram kind 0x{0:02x}")]
    UnknownKind(u8),
    #[error("datagram is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("checksum verification failed")]
    ChecksumFailed,
    #[error("item name is {0} bytes, at most 31 fit")]
    NameTooLong(usize),
    #[error("line is {0} bytes, at most 255 fit")]
    LineTooLong(usize),
    #[error("{0} lines attached, at most 3 fit")]
    TooManyLines(usize),
    #[error("line count {0} out of range")]
    BadLineCount(i32),
    #[error("negative {field}: {value}")]
    NegativeField { field: &'static str, value: i32 },
    #[error("string contains an embedded NUL")]
    EmbeddedNul,
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("line offset {0} does not fit the start_offset field")]
    OffsetOutOfRange(usize),
    #[error("item name {0:?} is reserved for the end-of-phase packet")]
    ReservedName(String),
    #[error("string field is not NUL-terminated")]
    Unterminated,
}

/// Check that `line` can travel in a line field.
pub fn check_line(line: &str) -> Result<(), PacketError> {
    if line.len() > MAX_LINE_LEN {
        return Err(PacketError::LineTooLong(line.len()));
    }
    if line.contains('\0') {
        return Err(PacketError::EmbeddedNul);
    }
    Ok(())
}

/// Check that `name` can travel in the name field.
pub fn check_name(name: &str) -> Result<(), PacketError> {
    if name.len() > MAX_NAME_LEN {
        return Err(PacketError::NameTooLong(name.len()));
    }
    if name.contains('\0') {
        return Err(PacketError::EmbeddedNul);
    }
    Ok(())
}

/// Check that `name` can be used for a data item: it must fit the name
/// field and must not collide with [`END_ITEM`].
pub fn check_item_name(name: &str) -> Result<(), PacketError> {
    check_name(name)?;
    if name == END_ITEM {
        return Err(PacketError::ReservedName(name.to_owned()));
    }
    Ok(())
}

fn encode_data(pkt: &DataPacket) -> Result<Vec<u8>, PacketError> {
    check_name(&pkt.item)?;
    if pkt.lines.len() > MAX_LINES {
        return Err(PacketError::TooManyLines(pkt.lines.len()));
    }

    let mut buf = vec![0u8; DATA_LEN];
    buf[OFF_KIND] = kind::DATA;
    buf[OFF_NAME..OFF_NAME + pkt.item.len()].copy_from_slice(pkt.item.as_bytes());
    buf[OFF_START..OFF_START + 4].copy_from_slice(&pkt.start_offset.to_be_bytes());
    buf[OFF_COUNT..OFF_COUNT + 4].copy_from_slice(&pkt.line_count().to_be_bytes());
    for (i, line) in pkt.lines.iter().enumerate() {
        check_line(line)?;
        let off = OFF_LINES + i * LINE_FIELD;
        buf[off..off + line.len()].copy_from_slice(line.as_bytes());
    }
    buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&pkt.sequence.to_be_bytes());
    seal(&mut buf, OFF_DATA_CHECKSUM);
    Ok(buf)
}

fn decode_data(buf: &[u8]) -> Result<DataPacket, PacketError> {
    let item = read_str(&buf[OFF_NAME..OFF_NAME + NAME_FIELD])?;
    let start_offset = non_negative("start_offset", read_i32(buf, OFF_START))?;
    let count = read_i32(buf, OFF_COUNT);
    if !(0..=MAX_LINES as i32).contains(&count) {
        return Err(PacketError::BadLineCount(count));
    }
    let lines = (0..count as usize)
        .map(|i| {
            let off = OFF_LINES + i * LINE_FIELD;
            read_str(&buf[off..off + LINE_FIELD])
        })
        .collect::<Result<Vec<_>, _>>()?;
    let sequence = non_negative("sequence", read_i32(buf, OFF_SEQ))?;

    Ok(DataPacket {
        item,
        start_offset,
        lines,
        sequence,
    })
}

fn expect_len(buf: &[u8], expected: usize) -> Result<(), PacketError> {
    if buf.len() != expected {
        return Err(PacketError::LengthMismatch {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn non_negative(field: &'static str, value: i32) -> Result<i32, PacketError> {
    if value < 0 {
        return Err(PacketError::NegativeField { field, value });
    }
    Ok(value)
}

fn read_i32(buf: &[u8], off: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[off..off + 4]);
    i32::from_be_bytes(raw)
}

/// Read a NUL-padded string field.  The last byte must be NUL.
fn read_str(field: &[u8]) -> Result<String, PacketError> {
    if field.last() != Some(&0) {
        return Err(PacketError::Unterminated);
    }
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end])
        .map(str::to_owned)
        .map_err(|_| PacketError::InvalidUtf8)
}

/// Write the checksum of `buf` (with its checksum field zero) at `off`.
fn seal(buf: &mut [u8], off: usize) {
    let csum = internet_checksum(buf);
    buf[off..off + 2].copy_from_slice(&csum.to_be_bytes());
}

/// Verify the checksum stored at `off`.
fn verify(buf: &[u8], off: usize) -> Result<(), PacketError> {
    let stored = u16::from_be_bytes([buf[off], buf[off + 1]]);
    let mut scratch = buf.to_vec();
    scratch[off..off + 2].copy_from_slice(&0u16.to_be_bytes());
    if internet_checksum(&scratch) != stored {
        return Err(PacketError::ChecksumFailed);
    }
    Ok(())
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  The caller must zero any checksum field within `data`
/// before calling this function.
fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut i = 0;

    while i + 1 < data.len() {
        sum += u32::from(u16::from_be_bytes([data[i], data[i + 1]]));
        i += 2;
    }
    // Odd trailing byte — pad with a zero byte on the right.
    if i < data.len() {
        sum += u32::from(data[i]) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
