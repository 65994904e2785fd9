//! Variable-length integer encoding used by relation and tag payloads.
//!
//! `VInt` stores 7 bits per byte, least significant group first, with the high
//! bit set on every byte except the last. `ZInt` zig-zag maps a signed value
//! onto an unsigned one first so that small negative offsets stay small.

use std::io::{self, Cursor, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SpanlabError};

/// Encode a u32 value using variable-length encoding.
pub fn encode_vint(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a u32 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_vint(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result = 0u32;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 32 {
            return Err(SpanlabError::payload("VInt overflow"));
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(SpanlabError::payload("Incomplete VInt"))
}

/// Zig-zag encode a signed value.
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Reverse [`zigzag_encode`].
pub fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// Write a VInt to a writer, returning the number of bytes written.
pub fn write_vint<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    let bytes = encode_vint(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Write a zig-zag encoded VInt to a writer.
pub fn write_zint<W: Write>(writer: &mut W, value: i32) -> Result<usize> {
    write_vint(writer, zigzag_encode(value))
}

/// Write a single raw byte.
pub fn write_byte<W: Write>(writer: &mut W, value: u8) -> Result<usize> {
    writer.write_u8(value)?;
    Ok(1)
}

/// Read a VInt from a reader.
///
/// Running out of bytes in the middle of a value is reported as a payload
/// error rather than an I/O error: payloads are always fully in memory.
pub fn read_vint(reader: &mut Cursor<&[u8]>) -> Result<u32> {
    let mut result = 0u32;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8().map_err(truncated)?;

        if shift >= 32 {
            return Err(SpanlabError::payload("VInt overflow"));
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

/// Read a zig-zag encoded VInt from a reader.
pub fn read_zint(reader: &mut Cursor<&[u8]>) -> Result<i32> {
    read_vint(reader).map(zigzag_decode)
}

/// Read a single raw byte.
pub fn read_byte(reader: &mut Cursor<&[u8]>) -> Result<u8> {
    reader.read_u8().map_err(truncated)
}

/// Whether all bytes of the underlying slice have been consumed.
pub fn at_eof(reader: &Cursor<&[u8]>) -> bool {
    reader.position() as usize >= reader.get_ref().len()
}

fn truncated(err: io::Error) -> SpanlabError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SpanlabError::payload("Incomplete VInt")
    } else {
        SpanlabError::from(err)
    }
}
