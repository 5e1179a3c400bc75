// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! Binary (de)serialization of an attribute map.
//!
//! The wire shape is a flat sequence of `(u32 little-endian length, bytes)`
//! fields, key then value, with no escaping and no trailing delimiter. A
//! zero-length key acts as a terminator when present. The format must be
//! readable by a process instance that did not write it, so it carries no
//! version header and no in-memory artifacts.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

/// Fields larger than this are rejected on write and treated as corruption
/// on read, keeping the two directions symmetric.
const MAX_FIELD_LEN: u32 = 16 * 1024 * 1024;

/// Serializes `attributes` in sorted-key order, so equal maps produce equal
/// bytes regardless of hash seeding.
pub fn serialize_into<W: Write>(
    attributes: &HashMap<String, String>,
    writer: &mut W,
) -> io::Result<()> {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();
    for key in keys {
        write_field(writer, key.as_bytes())?;
        write_field(writer, attributes[key].as_bytes())?;
    }
    Ok(())
}

pub fn serialize_to_file(
    attributes: &HashMap<String, String>,
    path: &Path,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serialize_into(attributes, &mut writer)?;
    writer.flush()
}

fn write_field<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    if bytes.len() > MAX_FIELD_LEN as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "attribute field too long",
        ));
    }
    writer.write_u32::<LittleEndian>(bytes.len() as u32)?;
    writer.write_all(bytes)
}

/// Reads key/value pairs until end-of-file or a zero-length key; both are
/// normal termination. Anything else that cuts a field short is an error.
pub fn deserialize_from<R: Read>(reader: &mut R) -> io::Result<HashMap<String, String>> {
    let mut attributes = HashMap::new();
    loop {
        let key = match read_key(reader)? {
            None => break,
            Some(key) => key,
        };
        let value = read_value(reader)?;
        attributes.insert(into_string(key)?, into_string(value)?);
    }
    Ok(attributes)
}

/// Deserializes the attribute file at `path`.
///
/// A missing file means "no attributes"; a malformed one is treated the
/// same way, not as an error.
pub fn read_attributes_file(path: &Path) -> HashMap<String, String> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            debug!("could not open attribute file {}: {e}", path.display());
            return HashMap::new();
        }
    };
    match deserialize_from(&mut BufReader::new(file)) {
        Ok(attributes) => attributes,
        Err(e) => {
            debug!("malformed attribute file {}: {e}", path.display());
            HashMap::new()
        }
    }
}

/// Returns None on clean end-of-file or a zero-length key. End-of-file is
/// only legal at a key boundary, so the length prefix is read byte-by-byte
/// to tell "no more entries" apart from "truncated entry".
fn read_key<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated key length",
            ));
        }
        filled += n;
    }
    let len = u32::from_le_bytes(len_buf);
    if len == 0 {
        return Ok(None);
    }
    read_bytes(reader, len).map(Some)
}

fn read_value<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()?;
    read_bytes(reader, len)
}

fn read_bytes<R: Read>(reader: &mut R, len: u32) -> io::Result<Vec<u8>> {
    if len > MAX_FIELD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "implausible attribute field length",
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

fn into_string(bytes: Vec<u8>) -> io::Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "attribute is not UTF-8"))
}
