use std::io::{Read, Write};

use super::{ProtocolError, wire};

/// Total size of the connection header on the wire, in bytes.
pub const HEADER_SIZE: u32 = 48;

/// Capacity of the fixed file-name field.
pub const FILE_NAME_CAP: usize = 32;

/// Per-connection framing record sent ahead of the equation payload.
///
/// All multi-byte fields travel big-endian regardless of the envelope
/// framing that follows. [`decode`](Self::decode) performs no semantic
/// checks; the dispatcher calls [`validate`](Self::validate) and answers
/// violations with the [`rejection`](Self::rejection) form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHeader {
    pub header_size: u32,
    pub name_len: u32,
    pub total_payload_size: u64,
    pub file_name: [u8; FILE_NAME_CAP],
}

impl ConnectionHeader {
    /// Builds a well-formed header for `file_name`, truncating the name to
    /// the field capacity.
    pub fn new(file_name: &str, total_payload_size: u64) -> Self {
        let bytes = file_name.as_bytes();
        let len = bytes.len().min(FILE_NAME_CAP);
        let mut name = [0; FILE_NAME_CAP];
        name[..len].copy_from_slice(&bytes[..len]);

        Self {
            header_size: HEADER_SIZE,
            name_len: len as u32,
            total_payload_size,
            file_name: name,
        }
    }

    /// Reads the header fields in strict wire order, swapping every
    /// multi-byte field from big-endian. Fails on any short read, returning
    /// no partial structure.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, ProtocolError> {
        let framing = wire::Framing::Network;

        let header_size = framing.read_u32(reader)?;
        let name_len = framing.read_u32(reader)?;
        let total_payload_size = framing.read_u64(reader)?;
        let file_name = wire::read_array::<FILE_NAME_CAP, _>(reader)?;

        Ok(Self {
            header_size,
            name_len,
            total_payload_size,
            file_name,
        })
    }

    /// Writes the header in wire order.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        let framing = wire::Framing::Network;

        framing.write_u32(writer, self.header_size)?;
        framing.write_u32(writer, self.name_len)?;
        framing.write_u64(writer, self.total_payload_size)?;
        writer.write_all(&self.file_name)?;
        Ok(())
    }

    /// Checks the declared sizes against the protocol constants.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.header_size != HEADER_SIZE {
            return Err(ProtocolError::HeaderSizeMismatch {
                declared: self.header_size,
                expected: HEADER_SIZE,
            });
        }
        if self.name_len as usize > FILE_NAME_CAP {
            return Err(ProtocolError::NameTooLong {
                declared: self.name_len,
                capacity: FILE_NAME_CAP as u32,
            });
        }
        Ok(())
    }

    /// Error-reply form: the same header with the name length forced to
    /// zero and the file name blanked.
    pub fn rejection(&self) -> Self {
        Self {
            header_size: self.header_size,
            name_len: 0,
            total_payload_size: self.total_payload_size,
            file_name: [0; FILE_NAME_CAP],
        }
    }

    /// File name as declared by `name_len`, lossily decoded for display.
    pub fn file_name(&self) -> String {
        let len = (self.name_len as usize).min(FILE_NAME_CAP);
        String::from_utf8_lossy(&self.file_name[..len]).into_owned()
    }
}
