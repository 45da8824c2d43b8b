//! Byte-level field primitives shared by the protocol decoders.

use std::io::{self, Read, Write};

/// Byte order applied to the multi-byte fields of a framing.
///
/// Live connections transmit big-endian; equation files on disk are laid
/// out in host byte order. Single-byte fields are unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Big-endian fields, used on live connections.
    Network,
    /// Host-order fields, used by on-disk equation files.
    File,
}

impl Framing {
    pub(crate) fn read_u16<R: Read>(self, reader: &mut R) -> io::Result<u16> {
        let buf = read_array::<2, _>(reader)?;
        Ok(match self {
            Framing::Network => u16::from_be_bytes(buf),
            Framing::File => u16::from_ne_bytes(buf),
        })
    }

    pub(crate) fn read_u32<R: Read>(self, reader: &mut R) -> io::Result<u32> {
        let buf = read_array::<4, _>(reader)?;
        Ok(match self {
            Framing::Network => u32::from_be_bytes(buf),
            Framing::File => u32::from_ne_bytes(buf),
        })
    }

    pub(crate) fn read_u64<R: Read>(self, reader: &mut R) -> io::Result<u64> {
        let buf = read_array::<8, _>(reader)?;
        Ok(match self {
            Framing::Network => u64::from_be_bytes(buf),
            Framing::File => u64::from_ne_bytes(buf),
        })
    }

    pub(crate) fn write_u16<W: Write>(self, writer: &mut W, value: u16) -> io::Result<()> {
        match self {
            Framing::Network => writer.write_all(&value.to_be_bytes()),
            Framing::File => writer.write_all(&value.to_ne_bytes()),
        }
    }

    pub(crate) fn write_u32<W: Write>(self, writer: &mut W, value: u32) -> io::Result<()> {
        match self {
            Framing::Network => writer.write_all(&value.to_be_bytes()),
            Framing::File => writer.write_all(&value.to_ne_bytes()),
        }
    }

    pub(crate) fn write_u64<W: Write>(self, writer: &mut W, value: u64) -> io::Result<()> {
        match self {
            Framing::Network => writer.write_all(&value.to_be_bytes()),
            Framing::File => writer.write_all(&value.to_ne_bytes()),
        }
    }
}

/// Reads exactly `N` bytes; partial reads are accumulated and only stream
/// exhaustion or an I/O error fails the call.
pub(crate) fn read_array<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    Ok(read_array::<1, _>(reader)?[0])
}

pub(crate) fn write_u8<W: Write>(writer: &mut W, value: u8) -> io::Result<()> {
    writer.write_all(&[value])
}
