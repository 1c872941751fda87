//! Fixed-width little-endian stream helpers for the binary store format.
//!
//! A short read is a `Format` error (the stream ended before the record did);
//! any other I/O failure passes through as `Io`.

use std::io::{self, Read, Write};

use crate::error::{Result, SdmError};

fn map_read_err(err: io::Error) -> SdmError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        SdmError::Format("unexpected end of stream".to_string())
    } else {
        SdmError::Io(err)
    }
}

pub fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(map_read_err)
}

pub fn write_u8(writer: &mut impl Write, value: u8) -> Result<()> {
    writer.write_all(&[value])?;
    Ok(())
}

pub fn read_u8(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(buf[0])
}

pub fn write_i8(writer: &mut impl Write, value: i8) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_i8(reader: &mut impl Read) -> Result<i8> {
    let mut buf = [0u8; 1];
    read_exact(reader, &mut buf)?;
    Ok(i8::from_le_bytes(buf))
}

pub fn write_u16(writer: &mut impl Write, value: u16) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn write_u32(writer: &mut impl Write, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn write_i32(writer: &mut impl Write, value: i32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_i32(reader: &mut impl Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(reader, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_round_trip_widths() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 0xAB).unwrap();
        write_i8(&mut buf, -5).unwrap();
        write_u16(&mut buf, 0xBEEF).unwrap();
        write_u32(&mut buf, 0xDEADBEEF).unwrap();
        write_i32(&mut buf, -123456).unwrap();

        let mut cur = Cursor::new(buf);
        assert_eq!(read_u8(&mut cur).unwrap(), 0xAB);
        assert_eq!(read_i8(&mut cur).unwrap(), -5);
        assert_eq!(read_u16(&mut cur).unwrap(), 0xBEEF);
        assert_eq!(read_u32(&mut cur).unwrap(), 0xDEADBEEF);
        assert_eq!(read_i32(&mut cur).unwrap(), -123456);
    }

    #[test]
    fn test_short_read_is_format_error() {
        let mut cur = Cursor::new(vec![0u8; 3]);
        let err = read_u32(&mut cur).unwrap_err();
        assert!(matches!(err, SdmError::Format(_)));
    }
}
