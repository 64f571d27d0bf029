//! Length-prefixed index strings
//!
//! Strings carry an `i32` length that includes the NUL terminator. A positive
//! length is a count of single-byte characters, a negative length a count of
//! UTF-16LE code units, and zero an empty string.

use std::io::{Read, Seek, Write};

use binrw::{BinRead, BinResult, BinWrite, Endian};

/// Longest string accepted from an index, in characters
pub const MAX_STRING_LEN: usize = 1 << 16;

/// Length-prefixed, NUL-terminated string
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PakString(pub String);

impl PakString {
    /// Consume into the inner string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for PakString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl BinRead for PakString {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let len = i32::read_options(reader, endian, ())?;
        if len == 0 {
            return Ok(Self::default());
        }

        let units = len.unsigned_abs() as usize;
        if units > MAX_STRING_LEN {
            return Err(binrw::Error::AssertFail {
                pos,
                message: format!("string length {units} exceeds {MAX_STRING_LEN}"),
            });
        }

        let text = if len > 0 {
            let mut bytes = vec![0u8; units];
            reader.read_exact(&mut bytes)?;
            if bytes.pop() != Some(0) {
                return Err(missing_terminator(pos));
            }
            String::from_utf8(bytes).map_err(|e| binrw::Error::AssertFail {
                pos,
                message: format!("string is not UTF-8: {e}"),
            })?
        } else {
            let mut code_units = Vec::with_capacity(units);
            for _ in 0..units {
                code_units.push(u16::read_options(reader, endian, ())?);
            }
            if code_units.pop() != Some(0) {
                return Err(missing_terminator(pos));
            }
            String::from_utf16(&code_units).map_err(|e| binrw::Error::AssertFail {
                pos,
                message: format!("string is not UTF-16: {e}"),
            })?
        };

        Ok(Self(text))
    }
}

impl BinWrite for PakString {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        endian: Endian,
        (): Self::Args<'_>,
    ) -> BinResult<()> {
        if self.0.is_empty() {
            return 0i32.write_options(writer, endian, ());
        }

        if self.0.is_ascii() {
            let len = i32::try_from(self.0.len() + 1).map_err(|_| too_long(writer))?;
            len.write_options(writer, endian, ())?;
            writer.write_all(self.0.as_bytes())?;
            writer.write_all(&[0])?;
        } else {
            let mut units: Vec<u16> = self.0.encode_utf16().collect();
            units.push(0);
            let len = i32::try_from(units.len()).map_err(|_| too_long(writer))?;
            (-len).write_options(writer, endian, ())?;
            for unit in units {
                unit.write_options(writer, endian, ())?;
            }
        }
        Ok(())
    }
}

fn missing_terminator(pos: u64) -> binrw::Error {
    binrw::Error::AssertFail {
        pos,
        message: "string is missing its NUL terminator".to_string(),
    }
}

fn too_long<W: Seek>(writer: &mut W) -> binrw::Error {
    binrw::Error::AssertFail {
        pos: writer.stream_position().unwrap_or_default(),
        message: "string too long".to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use binrw::{BinReaderExt, BinWriterExt};
    use std::io::Cursor;

    fn round_trip(value: &str) -> (Vec<u8>, PakString) {
        let mut cursor = Cursor::new(Vec::new());
        cursor
            .write_le(&PakString::from(value))
            .expect("Write should succeed");
        let bytes = cursor.into_inner();
        let parsed: PakString = Cursor::new(&bytes).read_le().expect("Read should succeed");
        (bytes, parsed)
    }

    #[test]
    fn test_ascii_string_layout() {
        let (bytes, parsed) = round_trip("../../../Game/");
        assert_eq!(&bytes[..4], &15i32.to_le_bytes());
        assert_eq!(bytes.last(), Some(&0));
        assert_eq!(parsed.0, "../../../Game/");
    }

    #[test]
    fn test_utf16_string_uses_negative_length() {
        let (bytes, parsed) = round_trip("Données/Ünïcode.txt");
        let len = i32::from_le_bytes(bytes[..4].try_into().expect("4 bytes"));
        assert!(len < 0);
        assert_eq!(parsed.0, "Données/Ünïcode.txt");
    }

    #[test]
    fn test_empty_string() {
        let (bytes, parsed) = round_trip("");
        assert_eq!(bytes, 0i32.to_le_bytes());
        assert!(parsed.0.is_empty());
    }

    #[test]
    fn test_missing_terminator_rejected() {
        let mut bytes = 3i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let result: BinResult<PakString> = Cursor::new(&bytes).read_le();
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_length_rejected() {
        let bytes = i32::MAX.to_le_bytes();
        let result: BinResult<PakString> = Cursor::new(&bytes).read_le();
        assert!(result.is_err());
    }
}
