//! Forward-only reader over the node's binary track format.
//!
//! Integers are big-endian and strings are prefixed by a 2 byte length, the
//! same layout a Java `DataOutput` writes. Strings are modified UTF-8, so
//! characters outside the BMP arrive as two encoded surrogates.

use crate::error::CodecError;

pub(crate) struct DataReader<'a> {
    buf: &'a [u8],
    cursor: usize
}

impl<'a> DataReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0
        }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.cursor
    }

    #[cfg(test)]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                field,
                needed: n,
                remaining: self.remaining()
            });
        }

        let bytes = &self.buf[self.cursor..self.cursor + n];
        self.cursor += n;

        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CodecError> {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N, field)?);

        Ok(out)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>(field)?[0])
    }

    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        Ok(self.read_u8(field)? != 0)
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take_array(field)?))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.take_array(field)?))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.take_array(field)?))
    }

    pub fn read_utf(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.read_u16(field)? as usize;
        let bytes = self.take(len, field)?;

        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(_) => decode_modified_utf8(bytes).ok_or(CodecError::InvalidUtf8 { field })
        }
    }

    /// Reads a boolean flag followed by a string when the flag is set.
    pub fn read_optional_utf(&mut self, field: &'static str) -> Result<Option<String>, CodecError> {
        if self.read_bool(field)? {
            self.read_utf(field).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Decodes the string layout of `DataOutput::writeUTF`: up to 3 bytes per
/// UTF-16 unit, with surrogate pairs encoded one unit at a time.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();

    while let Some(lead) = iter.next() {
        let unit = match lead {
            0x00..=0x7f => u16::from(lead),
            0xc0..=0xdf => (u16::from(lead & 0x1f) << 6) | continuation(iter.next())?,
            0xe0..=0xef => {
                let high = continuation(iter.next())?;
                let low = continuation(iter.next())?;
                (u16::from(lead & 0x0f) << 12) | (high << 6) | low
            },
            _ => return None
        };

        units.push(unit);
    }

    String::from_utf16(&units).ok()
}

fn continuation(byte: Option<u8>) -> Option<u16> {
    byte.filter(|b| b & 0xc0 == 0x80).map(|b| u16::from(b & 0x3f))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Fixture writer producing the layout [`DataReader`] consumes.
    #[derive(Default)]
    pub(crate) struct DataWriter {
        pub buf: Vec<u8>
    }

    impl DataWriter {
        pub fn u8(&mut self, v: u8) -> &mut Self {
            self.buf.push(v);
            self
        }

        pub fn u32(&mut self, v: u32) -> &mut Self {
            self.buf.extend_from_slice(&v.to_be_bytes());
            self
        }

        pub fn u64(&mut self, v: u64) -> &mut Self {
            self.buf.extend_from_slice(&v.to_be_bytes());
            self
        }

        pub fn utf(&mut self, v: &str) -> &mut Self {
            self.raw_utf(v.as_bytes())
        }

        /// Writes already encoded string bytes behind their length.
        pub fn raw_utf(&mut self, v: &[u8]) -> &mut Self {
            self.buf.extend_from_slice(&(v.len() as u16).to_be_bytes());
            self.buf.extend_from_slice(v);
            self
        }
    }

    #[test]
    fn reads_big_endian_integers() {
        let bytes = [0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xff];
        let mut reader = DataReader::new(&bytes);

        assert_eq!(reader.read_u16("a").unwrap(), 1);
        assert_eq!(reader.read_u32("b").unwrap(), 2);
        assert!(reader.read_bool("c").unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn overrun_names_the_field() {
        let bytes = [0x00, 0x05, b'a', b'b'];
        let mut reader = DataReader::new(&bytes);

        let err = reader.read_utf("title").unwrap_err();
        assert_eq!(err, CodecError::UnexpectedEof { field: "title", needed: 5, remaining: 2 });
    }

    #[test]
    fn reset_rewinds_to_start() {
        let bytes = [0x07];
        let mut reader = DataReader::new(&bytes);

        assert_eq!(reader.read_u8("v").unwrap(), 7);
        assert!(reader.read_u8("v").is_err());
        reader.reset();
        assert_eq!(reader.read_u8("v").unwrap(), 7);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let bytes = [0x00, 0x01, 0xff];
        let mut reader = DataReader::new(&bytes);

        assert_eq!(reader.read_utf("author").unwrap_err(), CodecError::InvalidUtf8 { field: "author" });
    }

    #[test]
    fn decodes_java_surrogate_pairs() {
        // U+1F3B5 as two 3 byte surrogates, then a NUL written as C0 80.
        let mut writer = DataWriter::default();
        writer.raw_utf(&[b'a', 0xed, 0xa0, 0xbc, 0xed, 0xbe, 0xb5, 0xc0, 0x80]);
        let mut reader = DataReader::new(&writer.buf);

        assert_eq!(reader.read_utf("title").unwrap(), "a\u{1F3B5}\0");
    }

    #[test]
    fn rejects_lone_surrogates_and_truncated_sequences() {
        for bytes in [&[0xed, 0xa0, 0xbc][..], &[0xe2, 0x82][..], &[0xc3, 0x41][..]] {
            let mut writer = DataWriter::default();
            writer.raw_utf(bytes);
            let mut reader = DataReader::new(&writer.buf);

            assert_eq!(reader.read_utf("title").unwrap_err(), CodecError::InvalidUtf8 { field: "title" });
        }
    }

    #[test]
    fn optional_string_absent() {
        let mut writer = DataWriter::default();
        writer.u8(0);
        let mut reader = DataReader::new(&writer.buf);

        assert_eq!(reader.read_optional_utf("uri").unwrap(), None);
    }
}
