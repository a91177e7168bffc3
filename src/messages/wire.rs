//! ビッグエンディアンのバッファ読み書き
//!
//! 固定幅フィールド（2/4/8バイト）をネットワークバイト順で扱います。
//! 文字列は `u16` 長 + UTF-8、真偽値は `u8`、列挙値は `u16` タグ、
//! 省略可能値は `u8` の有無フラグ + 値で表します。

use thiserror::Error;

use crate::models::IdRecord;

/// ワイヤ形式の復号エラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    #[error("buffer underrun: needed {needed} bytes at offset {offset}, {remaining} remaining")]
    Underrun {
        offset: usize,
        needed: usize,
        remaining: usize,
    },

    #[error("unknown message type {0}")]
    UnknownMessageType(u16),

    #[error("unexpected message type {found} (expected {expected})")]
    UnexpectedMessageType { expected: u16, found: u16 },

    #[error("unsupported message version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid {field} tag {tag}")]
    InvalidTag { field: &'static str, tag: u16 },

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),

    #[error("{0} entries exceed the u16 count prefix")]
    TooManyEntries(usize),
}

/// 書き込みバッファ
#[derive(Debug, Clone, Default)]
pub struct BufferWriter {
    bytes: Vec<u8>,
}

impl BufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    pub fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i16(&mut self, value: i16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn put_id(&mut self, id: &IdRecord) {
        self.put_i32(id.id);
        self.put_i32(id.sub_id);
    }

    pub fn put_string(&mut self, value: &str) -> Result<(), WireError> {
        let len = u16::try_from(value.len()).map_err(|_| WireError::StringTooLong(value.len()))?;
        self.put_u16(len);
        self.bytes.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn put_optional_f64(&mut self, value: Option<f64>) {
        self.put_bool(value.is_some());
        self.put_f64(value.unwrap_or(0.0));
    }

    pub fn put_optional_id(&mut self, value: Option<&IdRecord>) {
        self.put_bool(value.is_some());
        self.put_id(value.unwrap_or(&IdRecord::default()));
    }
}

/// 読み出しバッファ
#[derive(Debug, Clone)]
pub struct BufferReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.take_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < len {
            return Err(WireError::Underrun { offset: self.offset, needed: len, remaining: self.remaining() });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// 次の `u16` を読み進めずに覗く
    pub fn peek_u16(&self) -> Result<u16, WireError> {
        if self.remaining() < 2 {
            return Err(WireError::Underrun { offset: self.offset, needed: 2, remaining: self.remaining() });
        }
        Ok(u16::from_be_bytes([self.bytes[self.offset], self.bytes[self.offset + 1]]))
    }

    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn get_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn get_i16(&mut self) -> Result<i16, WireError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn get_i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn get_f64(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_be_bytes(self.take()?))
    }

    pub fn get_id(&mut self) -> Result<IdRecord, WireError> {
        let id = self.get_i32()?;
        let sub_id = self.get_i32()?;
        Ok(IdRecord::new(id, sub_id))
    }

    pub fn get_string(&mut self) -> Result<String, WireError> {
        let len = self.get_u16()? as usize;
        let raw = self.take_slice(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }

    pub fn get_optional_f64(&mut self) -> Result<Option<f64>, WireError> {
        let present = self.get_bool()?;
        let value = self.get_f64()?;
        Ok(present.then_some(value))
    }

    pub fn get_optional_id(&mut self) -> Result<Option<IdRecord>, WireError> {
        let present = self.get_bool()?;
        let value = self.get_id()?;
        Ok(present.then_some(value))
    }
}

/// `u16` タグとの相互変換
pub trait WireTag: Sized + Copy {
    const FIELD: &'static str;

    fn to_tag(self) -> u16;
    fn from_tag(tag: u16) -> Option<Self>;

    fn write(self, writer: &mut BufferWriter) {
        writer.put_u16(self.to_tag());
    }

    fn read(reader: &mut BufferReader<'_>) -> Result<Self, WireError> {
        let tag = reader.get_u16()?;
        Self::from_tag(tag).ok_or(WireError::InvalidTag { field: Self::FIELD, tag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut w = BufferWriter::new();
        w.put_u16(0x0102);
        w.put_i32(-2);
        w.put_f64(1.0);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..2], &[0x01, 0x02]);
        assert_eq!(&bytes[2..6], &[0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(&bytes[6..], &[0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_reader_reports_underrun() {
        let mut r = BufferReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(r.peek_u16().unwrap(), 1);
        assert_eq!(r.get_u16().unwrap(), 1);
        assert_eq!(
            r.get_u32(),
            Err(WireError::Underrun { offset: 2, needed: 4, remaining: 1 })
        );
    }

    #[test]
    fn test_strings_and_optionals() {
        let mut w = BufferWriter::new();
        w.put_string("迎撃").unwrap();
        w.put_optional_f64(None);
        w.put_optional_id(Some(&IdRecord::new(3, 4)));
        let bytes = w.into_bytes();

        let mut r = BufferReader::new(&bytes);
        assert_eq!(r.get_string().unwrap(), "迎撃");
        assert_eq!(r.get_optional_f64().unwrap(), None);
        assert_eq!(r.get_optional_id().unwrap(), Some(IdRecord::new(3, 4)));
        assert_eq!(r.remaining(), 0);

        let mut bad = BufferReader::new(&[0x00, 0x02, 0xFF, 0xFE]);
        assert_eq!(bad.get_string(), Err(WireError::InvalidUtf8));
    }
}
