//! Length-prefixed binary encoding used by the snapshot files.
//!
//! Integers are big-endian. Strings carry a u32 byte length. Every value is
//! preceded by a one byte type tag so a reader can decode it without the
//! schema.

use anyhow::{Context, bail};

use crate::db_types::{ColumnType, Value};

// Value/Column type tags
pub const TYPE_NUMBER: u8 = 0x01;
pub const TYPE_TEXT: u8 = 0x02;
pub const TYPE_BOOL: u8 = 0x03;

pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> anyhow::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .with_context(|| format!("unexpected end of buffer at byte {}", self.pos))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn bytes<const N: usize>(&mut self) -> anyhow::Result<[u8; N]> {
        Ok(self.take(N)?.try_into()?)
    }

    pub fn u8(&mut self) -> anyhow::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> anyhow::Result<u32> {
        Ok(u32::from_be_bytes(self.bytes()?))
    }

    pub fn u64(&mut self) -> anyhow::Result<u64> {
        Ok(u64::from_be_bytes(self.bytes()?))
    }

    pub fn f64(&mut self) -> anyhow::Result<f64> {
        Ok(f64::from_be_bytes(self.bytes()?))
    }

    pub fn bool(&mut self) -> anyhow::Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!("invalid bool byte {other:#04x}"),
        }
    }

    pub fn string(&mut self) -> anyhow::Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub fn column_type(&mut self) -> anyhow::Result<ColumnType> {
        match self.u8()? {
            TYPE_NUMBER => Ok(ColumnType::Number),
            TYPE_TEXT => Ok(ColumnType::Text),
            TYPE_BOOL => Ok(ColumnType::Bool),
            other => bail!("unknown column type tag {other:#04x}"),
        }
    }

    pub fn value(&mut self) -> anyhow::Result<Value> {
        match self.u8()? {
            TYPE_NUMBER => Ok(Value::Number(self.f64()?)),
            TYPE_TEXT => Ok(Value::Text(self.string()?)),
            TYPE_BOOL => Ok(Value::Bool(self.bool()?)),
            other => bail!("unknown value type tag {other:#04x}"),
        }
    }

    /// Fails if anything is left unread.
    pub fn finish(self) -> anyhow::Result<()> {
        if !self.is_empty() {
            bail!("{} trailing bytes", self.buf.len() - self.pos);
        }
        Ok(())
    }
}

pub fn write_u32(buf: &mut Vec<u8>, n: u32) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub fn write_u64(buf: &mut Vec<u8>, n: u64) {
    buf.extend_from_slice(&n.to_be_bytes());
}

pub fn write_len(buf: &mut Vec<u8>, len: usize) -> anyhow::Result<()> {
    let len = u32::try_from(len).context("length does not fit in u32")?;
    write_u32(buf, len);
    Ok(())
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) -> anyhow::Result<()> {
    write_len(buf, s.len())?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn column_type_tag(col_type: ColumnType) -> u8 {
    match col_type {
        ColumnType::Number => TYPE_NUMBER,
        ColumnType::Text => TYPE_TEXT,
        ColumnType::Bool => TYPE_BOOL,
    }
}

pub fn write_value(buf: &mut Vec<u8>, v: &Value) -> anyhow::Result<()> {
    buf.push(column_type_tag(v.column_type()));
    match v {
        Value::Number(n) => buf.extend_from_slice(&n.to_be_bytes()),
        Value::Text(s) => write_string(buf, s)?,
        Value::Bool(b) => buf.push(u8::from(*b)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_read_back_in_order() {
        let mut buf = Vec::new();
        write_value(&mut buf, &Value::Number(-2.25)).unwrap();
        write_value(&mut buf, &Value::Text("héllo".into())).unwrap();
        write_value(&mut buf, &Value::Bool(true)).unwrap();

        let mut c = Cursor::new(&buf);
        assert_eq!(c.value().unwrap(), Value::Number(-2.25));
        assert_eq!(c.value().unwrap(), Value::Text("héllo".into()));
        assert_eq!(c.value().unwrap(), Value::Bool(true));
        c.finish().unwrap();
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut buf = Vec::new();
        write_string(&mut buf, "abcdef").unwrap();
        buf.truncate(buf.len() - 2);

        let mut c = Cursor::new(&buf);
        let err = c.string().unwrap_err();
        assert!(err.to_string().contains("unexpected end"));
    }

    #[test]
    fn unknown_tags_and_trailing_bytes_are_rejected() {
        let mut c = Cursor::new(&[0x09]);
        assert!(c.value().is_err());

        let mut c = Cursor::new(&[0x02, 0x00]);
        assert!(c.bool().is_err());

        let c = Cursor::new(&[0x00]);
        assert!(c.finish().is_err());
    }

    #[test]
    fn huge_length_prefix_does_not_overflow() {
        let buf = u32::MAX.to_be_bytes();
        let mut c = Cursor::new(&buf);
        assert!(c.string().is_err());
    }
}
