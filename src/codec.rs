//! Flat integer encoding of a worker's word table.
//!
//! Each record is `[len, byte_0, .., byte_len-1, count, first_occurrence]` and every
//! integer is one little-endian `u64` element. Records carry their own length, so
//! streams from several workers can be concatenated and decoded in one pass.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CountError;
use crate::tokenize::{is_word_byte, WordRecord, WordTable};

pub const ELEMENT_SIZE: usize = 8;

/// An encoded word table. Its size is counted in elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerializedStream {
    data: Bytes,
}

impl SerializedStream {
    pub fn from_bytes(data: Bytes) -> Self {
        SerializedStream { data }
    }

    pub fn elements(&self) -> usize {
        self.data.len() / ELEMENT_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

pub struct WordRecordCodec {}

impl WordRecordCodec {
    pub fn new() -> Self {
        WordRecordCodec {}
    }
}

impl Default for WordRecordCodec {
    fn default() -> Self {
        WordRecordCodec::new()
    }
}

fn corrupt(msg: String) -> CountError {
    CountError::Decode(msg)
}

impl<'a> Encoder<&'a WordRecord> for WordRecordCodec {
    type Error = CountError;

    fn encode(&mut self, record: &'a WordRecord, dst: &mut BytesMut) -> Result<(), CountError> {
        put_record(record, dst);
        Ok(())
    }
}

fn put_record(record: &WordRecord, dst: &mut BytesMut) {
    dst.reserve((record.word.len() + 3) * ELEMENT_SIZE);
    dst.put_u64_le(record.word.len() as u64);
    for &b in record.word.iter() {
        dst.put_u64_le(b as u64);
    }
    dst.put_u64_le(record.count);
    dst.put_u64_le(record.first_occurrence);
}

impl Decoder for WordRecordCodec {
    type Item = WordRecord;
    type Error = CountError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<WordRecord>, CountError> {
        if buf.len() < ELEMENT_SIZE {
            return Ok(None);
        }

        let len = (&buf[..ELEMENT_SIZE]).get_u64_le();
        if len == 0 {
            return Err(corrupt("zero word length".to_owned()));
        }
        let needed = (len as usize)
            .checked_add(3)
            .and_then(|n| n.checked_mul(ELEMENT_SIZE))
            .ok_or_else(|| corrupt(format!("word length {} out of range", len)))?;
        if buf.len() < needed {
            return Ok(None);
        }

        let mut record = buf.split_to(needed);
        record.advance(ELEMENT_SIZE);
        let mut word = BytesMut::with_capacity(len as usize);
        for _ in 0..len {
            let element = record.get_u64_le();
            let b = element as u8;
            if element > u8::MAX as u64 || !is_word_byte(b) || b.is_ascii_uppercase() {
                return Err(corrupt(format!("invalid word byte {:#x}", element)));
            }
            word.put_u8(b);
        }
        let count = record.get_u64_le();
        let first_occurrence = record.get_u64_le();
        if count == 0 {
            return Err(corrupt(format!("zero count for {:?}", word)));
        }

        Ok(Some(WordRecord {
            word: word.freeze(),
            count,
            first_occurrence,
        }))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<WordRecord>, CountError> {
        match self.decode(buf)? {
            Some(record) => Ok(Some(record)),
            None => {
                if buf.is_empty() {
                    Ok(None)
                } else {
                    Err(corrupt(format!(
                        "stream ends inside a record ({} bytes left)",
                        buf.len()
                    )))
                }
            }
        }
    }
}

/// Encodes every record of `table`, in map iteration order.
#[inline(never)]
pub fn flatten(table: &WordTable) -> SerializedStream {
    let elements: usize = table.values().map(|r| r.word.len() + 3).sum();
    let mut buf = BytesMut::with_capacity(elements * ELEMENT_SIZE);
    for record in table.values() {
        put_record(record, &mut buf);
    }
    SerializedStream::from_bytes(buf.freeze())
}

/// Decodes `stream` record by record and merges each into `table`:
/// counts add up, the smaller ordinal wins.
pub fn unflatten_and_merge(stream: &SerializedStream, table: &mut WordTable) -> Result<(), CountError> {
    let mut codec = WordRecordCodec::new();
    let mut buf = BytesMut::from(&stream.as_bytes()[..]);
    while let Some(record) = codec.decode_eof(&mut buf)? {
        merge_record(table, record);
    }
    Ok(())
}

pub fn merge_record(table: &mut WordTable, record: WordRecord) {
    if let Some(existing) = table.get_mut(&record.word) {
        existing.count += record.count;
        existing.first_occurrence = existing.first_occurrence.min(record.first_occurrence);
    } else {
        table.insert(record.word.clone(), record);
    }
}
