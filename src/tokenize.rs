use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};

use crate::partition::ByteRange;

pub const MAX_WORD_LEN: usize = 63;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordRecord {
    pub word: Bytes,
    pub count: u64,
    pub first_occurrence: u64,
}

pub type WordTable = HashMap<Bytes, WordRecord>;

/// How the tie-break ordinal of a word is derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrdinalScheme {
    /// Partition start plus a per-worker counter of newly seen words, starting at 1.
    /// Depends on the worker count.
    Sequential,
    /// Absolute byte offset of the first character of the word's first occurrence.
    ByteOffset,
}

impl Default for OrdinalScheme {
    fn default() -> Self {
        OrdinalScheme::Sequential
    }
}

impl FromStr for OrdinalScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" | "seq" => Ok(OrdinalScheme::Sequential),
            "offset" | "byte-offset" => Ok(OrdinalScheme::ByteOffset),
            other => Err(format!("unknown ordinal scheme \"{}\"", other)),
        }
    }
}

impl fmt::Display for OrdinalScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OrdinalScheme::Sequential => write!(f, "sequential"),
            OrdinalScheme::ByteOffset => write!(f, "offset"),
        }
    }
}

#[inline]
pub fn is_word_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric()
}

/// Splits a worker's stitched buffer into lowercase alphanumeric words.
pub struct Tokenizer {
    scheme: OrdinalScheme,
    partition_start: u64,
    origin: u64,
    next_id: u64,
    max_len: usize,
}

impl Tokenizer {
    /// `head_len` is the length of the fragment prepended to the partition,
    /// so the tokenized buffer starts `head_len` bytes before `range.start`.
    pub fn new(scheme: OrdinalScheme, range: ByteRange, head_len: usize, max_len: usize) -> Self {
        assert!(max_len > 0);
        Tokenizer {
            scheme,
            partition_start: range.start,
            origin: range.start.saturating_sub(head_len as u64),
            next_id: 1,
            max_len,
        }
    }

    /// Counts every word in `buffer`, including one running up to the end.
    #[inline(never)]
    pub fn count_words(&mut self, table: &mut WordTable, buffer: &[u8]) {
        let mut word = BytesMut::with_capacity(self.max_len);
        let mut word_start = 0;
        for (i, &c) in buffer.iter().enumerate() {
            if is_word_byte(c) {
                if word.is_empty() {
                    word_start = i;
                }
                if word.len() < self.max_len {
                    word.extend_from_slice(&[c.to_ascii_lowercase()]);
                }
            } else if !word.is_empty() {
                self.record(table, &mut word, word_start);
            }
        }
        if !word.is_empty() {
            self.record(table, &mut word, word_start);
        }
    }

    fn record(&mut self, table: &mut WordTable, word: &mut BytesMut, word_start: usize) {
        if let Some(record) = table.get_mut(&word[..]) {
            record.count += 1;
        } else {
            let first_occurrence = match self.scheme {
                OrdinalScheme::Sequential => {
                    let id = self.partition_start + self.next_id;
                    self.next_id += 1;
                    id
                }
                OrdinalScheme::ByteOffset => self.origin + word_start as u64,
            };
            let word = Bytes::copy_from_slice(&word[..]);
            table.insert(
                word.clone(),
                WordRecord {
                    word,
                    count: 1,
                    first_occurrence,
                },
            );
        }
        word.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(scheme: OrdinalScheme, start: u64, head_len: usize, text: &[u8]) -> WordTable {
        let range = ByteRange { start, len: text.len() as u64 };
        let mut table = WordTable::new();
        Tokenizer::new(scheme, range, head_len, MAX_WORD_LEN).count_words(&mut table, text);
        table
    }

    fn get<'a>(table: &'a WordTable, word: &str) -> &'a WordRecord {
        table.get(word.as_bytes()).expect("word missing")
    }

    #[test]
    fn lowercases_and_splits_on_non_alnum() {
        let table = tokenize(OrdinalScheme::Sequential, 0, 0, b"The cat, THE-dog's\tcat2");
        assert_eq!(get(&table, "the").count, 2);
        assert_eq!(get(&table, "cat").count, 1);
        assert_eq!(get(&table, "cat2").count, 1);
        assert_eq!(get(&table, "dog").count, 1);
        assert_eq!(get(&table, "s").count, 1);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn sequential_ordinals_offset_by_partition_start() {
        let table = tokenize(OrdinalScheme::Sequential, 100, 0, b"b a b c");
        assert_eq!(get(&table, "b").first_occurrence, 101);
        assert_eq!(get(&table, "a").first_occurrence, 102);
        assert_eq!(get(&table, "c").first_occurrence, 103);
    }

    #[test]
    fn byte_offset_ordinals_account_for_head() {
        // "sat" was carried over from the previous partition, which ended at 11.
        let table = tokenize(OrdinalScheme::ByteOffset, 11, 3, b"sat on the mat");
        assert_eq!(get(&table, "sat").first_occurrence, 8);
        assert_eq!(get(&table, "on").first_occurrence, 12);
        assert_eq!(get(&table, "mat").first_occurrence, 19);
    }

    #[test]
    fn finalizes_word_at_end_of_buffer() {
        let table = tokenize(OrdinalScheme::Sequential, 0, 0, b"end");
        assert_eq!(get(&table, "end").count, 1);
    }

    #[test]
    fn long_words_are_truncated() {
        let long = "x".repeat(MAX_WORD_LEN + 10);
        let text = format!("{} {}", long, &long[..MAX_WORD_LEN]);
        let table = tokenize(OrdinalScheme::Sequential, 0, 0, text.as_bytes());
        assert_eq!(table.len(), 1);
        assert_eq!(get(&table, &long[..MAX_WORD_LEN]).count, 2);
    }

    #[test]
    fn no_words_in_separators() {
        assert!(tokenize(OrdinalScheme::Sequential, 0, 0, b" \n,.;!").is_empty());
        assert!(tokenize(OrdinalScheme::Sequential, 0, 0, b"").is_empty());
    }

    #[test]
    fn parses_scheme_names() {
        assert_eq!("offset".parse::<OrdinalScheme>(), Ok(OrdinalScheme::ByteOffset));
        assert_eq!("sequential".parse::<OrdinalScheme>(), Ok(OrdinalScheme::Sequential));
        assert!("file-order".parse::<OrdinalScheme>().is_err());
    }
}
