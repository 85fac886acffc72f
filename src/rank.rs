use std::cmp::Ordering;

use crate::char_count::{CharCount, CharTally};
use crate::tokenize::{WordRecord, WordTable};

pub const TOP_N: usize = 10;

pub fn compare_chars(a: &CharCount, b: &CharCount) -> Ordering {
    b.count.cmp(&a.count).then(a.character.cmp(&b.character))
}

pub fn compare_words(a: &WordRecord, b: &WordRecord) -> Ordering {
    b.count
        .cmp(&a.count)
        .then(a.first_occurrence.cmp(&b.first_occurrence))
        .then(a.word.cmp(&b.word))
}

/// The `n` most frequent characters; characters that never occur are left out.
pub fn top_chars(tally: &CharTally, n: usize) -> Vec<CharCount> {
    let mut chars: Vec<CharCount> = tally.iter().filter(|c| c.count > 0).collect();
    chars.sort_by(compare_chars);
    chars.truncate(n);
    chars
}

pub fn top_words(table: &WordTable, n: usize) -> Vec<WordRecord> {
    let mut words: Vec<&WordRecord> = table.values().collect();
    words.sort_by(|a, b| compare_words(a, b));
    words.into_iter().take(n).cloned().collect()
}
