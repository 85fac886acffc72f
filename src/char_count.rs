use std::ops::AddAssign;

pub const ASCII_START: u8 = 32;
pub const ASCII_END: u8 = 126;
pub const NUM_CHARS: usize = (ASCII_END - ASCII_START + 1) as usize;

/// Occurrences of every printable ASCII character, space through `~`.
#[derive(Clone, PartialEq, Eq)]
pub struct CharTally {
    counts: [u64; NUM_CHARS],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharCount {
    pub character: u8,
    pub count: u64,
}

impl CharTally {
    pub fn new() -> Self {
        CharTally {
            counts: [0; NUM_CHARS],
        }
    }

    #[inline(never)]
    pub fn count(buffer: &[u8]) -> Self {
        let mut tally = CharTally::new();
        tally.add_bytes(buffer);
        tally
    }

    pub fn add_bytes(&mut self, buffer: &[u8]) {
        for &c in buffer {
            if c >= ASCII_START && c <= ASCII_END {
                self.counts[(c - ASCII_START) as usize] += 1;
            }
        }
    }

    /// Count for `c`; zero for anything outside the printable range.
    pub fn get(&self, c: u8) -> u64 {
        if c >= ASCII_START && c <= ASCII_END {
            self.counts[(c - ASCII_START) as usize]
        } else {
            0
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = CharCount> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &count)| CharCount {
                character: ASCII_START + i as u8,
                count,
            })
    }
}

impl Default for CharTally {
    fn default() -> Self {
        CharTally::new()
    }
}

impl<'a> AddAssign<&'a CharTally> for CharTally {
    fn add_assign(&mut self, other: &'a CharTally) {
        for (acc, n) in self.counts.iter_mut().zip(other.counts.iter()) {
            *acc += *n;
        }
    }
}

impl std::fmt::Debug for CharTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.iter()
                    .filter(|c| c.count > 0)
                    .map(|c| (c.character as char, c.count)),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_printable_only() {
        let tally = CharTally::count(b"ab a~\n\t\x7f\x1f\xff");
        assert_eq!(tally.get(b'a'), 2);
        assert_eq!(tally.get(b'b'), 1);
        assert_eq!(tally.get(b' '), 1);
        assert_eq!(tally.get(b'~'), 1);
        assert_eq!(tally.get(b'\n'), 0);
        assert_eq!(tally.total(), 5);
    }

    #[test]
    fn sum_is_elementwise() {
        let mut left = CharTally::count(b"hello ");
        let right = CharTally::count(b"world");
        left += &right;
        assert_eq!(left, CharTally::count(b"hello world"));
    }

    #[test]
    fn iter_covers_every_slot() {
        let tally = CharTally::new();
        let chars: Vec<u8> = tally.iter().map(|c| c.character).collect();
        assert_eq!(chars.len(), NUM_CHARS);
        assert_eq!(chars[0], b' ');
        assert_eq!(chars[NUM_CHARS - 1], b'~');
    }
}
