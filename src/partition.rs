/// A contiguous slice `[start, start + len)` of the input owned by one worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    /// Range of `rank` when `total` bytes are split over `workers` workers.
    /// The last rank takes the remainder.
    pub fn for_rank(total: u64, workers: usize, rank: usize) -> Self {
        assert!(workers > 0 && rank < workers);
        let chunk = total / workers as u64;
        let mut len = chunk;
        if rank == workers - 1 {
            len += total % workers as u64;
        }
        ByteRange {
            start: rank as u64 * chunk,
            len,
        }
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub fn plan(total: u64, workers: usize) -> Vec<ByteRange> {
    (0..workers)
        .map(|rank| ByteRange::for_rank(total, workers, rank))
        .collect()
}
