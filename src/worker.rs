//! The per-worker pipeline and the drivers that run a whole group of workers.

use std::io;
use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use log::{debug, info};
use tokio::task::JoinHandle;

use crate::boundary::{self, BoundaryLink};
use crate::char_count::{CharCount, CharTally};
use crate::codec::{flatten, unflatten_and_merge};
use crate::collective::Communicator;
use crate::error::{CountError, Result};
use crate::partition::{self, ByteRange};
use crate::rank::{top_chars, top_words, TOP_N};
use crate::tokenize::{OrdinalScheme, Tokenizer, WordRecord, WordTable, MAX_WORD_LEN};
use crate::util::{file_len, read_range};

#[derive(Clone, Debug)]
pub struct CountOptions {
    pub workers: usize,
    pub ordinals: OrdinalScheme,
    pub top: usize,
    pub max_word_len: usize,
}

impl Default for CountOptions {
    fn default() -> Self {
        CountOptions {
            workers: 1,
            ordinals: OrdinalScheme::default(),
            top: TOP_N,
            max_word_len: MAX_WORD_LEN,
        }
    }
}

/// What the coordinator hands to the reporting layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub chars: Vec<CharCount>,
    pub words: Vec<WordRecord>,
    pub total_chars: u64,
    pub total_words: u64,
    pub distinct_words: usize,
}

impl Summary {
    pub fn new(chars: &CharTally, words: &WordTable, top: usize) -> Self {
        Summary {
            chars: top_chars(chars, top),
            words: top_words(words, top),
            total_chars: chars.total(),
            total_words: words.values().map(|r| r.count).sum(),
            distinct_words: words.len(),
        }
    }
}

/// Counts of one worker before aggregation.
#[derive(Debug)]
pub struct LocalCounts {
    pub chars: CharTally,
    pub words: WordTable,
}

pub struct Worker {
    range: ByteRange,
    comm: Communicator,
    link: BoundaryLink,
    options: CountOptions,
}

/// One connected worker per rank for an input of `total` bytes.
pub fn workers(total: u64, options: &CountOptions) -> Result<Vec<Worker>> {
    if options.workers == 0 {
        return Err(CountError::Config("worker count must be at least 1".to_owned()));
    }
    if options.max_word_len == 0 {
        return Err(CountError::Config("maximum word length must be at least 1".to_owned()));
    }
    let ranges = partition::plan(total, options.workers);
    let comms = Communicator::group(options.workers);
    let links = boundary::chain(options.workers);
    Ok(ranges
        .into_iter()
        .zip(comms.into_iter())
        .zip(links.into_iter())
        .map(|((range, comm), link)| Worker {
            range,
            comm,
            link,
            options: options.clone(),
        })
        .collect())
}

impl Worker {
    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Runs the whole pipeline over this worker's partition. Only the
    /// coordinator returns a summary.
    pub async fn run(mut self, buffer: Bytes) -> Result<Option<Summary>> {
        let local = self.count_local(buffer).await?;
        self.aggregate(local).await
    }

    /// Character and word counts of this partition, after boundary stitching.
    pub async fn count_local(&mut self, buffer: Bytes) -> Result<LocalCounts> {
        let rank = self.rank();
        if buffer.len() as u64 != self.range.len {
            return Err(CountError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "rank {}: expected {}B at offset {}, got {}B",
                    rank,
                    self.range.len,
                    self.range.start,
                    buffer.len()
                ),
            )));
        }

        let start = Instant::now();
        let chars = CharTally::count(&buffer);
        let stitched = self.link.stitch(buffer).await?;

        let mut words = WordTable::new();
        Tokenizer::new(
            self.options.ordinals,
            self.range,
            stitched.head_len,
            self.options.max_word_len,
        )
        .count_words(&mut words, &stitched.text);
        debug!(
            "rank {}: {:?} -> {} chars, {} distinct words ({}B carried in) in {:?}",
            rank,
            self.range,
            chars.total(),
            words.len(),
            stitched.head_len,
            start.elapsed()
        );
        Ok(LocalCounts { chars, words })
    }

    async fn aggregate(&mut self, local: LocalCounts) -> Result<Option<Summary>> {
        let chars = self.comm.reduce_chars(local.chars).await?;
        let stream = flatten(&local.words);
        debug!("rank {}: word stream of {} elements", self.rank(), stream.elements());
        let gathered = self.comm.gather_streams(stream).await?;

        match (chars, gathered) {
            (Some(chars), Some(gathered)) => {
                let mut words = WordTable::new();
                unflatten_and_merge(&gathered, &mut words)?;
                Ok(Some(Summary::new(&chars, &words, self.options.top)))
            }
            _ => Ok(None),
        }
    }
}

/// Counts an in-memory input, partitioned the same way as a file.
pub async fn count_bytes(data: Bytes, options: &CountOptions) -> Result<Summary> {
    let handles = workers(data.len() as u64, options)?
        .into_iter()
        .map(|worker| {
            let range = worker.range();
            let buffer = data.slice(range.start as usize..range.end() as usize);
            tokio::spawn(worker.run(buffer))
        })
        .collect();
    finish(handles).await
}

/// Counts a file; every worker reads its own range.
pub async fn count_file<P: AsRef<Path>>(path: P, options: &CountOptions) -> Result<Summary> {
    let path = path.as_ref().to_path_buf();
    let total = file_len(&path).await?;
    info!(
        "counting {} ({}B) with {} workers",
        path.display(),
        total,
        options.workers
    );
    let handles = workers(total, options)?
        .into_iter()
        .map(|worker| {
            let path = path.clone();
            tokio::spawn(async move {
                let buffer = read_range(&path, worker.range()).await?;
                worker.run(buffer).await
            })
        })
        .collect();
    finish(handles).await
}

async fn finish(handles: Vec<JoinHandle<Result<Option<Summary>>>>) -> Result<Summary> {
    let mut summary = None;
    let mut failures = Vec::new();
    for result in join_all(handles).await {
        match result {
            Ok(Ok(Some(s))) => summary = Some(s),
            Ok(Ok(None)) => {}
            Ok(Err(err)) => failures.push(err),
            Err(err) => failures.push(CountError::from(err)),
        }
    }

    if !failures.is_empty() {
        let root = failures.iter().position(|e| !e.is_protocol()).unwrap_or(0);
        return Err(failures.swap_remove(root));
    }
    let summary = summary
        .ok_or_else(|| CountError::Protocol("coordinator produced no result".to_owned()))?;
    info!(
        "{} chars, {} words ({} distinct)",
        summary.total_chars, summary.total_words, summary.distinct_words
    );
    Ok(summary)
}
