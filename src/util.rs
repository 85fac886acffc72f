use std::io::SeekFrom;
use std::path::Path;

use argparse::{ArgumentParser, Print, Store, StoreOption};
use bytes::Bytes;
use libc::{getrusage, rusage, RUSAGE_SELF};
use log::LevelFilter;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{CountError, Result};
use crate::partition::ByteRange;
use crate::rank::TOP_N;
use crate::tokenize::{OrdinalScheme, MAX_WORD_LEN};
use crate::worker::CountOptions;

pub fn get_cputime_usecs() -> (u64, u64) {
    let mut usage: rusage = unsafe { std::mem::zeroed() };

    unsafe { getrusage(RUSAGE_SELF, (&mut usage) as *mut rusage); }

    let u_secs = usage.ru_utime.tv_sec as u64;
    let u_usecs = usage.ru_utime.tv_usec as u64;
    let s_secs = usage.ru_stime.tv_sec as u64;
    let s_usecs = usage.ru_stime.tv_usec as u64;

    let u_time = (u_secs * 1_000_000) + u_usecs;
    let s_time = (s_secs * 1_000_000) + s_usecs;

    (u_time, s_time)
}

/// Runtime threads for `workers` tasks: never more than the machine can run at once.
pub fn runtime_threads(workers: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    workers.max(1).min(cores)
}

pub struct Config {
    pub input: Option<String>,
    pub workers: usize,
    pub top: usize,
    pub ordinals: OrdinalScheme,
    pub max_word_len: usize,
    pub log: String,
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input: None,
            workers: 1,
            top: TOP_N,
            ordinals: OrdinalScheme::default(),
            max_word_len: MAX_WORD_LEN,
            log: "-".to_owned(),
            log_level: LevelFilter::Warn,
        }
    }
}

impl Config {
    pub fn input(&self) -> Result<&str> {
        self.input
            .as_deref()
            .ok_or_else(|| CountError::Config("missing input file".to_owned()))
    }

    pub fn count_options(&self) -> CountOptions {
        CountOptions {
            workers: self.workers,
            ordinals: self.ordinals,
            top: self.top,
            max_word_len: self.max_word_len,
        }
    }
}

pub fn parse_args(description: &str) -> Config {
    let mut conf = Config::default();

    {
        // this block limits scope of borrows by ap.refer() method
        let mut ap = ArgumentParser::new();

        ap.set_description(description);
        ap.add_option(
            &["-V", "--version"],
            Print(env!("CARGO_PKG_VERSION").to_string()),
            "Show version",
        );

        ap.refer(&mut conf.input)
            .add_argument("input", StoreOption, "input file");

        ap.refer(&mut conf.workers).add_option(
            &["-w", "--workers"],
            Store,
            "worker count - default: 1",
        );

        ap.refer(&mut conf.top).add_option(
            &["-n", "--top"],
            Store,
            "entries per ranking - default: 10",
        );

        ap.refer(&mut conf.ordinals).add_option(
            &["--ordinals"],
            Store,
            "first occurrence ordinals: sequential|offset - default: sequential",
        );

        ap.refer(&mut conf.max_word_len).add_option(
            &["--max-word-len"],
            Store,
            "longer words are truncated - default: 63",
        );

        ap.refer(&mut conf.log).add_option(
            &["--log"],
            Store,
            "log file, - for stderr - default: -",
        );

        ap.refer(&mut conf.log_level).add_option(
            &["--log-level"],
            Store,
            "off|error|warn|info|debug|trace - default: warn",
        );

        ap.parse_args_or_exit();
    }

    conf
}

pub async fn file_len(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path).await?.len())
}

/// Reads exactly `range` from `path`; a file shorter than the range is an error.
pub async fn read_range(path: &Path, range: ByteRange) -> Result<Bytes> {
    let mut buffer = vec![0u8; range.len as usize];
    if range.is_empty() {
        return Ok(Bytes::from(buffer));
    }
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(range.start)).await?;
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}
