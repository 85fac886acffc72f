pub mod error;
pub mod logging;
pub mod util;

pub mod partition;
pub mod char_count;
pub mod tokenize;
pub mod boundary;
pub mod codec;
pub mod collective;
pub mod rank;
pub mod worker;

pub use crate::error::CountError;
pub use crate::worker::{count_bytes, count_file, CountOptions, Summary};
