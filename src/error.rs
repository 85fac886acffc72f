use std::error::Error;
use std::fmt;
use std::io;

use tokio::task::JoinError;

#[derive(Debug)]
pub enum CountError {
    Config(String),
    Io(io::Error),
    Protocol(String),
    Decode(String),
    Worker(JoinError),
}

impl CountError {
    /// Protocol errors on one rank are usually the echo of a failure on another.
    pub fn is_protocol(&self) -> bool {
        match *self {
            CountError::Protocol(_) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CountError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CountError::Config(ref msg) => write!(f, "configuration error: {}", msg),
            CountError::Io(ref err) => write!(f, "IO error: {}", err),
            CountError::Protocol(ref msg) => write!(f, "protocol error: {}", msg),
            CountError::Decode(ref msg) => write!(f, "corrupt word stream: {}", msg),
            CountError::Worker(ref err) => write!(f, "worker failed: {}", err),
        }
    }
}

impl Error for CountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            CountError::Io(ref err) => Some(err),
            CountError::Worker(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CountError {
    fn from(err: io::Error) -> CountError {
        CountError::Io(err)
    }
}

impl From<JoinError> for CountError {
    fn from(err: JoinError) -> CountError {
        CountError::Worker(err)
    }
}

pub type Result<T> = std::result::Result<T, CountError>;
