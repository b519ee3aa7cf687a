use std::path::PathBuf;

/// Errors produced by the panmap core.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),

    #[error("coverage operation against unallocated sample slot {0}")]
    SampleOutOfRange(u32),

    #[error("probability model parameter {0} has not been set")]
    UnsetParameter(&'static str),

    #[error("invalid probability model {0:?}: must be one of bin, nbin, lin")]
    InvalidModel(String),

    #[error("no path found through the kmer graph")]
    NoPath,

    #[error("exceeded {0} steps extracting a path: the kmer graph contains a cycle")]
    Infinite(usize),

    #[error("sequence of length {length} too short to sketch with k={k}, w={w}")]
    SequenceTooShort { length: usize, k: u32, w: u32 },

    #[error("GFA segment path must begin with a digit, got {0:?}")]
    GfaBadPath(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Error::Parse {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
