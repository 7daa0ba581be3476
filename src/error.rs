use std::error::Error as ErrTrait;
use std::fmt;
use std::io::Error as IoError;

use crate::value::Value;

/// Everything that can make decoding stop for good.
///
/// Format-rendering failures are deliberately *not* a variant here: the
/// driver logs them and keeps going rather than propagating an `Error`.
#[derive(Debug)]
pub enum Error {
    Io(IoError),
    SectionMissing(String),
    ByteorderUndetectable,
    MetadataTruncated { offset: usize, needed: usize },
    InvalidUtf8 { offset: usize },
    ShortRead { wanted: usize, got: usize },
    EndOfStream(EndOfStream),
    TestMismatch { diff: String },
    AddressOutOfRange { address: u128 },
    Serialize(String),
}

/// Context captured when the trace stream runs dry mid-argument.
#[derive(Debug)]
pub struct EndOfStream {
    pub fmt_string: String,
    pub file: String,
    pub line: u64,
    pub parsed: Vec<Value>,
    pub leftover: usize,
}

impl Error {
    pub fn section_missing(name: impl Into<String>) -> Self {
        Error::SectionMissing(name.into())
    }
}

impl ErrTrait for Error {}

impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::SectionMissing(name) => {
                write!(f, "section {:?} not present in loader output", name)
            }
            Error::ByteorderUndetectable => write!(
                f,
                "byte-order permutation is neither ascending nor descending, or is invalid"
            ),
            Error::MetadataTruncated { offset, needed } => write!(
                f,
                "metadata table truncated: needed {} byte(s) at offset {}",
                needed, offset
            ),
            Error::InvalidUtf8 { offset } => {
                write!(f, "metadata table holds invalid UTF-8 at offset {}", offset)
            }
            Error::ShortRead { wanted, got } => write!(
                f,
                "short read starting a record: wanted {} byte(s), stream had {}",
                wanted, got
            ),
            Error::EndOfStream(e) => write!(
                f,
                "end of stream while decoding \"{}\" ({}:{}): {} argument(s) parsed, {} byte(s) left over",
                e.fmt_string,
                e.file,
                e.line,
                e.parsed.len(),
                e.leftover
            ),
            Error::TestMismatch { diff } => {
                write!(f, "captured output did not match expected:\n{}", diff)
            }
            Error::AddressOutOfRange { address } => {
                write!(f, "rebased address {} does not fit the section buffer", address)
            }
            Error::Serialize(msg) => write!(f, "failed to serialize record: {}", msg),
        }
    }
}
