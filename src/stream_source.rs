//! Stream source (C10, ambient): the handful of `Read` backends the CLI's
//! `--input` flag can select between. The driver itself only needs
//! [`crate::value::ByteSource`], which is already blanket-implemented for
//! anything `Read`; this just gives the binary one enum to match on.

use std::fs::File;
use std::io::{self, Stdin};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

pub enum StreamSource {
    Stdin(Stdin),
    File(File),
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl io::Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            StreamSource::Stdin(s) => s.read(buf),
            StreamSource::File(f) => f.read(buf),
            StreamSource::Tcp(t) => t.read(buf),
            #[cfg(unix)]
            StreamSource::Unix(u) => u.read(buf),
        }
    }
}

/// Parse the CLI's `--input` argument into a concrete source.
///
/// Accepted forms: `stdin`, a filesystem path, `tcp:HOST:PORT`, and
/// (unix only) `unix:PATH`.
pub fn open(spec: &str) -> io::Result<StreamSource> {
    if spec == "stdin" {
        return Ok(StreamSource::Stdin(io::stdin()));
    }
    if let Some(addr) = spec.strip_prefix("tcp:") {
        return Ok(StreamSource::Tcp(TcpStream::connect(addr)?));
    }
    #[cfg(unix)]
    if let Some(path) = spec.strip_prefix("unix:") {
        return Ok(StreamSource::Unix(UnixStream::connect(path)?));
    }
    Ok(StreamSource::File(File::open(spec)?))
}
