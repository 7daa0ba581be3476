//! Test harness hook (C9): run the driver against an in-memory buffer and
//! diff the captured output against an embedded "expected" section.

use std::io::Cursor;

use similar::TextDiff;

use crate::driver::{Driver, SourceLocMode};
use crate::error::Error;
use crate::header::Header;
use crate::value::ByteSource;

pub const DEFAULT_EXPECTED_SECTION: &str = ".emtrace.test.expected";

/// Strip trailing NUL padding a linker may have appended to a section.
pub fn strip_nul_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Decode `src` against `header`/`section` with output captured in memory,
/// then compare it byte-for-byte against `expected`. On mismatch, returns
/// an `Error::TestMismatch` carrying a unified diff.
pub fn run_and_diff(
    header: Header,
    section: &[u8],
    src: &mut dyn ByteSource,
    src_loc_mode: SourceLocMode,
    expected: &[u8],
) -> Result<(), Error> {
    let mut driver = Driver::new(header, section, src_loc_mode);
    let mut captured = Cursor::new(Vec::new());
    driver.run(src, &mut captured)?;
    let captured = captured.into_inner();

    let expected = strip_nul_padding(expected);
    if captured == expected {
        return Ok(());
    }

    let captured_text = String::from_utf8_lossy(&captured);
    let expected_text = String::from_utf8_lossy(expected);
    let diff = TextDiff::from_lines(expected_text.as_ref(), captured_text.as_ref())
        .unified_diff()
        .header("expected", "captured")
        .to_string();

    Err(Error::TestMismatch { diff })
}
