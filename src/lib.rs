#[macro_use]
extern crate log;

mod driver;
mod endian;
mod error;
mod format;
mod header;
mod reader;
mod record;
mod section;
mod stream_source;
mod test_harness;
mod types;
mod value;

pub use crate::driver::{Driver, OutputMode, SourceLocMode};
pub use crate::endian::{Detection, Endianness};
pub use crate::error::{EndOfStream, Error};
pub use crate::format::FormatError;
pub use crate::header::Header;
pub use crate::record::{FormatRecord, FormatterId, Param, RecordCache};
pub use crate::section::find_section;
pub use crate::stream_source::{open as open_stream, StreamSource};
pub use crate::test_harness::{run_and_diff, strip_nul_padding, DEFAULT_EXPECTED_SECTION};
pub use crate::types::{Child, ChildName, Size, TypeInfo};
pub use crate::value::{ByteSource, Value, ValueError};

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level convenience wrapper: parse a metadata section's header and
/// hand back a [`Driver`] ready to consume a trace stream.
#[derive(Debug)]
pub struct Decoder;

impl Decoder {
    /// Parse just the header — useful when a caller wants `size_t_size`,
    /// `ptr_size`, or the sentinels before committing to a full driver.
    pub fn parse_header(section: &[u8]) -> Result<Header> {
        trace!("parsing metadata header ({} byte section)", section.len());
        Header::parse(section)
    }

    /// Parse the header and build a [`Driver`] borrowing `section` for its
    /// whole lifetime.
    pub fn driver(section: &[u8], src_loc_mode: SourceLocMode) -> Result<Driver<'_>> {
        let header = Self::parse_header(section)?;
        Ok(Driver::new(header, section, src_loc_mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds a metadata section: anchor + sub-header + rest block, leaving
    /// the caller to append whatever format records follow. All the
    /// end-to-end scenarios below share this prefix.
    struct SectionBuilder {
        bytes: Vec<u8>,
        size_t_size: u8,
    }

    impl SectionBuilder {
        fn new(size_t_size: u8, ptr_size: u8, align_pow: u8) -> Self {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&header::ANCHOR);
            // rest block immediately follows the sub-header: ANCHOR (32 bytes) + sub-header (4 bytes)
            bytes.push((header::ANCHOR.len() + 4) as u8); // rest_rel
            bytes.push(size_t_size);
            bytes.push(ptr_size);
            bytes.push(align_pow);
            for v in 0..size_t_size {
                bytes.push(v); // little-endian byteorder id
            }
            let null_sentinel: u64 = 0xFFFF_FFFE;
            let length_sentinel: u64 = 0xFFFF_FFFD;
            bytes.extend_from_slice(&null_sentinel.to_le_bytes()[..size_t_size as usize]);
            bytes.extend_from_slice(&length_sentinel.to_le_bytes()[..size_t_size as usize]);
            Self { bytes, size_t_size }
        }

        fn record_base(&self) -> usize {
            self.bytes.len()
        }

        fn size_t(&mut self, v: u64) {
            self.bytes
                .extend_from_slice(&v.to_le_bytes()[..self.size_t_size as usize]);
        }

        fn raw(&mut self, bytes: &[u8]) {
            self.bytes.extend_from_slice(bytes);
        }

        /// Reserve a size_t-wide slot to be filled in later (for an offset
        /// field whose target isn't known until the referenced bytes have
        /// been appended), returning its absolute index.
        fn reserve_size_t(&mut self) -> usize {
            let idx = self.bytes.len();
            self.size_t(0);
            idx
        }

        fn patch_size_t(&mut self, idx: usize, v: u64) {
            let n = self.size_t_size as usize;
            self.bytes[idx..idx + n].copy_from_slice(&v.to_le_bytes()[..n]);
        }

        /// Offset of the current write position relative to `base`, for use
        /// as the value of an offset field patched via [`patch_size_t`].
        fn rel(&self, base: usize) -> u64 {
            (self.bytes.len() - base) as u64
        }
    }

    /// A trace stream whose leading word is the `magic_address` calibration
    /// read (set to 0, matching `magic_off = 0` for every section built by
    /// `SectionBuilder`), followed by the first record's address.
    fn stream_starting_at(first_record_addr: u64) -> Cursor<Vec<u8>> {
        let mut bytes = 0u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&first_record_addr.to_le_bytes());
        Cursor::new(bytes)
    }

    #[test]
    fn decoder_builds_driver_and_runs_one_record() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(0); // num_args = 0
        let fmt_off = s.reserve_size_t();
        s.size_t(1); // formatter_id = literal
        let fmt_rel = s.rel(base);
        s.raw(b"hi\0");
        s.patch_size_t(fmt_off, fmt_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at(base as u64);
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hi");
    }

    /// `align_pow > 0`: stream-carried addresses (both the calibration
    /// `magic_address` and every per-record address) are left-shifted
    /// before rebasing. `record_base()` here is 48 (divisible by 2), so
    /// the address the emitter would have written on the wire is half
    /// that: shifting it back left by `align_pow = 1` must land exactly
    /// on the record.
    #[test]
    fn scenario_align_pow_shifts_stream_addresses() {
        let mut s = SectionBuilder::new(4, 8, 1);
        let base = s.record_base();
        assert_eq!(base % 2, 0, "base must be divisible by 2^align_pow for this scenario");
        s.size_t(0); // num_args = 0
        let fmt_off = s.reserve_size_t();
        s.size_t(1); // formatter_id = literal
        let fmt_rel = s.rel(base);
        s.raw(b"aligned\0");
        s.patch_size_t(fmt_off, fmt_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at((base / 2) as u64);
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "aligned");
    }

    /// Scenario 1: little-endian int32 print.
    #[test]
    fn scenario_int_print() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(1); // num_args
        let fmt_off = s.reserve_size_t();
        let type_off = s.reserve_size_t();
        s.size_t(4); // raw_size
        s.size_t(0); // num_children
        s.size_t(0); // formatter_id = curly
        let fmt_rel = s.rel(base);
        s.raw(b"x={}\0");
        let type_rel = s.rel(base);
        s.raw(b"int32_t\0");
        s.patch_size_t(fmt_off, fmt_rel);
        s.patch_size_t(type_off, type_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at(base as u64);
        stream.get_mut().extend_from_slice(&0x2Ai32.to_le_bytes());
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x=42");
    }

    /// Scenario 2: null-terminated string argument.
    #[test]
    fn scenario_null_terminated_string() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(1); // num_args
        let fmt_off = s.reserve_size_t();
        let type_off = s.reserve_size_t();
        s.size_t(0xFFFF_FFFE); // raw_size: the null_terminated sentinel
        s.size_t(0); // num_children
        s.size_t(0); // formatter_id = curly
        let fmt_rel = s.rel(base);
        s.raw(b"hi {}\0");
        let type_rel = s.rel(base);
        s.raw(b"string\0");
        s.patch_size_t(fmt_off, fmt_rel);
        s.patch_size_t(type_off, type_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at(base as u64);
        stream.get_mut().extend_from_slice(b"world\0");
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hi world");
    }

    /// Scenario 3: length-prefixed list of int, joined with ", ".
    #[test]
    fn scenario_length_prefixed_list() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(1); // num_args
        let fmt_off = s.reserve_size_t();
        // param 0: list, length_prefixed, one child named "" of type int
        let list_name_off = s.reserve_size_t();
        s.size_t(0xFFFF_FFFD); // raw_size: the length_prefixed sentinel
        s.size_t(1); // num_children
        // child: name_off, raw_size, num_children, type_name_off
        let child_name_off = s.reserve_size_t();
        s.size_t(4); // child raw_size = 4
        s.size_t(0); // child num_children
        let child_type_off = s.reserve_size_t();
        s.size_t(0); // formatter_id = curly

        let fmt_rel = s.rel(base);
        s.raw(b"{:, *d}\0");
        let list_name_rel = s.rel(base);
        s.raw(b"list\0");
        let child_name_rel = s.rel(base);
        s.raw(b"\0"); // child name ""
        let child_type_rel = s.rel(base);
        s.raw(b"int\0");

        s.patch_size_t(fmt_off, fmt_rel);
        s.patch_size_t(list_name_off, list_name_rel);
        s.patch_size_t(child_name_off, child_name_rel);
        s.patch_size_t(child_type_off, child_type_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at(base as u64);
        stream.get_mut().extend_from_slice(&3u32.to_le_bytes());
        stream.get_mut().extend_from_slice(&1i32.to_le_bytes());
        stream.get_mut().extend_from_slice(&2i32.to_le_bytes());
        stream.get_mut().extend_from_slice(&3i32.to_le_bytes());
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1, 2, 3");
    }

    /// Scenario 4: truncation mid-argument is fatal and reports context.
    #[test]
    fn scenario_truncation_mid_argument() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(1);
        let fmt_off = s.reserve_size_t();
        let type_off = s.reserve_size_t();
        s.size_t(4);
        s.size_t(0);
        s.size_t(0);
        let fmt_rel = s.rel(base);
        s.raw(b"x={}\0");
        let type_rel = s.rel(base);
        s.raw(b"int32_t\0");
        s.patch_size_t(fmt_off, fmt_rel);
        s.patch_size_t(type_off, type_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at(base as u64);
        stream.get_mut().extend_from_slice(&[0x2a, 0x00]); // only 2 of 4 bytes
        let mut out = Vec::new();
        let err = driver.run(&mut stream, &mut out).unwrap_err();
        match err {
            Error::EndOfStream(e) => {
                assert_eq!(e.fmt_string, "x={}");
                assert!(e.parsed.is_empty());
                assert_eq!(e.leftover, 2);
            }
            other => panic!("expected EndOfStream, got {:?}", other),
        }
    }

    /// Scenario 5: a format error (too few parsed args for the placeholders)
    /// is soft — the driver logs and moves on to the next record rather than
    /// aborting the whole stream.
    #[test]
    fn scenario_format_error_is_non_fatal() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(1); // num_args: only one param even though fmt wants two
        let fmt_off = s.reserve_size_t();
        let type_off = s.reserve_size_t();
        s.size_t(4);
        s.size_t(0);
        s.size_t(0);
        let fmt_rel = s.rel(base);
        s.raw(b"{} {}\0");
        let type_rel = s.rel(base);
        s.raw(b"int32_t\0");
        s.patch_size_t(fmt_off, fmt_rel);
        s.patch_size_t(type_off, type_rel);

        let second_base = s.record_base();
        s.size_t(0); // num_args = 0
        let second_fmt_off = s.reserve_size_t();
        s.size_t(1); // formatter_id = literal
        let second_fmt_rel = s.rel(second_base);
        s.raw(b"ok\0");
        s.patch_size_t(second_fmt_off, second_fmt_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::None).unwrap();
        let mut stream = stream_starting_at(base as u64);
        stream.get_mut().extend_from_slice(&7i32.to_le_bytes());
        stream
            .get_mut()
            .extend_from_slice(&(second_base as u64).to_le_bytes());
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        // The first record's format error is logged and skipped; only the
        // second record's literal text reaches the sink.
        assert_eq!(String::from_utf8(out).unwrap(), "ok");
    }

    /// Scenario 6: multi-line output gets the source-location prefix on the
    /// right line and subsequent lines indented to `2 + min_path_length`.
    #[test]
    fn scenario_multiline_source_loc_alignment() {
        let mut s = SectionBuilder::new(4, 8, 0);
        let base = s.record_base();
        s.size_t(0); // num_args = 0
        let fmt_off = s.reserve_size_t();
        s.size_t(1); // formatter_id = literal
        let file_off = s.reserve_size_t();
        s.size_t(10); // line

        let fmt_rel = s.rel(base);
        s.raw(b"hello\nworld\n\0");
        let file_rel = s.rel(base);
        s.raw(b"foo.c\0");
        s.patch_size_t(fmt_off, fmt_rel);
        s.patch_size_t(file_off, file_rel);

        let mut driver = Decoder::driver(&s.bytes, SourceLocMode::Absolute).unwrap();
        let mut stream = stream_starting_at(base as u64);
        let mut out = Vec::new();
        driver.run(&mut stream, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "foo.c:10: hello\n          world\n");
    }
}
