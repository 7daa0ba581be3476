//! Driver / line emitter (C8): the main loop that turns a trace stream
//! into formatted, source-location-prefixed lines.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::endian::read_uint_le;
use crate::error::{EndOfStream, Error};
use crate::format;
use crate::header::Header;
use crate::reader::MetadataReader;
use crate::record::RecordCache;
use crate::value::{self, ByteSource, Value, ValueError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocMode {
    None,
    Absolute,
    Relative,
}

/// How each decoded record reaches the sink: rendered through its
/// formatter (the default), or dumped as one newline-delimited JSON
/// object per record, bypassing C7 entirely — for callers that want the
/// structured argument values rather than formatted text (e.g. piping
/// into another tool), the same role the teacher's `OutputType::Json`
/// plays for `$MFT` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    fmt: &'a str,
    file: &'a str,
    line: u64,
    args: &'a [Value],
}

pub struct Driver<'s> {
    header: Header,
    reader: MetadataReader<'s>,
    section_offset: Option<i128>,
    cache: RecordCache,
    min_path_length: usize,
    new_line_missing: bool,
    src_loc_mode: SourceLocMode,
    output_mode: OutputMode,
}

impl<'s> Driver<'s> {
    pub fn new(header: Header, section: &'s [u8], src_loc_mode: SourceLocMode) -> Self {
        let reader = header.reader(section);
        Self {
            header,
            reader,
            section_offset: None,
            cache: RecordCache::new(),
            min_path_length: 0,
            new_line_missing: true,
            src_loc_mode,
            output_mode: OutputMode::default(),
        }
    }

    /// Switch to newline-delimited JSON output. Builder-style so existing
    /// `Driver::new` call sites are unaffected when they don't opt in.
    pub fn with_output_mode(mut self, output_mode: OutputMode) -> Self {
        self.output_mode = output_mode;
        self
    }

    /// Run until clean EOF or a fatal error.
    ///
    /// The very first `ptr_size` bytes of the stream are not a record: they
    /// are the target's observed `magic_address`, consumed once to derive
    /// `section_offset` before the record loop starts.
    pub fn run(&mut self, src: &mut dyn ByteSource, out: &mut dyn Write) -> Result<(), Error> {
        self.calibrate(src)?;
        while self.step(src, out)? {}
        Ok(())
    }

    fn calibrate(&mut self, src: &mut dyn ByteSource) -> Result<(), Error> {
        let ptr_size = self.header.ptr_size as usize;
        let addr_bytes = src.read_n(ptr_size)?;
        let magic_address = if addr_bytes.is_empty() {
            0
        } else if addr_bytes.len() < ptr_size {
            return Err(Error::ShortRead {
                wanted: ptr_size,
                got: addr_bytes.len(),
            });
        } else {
            read_uint_le(&addr_bytes)
        };
        let shifted = self.header.shift(magic_address);
        self.section_offset = Some(self.header.section_offset(shifted));
        Ok(())
    }

    /// Process one record. Returns `false` on clean EOF.
    fn step(&mut self, src: &mut dyn ByteSource, out: &mut dyn Write) -> Result<bool, Error> {
        let ptr_size = self.header.ptr_size as usize;
        let addr_bytes = src.read_n(ptr_size)?;
        if addr_bytes.is_empty() {
            return Ok(false);
        }
        if addr_bytes.len() < ptr_size {
            return Err(Error::ShortRead {
                wanted: ptr_size,
                got: addr_bytes.len(),
            });
        }

        let raw_addr = read_uint_le(&addr_bytes);
        let section_offset = self
            .section_offset
            .expect("calibrate() runs before the first step()");
        let base = self.header.rebase(raw_addr, section_offset)?;

        let with_src_loc = self.src_loc_mode != SourceLocMode::None || self.output_mode == OutputMode::Json;
        let record = self
            .cache
            .get_or_decode(&self.reader, &self.header, base, with_src_loc)?
            .clone();

        let mut values = Vec::with_capacity(record.params.len());
        for param in &record.params {
            match value::read_value(src, &self.header, &param.type_id, &param.info) {
                Ok(v) => values.push(v),
                Err(ValueError::EndOfStream { leftover }) => {
                    return Err(Error::EndOfStream(EndOfStream {
                        fmt_string: record.fmt_string.clone(),
                        file: record.file.clone(),
                        line: record.line,
                        parsed: values,
                        leftover,
                    }));
                }
                Err(ValueError::Soft(msg)) => {
                    log::warn!(
                        "format error decoding argument for \"{}\" ({}:{}): {}",
                        record.fmt_string,
                        record.file,
                        record.line,
                        msg
                    );
                    return Ok(true);
                }
            }
        }

        if self.output_mode == OutputMode::Json {
            self.emit_json(out, &record.fmt_string, &record.file, record.line, &values)?;
            return Ok(true);
        }

        let text = match format::render(record.formatter_id, &record.fmt_string, &values) {
            Ok(text) => text,
            Err(e) => {
                log::warn!(
                    "format error rendering \"{}\" ({}:{}): {}",
                    record.fmt_string,
                    record.file,
                    record.line,
                    e
                );
                return Ok(true);
            }
        };

        self.emit(out, &text, &record.file, record.line)?;
        Ok(true)
    }

    /// Serialize one decoded record as a single JSON object, newline-
    /// terminated. Bypasses C7 (`format::render`) and the source-location
    /// alignment bookkeeping entirely — the caller wants the structured
    /// values, not rendered text.
    fn emit_json(
        &self,
        out: &mut dyn Write,
        fmt: &str,
        file: &str,
        line: u64,
        args: &[Value],
    ) -> Result<(), Error> {
        let record = JsonRecord { fmt, file, line, args };
        let json = serde_json::to_string(&record).map_err(|e| Error::Serialize(e.to_string()))?;
        writeln!(out, "{}", json)?;
        Ok(())
    }

    fn emit(&mut self, out: &mut dyn Write, text: &str, file: &str, line: u64) -> Result<(), Error> {
        if self.src_loc_mode == SourceLocMode::None {
            write!(out, "{}", text)?;
            return Ok(());
        }

        let path = match self.src_loc_mode {
            SourceLocMode::Absolute => file.to_string(),
            SourceLocMode::Relative => relative_to_cwd(file),
            SourceLocMode::None => unreachable!(),
        };
        let loc = format!("{}:{}", path, line);
        self.min_path_length = self.min_path_length.max(loc.chars().count());
        let loc_padded = format!("{:<width$}", loc, width = self.min_path_length);

        let ends_with_newline = text.ends_with('\n');
        let mut lines: Vec<&str> = text.split('\n').collect();
        if ends_with_newline {
            lines.pop();
        }

        let indent = " ".repeat(2 + self.min_path_length);
        for (i, line_text) in lines.iter().enumerate() {
            let prefix = if i == 0 && self.new_line_missing {
                format!("{}: ", loc_padded)
            } else if i == 1 && !self.new_line_missing {
                format!("{}: ", loc_padded)
            } else if i > 0 {
                indent.clone()
            } else {
                String::new()
            };
            write!(out, "{}{}", prefix, line_text)?;
            if i + 1 < lines.len() || ends_with_newline {
                writeln!(out)?;
            }
        }

        self.new_line_missing = ends_with_newline;
        Ok(())
    }
}

/// Best-effort relative-path rendering against the current working
/// directory: strip the longest common ancestor, `..` for the rest.
fn relative_to_cwd(file: &str) -> String {
    let path = Path::new(file);
    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(_) => return file.to_string(),
    };
    match diff_paths(path, &cwd) {
        Some(rel) => rel.to_string_lossy().into_owned(),
        None => file.to_string(),
    }
}

fn diff_paths(path: &Path, base: &Path) -> Option<PathBuf> {
    let path_components: Vec<_> = path.components().collect();
    let base_components: Vec<_> = base.components().collect();

    let common = path_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &path_components[common..] {
        result.push(component.as_os_str());
    }
    Some(result)
}
