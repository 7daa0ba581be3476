//! Format record decoding (C5) and the address → record cache.

use std::collections::HashMap;

use crate::error::Error;
use crate::header::Header;
use crate::reader::MetadataReader;
use crate::types::{self, TypeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatterId {
    Curly,
    Literal,
    Printf,
}

impl FormatterId {
    pub fn from_raw(id: u128) -> Self {
        match id {
            0 => FormatterId::Curly,
            2 => FormatterId::Printf,
            _ => FormatterId::Literal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub type_id: String,
    pub info: TypeInfo,
}

#[derive(Debug, Clone)]
pub struct FormatRecord {
    pub fmt_string: String,
    pub params: Vec<Param>,
    pub formatter_id: FormatterId,
    pub file: String,
    pub line: u64,
}

/// Decode one format record at `base` (an already-rebased absolute offset
/// into the section), per C5. `with_src_loc` controls whether the trailing
/// file/line fields are present on the wire.
pub fn decode_record(
    reader: &MetadataReader,
    header: &Header,
    base: usize,
    with_src_loc: bool,
) -> Result<FormatRecord, Error> {
    let (num_args, pos) = reader.consume_size_t(base)?;
    let (fmt_string_offset, mut pos) = reader.consume_size_t(pos)?;
    let fmt_string = reader.read_cstring_at(base + fmt_string_offset as usize)?;

    let mut params = Vec::with_capacity(num_args as usize);
    for _ in 0..num_args {
        // A param entry and a type descriptor share the same leading triple
        // (type_name_offset, raw_size, num_children), so the same recursive
        // descent decodes both scalar and aggregate params uniformly.
        let (info, type_id, next) = types::decode_type(reader, header, base, pos)?;
        pos = next;
        params.push(Param { type_id, info });
    }

    let (formatter_id, mut pos) = reader.consume_size_t(pos)?;
    let formatter_id = FormatterId::from_raw(formatter_id);

    let (file, line) = if with_src_loc {
        let (file_offset, p) = reader.consume_size_t(pos)?;
        let (line, p) = reader.consume_size_t(p)?;
        pos = p;
        (reader.read_cstring_at(base + file_offset as usize)?, line as u64)
    } else {
        (String::new(), 0)
    };
    let _ = pos;

    Ok(FormatRecord {
        fmt_string,
        params,
        formatter_id,
        file,
        line,
    })
}

/// At-most-once-per-address cache over decoded format records (part of
/// C5's caching contract, owned by the driver for its whole lifetime).
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: HashMap<usize, FormatRecord>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Look up `addr` in the cache, or decode and insert it.
    pub fn get_or_decode(
        &mut self,
        reader: &MetadataReader,
        header: &Header,
        addr: usize,
        with_src_loc: bool,
    ) -> Result<&FormatRecord, Error> {
        if !self.entries.contains_key(&addr) {
            let record = decode_record(reader, header, addr, with_src_loc)?;
            self.entries.insert(addr, record);
        }
        Ok(self.entries.get(&addr).expect("just inserted"))
    }
}
