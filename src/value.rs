//! Stream value parsing (C6): pull exactly the bytes one typed argument
//! needs off the live trace stream and turn them into a [`Value`].

use std::fmt;
use std::io::Read;

use crate::endian::{read_uint, Endianness};
use crate::header::Header;
use crate::types::TypeInfo;

/// The blocking `read(n)` primitive the driver is built on: return up to
/// `n` bytes, short only at end of stream.
pub trait ByteSource {
    fn read_n(&mut self, n: usize) -> std::io::Result<Vec<u8>>;
}

impl<R: Read> ByteSource for R {
    fn read_n(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match self.read(&mut buf[filled..])? {
                0 => break,
                k => filled += k,
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

/// A polymorphic decoded argument value.
///
/// Character variants carry the raw byte so formatters can decide between
/// "character" and "numeric" rendering per field spec — the distinction
/// lives on the value, not the type.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    SignedInt(i128),
    UnsignedInt(u128),
    Char(u8),
    SChar(i8),
    Bool(bool),
    F32(f32),
    F64(f64),
    Str(String),
    List(Vec<Value>),
}

/// Failure pulling one value off the stream.
#[derive(Debug)]
pub enum ValueError {
    /// The stream ran dry; carries how many bytes were actually available
    /// in the read that came up short.
    EndOfStream { leftover: usize },
    /// Anything else: unrecognized type name, or a size/flag combination
    /// the closed type set forbids (e.g. a 3-byte float). Never fatal —
    /// the driver logs it and moves on.
    Soft(String),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ValueError::EndOfStream { leftover } => {
                write!(f, "end of stream ({} byte(s) available)", leftover)
            }
            ValueError::Soft(msg) => write!(f, "{}", msg),
        }
    }
}

fn read_exact(src: &mut dyn ByteSource, n: usize) -> Result<Vec<u8>, ValueError> {
    let bytes = src
        .read_n(n)
        .map_err(|e| ValueError::Soft(format!("I/O error reading {} byte(s): {}", n, e)))?;
    if bytes.len() < n {
        return Err(ValueError::EndOfStream {
            leftover: bytes.len(),
        });
    }
    Ok(bytes)
}

fn read_size_t(src: &mut dyn ByteSource, header: &Header) -> Result<u128, ValueError> {
    let bytes = read_exact(src, header.size_t_size as usize)?;
    Ok(read_uint(&bytes, header.endian))
}

fn read_cstring_until_nul(src: &mut dyn ByteSource) -> Result<String, ValueError> {
    let mut bytes = Vec::new();
    loop {
        let b = read_exact(src, 1)?;
        if b[0] == 0 {
            break;
        }
        bytes.push(b[0]);
    }
    String::from_utf8(bytes).map_err(|e| ValueError::Soft(format!("invalid UTF-8 in string: {}", e)))
}

fn f32_from_half(bits: u16) -> f32 {
    let sign = (bits >> 15) & 0x1;
    let exponent = (bits >> 10) & 0x1f;
    let mantissa = bits & 0x3ff;
    let value = if exponent == 0 {
        // subnormal or zero
        (mantissa as f32) * 2f32.powi(-24)
    } else if exponent == 0x1f {
        if mantissa == 0 {
            f32::INFINITY
        } else {
            f32::NAN
        }
    } else {
        (1.0 + mantissa as f32 / 1024.0) * 2f32.powi(exponent as i32 - 15)
    };
    if sign == 1 {
        -value
    } else {
        value
    }
}

fn read_float(src: &mut dyn ByteSource, header: &Header, min_size: u64) -> Result<Value, ValueError> {
    match min_size {
        2 => {
            let bytes = read_exact(src, 2)?;
            let bits = read_uint(&bytes, header.endian) as u16;
            Ok(Value::F32(f32_from_half(bits)))
        }
        4 => {
            let bytes = read_exact(src, 4)?;
            let bits = read_uint(&bytes, header.endian) as u32;
            Ok(Value::F32(f32::from_bits(bits)))
        }
        8 => {
            let bytes = read_exact(src, 8)?;
            let bits = read_uint(&bytes, header.endian) as u64;
            Ok(Value::F64(f64::from_bits(bits)))
        }
        other => Err(ValueError::Soft(format!(
            "float type requires min_size in {{2,4,8}}, got {}",
            other
        ))),
    }
}

fn read_signed(src: &mut dyn ByteSource, header: &Header, min_size: u64) -> Result<Value, ValueError> {
    let n = min_size as usize;
    if n == 0 || n > 16 {
        return Err(ValueError::Soft(format!("invalid integer width {}", n)));
    }
    let bytes = read_exact(src, n)?;
    let unsigned = read_uint(&bytes, header.endian);
    let bits = (n * 8) as u32;
    let sign_bit = 1u128 << (bits - 1);
    let signed = if bits == 128 {
        unsigned as i128
    } else if unsigned & sign_bit != 0 {
        (unsigned as i128) - (1i128 << bits)
    } else {
        unsigned as i128
    };
    Ok(Value::SignedInt(signed))
}

fn read_unsigned(src: &mut dyn ByteSource, header: &Header, min_size: u64) -> Result<Value, ValueError> {
    let n = min_size as usize;
    if n == 0 || n > 16 {
        return Err(ValueError::Soft(format!("invalid integer width {}", n)));
    }
    let bytes = read_exact(src, n)?;
    Ok(Value::UnsignedInt(read_uint(&bytes, header.endian)))
}

/// Type names this decoder recognizes, grouped by reader family.
mod families {
    pub const SIGNED: &[&str] = &[
        "signed",
        "int",
        "signed int",
        "int32_t",
        "long",
        "signed long",
        "long long",
        "signed long long",
        "int64_t",
        "int128_t",
        "short",
        "signed short",
        "int16_t",
        "ssize_t",
        "ptrdiff_t",
        "intptr_t",
    ];
    pub const SCHAR: &[&str] = &["signed char", "int8_t"];
    pub const UCHAR: &[&str] = &["char", "unsigned char", "uint8_t"];
    pub const UNSIGNED: &[&str] = &[
        "unsigned",
        "unsigned int",
        "uint32_t",
        "unsigned long",
        "unsigned long long",
        "uint64_t",
        "uint128_t",
        "uint16_t",
        "size_t",
        "uintptr_t",
        "*",
    ];
    pub const STRING: &[&str] = &["string"];
    pub const BOOL: &[&str] = &["bool", "_Bool"];
    pub const FLOAT: &[&str] = &["float", "double"];
    pub const LIST: &[&str] = &["list"];
}

/// Read one argument off the stream per the closed type-name table (C6).
pub fn read_value(
    src: &mut dyn ByteSource,
    header: &Header,
    type_id: &str,
    info: &TypeInfo,
) -> Result<Value, ValueError> {
    if families::LIST.contains(&type_id) {
        return read_list(src, header, info);
    }
    if families::STRING.contains(&type_id) {
        return read_string(src, header, info);
    }
    if families::SCHAR.contains(&type_id) {
        require_char_size(info)?;
        let b = read_exact(src, 1)?[0];
        return Ok(Value::SChar(b as i8));
    }
    if families::UCHAR.contains(&type_id) {
        require_char_size(info)?;
        let b = read_exact(src, 1)?[0];
        return Ok(Value::Char(b));
    }
    if families::BOOL.contains(&type_id) {
        let b = read_exact(src, 1)?[0];
        return Ok(Value::Bool(b != 0));
    }
    if families::FLOAT.contains(&type_id) {
        return read_float(src, header, info.size.min_size);
    }
    if families::SIGNED.contains(&type_id) {
        return read_signed(src, header, info.size.min_size);
    }
    if families::UNSIGNED.contains(&type_id) {
        return read_unsigned(src, header, info.size.min_size);
    }
    Err(ValueError::Soft(format!("unrecognized type name {:?}", type_id)))
}

fn require_char_size(info: &TypeInfo) -> Result<(), ValueError> {
    if info.size.min_size != 1 || info.size.length_prefixed || info.size.null_terminated {
        return Err(ValueError::Soft(format!(
            "character type requires min_size == 1 with no size flags, got {:?}",
            info.size
        )));
    }
    Ok(())
}

fn read_string(src: &mut dyn ByteSource, header: &Header, info: &TypeInfo) -> Result<Value, ValueError> {
    if info.size.length_prefixed && info.size.null_terminated {
        return Err(ValueError::Soft(
            "string cannot be both length_prefixed and null_terminated".into(),
        ));
    }
    if info.size.length_prefixed {
        let len = read_size_t(src, header)? as usize;
        let bytes = read_exact(src, len)?;
        let s = String::from_utf8(bytes)
            .map_err(|e| ValueError::Soft(format!("invalid UTF-8 in string: {}", e)))?;
        Ok(Value::Str(s))
    } else if info.size.null_terminated {
        Ok(Value::Str(read_cstring_until_nul(src)?))
    } else {
        let bytes = read_exact(src, info.size.min_size as usize)?;
        let s = String::from_utf8(bytes)
            .map_err(|e| ValueError::Soft(format!("invalid UTF-8 in string: {}", e)))?;
        Ok(Value::Str(s))
    }
}

/// One list still being filled in, on the explicit frontier `read_list`
/// walks. Mirrors `types.rs`'s `Frame`: a list-of-list-of-list trace value
/// is attacker/emitter-controlled metadata, not a program bug, so it must
/// not be able to blow the native call stack.
struct ListFrame<'i> {
    remaining: u64,
    values: Vec<Value>,
    element_type_id: &'i str,
    element_info: &'i TypeInfo,
}

fn push_list_frame<'i>(
    src: &mut dyn ByteSource,
    header: &Header,
    info: &'i TypeInfo,
    stack: &mut Vec<ListFrame<'i>>,
) -> Result<(), ValueError> {
    let element = info
        .list_element()
        .ok_or_else(|| ValueError::Soft("list type has no \"\"-named element child".into()))?;
    let count = if info.size.length_prefixed {
        read_size_t(src, header)? as u64
    } else {
        info.size.min_size
    };
    stack.push(ListFrame {
        remaining: count,
        values: Vec::with_capacity(count as usize),
        element_type_id: &element.type_id,
        element_info: &element.info,
    });
    Ok(())
}

fn read_list(src: &mut dyn ByteSource, header: &Header, info: &TypeInfo) -> Result<Value, ValueError> {
    let mut stack: Vec<ListFrame<'_>> = Vec::new();
    push_list_frame(src, header, info, &mut stack)?;

    loop {
        let remaining = stack.last().expect("frontier never empties early").remaining;
        if remaining == 0 {
            let frame = stack.pop().expect("checked above");
            let list_value = Value::List(frame.values);
            match stack.last_mut() {
                Some(parent) => parent.values.push(list_value),
                None => return Ok(list_value),
            }
        } else {
            let frame = stack.last_mut().expect("checked above");
            frame.remaining -= 1;
            let element_type_id = frame.element_type_id;
            let element_info = frame.element_info;

            if families::LIST.contains(&element_type_id) {
                push_list_frame(src, header, element_info, &mut stack)?;
            } else {
                let value = read_value(src, header, element_type_id, element_info)?;
                stack.last_mut().expect("just read from it above").values.push(value);
            }
        }
    }
}
