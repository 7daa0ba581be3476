//! Formatter dispatch (C7): render a format record's arguments through
//! one of the three `formatter_id` styles. All failures here are soft —
//! the caller logs and moves on to the next record, per C8's policy.

use crate::record::FormatterId;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct FormatError(pub String);

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render `fmt_string` against `values` per `style`. Style `1` (and any
/// value other than `0`/`2`) is a literal passthrough regardless of
/// `values`.
pub fn render(style: FormatterId, fmt_string: &str, values: &[Value]) -> Result<String, FormatError> {
    match style {
        FormatterId::Curly => render_curly(fmt_string, values),
        FormatterId::Printf => render_printf(fmt_string, values),
        FormatterId::Literal => Ok(fmt_string.to_string()),
    }
}

/// Curly-brace positional formatting (style 0): `{}` or `{:spec}`
/// placeholders, each consuming the next unconsumed value in order.
fn render_curly(fmt_string: &str, values: &[Value]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(fmt_string.len());
    let mut next_arg = 0usize;
    let bytes = fmt_string.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                out.push('{');
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                out.push('}');
                i += 2;
            }
            b'{' => {
                let rel_end = fmt_string[i..]
                    .find('}')
                    .ok_or_else(|| FormatError(format!("unterminated placeholder at byte {}", i)))?;
                let end = i + rel_end;
                let body = &fmt_string[i + 1..end];
                let spec = body.strip_prefix(':').unwrap_or(body);

                let value = values.get(next_arg).ok_or_else(|| {
                    FormatError(format!(
                        "format string references argument {} but only {} were parsed",
                        next_arg,
                        values.len()
                    ))
                })?;
                next_arg += 1;
                out.push_str(&render_curly_field(value, spec)?);
                i = end + 1;
            }
            b'}' => return Err(FormatError(format!("unmatched '}}' at byte {}", i))),
            _ => {
                let ch_len = fmt_string[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
                out.push_str(&fmt_string[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    Ok(out)
}

fn render_curly_field(value: &Value, spec: &str) -> Result<String, FormatError> {
    if let Some(star) = spec.find('*') {
        let sep = &spec[..star];
        let elem_spec = &spec[star + 1..];
        return render_list(value, sep, elem_spec);
    }

    match value {
        Value::Char(_) | Value::SChar(_) => {
            let wants_numeric = spec
                .chars()
                .last()
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false);
            if wants_numeric {
                Ok(render_scalar(value))
            } else {
                match value {
                    Value::Char(b) => Ok((*b as char).to_string()),
                    Value::SChar(s) => Ok((*s as u8 as char).to_string()),
                    _ => unreachable!(),
                }
            }
        }
        other => Ok(render_scalar(other)),
    }
}

fn render_list(value: &Value, sep: &str, elem_spec: &str) -> Result<String, FormatError> {
    match value {
        Value::List(items) => {
            let mut rendered = Vec::with_capacity(items.len());
            for item in items {
                rendered.push(render_curly_field(item, elem_spec)?);
            }
            Ok(rendered.join(sep))
        }
        other => Err(FormatError(format!(
            "list field spec applied to non-list value {:?}",
            other
        ))),
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::SignedInt(n) => n.to_string(),
        Value::UnsignedInt(n) => n.to_string(),
        Value::Char(b) => b.to_string(),
        Value::SChar(s) => s.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::F32(f) => f.to_string(),
        Value::F64(f) => f.to_string(),
        Value::Str(s) => s.clone(),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(render_scalar).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

/// Minimal C-style `printf` dispatch (style 2): no corpus crate covers
/// this, so conversions are hand-rolled against the closed set of
/// specifiers the emitter can produce (`%d %i %u %x %X %o %c %s %f %g
/// %p %%`), with optional width/precision digits consumed and ignored
/// beyond padding numeric width.
fn render_printf(fmt_string: &str, values: &[Value]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(fmt_string.len());
    let mut chars = fmt_string.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut width = String::new();
        while let Some(d) = chars.peek() {
            if d.is_ascii_digit() || *d == '.' || *d == '-' || *d == '0' {
                width.push(*d);
                chars.next();
            } else {
                break;
            }
        }

        let conv = chars
            .next()
            .ok_or_else(|| FormatError("dangling '%' at end of format string".to_string()))?;

        let value = values.get(next_arg).ok_or_else(|| {
            FormatError(format!(
                "format string references argument {} but only {} were parsed",
                next_arg,
                values.len()
            ))
        })?;
        next_arg += 1;

        let rendered = match conv {
            'd' | 'i' => format_signed(value)?,
            'u' => format_unsigned(value, 10)?,
            'x' => format_unsigned(value, 16)?,
            'X' => format_unsigned(value, 16)?.to_uppercase(),
            'o' => format_unsigned(value, 8)?,
            'c' => match value {
                Value::Char(b) => (*b as char).to_string(),
                Value::SChar(s) => (*s as u8 as char).to_string(),
                other => return Err(FormatError(format!("%c applied to non-char value {:?}", other))),
            },
            's' => match value {
                Value::Str(s) => s.clone(),
                other => return Err(FormatError(format!("%s applied to non-string value {:?}", other))),
            },
            'f' | 'g' | 'e' => match value {
                Value::F32(f) => f.to_string(),
                Value::F64(f) => f.to_string(),
                other => return Err(FormatError(format!("%{} applied to non-float value {:?}", conv, other))),
            },
            'p' => match value {
                Value::UnsignedInt(n) => format!("0x{:x}", n),
                other => return Err(FormatError(format!("%p applied to non-pointer value {:?}", other))),
            },
            other => return Err(FormatError(format!("unsupported printf conversion '%{}'", other))),
        };
        out.push_str(&rendered);
    }

    Ok(out)
}

fn format_signed(value: &Value) -> Result<String, FormatError> {
    match value {
        Value::SignedInt(n) => Ok(n.to_string()),
        Value::UnsignedInt(n) => Ok(n.to_string()),
        Value::Char(b) => Ok(b.to_string()),
        Value::SChar(s) => Ok(s.to_string()),
        other => Err(FormatError(format!("%d applied to non-integer value {:?}", other))),
    }
}

fn format_unsigned(value: &Value, radix: u32) -> Result<String, FormatError> {
    let n: u128 = match value {
        Value::UnsignedInt(n) => *n,
        Value::SignedInt(n) if *n >= 0 => *n as u128,
        Value::Char(b) => *b as u128,
        other => return Err(FormatError(format!("unsigned conversion applied to {:?}", other))),
    };
    Ok(match radix {
        16 => format!("{:x}", n),
        8 => format!("{:o}", n),
        _ => n.to_string(),
    })
}
