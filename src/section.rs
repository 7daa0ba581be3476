//! Section loader (C10, ambient): locate a named section inside a raw ELF
//! file by walking the section header table directly. This mirrors the
//! decoder's own stance on binary formats — a small, explicit parser
//! rather than a dependency on a full ELF crate, since the metadata table
//! itself is a tiny hand-rolled format read the same way.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::Error;

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Elf32,
    Elf64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Data {
    Little,
    Big,
}

/// Locate `name` among the section headers of `file` and return the byte
/// slice the section occupies.
pub fn find_section<'a>(file: &'a [u8], name: &str) -> Result<&'a [u8], Error> {
    let (offset, size) = locate(file, name)?;
    file.get(offset..offset + size)
        .ok_or_else(|| Error::section_missing(name))
}

fn locate(file: &[u8], name: &str) -> Result<(usize, usize), Error> {
    if file.len() < 20 || file[0..4] != ELF_MAGIC {
        return Err(Error::section_missing(name));
    }
    let class = match file[4] {
        1 => Class::Elf32,
        2 => Class::Elf64,
        _ => return Err(Error::section_missing(name)),
    };
    let data = match file[5] {
        1 => Data::Little,
        2 => Data::Big,
        _ => return Err(Error::section_missing(name)),
    };

    let (e_shoff, e_shentsize, e_shnum, e_shstrndx) = match (class, data) {
        (Class::Elf64, Data::Little) => read_header64::<LittleEndian>(file)?,
        (Class::Elf64, Data::Big) => read_header64::<BigEndian>(file)?,
        (Class::Elf32, Data::Little) => read_header32::<LittleEndian>(file)?,
        (Class::Elf32, Data::Big) => read_header32::<BigEndian>(file)?,
    };

    let shstrtab = read_section_header(file, class, data, e_shoff, e_shentsize, e_shstrndx)?;
    let (_, _, shstrtab_off, shstrtab_size) = shstrtab;
    let shstrtab_bytes = file
        .get(shstrtab_off..shstrtab_off + shstrtab_size)
        .ok_or_else(|| Error::section_missing(name))?;

    for idx in 0..e_shnum {
        let (name_off, _type, offset, size) =
            read_section_header(file, class, data, e_shoff, e_shentsize, idx)?;
        let section_name = read_cstr(shstrtab_bytes, name_off).unwrap_or_default();
        if section_name == name {
            return Ok((offset, size));
        }
    }
    Err(Error::section_missing(name))
}

fn read_header64<O: ByteOrder>(file: &[u8]) -> Result<(usize, usize, usize, usize), Error> {
    if file.len() < 64 {
        return Err(Error::section_missing("<elf header>"));
    }
    let e_shoff = O::read_u64(&file[40..48]) as usize;
    let e_shentsize = O::read_u16(&file[58..60]) as usize;
    let e_shnum = O::read_u16(&file[60..62]) as usize;
    let e_shstrndx = O::read_u16(&file[62..64]) as usize;
    Ok((e_shoff, e_shentsize, e_shnum, e_shstrndx))
}

fn read_header32<O: ByteOrder>(file: &[u8]) -> Result<(usize, usize, usize, usize), Error> {
    if file.len() < 52 {
        return Err(Error::section_missing("<elf header>"));
    }
    let e_shoff = O::read_u32(&file[32..36]) as usize;
    let e_shentsize = O::read_u16(&file[46..48]) as usize;
    let e_shnum = O::read_u16(&file[48..50]) as usize;
    let e_shstrndx = O::read_u16(&file[50..52]) as usize;
    Ok((e_shoff, e_shentsize, e_shnum, e_shstrndx))
}

/// Returns `(sh_name, sh_type, sh_offset, sh_size)`.
fn read_section_header(
    file: &[u8],
    class: Class,
    data: Data,
    e_shoff: usize,
    e_shentsize: usize,
    index: usize,
) -> Result<(usize, u32, usize, usize), Error> {
    let start = e_shoff + index * e_shentsize;
    let header = file
        .get(start..start + e_shentsize)
        .ok_or_else(|| Error::section_missing("<section header>"))?;

    Ok(match (class, data) {
        (Class::Elf64, Data::Little) => parse_shdr64::<LittleEndian>(header),
        (Class::Elf64, Data::Big) => parse_shdr64::<BigEndian>(header),
        (Class::Elf32, Data::Little) => parse_shdr32::<LittleEndian>(header),
        (Class::Elf32, Data::Big) => parse_shdr32::<BigEndian>(header),
    })
}

fn parse_shdr64<O: ByteOrder>(header: &[u8]) -> (usize, u32, usize, usize) {
    let sh_name = O::read_u32(&header[0..4]) as usize;
    let sh_type = O::read_u32(&header[4..8]);
    let sh_offset = O::read_u64(&header[24..32]) as usize;
    let sh_size = O::read_u64(&header[32..40]) as usize;
    (sh_name, sh_type, sh_offset, sh_size)
}

fn parse_shdr32<O: ByteOrder>(header: &[u8]) -> (usize, u32, usize, usize) {
    let sh_name = O::read_u32(&header[0..4]) as usize;
    let sh_type = O::read_u32(&header[4..8]);
    let sh_offset = O::read_u32(&header[16..20]) as usize;
    let sh_size = O::read_u32(&header[20..24]) as usize;
    (sh_name, sh_type, sh_offset, sh_size)
}

fn read_cstr(bytes: &[u8], offset: usize) -> Option<String> {
    let rest = bytes.get(offset..)?;
    let len = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..len]).ok().map(|s| s.to_string())
}
