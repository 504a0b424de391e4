//! ELF64 container parser.
//!
//! Accepts little-endian ELF64 executables (`ET_EXEC`) and shared objects (`ET_DYN`)
//! only. The parser materializes `PT_LOAD` segments into the memory image (file bytes
//! plus a zero-filled BSS tail), extracts static and dynamic symbol tables, decodes and
//! applies `SHT_RELA` / `SHT_REL` relocations through the
//! [relocation engine](crate::loader::reloc), and hands any `.debug_*` sections to the
//! [DWARF reader](crate::loader::dwarf).
//!
//! Layout notes:
//! - The single address space is named `"ram"` and spans the union of `PT_LOAD` ranges.
//! - `load_bias` is the minimum loaded virtual address for `ET_DYN`, 0 for `ET_EXEC`.
//! - For `SHT_REL` entries the implicit addend is the in-place word at
//!   `r_offset + load_bias`, read before application.
//!
//! A DWARF failure never fails the load; it is recorded through
//! [`Program::set_debug_error`] and the container-level program is retained.

use bitflags::bitflags;

use crate::{
    file::{parser::Parser, File},
    loader::{
        dwarf::{DwarfReader, DwarfSections},
        reloc::{self, RelocOutcome},
        resolver,
    },
    program::{
        AddressSpace, MemoryRegion, Program, Relocation, Symbol, SymbolKind, Type, TypeKind,
    },
    Result,
};

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

const PT_LOAD: u32 = 1;

const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;
const SHT_REL: u32 = 9;
const SHT_DYNSYM: u32 = 11;

const STT_NOTYPE: u8 = 0;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;
const STT_SECTION: u8 = 3;

const PHDR_SIZE: u16 = 56;
const SHDR_SIZE: u16 = 64;
const SYM_SIZE: u64 = 24;
const RELA_SIZE: u64 = 24;
const REL_SIZE: u64 = 16;

bitflags! {
    /// Program header permission flags (`p_flags`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        /// Segment is executable
        const EXECUTE = 0x1;
        /// Segment is writable
        const WRITE = 0x2;
        /// Segment is readable
        const READ = 0x4;
    }
}

/// The ELF64 file header.
#[derive(Debug, Clone)]
pub struct ElfHeader {
    /// Identification bytes: magic, class, data encoding, version, ABI
    pub e_ident: [u8; 16],
    /// Object file type (`ET_EXEC`, `ET_DYN`, ...)
    pub e_type: u16,
    /// Target machine
    pub e_machine: u16,
    /// Object file version
    pub e_version: u32,
    /// Entry point virtual address
    pub e_entry: u64,
    /// Program header table file offset
    pub e_phoff: u64,
    /// Section header table file offset
    pub e_shoff: u64,
    /// Processor-specific flags
    pub e_flags: u32,
    /// ELF header size
    pub e_ehsize: u16,
    /// Size of one program header entry
    pub e_phentsize: u16,
    /// Number of program header entries
    pub e_phnum: u16,
    /// Size of one section header entry
    pub e_shentsize: u16,
    /// Number of section header entries
    pub e_shnum: u16,
    /// Section name string table index
    pub e_shstrndx: u16,
}

impl ElfHeader {
    fn read(parser: &mut Parser) -> Result<ElfHeader> {
        let mut e_ident = [0_u8; 16];
        e_ident.copy_from_slice(parser.read_bytes(16)?);

        Ok(ElfHeader {
            e_ident,
            e_type: parser.read_le::<u16>()?,
            e_machine: parser.read_le::<u16>()?,
            e_version: parser.read_le::<u32>()?,
            e_entry: parser.read_le::<u64>()?,
            e_phoff: parser.read_le::<u64>()?,
            e_shoff: parser.read_le::<u64>()?,
            e_flags: parser.read_le::<u32>()?,
            e_ehsize: parser.read_le::<u16>()?,
            e_phentsize: parser.read_le::<u16>()?,
            e_phnum: parser.read_le::<u16>()?,
            e_shentsize: parser.read_le::<u16>()?,
            e_shnum: parser.read_le::<u16>()?,
            e_shstrndx: parser.read_le::<u16>()?,
        })
    }
}

/// One ELF64 program header.
#[derive(Debug, Clone)]
pub struct ProgramHeader {
    /// Segment type (`PT_LOAD`, ...)
    pub p_type: u32,
    /// Permission flags
    pub p_flags: u32,
    /// File offset of the segment bytes
    pub p_offset: u64,
    /// Virtual load address
    pub p_vaddr: u64,
    /// Physical address, unused here
    pub p_paddr: u64,
    /// File-backed size
    pub p_filesz: u64,
    /// In-memory size
    pub p_memsz: u64,
    /// Alignment constraint
    pub p_align: u64,
}

impl ProgramHeader {
    fn read(parser: &mut Parser) -> Result<ProgramHeader> {
        Ok(ProgramHeader {
            p_type: parser.read_le::<u32>()?,
            p_flags: parser.read_le::<u32>()?,
            p_offset: parser.read_le::<u64>()?,
            p_vaddr: parser.read_le::<u64>()?,
            p_paddr: parser.read_le::<u64>()?,
            p_filesz: parser.read_le::<u64>()?,
            p_memsz: parser.read_le::<u64>()?,
            p_align: parser.read_le::<u64>()?,
        })
    }
}

/// One ELF64 section header.
#[derive(Debug, Clone)]
pub struct SectionHeader {
    /// Offset of the section name in the section name string table
    pub sh_name: u32,
    /// Section type (`SHT_SYMTAB`, `SHT_RELA`, ...)
    pub sh_type: u32,
    /// Section flags
    pub sh_flags: u64,
    /// Virtual address, 0 for unmapped sections
    pub sh_addr: u64,
    /// File offset of the section bytes
    pub sh_offset: u64,
    /// Section size in bytes
    pub sh_size: u64,
    /// Associated section index (string table for symbol tables, symbol table for
    /// relocation sections)
    pub sh_link: u32,
    /// Type-specific extra information
    pub sh_info: u32,
    /// Alignment constraint
    pub sh_addralign: u64,
    /// Size of one table entry for table-like sections
    pub sh_entsize: u64,
}

impl SectionHeader {
    fn read(parser: &mut Parser) -> Result<SectionHeader> {
        Ok(SectionHeader {
            sh_name: parser.read_le::<u32>()?,
            sh_type: parser.read_le::<u32>()?,
            sh_flags: parser.read_le::<u64>()?,
            sh_addr: parser.read_le::<u64>()?,
            sh_offset: parser.read_le::<u64>()?,
            sh_size: parser.read_le::<u64>()?,
            sh_link: parser.read_le::<u32>()?,
            sh_info: parser.read_le::<u32>()?,
            sh_addralign: parser.read_le::<u64>()?,
            sh_entsize: parser.read_le::<u64>()?,
        })
    }
}

/// One ELF64 symbol table entry.
#[derive(Debug, Clone)]
struct ElfSymbol {
    st_name: u32,
    st_info: u8,
    st_shndx: u16,
    st_value: u64,
    st_size: u64,
}

impl ElfSymbol {
    fn read(parser: &mut Parser) -> Result<ElfSymbol> {
        let st_name = parser.read_le::<u32>()?;
        let st_info = parser.read_le::<u8>()?;
        let _st_other = parser.read_le::<u8>()?;
        let st_shndx = parser.read_le::<u16>()?;
        let st_value = parser.read_le::<u64>()?;
        let st_size = parser.read_le::<u64>()?;

        Ok(ElfSymbol {
            st_name,
            st_info,
            st_shndx,
            st_value,
            st_size,
        })
    }
}

fn symbol_kind(st_type: u8) -> SymbolKind {
    match st_type {
        STT_FUNC => SymbolKind::Function,
        STT_OBJECT => SymbolKind::Data,
        STT_SECTION => SymbolKind::Label,
        _ => SymbolKind::Unknown,
    }
}

/// NUL-terminated lookup into a string table blob. Out-of-range offsets and
/// unterminated tails both yield a bounded (possibly empty) string.
fn read_string(table: &[u8], offset: u32) -> String {
    let offset = offset as usize;
    if offset >= table.len() {
        return String::new();
    }
    let tail = &table[offset..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

fn read_blob(file: &File, offset: u64, size: u64) -> Result<Vec<u8>> {
    Ok(file.data_slice(offset as usize, size as usize)?.to_vec())
}

/// Read up to `count` fixed-size entries starting at `offset`, stopping silently at a
/// truncated tail. A symbol or relocation table cut short by the end of the file keeps
/// the entries that decoded completely.
fn read_entries<T>(
    file: &File,
    offset: u64,
    count: usize,
    read_one: impl Fn(&mut Parser) -> Result<T>,
) -> Vec<T> {
    let offset = offset as usize;
    let avail = file.len().saturating_sub(offset);
    let Ok(blob) = file.data_slice(offset.min(file.len()), avail) else {
        return Vec::new();
    };

    let mut parser = Parser::new(blob);
    let mut entries = Vec::with_capacity(count.min(blob.len() / 8 + 1));
    for _ in 0..count {
        match read_one(&mut parser) {
            Ok(entry) => entries.push(entry),
            Err(_) => {
                log::warn!("table at {offset:#x} truncated after {} entries", entries.len());
                break;
            }
        }
    }
    entries
}

pub(crate) fn load(file: &File, program: &mut Program) -> Result<()> {
    let mut parser = Parser::new(file.data());
    let header = ElfHeader::read(&mut parser)
        .map_err(|_| malformed_error!("failed to read ELF header"))?;

    if &header.e_ident[0..4] != b"\x7FELF" {
        return Err(malformed_error!("not an ELF file"));
    }

    // class 2 = ELF64, data 1 = little-endian
    if header.e_ident[4] != 2 || header.e_ident[5] != 1 {
        return Err(malformed_error!("unsupported ELF class or endianness"));
    }

    if header.e_type != ET_EXEC && header.e_type != ET_DYN {
        return Err(malformed_error!("unsupported ELF type - {}", header.e_type));
    }

    if header.e_phoff == 0 || header.e_phnum == 0 {
        return Err(malformed_error!("ELF has no program headers"));
    }

    if header.e_phentsize != PHDR_SIZE {
        return Err(malformed_error!(
            "unexpected program header size - {}",
            header.e_phentsize
        ));
    }

    parser.seek(header.e_phoff as usize)?;

    let mut min_vaddr = u64::MAX;
    let mut max_vaddr = 0_u64;
    let mut found_load = false;

    for _ in 0..header.e_phnum {
        let phdr = ProgramHeader::read(&mut parser)
            .map_err(|_| malformed_error!("failed to read program header"))?;

        if phdr.p_type != PT_LOAD || phdr.p_memsz == 0 {
            continue;
        }

        let flags = SegmentFlags::from_bits_truncate(phdr.p_flags);
        program.memory_map_mut().add_region(MemoryRegion {
            start: phdr.p_vaddr,
            size: phdr.p_memsz,
            readable: flags.contains(SegmentFlags::READ),
            writable: flags.contains(SegmentFlags::WRITE),
            executable: flags.contains(SegmentFlags::EXECUTE),
        });

        let bytes = read_blob(file, phdr.p_offset, phdr.p_filesz)
            .map_err(|_| malformed_error!("failed to read segment bytes"))?;
        program.memory_image_mut().map_segment(phdr.p_vaddr, bytes);
        if phdr.p_memsz > phdr.p_filesz {
            program
                .memory_image_mut()
                .zero_fill(phdr.p_vaddr + phdr.p_filesz, phdr.p_memsz - phdr.p_filesz);
        }

        min_vaddr = min_vaddr.min(phdr.p_vaddr);
        max_vaddr = max_vaddr.max(phdr.p_vaddr + phdr.p_memsz);
        found_load = true;
    }

    if !found_load {
        return Err(malformed_error!("no loadable segments"));
    }

    if min_vaddr < max_vaddr {
        program.add_address_space(AddressSpace::new("ram", min_vaddr, max_vaddr - min_vaddr));
    }

    program.set_load_bias(if header.e_type == ET_DYN { min_vaddr } else { 0 });

    if header.e_shoff == 0 || header.e_shnum == 0 {
        return Ok(());
    }

    if header.e_shentsize != SHDR_SIZE {
        return Err(malformed_error!(
            "unexpected section header size - {}",
            header.e_shentsize
        ));
    }

    parser.seek(header.e_shoff as usize)?;
    let mut sections = Vec::with_capacity(header.e_shnum as usize);
    for _ in 0..header.e_shnum {
        sections.push(
            SectionHeader::read(&mut parser)
                .map_err(|_| malformed_error!("failed to read section header"))?,
        );
    }

    if header.e_shstrndx as usize >= sections.len() {
        return Err(malformed_error!(
            "invalid section string table index - {}",
            header.e_shstrndx
        ));
    }

    let shstr = &sections[header.e_shstrndx as usize];
    let shstrtab = read_blob(file, shstr.sh_offset, shstr.sh_size)
        .map_err(|_| malformed_error!("failed to read section string table"))?;

    // Symbol tables are collected up front: relocation sections reference them by
    // section index through sh_link.
    let mut string_tables: Vec<Vec<u8>> = vec![Vec::new(); sections.len()];
    let mut symbol_tables: Vec<Vec<ElfSymbol>> = vec![Vec::new(); sections.len()];

    for (index, shdr) in sections.iter().enumerate() {
        if shdr.sh_type != SHT_SYMTAB && shdr.sh_type != SHT_DYNSYM {
            continue;
        }
        if shdr.sh_entsize != SYM_SIZE || shdr.sh_size == 0 {
            continue;
        }
        let link = shdr.sh_link as usize;
        if link >= sections.len() || sections[link].sh_type != SHT_STRTAB {
            continue;
        }

        let Ok(strtab) = read_blob(file, sections[link].sh_offset, sections[link].sh_size) else {
            log::warn!("skipping symbol table {index}: unreadable string table");
            continue;
        };
        string_tables[index] = strtab;

        let count = (shdr.sh_size / shdr.sh_entsize) as usize;
        symbol_tables[index] = read_entries(file, shdr.sh_offset, count, ElfSymbol::read);

        for sym in &symbol_tables[index] {
            let st_type = sym.st_info & 0x0F;
            if st_type == STT_NOTYPE && sym.st_name == 0 {
                continue;
            }

            let name = read_string(&string_tables[index], sym.st_name);
            if name.is_empty() {
                continue;
            }

            let kind = symbol_kind(st_type);
            program.add_symbol(Symbol {
                name: name.clone(),
                address: sym.st_value,
                kind,
            });

            // Coarse data-shape hint: a sized object symbol becomes an integer type
            // of that size.
            if kind == SymbolKind::Data && sym.st_size > 0 {
                program.types_mut().add_type(Type {
                    kind: TypeKind::Integer,
                    name: format!("{name}_t"),
                    size: sym.st_size as u32,
                });
            }
        }
    }

    for shdr in &sections {
        if shdr.sh_type != SHT_RELA && shdr.sh_type != SHT_REL {
            continue;
        }
        if shdr.sh_entsize == 0 || shdr.sh_size == 0 {
            continue;
        }
        let expected = if shdr.sh_type == SHT_RELA { RELA_SIZE } else { REL_SIZE };
        if shdr.sh_entsize != expected {
            continue;
        }
        let link = shdr.sh_link as usize;
        if link >= sections.len() {
            continue;
        }

        let symtab = &symbol_tables[link];
        let strtab = &string_tables[link];

        let count = (shdr.sh_size / shdr.sh_entsize) as usize;
        let is_rela = shdr.sh_type == SHT_RELA;
        let entries = read_entries(file, shdr.sh_offset, count, |parser| {
            let r_offset = parser.read_le::<u64>()?;
            let r_info = parser.read_le::<u64>()?;
            let r_addend = if is_rela { parser.read_le::<i64>()? } else { 0 };
            Ok((r_offset, r_info, r_addend))
        });

        for (r_offset, r_info, r_addend) in entries {
            let r_type = (r_info & 0xFFFF_FFFF) as u32;
            let sym_index = (r_info >> 32) as usize;

            let mut relocation = Relocation {
                address: r_offset,
                r_type,
                addend: r_addend,
                ..Relocation::default()
            };

            if !is_rela {
                // REL carries its addend in the target word itself.
                match program.memory_image().read_u64(r_offset.wrapping_add(program.load_bias())) {
                    Some(word) => relocation.addend = word as i64,
                    None => relocation.note = "addend read failed".to_string(),
                }
            }

            let mut symbol_value = 0;
            if sym_index < symtab.len() {
                relocation.symbol = read_string(strtab, symtab[sym_index].st_name);
                symbol_value = symtab[sym_index].st_value;
            }

            let outcome = reloc::apply_x86_64(
                r_type,
                r_offset,
                symbol_value,
                relocation.addend,
                program.load_bias(),
                program.memory_image_mut(),
            );
            relocation.applied = outcome == RelocOutcome::Applied;
            if outcome == RelocOutcome::Unsupported && relocation.note.is_empty() {
                relocation.note = "unsupported relocation".to_string();
            }
            if !relocation.applied && relocation.note.is_empty() {
                relocation.note = "relocation not applied".to_string();
            }
            program.add_relocation(relocation);
        }
    }

    let mut debug_info_data = None;
    let mut debug_abbrev_data = None;
    let mut debug_line_data = None;
    let mut debug_str_data = None;

    for shdr in &sections {
        let slot = match read_string(&shstrtab, shdr.sh_name).as_str() {
            ".debug_info" => &mut debug_info_data,
            ".debug_abbrev" => &mut debug_abbrev_data,
            ".debug_line" => &mut debug_line_data,
            ".debug_str" => &mut debug_str_data,
            _ => continue,
        };
        match read_blob(file, shdr.sh_offset, shdr.sh_size) {
            Ok(blob) => *slot = Some(blob),
            Err(_) => log::warn!("unreadable debug section at {:#x}", shdr.sh_offset),
        }
    }

    if debug_info_data.is_some() && debug_abbrev_data.is_some() {
        let mut reader = DwarfReader::new(DwarfSections {
            debug_info: debug_info_data.as_deref(),
            debug_abbrev: debug_abbrev_data.as_deref(),
            debug_line: debug_line_data.as_deref(),
            debug_str: debug_str_data.as_deref(),
        });

        match reader.parse(program.debug_info_mut()) {
            Ok(()) => {
                if let Some(message) = reader.take_line_error() {
                    log::warn!("line program abandoned: {message}");
                    program.set_debug_error(message);
                }
            }
            Err(error) => {
                log::warn!("DWARF parse failed: {error}");
                program.set_debug_error(format!("DWARF parse failed: {error}"));
            }
        }
    }

    if !program.debug_info().types.is_empty() {
        let promoted = resolver::resolve(program.debug_info());
        for type_def in promoted {
            program.types_mut().add_type(type_def);
        }
    }

    Ok(())
}
