//! PE / PE+ container parser.
//!
//! Accepts both `PE32` (0x10B) and `PE32+` (0x20B) optional headers; all produced
//! addresses are biased by `image_base`. Sections are materialized into the memory
//! image (raw bytes plus a zero-filled virtual tail), named exports become function
//! symbols, named imports become `"DLL!func"` external symbols, and base relocations
//! are round-tripped through the image to record coverage. A CodeView (`RSDS`) debug
//! directory entry contributes the referenced PDB path; the PDB itself is never read.
//!
//! Base relocations are a no-op rewrite in value - the image stays at `image_base`,
//! the `applied` flag records which fixups the image would accept.

use bitflags::bitflags;

use crate::{
    file::{parser::Parser, File},
    program::{
        AddressSpace, MemoryRegion, Program, Relocation, Section, Segment, Symbol, SymbolKind,
    },
    Result,
};

const DOS_MAGIC: u16 = 0x5A4D; // "MZ"
const NT_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const OPT_MAGIC_PE32: u16 = 0x10B;
const OPT_MAGIC_PE32_PLUS: u16 = 0x20B;

const OPT32_SIZE: usize = 224;
const OPT64_SIZE: usize = 240;
const IMPORT_DESCRIPTOR_SIZE: usize = 20;
const BASE_RELOC_BLOCK_SIZE: u32 = 8;
const DEBUG_DIRECTORY_SIZE: usize = 28;

const DIR_EXPORT: usize = 0;
const DIR_IMPORT: usize = 1;
const DIR_BASERELOC: usize = 5;
const DIR_DEBUG: usize = 6;

const RELOC_HIGHLOW: u32 = 3;
const RELOC_DIR64: u32 = 10;

const DEBUG_TYPE_CODEVIEW: u32 = 2;

bitflags! {
    /// PE section characteristics, restricted to the memory-permission bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionCharacteristics: u32 {
        /// Section is executable
        const MEM_EXECUTE = 0x2000_0000;
        /// Section is readable
        const MEM_READ = 0x4000_0000;
        /// Section is writable
        const MEM_WRITE = 0x8000_0000;
    }
}

/// One entry of the optional header's data directory table.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDirectory {
    /// RVA of the directory payload, 0 when absent
    pub virtual_address: u32,
    /// Payload size in bytes
    pub size: u32,
}

impl DataDirectory {
    fn read(parser: &mut Parser) -> Result<DataDirectory> {
        Ok(DataDirectory {
            virtual_address: parser.read_le::<u32>()?,
            size: parser.read_le::<u32>()?,
        })
    }
}

/// The COFF file header following the NT signature.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Target machine
    pub machine: u16,
    /// Number of section headers
    pub number_of_sections: u16,
    /// Link timestamp
    pub time_date_stamp: u32,
    /// Deprecated COFF symbol table offset
    pub pointer_to_symbol_table: u32,
    /// Deprecated COFF symbol count
    pub number_of_symbols: u32,
    /// Size of the optional header that follows
    pub size_of_optional_header: u16,
    /// Image characteristic flags
    pub characteristics: u16,
}

impl FileHeader {
    fn read(parser: &mut Parser) -> Result<FileHeader> {
        Ok(FileHeader {
            machine: parser.read_le::<u16>()?,
            number_of_sections: parser.read_le::<u16>()?,
            time_date_stamp: parser.read_le::<u32>()?,
            pointer_to_symbol_table: parser.read_le::<u32>()?,
            number_of_symbols: parser.read_le::<u32>()?,
            size_of_optional_header: parser.read_le::<u16>()?,
            characteristics: parser.read_le::<u16>()?,
        })
    }
}

/// The fields of the optional header this loader consumes, shared between the
/// `PE32` and `PE32+` layouts.
#[derive(Debug, Clone)]
struct OptionalHeader {
    is_pe32: bool,
    image_base: u64,
    headers_size: u32,
    dirs: [DataDirectory; 16],
}

impl OptionalHeader {
    /// Decode either optional header variant. Only the structure is validated; a
    /// `PE32` image simply carries a 32-bit `image_base`.
    fn read(parser: &mut Parser, size_of_optional_header: u16) -> Result<OptionalHeader> {
        let start = parser.pos();
        let magic = parser.read_le::<u16>()?;

        let (is_pe32, image_base) = match magic {
            OPT_MAGIC_PE32 if size_of_optional_header as usize >= OPT32_SIZE => {
                // standard fields: linker versions, code/data sizes, entry point,
                // base_of_code, base_of_data
                parser.skip(26)?;
                (true, u64::from(parser.read_le::<u32>()?))
            }
            OPT_MAGIC_PE32_PLUS if size_of_optional_header as usize >= OPT64_SIZE => {
                parser.skip(22)?;
                (false, parser.read_le::<u64>()?)
            }
            _ => return Err(malformed_error!("unsupported optional header - {magic:#x}")),
        };

        // section_alignment .. size_of_image
        parser.skip(28)?;
        let headers_size = parser.read_le::<u32>()?;
        // checksum, subsystem, dll_characteristics, stack/heap reserves, loader
        // flags, number_of_rva_and_sizes
        if is_pe32 {
            parser.skip(32)?;
        } else {
            parser.skip(48)?;
        }

        let mut dirs = [DataDirectory::default(); 16];
        for dir in &mut dirs {
            *dir = DataDirectory::read(parser)?;
        }

        // trailing directories beyond the fixed 16 are not interpreted
        parser.seek(start + size_of_optional_header as usize)?;

        Ok(OptionalHeader {
            is_pe32,
            image_base,
            headers_size,
            dirs,
        })
    }
}

/// One PE section header.
#[derive(Debug, Clone)]
pub struct SectionHeader {
    /// Raw 8-byte section name
    pub name: [u8; 8],
    /// In-memory size
    pub virtual_size: u32,
    /// RVA of the section
    pub virtual_address: u32,
    /// Size of the raw data on disk
    pub size_of_raw_data: u32,
    /// File offset of the raw data
    pub pointer_to_raw_data: u32,
    /// Section characteristic flags
    pub characteristics: u32,
}

impl SectionHeader {
    fn read(parser: &mut Parser) -> Result<SectionHeader> {
        let mut name = [0_u8; 8];
        name.copy_from_slice(parser.read_bytes(8)?);

        let virtual_size = parser.read_le::<u32>()?;
        let virtual_address = parser.read_le::<u32>()?;
        let size_of_raw_data = parser.read_le::<u32>()?;
        let pointer_to_raw_data = parser.read_le::<u32>()?;
        // relocation and line-number pointers are COFF-object leftovers
        parser.skip(12)?;
        let characteristics = parser.read_le::<u32>()?;

        Ok(SectionHeader {
            name,
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
            characteristics,
        })
    }

    /// Section name truncated at the first NUL.
    fn name_string(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

/// Translate an RVA to a file offset. Addresses below `headers_size` map identically;
/// anything else goes through the section table. Returns 0 for unmappable RVAs.
fn rva_to_file_offset(rva: u32, headers_size: u32, sections: &[SectionHeader]) -> u32 {
    if rva < headers_size {
        return rva;
    }
    for sec in sections {
        let start = sec.virtual_address;
        let end = sec.virtual_address + sec.virtual_size.max(sec.size_of_raw_data);
        if rva >= start && rva < end {
            return sec.pointer_to_raw_data + (rva - sec.virtual_address);
        }
    }
    0
}

/// NUL-terminated string at an absolute file offset. Offset 0 marks a failed RVA
/// translation and yields an empty string.
fn read_cstring_at(file: &File, offset: u32) -> String {
    if offset == 0 {
        return String::new();
    }
    let offset = offset as usize;
    if offset >= file.len() {
        return String::new();
    }
    let tail = &file.data()[offset..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

fn read_u32_at(file: &File, offset: usize) -> Option<u32> {
    let bytes = file.data_slice(offset, 4).ok()?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u16_at(file: &File, offset: usize) -> Option<u16> {
    let bytes = file.data_slice(offset, 2).ok()?;
    Some(u16::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64_at(file: &File, offset: usize) -> Option<u64> {
    let bytes = file.data_slice(offset, 8).ok()?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

pub(crate) fn load(file: &File, program: &mut Program) -> Result<()> {
    let mut parser = Parser::new(file.data());

    let dos_magic = parser
        .read_le::<u16>()
        .map_err(|_| malformed_error!("invalid DOS header"))?;
    if dos_magic != DOS_MAGIC {
        return Err(malformed_error!("invalid DOS header"));
    }

    // e_lfanew sits at the end of the DOS header, after the relocation and OEM fields
    parser
        .seek(0x3C)
        .map_err(|_| malformed_error!("invalid DOS header"))?;
    let lfanew = parser
        .read_le::<u32>()
        .map_err(|_| malformed_error!("invalid DOS header"))?;
    parser
        .seek(lfanew as usize)
        .map_err(|_| malformed_error!("invalid NT header offset - {lfanew:#x}"))?;

    let signature = parser
        .read_le::<u32>()
        .map_err(|_| malformed_error!("invalid NT signature"))?;
    if signature != NT_SIGNATURE {
        return Err(malformed_error!("invalid NT signature"));
    }

    let file_header =
        FileHeader::read(&mut parser).map_err(|_| malformed_error!("failed to read file header"))?;
    let optional = OptionalHeader::read(&mut parser, file_header.size_of_optional_header)?;
    let image_base = optional.image_base;

    let mut sections = Vec::with_capacity(file_header.number_of_sections as usize);
    for _ in 0..file_header.number_of_sections {
        sections.push(
            SectionHeader::read(&mut parser)
                .map_err(|_| malformed_error!("failed to read section headers"))?,
        );
    }

    let mut min_vaddr = u64::MAX;
    let mut max_vaddr = 0_u64;

    for sec in &sections {
        let name = sec.name_string();
        let vaddr = image_base + u64::from(sec.virtual_address);

        if !name.is_empty() {
            program.add_section(Section {
                name,
                address: vaddr,
                size: u64::from(sec.virtual_size),
                file_offset: u64::from(sec.pointer_to_raw_data),
                flags: u64::from(sec.characteristics),
            });
        }

        program.add_segment(Segment {
            vaddr,
            memsz: u64::from(sec.virtual_size),
            filesz: u64::from(sec.size_of_raw_data),
            flags: u64::from(sec.characteristics),
        });

        let characteristics = SectionCharacteristics::from_bits_truncate(sec.characteristics);
        program.memory_map_mut().add_region(MemoryRegion {
            start: vaddr,
            size: u64::from(sec.virtual_size),
            readable: characteristics.contains(SectionCharacteristics::MEM_READ),
            writable: characteristics.contains(SectionCharacteristics::MEM_WRITE),
            executable: characteristics.contains(SectionCharacteristics::MEM_EXECUTE),
        });

        min_vaddr = min_vaddr.min(vaddr);
        max_vaddr = max_vaddr.max(vaddr + u64::from(sec.virtual_size));

        if sec.size_of_raw_data != 0 {
            let bytes = file
                .data_slice(
                    sec.pointer_to_raw_data as usize,
                    sec.size_of_raw_data as usize,
                )
                .map_err(|_| malformed_error!("failed to read section data"))?
                .to_vec();
            program.memory_image_mut().map_segment(vaddr, bytes);
            if sec.virtual_size > sec.size_of_raw_data {
                program.memory_image_mut().zero_fill(
                    vaddr + u64::from(sec.size_of_raw_data),
                    u64::from(sec.virtual_size - sec.size_of_raw_data),
                );
            }
        }
    }

    if min_vaddr < max_vaddr {
        program.add_address_space(AddressSpace::new("image", min_vaddr, max_vaddr - min_vaddr));
    }
    program.set_load_bias(image_base);

    parse_exports(file, program, &optional, &sections, image_base);
    parse_imports(file, program, &optional, &sections, image_base);
    parse_base_relocs(file, program, &optional, &sections, image_base);
    parse_debug_directory(file, program, &optional, &sections);

    Ok(())
}

fn parse_exports(
    file: &File,
    program: &mut Program,
    optional: &OptionalHeader,
    sections: &[SectionHeader],
    image_base: u64,
) {
    let dir = optional.dirs[DIR_EXPORT];
    if dir.virtual_address == 0 {
        return;
    }
    let export_offset = rva_to_file_offset(dir.virtual_address, optional.headers_size, sections);
    if export_offset == 0 {
        return;
    }

    // ExportDirectory: the three parallel arrays sit at fixed offsets in the record
    let base = export_offset as usize;
    let Some(number_of_functions) = read_u32_at(file, base + 20) else { return };
    let Some(number_of_names) = read_u32_at(file, base + 24) else { return };
    let Some(address_of_functions) = read_u32_at(file, base + 28) else { return };
    let Some(address_of_names) = read_u32_at(file, base + 32) else { return };
    let Some(address_of_name_ordinals) = read_u32_at(file, base + 36) else { return };

    let names_offset = rva_to_file_offset(address_of_names, optional.headers_size, sections);
    let ord_offset = rva_to_file_offset(address_of_name_ordinals, optional.headers_size, sections);
    let func_offset = rva_to_file_offset(address_of_functions, optional.headers_size, sections);
    if names_offset == 0 || ord_offset == 0 || func_offset == 0 {
        return;
    }

    for i in 0..number_of_names as usize {
        let Some(name_rva) = read_u32_at(file, names_offset as usize + i * 4) else { break };
        let name = read_cstring_at(
            file,
            rva_to_file_offset(name_rva, optional.headers_size, sections),
        );
        if name.is_empty() {
            continue;
        }
        let Some(ordinal) = read_u16_at(file, ord_offset as usize + i * 2) else { break };
        if u32::from(ordinal) >= number_of_functions {
            continue;
        }
        let Some(func_rva) = read_u32_at(file, func_offset as usize + usize::from(ordinal) * 4)
        else {
            break;
        };

        program.add_symbol(Symbol {
            name,
            address: image_base + u64::from(func_rva),
            kind: SymbolKind::Function,
        });
    }
}

fn parse_imports(
    file: &File,
    program: &mut Program,
    optional: &OptionalHeader,
    sections: &[SectionHeader],
    image_base: u64,
) {
    let dir = optional.dirs[DIR_IMPORT];
    if dir.virtual_address == 0 {
        return;
    }
    let import_offset = rva_to_file_offset(dir.virtual_address, optional.headers_size, sections);
    if import_offset == 0 {
        return;
    }

    let thunk_size: usize = if optional.is_pe32 { 4 } else { 8 };
    let ordinal_bit: u64 = if optional.is_pe32 {
        0x8000_0000
    } else {
        0x8000_0000_0000_0000
    };

    // descriptor array terminated by an all-zero sentinel (name == 0)
    let mut desc_offset = import_offset as usize;
    loop {
        let Some(name_rva) = read_u32_at(file, desc_offset + 12) else { break };
        if name_rva == 0 {
            break;
        }
        let original_first_thunk = read_u32_at(file, desc_offset).unwrap_or(0);
        let first_thunk = read_u32_at(file, desc_offset + 16).unwrap_or(0);

        let dll = read_cstring_at(
            file,
            rva_to_file_offset(name_rva, optional.headers_size, sections),
        );
        let thunk_rva = if original_first_thunk != 0 {
            original_first_thunk
        } else {
            first_thunk
        };
        let thunk_offset = rva_to_file_offset(thunk_rva, optional.headers_size, sections);
        if thunk_offset == 0 {
            desc_offset += IMPORT_DESCRIPTOR_SIZE;
            continue;
        }

        for index in 0.. {
            let entry_offset = thunk_offset as usize + index * thunk_size;
            let thunk = if optional.is_pe32 {
                match read_u32_at(file, entry_offset) {
                    Some(value) => u64::from(value),
                    None => break,
                }
            } else {
                match read_u64_at(file, entry_offset) {
                    Some(value) => value,
                    None => break,
                }
            };
            if thunk == 0 {
                break;
            }
            if thunk & ordinal_bit != 0 {
                // ordinal-only import, no name record to read
                continue;
            }

            let hint_name_offset =
                rva_to_file_offset(thunk as u32, optional.headers_size, sections);
            if hint_name_offset == 0 {
                continue;
            }
            // skip the 2-byte hint in front of the name
            let func = read_cstring_at(file, hint_name_offset + 2);
            if !func.is_empty() {
                program.add_symbol(Symbol {
                    name: format!("{dll}!{func}"),
                    address: image_base + u64::from(thunk_rva),
                    kind: SymbolKind::External,
                });
            }
        }

        desc_offset += IMPORT_DESCRIPTOR_SIZE;
    }
}

fn parse_base_relocs(
    file: &File,
    program: &mut Program,
    optional: &OptionalHeader,
    sections: &[SectionHeader],
    image_base: u64,
) {
    let dir = optional.dirs[DIR_BASERELOC];
    if dir.virtual_address == 0 || dir.size == 0 {
        return;
    }
    let reloc_offset = rva_to_file_offset(dir.virtual_address, optional.headers_size, sections);
    if reloc_offset == 0 {
        return;
    }

    let mut cursor = reloc_offset;
    let end = reloc_offset + dir.size;
    while cursor + BASE_RELOC_BLOCK_SIZE <= end {
        let Some(page_rva) = read_u32_at(file, cursor as usize) else { break };
        let Some(block_size) = read_u32_at(file, cursor as usize + 4) else { break };
        if block_size < BASE_RELOC_BLOCK_SIZE {
            break;
        }

        let entry_count = (block_size - BASE_RELOC_BLOCK_SIZE) / 2;
        for i in 0..entry_count {
            let entry_offset = cursor as usize + BASE_RELOC_BLOCK_SIZE as usize + i as usize * 2;
            let Some(entry) = read_u16_at(file, entry_offset) else { break };

            let reloc_type = u32::from(entry >> 12);
            let page_offset = u64::from(entry & 0x0FFF);
            let address = image_base + u64::from(page_rva) + page_offset;

            let mut relocation = Relocation {
                address,
                r_type: reloc_type,
                ..Relocation::default()
            };

            // no base delta is applied: the read/write round-trip records whether
            // the image would accept the fixup
            match reloc_type {
                RELOC_HIGHLOW => match program.memory_image().read_u32(address) {
                    Some(value) => {
                        program.memory_image_mut().write_u32(address, value);
                        relocation.applied = true;
                    }
                    None => relocation.note = "reloc read failed".to_string(),
                },
                RELOC_DIR64 => match program.memory_image().read_u64(address) {
                    Some(value) => {
                        program.memory_image_mut().write_u64(address, value);
                        relocation.applied = true;
                    }
                    None => relocation.note = "reloc read failed".to_string(),
                },
                _ => relocation.note = "unsupported reloc".to_string(),
            }

            program.add_relocation(relocation);
        }

        cursor += block_size;
    }
}

fn parse_debug_directory(
    file: &File,
    program: &mut Program,
    optional: &OptionalHeader,
    sections: &[SectionHeader],
) {
    let dir = optional.dirs[DIR_DEBUG];
    if dir.virtual_address == 0 {
        return;
    }
    let debug_offset = rva_to_file_offset(dir.virtual_address, optional.headers_size, sections);
    if debug_offset == 0 {
        return;
    }

    let count = dir.size as usize / DEBUG_DIRECTORY_SIZE;
    for i in 0..count {
        let entry_offset = debug_offset as usize + i * DEBUG_DIRECTORY_SIZE;
        let Some(debug_type) = read_u32_at(file, entry_offset + 12) else { break };
        let Some(size_of_data) = read_u32_at(file, entry_offset + 16) else { break };
        let Some(pointer_to_raw_data) = read_u32_at(file, entry_offset + 24) else { break };

        if debug_type != DEBUG_TYPE_CODEVIEW || pointer_to_raw_data == 0 {
            continue;
        }

        let Ok(payload) = file.data_slice(pointer_to_raw_data as usize, size_of_data as usize)
        else {
            continue;
        };
        // RSDS record: 4-byte magic, 16-byte GUID, 4-byte age, then the PDB path
        if payload.len() > 24 && &payload[0..4] == b"RSDS" {
            let tail = &payload[24..];
            let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
            program.debug_info_mut().pdb_path =
                Some(String::from_utf8_lossy(&tail[..end]).into_owned());
        }
    }
}
