//! Mach-O 64-bit container parser.
//!
//! Accepts little-endian `MH_MAGIC_64` images only - no fat/universal wrappers. The
//! load-command list is walked sequentially using each command's `cmdsize`:
//! `LC_SEGMENT_64` commands are materialized into the memory image (file bytes plus a
//! zero-filled `vmsize` tail) together with their inline section records,
//! `LC_SYMTAB` contributes one function symbol per named `nlist_64` entry, and
//! `LC_DYSYMTAB` local relocation records are decoded but never applied - consumers
//! must treat Mach-O images as non-fixed-up.

use crate::{
    file::{parser::Parser, File},
    program::{
        AddressSpace, MemoryRegion, Program, Relocation, Section, Segment, Symbol, SymbolKind,
    },
    Result,
};

const MH_MAGIC_64: u32 = 0xFEED_FACF;

const LC_SEGMENT_64: u32 = 0x19;
const LC_SYMTAB: u32 = 0x2;
const LC_DYSYMTAB: u32 = 0xB;

const MACH_HEADER_SIZE: usize = 32;
const LOAD_COMMAND_SIZE: u32 = 8;
const SEGMENT_COMMAND_SIZE: u32 = 72;
const SECTION_SIZE: usize = 80;
const SYMTAB_COMMAND_SIZE: u32 = 24;
const DYSYMTAB_COMMAND_SIZE: u32 = 80;
const NLIST_SIZE: usize = 16;
const RELOCATION_INFO_SIZE: usize = 8;

// initprot permission bits
const VM_PROT_READ: u32 = 1;
const VM_PROT_WRITE: u32 = 2;
const VM_PROT_EXECUTE: u32 = 4;

/// The Mach-O 64-bit file header.
#[derive(Debug, Clone)]
pub struct MachHeader {
    /// `MH_MAGIC_64`
    pub magic: u32,
    /// CPU family
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// Image kind (executable, dylib, ...)
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Total size of the load command list
    pub sizeofcmds: u32,
    /// Image flags
    pub flags: u32,
}

impl MachHeader {
    fn read(parser: &mut Parser) -> Result<MachHeader> {
        let header = MachHeader {
            magic: parser.read_le::<u32>()?,
            cputype: parser.read_le::<u32>()?,
            cpusubtype: parser.read_le::<u32>()?,
            filetype: parser.read_le::<u32>()?,
            ncmds: parser.read_le::<u32>()?,
            sizeofcmds: parser.read_le::<u32>()?,
            flags: parser.read_le::<u32>()?,
        };
        parser.skip(4)?; // reserved
        Ok(header)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SymtabCommand {
    symoff: u32,
    nsyms: u32,
    stroff: u32,
    strsize: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct DysymtabCommand {
    locreloff: u32,
    nlocrel: u32,
}

fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn table_string(table: &[u8], offset: u32) -> String {
    let offset = offset as usize;
    if offset >= table.len() {
        return String::new();
    }
    fixed_string(&table[offset..])
}

pub(crate) fn load(file: &File, program: &mut Program) -> Result<()> {
    let mut parser = Parser::new(file.data());
    let header =
        MachHeader::read(&mut parser).map_err(|_| malformed_error!("unsupported Mach-O header"))?;
    if header.magic != MH_MAGIC_64 {
        return Err(malformed_error!("unsupported Mach-O header"));
    }

    let mut min_vaddr = u64::MAX;
    let mut max_vaddr = 0_u64;

    let mut symtab = SymtabCommand::default();
    let mut dysymtab = DysymtabCommand::default();
    let mut has_symtab = false;

    let mut cmd_offset = MACH_HEADER_SIZE;
    for _ in 0..header.ncmds {
        parser
            .seek(cmd_offset)
            .map_err(|_| malformed_error!("failed to read load command"))?;
        let cmd = parser.read_le::<u32>()?;
        let cmdsize = parser.read_le::<u32>()?;
        if cmdsize < LOAD_COMMAND_SIZE {
            return Err(malformed_error!("failed to read load command"));
        }

        match cmd {
            LC_SEGMENT_64 if cmdsize >= SEGMENT_COMMAND_SIZE => {
                parser.skip(16)?; // segment name, the inline sections carry the useful ones
                let vmaddr = parser.read_le::<u64>()?;
                let vmsize = parser.read_le::<u64>()?;
                let fileoff = parser.read_le::<u64>()?;
                let filesize = parser.read_le::<u64>()?;
                let _maxprot = parser.read_le::<u32>()?;
                let initprot = parser.read_le::<u32>()?;
                let nsects = parser.read_le::<u32>()?;
                let _flags = parser.read_le::<u32>()?;

                program.add_segment(Segment {
                    vaddr: vmaddr,
                    memsz: vmsize,
                    filesz: filesize,
                    flags: u64::from(initprot),
                });

                program.memory_map_mut().add_region(MemoryRegion {
                    start: vmaddr,
                    size: vmsize,
                    readable: initprot & VM_PROT_READ != 0,
                    writable: initprot & VM_PROT_WRITE != 0,
                    executable: initprot & VM_PROT_EXECUTE != 0,
                });

                if filesize != 0 {
                    let bytes = file
                        .data_slice(fileoff as usize, filesize as usize)
                        .map_err(|_| malformed_error!("failed to read segment bytes"))?
                        .to_vec();
                    program.memory_image_mut().map_segment(vmaddr, bytes);
                }
                // a pure-BSS segment (filesize 0) still gets its zero fill
                if vmsize > filesize {
                    program
                        .memory_image_mut()
                        .zero_fill(vmaddr + filesize, vmsize - filesize);
                }

                min_vaddr = min_vaddr.min(vmaddr);
                max_vaddr = max_vaddr.max(vmaddr + vmsize);

                for s in 0..nsects as usize {
                    let sect_offset =
                        cmd_offset + SEGMENT_COMMAND_SIZE as usize + s * SECTION_SIZE;
                    parser
                        .seek(sect_offset)
                        .map_err(|_| malformed_error!("failed to read section"))?;
                    let sectname = fixed_string(parser.read_bytes(16)?);
                    parser.skip(16)?; // owning segment name
                    let addr = parser.read_le::<u64>()?;
                    let size = parser.read_le::<u64>()?;
                    let offset = parser.read_le::<u32>()?;
                    parser.skip(12)?; // align, reloff, nreloc
                    let flags = parser.read_le::<u32>()?;

                    if !sectname.is_empty() {
                        program.add_section(Section {
                            name: sectname,
                            address: addr,
                            size,
                            file_offset: u64::from(offset),
                            flags: u64::from(flags),
                        });
                    }
                }
            }
            LC_SYMTAB if cmdsize >= SYMTAB_COMMAND_SIZE => {
                symtab = SymtabCommand {
                    symoff: parser.read_le::<u32>()?,
                    nsyms: parser.read_le::<u32>()?,
                    stroff: parser.read_le::<u32>()?,
                    strsize: parser.read_le::<u32>()?,
                };
                has_symtab = true;
            }
            LC_DYSYMTAB if cmdsize >= DYSYMTAB_COMMAND_SIZE => {
                // the local-relocation fields sit at the tail of the command
                parser.skip(64)?;
                dysymtab = DysymtabCommand {
                    locreloff: parser.read_le::<u32>()?,
                    nlocrel: parser.read_le::<u32>()?,
                };
            }
            _ => {}
        }

        cmd_offset += cmdsize as usize;
    }

    if min_vaddr < max_vaddr {
        program.add_address_space(AddressSpace::new("image", min_vaddr, max_vaddr - min_vaddr));
    }

    if has_symtab {
        if let Ok(strtab) = file.data_slice(symtab.stroff as usize, symtab.strsize as usize) {
            let strtab = strtab.to_vec();
            for i in 0..symtab.nsyms as usize {
                let Ok(entry) = file.data_slice(symtab.symoff as usize + i * NLIST_SIZE, NLIST_SIZE)
                else {
                    log::warn!("symbol table truncated after {i} entries");
                    break;
                };
                let mut entry_parser = Parser::new(entry);
                let n_strx = entry_parser.read_le::<u32>()?;
                entry_parser.skip(4)?; // n_type, n_sect, n_desc
                let n_value = entry_parser.read_le::<u64>()?;

                let name = table_string(&strtab, n_strx);
                if name.is_empty() {
                    continue;
                }
                program.add_symbol(Symbol {
                    name,
                    address: n_value,
                    kind: SymbolKind::Function,
                });
            }
        } else {
            log::warn!("unreadable symbol string table");
        }
    }

    if dysymtab.nlocrel > 0 && dysymtab.locreloff != 0 {
        for i in 0..dysymtab.nlocrel as usize {
            let Ok(entry) = file.data_slice(
                dysymtab.locreloff as usize + i * RELOCATION_INFO_SIZE,
                RELOCATION_INFO_SIZE,
            ) else {
                log::warn!("local relocations truncated after {i} entries");
                break;
            };
            let mut entry_parser = Parser::new(entry);
            let r_address = entry_parser.read_le::<i32>()?;
            // packed word: symbolnum:24, pcrel:1, length:2, extern:1, type:4
            let packed = entry_parser.read_le::<u32>()?;

            program.add_relocation(Relocation {
                address: i64::from(r_address) as u64,
                r_type: packed >> 28,
                applied: false,
                note: "macho reloc".to_string(),
                ..Relocation::default()
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_string_truncates_at_nul() {
        assert_eq!(fixed_string(b"__TEXT\0\0\0\0\0\0\0\0\0\0"), "__TEXT");
        assert_eq!(fixed_string(b"0123456789abcdef"), "0123456789abcdef");
        assert_eq!(fixed_string(b"\0"), "");
    }

    #[test]
    fn table_string_bounds() {
        let table = b"\0_main\0";
        assert_eq!(table_string(table, 1), "_main");
        assert_eq!(table_string(table, 64), "");
    }
}
