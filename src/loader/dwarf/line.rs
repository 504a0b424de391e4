//! DWARF line-number program interpreter.
//!
//! Executes one `.debug_line` program in its DWARF v4 shape and appends a
//! [`DebugLineEntry`](crate::program::DebugLineEntry) for every row the program
//! commits (`DW_LNS_copy` and every special opcode). Versions below 4 are rejected;
//! later versions are accepted but decoded with the v4 header layout.
//!
//! Only the registers this loader consumes are modeled: `address`, `file`, `line`
//! and `is_stmt`. Column, basic-block and ISA state are decoded and discarded.

use crate::{
    file::parser::Parser,
    program::{DebugInfo, DebugLineEntry},
    Result,
};

const DW_LNS_COPY: u8 = 1;
const DW_LNS_ADVANCE_PC: u8 = 2;
const DW_LNS_ADVANCE_LINE: u8 = 3;
const DW_LNS_SET_FILE: u8 = 4;
const DW_LNS_SET_COLUMN: u8 = 5;
const DW_LNS_NEGATE_STMT: u8 = 6;
const DW_LNS_SET_BASIC_BLOCK: u8 = 7;
const DW_LNS_CONST_ADD_PC: u8 = 8;
const DW_LNS_FIXED_ADVANCE_PC: u8 = 9;
const DW_LNS_SET_PROLOGUE_END: u8 = 10;
const DW_LNS_SET_EPILOGUE_BEGIN: u8 = 11;
const DW_LNS_SET_ISA: u8 = 12;

const DW_LNE_END_SEQUENCE: u8 = 1;

struct LineFile {
    name: String,
    dir_index: u32,
}

struct LineHeader {
    min_inst_length: u8,
    default_is_stmt: u8,
    line_base: i8,
    line_range: u8,
    opcode_base: u8,
    standard_opcode_lengths: Vec<u8>,
    include_dirs: Vec<String>,
    files: Vec<LineFile>,
}

/// Resolve the `file` register through the 1-based file and include-directory
/// tables. Returns `None` for an out-of-range file register - those rows are
/// not committed.
fn resolve_file(file: u32, header: &LineHeader) -> Option<String> {
    if file == 0 || file as usize > header.files.len() {
        return None;
    }
    let entry = &header.files[file as usize - 1];
    if entry.dir_index > 0 && entry.dir_index as usize <= header.include_dirs.len() {
        let dir = &header.include_dirs[entry.dir_index as usize - 1];
        if !dir.is_empty() {
            return Some(format!("{dir}/{}", entry.name));
        }
    }
    Some(entry.name.clone())
}

/// Run the line program at `offset` within `.debug_line`.
pub(crate) fn parse_line_program(data: &[u8], offset: u64, out: &mut DebugInfo) -> Result<()> {
    let mut parser = Parser::new(data);
    parser.seek(offset as usize)?;

    let unit_length = parser.read_le::<u32>()?;
    if unit_length == 0 || unit_length == 0xFFFF_FFFF {
        return Err(malformed_error!("invalid line program length"));
    }
    let unit_end = parser.pos() + unit_length as usize;

    let version = parser.read_le::<u16>()?;
    if version < 4 {
        return Err(malformed_error!("DWARF line version < 4 not supported"));
    }

    let header_length = parser.read_le::<u32>()?;
    let header_end = parser.pos() + header_length as usize;

    let min_inst_length = parser.read_le::<u8>()?;
    let _max_ops_per_inst = parser.read_le::<u8>()?;
    let default_is_stmt = parser.read_le::<u8>()?;
    let line_base = parser.read_le::<i8>()?;
    let line_range = parser.read_le::<u8>()?;
    let opcode_base = parser.read_le::<u8>()?;

    if line_range == 0 {
        return Err(malformed_error!("line program has a zero line_range"));
    }

    let mut standard_opcode_lengths = Vec::with_capacity(opcode_base.saturating_sub(1) as usize);
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(parser.read_le::<u8>()?);
    }

    let mut include_dirs = Vec::new();
    while parser.pos() < header_end {
        let dir = parser.read_cstring()?;
        if dir.is_empty() {
            break;
        }
        include_dirs.push(dir);
    }

    let mut files = Vec::new();
    while parser.pos() < header_end {
        let name = parser.read_cstring()?;
        if name.is_empty() {
            break;
        }
        let dir_index = parser.read_uleb128()?;
        let _mod_time = parser.read_uleb128()?;
        let _length = parser.read_uleb128()?;
        files.push(LineFile {
            name,
            dir_index: dir_index as u32,
        });
    }

    let header = LineHeader {
        min_inst_length,
        default_is_stmt,
        line_base,
        line_range,
        opcode_base,
        standard_opcode_lengths,
        include_dirs,
        files,
    };

    let mut address = 0_u64;
    let mut line = 1_u32;
    let mut file = 1_u32;
    let mut is_stmt = header.default_is_stmt != 0;

    while parser.pos() < unit_end {
        let opcode = parser.read_le::<u8>()?;

        if opcode == 0 {
            // extended opcode: ULEB length, then a sub-opcode
            let ext_len = parser.read_uleb128()?;
            let sub = parser.read_le::<u8>()?;
            if sub == DW_LNE_END_SEQUENCE {
                address = 0;
                line = 1;
                file = 1;
                is_stmt = header.default_is_stmt != 0;
            } else {
                let Some(skip) = ext_len.checked_sub(1) else {
                    return Err(crate::Error::OutOfBounds);
                };
                parser.skip(skip as usize)?;
            }
            continue;
        }

        if opcode < header.opcode_base {
            match opcode {
                DW_LNS_COPY => {
                    if let Some(name) = resolve_file(file, &header) {
                        out.lines.push(DebugLineEntry {
                            address,
                            line,
                            file: name,
                        });
                    }
                }
                DW_LNS_ADVANCE_PC => {
                    let advance = parser.read_uleb128()?;
                    address = address
                        .wrapping_add(advance.wrapping_mul(u64::from(header.min_inst_length)));
                }
                DW_LNS_ADVANCE_LINE => {
                    let delta = parser.read_sleb128()?;
                    line = (i64::from(line) + delta) as u32;
                }
                DW_LNS_SET_FILE => {
                    file = parser.read_uleb128()? as u32;
                }
                DW_LNS_SET_COLUMN | DW_LNS_SET_ISA => {
                    let _ = parser.read_uleb128()?;
                }
                DW_LNS_NEGATE_STMT => is_stmt = !is_stmt,
                DW_LNS_SET_BASIC_BLOCK | DW_LNS_SET_PROLOGUE_END | DW_LNS_SET_EPILOGUE_BEGIN => {}
                DW_LNS_CONST_ADD_PC => {
                    let adjusted = 255 - header.opcode_base;
                    address = address.wrapping_add(
                        u64::from(adjusted / header.line_range)
                            * u64::from(header.min_inst_length),
                    );
                }
                DW_LNS_FIXED_ADVANCE_PC => {
                    let advance = parser.read_le::<u16>()?;
                    address = address.wrapping_add(u64::from(advance));
                }
                _ => {
                    // vendor opcode: the header declares how many ULEB operands to drop
                    let arg_count = header
                        .standard_opcode_lengths
                        .get(opcode as usize - 1)
                        .copied()
                        .unwrap_or(0);
                    for _ in 0..arg_count {
                        let _ = parser.read_uleb128()?;
                    }
                }
            }
            continue;
        }

        // special opcode: advances address and line in one step, then commits
        let adjusted = opcode - header.opcode_base;
        address = address.wrapping_add(
            u64::from(adjusted / header.line_range) * u64::from(header.min_inst_length),
        );
        line = (i64::from(line)
            + i64::from(header.line_base)
            + i64::from(adjusted % header.line_range)) as u32;
        if let Some(name) = resolve_file(file, &header) {
            out.lines.push(DebugLineEntry {
                address,
                line,
                file: name,
            });
        }
    }

    Ok(())
}
