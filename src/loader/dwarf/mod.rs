//! DWARF v4+ debug information reader.
//!
//! Walks `.debug_info` as a sequence of compilation units, resolving abbreviation
//! codes through `.debug_abbrev`, strings through `.debug_str`, and line programs
//! through `.debug_line`. The DIE tree is processed depth-first in stream order;
//! named subprograms become [`DebugFunction`](crate::program::DebugFunction) records,
//! type DIEs become [`DebugType`](crate::program::DebugType) records keyed by their
//! absolute DIE offset, and `DW_TAG_member` / `DW_TAG_subrange_type` children fill in
//! the enclosing composite through a type-scope stack.
//!
//! The scope stack holds *indices* into the growing type vector, never references -
//! pushing a new type must not invalidate the scope entries.
//!
//! DWARF64 (`unit_length == 0xffffffff`) and unit versions below 4 are rejected.
//! A failed line program is abandoned and surfaced once through
//! [`DwarfReader::take_line_error`]; the DIE walk continues past it.

mod forms;
mod line;

use rustc_hash::FxHashMap;

use crate::{
    file::parser::Parser,
    program::{DebugFunction, DebugInfo, DebugMember, DebugType, DebugTypeKind},
    Result,
};
use forms::{read_form, DW_FORM_ADDR};

const DW_TAG_ARRAY_TYPE: u64 = 0x01;
const DW_TAG_ENUMERATION_TYPE: u64 = 0x04;
const DW_TAG_MEMBER: u64 = 0x0D;
const DW_TAG_POINTER_TYPE: u64 = 0x0F;
const DW_TAG_COMPILE_UNIT: u64 = 0x11;
const DW_TAG_STRUCTURE_TYPE: u64 = 0x13;
const DW_TAG_SUBROUTINE_TYPE: u64 = 0x15;
const DW_TAG_TYPEDEF: u64 = 0x16;
const DW_TAG_UNION_TYPE: u64 = 0x17;
const DW_TAG_SUBRANGE_TYPE: u64 = 0x21;
const DW_TAG_BASE_TYPE: u64 = 0x24;
const DW_TAG_CONST_TYPE: u64 = 0x26;
const DW_TAG_SUBPROGRAM: u64 = 0x2E;
const DW_TAG_VOLATILE_TYPE: u64 = 0x35;

const DW_AT_NAME: u64 = 0x03;
const DW_AT_BYTE_SIZE: u64 = 0x0B;
const DW_AT_BIT_OFFSET: u64 = 0x0C;
const DW_AT_BIT_SIZE: u64 = 0x0D;
const DW_AT_STMT_LIST: u64 = 0x10;
const DW_AT_LOW_PC: u64 = 0x11;
const DW_AT_HIGH_PC: u64 = 0x12;
const DW_AT_LOWER_BOUND: u64 = 0x22;
const DW_AT_UPPER_BOUND: u64 = 0x2F;
const DW_AT_COUNT: u64 = 0x37;
const DW_AT_DATA_MEMBER_LOCATION: u64 = 0x38;
const DW_AT_TYPE: u64 = 0x49;
const DW_AT_DATA_BIT_OFFSET: u64 = 0x6B;
const DW_AT_ALIGNMENT: u64 = 0x88;

fn type_kind(tag: u64) -> Option<DebugTypeKind> {
    match tag {
        DW_TAG_BASE_TYPE => Some(DebugTypeKind::Base),
        DW_TAG_POINTER_TYPE => Some(DebugTypeKind::Pointer),
        DW_TAG_STRUCTURE_TYPE => Some(DebugTypeKind::Struct),
        DW_TAG_ARRAY_TYPE => Some(DebugTypeKind::Array),
        DW_TAG_TYPEDEF => Some(DebugTypeKind::Typedef),
        DW_TAG_UNION_TYPE => Some(DebugTypeKind::Union),
        DW_TAG_CONST_TYPE => Some(DebugTypeKind::Const),
        DW_TAG_VOLATILE_TYPE => Some(DebugTypeKind::Volatile),
        DW_TAG_ENUMERATION_TYPE => Some(DebugTypeKind::Enumeration),
        DW_TAG_SUBROUTINE_TYPE => Some(DebugTypeKind::Subroutine),
        _ => None,
    }
}

/// Borrowed views of the four DWARF sections this reader consumes.
///
/// The container parser copies each section into an owned buffer before parsing;
/// these views must not outlive those buffers.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DwarfSections<'a> {
    pub debug_info: Option<&'a [u8]>,
    pub debug_abbrev: Option<&'a [u8]>,
    pub debug_line: Option<&'a [u8]>,
    pub debug_str: Option<&'a [u8]>,
}

/// One entry of an abbreviation table.
#[derive(Debug, Clone)]
struct AbbrevEntry {
    tag: u64,
    has_children: bool,
    /// `(attribute, form)` pairs in declaration order
    attributes: Vec<(u64, u64)>,
}

/// Stream-oriented reader over one container's DWARF sections.
pub(crate) struct DwarfReader<'a> {
    sections: DwarfSections<'a>,
    line_error: Option<String>,
}

impl<'a> DwarfReader<'a> {
    pub(crate) fn new(sections: DwarfSections<'a>) -> DwarfReader<'a> {
        DwarfReader {
            sections,
            line_error: None,
        }
    }

    /// The first abandoned-line-program message, if any. Line failures do not fail
    /// [`parse`](Self::parse).
    pub(crate) fn take_line_error(&mut self) -> Option<String> {
        self.line_error.take()
    }

    /// Parse every compilation unit of `.debug_info` into `out`.
    ///
    /// # Errors
    /// Fails on missing mandatory sections, DWARF64 inputs, unit versions below 4,
    /// unknown abbreviation codes or forms, and structural bounds misses. Records
    /// decoded before the failure remain in `out`.
    pub(crate) fn parse(&mut self, out: &mut DebugInfo) -> Result<()> {
        let info = self
            .sections
            .debug_info
            .ok_or_else(|| malformed_error!("missing .debug_info section"))?;
        if self.sections.debug_abbrev.is_none() {
            return Err(malformed_error!("missing .debug_abbrev section"));
        }

        let mut parser = Parser::new(info);
        while parser.has_more_data() {
            self.parse_unit(&mut parser, out)?;
        }

        Ok(())
    }

    fn parse_unit(&mut self, parser: &mut Parser, out: &mut DebugInfo) -> Result<()> {
        let unit_start = parser.pos() as u64;
        let unit_length = parser.read_le::<u32>()?;
        if unit_length == 0 {
            return Ok(());
        }
        if unit_length == 0xFFFF_FFFF {
            return Err(malformed_error!("DWARF64 not supported"));
        }

        let unit_end = parser.pos() + unit_length as usize;

        let version = parser.read_le::<u16>()?;
        if version < 4 {
            return Err(malformed_error!("DWARF version < 4 not supported"));
        }

        let abbrev_offset = parser.read_le::<u32>()?;
        let address_size = parser.read_le::<u8>()?;

        let abbrev = self.parse_abbrev_table(u64::from(abbrev_offset))?;
        self.parse_die_tree(parser, &abbrev, address_size, unit_start, out)?;

        // trailing padding inside the unit is skipped, a short unit is tolerated
        parser.seek(unit_end.min(parser.len()))
    }

    fn parse_abbrev_table(&self, offset: u64) -> Result<FxHashMap<u64, AbbrevEntry>> {
        let data = self
            .sections
            .debug_abbrev
            .ok_or_else(|| malformed_error!("missing .debug_abbrev section"))?;
        if offset as usize >= data.len() {
            return Err(malformed_error!("invalid abbrev offset - {offset:#x}"));
        }

        let mut parser = Parser::new(data);
        parser.seek(offset as usize)?;

        let mut table = FxHashMap::default();
        while parser.has_more_data() {
            let code = parser.read_uleb128()?;
            if code == 0 {
                break;
            }

            let tag = parser.read_uleb128()?;
            let has_children = parser.read_le::<u8>()? != 0;

            let mut attributes = Vec::new();
            loop {
                let attr_name = parser.read_uleb128()?;
                let attr_form = parser.read_uleb128()?;
                if attr_name == 0 && attr_form == 0 {
                    break;
                }
                attributes.push((attr_name, attr_form));
            }

            table.insert(
                code,
                AbbrevEntry {
                    tag,
                    has_children,
                    attributes,
                },
            );
        }

        Ok(table)
    }

    fn parse_die_tree(
        &mut self,
        parser: &mut Parser,
        abbrev: &FxHashMap<u64, AbbrevEntry>,
        address_size: u8,
        unit_offset: u64,
        out: &mut DebugInfo,
    ) -> Result<()> {
        // Scope stack for composite types: `Some(index)` while inside a named type
        // DIE with children, `None` inside any other children-bearing DIE.
        let mut scopes: Vec<Option<usize>> = Vec::new();

        while parser.has_more_data() {
            let die_offset = parser.pos() as u64;
            let code = parser.read_uleb128()?;
            if code == 0 {
                // end of a sibling chain
                if scopes.is_empty() {
                    return Ok(());
                }
                scopes.pop();
                continue;
            }

            let entry = abbrev
                .get(&code)
                .ok_or_else(|| malformed_error!("unknown abbrev code - {code}"))?;

            let mut name = String::new();
            let mut low_pc = 0_u64;
            let mut high_pc = 0_u64;
            let mut high_pc_form = 0_u64;
            let mut stmt_list = 0_u64;
            let mut byte_size = 0_u64;
            let mut type_ref = 0_u64;
            let mut member_location = 0_u64;
            let mut upper_bound = 0_u64;
            let mut lower_bound = 0_u64;
            let mut count = 0_u64;
            let mut bit_size = 0_u64;
            let mut bit_offset = -1_i64;
            let mut data_bit_offset = -1_i64;
            let mut alignment = 0_u64;

            for &(attr_name, attr_form) in &entry.attributes {
                let value = read_form(
                    parser,
                    attr_form,
                    address_size,
                    unit_offset,
                    self.sections.debug_str,
                )?;

                match attr_name {
                    DW_AT_NAME => name = value.text,
                    DW_AT_LOW_PC => low_pc = value.uvalue,
                    DW_AT_HIGH_PC => {
                        high_pc = value.uvalue;
                        high_pc_form = attr_form;
                    }
                    DW_AT_STMT_LIST => stmt_list = value.uvalue,
                    DW_AT_BYTE_SIZE => byte_size = value.uvalue,
                    DW_AT_TYPE => type_ref = value.uvalue,
                    DW_AT_DATA_MEMBER_LOCATION => member_location = value.uvalue,
                    DW_AT_UPPER_BOUND => upper_bound = value.uvalue,
                    DW_AT_LOWER_BOUND => lower_bound = value.uvalue,
                    DW_AT_COUNT => count = value.uvalue,
                    DW_AT_BIT_SIZE => bit_size = value.uvalue,
                    DW_AT_BIT_OFFSET => bit_offset = value.uvalue as i64,
                    DW_AT_DATA_BIT_OFFSET => data_bit_offset = value.uvalue as i64,
                    DW_AT_ALIGNMENT => alignment = value.uvalue,
                    _ => {}
                }
            }

            // any non-address form encodes high_pc as an offset from low_pc
            if high_pc != 0 && low_pc != 0 && high_pc_form != DW_FORM_ADDR {
                high_pc = low_pc.wrapping_add(high_pc);
            }

            if entry.tag == DW_TAG_COMPILE_UNIT && stmt_list != 0 {
                if let Some(line_data) = self.sections.debug_line {
                    if let Err(error) = line::parse_line_program(line_data, stmt_list, out) {
                        if self.line_error.is_none() {
                            self.line_error = Some(error.to_string());
                        }
                    }
                }
            }

            if entry.tag == DW_TAG_SUBPROGRAM && !name.is_empty() {
                out.functions.push(DebugFunction {
                    name: name.clone(),
                    low_pc,
                    high_pc,
                    return_type_ref: type_ref,
                });
            }

            if entry.tag == DW_TAG_MEMBER {
                if let Some(&Some(parent)) = scopes.last() {
                    out.types[parent].members.push(DebugMember {
                        name: name.clone(),
                        type_ref,
                        offset: member_location,
                        bit_size: bit_size as u32,
                        bit_offset: if data_bit_offset >= 0 {
                            data_bit_offset as i32
                        } else {
                            bit_offset as i32
                        },
                        alignment: alignment as u32,
                    });
                }
            }

            if entry.tag == DW_TAG_SUBRANGE_TYPE {
                if let Some(&Some(parent)) = scopes.last() {
                    let parent = &mut out.types[parent];
                    if parent.kind == DebugTypeKind::Array {
                        let mut range_count = count;
                        if range_count == 0 && upper_bound >= lower_bound {
                            range_count = upper_bound - lower_bound + 1;
                        }
                        if range_count != 0 {
                            parent.array_count = range_count;
                        }
                    }
                }
            }

            let mut pushed_type = false;
            if let Some(kind) = type_kind(entry.tag) {
                if !name.is_empty() {
                    out.types.push(DebugType {
                        name,
                        kind,
                        size: byte_size as u32,
                        die_offset,
                        type_ref,
                        array_count: 0,
                        members: Vec::new(),
                    });
                    if entry.has_children {
                        scopes.push(Some(out.types.len() - 1));
                        pushed_type = true;
                    }
                }
            }

            if entry.has_children && !pushed_type {
                scopes.push(None);
            }
        }

        Ok(())
    }
}
