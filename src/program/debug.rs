//! Debug records decoded from DWARF sections and PE CodeView entries.
//!
//! All cross-references between debug entities are carried as absolute DIE offsets
//! into `.debug_info` (`die_offset` / `type_ref` / `return_type_ref`), never as
//! pointers or indices. A `type_ref` of 0 means "no reference". The DIE reference
//! graph is intrinsically cyclic (pointer to struct containing a pointer to the same
//! struct); the [type resolver](crate::loader) breaks cycles when promoting these
//! records into the program [`TypeSystem`](crate::program::TypeSystem).

/// One committed row of a DWARF line program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLineEntry {
    /// Code address of the statement
    pub address: u64,
    /// Source file, include-directory joined with `/` when present
    pub file: String,
    /// 1-based source line
    pub line: u32,
}

/// A `DW_TAG_subprogram` with a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugFunction {
    /// Function name as given by `DW_AT_name`
    pub name: String,
    /// First code address
    pub low_pc: u64,
    /// One past the last code address; always absolute after decoding, even when the
    /// producer encoded it as an offset from `low_pc`
    pub high_pc: u64,
    /// DIE offset of the return type, 0 when absent
    pub return_type_ref: u64,
}

/// One member of a structure or union type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugMember {
    /// Member name
    pub name: String,
    /// DIE offset of the member type, 0 when absent
    pub type_ref: u64,
    /// Byte offset within the composite
    pub offset: u64,
    /// Bitfield width, 0 for plain members
    pub bit_size: u32,
    /// Bitfield position, -1 when absent
    pub bit_offset: i32,
    /// Explicit alignment, 0 when absent
    pub alignment: u32,
}

/// Classification of a [`DebugType`], mirroring the producing DWARF tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTypeKind {
    /// `DW_TAG_base_type`
    Base,
    /// `DW_TAG_pointer_type`
    Pointer,
    /// `DW_TAG_structure_type`
    Struct,
    /// `DW_TAG_array_type`
    Array,
    /// `DW_TAG_typedef`
    Typedef,
    /// `DW_TAG_union_type`
    Union,
    /// `DW_TAG_const_type`
    Const,
    /// `DW_TAG_volatile_type`
    Volatile,
    /// `DW_TAG_enumeration_type`
    Enumeration,
    /// `DW_TAG_subroutine_type`
    Subroutine,
    /// Any other type tag
    Unknown,
}

/// A type DIE lifted out of the `.debug_info` tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugType {
    /// Name as given by `DW_AT_name`, possibly empty
    pub name: String,
    /// Classification
    pub kind: DebugTypeKind,
    /// Byte size from `DW_AT_byte_size`, 0 when absent
    pub size: u32,
    /// Absolute `.debug_info` offset of the producing DIE
    pub die_offset: u64,
    /// Absolute DIE offset of the referenced type, 0 when absent
    pub type_ref: u64,
    /// Element count for arrays, 0 when unknown
    pub array_count: u64,
    /// Members, populated for structures and unions
    pub members: Vec<DebugMember>,
}

/// Everything the loader learned from the debug data of one container.
///
/// Empty when the input carries no debug sections. Entry order within each vector
/// follows the DIE tree / line program traversal order and is stable for a given
/// input.
#[derive(Debug, Default, Clone)]
pub struct DebugInfo {
    /// Named subprograms
    pub functions: Vec<DebugFunction>,
    /// Committed line table rows
    pub lines: Vec<DebugLineEntry>,
    /// Type DIEs, in traversal order
    pub types: Vec<DebugType>,
    /// PDB path from a PE CodeView (`RSDS`) debug directory entry
    pub pdb_path: Option<String>,
}

impl DebugInfo {
    /// True when no debug data of any kind was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
            && self.lines.is_empty()
            && self.types.is_empty()
            && self.pdb_path.is_none()
    }
}
