//! Symbol records extracted from container symbol tables.

/// Classification of a [`Symbol`].
///
/// The container parsers map format-specific type codes onto this shared set:
/// ELF `STT_FUNC` becomes [`SymbolKind::Function`], `STT_OBJECT` becomes
/// [`SymbolKind::Data`], `STT_SECTION` becomes [`SymbolKind::Label`]; PE exports are
/// functions and PE imports are [`SymbolKind::External`]; Mach-O `nlist` entries are
/// recorded as functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Callable code
    Function,
    /// A position marker without its own storage
    Label,
    /// A data object
    Data,
    /// Resolved outside this image (e.g. a PE import)
    External,
    /// Anything the container did not classify
    Unknown,
}

/// A named address extracted from a container symbol table.
///
/// Names are carried exactly as found in the container's string table; no demangling
/// is performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Raw symbol name from the string table
    pub name: String,
    /// Virtual address the symbol refers to
    pub address: u64,
    /// Symbol classification
    pub kind: SymbolKind,
}
