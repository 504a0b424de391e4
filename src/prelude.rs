//! # binscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types from
//! the binscope library. Import this module to get quick access to the essential
//! types for loading and inspecting binaries.
//!
//! ```rust,no_run
//! use binscope::prelude::*;
//! use std::path::Path;
//!
//! let mut program = Program::new("sample");
//! load(Path::new("sample.so"), &mut program)?;
//! # Ok::<(), binscope::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all binscope operations
pub use crate::Error;

/// The result type used throughout binscope
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Loader entry points and container detection
pub use crate::{load, load_bytes, Format};

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Program Model
// ================================================================================================

/// The normalized program aggregate
pub use crate::program::Program;

/// Memory layout records
pub use crate::program::{
    AddressSpace, ImageSegment, MemoryImage, MemoryMap, MemoryRegion, Section, Segment,
};

/// Flat entity records
pub use crate::program::{Relocation, Symbol, SymbolKind, Type, TypeKind, TypeSystem};

/// Debug records
pub use crate::program::{
    DebugFunction, DebugInfo, DebugLineEntry, DebugMember, DebugType, DebugTypeKind,
};
