//! Container detection and the loader entry points.
//!
//! The loader is a library: embedding tools construct an empty
//! [`Program`](crate::Program) and hand it to [`load`] (filesystem path) or
//! [`load_bytes`] (in-memory buffer). The input's leading magic selects one of three
//! container parsers - there is no shared parser state, only the common
//! `(input, &mut Program) -> Result` contract:
//!
//! - [`mod@elf`] - ELF64 little-endian executables and shared objects
//! - [`mod@pe`] - PE / PE+ images
//! - [`mod@macho`] - Mach-O 64-bit little-endian images
//!
//! Supporting engines shared by the parsers:
//!
//! - [`mod@reloc`] - x86-64 relocation application
//! - `dwarf` - the DWARF v4+ reader
//! - `resolver` - debug-type promotion into the program type system
//!
//! One `load` call owns its `Program` exclusively and runs synchronously to
//! completion; independent programs may be loaded concurrently from different
//! threads.
//!
//! # Examples
//!
//! ```rust,no_run
//! use binscope::{load, Format, Program};
//! use std::path::Path;
//!
//! let mut program = Program::new("target");
//! load(Path::new("target.so"), &mut program)?;
//!
//! println!(
//!     "{} regions, {} symbols, bias {:#x}",
//!     program.memory_map().regions().len(),
//!     program.symbols().len(),
//!     program.load_bias(),
//! );
//! # Ok::<(), binscope::Error>(())
//! ```

pub mod elf;
pub mod macho;
pub mod pe;
pub mod reloc;

mod dwarf;
mod resolver;

use std::path::Path;

use crate::{file::File, program::Program, Error::NotSupported, Result};

/// A detected container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// ELF64 little-endian (`7F 45 4C 46`, class 2, data 1)
    Elf,
    /// PE / PE+ (`MZ` stub with an NT header)
    Pe,
    /// Mach-O 64-bit little-endian (`CF FA ED FE`)
    MachO,
}

impl Format {
    /// Classify an input by its leading magic bytes.
    ///
    /// Only the magic is inspected here; class, endianness and type constraints are
    /// validated by the selected container parser.
    #[must_use]
    pub fn probe(data: &[u8]) -> Option<Format> {
        if data.len() >= 4 && data[0..4] == [0x7F, b'E', b'L', b'F'] {
            return Some(Format::Elf);
        }
        if data.len() >= 2 && data[0..2] == [b'M', b'Z'] {
            return Some(Format::Pe);
        }
        if data.len() >= 4 && data[0..4] == [0xCF, 0xFA, 0xED, 0xFE] {
            return Some(Format::MachO);
        }
        None
    }
}

fn dispatch(file: &File, program: &mut Program) -> Result<()> {
    match Format::probe(file.data()) {
        Some(Format::Elf) => elf::load(file, program),
        Some(Format::Pe) => pe::load(file, program),
        Some(Format::MachO) => macho::load(file, program),
        None => Err(NotSupported),
    }
}

/// Load the executable at `path` into a freshly constructed [`Program`].
///
/// The file is opened read-only and is the only file touched; PDB paths found in PE
/// CodeView records are recorded but never followed.
///
/// # Errors
///
/// Fails on I/O errors, unrecognized magic ([`NotSupported`]), empty inputs, and
/// structural container violations. Relocation and DWARF problems are recorded on
/// the program instead of failing the load - see
/// [`Program::debug_error`](crate::Program::debug_error).
pub fn load(path: &Path, program: &mut Program) -> Result<()> {
    let file = File::from_file(path)?;
    dispatch(&file, program)
}

/// Load an executable image already held in memory. Same pipeline as [`load`].
///
/// # Errors
///
/// Same conditions as [`load`], minus the filesystem.
pub fn load_bytes(data: Vec<u8>, program: &mut Program) -> Result<()> {
    let file = File::from_mem(data)?;
    dispatch(&file, program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_recognizes_the_three_magics() {
        assert_eq!(Format::probe(&[0x7F, b'E', b'L', b'F', 2, 1]), Some(Format::Elf));
        assert_eq!(Format::probe(b"MZ\x90\x00"), Some(Format::Pe));
        assert_eq!(
            Format::probe(&[0xCF, 0xFA, 0xED, 0xFE]),
            Some(Format::MachO)
        );
    }

    #[test]
    fn probe_rejects_unknown_and_short_inputs() {
        assert_eq!(Format::probe(&[]), None);
        assert_eq!(Format::probe(&[0x7F, b'E']), None);
        assert_eq!(Format::probe(b"\xCA\xFE\xBA\xBE"), None); // fat Mach-O stays out
        assert_eq!(Format::probe(b"!<arch>\n"), None);
    }

    #[test]
    fn load_bytes_rejects_unknown_magic() {
        let mut program = Program::new("unknown");
        let result = load_bytes(vec![0xDE, 0xAD, 0xBE, 0xEF], &mut program);
        assert!(matches!(result, Err(NotSupported)));
    }

    #[test]
    fn load_rejects_missing_file() {
        let mut program = Program::new("missing");
        let result = load(Path::new("/nonexistent/input.bin"), &mut program);
        assert!(matches!(result, Err(crate::Error::FileError(_))));
    }
}
