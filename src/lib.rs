// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # binscope
//!
//! A cross-platform loader core for reverse-engineering tooling. `binscope` ingests
//! on-disk executables - ELF64, PE / PE+, and Mach-O 64-bit - together with their
//! embedded DWARF v4+ debug information, and materializes a normalized in-memory
//! [`Program`] suitable for disassembly, decompilation and symbolic analysis.
//! Built in pure Rust with no dependency on a native toolchain or platform loader.
//!
//! # Architecture
//!
//! The library is organized into three module trees that form a pipeline from raw
//! bytes to a typed program model:
//!
//! - **File Layer** ([`crate::File`], [`crate::Parser`]) - memory-mapped input access
//!   and bounds-checked binary parsing
//! - **Loader Layer** ([`crate::loader`]) - container parsers for ELF, PE and Mach-O,
//!   the x86-64 relocation engine, the DWARF reader and the debug-type resolver
//! - **Program Layer** ([`crate::program`]) - the owning aggregate of memory map,
//!   memory image, address spaces, symbols, relocations, types and debug info
//!
//! ## Key Components
//!
//! - [`crate::load`] / [`crate::load_bytes`] - entry points for one load
//! - [`crate::Format`] - magic-byte container detection
//! - [`crate::Program`] - the normalized output model
//! - [`crate::prelude`] - convenient re-exports of commonly used types
//! - [`crate::Error`] and [`crate::Result`] - error handling
//!
//! # Features
//!
//! - **Three container formats** - ELF64 (`ET_EXEC` / `ET_DYN`), PE32 / PE32+,
//!   Mach-O 64-bit, selected by magic-byte probe
//! - **Virtually addressed memory image** - file-backed segments plus zero-filled
//!   BSS tails, with bounds-checked word access
//! - **Relocation decoding** - x86-64 ELF RELA / REL application, PE base-relocation
//!   coverage, Mach-O local relocation records
//! - **DWARF v4+ reading** - compilation units, abbreviation tables, DIE tree walk,
//!   line-number programs
//! - **Debug-type resolution** - pointer / qualifier / typedef / array chains
//!   promoted into a flat program type system
//! - **Deterministic output** - entity ordering follows container traversal order,
//!   stable for a given input
//!
//! # Usage Examples
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use binscope::prelude::*;
//! use std::path::Path;
//!
//! let mut program = Program::new("sample");
//! load(Path::new("sample.so"), &mut program)?;
//! println!("found {} symbols", program.symbols().len());
//! # Ok::<(), binscope::Error>(())
//! ```
//!
//! ## Inspecting the Memory Image
//!
//! ```rust,no_run
//! use binscope::{load, Program};
//! use std::path::Path;
//!
//! let mut program = Program::new("sample");
//! load(Path::new("sample.so"), &mut program)?;
//!
//! for region in program.memory_map().regions() {
//!     println!(
//!         "{:#x}..{:#x} r={} w={} x={}",
//!         region.start,
//!         region.start + region.size,
//!         region.readable,
//!         region.writable,
//!         region.executable,
//!     );
//! }
//!
//! if let Some(word) = program.memory_image().read_u64(program.load_bias()) {
//!     println!("first word: {word:#x}");
//! }
//! # Ok::<(), binscope::Error>(())
//! ```
//!
//! ## Working with Debug Info
//!
//! ```rust,no_run
//! use binscope::{load, Program};
//! use std::path::Path;
//!
//! let mut program = Program::new("sample");
//! load(Path::new("sample.so"), &mut program)?;
//!
//! if let Some(message) = program.debug_error() {
//!     eprintln!("debug data incomplete: {message}");
//! }
//! for function in &program.debug_info().functions {
//!     println!("{} {:#x}..{:#x}", function.name, function.low_pc, function.high_pc);
//! }
//! # Ok::<(), binscope::Error>(())
//! ```
//!
//! # Concurrency
//!
//! A load is single-threaded and synchronous: one `load` call owns its `Program`
//! exclusively and runs to completion. Independent programs may be loaded
//! concurrently as long as each `Program` is touched by only one thread.
//!
//! # Scope
//!
//! Out of scope by design: dynamic-linker semantics, execution, DWARF v2/v3 and
//! DWARF64, compressed debug sections, .NET metadata, fat Mach-O wrappers, C++
//! demangling, and signature verification. Mach-O relocations are recorded but not
//! applied; PE base relocations are round-tripped without rebasing.

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

pub mod loader;
pub mod prelude;
pub mod program;

/// `binscope` Result type.
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`crate::Error`]. This is used consistently throughout the crate for all fallible
/// operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `binscope` Error type.
///
/// The main error type for all operations in this crate. Provides detailed error
/// information for container parsing and debug-data decoding.
pub use error::Error;

/// Loader entry points and container detection.
///
/// [`load`] opens a path, probes the leading magic and runs the matching container
/// parser; [`load_bytes`] does the same over an in-memory buffer.
pub use loader::{load, load_bytes, Format};

/// The normalized program model produced by a load.
pub use program::Program;

/// Low-level file and byte-stream parsing utilities.
///
/// The [`Parser`] type is used for decoding container records and DWARF structures;
/// [`File`] abstracts over memory-mapped and in-memory inputs.
pub use file::{parser::Parser, File};
