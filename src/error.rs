use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers the error conditions that can occur while probing, parsing and loading
/// ELF, PE and Mach-O images and their DWARF debug data. Each variant provides specific
/// context about the failure mode to enable appropriate error handling.
///
/// # Error Categories
///
/// ## File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid container structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond file boundaries
/// - [`Error::NotSupported`] - Unsupported file format or feature
/// - [`Error::Empty`] - Empty input provided
///
/// ## I/O Errors
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// Relocation records that cannot be applied and non-fatal DWARF failures are *not*
/// reported through this type: the former are recorded on the
/// [`Relocation`](crate::program::Relocation) itself (`applied == false` plus a note),
/// the latter through [`Program::debug_error`](crate::Program::debug_error).
///
/// # Examples
///
/// ```rust,no_run
/// use binscope::{load, Error, Program};
/// use std::path::Path;
///
/// let mut program = Program::new("sample");
/// match load(Path::new("sample.so"), &mut program) {
///     Ok(()) => println!("loaded {} symbols", program.symbols().len()),
///     Err(Error::NotSupported) => eprintln!("unknown container format"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed input: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("load failed: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// This error indicates that a container structure is corrupted or doesn't conform
    /// to the expected ELF64 / PE / Mach-O layout. The error includes the source
    /// location where the malformation was detected for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    ///
    /// This error occurs when trying to read data beyond the end of the file
    /// or a debug section. It's a safety check to prevent buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    ///
    /// Indicates that the input does not start with a recognized magic sequence,
    /// or uses container features that are not implemented in this library.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur during file operations
    /// such as reading from disk, permission issues, or filesystem errors.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    ///
    /// Used for errors that don't fit into other categories or for
    /// wrapping external library errors with additional context.
    #[error("{0}")]
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_macro_captures_location() {
        let error = malformed_error!("bad header");
        match error {
            Error::Malformed { message, file, .. } => {
                assert_eq!(message, "bad header");
                assert!(file.ends_with("error.rs"));
            }
            _ => panic!("Expected Malformed"),
        }
    }

    #[test]
    fn malformed_macro_formats_arguments() {
        let error = malformed_error!("unexpected magic - {:#x}", 0xCAFE);
        match error {
            Error::Malformed { message, .. } => assert_eq!(message, "unexpected magic - 0xcafe"),
            _ => panic!("Expected Malformed"),
        }
    }
}
