//! Low-level byte order and safe reading utilities for container and DWARF parsing.
//!
//! This module provides the [`LoaderIO`] trait for safe, little-endian reading of primitive
//! types from byte slices. It is used throughout the file and loader modules to ensure
//! correct parsing of binary data structures.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type specific safe readers
///
/// This trait abstracts over reading primitive types from byte slices in a safe way.
/// It is implemented for the integer types used in ELF, PE, Mach-O and DWARF parsing.
/// All on-disk structures handled by this crate are little-endian.
pub trait LoaderIO: Sized {
    #[allow(missing_docs)]
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

// Implement LoaderIO support for u64
impl LoaderIO for u64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u64::from_le_bytes(bytes)
    }
}

// Implement LoaderIO support for i64
impl LoaderIO for i64 {
    type Bytes = [u8; 8];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i64::from_le_bytes(bytes)
    }
}

// Implement LoaderIO support for u32
impl LoaderIO for u32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u32::from_le_bytes(bytes)
    }
}

// Implement LoaderIO support for i32
impl LoaderIO for i32 {
    type Bytes = [u8; 4];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i32::from_le_bytes(bytes)
    }
}

// Implement LoaderIO support for u16
impl LoaderIO for u16 {
    type Bytes = [u8; 2];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u16::from_le_bytes(bytes)
    }
}

// Implement LoaderIO support for u8
impl LoaderIO for u8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        u8::from_le_bytes(bytes)
    }
}

// Implement LoaderIO support for i8
impl LoaderIO for i8 {
    type Bytes = [u8; 1];

    fn from_le_bytes(bytes: Self::Bytes) -> Self {
        i8::from_le_bytes(bytes)
    }
}

/// Generic method to safely read T in little-endian from a data stream.
///
/// ## Arguments
/// * 'data' - The data buffer / stream to read from
pub fn read_le<T: LoaderIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Generic method to safely read T from an offset and in little-endian from a data stream.
///
/// ## Arguments
/// * 'data'    - The data buffer / stream to read from
/// * 'offset'  - An offset to read from, will be advanced by the amount of bytes read
pub fn read_le_at<T: LoaderIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(offset_end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };

    if offset_end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..offset_end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = offset_end;

    Ok(T::from_le_bytes(read))
}
