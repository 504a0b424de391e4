//! DWARF attribute form decoding.
//!
//! Every form decoder has the same shape: consume the encoded value from the cursor
//! and produce a [`FormValue`] carrying the unsigned, signed and string channels.
//! Which channel is meaningful depends on the form; unused channels stay at their
//! defaults. Reference forms (`DW_FORM_ref1..ref_udata`) are widened and rebased onto
//! the unit's section offset so every reference is an absolute DIE offset.
//!
//! An unknown form is fatal: form codes determine operand length, so a single unknown
//! form desynchronizes the whole DIE stream.

use crate::{file::parser::Parser, Result};

pub(crate) const DW_FORM_ADDR: u64 = 0x01;
pub(crate) const DW_FORM_BLOCK2: u64 = 0x03;
pub(crate) const DW_FORM_BLOCK4: u64 = 0x04;
pub(crate) const DW_FORM_DATA2: u64 = 0x05;
pub(crate) const DW_FORM_DATA4: u64 = 0x06;
pub(crate) const DW_FORM_DATA8: u64 = 0x07;
pub(crate) const DW_FORM_STRING: u64 = 0x08;
pub(crate) const DW_FORM_BLOCK: u64 = 0x09;
pub(crate) const DW_FORM_BLOCK1: u64 = 0x0A;
pub(crate) const DW_FORM_DATA1: u64 = 0x0B;
pub(crate) const DW_FORM_FLAG: u64 = 0x0C;
pub(crate) const DW_FORM_SDATA: u64 = 0x0D;
pub(crate) const DW_FORM_STRP: u64 = 0x0E;
pub(crate) const DW_FORM_UDATA: u64 = 0x0F;
pub(crate) const DW_FORM_REF_ADDR: u64 = 0x10;
pub(crate) const DW_FORM_REF1: u64 = 0x11;
pub(crate) const DW_FORM_REF2: u64 = 0x12;
pub(crate) const DW_FORM_REF4: u64 = 0x13;
pub(crate) const DW_FORM_REF8: u64 = 0x14;
pub(crate) const DW_FORM_REF_UDATA: u64 = 0x15;
pub(crate) const DW_FORM_SEC_OFFSET: u64 = 0x17;
pub(crate) const DW_FORM_EXPRLOC: u64 = 0x18;
pub(crate) const DW_FORM_FLAG_PRESENT: u64 = 0x19;

/// One decoded attribute value.
#[derive(Debug, Default, Clone)]
pub(crate) struct FormValue {
    /// Unsigned channel: addresses, sizes, offsets, flags, widened references
    pub uvalue: u64,
    /// Signed channel: `DW_FORM_sdata`
    pub svalue: i64,
    /// String channel: inline and `.debug_str` strings
    pub text: String,
}

/// NUL-terminated lookup into `.debug_str`. A missing section or an out-of-range
/// offset yields an empty string rather than an error.
fn read_str(debug_str: Option<&[u8]>, offset: u64) -> String {
    let Some(data) = debug_str else {
        return String::new();
    };
    let offset = offset as usize;
    if offset >= data.len() {
        return String::new();
    }
    let tail = &data[offset..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..end]).into_owned()
}

fn read_address(parser: &mut Parser, address_size: u8) -> Result<u64> {
    if address_size == 8 {
        parser.read_le::<u64>()
    } else {
        Ok(u64::from(parser.read_le::<u32>()?))
    }
}

/// Decode one attribute value.
///
/// ## Arguments
/// * 'parser' - cursor positioned at the encoded value
/// * 'form' - the `DW_FORM_*` code from the abbreviation entry
/// * 'address_size' - the unit's address size (4 or 8)
/// * 'unit_offset' - section offset of the unit, added to intra-unit references
/// * 'debug_str' - the `.debug_str` section for `DW_FORM_strp`
pub(crate) fn read_form(
    parser: &mut Parser,
    form: u64,
    address_size: u8,
    unit_offset: u64,
    debug_str: Option<&[u8]>,
) -> Result<FormValue> {
    let mut value = FormValue::default();

    match form {
        DW_FORM_ADDR => value.uvalue = read_address(parser, address_size)?,
        DW_FORM_DATA1 => value.uvalue = u64::from(parser.read_le::<u8>()?),
        DW_FORM_DATA2 => value.uvalue = u64::from(parser.read_le::<u16>()?),
        DW_FORM_DATA4 => value.uvalue = u64::from(parser.read_le::<u32>()?),
        DW_FORM_DATA8 => value.uvalue = parser.read_le::<u64>()?,
        DW_FORM_SDATA => value.svalue = parser.read_sleb128()?,
        DW_FORM_UDATA => value.uvalue = parser.read_uleb128()?,
        DW_FORM_STRING => value.text = parser.read_cstring()?,
        DW_FORM_STRP => {
            let offset = parser.read_le::<u32>()?;
            value.text = read_str(debug_str, u64::from(offset));
        }
        DW_FORM_SEC_OFFSET => value.uvalue = u64::from(parser.read_le::<u32>()?),
        DW_FORM_FLAG => value.uvalue = u64::from(parser.read_le::<u8>()?),
        DW_FORM_FLAG_PRESENT => value.uvalue = 1,
        DW_FORM_REF1 => value.uvalue = unit_offset + u64::from(parser.read_le::<u8>()?),
        DW_FORM_REF2 => value.uvalue = unit_offset + u64::from(parser.read_le::<u16>()?),
        DW_FORM_REF4 => value.uvalue = unit_offset + u64::from(parser.read_le::<u32>()?),
        DW_FORM_REF8 => value.uvalue = unit_offset.wrapping_add(parser.read_le::<u64>()?),
        DW_FORM_REF_UDATA => value.uvalue = unit_offset.wrapping_add(parser.read_uleb128()?),
        DW_FORM_REF_ADDR => value.uvalue = read_address(parser, address_size)?,
        DW_FORM_EXPRLOC | DW_FORM_BLOCK => {
            let length = parser.read_uleb128()?;
            parser.skip(length as usize)?;
        }
        DW_FORM_BLOCK1 => {
            let length = parser.read_le::<u8>()?;
            parser.skip(length as usize)?;
        }
        DW_FORM_BLOCK2 => {
            let length = parser.read_le::<u16>()?;
            parser.skip(length as usize)?;
        }
        DW_FORM_BLOCK4 => {
            let length = parser.read_le::<u32>()?;
            parser.skip(length as usize)?;
        }
        _ => return Err(malformed_error!("unsupported DWARF form - {form:#x}")),
    }

    Ok(value)
}
