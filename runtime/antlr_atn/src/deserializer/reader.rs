//! Positional cursor over serialized code units.
//!
//! Every unit after the first is stored as `value + 2` so the serializer
//! never emits the code points a UTF-16 string literal would choke on.
//! Raw units `0` and `1` decode to `-1`. The first unit (the format
//! version) is stored as-is.
//!
//! Fields that use the 16-bit "none" value `0xFFFF` were written as
//! `0xFFFF + 2`, which wraps to raw `1`, so "none" always arrives here as
//! `-1` and never as `0xFFFF`.

use crate::error::DeserializeError;

/// Decode one offset unit as a signed value.
#[inline]
pub(super) fn decode_unit(raw: u16) -> i32 {
    if raw > 1 {
        i32::from(raw) - 2
    } else {
        -1
    }
}

pub(super) struct UnitReader<'a> {
    data: &'a [u16],
    pos: usize,
}

impl<'a> UnitReader<'a> {
    pub(super) fn new(data: &'a [u16]) -> Self {
        UnitReader { data, pos: 0 }
    }

    #[inline]
    pub(super) fn position(&self) -> usize {
        self.pos
    }

    fn next_raw(&mut self) -> Result<u16, DeserializeError> {
        let raw = *self
            .data
            .get(self.pos)
            .ok_or(DeserializeError::UnexpectedEnd { position: self.pos })?;
        self.pos += 1;
        Ok(raw)
    }

    /// Read one integer. The unit at position 0 is returned verbatim.
    pub(super) fn read_int(&mut self) -> Result<i32, DeserializeError> {
        let at_start = self.pos == 0;
        let raw = self.next_raw()?;
        Ok(if at_start {
            i32::from(raw)
        } else {
            decode_unit(raw)
        })
    }

    /// Read a non-negative count.
    pub(super) fn read_count(&mut self) -> Result<usize, DeserializeError> {
        let value = self.read_int()?;
        usize::try_from(value).map_err(|_| DeserializeError::InvalidReference {
            what: "count",
            number: value,
        })
    }

    /// Read one unit as an unsigned 16-bit value with the offset removed.
    fn read_u16(&mut self) -> Result<u16, DeserializeError> {
        Ok(self.next_raw()?.wrapping_sub(2))
    }

    /// Two units, low half first.
    pub(super) fn read_int32(&mut self) -> Result<u32, DeserializeError> {
        let low = u32::from(self.read_u16()?);
        let high = u32::from(self.read_u16()?);
        Ok(low | (high << 16))
    }

    /// Two 32-bit reads, low half first.
    pub(super) fn read_long(&mut self) -> Result<u64, DeserializeError> {
        let low = u64::from(self.read_int32()?);
        let high = u64::from(self.read_int32()?);
        Ok(low | (high << 32))
    }

    /// Eight units forming a 128-bit identifier, least significant first,
    /// rendered in the canonical 8-4-4-4-12 hyphenated form.
    pub(super) fn read_identifier(&mut self) -> Result<String, DeserializeError> {
        let least = u128::from(self.read_long()?);
        let most = u128::from(self.read_long()?);
        Ok(format_identifier((most << 64) | least))
    }
}

/// Render a 128-bit identifier as upper-case hyphenated hex.
pub(super) fn format_identifier(value: u128) -> String {
    format!(
        "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
        (value >> 96) & 0xFFFF_FFFF,
        (value >> 80) & 0xFFFF,
        (value >> 64) & 0xFFFF,
        (value >> 48) & 0xFFFF,
        value & 0xFFFF_FFFF_FFFF,
    )
}

/// Parse a hyphenated identifier back into its 128-bit value.
pub(crate) fn parse_identifier(text: &str) -> Option<u128> {
    let hex: String = text.chars().filter(|&c| c != '-').collect();
    if hex.len() != 32 {
        return None;
    }
    u128::from_str_radix(&hex, 16).ok()
}
