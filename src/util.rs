use std::{
    any::type_name,
    ops::{Add, Rem, Sub},
};

use zerocopy::FromBytes;

use crate::ReadError;

pub fn read<T: FromBytes + Copy>(resource: &[u8]) -> Result<T, ReadError> {
    T::read_from_prefix(resource)
        .map_err(|_| ReadError(type_name::<T>().to_string()))
        .map(|(value, _)| value)
}

/// Read a value at an offset, failing instead of panicking when the offset lies outside the data.
pub fn read_at<T: FromBytes + Copy>(data: &[u8], offset: usize) -> Result<T, ReadError> {
    match data.get(offset..) {
        Some(data) => read::<T>(data),
        None => Err(ReadError(format!("{} at {:#x}", type_name::<T>(), offset))),
    }
}

pub fn aligned_to<T: Add<Output = T> + Sub<Output = T> + Rem<Output = T> + Eq + Copy + Default>(
    value: T, alignment: T,
) -> T {
    if value % alignment == T::default() {
        return value;
    }
    value + alignment - (value % alignment)
}

/// Read a NUL-terminated UTF-16LE string. Returns the string and the number of bytes consumed,
/// including the terminator if one was found.
pub fn read_u16_string(data: &[u8]) -> (String, usize) {
    let mut units = Vec::with_capacity(data.len() / 2);
    let mut consumed = 0;
    for chunk in data.chunks_exact(2) {
        consumed += 2;
        let c = u16::from_le_bytes([chunk[0], chunk[1]]);
        if c == 0 {
            break;
        }
        units.push(c);
    }
    (String::from_utf16_lossy(&units), consumed)
}

pub fn u16_units(data: &[u8], little_endian: bool) -> Vec<u16> {
    data.chunks_exact(2)
        .map(|chunk| {
            if little_endian {
                u16::from_le_bytes([chunk[0], chunk[1]])
            } else {
                u16::from_be_bytes([chunk[0], chunk[1]])
            }
        })
        .collect()
}
