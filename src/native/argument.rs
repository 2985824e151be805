//! Untyped native argument slot.

/// One native argument or return slot.
///
/// Holds the raw bits of whatever the parameter type says it is: an integer
/// of some width, a float, or a pointer. Narrow values live in the low bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Argument(pub u64);

impl Argument {
    pub const NULL: Argument = Argument(0);

    pub fn from_bool(value: bool) -> Self {
        Self(u64::from(value))
    }

    pub fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub fn from_f32(value: f32) -> Self {
        Self(u64::from(value.to_bits()))
    }

    pub fn from_f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    pub fn from_ptr(ptr: u64) -> Self {
        Self(ptr)
    }

    /// Decode the low `bytes.len()` bytes of a little-endian value.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        for (dst, src) in raw.iter_mut().zip(bytes) {
            *dst = *src;
        }
        Self(u64::from_le_bytes(raw))
    }

    /// The low `size` bytes, little endian.
    pub fn to_le_bytes(self, size: usize) -> Vec<u8> {
        self.0.to_le_bytes().into_iter().take(size.min(8)).collect()
    }

    /// `gboolean` is an int; anything non-zero in the low 32 bits is true.
    pub fn as_bool(self) -> bool {
        self.0 as u32 != 0
    }

    pub fn as_i8(self) -> i8 {
        self.0 as i8
    }

    pub fn as_u8(self) -> u8 {
        self.0 as u8
    }

    pub fn as_i16(self) -> i16 {
        self.0 as i16
    }

    pub fn as_u16(self) -> u16 {
        self.0 as u16
    }

    pub fn as_i32(self) -> i32 {
        self.0 as i32
    }

    pub fn as_u32(self) -> u32 {
        self.0 as u32
    }

    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn as_f32(self) -> f32 {
        f32::from_bits(self.0 as u32)
    }

    pub fn as_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    pub fn as_ptr(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Read an integer of the given width and signedness, sign extending.
    pub fn as_int(self, bits: u8, signed: bool) -> i128 {
        match (bits, signed) {
            (8, true) => i128::from(self.as_i8()),
            (8, false) => i128::from(self.as_u8()),
            (16, true) => i128::from(self.as_i16()),
            (16, false) => i128::from(self.as_u16()),
            (32, true) => i128::from(self.as_i32()),
            (32, false) => i128::from(self.as_u32()),
            (_, true) => i128::from(self.as_i64()),
            (_, false) => i128::from(self.as_u64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_values_sign_extend() {
        let arg = Argument::from_i64(-1);
        assert_eq!(arg.as_i8(), -1);
        assert_eq!(arg.as_u8(), 255);
        assert_eq!(arg.as_int(16, true), -1);
        assert_eq!(arg.as_int(16, false), 65535);
    }

    #[test]
    fn test_le_bytes() {
        let arg = Argument::from_u64(0x0102_0304);
        assert_eq!(arg.to_le_bytes(2), vec![0x04, 0x03]);
        assert_eq!(Argument::from_le_bytes(&[0xff, 0xff]).as_i16(), -1);
        assert_eq!(Argument::from_le_bytes(&[0xff, 0xff]).as_u64(), 0xffff);
    }

    #[test]
    fn test_floats() {
        assert_eq!(Argument::from_f32(1.5).as_f32(), 1.5);
        assert_eq!(Argument::from_f64(-2.25).as_f64(), -2.25);
    }

    #[test]
    fn test_gboolean_uses_low_word() {
        assert!(Argument::from_u64(2).as_bool());
        assert!(!Argument::from_u64(1 << 32).as_bool());
    }
}
