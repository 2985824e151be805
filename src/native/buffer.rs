//! Bounds-checked byte buffer helpers.

use super::HeapError;

/// Align a value up to the nearest multiple of alignment.
#[inline]
pub fn align_to(val: usize, align: usize) -> usize {
    let align = align.max(1);
    (val + align - 1) & !(align - 1)
}

fn out_of_bounds(buffer: &[u8], start: u64, len: usize) -> HeapError {
    HeapError::InvalidPointer {
        ptr: start,
        len,
        heap_size: buffer.len(),
    }
}

fn range(start: u64, len: usize) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(start).ok()?;
    Some(start..start.checked_add(len)?)
}

/// Borrow `len` bytes at `start`.
#[inline]
pub fn read_slice(buffer: &[u8], start: u64, len: usize) -> Result<&[u8], HeapError> {
    range(start, len)
        .and_then(|r| buffer.get(r))
        .ok_or_else(|| out_of_bounds(buffer, start, len))
}

/// Overwrite bytes at `start`.
#[inline]
pub fn write_slice(buffer: &mut [u8], start: u64, data: &[u8]) -> Result<(), HeapError> {
    let err = out_of_bounds(buffer, start, data.len());
    range(start, data.len())
        .and_then(|r| buffer.get_mut(r))
        .ok_or(err)?
        .copy_from_slice(data);
    Ok(())
}

/// Offset of the first NUL byte at or after `start`.
pub fn find_nul(buffer: &[u8], start: u64) -> Result<usize, HeapError> {
    let tail = usize::try_from(start)
        .ok()
        .and_then(|s| buffer.get(s..))
        .ok_or_else(|| out_of_bounds(buffer, start, 1))?;
    tail.iter()
        .position(|b| *b == 0)
        .ok_or(HeapError::Unterminated(start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 8), 0);
        assert_eq!(align_to(1, 8), 8);
        assert_eq!(align_to(9, 4), 12);
        assert_eq!(align_to(5, 0), 5);
    }

    #[test]
    fn test_bounds() {
        let mut buf = vec![0u8; 4];
        assert!(write_slice(&mut buf, 2, &[1, 2]).is_ok());
        assert_eq!(read_slice(&buf, 2, 2), Ok(&[1u8, 2][..]));
        assert!(matches!(
            read_slice(&buf, 3, 2),
            Err(HeapError::InvalidPointer { ptr: 3, len: 2, heap_size: 4 })
        ));
        assert!(write_slice(&mut buf, u64::MAX, &[1]).is_err());
    }

    #[test]
    fn test_find_nul() {
        let buf = b"ab\0cd".to_vec();
        assert_eq!(find_nul(&buf, 0), Ok(2));
        assert_eq!(find_nul(&buf, 3), Err(HeapError::Unterminated(3)));
    }
}
