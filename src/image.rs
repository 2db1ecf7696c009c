//! Address-space and byte-access seams between the engine and a loader.
//!
//! Binary format parsing lives outside this crate; the engine only needs a
//! virtual-to-offset mapping ([`AddressSpace`]) and endian-aware peeks into
//! an immutable buffer ([`ByteSource`]). [`MappedImage`] is the one trivial
//! implementation shipped here: a flat buffer mapped at a base address.

use crate::{Address, Endianness};

/// Error type for bounds-checked reads.
///
/// These are usage errors and abort the specific call; they are never
/// converted into a truncated block result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The requested span is not entirely covered by the mapped image
    #[error("read of {len} bytes at 0x{addr:x} is outside the mapped image")]
    OutOfRange { addr: Address, len: usize },

    /// The requested span runs past the underlying buffer (file-offset space)
    #[error("read of {len} bytes at offset {offset} runs past the buffer")]
    OutOfRangeOffset { offset: usize, len: usize },

    /// No NUL terminator within the byte limit
    #[error("no string terminator within {max_len} bytes at 0x{addr:x}")]
    UnterminatedString { addr: Address, max_len: usize },

    /// Integer width other than 1, 2, 4, or 8
    #[error("unsupported read width: {0} bytes (must be 1, 2, 4, or 8)")]
    UnsupportedSize(usize),
}

/// Maps virtual addresses onto the loaded image.
pub trait AddressSpace: Send + Sync {
    /// Translate a virtual address to a file offset, if mapped.
    fn translate_address(&self, addr: Address) -> Option<usize>;

    /// True if every byte of `[addr, addr + len)` is mapped.
    fn is_valid_range(&self, addr: Address, len: usize) -> bool;

    /// Entry point of the image, if the loader knows one.
    fn entry_point(&self) -> Option<Address>;
}

/// Random-access peeks into an immutable byte buffer.
///
/// Multi-byte reads delegate to the standard library's
/// `from_le_bytes`/`from_be_bytes` converters; only widths 1, 2, 4, and 8
/// are supported.
pub trait ByteSource: Send + Sync {
    /// The whole underlying buffer.
    fn as_bytes(&self) -> &[u8];

    /// `count` bytes starting at file offset `offset`, if in bounds.
    fn peek_bytes(&self, offset: usize, count: usize) -> Option<&[u8]> {
        self.as_bytes().get(offset..offset.checked_add(count)?)
    }

    /// Unsigned integer of `width` bytes at `offset`.
    fn peek_uint(
        &self,
        offset: usize,
        width: usize,
        endianness: Endianness,
    ) -> Result<u64, ReadError> {
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(ReadError::UnsupportedSize(width));
        }
        let bytes = self
            .peek_bytes(offset, width)
            .ok_or(ReadError::OutOfRangeOffset { offset, len: width })?;
        let mut buf = [0u8; 8];
        match endianness {
            Endianness::Little => {
                buf[..width].copy_from_slice(bytes);
                Ok(u64::from_le_bytes(buf))
            }
            Endianness::Big => {
                buf[8 - width..].copy_from_slice(bytes);
                Ok(u64::from_be_bytes(buf))
            }
        }
    }

    /// Signed integer of `width` bytes at `offset`.
    fn peek_int(
        &self,
        offset: usize,
        width: usize,
        endianness: Endianness,
    ) -> Result<i64, ReadError> {
        let raw = self.peek_uint(offset, width, endianness)?;
        let shift = 64 - 8 * width as u32;
        Ok(((raw as i64) << shift) >> shift)
    }
}

/// Everything the engine needs from a loaded image.
pub trait Image: AddressSpace + ByteSource {}

impl<T: AddressSpace + ByteSource> Image for T {}

/// A flat byte buffer mapped at a fixed base address.
///
/// Covers raw images and the engine's own tests; format-aware loaders
/// provide their own [`AddressSpace`]/[`ByteSource`] instead.
#[derive(Debug, Clone)]
pub struct MappedImage {
    base: Address,
    data: Vec<u8>,
    entry: Option<Address>,
}

impl MappedImage {
    /// Map `data` at `base`.
    pub fn new(base: Address, data: Vec<u8>) -> Self {
        Self {
            base,
            data,
            entry: None,
        }
    }

    /// Map `data` at `base` with a known entry point.
    pub fn with_entry(base: Address, data: Vec<u8>, entry: Address) -> Self {
        Self {
            base,
            data,
            entry: Some(entry),
        }
    }

    /// Map the contents of a file at `base` (raw image, no header parsing).
    pub fn from_file(base: Address, path: &std::path::Path) -> Result<Self, crate::Error> {
        let data = std::fs::read(path)?;
        Ok(Self::new(base, data))
    }

    /// Base virtual address of the mapping.
    pub fn base(&self) -> Address {
        self.base
    }

    /// Length of the mapped buffer in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One past the last mapped address.
    pub fn end_address(&self) -> Address {
        self.base + self.data.len() as Address
    }
}

impl AddressSpace for MappedImage {
    fn translate_address(&self, addr: Address) -> Option<usize> {
        if addr < self.base {
            return None;
        }
        let offset = (addr - self.base) as usize;
        (offset < self.data.len()).then_some(offset)
    }

    fn is_valid_range(&self, addr: Address, len: usize) -> bool {
        if addr < self.base {
            return false;
        }
        let offset = addr - self.base;
        match offset.checked_add(len as Address) {
            Some(end) => end <= self.data.len() as Address,
            None => false,
        }
    }

    fn entry_point(&self) -> Option<Address> {
        self.entry
    }
}

impl ByteSource for MappedImage {
    fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Bounds-checked reads at virtual addresses, layered over an [`Image`].
///
/// Every read validates the full span against the address space first; a
/// partially mapped span fails with [`ReadError::OutOfRange`] rather than
/// returning truncated data.
pub struct ImageReader<'a> {
    image: &'a dyn Image,
    endianness: Endianness,
}

impl<'a> ImageReader<'a> {
    pub fn new(image: &'a dyn Image, endianness: Endianness) -> Self {
        Self { image, endianness }
    }

    /// Read `len` bytes at virtual address `addr`.
    pub fn read_bytes(&self, addr: Address, len: usize) -> Result<&'a [u8], ReadError> {
        if !self.image.is_valid_range(addr, len) {
            return Err(ReadError::OutOfRange { addr, len });
        }
        let offset = self
            .image
            .translate_address(addr)
            .ok_or(ReadError::OutOfRange { addr, len })?;
        self.image
            .peek_bytes(offset, len)
            .ok_or(ReadError::OutOfRange { addr, len })
    }

    /// Read an unsigned integer of `width` bytes at `addr`.
    pub fn read_uint(&self, addr: Address, width: usize) -> Result<u64, ReadError> {
        if !matches!(width, 1 | 2 | 4 | 8) {
            return Err(ReadError::UnsupportedSize(width));
        }
        if !self.image.is_valid_range(addr, width) {
            return Err(ReadError::OutOfRange { addr, len: width });
        }
        let offset = self
            .image
            .translate_address(addr)
            .ok_or(ReadError::OutOfRange { addr, len: width })?;
        self.image.peek_uint(offset, width, self.endianness)
    }

    /// Read a signed integer of `width` bytes at `addr`.
    pub fn read_int(&self, addr: Address, width: usize) -> Result<i64, ReadError> {
        let raw = self.read_uint(addr, width)?;
        let shift = 64 - 8 * width as u32;
        Ok(((raw as i64) << shift) >> shift)
    }

    pub fn read_u8(&self, addr: Address) -> Result<u8, ReadError> {
        Ok(self.read_uint(addr, 1)? as u8)
    }

    pub fn read_u16(&self, addr: Address) -> Result<u16, ReadError> {
        Ok(self.read_uint(addr, 2)? as u16)
    }

    pub fn read_u32(&self, addr: Address) -> Result<u32, ReadError> {
        Ok(self.read_uint(addr, 4)? as u32)
    }

    pub fn read_u64(&self, addr: Address) -> Result<u64, ReadError> {
        self.read_uint(addr, 8)
    }

    pub fn read_i8(&self, addr: Address) -> Result<i8, ReadError> {
        Ok(self.read_int(addr, 1)? as i8)
    }

    pub fn read_i16(&self, addr: Address) -> Result<i16, ReadError> {
        Ok(self.read_int(addr, 2)? as i16)
    }

    pub fn read_i32(&self, addr: Address) -> Result<i32, ReadError> {
        Ok(self.read_int(addr, 4)? as i32)
    }

    pub fn read_i64(&self, addr: Address) -> Result<i64, ReadError> {
        self.read_int(addr, 8)
    }

    /// Read a NUL-terminated ASCII string at `addr`.
    ///
    /// Fails with `OutOfRange` if an unmapped byte is hit before the
    /// terminator, and with `UnterminatedString` if `max_len` mapped bytes
    /// go by without one. Non-ASCII bytes are kept as-is via lossy
    /// conversion.
    pub fn read_ascii_string(&self, addr: Address, max_len: usize) -> Result<String, ReadError> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let at = addr + i as Address;
            let b = self.read_u8(at)?;
            if b == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(b);
        }
        Err(ReadError::UnterminatedString { addr, max_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn image() -> MappedImage {
        MappedImage::new(0x1000, vec![0x41, 0x42, 0x00, 0xff, 0x10, 0x20, 0x30, 0x40, 0x50])
    }

    #[test]
    fn test_translate_and_validate() {
        let img = image();
        assert_eq!(img.translate_address(0x1000), Some(0));
        assert_eq!(img.translate_address(0x1008), Some(8));
        assert_eq!(img.translate_address(0x1009), None);
        assert_eq!(img.translate_address(0xfff), None);

        assert!(img.is_valid_range(0x1000, 9));
        assert!(!img.is_valid_range(0x1000, 10));
        assert!(!img.is_valid_range(0x1008, 2));
        assert!(!img.is_valid_range(u64::MAX, 2));
    }

    #[test]
    fn test_read_bytes_never_partial() {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Little);

        assert_eq!(reader.read_bytes(0x1000, 3).unwrap(), &[0x41, 0x42, 0x00]);
        // One byte past the end: no partial data, just OutOfRange.
        assert_eq!(
            reader.read_bytes(0x1005, 5),
            Err(ReadError::OutOfRange { addr: 0x1005, len: 5 })
        );
    }

    #[rstest]
    #[case(1, 0x10)]
    #[case(2, 0x2010)]
    #[case(4, 0x40302010)]
    fn test_read_uint_le(#[case] width: usize, #[case] expected: u64) {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Little);
        assert_eq!(reader.read_uint(0x1004, width).unwrap(), expected);
    }

    #[rstest]
    #[case(2, 0x1020)]
    #[case(4, 0x10203040)]
    fn test_read_uint_be(#[case] width: usize, #[case] expected: u64) {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Big);
        assert_eq!(reader.read_uint(0x1004, width).unwrap(), expected);
    }

    #[test]
    fn test_unsupported_width() {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Little);
        assert_eq!(reader.read_uint(0x1000, 3), Err(ReadError::UnsupportedSize(3)));
        assert_eq!(reader.read_int(0x1000, 5), Err(ReadError::UnsupportedSize(5)));
    }

    #[test]
    fn test_read_int_sign_extension() {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Little);
        // 0xff at offset 3
        assert_eq!(reader.read_i8(0x1003).unwrap(), -1);
        assert_eq!(reader.read_u8(0x1003).unwrap(), 0xff);
    }

    #[test]
    fn test_read_ascii_string() {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Little);
        assert_eq!(reader.read_ascii_string(0x1000, 16).unwrap(), "AB");
        // Runs off the mapped image before a terminator.
        assert_eq!(
            reader.read_ascii_string(0x1003, 16),
            Err(ReadError::OutOfRange { addr: 0x1009, len: 1 })
        );
    }

    #[test]
    fn test_unterminated_string_reports_limit() {
        let img = image();
        let reader = ImageReader::new(&img, Endianness::Little);
        // Four mapped, nonzero bytes from 0x1003; the limit expires while
        // every byte was readable.
        assert_eq!(
            reader.read_ascii_string(0x1003, 4),
            Err(ReadError::UnterminatedString { addr: 0x1003, max_len: 4 })
        );
    }

    #[test]
    fn test_peek_uint_reports_offset() {
        let img = image();
        // Direct ByteSource access works in offset space, and its error
        // says so instead of dressing the offset up as an address.
        assert_eq!(
            img.peek_uint(8, 2, Endianness::Little),
            Err(ReadError::OutOfRangeOffset { offset: 8, len: 2 })
        );
        assert_eq!(img.peek_uint(8, 1, Endianness::Little).unwrap(), 0x50);
    }
}
