//! Little-endian framing shared by the binary artifacts.
//!
//! Every artifact is `magic ‖ body ‖ crc32(magic ‖ body)`.

use crate::errors::{LinkRankError, LinkRankResult};

pub(crate) const MAGIC_LEN: usize = 4;
const CRC_LEN: usize = 4;

/// Append the CRC32 trailer and return it.
pub(crate) fn seal(buf: &mut Vec<u8>) -> u32 {
    let checksum = crc32fast::hash(buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    checksum
}

/// Check magic and trailer; returns the body (between magic and trailer) and the checksum.
pub(crate) fn unseal<'a>(
    bytes: &'a [u8],
    magic: &[u8; MAGIC_LEN],
    what: &str,
) -> LinkRankResult<(&'a [u8], u32)> {
    if bytes.len() < MAGIC_LEN + CRC_LEN {
        return Err(LinkRankError::Corrupt(format!(
            "{what}: {} bytes is too short",
            bytes.len()
        )));
    }
    if &bytes[..MAGIC_LEN] != magic {
        return Err(LinkRankError::Corrupt(format!("{what}: bad magic")));
    }
    let split = bytes.len() - CRC_LEN;
    let mut trailer = [0u8; CRC_LEN];
    trailer.copy_from_slice(&bytes[split..]);
    let stored = u32::from_le_bytes(trailer);
    let actual = crc32fast::hash(&bytes[..split]);
    if stored != actual {
        return Err(LinkRankError::Corrupt(format!(
            "{what}: checksum {actual:08x} does not match stored {stored:08x}"
        )));
    }
    Ok((&bytes[MAGIC_LEN..split], stored))
}

/// Bounds-checked reader over a body.
pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    what: &'a str,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], what: &'a str) -> Self {
        Self { bytes, pos: 0, what }
    }

    fn take<const N: usize>(&mut self) -> LinkRankResult<[u8; N]> {
        let end = self.pos + N;
        if end > self.bytes.len() {
            return Err(LinkRankError::Corrupt(format!(
                "{}: truncated at byte {}",
                self.what, self.pos
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn u32(&mut self) -> LinkRankResult<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self) -> LinkRankResult<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    pub(crate) fn i64(&mut self) -> LinkRankResult<i64> {
        self.take::<8>().map(i64::from_le_bytes)
    }

    /// Reads a length that must fit in memory.
    pub(crate) fn len(&mut self) -> LinkRankResult<usize> {
        let raw = self.u64()?;
        usize::try_from(raw)
            .map_err(|_| LinkRankError::Corrupt(format!("{}: length {raw} overflows", self.what)))
    }

    /// Fail unless exactly `remaining` bytes are left.
    pub(crate) fn expect_remaining(&self, remaining: usize) -> LinkRankResult<()> {
        let left = self.bytes.len() - self.pos;
        if left != remaining {
            return Err(LinkRankError::Corrupt(format!(
                "{}: expected {remaining} payload bytes, found {left}",
                self.what
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_unseal_detects_flip() {
        let mut buf = b"TEST".to_vec();
        buf.extend_from_slice(&42u64.to_le_bytes());
        let checksum = seal(&mut buf);
        let (body, stored) = unseal(&buf, b"TEST", "t").unwrap();
        assert_eq!(stored, checksum);
        assert_eq!(ByteCursor::new(body, "t").u64().unwrap(), 42);

        buf[5] ^= 0xff;
        assert!(matches!(unseal(&buf, b"TEST", "t"), Err(LinkRankError::Corrupt(_))));
        assert!(unseal(&buf, b"NOPE", "t").is_err());
        assert!(unseal(&buf[..6], b"TEST", "t").is_err());
    }

    #[test]
    fn test_cursor_truncation() {
        let bytes = [1u8, 0, 0];
        let mut cursor = ByteCursor::new(&bytes, "t");
        assert!(cursor.u32().is_err());
        let mut cursor = ByteCursor::new(&bytes, "t");
        assert!(cursor.expect_remaining(3).is_ok());
        assert!(cursor.expect_remaining(2).is_err());
    }
}
