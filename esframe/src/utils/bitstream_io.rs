//! Bit-level reading of frame headers.
//!
//! All supported sync headers are big-endian bit fields packed across the
//! first few bytes of a frame. [`HeaderReader`] walks them MSB first.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader, UnsignedInteger};

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, BigEndian>,
    len: u64,
}

pub type HeaderReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "get_n({}): header ends at bit {}",
                    n, self.len
                ),
            )),
            Err(e) => Err(e),
        }
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        self.bs.skip(n)
    }
}

impl<'a> HeaderReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        Self::new(io::Cursor::new(buf), len)
    }
}

#[test]
fn reads_msb_first() -> io::Result<()> {
    let mut reader = HeaderReader::from_slice(&[0b1011_0010, 0xF0]);

    assert!(reader.get()?);
    assert_eq!(reader.get_n::<u8>(3)?, 0b011);
    reader.skip_n(4)?;
    assert_eq!(reader.get_n::<u16>(4)?, 0xF);

    let err = reader.get_n::<u8>(5).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    assert!(err.to_string().ends_with("header ends at bit 16"));

    Ok(())
}
