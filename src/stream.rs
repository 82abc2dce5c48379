//! Byte-addressable buffered I/O, spec.md §4.1/§6.
//!
//! The teacher exposes this as `pub mod stream` / `pub use types::Stream`
//! backed by a C-style `opj_stream_t` with raw read/write/skip callbacks.
//! Here the same contract is a safe trait over `byteorder`'s big-endian
//! helpers, with two concrete backends: an in-memory growable buffer for
//! writing, and a borrowed-slice reader that can hand out zero-copy views.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// The stream contract from spec.md §6. Failures return `false`/`Err`; no
/// partial writes are reported as success.
pub trait Stream {
  fn read(&mut self, dst: &mut [u8]) -> Result<usize>;
  fn write(&mut self, src: &[u8]) -> Result<usize>;
  fn skip(&mut self, n: u64) -> Result<()>;
  fn seek(&mut self, abs: u64) -> Result<()>;
  fn tell(&self) -> u64;
  fn bytes_remaining(&self) -> u64;
  fn flush(&mut self) -> Result<()> {
    Ok(())
  }

  /// Optional zero-copy view into the backing buffer. The default
  /// implementation falls back to `None`, matching the design note
  /// "expose zero-copy as an explicit optional method". The returned slice
  /// must not outlive the next `seek`/`skip` call.
  fn zero_copy_ptr(&self, _n: usize) -> Option<&[u8]> {
    None
  }

  fn read_u8(&mut self) -> Result<u8> {
    let mut buf = [0u8; 1];
    self.read_exact_or_err(&mut buf)?;
    Ok(buf[0])
  }

  fn read_u16(&mut self) -> Result<u16> {
    let mut buf = [0u8; 2];
    self.read_exact_or_err(&mut buf)?;
    Ok(Cursor::new(buf).read_u16::<BigEndian>().unwrap())
  }

  fn read_u24(&mut self) -> Result<u32> {
    let mut buf = [0u8; 3];
    self.read_exact_or_err(&mut buf)?;
    Ok(Cursor::new(buf).read_u24::<BigEndian>().unwrap())
  }

  fn read_u32(&mut self) -> Result<u32> {
    let mut buf = [0u8; 4];
    self.read_exact_or_err(&mut buf)?;
    Ok(Cursor::new(buf).read_u32::<BigEndian>().unwrap())
  }

  fn read_u64(&mut self) -> Result<u64> {
    let mut buf = [0u8; 8];
    self.read_exact_or_err(&mut buf)?;
    Ok(Cursor::new(buf).read_u64::<BigEndian>().unwrap())
  }

  fn read_exact_or_err(&mut self, dst: &mut [u8]) -> Result<()> {
    let n = self.read(dst)?;
    if n != dst.len() {
      return Err(Error::IoFailure(format!(
        "short read: wanted {} got {}",
        dst.len(),
        n
      )));
    }
    Ok(())
  }

  fn write_u8(&mut self, v: u8) -> Result<()> {
    self.write_all_or_err(&[v])
  }

  fn write_u16(&mut self, v: u16) -> Result<()> {
    let mut buf = [0u8; 2];
    Cursor::new(&mut buf[..]).write_u16::<BigEndian>(v).unwrap();
    self.write_all_or_err(&buf)
  }

  fn write_u24(&mut self, v: u32) -> Result<()> {
    let mut buf = [0u8; 3];
    Cursor::new(&mut buf[..]).write_u24::<BigEndian>(v).unwrap();
    self.write_all_or_err(&buf)
  }

  fn write_u32(&mut self, v: u32) -> Result<()> {
    let mut buf = [0u8; 4];
    Cursor::new(&mut buf[..]).write_u32::<BigEndian>(v).unwrap();
    self.write_all_or_err(&buf)
  }

  fn write_u64(&mut self, v: u64) -> Result<()> {
    let mut buf = [0u8; 8];
    Cursor::new(&mut buf[..]).write_u64::<BigEndian>(v).unwrap();
    self.write_all_or_err(&buf)
  }

  fn write_all_or_err(&mut self, src: &[u8]) -> Result<()> {
    let n = self.write(src)?;
    if n != src.len() {
      return Err(Error::IoFailure(format!(
        "short write: wanted {} wrote {}",
        src.len(),
        n
      )));
    }
    Ok(())
  }
}

/// A growable in-memory sink, used by the compressor front-end.
#[derive(Debug, Default)]
pub struct MemStream {
  buf: Vec<u8>,
  pos: usize,
}

impl MemStream {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn into_inner(self) -> Vec<u8> {
    self.buf
  }

  pub fn as_slice(&self) -> &[u8] {
    &self.buf
  }
}

impl Stream for MemStream {
  fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
    let avail = self.buf.len().saturating_sub(self.pos);
    let n = dst.len().min(avail);
    dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
    self.pos += n;
    Ok(n)
  }

  fn write(&mut self, src: &[u8]) -> Result<usize> {
    if self.pos == self.buf.len() {
      self.buf.extend_from_slice(src);
    } else {
      let end = self.pos + src.len();
      if end > self.buf.len() {
        self.buf.resize(end, 0);
      }
      self.buf[self.pos..end].copy_from_slice(src);
    }
    self.pos += src.len();
    Ok(src.len())
  }

  fn skip(&mut self, n: u64) -> Result<()> {
    self.pos = (self.pos as u64 + n) as usize;
    Ok(())
  }

  fn seek(&mut self, abs: u64) -> Result<()> {
    self.pos = abs as usize;
    Ok(())
  }

  fn tell(&self) -> u64 {
    self.pos as u64
  }

  fn bytes_remaining(&self) -> u64 {
    self.buf.len().saturating_sub(self.pos) as u64
  }

  fn zero_copy_ptr(&self, n: usize) -> Option<&[u8]> {
    if self.pos + n <= self.buf.len() {
      Some(&self.buf[self.pos..self.pos + n])
    } else {
      None
    }
  }
}

/// A read-only view over a borrowed buffer (e.g. a memory-mapped file);
/// all reads are zero-copy.
#[derive(Debug)]
pub struct SliceStream<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> SliceStream<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self { buf, pos: 0 }
  }
}

impl<'a> Stream for SliceStream<'a> {
  fn read(&mut self, dst: &mut [u8]) -> Result<usize> {
    let avail = self.buf.len().saturating_sub(self.pos);
    let n = dst.len().min(avail);
    dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
    self.pos += n;
    Ok(n)
  }

  fn write(&mut self, _src: &[u8]) -> Result<usize> {
    Err(Error::IoFailure("SliceStream is read-only".into()))
  }

  fn skip(&mut self, n: u64) -> Result<()> {
    let new_pos = self.pos as u64 + n;
    if new_pos > self.buf.len() as u64 {
      return Err(Error::IoFailure("skip past end of stream".into()));
    }
    self.pos = new_pos as usize;
    Ok(())
  }

  fn seek(&mut self, abs: u64) -> Result<()> {
    if abs > self.buf.len() as u64 {
      return Err(Error::IoFailure("seek past end of stream".into()));
    }
    self.pos = abs as usize;
    Ok(())
  }

  fn tell(&self) -> u64 {
    self.pos as u64
  }

  fn bytes_remaining(&self) -> u64 {
    self.buf.len().saturating_sub(self.pos) as u64
  }

  fn zero_copy_ptr(&self, n: usize) -> Option<&[u8]> {
    if self.pos + n <= self.buf.len() {
      Some(&self.buf[self.pos..self.pos + n])
    } else {
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mem_stream_roundtrip_be() {
    let mut s = MemStream::new();
    s.write_u16(0xFF4F).unwrap();
    s.write_u32(0x1234_5678).unwrap();
    let bytes = s.into_inner();
    assert_eq!(&bytes, &[0xFF, 0x4F, 0x12, 0x34, 0x56, 0x78]);

    let mut r = SliceStream::new(&bytes);
    assert_eq!(r.read_u16().unwrap(), 0xFF4F);
    assert_eq!(r.read_u32().unwrap(), 0x1234_5678);
    assert_eq!(r.bytes_remaining(), 0);
  }

  #[test]
  fn slice_stream_short_read_errors() {
    let bytes = [0u8; 1];
    let mut r = SliceStream::new(&bytes);
    assert!(r.read_u16().is_err());
  }

  #[test]
  fn zero_copy_view_bounded() {
    let bytes = [1u8, 2, 3, 4];
    let r = SliceStream::new(&bytes);
    assert_eq!(r.zero_copy_ptr(4), Some(&bytes[..]));
    assert_eq!(r.zero_copy_ptr(5), None);
  }
}
