//! FileFormat: the JP2/JPH box tree, spec.md §4.7.
//!
//! Grounded on the teacher's `opj_jp2_read_header_procedure` (box-stream
//! dispatch loop), `opj_jp2_read_jp`/`read_ftyp`/`read_jp2h` (signature,
//! file-type, header super-box) and `opj_jp2_read_ihdr`/`read_bpcc`/
//! `read_colr`/`read_pclr`/`read_cmap`/`read_cdef` (`openjp2-rs/src/jp2.rs`)
//! for box framing and per-box validation. The teacher walks boxes against
//! a single `opj_jp2` struct mutated in place by free functions; here each
//! box decodes into its own owned type and `FileFormat` assembles them,
//! since there's no FFI layer to keep field-for-field compatible with.

use crate::error::{Error, Result};
use crate::stream::Stream;
use crate::consts::{box_type, JP2_SIGNATURE_CONTENT};

/// One box header: 4-byte length (or the XL 8-byte form), 4-byte type.
#[derive(Debug, Clone, Copy)]
struct BoxHeader {
  /// Total box length, header included. `None` means "extends to end of
  /// stream", only legal for the last box (teacher's `length == 0` case).
  length: Option<u64>,
  ty: [u8; 4],
  header_length: u64,
}

impl BoxHeader {
  fn read(stream: &mut dyn Stream) -> Result<Option<Self>> {
    if stream.bytes_remaining() == 0 {
      return Ok(None);
    }
    if stream.bytes_remaining() < 8 {
      return Err(Error::corrupt(stream.tell(), "truncated box header"));
    }
    let raw_len = stream.read_u32()?;
    let mut ty = [0u8; 4];
    stream.read_exact_or_err(&mut ty)?;
    let mut header_length = 8u64;
    let length = if raw_len == 0 {
      None
    } else if raw_len == 1 {
      let xl = stream.read_u64()?;
      header_length += 8;
      Some(xl)
    } else {
      Some(raw_len as u64)
    };
    if let Some(len) = length {
      if len < header_length {
        return Err(Error::corrupt_box(stream.tell(), ty, "box length smaller than header"));
      }
    }
    Ok(Some(BoxHeader { length, ty, header_length }))
  }

  /// Number of payload bytes, or `None` if the box runs to end of stream.
  fn content_length(&self, bytes_remaining: u64) -> Result<u64> {
    match self.length {
      Some(len) => Ok(len - self.header_length),
      None => Ok(bytes_remaining),
    }
  }

  fn write_prefix(stream: &mut dyn Stream, ty: &[u8; 4], content_len: u32) -> Result<()> {
    stream.write_u32(8 + content_len)?;
    stream.write_all_or_err(ty)
  }
}

/// Channel sign/size for one palette column (teacher's `Jp2ChannelSign`).
#[derive(Debug, Clone, Copy)]
pub struct PaletteColumn {
  pub size_bits: u8,
  pub signed: bool,
}

/// `PCLR` box: the indexed colour palette.
#[derive(Debug, Clone, Default)]
pub struct Palette {
  pub num_entries: u16,
  pub columns: Vec<PaletteColumn>,
  /// Row-major `[entry][column]`.
  pub entries: Vec<u32>,
  pub cmap: Vec<ComponentMapping>,
}

impl Palette {
  pub fn num_channels(&self) -> usize {
    self.columns.len()
  }
}

/// One `CMAP` entry: which code-stream component (or palette column) feeds
/// output channel `i` (teacher's `opj_jp2_cmap_comp`).
#[derive(Debug, Clone, Copy)]
pub struct ComponentMapping {
  pub component: u16,
  /// 0 = direct use, 1 = palette mapping (teacher's `mtyp`).
  pub mapping_type: u8,
  /// Palette column index, used only when `mapping_type == 1`.
  pub palette_column: u8,
}

/// One `CDEF` entry: channel type/association (teacher's `opj_jp2_cdef_info`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelDefinition {
  pub channel: u16,
  /// 0 = colour, 1 = opacity, 2 = premultiplied opacity, 65535 = unspecified.
  pub channel_type: u16,
  /// 0 or 65535 = "whole image", else 1-based component index + 1.
  pub association: u16,
}

/// `COLR` box content.
#[derive(Debug, Clone)]
pub enum ColourSpecification {
  /// `meth=1`: an enumerated colourspace (Table I.9 `EnumCS`; sRGB=16,
  /// greyscale=17, sYCC=18).
  Enumerated(u32),
  /// `meth=2`: a restricted ICC profile, carried opaquely.
  IccProfile(Vec<u8>),
}

/// Decoded `JP2H` box contents, spec.md §4.7.
#[derive(Debug, Clone, Default)]
pub struct HeaderBoxes {
  pub width: u32,
  pub height: u32,
  pub num_components: u16,
  /// Bits per component, or `255` meaning "see BPCC box" (teacher's `bpc`).
  pub bits_per_component: u8,
  pub compression_type: u8,
  pub unknown_colourspace: bool,
  pub ip_rights: bool,
  pub bpcc: Option<Vec<u8>>,
  pub colour: Option<(u8, u8, ColourSpecification)>, // (precedence, approx, spec)
  pub palette: Option<Palette>,
  pub channel_definitions: Vec<ChannelDefinition>,
}

/// Whole decoded file structure: everything outside the code-stream box.
#[derive(Debug, Clone, Default)]
pub struct FileFormat {
  pub brand: u32,
  pub min_version: u32,
  pub compatibility_list: Vec<u32>,
  pub header: HeaderBoxes,
  /// Byte offset and length of the `JP2C` box payload, so the caller can
  /// seek and hand the bytes to the code-stream front-end.
  pub codestream_offset: u64,
  pub codestream_length: Option<u64>,
}

const MAX_PALETTE_ENTRIES: u16 = 1024;

/// Reads the whole box tree up to and including locating `JP2C`, spec.md
/// §4.7: signature must come first, `FTYP` second, boxes before `FTYP`
/// other than those two are fatal, everything else unrecognised is skipped
/// with a warning. Stops once `JP2C`'s header has been consumed, leaving
/// the stream positioned at the start of the code-stream payload.
pub fn read_file_format(stream: &mut dyn Stream) -> Result<FileFormat> {
  let mut ff = FileFormat::default();
  let mut seen_signature = false;
  let mut seen_ftyp = false;
  let mut seen_jp2h = false;

  while let Some(header) = BoxHeader::read(stream)? {
    if header.ty == box_type::JP2C {
      if !seen_jp2h {
        return Err(Error::corrupt_box(stream.tell(), header.ty, "codestream box before jp2h"));
      }
      ff.codestream_offset = stream.tell();
      ff.codestream_length = header.length.map(|l| l - header.header_length);
      return Ok(ff);
    }

    let content_len = header.content_length(stream.bytes_remaining())?;
    if content_len > stream.bytes_remaining() {
      return Err(Error::corrupt_box(stream.tell(), header.ty, "box declares more bytes than remain"));
    }
    let mut body = vec![0u8; content_len as usize];
    stream.read_exact_or_err(&mut body)?;

    match header.ty {
      t if t == box_type::JP => {
        if seen_signature {
          return Err(Error::corrupt_box(stream.tell(), t, "signature box must be first"));
        }
        read_signature(&body)?;
        seen_signature = true;
      }
      t if t == box_type::FTYP => {
        if !seen_signature || seen_ftyp {
          return Err(Error::corrupt_box(stream.tell(), t, "file-type box must immediately follow signature"));
        }
        let (brand, min_version, cl) = read_ftyp(&body)?;
        ff.brand = brand;
        ff.min_version = min_version;
        ff.compatibility_list = cl;
        seen_ftyp = true;
      }
      t if t == box_type::JP2H => {
        if !seen_ftyp {
          return Err(Error::corrupt_box(stream.tell(), t, "jp2h box must follow ftyp"));
        }
        ff.header = read_jp2h(&body)?;
        seen_jp2h = true;
      }
      t => {
        if !seen_ftyp {
          return Err(Error::corrupt_box(stream.tell(), t, "unknown box before file-type box"));
        }
        log::warn!("ignoring unsupported top-level box {:?}", String::from_utf8_lossy(&t));
      }
    }
  }

  Err(Error::corrupt(stream.tell(), "stream ended before a jp2c box was found"))
}

fn read_signature(body: &[u8]) -> Result<()> {
  if body.len() != 4 || body != JP2_SIGNATURE_CONTENT {
    return Err(Error::corrupt_box(0, box_type::JP, "bad signature box content"));
  }
  Ok(())
}

fn read_ftyp(body: &[u8]) -> Result<(u32, u32, Vec<u32>)> {
  if body.len() < 8 || body.len() % 4 != 0 {
    return Err(Error::corrupt_box(0, box_type::FTYP, "bad file-type box size"));
  }
  let brand = u32::from_be_bytes(body[0..4].try_into().unwrap());
  let min_version = u32::from_be_bytes(body[4..8].try_into().unwrap());
  let cl = body[8..]
    .chunks_exact(4)
    .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
    .collect();
  Ok((brand, min_version, cl))
}

/// Reads the `JP2H` super-box body: a flat concatenation of child boxes
/// (teacher's `opj_jp2_read_jp2h`, which reads children off the already
/// sliced-out jp2h payload rather than the live stream).
fn read_jp2h(mut body: &[u8]) -> Result<HeaderBoxes> {
  let mut out = HeaderBoxes::default();
  let mut has_ihdr = false;

  while !body.is_empty() {
    if body.len() < 8 {
      return Err(Error::corrupt_box(0, box_type::JP2H, "truncated child box header"));
    }
    let len = u32::from_be_bytes(body[0..4].try_into().unwrap());
    let ty: [u8; 4] = body[4..8].try_into().unwrap();
    if (len as usize) < 8 || (len as usize) > body.len() {
      return Err(Error::corrupt_box(0, ty, "inconsistent child box length"));
    }
    let content = &body[8..len as usize];
    body = &body[len as usize..];

    match ty {
      t if t == box_type::IHDR => {
        read_ihdr(content, &mut out)?;
        has_ihdr = true;
      }
      t if t == box_type::BPCC => read_bpcc(content, &mut out)?,
      t if t == box_type::COLR => read_colr(content, &mut out)?,
      t if t == box_type::PCLR => read_pclr(content, &mut out)?,
      t if t == box_type::CMAP => read_cmap(content, &mut out)?,
      t if t == box_type::CDEF => read_cdef(content, &mut out)?,
      t if t == box_type::RES || t == box_type::XML || t == box_type::UUID || t == box_type::ASOC => {
        log::warn!("ignoring metadata box {:?} inside jp2h", String::from_utf8_lossy(&ty));
      }
      t => {
        log::warn!("ignoring unknown box {:?} inside jp2h", String::from_utf8_lossy(&t));
      }
    }
  }

  if !has_ihdr {
    return Err(Error::corrupt_box(0, box_type::JP2H, "jp2h has no ihdr box"));
  }
  Ok(out)
}

fn read_ihdr(body: &[u8], out: &mut HeaderBoxes) -> Result<()> {
  if body.len() != 14 {
    return Err(Error::corrupt_box(0, box_type::IHDR, "ihdr must be 14 bytes"));
  }
  let height = u32::from_be_bytes(body[0..4].try_into().unwrap());
  let width = u32::from_be_bytes(body[4..8].try_into().unwrap());
  let num_components = u16::from_be_bytes(body[8..10].try_into().unwrap());
  if height == 0 || width == 0 || num_components == 0 {
    return Err(Error::corrupt_box(0, box_type::IHDR, "zero width/height/components"));
  }
  if num_components as u32 > crate::consts::MAX_COMPONENTS {
    return Err(Error::corrupt_box(0, box_type::IHDR, "too many components"));
  }
  out.width = width;
  out.height = height;
  out.num_components = num_components;
  out.bits_per_component = body[10];
  out.compression_type = body[11];
  out.unknown_colourspace = body[12] != 0;
  out.ip_rights = body[13] != 0;
  Ok(())
}

fn read_bpcc(body: &[u8], out: &mut HeaderBoxes) -> Result<()> {
  if out.num_components == 0 {
    return Err(Error::corrupt_box(0, box_type::BPCC, "bpcc before ihdr"));
  }
  if body.len() != out.num_components as usize {
    return Err(Error::corrupt_box(0, box_type::BPCC, "bpcc size mismatch with ihdr component count"));
  }
  out.bpcc = Some(body.to_vec());
  Ok(())
}

fn read_colr(body: &[u8], out: &mut HeaderBoxes) -> Result<()> {
  // "A conforming reader shall ignore all colour specification boxes
  // after the first" (spec.md §4.7).
  if out.colour.is_some() {
    return Ok(());
  }
  if body.len() < 3 {
    return Err(Error::corrupt_box(0, box_type::COLR, "colr box too short"));
  }
  let meth = body[0];
  let precedence = body[1];
  let approx = body[2];
  let spec = match meth {
    1 => {
      if body.len() < 7 {
        return Err(Error::corrupt_box(0, box_type::COLR, "enumerated colr box too short"));
      }
      ColourSpecification::Enumerated(u32::from_be_bytes(body[3..7].try_into().unwrap()))
    }
    2 => ColourSpecification::IccProfile(body[3..].to_vec()),
    _ => return Err(Error::corrupt_box(0, box_type::COLR, "unsupported colr METH value")),
  };
  out.colour = Some((precedence, approx, spec));
  Ok(())
}

fn read_pclr(body: &[u8], out: &mut HeaderBoxes) -> Result<()> {
  if out.palette.is_some() {
    return Err(Error::corrupt_box(0, box_type::PCLR, "more than one pclr box"));
  }
  if body.len() < 3 {
    return Err(Error::corrupt_box(0, box_type::PCLR, "pclr box too short"));
  }
  let num_entries = u16::from_be_bytes(body[0..2].try_into().unwrap());
  if num_entries == 0 || num_entries > MAX_PALETTE_ENTRIES {
    return Err(Error::corrupt_box(0, box_type::PCLR, "invalid palette entry count"));
  }
  let num_channels = body[2];
  if num_channels == 0 {
    return Err(Error::corrupt_box(0, box_type::PCLR, "palette has zero columns"));
  }
  let mut pos = 3usize;
  if body.len() < pos + num_channels as usize {
    return Err(Error::corrupt_box(0, box_type::PCLR, "pclr box too short for column descriptors"));
  }
  let mut columns = Vec::with_capacity(num_channels as usize);
  for _ in 0..num_channels {
    let raw = body[pos];
    pos += 1;
    let size_bits = (raw & 0x7f) + 1;
    let signed = raw & 0x80 != 0;
    if signed {
      return Err(Error::corrupt_box(0, box_type::PCLR, "signed palette channels are not supported"));
    }
    columns.push(PaletteColumn { size_bits, signed });
  }
  let mut entries = Vec::with_capacity(num_entries as usize * num_channels as usize);
  for _ in 0..num_entries {
    for col in &columns {
      let bytes = ((col.size_bits as usize) + 7) / 8;
      if bytes > 4 || pos + bytes > body.len() {
        return Err(Error::corrupt_box(0, box_type::PCLR, "truncated palette entries"));
      }
      let mut v = 0u32;
      for &b in &body[pos..pos + bytes] {
        v = (v << 8) | b as u32;
      }
      pos += bytes;
      entries.push(v);
    }
  }
  out.palette = Some(Palette {
    num_entries,
    columns,
    entries,
    cmap: Vec::new(),
  });
  Ok(())
}

fn read_cmap(body: &[u8], out: &mut HeaderBoxes) -> Result<()> {
  let palette = out
    .palette
    .as_mut()
    .ok_or_else(|| Error::corrupt_box(0, box_type::CMAP, "cmap box requires a preceding pclr box"))?;
  if !palette.cmap.is_empty() {
    return Err(Error::corrupt_box(0, box_type::CMAP, "more than one cmap box"));
  }
  let num_channels = palette.num_channels();
  if body.len() < num_channels * 4 {
    return Err(Error::corrupt_box(0, box_type::CMAP, "cmap box too short"));
  }
  let mut cmap = Vec::with_capacity(num_channels);
  for i in 0..num_channels {
    let off = i * 4;
    let component = u16::from_be_bytes(body[off..off + 2].try_into().unwrap());
    let mapping_type = body[off + 2];
    let palette_column = body[off + 3];
    if mapping_type > 1 {
      return Err(Error::corrupt_box(0, box_type::CMAP, "invalid cmap mapping type"));
    }
    cmap.push(ComponentMapping {
      component,
      mapping_type,
      palette_column,
    });
  }
  palette.cmap = cmap;
  Ok(())
}

fn read_cdef(body: &[u8], out: &mut HeaderBoxes) -> Result<()> {
  if !out.channel_definitions.is_empty() {
    return Err(Error::corrupt_box(0, box_type::CDEF, "more than one cdef box"));
  }
  if body.len() < 2 {
    return Err(Error::corrupt_box(0, box_type::CDEF, "cdef box too short"));
  }
  let n = u16::from_be_bytes(body[0..2].try_into().unwrap()) as usize;
  if n == 0 || body.len() < 2 + n * 6 {
    return Err(Error::corrupt_box(0, box_type::CDEF, "cdef box too short for declared entry count"));
  }
  let mut defs = Vec::with_capacity(n);
  for i in 0..n {
    let off = 2 + i * 6;
    let channel = u16::from_be_bytes(body[off..off + 2].try_into().unwrap());
    let channel_type = u16::from_be_bytes(body[off + 2..off + 4].try_into().unwrap());
    let association = u16::from_be_bytes(body[off + 4..off + 6].try_into().unwrap());
    defs.push(ChannelDefinition {
      channel,
      channel_type,
      association,
    });
  }
  // Each (channel, association) pair unique, spec.md §4.7.
  for i in 0..defs.len() {
    for j in i + 1..defs.len() {
      if defs[i].channel == defs[j].channel && defs[i].association == defs[j].association {
        return Err(Error::corrupt_box(0, box_type::CDEF, "duplicate channel/association pair in cdef"));
      }
    }
  }
  out.channel_definitions = defs;
  Ok(())
}

/// Writes a minimal, fully-specified box tree: `JP`, `FTYP`, `JP2H` (with
/// `IHDR` and, when present, `BPCC`/`COLR`), then the `JP2C` box header
/// only (the caller streams the raw code-stream bytes after it, mirroring
/// the teacher's `opj_jp2_write_jp2c` which writes only the box prefix and
/// lets the codec write its own payload through the same stream).
pub fn write_file_format(stream: &mut dyn Stream, ff: &FileFormat, codestream_len: u32) -> Result<()> {
  stream.write_u32(8 + 4)?;
  stream.write_all_or_err(&box_type::JP)?;
  stream.write_all_or_err(&JP2_SIGNATURE_CONTENT)?;

  let ftyp_len = 8 + ff.compatibility_list.len() as u32 * 4;
  BoxHeader::write_prefix(stream, &box_type::FTYP, ftyp_len)?;
  stream.write_u32(ff.brand)?;
  stream.write_u32(ff.min_version)?;
  for &cl in &ff.compatibility_list {
    stream.write_u32(cl)?;
  }

  write_jp2h(stream, &ff.header)?;

  BoxHeader::write_prefix(stream, &box_type::JP2C, codestream_len)?;
  Ok(())
}

fn write_jp2h(stream: &mut dyn Stream, h: &HeaderBoxes) -> Result<()> {
  let mut body = Vec::new();
  write_ihdr_into(&mut body, h);
  if let Some(bpcc) = &h.bpcc {
    write_bpcc_into(&mut body, bpcc);
  }
  if let Some((precedence, approx, spec)) = &h.colour {
    write_colr_into(&mut body, *precedence, *approx, spec);
  }

  BoxHeader::write_prefix(stream, &box_type::JP2H, body.len() as u32)?;
  stream.write_all_or_err(&body)
}

fn write_ihdr_into(body: &mut Vec<u8>, h: &HeaderBoxes) {
  body.extend_from_slice(&14u32.to_be_bytes());
  body.extend_from_slice(&box_type::IHDR);
  body.extend_from_slice(&h.height.to_be_bytes());
  body.extend_from_slice(&h.width.to_be_bytes());
  body.extend_from_slice(&h.num_components.to_be_bytes());
  body.push(h.bits_per_component);
  body.push(h.compression_type);
  body.push(h.unknown_colourspace as u8);
  body.push(h.ip_rights as u8);
}

fn write_bpcc_into(body: &mut Vec<u8>, bpcc: &[u8]) {
  body.extend_from_slice(&(8 + bpcc.len() as u32).to_be_bytes());
  body.extend_from_slice(&box_type::BPCC);
  body.extend_from_slice(bpcc);
}

fn write_colr_into(body: &mut Vec<u8>, precedence: u8, approx: u8, spec: &ColourSpecification) {
  let (meth, payload_len): (u8, usize) = match spec {
    ColourSpecification::Enumerated(_) => (1, 4),
    ColourSpecification::IccProfile(p) => (2, p.len()),
  };
  body.extend_from_slice(&(8 + 3 + payload_len as u32).to_be_bytes());
  body.extend_from_slice(&box_type::COLR);
  body.push(meth);
  body.push(precedence);
  body.push(approx);
  match spec {
    ColourSpecification::Enumerated(cs) => body.extend_from_slice(&cs.to_be_bytes()),
    ColourSpecification::IccProfile(p) => body.extend_from_slice(p),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::stream::MemStream;

  fn sample_ff() -> FileFormat {
    FileFormat {
      brand: u32::from_be_bytes(*b"jp2 "),
      min_version: 0,
      compatibility_list: vec![u32::from_be_bytes(*b"jp2 ")],
      header: HeaderBoxes {
        width: 64,
        height: 32,
        num_components: 3,
        bits_per_component: 7, // 8-bit unsigned: prec-1, msb=0
        compression_type: 7,
        unknown_colourspace: false,
        ip_rights: false,
        bpcc: None,
        colour: Some((0, 1, ColourSpecification::Enumerated(16))),
        palette: None,
        channel_definitions: vec![],
      },
      codestream_offset: 0,
      codestream_length: None,
    }
  }

  #[test]
  fn round_trips_signature_ftyp_jp2h() {
    let ff = sample_ff();
    let mut stream = MemStream::new();
    write_file_format(&mut stream, &ff, 12).unwrap();
    stream.write_all_or_err(&[0u8; 12]).unwrap();
    stream.seek(0).unwrap();

    let parsed = read_file_format(&mut stream).unwrap();
    assert_eq!(parsed.brand, ff.brand);
    assert_eq!(parsed.header.width, 64);
    assert_eq!(parsed.header.height, 32);
    assert_eq!(parsed.header.num_components, 3);
    match parsed.header.colour {
      Some((_, _, ColourSpecification::Enumerated(16))) => {}
      other => panic!("unexpected colour spec: {other:?}"),
    }
    assert_eq!(parsed.codestream_length, Some(12));
  }

  #[test]
  fn rejects_box_before_ftyp() {
    let mut stream = MemStream::new();
    stream.write_u32(8).unwrap();
    stream.write_all_or_err(&box_type::JP).unwrap();
    stream.write_all_or_err(&JP2_SIGNATURE_CONTENT).unwrap();
    // Unknown box right after signature, before ftyp.
    stream.write_u32(8).unwrap();
    stream.write_all_or_err(b"xxxx").unwrap();
    stream.seek(0).unwrap();
    assert!(read_file_format(&mut stream).is_err());
  }

  #[test]
  fn cmap_requires_preceding_pclr() {
    let body = [0u8, 0, 0, 0]; // one entry, direct use
    let mut out = HeaderBoxes::default();
    assert!(read_cmap(&body, &mut out).is_err());
  }

  #[test]
  fn cdef_rejects_duplicate_channel_association() {
    let mut body = Vec::new();
    body.extend_from_slice(&2u16.to_be_bytes());
    for _ in 0..2 {
      body.extend_from_slice(&0u16.to_be_bytes()); // channel 0
      body.extend_from_slice(&0u16.to_be_bytes()); // colour
      body.extend_from_slice(&1u16.to_be_bytes()); // assoc 1
    }
    let mut out = HeaderBoxes::default();
    assert!(read_cdef(&body, &mut out).is_err());
  }

  #[test]
  fn pclr_rejects_zero_entries() {
    let body = [0u8, 0, 1]; // num_entries=0, num_channels=1
    let mut out = HeaderBoxes::default();
    assert!(read_pclr(&body, &mut out).is_err());
  }
}
