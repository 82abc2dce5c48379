//! Marker codec: state machine plus segment read/write for the main and
//! tile-part headers, spec.md §4.2.
//!
//! Grounded on the teacher's `opj_j2k_read_cod`/`read_coc`/`read_qcd`/
//! `read_qcc`/`read_SQcd_SQcc`/`read_poc`/`read_sot`/`read_rgn` in
//! `openjp2-rs/src/j2k.rs`: the segment layouts and field-packing (Scod,
//! SGcod, SPcod/SPcoc, SQcd/SQcc band loop, the `qntsty==1` derived
//! stepsize rule) are reused, driven over this crate's `Stream` trait
//! instead of the teacher's raw `p_header_data` byte pointers, and with
//! `TileComponentCodingParams`/`TileCodingParams` from `coding_params.rs`
//! standing in for `opj_tccp_t`/`opj_tcp_t`.

use crate::coding_params::{CustomMct, OverrideSource, PocRecord, StepSize, TileCodingParams};
use crate::consts::{MarkerId, MarkerState, ProgressionOrder, QuantStyle};
use crate::error::{Error, Result};
use crate::stream::Stream;

/// Markers admissible anywhere in the main header, once SOC/SIZ are past,
/// spec.md §4.2 Table A.2's "main header" column.
fn is_main_header_marker(id: MarkerId) -> bool {
  matches!(
    id,
    MarkerId::Cod
      | MarkerId::Coc
      | MarkerId::Qcd
      | MarkerId::Qcc
      | MarkerId::Rgn
      | MarkerId::Poc
      | MarkerId::Com
      | MarkerId::Tlm
      | MarkerId::Plm
      | MarkerId::Plt
      | MarkerId::Ppm
      | MarkerId::Crg
      | MarkerId::Cap
      | MarkerId::Mct
      | MarkerId::Mcc
      | MarkerId::Mco
      | MarkerId::Cbd
  )
}

/// Markers admissible in a tile-part header, between SOT and SOD, spec.md
/// §4.2 Table A.2's "tile-part header" column.
fn is_tile_part_header_marker(id: MarkerId) -> bool {
  matches!(
    id,
    MarkerId::Cod | MarkerId::Coc | MarkerId::Qcd | MarkerId::Qcc | MarkerId::Rgn | MarkerId::Poc | MarkerId::Ppt | MarkerId::Plt
  )
}

/// Advances the admissible-marker state machine by one marker, spec.md
/// §4.2's state table, grounded on the teacher's `J2K_STATE` checks
/// scattered through `opj_j2k_read_header`/`opj_j2k_decode` (`j2k.rs`) —
/// consolidated here into one transition function instead of the
/// teacher's inline `if (state != J2K_STATE_MH) { error }` calls at each
/// read site, since every marker read in this crate funnels through
/// `CodeStream`'s two marker loops.
pub fn next_state(current: MarkerState, id: MarkerId, offset: u64) -> Result<MarkerState> {
  match id {
    MarkerId::Soc => {
      if current != MarkerState::empty() {
        return Err(Error::corrupt(offset, "SOC must be the first marker in the code-stream"));
      }
      Ok(MarkerState::MH_SOC)
    }
    MarkerId::Siz => {
      if current != MarkerState::MH_SOC {
        return Err(Error::corrupt(offset, "SIZ must immediately follow SOC"));
      }
      Ok(MarkerState::MH_SIZ)
    }
    MarkerId::Sot => {
      if !(current == MarkerState::MH_SIZ || current == MarkerState::MH || current == MarkerState::DATA) {
        return Err(Error::corrupt(offset, "SOT is not admissible in the current marker state"));
      }
      Ok(MarkerState::TPH_SOT)
    }
    MarkerId::Sod => {
      if !(current == MarkerState::TPH_SOT || current == MarkerState::TPH) {
        return Err(Error::corrupt(offset, "SOD is not admissible in the current marker state"));
      }
      Ok(MarkerState::DATA)
    }
    MarkerId::Eoc => {
      if current != MarkerState::DATA {
        return Err(Error::corrupt(offset, "EOC is only admissible after at least one tile's data"));
      }
      Ok(MarkerState::EOC)
    }
    _ if is_tile_part_header_marker(id) && (current == MarkerState::TPH_SOT || current == MarkerState::TPH) => Ok(MarkerState::TPH),
    _ if is_main_header_marker(id) && (current == MarkerState::MH_SIZ || current == MarkerState::MH) => Ok(MarkerState::MH),
    _ => Err(Error::corrupt(offset, format!("marker {id:?} is not admissible in the current marker state"))),
  }
}

/// Decoded SIZ marker (image + default tiling geometry), spec.md §4.2.1.
#[derive(Debug, Clone)]
pub struct SizParams {
  pub rsiz: u16,
  pub width: u32,
  pub height: u32,
  pub x0: u32,
  pub y0: u32,
  pub tile_width: u32,
  pub tile_height: u32,
  pub tile_x0: u32,
  pub tile_y0: u32,
  pub components: Vec<SizComponent>,
}

#[derive(Debug, Clone, Copy)]
pub struct SizComponent {
  pub precision: u8,
  pub signed: bool,
  pub dx: u8,
  pub dy: u8,
}

/// SOT (start of tile-part) segment, spec.md §4.2.1.
#[derive(Debug, Clone, Copy)]
pub struct SotParams {
  pub tile_index: u16,
  pub tile_part_length: u32,
  pub tile_part_index: u8,
  pub num_tile_parts: u8,
}

const MAX_DWT_LEVELS: usize = 33;
const MAX_BANDS: usize = 3 * MAX_DWT_LEVELS - 2;

/// Reads the SIZ marker segment body (marker code and length already
/// consumed by the caller).
pub fn read_siz(stream: &mut dyn Stream) -> Result<SizParams> {
  let rsiz = stream.read_u16()?;
  let width = stream.read_u32()?;
  let height = stream.read_u32()?;
  let x0 = stream.read_u32()?;
  let y0 = stream.read_u32()?;
  let tile_width = stream.read_u32()?;
  let tile_height = stream.read_u32()?;
  let tile_x0 = stream.read_u32()?;
  let tile_y0 = stream.read_u32()?;
  let num_components = stream.read_u16()?;
  if num_components == 0 || num_components as usize > crate::consts::MAX_COMPONENTS {
    return Err(Error::corrupt(stream.tell(), "SIZ: invalid component count"));
  }
  if width <= x0 || height <= y0 {
    return Err(Error::corrupt(stream.tell(), "SIZ: image bounds degenerate"));
  }
  if tile_width == 0 || tile_height == 0 {
    return Err(Error::corrupt(stream.tell(), "SIZ: zero tile size"));
  }
  let mut components = Vec::with_capacity(num_components as usize);
  for _ in 0..num_components {
    let ssiz = stream.read_u8()?;
    let dx = stream.read_u8()?;
    let dy = stream.read_u8()?;
    if dx == 0 || dy == 0 {
      return Err(Error::corrupt(stream.tell(), "SIZ: zero component subsampling"));
    }
    components.push(SizComponent {
      precision: (ssiz & 0x7f) + 1,
      signed: ssiz & 0x80 != 0,
      dx,
      dy,
    });
  }
  Ok(SizParams {
    rsiz,
    width,
    height,
    x0,
    y0,
    tile_width,
    tile_height,
    tile_x0,
    tile_y0,
    components,
  })
}

pub fn write_siz(stream: &mut dyn Stream, siz: &SizParams) -> Result<()> {
  stream.write_u16(MarkerId::Siz as u16)?;
  let len = 38 + 3 * siz.components.len() as u32;
  stream.write_u16(len as u16)?;
  stream.write_u16(siz.rsiz)?;
  stream.write_u32(siz.width)?;
  stream.write_u32(siz.height)?;
  stream.write_u32(siz.x0)?;
  stream.write_u32(siz.y0)?;
  stream.write_u32(siz.tile_width)?;
  stream.write_u32(siz.tile_height)?;
  stream.write_u32(siz.tile_x0)?;
  stream.write_u32(siz.tile_y0)?;
  stream.write_u16(siz.components.len() as u16)?;
  for c in &siz.components {
    let ssiz = ((c.precision - 1) & 0x7f) | if c.signed { 0x80 } else { 0 };
    stream.write_u8(ssiz)?;
    stream.write_u8(c.dx)?;
    stream.write_u8(c.dy)?;
  }
  Ok(())
}

/// Reads one SPcod/SPcoc segment (resolutions, code-block geometry and
/// style, wavelet filter, precinct sizes) into `tccp`, per spec.md §4.2.2.
fn read_spcod_spcoc(
  stream: &mut dyn Stream,
  tccp: &mut crate::coding_params::TileComponentCodingParams,
  has_explicit_precincts: bool,
) -> Result<()> {
  let num_decomps = stream.read_u8()?;
  tccp.num_resolutions = num_decomps as u32 + 1;
  if tccp.num_resolutions < crate::consts::MIN_RESOLUTIONS as u32
    || tccp.num_resolutions > crate::consts::MAX_RESOLUTIONS as u32
  {
    return Err(Error::corrupt(stream.tell(), "invalid number of resolutions"));
  }
  tccp.cblk_w_exp = stream.read_u8()? + 2;
  tccp.cblk_h_exp = stream.read_u8()? + 2;
  tccp.cblk_style = stream.read_u8()?;
  let wavelet_id = stream.read_u8()?;
  tccp.wavelet = match wavelet_id {
    0 => crate::consts::WaveletKind::Reversible5x3,
    1 => crate::consts::WaveletKind::Irreversible9x7,
    _ => return Err(Error::corrupt(stream.tell(), "unknown wavelet filter id")),
  };
  tccp.precinct_exponents = if has_explicit_precincts {
    let mut v = Vec::with_capacity(tccp.num_resolutions as usize);
    for _ in 0..tccp.num_resolutions {
      let b = stream.read_u8()?;
      v.push((b & 0x0f, (b >> 4) & 0x0f));
    }
    v
  } else {
    vec![(15, 15); tccp.num_resolutions as usize]
  };
  tccp.validate()
}

fn write_spcod_spcoc(
  stream: &mut dyn Stream,
  tccp: &crate::coding_params::TileComponentCodingParams,
  explicit_precincts: bool,
) -> Result<()> {
  stream.write_u8((tccp.num_resolutions - 1) as u8)?;
  stream.write_u8(tccp.cblk_w_exp - 2)?;
  stream.write_u8(tccp.cblk_h_exp - 2)?;
  stream.write_u8(tccp.cblk_style)?;
  stream.write_u8(match tccp.wavelet {
    crate::consts::WaveletKind::Reversible5x3 => 0,
    crate::consts::WaveletKind::Irreversible9x7 => 1,
  })?;
  if explicit_precincts {
    for &(pw, ph) in &tccp.precinct_exponents {
      stream.write_u8((pw & 0x0f) | ((ph & 0x0f) << 4))?;
    }
  }
  Ok(())
}

/// Reads the COD marker body into every component of `tcp`, per spec.md
/// §4.2.2 / §4.2.1's COD row.
pub fn read_cod(stream: &mut dyn Stream, tcp: &mut TileCodingParams, is_tile_header: bool) -> Result<()> {
  let scod = stream.read_u8()?;
  if scod & !0x7 != 0 {
    return Err(Error::corrupt(stream.tell(), "unknown Scod bits in COD marker"));
  }
  let has_explicit_precincts = scod & 0x1 != 0;
  let sop_marker = scod & 0x2 != 0;
  let eph_marker = scod & 0x4 != 0;

  let sgcod_prog = stream.read_u8()?;
  let progression = ProgressionOrder::try_from(sgcod_prog)
    .map_err(|_| Error::corrupt(stream.tell(), "unknown progression order in COD marker"))?;
  let num_layers = stream.read_u16()?;
  if num_layers == 0 {
    return Err(Error::corrupt(stream.tell(), "COD: number of layers must be >= 1"));
  }
  let mct = stream.read_u8()?;
  if mct > 1 {
    return Err(Error::corrupt(stream.tell(), "invalid multiple component transformation"));
  }

  tcp.progression = progression;
  tcp.num_layers = num_layers as u32;
  tcp.mct_mode = if mct == 1 {
    crate::consts::MctMode::Fixed
  } else {
    crate::consts::MctMode::Off
  };
  tcp.use_sop = sop_marker;
  tcp.use_eph = eph_marker;

  let mut template = crate::coding_params::TileComponentCodingParams::default();
  read_spcod_spcoc(stream, &mut template, has_explicit_precincts)?;

  for tccp in tcp.components.iter_mut() {
    if tccp.cod_source.may_override(false, is_tile_header) {
      *tccp = template.clone();
      tccp.cod_source = if is_tile_header {
        OverrideSource::from_tile_header()
      } else {
        OverrideSource::default()
      };
    }
  }
  Ok(())
}

pub fn write_cod(stream: &mut dyn Stream, tcp: &TileCodingParams) -> Result<()> {
  stream.write_u16(MarkerId::Cod as u16)?;
  let template = &tcp.components[0];
  let explicit_precincts = template.precinct_exponents.iter().any(|&(w, h)| w != 15 || h != 15);
  let len = 12 + if explicit_precincts { template.num_resolutions } else { 0 };
  stream.write_u16(len as u16)?;
  let scod = (explicit_precincts as u8) | ((tcp.use_sop as u8) << 1) | ((tcp.use_eph as u8) << 2);
  stream.write_u8(scod)?;
  stream.write_u8(tcp.progression as u8)?;
  stream.write_u16(tcp.num_layers as u16)?;
  stream.write_u8(if tcp.mct_mode == crate::consts::MctMode::Off { 0 } else { 1 })?;
  write_spcod_spcoc(stream, template, explicit_precincts)
}

/// Reads the COC marker body: component-scoped override of coding style,
/// spec.md §4.2.2.
pub fn read_coc(stream: &mut dyn Stream, tcp: &mut TileCodingParams, num_components: u32, is_tile_header: bool) -> Result<()> {
  let compno = read_component_index(stream, num_components)?;
  let scoc = stream.read_u8()?;
  let has_explicit_precincts = scoc & 0x1 != 0;
  let mut tccp = tcp.components[compno as usize].clone();
  read_spcod_spcoc(stream, &mut tccp, has_explicit_precincts)?;
  if tcp.components[compno as usize]
    .coc_source
    .may_override(true, is_tile_header)
  {
    tccp.coc_source = if is_tile_header {
      OverrideSource::from_tile_header()
    } else {
      OverrideSource::from_component_marker()
    };
    tcp.components[compno as usize] = tccp;
  }
  Ok(())
}

/// Writes a COC marker overriding one component's coding style, grounded on
/// the teacher's `opj_j2k_write_coc`/`opj_j2k_write_coc_in_memory`: same
/// `Ccoc`/`Scoc`/`SPcoc` layout as `write_cod`'s body, scoped to one
/// component index instead of the whole tile.
pub fn write_coc(stream: &mut dyn Stream, compno: u32, tccp: &crate::coding_params::TileComponentCodingParams, num_components: u32) -> Result<()> {
  stream.write_u16(MarkerId::Coc as u16)?;
  let comp_room = if num_components <= 256 { 1u32 } else { 2 };
  let explicit_precincts = tccp.precinct_exponents.iter().any(|&(w, h)| w != 15 || h != 15);
  let len = 8 + comp_room + if explicit_precincts { tccp.num_resolutions } else { 0 };
  stream.write_u16(len as u16)?;
  write_component_index(stream, compno, num_components)?;
  stream.write_u8(explicit_precincts as u8)?;
  write_spcod_spcoc(stream, tccp, explicit_precincts)
}

fn read_component_index(stream: &mut dyn Stream, num_components: u32) -> Result<u32> {
  let compno = if num_components <= 256 {
    stream.read_u8()? as u32
  } else {
    stream.read_u16()? as u32
  };
  if compno >= num_components {
    return Err(Error::corrupt(stream.tell(), "component index out of range"));
  }
  Ok(compno)
}

/// Reads one SQcd/SQcc segment into `tccp`, grounded on the teacher's
/// `opj_j2k_read_SQcd_SQcc` byte layout and the `qntsty==SiQnt` derived-
/// stepsize rule.
fn read_sqcd_sqcc(stream: &mut dyn Stream, tccp: &mut crate::coding_params::TileComponentCodingParams, remaining: u32) -> Result<()> {
  let sqcx = stream.read_u8()?;
  tccp.quant_style = match sqcx & 0x1f {
    0 => QuantStyle::NoQnt,
    1 => QuantStyle::SiQnt,
    2 => QuantStyle::SeQnt,
    _ => return Err(Error::corrupt(stream.tell(), "unknown quantisation style")),
  };
  tccp.guard_bits = sqcx >> 5;
  let left = remaining - 1;
  let num_bands = match tccp.quant_style {
    QuantStyle::SiQnt => 1,
    QuantStyle::NoQnt => left,
    QuantStyle::SeQnt => left / 2,
  }
  .min(MAX_BANDS as u32);

  tccp.stepsizes = Vec::with_capacity(MAX_BANDS);
  for _ in 0..num_bands {
    if tccp.quant_style == QuantStyle::NoQnt {
      let v = stream.read_u8()? as u32;
      tccp.stepsizes.push(StepSize {
        expn: (v >> 3) as u8,
        mant: 0,
      });
    } else {
      let v = stream.read_u16()? as u32;
      tccp.stepsizes.push(StepSize {
        expn: (v >> 11) as u8,
        mant: (v & 0x7ff) as u16,
      });
    }
  }
  if tccp.quant_style == QuantStyle::SiQnt {
    let base = tccp.stepsizes[0];
    for band_no in 1..MAX_BANDS as u32 {
      let drop = (band_no - 1) / 3;
      let expn = base.expn.saturating_sub(drop as u8);
      tccp.stepsizes.push(StepSize { expn, mant: base.mant });
    }
  }
  Ok(())
}

fn write_sqcd_sqcc(stream: &mut dyn Stream, tccp: &crate::coding_params::TileComponentCodingParams) -> Result<()> {
  let sqcx = (tccp.quant_style as u8) | (tccp.guard_bits << 5);
  stream.write_u8(sqcx)?;
  let num_bands = match tccp.quant_style {
    QuantStyle::SiQnt => 1,
    _ => tccp.stepsizes.len(),
  };
  for ss in tccp.stepsizes.iter().take(num_bands) {
    if tccp.quant_style == QuantStyle::NoQnt {
      stream.write_u8((ss.expn << 3) & 0xf8)?;
    } else {
      stream.write_u16(((ss.expn as u16) << 11) | (ss.mant & 0x7ff))?;
    }
  }
  Ok(())
}

pub fn read_qcd(stream: &mut dyn Stream, tcp: &mut TileCodingParams, remaining: u32, is_tile_header: bool) -> Result<()> {
  let mut template = tcp.components[0].clone();
  read_sqcd_sqcc(stream, &mut template, remaining)?;
  for tccp in tcp.components.iter_mut() {
    if tccp.qcd_source.may_override(false, is_tile_header) {
      tccp.quant_style = template.quant_style;
      tccp.guard_bits = template.guard_bits;
      tccp.stepsizes = template.stepsizes.clone();
      tccp.qcd_source = if is_tile_header {
        OverrideSource::from_tile_header()
      } else {
        OverrideSource::default()
      };
    }
  }
  Ok(())
}

pub fn write_qcd(stream: &mut dyn Stream, tcp: &TileCodingParams) -> Result<()> {
  stream.write_u16(MarkerId::Qcd as u16)?;
  let template = &tcp.components[0];
  let num_bands = match template.quant_style {
    QuantStyle::SiQnt => 1,
    _ => template.stepsizes.len(),
  };
  let band_bytes = if template.quant_style == QuantStyle::NoQnt { 1 } else { 2 };
  stream.write_u16((3 + num_bands * band_bytes) as u16)?;
  write_sqcd_sqcc(stream, template)
}

pub fn read_qcc(stream: &mut dyn Stream, tcp: &mut TileCodingParams, num_components: u32, remaining: u32, is_tile_header: bool) -> Result<()> {
  let compno = read_component_index(stream, num_components)?;
  let consumed = if num_components <= 256 { 1 } else { 2 };
  let mut tccp = tcp.components[compno as usize].clone();
  read_sqcd_sqcc(stream, &mut tccp, remaining - consumed)?;
  if tcp.components[compno as usize]
    .qcd_source
    .may_override(true, is_tile_header)
  {
    tccp.qcd_source = if is_tile_header {
      OverrideSource::from_tile_header()
    } else {
      OverrideSource::from_component_marker()
    };
    tcp.components[compno as usize] = tccp;
  }
  Ok(())
}

/// Writes a QCC marker overriding one component's quantisation, grounded on
/// the teacher's `opj_j2k_write_qcc`/`opj_j2k_write_qcc_in_memory`: same
/// `Cqcc`/`Sqcc`/band-step-size layout as `write_qcd`'s body, scoped to one
/// component index instead of the whole tile.
pub fn write_qcc(stream: &mut dyn Stream, compno: u32, tccp: &crate::coding_params::TileComponentCodingParams, num_components: u32) -> Result<()> {
  stream.write_u16(MarkerId::Qcc as u16)?;
  let comp_room = if num_components <= 256 { 1u32 } else { 2 };
  let num_bands = match tccp.quant_style {
    QuantStyle::SiQnt => 1,
    _ => tccp.stepsizes.len(),
  };
  let band_bytes = if tccp.quant_style == QuantStyle::NoQnt { 1 } else { 2 };
  let len = 3 + comp_room + (num_bands * band_bytes) as u32;
  stream.write_u16(len as u16)?;
  write_component_index(stream, compno, num_components)?;
  write_sqcd_sqcc(stream, tccp)
}

/// Reads the POC marker body, producing one `PocRecord` per progression
/// change, spec.md §4.2.2.
pub fn read_poc(stream: &mut dyn Stream, num_components: u32, remaining: u32) -> Result<Vec<PocRecord>> {
  let comp_room = if num_components <= 256 { 1u32 } else { 2 };
  let entry_size = 5 + 2 * comp_room;
  if entry_size == 0 || remaining % entry_size != 0 {
    return Err(Error::corrupt(stream.tell(), "POC marker length is not a multiple of the entry size"));
  }
  let num_entries = remaining / entry_size;
  let mut records = Vec::with_capacity(num_entries as usize);
  for _ in 0..num_entries {
    let res_start = stream.read_u8()? as u32;
    let comp_start = read_component_index(stream, num_components)?;
    let layer_end = stream.read_u16()? as u32;
    let res_end = stream.read_u8()? as u32;
    let comp_end = read_component_index(stream, num_components)?.max(comp_start + 1);
    let prog_byte = stream.read_u8()?;
    let progression = ProgressionOrder::try_from(prog_byte)
      .map_err(|_| Error::corrupt(stream.tell(), "unknown progression order in POC marker"))?;
    records.push(PocRecord {
      res_start,
      comp_start,
      layer_end,
      res_end,
      comp_end,
      progression,
    });
  }
  Ok(records)
}

pub fn write_poc(stream: &mut dyn Stream, poc: &[PocRecord], num_components: u32) -> Result<()> {
  let comp_room = if num_components <= 256 { 1u32 } else { 2 };
  stream.write_u16(MarkerId::Poc as u16)?;
  let entry_size = 5 + 2 * comp_room;
  stream.write_u16((2 + entry_size * poc.len() as u32) as u16)?;
  for p in poc {
    stream.write_u8(p.res_start as u8)?;
    write_component_index(stream, p.comp_start, num_components)?;
    stream.write_u16(p.layer_end as u16)?;
    stream.write_u8(p.res_end as u8)?;
    write_component_index(stream, p.comp_end, num_components)?;
    stream.write_u8(p.progression as u8)?;
  }
  Ok(())
}

fn write_component_index(stream: &mut dyn Stream, compno: u32, num_components: u32) -> Result<()> {
  if num_components <= 256 {
    stream.write_u8(compno as u8)
  } else {
    stream.write_u16(compno as u16)
  }
}

/// Reads the RGN (region of interest) marker body: applies an ROI shift
/// to one component's quantisation, spec.md §4.2.2.
pub fn read_rgn(stream: &mut dyn Stream, tcp: &mut TileCodingParams, num_components: u32) -> Result<()> {
  let compno = read_component_index(stream, num_components)?;
  let style = stream.read_u8()?;
  if style != 0 {
    return Err(Error::unsupported("only implicit (style 0) RGN is supported"));
  }
  let shift = stream.read_u8()?;
  if shift > 37 {
    return Err(Error::corrupt(stream.tell(), "RGN shift out of range"));
  }
  tcp.components[compno as usize].roi_shift = shift;
  Ok(())
}

pub fn write_rgn(stream: &mut dyn Stream, compno: u32, shift: u8, num_components: u32) -> Result<()> {
  stream.write_u16(MarkerId::Rgn as u16)?;
  let comp_room = if num_components <= 256 { 1u16 } else { 2 };
  stream.write_u16(4 + comp_room)?;
  write_component_index(stream, compno, num_components)?;
  stream.write_u8(0)?;
  stream.write_u8(shift)
}

/// Writes the COM (comment) marker body: a 2-byte `Rcom` registration value
/// (1 = Latin values per Annex A.9.1) followed by the raw comment bytes.
/// Grounded on the teacher's `opj_j2k_write_com`, which sizes `Lcom` as
/// `strlen(comment) + 6` and always uses the Latin-values registration.
pub fn write_com(stream: &mut dyn Stream, comment: &[u8]) -> Result<()> {
  stream.write_u16(MarkerId::Com as u16)?;
  stream.write_u16((4 + comment.len()) as u16)?;
  stream.write_u16(1)?;
  stream.write_all_or_err(comment)
}

/// Reads a COM marker body, returning its raw comment bytes (the 2-byte
/// `Rcom` registration field is consumed but not interpreted, matching the
/// teacher's `opj_j2k_read_com`, which logs but does not reject unknown
/// registration values).
pub fn read_com(stream: &mut dyn Stream, remaining: u32) -> Result<Vec<u8>> {
  if remaining < 2 {
    return Err(Error::corrupt(stream.tell(), "COM marker too short for Rcom field"));
  }
  let _rcom = stream.read_u16()?;
  let mut body = vec![0u8; (remaining - 2) as usize];
  stream.read_exact_or_err(&mut body)?;
  Ok(body)
}

/// Reads the SOT marker body, spec.md §4.2.1.
pub fn read_sot(stream: &mut dyn Stream) -> Result<SotParams> {
  let tile_index = stream.read_u16()?;
  let tile_part_length = stream.read_u32()?;
  let tile_part_index = stream.read_u8()?;
  let num_tile_parts = stream.read_u8()?;
  if num_tile_parts != 0 && tile_part_index >= num_tile_parts {
    return Err(Error::corrupt(stream.tell(), "SOT tile-part index exceeds declared count"));
  }
  Ok(SotParams {
    tile_index,
    tile_part_length,
    tile_part_index,
    num_tile_parts,
  })
}

pub fn write_sot(stream: &mut dyn Stream, sot: &SotParams) -> Result<()> {
  stream.write_u16(MarkerId::Sot as u16)?;
  stream.write_u16(10)?;
  stream.write_u16(sot.tile_index)?;
  stream.write_u32(sot.tile_part_length)?;
  stream.write_u8(sot.tile_part_index)?;
  stream.write_u8(sot.num_tile_parts)
}

/// Reads the CBD marker (component bit-depth list for a custom MCT,
/// spec.md's supplemented MCC/MCO/CBD group), returning one entry per
/// component as `(precision, signed)`.
pub fn read_cbd(stream: &mut dyn Stream, num_components: u32) -> Result<Vec<(u8, bool)>> {
  let declared = stream.read_u16()? as u32;
  if declared != num_components {
    return Err(Error::corrupt(stream.tell(), "CBD component count mismatch"));
  }
  let mut out = Vec::with_capacity(num_components as usize);
  for _ in 0..num_components {
    let v = stream.read_u8()?;
    out.push(((v & 0x7f) + 1, v & 0x80 != 0));
  }
  Ok(out)
}

/// Reads an MCC marker describing one custom multi-component transform,
/// simplified to the single-stage array-decorrelation case this crate
/// supports (spec.md's supplemented CBD/MCC/MCO group).
pub fn read_mcc(stream: &mut dyn Stream) -> Result<CustomMct> {
  let _zmcc = stream.read_u8()?;
  let _index = stream.read_u8()?;
  let num_components = stream.read_u16()? as u32;
  let mut matrix = vec![0i32; (num_components * num_components) as usize];
  for v in matrix.iter_mut() {
    *v = stream.read_u32()? as i32;
  }
  let mut offsets = vec![0i32; num_components as usize];
  for v in offsets.iter_mut() {
    *v = stream.read_u32()? as i32;
  }
  Ok(CustomMct {
    num_components,
    matrix,
    offsets,
  })
}
