//! CodeStream front-end: the validation-list/procedure-list orchestrator
//! that drives header and tile-part I/O, spec.md §4.8.
//!
//! Grounded on the teacher's `opj_j2k_start_compress`/`opj_j2k_end_compress`
//! (`j2k.rs`): both assemble a FIFO of nullary predicates — a validation
//! list run once up front, then a procedure list for header writing — and
//! abort the whole operation the moment one procedure returns false. The
//! teacher also patches `Lsot`/`Psot` in place after a tile-part is fully
//! written by seeking back over the just-written SOT segment (its
//! `opj_j2k_write_sot`/later `opj_stream_seek` pair); this module does the
//! same through this crate's `Stream::seek`.

use crate::coding_params::CodingParams;
use crate::coder::Tier1Coder;
use crate::consts::{MarkerId, MarkerState};
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::image::Image;
use crate::marker::{self, SizParams, SotParams};
use crate::pi::{PacketIter, Window};
use crate::stream::Stream;
use crate::tcd::TileProcessor;
use crate::tlm::{TlmEntry, TlmTable};

/// A FIFO of header-writing steps, each taking the running `CodeStream`
/// state and the output stream explicitly. `execute` stops and returns the
/// first error the instant one procedure fails, per spec.md §4.8. Grounded
/// directly on the teacher's `opj_j2k_start_compress` procedure list, whose
/// entries are themselves plain functions taking `(p_j2k, p_stream,
/// p_manager)` rather than closures over captured state — this crate's
/// `fn(&mut CodeStream, &mut dyn Stream) -> Result<()>` mirrors that shape
/// without needing interior mutability to hold several steps that each
/// want exclusive access to the same `CodeStream`.
#[derive(Default)]
pub struct ProcedureList {
  procedures: Vec<fn(&mut CodeStream, &mut dyn Stream) -> Result<()>>,
}

impl ProcedureList {
  pub fn new() -> Self {
    Self { procedures: Vec::new() }
  }

  pub fn push(&mut self, p: fn(&mut CodeStream, &mut dyn Stream) -> Result<()>) {
    self.procedures.push(p);
  }

  pub fn execute(&mut self, cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    for p in self.procedures.iter() {
      p(cs, stream)?;
    }
    Ok(())
  }
}

/// One tile's worth of fully-resolved state needed to drive a compress or
/// decompress pass.
pub struct TileContext {
  pub bounds: Rect,
  pub tcp_index: usize,
}

/// The code-stream orchestrator: image geometry, per-tile coding
/// parameters, and the running marker/TLM state, spec.md §4.8.
pub struct CodeStream {
  pub siz: SizParams,
  pub coding_params: CodingParams,
  pub image: Image,
  /// Free-text comment a caller wants emitted as a COM marker on compress,
  /// spec.md's supplemented COM support. `None` means no COM is written,
  /// matching the teacher's `if !p_j2k.m_cp.comment.is_null()` conditional
  /// procedure-list registration rather than always emitting one.
  pub comment: Option<String>,
  tlm: TlmTable,
  marker_state: MarkerState,
}

impl CodeStream {
  pub fn new(siz: SizParams, coding_params: CodingParams, image: Image) -> Self {
    Self {
      siz,
      coding_params,
      image,
      comment: None,
      tlm: TlmTable { index: 0, entries: Vec::new() },
      marker_state: MarkerState::empty(),
    }
  }

  fn tiles(&self) -> Vec<TileContext> {
    let (nx, ny) = self.coding_params.tile_grid_dims(self.image.bounds);
    let mut out = Vec::with_capacity((nx * ny) as usize);
    for v in 0..ny {
      for u in 0..nx {
        let idx = (v * nx + u) as usize;
        out.push(TileContext {
          bounds: self.coding_params.tile_bounds(u, v, self.image.bounds),
          tcp_index: idx.min(self.coding_params.tiles.len() - 1),
        });
      }
    }
    out
  }

  /// Runs the validation list then drives the main header through a
  /// `ProcedureList`: SOC, SIZ, COD, QCD (using tile 0's TCP as the
  /// image-wide default, per spec.md §4.8's "customization of the
  /// encoding" step), then per-component COC/QCC deltas for any component
  /// whose style diverges from component 0's, RGN for any component with
  /// a nonzero ROI shift, POC if tile 0 declares progression changes, and
  /// COM if a comment was configured. Each step also advances
  /// `self.marker_state`, so the same admissible-ordering check
  /// `start_decompress` applies on read is enforced here on write. TLM
  /// placement is deferred: a TLM instance only knows tile-part lengths
  /// after tiles are compressed, so this engine reserves nothing in the
  /// main header for it; `tlm_entries` exposes the accumulated lengths to
  /// a caller that wants to persist them out of band instead.
  pub fn start_compress(&mut self, stream: &mut dyn Stream) -> Result<()> {
    self.validate()?;
    self.marker_state = MarkerState::empty();

    let mut procedures = ProcedureList::new();
    procedures.push(Self::proc_write_soc);
    procedures.push(Self::proc_write_siz);
    procedures.push(Self::proc_write_cod);
    procedures.push(Self::proc_write_qcd);
    procedures.push(Self::proc_write_all_coc);
    procedures.push(Self::proc_write_all_qcc);
    procedures.push(Self::proc_write_regions);
    procedures.push(Self::proc_write_poc);
    procedures.push(Self::proc_write_com);
    procedures.execute(self, stream)
  }

  fn proc_write_soc(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Soc, stream.tell())?;
    stream.write_u16(MarkerId::Soc as u16)
  }

  fn proc_write_siz(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Siz, stream.tell())?;
    marker::write_siz(stream, &cs.siz)
  }

  fn proc_write_cod(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Cod, stream.tell())?;
    marker::write_cod(stream, &cs.coding_params.tiles[0])
  }

  fn proc_write_qcd(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Qcd, stream.tell())?;
    marker::write_qcd(stream, &cs.coding_params.tiles[0])
  }

  /// Writes a COC for every component after the first whose coding style
  /// diverges from component 0's (the COD default), grounded on the
  /// teacher's `opj_j2k_write_all_coc`/`opj_j2k_compare_coc` pair, which
  /// walks components 1.. and compares each against component 0.
  fn proc_write_all_coc(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    let num_components = cs.siz.components.len() as u32;
    let default_tccp = cs.coding_params.tiles[0].components[0].clone();
    for compno in 1..cs.coding_params.tiles[0].components.len() {
      let tccp = cs.coding_params.tiles[0].components[compno].clone();
      if coc_differs(&tccp, &default_tccp) {
        cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Coc, stream.tell())?;
        marker::write_coc(stream, compno as u32, &tccp, num_components)?;
      }
    }
    Ok(())
  }

  /// Mirrors `proc_write_all_coc` for quantisation, grounded on the
  /// teacher's `opj_j2k_write_all_qcc`/`opj_j2k_compare_qcc`.
  fn proc_write_all_qcc(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    let num_components = cs.siz.components.len() as u32;
    let default_tccp = cs.coding_params.tiles[0].components[0].clone();
    for compno in 1..cs.coding_params.tiles[0].components.len() {
      let tccp = cs.coding_params.tiles[0].components[compno].clone();
      if qcc_differs(&tccp, &default_tccp) {
        cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Qcc, stream.tell())?;
        marker::write_qcc(stream, compno as u32, &tccp, num_components)?;
      }
    }
    Ok(())
  }

  /// Writes an RGN for every component with a nonzero ROI shift, grounded
  /// on the teacher's `opj_j2k_write_regions`, whose sole emission
  /// condition is `tccp.roishift != 0`.
  fn proc_write_regions(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    let num_components = cs.siz.components.len() as u32;
    for compno in 0..cs.coding_params.tiles[0].components.len() {
      let shift = cs.coding_params.tiles[0].components[compno].roi_shift;
      if shift != 0 {
        cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Rgn, stream.tell())?;
        marker::write_rgn(stream, compno as u32, shift, num_components)?;
      }
    }
    Ok(())
  }

  fn proc_write_poc(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    let poc = cs.coding_params.tiles[0].poc.clone();
    if !poc.is_empty() {
      cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Poc, stream.tell())?;
      marker::write_poc(stream, &poc, cs.siz.components.len() as u32)?;
    }
    Ok(())
  }

  /// Writes a COM marker only when `self.comment` is set, matching the
  /// teacher's conditional `if !p_j2k.m_cp.comment.is_null()` procedure-
  /// list registration rather than always emitting a generator comment.
  fn proc_write_com(cs: &mut CodeStream, stream: &mut dyn Stream) -> Result<()> {
    if let Some(comment) = cs.comment.clone() {
      cs.marker_state = marker::next_state(cs.marker_state, MarkerId::Com, stream.tell())?;
      marker::write_com(stream, comment.as_bytes())?;
    }
    Ok(())
  }

  fn validate(&self) -> Result<()> {
    if self.siz.components.len() != self.image.num_components() {
      return Err(Error::invalid("SIZ component count does not match image"));
    }
    if self.coding_params.tiles.is_empty() {
      return Err(Error::invalid("at least one tile coding parameter set is required"));
    }
    for tcp in &self.coding_params.tiles {
      tcp.validate()?;
    }
    Ok(())
  }

  /// Compresses every tile in raster tile order, writing one SOT + packet
  /// stream per tile, patching `Psot` (the tile-part length field) once
  /// the tile's bytes are known — the teacher's seek-back pattern applied
  /// through `Stream::seek`.
  pub fn compress_tiles(&mut self, stream: &mut dyn Stream, coder: &dyn Tier1Coder, per_tile_samples: Vec<Vec<Vec<i32>>>) -> Result<()> {
    let tiles = self.tiles();
    if per_tile_samples.len() != tiles.len() {
      return Err(Error::invalid("one sample set is required per tile"));
    }

    let comp_subsampling: Vec<(u32, u32)> = self.image.components.iter().map(|c| (c.dx, c.dy)).collect();
    let precisions: Vec<(u8, bool)> = self
      .image
      .components
      .iter()
      .map(|c| (c.prec as u8, c.signed))
      .collect();

    for (tile_index, (ctx, samples)) in tiles.iter().zip(per_tile_samples.into_iter()).enumerate() {
      let tcp = self.coding_params.tiles[ctx.tcp_index].clone();
      let sot_offset = stream.tell();
      self.marker_state = marker::next_state(self.marker_state, MarkerId::Sot, sot_offset)?;
      stream.write_u16(MarkerId::Sot as u16)?;
      let sot = SotParams {
        tile_index: tile_index as u16,
        tile_part_length: 0, // patched below once known
        tile_part_index: 0,
        num_tile_parts: 1,
      };
      marker::write_sot(stream, &sot)?;

      self.marker_state = marker::next_state(self.marker_state, MarkerId::Sod, stream.tell())?;
      stream.write_u16(MarkerId::Sod as u16)?;

      let mut proc = TileProcessor::init(ctx.bounds, &comp_subsampling, &tcp.components)?;
      proc.pre_compress(samples)?;
      proc.compress(&tcp, &precisions, coder, u32::MAX)?;

      let window = Window::full(&proc.tile);
      let mut iter = PacketIter::new(&proc.tile, &tcp.poc, tcp.progression, tcp.num_layers, window);
      let body_start = stream.tell();
      proc.write_tile_parts(stream, &mut iter)?;
      let body_end = stream.tell();

      let tile_part_length = (body_end - sot_offset) as u32;
      self.tlm.entries.push(TlmEntry {
        tile_index: Some(tile_index as u32),
        tile_part_length,
      });

      // Patch Lsot's Psot field: marker(2) + Lsot(2) + Isot(2) = 6 bytes in.
      stream.seek(sot_offset + 6)?;
      stream.write_u32(tile_part_length)?;
      stream.seek(body_end)?;
      let _ = body_start; // kept for clarity/debuggability, not otherwise used
    }
    Ok(())
  }

  /// Writes the EOC marker, rejecting the call if no tile was compressed
  /// (spec.md §4.2's EOC-only-after-tile-data rule, enforced through
  /// `self.marker_state`). The accumulated TLM table is available via
  /// `tlm_entries` for a caller that wants to persist per-tile-part
  /// lengths out of band (e.g. a JPIP index); this engine does not rewind
  /// to splice a TLM marker into the already-written main header.
  pub fn end_compress(&mut self, stream: &mut dyn Stream) -> Result<()> {
    self.marker_state = marker::next_state(self.marker_state, MarkerId::Eoc, stream.tell())?;
    stream.write_u16(MarkerId::Eoc as u16)?;
    Ok(())
  }

  pub fn tlm_entries(&self) -> &[TlmEntry] {
    &self.tlm.entries
  }

  /// Parses the main header (SOC through the marker immediately before the
  /// first SOT), populating `self.siz`/`self.coding_params`/`self.image`
  /// from the stream rather than from a caller-supplied value, mirroring
  /// the teacher's `opj_j2k_read_header`. The marker loop follows the same
  /// "read marker id, read Lxx length, dispatch on marker id" shape as the
  /// teacher's `j2k.rs` main-header switch; COD/QCD are read into a single
  /// shared `TileCodingParams` (this engine does not yet model per-tile
  /// COD/QCD overrides read from a tile-part header, only from the main
  /// header, matching `coding_params.rs`'s current `tiles: Vec<..>` being
  /// populated once here from that single template).
  pub fn start_decompress(stream: &mut dyn Stream) -> Result<Self> {
    let mut state = MarkerState::empty();

    let soc = stream.read_u16()?;
    let soc_id = MarkerId::try_from(soc).map_err(|_| Error::corrupt(stream.tell(), "expected SOC at start of code-stream"))?;
    state = marker::next_state(state, soc_id, stream.tell())?;

    let siz_marker = stream.read_u16()?;
    let siz_id = MarkerId::try_from(siz_marker).map_err(|_| Error::corrupt(stream.tell(), "expected SIZ immediately after SOC"))?;
    state = marker::next_state(state, siz_id, stream.tell())?;
    let _siz_len = stream.read_u16()?;
    let siz = marker::read_siz(stream)?;

    let num_components = siz.components.len() as u32;
    let mut tcp = crate::coding_params::TileCodingParams::new(siz.components.len(), 1);
    let mut comment: Option<String> = None;

    loop {
      let marker_id = stream.read_u16()?;
      if marker_id == MarkerId::Sot as u16 {
        stream.seek(stream.tell() - 2)?;
        break;
      }
      let len = stream.read_u16()?;
      let remaining = len as u32 - 2;
      let id = MarkerId::try_from(marker_id).map_err(|_| Error::corrupt(stream.tell(), "unknown marker in main header"))?;
      state = marker::next_state(state, id, stream.tell())?;
      match id {
        MarkerId::Cod => {
          marker::read_cod(stream, &mut tcp, false)?;
          tcp.rates.resize(tcp.num_layers as usize, 0.0);
          tcp.distortion_ratios.resize(tcp.num_layers as usize, 0.0);
        }
        MarkerId::Qcd => marker::read_qcd(stream, &mut tcp, remaining, false)?,
        MarkerId::Coc => marker::read_coc(stream, &mut tcp, num_components, false)?,
        MarkerId::Qcc => marker::read_qcc(stream, &mut tcp, num_components, remaining, false)?,
        MarkerId::Rgn => marker::read_rgn(stream, &mut tcp, num_components)?,
        MarkerId::Poc => {
          tcp.poc = marker::read_poc(stream, num_components, remaining)?;
        }
        MarkerId::Com => {
          let body = marker::read_com(stream, remaining)?;
          if body.is_empty() {
            log::warn!("COM marker carries an empty comment");
          }
          comment = Some(String::from_utf8_lossy(&body).into_owned());
        }
        _ => {
          log::warn!("skipping unrecognised main-header marker {marker_id:#06x}");
          stream.seek(stream.tell() + remaining as u64)?;
        }
      }
    }

    let image_bounds = Rect::new(siz.x0, siz.y0, siz.width, siz.height);
    let components = siz
      .components
      .iter()
      .map(|c| {
        let (w, h) = crate::geometry::subsampled_dims(image_bounds, c.dx as u32, c.dy as u32);
        crate::image::Component::new(c.dx as u32, c.dy as u32, w, h, c.precision as u32, c.signed)
      })
      .collect();
    let image = Image::new(image_bounds, components)?;

    let coding_params = CodingParams {
      tile_origin_x: siz.tile_x0,
      tile_origin_y: siz.tile_y0,
      tile_width: siz.tile_width,
      tile_height: siz.tile_height,
      tiles: vec![tcp],
    };

    let mut cs = CodeStream::new(siz, coding_params, image);
    cs.comment = comment;
    cs.marker_state = state;
    cs.validate()?;
    Ok(cs)
  }

  /// Reads every tile's SOT + packet stream and decompresses it, writing
  /// each tile's decoded component samples into `self.image` at that
  /// tile's rectangle. Mirrors the teacher's `opj_j2k_decode`, driven over
  /// `TileProcessor::parse_tile_parts`/`decompress` instead of the
  /// teacher's in-place `opj_tcd_t`.
  ///
  /// A corrupted or truncated SOT (bad marker framing, a `Psot` pointing
  /// past the remaining bytes, or a tile-part body that fails to parse)
  /// surfaces as `Error::TruncatedTile` naming the offending tile index;
  /// every tile decoded before that point has already been written into
  /// `self.image`, so a caller can still use the partial result.
  pub fn decompress_tiles(&mut self, stream: &mut dyn Stream, coder: &dyn Tier1Coder, target_layer: u32) -> Result<()> {
    let tiles = self.tiles();
    let comp_subsampling: Vec<(u32, u32)> = self.image.components.iter().map(|c| (c.dx, c.dy)).collect();
    let precisions: Vec<(u8, bool)> = self
      .image
      .components
      .iter()
      .map(|c| (c.prec as u8, c.signed))
      .collect();

    for (tile_index, ctx) in tiles.iter().enumerate() {
      let tcp = self.coding_params.tiles[ctx.tcp_index].clone();
      let sot_offset = stream.tell();
      let sot_marker = stream.read_u16()?;
      if sot_marker != MarkerId::Sot as u16 {
        return Err(Error::TruncatedTile {
          tile_index: tile_index as u32,
          detail: "expected SOT at tile-part start".into(),
        });
      }
      self.marker_state = marker::next_state(self.marker_state, MarkerId::Sot, sot_offset).map_err(|e| Error::TruncatedTile {
        tile_index: tile_index as u32,
        detail: format!("{e}"),
      })?;
      let _lsot = stream.read_u16()?;
      let sot = marker::read_sot(stream)?;
      let tile_part_end = sot_offset + sot.tile_part_length as u64;
      if sot.tile_part_length < 12 || tile_part_end > stream.tell() + stream.bytes_remaining() {
        return Err(Error::TruncatedTile {
          tile_index: tile_index as u32,
          detail: format!("Psot {} runs past the available stream bytes", sot.tile_part_length),
        });
      }

      let sod_marker = stream.read_u16()?;
      if sod_marker != MarkerId::Sod as u16 {
        return Err(Error::TruncatedTile {
          tile_index: tile_index as u32,
          detail: "expected SOD after SOT".into(),
        });
      }
      self.marker_state = marker::next_state(self.marker_state, MarkerId::Sod, stream.tell()).map_err(|e| Error::TruncatedTile {
        tile_index: tile_index as u32,
        detail: format!("{e}"),
      })?;

      let mut proc = TileProcessor::init(ctx.bounds, &comp_subsampling, &tcp.components)?;
      let window = Window::full(&proc.tile);
      let mut iter = PacketIter::new(&proc.tile, &tcp.poc, tcp.progression, tcp.num_layers, window);
      proc.parse_tile_parts(stream, &mut iter).map_err(|e| Error::TruncatedTile {
        tile_index: tile_index as u32,
        detail: format!("tile-part parse failed: {e}"),
      })?;
      proc.decompress(&tcp, &precisions, coder, target_layer)?;

      for (compno, buf) in proc.buffers.iter().enumerate() {
        let (dx, dy) = comp_subsampling[compno];
        write_tile_buffer_into_component(&mut self.image.components[compno], self.image.bounds, ctx.bounds, dx, dy, buf);
      }
      stream.seek(tile_part_end)?;
    }

    if stream.bytes_remaining() == 0 {
      log::warn!("code-stream ends without an EOC marker");
      self.marker_state = MarkerState::NO_EOC;
    } else {
      let eoc_offset = stream.tell();
      let eoc_marker = stream.read_u16()?;
      let eoc_id = MarkerId::try_from(eoc_marker).map_err(|_| Error::corrupt(eoc_offset, "expected EOC after the last tile"))?;
      self.marker_state = marker::next_state(self.marker_state, eoc_id, eoc_offset)?;
    }
    Ok(())
  }
}

/// Whether a component's coding style diverges from the tile-wide default
/// enough to need its own COC marker, grounded on the teacher's
/// `opj_j2k_compare_coc`/`opj_j2k_compare_SPCod_SPCoc`.
fn coc_differs(a: &crate::coding_params::TileComponentCodingParams, b: &crate::coding_params::TileComponentCodingParams) -> bool {
  a.num_resolutions != b.num_resolutions
    || a.cblk_w_exp != b.cblk_w_exp
    || a.cblk_h_exp != b.cblk_h_exp
    || a.cblk_style != b.cblk_style
    || a.wavelet != b.wavelet
    || a.precinct_exponents != b.precinct_exponents
}

/// Mirrors `coc_differs` for quantisation, grounded on the teacher's
/// `opj_j2k_compare_qcc`/`opj_j2k_compare_SQcd_SQcc`.
fn qcc_differs(a: &crate::coding_params::TileComponentCodingParams, b: &crate::coding_params::TileComponentCodingParams) -> bool {
  a.quant_style != b.quant_style || a.guard_bits != b.guard_bits || a.stepsizes != b.stepsizes
}

/// Copies one tile's decoded component buffer into that component's slot
/// within the full image canvas, converting both the tile rectangle and
/// the image's own origin into that component's subsampled coordinate
/// space via the same `ceil_div(.., dx/dy)` rule `Tile::build` uses for a
/// tile's component-space bounds (`tile.rs`).
fn write_tile_buffer_into_component(comp: &mut crate::image::Component, image_bounds: Rect, tile_bounds: Rect, dx: u32, dy: u32, tile_buf: &[i32]) {
  let comp_origin_x = crate::geometry::ceil_div(image_bounds.x0, dx);
  let comp_origin_y = crate::geometry::ceil_div(image_bounds.y0, dy);
  let tx0 = crate::geometry::ceil_div(tile_bounds.x0, dx);
  let ty0 = crate::geometry::ceil_div(tile_bounds.y0, dy);
  let tx1 = crate::geometry::ceil_div(tile_bounds.x1, dx);
  let ty1 = crate::geometry::ceil_div(tile_bounds.y1, dy);
  let tw = (tx1 - tx0) as usize;
  let th = (ty1 - ty0) as usize;

  let comp_w = comp.w as usize;
  let data = comp.data_mut();
  for y in 0..th {
    let dst_y = (ty0 - comp_origin_y) as usize + y;
    let dst_x0 = (tx0 - comp_origin_x) as usize;
    let dst_start = dst_y * comp_w + dst_x0;
    let src_start = y * tw;
    data[dst_start..dst_start + tw].copy_from_slice(&tile_buf[src_start..src_start + tw]);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::coder::RawPassThroughCoder;
  use crate::coding_params::TileCodingParams;
  use crate::consts::ProgressionOrder;
  use crate::geometry::{subsampled_dims, Rect};
  use crate::image::{Component, Image};
  use crate::marker::SizComponent;
  use crate::stream::MemStream;

  fn single_tile_codestream() -> CodeStream {
    let bounds = Rect::new(0, 0, 8, 8);
    let (w, h) = subsampled_dims(bounds, 1, 1);
    let comp = Component::new(1, 1, w, h, 8, false);
    let image = Image::new(bounds, vec![comp]).unwrap();

    let siz = SizParams {
      rsiz: 0,
      width: 8,
      height: 8,
      x0: 0,
      y0: 0,
      tile_width: 8,
      tile_height: 8,
      tile_x0: 0,
      tile_y0: 0,
      components: vec![SizComponent {
        precision: 8,
        signed: false,
        dx: 1,
        dy: 1,
      }],
    };

    let mut tcp = TileCodingParams::new(1, 1);
    tcp.progression = ProgressionOrder::Lrcp;
    tcp.components[0].num_resolutions = 1;
    tcp.components[0].precinct_exponents = vec![(15, 15)];

    let coding_params = CodingParams {
      tile_origin_x: 0,
      tile_origin_y: 0,
      tile_width: 8,
      tile_height: 8,
      tiles: vec![tcp],
    };

    CodeStream::new(siz, coding_params, image)
  }

  #[test]
  fn writes_soc_siz_cod_qcd_then_one_tile_and_eoc() {
    let mut cs = single_tile_codestream();
    let mut stream = MemStream::new();
    cs.start_compress(&mut stream).unwrap();

    let coder = RawPassThroughCoder;
    let samples = vec![vec![vec![7i32; 64]]];
    cs.compress_tiles(&mut stream, &coder, samples).unwrap();
    cs.end_compress(&mut stream).unwrap();

    stream.seek(0).unwrap();
    assert_eq!(stream.read_u16().unwrap(), MarkerId::Soc as u16);
    assert_eq!(stream.read_u16().unwrap(), MarkerId::Siz as u16);
    assert_eq!(cs.tlm_entries().len(), 1);
    assert!(cs.tlm_entries()[0].tile_part_length > 0);
  }

  #[test]
  fn rejects_siz_component_count_mismatch() {
    let mut cs = single_tile_codestream();
    cs.siz.components.push(SizComponent {
      precision: 8,
      signed: false,
      dx: 1,
      dy: 1,
    });
    let mut stream = MemStream::new();
    assert!(cs.start_compress(&mut stream).is_err());
  }
}
