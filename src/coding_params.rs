//! Top-level and per-tile coding parameters, spec.md §3.
//!
//! Grounded on the TCP/TCCP field layout the teacher keeps in its
//! `opj_tcp_t`/`opj_tccp_t` structs (referenced throughout `tcd.rs` and
//! `j2k.rs`'s COD/COC/QCD/QCC parsers), generalized to owned `Vec`s instead
//! of fixed-size C arrays.

use crate::consts::{MctMode, ProgressionOrder, QuantStyle, MAX_CBLK_EXP_SUM, MAX_GUARD_BITS, MAX_RESOLUTIONS, MIN_RESOLUTIONS};
use crate::error::{Error, Result};

/// One entry of a QCD/QCC stepsize table: `(expn, mant)` per spec.md §4.2.1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSize {
  pub expn: u8,
  pub mant: u16,
}

/// Source of the most specific COD/COC or QCD/QCC override seen so far for
/// a component, spec.md §4.2's scoping rule: "a flag pair `(fromQCC,
/// fromTileHeader)` ... encodes the most specific source".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrideSource {
  pub from_component_marker: bool,
  pub from_tile_header: bool,
}

impl OverrideSource {
  /// Whether an incoming marker of the given specificity may overwrite the
  /// value this source currently protects.
  pub fn from_tile_header() -> Self {
    Self {
      from_component_marker: false,
      from_tile_header: true,
    }
  }

  pub fn from_component_marker() -> Self {
    Self {
      from_component_marker: true,
      from_tile_header: false,
    }
  }

  pub fn may_override(&self, incoming_is_component_marker: bool, incoming_is_tile_header: bool) -> bool {
    // A tile-header COC/QCC is the most specific; once set, nothing but
    // another tile-header COC/QCC may replace it. A main-header COC/QCC
    // may be replaced by a tile-header entry but not by a later main-header
    // COD/QCD (which only fills in components with no override yet).
    if self.from_tile_header && !incoming_is_tile_header {
      return false;
    }
    if self.from_component_marker && !incoming_is_component_marker && !incoming_is_tile_header {
      return false;
    }
    true
  }
}

/// Per-component tile coding parameters (TCCP), spec.md §3.
#[derive(Debug, Clone)]
pub struct TileComponentCodingParams {
  pub cblk_w_exp: u8,
  pub cblk_h_exp: u8,
  pub cblk_style: u8,
  pub wavelet: crate::consts::WaveletKind,
  pub num_resolutions: u32,
  /// Precinct exponents `(ppw_r, pph_r)` per resolution.
  pub precinct_exponents: Vec<(u8, u8)>,
  pub quant_style: QuantStyle,
  pub guard_bits: u8,
  pub stepsizes: Vec<StepSize>,
  pub roi_shift: u8,
  pub dc_level_shift: i32,
  pub qcd_source: OverrideSource,
  pub cod_source: OverrideSource,
  /// Tracks COC scoping the same way `qcd_source`/`cod_source` track
  /// QCD/COD: whether this component's coding style came from a COC
  /// (component-scoped) or tile-header marker.
  pub coc_source: OverrideSource,
}

impl Default for TileComponentCodingParams {
  fn default() -> Self {
    Self {
      cblk_w_exp: 6,
      cblk_h_exp: 6,
      cblk_style: 0,
      wavelet: crate::consts::WaveletKind::Reversible5x3,
      num_resolutions: 6,
      precinct_exponents: vec![(15, 15); 6],
      quant_style: QuantStyle::NoQnt,
      guard_bits: 2,
      stepsizes: Vec::new(),
      roi_shift: 0,
      dc_level_shift: 0,
      qcd_source: OverrideSource::default(),
      cod_source: OverrideSource::default(),
      coc_source: OverrideSource::default(),
    }
  }
}

impl TileComponentCodingParams {
  pub fn validate(&self) -> Result<()> {
    if !(MIN_RESOLUTIONS..=MAX_RESOLUTIONS).contains(&self.num_resolutions) {
      return Err(Error::invalid(format!(
        "numresolutions {} outside [{},{}]",
        self.num_resolutions, MIN_RESOLUTIONS, MAX_RESOLUTIONS
      )));
    }
    if self.precinct_exponents.len() != self.num_resolutions as usize {
      return Err(Error::invalid(
        "precinct exponent table length must equal numresolutions",
      ));
    }
    let cblk_w = 1u32 << self.cblk_w_exp;
    let cblk_h = 1u32 << self.cblk_h_exp;
    if !(crate::consts::MIN_CBLK_DIM..=crate::consts::MAX_CBLK_DIM).contains(&cblk_w)
      || !(crate::consts::MIN_CBLK_DIM..=crate::consts::MAX_CBLK_DIM).contains(&cblk_h)
    {
      return Err(Error::invalid(format!(
        "code-block dims {}x{} outside [{},{}]",
        cblk_w, cblk_h, crate::consts::MIN_CBLK_DIM, crate::consts::MAX_CBLK_DIM
      )));
    }
    if (self.cblk_w_exp as u32 - 2) + (self.cblk_h_exp as u32 - 2) > MAX_CBLK_EXP_SUM {
      return Err(Error::invalid("cblkw_exp-2 + cblkh_exp-2 exceeds 10"));
    }
    if self.guard_bits > MAX_GUARD_BITS {
      return Err(Error::invalid(format!(
        "guard bits {} exceeds {}",
        self.guard_bits, MAX_GUARD_BITS
      )));
    }
    let decomps = self.num_resolutions.saturating_sub(1);
    let expected_steps = match self.quant_style {
      QuantStyle::SiQnt => 1,
      _ => 3 * decomps + 1,
    };
    if !self.stepsizes.is_empty() && self.stepsizes.len() as u32 != expected_steps {
      return Err(Error::invalid(format!(
        "stepsize table has {} entries, expected {}",
        self.stepsizes.len(),
        expected_steps
      )));
    }
    Ok(())
  }
}

/// One progression-order-change tuple, spec.md §4.2.1.
#[derive(Debug, Clone, Copy)]
pub struct PocRecord {
  pub res_start: u32,
  pub comp_start: u32,
  pub layer_end: u32,
  pub res_end: u32,
  pub comp_end: u32,
  pub progression: ProgressionOrder,
}

/// Per-tile coding parameters (TCP), spec.md §3.
#[derive(Debug, Clone)]
pub struct TileCodingParams {
  pub progression: ProgressionOrder,
  pub num_layers: u32,
  pub components: Vec<TileComponentCodingParams>,
  pub mct_mode: MctMode,
  pub custom_mct: Option<CustomMct>,
  /// One rate (bytes, or `0.0` for "no rate limit"/lossless) per layer.
  pub rates: Vec<f32>,
  /// Per-layer target distortion ratio (`distoratio` in the teacher),
  /// 0 for rate-controlled layers.
  pub distortion_ratios: Vec<f32>,
  pub poc: Vec<PocRecord>,
  pub use_plt: bool,
  pub use_tlm: bool,
  pub use_ppt: bool,
  /// SOP/EPH marker emission, Scod bits 1/2, spec.md §4.2.2.
  pub use_sop: bool,
  pub use_eph: bool,
}

impl TileCodingParams {
  pub fn new(num_components: usize, num_layers: u32) -> Self {
    Self {
      progression: ProgressionOrder::Lrcp,
      num_layers,
      components: vec![TileComponentCodingParams::default(); num_components],
      mct_mode: MctMode::Off,
      custom_mct: None,
      rates: vec![0.0; num_layers as usize],
      distortion_ratios: vec![0.0; num_layers as usize],
      poc: Vec::new(),
      use_plt: false,
      use_tlm: false,
      use_ppt: false,
      use_sop: false,
      use_eph: false,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.num_layers == 0 {
      return Err(Error::invalid("tile must have at least one layer"));
    }
    if self.rates.len() != self.num_layers as usize {
      return Err(Error::invalid("rate vector length must equal num_layers"));
    }
    for tccp in &self.components {
      tccp.validate()?;
    }
    if self.mct_mode == MctMode::Custom && self.custom_mct.is_none() {
      return Err(Error::invalid("custom MCT mode requires custom_mct data"));
    }
    Ok(())
  }
}

/// Part-2 array-based multi-component transform data (CBD/MCC/MCO),
/// spec.md "Supplemented features".
#[derive(Debug, Clone)]
pub struct CustomMct {
  pub num_components: u32,
  /// Row-major `num_components x num_components` transform matrix, fixed
  /// at 13-bit precision as the teacher's `opj_mct_encode_custom` expects.
  pub matrix: Vec<i32>,
  /// Per-component additive offsets applied before the forward transform.
  pub offsets: Vec<i32>,
}

/// The top-level, image-wide coding configuration: tile grid plus the
/// default and per-tile TCPs, spec.md §3.
#[derive(Debug, Clone)]
pub struct CodingParams {
  pub tile_origin_x: u32,
  pub tile_origin_y: u32,
  pub tile_width: u32,
  pub tile_height: u32,
  pub tiles: Vec<TileCodingParams>,
}

impl CodingParams {
  pub fn tile_grid_dims(&self, image_bounds: crate::geometry::Rect) -> (u32, u32) {
    let tx0 = self.tile_origin_x;
    let ty0 = self.tile_origin_y;
    let num_x = crate::geometry::ceil_div(image_bounds.x1.saturating_sub(tx0), self.tile_width);
    let num_y = crate::geometry::ceil_div(image_bounds.y1.saturating_sub(ty0), self.tile_height);
    (num_x, num_y)
  }

  /// Bounds of tile `(u, v)`, spec.md §3: grid cell intersected with the
  /// image canvas.
  pub fn tile_bounds(&self, u: u32, v: u32, image_bounds: crate::geometry::Rect) -> crate::geometry::Rect {
    let x0 = self.tile_origin_x + u * self.tile_width;
    let y0 = self.tile_origin_y + v * self.tile_height;
    let x1 = x0 + self.tile_width;
    let y1 = y0 + self.tile_height;
    crate::geometry::Rect::new(x0, y0, x1, y1).intersect(&image_bounds)
  }

  pub fn validate(&self, image_bounds: crate::geometry::Rect) -> Result<()> {
    if self.tile_width == 0 || self.tile_height == 0 {
      return Err(Error::invalid("tile dimensions must be non-zero"));
    }
    let (nx, ny) = self.tile_grid_dims(image_bounds);
    let total = (nx as u64) * (ny as u64);
    if total == 0 || total > crate::consts::MAX_TILES as u64 {
      return Err(Error::invalid(format!(
        "tile count {} outside [1,{}]",
        total,
        crate::consts::MAX_TILES
      )));
    }
    if self.tiles.len() as u64 != total {
      return Err(Error::invalid(
        "tile coding params count does not match tile grid",
      ));
    }
    for tcp in &self.tiles {
      tcp.validate()?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Rect;

  #[test]
  fn tccp_rejects_out_of_range_resolutions() {
    let mut tccp = TileComponentCodingParams::default();
    tccp.num_resolutions = 34;
    tccp.precinct_exponents = vec![(15, 15); 34];
    assert!(tccp.validate().is_err());
  }

  #[test]
  fn tccp_rejects_stepsize_count_mismatch() {
    let mut tccp = TileComponentCodingParams::default();
    tccp.quant_style = QuantStyle::SeQnt;
    tccp.stepsizes = vec![StepSize::default(); 2];
    assert!(tccp.validate().is_err());
  }

  #[test]
  fn override_source_scoping() {
    let mut src = OverrideSource::default();
    assert!(src.may_override(true, false));
    src.from_component_marker = true;
    assert!(!src.may_override(false, false)); // plain COD can't override a QCC
    assert!(src.may_override(false, true)); // tile-header COC/QCC can
  }

  #[test]
  fn coding_params_tile_grid_matches_spec() {
    let cp = CodingParams {
      tile_origin_x: 0,
      tile_origin_y: 0,
      tile_width: 8,
      tile_height: 8,
      tiles: vec![TileCodingParams::new(1, 1); 4],
    };
    let bounds = Rect::new(0, 0, 16, 12);
    assert_eq!(cp.tile_grid_dims(bounds), (2, 2));
    let t = cp.tile_bounds(1, 1, bounds);
    assert_eq!(t, Rect::new(8, 8, 16, 12));
  }
}
