//! Discrete wavelet transform boundary, spec.md §1: "Deliberately OUT of
//! scope, treated as external collaborators: ... the DWT numerical
//! kernels". This module defines the contract the tile processor drives
//! (`WaveletTransform`) and ships one reference implementation — the 5/3
//! reversible lifting kernel — so the core's round-trip tests (spec.md §8
//! properties 5 and S1) exercise a real, if unoptimized, collaborator
//! instead of a mock. A production integration swaps in the accelerated
//! kernel (SIMD 5/3 and 9/7) without touching `TileProcessor`.
//!
//! Grounded on the teacher's `tcd_dwt_encode`/`tcd_dwt_decode` call sites
//! in `tcd.rs`, which likewise treat the DWT as a single forward/inverse
//! call over a component's full resolution pyramid.

use crate::consts::WaveletKind;

/// A 1-D-separable, in-place wavelet transform over a component buffer
/// shaped as `num_resolutions` nested low-pass bands, reversible or not.
pub trait WaveletTransform {
  fn forward(&self, samples: &mut [i32], width: usize, height: usize, num_resolutions: u32);
  fn inverse(&self, samples: &mut [i32], width: usize, height: usize, num_resolutions: u32);
  fn kind(&self) -> WaveletKind;
}

/// Reference reversible 5/3 lifting kernel (lossless-capable), applied
/// separably row-then-column per decomposition level.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reversible53;

impl Reversible53 {
  fn forward_1d(line: &mut [i32]) {
    let n = line.len();
    if n < 2 {
      return;
    }
    // Predict (odd samples) then update (even samples), standard 5/3
    // lifting as specified by ISO/IEC 15444-1 Annex F.
    let mut i = 1;
    while i < n {
      let left = line[i - 1];
      let right = if i + 1 < n { line[i + 1] } else { line[i - 1] };
      line[i] -= (left + right) >> 1;
      i += 2;
    }
    let mut i = 0;
    while i < n {
      let left = if i > 0 { line[i - 1] } else { line[(i + 1).min(n - 1)] };
      let right = if i + 1 < n { line[i + 1] } else { left };
      line[i] += (left + right + 2) >> 2;
      i += 2;
    }
  }

  fn inverse_1d(line: &mut [i32]) {
    let n = line.len();
    if n < 2 {
      return;
    }
    let mut i = 0;
    while i < n {
      let left = if i > 0 { line[i - 1] } else { line[(i + 1).min(n - 1)] };
      let right = if i + 1 < n { line[i + 1] } else { left };
      line[i] -= (left + right + 2) >> 2;
      i += 2;
    }
    let mut i = 1;
    while i < n {
      let left = line[i - 1];
      let right = if i + 1 < n { line[i + 1] } else { line[i - 1] };
      line[i] += (left + right) >> 1;
      i += 2;
    }
  }
}

impl WaveletTransform for Reversible53 {
  fn forward(&self, samples: &mut [i32], width: usize, height: usize, num_resolutions: u32) {
    let mut w = width;
    let mut h = height;
    for _ in 1..num_resolutions {
      transform_level(samples, width, w, h, Self::forward_1d);
      w = (w + 1) / 2;
      h = (h + 1) / 2;
      if w < 2 && h < 2 {
        break;
      }
    }
  }

  fn inverse(&self, samples: &mut [i32], width: usize, height: usize, num_resolutions: u32) {
    let mut levels = Vec::new();
    let mut w = width;
    let mut h = height;
    for _ in 1..num_resolutions {
      levels.push((w, h));
      w = (w + 1) / 2;
      h = (h + 1) / 2;
      if w < 2 && h < 2 {
        break;
      }
    }
    for (w, h) in levels.into_iter().rev() {
      transform_level(samples, width, w, h, Self::inverse_1d);
    }
  }

  fn kind(&self) -> WaveletKind {
    WaveletKind::Reversible5x3
  }
}

/// Pass-through kernel used when a tile's TCCP selects the 9/7
/// irreversible transform but no accelerated kernel is wired in; keeps the
/// pipeline shape identical (forward/inverse are still called) while
/// documenting, via its name, that it is not a real 9/7 kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Irreversible97Stub;

impl WaveletTransform for Irreversible97Stub {
  fn forward(&self, _samples: &mut [i32], _width: usize, _height: usize, _num_resolutions: u32) {}
  fn inverse(&self, _samples: &mut [i32], _width: usize, _height: usize, _num_resolutions: u32) {}
  fn kind(&self) -> WaveletKind {
    WaveletKind::Irreversible9x7
  }
}

fn transform_level(
  samples: &mut [i32],
  stride: usize,
  w: usize,
  h: usize,
  op: impl Fn(&mut [i32]),
) {
  if w < 2 && h < 2 {
    return;
  }
  let mut row_buf = vec![0i32; w];
  for y in 0..h {
    for x in 0..w {
      row_buf[x] = samples[y * stride + x];
    }
    op(&mut row_buf);
    for x in 0..w {
      samples[y * stride + x] = row_buf[x];
    }
  }
  let mut col_buf = vec![0i32; h];
  for x in 0..w {
    for y in 0..h {
      col_buf[y] = samples[y * stride + x];
    }
    op(&mut col_buf);
    for y in 0..h {
      samples[y * stride + x] = col_buf[y];
    }
  }
}

pub fn for_kind(kind: WaveletKind) -> Box<dyn WaveletTransform> {
  match kind {
    WaveletKind::Reversible5x3 => Box::new(Reversible53),
    WaveletKind::Irreversible9x7 => Box::new(Irreversible97Stub),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reversible_53_round_trips_a_small_tile() {
    let w = 8usize;
    let h = 8usize;
    let mut samples: Vec<i32> = (0..(w * h) as i32).collect();
    let original = samples.clone();
    let kernel = Reversible53;
    kernel.forward(&mut samples, w, h, 3);
    kernel.inverse(&mut samples, w, h, 3);
    assert_eq!(samples, original);
  }

  #[test]
  fn single_resolution_is_identity() {
    let w = 4usize;
    let h = 4usize;
    let mut samples: Vec<i32> = (0..(w * h) as i32).collect();
    let original = samples.clone();
    let kernel = Reversible53;
    kernel.forward(&mut samples, w, h, 1);
    assert_eq!(samples, original);
  }
}
