//! Multi-component transform: fixed reversible (RCT) and irreversible
//! (ICT), plus the Part-2 array-based custom transform, spec.md §3/§4.4.
//!
//! Grounded directly on the teacher's `src/mct.rs` (`opj_mct_encode`,
//! `opj_mct_decode`, `opj_mct_encode_real`, `opj_mct_decode_real`,
//! `opj_mct_encode_custom`) — the formulas are reused verbatim, rewritten
//! over safe slices instead of raw pointer arithmetic.

use crate::coding_params::CustomMct;
use crate::error::{Error, Result};

/// Norms of the basis functions, used by the rate allocator to weigh
/// per-component distortion (teacher's `opj_mct_get_mct_norms`/`_real`).
pub const RCT_NORMS: [f64; 3] = [1.732, 0.8292, 0.8292];
pub const ICT_NORMS: [f64; 3] = [1.732, 1.805, 1.573];

pub fn norm_for_component(mct_mode: crate::consts::MctMode, reversible: bool, compno: usize) -> f64 {
  if mct_mode == crate::consts::MctMode::Off || compno >= 3 {
    return 1.0;
  }
  if reversible {
    RCT_NORMS[compno]
  } else {
    ICT_NORMS[compno]
  }
}

/// Forward reversible colour transform (RCT): `Y=(R+2G+B)>>2, U=B-G, V=R-G`.
pub fn encode_rct(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) {
  for i in 0..c0.len() {
    let r = c0[i];
    let g = c1[i];
    let b = c2[i];
    let y = (r + 2 * g + b) >> 2;
    let u = b - g;
    let v = r - g;
    c0[i] = y;
    c1[i] = u;
    c2[i] = v;
  }
}

/// Inverse reversible colour transform.
pub fn decode_rct(c0: &mut [i32], c1: &mut [i32], c2: &mut [i32]) {
  for i in 0..c0.len() {
    let y = c0[i];
    let u = c1[i];
    let v = c2[i];
    let g = y - ((u + v) >> 2);
    let r = v + g;
    let b = u + g;
    c0[i] = r;
    c1[i] = g;
    c2[i] = b;
  }
}

/// Forward irreversible colour transform (ICT), ITU-R BT.601 coefficients.
pub fn encode_ict(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
  for i in 0..c0.len() {
    let r = c0[i];
    let g = c1[i];
    let b = c2[i];
    c0[i] = 0.299 * r + 0.587 * g + 0.114 * b;
    c1[i] = -0.16875 * r - 0.331_26 * g + 0.5 * b;
    c2[i] = 0.5 * r - 0.41869 * g - 0.08131 * b;
  }
}

/// Inverse irreversible colour transform.
pub fn decode_ict(c0: &mut [f32], c1: &mut [f32], c2: &mut [f32]) {
  for i in 0..c0.len() {
    let y = c0[i];
    let u = c1[i];
    let v = c2[i];
    c0[i] = y + v * 1.402;
    c1[i] = y - u * 0.344_13 - v * 0.71414;
    c2[i] = y + u * 1.772;
  }
}

const CUSTOM_MCT_SHIFT: u32 = 13;

/// Forward Part-2 array-based custom MCT: `out = matrix * (in + offsets)`,
/// fixed-point at `CUSTOM_MCT_SHIFT` bits, mirroring the teacher's
/// `opj_mct_encode_custom`.
pub fn encode_custom(custom: &CustomMct, components: &mut [Vec<i32>]) -> Result<()> {
  validate_custom(custom, components)?;
  let n = custom.num_components as usize;
  let len = components[0].len();
  let multiplier = 1i64 << CUSTOM_MCT_SHIFT;
  let mut out = vec![vec![0i32; len]; n];
  for sample in 0..len {
    for row in 0..n {
      let mut acc = 0i64;
      for col in 0..n {
        let coeff = custom.matrix[row * n + col] as i64;
        let v = components[col][sample] as i64 + custom.offsets[col] as i64;
        acc += coeff * v;
      }
      out[row][sample] = (acc / multiplier) as i32;
    }
  }
  for (dst, src) in components.iter_mut().zip(out.into_iter()) {
    *dst = src;
  }
  Ok(())
}

/// Inverse Part-2 array-based custom MCT, expecting `custom.matrix` to
/// already be the inverse matrix (as the teacher's decoder path also
/// expects a pre-inverted matrix supplied via the MCC marker).
pub fn decode_custom(custom: &CustomMct, components: &mut [Vec<i32>]) -> Result<()> {
  validate_custom(custom, components)?;
  let n = custom.num_components as usize;
  let len = components[0].len();
  let multiplier = 1i64 << CUSTOM_MCT_SHIFT;
  let mut out = vec![vec![0i32; len]; n];
  for sample in 0..len {
    for row in 0..n {
      let mut acc = 0i64;
      for col in 0..n {
        let coeff = custom.matrix[row * n + col] as i64;
        acc += coeff * components[col][sample] as i64;
      }
      out[row][sample] = (acc / multiplier) as i32 - custom.offsets[row];
    }
  }
  for (dst, src) in components.iter_mut().zip(out.into_iter()) {
    *dst = src;
  }
  Ok(())
}

fn validate_custom(custom: &CustomMct, components: &[Vec<i32>]) -> Result<()> {
  let n = custom.num_components as usize;
  if components.len() != n {
    return Err(Error::invalid("custom MCT component count mismatch"));
  }
  if custom.matrix.len() != n * n {
    return Err(Error::invalid("custom MCT matrix is not NxN"));
  }
  if custom.offsets.len() != n {
    return Err(Error::invalid("custom MCT offset count mismatch"));
  }
  if let Some(len) = components.first().map(|c| c.len()) {
    if components.iter().any(|c| c.len() != len) {
      return Err(Error::invalid("custom MCT components have mismatched lengths"));
    }
  }
  Ok(())
}
