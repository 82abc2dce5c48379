//! Post-Compression Rate-Distortion (PCRD) layer formation via
//! λ-bisection, spec.md §4.5.
//!
//! Grounded directly on the teacher's `opj_tcd_rateallocate`/
//! `opj_tcd_makelayer` (`tcd.rs` lines ~39-470): the 128-iteration
//! bisection with early exit on convergence, and the rule that a pass
//! contributes rate/distortion-slope `(distortion_delta / rate_delta)`
//! relative to the previous pass.

use crate::tile::{CodeBlock, Tile};

const MAX_BISECTION_ITERS: u32 = 128;
const CONVERGENCE_EPS: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub struct LayerBudget {
  /// Target byte count for this layer; `0` means "no rate limit" (used for
  /// a final lossless layer, spec.md §4.5 step 1).
  pub max_bytes: u32,
  /// Target cumulative distortion ratio (teacher's `distoratio`); `0.0`
  /// disables distortion targeting for this layer.
  pub distortion_ratio: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LayerResult {
  pub num_passes_this_layer: u32,
  pub bytes_this_layer: u32,
  pub distortion: f64,
  pub threshold: f64,
}

/// Per-pass rate/distortion slope, the teacher's inline `rdslope` computed
/// in the first loop of `opj_tcd_rateallocate`.
fn pass_slope(block: &CodeBlock, passno: usize) -> f64 {
  let dr = if passno == 0 {
    block.pass_rates[0] as i64
  } else {
    block.pass_rates[passno] as i64 - block.pass_rates[passno - 1] as i64
  };
  if dr == 0 {
    return f64::INFINITY;
  }
  let dd = if passno == 0 {
    block.pass_distortions[0]
  } else {
    block.pass_distortions[passno] - block.pass_distortions[passno - 1]
  };
  dd / dr as f64
}

/// Given a slope threshold, the highest pass index (exclusive count) whose
/// cumulative inclusion is justified: every pass up to and including the
/// last one with `slope > thresh`, never regressing below `floor`.
fn passes_for_threshold(block: &CodeBlock, thresh: f64, floor: usize) -> usize {
  let mut n = floor;
  for passno in floor..block.total_passes() {
    if pass_slope(block, passno) > thresh {
      n = passno + 1;
    }
  }
  n
}

fn total_bytes_distortion(blocks: &[&mut CodeBlock], included: &[usize]) -> (u32, f64) {
  let mut bytes = 0u32;
  let mut distortion = 0.0;
  for (block, &n) in blocks.iter().zip(included.iter()) {
    if n > 0 {
      bytes += block.pass_rates[n - 1];
      distortion += block.pass_distortions[n - 1];
    }
  }
  (bytes, distortion)
}

/// Forms `budgets.len()` quality layers over every code-block of `tile`,
/// writing each block's `included_passes_per_layer` (one entry per layer,
/// cumulative-non-decreasing, spec.md §4.5 invariant). Returns one
/// `LayerResult` per layer.
pub fn allocate(tile: &mut Tile, budgets: &[LayerBudget], max_total_bytes: u32) -> Vec<LayerResult> {
  let mut blocks: Vec<&mut CodeBlock> = Vec::new();
  for comp in tile.components.iter_mut() {
    for res in comp.resolutions.iter_mut() {
      for band in res.bands.iter_mut() {
        for prec in band.precincts.iter_mut() {
          for cblk in prec.code_blocks.iter_mut() {
            cblk.included_passes_per_layer.clear();
            blocks.push(cblk);
          }
        }
      }
    }
  }

  let mut min_slope = f64::MAX;
  let mut max_slope = 0.0f64;
  for block in blocks.iter() {
    for passno in 0..block.total_passes() {
      let s = pass_slope(block, passno);
      if s.is_finite() {
        min_slope = min_slope.min(s);
        max_slope = max_slope.max(s);
      }
    }
  }
  if min_slope == f64::MAX {
    min_slope = 0.0;
  }

  let mut floor = vec![0usize; blocks.len()];
  let mut results = Vec::with_capacity(budgets.len());

  for budget in budgets {
    let is_single_lossless = budget.max_bytes == 0 && budget.distortion_ratio == 0.0;

    let included: Vec<usize> = if is_single_lossless {
      blocks.iter().map(|b| b.total_passes()).collect()
    } else {
      let max_len = if budget.max_bytes > 0 {
        budget.max_bytes.min(max_total_bytes)
      } else {
        max_total_bytes
      };
      let mut lo = min_slope;
      let mut hi = max_slope;
      let mut best = floor.clone();
      for _ in 0..MAX_BISECTION_ITERS {
        let thresh = (lo + hi) / 2.0;
        let trial: Vec<usize> = blocks
          .iter()
          .zip(floor.iter())
          .map(|(b, &f)| passes_for_threshold(b, thresh, f))
          .collect();
        let (bytes, _distortion) = total_bytes_distortion(&blocks, &trial);
        if bytes <= max_len {
          best = trial;
          hi = thresh;
        } else {
          lo = thresh;
        }
        if (hi - lo).abs() < CONVERGENCE_EPS {
          break;
        }
      }
      best
    };

    let (bytes, distortion) = total_bytes_distortion(&blocks, &included);
    let mut total_new_passes = 0u32;
    for (bi, block) in blocks.iter_mut().enumerate() {
      let delta = (included[bi] - floor[bi]) as u32;
      block.included_passes_per_layer.push(delta);
      total_new_passes += delta;
    }
    floor = included;

    results.push(LayerResult {
      num_passes_this_layer: total_new_passes,
      bytes_this_layer: bytes,
      distortion,
      threshold: 0.0,
    });
  }

  results
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::coder::{BlockCoefficients, RawPassThroughCoder, Tier1Coder};
  use crate::coding_params::TileComponentCodingParams;
  use crate::geometry::Rect;
  use crate::tile::Tile;

  fn single_block_tile() -> Tile {
    let mut tccp = TileComponentCodingParams::default();
    tccp.num_resolutions = 1;
    tccp.precinct_exponents = vec![(15, 15)];
    let mut tile = Tile::build(Rect::new(0, 0, 4, 4), &[(1, 1)], &[tccp]).unwrap();
    let coder = RawPassThroughCoder;
    let samples = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
    for cblk in tile.components[0].resolutions[0].bands[0].precincts[0]
      .code_blocks
      .iter_mut()
    {
      coder.encode_block(
        BlockCoefficients {
          samples: &samples,
          width: 4,
          height: 4,
          guard_bits: 2,
        },
        cblk,
      );
      // Give it a second pass so slope math has something to bisect over.
      cblk.pass_rates.push(cblk.pass_rates[0] + 8);
      cblk.pass_distortions.push(cblk.pass_distortions[0] + 1.0);
    }
    tile
  }

  #[test]
  fn single_lossless_layer_includes_every_pass() {
    let mut tile = single_block_tile();
    let budgets = [LayerBudget {
      max_bytes: 0,
      distortion_ratio: 0.0,
    }];
    let results = allocate(&mut tile, &budgets, 1_000_000);
    assert_eq!(results.len(), 1);
    let block = &tile.components[0].resolutions[0].bands[0].precincts[0].code_blocks[0];
    assert_eq!(
      block.included_passes_per_layer[0],
      block.total_passes() as u32
    );
  }

  #[test]
  fn monotone_non_decreasing_across_layers() {
    let mut tile = single_block_tile();
    let budgets = [
      LayerBudget {
        max_bytes: 4,
        distortion_ratio: 0.0,
      },
      LayerBudget {
        max_bytes: 0,
        distortion_ratio: 0.0,
      },
    ];
    allocate(&mut tile, &budgets, 1_000_000);
    let block = &tile.components[0].resolutions[0].bands[0].precincts[0].code_blocks[0];
    let cum0 = block.included_passes_per_layer[0];
    let cum1 = cum0 + block.included_passes_per_layer[1];
    assert!(cum1 >= cum0);
    assert_eq!(cum1, block.total_passes() as u32);
  }
}
