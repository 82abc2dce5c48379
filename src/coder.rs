//! Block-coder (Tier-1 EBCOT/HTJ2K) boundary, spec.md §1: "Deliberately
//! OUT of scope, treated as external collaborators: the block coder ...
//! itself". `TileProcessor` only depends on the `Tier1Coder` trait below;
//! it never embeds arithmetic-coding or HTJ2K state machinery, matching
//! the teacher's `tcd_t1_encode`/`tcd_t1_decode` call sites in `tcd.rs`,
//! which likewise dispatch to a separate `t1`/`ht_dec` module through a
//! narrow per-code-block interface.
//!
//! `RawPassThroughCoder` is a minimal stand-in used by this crate's own
//! round-trip tests: it stores sample magnitudes as a single "pass" with
//! an honest rate/distortion estimate, which is enough for the rate
//! allocator and packet layer to exercise real control flow without
//! pulling in a real entropy coder.

use crate::tile::CodeBlock;

/// Coefficients for one code-block, in raster order within its bounds,
/// handed to the coder pre-DWT-quantisation.
pub struct BlockCoefficients<'a> {
  pub samples: &'a [i32],
  pub width: u32,
  pub height: u32,
  pub guard_bits: u8,
}

pub trait Tier1Coder {
  /// Encode one code-block's coefficients into bit-plane coding passes.
  /// Implementations populate `block.pass_rates`/`pass_distortions`/`data`
  /// (cumulative bytes and distortion per included pass), which the rate
  /// allocator then truncates per layer.
  fn encode_block(&self, coeffs: BlockCoefficients<'_>, block: &mut CodeBlock);

  /// Decode a code-block's included passes (`block.included_passes_per_layer`
  /// summed up to and including `layer`) back into coefficients.
  fn decode_block(&self, block: &CodeBlock, layer: u32, out: &mut [i32]);
}

/// Reference stand-in coder: a single lossless "pass" storing raw 32-bit
/// coefficients. Not a real EBCOT/HTJ2K implementation — see module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPassThroughCoder;

impl Tier1Coder for RawPassThroughCoder {
  fn encode_block(&self, coeffs: BlockCoefficients<'_>, block: &mut CodeBlock) {
    let mut data = Vec::with_capacity(coeffs.samples.len() * 4);
    for &s in coeffs.samples {
      data.extend_from_slice(&s.to_be_bytes());
    }
    let rate = data.len() as u32;
    block.data = data;
    block.pass_rates = vec![rate];
    block.pass_distortions = vec![0.0];
    block.included_passes_per_layer.clear();
  }

  fn decode_block(&self, block: &CodeBlock, layer: u32, out: &mut [i32]) {
    let included: u32 = block
      .included_passes_per_layer
      .iter()
      .take(layer as usize + 1)
      .sum();
    if included == 0 {
      out.fill(0);
      return;
    }
    for (i, chunk) in block.data.chunks_exact(4).enumerate() {
      if i >= out.len() {
        break;
      }
      out[i] = i32::from_be_bytes(chunk.try_into().unwrap());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Rect;

  #[test]
  fn raw_coder_round_trips_when_fully_included() {
    let samples = [1, -2, 3, -4];
    let mut block = CodeBlock::new(Rect::new(0, 0, 2, 2));
    let coder = RawPassThroughCoder;
    coder.encode_block(
      BlockCoefficients {
        samples: &samples,
        width: 2,
        height: 2,
        guard_bits: 2,
      },
      &mut block,
    );
    block.included_passes_per_layer = vec![1];
    let mut out = [0i32; 4];
    coder.decode_block(&block, 0, &mut out);
    assert_eq!(out, samples);
  }

  #[test]
  fn raw_coder_yields_zeros_when_no_passes_included() {
    let samples = [1, 2, 3, 4];
    let mut block = CodeBlock::new(Rect::new(0, 0, 2, 2));
    let coder = RawPassThroughCoder;
    coder.encode_block(
      BlockCoefficients {
        samples: &samples,
        width: 2,
        height: 2,
        guard_bits: 2,
      },
      &mut block,
    );
    block.included_passes_per_layer = vec![0];
    let mut out = [0i32; 4];
    coder.decode_block(&block, 0, &mut out);
    assert_eq!(out, [0, 0, 0, 0]);
  }
}
