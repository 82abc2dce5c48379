//! Worker pool and task-graph scheduling, spec.md §5.
//!
//! The teacher is single-threaded throughout (`openjp2-rs` has no `rayon`
//! dependency); this module has no teacher counterpart and is grounded
//! instead on `Abhi9024-MyImageCompressor`'s `batch::scheduler`
//! (`rayon::ThreadPoolBuilder` + `AtomicBool` cancellation flag +
//! `par_iter`), adapted from "one job per image" to "one job per tile" /
//! "one task per code-block" per spec.md §5's two parallelism levels.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::coder::Tier1Coder;
use crate::coding_params::{TileCodingParams, TileComponentCodingParams};
use crate::error::Result;
use crate::geometry::Rect;
use crate::stream::MemStream;
use crate::tcd::TileProcessor;
use crate::pi::{PacketIter, Window};

/// One tile's input: its grid bounds and already-deinterleaved component
/// samples, ready for `TileProcessor::pre_compress`.
pub struct TileJob {
  pub tile_index: u32,
  pub bounds: Rect,
  pub samples: Vec<Vec<i32>>,
}

/// One tile's packet-stream bytes, tagged with its index so the draining
/// side can restore tile order.
pub struct CompressedTile {
  pub tile_index: u32,
  pub bytes: Vec<u8>,
}

/// Owns the thread count for both parallelism levels, mirroring
/// `Abhi9024-MyImageCompressor`'s `BatchScheduler` (a `num_threads` field
/// plus a `Default` that falls back to `num_cpus::get()`). Each
/// `WorkerPool` method builds its own `rayon::ThreadPoolBuilder` rather
/// than relying on rayon's implicit global pool, so a caller running more
/// than one of these concurrently (e.g. compressing two images at once)
/// doesn't have them contend over shared pool sizing.
///
/// With the `parallel` feature disabled, `default()` pins the pool to one
/// thread instead of `num_cpus::get()`, so the exact same tile-level and
/// task-level code above runs strictly sequentially with no separate
/// code path to keep in sync. An explicit `WorkerPool::new(n)` always
/// honours the caller's choice regardless of the feature.
pub struct WorkerPool {
  num_threads: usize,
}

impl Default for WorkerPool {
  #[cfg(feature = "parallel")]
  fn default() -> Self {
    Self { num_threads: num_cpus::get() }
  }

  #[cfg(not(feature = "parallel"))]
  fn default() -> Self {
    Self { num_threads: 1 }
  }
}

impl WorkerPool {
  pub fn new(num_threads: usize) -> Self {
    Self { num_threads }
  }

  pub fn num_threads(&self) -> usize {
    self.num_threads
  }

  #[allow(clippy::too_many_arguments)]
  pub fn compress_tiles(
    &self,
    jobs: Vec<TileJob>,
    comp_subsampling: &[(u32, u32)],
    tccps_per_tile: &[Vec<TileComponentCodingParams>],
    tcp_per_tile: &[TileCodingParams],
    precisions: &[(u8, bool)],
    coder: &(dyn Tier1Coder + Sync),
    max_total_bytes_per_tile: u32,
    cancel: &AtomicBool,
  ) -> Result<Vec<CompressedTile>> {
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(self.num_threads)
      .build()
      .map_err(|e| crate::error::Error::unsupported(format!("failed to build thread pool: {e}")))?;
    pool.install(|| {
      compress_tiles_parallel(
        jobs,
        comp_subsampling,
        tccps_per_tile,
        tcp_per_tile,
        precisions,
        coder,
        max_total_bytes_per_tile,
        cancel,
      )
    })
  }
}

/// Compresses every tile concurrently, spec.md §5's "tile-level
/// parallelism (compressor)": each worker owns a private `TileProcessor`
/// and pushes its finished bytes into a shared min-heap keyed by tile
/// index, guarded by one lock; this function then drains the heap in
/// ascending tile-index order, mirroring "the main thread pops in order"
/// once every worker has joined. `cancel` is checked before starting each
/// tile's work and is set if any tile errors, so in-flight siblings exit
/// early rather than compute wasted work.
fn compress_tiles_parallel(
  jobs: Vec<TileJob>,
  comp_subsampling: &[(u32, u32)],
  tccps_per_tile: &[Vec<TileComponentCodingParams>],
  tcp_per_tile: &[TileCodingParams],
  precisions: &[(u8, bool)],
  coder: &(dyn Tier1Coder + Sync),
  max_total_bytes_per_tile: u32,
  cancel: &AtomicBool,
) -> Result<Vec<CompressedTile>> {
  let heap: Mutex<BinaryHeap<Reverse<(u32, Vec<u8>)>>> = Mutex::new(BinaryHeap::new());
  let first_error: Mutex<Option<crate::error::Error>> = Mutex::new(None);

  jobs.into_par_iter().enumerate().for_each(|(i, job)| {
    if cancel.load(Ordering::Relaxed) {
      return;
    }
    let result = compress_one_tile(
      &job,
      comp_subsampling,
      &tccps_per_tile[i],
      &tcp_per_tile[i],
      precisions,
      coder,
      max_total_bytes_per_tile,
    );
    match result {
      Ok(bytes) => heap.lock().unwrap().push(Reverse((job.tile_index, bytes))),
      Err(e) => {
        cancel.store(true, Ordering::Relaxed);
        let mut slot = first_error.lock().unwrap();
        if slot.is_none() {
          *slot = Some(e);
        }
      }
    }
  });

  if let Some(e) = first_error.into_inner().unwrap() {
    return Err(e);
  }

  let mut heap = heap.into_inner().unwrap();
  let mut out = Vec::with_capacity(heap.len());
  while let Some(Reverse((tile_index, bytes))) = heap.pop() {
    out.push(CompressedTile { tile_index, bytes });
  }
  Ok(out)
}

fn compress_one_tile(
  job: &TileJob,
  comp_subsampling: &[(u32, u32)],
  tccps: &[TileComponentCodingParams],
  tcp: &TileCodingParams,
  precisions: &[(u8, bool)],
  coder: &(dyn Tier1Coder + Sync),
  max_total_bytes: u32,
) -> Result<Vec<u8>> {
  let mut proc = TileProcessor::init(job.bounds, comp_subsampling, tccps)?;
  proc.pre_compress(job.samples.clone())?;
  proc.compress(tcp, precisions, coder, max_total_bytes)?;

  let window = Window::full(&proc.tile);
  let mut iter = PacketIter::new(&proc.tile, &tcp.poc, tcp.progression, tcp.num_layers, window);
  let mut stream = MemStream::new();
  proc.write_tile_parts(&mut stream, &mut iter)?;
  Ok(stream.into_inner())
}

/// Decodes one tile's code-blocks with task-level parallelism, spec.md
/// §5's "task-level parallelism (decompressor)": Tier-1 decode of
/// independent code-blocks runs as concurrent tasks (one per component
/// here, each owning disjoint sub-band slots), then the remaining stages
/// form a small dependency graph — per-component inverse DWT (also run
/// concurrently, since components are independent until MCT), an optional
/// shared MCT node that must wait on every component's DWT, and finally
/// per-component DC-shift. `cancel` is polled between stages so a
/// cancellation request lands before the next expensive step starts.
pub fn decompress_tile_task_graph(
  proc: &mut TileProcessor,
  tcp: &TileCodingParams,
  precisions: &[(u8, bool)],
  coder: &(dyn Tier1Coder + Sync),
  target_layer: u32,
  cancel: &AtomicBool,
) -> Result<()> {
  let num_comps = proc.tile.components.len();
  proc.buffers = proc.dims.iter().map(|&(w, h)| vec![0i32; (w * h) as usize]).collect();

  if cancel.load(Ordering::Relaxed) {
    return Err(crate::error::Error::unsupported("decode cancelled"));
  }

  // Task graph node 1: per-component Tier-1 decode, independent code-blocks.
  let decoded: Vec<Vec<i32>> = (0..num_comps)
    .into_par_iter()
    .map(|compno| decode_component_t1(proc, compno, coder, target_layer))
    .collect();
  for (compno, buf) in decoded.into_iter().enumerate() {
    proc.buffers[compno] = buf;
  }

  if cancel.load(Ordering::Relaxed) {
    return Err(crate::error::Error::unsupported("decode cancelled"));
  }

  // Task graph node 2: per-component inverse DWT, independent until MCT.
  let tccps = proc.tccps.clone();
  let dims = proc.dims.clone();
  proc
    .buffers
    .par_iter_mut()
    .zip(tccps.par_iter())
    .zip(dims.par_iter())
    .for_each(|((buf, tccp), &(w, h))| {
      let transform = crate::wavelet::for_kind(tccp.wavelet);
      transform.inverse(buf, w as usize, h as usize, tccp.num_resolutions);
    });

  if cancel.load(Ordering::Relaxed) {
    return Err(crate::error::Error::unsupported("decode cancelled"));
  }

  // Task graph node 3: shared MCT node, joins all components' DWT output.
  apply_mct_decode_inplace(proc, tcp)?;

  // Task graph node 4: per-component DC-shift, independent again.
  proc
    .buffers
    .par_iter_mut()
    .zip(precisions.par_iter())
    .for_each(|(buf, &(prec, signed))| {
      crate::tcd::dc_shift_decode(buf, crate::tcd::dc_shift_value(prec, signed));
    });

  Ok(())
}

fn decode_component_t1(proc: &TileProcessor, compno: usize, coder: &(dyn Tier1Coder + Sync), target_layer: u32) -> Vec<i32> {
  let (w, h) = proc.dims[compno];
  let comp_bounds = proc.tile.components[compno]
    .resolutions
    .last()
    .expect("at least one resolution")
    .bounds;
  let mut buf = vec![0i32; (w * h) as usize];
  for res in &proc.tile.components[compno].resolutions {
    for band in &res.bands {
      for precinct in &band.precincts {
        for block in &precinct.code_blocks {
          let mut samples = vec![0i32; (block.bounds.width() * block.bounds.height()) as usize];
          coder.decode_block(block, target_layer, &mut samples);
          write_block_into(&mut buf, w, comp_bounds, block.bounds, &samples);
        }
      }
    }
  }
  buf
}

fn write_block_into(buf: &mut [i32], width: u32, comp_bounds: Rect, block_bounds: Rect, samples: &[i32]) {
  let bw = block_bounds.width();
  let bh = block_bounds.height();
  let ox = block_bounds.x0 - comp_bounds.x0;
  let oy = block_bounds.y0 - comp_bounds.y0;
  for row in 0..bh {
    let dst_start = ((oy + row) * width + ox) as usize;
    let src_start = (row * bw) as usize;
    buf[dst_start..dst_start + bw as usize].copy_from_slice(&samples[src_start..src_start + bw as usize]);
  }
}

fn apply_mct_decode_inplace(proc: &mut TileProcessor, tcp: &TileCodingParams) -> Result<()> {
  if proc.buffers.len() < 3 {
    return Ok(());
  }
  match tcp.mct_mode {
    crate::consts::MctMode::Off => Ok(()),
    crate::consts::MctMode::Fixed => {
      let (a, rest) = proc.buffers.split_at_mut(1);
      let (b, c) = rest.split_at_mut(1);
      if proc.tccps[0].wavelet == crate::consts::WaveletKind::Reversible5x3 {
        crate::mct::decode_rct(&mut a[0], &mut b[0], &mut c[0]);
      } else {
        let mut fa: Vec<f32> = a[0].iter().map(|&v| v as f32).collect();
        let mut fb: Vec<f32> = b[0].iter().map(|&v| v as f32).collect();
        let mut fc: Vec<f32> = c[0].iter().map(|&v| v as f32).collect();
        crate::mct::decode_ict(&mut fa, &mut fb, &mut fc);
        for (dst, src) in a[0].iter_mut().zip(fa.iter()) {
          *dst = src.round() as i32;
        }
        for (dst, src) in b[0].iter_mut().zip(fb.iter()) {
          *dst = src.round() as i32;
        }
        for (dst, src) in c[0].iter_mut().zip(fc.iter()) {
          *dst = src.round() as i32;
        }
      }
      Ok(())
    }
    crate::consts::MctMode::Custom => {
      let custom = tcp
        .custom_mct
        .as_ref()
        .ok_or_else(|| crate::error::Error::invalid("custom MCT mode requires custom_mct data"))?;
      crate::mct::decode_custom(custom, &mut proc.buffers)
    }
  }
}
