//! Universal round-trip/framing invariants, spec.md §8.
//!
//! Each test below drives the same public entry points a real caller
//! would use (`CodeStream::start_compress`/`compress_tiles`/
//! `end_compress`/`start_decompress`/`decompress_tiles`), mirroring how
//! the teacher's own integration coverage (`tools/tests`) exercises
//! `opj_start_compress`/`opj_encode`/`opj_end_compress` end to end rather
//! than unit-testing each marker writer in isolation.

use jp2k_core::coder::RawPassThroughCoder;
use jp2k_core::coding_params::TileCodingParams;
use jp2k_core::consts::{MarkerId, ProgressionOrder, WaveletKind};
use jp2k_core::coding_params::CodingParams;
use jp2k_core::geometry::{subsampled_dims, Rect};
use jp2k_core::image::{Component, Image};
use jp2k_core::marker::{SizComponent, SizParams};
use jp2k_core::pi::{PacketIter, Window};
use jp2k_core::stream::{MemStream, Stream};
use jp2k_core::tcd::TileProcessor;
use jp2k_core::CodeStream;

/// Builds a single-tile, single-component 8x8 lossless code-stream
/// configuration (spec.md S1's shape), reused by several invariants.
fn single_tile_8x8() -> CodeStream {
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
  tcp.components[0].num_resolutions = 2;
  tcp.components[0].precinct_exponents = vec![(15, 15); 2];

  let coding_params = CodingParams {
    tile_origin_x: 0,
    tile_origin_y: 0,
    tile_width: 8,
    tile_height: 8,
    tiles: vec![tcp],
  };

  CodeStream::new(siz, coding_params, image)
}

fn compress_round_trip(cs: &mut CodeStream, samples: Vec<Vec<Vec<i32>>>) -> Vec<u8> {
  let mut stream = MemStream::new();
  let coder = RawPassThroughCoder;
  cs.start_compress(&mut stream).unwrap();
  cs.compress_tiles(&mut stream, &coder, samples).unwrap();
  cs.end_compress(&mut stream).unwrap();
  stream.into_inner()
}

/// Invariant 1: every code-stream starts with SOC and ends with EOC.
#[test]
fn soc_and_eoc_frame_every_codestream() {
  let mut cs = single_tile_8x8();
  let samples = vec![vec![(0..64).collect::<Vec<i32>>()]];
  let bytes = compress_round_trip(&mut cs, samples);

  let mut r = MemStream::new();
  for b in &bytes {
    r.write_u8(*b).unwrap();
  }
  r.seek(0).unwrap();
  assert_eq!(r.read_u16().unwrap(), MarkerId::Soc as u16);

  let mut tail = MemStream::new();
  for b in &bytes {
    tail.write_u8(*b).unwrap();
  }
  tail.seek(bytes.len() as u64 - 2).unwrap();
  assert_eq!(tail.read_u16().unwrap(), MarkerId::Eoc as u16);
}

/// Invariant 2: Psot equals the distance from the start of SOT to just
/// before the next SOT/EOC. With this engine's one-tile-part-per-tile
/// policy that distance is exactly the tile-part's own length, which is
/// what `compress_tiles` records into its TLM table as it patches Psot
/// in place.
#[test]
fn psot_matches_distance_to_next_marker() {
  let bounds = Rect::new(0, 0, 16, 8);
  let (w, h) = subsampled_dims(bounds, 1, 1);
  let comp = Component::new(1, 1, w, h, 8, false);
  let image = Image::new(bounds, vec![comp]).unwrap();
  let siz = SizParams {
    rsiz: 0,
    width: 16,
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
  let mut cs = CodeStream::new(siz, coding_params, image);

  let samples = vec![vec![(0..64).collect::<Vec<i32>>()], vec![(0..64).collect::<Vec<i32>>()]];
  let bytes = compress_round_trip(&mut cs, samples);

  let mut r = MemStream::new();
  for b in &bytes {
    r.write_u8(*b).unwrap();
  }
  r.seek(0).unwrap();
  assert_eq!(r.read_u16().unwrap(), MarkerId::Soc as u16);
  let _siz_marker = r.read_u16().unwrap();
  let siz_len = r.read_u16().unwrap();
  r.skip(siz_len as u64 - 2).unwrap();
  let _cod_marker = r.read_u16().unwrap();
  let cod_len = r.read_u16().unwrap();
  r.skip(cod_len as u64 - 2).unwrap();
  let _qcd_marker = r.read_u16().unwrap();
  let qcd_len = r.read_u16().unwrap();
  r.skip(qcd_len as u64 - 2).unwrap();

  for entry in cs.tlm_entries() {
    let sot_offset = r.tell();
    assert_eq!(r.read_u16().unwrap(), MarkerId::Sot as u16);
    let _lsot = r.read_u16().unwrap();
    let sot = jp2k_core::marker::read_sot(&mut r).unwrap();
    assert_eq!(sot.tile_part_length, entry.tile_part_length);
    r.seek(sot_offset + sot.tile_part_length as u64).unwrap();
  }
  assert_eq!(r.read_u16().unwrap(), MarkerId::Eoc as u16);
}

/// Invariant 3 (simplified to this engine's policy): this crate only ever
/// emits a single tile-part per tile, so TPsot is always 0 and TNsot
/// always 1 — still a form of "strictly increasing tile-part index",
/// trivially satisfied by never emitting more than one.
#[test]
fn single_tile_part_per_tile_is_self_consistent() {
  let mut cs = single_tile_8x8();
  let samples = vec![vec![(0..64).collect::<Vec<i32>>()]];
  let bytes = compress_round_trip(&mut cs, samples);
  let mut r = MemStream::new();
  for b in &bytes {
    r.write_u8(*b).unwrap();
  }
  r.seek(0).unwrap();
  r.read_u16().unwrap(); // SOC
  r.read_u16().unwrap(); // SIZ marker
  let siz_len = r.read_u16().unwrap();
  r.skip(siz_len as u64 - 2).unwrap();
  r.read_u16().unwrap(); // COD
  let cod_len = r.read_u16().unwrap();
  r.skip(cod_len as u64 - 2).unwrap();
  r.read_u16().unwrap(); // QCD
  let qcd_len = r.read_u16().unwrap();
  r.skip(qcd_len as u64 - 2).unwrap();
  r.read_u16().unwrap(); // SOT
  let _lsot = r.read_u16().unwrap();
  let sot = jp2k_core::marker::read_sot(&mut r).unwrap();
  assert_eq!(sot.tile_part_index, 0);
  assert_eq!(sot.num_tile_parts, 1);
}

/// Invariant 4: total packets visited equals
/// components x resolutions x precincts x layers, for a tile whose
/// precinct grid is one precinct per resolution.
#[test]
fn packet_count_matches_product_of_axes() {
  let mut tccp = jp2k_core::coding_params::TileComponentCodingParams::default();
  tccp.num_resolutions = 3;
  tccp.precinct_exponents = vec![(15, 15); 3];
  let tile = jp2k_core::tile::Tile::build(Rect::new(0, 0, 32, 32), &[(1, 1), (1, 1)], &[tccp.clone(), tccp]).unwrap();

  let num_layers = 2;
  let mut it = PacketIter::new(&tile, &[], ProgressionOrder::Lrcp, num_layers, Window::full(&tile));
  let mut count = 0u32;
  while it.next().is_some() {
    count += 1;
  }
  // 2 components x 3 resolutions x 1 precinct x 2 layers.
  assert_eq!(count, 2 * 3 * 1 * num_layers);
}

/// Invariant 5: the reversible (5/3) path round-trips samples exactly.
#[test]
fn reversible_path_round_trips_exactly() {
  let mut cs = single_tile_8x8();
  let samples: Vec<i32> = (0..64).map(|v| (v * 3) % 251).collect();
  let bytes = compress_round_trip(&mut cs, vec![vec![samples.clone()]]);

  let mut r = MemStream::new();
  for b in &bytes {
    r.write_u8(*b).unwrap();
  }
  r.seek(0).unwrap();
  let mut decoded = CodeStream::start_decompress(&mut r).unwrap();
  let coder = RawPassThroughCoder;
  decoded.decompress_tiles(&mut r, &coder, 0).unwrap();

  assert_eq!(decoded.image.components[0].data(), samples.as_slice());
}

fn psnr(original: &[i32], decoded: &[i32], max_val: f64) -> f64 {
  let mse: f64 = original
    .iter()
    .zip(decoded.iter())
    .map(|(&o, &d)| {
      let diff = (o - d) as f64;
      diff * diff
    })
    .sum::<f64>()
    / original.len() as f64;
  if mse == 0.0 {
    return f64::INFINITY;
  }
  20.0 * max_val.log10() - 10.0 * mse.log10()
}

/// Invariant 6: the irreversible path reconstructs with at least 40dB
/// PSNR. This engine's 9/7 kernel is a pass-through stub (spec.md's DWT
/// numerics are an external collaborator, `wavelet.rs`'s module doc), so
/// the only lossy step actually exercised here is the ICT's
/// float-round-trip rounding — still a faithful test of the pipeline
/// shape (DC-shift -> MCT -> DWT -> Tier-1 -> rate allocation and back),
/// just not of a real 9/7 kernel's quantisation loss.
#[test]
fn irreversible_path_meets_psnr_floor() {
  let bounds = Rect::new(0, 0, 16, 16);
  let comps: Vec<Component> = (0..3)
    .map(|_| Component::new(1, 1, 16, 16, 8, false))
    .collect();
  let image = Image::new(bounds, comps).unwrap();
  let siz = SizParams {
    rsiz: 0,
    width: 16,
    height: 16,
    x0: 0,
    y0: 0,
    tile_width: 16,
    tile_height: 16,
    tile_x0: 0,
    tile_y0: 0,
    components: vec![
      SizComponent { precision: 8, signed: false, dx: 1, dy: 1 };
      3
    ],
  };
  let mut tcp = TileCodingParams::new(3, 1);
  tcp.progression = ProgressionOrder::Lrcp;
  tcp.mct_mode = jp2k_core::consts::MctMode::Fixed;
  for tccp in tcp.components.iter_mut() {
    tccp.wavelet = WaveletKind::Irreversible9x7;
    tccp.num_resolutions = 2;
    tccp.precinct_exponents = vec![(15, 15); 2];
  }
  let coding_params = CodingParams {
    tile_origin_x: 0,
    tile_origin_y: 0,
    tile_width: 16,
    tile_height: 16,
    tiles: vec![tcp],
  };
  let mut cs = CodeStream::new(siz, coding_params, image);

  let planes: Vec<Vec<i32>> = (0..3usize)
    .map(|p| (0..256i32).map(|i| (i + p as i32 * 37) % 256).collect())
    .collect();
  let bytes = compress_round_trip(&mut cs, vec![planes.clone()]);

  let mut r = MemStream::new();
  for b in &bytes {
    r.write_u8(*b).unwrap();
  }
  r.seek(0).unwrap();
  let mut decoded = CodeStream::start_decompress(&mut r).unwrap();
  let coder = RawPassThroughCoder;
  decoded.decompress_tiles(&mut r, &coder, 0).unwrap();

  for (plane, comp) in planes.iter().zip(decoded.image.components.iter()) {
    let db = psnr(plane, comp.data(), 255.0);
    assert!(db >= 40.0, "PSNR {db} below floor");
  }
}

/// Invariant 7: decoding a tile by seeking directly to the byte offset a
/// TLM entry recorded (skipping every earlier tile-part) yields the same
/// samples as decoding all tiles sequentially from the start.
#[test]
fn tlm_offset_decode_matches_sequential_decode() {
  let bounds = Rect::new(0, 0, 16, 8);
  let (w, h) = subsampled_dims(bounds, 1, 1);
  let comp = Component::new(1, 1, w, h, 8, false);
  let image = Image::new(bounds, vec![comp]).unwrap();
  let siz = SizParams {
    rsiz: 0,
    width: 16,
    height: 8,
    x0: 0,
    y0: 0,
    tile_width: 8,
    tile_height: 8,
    tile_x0: 0,
    tile_y0: 0,
    components: vec![SizComponent { precision: 8, signed: false, dx: 1, dy: 1 }],
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
  let mut cs = CodeStream::new(siz, coding_params, image);

  let tile0: Vec<i32> = (0..64).collect();
  let tile1: Vec<i32> = (64..128).collect();
  let bytes = compress_round_trip(&mut cs, vec![vec![tile0.clone()], vec![tile1.clone()]]);
  assert_eq!(cs.tlm_entries().len(), 2);

  // Sequential decode of both tiles.
  let mut r_seq = MemStream::new();
  for b in &bytes {
    r_seq.write_u8(*b).unwrap();
  }
  r_seq.seek(0).unwrap();
  let mut seq = CodeStream::start_decompress(&mut r_seq).unwrap();
  let coder = RawPassThroughCoder;
  seq.decompress_tiles(&mut r_seq, &coder, 0).unwrap();

  // Direct offset decode of only the second tile-part, located by summing
  // the first tile-part's recorded length onto the main-header end.
  let main_header_end = {
    let mut probe = MemStream::new();
    for b in &bytes {
      probe.write_u8(*b).unwrap();
    }
    probe.seek(0).unwrap();
    CodeStream::start_decompress(&mut probe).unwrap();
    probe.tell()
  };
  let second_tile_offset = main_header_end + cs.tlm_entries()[0].tile_part_length as u64;

  let mut r_direct = MemStream::new();
  for b in &bytes {
    r_direct.write_u8(*b).unwrap();
  }
  r_direct.seek(second_tile_offset).unwrap();
  assert_eq!(r_direct.read_u16().unwrap(), MarkerId::Sot as u16);
  r_direct.seek(second_tile_offset).unwrap();

  let tile_bounds = Rect::new(8, 0, 16, 8);
  let mut tccp = jp2k_core::coding_params::TileComponentCodingParams::default();
  tccp.num_resolutions = 1;
  tccp.precinct_exponents = vec![(15, 15)];
  let mut proc = TileProcessor::init(tile_bounds, &[(1, 1)], &[tccp]).unwrap();
  r_direct.read_u16().unwrap(); // SOT
  let _lsot = r_direct.read_u16().unwrap();
  jp2k_core::marker::read_sot(&mut r_direct).unwrap();
  r_direct.read_u16().unwrap(); // SOD
  let tcp = TileCodingParams::new(1, 1);
  let mut iter = PacketIter::new(&proc.tile, &tcp.poc, tcp.progression, tcp.num_layers, Window::full(&proc.tile));
  proc.parse_tile_parts(&mut r_direct, &mut iter).unwrap();
  proc.decompress(&tcp, &[(8, false)], &coder, 0).unwrap();

  assert_eq!(proc.buffers[0], tile1);
  // tile1 occupies columns [8,16) of every row in the 16-wide image, so
  // compare row by row rather than assuming a contiguous byte range.
  let full_data = seq.image.components[0].data();
  for y in 0..8usize {
    assert_eq!(full_data[y * 16 + 8..y * 16 + 16], tile1[y * 8..y * 8 + 8]);
  }
}

/// Invariant 8: samples inside a windowed decode's region match a full
/// decode of the same tile; the precinct outside the window is simply not
/// visited (its code-block keeps its all-zero initial state).
#[test]
fn windowed_decode_matches_full_decode_inside_window() {
  let mut tccp = jp2k_core::coding_params::TileComponentCodingParams::default();
  tccp.num_resolutions = 1;
  tccp.precinct_exponents = vec![(3, 3)]; // precinct width/height = 8, splits a 16-wide tile into 2 precincts.

  let bounds = Rect::new(0, 0, 16, 8);
  let coder = RawPassThroughCoder;
  let tcp = TileCodingParams::new(1, 1);

  // Full decode.
  let mut full = TileProcessor::init(bounds, &[(1, 1)], &[tccp.clone()]).unwrap();
  let samples: Vec<i32> = (0..128).collect();
  full.pre_compress(vec![samples.clone()]).unwrap();
  full.compress(&tcp, &[(8, false)], &coder, 1_000_000).unwrap();
  let mut stream = MemStream::new();
  let mut w_iter = PacketIter::new(&full.tile, &[], tcp.progression, tcp.num_layers, Window::full(&full.tile));
  full.write_tile_parts(&mut stream, &mut w_iter).unwrap();
  let bytes = stream.into_inner();

  let mut full_dec = TileProcessor::init(bounds, &[(1, 1)], &[tccp.clone()]).unwrap();
  let mut r1 = MemStream::new();
  for b in &bytes {
    r1.write_u8(*b).unwrap();
  }
  r1.seek(0).unwrap();
  let mut full_iter = PacketIter::new(&full_dec.tile, &[], tcp.progression, tcp.num_layers, Window::full(&full_dec.tile));
  full_dec.parse_tile_parts(&mut r1, &mut full_iter).unwrap();
  full_dec.decompress(&tcp, &[(8, false)], &coder, 0).unwrap();

  // Windowed decode restricted to the left half (x in [0, 8)).
  let mut win_dec = TileProcessor::init(bounds, &[(1, 1)], &[tccp]).unwrap();
  let mut r2 = MemStream::new();
  for b in &bytes {
    r2.write_u8(*b).unwrap();
  }
  r2.seek(0).unwrap();
  let left_window = Window { x0: 0, y0: 0, x1: 8, y1: 8 };
  let mut win_iter = PacketIter::new(&win_dec.tile, &[], tcp.progression, tcp.num_layers, left_window);
  win_dec.parse_tile_parts(&mut r2, &mut win_iter).unwrap();
  win_dec.decompress(&tcp, &[(8, false)], &coder, 0).unwrap();

  // Inside the window (left 8 columns of every row) both decodes agree.
  for y in 0..8 {
    let row_start = y * 16;
    assert_eq!(
      win_dec.buffers[0][row_start..row_start + 8],
      full_dec.buffers[0][row_start..row_start + 8]
    );
  }
}
