//! Marker ids, box types and the standard-mandated numeric limits quoted in
//! spec.md §4.2.1/§6. Grounded on the marker constants scattered through the
//! teacher's `j2k.rs` (e.g. its `J2K_MS_SOC`/`J2K_MS_SIZ`/... constants) and
//! on ISO/IEC 15444-1 Annex A, condensed here into one `TryFromPrimitive`
//! enum instead of a flat `const` list, since every marker parser needs the
//! id <-> enum round trip the teacher does by hand with a big `match`.

use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const SOC_MAGIC: u16 = 0xFF4F;
pub const EOC_MAGIC: u16 = 0xFFD9;
pub const SOD_MAGIC: u16 = 0xFF93;

pub const MARKER_LENGTH_BYTES: u16 = 2;

pub const MAX_COMPONENTS: u32 = 16_384;
pub const MAX_TILES: u32 = 65_535;
pub const MAX_RESOLUTIONS: u32 = 33;
pub const MIN_RESOLUTIONS: u32 = 1;
pub const MAX_GUARD_BITS: u8 = 7;
pub const MIN_CBLK_DIM: u32 = 4;
pub const MAX_CBLK_DIM: u32 = 1024;
pub const MAX_CBLK_AREA_EXP: u32 = 12; // product of dims <= 4096 => sum of exponents <= 12
pub const MAX_CBLK_EXP_SUM: u32 = 10; // cblkw_exp - 2 + cblkh_exp - 2 <= 10, per spec.md §7

/// Marker identifiers, value is the big-endian `0xFFxx` marker code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum MarkerId {
  Soc = 0xFF4F,
  Siz = 0xFF51,
  Cod = 0xFF52,
  Coc = 0xFF53,
  Tlm = 0xFF55,
  Plm = 0xFF57,
  Plt = 0xFF58,
  Qcd = 0xFF5C,
  Qcc = 0xFF5D,
  Rgn = 0xFF5E,
  Poc = 0xFF5F,
  Ppm = 0xFF60,
  Ppt = 0xFF61,
  Crg = 0xFF63,
  Com = 0xFF64,
  Cap = 0xFF50,
  Sot = 0xFF90,
  Sop = 0xFF91,
  Eph = 0xFF92,
  Sod = 0xFF93,
  Eoc = 0xFFD9,
  Mct = 0xFF74,
  Mcc = 0xFF75,
  Mco = 0xFF77,
  Cbd = 0xFF78,
}

/// Admissible marker-reading states, modeled as a bitmask per spec.md §4.2
/// and the design note "state-machine dispatch for markers".
bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct MarkerState: u16 {
    const MH_SOC   = 0x0001;
    const MH_SIZ   = 0x0002;
    const MH       = 0x0004;
    const TPH_SOT  = 0x0008;
    const TPH      = 0x0010;
    const DATA     = 0x0020;
    const EOC      = 0x0040;
    const NO_EOC   = 0x0080;
  }
}

/// JP2/JPH box type codes (4-byte ASCII, spec.md §4.7/§6).
pub mod box_type {
  pub const JP: [u8; 4] = *b"jP  ";
  pub const FTYP: [u8; 4] = *b"ftyp";
  pub const JP2H: [u8; 4] = *b"jp2h";
  pub const IHDR: [u8; 4] = *b"ihdr";
  pub const BPCC: [u8; 4] = *b"bpcc";
  pub const COLR: [u8; 4] = *b"colr";
  pub const PCLR: [u8; 4] = *b"pclr";
  pub const CMAP: [u8; 4] = *b"cmap";
  pub const CDEF: [u8; 4] = *b"cdef";
  pub const RES: [u8; 4] = *b"res ";
  pub const XML: [u8; 4] = *b"xml ";
  pub const UUID: [u8; 4] = *b"uuid";
  pub const ASOC: [u8; 4] = *b"asoc";
  pub const JP2C: [u8; 4] = *b"jp2c";
}

pub const JP2_SIGNATURE_CONTENT: [u8; 4] = [0x0D, 0x0A, 0x87, 0x0A];

/// Progression orders, spec.md §4.3. Wire value matches the single-byte
/// `Sord`/`Progression` field in COD/POC segments (Annex A Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ProgressionOrder {
  Lrcp = 0,
  Rlcp = 1,
  Rpcl = 2,
  Pcrl = 3,
  Cprl = 4,
}

impl ProgressionOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      ProgressionOrder::Lrcp => "LRCP",
      ProgressionOrder::Rlcp => "RLCP",
      ProgressionOrder::Rpcl => "RPCL",
      ProgressionOrder::Pcrl => "PCRL",
      ProgressionOrder::Cprl => "CPRL",
    }
  }
}

/// Wavelet transform id from COD/COC `SPcod.transformation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveletKind {
  /// 5/3 reversible (lossless-capable).
  Reversible5x3,
  /// 9/7 irreversible (lossy).
  Irreversible9x7,
}

/// MCT mode, spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MctMode {
  #[default]
  Off,
  Fixed,
  Custom,
}

/// Quantisation style, spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantStyle {
  #[default]
  NoQnt,
  SiQnt,
  SeQnt,
}
