//! Error kinds for the code-stream and file-format engines.
//!
//! Each variant carries the single public meaning spec'd for it; marker and
//! box parsers propagate these with `?` instead of the teacher's
//! `OPJ_BOOL` + `opj_event_mgr` callback pair.

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("corrupt code-stream at offset {offset}: {detail}")]
  CorruptCodeStream { offset: u64, detail: String },

  #[error("corrupt box {box_type:?} at offset {offset}: {detail}")]
  CorruptBox {
    offset: u64,
    box_type: [u8; 4],
    detail: String,
  },

  #[error("invalid parameters: {0}")]
  InvalidParameters(String),

  #[error("unsupported feature: {0}")]
  UnsupportedFeature(String),

  #[error("stream I/O failure: {0}")]
  IoFailure(String),

  #[error("tile {tile_index} truncated: {detail}")]
  TruncatedTile { tile_index: u32, detail: String },

  #[error("out of memory allocating {0}")]
  OutOfMemory(String),
}

impl Error {
  pub fn corrupt(offset: u64, detail: impl Into<String>) -> Self {
    Error::CorruptCodeStream {
      offset,
      detail: detail.into(),
    }
  }

  pub fn corrupt_box(offset: u64, box_type: [u8; 4], detail: impl Into<String>) -> Self {
    Error::CorruptBox {
      offset,
      box_type,
      detail: detail.into(),
    }
  }

  pub fn invalid(detail: impl Into<String>) -> Self {
    Error::InvalidParameters(detail.into())
  }

  pub fn unsupported(detail: impl Into<String>) -> Self {
    Error::UnsupportedFeature(detail.into())
  }
}
