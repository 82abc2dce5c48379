//! Image and component data model, spec.md §3.
//!
//! Grounded on the teacher's `src/image.rs` (`opj_image_comp::copy_props`,
//! `set_dims`, `alloc_data`, `clip`), rewritten over owned `Vec<i32>` sample
//! buffers instead of `opj_image_data_alloc`/raw pointers, per the arena
//! design note in spec.md §9.

use crate::error::{Error, Result};
use crate::geometry::{subsampled_dims, Rect};

/// One image component: subsampling, precision, signedness and samples.
#[derive(Debug, Clone)]
pub struct Component {
  pub dx: u32,
  pub dy: u32,
  pub w: u32,
  pub h: u32,
  pub x0: u32,
  pub y0: u32,
  pub prec: u32,
  pub signed: bool,
  /// Region-of-interest shift applied during quantisation (spec.md §3 TCCP
  /// field, kept alongside the component since it travels with the image
  /// through repeated encode/decode).
  pub resno_decoded: u32,
  data: Vec<i32>,
}

impl Component {
  pub fn new(dx: u32, dy: u32, w: u32, h: u32, prec: u32, signed: bool) -> Self {
    Self {
      dx,
      dy,
      w,
      h,
      x0: 0,
      y0: 0,
      prec,
      signed,
      resno_decoded: 0,
      data: vec![0i32; (w as usize) * (h as usize)],
    }
  }

  /// Copy just the component properties, not the data (teacher's
  /// `copy_props`).
  pub fn copy_props(&mut self, other: &Component) {
    self.dx = other.dx;
    self.dy = other.dy;
    self.x0 = other.x0;
    self.y0 = other.y0;
    self.prec = other.prec;
    self.signed = other.signed;
    self.resno_decoded = other.resno_decoded;
    self.set_dims(other.w, other.h);
  }

  pub fn set_dims(&mut self, w: u32, h: u32) {
    if self.w == w && self.h == h {
      return;
    }
    self.w = w;
    self.h = h;
    self.data = vec![0i32; (w as usize) * (h as usize)];
  }

  pub fn data(&self) -> &[i32] {
    &self.data
  }

  pub fn data_mut(&mut self) -> &mut [i32] {
    &mut self.data
  }

  pub fn set_data(&mut self, data: &[i32]) -> Result<()> {
    if data.len() != self.data.len() {
      return Err(Error::invalid(format!(
        "component data length {} does not match {}x{}",
        data.len(),
        self.w,
        self.h
      )));
    }
    self.data.copy_from_slice(data);
    Ok(())
  }

  /// Clip component sample values to the representable range for `prec`,
  /// matching the teacher's `opj_image_comp::clip`.
  pub fn clip(&mut self) {
    let (min, max) = Self::range(self.prec, self.signed);
    for v in self.data.iter_mut() {
      let clamped = (*v as i64).clamp(min, max);
      *v = clamped as i32;
    }
  }

  fn range(prec: u32, signed: bool) -> (i64, i64) {
    match (prec, signed) {
      (0..=31, false) => (0, (1i64 << prec) - 1),
      (0..=31, true) => {
        let max = (1i64 << (prec - 1)) - 1;
        (-max - 1, max)
      }
      _ => (i32::MIN as i64, i32::MAX as i64),
    }
  }
}

/// An image: a canvas rectangle plus up to `MAX_COMPONENTS` components,
/// per spec.md §3.
#[derive(Debug, Clone)]
pub struct Image {
  pub bounds: Rect,
  pub components: Vec<Component>,
}

impl Image {
  pub fn new(bounds: Rect, components: Vec<Component>) -> Result<Self> {
    if bounds.is_empty() {
      return Err(Error::invalid("image bounds must be non-empty (x1>x0, y1>y0)"));
    }
    if components.is_empty() || components.len() as u32 > crate::consts::MAX_COMPONENTS {
      return Err(Error::invalid(format!(
        "component count {} out of range [1,{}]",
        components.len(),
        crate::consts::MAX_COMPONENTS
      )));
    }
    for (i, c) in components.iter().enumerate() {
      if c.dx == 0 || c.dy == 0 {
        return Err(Error::invalid(format!(
          "component {i} has zero subsampling factor"
        )));
      }
      let (w, h) = subsampled_dims(bounds, c.dx, c.dy);
      if c.w != w || c.h != h {
        return Err(Error::invalid(format!(
          "component {i} dims {}x{} do not match subsampled bounds {}x{}",
          c.w, c.h, w, h
        )));
      }
    }
    Ok(Self { bounds, components })
  }

  pub fn num_components(&self) -> usize {
    self.components.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn comp(dx: u32, dy: u32) -> Component {
    let bounds = Rect::new(0, 0, 16, 16);
    let (w, h) = subsampled_dims(bounds, dx, dy);
    Component::new(dx, dy, w, h, 8, false)
  }

  #[test]
  fn image_validates_component_dims() {
    let bounds = Rect::new(0, 0, 16, 16);
    let img = Image::new(bounds, vec![comp(1, 1), comp(2, 2)]);
    assert!(img.is_ok());
  }

  #[test]
  fn image_rejects_mismatched_dims() {
    let bounds = Rect::new(0, 0, 16, 16);
    let mut bad = comp(1, 1);
    bad.w = 4;
    assert!(Image::new(bounds, vec![bad]).is_err());
  }

  #[test]
  fn clip_respects_signed_precision() {
    let mut c = Component::new(1, 1, 2, 1, 8, true);
    c.data_mut().copy_from_slice(&[1000, -1000]);
    c.clip();
    assert_eq!(c.data(), &[127, -128]);
  }
}
