//! Pixel conversion boundary.
//!
//! Decoded pictures arrive in whatever layout the codec produces. They leave
//! the engine as tightly packed RGB24 rows in the caller's buffer. Building
//! a native scaling context is expensive, so each stream keeps one
//! [`ConversionCache`] keyed by [`ScalerKey`] and only rebuilds when the
//! picture geometry or layout changes.

use crate::{backend::DecodedPicture, configuration::RowOrder, metadata::NativePixelFormat};

/// Bytes per output pixel.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Pixel layout written to the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel.
    #[default]
    Rgb24,
}

/// Everything a scaling context depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalerKey {
    /// Native layout of the source picture.
    pub source_format: NativePixelFormat,
    /// Source width in pixels.
    pub source_width: u32,
    /// Source height in pixels.
    pub source_height: u32,
    /// Output layout.
    pub target_format: OutputFormat,
    /// Output width in pixels.
    pub target_width: u32,
    /// Output height in pixels.
    pub target_height: u32,
}

impl ScalerKey {
    /// Key for converting `picture` to RGB24 at the given output size.
    pub fn for_picture<P: DecodedPicture>(picture: &P, target_width: u32, target_height: u32) -> Self {
        Self {
            source_format: picture.pixel_format(),
            source_width: picture.width(),
            source_height: picture.height(),
            target_format: OutputFormat::Rgb24,
            target_width,
            target_height,
        }
    }
}

/// A single-entry cache of conversion contexts.
#[derive(Debug)]
pub(crate) struct ConversionCache<C> {
    entry: Option<(ScalerKey, C)>,
    builds: u64,
}

impl<C> Default for ConversionCache<C> {
    fn default() -> Self {
        Self {
            entry: None,
            builds: 0,
        }
    }
}

impl<C> ConversionCache<C> {
    /// Return the cached converter for `key`, building a new one first if
    /// the cache is empty or holds a different key.
    pub(crate) fn get_or_build<E>(
        &mut self,
        key: ScalerKey,
        build: impl FnOnce() -> Result<C, E>,
    ) -> Result<&mut C, E> {
        let entry = match self.entry.take() {
            Some((cached, converter)) if cached == key => (cached, converter),
            _ => {
                let converter = build()?;
                self.builds += 1;
                log::debug!(
                    "Built conversion context #{} {}x{} ({:?}) -> {}x{} {:?}",
                    self.builds,
                    key.source_width,
                    key.source_height,
                    key.source_format,
                    key.target_width,
                    key.target_height,
                    key.target_format,
                );
                (key, converter)
            }
        };
        Ok(&mut self.entry.insert(entry).1)
    }

    /// Number of contexts built since the cache was created.
    #[cfg(test)]
    pub(crate) fn builds(&self) -> u64 {
        self.builds
    }
}

/// Copy `height` rows of `row_bytes` bytes from a strided plane into a
/// tightly packed buffer, optionally reversing the row order.
///
/// Native frames frequently carry per-row padding (stride > width × 3);
/// this strips it.
pub fn copy_packed_rows(
    source: &[u8],
    source_stride: usize,
    output: &mut [u8],
    row_bytes: usize,
    height: usize,
    row_order: RowOrder,
) {
    if source_stride == row_bytes && row_order == RowOrder::TopDown {
        let total = row_bytes * height;
        output[..total].copy_from_slice(&source[..total]);
        return;
    }

    for row in 0..height {
        let source_row = match row_order {
            RowOrder::TopDown => row,
            RowOrder::BottomUp => height - 1 - row,
        };
        let source_start = source_row * source_stride;
        let output_start = row * row_bytes;
        output[output_start..output_start + row_bytes]
            .copy_from_slice(&source[source_start..source_start + row_bytes]);
    }
}
