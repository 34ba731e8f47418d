//! Sharp integer upsampling of stimulus images
//!
//! Each source pixel is replicated `factor` times along both axes and the
//! result is center-cropped to the target side. With the defaults a 10x10
//! stimulus becomes 30x30 and then 28x28 (one pixel trimmed from each edge).
//! No interpolation: pixel boundaries stay sharp, no blended intermediate
//! intensities are introduced.

use crate::reduce;
use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, info};

/// Source stimulus side (pixels)
pub const SOURCE_SIDE: usize = 10;
/// Replication factor per axis
pub const SCALE_FACTOR: usize = 3;
/// Output stimulus side (pixels)
pub const TARGET_SIDE: usize = 28;
/// Output stimulus length when flattened
pub const TARGET_PIXELS: usize = TARGET_SIDE * TARGET_SIDE;

/// Integer-replication upsampler with centered crop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharpUpsampler {
    source_side: usize,
    factor: usize,
    target_side: usize,
}

impl Default for SharpUpsampler {
    fn default() -> Self {
        Self {
            source_side: SOURCE_SIDE,
            factor: SCALE_FACTOR,
            target_side: TARGET_SIDE,
        }
    }
}

impl SharpUpsampler {
    /// Create an upsampler
    ///
    /// # Errors
    /// Returns error if the target does not fit the replicated image or the
    /// border to trim is not split evenly between opposite edges
    pub fn new(source_side: usize, factor: usize, target_side: usize) -> Result<Self> {
        let scaled = source_side * factor;
        if source_side == 0 || factor == 0 || target_side == 0 || target_side > scaled {
            return Err(Error::InvalidInput(format!(
                "cannot crop {target_side}x{target_side} from {source_side}x{source_side} scaled by {factor}"
            )));
        }
        if (scaled - target_side) % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "border of {} pixels cannot be centered",
                scaled - target_side
            )));
        }
        Ok(Self {
            source_side,
            factor,
            target_side,
        })
    }

    /// Flattened output length
    #[must_use]
    pub const fn output_len(&self) -> usize {
        self.target_side * self.target_side
    }

    /// Upsample one flattened, row-major source image
    ///
    /// # Errors
    /// Returns error if the image does not have `source_side²` pixels
    pub fn apply(&self, image: &[f64]) -> Result<Vec<f64>> {
        let expected = self.source_side * self.source_side;
        if image.len() != expected {
            return Err(Error::InvalidInput(format!(
                "expected {expected} pixels, got {}",
                image.len()
            )));
        }

        let offset = (self.source_side * self.factor - self.target_side) / 2;
        let mut out = Vec::with_capacity(self.output_len());
        for row in 0..self.target_side {
            let src_row = (row + offset) / self.factor;
            for col in 0..self.target_side {
                let src_col = (col + offset) / self.factor;
                out.push(image[src_row * self.source_side + src_col]);
            }
        }
        Ok(out)
    }

    /// Upsample every row of a batch, one flattened image per row
    ///
    /// # Errors
    /// Returns error if a row has the wrong number of pixels
    pub fn apply_batch(&self, pixels: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((pixels.nrows(), self.output_len()));
        for (src, mut dst) in pixels.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
            let upsampled = self.apply(&src.to_vec())?;
            dst.assign(&ArrayView1::from(upsampled.as_slice()));
        }
        debug!(
            images = pixels.nrows(),
            side = self.target_side,
            "Upsampled with integer scaling"
        );
        Ok(out)
    }
}

/// Divide every value by the batch-wide maximum.
///
/// One global scale for the whole batch preserves relative intensities
/// between images. Returns the maximum used.
///
/// # Errors
/// Returns [`Error::EmptyDataset`] for an empty batch and
/// [`Error::InvalidInput`] if the maximum is not a positive finite number
pub fn normalize_by_global_max(batch: &mut Array2<f64>) -> Result<f64> {
    let values: Array1<f64> = batch.iter().copied().collect();
    let global_max = reduce::max(values.view())
        .ok_or_else(|| Error::EmptyDataset("no stimuli to normalize".to_string()))?;
    if !global_max.is_finite() || global_max <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "cannot normalize by global maximum {global_max}"
        )));
    }
    batch.mapv_inplace(|v| v / global_max);
    info!(
        global_max,
        min = reduce::min(values.view()).map(|m| m / global_max),
        "Normalized stimuli"
    );
    Ok(global_max)
}
