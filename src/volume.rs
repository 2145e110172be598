use ndarray::Array3;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::interpolator::Interpolator;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("no volume data loaded")]
    Empty,
}

/// A dense `(Z, Y, X)` grid of 8-bit intensity voxels plus acquisition
/// metadata.
///
/// The grid shape is fixed once initialized; voxel values may be rewritten
/// but the shape only changes through an explicit resample. `clear`
/// discards the grid entirely and resets the metadata.
#[derive(Debug, Clone)]
pub struct Volume {
    grid: Option<Array3<u8>>,
    /// Physical units per voxel.
    pub resolution: f64,
    /// Ratio used to resample this volume into another volume's grid.
    pub scaling_factor: f64,
    default_resolution: f64,
}

impl Volume {
    pub fn new(config: Config) -> Self {
        Self {
            grid: None,
            resolution: config.default_resolution,
            scaling_factor: 1.0,
            default_resolution: config.default_resolution,
        }
    }

    pub fn clear(&mut self) {
        self.grid = None;
        self.resolution = self.default_resolution;
        self.scaling_factor = 1.0;
        debug!("volume data cleared");
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_none()
    }

    pub fn grid(&self) -> Option<&Array3<u8>> {
        self.grid.as_ref()
    }

    /// Get the dimensions of the volume (depth, height, width).
    pub fn shape(&self) -> Result<(usize, usize, usize), VolumeError> {
        Ok(self.grid.as_ref().ok_or(VolumeError::Empty)?.dim())
    }

    pub fn init_from_volume(&mut self, grid: Array3<u8>) {
        self.grid = Some(grid);
        debug!("volume data initialized");
    }

    /// Shape of this volume after resampling by its scaling factor.
    pub fn scaled_shape(&self) -> Result<(usize, usize, usize), VolumeError> {
        let (depth, height, width) = self.shape()?;
        let scale = |extent: usize| (extent as f64 * self.scaling_factor) as usize;
        Ok((scale(depth), scale(height), scale(width)))
    }

    /// Resample to `target_shape` and stretch the observed intensity range
    /// over the full 8-bit range.
    pub fn rescaled(&self, target_shape: (usize, usize, usize)) -> Result<Array3<u8>, VolumeError> {
        let grid = self.grid.as_ref().ok_or(VolumeError::Empty)?;
        let resized = Interpolator::resize(grid.view(), target_shape);
        Ok(rescale_intensity(&resized))
    }
}

/// Linearly map the observed min/max of `volume` onto `[0, 255]`.
pub(crate) fn rescale_intensity(volume: &Array3<f32>) -> Array3<u8> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &value in volume.iter() {
        min = min.min(value);
        max = max.max(value);
    }
    if !(max > min) {
        return Array3::zeros(volume.raw_dim());
    }
    let span = max - min;
    volume.mapv(|value| ((value - min) / span * 255.0) as u8)
}

/// 8-bit min/max contrast stretch, applied when a floating volume is
/// ingested from raw slice data.
pub fn stretch_intensity(volume: &Array3<u8>) -> Array3<u8> {
    let Some(&min) = volume.iter().min() else {
        return volume.clone();
    };
    let max = *volume.iter().max().unwrap_or(&min);
    if max == min {
        return Array3::zeros(volume.raw_dim());
    }
    let span = (max - min) as f32;
    volume.mapv(|value| ((value - min) as f32 / span * 255.0) as u8)
}
