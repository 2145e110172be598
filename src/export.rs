use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use image::{ImageBuffer, Luma};
use ndarray::{Array3, Axis, Zip, s};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::interpolator::Interpolator;
use crate::progress::ProgressSink;
use crate::registration::RegistrationSnapshot;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Bakes a registration snapshot into a private copy of the floating
/// volume and writes the result as one image per depth slice.
///
/// The transform is applied as flip → shift → rotate → fit-to-target, the
/// same ordering the renderer composes interactively.
pub struct VolumeExporter {
    floating: Array3<u8>,
    snapshot: RegistrationSnapshot,
    dest: PathBuf,
    target_shape: (usize, usize, usize),
    skip_size: usize,
}

impl VolumeExporter {
    /// The floating volume is deep-copied here, before any worker starts,
    /// so the caller may keep adjusting its own data during the export.
    pub fn new(
        floating: &Array3<u8>,
        snapshot: RegistrationSnapshot,
        dest: impl Into<PathBuf>,
        target_shape: (usize, usize, usize),
        config: Config,
    ) -> Self {
        Self {
            floating: floating.clone(),
            snapshot,
            dest: dest.into(),
            target_shape,
            skip_size: config.skip_size,
        }
    }

    pub fn dest(&self) -> &PathBuf {
        &self.dest
    }

    /// Flip, shift, rotate and crop/pad the volume, then write the slices.
    /// Returns the number of slices written.
    pub fn run(&self, progress: &ProgressSink) -> Result<usize, ExportError> {
        let flipped = self.flipped();
        let shifted = self.shifted(flipped);
        progress.emit(0, 2, "Rotating the volume");
        let rotated = self.rotated(shifted);
        let fitted = self.fit_to_target(rotated);
        progress.emit(1, 2, "Saving the volume");
        self.save_slices(&fitted, progress)
    }

    /// Run the whole export on a dedicated worker thread.
    ///
    /// Callers are responsible for not starting a second export while one
    /// is in flight.
    pub fn spawn(self, progress: ProgressSink) -> JoinHandle<Result<usize, ExportError>> {
        thread::spawn(move || self.run(&progress))
    }

    fn flipped(&self) -> Array3<u8> {
        let mut volume = self.floating.clone();
        let signs = [self.snapshot.z_flip, self.snapshot.y_flip, self.snapshot.x_flip];
        for (axis, sign) in signs.into_iter().enumerate() {
            if sign < 0 {
                volume.invert_axis(Axis(axis));
            }
        }
        volume
    }

    /// Integer translation with zero fill; content never wraps around.
    fn shifted(&self, volume: Array3<u8>) -> Array3<u8> {
        let stride = self.skip_size as isize;
        let offsets = [
            self.snapshot.z as isize * stride,
            self.snapshot.y as isize * stride,
            self.snapshot.x as isize * stride,
        ];

        let shape = volume.dim();
        let extents = [shape.0 as isize, shape.1 as isize, shape.2 as isize];
        let mut dst = [(0, 0); 3];
        let mut src = [(0, 0); 3];
        for axis in 0..3 {
            let (extent, offset) = (extents[axis], offsets[axis]);
            dst[axis] = ((-offset).max(0), (extent - offset).min(extent));
            src[axis] = (offset.max(0), (extent + offset).min(extent));
            if dst[axis].1 <= dst[axis].0 {
                // Shifted completely out of frame.
                return Array3::zeros(volume.raw_dim());
            }
        }

        let mut shifted = Array3::zeros(volume.raw_dim());
        shifted
            .slice_mut(s![
                dst[0].0..dst[0].1,
                dst[1].0..dst[1].1,
                dst[2].0..dst[2].1
            ])
            .assign(&volume.slice(s![
                src[0].0..src[0].1,
                src[1].0..src[1].1,
                src[2].0..src[2].1
            ]));
        shifted
    }

    fn rotated(&self, volume: Array3<u8>) -> Array3<u8> {
        let mut rotated = Array3::zeros(volume.raw_dim());
        Zip::from(rotated.axis_iter_mut(Axis(0)))
            .and(volume.axis_iter(Axis(0)))
            .par_for_each(|mut out, plane| {
                out.assign(&Interpolator::rotate_slice(plane, self.snapshot.angle as f64));
            });
        rotated
    }

    /// Symmetric centered crop/pad into the target shape, with any odd
    /// leftover placed on the trailing side.
    fn fit_to_target(&self, volume: Array3<u8>) -> Array3<u8> {
        let source = volume.dim();
        let sources = [source.0 as isize, source.1 as isize, source.2 as isize];
        let targets = [
            self.target_shape.0 as isize,
            self.target_shape.1 as isize,
            self.target_shape.2 as isize,
        ];

        let mut dst = [(0, 0); 3];
        let mut src = [(0, 0); 3];
        for axis in 0..3 {
            let difference = targets[axis] - sources[axis];
            if difference >= 0 {
                let leading = difference.div_euclid(2);
                dst[axis] = (leading, leading + sources[axis]);
                src[axis] = (0, sources[axis]);
            } else {
                let leading = (-difference).div_euclid(2);
                dst[axis] = (0, targets[axis]);
                src[axis] = (leading, leading + targets[axis]);
            }
        }

        let mut fitted = Array3::zeros(self.target_shape);
        fitted
            .slice_mut(s![
                dst[0].0..dst[0].1,
                dst[1].0..dst[1].1,
                dst[2].0..dst[2].1
            ])
            .assign(&volume.slice(s![
                src[0].0..src[0].1,
                src[1].0..src[1].1,
                src[2].0..src[2].1
            ]));
        fitted
    }

    /// Write `img{index:04}.tif` per depth slice, in depth order.
    ///
    /// The destination directory is created if absent. Existing files are
    /// only overwritten, never removed, so stale slices beyond the new
    /// count may remain.
    fn save_slices(&self, volume: &Array3<u8>, progress: &ProgressSink) -> Result<usize, ExportError> {
        fs::create_dir_all(&self.dest)?;
        if fs::read_dir(&self.dest)?.next().is_some() {
            warn!(dest = %self.dest.display(), "destination directory is not empty; stale slices are not removed");
        }

        let (depth, height, width) = volume.dim();
        for (index, plane) in volume.axis_iter(Axis(0)).enumerate() {
            progress.emit(index, depth, "Writing slice images");
            let image = ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
                Luma([plane[[y as usize, x as usize]]])
            });
            image.save(self.dest.join(format!("img{index:04}.tif")))?;
        }

        info!(dest = %self.dest.display(), slices = depth, "volume export finished");
        Ok(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_config() -> Config {
        Config {
            skip_size: 1,
            ..Config::default()
        }
    }

    fn marker_volume(shape: (usize, usize, usize), marker: (usize, usize, usize)) -> Array3<u8> {
        let mut volume = Array3::zeros(shape);
        volume[[marker.0, marker.1, marker.2]] = 255;
        volume
    }

    fn exporter(volume: &Array3<u8>, snapshot: RegistrationSnapshot, config: Config) -> VolumeExporter {
        VolumeExporter::new(volume, snapshot, "unused", volume.dim(), config)
    }

    fn identity_snapshot() -> RegistrationSnapshot {
        crate::registration::Registration::new().snapshot()
    }

    #[test]
    fn test_shift_moves_content_and_zero_fills() {
        let volume = marker_volume((8, 8, 8), (7, 0, 0));
        let mut snapshot = identity_snapshot();
        snapshot.z = 5;

        let shifted = exporter(&volume, snapshot, unit_config()).shifted(volume.clone());
        assert_eq!(shifted[[2, 0, 0]], 255);
        assert_eq!(shifted[[7, 0, 0]], 0);
        assert!(shifted.slice(s![3.., .., ..]).iter().all(|&v| v == 0));
    }

    #[test]
    fn test_shift_respects_skip_size() {
        let volume = marker_volume((8, 8, 8), (6, 0, 0));
        let mut snapshot = identity_snapshot();
        snapshot.z = 2;

        let config = Config {
            skip_size: 2,
            ..Config::default()
        };
        let shifted = exporter(&volume, snapshot, config).shifted(volume.clone());
        assert_eq!(shifted[[2, 0, 0]], 255);
    }

    #[test]
    fn test_shift_beyond_extent_clears_volume() {
        let volume = marker_volume((4, 4, 4), (0, 0, 0));
        let mut snapshot = identity_snapshot();
        snapshot.x = 10;

        let shifted = exporter(&volume, snapshot, unit_config()).shifted(volume.clone());
        assert!(shifted.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_flip_reverses_axis() {
        let volume = marker_volume((4, 4, 4), (0, 1, 2));
        let mut snapshot = identity_snapshot();
        snapshot.z_flip = -1;

        let flipped = exporter(&volume, snapshot, unit_config()).flipped();
        assert_eq!(flipped[[3, 1, 2]], 255);
        assert_eq!(flipped[[0, 1, 2]], 0);
    }

    #[test]
    fn test_fit_pads_with_odd_leftover_trailing() {
        let volume = marker_volume((4, 4, 4), (0, 0, 0));
        let exporter = VolumeExporter::new(
            &volume,
            identity_snapshot(),
            "unused",
            (7, 4, 4),
            unit_config(),
        );

        let fitted = exporter.fit_to_target(volume.clone());
        assert_eq!(fitted.dim(), (7, 4, 4));
        // Leading pad of 1, trailing pad of 2.
        assert_eq!(fitted[[1, 0, 0]], 255);
        assert_eq!(fitted[[0, 0, 0]], 0);
    }

    #[test]
    fn test_fit_crops_with_odd_leftover_trailing() {
        let volume = marker_volume((7, 4, 4), (1, 0, 0));
        let exporter = VolumeExporter::new(
            &volume,
            identity_snapshot(),
            "unused",
            (4, 4, 4),
            unit_config(),
        );

        let fitted = exporter.fit_to_target(volume.clone());
        assert_eq!(fitted.dim(), (4, 4, 4));
        // Leading crop of 1, so the marker lands on the first slice.
        assert_eq!(fitted[[0, 0, 0]], 255);
    }
}
