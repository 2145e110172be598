use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use image::GrayImage;
use ndarray::{Array3, s};
use thiserror::Error;
use tracing::info;

use crate::progress::ProgressSink;

/// Directories with fewer slice images than this are rejected.
pub const MIN_SLICE_COUNT: usize = 64;

const SLICE_EXTENSIONS: [&str; 3] = ["tif", "tiff", "png"];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("at least {MIN_SLICE_COUNT} slice images required, found {found}")]
    TooFewSlices { found: usize },

    #[error("inconsistent slice dimensions")]
    InconsistentDimensions,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// An ordered stack of 2D slice files that assembles into one volume.
pub struct SliceStack {
    directory: PathBuf,
    files: Vec<PathBuf>,
}

impl SliceStack {
    /// Collect and lexically sort the slice images in `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or holds fewer
    /// than [`MIN_SLICE_COUNT`] slice images.
    pub fn scan(directory: impl AsRef<Path>) -> Result<Self, LoadError> {
        let directory = directory.as_ref().to_path_buf();
        let mut files: Vec<PathBuf> = fs::read_dir(&directory)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        SLICE_EXTENSIONS
                            .iter()
                            .any(|known| ext.eq_ignore_ascii_case(known))
                    })
            })
            .collect();
        files.sort();

        if files.len() < MIN_SLICE_COUNT {
            return Err(LoadError::TooFewSlices { found: files.len() });
        }
        Ok(Self { directory, files })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read every slice as 8-bit grayscale and stack along a new leading
    /// axis, emitting one progress event per file.
    pub fn load(&self, progress: &ProgressSink) -> Result<Array3<u8>, LoadError> {
        let total = self.files.len();
        let mut slices = Vec::with_capacity(total);
        for (index, file) in self.files.iter().enumerate() {
            progress.emit(index, total, "File loading");
            slices.push(image::open(file)?.to_luma8());
        }

        Self::validate_dimensions(&slices)?;
        let volume = Self::build_volume_array(&slices);
        info!(directory = %self.directory.display(), slices = total, "volume loading succeeded");
        Ok(volume)
    }

    /// Run `load` on a dedicated worker thread.
    ///
    /// The worker is fully synchronous internally; completion is the join
    /// value. Callers are responsible for not starting a second load while
    /// one is in flight.
    pub fn spawn(self, progress: ProgressSink) -> JoinHandle<Result<Array3<u8>, LoadError>> {
        thread::spawn(move || self.load(&progress))
    }

    fn validate_dimensions(slices: &[GrayImage]) -> Result<(), LoadError> {
        let Some(first) = slices.first() else {
            return Err(LoadError::TooFewSlices { found: 0 });
        };
        if slices.iter().any(|slice| slice.dimensions() != first.dimensions()) {
            return Err(LoadError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[GrayImage]) -> Array3<u8> {
        let (width, height) = slices[0].dimensions();
        let mut volume = Array3::<u8>::zeros((slices.len(), height as usize, width as usize));

        for (index, slice) in slices.iter().enumerate() {
            let mut plane = volume.slice_mut(s![index, .., ..]);
            for ((y, x), voxel) in plane.indexed_iter_mut() {
                *voxel = slice.get_pixel(x as u32, y as u32)[0];
            }
        }
        volume
    }
}
