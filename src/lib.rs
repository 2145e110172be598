//! # PET-CT registration library
//!
//! This crate aligns a floating PET-CT volume against a fixed X-ray CT
//! volume and composites both as semi-transparent RGBA voxel grids for
//! display.
//!
//! Volumes are built by stacking a directory of numbered 2D slice images
//! into an `ndarray` grid. The floating volume is resampled to the fixed
//! volume's voxel resolution, positioned interactively through a rigid
//! [`Registration`] (per-axis flips, voxel shifts, one in-plane rotation),
//! and finally baked into a new slice stack by the export pipeline, which
//! reproduces the interactive transform as one deterministic batch
//! operation. Annotated root traces can be rasterized into an RGBA mask
//! that is blended into the CT display buffer.
//!
//! Slice loading and exporting run on worker threads and report progress
//! through an mpsc channel; see [`progress::ProgressSink`].
//!
//! # Examples
//!
//! ## Registering a PET-CT volume and exporting the aligned slices
//!
//! ```no_run
//! # use petct_register::loader::SliceStack;
//! # use petct_register::progress::ProgressSink;
//! # use petct_register::{Config, Registration, Study};
//! let progress = ProgressSink::disconnected();
//! let mut study = Study::new(Config::default());
//!
//! let ct = SliceStack::scan("ct")?.load(&progress)?;
//! study.attach_ct(ct);
//! let pet_ct = SliceStack::scan("pet")?.load(&progress)?;
//! study.attach_pet_ct(pet_ct);
//! study.rescale_pet_ct_volume()?;
//!
//! let mut registration = Registration::new();
//! registration.update(Some(5), None, None, Some(90));
//!
//! if let Some(exporter) = study.begin_export("pet_registrated", &registration) {
//!     exporter.spawn(progress).join().unwrap()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compositor;
pub mod config;
pub mod export;
mod interpolator;
pub mod loader;
pub mod progress;
pub mod registration;
pub mod scene;
pub mod study;
pub mod trace;
pub mod volume;

pub use config::Config;
pub use registration::Registration;
pub use scene::Scene;
pub use study::Study;
pub use volume::Volume;
