use std::path::PathBuf;

use ndarray::Array3;
use tracing::debug;

use crate::config::Config;
use crate::export::VolumeExporter;
use crate::registration::Registration;
use crate::trace::Trace;
use crate::volume::{self, Volume, VolumeError};

/// All volumes belonging to one fixed/floating pair, with the fixed X-ray
/// CT volume as the reference frame.
pub struct Study {
    pub ct_volume: Volume,
    pub pet_ct_volume: Volume,
    pub pet_ct_volume_rescaled: Volume,
    pub ct_trace: Trace,
    config: Config,
}

impl Study {
    pub fn new(config: Config) -> Self {
        Self {
            ct_volume: Volume::new(config),
            pet_ct_volume: Volume::new(config),
            pet_ct_volume_rescaled: Volume::new(config),
            ct_trace: Trace::new(),
            config,
        }
    }

    pub fn clear_volumes(&mut self) {
        self.ct_volume.clear();
        self.pet_ct_volume.clear();
    }

    /// Install the fixed CT volume and size the trace grid to match.
    pub fn attach_ct(&mut self, volume: Array3<u8>) {
        self.ct_trace.init_from_volume(volume.dim());
        self.ct_volume.init_from_volume(volume);
    }

    /// Install the floating PET-CT volume, stretched over the full 8-bit
    /// range. Its resolution starts out equal to the CT resolution.
    pub fn attach_pet_ct(&mut self, volume: Array3<u8>) {
        let stretched = volume::stretch_intensity(&volume);
        self.pet_ct_volume.init_from_volume(stretched);
        self.pet_ct_volume.resolution = self.ct_volume.resolution;
    }

    /// Resample the floating volume into the fixed volume's voxel
    /// resolution and keep the result alongside the raw data.
    pub fn rescale_pet_ct_volume(&mut self) -> Result<&Volume, VolumeError> {
        self.pet_ct_volume.scaling_factor =
            self.pet_ct_volume.resolution / self.ct_volume.resolution;

        let target_shape = self.pet_ct_volume.scaled_shape()?;
        let rescaled = self.pet_ct_volume.rescaled(target_shape)?;
        self.pet_ct_volume_rescaled.init_from_volume(rescaled);
        debug!(shape = ?target_shape, "floating volume rescaled");
        Ok(&self.pet_ct_volume_rescaled)
    }

    /// Build an exporter carrying a snapshot of `registration`, or `None`
    /// while either volume is still missing (idle-state export is a no-op,
    /// not an error).
    pub fn begin_export(
        &self,
        dest: impl Into<PathBuf>,
        registration: &Registration,
    ) -> Option<VolumeExporter> {
        let target_shape = self.ct_volume.grid()?.dim();
        let floating = self.pet_ct_volume_rescaled.grid()?;
        Some(VolumeExporter::new(
            floating,
            registration.snapshot(),
            dest.into(),
            target_shape,
            self.config,
        ))
    }
}
