use nalgebra::Matrix4;
use ndarray::{Array3, Array4, s};
use tracing::warn;

use crate::compositor::{self, GrayChannels};
use crate::config::Config;
use crate::registration::Registration;
use crate::volume::Volume;

/// Live display state: the subsampled volumes, their RGBA composite
/// buffers and the registration the renderer reads.
///
/// Composite buffers are derived data, fully recomputed on every parameter
/// change and never persisted. The scene owns the registration; export
/// workers receive a snapshot of it, never a live reference.
pub struct Scene {
    config: Config,
    ct_volume: Option<Array3<u8>>,
    pet_ct_volume: Option<Array3<u8>>,
    ct_trace: Option<Array3<u8>>,
    ct_display: Option<Array4<u8>>,
    pet_ct_display: Option<Array4<u8>>,
    ct_intensity: f32,
    ct_trace_intensity: f32,
    pet_ct_intensity: f32,
    registration: Registration,
    trace_warned: bool,
}

impl Scene {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ct_volume: None,
            pet_ct_volume: None,
            ct_trace: None,
            ct_display: None,
            pet_ct_display: None,
            ct_intensity: 1.0,
            ct_trace_intensity: 1.0,
            pet_ct_intensity: 1.0,
            registration: Registration::new(),
            trace_warned: false,
        }
    }

    fn subsample(&self, volume: &Array3<u8>) -> Array3<u8> {
        let step = self.config.skip_size.max(1) as isize;
        volume.slice(s![..;step, ..;step, ..;step]).to_owned()
    }

    /// Install (or clear) the fixed CT volume and recomposite its buffer.
    pub fn set_ct_volume(&mut self, volume: Option<&Array3<u8>>) {
        match volume {
            Some(volume) => {
                self.ct_volume = Some(self.subsample(volume));
                self.update_ct_display();
            }
            None => {
                self.ct_volume = None;
                self.ct_display = None;
            }
        }
    }

    /// Install (or clear) the floating PET-CT volume and recomposite its
    /// buffer.
    pub fn set_pet_ct_volume(&mut self, volume: Option<&Volume>) {
        match volume.and_then(Volume::grid) {
            Some(grid) => {
                self.pet_ct_volume = Some(self.subsample(grid));
                self.update_pet_ct_display();
            }
            None => {
                self.pet_ct_volume = None;
                self.pet_ct_display = None;
            }
        }
    }

    /// Install (or clear) the trace mask and recomposite the CT buffer.
    pub fn set_ct_trace(&mut self, mask: Option<&Array3<u8>>) {
        self.ct_trace = mask.map(|mask| self.subsample(mask));
        self.update_ct_display();
    }

    pub fn ct_intensity_changed(&mut self, intensity: f32) {
        self.ct_intensity = intensity;
        self.update_ct_display();
    }

    pub fn ct_trace_intensity_changed(&mut self, intensity: f32) {
        self.ct_trace_intensity = intensity;
        self.update_ct_display();
    }

    pub fn pet_ct_intensity_changed(&mut self, intensity: f32) {
        self.pet_ct_intensity = intensity;
        self.update_pet_ct_display();
    }

    /// Recompute the CT composite buffer.
    ///
    /// A failed composite (e.g. a trace mask whose stride the caller did
    /// not pre-align) keeps the previous buffer and logs once until the
    /// next successful update.
    pub fn update_ct_display(&mut self) {
        let Some(ct) = &self.ct_volume else {
            return;
        };
        let buffer = match &self.ct_trace {
            Some(mask) => {
                match compositor::composite_with_trace(
                    ct.view(),
                    self.ct_intensity,
                    mask.view(),
                    self.ct_trace_intensity,
                    GrayChannels::Rgb,
                ) {
                    Ok(buffer) => buffer,
                    Err(error) => {
                        if !self.trace_warned {
                            warn!(%error, "keeping previous CT display buffer");
                            self.trace_warned = true;
                        }
                        return;
                    }
                }
            }
            None => compositor::composite(ct.view(), self.ct_intensity, GrayChannels::Rgb),
        };
        self.trace_warned = false;
        self.ct_display = Some(buffer);
    }

    /// Recompute the PET-CT composite buffer.
    pub fn update_pet_ct_display(&mut self) {
        let Some(pet_ct) = &self.pet_ct_volume else {
            return;
        };
        self.pet_ct_display = Some(compositor::composite(
            pet_ct.view(),
            self.pet_ct_intensity,
            GrayChannels::RedGreen,
        ));
    }

    pub fn ct_display(&self) -> Option<&Array4<u8>> {
        self.ct_display.as_ref()
    }

    pub fn pet_ct_display(&self) -> Option<&Array4<u8>> {
        self.pet_ct_display.as_ref()
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    pub fn registration_mut(&mut self) -> &mut Registration {
        &mut self.registration
    }

    pub fn set_scaling_factor(&mut self, scaling_factor: f64) {
        self.registration.scaling_factor = scaling_factor;
    }

    /// The composed transform positioning the subsampled floating volume in
    /// the renderer, or `None` while no floating volume is loaded.
    pub fn pet_ct_display_matrix(&self) -> Option<Matrix4<f64>> {
        self.pet_ct_volume
            .as_ref()
            .map(|volume| self.registration.compose_matrix(volume.dim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> Config {
        Config {
            skip_size: 2,
            ..Config::default()
        }
    }

    #[test]
    fn test_volumes_are_subsampled() {
        let mut scene = Scene::new(small_config());
        scene.set_ct_volume(Some(&Array3::from_elem((8, 8, 8), 100)));
        let display = scene.ct_display().unwrap();
        assert_eq!(display.dim(), (4, 4, 4, 4));
    }

    #[test]
    fn test_clearing_volume_drops_buffer() {
        let mut scene = Scene::new(small_config());
        scene.set_ct_volume(Some(&Array3::from_elem((8, 8, 8), 100)));
        assert!(scene.ct_display().is_some());
        scene.set_ct_volume(None);
        assert!(scene.ct_display().is_none());
    }

    #[test]
    fn test_intensity_change_recomposites() {
        let mut scene = Scene::new(small_config());
        scene.set_ct_volume(Some(&Array3::from_elem((8, 8, 8), 100)));
        scene.ct_intensity_changed(2.0);
        assert_eq!(scene.ct_display().unwrap()[[0, 0, 0, 0]], 200);
    }

    #[test]
    fn test_intensity_change_without_volume_is_a_noop() {
        let mut scene = Scene::new(small_config());
        scene.pet_ct_intensity_changed(2.0);
        assert!(scene.pet_ct_display().is_none());
    }

    #[test]
    fn test_mismatched_trace_keeps_previous_buffer() {
        let mut scene = Scene::new(small_config());
        scene.set_ct_volume(Some(&Array3::from_elem((8, 8, 8), 100)));
        let before = scene.ct_display().unwrap().clone();

        // Base shape differs from the CT volume, so the subsampled mask
        // cannot align.
        scene.set_ct_trace(Some(&Array3::zeros((6, 6, 6))));
        assert_eq!(scene.ct_display().unwrap(), &before);
    }

    #[test]
    fn test_trace_changes_ct_buffer() {
        let mut scene = Scene::new(small_config());
        scene.set_ct_volume(Some(&Array3::from_elem((8, 8, 8), 50)));
        let mut mask = Array3::<u8>::zeros((8, 8, 8));
        mask[[0, 0, 0]] = 255;
        scene.set_ct_trace(Some(&mask));
        scene.ct_trace_intensity_changed(3.0);

        let display = scene.ct_display().unwrap();
        assert_eq!(display[[0, 0, 0, 0]], 150);
        assert_eq!(display[[1, 1, 1, 0]], 50);
    }

    #[test]
    fn test_display_matrix_follows_pet_volume() {
        let mut scene = Scene::new(small_config());
        assert!(scene.pet_ct_display_matrix().is_none());

        let mut volume = Volume::new(small_config());
        volume.init_from_volume(Array3::from_elem((8, 8, 8), 10));
        scene.set_pet_ct_volume(Some(&volume));

        scene.registration_mut().update(Some(1), None, None, None);
        let matrix = scene.pet_ct_display_matrix().unwrap();
        // Subsampled shape is 4^3, so the centering translation uses 2.
        assert_eq!(matrix[(0, 3)], -2.0);
        assert_eq!(matrix[(2, 3)], -3.0);
    }
}
