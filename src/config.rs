/// Runtime constants consumed by the pipeline.
///
/// Passed by value into constructors; no component reads configuration from
/// ambient state.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Uniform voxel subsampling stride applied to displayed volumes, and to
    /// shift values when they are baked into a full-resolution export.
    pub skip_size: usize,
    /// Voxel resolution (physical units per voxel) assumed for freshly
    /// created volumes.
    pub default_resolution: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_size: 2,
            default_resolution: 0.3,
        }
    }
}

pub fn application_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
