use ndarray::{Array4, ArrayView3, Axis, Zip};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("trace mask shape {mask:?} does not match volume shape {volume:?}")]
    ShapeMismatch {
        volume: (usize, usize, usize),
        mask: (usize, usize, usize),
    },
}

/// Which color channels mirror the scaled intensity channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrayChannels {
    /// Red, green and blue: neutral gray, used for the fixed CT volume.
    Rgb,
    /// Red and green only, leaving blue dark, used for the floating PET-CT
    /// volume so it reads as a warm overlay.
    RedGreen,
}

#[inline]
fn scaled(value: u8, intensity: f32) -> u8 {
    (value as f32 * intensity).clamp(0.0, 255.0) as u8
}

/// Quadratic opacity ramp: low intensities fade out fast while bright
/// voxels stay opaque.
#[inline]
fn alpha_ramp(value: u8) -> u8 {
    let t = value as f32 / 255.0 * 2.0;
    (t * t * 255.0).clamp(0.0, 255.0) as u8
}

/// Convert a raw intensity volume into an RGBA display buffer.
pub fn composite(raw: ArrayView3<'_, u8>, intensity: f32, gray: GrayChannels) -> Array4<u8> {
    let (depth, height, width) = raw.dim();
    let mut buffer = Array4::<u8>::zeros((depth, height, width, 4));

    Zip::from(buffer.axis_iter_mut(Axis(0)))
        .and(raw.axis_iter(Axis(0)))
        .par_for_each(|mut rgba, plane| {
            for y in 0..height {
                for x in 0..width {
                    let value = scaled(plane[[y, x]], intensity);
                    rgba[[y, x, 0]] = value;
                    rgba[[y, x, 1]] = value;
                    if gray == GrayChannels::Rgb {
                        rgba[[y, x, 2]] = value;
                    }
                    rgba[[y, x, 3]] = alpha_ramp(value);
                }
            }
        });
    buffer
}

/// Composite with a trace mask: voxels under the mask are rescaled with
/// `trace_intensity`, then opacity is recomputed over the whole buffer so
/// traced and untraced regions blend consistently.
///
/// The mask must already be aligned to `raw`'s voxel grid.
pub fn composite_with_trace(
    raw: ArrayView3<'_, u8>,
    intensity: f32,
    mask: ArrayView3<'_, u8>,
    trace_intensity: f32,
    gray: GrayChannels,
) -> Result<Array4<u8>, CompositeError> {
    if mask.dim() != raw.dim() {
        return Err(CompositeError::ShapeMismatch {
            volume: raw.dim(),
            mask: mask.dim(),
        });
    }

    let (_, height, width) = raw.dim();
    let mut buffer = composite(raw, intensity, gray);

    Zip::from(buffer.axis_iter_mut(Axis(0)))
        .and(raw.axis_iter(Axis(0)))
        .and(mask.axis_iter(Axis(0)))
        .par_for_each(|mut rgba, plane, mask_plane| {
            for y in 0..height {
                for x in 0..width {
                    if mask_plane[[y, x]] != 0 {
                        let value = scaled(plane[[y, x]], trace_intensity);
                        rgba[[y, x, 0]] = value;
                        rgba[[y, x, 1]] = value;
                        if gray == GrayChannels::Rgb {
                            rgba[[y, x, 2]] = value;
                        }
                    }
                    rgba[[y, x, 3]] = alpha_ramp(rgba[[y, x, 0]]);
                }
            }
        });
    Ok(buffer)
}
