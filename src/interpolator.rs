use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use rayon::prelude::*;

pub(crate) struct Interpolator;

impl Interpolator {
    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<'_, u8>, z: f32, y: f32, x: f32) -> f32 {
        let (depth, height, width) = volume.dim();

        let z0 = z.floor() as usize;
        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let z1 = (z0 + 1).min(depth - 1);
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dz = z - z0 as f32;
        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let lerp_plane = |zi: usize| -> f32 {
            let v00 = volume[[zi, y0, x0]] as f32;
            let v01 = volume[[zi, y0, x1]] as f32;
            let v10 = volume[[zi, y1, x0]] as f32;
            let v11 = volume[[zi, y1, x1]] as f32;

            let v0 = v00.mul_add(one_minus_dx, v01 * dx);
            let v1 = v10.mul_add(one_minus_dx, v11 * dx);
            v0.mul_add(one_minus_dy, v1 * dy)
        };

        lerp_plane(z0).mul_add(1.0 - dz, lerp_plane(z1) * dz)
    }

    /// Resample a volume to `target_shape` by inverse mapping with
    /// half-voxel-centered coordinates.
    pub(crate) fn resize(
        volume: ArrayView3<'_, u8>,
        target_shape: (usize, usize, usize),
    ) -> Array3<f32> {
        let (src_depth, src_height, src_width) = volume.dim();
        let (depth, height, width) = target_shape;

        let mut resized = Array3::<f32>::zeros(target_shape);
        resized
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(z, mut plane)| {
                let src_z = Self::source_coordinate(z, depth, src_depth);
                for y in 0..height {
                    let src_y = Self::source_coordinate(y, height, src_height);
                    for x in 0..width {
                        let src_x = Self::source_coordinate(x, width, src_width);
                        plane[[y, x]] = Self::trilinear_interpolate(&volume, src_z, src_y, src_x);
                    }
                }
            });
        resized
    }

    #[inline]
    fn source_coordinate(index: usize, target_dim: usize, source_dim: usize) -> f32 {
        // Normalized coordinates with half-voxel offset, clamped to the
        // valid sample range.
        let norm = (index as f32 + 0.5) / target_dim as f32;
        let src = norm * source_dim as f32 - 0.5;
        src.max(0.0).min((source_dim - 1) as f32)
    }

    /// Rotate a slice about its center without changing its shape.
    ///
    /// Pixels swept in from outside the source are zero. Sampling is
    /// bilinear with no prefiltering, so a zero-degree rotation is an exact
    /// copy.
    pub(crate) fn rotate_slice(slice: ArrayView2<'_, u8>, degrees: f64) -> Array2<u8> {
        let (height, width) = slice.dim();
        let (sin, cos) = degrees.to_radians().sin_cos();
        let center_y = (height as f64 - 1.0) / 2.0;
        let center_x = (width as f64 - 1.0) / 2.0;

        let mut rotated = Array2::<u8>::zeros((height, width));
        for ((y, x), value) in rotated.indexed_iter_mut() {
            let dy = y as f64 - center_y;
            let dx = x as f64 - center_x;
            let src_y = center_y + cos * dy + sin * dx;
            let src_x = center_x - sin * dy + cos * dx;
            *value = Self::bilinear_sample_or_zero(&slice, src_y, src_x);
        }
        rotated
    }

    fn bilinear_sample_or_zero(slice: &ArrayView2<'_, u8>, y: f64, x: f64) -> u8 {
        let (height, width) = slice.dim();
        if y <= -1.0 || x <= -1.0 || y >= height as f64 || x >= width as f64 {
            return 0;
        }

        let y0 = y.floor() as isize;
        let x0 = x.floor() as isize;
        let dy = y - y0 as f64;
        let dx = x - x0 as f64;

        let mut accumulated = 0.0;
        for (ny, weight_y) in [(y0, 1.0 - dy), (y0 + 1, dy)] {
            if ny < 0 || ny >= height as isize || weight_y == 0.0 {
                continue;
            }
            for (nx, weight_x) in [(x0, 1.0 - dx), (x0 + 1, dx)] {
                if nx < 0 || nx >= width as isize || weight_x == 0.0 {
                    continue;
                }
                accumulated += slice[[ny as usize, nx as usize]] as f64 * weight_y * weight_x;
            }
        }
        accumulated.round().clamp(0.0, 255.0) as u8
    }
}
