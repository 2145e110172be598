use ndarray::{Array2, Array3, ArrayD, Axis, Dimension, IxDyn, SliceInfoElem};
use tracing::debug;

/// RGBA stamp color, `[r, g, b, a]` in `[0, 255]`.
pub type Rgba = [u8; 4];

pub const WHITE: Rgba = [255, 255, 255, 255];

/// Pen radius used for freshly initialized traces.
pub const DEFAULT_PEN_RADIUS: usize = 3;

/// Boolean ball structuring element: voxels within `radius` of the center.
pub(crate) fn ball(radius: usize) -> Array3<u8> {
    let size = 2 * radius + 1;
    let center = radius as i64;
    let radius_sq = (radius * radius) as i64;
    Array3::from_shape_fn((size, size, size), |(z, y, x)| {
        let dz = z as i64 - center;
        let dy = y as i64 - center;
        let dx = x as i64 - center;
        (dz * dz + dy * dy + dx * dx <= radius_sq) as u8
    })
}

/// Boolean disk structuring element: pixels within `radius` of the center.
pub(crate) fn disk(radius: usize) -> Array2<u8> {
    let size = 2 * radius + 1;
    let center = radius as i64;
    let radius_sq = (radius * radius) as i64;
    Array2::from_shape_fn((size, size), |(y, x)| {
        let dy = y as i64 - center;
        let dx = x as i64 - center;
        (dy * dy + dx * dx <= radius_sq) as u8
    })
}

/// An RGBA voxel grid that trace polylines are stamped into.
///
/// `dims` selects which of the three volume axes participate in stamping:
/// all three for a ball pen, two for a disk pen over a single slice plane.
/// The grid shape is the selected axes of `full_shape` plus a trailing
/// channel axis of 4.
pub struct TraceVolume {
    volume: ArrayD<u8>,
    kernel: ArrayD<u8>,
    dims: Vec<usize>,
    full_shape: [usize; 3],
    pen_radius: usize,
}

impl TraceVolume {
    pub fn new(full_shape: (usize, usize, usize), dims: &[usize], pen_radius: usize) -> Self {
        let full_shape = [full_shape.0, full_shape.1, full_shape.2];
        let mut shape: Vec<usize> = dims.iter().map(|&d| full_shape[d]).collect();
        shape.push(4);

        let kernel = match dims.len() {
            3 => ball(pen_radius).into_dyn(),
            2 => disk(pen_radius).into_dyn(),
            _ => panic!("Only 2D and 3D pens are supported"),
        };

        Self {
            volume: ArrayD::zeros(IxDyn(&shape)),
            kernel,
            dims: dims.to_vec(),
            full_shape,
            pen_radius,
        }
    }

    pub fn clear(&mut self) {
        self.volume.fill(0);
    }

    pub fn shape(&self) -> &[usize] {
        self.volume.shape()
    }

    pub fn pen_radius(&self) -> usize {
        self.pen_radius
    }

    pub fn data(&self) -> &ArrayD<u8> {
        &self.volume
    }

    /// Stamp the pen at every polyline point, merging by per-channel
    /// maximum.
    ///
    /// Points with any coordinate outside the full volume bounds are
    /// skipped. Because the merge is a maximum, re-stamping is idempotent
    /// and stamp order does not affect the result.
    pub fn stamp(&mut self, polyline: &[[i64; 3]], color: Rgba) {
        let radius = self.pen_radius as i64;
        let kernel_size = 2 * radius + 1;

        for position in polyline {
            if (0..3).any(|d| position[d] < 0 || position[d] >= self.full_shape[d] as i64) {
                continue;
            }

            // Crop window into the grid and the matching window into the
            // kernel, so boundary-clipped stamps stay aligned.
            let mut grid_window = Vec::with_capacity(self.dims.len() + 1);
            let mut kernel_window = Vec::with_capacity(self.dims.len());
            for &d in &self.dims {
                let extent = self.full_shape[d] as i64;
                let start = (position[d] - radius).max(0);
                let end = (position[d] + radius + 1).min(extent);
                grid_window.push(SliceInfoElem::Slice {
                    start: start as isize,
                    end: Some(end as isize),
                    step: 1,
                });

                let pad_start = -((position[d] - radius).min(0));
                let pad_end = kernel_size + (extent - position[d] - radius - 1).min(0);
                kernel_window.push(SliceInfoElem::Slice {
                    start: pad_start as isize,
                    end: Some(pad_end as isize),
                    step: 1,
                });
            }
            grid_window.push(SliceInfoElem::Slice {
                start: 0,
                end: None,
                step: 1,
            });

            let kernel = self.kernel.slice(kernel_window.as_slice());
            let mut window = self.volume.slice_mut(grid_window.as_slice());
            let channel_axis = self.dims.len();
            for (index, &pen) in kernel.indexed_iter() {
                if pen == 0 {
                    continue;
                }
                let mut voxel: Vec<usize> = index.slice().to_vec();
                voxel.push(0);
                for (channel, &value) in color.iter().enumerate() {
                    voxel[channel_axis] = channel;
                    let cell = &mut window[voxel.as_slice()];
                    *cell = (*cell).max(value);
                }
            }
        }
    }

    /// One channel of a full-3D trace, as the mask handed to the
    /// compositor. `None` for dimension-restricted traces.
    pub fn channel_mask(&self, channel: usize) -> Option<Array3<u8>> {
        if self.dims != [0, 1, 2] {
            return None;
        }
        self.volume
            .index_axis(Axis(3), channel)
            .to_owned()
            .into_dimensionality()
            .ok()
    }
}

/// Lifecycle wrapper owning the trace grid for the fixed CT volume.
#[derive(Default)]
pub struct Trace {
    trace3d: Option<TraceVolume>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.trace3d.is_none()
    }

    pub fn clear(&mut self) {
        self.trace3d = None;
        debug!("trace data cleared");
    }

    /// Size a fresh full-3D trace grid to the given volume shape.
    pub fn init_from_volume(&mut self, shape: (usize, usize, usize)) {
        self.clear();
        self.trace3d = Some(TraceVolume::new(shape, &[0, 1, 2], DEFAULT_PEN_RADIUS));
    }

    /// Stamp one completed root polyline in white.
    pub fn draw(&mut self, polyline: &[[i64; 3]]) {
        if let Some(trace) = &mut self.trace3d {
            trace.stamp(polyline, WHITE);
        }
    }

    pub fn volume(&self) -> Option<&TraceVolume> {
        self.trace3d.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ball_radius_one() {
        let kernel = ball(1);
        assert_eq!(kernel.dim(), (3, 3, 3));
        assert_eq!(kernel.iter().filter(|&&v| v != 0).count(), 7);
        assert_eq!(kernel[[1, 1, 1]], 1);
        assert_eq!(kernel[[0, 0, 0]], 0);
    }

    #[test]
    fn test_disk_radius_one() {
        let kernel = disk(1);
        assert_eq!(kernel.dim(), (3, 3));
        assert_eq!(kernel.iter().filter(|&&v| v != 0).count(), 5);
        assert_eq!(kernel[[0, 0]], 0);
    }

    #[test]
    fn test_single_point_ball_stamp() {
        let mut trace = TraceVolume::new((4, 4, 4), &[0, 1, 2], 1);
        trace.stamp(&[[2, 2, 2]], WHITE);

        let mask = trace.channel_mask(1).unwrap();
        assert_eq!(mask[[2, 2, 2]], 255);
        assert_eq!(mask[[1, 2, 2]], 255);
        assert_eq!(mask[[0, 0, 0]], 0);
        assert_eq!(mask[[3, 3, 3]], 0);
    }

    #[test]
    fn test_stamp_is_idempotent() {
        let polyline = [[1, 1, 1], [2, 2, 2], [3, 1, 2]];

        let mut once = TraceVolume::new((5, 5, 5), &[0, 1, 2], 1);
        once.stamp(&polyline, WHITE);

        let mut twice = TraceVolume::new((5, 5, 5), &[0, 1, 2], 1);
        twice.stamp(&polyline, WHITE);
        twice.stamp(&polyline, WHITE);

        assert_eq!(once.data(), twice.data());
    }

    #[test]
    fn test_stamp_is_commutative() {
        let first = [[1, 1, 1], [2, 2, 2]];
        let second = [[3, 3, 3], [1, 3, 2]];

        let mut forward = TraceVolume::new((5, 5, 5), &[0, 1, 2], 1);
        forward.stamp(&first, [200, 100, 50, 255]);
        forward.stamp(&second, [50, 150, 250, 255]);

        let mut backward = TraceVolume::new((5, 5, 5), &[0, 1, 2], 1);
        backward.stamp(&second, [50, 150, 250, 255]);
        backward.stamp(&first, [200, 100, 50, 255]);

        assert_eq!(forward.data(), backward.data());
    }

    #[test]
    fn test_out_of_range_points_are_skipped() {
        let mut trace = TraceVolume::new((4, 4, 4), &[0, 1, 2], 1);
        trace.stamp(&[[-1, 2, 2], [2, 4, 2], [0, 0, 99]], WHITE);
        assert!(trace.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_boundary_stamp_is_clipped() {
        let mut trace = TraceVolume::new((4, 4, 4), &[0, 1, 2], 1);
        trace.stamp(&[[0, 0, 0]], WHITE);

        let mask = trace.channel_mask(0).unwrap();
        assert_eq!(mask[[0, 0, 0]], 255);
        assert_eq!(mask[[1, 0, 0]], 255);
        assert_eq!(mask[[0, 1, 1]], 0);
    }

    #[test]
    fn test_disk_pen_over_two_axes() {
        let mut trace = TraceVolume::new((4, 5, 6), &[1, 2], 1);
        trace.stamp(&[[2, 2, 3]], WHITE);

        assert_eq!(trace.shape(), &[5, 6, 4]);
        let data = trace.data();
        assert_eq!(data[[2, 3, 0].as_slice()], 255);
        assert_eq!(data[[1, 3, 0].as_slice()], 255);
        assert_eq!(data[[1, 2, 0].as_slice()], 0);
    }

    #[test]
    fn test_trace_lifecycle() {
        let mut trace = Trace::new();
        assert!(trace.is_empty());

        trace.init_from_volume((8, 8, 8));
        assert!(!trace.is_empty());
        trace.draw(&[[4, 4, 4]]);
        let mask = trace.volume().unwrap().channel_mask(1).unwrap();
        assert_eq!(mask[[4, 4, 4]], 255);

        trace.clear();
        assert!(trace.is_empty());
    }
}
