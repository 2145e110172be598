use nalgebra::{Matrix4, Rotation3, Vector3};

/// Interactive rigid-alignment state for the floating volume: per-axis
/// flips, voxel shifts and a single in-plane rotation, expressed relative
/// to the fixed volume's frame.
///
/// `z` shifts the first (slowest) array axis and `x` the last. Flips are
/// stored as multiplicative signs.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    x: i32,
    y: i32,
    z: i32,
    angle: i32,
    x_flip: i32,
    y_flip: i32,
    z_flip: i32,
    /// Derived resolution ratio, displayed only. Folding it into the
    /// transform misaligns the coordinate frames, so it is never applied.
    pub scaling_factor: f64,
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            z: 0,
            angle: 0,
            x_flip: 1,
            y_flip: 1,
            z_flip: 1,
            scaling_factor: 1.0,
        }
    }
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flips(&mut self, x_flip: bool, y_flip: bool, z_flip: bool) {
        self.x_flip = if x_flip { -1 } else { 1 };
        self.y_flip = if y_flip { -1 } else { 1 };
        self.z_flip = if z_flip { -1 } else { 1 };
    }

    /// Update shift and rotation parameters.
    ///
    /// `None` keeps the previous value; `Some(0)` explicitly resets a
    /// parameter to zero. The angle is normalized into `[0, 359]`.
    pub fn update(&mut self, x: Option<i32>, y: Option<i32>, z: Option<i32>, angle: Option<i32>) {
        if let Some(x) = x {
            self.x = x;
        }
        if let Some(y) = y {
            self.y = y;
        }
        if let Some(z) = z {
            self.z = z;
        }
        if let Some(angle) = angle {
            self.angle = angle.rem_euclid(360);
        }
    }

    pub fn shift(&self) -> (i32, i32, i32) {
        (self.x, self.y, self.z)
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    pub fn flips(&self) -> (i32, i32, i32) {
        (self.x_flip, self.y_flip, self.z_flip)
    }

    /// The composed display transform for a floating volume of
    /// `target_shape`: scale by the negated flip signs, then translate to
    /// the flip-adjusted volume center plus the shift, then rotate about
    /// the first spatial axis.
    ///
    /// Vector components are ordered `(z, y, x)` to match the `(Z, Y, X)`
    /// array layout. The renderer and the batch exporter both derive their
    /// geometry from this one definition.
    pub fn compose_matrix(&self, target_shape: (usize, usize, usize)) -> Matrix4<f64> {
        let (depth, height, width) = target_shape;
        let (z_flip, y_flip, x_flip) = (self.z_flip as f64, self.y_flip as f64, self.x_flip as f64);

        let scale = Matrix4::new_nonuniform_scaling(&Vector3::new(-z_flip, -y_flip, -x_flip));
        let translation = Matrix4::new_translation(&Vector3::new(
            z_flip * (depth / 2) as f64 + self.z as f64,
            y_flip * (height / 2) as f64 + self.y as f64,
            x_flip * (width / 2) as f64 + self.x as f64,
        ));
        let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), (self.angle as f64).to_radians())
            .to_homogeneous();

        scale * translation * rotation
    }

    /// Copy of the parameters for a worker that must not read live state.
    pub fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot {
            x: self.x,
            y: self.y,
            z: self.z,
            angle: self.angle,
            x_flip: self.x_flip,
            y_flip: self.y_flip,
            z_flip: self.z_flip,
        }
    }
}

/// Plain copy of the alignment parameters, taken when an export starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSnapshot {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub angle: i32,
    pub x_flip: i32,
    pub y_flip: i32,
    pub z_flip: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_omitted_values() {
        let mut registration = Registration::new();
        registration.update(Some(5), Some(-3), None, Some(45));
        registration.update(None, None, Some(7), None);
        assert_eq!(registration.shift(), (5, -3, 7));
        assert_eq!(registration.angle(), 45);
    }

    #[test]
    fn test_update_accepts_explicit_zero() {
        let mut registration = Registration::new();
        registration.update(Some(5), Some(5), Some(5), Some(90));
        registration.update(Some(0), None, None, Some(0));
        assert_eq!(registration.shift(), (0, 5, 5));
        assert_eq!(registration.angle(), 0);
    }

    #[test]
    fn test_angle_wraps_around() {
        let mut registration = Registration::new();
        registration.update(None, None, None, Some(360));
        assert_eq!(registration.angle(), 0);
        registration.update(None, None, None, Some(-1));
        assert_eq!(registration.angle(), 359);
        registration.update(None, None, None, Some(725));
        assert_eq!(registration.angle(), 5);
    }

    #[test]
    fn test_flips_become_signs() {
        let mut registration = Registration::new();
        assert_eq!(registration.flips(), (1, 1, 1));
        registration.set_flips(true, false, true);
        assert_eq!(registration.flips(), (-1, 1, -1));
    }

    #[test]
    fn test_compose_matrix_translation_column() {
        let mut registration = Registration::new();
        registration.update(Some(4), Some(-2), Some(10), None);
        let matrix = registration.compose_matrix((20, 30, 40));

        assert_eq!(matrix[(0, 3)], -(10.0 + 10.0));
        assert_eq!(matrix[(1, 3)], -(15.0 - 2.0));
        assert_eq!(matrix[(2, 3)], -(20.0 + 4.0));
        assert_eq!(matrix[(3, 3)], 1.0);
    }

    #[test]
    fn test_compose_matrix_is_deterministic() {
        let mut registration = Registration::new();
        registration.set_flips(true, false, false);
        registration.update(Some(1), Some(2), Some(3), Some(30));
        let first = registration.compose_matrix((16, 16, 16));
        let second = registration.compose_matrix((16, 16, 16));
        assert_eq!(first, second);
    }
}
