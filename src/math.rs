use crate::all::*;

// Photogrammetric rotations. Angles are in radians and follow the
// omega (x), phi (y), kappa (z) convention. Every rotation maps world
// coordinates into camera coordinates.

pub fn rotation_x(omega: f64) -> Matrix3d {
  let (s, c) = omega.sin_cos();
  Matrix3d::new(
    1., 0., 0.,
    0., c, s,
    0., -s, c,
  )
}

pub fn rotation_y(phi: f64) -> Matrix3d {
  let (s, c) = phi.sin_cos();
  Matrix3d::new(
    c, 0., -s,
    0., 1., 0.,
    s, 0., c,
  )
}

pub fn rotation_z(kappa: f64) -> Matrix3d {
  let (s, c) = kappa.sin_cos();
  Matrix3d::new(
    c, s, 0.,
    -s, c, 0.,
    0., 0., 1.,
  )
}

// The composition order is shared by the forward and inverse mappings and
// must not change independently of either.
pub fn rotation_opk(omega: f64, phi: f64, kappa: f64) -> Matrix3d {
  rotation_z(kappa) * rotation_y(phi) * rotation_x(omega)
}

pub fn rotation_2d(theta: f64) -> Matrix2d {
  let (s, c) = theta.sin_cos();
  Matrix2d::new(
    c, s,
    -s, c,
  )
}

// Gimbal roll, pitch and yaw (degrees) to omega, phi, kappa (degrees) for DJI
// gimbals. A nadir gimbal reports pitch -90, which becomes omega = phi = 0.
pub fn rpy_to_opk(roll: f64, pitch: f64, yaw: f64) -> Vector3d {
  // Roll readings of +-180 show up when the gimbal flips past nadir.
  let roll = if 180. - roll.abs() <= 0.1 { 0. } else { roll };
  let tilt = Vector2d::new(90. + pitch, roll);
  let omega_phi = rotation_2d(yaw.to_radians()) * tilt;
  Vector3d::new(omega_phi[0], omega_phi[1], -yaw)
}

pub fn is_orthonormal(r: &Matrix3d, tolerance: f64) -> bool {
  (r * r.transpose() - Matrix3d::identity()).norm() < tolerance
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn test_rotation_orthonormal() {
    for i in 0..36 {
      let a = (i as f64 * 10.).to_radians();
      let r = rotation_opk(0.3 * a.sin(), -0.2 * a.cos(), a);
      assert!(is_orthonormal(&r, 1e-12));
      assert_relative_eq!(r.determinant(), 1., epsilon = 1e-12);
    }
  }

  #[test]
  fn test_nadir_is_identity() {
    let opk = rpy_to_opk(0., -90., 0.);
    assert_relative_eq!(opk, Vector3d::zeros(), epsilon = 1e-12);
    let r = rotation_opk(opk[0].to_radians(), opk[1].to_radians(), opk[2].to_radians());
    assert_relative_eq!(r, Matrix3d::identity(), epsilon = 1e-12);
  }

  #[test]
  fn test_flipped_roll_is_ignored() {
    let a = rpy_to_opk(179.95, -60., 0.);
    let b = rpy_to_opk(0., -60., 0.);
    assert_relative_eq!(a, b, epsilon = 1e-12);
  }

  #[test]
  fn test_yaw_distributes_tilt() {
    // Looking east with a 30 degree tilt from nadir moves the tilt to phi.
    let opk = rpy_to_opk(0., -60., 90.);
    assert_relative_eq!(opk[0], 0., epsilon = 1e-9);
    assert_relative_eq!(opk[1], -30., epsilon = 1e-9);
    assert_relative_eq!(opk[2], -90., epsilon = 1e-12);
  }
}
