//! Basis conversion between the recording and playback conventions.
//!
//! Recorded logs use a right-handed frame, optionally with Z as the vertical
//! axis. Playback uses a left-handed, Y-up frame (X right, Y up, Z forward).
//! Every conversion here is its own inverse: applying it twice with the same
//! `z_up` flag returns the input.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

const DEGENERATE_EPS: f64 = 1e-12;

/// Converts a vector between the source and target bases.
///
/// Z is negated unless the source is Z-up; X and Y pass through.
pub fn vec_to_target_basis(v: &Vector3<f64>, z_up: bool) -> Vector3<f64> {
    if z_up {
        *v
    } else {
        Vector3::new(v.x, v.y, -v.z)
    }
}

/// The reflection used to move matrices between bases.
///
/// `diag(1, 1, -1)` for Y-up sources, the Y/Z swap for Z-up sources. Both are
/// symmetric and self-inverse.
pub fn basis_reflection(z_up: bool) -> Matrix3<f64> {
    if z_up {
        Matrix3::new(
            1.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
            0.0, 1.0, 0.0,
        )
    } else {
        Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0))
    }
}

/// Conjugates `m` by the basis reflection: `S * m * S`.
pub fn matrix_to_target_basis(m: &Matrix3<f64>, z_up: bool) -> Matrix3<f64> {
    let s = basis_reflection(z_up);
    s * m * s
}

/// Builds the rotation whose local +Z points along `forward` and whose local
/// +Y lies in the plane of `forward` and `up`.
///
/// Degenerate inputs are resolved as follows:
/// - a zero `forward` yields the identity;
/// - `up` parallel to `forward` yields the shortest-arc rotation taking +Z to
///   `forward` (a half turn about +Y when `forward` is -Z).
pub fn look_rotation(forward: &Vector3<f64>, up: &Vector3<f64>) -> UnitQuaternion<f64> {
    let Some(z_axis) = forward.try_normalize(DEGENERATE_EPS) else {
        return UnitQuaternion::identity();
    };

    match up.cross(&z_axis).try_normalize(DEGENERATE_EPS) {
        Some(x_axis) => {
            let y_axis = z_axis.cross(&x_axis);
            let basis = Rotation3::from_basis_unchecked(&[x_axis, y_axis, z_axis]);
            UnitQuaternion::from_rotation_matrix(&basis)
        }
        None => UnitQuaternion::rotation_between(&Vector3::z(), &z_axis).unwrap_or_else(|| {
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f64::consts::PI)
        }),
    }
}

/// Quaternion of a rotation matrix already expressed in the target basis.
///
/// Uses the forward (column 2) and up (column 1) directions.
pub fn matrix_to_quaternion(m: &Matrix3<f64>) -> UnitQuaternion<f64> {
    let forward: Vector3<f64> = m.column(2).into_owned();
    let up: Vector3<f64> = m.column(1).into_owned();
    look_rotation(&forward, &up)
}

/// Quaternion of a source-basis rotation matrix, in the target basis.
pub fn rotation_matrix_to_quaternion(m: &Matrix3<f64>, z_up: bool) -> UnitQuaternion<f64> {
    matrix_to_quaternion(&matrix_to_target_basis(m, z_up))
}

/// Source-basis rotation matrix of a target-basis quaternion.
pub fn quaternion_to_source_matrix(rotation: &UnitQuaternion<f64>, z_up: bool) -> Matrix3<f64> {
    matrix_to_target_basis(rotation.to_rotation_matrix().matrix(), z_up)
}

/// Forward (Z) direction of a source rotation, in the target basis.
pub fn source_forward(m: &Matrix3<f64>, z_up: bool) -> Vector3<f64> {
    vec_to_target_basis(&m.column(2).into_owned(), z_up)
}

/// Up (Y) direction of a source rotation, in the target basis.
pub fn source_up(m: &Matrix3<f64>, z_up: bool) -> Vector3<f64> {
    vec_to_target_basis(&m.column(1).into_owned(), z_up)
}

/// Right (X) direction of a source rotation, in the target basis.
pub fn source_right(m: &Matrix3<f64>, z_up: bool) -> Vector3<f64> {
    vec_to_target_basis(&m.column(0).into_owned(), z_up)
}

/// Splits a source roto-translation into a target-basis position and rotation.
pub fn pose_from_source_matrix(
    location: &Matrix4<f64>,
    z_up: bool,
) -> (Vector3<f64>, UnitQuaternion<f64>) {
    let translation: Vector3<f64> = location.fixed_view::<3, 1>(0, 3).into_owned();
    let rotation: Matrix3<f64> = location.fixed_view::<3, 3>(0, 0).into_owned();
    (
        vec_to_target_basis(&translation, z_up),
        rotation_matrix_to_quaternion(&rotation, z_up),
    )
}

/// Builds a source roto-translation from a target-basis position and rotation.
pub fn pose_to_source_matrix(
    position: &Vector3<f64>,
    rotation: &UnitQuaternion<f64>,
    z_up: bool,
) -> Matrix4<f64> {
    let mut location = Matrix4::identity();
    location
        .fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&quaternion_to_source_matrix(rotation, z_up));
    location
        .fixed_view_mut::<3, 1>(0, 3)
        .copy_from(&vec_to_target_basis(position, z_up));
    location
}
