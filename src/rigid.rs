use nalgebra as na;

use crate::error::RegistrationError;

/// Rigid-body motion, rotation then translation.
pub type RigidTransform = na::Isometry3<f64>;

/// Tolerance on `|RtR - I|` and `|det(R) - 1|` for a transform to count as rigid.
pub const RIGIDITY_TOLERANCE: f64 = 1e-6;

pub fn to_matrix(transform: &RigidTransform) -> na::Matrix4<f64> {
    transform.to_homogeneous()
}

/// Builds a transform from a 4x4 homogeneous matrix, refusing anything that is
/// not a proper rigid motion.
pub fn from_matrix(m: &na::Matrix4<f64>) -> Result<RigidTransform, RegistrationError> {
    let bottom = m.fixed_view::<1, 4>(3, 0);
    if (bottom - na::RowVector4::new(0.0, 0.0, 0.0, 1.0)).norm() > RIGIDITY_TOLERANCE {
        return Err(RegistrationError::InvalidParameter(format!(
            "bottom row of homogeneous matrix is {}",
            bottom
        )));
    }
    let r: na::Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    check_rotation(&r)?;
    let t: na::Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
    let rotation = na::UnitQuaternion::from_rotation_matrix(&na::Rotation3::from_matrix_unchecked(r));
    Ok(na::Isometry3::from_parts(t.into(), rotation))
}

fn check_rotation(r: &na::Matrix3<f64>) -> Result<(), RegistrationError> {
    let orthogonality_error = (r.transpose() * r - na::Matrix3::identity()).norm();
    let determinant = r.determinant();
    if !orthogonality_error.is_finite()
        || orthogonality_error > RIGIDITY_TOLERANCE
        || (determinant - 1.0).abs() > RIGIDITY_TOLERANCE
    {
        return Err(RegistrationError::NonRigidTransform {
            orthogonality_error,
            determinant,
        });
    }
    Ok(())
}

/// Checks the rotation block of `transform` is orthonormal with det +1 and that
/// the translation is finite.
pub fn validate_rigid(transform: &RigidTransform) -> Result<(), RegistrationError> {
    check_rotation(transform.rotation.to_rotation_matrix().matrix())?;
    if !transform.translation.vector.iter().all(|v| v.is_finite()) {
        return Err(RegistrationError::InvalidParameter(format!(
            "non finite translation {}",
            transform.translation.vector
        )));
    }
    Ok(())
}

/// Pulls the rotation back onto the unit sphere after compositions.
pub fn renormalize(transform: &RigidTransform) -> RigidTransform {
    // repeated products drift off unit norm
    na::Isometry3::from_parts(
        transform.translation,
        na::UnitQuaternion::from_quaternion(transform.rotation.into_inner().normalize()),
    )
}

/// Rotation angle in radians plus translation norm.
pub fn motion_magnitude(transform: &RigidTransform) -> f64 {
    transform.rotation.angle() + transform.translation.vector.norm()
}

/// Closest rotation to `m` in the Frobenius sense (orthogonal polar factor with
/// the reflection removed).
pub fn nearest_rotation(m: &na::Matrix3<f64>) -> Option<na::Rotation3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut d = na::Matrix3::identity();
    if (u * v_t).determinant() < 0.0 {
        d[(2, 2)] = -1.0;
    }
    Some(na::Rotation3::from_matrix_unchecked(u * d * v_t))
}

/// Least-squares rigid transform mapping `source[i]` onto `target[i]`
/// (Arun et al. / Kabsch, SVD of the cross covariance).
///
/// Returns `None` for fewer than 3 pairs or mismatched lengths.
pub fn estimate_rigid_transform(
    source: &[na::Vector3<f64>],
    target: &[na::Vector3<f64>],
) -> Option<RigidTransform> {
    if source.len() != target.len() || source.len() < 3 {
        return None;
    }
    if source == target {
        return Some(RigidTransform::identity());
    }

    let n = source.len() as f64;
    let source_centroid = source.iter().fold(na::Vector3::zeros(), |acc, p| acc + p) / n;
    let target_centroid = target.iter().fold(na::Vector3::zeros(), |acc, p| acc + p) / n;

    // H = sum (tgt - tgt_mean) * (src - src_mean)^T
    let covariance = source
        .iter()
        .zip(target.iter())
        .fold(na::Matrix3::zeros(), |acc, (s, t)| {
            acc + (t - target_centroid) * (s - source_centroid).transpose()
        });
    if !covariance.iter().all(|v| v.is_finite()) {
        return None;
    }

    let rotation = nearest_rotation(&covariance)?;
    let translation = target_centroid - rotation * source_centroid;
    let rotation = na::UnitQuaternion::from_rotation_matrix(&rotation);
    Some(renormalize(&na::Isometry3::from_parts(
        translation.into(),
        rotation,
    )))
}
