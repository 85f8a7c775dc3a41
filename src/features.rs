use nalgebra as na;
use rayon::prelude::*;

use crate::point3d::PointCloud;

/// Global shape summary of a cloud. Informational only, registration does not
/// depend on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFeatures {
    pub num_points: usize,
    pub centroid: na::Vector3<f64>,
    pub min_bound: na::Vector3<f64>,
    pub max_bound: na::Vector3<f64>,
    /// Eigenvalues of the point covariance, largest first.
    pub principal_variances: na::Vector3<f64>,
}

impl ObjectFeatures {
    pub fn extent(&self) -> na::Vector3<f64> {
        self.max_bound - self.min_bound
    }
}

pub fn compute_features(cloud: &PointCloud) -> ObjectFeatures {
    let points: Vec<na::Vector3<f64>> = cloud
        .points()
        .par_iter()
        .filter(|p| p.is_finite())
        .map(|p| p.to_na_vec_f64())
        .collect();
    if points.is_empty() {
        return ObjectFeatures {
            num_points: 0,
            centroid: na::Vector3::zeros(),
            min_bound: na::Vector3::zeros(),
            max_bound: na::Vector3::zeros(),
            principal_variances: na::Vector3::zeros(),
        };
    }

    let n = points.len() as f64;
    let centroid = points.iter().fold(na::Vector3::zeros(), |acc, p| acc + p) / n;
    let (min_bound, max_bound) = points.iter().fold(
        (
            na::Vector3::repeat(f64::INFINITY),
            na::Vector3::repeat(f64::NEG_INFINITY),
        ),
        |(lo, hi), p| (lo.inf(p), hi.sup(p)),
    );
    let covariance = points
        .par_iter()
        .map(|p| {
            let d = p - centroid;
            d * d.transpose()
        })
        .reduce(na::Matrix3::zeros, |a, b| a + b)
        / n;
    let mut principal_variances = covariance.symmetric_eigenvalues();
    principal_variances
        .as_mut_slice()
        .sort_by(|a, b| b.total_cmp(a));

    ObjectFeatures {
        num_points: points.len(),
        centroid,
        min_bound,
        max_bound,
        principal_variances,
    }
}
