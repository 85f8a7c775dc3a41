use nalgebra as na;
use rayon::prelude::*;

use crate::{
    config::{FineParams, InsufficientDataPolicy},
    error::RegistrationError,
    point3d::{transformed_copy, PointCloud},
    rigid::{self, RigidTransform},
    spatial_index::SpatialIndex,
};

/// Source index, target index and their distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub source: usize,
    pub target: usize,
    pub distance: f64,
}

#[derive(Debug, Clone)]
pub struct FineAlignment {
    pub transform: RigidTransform,
    /// Iterations that produced an increment.
    pub iterations: usize,
    pub converged: bool,
    /// Inlying correspondences of the last iteration.
    pub inliers: usize,
    /// Rms distance of those inliers before the last increment.
    pub rmse: f64,
}

/// Point to point icp on the dense clouds, starting from `initial_guess`.
///
/// The caller's clouds are never modified; every iteration works on a freshly
/// transformed copy of the source.
pub fn refine_alignment(
    source: &PointCloud,
    target: &PointCloud,
    initial_guess: &RigidTransform,
    params: &FineParams,
) -> Result<FineAlignment, RegistrationError> {
    params.validate()?;
    rigid::validate_rigid(initial_guess)?;

    let source_points = source.to_na_points();
    let target_points = target.to_na_points();
    let target_index = SpatialIndex::from_na_points(&target_points);

    let mut current = *initial_guess;
    let mut result = FineAlignment {
        transform: current,
        iterations: 0,
        converged: false,
        inliers: 0,
        rmse: f64::INFINITY,
    };

    for i in 0..params.max_iterations {
        let moved = transformed_copy(&current, &source_points);
        let correspondences = point_association(&moved, &target_index, params.max_correspondence_distance);
        let inliers = reject_outliers(correspondences, params.outlier_rejection_threshold);
        log::debug!("iteration {} inliers {}", i, inliers.len());

        if inliers.len() < params.min_correspondences {
            match params.insufficient_data_policy {
                InsufficientDataPolicy::Abort => {
                    return Err(RegistrationError::InsufficientCorrespondences {
                        iteration: i,
                        required: params.min_correspondences,
                        found: inliers.len(),
                    });
                }
                InsufficientDataPolicy::HoldLast => {
                    // the same transform would find the same correspondences again
                    log::warn!(
                        "iteration {}: only {} inliers, keeping the last transform",
                        i,
                        inliers.len()
                    );
                    result.inliers = inliers.len();
                    break;
                }
            }
        }

        let (matched_source, matched_target): (Vec<_>, Vec<_>) = inliers
            .iter()
            .map(|c| (moved[c.source], target_points[c.target]))
            .unzip();
        let Some(increment) = rigid::estimate_rigid_transform(&matched_source, &matched_target)
        else {
            log::warn!("iteration {}: degenerate correspondences, stopping", i);
            break;
        };

        current = rigid::renormalize(&(increment * current));
        result.iterations = i + 1;
        result.inliers = inliers.len();
        result.rmse = (inliers.iter().map(|c| c.distance * c.distance).sum::<f64>()
            / inliers.len() as f64)
            .sqrt();

        let magnitude = rigid::motion_magnitude(&increment);
        log::debug!("iteration {} rmse {} increment {}", i, result.rmse, magnitude);
        if magnitude < params.convergence_epsilon {
            result.converged = true;
            break;
        }
    }

    if !result.converged {
        log::warn!("icp did not converge after {} iterations", result.iterations);
    }
    rigid::validate_rigid(&current)?;
    result.transform = current;
    Ok(result)
}

/// Nearest target point for every source point, dropping pairs farther apart
/// than `max_correspondence_distance`.
pub fn point_association(
    points: &[na::Vector3<f64>],
    target_index: &SpatialIndex,
    max_correspondence_distance: f64,
) -> Vec<Correspondence> {
    points
        .par_iter()
        .enumerate()
        .filter_map(|(i, pt)| {
            let (target, distance) = target_index.get_closest_neighbor(pt)?;
            (distance <= max_correspondence_distance).then_some(Correspondence {
                source: i,
                target,
                distance,
            })
        })
        .collect()
}

/// Drops correspondences more than `k` standard deviations above the mean distance.
pub fn reject_outliers(correspondences: Vec<Correspondence>, k: f64) -> Vec<Correspondence> {
    if correspondences.is_empty() {
        return correspondences;
    }
    let n = correspondences.len() as f64;
    let mean = correspondences.iter().map(|c| c.distance).sum::<f64>() / n;
    let variance = correspondences
        .iter()
        .map(|c| (c.distance - mean) * (c.distance - mean))
        .sum::<f64>()
        / n;
    let limit = mean + k * variance.sqrt();
    correspondences
        .into_iter()
        .filter(|c| c.distance <= limit)
        .collect()
}
