//! Sample consensus initial alignment.
//!
//! Each trial draws a few well separated source keypoints, pairs every one with a
//! target keypoint that is close in descriptor space, fits a rigid transform to
//! those pairs and counts how many source keypoints it brings within the inlier
//! radius of some target keypoint. The best scoring trial wins.

use nalgebra as na;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::{
    config::CoarseParams,
    descriptor::{self, Descriptor},
    error::RegistrationError,
    point3d::{transformed_copy, PointCloud},
    rigid::{self, RigidTransform},
    spatial_index::SpatialIndex,
};

/// Minimum sine of the angle spanned by a sample for it to count as non collinear.
const MIN_SAMPLE_SINE: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct CoarseAlignment {
    pub transform: RigidTransform,
    /// Source keypoints landing within the inlier radius of a target keypoint.
    pub inliers: usize,
    /// Mean squared distance of those inliers.
    pub fitness_score: f64,
    /// Trials that produced a usable sample.
    pub valid_samples: usize,
}

#[derive(Debug, Clone)]
struct Trial {
    index: usize,
    transform: RigidTransform,
    inliers: usize,
    fitness_score: f64,
}

/// Keeps the higher inlier count; equal counts go to the earlier trial so the
/// outcome is the same however rayon splits the work.
fn better(a: Trial, b: Trial) -> Trial {
    if b.inliers > a.inliers || (b.inliers == a.inliers && b.index < a.index) {
        b
    } else {
        a
    }
}

/// Estimates a transform bringing `source_keypoints` onto `target_keypoints`
/// without any prior pose.
///
/// `*_descriptors[i]` describes `*_keypoints[i]`. Identity is the incumbent: a
/// trial has to strictly beat its inlier count to replace it, so the result is
/// identity when no sample could be drawn within the attempt budget.
pub fn compute_initial_alignment(
    source_keypoints: &PointCloud,
    source_descriptors: &[Descriptor],
    target_keypoints: &PointCloud,
    target_descriptors: &[Descriptor],
    params: &CoarseParams,
) -> Result<CoarseAlignment, RegistrationError> {
    params.validate()?;
    for (keypoints, descriptors) in [
        (source_keypoints, source_descriptors),
        (target_keypoints, target_descriptors),
    ] {
        if keypoints.len() != descriptors.len() {
            return Err(RegistrationError::DescriptorMismatch {
                keypoints: keypoints.len(),
                descriptors: descriptors.len(),
            });
        }
    }
    let found = source_keypoints.len().min(target_keypoints.len());
    if found < params.sample_size {
        return Err(RegistrationError::InsufficientKeypoints {
            required: params.sample_size,
            found,
        });
    }

    let candidates = descriptor::k_nearest_descriptors(
        source_descriptors,
        target_descriptors,
        params.correspondence_randomness,
    )?;
    let sampleable: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| (!c.is_empty()).then_some(i))
        .collect();
    if sampleable.len() < params.sample_size {
        return Err(RegistrationError::InsufficientKeypoints {
            required: params.sample_size,
            found: sampleable.len(),
        });
    }

    let source_points = source_keypoints.to_na_points();
    let target_points = target_keypoints.to_na_points();
    let target_index = SpatialIndex::from_na_points(&target_points);

    let (identity_inliers, identity_fitness) = score(
        &RigidTransform::identity(),
        &source_points,
        &target_index,
        params.max_correspondence_distance,
    );
    log::debug!("identity scores {} inliers", identity_inliers);

    let trials: Vec<Trial> = (0..params.iterations)
        .into_par_iter()
        .filter_map(|index| {
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));
            let (sample_source, sample_target) = draw_sample(
                &mut rng,
                &sampleable,
                &candidates,
                &source_points,
                &target_points,
                params,
            )?;
            if let Some(similarity) = params.edge_length_similarity {
                if !edge_lengths_consistent(&sample_source, &sample_target, similarity) {
                    return None;
                }
            }

            let transform = rigid::estimate_rigid_transform(&sample_source, &sample_target)?;
            let (inliers, fitness_score) = score(
                &transform,
                &source_points,
                &target_index,
                params.max_correspondence_distance,
            );
            Some(Trial {
                index,
                transform,
                inliers,
                fitness_score,
            })
        })
        .collect();

    let valid_samples = trials.len();
    let best = match trials.into_iter().reduce(better) {
        Some(best) if best.inliers > identity_inliers => {
            log::debug!(
                "best trial {} with {} inliers ({} valid samples)",
                best.index,
                best.inliers,
                valid_samples
            );
            best
        }
        Some(best) => {
            log::warn!(
                "best trial {} has {} inliers, identity has {}, keeping identity",
                best.index,
                best.inliers,
                identity_inliers
            );
            identity_trial(identity_inliers, identity_fitness)
        }
        None => {
            log::warn!(
                "no valid sample in {} trials, falling back to identity",
                params.iterations
            );
            identity_trial(identity_inliers, identity_fitness)
        }
    };

    rigid::validate_rigid(&best.transform)?;
    Ok(CoarseAlignment {
        transform: best.transform,
        inliers: best.inliers,
        fitness_score: best.fitness_score,
        valid_samples,
    })
}

fn identity_trial(inliers: usize, fitness_score: f64) -> Trial {
    Trial {
        index: 0,
        transform: RigidTransform::identity(),
        inliers,
        fitness_score,
    }
}

/// Counts source points within `max_distance` of the target after `transform`,
/// and their mean squared distance.
pub fn score(
    transform: &RigidTransform,
    source_points: &[na::Vector3<f64>],
    target_index: &SpatialIndex,
    max_distance: f64,
) -> (usize, f64) {
    let (inliers, sse) = transformed_copy(transform, source_points)
        .iter()
        .filter_map(|p| target_index.get_closest_neighbor(p))
        .filter(|(_, d)| *d <= max_distance)
        .fold((0usize, 0.0), |(n, sse), (_, d)| (n + 1, sse + d * d));
    let fitness = if inliers > 0 {
        sse / inliers as f64
    } else {
        f64::INFINITY
    };
    (inliers, fitness)
}

/// Draws `sample_size` distinct source keypoints that are pairwise at least
/// `min_sample_distance` apart and not collinear, and pairs each with one of its
/// descriptor candidates. The target side has to use distinct keypoints that are
/// not collinear either. `None` once every attempt came out degenerate.
fn draw_sample(
    rng: &mut StdRng,
    sampleable: &[usize],
    candidates: &[Vec<usize>],
    source_points: &[na::Vector3<f64>],
    target_points: &[na::Vector3<f64>],
    params: &CoarseParams,
) -> Option<(Vec<na::Vector3<f64>>, Vec<na::Vector3<f64>>)> {
    for _ in 0..params.max_sample_attempts {
        let sample: Vec<usize> =
            rand::seq::index::sample(rng, sampleable.len(), params.sample_size)
                .into_iter()
                .map(|k| sampleable[k])
                .collect();
        let sample_source: Vec<_> = sample.iter().map(|&i| source_points[i]).collect();
        if !is_well_separated(&sample_source, params.min_sample_distance)
            || is_collinear(&sample_source)
        {
            continue;
        }

        let matched: Vec<usize> = sample
            .iter()
            .map(|&i| candidates[i][rng.random_range(0..candidates[i].len())])
            .collect();
        if has_repeats(&matched) {
            continue;
        }
        let sample_target: Vec<_> = matched.iter().map(|&j| target_points[j]).collect();
        if is_collinear(&sample_target) {
            continue;
        }
        return Some((sample_source, sample_target));
    }
    None
}

fn has_repeats(indices: &[usize]) -> bool {
    indices
        .iter()
        .enumerate()
        .any(|(i, a)| indices[i + 1..].contains(a))
}

fn is_well_separated(points: &[na::Vector3<f64>], min_distance: f64) -> bool {
    points.iter().enumerate().all(|(i, a)| {
        points[i + 1..]
            .iter()
            .all(|b| (a - b).norm() >= min_distance)
    })
}

/// True when all points lie on one line (or coincide), leaving the rotation
/// about that line undetermined.
fn is_collinear(points: &[na::Vector3<f64>]) -> bool {
    let Some((origin, rest)) = points.split_first() else {
        return true;
    };
    let Some(axis) = rest
        .iter()
        .map(|p| p - origin)
        .find(|d| d.norm() > f64::EPSILON)
    else {
        return true;
    };
    rest.iter().map(|p| p - origin).all(|d| {
        let scale = axis.norm() * d.norm();
        scale <= f64::EPSILON || axis.cross(&d).norm() <= MIN_SAMPLE_SINE * scale
    })
}

/// Every edge of the source sample has to be within `similarity` of the matching
/// edge on the target side.
fn edge_lengths_consistent(
    source: &[na::Vector3<f64>],
    target: &[na::Vector3<f64>],
    similarity: f64,
) -> bool {
    (0..source.len()).all(|i| {
        (i + 1..source.len()).all(|j| {
            let ls = (source[i] - source[j]).norm();
            let lt = (target[i] - target[j]).norm();
            ls >= similarity * lt && lt >= similarity * ls
        })
    })
}
