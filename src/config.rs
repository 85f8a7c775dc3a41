use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;

/// What to do when an aligner does not get enough data to estimate a transform.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientDataPolicy {
    /// Report the error and stop the run.
    Abort,
    /// Keep the last good transform (identity for the coarse stage) and go on.
    HoldLast,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    // coarse params
    pub min_sample_distance: f64,
    pub coarse_max_correspondence_distance: f64,
    pub coarse_iterations: usize,
    pub sample_size: usize,
    pub correspondence_randomness: usize,
    pub max_sample_attempts: usize,
    pub edge_length_similarity: Option<f64>,

    // fine params
    pub fine_max_correspondence_distance: f64,
    pub outlier_rejection_threshold: f64,
    pub convergence_epsilon: f64,
    pub fine_max_iterations: usize,
    pub min_fine_correspondences: usize,
    pub fine_voxel_size: Option<f32>,

    pub insufficient_data_policy: InsufficientDataPolicy,
    pub seed: u64,
    pub max_num_threads: usize,
}

impl Config {
    pub fn default_values() -> Config {
        Config {
            min_sample_distance: 0.0001,
            coarse_max_correspondence_distance: 0.05,
            coarse_iterations: 1000,
            sample_size: 3,
            correspondence_randomness: 1,
            max_sample_attempts: 100,
            edge_length_similarity: None,

            fine_max_correspondence_distance: 0.01,
            outlier_rejection_threshold: 10.0,
            convergence_epsilon: 1e-6,
            fine_max_iterations: 500,
            min_fine_correspondences: 6,
            fine_voxel_size: None,

            insufficient_data_policy: InsufficientDataPolicy::Abort,
            seed: 42,
            max_num_threads: 0,
        }
    }

    pub fn coarse_params(&self) -> CoarseParams {
        CoarseParams {
            min_sample_distance: self.min_sample_distance,
            max_correspondence_distance: self.coarse_max_correspondence_distance,
            iterations: self.coarse_iterations,
            sample_size: self.sample_size,
            correspondence_randomness: self.correspondence_randomness,
            max_sample_attempts: self.max_sample_attempts,
            edge_length_similarity: self.edge_length_similarity,
            seed: self.seed,
        }
    }

    pub fn fine_params(&self) -> FineParams {
        FineParams {
            max_correspondence_distance: self.fine_max_correspondence_distance,
            outlier_rejection_threshold: self.outlier_rejection_threshold,
            convergence_epsilon: self.convergence_epsilon,
            max_iterations: self.fine_max_iterations,
            min_correspondences: self.min_fine_correspondences,
            insufficient_data_policy: self.insufficient_data_policy,
        }
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        self.coarse_params().validate()?;
        self.fine_params().validate()?;
        if let Some(voxel_size) = self.fine_voxel_size {
            if !(voxel_size > 0.0) {
                return Err(invalid(format!("fine_voxel_size must be > 0, got {voxel_size}")));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::default_values()
    }
}

fn invalid(msg: String) -> RegistrationError {
    RegistrationError::InvalidParameter(msg)
}

/// Sample consensus initial alignment parameters.
#[derive(Debug, Clone)]
pub struct CoarseParams {
    /// Minimum pairwise distance between the keypoints of one sample.
    pub min_sample_distance: f64,
    /// Inlier radius used to score a candidate transform.
    pub max_correspondence_distance: f64,
    /// Number of sampling trials.
    pub iterations: usize,
    /// Keypoints drawn per trial.
    pub sample_size: usize,
    /// Each sampled keypoint is matched to one of its k nearest descriptors.
    pub correspondence_randomness: usize,
    /// Redraw budget per trial before the trial is dropped as degenerate.
    pub max_sample_attempts: usize,
    /// Reject samples whose edge lengths disagree between the two clouds by more
    /// than this ratio. `None` accepts every well separated sample.
    pub edge_length_similarity: Option<f64>,
    pub seed: u64,
}

impl CoarseParams {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !(self.min_sample_distance >= 0.0) {
            return Err(invalid(format!(
                "min_sample_distance must be >= 0, got {}",
                self.min_sample_distance
            )));
        }
        if !(self.max_correspondence_distance > 0.0) {
            return Err(invalid(format!(
                "coarse max_correspondence_distance must be > 0, got {}",
                self.max_correspondence_distance
            )));
        }
        if self.iterations == 0 || self.max_sample_attempts == 0 {
            return Err(invalid("coarse iterations and sample attempts must be > 0".to_owned()));
        }
        if self.sample_size < 3 {
            return Err(invalid(format!(
                "sample_size must be >= 3, got {}",
                self.sample_size
            )));
        }
        if self.correspondence_randomness == 0 {
            return Err(invalid("correspondence_randomness must be >= 1".to_owned()));
        }
        if let Some(similarity) = self.edge_length_similarity {
            if !(similarity > 0.0 && similarity <= 1.0) {
                return Err(invalid(format!(
                    "edge_length_similarity must be in (0, 1], got {similarity}"
                )));
            }
        }
        Ok(())
    }
}

/// Iterative closest point parameters.
#[derive(Debug, Clone)]
pub struct FineParams {
    /// Correspondences farther apart than this are dropped.
    pub max_correspondence_distance: f64,
    /// Correspondences beyond `mean + k * std` of the iteration are dropped.
    pub outlier_rejection_threshold: f64,
    /// Stop once the increment's angle plus translation norm falls below this.
    pub convergence_epsilon: f64,
    pub max_iterations: usize,
    pub min_correspondences: usize,
    pub insufficient_data_policy: InsufficientDataPolicy,
}

impl FineParams {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if !(self.max_correspondence_distance > 0.0) {
            return Err(invalid(format!(
                "fine max_correspondence_distance must be > 0, got {}",
                self.max_correspondence_distance
            )));
        }
        if !(self.outlier_rejection_threshold > 0.0) {
            return Err(invalid(format!(
                "outlier_rejection_threshold must be > 0, got {}",
                self.outlier_rejection_threshold
            )));
        }
        if !(self.convergence_epsilon >= 0.0) {
            return Err(invalid(format!(
                "convergence_epsilon must be >= 0, got {}",
                self.convergence_epsilon
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("fine max_iterations must be > 0".to_owned()));
        }
        if self.min_correspondences < 3 {
            return Err(invalid(format!(
                "min_correspondences must be >= 3, got {}",
                self.min_correspondences
            )));
        }
        Ok(())
    }
}
