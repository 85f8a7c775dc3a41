use std::path::PathBuf;

/// Failure to produce a scan from its backing store.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("scan `{name}`: file {} not found", .path.display())]
    Missing { name: String, path: PathBuf },

    #[error("scan `{name}`: cannot read {}", .path.display())]
    Pcd {
        name: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("scan `{name}` is not registered")]
    UnknownScan { name: String },

    #[error("scan `{name}` has no points")]
    Empty { name: String },

    #[error("scan `{name}`: {keypoints} keypoints but {descriptors} descriptors")]
    KeypointDescriptorMismatch {
        name: String,
        keypoints: usize,
        descriptors: usize,
    },

    #[error("scan `{name}`: descriptor {index} has length {found}, expected {expected}")]
    DescriptorDimension {
        name: String,
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Failure of one of the aligners to estimate a transform.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("need at least {required} keypoints, found {found}")]
    InsufficientKeypoints { required: usize, found: usize },

    #[error("iteration {iteration}: {found} inlying correspondences, need at least {required}")]
    InsufficientCorrespondences {
        iteration: usize,
        required: usize,
        found: usize,
    },

    #[error("{keypoints} keypoints but {descriptors} descriptors")]
    DescriptorMismatch { keypoints: usize, descriptors: usize },

    #[error("descriptor dimensions differ: source {source_dim}, target {target_dim}")]
    DescriptorDimension { source_dim: usize, target_dim: usize },

    #[error("{side} descriptor {index} has length {found}, expected {expected}")]
    RaggedDescriptors {
        side: &'static str,
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("transform is not rigid: |RtR - I| = {orthogonality_error:e}, det(R) = {determinant}")]
    NonRigidTransform {
        orthogonality_error: f64,
        determinant: f64,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Failure reading or writing the json configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot access config file")]
    Io(#[from] std::io::Error),

    #[error("malformed config json")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] RegistrationError),
}

/// Pipeline failure, tagged with the stage it happened in.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("loading `{name}` failed")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    #[error("coarse alignment failed")]
    CoarseAlignment(#[source] RegistrationError),

    #[error("fine alignment failed")]
    FineAlignment(#[source] RegistrationError),

    #[error("writing {} failed", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
