use std::path::Path;

use crate::{
    coarse::{self, CoarseAlignment},
    config::{self, InsufficientDataPolicy},
    error::{PipelineError, RegistrationError},
    features::{self, ObjectFeatures},
    filters,
    fine::{self, FineAlignment},
    io,
    loader::ScanLoader,
    point3d::PointCloud,
    rigid::RigidTransform,
};

/// Everything one registration run produced.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub coarse: CoarseAlignment,
    pub fine: FineAlignment,
    /// Source to target transform that was applied before merging.
    pub transform: RigidTransform,
    /// Transformed source followed by the target.
    pub merged: PointCloud,
    pub source_features: ObjectFeatures,
    pub target_features: ObjectFeatures,
}

/// Load, coarse align, refine, transform, merge.
pub struct RegistrationPipeline {
    config: config::Config,
}

impl RegistrationPipeline {
    pub fn new(config: config::Config) -> Result<RegistrationPipeline, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Config(e.into()))?;
        Ok(RegistrationPipeline { config })
    }

    pub fn default_values() -> RegistrationPipeline {
        RegistrationPipeline {
            config: config::Config::default_values(),
        }
    }

    pub fn config(&self) -> &config::Config {
        &self.config
    }

    /// Registers scan `source_name` onto scan `target_name`.
    pub fn run(
        &self,
        loader: &dyn ScanLoader,
        source_name: &str,
        target_name: &str,
    ) -> Result<RegistrationOutcome, PipelineError> {
        if self.config.max_num_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.max_num_threads)
                .build()?;
            pool.install(|| self.run_inner(loader, source_name, target_name))
        } else {
            self.run_inner(loader, source_name, target_name)
        }
    }

    /// Runs and hands the merged cloud to the pcd writer.
    pub fn run_and_save(
        &self,
        loader: &dyn ScanLoader,
        source_name: &str,
        target_name: &str,
        output: &Path,
    ) -> Result<RegistrationOutcome, PipelineError> {
        let outcome = self.run(loader, source_name, target_name)?;
        io::write_pcd(output, &outcome.merged).map_err(|source| PipelineError::Output {
            path: output.to_owned(),
            source: source.into(),
        })?;
        log::info!("saved registered clouds as {}", output.display());
        Ok(outcome)
    }

    fn run_inner(
        &self,
        loader: &dyn ScanLoader,
        source_name: &str,
        target_name: &str,
    ) -> Result<RegistrationOutcome, PipelineError> {
        let load = |name: &str| {
            loader.load_scan(name).map_err(|source| PipelineError::Load {
                name: name.to_owned(),
                source,
            })
        };
        let source = load(source_name)?;
        let target = load(target_name)?;
        log::info!(
            "loaded `{}` ({} points, {} keypoints) and `{}` ({} points, {} keypoints)",
            source_name,
            source.points.len(),
            source.keypoints.len(),
            target_name,
            target.points.len(),
            target.keypoints.len()
        );

        let source_features = features::compute_features(&source.points);
        let target_features = features::compute_features(&target.points);
        log::debug!("source features {:?}", source_features);
        log::debug!("target features {:?}", target_features);

        let coarse = match coarse::compute_initial_alignment(
            &source.keypoints,
            &source.descriptors,
            &target.keypoints,
            &target.descriptors,
            &self.config.coarse_params(),
        ) {
            Ok(coarse) => coarse,
            Err(e @ RegistrationError::InsufficientKeypoints { .. })
                if self.config.insufficient_data_policy == InsufficientDataPolicy::HoldLast =>
            {
                log::warn!("{}, continuing from identity", e);
                CoarseAlignment {
                    transform: RigidTransform::identity(),
                    inliers: 0,
                    fitness_score: f64::INFINITY,
                    valid_samples: 0,
                }
            }
            Err(e) => return Err(PipelineError::CoarseAlignment(e)),
        };
        log::info!(
            "computed initial alignment! ({} keypoint inliers)",
            coarse.inliers
        );

        let (fine_source, fine_target) = match self.config.fine_voxel_size {
            Some(voxel_size) => (
                filters::voxel_downsample(&source.points, voxel_size),
                filters::voxel_downsample(&target.points, voxel_size),
            ),
            None => (
                filters::remove_non_finite(&source.points),
                filters::remove_non_finite(&target.points),
            ),
        };
        let fine = fine::refine_alignment(
            &fine_source,
            &fine_target,
            &coarse.transform,
            &self.config.fine_params(),
        )
        .map_err(PipelineError::FineAlignment)?;
        log::info!(
            "refined alignment! ({} iterations, rmse {:.6}, converged {})",
            fine.iterations,
            fine.rmse,
            fine.converged
        );

        let transform = fine.transform;
        let mut merged = source.points;
        merged.transform(&transform);
        merged.merge(&target.points);

        Ok(RegistrationOutcome {
            coarse,
            fine,
            transform,
            merged,
            source_features,
            target_features,
        })
    }
}
