use nalgebra as na;
use rand::{rngs::StdRng, Rng, SeedableRng};
use simple_register::{
    coarse,
    config::{Config, FineParams, InsufficientDataPolicy},
    descriptor::Descriptor,
    fine,
    loader::{MemoryScanLoader, Scan},
    pipeline::RegistrationPipeline,
    point3d::{Point3d, PointCloud},
    rigid::{self, RigidTransform},
};

/// 8x8x8 grid, 0.1 spacing, centred on the origin, with small jitter.
fn room(rng: &mut StdRng) -> PointCloud {
    let mut points = Vec::with_capacity(512);
    for x in 0..8 {
        for y in 0..8 {
            for z in 0..8 {
                let mut c = |v: i32| (v as f32 - 3.5) * 0.1 + rng.random_range(-0.005..0.005);
                let (px, py, pz) = (c(x), c(y), c(z));
                points.push(Point3d::new(px, py, pz));
            }
        }
    }
    PointCloud::new(points)
}

fn keypoints_of(cloud: &PointCloud, step: usize) -> PointCloud {
    PointCloud::new(cloud.points().iter().step_by(step).copied().collect())
}

fn random_descriptors(rng: &mut StdRng, n: usize) -> Vec<Descriptor> {
    (0..n)
        .map(|_| Descriptor::new((0..33).map(|_| rng.random::<f32>()).collect()))
        .collect()
}

fn assert_rigid(t: &RigidTransform) {
    let r = t.rotation.to_rotation_matrix();
    let m = r.matrix();
    assert!((m.transpose() * m - na::Matrix3::identity()).norm() < 1e-9);
    assert!((m.determinant() - 1.0).abs() < 1e-9);
    rigid::validate_rigid(t).unwrap();
}

#[test]
fn rotated_and_shifted_scan_is_recovered() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(11);
    let target = room(&mut rng);
    // source = target rotated 30 degrees about z then moved by (1, 0, 0)
    let motion = RigidTransform::new(
        na::Vector3::new(1.0, 0.0, 0.0),
        na::Vector3::z() * 30f64.to_radians(),
    );
    let mut source = target.clone();
    source.transform(&motion);

    let target_keypoints = keypoints_of(&target, 8);
    let source_keypoints = keypoints_of(&source, 8);
    let descriptors = random_descriptors(&mut rng, target_keypoints.len());

    let mut loader = MemoryScanLoader::new();
    loader.insert(
        "room1",
        Scan {
            points: source,
            keypoints: source_keypoints,
            descriptors: descriptors.clone(),
        },
    );
    loader.insert(
        "room2",
        Scan {
            points: target.clone(),
            keypoints: target_keypoints,
            descriptors,
        },
    );

    let mut config = Config::default_values();
    config.coarse_iterations = 200;
    let outcome = RegistrationPipeline::new(config)?.run(&loader, "room1", "room2")?;

    assert_rigid(&outcome.coarse.transform);
    assert_rigid(&outcome.transform);
    let error = motion * outcome.transform;
    assert!(error.rotation.angle() < 0.5f64.to_radians());
    assert!(error.translation.vector.norm() < 1e-3);
    assert!(outcome.fine.converged);

    // aligned source lands on the target
    let aligned = &outcome.merged.points()[..target.len()];
    for (a, t) in aligned.iter().zip(target.points()) {
        assert!((a.to_na_vec_f64() - t.to_na_vec_f64()).norm() < 1e-3);
    }
    Ok(())
}

#[test]
fn identical_scans_give_identity() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(12);
    let cloud = room(&mut rng);
    let keypoints = keypoints_of(&cloud, 10);
    let descriptors = random_descriptors(&mut rng, keypoints.len());

    let params = Config::default_values().coarse_params();
    let coarse = coarse::compute_initial_alignment(
        &keypoints,
        &descriptors,
        &keypoints,
        &descriptors,
        &params,
    )?;
    assert!(rigid::motion_magnitude(&coarse.transform) < 1e-9);

    let fine = fine::refine_alignment(
        &cloud,
        &cloud,
        &coarse.transform,
        &Config::default_values().fine_params(),
    )?;
    assert!(rigid::motion_magnitude(&fine.transform) < 1e-9);
    assert_rigid(&fine.transform);
    Ok(())
}

#[test]
fn outliers_in_source_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(13);
    let target = room(&mut rng);
    let motion = RigidTransform::new(
        na::Vector3::new(-0.01, 0.008, 0.005),
        na::Vector3::new(1.0, 0.2, 0.4).normalize() * 1f64.to_radians(),
    );
    let mut source = target.clone();
    source.transform(&motion);

    // 20% extra points well away from the room
    let outliers = (0..target.len() / 4).map(|_| {
        Point3d::new(
            rng.random_range(0.7..1.1),
            rng.random_range(-0.35..0.35),
            rng.random_range(-0.35..0.35),
        )
    });
    let mut points = source.into_points();
    points.extend(outliers);
    let source = PointCloud::new(points);
    assert_eq!(source.len(), 640);

    let params = FineParams {
        max_correspondence_distance: 0.5,
        outlier_rejection_threshold: 1.0,
        convergence_epsilon: 1e-6,
        max_iterations: 100,
        min_correspondences: 6,
        insufficient_data_policy: InsufficientDataPolicy::Abort,
    };
    let result = fine::refine_alignment(&source, &target, &RigidTransform::identity(), &params)?;

    assert!(result.converged);
    assert!(result.inliers >= 460);
    assert!(result.inliers <= 512);
    let error = motion * result.transform;
    assert!(error.rotation.angle() < 0.5f64.to_radians());
    assert!(error.translation.vector.norm() < 1e-3);
    assert_rigid(&result.transform);
    Ok(())
}

#[test]
fn coarse_alignment_is_not_worse_than_identity() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(14);
    let target = room(&mut rng);
    let motion = RigidTransform::new(na::Vector3::new(0.2, 0.1, 0.0), na::Vector3::y() * 0.4);
    let mut source = target.clone();
    source.transform(&motion);
    let source_keypoints = keypoints_of(&source, 16);
    let target_keypoints = keypoints_of(&target, 16);
    // unrelated descriptors: poorly posed matching
    let source_descriptors = random_descriptors(&mut rng, source_keypoints.len());
    let target_descriptors = random_descriptors(&mut rng, target_keypoints.len());

    let params = Config::default_values().coarse_params();
    let result = coarse::compute_initial_alignment(
        &source_keypoints,
        &source_descriptors,
        &target_keypoints,
        &target_descriptors,
        &params,
    )?;
    let target_index =
        simple_register::spatial_index::SpatialIndex::from_na_points(&target_keypoints.to_na_points());
    let (identity_inliers, _) = coarse::score(
        &RigidTransform::identity(),
        &source_keypoints.to_na_points(),
        &target_index,
        params.max_correspondence_distance,
    );
    assert!(result.inliers >= identity_inliers);
    assert_rigid(&result.transform);
    Ok(())
}
