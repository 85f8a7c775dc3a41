use nalgebra as na;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::point3d::{PointCloud, Point3d, Rgb};

pub type Voxel = na::Vector3<i32>;

pub fn point_to_voxel(point: &Point3d, voxel_size: f32) -> Voxel {
    Voxel::new(
        (point.x / voxel_size).floor() as i32,
        (point.y / voxel_size).floor() as i32,
        (point.z / voxel_size).floor() as i32,
    )
}

#[derive(Default)]
struct VoxelAccumulator {
    sum: na::Vector3<f64>,
    color_sum: na::Vector3<f64>,
    colored: usize,
    count: usize,
}

impl VoxelAccumulator {
    fn add(&mut self, pt: &Point3d) {
        self.sum += pt.to_na_vec_f64();
        self.count += 1;
        if let Some(c) = pt.color {
            self.color_sum += na::Vector3::new(c.r as f64, c.g as f64, c.b as f64);
            self.colored += 1;
        }
    }

    fn centroid(&self) -> Point3d {
        let mut pt = Point3d::from_na_vec_f64(&(self.sum / self.count as f64));
        if self.colored > 0 {
            let c = self.color_sum / self.colored as f64;
            pt.color = Some(Rgb::new(
                c.x.round() as u8,
                c.y.round() as u8,
                c.z.round() as u8,
            ));
        }
        pt
    }
}

/// Replaces the points of every occupied voxel by their centroid. Output order
/// follows the first point seen in each voxel.
pub fn voxel_downsample(point_cloud: &PointCloud, voxel_size: f32) -> PointCloud {
    let mut slots: HashMap<Voxel, usize> = HashMap::new();
    let mut voxels: Vec<VoxelAccumulator> = Vec::new();
    for pt in point_cloud.points().iter().filter(|p| p.is_finite()) {
        let slot = *slots.entry(point_to_voxel(pt, voxel_size)).or_insert_with(|| {
            voxels.push(VoxelAccumulator::default());
            voxels.len() - 1
        });
        voxels[slot].add(pt);
    }
    PointCloud::new(voxels.iter().map(VoxelAccumulator::centroid).collect())
}

/// Drops points with a NaN or infinite coordinate.
pub fn remove_non_finite(point_cloud: &PointCloud) -> PointCloud {
    PointCloud::new(
        point_cloud
            .points()
            .par_iter()
            .filter(|pt| pt.is_finite())
            .copied()
            .collect(),
    )
}
