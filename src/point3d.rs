use nalgebra as na;
use rayon::prelude::*;

use crate::rigid::RigidTransform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    /// Unpacks the PCL convention of storing `0x00RRGGBB` in the bits of an f32.
    pub fn from_packed_f32(rgb: f32) -> Rgb {
        let bits = rgb.to_bits();
        Rgb {
            r: ((bits >> 16) & 0xff) as u8,
            g: ((bits >> 8) & 0xff) as u8,
            b: (bits & 0xff) as u8,
        }
    }

    pub fn to_packed_f32(self) -> f32 {
        f32::from_bits(((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3d {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub color: Option<Rgb>,
}

impl Point3d {
    pub fn new(x: f32, y: f32, z: f32) -> Point3d {
        Point3d {
            x,
            y,
            z,
            color: None,
        }
    }
    pub fn with_color(self, color: Rgb) -> Point3d {
        Point3d {
            color: Some(color),
            ..self
        }
    }
    pub fn from_na_vec_f64(v: &na::Vector3<f64>) -> Point3d {
        Point3d::new(v.x as f32, v.y as f32, v.z as f32)
    }
    pub fn to_na_vec_f64(&self) -> na::Vector3<f64> {
        na::Vector3::<f64>::new(self.x as f64, self.y as f64, self.z as f64)
    }
    pub fn to_na_point3_f64(&self) -> na::Point3<f64> {
        na::Point3::<f64>::new(self.x as f64, self.y as f64, self.z as f64)
    }
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Ordered sequence of points. Indices are stable so they can be used to address
/// correspondences and keypoint/descriptor pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point3d>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3d>) -> PointCloud {
        PointCloud { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3d] {
        &self.points
    }

    pub fn into_points(self) -> Vec<Point3d> {
        self.points
    }

    pub fn to_na_points(&self) -> Vec<na::Vector3<f64>> {
        self.points.par_iter().map(|p| p.to_na_vec_f64()).collect()
    }

    /// Moves every point by `transform` in place. Colours are kept.
    pub fn transform(&mut self, transform: &RigidTransform) {
        self.points.par_iter_mut().for_each(|pt| {
            let transformed_pt = transform.transform_point(&pt.to_na_point3_f64());
            pt.x = transformed_pt.x as f32;
            pt.y = transformed_pt.y as f32;
            pt.z = transformed_pt.z as f32;
        });
    }

    /// Appends all points of `other` after the existing ones.
    pub fn merge(&mut self, other: &PointCloud) {
        self.points.extend_from_slice(&other.points);
    }
}

impl From<Vec<Point3d>> for PointCloud {
    fn from(points: Vec<Point3d>) -> Self {
        PointCloud::new(points)
    }
}

/// Applies `transform` to a copy of `points`, leaving the input untouched.
pub fn transformed_copy(
    transform: &RigidTransform,
    points: &[na::Vector3<f64>],
) -> Vec<na::Vector3<f64>> {
    points
        .par_iter()
        .map(|p| transform.transform_vector(p) + transform.translation.vector)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_packed_rgb() {
        let c = Rgb::new(12, 200, 255);
        assert_eq!(Rgb::from_packed_f32(c.to_packed_f32()), c);
    }

    #[test]
    fn test_transform_and_merge() {
        let mut src = PointCloud::new(vec![
            Point3d::new(1.0, 0.0, 0.0).with_color(Rgb::new(255, 0, 0)),
            Point3d::new(0.0, 1.0, 0.0),
        ]);
        let tgt = PointCloud::new(vec![Point3d::new(5.0, 5.0, 5.0)]);
        let t = RigidTransform::new(
            na::Vector3::new(1.0, 2.0, 3.0),
            na::Vector3::z() * std::f64::consts::FRAC_PI_2,
        );
        src.transform(&t);
        assert_relative_eq!(src.points()[0].x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(src.points()[0].y, 3.0, epsilon = 1e-6);
        assert_relative_eq!(src.points()[1].x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(src.points()[1].y, 2.0, epsilon = 1e-6);
        assert_eq!(src.points()[0].color, Some(Rgb::new(255, 0, 0)));

        src.merge(&tgt);
        assert_eq!(src.len(), 3);
        assert_eq!(src.points()[2], Point3d::new(5.0, 5.0, 5.0));
    }

    #[test]
    fn test_transformed_copy_keeps_input() {
        let pts = vec![na::Vector3::new(1.0, 2.0, 3.0)];
        let t = RigidTransform::translation(1.0, 0.0, 0.0);
        let moved = transformed_copy(&t, &pts);
        assert_relative_eq!(moved[0], na::Vector3::new(2.0, 2.0, 3.0));
        assert_relative_eq!(pts[0], na::Vector3::new(1.0, 2.0, 3.0));
    }
}
