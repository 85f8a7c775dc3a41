use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use crate::{
    descriptor::{self, Descriptor},
    error::LoadError,
    io,
    point3d::PointCloud,
};

/// Dense points, keypoints and keypoint descriptors of one scan.
/// `descriptors[i]` describes `keypoints[i]`.
#[derive(Debug, Clone)]
pub struct Scan {
    pub points: PointCloud,
    pub keypoints: PointCloud,
    pub descriptors: Vec<Descriptor>,
}

/// Source of named scans.
pub trait ScanLoader: Send + Sync {
    fn load_points(&self, name: &str) -> Result<PointCloud, LoadError>;
    fn load_keypoints(&self, name: &str) -> Result<PointCloud, LoadError>;
    fn load_local_descriptors(&self, name: &str) -> Result<Vec<Descriptor>, LoadError>;

    /// Loads all three parts and checks keypoints and descriptors line up.
    fn load_scan(&self, name: &str) -> Result<Scan, LoadError> {
        let points = self.load_points(name)?;
        if points.is_empty() {
            return Err(LoadError::Empty {
                name: name.to_owned(),
            });
        }
        let keypoints = self.load_keypoints(name)?;
        let descriptors = self.load_local_descriptors(name)?;
        check_descriptors(name, &keypoints, &descriptors)?;
        Ok(Scan {
            points,
            keypoints,
            descriptors,
        })
    }
}

fn check_descriptors(
    name: &str,
    keypoints: &PointCloud,
    descriptors: &[Descriptor],
) -> Result<(), LoadError> {
    if keypoints.len() != descriptors.len() {
        return Err(LoadError::KeypointDescriptorMismatch {
            name: name.to_owned(),
            keypoints: keypoints.len(),
            descriptors: descriptors.len(),
        });
    }
    if descriptor::common_dimension(descriptors).is_none() {
        if let Some(first) = descriptors.first() {
            let (index, found) = descriptors
                .iter()
                .enumerate()
                .find(|(_, d)| d.len() != first.len())
                .map(|(i, d)| (i, d.len()))
                .unwrap_or((0, first.len()));
            return Err(LoadError::DescriptorDimension {
                name: name.to_owned(),
                index,
                expected: first.len(),
                found,
            });
        }
    }
    Ok(())
}

/// Reads `<root>/<name>.pcd`, `<root>/<name>_keypoints.pcd` and
/// `<root>/<name>_fpfh.pcd`.
#[derive(Debug, Clone)]
pub struct PcdScanLoader {
    root: PathBuf,
}

impl PcdScanLoader {
    pub fn new(root: impl Into<PathBuf>) -> PcdScanLoader {
        PcdScanLoader { root: root.into() }
    }

    pub fn points_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.pcd"))
    }

    pub fn keypoints_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}_keypoints.pcd"))
    }

    pub fn descriptors_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}_fpfh.pcd"))
    }

    fn read<T>(
        &self,
        name: &str,
        path: PathBuf,
        read: impl FnOnce(&Path) -> anyhow::Result<T>,
    ) -> Result<T, LoadError> {
        if !path.is_file() {
            return Err(LoadError::Missing {
                name: name.to_owned(),
                path,
            });
        }
        log::debug!("reading {}", path.display());
        read(&path).map_err(|source| LoadError::Pcd {
            name: name.to_owned(),
            path,
            source: source.into(),
        })
    }
}

impl ScanLoader for PcdScanLoader {
    fn load_points(&self, name: &str) -> Result<PointCloud, LoadError> {
        self.read(name, self.points_path(name), io::read_pcd_to_points)
    }

    fn load_keypoints(&self, name: &str) -> Result<PointCloud, LoadError> {
        self.read(name, self.keypoints_path(name), io::read_pcd_to_points)
    }

    fn load_local_descriptors(&self, name: &str) -> Result<Vec<Descriptor>, LoadError> {
        self.read(name, self.descriptors_path(name), io::read_pcd_to_descriptors)
    }
}

/// Scans held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryScanLoader {
    scans: HashMap<String, Scan>,
}

impl MemoryScanLoader {
    pub fn new() -> MemoryScanLoader {
        MemoryScanLoader::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, scan: Scan) {
        self.scans.insert(name.into(), scan);
    }

    fn get(&self, name: &str) -> Result<&Scan, LoadError> {
        self.scans.get(name).ok_or_else(|| LoadError::UnknownScan {
            name: name.to_owned(),
        })
    }
}

impl ScanLoader for MemoryScanLoader {
    fn load_points(&self, name: &str) -> Result<PointCloud, LoadError> {
        Ok(self.get(name)?.points.clone())
    }

    fn load_keypoints(&self, name: &str) -> Result<PointCloud, LoadError> {
        Ok(self.get(name)?.keypoints.clone())
    }

    fn load_local_descriptors(&self, name: &str) -> Result<Vec<Descriptor>, LoadError> {
        Ok(self.get(name)?.descriptors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point3d::{Point3d, Rgb};

    fn tiny_scan() -> Scan {
        Scan {
            points: PointCloud::new(vec![
                Point3d::new(0.0, 0.0, 0.0).with_color(Rgb::new(1, 2, 3)),
                Point3d::new(1.0, 0.0, 0.0),
            ]),
            keypoints: PointCloud::new(vec![Point3d::new(0.0, 0.0, 0.0)]),
            descriptors: vec![Descriptor::new(vec![0.5; io::FPFH_BINS])],
        }
    }

    #[test]
    fn test_memory_loader() -> Result<(), Box<dyn std::error::Error>> {
        let mut loader = MemoryScanLoader::new();
        loader.insert("room1", tiny_scan());
        let scan = loader.load_scan("room1")?;
        assert_eq!(scan.points.len(), 2);
        assert!(matches!(
            loader.load_scan("room3"),
            Err(LoadError::UnknownScan { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_mismatched_descriptors() {
        let mut scan = tiny_scan();
        scan.descriptors.push(Descriptor::new(vec![0.0; io::FPFH_BINS]));
        let mut loader = MemoryScanLoader::new();
        loader.insert("room1", scan);
        assert!(matches!(
            loader.load_scan("room1"),
            Err(LoadError::KeypointDescriptorMismatch {
                keypoints: 1,
                descriptors: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_inconsistent_descriptor_length() {
        let mut scan = tiny_scan();
        scan.keypoints = PointCloud::new(vec![Point3d::new(0.0, 0.0, 0.0); 2]);
        scan.descriptors.push(Descriptor::new(vec![0.0; 10]));
        let mut loader = MemoryScanLoader::new();
        loader.insert("room1", scan);
        assert!(matches!(
            loader.load_scan("room1"),
            Err(LoadError::DescriptorDimension {
                index: 1,
                expected: 33,
                found: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_scan_is_rejected() {
        let mut scan = tiny_scan();
        scan.points = PointCloud::default();
        let mut loader = MemoryScanLoader::new();
        loader.insert("room1", scan);
        assert!(matches!(loader.load_scan("room1"), Err(LoadError::Empty { .. })));
    }

    #[test]
    fn test_pcd_loader() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let loader = PcdScanLoader::new(dir.path());
        let scan = tiny_scan();
        io::write_pcd(&loader.points_path("room1"), &scan.points)?;
        io::write_pcd(&loader.keypoints_path("room1"), &scan.keypoints)?;
        io::write_descriptors_pcd(&loader.descriptors_path("room1"), &[[0.5; io::FPFH_BINS]])?;

        let back = loader.load_scan("room1")?;
        assert_eq!(back.points.points()[0].color, Some(Rgb::new(1, 2, 3)));
        assert_eq!(back.keypoints.len(), 1);
        assert_eq!(back.descriptors, scan.descriptors);

        assert!(matches!(
            loader.load_scan("room2"),
            Err(LoadError::Missing { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_unreadable_pcd_keeps_the_cause() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let loader = PcdScanLoader::new(dir.path());
        std::fs::write(loader.points_path("room1"), "not a pcd file\n")?;
        match loader.load_points("room1") {
            Err(LoadError::Pcd { name, path, source }) => {
                assert_eq!(name, "room1");
                assert_eq!(path, loader.points_path("room1"));
                assert!(!source.to_string().is_empty());
            }
            other => panic!("unexpected {:?}", other.map(|c| c.len())),
        }
        Ok(())
    }
}
