use pcd_rs::{DataKind, PcdDeserialize, PcdSerialize, WriterInit};
use std::{
    fs,
    io::{BufReader, Write},
    path::Path,
};

use crate::{
    config,
    descriptor::Descriptor,
    error::ConfigError,
    point3d::{Point3d, PointCloud, Rgb},
};

/// PCL `PointXYZRGB` layout, colour packed into the bits of a float.
#[derive(PcdDeserialize, PcdSerialize, Debug, Clone, Copy)]
pub struct PcdPointXyzRgb {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rgb: f32,
}

#[derive(PcdDeserialize, Debug, Clone, Copy)]
pub struct PcdPointXyz {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub const FPFH_BINS: usize = 33;

/// `fpfh` descriptor field with whatever bin count the file declares.
#[derive(PcdDeserialize, Debug, Clone)]
pub struct PcdFpfh {
    pub fpfh: Vec<f32>,
}

/// PCL `FPFHSignature33` layout.
#[derive(PcdSerialize, Debug, Clone, Copy)]
pub struct PcdFpfh33 {
    pub fpfh: [f32; 33],
}

impl From<PcdPointXyzRgb> for Point3d {
    fn from(p: PcdPointXyzRgb) -> Self {
        Point3d::new(p.x, p.y, p.z).with_color(Rgb::from_packed_f32(p.rgb))
    }
}

impl From<PcdPointXyz> for Point3d {
    fn from(p: PcdPointXyz) -> Self {
        Point3d::new(p.x, p.y, p.z)
    }
}

impl From<&Point3d> for PcdPointXyzRgb {
    fn from(p: &Point3d) -> Self {
        PcdPointXyzRgb {
            x: p.x,
            y: p.y,
            z: p.z,
            rgb: p.color.unwrap_or_default().to_packed_f32(),
        }
    }
}

pub fn json_to_config(path: impl AsRef<Path>) -> Result<config::Config, ConfigError> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let config: config::Config = serde_json::from_reader(reader)?;
    config.validate()?;
    Ok(config)
}

pub fn write_config_json(
    path: impl AsRef<Path>,
    config: &config::Config,
) -> Result<(), ConfigError> {
    let j = serde_json::to_string_pretty(&config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Reads XYZRGB points, falling back to plain XYZ when the file has no `rgb` field.
pub fn read_pcd_to_points(pcd_path: &Path) -> anyhow::Result<PointCloud> {
    let points = match pcd_rs::Reader::<PcdPointXyzRgb, _>::open(pcd_path) {
        Ok(reader) => reader
            .map(|p| p.map(Point3d::from))
            .collect::<Result<Vec<_>, _>>()?,
        Err(_) => pcd_rs::Reader::<PcdPointXyz, _>::open(pcd_path)?
            .map(|p| p.map(Point3d::from))
            .collect::<Result<Vec<_>, _>>()?,
    };
    Ok(PointCloud::new(points))
}

pub fn read_pcd_to_descriptors(pcd_path: &Path) -> anyhow::Result<Vec<Descriptor>> {
    pcd_rs::Reader::<PcdFpfh, _>::open(pcd_path)?
        .map(|d| d.map(|d| Descriptor::new(d.fpfh)))
        .collect()
}

/// Writes `cloud` as binary XYZRGB; points without colour get black.
pub fn write_pcd(pcd_path: &Path, cloud: &PointCloud) -> anyhow::Result<()> {
    let mut writer = WriterInit {
        width: cloud.len() as u64,
        height: 1,
        viewpoint: Default::default(),
        data_kind: DataKind::Binary,
        schema: None,
    }
    .create(pcd_path)?;
    for pt in cloud.points() {
        writer.push(&PcdPointXyzRgb::from(pt))?;
    }
    writer.finish()?;
    Ok(())
}

/// Writes FPFH signatures in the layout read by [`read_pcd_to_descriptors`].
pub fn write_descriptors_pcd(
    pcd_path: &Path,
    descriptors: &[[f32; FPFH_BINS]],
) -> anyhow::Result<()> {
    let mut writer = WriterInit {
        width: descriptors.len() as u64,
        height: 1,
        viewpoint: Default::default(),
        data_kind: DataKind::Ascii,
        schema: None,
    }
    .create(pcd_path)?;
    for d in descriptors {
        writer.push(&PcdFpfh33 { fpfh: *d })?;
    }
    writer.finish()?;
    Ok(())
}
