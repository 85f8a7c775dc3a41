use rayon::prelude::*;

use crate::error::RegistrationError;

/// Local geometry signature of a keypoint (33 bins for FPFH).
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Descriptor {
        Descriptor(values)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn distance_squared(&self, other: &Descriptor) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

impl From<Vec<f32>> for Descriptor {
    fn from(values: Vec<f32>) -> Self {
        Descriptor(values)
    }
}

/// Common length of all descriptors, or `None` if they disagree or the slice is empty.
pub fn common_dimension(descriptors: &[Descriptor]) -> Option<usize> {
    let first = descriptors.first()?.len();
    descriptors
        .iter()
        .all(|d| d.len() == first)
        .then_some(first)
}

/// Length shared by every descriptor in `descriptors`, `None` when empty.
fn checked_dimension(
    descriptors: &[Descriptor],
    side: &'static str,
) -> Result<Option<usize>, RegistrationError> {
    let Some(first) = descriptors.first() else {
        return Ok(None);
    };
    match descriptors.iter().position(|d| d.len() != first.len()) {
        Some(index) => Err(RegistrationError::RaggedDescriptors {
            side,
            index,
            expected: first.len(),
            found: descriptors[index].len(),
        }),
        None => Ok(Some(first.len())),
    }
}

/// For every source descriptor, the indices of its `k` closest target descriptors
/// (L2 in descriptor space), closest first.
///
/// Source descriptors containing NaN get an empty candidate list; non finite
/// target descriptors are never returned.
pub fn k_nearest_descriptors(
    source: &[Descriptor],
    target: &[Descriptor],
    k: usize,
) -> Result<Vec<Vec<usize>>, RegistrationError> {
    if k == 0 {
        return Err(RegistrationError::InvalidParameter(
            "correspondence randomness must be at least 1".to_owned(),
        ));
    }
    let source_dim = checked_dimension(source, "source")?;
    let target_dim = checked_dimension(target, "target")?;
    if let (Some(source_dim), Some(target_dim)) = (source_dim, target_dim) {
        if source_dim != target_dim {
            return Err(RegistrationError::DescriptorDimension {
                source_dim,
                target_dim,
            });
        }
    }

    let candidates = source
        .par_iter()
        .map(|query| {
            if !query.is_finite() {
                return Vec::new();
            }
            let mut nearest: Vec<(f32, usize)> = Vec::with_capacity(k + 1);
            for (j, candidate) in target.iter().enumerate() {
                if !candidate.is_finite() {
                    continue;
                }
                let d = query.distance_squared(candidate);
                if nearest.len() == k && d >= nearest[k - 1].0 {
                    continue;
                }
                let at = nearest.partition_point(|(nd, _)| *nd <= d);
                nearest.insert(at, (d, j));
                nearest.truncate(k);
            }
            nearest.into_iter().map(|(_, j)| j).collect()
        })
        .collect();
    Ok(candidates)
}
