use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use scenephys_3d::pose::Isometry;
use serde::{Deserialize, Serialize};

use crate::confidence::{coverage_confidence, divergence_decay, pose_divergence};
use crate::correspondence::CorrespondenceCloud;

/// Stable identity of a simulated rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Wrap a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    pub const fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registration result kept for one object between simulation steps.
///
/// `targets[i]` is the registered world position of model sample `i`, or
/// `None` when the scene did not support that sample. The confidence is
/// computed from the targets on construction so the two never go out of sync.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCorrespondence {
    model_name: String,
    targets: Vec<Option<[f64; 3]>>,
    confidence: f64,
    force_scale: f64,
    build_pose: Isometry,
}

impl CachedCorrespondence {
    /// Build an entry and score it against the posed model samples.
    ///
    /// # Arguments
    ///
    /// * `model_name` - Model the targets were registered for.
    /// * `build_pose` - Object pose the registration ran at.
    /// * `targets` - Index aligned registered targets.
    /// * `expected` - The model samples posed at `build_pose`.
    /// * `voxel_size` - Voxel edge length used for scoring.
    /// * `force_scale` - Force multiplier of the model.
    pub fn new(
        model_name: impl Into<String>,
        build_pose: Isometry,
        targets: Vec<Option<[f64; 3]>>,
        expected: &[[f64; 3]],
        voxel_size: f64,
        force_scale: f64,
    ) -> Self {
        let supported = targets.iter().flatten().copied().collect::<Vec<_>>();
        let confidence = coverage_confidence(&supported, expected, voxel_size);
        Self {
            model_name: model_name.into(),
            targets,
            confidence,
            force_scale,
            build_pose,
        }
    }

    /// An entry without scene support, scored zero.
    ///
    /// Keeps the object cached so it is not registered again every step.
    pub fn unsupported(
        model_name: impl Into<String>,
        build_pose: Isometry,
        num_samples: usize,
        force_scale: f64,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            targets: vec![None; num_samples],
            confidence: 0.0,
            force_scale,
            build_pose,
        }
    }

    /// Model the targets belong to.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Registered targets, index aligned with the model samples.
    pub fn targets(&self) -> &[Option<[f64; 3]>] {
        &self.targets
    }

    /// Coverage confidence at build time, in `[0, 1]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Force multiplier of the model at build time.
    pub fn force_scale(&self) -> f64 {
        self.force_scale
    }

    /// Pose the registration ran at.
    pub fn build_pose(&self) -> &Isometry {
        &self.build_pose
    }

    /// Number of targets that survived filtering.
    pub fn num_valid(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    /// Confidence decayed by how far the object moved since the entry was built.
    pub fn effective_confidence(
        &self,
        model_points: &[[f64; 3]],
        pose: &Isometry,
        decay_distance: f64,
    ) -> f64 {
        let divergence = pose_divergence(model_points, &self.build_pose, pose);
        self.confidence * divergence_decay(divergence, decay_distance)
    }

    /// Pair the model samples posed at the current pose with the cached targets.
    ///
    /// Returns `None` if `posed_model` does not match the number of targets.
    pub fn correspondence_at(&self, posed_model: Vec<[f64; 3]>) -> Option<CorrespondenceCloud> {
        CorrespondenceCloud::from_parts(posed_model, self.targets.clone())
    }
}

/// Cached correspondences keyed by object.
///
/// Entries are only ever created through [`CorrespondenceCache::insert`]; a
/// lookup never creates one.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceCache {
    entries: HashMap<ObjectHandle, CachedCorrespondence>,
}

impl CorrespondenceCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` for `handle`, returning the previous one.
    pub fn insert(
        &mut self,
        handle: ObjectHandle,
        entry: CachedCorrespondence,
    ) -> Option<CachedCorrespondence> {
        self.entries.insert(handle, entry)
    }

    /// Store `entry` for `handle` and return the stored entry.
    pub fn store(
        &mut self,
        handle: ObjectHandle,
        entry: CachedCorrespondence,
    ) -> &CachedCorrespondence {
        match self.entries.entry(handle) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(entry);
                occupied.into_mut()
            }
            Entry::Vacant(vacant) => vacant.insert(entry),
        }
    }

    /// Entry of `handle`, if any.
    pub fn get(&self, handle: ObjectHandle) -> Option<&CachedCorrespondence> {
        self.entries.get(&handle)
    }

    /// Drop the entry of `handle`.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<CachedCorrespondence> {
        self.entries.remove(&handle)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `handle` has an entry.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Iterate over the cached entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &CachedCorrespondence)> {
        self.entries.iter().map(|(h, e)| (*h, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec3;

    fn samples() -> Vec<[f64; 3]> {
        (0..8).map(|i| [i as f64 * 0.01, 0.0, 0.0]).collect()
    }

    #[test]
    fn test_confidence_is_computed_on_build() {
        let expected = samples();
        let targets = expected
            .iter()
            .enumerate()
            .map(|(i, p)| (i % 2 == 0).then_some(*p))
            .collect::<Vec<_>>();
        let entry =
            CachedCorrespondence::new("bar", Isometry::IDENTITY, targets, &expected, 0.003, 1.0);
        assert_eq!(entry.num_valid(), 4);
        assert_relative_eq!(entry.confidence(), 0.5);
        assert_eq!(entry.model_name(), "bar");
    }

    #[test]
    fn test_effective_confidence_decays() {
        let expected = samples();
        let targets = expected.iter().map(|p| Some(*p)).collect();
        let entry =
            CachedCorrespondence::new("bar", Isometry::IDENTITY, targets, &expected, 0.003, 1.0);

        let here = entry.effective_confidence(&expected, &Isometry::IDENTITY, 0.02);
        let moved = Isometry::from_translation(DVec3::new(0.02, 0.0, 0.0));
        let there = entry.effective_confidence(&expected, &moved, 0.02);
        assert_relative_eq!(here, 1.0);
        assert_relative_eq!(there, (-1.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_correspondence_at_checks_length() {
        let expected = samples();
        let targets = expected.iter().map(|p| Some(*p)).collect();
        let entry =
            CachedCorrespondence::new("bar", Isometry::IDENTITY, targets, &expected, 0.003, 1.0);
        assert!(entry.correspondence_at(expected.clone()).is_some());
        assert!(entry.correspondence_at(expected[..3].to_vec()).is_none());
    }

    #[test]
    fn test_cache_lookup_does_not_create() {
        let mut cache = CorrespondenceCache::new();
        let handle = ObjectHandle::new(3);
        assert!(cache.get(handle).is_none());
        assert!(cache.is_empty());

        let entry = CachedCorrespondence::new("bar", Isometry::IDENTITY, vec![], &[], 0.003, 1.0);
        assert!(cache.insert(handle, entry).is_none());
        assert!(cache.contains(handle));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.iter().count(), 1);

        assert!(cache.remove(handle).is_some());
        assert!(cache.remove(handle).is_none());
        assert_eq!(handle.to_string(), "#3");
    }
}
