use scenephys_icp::SceneIndex;

/// Outlier rejection applied while pairing model points with the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrespondenceFilter {
    /// Pairs farther apart than this are rejected. `None` keeps every pair.
    pub max_distance: Option<f64>,
    /// Keep rejected pairs as placeholders so that entry `i` still refers to
    /// model sample `i`. When `false`, rejected pairs are removed.
    pub keep_index_aligned: bool,
}

impl CorrespondenceFilter {
    /// Keep every pair.
    pub const NONE: Self = Self {
        max_distance: None,
        keep_index_aligned: true,
    };

    /// Reject pairs farther than `max_distance`, keeping placeholders.
    pub fn aligned(max_distance: f64) -> Self {
        Self {
            max_distance: Some(max_distance),
            keep_index_aligned: true,
        }
    }

    /// Reject pairs farther than `max_distance`, dropping them.
    pub fn compact(max_distance: f64) -> Self {
        Self {
            max_distance: Some(max_distance),
            keep_index_aligned: false,
        }
    }

    #[inline]
    fn accepts(&self, distance: f64) -> bool {
        self.max_distance.map_or(true, |max| distance <= max)
    }
}

/// Posed model points paired with the point they should move to.
///
/// A `None` target is a placeholder for a rejected pair. No force may be
/// derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrespondenceCloud {
    model: Vec<[f64; 3]>,
    targets: Vec<Option<[f64; 3]>>,
}

impl CorrespondenceCloud {
    /// Build a cloud from parallel model and target lists.
    ///
    /// Returns `None` if the two lists have different lengths.
    pub fn from_parts(model: Vec<[f64; 3]>, targets: Vec<Option<[f64; 3]>>) -> Option<Self> {
        if model.len() != targets.len() {
            return None;
        }
        Some(Self { model, targets })
    }

    /// Pair every posed model point with its closest scene point.
    ///
    /// An empty scene yields only placeholders (or nothing when compacting).
    pub fn closest_points(
        posed_model: Vec<[f64; 3]>,
        scene: &SceneIndex,
        filter: CorrespondenceFilter,
    ) -> Self {
        let targets = posed_model
            .iter()
            .map(|p| {
                scene
                    .nearest(p)
                    .filter(|nn| filter.accepts(nn.distance))
                    .map(|nn| nn.point)
            })
            .collect();
        Self {
            model: posed_model,
            targets,
        }
        .filtered(filter)
    }

    /// Pair every posed model point with its registered (aligned) position.
    ///
    /// An aligned point is only kept as a target if the scene supports it,
    /// i.e. it has a scene point within the filter distance. `aligned[i]` is
    /// the registered position of `posed_model[i]`; samples without one get a
    /// placeholder.
    pub fn registered(
        posed_model: Vec<[f64; 3]>,
        aligned: &[[f64; 3]],
        scene: &SceneIndex,
        filter: CorrespondenceFilter,
    ) -> Self {
        let targets = (0..posed_model.len())
            .map(|i| {
                let a = aligned.get(i)?;
                scene
                    .nearest(a)
                    .filter(|nn| filter.accepts(nn.distance))
                    .map(|_| *a)
            })
            .collect();
        Self {
            model: posed_model,
            targets,
        }
        .filtered(filter)
    }

    fn filtered(self, filter: CorrespondenceFilter) -> Self {
        if filter.keep_index_aligned {
            return self;
        }
        let (model, targets) = self
            .model
            .into_iter()
            .zip(self.targets)
            .filter(|(_, t)| t.is_some())
            .unzip();
        Self { model, targets }
    }

    /// Number of entries, placeholders included.
    pub fn len(&self) -> usize {
        self.model.len()
    }

    /// Whether there are no entries at all.
    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    /// Number of pairs that survived filtering.
    pub fn num_valid(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    /// Posed model points.
    pub fn model_points(&self) -> &[[f64; 3]] {
        &self.model
    }

    /// Targets, `None` for rejected pairs.
    pub fn targets(&self) -> &[Option<[f64; 3]>] {
        &self.targets
    }

    /// The surviving `(model point, target)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = ([f64; 3], [f64; 3])> + '_ {
        self.model
            .iter()
            .zip(self.targets.iter())
            .filter_map(|(m, t)| t.map(|t| (*m, t)))
    }

    /// The surviving targets.
    pub fn valid_targets(&self) -> Vec<[f64; 3]> {
        self.targets.iter().flatten().copied().collect()
    }

    /// Consume the cloud and return the targets.
    pub fn into_targets(self) -> Vec<Option<[f64; 3]>> {
        self.targets
    }
}
