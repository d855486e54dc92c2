use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scenephys_3d::{io::pcd, pointcloud::PointCloud};

use crate::ForceError;

/// A reference cloud sampled from the surface of an object type.
///
/// The cloud is expressed in the object frame and shared read-only between
/// every instance of that object type.
#[derive(Debug, Clone)]
pub struct ModelCloud {
    cloud: Arc<PointCloud>,
    force_scale: f64,
}

impl ModelCloud {
    fn new(cloud: PointCloud) -> Self {
        Self {
            cloud: Arc::new(cloud),
            force_scale: 1.0,
        }
    }

    /// Surface samples in the object frame.
    pub fn points(&self) -> &[[f64; 3]] {
        self.cloud.points()
    }

    /// The shared cloud.
    pub fn cloud(&self) -> &Arc<PointCloud> {
        &self.cloud
    }

    /// Number of surface samples.
    pub fn len(&self) -> usize {
        self.cloud.len()
    }

    /// Whether the model has no samples. Registered models never do.
    pub fn is_empty(&self) -> bool {
        self.cloud.is_empty()
    }

    /// Multiplier applied to every force derived from this model.
    pub fn force_scale(&self) -> f64 {
        self.force_scale
    }
}

/// Lookup from model name to [`ModelCloud`], optionally backed by a directory
/// of `<name>.pcd` files.
#[derive(Debug, Default)]
pub struct ModelStore {
    directory: Option<PathBuf>,
    models: HashMap<String, ModelCloud>,
}

impl ModelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory models are loaded from.
    ///
    /// # Errors
    ///
    /// Returns [`ForceError::ModelDirectoryNotFound`] if `directory` is not an existing directory.
    pub fn set_model_directory(&mut self, directory: impl AsRef<Path>) -> Result<(), ForceError> {
        let directory = directory.as_ref();
        if !directory.is_dir() {
            return Err(ForceError::ModelDirectoryNotFound(directory.to_path_buf()));
        }
        log::info!("Model directory set to {}", directory.display());
        self.directory = Some(directory.to_path_buf());
        Ok(())
    }

    /// The configured model directory.
    pub fn model_directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// Register a model cloud under `name`, replacing any previous one.
    pub fn insert(&mut self, name: &str, cloud: PointCloud) -> Result<(), ForceError> {
        if cloud.is_empty() {
            return Err(ForceError::EmptyModelCloud(name.to_string()));
        }
        log::info!("Registered model {} with {} points", name, cloud.len());
        self.models.insert(name.to_string(), ModelCloud::new(cloud));
        Ok(())
    }

    /// Load `<directory>/<name>.pcd` and register it under `name`.
    pub fn load(&mut self, name: &str) -> Result<(), ForceError> {
        let directory = self
            .directory
            .as_ref()
            .ok_or(ForceError::ModelDirectoryNotSet)?;
        let path = directory.join(format!("{name}.pcd"));
        if !path.is_file() {
            return Err(ForceError::ModelNotFound(name.to_string()));
        }
        let cloud = pcd::read_pcd(&path)?;
        self.insert(name, cloud)
    }

    /// Get a registered model.
    pub fn get(&self, name: &str) -> Result<&ModelCloud, ForceError> {
        self.models
            .get(name)
            .ok_or_else(|| ForceError::ModelNotFound(name.to_string()))
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Set the force multiplier of a registered model.
    pub fn set_force_scale(&mut self, name: &str, scale: f64) -> Result<(), ForceError> {
        if !(scale >= 0.0 && scale.is_finite()) {
            return Err(ForceError::InvalidParameter {
                name: "force_scale",
                value: scale,
            });
        }
        let model = self
            .models
            .get_mut(name)
            .ok_or_else(|| ForceError::ModelNotFound(name.to_string()))?;
        model.force_scale = scale;
        Ok(())
    }

    /// Names of the registered models.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}
