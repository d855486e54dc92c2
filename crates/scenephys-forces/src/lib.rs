#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`CorrespondenceForceGenerator`] turns the disagreement between a posed
//! model cloud and the observed scene cloud into a [`Wrench`] (central force
//! and torque about the center of gravity) that a rigid body solver can
//! integrate. Three correspondence strategies are available, see
//! [`FeedbackForceMode`].

mod body;
pub use body::RigidBodyAccess;

/// Per object correspondence cache.
pub mod cache;
pub use cache::{CachedCorrespondence, CorrespondenceCache, ObjectHandle};

/// Confidence scoring of correspondences.
pub mod confidence;

/// Correspondence generation between posed models and the scene.
pub mod correspondence;
pub use correspondence::{CorrespondenceCloud, CorrespondenceFilter};

mod error;
pub use error::ForceError;

mod generator;
pub use generator::CorrespondenceForceGenerator;

mod mode;
pub use mode::FeedbackForceMode;

/// Named model clouds.
pub mod model_store;
pub use model_store::{ModelCloud, ModelStore};

mod params;
pub use params::ForceParameters;

mod wrench;
pub use wrench::Wrench;
