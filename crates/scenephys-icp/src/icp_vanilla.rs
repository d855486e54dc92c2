use scenephys_3d::pose::Isometry;

use crate::ops::{find_correspondences, fit_transformation};
use crate::{IcpError, SceneIndex};

/// Result of the ICP algorithm.
///
/// The transformation is from the source to the target frame.
#[derive(Debug, Clone)]
pub struct ICPResult {
    /// Estimated transformation, initial guess included.
    pub transform: Isometry,
    /// The source points mapped through `transform`, index aligned with the source.
    pub aligned: Vec<[f64; 3]>,
    /// The total number of iterations performed.
    pub num_iterations: usize,
    /// Last computed RMSE.
    pub rmse: f64,
    /// Whether the RMSE change dropped below the tolerance before `max_iterations`.
    pub converged: bool,
}

/// Structure to define the ICP parameters.
#[derive(Debug, Clone)]
pub struct ICPConvergenceCriteria {
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Convergence tolerance as the difference in RMSE between two consecutive iterations.
    pub tolerance: f64,
}

impl Default for ICPConvergenceCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-6,
        }
    }
}

/// Iterative Closest Point (ICP) algorithm using point to point distance.
///
/// # Arguments
///
/// * `source` - Source points.
/// * `target` - Nearest neighbour index over the target points.
/// * `initial` - Initial transformation from the source to the target frame.
/// * `criteria` - Convergence criteria.
///
/// # Returns
///
/// * `result` - The estimated transformation, the aligned source points and
///   convergence information.
pub fn icp_vanilla(
    source: &[[f64; 3]],
    target: &SceneIndex,
    initial: Isometry,
    criteria: &ICPConvergenceCriteria,
) -> Result<ICPResult, IcpError> {
    if source.is_empty() {
        return Err(IcpError::EmptySource);
    }
    if target.is_empty() {
        return Err(IcpError::EmptyTarget);
    }

    // initialize the result structure with the initial transformation given by the user
    let mut result = ICPResult {
        transform: initial,
        aligned: initial.transform_points(source),
        num_iterations: 0,
        rmse: f64::INFINITY,
        converged: false,
    };

    // main icp loop
    for i in 0..criteria.max_iterations {
        log::trace!("Iteration: {}", i);

        // find closest points between current source and target
        let matches = find_correspondences(&result.aligned, target);

        log::trace!("Num correspondences: {}", matches.source.len());

        if matches.source.len() < 3 {
            if i == 0 {
                return Err(IcpError::NotEnoughCorrespondences(matches.source.len()));
            }
            break;
        }

        // compute transformation between current source and closest points
        let delta = fit_transformation(&matches.source, &matches.target)?;

        // transform current source and accumulate T_new = T_delta * T_old
        result.aligned = delta.transform_points(&result.aligned);
        result.transform = delta.compose(&result.transform);

        // compute error between current source and target
        let rmse = (matches.distances.iter().map(|d| d * d).sum::<f64>()
            / matches.distances.len() as f64)
            .sqrt();

        result.num_iterations += 1;

        // check convergence and exit if below tolerance
        if (result.rmse - rmse).abs() < criteria.tolerance {
            log::trace!("ICP converged in {} iterations with error {}", i, rmse);
            result.rmse = rmse;
            result.converged = true;
            break;
        }

        result.rmse = rmse;
    }

    log::debug!(
        "ICP finished after {} iterations, rmse {:.6}, converged {}",
        result.num_iterations,
        result.rmse,
        result.converged
    );

    Ok(result)
}
