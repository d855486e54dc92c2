use glam::{DMat3, DVec3};
use scenephys_3d::pose::Isometry;

use crate::{IcpError, SceneIndex};

/// Point pairs matched between a source set and an indexed target.
#[derive(Debug, Default)]
pub(crate) struct Matches {
    pub source: Vec<[f64; 3]>,
    pub target: Vec<[f64; 3]>,
    pub distances: Vec<f64>,
}

/// Compute the centroid of a set of points.
pub(crate) fn compute_centroid(points: &[[f64; 3]]) -> DVec3 {
    let sum = points
        .iter()
        .fold(DVec3::ZERO, |acc, p| acc + DVec3::from_array(*p));
    sum / points.len().max(1) as f64
}

fn faer_to_glam(m: faer::MatRef<'_, f64>) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(m.read(0, 0), m.read(1, 0), m.read(2, 0)),
        DVec3::new(m.read(0, 1), m.read(1, 1), m.read(2, 1)),
        DVec3::new(m.read(0, 2), m.read(1, 2), m.read(2, 2)),
    )
}

/// Compute the rigid transformation that best maps `points_in_src` onto `points_in_dst`.
///
/// Least squares fit of two point sets with the SVD of the cross covariance
/// (Arun, Huang and Blostein, IEEE PAMI 1987). Reflections are corrected so the
/// result is always a proper rotation.
///
/// # Arguments
///
/// * `points_in_src` - Points expressed in the source frame.
/// * `points_in_dst` - The corresponding points in the destination frame.
///
/// # Returns
///
/// The pose `dst_T_src`.
pub fn fit_transformation(
    points_in_src: &[[f64; 3]],
    points_in_dst: &[[f64; 3]],
) -> Result<Isometry, IcpError> {
    let num_points = points_in_src.len().min(points_in_dst.len());
    if num_points < 3 {
        return Err(IcpError::NotEnoughCorrespondences(num_points));
    }
    let (src, dst) = (&points_in_src[..num_points], &points_in_dst[..num_points]);

    let src_centroid = compute_centroid(src);
    let dst_centroid = compute_centroid(dst);

    // compute covariance matrix H = Σ[(src - src_mean) * (dst - dst_mean)^T]
    let mut h = DMat3::ZERO;
    for (p_in_src, p_in_dst) in src.iter().zip(dst.iter()) {
        let src_centered = DVec3::from_array(*p_in_src) - src_centroid;
        let dst_centered = DVec3::from_array(*p_in_dst) - dst_centroid;
        h += DMat3::from_cols(
            src_centered * dst_centered.x,
            src_centered * dst_centered.y,
            src_centered * dst_centered.z,
        );
    }

    let h_mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| h.col(j)[i]);
    let svd = h_mat.svd();
    let u = faer_to_glam(svd.u());
    let v = faer_to_glam(svd.v());

    // R = V * U^T
    let mut r = v * u.transpose();

    // handle reflection case to ensure a proper rotation matrix
    if r.determinant() < 0.0 {
        let v_corrected = DMat3::from_cols(v.x_axis, v.y_axis, -v.z_axis);
        r = v_corrected * u.transpose();
    }

    let t = dst_centroid - r * src_centroid;

    Ok(Isometry::new(glam::DQuat::from_mat3(&r), t))
}

/// Match every source point to its closest target point and reject outliers.
///
/// Pairs farther than `median + 3 * sigma` are dropped, where sigma is the
/// median absolute deviation of the distances scaled to a normal distribution.
pub(crate) fn find_correspondences(source: &[[f64; 3]], target: &SceneIndex) -> Matches {
    let nn_results = source
        .iter()
        .filter_map(|p| target.nearest(p).map(|nn| (*p, nn)))
        .collect::<Vec<_>>();

    if nn_results.is_empty() {
        return Matches::default();
    }

    // compute median distance
    let mut distances = nn_results
        .iter()
        .map(|(_, nn)| nn.distance)
        .collect::<Vec<_>>();
    distances.sort_by(|a, b| a.total_cmp(b));
    let median_dist = distances[distances.len() / 2];

    // compute median absolute deviation
    let mut dmed = distances
        .iter()
        .map(|d| (d - median_dist).abs())
        .collect::<Vec<_>>();
    dmed.sort_by(|a, b| a.total_cmp(b));
    let sigma_d = 1.4826 * dmed[dmed.len() / 2];

    let mut matches = Matches::default();
    for (p, nn) in nn_results
        .into_iter()
        .filter(|(_, nn)| nn.distance <= median_dist + 3.0 * sigma_d)
    {
        matches.source.push(p);
        matches.target.push(nn.point);
        matches.distances.push(nn.distance);
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_random_points(num_points: usize) -> Vec<[f64; 3]> {
        (0..num_points)
            .map(|_| {
                [
                    rand::random::<f64>(),
                    rand::random::<f64>(),
                    rand::random::<f64>(),
                ]
            })
            .collect()
    }

    fn create_random_pose(rotation_factor: f64, translation_factor: f64) -> Isometry {
        let axis = DVec3::new(
            rand::random::<f64>() + 0.1,
            rand::random::<f64>(),
            rand::random::<f64>(),
        );
        let translation = DVec3::new(
            rand::random::<f64>() * translation_factor,
            rand::random::<f64>() * translation_factor,
            rand::random::<f64>() * translation_factor,
        );
        Isometry::from_axis_angle(axis, rand::random::<f64>() * rotation_factor, translation)
    }

    #[test]
    fn test_compute_centroid() {
        let points = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let centroid = compute_centroid(&points);
        assert_relative_eq!(centroid.x, 2.5);
        assert_relative_eq!(centroid.y, 3.5);
        assert_relative_eq!(centroid.z, 4.5);
    }

    #[test]
    fn test_fit_transformation_identity() -> Result<(), IcpError> {
        let points_src = create_random_points(30);
        let pose = fit_transformation(&points_src, &points_src)?;
        assert_relative_eq!(
            pose.rotation.angle_between(glam::DQuat::IDENTITY),
            0.0,
            epsilon = 1e-6
        );
        assert_relative_eq!(pose.translation.length(), 0.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_fit_transformation_random() -> Result<(), IcpError> {
        let points_src = create_random_points(30);

        for _ in 0..10 {
            let expected = create_random_pose(0.5, 0.1);
            let points_dst = expected.transform_points(&points_src);

            let pose = fit_transformation(&points_src, &points_dst)?;
            let points_fit = pose.transform_points(&points_src);

            for (res, exp) in points_fit.iter().zip(points_dst.iter()) {
                for (r, e) in res.iter().zip(exp.iter()) {
                    assert_relative_eq!(r, e, epsilon = 1e-9);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_fit_transformation_too_few_points() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        assert!(matches!(
            fit_transformation(&points, &points),
            Err(IcpError::NotEnoughCorrespondences(2))
        ));
    }

    #[test]
    fn test_find_correspondences() {
        let points_src = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ];
        let index = SceneIndex::new(vec![[1.0, 0.0, 0.0], [1.0, 1.0, 0.0]]);

        let matches = find_correspondences(&points_src, &index);

        assert_eq!(matches.source.len(), matches.target.len());
        assert_eq!(matches.source.len(), 4);
        assert_eq!(matches.distances, vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(matches.target[2], [1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_find_correspondences_rejects_outlier() {
        let mut points_src = (0..20)
            .map(|i| [i as f64 * 0.1, 0.0, 0.0])
            .collect::<Vec<_>>();
        let mut target = points_src
            .iter()
            .map(|p| [p[0], 0.01, 0.0])
            .collect::<Vec<_>>();
        target.push([0.0, 5.0, 0.0]);
        points_src.push([0.0, 4.0, 0.0]);

        let matches = find_correspondences(&points_src, &SceneIndex::new(target));
        assert_eq!(matches.source.len(), 20);
        assert!(matches.distances.iter().all(|d| *d < 0.02));
    }

    #[test]
    fn test_find_correspondences_empty_target() {
        let matches = find_correspondences(&[[0.0, 0.0, 0.0]], &SceneIndex::new(vec![]));
        assert!(matches.source.is_empty());
    }
}
