//! Principal coordinates analysis of a dissimilarity matrix.

use crate::diversity::DissimilarityMatrix;
use crate::error::{MicrovizError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::Serialize;
use std::path::Path;

/// Coordinates below this magnitude are treated as zero when fixing the
/// sign of an axis.
const SIGN_EPS: f64 = 1e-12;

/// The first two principal coordinates of an ordination.
///
/// Sample order equals the input matrix's identifier order.
#[derive(Debug, Clone, Serialize)]
pub struct OrdinationResult {
    pub sample_ids: Vec<String>,
    pub pc1: Vec<f64>,
    pub pc2: Vec<f64>,
    /// Fraction of retained variance explained by each axis.
    pub proportion_explained: [f64; 2],
}

impl OrdinationResult {
    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Write the coordinates to a CSV file.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(["sample_id", "PC1", "PC2"])?;
        for (idx, id) in self.sample_ids.iter().enumerate() {
            writer.write_record([
                id.as_str(),
                &self.pc1[idx].to_string(),
                &self.pc2[idx].to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Project a dissimilarity matrix onto its first two principal coordinates.
///
/// The distance matrix is squared, scaled by −1/2, and double-centered
/// (Gower), then eigendecomposed. Eigenpairs are sorted by descending
/// eigenvalue; negative eigenvalues and their axes are zeroed before
/// coordinates and explained-variance fractions are computed.
///
/// Eigenvectors are only defined up to sign, so each axis is oriented to
/// make its first non-negligible coordinate positive; repeated runs on the
/// same input give identical output.
pub fn pcoa(matrix: &DissimilarityMatrix) -> Result<OrdinationResult> {
    let n = matrix.n_samples();
    if n < 2 {
        return Err(MicrovizError::InsufficientSamples { found: n });
    }

    let d = matrix.data();
    let a = DMatrix::from_fn(n, n, |i, j| {
        let v = d[(i, j)];
        -0.5 * v * v
    });

    // Gower centering: B = J A J with J = I - (1/n) 1 1'
    let row_means: Vec<f64> = (0..n).map(|i| a.row(i).sum() / n as f64).collect();
    let col_means: Vec<f64> = (0..n).map(|j| a.column(j).sum() / n as f64).collect();
    let grand_mean = a.sum() / (n * n) as f64;
    let b = DMatrix::from_fn(n, n, |i, j| a[(i, j)] - row_means[i] - col_means[j] + grand_mean);

    let eigen = SymmetricEigen::try_new(b, 1.0e-12, 1000).ok_or_else(|| {
        MicrovizError::Numerical("eigendecomposition did not converge".to_string())
    })?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| {
        eigen.eigenvalues[y]
            .partial_cmp(&eigen.eigenvalues[x])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Negative eigenvalues are numerical artifacts of a semi-metric; they
    // and their axes are dropped from both coordinates and proportions.
    let clamped: Vec<f64> = order
        .iter()
        .map(|&idx| eigen.eigenvalues[idx].max(0.0))
        .collect();
    let total: f64 = clamped.iter().sum();

    let mut axes: [Vec<f64>; 2] = [vec![0.0; n], vec![0.0; n]];
    let mut proportions = [0.0; 2];
    for (axis, coords) in axes.iter_mut().enumerate() {
        let lambda = clamped[axis];
        if lambda > 0.0 {
            let scale = lambda.sqrt();
            let column = eigen.eigenvectors.column(order[axis]);
            for (slot, v) in coords.iter_mut().zip(column.iter()) {
                *slot = v * scale;
            }
            orient_axis(coords);
        }
        proportions[axis] = if total > 0.0 { lambda / total } else { 0.0 };
    }

    let [pc1, pc2] = axes;
    Ok(OrdinationResult {
        sample_ids: matrix.ids().to_vec(),
        pc1,
        pc2,
        proportion_explained: proportions,
    })
}

/// Flip an axis so its first non-negligible coordinate is positive.
fn orient_axis(coords: &mut [f64]) {
    let flip = coords
        .iter()
        .find(|c| c.abs() > SIGN_EPS)
        .map(|c| *c < 0.0)
        .unwrap_or(false);
    if flip {
        for v in coords.iter_mut() {
            *v = -*v;
        }
    }
}
