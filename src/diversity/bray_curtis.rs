//! Bray-Curtis dissimilarity between samples.
//!
//! Works on a samples × taxa abundance matrix and produces a square,
//! symmetric distance matrix with a zero diagonal and values in [0, 1].

use crate::error::{MicrovizError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::path::Path;

/// A square, symmetric dissimilarity matrix indexed by sample identifiers.
///
/// The identifier order is fixed by the abundance table the matrix was
/// computed from and is preserved by every operation here.
#[derive(Debug, Clone)]
pub struct DissimilarityMatrix {
    /// Square matrix of pairwise dissimilarities.
    data: DMatrix<f64>,
    /// Sample identifiers, one per row/column.
    ids: Vec<String>,
}

impl DissimilarityMatrix {
    /// Create a matrix from raw data and identifiers.
    pub fn new(data: DMatrix<f64>, ids: Vec<String>) -> Result<Self> {
        if data.nrows() != data.ncols() {
            return Err(MicrovizError::DimensionMismatch {
                expected: data.nrows(),
                actual: data.ncols(),
            });
        }
        if data.nrows() != ids.len() {
            return Err(MicrovizError::DimensionMismatch {
                expected: data.nrows(),
                actual: ids.len(),
            });
        }
        Ok(Self { data, ids })
    }

    /// Number of samples.
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    /// Sample identifiers in matrix order.
    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The underlying square matrix.
    #[inline]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Dissimilarity between samples `i` and `j`.
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    /// Upper-triangle distances in row-major order: (0,1), (0,2), ...,
    /// (n-2, n-1).
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.n_samples();
        if n < 2 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(n * (n - 1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.data[(i, j)]);
            }
        }
        out
    }

    /// Upper-triangle distances with the zeros dropped.
    ///
    /// Identical samples produce zero distances that would otherwise crowd
    /// a distance distribution; this is the input for the distance violins.
    pub fn nonzero_distances(&self) -> Vec<f64> {
        self.condensed().into_iter().filter(|&d| d != 0.0).collect()
    }

    /// The submatrix restricted to the given sample indices, in the given
    /// order.
    pub fn submatrix(&self, indices: &[usize]) -> Result<Self> {
        for &idx in indices {
            if idx >= self.n_samples() {
                return Err(MicrovizError::InvalidParameter(format!(
                    "sample index {} out of bounds",
                    idx
                )));
            }
        }
        let n = indices.len();
        let data = DMatrix::from_fn(n, n, |r, c| self.data[(indices[r], indices[c])]);
        let ids = indices.iter().map(|&i| self.ids[i].clone()).collect();
        Self::new(data, ids)
    }

    /// Non-zero distances within each group, keyed by group label.
    ///
    /// `labels` assigns one label per sample in matrix order. Groups come
    /// back sorted by label.
    pub fn within_group_distances(&self, labels: &[String]) -> Result<Vec<(String, Vec<f64>)>> {
        if labels.len() != self.n_samples() {
            return Err(MicrovizError::DimensionMismatch {
                expected: self.n_samples(),
                actual: labels.len(),
            });
        }
        let mut unique: Vec<&String> = labels.iter().collect();
        unique.sort();
        unique.dedup();

        let mut out = Vec::with_capacity(unique.len());
        for group in unique {
            let indices: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, l)| *l == group)
                .map(|(i, _)| i)
                .collect();
            let distances = self.submatrix(&indices)?.nonzero_distances();
            out.push((group.clone(), distances));
        }
        Ok(out)
    }

    /// Write the matrix to a CSV file with identifiers on both axes.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        let mut header = vec![String::new()];
        header.extend(self.ids.iter().cloned());
        writer.write_record(&header)?;
        for (i, id) in self.ids.iter().enumerate() {
            let mut fields = vec![id.clone()];
            for j in 0..self.n_samples() {
                fields.push(self.data[(i, j)].to_string());
            }
            writer.write_record(&fields)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a matrix written by [`DissimilarityMatrix::to_csv`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().from_path(path.as_ref())?;
        let ids: Vec<String> = reader.headers()?.iter().skip(1).map(String::from).collect();
        let n = ids.len();
        if n == 0 {
            return Err(MicrovizError::EmptyData(
                "dissimilarity matrix has no samples".to_string(),
            ));
        }
        let mut data = DMatrix::zeros(n, n);
        let mut row = 0;
        for record in reader.records() {
            let record = record?;
            if row >= n {
                return Err(MicrovizError::DimensionMismatch {
                    expected: n,
                    actual: row + 1,
                });
            }
            for j in 0..n {
                let cell = record.get(j + 1).unwrap_or("").trim();
                data[(row, j)] = cell.parse::<f64>().map_err(|_| {
                    MicrovizError::Numerical(format!(
                        "non-numeric distance '{}' at row {}, column {}",
                        cell, row, j
                    ))
                })?;
            }
            row += 1;
        }
        if row != n {
            return Err(MicrovizError::DimensionMismatch {
                expected: n,
                actual: row,
            });
        }
        Self::new(data, ids)
    }
}

/// Compute the Bray-Curtis dissimilarity matrix of a samples × taxa matrix.
///
/// # Formula
/// For samples i and j over taxa k:
/// BC(i, j) = Σ|x_ik − x_jk| / Σ(x_ik + x_jk)
///
/// A pair of all-zero samples has a zero denominator, and a non-finite
/// cell poisons both sums of its pairs; either case is defined as 0 so the
/// output never contains NaN.
///
/// # Arguments
/// * `samples` - Abundance matrix with one row per sample
/// * `ids` - Sample identifiers, one per row
pub fn bray_curtis(samples: &DMatrix<f64>, ids: &[String]) -> Result<DissimilarityMatrix> {
    let n = samples.nrows();
    if ids.len() != n {
        return Err(MicrovizError::DimensionMismatch {
            expected: n,
            actual: ids.len(),
        });
    }
    if n < 2 {
        return Err(MicrovizError::InsufficientSamples { found: n });
    }

    // Upper-triangle rows computed in parallel, one strip per sample.
    let strips: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| pair_distance(samples, i, j))
                .collect()
        })
        .collect();

    let mut data = DMatrix::zeros(n, n);
    for (i, strip) in strips.iter().enumerate() {
        for (offset, &d) in strip.iter().enumerate() {
            let j = i + 1 + offset;
            data[(i, j)] = d;
            data[(j, i)] = d;
        }
    }

    DissimilarityMatrix::new(data, ids.to_vec())
}

#[inline]
fn pair_distance(samples: &DMatrix<f64>, i: usize, j: usize) -> f64 {
    let mut diff = 0.0;
    let mut total = 0.0;
    for k in 0..samples.ncols() {
        let a = samples[(i, k)];
        let b = samples[(j, k)];
        diff += (a - b).abs();
        total += a + b;
    }
    if total == 0.0 {
        return 0.0;
    }
    let d = diff / total;
    // A NaN or infinite cell makes both sums non-finite.
    if d.is_finite() {
        d
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("R{}", i + 1)).collect()
    }

    #[test]
    fn test_disjoint_samples_are_maximally_distant() {
        let samples = DMatrix::from_row_slice(2, 2, &[10.0, 0.0, 0.0, 10.0]);
        let matrix = bray_curtis(&samples, &ids(2)).unwrap();
        assert_relative_eq!(matrix.get(0, 1), 1.0);
        assert_relative_eq!(matrix.get(1, 0), 1.0);
        assert_relative_eq!(matrix.get(0, 0), 0.0);
        assert_relative_eq!(matrix.get(1, 1), 0.0);
    }

    #[test]
    fn test_identical_samples_have_zero_distance() {
        let samples = DMatrix::from_row_slice(2, 3, &[5.0, 1.0, 4.0, 5.0, 1.0, 4.0]);
        let matrix = bray_curtis(&samples, &ids(2)).unwrap();
        assert_relative_eq!(matrix.get(0, 1), 0.0);
    }

    #[test]
    fn test_known_value() {
        // |6-2| + |4-8| = 8, totals 20 -> 0.4
        let samples = DMatrix::from_row_slice(2, 2, &[6.0, 4.0, 2.0, 8.0]);
        let matrix = bray_curtis(&samples, &ids(2)).unwrap();
        assert_relative_eq!(matrix.get(0, 1), 0.4);
    }

    #[test]
    fn test_all_zero_pair_is_zero_not_nan() {
        let samples = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
        let matrix = bray_curtis(&samples, &ids(3)).unwrap();
        assert_relative_eq!(matrix.get(0, 1), 0.0);
        assert_relative_eq!(matrix.get(0, 2), 1.0);
        for i in 0..3 {
            for j in 0..3 {
                assert!(matrix.get(i, j).is_finite());
            }
        }
    }

    #[test]
    fn test_nan_cell_does_not_poison_output() {
        let samples = DMatrix::from_row_slice(
            3,
            2,
            &[
                f64::NAN, 1.0, //
                2.0, 1.0, //
                0.0, 3.0,
            ],
        );
        let matrix = bray_curtis(&samples, &ids(3)).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!(matrix.get(i, j).is_finite());
            }
        }
        // pairs touching the bad cell collapse to 0, the clean pair is real
        assert_relative_eq!(matrix.get(0, 1), 0.0);
        assert_relative_eq!(matrix.get(0, 2), 0.0);
        assert_relative_eq!(matrix.get(1, 2), 4.0 / 6.0);
    }

    #[test]
    fn test_symmetry_and_bounds() {
        let samples = DMatrix::from_row_slice(
            4,
            3,
            &[
                3.0, 0.0, 7.0, //
                1.0, 5.0, 2.0, //
                0.0, 9.0, 4.0, //
                6.0, 6.0, 6.0,
            ],
        );
        let matrix = bray_curtis(&samples, &ids(4)).unwrap();
        for i in 0..4 {
            assert_relative_eq!(matrix.get(i, i), 0.0);
            for j in 0..4 {
                assert_relative_eq!(matrix.get(i, j), matrix.get(j, i));
                assert!(matrix.get(i, j) >= 0.0 && matrix.get(i, j) <= 1.0);
            }
        }
    }

    #[test]
    fn test_insufficient_samples() {
        let samples = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let err = bray_curtis(&samples, &ids(1)).unwrap_err();
        assert!(matches!(
            err,
            MicrovizError::InsufficientSamples { found: 1 }
        ));
    }

    #[test]
    fn test_id_count_mismatch() {
        let samples = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let err = bray_curtis(&samples, &ids(3)).unwrap_err();
        assert!(matches!(err, MicrovizError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_condensed_order() {
        let samples = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let matrix = bray_curtis(&samples, &ids(3)).unwrap();
        let condensed = matrix.condensed();
        assert_eq!(condensed.len(), 3);
        assert_relative_eq!(condensed[0], matrix.get(0, 1));
        assert_relative_eq!(condensed[1], matrix.get(0, 2));
        assert_relative_eq!(condensed[2], matrix.get(1, 2));
    }

    #[test]
    fn test_nonzero_distances_filters_self_like_pairs() {
        let samples = DMatrix::from_row_slice(3, 2, &[2.0, 2.0, 2.0, 2.0, 8.0, 0.0]);
        let matrix = bray_curtis(&samples, &ids(3)).unwrap();
        let nonzero = matrix.nonzero_distances();
        // the identical pair drops out
        assert_eq!(nonzero.len(), 2);
        assert!(nonzero.iter().all(|&d| d > 0.0));
    }

    #[test]
    fn test_submatrix() {
        let samples = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let matrix = bray_curtis(&samples, &ids(3)).unwrap();
        let sub = matrix.submatrix(&[0, 2]).unwrap();
        assert_eq!(sub.ids(), &["R1", "R3"]);
        assert_relative_eq!(sub.get(0, 1), matrix.get(0, 2));

        assert!(matrix.submatrix(&[5]).is_err());
    }

    #[test]
    fn test_within_group_distances() {
        let samples = DMatrix::from_row_slice(
            4,
            2,
            &[
                1.0, 0.0, //
                0.0, 1.0, //
                4.0, 4.0, //
                4.0, 4.0,
            ],
        );
        let matrix = bray_curtis(&samples, &ids(4)).unwrap();
        let labels = vec![
            "A".to_string(),
            "A".to_string(),
            "B".to_string(),
            "B".to_string(),
        ];
        let groups = matrix.within_group_distances(&labels).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "A");
        assert_eq!(groups[0].1, vec![1.0]);
        // identical pair in B leaves nothing after the zero filter
        assert_eq!(groups[1].0, "B");
        assert!(groups[1].1.is_empty());
    }

    #[test]
    fn test_csv_round_trip() {
        let samples = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 2.0, 2.0]);
        let matrix = bray_curtis(&samples, &ids(3)).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bc.csv");
        matrix.to_csv(&path).unwrap();

        let loaded = DissimilarityMatrix::from_csv(&path).unwrap();
        assert_eq!(loaded.ids(), matrix.ids());
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(loaded.get(i, j), matrix.get(i, j));
            }
        }
    }
}
