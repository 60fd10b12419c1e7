//! Assignment of measurements to combined-estimate groups.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::Matrix;

/// One-hot n×k matrix: row i has a single 1 in the column of its group.
///
/// Columns are ordered by sorted group label, so the k averages always come
/// out in label order regardless of measurement order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMatrix {
    labels: Vec<String>,
    assignment: Vec<usize>,
    matrix: Matrix,
}

impl GroupMatrix {
    /// Build from one label per measurement.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let distinct: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        let sorted: Vec<String> = distinct.into_iter().map(str::to_string).collect();

        let assignment: Vec<usize> = labels
            .iter()
            .map(|label| {
                sorted
                    .binary_search_by(|probe| probe.as_str().cmp(label.as_ref()))
                    .unwrap_or_default()
            })
            .collect();

        let mut matrix = Matrix::zeros(labels.len(), sorted.len());
        for (row, &col) in assignment.iter().enumerate() {
            matrix[(row, col)] = 1.0;
        }

        Self {
            labels: sorted,
            assignment,
            matrix,
        }
    }

    /// The n×k indicator matrix.
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Group labels in column order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of groups (k).
    pub fn n_groups(&self) -> usize {
        self.labels.len()
    }

    /// Number of measurements (n).
    pub fn n_measurements(&self) -> usize {
        self.assignment.len()
    }

    /// Column index of measurement `i`.
    pub fn group_of(&self, i: usize) -> usize {
        self.assignment[i]
    }

    /// Measurement indices belonging to group `g`.
    pub fn members(&self, g: usize) -> Vec<usize> {
        self.assignment
            .iter()
            .enumerate()
            .filter(|(_, &col)| col == g)
            .map(|(row, _)| row)
            .collect()
    }
}
