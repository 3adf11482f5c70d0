use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Per-column z-score transform fitted on the full training matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Population statistics; a constant column gets scale 1 so it maps to 0
    pub fn fit(features: &Array2<f64>) -> Self {
        let cols = features.ncols();
        let mean = features
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(cols));
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 && s.is_finite() { s } else { 1.0 });
        Self { mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    pub fn transform(&self, features: &Array2<f64>) -> Array2<f64> {
        (features - &self.mean) / &self.scale
    }

    pub fn transform_row(&self, row: ArrayView1<f64>) -> Result<Array1<f64>, InferenceError> {
        if row.len() != self.width() {
            return Err(InferenceError::DimensionMismatch {
                expected: self.width(),
                got: row.len(),
            });
        }
        // ReLU would silently zero a NaN further down
        if let Some(index) = row.iter().position(|v| !v.is_finite()) {
            return Err(InferenceError::NonFiniteInput { index });
        }
        Ok((&row - &self.mean) / &self.scale)
    }

    /// Structural check used on reload
    pub fn is_consistent(&self, width: usize) -> bool {
        self.mean.len() == width
            && self.scale.len() == width
            && self.mean.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s > 0.0)
    }
}
