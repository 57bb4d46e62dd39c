use crate::error::MinimizerError;
use ndarray::prelude::*;

/// Per-variable bound classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Unbounded,
    LowerOnly,
    UpperOnly,
    Both,
}

/// Axis-aligned box constraints with ±infinity sentinels for missing bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Array1<f64>,
    upper: Array1<f64>,
}

impl Bounds {
    pub fn new(n: usize) -> Result<Self, MinimizerError> {
        if n == 0 {
            return Err(MinimizerError::InvalidDimension);
        }
        Ok(Bounds {
            lower: Array1::from_elem(n, f64::NEG_INFINITY),
            upper: Array1::from_elem(n, f64::INFINITY),
        })
    }

    pub fn from_arrays(lower: Array1<f64>, upper: Array1<f64>) -> Result<Self, MinimizerError> {
        if lower.is_empty() || lower.len() != upper.len() {
            return Err(MinimizerError::InvalidDimension);
        }
        let bounds = Bounds { lower, upper };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Reject bound pairs with an empty feasible interval.
    pub fn validate(&self) -> Result<(), MinimizerError> {
        for i in 0..self.len() {
            if !(self.lower[i] <= self.upper[i]) {
                return Err(MinimizerError::InfeasibleBounds(format!(
                    "lower[{}] = {} and upper[{}] = {} leave no feasible interval",
                    i, self.lower[i], i, self.upper[i]
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &Array1<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &Array1<f64> {
        &self.upper
    }

    pub fn set_lower(&mut self, i: usize, value: f64) {
        self.lower[i] = value;
    }

    pub fn set_upper(&mut self, i: usize, value: f64) {
        self.upper[i] = value;
    }

    pub fn kind(&self, i: usize) -> BoundKind {
        match (self.lower[i].is_finite(), self.upper[i].is_finite()) {
            (false, false) => BoundKind::Unbounded,
            (true, false) => BoundKind::LowerOnly,
            (false, true) => BoundKind::UpperOnly,
            (true, true) => BoundKind::Both,
        }
    }

    /// A variable with equal finite bounds is fixed for the whole run.
    pub fn is_fixed(&self, i: usize) -> bool {
        self.lower[i] == self.upper[i]
    }

    pub fn is_unconstrained(&self) -> bool {
        (0..self.len()).all(|i| self.kind(i) == BoundKind::Unbounded)
    }

    /// Clip a point into the box.
    pub fn clamp(&self, x: &Array1<f64>) -> Array1<f64> {
        Array1::from_shape_fn(x.len(), |i| x[i].clamp(self.lower[i], self.upper[i]))
    }

    pub fn contains(&self, x: &Array1<f64>) -> bool {
        (0..x.len()).all(|i| x[i] >= self.lower[i] && x[i] <= self.upper[i])
    }

    /// Largest step along `d` from `x` that stays inside the box, capped at `cap`.
    pub fn max_step(&self, x: &Array1<f64>, d: &Array1<f64>, cap: f64) -> f64 {
        let mut max_step = cap;
        for i in 0..x.len() {
            if d[i] > 0.0 {
                let room = (self.upper[i] - x[i]) / d[i];
                if room.is_finite() {
                    max_step = max_step.min(room.max(0.0));
                }
            } else if d[i] < 0.0 {
                let room = (self.lower[i] - x[i]) / d[i];
                if room.is_finite() {
                    max_step = max_step.min(room.max(0.0));
                }
            }
        }
        max_step
    }

    /// Gradient with components zeroed where the point sits on a bound that
    /// blocks further descent.
    pub fn projected_gradient(&self, x: &Array1<f64>, g: &Array1<f64>) -> Array1<f64> {
        Array1::from_shape_fn(g.len(), |i| {
            if x[i] <= self.lower[i] && g[i] > 0.0 {
                0.0
            } else if x[i] >= self.upper[i] && g[i] < 0.0 {
                0.0
            } else {
                g[i]
            }
        })
    }
}
