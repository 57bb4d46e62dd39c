use dyn_clone::DynClone;
use ndarray::prelude::*;

pub mod bounds;
pub mod convergence;
pub mod history;
pub mod lbfgsb;
pub mod objective;

pub(crate) mod cauchy;
pub(crate) mod line_search;
pub(crate) mod linalg;
pub(crate) mod subspace;

pub use self::bounds::{BoundKind, Bounds};
pub use self::convergence::Convergence;
pub use self::history::CorrectionHistory;
pub use self::lbfgsb::{IterationEvent, Lbfgsb, LbfgsbParameters, LbfgsbResult, Status};
pub use self::objective::{MultiDimFn, MultiDimGradFn, MultiDimNumGradFn};

// Define a trait for the objective function
pub trait ObjFn: DynClone {
    fn call(&self, x: &Array1<f64>) -> f64;
}
dyn_clone::clone_trait_object!(ObjFn);

// Define a trait for the gradient function
pub trait ObjGradFn: ObjFn + DynClone {
    fn grad(&self, x: &Array1<f64>) -> Array1<f64>;
}
dyn_clone::clone_trait_object!(ObjGradFn);

pub trait MinimizerResult<V, T> {
    fn xmin(&self) -> V;
    fn fmin(&self) -> T;
    fn tolerance(&self) -> T;
    fn fn_evals(&self) -> usize;
    fn iters(&self) -> usize;
    fn converged(&self) -> bool;
    fn history(&self) -> Array1<f64>;
}

/// Strong Wolfe conditions parameters
#[derive(Debug, Clone)]
pub struct WolfeParams {
    pub c1: f64, // Armijo condition parameter (typically 1e-4)
    pub c2: f64, // Curvature condition parameter (typically 0.9 for quasi-Newton)
    pub max_step: f64,
    pub min_step: f64,
    pub max_evals: usize, // Evaluation budget per line search
}

impl Default for WolfeParams {
    fn default() -> Self {
        Self {
            c1: 1e-4,
            c2: 0.9,
            max_step: 1e20,
            min_step: 1e-20,
            max_evals: 20,
        }
    }
}
