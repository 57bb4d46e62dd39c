//! Bound-constrained limited-memory quasi-Newton minimization.
//!
//! `boxmin` finds a local minimum of a smooth multivariate function subject
//! to independent per-variable lower/upper bounds. The solver is an L-BFGS-B
//! implementation: a compact history of recent correction pairs stands in for
//! the inverse Hessian, a generalized Cauchy point identifies the active
//! bounds each iteration, the search direction is refined over the free
//! variables, and a bounded strong-Wolfe line search selects the step.
pub mod error;
pub mod minimize;
pub mod prelude;
