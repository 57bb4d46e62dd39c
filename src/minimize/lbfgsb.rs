use crate::error::MinimizerError;
use crate::minimize::bounds::Bounds;
use crate::minimize::cauchy::generalized_cauchy_point;
use crate::minimize::convergence::{Convergence, ConvergenceClassifier};
use crate::minimize::history::{CompactModel, CorrectionHistory};
use crate::minimize::line_search::{BoundedLineSearch, LineSearchSignal};
use crate::minimize::subspace::subspace_minimize;
use crate::minimize::{MinimizerResult, ObjGradFn, WolfeParams};
use ndarray::prelude::*;

/// Terminal classification of the most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Stopped by the iteration cap with the last accepted iterate
    Success,
    /// The line search could not find an acceptable step
    LineSearchFailure,
    ConvergedByFunctionReduction,
    ConvergedByGradientNorm,
}

/// Snapshot handed to the progress observer once per accepted iterate
#[derive(Debug, Clone)]
pub struct IterationEvent {
    pub iteration: usize,
    pub evaluations: usize,
    pub value: f64,
    pub projected_gradient_norm: f64,
    pub step_length: f64,
    pub active_bounds: usize,
}

/// Configuration snapshot
#[derive(Debug, Clone)]
pub struct LbfgsbParameters {
    pub variables: usize,
    pub corrections: usize,
    pub tolerance: f64,
    pub precision: f64,
    pub max_iterations: usize,
    pub wolfe: WolfeParams,
}

/// Result of a bounded L-BFGS run
#[derive(Debug, Clone)]
pub struct LbfgsbResult {
    pub xmin: Array1<f64>,
    pub fmin: f64,
    pub tolerance: f64,
    pub iters: usize,
    pub fn_evals: usize,
    pub status: Status,
    pub history: Array1<f64>,
}

impl MinimizerResult<Array1<f64>, f64> for LbfgsbResult {
    fn xmin(&self) -> Array1<f64> {
        self.xmin.clone()
    }

    fn fmin(&self) -> f64 {
        self.fmin
    }

    fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn fn_evals(&self) -> usize {
        self.fn_evals
    }

    fn iters(&self) -> usize {
        self.iters
    }

    fn converged(&self) -> bool {
        matches!(
            self.status,
            Status::ConvergedByFunctionReduction | Status::ConvergedByGradientNorm
        )
    }

    fn history(&self) -> Array1<f64> {
        self.history.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    GradientNorm,
    FunctionReduction,
    LineSearchFailed,
}

/// Closed signal set from the solving engine to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineSignal {
    EvalRequest,
    IterateAccepted,
    Finished(StopReason),
}

impl From<StopReason> for Status {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::GradientNorm => Status::ConvergedByGradientNorm,
            StopReason::FunctionReduction => Status::ConvergedByFunctionReduction,
            StopReason::LineSearchFailed => Status::LineSearchFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    AwaitInitial,
    InSearch,
    Idle,
}

/// Driver states of one `minimize` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Start,
    RequestEval,
    IterateAccepted,
    Terminated(Status),
}

/// The solving engine: owns the correction history and the in-flight line
/// search, consumes evaluations, and emits [`EngineSignal`]s.
struct Engine {
    bounds: Bounds,
    wolfe: WolfeParams,
    classifier: ConvergenceClassifier,
    history: CorrectionHistory,
    model: CompactModel,
    model_stale: bool,
    x: Array1<f64>,
    g: Array1<f64>,
    fval: f64,
    f_prev: f64,
    d: Array1<f64>,
    trial: Array1<f64>,
    search: Option<BoundedLineSearch>,
    state: EngineState,
    first_search: bool,
    last_step: f64,
}

impl Engine {
    fn new(
        x0: Array1<f64>,
        bounds: Bounds,
        corrections: usize,
        wolfe: WolfeParams,
        classifier: ConvergenceClassifier,
    ) -> Result<Self, MinimizerError> {
        let n = x0.len();
        Ok(Engine {
            history: CorrectionHistory::new(corrections, n)?,
            model: CompactModel::identity(n),
            model_stale: false,
            trial: x0.clone(),
            x: x0,
            g: Array1::zeros(n),
            fval: f64::NAN,
            f_prev: f64::NAN,
            d: Array1::zeros(n),
            search: None,
            state: EngineState::AwaitInitial,
            first_search: true,
            last_step: 0.0,
            bounds,
            wolfe,
            classifier,
        })
    }

    fn trial_point(&self) -> &Array1<f64> {
        &self.trial
    }

    fn projected_gradient_norm(&self) -> f64 {
        self.bounds
            .projected_gradient(&self.x, &self.g)
            .iter()
            .fold(0.0, |acc: f64, &v| acc.max(v.abs()))
    }

    fn active_bound_count(&self) -> usize {
        let lower = self.bounds.lower();
        let upper = self.bounds.upper();
        (0..self.x.len())
            .filter(|&i| self.x[i] <= lower[i] || self.x[i] >= upper[i])
            .count()
    }

    /// Feed the evaluation at the current trial point into the engine.
    fn advance(&mut self, f: f64, g: Array1<f64>) -> Result<EngineSignal, MinimizerError> {
        if g.len() != self.x.len() {
            return Err(MinimizerError::GradientEvaluationError);
        }
        match self.state {
            EngineState::AwaitInitial => {
                if !f.is_finite() || g.iter().any(|v| !v.is_finite()) {
                    return Err(MinimizerError::FunctionEvaluationError);
                }
                self.fval = f;
                self.g = g;
                if self.classifier.gradient_converged(self.projected_gradient_norm()) {
                    self.state = EngineState::Idle;
                    return Ok(EngineSignal::Finished(StopReason::GradientNorm));
                }
                self.start_search()
            }
            EngineState::InSearch => {
                let search = match self.search.as_mut() {
                    Some(search) => search,
                    None => {
                        return Err(MinimizerError::UnexpectedEngineSignal(
                            "evaluation consumed with no active line search".to_string(),
                        ))
                    }
                };
                let mut dg = g.dot(&self.d);
                let mut f_eval = f;
                if !f.is_finite() || !dg.is_finite() {
                    // Poisoned trial: reject through the sufficient-decrease test
                    f_eval = f64::INFINITY;
                    dg = 0.0;
                }
                match search.advance(f_eval, dg) {
                    LineSearchSignal::Trial(alpha) => {
                        let mut t = self.x.clone();
                        t.scaled_add(alpha, &self.d);
                        self.trial = self.bounds.clamp(&t);
                        Ok(EngineSignal::EvalRequest)
                    }
                    LineSearchSignal::Accept => {
                        let alpha = search.trial();
                        let s = &self.trial - &self.x;
                        let y = &g - &self.g;
                        if self.history.push(&s, &y) {
                            self.model_stale = true;
                        }
                        self.last_step = alpha;
                        self.f_prev = self.fval;
                        self.fval = f;
                        self.x = self.trial.clone();
                        self.g = g;
                        self.search = None;
                        self.state = EngineState::Idle;
                        self.first_search = false;
                        Ok(EngineSignal::IterateAccepted)
                    }
                    LineSearchSignal::Failed => {
                        // Keep the best improving trial seen by the search
                        if let Some((alpha, f_best)) = search.best() {
                            if f_best < self.fval {
                                let mut t = self.x.clone();
                                t.scaled_add(alpha, &self.d);
                                self.x = self.bounds.clamp(&t);
                                self.fval = f_best;
                            }
                        }
                        self.search = None;
                        self.state = EngineState::Idle;
                        Ok(EngineSignal::Finished(StopReason::LineSearchFailed))
                    }
                }
            }
            EngineState::Idle => Err(MinimizerError::UnexpectedEngineSignal(
                "evaluation consumed while idle".to_string(),
            )),
        }
    }

    /// Re-enter the engine after an accepted iterate: run the stopping tests
    /// and begin the next iteration if none fires.
    fn proceed(&mut self) -> Result<EngineSignal, MinimizerError> {
        if self.state != EngineState::Idle {
            return Err(MinimizerError::UnexpectedEngineSignal(format!(
                "proceed called in state {:?}",
                self.state
            )));
        }
        match self
            .classifier
            .classify(self.f_prev, self.fval, self.projected_gradient_norm())
        {
            Convergence::GradientNorm => Ok(EngineSignal::Finished(StopReason::GradientNorm)),
            Convergence::FunctionReduction => {
                Ok(EngineSignal::Finished(StopReason::FunctionReduction))
            }
            Convergence::Continue => self.start_search(),
        }
    }

    /// Compute the next search direction and open the line search.
    fn start_search(&mut self) -> Result<EngineSignal, MinimizerError> {
        if self.model_stale {
            match self.history.compact() {
                Ok(model) => self.model = model,
                Err(_) => {
                    // Degenerate curvature: drop the memory and restart
                    self.history.clear();
                    self.model = CompactModel::identity(self.x.len());
                }
            }
            self.model_stale = false;
        }

        self.d = if self.bounds.is_unconstrained() {
            // Two-loop recursion on the full space
            -self.history.apply_inverse_hessian(&self.g)
        } else {
            let cp = generalized_cauchy_point(&self.x, &self.g, &self.bounds, &self.model);
            subspace_minimize(&self.x, &self.g, &self.bounds, &self.model, &cp)
        };

        let mut dg0 = self.g.dot(&self.d);
        if !(dg0 < 0.0) {
            // Not a descent direction: drop the memory, fall back to the
            // projected steepest descent
            self.history.clear();
            self.model = CompactModel::identity(self.x.len());
            self.d = -self.bounds.projected_gradient(&self.x, &self.g);
            dg0 = self.g.dot(&self.d);
            if !(dg0 < 0.0) {
                self.state = EngineState::Idle;
                return Ok(EngineSignal::Finished(StopReason::GradientNorm));
            }
        }

        let dnorm = self.d.dot(&self.d).sqrt();
        let alpha_max = self.bounds.max_step(&self.x, &self.d, self.wolfe.max_step);
        let alpha0 = if self.first_search {
            (1.0 / dnorm).min(alpha_max)
        } else {
            1.0_f64.min(alpha_max)
        };

        let search = BoundedLineSearch::new(&self.wolfe, self.fval, dg0, alpha0, alpha_max);
        let mut t = self.x.clone();
        t.scaled_add(search.trial(), &self.d);
        self.trial = self.bounds.clamp(&t);
        self.search = Some(search);
        self.state = EngineState::InSearch;
        Ok(EngineSignal::EvalRequest)
    }
}

/// Bound-constrained limited-memory BFGS solver.
///
/// Construct with the number of variables, bind an objective/gradient
/// callable, optionally set per-variable bounds and tolerances, then call
/// [`minimize`]. The solution vector, counters, and terminal [`Status`] stay
/// readable afterwards.
///
/// ```
/// use boxmin::minimize::{Lbfgsb, MultiDimGradFn};
/// use ndarray::prelude::*;
///
/// let obj = MultiDimGradFn::new(
///     |x: &Array1<f64>| (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2),
///     |x: &Array1<f64>| array![2.0 * (x[0] - 1.0), 2.0 * (x[1] + 2.0)],
/// );
/// let mut solver = Lbfgsb::with_function(2, obj).unwrap();
/// let fmin = solver.minimize().unwrap();
/// assert!(fmin < 1e-8);
/// assert!((solver.solution()[0] - 1.0).abs() < 1e-4);
/// ```
///
/// [`minimize`]: Lbfgsb::minimize
pub struct Lbfgsb {
    n: usize,
    f: Option<Box<dyn ObjGradFn>>,
    bounds: Bounds,
    corrections: usize,
    tolerance: f64,
    precision: f64,
    max_iterations: usize,
    wolfe: WolfeParams,
    x: Array1<f64>,
    fval: f64,
    iters: usize,
    evals: usize,
    status: Option<Status>,
    value_history: Vec<f64>,
    on_iteration: Option<Box<dyn FnMut(&IterationEvent)>>,
}

impl Lbfgsb {
    /// A solver over `n` variables with every bound open and the solution
    /// vector zeroed.
    pub fn new(n: usize) -> Result<Self, MinimizerError> {
        Ok(Lbfgsb {
            n,
            f: None,
            bounds: Bounds::new(n)?,
            corrections: 5,
            tolerance: 1e5,
            precision: 0.0,
            max_iterations: 0,
            wolfe: WolfeParams::default(),
            x: Array1::zeros(n),
            fval: f64::NAN,
            iters: 0,
            evals: 0,
            status: None,
            value_history: Vec::new(),
            on_iteration: None,
        })
    }

    pub fn with_function<F>(n: usize, f: F) -> Result<Self, MinimizerError>
    where
        F: ObjGradFn + 'static,
    {
        let mut solver = Self::new(n)?;
        solver.f = Some(Box::new(f));
        Ok(solver)
    }

    pub fn set_objective<F>(&mut self, f: F)
    where
        F: ObjGradFn + 'static,
    {
        self.f = Some(Box::new(f));
    }

    pub fn set_objective_boxed(&mut self, f: Box<dyn ObjGradFn>) {
        self.f = Some(f);
    }

    pub fn set_lower_bound(&mut self, i: usize, value: f64) {
        self.bounds.set_lower(i, value);
    }

    pub fn set_upper_bound(&mut self, i: usize, value: f64) {
        self.bounds.set_upper(i, value);
    }

    pub fn set_bounds(
        &mut self,
        lower: Array1<f64>,
        upper: Array1<f64>,
    ) -> Result<(), MinimizerError> {
        if lower.len() != self.n || upper.len() != self.n {
            return Err(MinimizerError::DimensionMismatch(format!(
                "bounds of length {}/{} for {} variables",
                lower.len(),
                upper.len(),
                self.n
            )));
        }
        self.bounds = Bounds::from_arrays(lower, upper)?;
        Ok(())
    }

    /// History depth `m` (number of retained correction pairs).
    pub fn set_corrections(&mut self, m: usize) -> Result<(), MinimizerError> {
        if m == 0 {
            return Err(MinimizerError::InvalidCorrectionCount);
        }
        self.corrections = m;
        Ok(())
    }

    /// Relative function-reduction factor `factr`; the stopping threshold is
    /// `factr * machine epsilon`. Higher is looser.
    pub fn set_tolerance(&mut self, factr: f64) -> Result<(), MinimizerError> {
        if !(factr >= 0.0) {
            return Err(MinimizerError::InvalidTolerance);
        }
        self.tolerance = factr;
        Ok(())
    }

    /// Projected-gradient threshold `pgtol`. Deliberately unvalidated, and
    /// 0 by default so the function-reduction test drives termination.
    pub fn set_precision(&mut self, pgtol: f64) {
        self.precision = pgtol;
    }

    /// Outer-iteration cap; 0 runs until convergence or failure.
    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub fn set_wolfe_params(&mut self, params: WolfeParams) {
        self.wolfe = params;
    }

    /// Observe each accepted iterate. Delivered synchronously, in program
    /// order.
    pub fn on_iteration<C>(&mut self, callback: C)
    where
        C: FnMut(&IterationEvent) + 'static,
    {
        self.on_iteration = Some(Box::new(callback));
    }

    pub fn iterations(&self) -> usize {
        self.iters
    }

    pub fn evaluations(&self) -> usize {
        self.evals
    }

    pub fn solution(&self) -> Array1<f64> {
        self.x.clone()
    }

    pub fn value(&self) -> f64 {
        self.fval
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn parameters(&self) -> LbfgsbParameters {
        LbfgsbParameters {
            variables: self.n,
            corrections: self.corrections,
            tolerance: self.tolerance,
            precision: self.precision,
            max_iterations: self.max_iterations,
            wolfe: self.wolfe.clone(),
        }
    }

    /// Result snapshot of the most recent run.
    pub fn result(&self) -> Option<LbfgsbResult> {
        self.status.map(|status| LbfgsbResult {
            xmin: self.x.clone(),
            fmin: self.fval,
            tolerance: self.tolerance * f64::EPSILON,
            iters: self.iters,
            fn_evals: self.evals,
            status,
            history: Array1::from_vec(self.value_history.clone()),
        })
    }

    /// Minimize starting from the current solution vector.
    pub fn minimize(&mut self) -> Result<f64, MinimizerError> {
        let x0 = self.x.clone();
        self.minimize_from(&x0)
    }

    /// Minimize from `x0`; infeasible starts are clipped into the box.
    ///
    /// Returns the minimized function value. The solution vector, counters,
    /// and status are updated in place.
    pub fn minimize_from(&mut self, x0: &Array1<f64>) -> Result<f64, MinimizerError> {
        let func = self.f.clone().ok_or(MinimizerError::MissingObjective)?;
        if x0.len() != self.n {
            return Err(MinimizerError::DimensionMismatch(format!(
                "initial guess of length {} for {} variables",
                x0.len(),
                self.n
            )));
        }
        self.bounds.validate()?;
        self.probe_gradient(func.as_ref())?;

        self.iters = 0;
        self.evals = 0;
        self.value_history.clear();
        self.status = None;

        let mut engine = Engine::new(
            self.bounds.clamp(x0),
            self.bounds.clone(),
            self.corrections,
            self.wolfe.clone(),
            ConvergenceClassifier::new(self.tolerance, self.precision),
        )?;

        let final_status;
        let mut state = DriverState::Start;
        loop {
            state = match state {
                DriverState::Start => DriverState::RequestEval,
                DriverState::RequestEval => {
                    let fv = func.call(engine.trial_point());
                    let gv = func.grad(engine.trial_point());
                    self.evals += 1;
                    match engine.advance(fv, gv)? {
                        EngineSignal::EvalRequest => DriverState::RequestEval,
                        EngineSignal::IterateAccepted => DriverState::IterateAccepted,
                        EngineSignal::Finished(reason) => DriverState::Terminated(reason.into()),
                    }
                }
                DriverState::IterateAccepted => {
                    self.iters += 1;
                    self.value_history.push(engine.fval);
                    let event = IterationEvent {
                        iteration: self.iters,
                        evaluations: self.evals,
                        value: engine.fval,
                        projected_gradient_norm: engine.projected_gradient_norm(),
                        step_length: engine.last_step,
                        active_bounds: engine.active_bound_count(),
                    };
                    if let Some(callback) = self.on_iteration.as_mut() {
                        callback(&event);
                    }
                    if self.max_iterations > 0 && self.iters >= self.max_iterations {
                        DriverState::Terminated(Status::Success)
                    } else {
                        match engine.proceed()? {
                            EngineSignal::EvalRequest => DriverState::RequestEval,
                            EngineSignal::Finished(reason) => {
                                DriverState::Terminated(reason.into())
                            }
                            signal @ EngineSignal::IterateAccepted => {
                                return Err(MinimizerError::UnexpectedEngineSignal(format!(
                                    "{:?}",
                                    signal
                                )))
                            }
                        }
                    }
                }
                DriverState::Terminated(status) => {
                    final_status = status;
                    break;
                }
            };
        }

        self.x = engine.x.clone();
        self.fval = engine.fval;
        self.status = Some(final_status);
        Ok(self.fval)
    }

    /// Sanity-check the gradient callable at the origin before the run: it
    /// must hand back a fresh vector of the configured length.
    fn probe_gradient(&self, func: &dyn ObjGradFn) -> Result<(), MinimizerError> {
        let probe = func.grad(&Array1::zeros(self.n));
        if probe.len() != self.n {
            return Err(MinimizerError::GradientContractViolation(format!(
                "expected a gradient of length {}, got {}",
                self.n,
                probe.len()
            )));
        }
        Ok(())
    }
}
