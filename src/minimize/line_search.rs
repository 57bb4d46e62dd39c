use crate::minimize::WolfeParams;

/// What the search wants next from its driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LineSearchSignal {
    /// Evaluate the objective and directional derivative at this step length.
    Trial(f64),
    /// The current trial step satisfies the acceptance conditions.
    Accept,
    /// No acceptable step within the evaluation budget or step bounds.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Bracketing,
    Zoom,
}

/// Resumable strong-Wolfe line search.
///
/// The search owns no callables: the driver evaluates the objective at each
/// `Trial(alpha)` and feeds `(f, dg)` back through [`advance`]. Steps are
/// confined to `[min_step, alpha_max]` where `alpha_max` is the smaller of
/// the configured maximum step and the distance to the nearest bound along
/// the direction; a still-descending step at `alpha_max` is accepted with the
/// sufficient-decrease condition alone, since the box edge is as far as the
/// iterate may go.
///
/// [`advance`]: BoundedLineSearch::advance
#[derive(Debug, Clone)]
pub(crate) struct BoundedLineSearch {
    c1: f64,
    c2: f64,
    min_step: f64,
    max_evals: usize,
    finit: f64,
    dginit: f64,
    alpha: f64,
    alpha_max: f64,
    alpha_prev: f64,
    f_prev: f64,
    lo: f64,
    f_lo: f64,
    hi: f64,
    stage: Stage,
    evals: usize,
    best_alpha: f64,
    best_f: f64,
}

impl BoundedLineSearch {
    /// Start a search from `f(0) = finit` with directional derivative
    /// `dginit < 0`, first trial `alpha0`, and feasible cap `alpha_max`.
    pub fn new(params: &WolfeParams, finit: f64, dginit: f64, alpha0: f64, alpha_max: f64) -> Self {
        debug_assert!(dginit < 0.0, "line search requires a descent direction");
        let alpha_max = alpha_max.min(params.max_step).max(params.min_step);
        Self {
            c1: params.c1,
            c2: params.c2,
            min_step: params.min_step,
            max_evals: params.max_evals,
            finit,
            dginit,
            alpha: alpha0.clamp(params.min_step, alpha_max),
            alpha_max,
            alpha_prev: 0.0,
            f_prev: finit,
            lo: 0.0,
            f_lo: finit,
            hi: alpha_max,
            stage: Stage::Bracketing,
            evals: 0,
            best_alpha: 0.0,
            best_f: finit,
        }
    }

    /// Step length the driver should evaluate next.
    pub fn trial(&self) -> f64 {
        self.alpha
    }

    pub fn evaluations(&self) -> usize {
        self.evals
    }

    /// Best improving trial seen so far, if any, as `(alpha, f)`.
    pub fn best(&self) -> Option<(f64, f64)> {
        if self.best_alpha > 0.0 && self.best_f < self.finit {
            Some((self.best_alpha, self.best_f))
        } else {
            None
        }
    }

    /// Consume the evaluation at the current trial step.
    pub fn advance(&mut self, f: f64, dg: f64) -> LineSearchSignal {
        self.evals += 1;
        if f.is_finite() && f < self.best_f {
            self.best_f = f;
            self.best_alpha = self.alpha;
        }

        let armijo_ok = f.is_finite() && f <= self.finit + self.c1 * self.alpha * self.dginit;

        match self.stage {
            Stage::Bracketing => {
                if !armijo_ok || (self.evals > 1 && f >= self.f_prev) {
                    self.lo = self.alpha_prev;
                    self.f_lo = self.f_prev;
                    self.hi = self.alpha;
                    self.stage = Stage::Zoom;
                    return self.next_zoom_trial();
                }
                if dg.abs() <= -self.c2 * self.dginit {
                    return LineSearchSignal::Accept;
                }
                if dg >= 0.0 {
                    self.lo = self.alpha;
                    self.f_lo = f;
                    self.hi = self.alpha_prev;
                    self.stage = Stage::Zoom;
                    return self.next_zoom_trial();
                }
                if self.alpha >= self.alpha_max {
                    // Feasible cap reached while still descending
                    return LineSearchSignal::Accept;
                }
                self.alpha_prev = self.alpha;
                self.f_prev = f;
                self.alpha = (2.0 * self.alpha).min(self.alpha_max);
                self.next_trial()
            }
            Stage::Zoom => {
                if !armijo_ok || f >= self.f_lo {
                    self.hi = self.alpha;
                } else {
                    if dg.abs() <= -self.c2 * self.dginit {
                        return LineSearchSignal::Accept;
                    }
                    if dg * (self.hi - self.lo) >= 0.0 {
                        self.hi = self.lo;
                    }
                    self.lo = self.alpha;
                    self.f_lo = f;
                }
                if (self.hi - self.lo).abs() <= self.min_step.max(f64::EPSILON * self.hi.abs()) {
                    // Interval of uncertainty collapsed; settle for
                    // sufficient decrease alone
                    return if armijo_ok {
                        LineSearchSignal::Accept
                    } else {
                        LineSearchSignal::Failed
                    };
                }
                self.next_zoom_trial()
            }
        }
    }

    fn next_trial(&mut self) -> LineSearchSignal {
        if self.evals >= self.max_evals || self.alpha < self.min_step {
            return LineSearchSignal::Failed;
        }
        LineSearchSignal::Trial(self.alpha)
    }

    fn next_zoom_trial(&mut self) -> LineSearchSignal {
        if self.evals >= self.max_evals {
            return LineSearchSignal::Failed;
        }
        self.alpha = 0.5 * (self.lo + self.hi);
        if self.alpha < self.min_step {
            return LineSearchSignal::Failed;
        }
        LineSearchSignal::Trial(self.alpha)
    }
}
