use crate::minimize::bounds::Bounds;
use crate::minimize::history::CompactModel;
use ndarray::prelude::*;

/// Outcome of the generalized Cauchy point search.
///
/// `x_cp` is the first local minimizer of the quadratic model along the
/// projected-gradient path, `c = W^T (x_cp - x)` is the accumulated compact
/// product reused by the subspace step, and `free` lists the variables not
/// pinned at a bound by the walk.
#[derive(Debug, Clone)]
pub(crate) struct CauchyPoint {
    pub x_cp: Array1<f64>,
    pub c: Array1<f64>,
    pub free: Vec<usize>,
}

fn model_minimizer(f1: f64, f2: f64) -> f64 {
    if f2 > 0.0 {
        (-f1 / f2).max(0.0)
    } else {
        0.0
    }
}

/// Walk the breakpoints of the projected-gradient path `P(x - t*g)` in
/// increasing order, tracking the directional derivative of the quadratic
/// model `m(z) = g^T z + z^T B z / 2` with `B = theta*I - W M W^T`, and stop
/// at the segment where it changes sign.
///
/// Breakpoints are sorted with a stable sort, so equal values are handled in
/// index order. A zero gradient component at an unbounded variable produces
/// no breakpoint and the variable simply never moves.
pub(crate) fn generalized_cauchy_point(
    x: &Array1<f64>,
    g: &Array1<f64>,
    bounds: &Bounds,
    model: &CompactModel,
) -> CauchyPoint {
    let n = x.len();
    let two_k = model.w.ncols();
    let lower = bounds.lower();
    let upper = bounds.upper();

    // Breakpoints t_i where each variable reaches its bound along -g
    let mut t = Array1::from_elem(n, f64::INFINITY);
    let mut d = Array1::zeros(n);
    for i in 0..n {
        if g[i] < 0.0 {
            t[i] = (x[i] - upper[i]) / g[i];
        } else if g[i] > 0.0 {
            t[i] = (x[i] - lower[i]) / g[i];
        }
        d[i] = if t[i] < f64::EPSILON { 0.0 } else { -g[i] };
    }

    // Only variables still moving can produce a pinning event; the cutoff
    // matches the one that zeroed d above
    let mut breakpoints: Vec<usize> = (0..n)
        .filter(|&i| t[i].is_finite() && t[i] >= f64::EPSILON)
        .collect();
    breakpoints.sort_by(|&a, &b| t[a].total_cmp(&t[b]));

    let mut x_cp = x.clone();
    let mut p = model.w.t().dot(&d);
    let mut c = Array1::zeros(two_k);

    let mut f1 = -d.dot(&d);
    let mut f2 = -model.theta * f1 - p.dot(&model.m.dot(&p));
    let f2_org = f2;
    let mut dt_min = model_minimizer(f1, f2);
    let mut t_old = 0.0;

    for &b in &breakpoints {
        let t_b = t[b];
        let dt_b = t_b - t_old;
        if dt_min < dt_b {
            break;
        }

        // Variable b reaches its bound: pin it and restrict the direction
        x_cp[b] = if d[b] > 0.0 { upper[b] } else { lower[b] };
        let z_b = x_cp[b] - x[b];
        let g_b = g[b];
        let w_b = model.w.row(b);

        for j in 0..two_k {
            c[j] += dt_b * p[j];
        }
        let wmc = w_b.dot(&model.m.dot(&c));
        let wmp = w_b.dot(&model.m.dot(&p));
        let wmw = w_b.dot(&model.m.dot(&w_b));

        f1 += dt_b * f2 + g_b * g_b + model.theta * g_b * z_b - g_b * wmc;
        f2 -= model.theta * g_b * g_b + 2.0 * g_b * wmp + g_b * g_b * wmw;
        f2 = f2.max(f64::EPSILON * f2_org);

        for j in 0..two_k {
            p[j] += g_b * w_b[j];
        }
        d[b] = 0.0;

        dt_min = model_minimizer(f1, f2);
        t_old = t_b;
    }

    // Advance the still-moving variables to the model minimizer of the
    // current segment
    let t_final = t_old + dt_min;
    for i in 0..n {
        if d[i] != 0.0 {
            x_cp[i] = (x[i] + t_final * d[i]).clamp(lower[i], upper[i]);
        }
    }
    for j in 0..two_k {
        c[j] += dt_min * p[j];
    }

    let free = (0..n)
        .filter(|&i| x_cp[i] > lower[i] && x_cp[i] < upper[i])
        .collect();

    CauchyPoint { x_cp, c, free }
}

#[cfg(test)]
mod minimize_cauchy_tests {
    use super::*;
    use crate::minimize::history::CorrectionHistory;
    use float_cmp::{approx_eq, F64Margin};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-10,
        ulps: 4,
    };

    // Model quadratic used throughout: f(x) = ||x||^2 / 2, gradient x.

    #[test]
    fn test_unconstrained_path_reaches_model_minimizer() {
        let bounds = Bounds::new(2).unwrap();
        let model = CompactModel::identity(2);
        let x = array![1.0, 1.0];
        let g = x.clone();

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        assert!(approx_eq!(f64, cp.x_cp[0], 0.0, MARGIN), "x_cp = {:?}", cp.x_cp);
        assert!(approx_eq!(f64, cp.x_cp[1], 0.0, MARGIN));
        assert_eq!(cp.free, vec![0, 1]);
    }

    #[test]
    fn test_breakpoint_pins_variable_at_bound() {
        let bounds = Bounds::from_arrays(array![0.5, -10.0], array![10.0, 10.0]).unwrap();
        let model = CompactModel::identity(2);
        let x = array![1.0, 1.0];
        let g = x.clone();

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        // First variable hits its lower bound at t = 0.5 and is pinned; the
        // second continues to the minimizer of the restricted model at t = 1.
        assert!(approx_eq!(f64, cp.x_cp[0], 0.5, MARGIN), "x_cp = {:?}", cp.x_cp);
        assert!(approx_eq!(f64, cp.x_cp[1], 0.0, MARGIN));
        assert_eq!(cp.free, vec![1]);
    }

    #[test]
    fn test_equal_breakpoints_pin_both() {
        let bounds = Bounds::from_arrays(array![0.0, 0.0], array![10.0, 10.0]).unwrap();
        let model = CompactModel::identity(2);
        let x = array![1.0, 1.0];
        let g = x.clone();

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        assert!(approx_eq!(f64, cp.x_cp[0], 0.0, MARGIN));
        assert!(approx_eq!(f64, cp.x_cp[1], 0.0, MARGIN));
        assert!(cp.free.is_empty(), "free = {:?}", cp.free);
    }

    #[test]
    fn test_zero_gradient_component_never_moves() {
        let bounds = Bounds::new(2).unwrap();
        let model = CompactModel::identity(2);
        let x = array![1.0, 4.0];
        let g = array![1.0, 0.0];

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        assert!(approx_eq!(f64, cp.x_cp[0], 0.0, MARGIN));
        assert_eq!(cp.x_cp[1], 4.0);
    }

    #[test]
    fn test_outward_gradient_at_bound_is_immediately_active() {
        let bounds = Bounds::from_arrays(array![-1.0, -1.0], array![1.0, 1.0]).unwrap();
        let model = CompactModel::identity(2);
        // Sitting on the upper bound with the gradient pulling further up
        let x = array![1.0, 0.5];
        let g = array![-2.0, 0.5];

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        assert_eq!(cp.x_cp[0], 1.0);
        assert_eq!(cp.free, vec![1]);
    }

    #[test]
    fn test_cauchy_with_history_satisfies_c_definition() {
        // c must equal W^T (x_cp - x) whatever path the walk takes
        let bounds = Bounds::from_arrays(array![0.25, -10.0], array![10.0, 10.0]).unwrap();
        let mut h = CorrectionHistory::new(5, 2).unwrap();
        assert!(h.push(&array![0.4, 0.1], &array![0.5, 0.2]));
        let model = h.compact().unwrap();

        let x = array![1.0, 1.0];
        let g = array![0.8, 1.1];
        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);

        let z = &cp.x_cp - &x;
        let expected = model.w.t().dot(&z);
        for j in 0..expected.len() {
            assert!(
                approx_eq!(f64, cp.c[j], expected[j], MARGIN),
                "c[{}] = {} should be {}",
                j,
                cp.c[j],
                expected[j]
            );
        }
    }
}
