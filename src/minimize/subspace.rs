use crate::minimize::bounds::Bounds;
use crate::minimize::cauchy::CauchyPoint;
use crate::minimize::history::CompactModel;
use crate::minimize::linalg;
use ndarray::prelude::*;

/// Refine the Cauchy point over the free variables (direct primal method).
///
/// Minimizes the quadratic model restricted to the variables left free by the
/// Cauchy walk, solving the small reduced system through the compact
/// representation, then truncates the subspace step at the first bound
/// crossing among the free variables. Returns the search direction
/// `x_bar - x` from the current iterate.
///
/// A singular reduced system falls back to the Cauchy point itself.
pub(crate) fn subspace_minimize(
    x: &Array1<f64>,
    g: &Array1<f64>,
    bounds: &Bounds,
    model: &CompactModel,
    cp: &CauchyPoint,
) -> Array1<f64> {
    if cp.free.is_empty() {
        return &cp.x_cp - x;
    }

    let nf = cp.free.len();
    let two_k = model.w.ncols();
    let theta = model.theta;
    let lower = bounds.lower();
    let upper = bounds.upper();

    // Reduced gradient of the model at the Cauchy point
    let wmc = model.w.dot(&model.m.dot(&cp.c));
    let mut r_hat = Array1::zeros(nf);
    for (j, &i) in cp.free.iter().enumerate() {
        r_hat[j] = g[i] + theta * (cp.x_cp[i] - x[i]) - wmc[i];
    }

    // A = W^T Z restricts the compact part to the free subspace
    let a = Array2::from_shape_fn((two_k, nf), |(i, j)| model.w[[cp.free[j], i]]);

    // (I - (1/theta) M A A^T) v = M A r_hat
    let m_a_at = model.m.dot(&a.dot(&a.t()));
    let mut n_mat = Array2::eye(two_k);
    n_mat.scaled_add(-1.0 / theta, &m_a_at);
    let rhs = model.m.dot(&a.dot(&r_hat));

    let d_hat = match linalg::solve(&n_mat, &rhs) {
        Ok(v) => {
            let correction = a.t().dot(&v);
            Array1::from_shape_fn(nf, |j| {
                -(r_hat[j] + correction[j] / theta) / theta
            })
        }
        Err(_) => return &cp.x_cp - x,
    };

    // Truncate at the first free-variable bound crossing
    let mut alpha_star: f64 = 1.0;
    for (j, &i) in cp.free.iter().enumerate() {
        if d_hat[j] > 0.0 {
            alpha_star = alpha_star.min((upper[i] - cp.x_cp[i]) / d_hat[j]);
        } else if d_hat[j] < 0.0 {
            alpha_star = alpha_star.min((lower[i] - cp.x_cp[i]) / d_hat[j]);
        }
    }
    alpha_star = alpha_star.max(0.0);

    let mut x_bar = cp.x_cp.clone();
    for (j, &i) in cp.free.iter().enumerate() {
        x_bar[i] = (x_bar[i] + alpha_star * d_hat[j]).clamp(lower[i], upper[i]);
    }
    x_bar - x
}

#[cfg(test)]
mod minimize_subspace_tests {
    use super::*;
    use crate::minimize::cauchy::generalized_cauchy_point;
    use crate::minimize::history::CorrectionHistory;
    use float_cmp::{approx_eq, F64Margin};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-10,
        ulps: 4,
    };

    #[test]
    fn test_identity_model_direction_is_newton_step() {
        // f(x) = ||x||^2 / 2 with B = I: the refined step lands on the origin
        let bounds = Bounds::new(2).unwrap();
        let model = CompactModel::identity(2);
        let x = array![3.0, 4.0];
        let g = x.clone();

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        let d = subspace_minimize(&x, &g, &bounds, &model, &cp);
        assert!(approx_eq!(f64, x[0] + d[0], 0.0, MARGIN), "step = {:?}", d);
        assert!(approx_eq!(f64, x[1] + d[1], 0.0, MARGIN));
    }

    #[test]
    fn test_no_free_variables_returns_cauchy_direction() {
        let bounds = Bounds::from_arrays(array![0.0, 0.0], array![10.0, 10.0]).unwrap();
        let model = CompactModel::identity(2);
        let x = array![1.0, 1.0];
        let g = x.clone();

        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        assert!(cp.free.is_empty());
        let d = subspace_minimize(&x, &g, &bounds, &model, &cp);
        assert_eq!(&x + &d, cp.x_cp);
    }

    #[test]
    fn test_direction_is_descent_with_history() {
        let bounds = Bounds::from_arrays(array![-5.0, -5.0], array![5.0, 5.0]).unwrap();
        let mut h = CorrectionHistory::new(5, 2).unwrap();
        assert!(h.push(&array![1.0, 1.0], &array![1.0, 2.0]));
        let model = h.compact().unwrap();

        let x = array![2.0, 2.0];
        let g = array![2.0, 4.0];
        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        let d = subspace_minimize(&x, &g, &bounds, &model, &cp);

        let dg: f64 = g.dot(&d);
        assert!(dg < 0.0, "directional derivative = {} must be negative", dg);
    }

    #[test]
    fn test_step_never_leaves_the_box() {
        // Tight box: whatever the model suggests, the truncated step plus the
        // pinned components must stay feasible
        let bounds = Bounds::from_arrays(array![-0.4, -0.1], array![0.3, 0.25]).unwrap();
        let mut h = CorrectionHistory::new(5, 2).unwrap();
        assert!(h.push(&array![1.0, 1.0], &array![1.0, 2.0]));
        assert!(h.push(&array![-0.5, 0.25], &array![-0.5, 0.5]));
        let model = h.compact().unwrap();

        let x = array![0.2, 0.1];
        let g = array![1.5, -2.5];
        let cp = generalized_cauchy_point(&x, &g, &bounds, &model);
        let d = subspace_minimize(&x, &g, &bounds, &model, &cp);

        let stepped = &x + &d;
        assert!(
            bounds.contains(&stepped),
            "x + d = {:?} escapes the box",
            stepped
        );
    }
}
