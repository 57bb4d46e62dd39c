use crate::error::MinimizerError;
use crate::minimize::linalg;
use ndarray::prelude::*;

/// Flat ring buffer of L-BFGS correction pairs.
///
/// Stores up to `m` pairs of n-dimensional vectors `(s, y)` plus the scalar
/// `rho = 1/(s^T y)` in contiguous memory. Pushing at capacity overwrites the
/// oldest pair in O(1); no per-pair heap allocation, no element shifting.
#[derive(Debug, Clone)]
pub struct CorrectionHistory {
    s_flat: Vec<f64>,
    y_flat: Vec<f64>,
    rho: Vec<f64>,
    n: usize,
    m: usize,
    head: usize,
    len: usize,
    theta: f64,
}

impl CorrectionHistory {
    pub fn new(m: usize, n: usize) -> Result<Self, MinimizerError> {
        if m == 0 {
            return Err(MinimizerError::InvalidCorrectionCount);
        }
        if n == 0 {
            return Err(MinimizerError::InvalidDimension);
        }
        Ok(Self {
            s_flat: vec![0.0; m * n],
            y_flat: vec![0.0; m * n],
            rho: vec![0.0; m],
            n,
            m,
            head: 0,
            len: 0,
            theta: 1.0,
        })
    }

    /// Offer a correction pair `(s, y)`.
    ///
    /// The pair is kept only when the curvature condition `s^T y > eps * y^T y`
    /// holds; near-zero or negative curvature would destroy positive
    /// definiteness of the implicit inverse Hessian. Returns whether the pair
    /// was stored.
    pub fn push(&mut self, s: &Array1<f64>, y: &Array1<f64>) -> bool {
        let mut sy = 0.0;
        let mut yy = 0.0;
        for i in 0..self.n {
            sy += s[i] * y[i];
            yy += y[i] * y[i];
        }
        if !sy.is_finite() || sy <= f64::EPSILON * yy || sy == 0.0 {
            return false;
        }

        let slot = if self.len < self.m {
            let slot = (self.head + self.len) % self.m;
            self.len += 1;
            slot
        } else {
            let slot = self.head;
            self.head = (self.head + 1) % self.m;
            slot
        };
        let off = slot * self.n;
        for i in 0..self.n {
            self.s_flat[off + i] = s[i];
            self.y_flat[off + i] = y[i];
        }
        self.rho[slot] = 1.0 / sy;
        self.theta = yy / sy;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.m
    }

    /// Scaling `theta = y^T y / s^T y` of the base Hessian approximation
    /// `B_0 = theta * I`, from the most recent accepted pair.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.theta = 1.0;
    }

    /// `s` vector at logical index `i` (0 = oldest, len-1 = newest).
    fn s(&self, i: usize) -> ArrayView1<'_, f64> {
        let slot = (self.head + i) % self.m;
        let off = slot * self.n;
        ArrayView1::from(&self.s_flat[off..off + self.n])
    }

    /// `y` vector at logical index `i`.
    fn y(&self, i: usize) -> ArrayView1<'_, f64> {
        let slot = (self.head + i) % self.m;
        let off = slot * self.n;
        ArrayView1::from(&self.y_flat[off..off + self.n])
    }

    fn rho_at(&self, i: usize) -> f64 {
        self.rho[(self.head + i) % self.m]
    }

    /// Two-loop recursion: the product of the implicit inverse Hessian
    /// approximation with `v`, in O(m*n) without materializing any matrix.
    pub fn apply_inverse_hessian(&self, v: &Array1<f64>) -> Array1<f64> {
        let k = self.len;
        if k == 0 {
            return v.clone();
        }

        let mut q = v.clone();
        let mut alpha = vec![0.0; k];

        // Backward pass
        for i in (0..k).rev() {
            let si = self.s(i);
            let mut dot = 0.0;
            for j in 0..self.n {
                dot += si[j] * q[j];
            }
            alpha[i] = self.rho_at(i) * dot;
            let yi = self.y(i);
            for j in 0..self.n {
                q[j] -= alpha[i] * yi[j];
            }
        }

        // Seed with H_0 = gamma * I, gamma = 1/theta
        let gamma = if self.theta > 0.0 { 1.0 / self.theta } else { 1.0 };
        let mut r: Array1<f64> = q.mapv(|qi| gamma * qi);

        // Forward pass
        for i in 0..k {
            let yi = self.y(i);
            let mut dot = 0.0;
            for j in 0..self.n {
                dot += yi[j] * r[j];
            }
            let beta = self.rho_at(i) * dot;
            let si = self.s(i);
            for j in 0..self.n {
                r[j] += (alpha[i] - beta) * si[j];
            }
        }
        r
    }

    /// Build the compact representation `B = theta*I - W M W^T` of the
    /// limited-memory Hessian approximation from the stored pairs.
    pub(crate) fn compact(&self) -> Result<CompactModel, MinimizerError> {
        let k = self.len;
        let n = self.n;
        let theta = self.theta;

        let mut w = Array2::zeros((n, 2 * k));
        for j in 0..k {
            let yj = self.y(j);
            let sj = self.s(j);
            for i in 0..n {
                w[[i, j]] = yj[i];
                w[[i, k + j]] = theta * sj[i];
            }
        }

        // M^-1 = [ -D   L^T       ]   D = diag(s_i^T y_i)
        //        [  L   theta*S^T S]   L_ij = s_i^T y_j (i > j)
        let mut m_inv = Array2::zeros((2 * k, 2 * k));
        for i in 0..k {
            for j in 0..k {
                let mut sy = 0.0;
                let mut ss = 0.0;
                let si = self.s(i);
                let yj = self.y(j);
                let sj = self.s(j);
                for t in 0..n {
                    sy += si[t] * yj[t];
                    ss += si[t] * sj[t];
                }
                if i == j {
                    m_inv[[i, j]] = -sy;
                } else if i > j {
                    m_inv[[k + i, j]] = sy;
                    m_inv[[j, k + i]] = sy;
                }
                m_inv[[k + i, k + j]] = theta * ss;
            }
        }

        let m = linalg::invert(&m_inv)?;
        Ok(CompactModel { w, m, theta })
    }
}

/// Compact limited-memory model `B = theta*I - W M W^T`.
///
/// `w` is n x 2k and `m` is 2k x 2k with k stored pairs; k = 0 degenerates to
/// `B = theta*I` and every product through `w`/`m` contributes nothing.
#[derive(Debug, Clone)]
pub(crate) struct CompactModel {
    pub w: Array2<f64>,
    pub m: Array2<f64>,
    pub theta: f64,
}

impl CompactModel {
    pub fn identity(n: usize) -> Self {
        CompactModel {
            w: Array2::zeros((n, 0)),
            m: Array2::zeros((0, 0)),
            theta: 1.0,
        }
    }
}

#[cfg(test)]
mod minimize_history_tests {
    use super::*;
    use float_cmp::{approx_eq, F64Margin};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-10,
        ulps: 4,
    };

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            CorrectionHistory::new(0, 3).err(),
            Some(MinimizerError::InvalidCorrectionCount)
        );
    }

    #[test]
    fn test_push_and_logical_order() {
        let mut h = CorrectionHistory::new(3, 2).unwrap();
        assert!(h.is_empty());
        for i in 0..3 {
            let v = i as f64 + 1.0;
            assert!(h.push(&array![v, 0.0], &array![v, 0.0]));
        }
        assert_eq!(h.len(), 3);
        assert_eq!(h.s(0)[0], 1.0);
        assert_eq!(h.s(2)[0], 3.0);
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut h = CorrectionHistory::new(3, 2).unwrap();
        for i in 0..5 {
            let v = i as f64 + 1.0;
            assert!(h.push(&array![v, 0.0], &array![v, 0.0]));
        }
        // Entries 3, 4, 5 survive, oldest first
        assert_eq!(h.len(), 3);
        assert_eq!(h.s(0)[0], 3.0);
        assert_eq!(h.s(1)[0], 4.0);
        assert_eq!(h.s(2)[0], 5.0);
    }

    #[test]
    fn test_negative_curvature_rejected() {
        let mut h = CorrectionHistory::new(3, 2).unwrap();
        assert!(!h.push(&array![1.0, 0.0], &array![-1.0, 0.0]));
        assert!(!h.push(&array![0.0, 0.0], &array![0.0, 0.0]));
        assert!(h.is_empty());
        assert_eq!(h.theta(), 1.0);
    }

    #[test]
    fn test_two_loop_with_empty_history_is_identity() {
        let h = CorrectionHistory::new(5, 3).unwrap();
        let v = array![1.0, -2.0, 0.5];
        assert_eq!(h.apply_inverse_hessian(&v), v);
    }

    #[test]
    fn test_two_loop_single_pair_known_value() {
        // With s = y, the secant equation H y = s makes H act as the identity
        // along s; theta = 1 keeps the complement unchanged too.
        let mut h = CorrectionHistory::new(5, 2).unwrap();
        assert!(h.push(&array![2.0, 0.0], &array![2.0, 0.0]));
        assert!(approx_eq!(f64, h.theta(), 1.0, MARGIN));

        let hv = h.apply_inverse_hessian(&array![3.0, 4.0]);
        assert!(approx_eq!(f64, hv[0], 3.0, MARGIN), "hv[0] = {}", hv[0]);
        assert!(approx_eq!(f64, hv[1], 4.0, MARGIN), "hv[1] = {}", hv[1]);
    }

    #[test]
    fn test_two_loop_matches_dense_bfgs_inverse() {
        // One pair with s != y: compare against the closed-form BFGS inverse
        // H = (I - rho s y^T) H0 (I - rho y s^T) + rho s s^T, H0 = (1/theta) I.
        let s = array![1.0, 0.5];
        let y = array![2.0, 1.0];
        let sy: f64 = s.dot(&y);
        let yy: f64 = y.dot(&y);
        let rho = 1.0 / sy;
        let gamma = sy / yy;

        let mut h = CorrectionHistory::new(5, 2).unwrap();
        assert!(h.push(&s, &y));

        let v = array![1.0, -1.0];
        let got = h.apply_inverse_hessian(&v);

        let n = 2;
        let mut expected = Array1::zeros(n);
        // (I - rho y s^T) v
        let sv: f64 = s.dot(&v);
        let mut t = Array1::zeros(n);
        for i in 0..n {
            t[i] = v[i] - rho * y[i] * sv;
        }
        // H0 t
        for i in 0..n {
            t[i] *= gamma;
        }
        // (I - rho s y^T) t + rho s s^T v
        let yt: f64 = y.dot(&t);
        for i in 0..n {
            expected[i] = t[i] - rho * s[i] * yt + rho * s[i] * sv;
        }

        for i in 0..n {
            assert!(
                approx_eq!(f64, got[i], expected[i], MARGIN),
                "component {}: {} vs {}",
                i,
                got[i],
                expected[i]
            );
        }
    }

    #[test]
    fn test_compact_model_reproduces_hessian_product() {
        // B = theta*I - W M W^T must satisfy the secant equation B s = y.
        let s = array![1.0, 0.5, -0.25];
        let y = array![2.0, 1.0, 0.5];

        let mut h = CorrectionHistory::new(5, 3).unwrap();
        assert!(h.push(&s, &y));
        let model = h.compact().unwrap();

        let ws = model.w.t().dot(&s);
        let bs = s.mapv(|si| model.theta * si) - model.w.dot(&model.m.dot(&ws));
        for i in 0..3 {
            assert!(
                approx_eq!(f64, bs[i], y[i], MARGIN),
                "B*s[{}] = {} should equal y[{}] = {}",
                i,
                bs[i],
                i,
                y[i]
            );
        }
    }

    #[test]
    fn test_clear_resets_state() {
        let mut h = CorrectionHistory::new(3, 2).unwrap();
        assert!(h.push(&array![1.0, 0.0], &array![2.0, 0.0]));
        h.clear();
        assert!(h.is_empty());
        assert_eq!(h.theta(), 1.0);
    }
}
