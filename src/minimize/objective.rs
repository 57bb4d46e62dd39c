use crate::minimize::{ObjFn, ObjGradFn};
use dyn_clone::DynClone;
use ndarray::prelude::*;

impl<F> ObjFn for F
where
    F: Fn(&Array1<f64>) -> f64 + DynClone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        self(x)
    }
}

// Wrapper for multi-dimensional functions
#[derive(Clone)]
pub struct MultiDimFn<F>(pub F)
where
    F: Fn(&Array1<f64>) -> f64 + Clone;

// Convenience constructors
impl<F> MultiDimFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    pub fn new(f: F) -> Self {
        MultiDimFn(f)
    }
}

impl<F> ObjFn for MultiDimFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

// Wrapper for multi-dimensional function w/gradient
#[derive(Clone)]
pub struct MultiDimGradFn<F, GF>(pub F, pub GF)
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone;

// Convenience constructors
impl<F, GF> MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    pub fn new(f: F, gf: GF) -> Self {
        MultiDimGradFn(f, gf)
    }
}

impl<F, GF> ObjFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

impl<F, GF> ObjGradFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        (self.1)(x)
    }
}

// Wrapper for multi-dimensional function w/numerical gradient
#[derive(Clone)]
pub struct MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    f: F,
    eps: f64,
}

impl<F> MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    pub fn new(f: F) -> Self {
        MultiDimNumGradFn {
            f,
            eps: f64::EPSILON.sqrt(),
        }
    }

    pub fn with_step(f: F, eps: f64) -> Self {
        MultiDimNumGradFn { f, eps }
    }
}

impl<F> ObjFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.f)(x)
    }
}

impl<F> ObjGradFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    /// Central-difference gradient with per-component relative step.
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        let n = x.len();
        let mut grad = Array1::zeros(n);
        for i in 0..n {
            let step = (self.eps * x[i].abs()).max(self.eps);

            let mut x_forward = x.clone();
            x_forward[i] += step;
            let f_forward = (self.f)(&x_forward);

            let mut x_backward = x.clone();
            x_backward[i] -= step;
            let f_backward = (self.f)(&x_backward);

            grad[i] = (f_forward - f_backward) / (2.0 * step);
        }
        grad
    }
}
