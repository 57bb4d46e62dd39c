//! boxmin prelude.
//!
//! This module contains the most used types, type aliases, traits, functions,
//! and macros that you can import easily as a group.
//!
//! ```
//! use boxmin::prelude::*;
//!
//! ```

#[doc(no_inline)]
pub use crate::error::MinimizerError;

#[doc(no_inline)]
pub use crate::minimize::{MinimizerResult, ObjFn, ObjGradFn, WolfeParams};

#[doc(no_inline)]
pub use crate::minimize::bounds::{BoundKind, Bounds};

#[doc(no_inline)]
pub use crate::minimize::convergence::Convergence;

#[doc(no_inline)]
pub use crate::minimize::history::CorrectionHistory;

#[doc(no_inline)]
pub use crate::minimize::lbfgsb::{
    IterationEvent, Lbfgsb, LbfgsbParameters, LbfgsbResult, Status,
};

#[doc(no_inline)]
pub use crate::minimize::objective::{MultiDimFn, MultiDimGradFn, MultiDimNumGradFn};
