//! The `cpab` crate provides continuous piecewise-affine based diffeomorphic
//! transformations of 1D, 2D and 3D domains.

pub mod backend;
pub mod basis;
pub mod config;
pub mod cpab;
pub mod error;
pub mod interpolation;
pub mod io;
pub mod num;
pub mod tessellation;
pub mod transformer;

pub use crate::{
    backend::{NdarrayBackend, NumericBackend},
    basis::{registry::BasisRegistry, Basis},
    config::{CpabConfig, Device},
    cpab::{Cpab, CpabParams},
    error::{CpabError, Result},
};

#[cfg(feature = "parallel")]
pub use crate::backend::RayonBackend;
