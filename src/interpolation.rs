//! Resampling of gridded data at transformed coordinates.

pub mod linear;
pub mod nearest;

use crate::{
    backend::NumericBackend,
    error::{CpabError, Result},
    num::{self, CFloat},
};
use ndarray::prelude::*;
use std::fmt;

/// Defines the properties of an interpolator for gridded data.
pub trait Interpolator: Clone + Sync + Send + fmt::Debug {
    /// Computes the interpolated values of all channels at the given
    /// coordinate in index space.
    ///
    /// # Parameters
    ///
    /// - `data`: Data array whose last axis holds the channels.
    /// - `index_coords`: Fractional array index along each spatial axis.
    /// - `values`: Output for the interpolated value of each channel.
    ///
    /// Coordinates beyond the data are clamped to the nearest edge.
    ///
    /// # Type parameters
    ///
    /// - `F`: Floating point type of the data.
    fn interp_point<F: CFloat>(
        &self,
        data: &ArrayViewD<F>,
        index_coords: &[F],
        values: ArrayViewMut1<F>,
    );
}

/// Clamps the given fractional index to the valid range of an axis with
/// the given number of samples.
pub fn clamp_index<F: CFloat>(index: F, n_samples: usize) -> F {
    let upper = num::from_usize::<F>(n_samples - 1);
    if index.is_nan() {
        F::zero()
    } else {
        index.max(F::zero()).min(upper)
    }
}

/// Evaluates the given data at the given points of the unit domain.
///
/// # Parameters
///
/// - `backend`: Backend performing the evaluation.
/// - `interpolator`: Interpolator to use.
/// - `ndim`: Number of spatial dimensions.
/// - `data`: Data with `ndim` spatial axes and an optional trailing channel axis.
/// - `points`: `[nP, ndim]` array of points in the unit domain.
/// - `output_shape`: Spatial shape of the result, whose product must equal `nP`.
///
/// # Returns
///
/// An array with the spatial shape `output_shape`, followed by the channel
/// axis if the input data has one.
pub fn interpolate<F, I, B>(
    backend: &B,
    interpolator: &I,
    ndim: usize,
    data: ArrayViewD<F>,
    points: ArrayView2<F>,
    output_shape: &[usize],
) -> Result<ArrayD<F>>
where
    F: CFloat,
    I: Interpolator,
    B: NumericBackend<F>,
{
    if points.ncols() != ndim {
        return Err(CpabError::shape_mismatch(
            "Dimensionality of points",
            ndim,
            points.ncols(),
        ));
    }
    if output_shape.len() != ndim {
        return Err(CpabError::shape_mismatch(
            "Number of output dimensions",
            ndim,
            output_shape.len(),
        ));
    }
    let n_output_points: usize = output_shape.iter().product();
    if n_output_points != points.nrows() {
        return Err(CpabError::Shape(format!(
            "Output shape {:?} holds {} points, but {} points were given",
            output_shape,
            n_output_points,
            points.nrows()
        )));
    }

    let has_channels = if data.ndim() == ndim {
        false
    } else if data.ndim() == ndim + 1 {
        true
    } else {
        return Err(CpabError::Shape(format!(
            "Data with {} axes cannot be interpolated in {} dimensions",
            data.ndim(),
            ndim
        )));
    };
    let data = if has_channels {
        data
    } else {
        data.insert_axis(Axis(ndim))
    };
    if data.shape().iter().any(|&len| len == 0) {
        return Err(CpabError::Shape(format!(
            "Data of shape {:?} is empty",
            data.shape()
        )));
    }

    let spatial_shape = &data.shape()[..ndim];
    let n_channels = data.shape()[ndim];

    let index_coords = Array2::from_shape_fn(points.dim(), |(point, dim)| {
        points[[point, dim]] * num::from_usize::<F>(spatial_shape[dim] - 1)
    });
    let mut values = Array2::zeros((points.nrows(), n_channels));
    backend.resample(interpolator, &data, index_coords.view(), &mut values);

    let mut shape = output_shape.to_vec();
    if has_channels {
        shape.push(n_channels);
    }
    ArrayD::from_shape_vec(shape, values.iter().cloned().collect()).map_err(|err| {
        CpabError::Shape(format!("Could not reshape interpolated values: {}", err))
    })
}
