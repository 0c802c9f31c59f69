//! Configuration of a CPAB transformation.

use crate::{
    error::{CpabError, Result},
    io::Verbosity,
};
use std::fmt;

/// Highest supported number of spatial dimensions.
pub const MAX_DIMENSIONS: usize = 3;

/// Default number of steps used to integrate the velocity field.
pub const DEFAULT_INTEGRATION_STEPS: usize = 50;

/// Device on which the numerical work is performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Cpu => "cpu",
                Self::Gpu => "gpu",
            }
        )
    }
}

/// Configuration parameters for a CPAB transformation.
///
/// The domain is always the unit hyper-cube. The configuration is validated
/// when a transformation is constructed from it, and never changes after that.
#[derive(Clone, Debug, PartialEq)]
pub struct CpabConfig {
    /// Number of grid cells along each dimension.
    pub tess_size: Vec<usize>,
    /// Whether the velocity is forced to zero on the domain boundary.
    pub zero_boundary: bool,
    /// Whether each cell's velocity field is forced to be divergence free.
    pub volume_preserving: bool,
    /// Number of fixed steps used when integrating the velocity field.
    pub n_integration_steps: usize,
    /// Device to run on.
    pub device: Device,
    /// Whether to print status messages.
    pub verbosity: Verbosity,
}

impl CpabConfig {
    /// Creates a configuration for the given tessellation size with defaults
    /// for everything else.
    pub fn new(tess_size: &[usize]) -> Self {
        Self {
            tess_size: tess_size.to_vec(),
            zero_boundary: true,
            volume_preserving: false,
            n_integration_steps: DEFAULT_INTEGRATION_STEPS,
            device: Device::default(),
            verbosity: Verbosity::default(),
        }
    }

    /// Sets whether the full velocity vector vanishes on the domain boundary.
    ///
    /// In 3D every vertex of a tessellation with a single cell along some axis
    /// lies on the boundary, so these sizes admit no transformation other
    /// than the identity and fail with `CpabError::DegenerateConstraints`.
    pub fn with_zero_boundary(mut self, zero_boundary: bool) -> Self {
        self.zero_boundary = zero_boundary;
        self
    }

    pub fn with_volume_preservation(mut self, volume_preserving: bool) -> Self {
        self.volume_preserving = volume_preserving;
        self
    }

    pub fn with_integration_steps(mut self, n_integration_steps: usize) -> Self {
        self.n_integration_steps = n_integration_steps;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Checks that the configuration describes a valid tessellation.
    pub fn validate(&self) -> Result<()> {
        let ndim = self.tess_size.len();
        if ndim == 0 || ndim > MAX_DIMENSIONS {
            return Err(CpabError::Configuration(format!(
                "Only 1D, 2D and 3D transformations are supported, but {} cell counts were given",
                ndim
            )));
        }
        if let Some(&count) = self.tess_size.iter().find(|&&count| count == 0) {
            return Err(CpabError::Configuration(format!(
                "All cell counts must be positive, but got {} in {:?}",
                count, self.tess_size
            )));
        }
        if self.n_integration_steps == 0 {
            return Err(CpabError::Configuration(
                "Number of integration steps must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks the configuration and that the requested device can be used
    /// with a backend of the given capability.
    pub fn validate_for_backend(&self, backend_name: &str, supports_gpu: bool) -> Result<()> {
        self.validate()?;
        if self.device == Device::Gpu && !supports_gpu {
            return Err(CpabError::Configuration(format!(
                "Cannot use device {} with the CPU-only {} backend",
                self.device, backend_name
            )));
        }
        Ok(())
    }

    /// Returns the number of spatial dimensions.
    pub fn ndim(&self) -> usize {
        self.tess_size.len()
    }

    /// Whether the velocity field may be extrapolated outside the domain.
    pub fn valid_outside(&self) -> bool {
        !self.zero_boundary
    }

    /// Returns the lower bounds of the domain.
    pub fn domain_min(&self) -> Vec<f64> {
        vec![0.0; self.ndim()]
    }

    /// Returns the upper bounds of the domain.
    pub fn domain_max(&self) -> Vec<f64> {
        vec![1.0; self.ndim()]
    }

    /// Returns the number of simplicial sub-cells each grid cell is split into.
    pub fn subcells_per_box(&self) -> usize {
        match self.ndim() {
            1 => 1,
            2 => 4,
            _ => 6,
        }
    }

    /// Returns the total number of tessellation cells.
    pub fn n_cells(&self) -> usize {
        self.subcells_per_box() * self.tess_size.iter().product::<usize>()
    }

    /// Returns the shape of the affine matrix of a single cell.
    pub fn affine_shape(&self) -> [usize; 2] {
        [self.ndim(), self.ndim() + 1]
    }

    /// Returns the number of affine parameters per cell.
    pub fn params_per_cell(&self) -> usize {
        self.ndim() * (self.ndim() + 1)
    }

    /// Returns the total number of affine parameters over all cells.
    pub fn n_affine_params(&self) -> usize {
        self.n_cells() * self.params_per_cell()
    }

    /// Returns a canonical string identifying the basis of this configuration.
    ///
    /// Two configurations with the same fingerprint share the same basis.
    pub fn fingerprint(&self) -> String {
        format!(
            "cpab_basis_dim{}_tess{}_vo{}_zb{}_vp{}",
            self.ndim(),
            self.tess_size
                .iter()
                .map(|count| count.to_string())
                .collect::<Vec<_>>()
                .join("_"),
            self.valid_outside() as u8,
            self.zero_boundary as u8,
            self.volume_preserving as u8
        )
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn invalid_dimensionality_is_rejected() {
        assert!(matches!(
            CpabConfig::new(&[]).validate(),
            Err(CpabError::Configuration(_))
        ));
        assert!(matches!(
            CpabConfig::new(&[2, 2, 2, 2]).validate(),
            Err(CpabError::Configuration(_))
        ));
        assert!(CpabConfig::new(&[2, 2, 2]).validate().is_ok());
    }

    #[test]
    fn zero_cell_count_is_rejected() {
        assert!(matches!(
            CpabConfig::new(&[3, 0]).validate(),
            Err(CpabError::Configuration(_))
        ));
    }

    #[test]
    fn gpu_is_rejected_for_cpu_backend() {
        let config = CpabConfig::new(&[2]).with_device(Device::Gpu);
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_for_backend("reference", false),
            Err(CpabError::Configuration(_))
        ));
        assert!(config.validate_for_backend("accelerated", true).is_ok());
    }

    #[test]
    fn cell_counts_follow_subdivision() {
        assert_eq!(CpabConfig::new(&[5]).n_cells(), 5);
        assert_eq!(CpabConfig::new(&[2, 3]).n_cells(), 24);
        assert_eq!(CpabConfig::new(&[2, 1, 2]).n_cells(), 24);
        assert_eq!(CpabConfig::new(&[2, 3]).n_affine_params(), 24 * 6);
        assert_eq!(CpabConfig::new(&[1, 1, 1]).n_affine_params(), 6 * 12);
    }

    #[test]
    fn fingerprint_encodes_all_basis_inputs() {
        let config = CpabConfig::new(&[3, 2]).with_volume_preservation(true);
        assert_eq!(config.fingerprint(), "cpab_basis_dim2_tess3_2_vo0_zb1_vp1");
        let config = config.with_zero_boundary(false);
        assert_eq!(config.fingerprint(), "cpab_basis_dim2_tess3_2_vo1_zb0_vp1");
    }
}
