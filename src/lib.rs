//! Division of Focal Plane Polarization Image Processing
//!
//! A raw [`Mosaic`](mosaic::Mosaic) frame from a DoFP polarization camera is
//! demosaiced into an [`OrientationStack`](plane::OrientationStack) of
//! per-orientation intensity images. A least squares fit against the
//! polarizer observation model turns the stack into a
//! [`StokesImage`](stokes::StokesImage), and closed-form kernels derive
//! scalar maps such as the degree and angle of linear polarization.
//!
//! ```
//! use dofp::prelude::*;
//!
//! # fn main() -> Result<(), Error> {
//! let frame = vec![128u8; 1224 * 1024];
//! let mosaic = Mosaic::from_samples(1224, 1024, frame)?;
//!
//! let stack = mosaic.demosaic(Interpolation::Bilinear)?;
//! let stokes = stack.to_f64().linear_stokes()?;
//!
//! let dolp = stokes.dolp();
//! let aolp = stokes.aolp();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mosaic;
pub mod mueller;
pub mod plane;
pub mod stokes;

pub mod prelude {
    pub use crate::error::Error;
    pub use crate::mosaic::{Interpolation, Mosaic, Sample};
    pub use crate::mueller::polarizer;
    pub use crate::plane::{OrientationStack, Plane, RgbImage};
    pub use crate::stokes::{StokesImage, StokesVec, calc_linear_stokes, calc_stokes};
}
