//! Stokes vector estimation and derived polarization quantities.

use crate::error::Error;
use crate::mueller;
use crate::plane::{OrientationStack, Plane};
use nalgebra::{DMatrix, Matrix4};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Describes the polarization state measured at a single pixel.
///
/// Three components describe linear polarization only; a fourth adds the
/// circular component.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StokesVec<const N: usize> {
    inner: [f64; N],
}

impl StokesVec<3> {
    /// Create a linear-only Stokes vector.
    pub fn new(s0: f64, s1: f64, s2: f64) -> Self {
        Self {
            inner: [s0, s1, s2],
        }
    }
}

impl StokesVec<4> {
    /// Create a full Stokes vector.
    pub fn new(s0: f64, s1: f64, s2: f64, s3: f64) -> Self {
        Self {
            inner: [s0, s1, s2, s3],
        }
    }

    /// Degree of polarization including the circular component.
    ///
    /// Not defined where `s0` is zero; the division produces a non-finite
    /// value there rather than an error.
    pub fn dop(&self) -> f64 {
        (self.inner[1].powi(2) + self.inner[2].powi(2) + self.inner[3].powi(2)).sqrt() / self.s0()
    }

    /// Ellipticity angle on the range [-PI/4, PI/4].
    pub fn ellipticity_angle(&self) -> f64 {
        0.5 * self.inner[3].atan2(self.linear_intensity())
    }
}

impl<const N: usize> StokesVec<N> {
    pub(crate) fn from_components(inner: [f64; N]) -> Self {
        Self { inner }
    }

    /// The component at `index`.
    pub fn component(&self, index: usize) -> f64 {
        self.inner[index]
    }

    fn s0(&self) -> f64 {
        self.inner[0]
    }

    fn s1(&self) -> f64 {
        self.inner[1]
    }

    fn s2(&self) -> f64 {
        self.inner[2]
    }

    /// Intensity carried by the linear polarization components.
    fn linear_intensity(&self) -> f64 {
        (self.s1().powi(2) + self.s2().powi(2)).sqrt()
    }

    /// Largest intensity transmitted through a rotating analyzer.
    pub fn imax(&self) -> f64 {
        (self.s0() + self.linear_intensity()) * 0.5
    }

    /// Smallest intensity transmitted through a rotating analyzer.
    pub fn imin(&self) -> f64 {
        (self.s0() - self.linear_intensity()) * 0.5
    }

    /// Degree of linear polarization.
    ///
    /// Not defined where `s0` is zero; the division produces a non-finite
    /// value there rather than an error.
    pub fn dolp(&self) -> f64 {
        self.linear_intensity() / self.s0()
    }

    /// Angle of linear polarization on the range [0, PI).
    pub fn aolp(&self) -> f64 {
        (0.5 * self.s2().atan2(self.s1())).rem_euclid(PI)
    }

    /// Mean intensity over all analyzer angles.
    pub fn intensity(&self) -> f64 {
        self.s0() * 0.5
    }

    /// Diffuse reflection component under the dichromatic reflection model.
    pub fn diffuse(&self) -> f64 {
        self.imin()
    }

    /// Specular reflection component under the dichromatic reflection model.
    ///
    /// Same as `imax - imin`.
    pub fn specular(&self) -> f64 {
        self.linear_intensity()
    }
}

/// A per-pixel image of Stokes vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct StokesImage<const N: usize> {
    width: usize,
    height: usize,
    pixels: Vec<StokesVec<N>>,
}

impl<const N: usize> StokesImage<N> {
    /// Create a Stokes image from row-major `pixels`.
    ///
    /// Returns an error unless `pixels` holds exactly `width * height`
    /// elements.
    pub fn from_pixels(
        width: usize,
        height: usize,
        pixels: Vec<StokesVec<N>>,
    ) -> Result<Self, Error> {
        if pixels.len() != width * height {
            return Err(Error::BufferSize {
                expected: width * height,
                found: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Returns a reference to the Stokes vector at `(x, y)` if it is within
    /// the image, otherwise returns None.
    pub fn get(&self, x: usize, y: usize) -> Option<&StokesVec<N>> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x)
    }

    pub fn pixels(&self) -> &[StokesVec<N>] {
        self.pixels.as_slice()
    }

    /// Apply `kernel` at every pixel in parallel.
    ///
    /// Every derived map below is a kernel with no cross-pixel dependency.
    pub fn map(&self, kernel: impl Fn(&StokesVec<N>) -> f64 + Sync) -> Plane<f64> {
        Plane::from_parts(
            self.width,
            self.height,
            self.pixels.par_iter().map(|sv| kernel(sv)).collect(),
        )
    }

    /// Largest transmitted intensity at every pixel.
    pub fn imax(&self) -> Plane<f64> {
        self.map(StokesVec::imax)
    }

    /// Smallest transmitted intensity at every pixel.
    pub fn imin(&self) -> Plane<f64> {
        self.map(StokesVec::imin)
    }

    /// Degree of linear polarization at every pixel.
    pub fn dolp(&self) -> Plane<f64> {
        self.map(StokesVec::dolp)
    }

    /// Angle of linear polarization at every pixel.
    pub fn aolp(&self) -> Plane<f64> {
        self.map(StokesVec::aolp)
    }

    /// Mean intensity at every pixel.
    pub fn intensity(&self) -> Plane<f64> {
        self.map(StokesVec::intensity)
    }

    /// Diffuse reflection component at every pixel.
    pub fn diffuse(&self) -> Plane<f64> {
        self.map(StokesVec::diffuse)
    }

    /// Specular reflection component at every pixel.
    pub fn specular(&self) -> Plane<f64> {
        self.map(StokesVec::specular)
    }
}

impl StokesImage<4> {
    /// Degree of polarization at every pixel.
    pub fn dop(&self) -> Plane<f64> {
        self.map(StokesVec::dop)
    }

    /// Ellipticity angle at every pixel.
    pub fn ellipticity_angle(&self) -> Plane<f64> {
        self.map(StokesVec::ellipticity_angle)
    }
}

/// Fit a full Stokes vector at every pixel from a stack of intensity
/// images.
///
/// Solves `I = A * S` in the least squares sense at each pixel, where the
/// rows of `A` are the first rows of `matrices`, one per acquisition. `A`
/// does not depend on pixel position, so its pseudo-inverse is computed
/// once and contracted over every pixel in parallel. A rank-deficient `A`
/// degrades conditioning and yields the minimum-norm solution instead of
/// raising an error.
pub fn calc_stokes(
    intensities: &[Plane<f64>],
    matrices: &[Matrix4<f64>],
) -> Result<StokesImage<4>, Error> {
    let rows: Vec<[f64; 4]> = matrices
        .iter()
        .map(|m| [m[(0, 0)], m[(0, 1)], m[(0, 2)], m[(0, 3)]])
        .collect();

    solve(intensities, &rows)
}

/// Fit the linear Stokes components at every pixel from intensities
/// measured behind ideal linear polarizers at `angles` radians.
///
/// Builds the observation rows from the polarizer Mueller model truncated
/// to its linear block and delegates to the full fit.
pub fn calc_linear_stokes(
    intensities: &[Plane<f64>],
    angles: &[f64],
) -> Result<StokesImage<3>, Error> {
    let rows: Vec<[f64; 3]> = angles
        .iter()
        .map(|&angle| {
            let m = mueller::polarizer(angle);
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]]
        })
        .collect();

    solve(intensities, &rows)
}

fn solve<const N: usize>(
    intensities: &[Plane<f64>],
    rows: &[[f64; N]],
) -> Result<StokesImage<N>, Error> {
    let first = intensities.first().ok_or(Error::EmptyStack)?;
    if intensities.len() != rows.len() {
        return Err(Error::MeasurementMismatch {
            intensities: intensities.len(),
            matrices: rows.len(),
        });
    }

    let (width, height) = first.dimensions();
    for plane in intensities {
        if plane.dimensions() != (width, height) {
            return Err(Error::DimensionMismatch {
                expected: (width, height),
                found: plane.dimensions(),
            });
        }
    }

    let observation = DMatrix::from_fn(rows.len(), N, |r, c| rows[r][c]);
    let pinv = observation
        .pseudo_inverse(f64::EPSILON)
        .expect("epsilon is non-negative");

    let planes: Vec<&[f64]> = intensities.iter().map(|plane| plane.as_slice()).collect();
    let pixels: Vec<StokesVec<N>> = (0..width * height)
        .into_par_iter()
        .map(|i| {
            let mut components = [0.0; N];
            for (n, component) in components.iter_mut().enumerate() {
                *component = planes
                    .iter()
                    .enumerate()
                    .map(|(k, plane)| pinv[(n, k)] * plane[i])
                    .sum();
            }
            StokesVec::from_components(components)
        })
        .collect();

    Ok(StokesImage {
        width,
        height,
        pixels,
    })
}

impl OrientationStack<Plane<f64>> {
    /// Fit the linear Stokes components from the four orientation planes.
    pub fn linear_stokes(&self) -> Result<StokesImage<3>, Error> {
        calc_linear_stokes(self.images(), &Self::ANGLES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;
    use std::f64::consts::FRAC_PI_4;

    fn sv(seed: (i16, i16, i16)) -> StokesVec<3> {
        // Map quickcheck seeds onto components of magnitude at most one.
        StokesVec::<3>::new(
            seed.0 as f64 / i16::MAX as f64,
            seed.1 as f64 / i16::MAX as f64,
            seed.2 as f64 / i16::MAX as f64,
        )
    }

    quickcheck! {
        fn aolp_stays_in_range(seed: (i16, i16, i16)) -> bool {
            let aolp = sv(seed).aolp();
            (0.0..PI).contains(&aolp)
        }

        fn ellipticity_stays_in_range(seed: (i16, i16, i16), s3_seed: i16) -> bool {
            let linear = sv(seed);
            let full = StokesVec::<4>::new(
                linear.component(0),
                linear.component(1),
                linear.component(2),
                s3_seed as f64 / i16::MAX as f64,
            );
            (-FRAC_PI_4..=FRAC_PI_4).contains(&full.ellipticity_angle())
        }

        fn analyzer_extrema_are_consistent(seed: (i16, i16, i16)) -> bool {
            let sv = sv(seed);
            let specular = sv.imax() - sv.imin();
            let intensity = (sv.imax() + sv.imin()) * 0.5;

            (specular - sv.specular()).abs() < 1e-12
                && (intensity - sv.intensity()).abs() < 1e-12
        }
    }

    #[rstest]
    #[case(StokesVec::<3>::new(1.0, 0.5, 0.0), 0.75, 0.25, 0.5, 0.0)]
    #[case(StokesVec::<3>::new(2.0, 0.0, -2.0), 2.0, 0.0, 1.0, 0.75 * PI)]
    #[case(StokesVec::<3>::new(1.0, -1.0, 0.0), 1.0, 0.0, 1.0, 0.5 * PI)]
    fn linear_kernels(
        #[case] sv: StokesVec<3>,
        #[case] imax: f64,
        #[case] imin: f64,
        #[case] dolp: f64,
        #[case] aolp: f64,
    ) {
        assert_relative_eq!(sv.imax(), imax, epsilon = 1e-12);
        assert_relative_eq!(sv.imin(), imin, epsilon = 1e-12);
        assert_relative_eq!(sv.dolp(), dolp, epsilon = 1e-12);
        assert_relative_eq!(sv.aolp(), aolp, epsilon = 1e-12);
        assert_relative_eq!(sv.diffuse(), sv.imin(), epsilon = 1e-12);
        assert_relative_eq!(sv.intensity(), sv.component(0) * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn circular_light_has_unit_dop_and_max_ellipticity() {
        let sv = StokesVec::<4>::new(1.0, 0.0, 0.0, 1.0);

        assert_relative_eq!(sv.dop(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(sv.ellipticity_angle(), FRAC_PI_4, epsilon = 1e-12);
        assert_relative_eq!(sv.dolp(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_s0_produces_non_finite_dolp() {
        let zero = StokesVec::<3>::new(0.0, 0.0, 0.0);
        let linear = StokesVec::<3>::new(0.0, 1.0, 0.0);

        assert!(zero.dolp().is_nan());
        assert!(linear.dolp().is_infinite());
    }

    /// Intensity behind an ideal polarizer at `angle` for a linear state.
    fn transmitted(sv: &StokesVec<3>, angle: f64) -> f64 {
        0.5 * (sv.component(0)
            + sv.component(1) * (2.0 * angle).cos()
            + sv.component(2) * (2.0 * angle).sin())
    }

    #[test]
    fn linear_fit_recovers_synthetic_state() {
        let expected = StokesVec::<3>::new(1.2, 0.4, -0.3);
        let angles = OrientationStack::<Plane<f64>>::ANGLES;

        let planes: Vec<Plane<f64>> = angles
            .iter()
            .map(|&angle| {
                Plane::from_samples(2, 2, vec![transmitted(&expected, angle); 4]).unwrap()
            })
            .collect();

        let stokes = calc_linear_stokes(&planes, &angles).unwrap();
        assert_eq!(stokes.dimensions(), (2, 2));

        for sv in stokes.pixels() {
            for i in 0..3 {
                assert_relative_eq!(sv.component(i), expected.component(i), epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn overdetermined_fit_averages_measurements() {
        // Six noiseless measurements, angles beyond the mosaic's four.
        let expected = StokesVec::<3>::new(0.8, -0.2, 0.5);
        let angles: Vec<f64> = (0..6).map(|k| k as f64 * PI / 6.0).collect();

        let planes: Vec<Plane<f64>> = angles
            .iter()
            .map(|&angle| {
                Plane::from_samples(1, 1, vec![transmitted(&expected, angle)]).unwrap()
            })
            .collect();

        let stokes = calc_linear_stokes(&planes, &angles).unwrap();

        for i in 0..3 {
            assert_relative_eq!(
                stokes.pixels()[0].component(i),
                expected.component(i),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn rank_deficient_full_fit_yields_minimum_norm_solution() {
        // Linear polarizer rows never touch S3, so the observation matrix
        // is rank deficient and the fit should return S3 = 0 rather than
        // fail.
        let expected = StokesVec::<3>::new(1.0, 0.3, 0.1);
        let angles = OrientationStack::<Plane<f64>>::ANGLES;

        let planes: Vec<Plane<f64>> = angles
            .iter()
            .map(|&angle| {
                Plane::from_samples(1, 1, vec![transmitted(&expected, angle)]).unwrap()
            })
            .collect();
        let matrices: Vec<_> = angles.iter().map(|&angle| mueller::polarizer(angle)).collect();

        let stokes = calc_stokes(&planes, &matrices).unwrap();
        let sv = &stokes.pixels()[0];

        for i in 0..3 {
            assert_relative_eq!(sv.component(i), expected.component(i), epsilon = 1e-9);
        }
        assert_relative_eq!(sv.component(3), 0.0, epsilon = 1e-9);
        assert_relative_eq!(sv.dop(), sv.dolp(), epsilon = 1e-12);
    }

    #[test]
    fn empty_stack_is_rejected() {
        assert!(matches!(
            calc_linear_stokes(&[], &[]),
            Err(Error::EmptyStack)
        ));
    }

    #[test]
    fn measurement_count_mismatch_is_rejected() {
        let plane = Plane::from_samples(1, 1, vec![1.0]).unwrap();

        assert!(matches!(
            calc_linear_stokes(&[plane], &[0.0, FRAC_PI_4]),
            Err(Error::MeasurementMismatch {
                intensities: 1,
                matrices: 2
            })
        ));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let a = Plane::from_samples(2, 2, vec![1.0; 4]).unwrap();
        let b = Plane::from_samples(2, 1, vec![1.0; 2]).unwrap();

        assert!(matches!(
            calc_linear_stokes(&[a, b], &[0.0, FRAC_PI_4]),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
