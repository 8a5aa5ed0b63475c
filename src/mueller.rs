//! Mueller matrix models for ideal optical elements.

use nalgebra::Matrix4;

/// Mueller matrix of an ideal linear polarizer with its transmission axis
/// at `angle` radians from horizontal.
///
/// The first row is the observation row used when fitting Stokes vectors
/// from intensity measurements.
#[rustfmt::skip]
pub fn polarizer(angle: f64) -> Matrix4<f64> {
    let c = (2.0 * angle).cos();
    let s = (2.0 * angle).sin();

    0.5 * Matrix4::new(
        1.0, c,     s,     0.0,
        c,   c * c, c * s, 0.0,
        s,   c * s, s * s, 0.0,
        0.0, 0.0,   0.0,   0.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;
    use rstest::rstest;
    use std::f64::consts::FRAC_PI_2;

    #[rstest]
    #[case(0.0, [0.5, 0.5, 0.0, 0.0])]
    #[case(FRAC_PI_2 / 2.0, [0.5, 0.0, 0.5, 0.0])]
    #[case(FRAC_PI_2, [0.5, -0.5, 0.0, 0.0])]
    fn observation_row(#[case] angle: f64, #[case] expected: [f64; 4]) {
        let m = polarizer(angle);

        for (i, e) in expected.into_iter().enumerate() {
            assert_relative_eq!(m[(0, i)], e, epsilon = 1e-12);
        }
    }

    #[test]
    fn unpolarized_light_halves() {
        let unpolarized = Vector4::new(1.0, 0.0, 0.0, 0.0);
        let out = polarizer(0.3) * unpolarized;

        assert_relative_eq!(out[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn crossed_polarizers_extinguish() {
        let unpolarized = Vector4::new(1.0, 0.0, 0.0, 0.0);
        let out = polarizer(FRAC_PI_2) * polarizer(0.0) * unpolarized;

        assert_relative_eq!(out[0], 0.0, epsilon = 1e-12);
    }
}
