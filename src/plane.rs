//! Image buffer types shared by the demosaicer and the Stokes fit.

use crate::error::Error;
use rayon::prelude::*;
use std::f64::consts::FRAC_PI_4;

/// A single-channel image stored in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    samples: Vec<T>,
}

impl<T> Plane<T> {
    /// Create a plane from row-major `samples`.
    ///
    /// Returns an error unless `samples` holds exactly `width * height`
    /// elements.
    pub fn from_samples(width: usize, height: usize, samples: Vec<T>) -> Result<Self, Error> {
        if samples.len() != width * height {
            return Err(Error::BufferSize {
                expected: width * height,
                found: samples.len(),
            });
        }

        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Caller guarantees `samples.len() == width * height`.
    pub(crate) fn from_parts(width: usize, height: usize, samples: Vec<T>) -> Self {
        debug_assert_eq!(samples.len(), width * height);
        Self {
            width,
            height,
            samples,
        }
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

    /// Returns a reference to the sample at `(x, y)` if it is within the
    /// plane, otherwise returns None.
    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if x >= self.width {
            return None;
        }
        self.samples.get(y * self.width + x)
    }

    pub fn as_slice(&self) -> &[T] {
        self.samples.as_slice()
    }

    pub fn into_samples(self) -> Vec<T> {
        self.samples
    }
}

impl<T: Copy + Into<f64> + Send + Sync> Plane<T> {
    /// Convert the samples to `f64`, the depth the Stokes fit consumes.
    pub fn to_f64(&self) -> Plane<f64> {
        Plane {
            width: self.width,
            height: self.height,
            samples: self.samples.par_iter().map(|&v| v.into()).collect(),
        }
    }
}

/// A three-channel image stored as row-major interleaved RGB triples.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbImage<T> {
    width: usize,
    height: usize,
    pixels: Vec<[T; 3]>,
}

impl<T> RgbImage<T> {
    /// Create an image from row-major RGB `pixels`.
    ///
    /// Returns an error unless `pixels` holds exactly `width * height`
    /// triples.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<[T; 3]>) -> Result<Self, Error> {
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

    /// Caller guarantees `pixels.len() == width * height`.
    pub(crate) fn from_parts(width: usize, height: usize, pixels: Vec<[T; 3]>) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        Self {
            width,
            height,
            pixels,
        }
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

    /// Returns a reference to the RGB triple at `(x, y)` if it is within the
    /// image, otherwise returns None.
    pub fn get(&self, x: usize, y: usize) -> Option<&[T; 3]> {
        if x >= self.width {
            return None;
        }
        self.pixels.get(y * self.width + x)
    }

    pub fn as_slice(&self) -> &[[T; 3]] {
        self.pixels.as_slice()
    }

    pub fn into_pixels(self) -> Vec<[T; 3]> {
        self.pixels
    }
}

impl<T: Copy + Send + Sync> RgbImage<T> {
    /// Extract one color channel as a plane.
    ///
    /// Panics if `channel` is not 0, 1 or 2.
    pub fn channel(&self, channel: usize) -> Plane<T> {
        assert!(channel < 3);

        Plane {
            width: self.width,
            height: self.height,
            samples: self.pixels.par_iter().map(|px| px[channel]).collect(),
        }
    }
}

/// Full-resolution intensity images for the four polarizer orientations.
///
/// Images are stored in 0, 45, 90, 135 degree order.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientationStack<I> {
    images: [I; 4],
}

impl<I> OrientationStack<I> {
    /// The polarizer angle of each image in storage order, in radians.
    pub const ANGLES: [f64; 4] = [0.0, FRAC_PI_4, 2.0 * FRAC_PI_4, 3.0 * FRAC_PI_4];

    pub(crate) fn new(images: [I; 4]) -> Self {
        Self { images }
    }

    /// The image behind the 0 degree polarizer.
    pub fn i000(&self) -> &I {
        &self.images[0]
    }

    /// The image behind the 45 degree polarizer.
    pub fn i045(&self) -> &I {
        &self.images[1]
    }

    /// The image behind the 90 degree polarizer.
    pub fn i090(&self) -> &I {
        &self.images[2]
    }

    /// The image behind the 135 degree polarizer.
    pub fn i135(&self) -> &I {
        &self.images[3]
    }

    pub fn images(&self) -> &[I; 4] {
        &self.images
    }

    pub fn into_images(self) -> [I; 4] {
        self.images
    }
}

impl<T: Copy + Into<f64> + Send + Sync> OrientationStack<Plane<T>> {
    /// Convert every plane to `f64` for the Stokes fit.
    pub fn to_f64(&self) -> OrientationStack<Plane<f64>> {
        OrientationStack {
            images: [
                self.images[0].to_f64(),
                self.images[1].to_f64(),
                self.images[2].to_f64(),
                self.images[3].to_f64(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_rejects_short_buffer() {
        assert!(matches!(
            Plane::from_samples(4, 4, vec![0u8; 15]),
            Err(Error::BufferSize {
                expected: 16,
                found: 15
            })
        ));
    }

    #[test]
    fn plane_indexing_is_row_major() {
        let plane = Plane::from_samples(2, 2, vec![1u8, 2, 3, 4]).unwrap();

        assert_eq!(plane.get(0, 0), Some(&1));
        assert_eq!(plane.get(1, 0), Some(&2));
        assert_eq!(plane.get(0, 1), Some(&3));
        assert_eq!(plane.get(2, 0), None);
        assert_eq!(plane.get(0, 2), None);
    }

    #[test]
    fn channel_split() {
        let image = RgbImage::from_pixels(2, 1, vec![[1u8, 2, 3], [4, 5, 6]]).unwrap();

        assert_eq!(image.channel(0).as_slice(), &[1, 4]);
        assert_eq!(image.channel(1).as_slice(), &[2, 5]);
        assert_eq!(image.channel(2).as_slice(), &[3, 6]);
    }

    #[test]
    fn stack_angles_follow_storage_order() {
        let angles = OrientationStack::<Plane<u8>>::ANGLES;

        for (angle, expected) in angles.iter().zip([0.0, 45.0, 90.0, 135.0]) {
            assert_relative_eq!(angle.to_degrees(), expected, epsilon = 1e-10);
        }
    }
}
