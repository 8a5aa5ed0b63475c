//! Polarization demosaicing.

use crate::error::Error;
use crate::plane::{OrientationStack, Plane, RgbImage};
use bayer::{BayerDepth, CFA, Demosaic, RasterDepth, RasterMut};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// The interpolation kernel used to fill in the subsampled mosaic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    /// Copy the nearest measured sample.
    Nearest,
    /// Weighted average of the neighbouring samples.
    Bilinear,
    /// Cubic interpolation over a wider neighbourhood.
    Bicubic,
}

impl Interpolation {
    fn as_demosaic(self) -> Demosaic {
        match self {
            Interpolation::Nearest => Demosaic::NearestNeighbour,
            Interpolation::Bilinear => Demosaic::Linear,
            Interpolation::Bicubic => Demosaic::Cubic,
        }
    }
}

/// A raw frame from a division of focal plane polarization sensor.
///
/// Each physical pixel measures intensity behind one of four linear
/// polarizers arranged in a 2x2 repeating unit:
///
/// ```text
/// +-----+-----+-----+-----+
/// | 090 | 045 | 090 | ... |
/// +-----+-----+-----+-----+
/// | 135 | 000 | 135 | ... |
/// +-----+-----+-----+-----+
/// | 090 | 045 | ...
/// ```
///
/// On a color sensor the pixels sharing an orientation additionally form a
/// half-resolution RGGB color mosaic, so the full pattern repeats every 4x4
/// pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Mosaic<T> {
    width: usize,
    height: usize,
    samples: Vec<T>,
}

impl<T: Sample> Mosaic<T> {
    /// Create a mosaic frame from row-major `samples`.
    ///
    /// Returns an error unless `width` and `height` are even and non-zero
    /// and `samples` holds exactly `width * height` elements.
    pub fn from_samples(width: usize, height: usize, samples: Vec<T>) -> Result<Self, Error> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(Error::OddDimensions { width, height });
        }
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

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[T] {
        self.samples.as_slice()
    }

    /// Reconstruct the four orientation planes of a monochrome sensor.
    ///
    /// The output planes match the mosaic's dimensions and sample type.
    pub fn demosaic(
        &self,
        interpolation: Interpolation,
    ) -> Result<OrientationStack<Plane<T>>, Error> {
        T::demosaic(self, interpolation)
    }

    /// Reconstruct the four orientation images of a color sensor.
    ///
    /// The output images match the mosaic's dimensions and sample type, with
    /// a full RGB triple recovered at every pixel.
    pub fn demosaic_rgb(
        &self,
        interpolation: Interpolation,
    ) -> Result<OrientationStack<RgbImage<T>>, Error> {
        T::demosaic_rgb(self, interpolation)
    }
}

/// A sample depth the demosaicer accepts.
///
/// `u8` and `u16` are the depths the debayer primitive understands and take
/// the direct path. `f32` and `f64` are requantized to the 16 bit range,
/// demosaiced, and scaled back; the quantization costs precision below the
/// input's dynamic range.
pub trait Sample: sealed::Sealed + Copy + Send + Sync + 'static {
    /// Dispatch for [`Mosaic::demosaic`].
    fn demosaic(
        mosaic: &Mosaic<Self>,
        interpolation: Interpolation,
    ) -> Result<OrientationStack<Plane<Self>>, Error>;

    /// Dispatch for [`Mosaic::demosaic_rgb`].
    fn demosaic_rgb(
        mosaic: &Mosaic<Self>,
        interpolation: Interpolation,
    ) -> Result<OrientationStack<RgbImage<Self>>, Error>;
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

macro_rules! impl_int_sample {
    ($t:ty) => {
        impl Sample for $t {
            fn demosaic(
                mosaic: &Mosaic<Self>,
                interpolation: Interpolation,
            ) -> Result<OrientationStack<Plane<Self>>, Error> {
                let planes = demosaic_planes(
                    &mosaic.samples,
                    mosaic.width,
                    mosaic.height,
                    interpolation.as_demosaic(),
                )?;

                Ok(OrientationStack::new(planes.map(|samples| {
                    Plane::from_parts(mosaic.width, mosaic.height, samples)
                })))
            }

            fn demosaic_rgb(
                mosaic: &Mosaic<Self>,
                interpolation: Interpolation,
            ) -> Result<OrientationStack<RgbImage<Self>>, Error> {
                let images = demosaic_rgb_pixels(
                    &mosaic.samples,
                    mosaic.width,
                    mosaic.height,
                    interpolation.as_demosaic(),
                )?;

                Ok(OrientationStack::new(images.map(|pixels| {
                    RgbImage::from_parts(mosaic.width, mosaic.height, pixels)
                })))
            }
        }
    };
}

impl_int_sample!(u8);
impl_int_sample!(u16);

macro_rules! impl_float_sample {
    ($t:ty) => {
        impl Sample for $t {
            fn demosaic(
                mosaic: &Mosaic<Self>,
                interpolation: Interpolation,
            ) -> Result<OrientationStack<Plane<Self>>, Error> {
                let (quantized, scale) = quantize(mosaic);
                let stack = quantized.demosaic(interpolation)?;

                Ok(OrientationStack::new(stack.into_images().map(|plane| {
                    let samples = plane
                        .into_samples()
                        .into_par_iter()
                        .map(|v| (v as f64 / scale) as $t)
                        .collect();
                    Plane::from_parts(mosaic.width, mosaic.height, samples)
                })))
            }

            fn demosaic_rgb(
                mosaic: &Mosaic<Self>,
                interpolation: Interpolation,
            ) -> Result<OrientationStack<RgbImage<Self>>, Error> {
                let (quantized, scale) = quantize(mosaic);
                let stack = quantized.demosaic_rgb(interpolation)?;

                Ok(OrientationStack::new(stack.into_images().map(|image| {
                    let pixels = image
                        .into_pixels()
                        .into_par_iter()
                        .map(|px| px.map(|v| (v as f64 / scale) as $t))
                        .collect();
                    RgbImage::from_parts(mosaic.width, mosaic.height, pixels)
                })))
            }
        }

        impl FloatSample for $t {
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_float_sample!(f32);
impl_float_sample!(f64);

trait FloatSample: Copy {
    fn to_f64(self) -> f64;
}

/// Requantize a floating point mosaic into the 16 bit range.
///
/// Returns the quantized frame and the scale that maps the input onto it.
fn quantize<T: FloatSample + Sample>(mosaic: &Mosaic<T>) -> (Mosaic<u16>, f64) {
    let max = mosaic
        .samples
        .iter()
        .fold(0.0f64, |acc, &v| acc.max(v.to_f64()));

    // An all-zero frame keeps a unit scale instead of dividing by zero.
    let scale = if max > 0.0 { 65535.0 / max } else { 1.0 };

    let samples = mosaic
        .samples
        .par_iter()
        .map(|&v| (v.to_f64() * scale).clamp(0.0, 65535.0) as u16)
        .collect();

    (
        Mosaic {
            width: mosaic.width,
            height: mosaic.height,
            samples,
        },
        scale,
    )
}

/// Plumbing the debayer primitive needs for each integer depth.
trait IntSample: Copy + Default + Send + Sync {
    const BAYER_DEPTH: BayerDepth;
    const RASTER_DEPTH: RasterDepth;
    const SIZE: usize;

    fn write_le(self, out: &mut Vec<u8>);
    fn read_ne(chunk: &[u8]) -> Self;
}

impl IntSample for u8 {
    const BAYER_DEPTH: BayerDepth = BayerDepth::Depth8;
    const RASTER_DEPTH: RasterDepth = RasterDepth::Depth8;
    const SIZE: usize = 1;

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }

    fn read_ne(chunk: &[u8]) -> Self {
        chunk[0]
    }
}

impl IntSample for u16 {
    const BAYER_DEPTH: BayerDepth = BayerDepth::Depth16LE;
    const RASTER_DEPTH: RasterDepth = RasterDepth::Depth16;
    const SIZE: usize = 2;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    // The raster writes native-endian samples through its byte buffer.
    fn read_ne(chunk: &[u8]) -> Self {
        u16::from_ne_bytes([chunk[0], chunk[1]])
    }
}

/// Run the debayer primitive over one plane, returning interleaved RGB.
fn debayer<T: IntSample>(
    samples: &[T],
    width: usize,
    height: usize,
    cfa: CFA,
    demosaic: Demosaic,
) -> Result<Vec<T>, Error> {
    let mut raw = Vec::with_capacity(samples.len() * T::SIZE);
    for &sample in samples {
        sample.write_le(&mut raw);
    }

    let mut rgb = vec![0u8; width * height * 3 * T::SIZE];
    bayer::run_demosaic(
        &mut Cursor::new(raw.as_slice()),
        T::BAYER_DEPTH,
        cfa,
        demosaic,
        &mut RasterMut::new(width, height, T::RASTER_DEPTH, &mut rgb),
    )?;

    Ok(rgb.chunks_exact(T::SIZE).map(T::read_ne).collect())
}

/// Recover the four orientation planes of a monochrome mosaic.
///
/// Two debayer passes with diagonal pattern origins each place a pair of
/// orientations on the red and blue output channels: the RGGB origin puts
/// 90 on red and 0 on blue, the GBRG origin puts 135 on red and 45 on blue.
/// The green channels mix the remaining orientations and are discarded.
fn demosaic_planes<T: IntSample>(
    samples: &[T],
    width: usize,
    height: usize,
    demosaic: Demosaic,
) -> Result<[Vec<T>; 4], Error> {
    let rg = debayer(samples, width, height, CFA::RGGB, demosaic)?;
    let gb = debayer(samples, width, height, CFA::GBRG, demosaic)?;

    fn channel<T: IntSample>(rgb: &[T], index: usize) -> Vec<T> {
        rgb.par_chunks_exact(3).map(|px| px[index]).collect()
    }

    // 0, 45, 90, 135 order.
    Ok([
        channel(&rg, 2),
        channel(&gb, 2),
        channel(&rg, 0),
        channel(&gb, 0),
    ])
}

/// Recover the four orientation RGB images of a color mosaic.
fn demosaic_rgb_pixels<T: IntSample>(
    samples: &[T],
    width: usize,
    height: usize,
    demosaic: Demosaic,
) -> Result<[Vec<[T; 3]>; 4], Error> {
    let (half_width, half_height) = (width / 2, height / 2);

    // Stage one: each 2x2 sub-position holds a complete RGGB mosaic at half
    // resolution. Debayer each and scatter the triples back, which yields
    // full color at the mosaic's own resolution.
    let mut color = vec![[T::default(); 3]; width * height];
    for row_offset in 0..2 {
        for col_offset in 0..2 {
            let sub: Vec<T> = (0..half_height)
                .flat_map(|y| {
                    (0..half_width)
                        .map(move |x| samples[(2 * y + row_offset) * width + 2 * x + col_offset])
                })
                .collect();

            let rgb = debayer(&sub, half_width, half_height, CFA::RGGB, demosaic)?;

            for y in 0..half_height {
                for x in 0..half_width {
                    let src = (y * half_width + x) * 3;
                    color[(2 * y + row_offset) * width + 2 * x + col_offset] =
                        [rgb[src], rgb[src + 1], rgb[src + 2]];
                }
            }
        }
    }

    // Stage two: every pixel now carries color but still only its own
    // polarizer orientation. Run the monochrome path over each channel and
    // regroup the results by orientation.
    let mut images: [Vec<[T; 3]>; 4] =
        std::array::from_fn(|_| vec![[T::default(); 3]; width * height]);
    for channel in 0..3 {
        let plane: Vec<T> = color.par_iter().map(|px| px[channel]).collect();
        let orientations = demosaic_planes(&plane, width, height, demosaic)?;

        for (image, orientation) in images.iter_mut().zip(orientations.iter()) {
            for (dst, &v) in image.iter_mut().zip(orientation.iter()) {
                dst[channel] = v;
            }
        }
    }

    Ok(images)
}
