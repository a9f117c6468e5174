//! Image transformation steps receiving per sample metadata.
//!
//! Images are `Array3<f64>` in (channel, height, width) order holding gray values in [0, 255].
//! A step may use the metadata of the sample (for example the centroid of the object imaged)
//! and a random generator. Steps are chained by [Compose].

use std::fmt;

use anyhow::anyhow;
use ndarray::{s, Array3};
use rand::RngCore;

pub mod geometric;
pub mod intensity;

pub use geometric::{CenteredCrop, ClearBorders, Pad, RandomHorizontalFlip, RandomRotation, RandomVerticalFlip, Resize};
pub use intensity::{Binarize, Normalize, RandomGamma, ToRgbTensor};

/// (channel, height, width)
pub type Image = Array3<f64>;

/// per sample data available to transformation steps
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleMeta {
    /// (row, column) of the object center
    pub centroid: Option<(f64, f64)>,
}

impl SampleMeta {
    pub fn with_centroid(x: f64, y: f64) -> Self {
        SampleMeta { centroid: Some((x, y)) }
    }
}

pub trait ImageTransform: fmt::Display + Send + Sync {
    fn apply(&self, image: Image, meta: &SampleMeta, rng: &mut dyn RngCore) -> anyhow::Result<Image>;
}

/// applies its steps in order, each step receiving the same metadata
pub struct Compose {
    steps: Vec<Box<dyn ImageTransform>>,
}

impl Compose {
    pub fn new(steps: Vec<Box<dyn ImageTransform>>) -> Self {
        Compose { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ImageTransform for Compose {
    fn apply(&self, image: Image, meta: &SampleMeta, rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        let mut image = image;
        for step in &self.steps {
            log::trace!("Compose applying {}", step);
            image = step.apply(image, meta, rng)?;
        }
        Ok(image)
    }
}

impl fmt::Display for Compose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Compose(")?;
        for step in &self.steps {
            writeln!(f, "    {}", step)?;
        }
        write!(f, ")")
    }
}

/// q-th percentile of all values of image, linear interpolation between order statistics, truncated to integer
pub fn percentile(image: &Image, q: f64) -> f64 {
    let mut values: Vec<f64> = image.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return 0.;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (q / 100.).clamp(0., 1.) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    (values[lower] + frac * (values[upper] - values[lower])).trunc()
}

/// pads image with fill value, vertical amount on top and bottom, horizontal amount on left and right
pub(crate) fn pad(image: &Image, vertical: usize, horizontal: usize, fill: f64) -> Image {
    let (c, h, w) = image.dim();
    let mut padded = Array3::<f64>::from_elem((c, h + 2 * vertical, w + 2 * horizontal), fill);
    padded
        .slice_mut(s![.., vertical..vertical + h, horizontal..horizontal + w])
        .assign(image);
    padded
}

/// crop of size (height, width) with top left corner at (top, left), pixels outside image are 0
pub(crate) fn crop(image: &Image, top: i64, left: i64, height: usize, width: usize) -> Image {
    let (c, h, w) = image.dim();
    let mut cropped = Array3::<f64>::zeros((c, height, width));
    // intersection of window and image, in image coordinates
    let r0 = top.max(0);
    let r1 = (top + height as i64).min(h as i64);
    let c0 = left.max(0);
    let c1 = (left + width as i64).min(w as i64);
    if r0 < r1 && c0 < c1 {
        cropped
            .slice_mut(s![
                ..,
                (r0 - top) as usize..(r1 - top) as usize,
                (c0 - left) as usize..(c1 - left) as usize
            ])
            .assign(&image.slice(s![.., r0 as usize..r1 as usize, c0 as usize..c1 as usize]));
    }
    cropped
}

pub(crate) fn check_image(image: &Image, step: &str) -> anyhow::Result<()> {
    let (c, h, w) = image.dim();
    if c == 0 || h == 0 || w == 0 {
        log::error!("{} : empty image of shape {:?}", step, image.dim());
        return Err(anyhow!("{} : empty image of shape {:?}", step, image.dim()));
    }
    Ok(())
}

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// 1 channel image with value 10 * row + col
    pub(crate) fn ramp(h: usize, w: usize) -> Image {
        Array3::from_shape_fn((1, h, w), |(_, r, c)| (10 * r + c) as f64)
    }

    #[test]
    fn test_percentile() {
        let image = Array3::from_shape_fn((1, 1, 101), |(_, _, c)| c as f64);
        assert_eq!(percentile(&image, 1.), 1.);
        assert_eq!(percentile(&image, 50.), 50.);
        // interpolated value 1.98 is truncated
        let image = Array3::from_shape_fn((1, 1, 100), |(_, _, c)| 2. * c as f64);
        assert_eq!(percentile(&image, 1.), 1.);
        assert_eq!(percentile(&image, 100.), 198.);
    }

    #[test]
    fn test_pad_crop() {
        let image = ramp(3, 4);
        let padded = pad(&image, 1, 2, 7.);
        assert_eq!(padded.dim(), (1, 5, 8));
        assert_eq!(padded[[0, 0, 0]], 7.);
        assert_eq!(padded[[0, 1, 2]], 0.);
        assert_eq!(padded[[0, 3, 5]], 23.);
        let cropped = crop(&padded, 1, 2, 3, 4);
        assert_eq!(cropped, image);
        // window partly outside
        let cropped = crop(&image, -1, 2, 2, 3);
        assert_eq!(cropped.dim(), (1, 2, 3));
        assert_eq!(cropped[[0, 0, 0]], 0.);
        assert_eq!(cropped[[0, 1, 0]], 2.);
        assert_eq!(cropped[[0, 1, 2]], 0.);
    }

    #[test]
    fn test_compose() {
        log_init_test();
        let steps: Vec<Box<dyn ImageTransform>> = vec![
            Box::new(Binarize::new(20.)),
            Box::new(RandomVerticalFlip::new(1.)),
            Box::new(ToRgbTensor::new()),
        ];
        let compose = Compose::new(steps);
        assert_eq!(compose.len(), 3);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let out = compose.apply(ramp(3, 3), &SampleMeta::default(), &mut rng).unwrap();
        assert_eq!(out.dim(), (3, 3, 3));
        // row 2 (values 20..22) binarized then flipped to row 0
        assert_eq!(out[[1, 0, 0]], 0.);
        assert_eq!(out[[2, 0, 1]], 1.);
        assert_eq!(out[[0, 2, 2]], 0.);
        let repr = format!("{}", compose);
        assert!(repr.starts_with("Compose("));
        assert!(repr.contains("Binarize(threshold=20)"));
    }
} // end of mod tests
