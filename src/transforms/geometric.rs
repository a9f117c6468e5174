//! Steps moving pixels : flips, resize, crops, padding and rotation.

use std::fmt;

use anyhow::anyhow;
use ndarray::{Array3, Axis};
use rand::{Rng, RngCore};

use super::{check_image, crop, pad, percentile, Image, ImageTransform, SampleMeta};

/// percentile of image values used as default fill
const FILL_PERCENTILE: f64 = 1.;

fn fill_or_percentile(fill: Option<f64>, image: &Image) -> f64 {
    fill.unwrap_or_else(|| percentile(image, FILL_PERCENTILE))
}

/// flips left and right with probability p
#[derive(Copy, Clone, Debug)]
pub struct RandomHorizontalFlip {
    p: f64,
}

impl RandomHorizontalFlip {
    pub fn new(p: f64) -> Self {
        RandomHorizontalFlip { p }
    }
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        RandomHorizontalFlip::new(0.5)
    }
}

impl ImageTransform for RandomHorizontalFlip {
    fn apply(&self, image: Image, _meta: &SampleMeta, rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        if rng.gen::<f64>() < self.p {
            let mut image = image;
            image.invert_axis(Axis(2));
            return Ok(image.as_standard_layout().to_owned());
        }
        Ok(image)
    }
}

impl fmt::Display for RandomHorizontalFlip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RandomHorizontalFlip(p={})", self.p)
    }
}

/// flips top and bottom with probability p
#[derive(Copy, Clone, Debug)]
pub struct RandomVerticalFlip {
    p: f64,
}

impl RandomVerticalFlip {
    pub fn new(p: f64) -> Self {
        RandomVerticalFlip { p }
    }
}

impl Default for RandomVerticalFlip {
    fn default() -> Self {
        RandomVerticalFlip::new(0.5)
    }
}

impl ImageTransform for RandomVerticalFlip {
    fn apply(&self, image: Image, _meta: &SampleMeta, rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        if rng.gen::<f64>() < self.p {
            let mut image = image;
            image.invert_axis(Axis(1));
            return Ok(image.as_standard_layout().to_owned());
        }
        Ok(image)
    }
}

impl fmt::Display for RandomVerticalFlip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RandomVerticalFlip(p={})", self.p)
    }
}

/// bilinear resize to (height, width), pixel centers aligned
#[derive(Copy, Clone, Debug)]
pub struct Resize {
    size: (usize, usize),
}

impl Resize {
    pub fn new(height: usize, width: usize) -> Self {
        Resize { size: (height, width) }
    }
}

/// source coordinate of destination pixel dst, and the 2 neighbours with the weight of the second
fn bilinear_coord(dst: usize, in_size: usize, out_size: usize) -> (usize, usize, f64) {
    let scale = in_size as f64 / out_size as f64;
    let src = ((dst as f64 + 0.5) * scale - 0.5).clamp(0., (in_size - 1) as f64);
    let lo = src.floor() as usize;
    let hi = (lo + 1).min(in_size - 1);
    (lo, hi, src - lo as f64)
}

impl ImageTransform for Resize {
    fn apply(&self, image: Image, _meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "Resize")?;
        let (nb_channels, h, w) = image.dim();
        let (out_h, out_w) = self.size;
        if out_h == 0 || out_w == 0 {
            return Err(anyhow!("Resize to null size {:?}", self.size));
        }
        let rows: Vec<(usize, usize, f64)> = (0..out_h).map(|r| bilinear_coord(r, h, out_h)).collect();
        let cols: Vec<(usize, usize, f64)> = (0..out_w).map(|c| bilinear_coord(c, w, out_w)).collect();
        let resized = Array3::from_shape_fn((nb_channels, out_h, out_w), |(ch, r, c)| {
            let (r0, r1, fr) = rows[r];
            let (c0, c1, fc) = cols[c];
            let top = (1. - fc) * image[[ch, r0, c0]] + fc * image[[ch, r0, c1]];
            let bottom = (1. - fc) * image[[ch, r1, c0]] + fc * image[[ch, r1, c1]];
            (1. - fr) * top + fr * bottom
        });
        Ok(resized)
    }
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Resize(size=({}, {}))", self.size.0, self.size.1)
    }
}

/// center crop of size x size
fn center_crop(image: &Image, size: usize) -> Image {
    let (_, h, w) = image.dim();
    let top = ((h as f64 - size as f64) / 2.).round() as i64;
    let left = ((w as f64 - size as f64) / 2.).round() as i64;
    crop(image, top, left, size, size)
}

/// Keeps the center of the image and replaces the borders by background.
/// The image is center cropped to size then padded by size / 2 with its 1st percentile.
#[derive(Copy, Clone, Debug)]
pub struct ClearBorders {
    size: usize,
}

impl ClearBorders {
    pub fn new(size: usize) -> Self {
        ClearBorders { size }
    }
}

impl ImageTransform for ClearBorders {
    fn apply(&self, image: Image, _meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "ClearBorders")?;
        let cropped = center_crop(&image, self.size);
        let fill = percentile(&cropped, FILL_PERCENTILE);
        Ok(pad(&cropped, self.size / 2, self.size / 2, fill))
    }
}

impl fmt::Display for ClearBorders {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClearBorders(size={})", self.size)
    }
}

/// Crop of size x size centered on the centroid of the sample.
/// The image is first padded by size with its 1st percentile so the crop never leaves the image.
#[derive(Copy, Clone, Debug)]
pub struct CenteredCrop {
    size: usize,
}

impl CenteredCrop {
    pub fn new(size: usize) -> Self {
        CenteredCrop { size }
    }
}

impl ImageTransform for CenteredCrop {
    fn apply(&self, image: Image, meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "CenteredCrop")?;
        let (x, y) = match meta.centroid {
            Some(centroid) => centroid,
            None => {
                log::error!("CenteredCrop : sample has no centroid");
                return Err(anyhow!("CenteredCrop needs a centroid in sample metadata"));
            }
        };
        let fill = percentile(&image, FILL_PERCENTILE);
        let padded = pad(&image, self.size, self.size, fill);
        let half = (self.size / 2) as i64;
        Ok(crop(&padded, x.floor() as i64 + half, y.floor() as i64 + half, self.size, self.size))
    }
}

impl fmt::Display for CenteredCrop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CenteredCrop(size={})", self.size)
    }
}

/// Pads so that an image of width w gets (size - w) / 2 + 1 more pixels on each side.
/// A negative amount crops that many pixels from each side. Fill defaults to the 1st percentile.
#[derive(Copy, Clone, Debug)]
pub struct Pad {
    size: usize,
    fill: Option<f64>,
}

impl Pad {
    pub fn new(size: usize, fill: Option<f64>) -> Self {
        Pad { size, fill }
    }
}

impl ImageTransform for Pad {
    fn apply(&self, image: Image, _meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "Pad")?;
        let width = image.dim().2 as i64;
        let amount = (self.size as i64 - width).div_euclid(2) + 1;
        if amount == 0 {
            return Ok(image);
        }
        if amount < 0 {
            let (_, h, w) = image.dim();
            let cut = (-amount) as usize;
            if 2 * cut >= h || 2 * cut >= w {
                log::error!("Pad : cropping {} on each side of a {}x{} image", cut, h, w);
                return Err(anyhow!("Pad(size={}) would crop a {}x{} image to nothing", self.size, h, w));
            }
            return Ok(crop(&image, cut as i64, cut as i64, h - 2 * cut, w - 2 * cut));
        }
        let fill = fill_or_percentile(self.fill, &image);
        Ok(pad(&image, amount as usize, amount as usize, fill))
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Pad(size={})", self.size)
    }
}

/// cubic convolution kernel, a = -0.5
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1. {
        ((A + 2.) * t - (A + 3.)) * t * t + 1.
    } else if t < 2. {
        ((A * t - 5. * A) * t + 8. * A) * t - 4. * A
    } else {
        0.
    }
}

fn bicubic_sample(image: &Image, ch: usize, row: f64, col: f64) -> f64 {
    let (_, h, w) = image.dim();
    let r0 = row.floor() as i64;
    let c0 = col.floor() as i64;
    let mut value = 0.;
    for dr in -1..=2 {
        let wr = cubic_weight(row - (r0 + dr) as f64);
        if wr == 0. {
            continue;
        }
        let r = (r0 + dr).clamp(0, h as i64 - 1) as usize;
        for dc in -1..=2 {
            let wc = cubic_weight(col - (c0 + dc) as f64);
            if wc == 0. {
                continue;
            }
            let c = (c0 + dc).clamp(0, w as i64 - 1) as usize;
            value += wr * wc * image[[ch, r, c]];
        }
    }
    value
}

/// Rotation by an angle uniform in the degrees range, counter clockwise around the image center.
/// Bicubic interpolation, pixels coming from outside the image get fill (default 1st percentile).
#[derive(Copy, Clone, Debug)]
pub struct RandomRotation {
    degrees: (f64, f64),
    fill: Option<f64>,
}

impl RandomRotation {
    /// angle in [-degrees, degrees]
    pub fn new(degrees: f64, fill: Option<f64>) -> Self {
        let d = degrees.abs();
        RandomRotation { degrees: (-d, d), fill }
    }

    pub fn with_range(min: f64, max: f64, fill: Option<f64>) -> anyhow::Result<Self> {
        if min > max {
            return Err(anyhow!("RandomRotation : empty degree range [{}, {}]", min, max));
        }
        Ok(RandomRotation {
            degrees: (min, max),
            fill,
        })
    }

    /// rotation of image by angle degrees
    pub fn rotate(image: &Image, angle: f64, fill: f64) -> Image {
        let (nb_channels, h, w) = image.dim();
        let (sin, cos) = angle.to_radians().sin_cos();
        let cy = (h as f64 - 1.) / 2.;
        let cx = (w as f64 - 1.) / 2.;
        // tolerance for pixels landing on the border
        let eps = 1.0e-9;
        let mut rotated = Array3::<f64>::from_elem((nb_channels, h, w), fill);
        for r in 0..h {
            for c in 0..w {
                // y axis upwards
                let xo = c as f64 - cx;
                let yo = cy - r as f64;
                let xs = cos * xo + sin * yo;
                let ys = -sin * xo + cos * yo;
                let src_col = cx + xs;
                let src_row = cy - ys;
                if src_row < -eps || src_row > h as f64 - 1. + eps || src_col < -eps || src_col > w as f64 - 1. + eps {
                    continue;
                }
                for ch in 0..nb_channels {
                    rotated[[ch, r, c]] = bicubic_sample(image, ch, src_row, src_col).clamp(0., 255.);
                }
            }
        }
        rotated
    } // end of rotate
}

impl ImageTransform for RandomRotation {
    fn apply(&self, image: Image, _meta: &SampleMeta, rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "RandomRotation")?;
        let angle = rng.gen_range(self.degrees.0..=self.degrees.1);
        let fill = fill_or_percentile(self.fill, &image);
        log::trace!("RandomRotation angle {:.3}, fill {}", angle, fill);
        Ok(Self::rotate(&image, angle, fill))
    }
}

impl fmt::Display for RandomRotation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.fill {
            Some(fill) => write!(f, "RandomRotation(degrees=({}, {}), fill={})", self.degrees.0, self.degrees.1, fill),
            None => write!(f, "RandomRotation(degrees=({}, {}), fill=None)", self.degrees.0, self.degrees.1),
        }
    }
}

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use super::super::tests::ramp;
    use rand_xoshiro::rand_core::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn no_meta() -> SampleMeta {
        SampleMeta::default()
    }

    #[test]
    fn test_flips() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let image = ramp(2, 3);
        let flipped = RandomHorizontalFlip::new(1.).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        assert_eq!(flipped[[0, 0, 0]], 2.);
        assert_eq!(flipped[[0, 1, 2]], 10.);
        let same = RandomHorizontalFlip::new(0.).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        assert_eq!(same, image);
        let flipped = RandomVerticalFlip::new(1.).apply(image, &no_meta(), &mut rng).unwrap();
        assert_eq!(flipped[[0, 0, 1]], 11.);
    }

    #[test]
    fn test_resize() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let image = ramp(4, 4);
        let same = Resize::new(4, 4).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        assert_eq!(same, image);
        let half = Resize::new(2, 2).apply(image, &no_meta(), &mut rng).unwrap();
        // each output pixel is the mean of a 2x2 block
        assert!((half[[0, 0, 0]] - 5.5).abs() < 1.0e-12);
        assert!((half[[0, 1, 1]] - 27.5).abs() < 1.0e-12);
        assert_eq!(format!("{}", Resize::new(2, 3)), "Resize(size=(2, 3))");
    }

    #[test]
    fn test_clear_borders() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let image = ramp(6, 6);
        let cleared = ClearBorders::new(4).apply(image, &no_meta(), &mut rng).unwrap();
        assert_eq!(cleared.dim(), (1, 8, 8));
        // center kept
        assert_eq!(cleared[[0, 2, 2]], 11.);
        // borders get the 1st percentile of the crop, 11.15 truncated
        assert_eq!(cleared[[0, 0, 0]], 11.);
    }

    #[test]
    fn test_centered_crop() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let image = ramp(10, 10);
        let step = CenteredCrop::new(4);
        assert_eq!(format!("{}", step), "CenteredCrop(size=4)");
        let meta = SampleMeta::with_centroid(5.3, 6.8);
        let cropped = step.apply(image.clone(), &meta, &mut rng).unwrap();
        assert_eq!(cropped.dim(), (1, 4, 4));
        // rows 3..7, columns 4..8 of the original
        assert_eq!(cropped[[0, 0, 0]], 34.);
        assert_eq!(cropped[[0, 3, 3]], 67.);
        // near the border the padding fill appears
        let meta = SampleMeta::with_centroid(0., 0.);
        let cropped = step.apply(image.clone(), &meta, &mut rng).unwrap();
        assert_eq!(cropped[[0, 0, 0]], 0.);
        assert_eq!(cropped[[0, 2, 2]], 0.);
        assert_eq!(cropped[[0, 3, 3]], 11.);
        assert!(step.apply(image, &no_meta(), &mut rng).is_err());
    }

    #[test]
    fn test_pad() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let image = ramp(4, 4);
        let padded = Pad::new(8, Some(255.)).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        // (8 - 4) / 2 + 1 = 3 on each side
        assert_eq!(padded.dim(), (1, 10, 10));
        assert_eq!(padded[[0, 0, 0]], 255.);
        assert_eq!(padded[[0, 3, 3]], 0.);
        // (3 - 8) / 2 + 1 = -2 : crops 2 on each side
        let large = ramp(8, 8);
        let cropped = Pad::new(3, None).apply(large.clone(), &no_meta(), &mut rng).unwrap();
        assert_eq!(cropped.dim(), (1, 4, 4));
        assert_eq!(cropped[[0, 0, 0]], large[[0, 2, 2]]);
        assert_eq!(cropped[[0, 3, 3]], large[[0, 5, 5]]);
        // (1 - 4) / 2 + 1 = -1 : crops to 2x2
        let small = Pad::new(1, None).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        assert_eq!(small.dim(), (1, 2, 2));
        assert_eq!(small[[0, 0, 0]], image[[0, 1, 1]]);
        // (3 - 8) / 2 + 1 = -2 on a 2x8 image : nothing left of the rows
        assert!(Pad::new(3, None).apply(ramp(2, 8), &no_meta(), &mut rng).is_err());
        // (3 - 4) / 2 + 1 = 0 : unchanged
        let same = Pad::new(3, None).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        assert_eq!(same, image);
    }

    #[test]
    fn test_rotation() {
        log_init_test();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let image = ramp(5, 5);
        let quarter = RandomRotation::with_range(90., 90., Some(0.)).unwrap();
        let rotated = quarter.apply(image.clone(), &no_meta(), &mut rng).unwrap();
        // top right corner goes to top left
        assert!((rotated[[0, 0, 0]] - 4.).abs() < 1.0e-9);
        assert!((rotated[[0, 4, 0]] - 0.).abs() < 1.0e-9);
        assert!((rotated[[0, 2, 2]] - 22.).abs() < 1.0e-9);
        let identity = RandomRotation::new(0., None).apply(image.clone(), &no_meta(), &mut rng).unwrap();
        for (a, b) in identity.iter().zip(image.iter()) {
            assert!((a - b).abs() < 1.0e-9);
        }
        // 45 degrees : corners come from outside and get the fill
        let rotated = RandomRotation::rotate(&image, 45., 99.);
        assert_eq!(rotated[[0, 0, 0]], 99.);
        assert!(RandomRotation::with_range(10., -10., None).is_err());
        assert_eq!(format!("{}", RandomRotation::new(10., None)), "RandomRotation(degrees=(-10, 10), fill=None)");
    }
} // end of mod tests
