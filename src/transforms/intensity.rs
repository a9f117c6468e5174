//! Steps changing pixel values : normalization, binarization, gamma and conversion to 3 channels.

use std::fmt;

use anyhow::anyhow;
use ndarray::{concatenate, Axis};
use rand::{Rng, RngCore};

use super::{check_image, Image, ImageTransform, SampleMeta};

/// (v - mean) / std channel by channel. A single mean (or std) applies to all channels.
#[derive(Clone, Debug)]
pub struct Normalize {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Normalize {
    pub fn new(mean: Vec<f64>, std: Vec<f64>) -> anyhow::Result<Self> {
        if mean.is_empty() || std.is_empty() {
            return Err(anyhow!("Normalize : mean and std must not be empty"));
        }
        if std.iter().any(|s| *s == 0.) {
            return Err(anyhow!("Normalize : std must not be 0"));
        }
        Ok(Normalize { mean, std })
    }

    fn get(values: &[f64], channel: usize) -> f64 {
        if values.len() == 1 {
            values[0]
        } else {
            values[channel]
        }
    }
}

impl ImageTransform for Normalize {
    fn apply(&self, image: Image, _meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "Normalize")?;
        let nb_channels = image.dim().0;
        for values in [&self.mean, &self.std] {
            if values.len() != 1 && values.len() != nb_channels {
                log::error!("Normalize : {} values for {} channels", values.len(), nb_channels);
                return Err(anyhow!("Normalize : {} values for {} channels", values.len(), nb_channels));
            }
        }
        let mut image = image;
        for (c, mut channel) in image.axis_iter_mut(Axis(0)).enumerate() {
            let (m, s) = (Self::get(&self.mean, c), Self::get(&self.std, c));
            channel.mapv_inplace(|v| (v - m) / s);
        }
        Ok(image)
    }
}

impl fmt::Display for Normalize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Normalize(mean={:?}, std={:?})", self.mean, self.std)
    }
}

/// pixels above threshold become 255, the others 0
#[derive(Copy, Clone, Debug, Default)]
pub struct Binarize {
    threshold: f64,
}

impl Binarize {
    pub fn new(threshold: f64) -> Self {
        Binarize { threshold }
    }
}

impl ImageTransform for Binarize {
    fn apply(&self, image: Image, _meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        let t = self.threshold;
        Ok(image.mapv(|v| if v > t { 255. } else { 0. }))
    }
}

impl fmt::Display for Binarize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Binarize(threshold={})", self.threshold)
    }
}

/// 255 * (v / 255)^gamma with gamma uniform in limit
#[derive(Copy, Clone, Debug)]
pub struct RandomGamma {
    limit: (f64, f64),
}

impl RandomGamma {
    pub fn new(low: f64, high: f64) -> anyhow::Result<Self> {
        if !(low > 0. && low <= high) {
            return Err(anyhow!("RandomGamma : invalid limit [{}, {}]", low, high));
        }
        Ok(RandomGamma { limit: (low, high) })
    }

    pub fn adjust_gamma(image: Image, gamma: f64) -> Image {
        image.mapv(|v| 255. * (v.max(0.) / 255.).powf(gamma))
    }
}

impl Default for RandomGamma {
    fn default() -> Self {
        RandomGamma { limit: (0.5, 1.5) }
    }
}

impl ImageTransform for RandomGamma {
    fn apply(&self, image: Image, _meta: &SampleMeta, rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        let gamma = rng.gen_range(self.limit.0..=self.limit.1);
        log::trace!("RandomGamma gamma {:.3}", gamma);
        Ok(Self::adjust_gamma(image, gamma))
    }
}

impl fmt::Display for RandomGamma {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RandomGamma(gamma=[{}, {}])", self.limit.0, self.limit.1)
    }
}

/// scales a gray image to [0, 1] and repeats it on 3 channels
#[derive(Copy, Clone, Debug, Default)]
pub struct ToRgbTensor {}

impl ToRgbTensor {
    pub fn new() -> Self {
        ToRgbTensor {}
    }
}

impl ImageTransform for ToRgbTensor {
    fn apply(&self, image: Image, _meta: &SampleMeta, _rng: &mut dyn RngCore) -> anyhow::Result<Image> {
        check_image(&image, "ToRgbTensor")?;
        if image.dim().0 != 1 {
            return Err(anyhow!("ToRgbTensor expects 1 channel, got {}", image.dim().0));
        }
        let scaled = image.mapv(|v| v / 255.);
        let rgb = concatenate(Axis(0), &[scaled.view(), scaled.view(), scaled.view()])?;
        Ok(rgb)
    }
}

impl fmt::Display for ToRgbTensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ToRgbTensor()")
    }
}

//========================================================================================

// end of mod tests
