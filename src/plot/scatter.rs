//! Scatter plots of 2d projections of latent vectors.

use std::path::Path;

use anyhow::anyhow;
use indexmap::IndexSet;
use ndarray::{Array2, ArrayView2};
use plotters::prelude::*;

use super::DrawResult;
use crate::projection::mds::{Mds, MdsParams};
use crate::projection::pca::pca_2d;
use crate::projection::tsne::{Tsne, TsneParams};

/// x offset of point labels
const LABEL_OFFSET: f64 = 0.02;

/// optional decorations of a scatter plot
#[derive(Clone, Debug, Default)]
pub struct ScatterOptions {
    pub title: String,
    /// one category by point, colors points
    pub hue: Option<Vec<String>>,
    /// order of categories in palette and legend, defaults to order of first appearance
    pub hue_order: Option<Vec<String>>,
    /// (point rank, text) of points to annotate
    pub label_points: Option<Vec<(usize, String)>>,
}

impl ScatterOptions {
    pub fn new(title: &str) -> Self {
        ScatterOptions {
            title: String::from(title),
            ..Default::default()
        }
    }

    pub fn with_hue(mut self, hue: Vec<String>, hue_order: Option<Vec<String>>) -> Self {
        self.hue = Some(hue);
        self.hue_order = hue_order;
        self
    }

    pub fn with_label_points(mut self, labels: Vec<(usize, String)>) -> Self {
        self.label_points = Some(labels);
        self
    }

    fn check(&self, nb_points: usize) -> anyhow::Result<()> {
        if let Some(hue) = &self.hue {
            if hue.len() != nb_points {
                return Err(anyhow!("hue has {} values for {} points", hue.len(), nb_points));
            }
            if let Some(order) = &self.hue_order {
                if let Some(missing) = hue.iter().find(|h| !order.contains(h)) {
                    return Err(anyhow!("hue value {} is not in hue order", missing));
                }
            }
        }
        if let Some(labels) = &self.label_points {
            if let Some((rank, _)) = labels.iter().find(|(rank, _)| *rank >= nb_points) {
                return Err(anyhow!("label point {} out of range, {} points", rank, nb_points));
            }
        }
        Ok(())
    }

    /// categories in palette order
    fn categories(&self) -> Vec<String> {
        match (&self.hue, &self.hue_order) {
            (Some(_), Some(order)) => order.clone(),
            (Some(hue), None) => hue.iter().cloned().collect::<IndexSet<String>>().into_iter().collect(),
            (None, _) => Vec::new(),
        }
    }
} // end of impl ScatterOptions

fn bounds(coords: &Array2<f64>) -> (std::ops::Range<f64>, std::ops::Range<f64>) {
    let mut range = [(f64::INFINITY, f64::NEG_INFINITY); 2];
    for row in coords.rows() {
        for k in 0..2 {
            range[k].0 = range[k].0.min(row[k]);
            range[k].1 = range[k].1.max(row[k]);
        }
    }
    let widen = |(lo, hi): (f64, f64)| {
        if !lo.is_finite() {
            return -1.0..1.0;
        }
        let margin = if hi > lo { 0.05 * (hi - lo) } else { 1. };
        (lo - margin)..(hi + margin + LABEL_OFFSET)
    };
    (widen(range[0]), widen(range[1]))
}

fn draw_scatter(coords: &Array2<f64>, options: &ScatterOptions, path: &Path) -> DrawResult<()> {
    let root = SVGBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let (xrange, yrange) = bounds(coords);
    let mut chart = ChartBuilder::on(&root)
        .caption(&options.title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(xrange, yrange)?;
    chart.configure_mesh().draw()?;
    //
    let categories = options.categories();
    match &options.hue {
        None => {
            chart.draw_series(coords.rows().into_iter().map(|r| Circle::new((r[0], r[1]), 3, BLUE.filled())))?;
        }
        Some(hue) => {
            for (c, category) in categories.iter().enumerate() {
                let color = Palette99::pick(c).to_rgba();
                let points: Vec<(f64, f64)> = coords
                    .rows()
                    .into_iter()
                    .zip(hue.iter())
                    .filter(|(_, h)| *h == category)
                    .map(|(r, _)| (r[0], r[1]))
                    .collect();
                chart
                    .draw_series(points.into_iter().map(|p| Circle::new(p, 3, color.filled())))?
                    .label(category.as_str())
                    .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
            }
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperRight)
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()?;
        }
    }
    if let Some(labels) = &options.label_points {
        chart.draw_series(labels.iter().map(|(rank, text)| {
            Text::new(
                text.clone(),
                (coords[[*rank, 0]] + LABEL_OFFSET, coords[[*rank, 1]]),
                ("sans-serif", 12).into_font(),
            )
        }))?;
    }
    root.present()?;
    Ok(())
} // end of draw_scatter

/// writes scatter plot of coords (one row by point, 2 columns) in a svg file
pub fn plot_scatter(coords: &Array2<f64>, options: &ScatterOptions, path: &Path) -> anyhow::Result<()> {
    if coords.ncols() != 2 {
        return Err(anyhow!("scatter plot needs 2 columns, got {}", coords.ncols()));
    }
    options.check(coords.nrows())?;
    log::debug!("plot_scatter writing {:?}", path);
    draw_scatter(coords, options, path).map_err(|e| {
        log::error!("plot_scatter failed for {:?} : {}", path, e);
        anyhow!("scatter plot in {:?} failed : {}", path, e)
    })
}

/// t-SNE projection of latents, plotted. Returns the 2d coordinates.
pub fn plot_tsne_embs(
    latents: &ArrayView2<f64>,
    params: &TsneParams,
    options: &ScatterOptions,
    path: &Path,
) -> anyhow::Result<Array2<f64>> {
    options.check(latents.nrows())?;
    let coords = Tsne::new(params.clone()).fit(latents)?;
    plot_scatter(&coords, options, path)?;
    Ok(coords)
}

/// metric MDS projection of latents (or of a precomputed dissimilarity), plotted. Returns the 2d coordinates.
pub fn plot_mds_embs(
    latents: &ArrayView2<f64>,
    params: &MdsParams,
    options: &ScatterOptions,
    path: &Path,
) -> anyhow::Result<Array2<f64>> {
    if params.nb_components != 2 {
        return Err(anyhow!("plot_mds_embs needs 2 components"));
    }
    options.check(latents.nrows())?;
    let (coords, stress) = Mds::new(params.clone()).fit(latents)?;
    log::info!("plot_mds_embs stress : {:.4e}", stress);
    plot_scatter(&coords, options, path)?;
    Ok(coords)
}

/// projection on the 2 first principal axes, plotted. Returns the 2d coordinates.
pub fn plot_pca_embs(latents: &ArrayView2<f64>, options: &ScatterOptions, path: &Path) -> anyhow::Result<Array2<f64>> {
    options.check(latents.nrows())?;
    let coords = pca_2d(latents)?;
    plot_scatter(&coords, options, path)?;
    Ok(coords)
}

//========================================================================================

// end of mod tests
