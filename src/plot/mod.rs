//! Svg plots : loss curves, grids of agreement heatmaps and scatter plots of 2d projections.
//!
//! Drawing is done in functions returning a boxed error as plotters does,
//! public functions convert it to an anyhow error carrying the file name.

use std::path::Path;

use anyhow::anyhow;
use ndarray::Array2;
use plotters::prelude::*;

use crate::embed::history::{LossHistory, Mode};

pub mod scatter;

pub use scatter::{plot_mds_embs, plot_pca_embs, plot_tsne_embs, ScatterOptions};

type DrawResult<T> = Result<T, Box<dyn std::error::Error>>;

// anchors of the matplotlib seismic colormap
const SEISMIC: [(f64, (f64, f64, f64)); 5] = [
    (0., (0., 0., 0.3)),
    (0.25, (0., 0., 1.)),
    (0.5, (1., 1., 1.)),
    (0.75, (1., 0., 0.)),
    (1., (0.5, 0., 0.)),
];

/// color of value in the seismic colormap between vmin (dark blue) and vmax (dark red).
/// Values outside the range are clamped.
pub fn seismic(value: f64, vmin: f64, vmax: f64) -> RGBColor {
    let t = if vmax > vmin && value.is_finite() {
        ((value - vmin) / (vmax - vmin)).clamp(0., 1.)
    } else {
        0.5
    };
    let mut k = 0;
    while k + 2 < SEISMIC.len() && t > SEISMIC[k + 1].0 {
        k += 1;
    }
    let (t0, c0) = SEISMIC[k];
    let (t1, c1) = SEISMIC[k + 1];
    let u = (t - t0) / (t1 - t0);
    let mix = |a: f64, b: f64| ((a + u * (b - a)) * 255.).round() as u8;
    RGBColor(mix(c0.0, c1.0), mix(c0.1, c1.1), mix(c0.2, c1.2))
}

/// max of amis excluding the 1-cluster row and column
pub fn max_ami(ami: &Array2<f64>) -> f64 {
    ami.indexed_iter()
        .filter(|((i, j), _)| *i >= 1 && *j >= 1)
        .map(|(_, v)| *v)
        .fold(f64::NEG_INFINITY, f64::max)
}

fn draw_loss_history(history: &LossHistory, path: &Path, title: &str) -> DrawResult<()> {
    let root = SVGBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let curves: Vec<(Mode, Vec<(f64, f64)>)> = [Mode::Train, Mode::Val]
        .iter()
        .map(|mode| {
            let points = history
                .get_mode(*mode)
                .iter()
                .filter(|r| r.total_loss.is_finite())
                .map(|r| (r.epoch as f64, r.total_loss))
                .collect();
            (*mode, points)
        })
        .collect();
    let all = curves.iter().flat_map(|c| c.1.iter());
    let (mut xmin, mut xmax, mut ymin, mut ymax) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for (x, y) in all {
        xmin = xmin.min(*x);
        xmax = xmax.max(*x);
        ymin = ymin.min(*y);
        ymax = ymax.max(*y);
    }
    if !xmin.is_finite() {
        (xmin, xmax, ymin, ymax) = (0., 1., 0., 1.);
    }
    if xmax <= xmin {
        xmax = xmin + 1.;
    }
    let margin = if ymax > ymin { 0.05 * (ymax - ymin) } else { 0.5 };
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(xmin..xmax, (ymin - margin)..(ymax + margin))?;
    chart.configure_mesh().x_desc("epoch").y_desc("total loss").draw()?;
    for (mode, points) in curves {
        if points.is_empty() {
            continue;
        }
        let color = match mode {
            Mode::Train => BLUE,
            Mode::Val => RED,
        };
        chart
            .draw_series(LineSeries::new(points, color))?
            .label(mode.to_string())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
} // end of draw_loss_history

/// plots total loss of each mode against epoch in a svg file
pub fn plot_loss_history(history: &LossHistory, path: &Path, title: &str) -> anyhow::Result<()> {
    log::debug!("plot_loss_history writing {:?}", path);
    draw_loss_history(history, path, title).map_err(|e| {
        log::error!("plot_loss_history failed for {:?} : {}", path, e);
        anyhow!("plotting loss history in {:?} failed : {}", path, e)
    })
}

fn draw_ami_matrices(names: &[String], amis: &[Array2<f64>], path: &Path) -> DrawResult<()> {
    let nb_models = names.len();
    let panel_size = 300u32;
    let side = panel_size * nb_models as u32;
    let root = SVGBackend::new(path, (side, side)).into_drawing_area();
    root.fill(&WHITE)?;
    let panels = root.split_evenly((nb_models, nb_models));
    for (idx, panel) in panels.iter().enumerate() {
        let (i, j) = (idx / nb_models, idx % nb_models);
        let ami = &amis[idx];
        let (k1, k2) = ami.dim();
        let title = if i == j {
            format!("Model: {}", names[i])
        } else {
            format!("max AMI: {:.2}", max_ami(ami))
        };
        let mut chart = ChartBuilder::on(panel)
            .caption(title, ("sans-serif", 14))
            .margin(5)
            .x_label_area_size(20)
            .y_label_area_size(25)
            .build_cartesian_2d(0i32..k2 as i32, k1 as i32..0i32)?;
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_labels(k2)
            .y_labels(k1)
            .x_label_formatter(&|v| format!("{}", v + 1))
            .y_label_formatter(&|v| format!("{}", v + 1))
            .label_style(("sans-serif", 9))
            .draw()?;
        chart.draw_series(ami.indexed_iter().map(|((r, c), v)| {
            let (x, y) = (c as i32, r as i32);
            Rectangle::new([(x, y), (x + 1, y + 1)], seismic(*v, 0., 1.).filled())
        }))?;
    }
    root.present()?;
    Ok(())
} // end of draw_ami_matrices

/// Draws the S x S grid of agreement matrices of a co-clustering screen.
/// amis holds matrix of pair (i,j) at index i * S + j.
pub fn plot_ami_matrices(names: &[String], amis: &[Array2<f64>], path: &Path) -> anyhow::Result<()> {
    if names.is_empty() || amis.len() != names.len() * names.len() {
        return Err(anyhow!(
            "plot_ami_matrices : {} names need {} matrices, got {}",
            names.len(),
            names.len() * names.len(),
            amis.len()
        ));
    }
    log::debug!("plot_ami_matrices writing {:?}", path);
    draw_ami_matrices(names, amis, path).map_err(|e| {
        log::error!("plot_ami_matrices failed for {:?} : {}", path, e);
        anyhow!("plotting ami matrices in {:?} failed : {}", path, e)
    })
}

//========================================================================================

#[cfg(test)]
mod tests {

    use super::*;

    use crate::embed::history::LossRecord;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_seismic() {
        assert_eq!(seismic(0.5, 0., 1.), RGBColor(255, 255, 255));
        assert_eq!(seismic(0., 0., 1.), RGBColor(0, 0, 77));
        assert_eq!(seismic(1., 0., 1.), RGBColor(128, 0, 0));
        assert_eq!(seismic(0.75, 0., 1.), RGBColor(255, 0, 0));
        // clamped
        assert_eq!(seismic(3., 0., 1.), seismic(1., 0., 1.));
    }

    #[test]
    fn test_max_ami_skips_one_cluster() {
        let mut ami = Array2::<f64>::from_elem((3, 3), 0.2);
        ami[[0, 0]] = 1.;
        ami[[0, 2]] = 0.9;
        ami[[2, 1]] = 0.4;
        assert_eq!(max_ami(&ami), 0.4);
    }

    #[test]
    fn test_plots_written() {
        log_init_test();
        let dir = tempfile::tempdir().unwrap();
        let mut history = LossHistory::new();
        for epoch in -1..10 {
            for mode in [Mode::Train, Mode::Val] {
                let loss = 1. / (epoch as f64 + 2.);
                history.push(LossRecord {
                    epoch,
                    mode,
                    total_loss: loss,
                    gae_recon_loss: loss,
                    feat_recon_loss: 0.,
                    class_loss: 0.,
                });
            }
        }
        let loss_path = dir.path().join("loss.svg");
        plot_loss_history(&history, &loss_path, "loss").unwrap();
        assert!(loss_path.exists());
        //
        let names = vec![String::from("a"), String::from("b")];
        let amis: Vec<Array2<f64>> = (0..4).map(|k| Array2::from_elem((4, 4), k as f64 / 4.)).collect();
        let ami_path = dir.path().join("amis.svg");
        plot_ami_matrices(&names, &amis, &ami_path).unwrap();
        let content = std::fs::read_to_string(&ami_path).unwrap();
        assert!(content.contains("Model: a"));
        assert!(content.contains("max AMI: 0.25"));
        assert!(plot_ami_matrices(&names, &amis[0..3], &ami_path).is_err());
    } // end of test_plots_written
} // end of mod tests
