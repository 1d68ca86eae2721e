//! PNG rendering of the analysis outputs with the plotters bitmap backend.
//!
//! Every function draws one figure to one file and reports failures as [`PlotError`].
//! Text is rasterised with an embedded DejaVu Sans registered as the `sans-serif` family,
//! so no system font lookup happens.
use plotters::prelude::*;
use plotters::style::register_font;
use std::path::Path;
use std::sync::OnceLock;

use super::constants::{MASS_HISTOGRAM_BINS, PLOT_SIZE};
use super::error::PlotError;
use super::linking::Detection;
use super::table::ParticleTable;
use super::trajectory::TrajectoryStore;
use super::velocity::SpeedDistribution;

static SANS_SERIF: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
static FONT_LOADED: OnceLock<bool> = OnceLock::new();

/// Register the embedded font with plotters, once per process
fn load_font() -> Result<(), PlotError> {
    let loaded = *FONT_LOADED
        .get_or_init(|| register_font("sans-serif", FontStyle::Normal, SANS_SERIF).is_ok());
    if loaded {
        Ok(())
    } else {
        Err(PlotError::Drawing(String::from(
            "the embedded sans-serif font could not be loaded",
        )))
    }
}

/// Extend a degenerate axis range so plotters always gets a non-empty interval
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    if hi - lo <= f64::EPSILON {
        return (lo - 0.5, hi + 0.5);
    }
    (lo, hi)
}

/// Density curve of a speed distribution with the mean marked by a vertical line
pub fn render_distribution(
    path: &Path,
    dist: &SpeedDistribution,
    title: &str,
) -> Result<(), PlotError> {
    load_font()?;
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let y_max = dist.density.max_density().max(1e-12) * 1.1;
    let (x_lo, x_hi) = padded(0.0, dist.axis_max);
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc("speed [um/s]")
        .y_desc("density")
        .draw()?;

    chart.draw_series(LineSeries::new(
        dist.density
            .points
            .iter()
            .copied()
            .filter(|(x, _)| *x >= x_lo && *x <= x_hi),
        &BLUE,
    ))?;
    chart.draw_series(std::iter::once(PathElement::new(
        vec![(dist.mean, 0.0), (dist.mean, dist.mean_density)],
        RED.stroke_width(2),
    )))?;

    root.present()?;
    Ok(())
}

/// Every column of an MSD table as a faint black line against lag time
pub fn render_msd_table(path: &Path, table: &ParticleTable) -> Result<(), PlotError> {
    load_font()?;
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = table.index().iter().copied().fold(0.0, f64::max);
    let y_max = table.flatten_values().into_iter().fold(0.0, f64::max);
    let (x_lo, x_hi) = padded(0.0, x_max);
    let (y_lo, y_hi) = padded(0.0, y_max * 1.05);
    let mut chart = ChartBuilder::on(&root)
        .caption("mean square displacement", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_desc(table.index_name())
        .y_desc("MSD [um^2]")
        .draw()?;

    // a single curve is drawn solid, overlays of many curves are translucent
    let alpha = if table.n_columns() > 1 { 0.1 } else { 1.0 };
    for column in table.columns() {
        let points: Vec<(f64, f64)> = table
            .index()
            .iter()
            .zip(column.values.iter())
            .filter_map(|(lag, value)| value.map(|v| (*lag, v)))
            .collect();
        chart.draw_series(LineSeries::new(points, BLACK.mix(alpha)))?;
    }

    root.present()?;
    Ok(())
}

/// Trajectories in image coordinates (y axis pointing up), optionally labelled with
/// their particle id at the first observation
pub fn render_trajectories(
    path: &Path,
    store: &TrajectoryStore,
    frame_width: f64,
    frame_height: f64,
    numbered: bool,
) -> Result<(), PlotError> {
    load_font()?;
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..frame_width, 0.0..frame_height)?;

    chart.configure_mesh().x_desc("x [px]").y_desc("y [px]").draw()?;

    for (idx, trajectory) in store.trajectories().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart.draw_series(LineSeries::new(
            trajectory
                .observations()
                .iter()
                .map(|o| (o.x, frame_height - o.y)),
            color,
        ))?;
        if !numbered {
            continue;
        }
        if let Some(first) = trajectory.first() {
            chart.draw_series(std::iter::once(Text::new(
                trajectory.particle_id().to_string(),
                (first.x, frame_height - first.y),
                ("sans-serif", 12).into_font().color(&BLACK),
            )))?;
        }
    }

    root.present()?;
    Ok(())
}

/// Histogram of the mass of every detection, used to tune the minimum mass
pub fn render_mass_histogram(path: &Path, detections: &[Detection]) -> Result<(), PlotError> {
    let counts = mass_histogram(detections, MASS_HISTOGRAM_BINS);
    load_font()?;
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_lo, x_hi) = match (counts.first(), counts.last()) {
        (Some(first), Some(last)) => padded(first.0, last.1),
        _ => (0.0, 1.0),
    };
    let y_max = counts.iter().map(|(_, _, c)| *c).max().unwrap_or(0).max(1) as f64 * 1.1;
    let mut chart = ChartBuilder::on(&root)
        .caption("detection mass", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, 0.0..y_max)?;

    chart
        .configure_mesh()
        .x_desc("mass")
        .y_desc("count")
        .draw()?;

    chart.draw_series(counts.iter().map(|(lo, hi, count)| {
        Rectangle::new([(*lo, 0.0), (*hi, *count as f64)], BLUE.mix(0.6).filled())
    }))?;

    root.present()?;
    Ok(())
}

/// Equal width bins `(low edge, high edge, count)` spanning the observed masses
pub fn mass_histogram(detections: &[Detection], n_bins: usize) -> Vec<(f64, f64, usize)> {
    if detections.is_empty() || n_bins == 0 {
        return Vec::new();
    }
    let min = detections.iter().map(|d| d.mass).fold(f64::INFINITY, f64::min);
    let max = detections
        .iter()
        .map(|d| d.mass)
        .fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = padded(min, max);
    let width = (hi - lo) / n_bins as f64;
    let mut counts = vec![0usize; n_bins];
    for detection in detections {
        let bin = (((detection.mass - lo) / width) as usize).min(n_bins - 1);
        counts[bin] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| (lo + width * i as f64, lo + width * (i + 1) as f64, count))
        .collect()
}
