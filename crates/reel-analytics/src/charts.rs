//! SVG chart rendering with plotters.

use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use plotters::prelude::*;
use reel_core::{MovieTable, NormalizedMovieRow};
use tracing::info;

use crate::{explode_genre_roi, franchise_vs_standalone, yearly_average_revenue};

const CHART_SIZE: (u32, u32) = (960, 600);
const CAPTION_FONT: (&str, u32) = ("sans-serif", 24);
const FRANCHISE_LABELS: [&str; 2] = ["Franchise", "Standalone"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    RevenueVsBudget,
    RoiByGenre,
    PopularityVsRating,
    YearlyAverageRevenue,
    FranchiseVsStandalone,
}

impl ChartKind {
    pub const ALL: [ChartKind; 5] = [
        ChartKind::RevenueVsBudget,
        ChartKind::RoiByGenre,
        ChartKind::PopularityVsRating,
        ChartKind::YearlyAverageRevenue,
        ChartKind::FranchiseVsStandalone,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ChartKind::RevenueVsBudget => "revenue_vs_budget.svg",
            ChartKind::RoiByGenre => "roi_by_genre.svg",
            ChartKind::PopularityVsRating => "popularity_vs_rating.svg",
            ChartKind::YearlyAverageRevenue => "yearly_avg_revenue.svg",
            ChartKind::FranchiseVsStandalone => "franchise_vs_standalone.svg",
        }
    }

    fn render(self, table: &MovieTable, path: &Path) -> Result<()> {
        match self {
            ChartKind::RevenueVsBudget => {
                let points = pairs(table, |r| r.budget_musd, |r| r.revenue_musd);
                scatter(
                    path,
                    "Revenue vs Budget",
                    "Budget (Million USD)",
                    "Revenue (Million USD)",
                    &points,
                )
            }
            ChartKind::PopularityVsRating => {
                let points = pairs(table, |r| r.popularity, |r| r.vote_average);
                scatter(
                    path,
                    "Popularity vs Rating",
                    "Popularity",
                    "Rating (vote_average)",
                    &points,
                )
            }
            ChartKind::RoiByGenre => roi_boxplot(table, path),
            ChartKind::YearlyAverageRevenue => yearly_line(table, path),
            ChartKind::FranchiseVsStandalone => franchise_bars(table, path),
        }
    }
}

/// Renders every chart into `dir`, creating it when needed. Empty tables produce
/// empty charts rather than errors.
pub fn render_all_charts(table: &MovieTable, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut written = Vec::with_capacity(ChartKind::ALL.len());
    for kind in ChartKind::ALL {
        let path = dir.join(kind.file_name());
        kind.render(table, &path)
            .with_context(|| format!("rendering {}", path.display()))?;
        info!(chart = %path.display(), "saved chart");
        written.push(path);
    }
    Ok(written)
}

fn pairs(
    table: &MovieTable,
    x: impl Fn(&NormalizedMovieRow) -> Option<f64>,
    y: impl Fn(&NormalizedMovieRow) -> Option<f64>,
) -> Vec<(f64, f64)> {
    table
        .rows
        .iter()
        .filter_map(|r| Some((x(r)?, y(r)?)))
        .collect()
}

fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if lo > hi {
        return 0.0..1.0;
    }
    let pad = if lo == hi {
        (lo.abs() * 0.05).max(1.0)
    } else {
        (hi - lo) * 0.05
    };
    let start = Some(lo - pad).filter(|v| v.is_finite()).unwrap_or(lo);
    let end = Some(hi + pad).filter(|v| v.is_finite()).unwrap_or(hi);
    start..end
}

fn scatter(path: &Path, caption: &str, x_desc: &str, y_desc: &str, points: &[(f64, f64)]) -> Result<()> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, CAPTION_FONT)
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(65)
        .build_cartesian_2d(
            padded_range(points.iter().map(|p| p.0)),
            padded_range(points.iter().map(|p| p.1)),
        )?;
    chart.configure_mesh().x_desc(x_desc).y_desc(y_desc).draw()?;
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y)| Circle::new((x, y), 4, BLUE.mix(0.6).filled())),
    )?;
    root.present()?;
    Ok(())
}

fn segment_label(value: &SegmentValue<u32>, labels: &[&str]) -> String {
    match value {
        SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => labels
            .get(*i as usize)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        SegmentValue::Last => String::new(),
    }
}

// ROI values that overflow f32 are left out; genres left empty are dropped.
fn boxplot_series(table: &MovieTable) -> Vec<(String, Vec<f32>)> {
    explode_genre_roi(table)
        .into_iter()
        .map(|g| {
            let rois: Vec<f32> = g.rois.iter().map(|r| *r as f32).filter(|r| r.is_finite()).collect();
            (g.genre, rois)
        })
        .filter(|(_, rois)| !rois.is_empty())
        .collect()
}

fn roi_boxplot(table: &MovieTable, path: &Path) -> Result<()> {
    let genres = boxplot_series(table);
    let labels: Vec<&str> = genres.iter().map(|(genre, _)| genre.as_str()).collect();
    let y = padded_range(genres.iter().flat_map(|(_, rois)| rois.iter().map(|r| f64::from(*r))));
    let y = (y.start.max(f64::from(f32::MIN)) as f32)..(y.end.min(f64::from(f32::MAX)) as f32);
    // Integer ranges are inclusive in plotters, so n categories span 0..=n-1.
    let last_slot = (labels.len().max(1) - 1) as u32;

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("ROI Distribution by Genre", CAPTION_FONT)
        .margin(15)
        .x_label_area_size(90)
        .y_label_area_size(65)
        .build_cartesian_2d((0u32..last_slot).into_segmented(), y)?;
    chart
        .configure_mesh()
        .x_labels(labels.len().max(1))
        .x_label_formatter(&|v| segment_label(v, &labels))
        .y_desc("ROI")
        .draw()?;
    chart.draw_series(genres.iter().enumerate().map(|(i, (_, rois))| {
        Boxplot::new_vertical(SegmentValue::CenterOf(i as u32), &Quartiles::new(&rois[..]))
    }))?;
    root.present()?;
    Ok(())
}

fn yearly_line(table: &MovieTable, path: &Path) -> Result<()> {
    let points: Vec<(i32, f64)> = yearly_average_revenue(table)
        .into_iter()
        .filter_map(|y| Some((y.year, y.mean_revenue_musd?)))
        .collect();
    let first = points.first().map(|p| p.0).unwrap_or(2000);
    let last = points.last().map(|p| p.0).unwrap_or(first);

    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Yearly Box Office Performance", CAPTION_FONT)
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(65)
        .build_cartesian_2d((first - 1)..(last + 1), padded_range(points.iter().map(|p| p.1)))?;
    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc("Average Revenue (M USD)")
        .draw()?;
    chart.draw_series(LineSeries::new(points.iter().copied(), &RED))?;
    chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, RED.filled())))?;
    root.present()?;
    Ok(())
}

fn franchise_bars(table: &MovieTable, path: &Path) -> Result<()> {
    let split = franchise_vs_standalone(table);
    let means = [
        split.franchise.mean_revenue_musd.unwrap_or(0.0),
        split.standalone.mean_revenue_musd.unwrap_or(0.0),
    ];
    let top = means.iter().copied().fold(0.0_f64, f64::max);
    let top = if top > 0.0 { top * 1.1 } else { 1.0 };

    let root = SVGBackend::new(path, (720, 480)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Franchise vs Standalone: Average Revenue", CAPTION_FONT)
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(65)
        .build_cartesian_2d((0u32..1u32).into_segmented(), 0.0..top)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(FRANCHISE_LABELS.len())
        .x_label_formatter(&|v| segment_label(v, &FRANCHISE_LABELS))
        .y_desc("Average Revenue (M USD)")
        .draw()?;
    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BLUE.mix(0.7).filled())
            .margin(40)
            .data(means.iter().enumerate().map(|(i, m)| (i as u32, *m))),
    )?;
    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_table;
    use tempfile::tempdir;

    #[test]
    fn padded_range_handles_empty_and_flat_inputs() {
        assert_eq!(padded_range(Vec::new()), 0.0..1.0);
        assert_eq!(padded_range(vec![5.0]), 4.0..6.0);
        assert_eq!(padded_range(vec![f64::NAN]), 0.0..1.0);
        let r = padded_range(vec![0.0, 100.0]);
        assert!(r.start < 0.0 && r.end > 100.0);
        let wide = padded_range(vec![0.0, f64::MAX]);
        assert!(wide.start < 0.0 && wide.end == f64::MAX);
        let far = padded_range(vec![1e38]);
        assert!(far.start < far.end);
    }

    #[test]
    fn renders_every_chart_for_a_populated_table() {
        let dir = tempdir().unwrap();
        let written = render_all_charts(&sample_table(), dir.path()).unwrap();
        assert_eq!(written.len(), ChartKind::ALL.len());
        for path in written {
            let svg = std::fs::read_to_string(&path).unwrap();
            assert!(svg.contains("<svg"), "{} is not svg", path.display());
        }
    }

    #[test]
    fn rois_beyond_f32_are_left_out_of_the_boxplot() {
        let rows = vec![
            NormalizedMovieRow {
                genres: Some("Drama".into()),
                roi: Some(1e40),
                ..Default::default()
            },
            NormalizedMovieRow {
                genres: Some("Drama|Comedy".into()),
                roi: Some(1.0),
                ..Default::default()
            },
            NormalizedMovieRow {
                genres: Some("Horror".into()),
                roi: Some(-1e39),
                ..Default::default()
            },
        ];
        let table = MovieTable::with_full_schema(rows);
        let series = boxplot_series(&table);
        assert_eq!(
            series,
            vec![("Drama".to_string(), vec![1.0f32]), ("Comedy".to_string(), vec![1.0f32])]
        );

        let dir = tempdir().unwrap();
        let written = render_all_charts(&table, dir.path()).unwrap();
        assert_eq!(written.len(), ChartKind::ALL.len());
    }

    #[test]
    fn empty_tables_render_degenerate_charts() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("visualizations");
        let written = render_all_charts(&MovieTable::default(), &out).unwrap();
        assert!(written.iter().all(|p| p.exists()));
    }
}
