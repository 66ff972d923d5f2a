use plotters::prelude::*;
use plotters::style::FontStyle;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::report::Histogram;

/// Font family name the loaded TTF is registered under.
const FONT_FAMILY: &str = "sans-serif";

/// Checked in order when no font path is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// One histogram in the output image.
pub struct Panel<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub histogram: &'a Histogram,
}

/// Draws histogram panels side by side into an image file.
pub trait ChartRenderer {
    fn render(&self, panels: &[Panel<'_>], path: &Path) -> Result<(), RenderError>;
}

/// PNG output through the plotters bitmap backend.
pub struct BitmapChart {
    size: (u32, u32),
    has_font: bool,
}

impl BitmapChart {
    /// Loads `font_path`, or the first system font found, for captions and labels.
    ///
    /// Without any font the bars and axes are still drawn, just unlabeled.
    pub fn new(font_path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match font_path {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        let has_font = candidates.iter().any(|path| load_font(path));
        if !has_font {
            warn!("no usable font found, charts will be drawn without labels");
        }

        Self {
            size: (1200, 600),
            has_font,
        }
    }

    fn draw(&self, panels: &[Panel<'_>], path: &Path) -> Result<(), String> {
        let root = BitMapBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| e.to_string())?;

        let areas = root.split_evenly((1, panels.len().max(1)));
        for (area, panel) in areas.iter().zip(panels) {
            let hist = panel.histogram;
            let top = hist.max_count() + hist.max_count() / 10 + 1;

            let mut builder = ChartBuilder::on(area);
            builder.margin(20).x_label_area_size(45).y_label_area_size(55);
            if self.has_font {
                builder.caption(panel.title, (FONT_FAMILY, 24));
            }
            let mut chart = builder
                .build_cartesian_2d(hist.min..hist.max, 0u32..top)
                .map_err(|e| e.to_string())?;

            let mut mesh = chart.configure_mesh();
            mesh.disable_x_mesh();
            if self.has_font {
                mesh.x_desc(panel.x_label)
                    .y_desc("count")
                    .label_style((FONT_FAMILY, 14));
            } else {
                mesh.x_labels(0).y_labels(0);
            }
            mesh.draw().map_err(|e| e.to_string())?;

            chart
                .draw_series(hist.bins().filter(|(_, _, count)| *count > 0).map(|(lo, hi, count)| {
                    Rectangle::new([(lo, 0), (hi, count)], BLUE.mix(0.6).filled())
                }))
                .map_err(|e| e.to_string())?;
        }

        root.present().map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl ChartRenderer for BitmapChart {
    fn render(&self, panels: &[Panel<'_>], path: &Path) -> Result<(), RenderError> {
        self.draw(panels, path).map_err(|cause| RenderError::new(path, cause))
    }
}

fn load_font(path: &Path) -> bool {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    // plotters keeps registered fonts for the life of the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    match plotters::style::register_font(FONT_FAMILY, FontStyle::Normal, bytes) {
        Ok(()) => {
            debug!(font = %path.display(), "chart font loaded");
            true
        }
        Err(_) => {
            warn!(font = %path.display(), "not a usable TTF font");
            false
        }
    }
}
