use masking_core::ResultRecord;
use std::path::Path;
use thiserror::Error;
use tiny_skia::{
    Color, FillRule, LineCap, Paint, PathBuilder, Pixmap, Stroke, StrokeDash, Transform,
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot plot record: {0}")]
    InvalidData(&'static str),
    #[error("cannot allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("PNG encoding failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CurveStyle {
    pub width: u32,
    pub height: u32,
    /// Space between the canvas edge and the plot area, in pixels.
    pub margin: f32,
    pub background: [u8; 4],
    pub axis: [u8; 4],
    pub maskee: [u8; 4],
    pub masker: [u8; 4],
    pub marker_radius: f32,
    pub line_width: f32,
}

impl Default for CurveStyle {
    fn default() -> Self {
        Self {
            width: 800,
            height: 480,
            margin: 48.0,
            background: [255, 255, 255, 255],
            axis: [90, 90, 90, 255],
            maskee: [255, 99, 132, 255],
            masker: [53, 162, 235, 255],
            marker_radius: 5.0,
            line_width: 2.0,
        }
    }
}

/// Maps data coordinates (grid position, gain dB) to canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotFrame {
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl PlotFrame {
    pub fn to_canvas(&self, x: f64, y: f64) -> (f32, f32) {
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        let tx = ((x - x0) / (x1 - x0)) as f32;
        let ty = ((y - y0) / (y1 - y0)) as f32;
        (
            self.left + tx * (self.right - self.left),
            self.bottom - ty * (self.bottom - self.top),
        )
    }
}

/// Widens a degenerate range and adds a little headroom on both ends.
fn padded(lo: f64, hi: f64) -> (f64, f64) {
    let span = hi - lo;
    if span.abs() < f64::EPSILON {
        let pad = if lo.abs() > 1.0 { lo.abs() * 0.1 } else { 1.0 };
        return (lo - pad, hi + pad);
    }
    (lo - span * 0.05, hi + span * 0.05)
}

fn paint(rgba: [u8; 4]) -> Paint<'static> {
    let mut p = Paint::default();
    p.set_color_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]);
    p.anti_alias = true;
    p
}

/// Draws the maskee gains against grid position, with the masker as a dashed
/// vertical line from 0 dB up to its display gain.
#[derive(Debug, Clone, Default)]
pub struct CurveRenderer {
    style: CurveStyle,
}

impl CurveRenderer {
    pub fn new(style: CurveStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &CurveStyle {
        &self.style
    }

    pub fn frame(&self, record: &ResultRecord) -> Result<PlotFrame, RenderError> {
        if record.grid.is_empty() {
            return Err(RenderError::InvalidData("empty grid"));
        }
        if record.grid.len() != record.responses.len() {
            return Err(RenderError::InvalidData("grid and responses differ in length"));
        }
        let masker_gain = record.masker_display_gain();
        let values = record
            .grid
            .iter()
            .chain(&record.responses)
            .chain([&record.masker.placement, &masker_gain]);
        if values.into_iter().any(|v| !v.is_finite()) {
            return Err(RenderError::InvalidData("non-finite value"));
        }

        let xs = record.grid.iter().copied().chain([record.masker.placement]);
        let ys = record.responses.iter().copied().chain([0.0, masker_gain]);
        let (x_lo, x_hi) = xs.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let (y_lo, y_hi) = ys.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

        let m = self.style.margin;
        Ok(PlotFrame {
            x_range: padded(x_lo, x_hi),
            y_range: padded(y_lo, y_hi),
            left: m,
            top: m,
            right: self.style.width as f32 - m,
            bottom: self.style.height as f32 - m,
        })
    }

    pub fn render(&self, record: &ResultRecord) -> Result<Pixmap, RenderError> {
        let frame = self.frame(record)?;
        let (width, height) = (self.style.width, self.style.height);
        let mut pixmap = Pixmap::new(width, height).ok_or(RenderError::Canvas { width, height })?;
        let [r, g, b, a] = self.style.background;
        pixmap.fill(Color::from_rgba8(r, g, b, a));

        self.draw_axes(&mut pixmap, &frame);
        self.draw_masker(&mut pixmap, &frame, record);
        self.draw_curve(&mut pixmap, &frame, record);

        debug!(
            subject = %record.name,
            points = record.grid.len(),
            width,
            height,
            "rendered masking curve"
        );
        Ok(pixmap)
    }

    fn draw_axes(&self, pixmap: &mut Pixmap, frame: &PlotFrame) {
        let mut pb = PathBuilder::new();
        pb.move_to(frame.left, frame.top);
        pb.line_to(frame.left, frame.bottom);
        pb.line_to(frame.right, frame.bottom);

        // 0 dB reference: the calibration level.
        let (y0, y1) = frame.y_range;
        if y0 < 0.0 && y1 > 0.0 {
            let (_, zero) = frame.to_canvas(frame.x_range.0, 0.0);
            pb.move_to(frame.left, zero);
            pb.line_to(frame.right, zero);
        }

        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: 1.0,
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &paint(self.style.axis), &stroke, Transform::identity(), None);
        }
    }

    fn draw_masker(&self, pixmap: &mut Pixmap, frame: &PlotFrame, record: &ResultRecord) {
        let placement = record.masker.placement;
        let (x, base) = frame.to_canvas(placement, 0.0);
        let (_, peak) = frame.to_canvas(placement, record.masker_display_gain());

        let mut pb = PathBuilder::new();
        pb.move_to(x, base);
        pb.line_to(x, peak);
        if let Some(path) = pb.finish() {
            let stroke = Stroke {
                width: self.style.line_width,
                line_cap: LineCap::Butt,
                dash: StrokeDash::new(vec![6.0, 4.0], 0.0),
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &paint(self.style.masker), &stroke, Transform::identity(), None);
        }

        let mut pb = PathBuilder::new();
        pb.push_circle(x, peak, self.style.marker_radius);
        if let Some(path) = pb.finish() {
            pixmap.fill_path(
                &path,
                &paint(self.style.masker),
                FillRule::Winding,
                Transform::identity(),
                None,
            );
        }
    }

    fn draw_curve(&self, pixmap: &mut Pixmap, frame: &PlotFrame, record: &ResultRecord) {
        let points: Vec<(f32, f32)> = record
            .curve()
            .map(|(x, y)| frame.to_canvas(x, y))
            .collect();
        let color = paint(self.style.maskee);

        let mut line = PathBuilder::new();
        for (i, &(x, y)) in points.iter().enumerate() {
            if i == 0 {
                line.move_to(x, y);
            } else {
                line.line_to(x, y);
            }
        }
        // A single point has no line, only its marker.
        if let Some(path) = line.finish() {
            let stroke = Stroke {
                width: self.style.line_width,
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &color, &stroke, Transform::identity(), None);
        }

        let mut markers = PathBuilder::new();
        for &(x, y) in &points {
            markers.push_circle(x, y, self.style.marker_radius);
        }
        if let Some(path) = markers.finish() {
            pixmap.fill_path(&path, &color, FillRule::Winding, Transform::identity(), None);
        }
    }

    pub fn encode_png(&self, record: &ResultRecord) -> Result<Vec<u8>, RenderError> {
        self.render(record)?
            .encode_png()
            .map_err(|e| RenderError::Encode(e.to_string()))
    }

    pub fn save_png(&self, record: &ResultRecord, path: &Path) -> Result<(), RenderError> {
        let bytes = self.encode_png(record)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use masking_core::{DomainKind, MaskerInfo, TestKind, TestSettings};

    fn record() -> ResultRecord {
        ResultRecord {
            name: "ana".into(),
            domain: DomainKind::Time,
            test: TestKind::PulseMaskedByPulse,
            grid: vec![0.46, 0.48, 0.5, 0.52, 0.54],
            responses: vec![5.0, 12.0, 30.0, 14.0, 6.0],
            calibration_gain: -40.0,
            masker: MaskerInfo {
                placement: 0.5,
                gain: -3.0,
            },
            settings: TestSettings::default(),
        }
    }

    fn pixel(pixmap: &Pixmap, (x, y): (f32, f32)) -> [u8; 4] {
        let p = pixmap.pixel(x.round() as u32, y.round() as u32).unwrap();
        [p.red(), p.green(), p.blue(), p.alpha()]
    }

    #[test]
    fn frame_covers_curve_and_masker() {
        let frame = CurveRenderer::default().frame(&record()).unwrap();
        assert!(frame.y_range.0 < 0.0);
        assert!(frame.y_range.1 > 37.0);
        assert!(frame.x_range.0 < 0.46 && frame.x_range.1 > 0.54);

        let (left, bottom) = frame.to_canvas(frame.x_range.0, frame.y_range.0);
        assert_eq!((left, bottom), (frame.left, frame.bottom));
    }

    #[test]
    fn markers_use_maskee_color() {
        let renderer = CurveRenderer::default();
        let rec = record();
        let pixmap = renderer.render(&rec).unwrap();
        let frame = renderer.frame(&rec).unwrap();

        assert_eq!(pixmap.width(), 800);
        assert_eq!(pixel(&pixmap, frame.to_canvas(0.46, 5.0)), renderer.style().maskee);
        assert_eq!(pixel(&pixmap, frame.to_canvas(0.5, 37.0)), renderer.style().masker);
    }

    #[test]
    fn single_point_still_renders() {
        let mut rec = record();
        rec.grid = vec![1000.0];
        rec.responses = vec![20.0];
        rec.masker.placement = 1000.0;
        assert!(CurveRenderer::default().render(&rec).is_ok());
    }

    #[test]
    fn rejects_mismatched_or_empty_data() {
        let mut rec = record();
        rec.responses.pop();
        assert!(matches!(
            CurveRenderer::default().render(&rec),
            Err(RenderError::InvalidData(_))
        ));
        rec.grid.clear();
        rec.responses.clear();
        assert!(CurveRenderer::default().frame(&rec).is_err());
    }

    #[test]
    fn writes_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.png");
        CurveRenderer::default().save_png(&record(), &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}
