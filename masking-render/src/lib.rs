//! Masking-curve plots of finished sessions.

mod curve;

pub use curve::{CurveRenderer, CurveStyle, PlotFrame, RenderError};
