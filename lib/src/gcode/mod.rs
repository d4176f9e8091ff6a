//! G-code emission.
//!
//! [`GCodeExport`] is the printer-state machine and text serialiser:
//! it owns the output sink, tracks position, feedrate, retraction,
//! extruder selection and cumulative extrusion, and writes one line per
//! motion in the syntax of the configured [`GCodeFlavor`].
//! [`GCodePlanner`] accumulates one layer's worth of travel and
//! extrusion paths and replays them into the emitter in order.

mod export;
mod flavor;
mod mixing;
mod planner;
pub mod scramble;
mod sink;

pub use export::{GCodeExport, GCODE_MAX_LINE};
pub use flavor::GCodeFlavor;
pub use mixing::{ColorMixing, DualChannels, MixRule};
pub use planner::GCodePlanner;
pub use sink::Sink;
