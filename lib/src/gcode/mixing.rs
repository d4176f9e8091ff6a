//! Dual-filament colour mixing for two-in-one-out nozzles.
//!
//! A mixing hot-end melts two input filaments into one stream, so every
//! extruded move must command both input axes (`E` and `B`). The split
//! of the pending extrusion delta across the two channels is chosen by
//! a [`ColorMixing`] strategy; the whole dispatch lives in
//! [`ColorMixing::split_fields`] so the move path stays branch-free.

use serde::{Deserialize, Serialize};

/// Strategy for splitting extrusion across the A and B filament channels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColorMixing {
    /// Both channels feed equally on every move.
    Single,
    /// The channel of the active extruder takes the whole delta; only
    /// that channel's field is emitted.
    Double,
    /// Alternating per-layer stripes. `overlap` controls how many
    /// stripes span the object height.
    Layer { overlap: f64 },
    /// Height-based gradient between two colours.
    Mix(MixRule),
}

/// How the [`ColorMixing::Mix`] gradient picks the channel-A fraction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum MixRule {
    /// Constant split: `percent_a` percent of the flow to channel A.
    Fixed { percent_a: i32 },
    /// Linear ramp across the band between two height percentages.
    /// Below the A bound the print is pure A, above the B bound pure B
    /// (or the mirror image when the bounds are swapped).
    Position { color_a: i32, color_b: i32 },
}

/// Cumulative per-channel filament counters, in millimetres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DualChannels {
    pub a: f64,
    pub b: f64,
}

impl DualChannels {
    /// Zero both counters.
    pub fn reset(&mut self) {
        self.a = 0.0;
        self.b = 0.0;
    }
}

/// Emitter state a split decision depends on.
pub(crate) struct SplitContext {
    pub extrusion_amount: f64,
    pub extruder_nr: usize,
    pub current_layer: i32,
    pub total_layer: i32,
}

impl ColorMixing {
    /// Split the pending extrusion delta across the channels and return
    /// the extrusion fields to append to the move command.
    ///
    /// Returns `None` when no field should be emitted at all (layer and
    /// gradient modes before the layer count is known, or a layer index
    /// below the pre-layer sentinel). Before the first layer
    /// (`current_layer == -1`) every strategy splits evenly.
    pub(crate) fn split_fields(
        &self,
        channels: &mut DualChannels,
        ctx: &SplitContext,
    ) -> Option<String> {
        let delta = ctx.extrusion_amount - channels.a - channels.b;

        if ctx.current_layer == -1 {
            channels.a += delta * 0.5;
            channels.b += delta * 0.5;
            return Some(format!(" E{:.5} B{:.5}", channels.a, channels.b));
        }
        if ctx.current_layer < -1 {
            return None;
        }

        match *self {
            ColorMixing::Single => Some(format!(
                " E{:.5} B{:.5}",
                0.5 * ctx.extrusion_amount,
                0.5 * ctx.extrusion_amount
            )),
            ColorMixing::Double => match ctx.extruder_nr {
                0 => {
                    channels.a += delta;
                    Some(format!(" E{:.5}", channels.a))
                }
                1 => {
                    channels.b += delta;
                    Some(format!(" B{:.5}", channels.b))
                }
                _ => None,
            },
            ColorMixing::Layer { overlap } => {
                if ctx.total_layer == 0 {
                    return None;
                }
                let count = (ctx.current_layer as f64 * overlap / ctx.total_layer as f64 + 0.5)
                    .floor() as i64
                    % 2;
                if count == 0 {
                    channels.a += delta;
                } else {
                    channels.b += delta;
                }
                Some(format!(" E{:.5} B{:.5}", channels.a, channels.b))
            }
            ColorMixing::Mix(rule) => {
                if ctx.total_layer == 0 {
                    return None;
                }
                let fraction_a = match rule {
                    MixRule::Fixed { percent_a } => percent_a as f64 / 100.0,
                    MixRule::Position { color_a, color_b } => {
                        // Integer height percentage, as firmware configs expect.
                        let height_percent = ctx.current_layer * 100 / ctx.total_layer;
                        position_fraction(height_percent, color_a, color_b)
                    }
                };
                channels.a += delta * fraction_a;
                channels.b += delta * (1.0 - fraction_a);
                Some(format!(" E{:.5} B{:.5}", channels.a, channels.b))
            }
        }
    }
}

/// Channel-A fraction for the position-based gradient.
fn position_fraction(height_percent: i32, color_a: i32, color_b: i32) -> f64 {
    if color_a > color_b {
        if height_percent < color_b {
            0.0
        } else if height_percent > color_a {
            1.0
        } else {
            (height_percent - color_b) as f64 / (color_a - color_b) as f64
        }
    } else if color_a < color_b {
        if height_percent < color_a {
            1.0
        } else if height_percent > color_b {
            0.0
        } else {
            1.0 - (height_percent - color_a) as f64 / (color_b - color_a) as f64
        }
    } else if height_percent < color_a {
        1.0
    } else if height_percent > color_a {
        0.0
    } else {
        0.5
    }
}
