//! The G-code emitter.
//!
//! `GCodeExport` is a long-lived printer-state machine: one instance
//! per output file, configured before the first move, reused across all
//! layers, finalised once. Every mutation of printer state (position,
//! feedrate, fan, retraction, extruder selection, extrusion counters)
//! happens here, and every emitted line reflects exactly one such
//! mutation.
//!
//! Lines are XOR-checksummed and bounded to a fixed firmware buffer
//! size; see [`write`](GCodeExport::write_move) for the move contract.

use crate::estimate::{NaiveEstimate, TimeEstimator, Waypoint};
use crate::gcode::mixing::{ColorMixing, DualChannels, SplitContext};
use crate::gcode::scramble::scramble_line;
use crate::gcode::{GCodeFlavor, Sink};
use crate::geometry::{Point, Point3};
use crate::{unscale, Coord, Error, Result, MAX_EXTRUDERS};
use std::f64::consts::PI;
use std::path::Path;
use tracing::info;

/// Firmware line-buffer budget: commands longer than this are rejected.
pub const GCODE_MAX_LINE: usize = 96;

/// Reset the E counter once it passes this many millimetres; larger
/// values lose precision in firmware floats.
const EXTRUSION_RESET_THRESHOLD: f64 = 10_000.0;

/// BFB machines extrude 4 mm of filament per RPM.
const BFB_MM_PER_RPM: f64 = 4.0;

/// One-shot first-line priming progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrimeState {
    /// No extruded move emitted yet.
    Pristine,
    /// The first extruded move is being written; prime fields attach
    /// to it.
    Priming,
    /// Priming done; normal emission.
    Done,
}

/// Printer-state machine and G-code text serialiser.
pub struct GCodeExport {
    sink: Sink,
    flavor: GCodeFlavor,

    current_position: Point3,
    start_position: Point3,
    z_pos: Coord,

    extrusion_amount: f64,
    channels: DualChannels,
    extrusion_per_mm: f64,

    retraction_amount: f64,
    retraction_amount_prime: f64,
    retraction_speed: i32,
    extruder_switch_retraction: f64,
    minimal_extrusion_before_retraction: f64,
    extrusion_amount_at_previous_retraction: f64,
    retraction_z_hop: Coord,
    is_retracted: bool,

    extruder_nr: usize,
    extruder_offset: [Point; MAX_EXTRUDERS],
    extruder0_offset: Point,
    total_filament: [f64; MAX_EXTRUDERS],
    pre_switch_extruder_code: String,
    post_switch_extruder_code: String,

    current_speed: i32,
    current_fan_speed: i32,

    prime_state: PrimeState,
    first_line_section: f64,

    mixing: Option<ColorMixing>,
    scramble: bool,
    current_layer: i32,
    total_layer: i32,

    total_print_time: f64,
    estimate: Box<dyn TimeEstimator>,
}

impl GCodeExport {
    /// Create an emitter writing to stdout.
    pub fn new() -> Self {
        Self::with_sink(Sink::stdout())
    }

    /// Create an emitter writing to the given sink.
    pub fn with_sink(sink: Sink) -> Self {
        Self {
            sink,
            flavor: GCodeFlavor::RepRap,
            current_position: Point3::new(0, 0, 0),
            start_position: Point3::new(Coord::MIN, Coord::MIN, 0),
            z_pos: 0,
            extrusion_amount: 0.0,
            channels: DualChannels::default(),
            extrusion_per_mm: 0.0,
            retraction_amount: 4.5,
            retraction_amount_prime: 0.0,
            retraction_speed: 45,
            extruder_switch_retraction: 14.5,
            minimal_extrusion_before_retraction: 0.0,
            extrusion_amount_at_previous_retraction: -10_000.0,
            retraction_z_hop: 0,
            is_retracted: false,
            extruder_nr: 0,
            extruder_offset: [Point::zero(); MAX_EXTRUDERS],
            extruder0_offset: Point::zero(),
            total_filament: [0.0; MAX_EXTRUDERS],
            pre_switch_extruder_code: String::new(),
            post_switch_extruder_code: String::new(),
            current_speed: 0,
            current_fan_speed: -1,
            prime_state: PrimeState::Pristine,
            first_line_section: 0.0,
            mixing: None,
            scramble: false,
            current_layer: -1,
            total_layer: -1,
            total_print_time: 0.0,
            estimate: Box::new(NaiveEstimate::new()),
        }
    }

    /// Redirect output to a file, opened for in-place header patching.
    pub fn set_filename<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.sink = Sink::create(path)?;
        Ok(())
    }

    /// Select the firmware dialect.
    pub fn set_flavor(&mut self, flavor: GCodeFlavor) {
        self.flavor = flavor;
    }

    /// The configured firmware dialect.
    pub fn flavor(&self) -> GCodeFlavor {
        self.flavor
    }

    /// Set the XY offset of one extruder's nozzle.
    pub fn set_extruder_offset(&mut self, id: usize, offset: Point) {
        self.extruder_offset[id] = offset;
    }

    /// Global XY offset applied to every move on top of the per-extruder
    /// offsets.
    pub fn set_extruder0_offset_xy(&mut self, x: Coord, y: Coord) {
        self.extruder0_offset = Point::new(x, y);
    }

    /// Verbatim scripts emitted around each extruder switch.
    pub fn set_switch_extruder_code(&mut self, pre: &str, post: &str) {
        self.pre_switch_extruder_code = pre.to_string();
        self.post_switch_extruder_code = post.to_string();
    }

    /// Configure retraction. Lengths are scaled units, speeds mm/s.
    pub fn set_retraction_settings(
        &mut self,
        amount: Coord,
        speed: i32,
        extruder_switch_amount: Coord,
        minimal_extrusion_before: Coord,
        z_hop: Coord,
        prime_amount: Coord,
    ) {
        self.retraction_amount = unscale(amount);
        self.retraction_amount_prime = unscale(prime_amount);
        self.retraction_speed = speed;
        self.extruder_switch_retraction = unscale(extruder_switch_amount);
        self.minimal_extrusion_before_retraction = unscale(minimal_extrusion_before);
        self.retraction_z_hop = z_hop;
    }

    /// Derive the filament feed per millimetre of XY travel.
    ///
    /// Volumetric flavors command extruded volume, so only the layer
    /// thickness matters; everything else divides by the filament
    /// cross-section and scales by the flow percentage.
    pub fn set_extrusion(
        &mut self,
        layer_thickness: Coord,
        filament_diameter: Coord,
        flow: i32,
    ) -> Result<()> {
        if self.flavor.is_volumetric() {
            self.extrusion_per_mm = unscale(layer_thickness);
        } else {
            if filament_diameter <= 0 {
                return Err(Error::Config(
                    "filament diameter must be positive".to_string(),
                ));
            }
            let radius = unscale(filament_diameter) / 2.0;
            let filament_area = PI * radius * radius;
            self.extrusion_per_mm =
                unscale(layer_thickness) / filament_area * flow as f64 / 100.0;
        }
        Ok(())
    }

    /// Directly set the filament feed per millimetre of XY travel.
    pub fn set_extrusion_per_mm(&mut self, extrusion_per_mm: f64) {
        self.extrusion_per_mm = extrusion_per_mm;
    }

    /// Cross-section used to size the one-shot first-line prime.
    pub fn set_first_line_section(
        &mut self,
        initial_layer_thickness: Coord,
        filament_diameter: Coord,
        flow: i32,
        layer0_extrusion_width: Coord,
    ) -> Result<()> {
        if self.flavor.is_volumetric() {
            self.first_line_section =
                unscale(initial_layer_thickness) * unscale(layer0_extrusion_width);
        } else {
            if filament_diameter <= 0 {
                return Err(Error::Config(
                    "filament diameter must be positive".to_string(),
                ));
            }
            let radius = unscale(filament_diameter) / 2.0;
            let filament_area = PI * radius * radius;
            self.first_line_section = unscale(initial_layer_thickness) / filament_area
                * flow as f64
                / 100.0
                * unscale(layer0_extrusion_width);
        }
        Ok(())
    }

    /// Set the Z applied on the next motion.
    pub fn set_z(&mut self, z: Coord) {
        self.z_pos = z;
    }

    /// Layer index used by the colour-mixing strategies.
    pub fn set_current_layer(&mut self, layer: i32) {
        self.current_layer = layer;
    }

    /// Total layer count used by the colour-mixing strategies.
    pub fn set_total_layer(&mut self, total: i32) {
        self.total_layer = total;
    }

    /// Enable two-in-one-out mixing with the given strategy, or disable
    /// it with `None`.
    pub fn set_color_mixing(&mut self, mixing: Option<ColorMixing>) {
        self.mixing = mixing;
    }

    /// Opt into per-position line scrambling (see [`crate::gcode::scramble`]).
    pub fn set_scramble(&mut self, scramble: bool) {
        self.scramble = scramble;
    }

    /// Replace the time-estimate kernel.
    pub fn set_time_estimator(&mut self, estimate: Box<dyn TimeEstimator>) {
        self.estimate = estimate;
    }

    /// Last commanded XY position.
    pub fn position_xy(&self) -> Point {
        self.current_position.xy()
    }

    /// Last commanded Z position.
    pub fn position_z(&self) -> Coord {
        self.current_position.z
    }

    /// XY position at the start of the current motion batch.
    pub fn start_position_xy(&self) -> Point {
        self.start_position.xy()
    }

    /// Forget the start of the current motion batch.
    pub fn reset_start_position(&mut self) {
        self.start_position.x = Coord::MIN;
        self.start_position.y = Coord::MIN;
    }

    /// Currently selected extruder.
    pub fn extruder_nr(&self) -> usize {
        self.extruder_nr
    }

    /// Whether the filament is currently retracted.
    pub fn is_retracted(&self) -> bool {
        self.is_retracted
    }

    /// Cumulative extrusion since the last `G92` reset, in millimetres.
    pub fn extrusion_amount(&self) -> f64 {
        self.extrusion_amount
    }

    /// Per-channel totals of a two-in-one-out nozzle.
    pub fn channel_amounts(&self) -> (f64, f64) {
        (self.channels.a, self.channels.b)
    }

    /// Filament consumed by an extruder over the whole print, including
    /// the live counter of the active extruder.
    pub fn total_filament_used(&self, extruder: usize) -> f64 {
        if extruder == self.extruder_nr {
            self.total_filament[extruder] + self.extrusion_amount
        } else {
            self.total_filament[extruder]
        }
    }

    /// Estimated wall-clock print time so far, in seconds.
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time
    }

    /// Fold the time-estimate kernel's pending moves into the total.
    pub fn update_total_print_time(&mut self) {
        self.total_print_time += self.estimate.calculate();
        self.estimate.reset();
    }

    /// Rendered bytes of an in-memory sink.
    pub fn output(&self) -> Option<&[u8]> {
        self.sink.memory_contents()
    }

    /// Total bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.sink.bytes_written()
    }

    /// Flush buffered output through to the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }

    fn extruder_letter(&self) -> char {
        self.flavor.extruder_letter(self.extruder_nr)
    }

    fn plan_waypoint(&mut self, position: Point3, e: f64, feedrate: i32) {
        self.estimate.plan(
            Waypoint::new(
                unscale(position.x),
                unscale(position.y),
                unscale(position.z),
                e,
            ),
            feedrate as f64,
        );
    }

    /// Serialise one checksummed command line.
    fn write_line(&mut self, command: &str) -> Result<()> {
        let mut bytes = command.as_bytes().to_vec();
        if bytes.len() > GCODE_MAX_LINE {
            return Err(Error::LineTooLong {
                len: bytes.len(),
                max: GCODE_MAX_LINE,
            });
        }
        if self.scramble {
            scramble_line(&mut bytes);
        }
        let mut checksum = 0u32;
        for &byte in &bytes {
            checksum ^= byte as u32;
        }
        self.sink.write_all(&bytes)?;
        self.sink.write_all(format!(" ${}", checksum).as_bytes())?;
        self.sink.write_all(self.flavor.line_end().as_bytes())?;
        Ok(())
    }

    /// Emit a `;` comment line.
    pub fn write_comment(&mut self, comment: &str) -> Result<()> {
        self.sink.write_all(b";")?;
        self.sink.write_all(comment.as_bytes())?;
        self.sink.write_all(self.flavor.line_end().as_bytes())?;
        Ok(())
    }

    /// Emit a verbatim block (start/end scripts), without a checksum.
    pub fn write_code(&mut self, code: &str) -> Result<()> {
        self.sink.write_all(code.as_bytes())?;
        self.sink.write_all(self.flavor.line_end().as_bytes())?;
        Ok(())
    }

    /// Emit a dwell and account for it in the print time.
    pub fn write_delay(&mut self, seconds: f64) -> Result<()> {
        self.write_line(&format!("G4 P{}", (seconds * 1000.0) as i32))?;
        self.total_print_time += seconds;
        Ok(())
    }

    /// Emit a fan command if the duty cycle changed.
    pub fn write_fan_command(&mut self, speed: i32) -> Result<()> {
        if self.current_fan_speed == speed {
            return Ok(());
        }
        if speed > 0 {
            match self.flavor {
                GCodeFlavor::MakerBot => {
                    self.write_line(&format!("M126 T0 ; value = {}", speed * 255 / 100))?
                }
                GCodeFlavor::Mach3 => self.write_line(&format!("M106 P{}", speed * 255 / 100))?,
                _ => self.write_line(&format!("M106 S{}", speed * 255 / 100))?,
            }
        } else {
            match self.flavor {
                GCodeFlavor::MakerBot => self.write_line("M127 T0")?,
                GCodeFlavor::Mach3 => self.write_line("M106 P0")?,
                _ => self.write_line("M107")?,
            }
        }
        self.current_fan_speed = speed;
        Ok(())
    }

    /// Fold the E counter into the per-extruder total and emit a `G92`
    /// reset. Suppressed for flavors that forbid resets.
    pub fn reset_extrusion_value(&mut self) -> Result<()> {
        if self.extrusion_amount != 0.0 && !self.flavor.suppresses_extrusion_reset() {
            if self.mixing.is_some() {
                self.write_line("G92 E0 B0")?;
                self.channels.reset();
            } else {
                self.write_line(&format!("G92 {}0", self.extruder_letter()))?;
            }
            self.total_filament[self.extruder_nr] += self.extrusion_amount;
            self.extrusion_amount_at_previous_retraction -= self.extrusion_amount;
            self.extrusion_amount = 0.0;
        }
        Ok(())
    }

    /// Emit one motion command.
    ///
    /// `line_width == 0` is a pure travel (`G0`); anything else extrudes
    /// (`G1`) and accumulates `extrusion_per_mm * width_mm * distance_mm`
    /// of filament. Leaving the retracted state first re-primes, and the
    /// very first extruded move of the file carries the one-shot
    /// first-line prime.
    pub fn write_move(&mut self, p: Point, speed: i32, line_width: Coord) -> Result<()> {
        if self.current_position.x == p.x
            && self.current_position.y == p.y
            && self.current_position.z == self.z_pos
        {
            return Ok(());
        }

        if self.flavor == GCodeFlavor::Bfb {
            self.write_move_bfb(p, speed, line_width)?;
        } else {
            let mut command = String::with_capacity(GCODE_MAX_LINE);

            if line_width != 0 {
                let diff = p - self.position_xy();
                if self.is_retracted {
                    if self.retraction_z_hop > 0 {
                        self.write_line(&format!(
                            "G1 Z{:.3}",
                            unscale(self.current_position.z)
                        ))?;
                    }
                    if self.flavor.is_volumetric() {
                        self.write_line("G11")?;
                    } else {
                        self.extrusion_amount += self.retraction_amount_prime;
                        let unretract = match self.mixing {
                            Some(ColorMixing::Single) => format!(
                                "G1 F{} E{:.5} B{:.5}",
                                self.retraction_speed * 60,
                                0.5 * self.extrusion_amount,
                                0.5 * self.extrusion_amount
                            ),
                            Some(_) => format!(
                                "G1 F{} E{:.5} B{:.5}",
                                self.retraction_speed * 60,
                                self.channels.a,
                                self.channels.b
                            ),
                            None => format!(
                                "G1 F{} {}{:.5}",
                                self.retraction_speed * 60,
                                self.extruder_letter(),
                                self.extrusion_amount
                            ),
                        };
                        self.write_line(&unretract)?;
                        self.current_speed = self.retraction_speed;
                        self.plan_waypoint(
                            self.current_position,
                            self.extrusion_amount,
                            self.current_speed,
                        );
                    }
                    if self.extrusion_amount > EXTRUSION_RESET_THRESHOLD {
                        self.reset_extrusion_value()?;
                    }
                    self.is_retracted = false;
                }
                self.extrusion_amount +=
                    self.extrusion_per_mm * unscale(line_width) * diff.vsize_mm();
                command.push_str("G1");
            } else {
                command.push_str("G0");
            }

            if self.current_speed != speed {
                command.push_str(&format!(" F{}", speed * 60));
                self.current_speed = speed;
            }

            let target = p - self.extruder_offset[self.extruder_nr] - self.extruder0_offset;
            command.push_str(&format!(
                " X{:.3} Y{:.3}",
                unscale(target.x),
                unscale(target.y)
            ));
            if self.z_pos != self.current_position.z {
                command.push_str(&format!(" Z{:.3}", unscale(self.z_pos)));
            }

            if line_width != 0 {
                match self.mixing {
                    None => command.push_str(&format!(
                        " {}{:.5}",
                        self.extruder_letter(),
                        self.extrusion_amount
                    )),
                    Some(mixing) => {
                        let ctx = SplitContext {
                            extrusion_amount: self.extrusion_amount,
                            extruder_nr: self.extruder_nr,
                            current_layer: self.current_layer,
                            total_layer: self.total_layer,
                        };
                        if let Some(fields) = mixing.split_fields(&mut self.channels, &ctx) {
                            command.push_str(&fields);
                        }
                    }
                }
                if self.prime_state == PrimeState::Pristine {
                    self.prime_state = PrimeState::Priming;
                }
            }

            if self.prime_state == PrimeState::Priming {
                self.write_first_line_prime(p, &command)?;
                self.prime_state = PrimeState::Done;
            } else {
                self.write_line(&command)?;
            }
        }

        self.current_position = Point3::from_xy(p, self.z_pos);
        self.start_position = self.current_position;
        self.plan_waypoint(self.current_position, self.extrusion_amount, speed);
        Ok(())
    }

    /// BFB machines command the extruder in RPM instead of E values.
    fn write_move_bfb(&mut self, p: Point, speed: i32, line_width: Coord) -> Result<()> {
        let mut fspeed = (speed * 60) as f64;
        let rpm = self.extrusion_per_mm * unscale(line_width) * speed as f64 * 60.0
            / BFB_MM_PER_RPM;
        if rpm > 0.0 {
            if self.is_retracted {
                if self.current_speed != (rpm * 10.0) as i32 {
                    self.write_line(&format!("M108 S{:.1}", rpm))?;
                    self.current_speed = (rpm * 10.0) as i32;
                }
                self.write_line(&format!("M{}01", self.extruder_nr + 1))?;
                self.is_retracted = false;
            }
            // RPM quantises to two decimals; shift the remainder into the
            // feedrate, which has far more resolution.
            fspeed *= rpm / ((rpm * 100.0).round() / 100.0);

            let diff = p - self.position_xy();
            self.extrusion_amount +=
                self.extrusion_per_mm * unscale(line_width) * diff.vsize_mm();
        } else if !self.is_retracted {
            self.write_line("M103")?;
            self.is_retracted = true;
        }
        let target = p - self.extruder_offset[self.extruder_nr] - self.extruder0_offset;
        self.write_line(&format!(
            "G1 X{:.3} Y{:.3} Z{:.3} F{:.1}",
            unscale(target.x),
            unscale(target.y),
            unscale(self.z_pos),
            fspeed
        ))?;
        Ok(())
    }

    /// Lay some filament from the origin to the first printed point,
    /// then reset the counter, so the nozzle is primed when the real
    /// print starts.
    fn write_first_line_prime(&mut self, p: Point, command: &str) -> Result<()> {
        let offset_target = p - self.extruder_offset[self.extruder_nr];
        let (x, y) = offset_target.to_mm();
        let distance = (x * x + y * y).sqrt();
        let mut prime = 2.0 * self.first_line_section * distance;
        if prime <= 0.0 {
            prime = 10.0;
        }
        if self.mixing.is_some() {
            self.write_line(&format!(
                "{} E{:.5} B{:.5}",
                command,
                prime * 0.5,
                prime * 0.5
            ))?;
            self.write_line("G92 E0 B0")?;
        } else {
            self.write_line(&format!(
                "{} {}{:.5}",
                command,
                self.extruder_letter(),
                prime
            ))?;
            self.write_line(&format!("G92 {}0", self.extruder_letter()))?;
        }
        Ok(())
    }

    /// Pull filament back to stop oozing during travel.
    ///
    /// No-op under BFB (auto-retracting), when already retracted, or
    /// when too little has been extruded since the previous retraction
    /// and the call is not forced.
    pub fn write_retraction(&mut self, force: bool) -> Result<()> {
        if self.flavor == GCodeFlavor::Bfb {
            return Ok(());
        }
        if self.retraction_amount > 0.0
            && !self.is_retracted
            && (self.extrusion_amount_at_previous_retraction
                + self.minimal_extrusion_before_retraction
                < self.extrusion_amount
                || force)
        {
            if self.flavor.is_volumetric() {
                self.write_line("G10")?;
            } else {
                match self.mixing {
                    Some(ColorMixing::Double) => {
                        let retracted_channel = match self.extruder_nr {
                            0 => Some(self.channels.a - self.retraction_amount),
                            1 => Some(self.channels.b - self.retraction_amount),
                            _ => None,
                        };
                        if let Some(value) = retracted_channel {
                            self.write_line(&format!(
                                "G1 F{} {}{:.5}",
                                self.retraction_speed * 60,
                                self.extruder_letter(),
                                value
                            ))?;
                        }
                    }
                    Some(ColorMixing::Single) if self.current_layer >= 0 => {
                        self.write_line(&format!(
                            "G1 F{} E{:.5} B{:.5}",
                            self.retraction_speed * 60,
                            0.5 * self.extrusion_amount - self.retraction_amount,
                            0.5 * self.extrusion_amount
                        ))?;
                    }
                    Some(_) => {
                        let half = self.retraction_amount * 0.5;
                        self.write_line(&format!(
                            "G1 F{} E{:.5} B{:.5}",
                            self.retraction_speed * 60,
                            self.channels.a - half,
                            self.channels.b - half
                        ))?;
                    }
                    None => {
                        self.write_line(&format!(
                            "G1 F{} {}{:.5}",
                            self.retraction_speed * 60,
                            self.extruder_letter(),
                            self.extrusion_amount - self.retraction_amount
                        ))?;
                    }
                }
                self.current_speed = self.retraction_speed;
                self.plan_waypoint(
                    self.current_position,
                    self.extrusion_amount - self.retraction_amount,
                    self.current_speed,
                );
            }
            if self.retraction_z_hop > 0 {
                self.write_line(&format!(
                    "G1 Z{:.3}",
                    unscale(self.current_position.z + self.retraction_z_hop)
                ))?;
            }
            self.extrusion_amount_at_previous_retraction = self.extrusion_amount;
            self.is_retracted = true;
        }
        Ok(())
    }

    /// Select a different extruder, leaving the printer retracted.
    ///
    /// Idempotent when the extruder already matches. Performs the
    /// switch-retraction, an optional Z-hop, then the pre-switch
    /// script, the tool-select command, and the post-switch script.
    pub fn switch_extruder(&mut self, new_extruder: usize) -> Result<()> {
        if self.extruder_nr == new_extruder {
            return Ok(());
        }
        if self.flavor == GCodeFlavor::Bfb {
            if !self.is_retracted {
                self.write_line("M103")?;
            }
            self.is_retracted = true;
            return Ok(());
        }

        self.reset_extrusion_value()?;
        if self.flavor.is_volumetric() {
            self.write_line("G10 S1")?;
        } else {
            // A mixing nozzle switches channels with the same single
            // retraction line as a plain dual setup.
            self.write_line(&format!(
                "G1 F{} {}{:.5}",
                self.retraction_speed * 60,
                self.extruder_letter(),
                self.extrusion_amount - self.extruder_switch_retraction
            ))?;
            self.current_speed = self.retraction_speed;
        }
        if self.retraction_z_hop > 0 {
            self.write_line(&format!(
                "G1 Z{:.3}",
                unscale(self.current_position.z + self.retraction_z_hop)
            ))?;
        }
        self.extruder_nr = new_extruder;
        if self.flavor == GCodeFlavor::Mach3 {
            self.reset_extrusion_value()?;
        }
        self.is_retracted = true;

        let pre = self.pre_switch_extruder_code.clone();
        self.write_code(&pre)?;
        if self.flavor == GCodeFlavor::MakerBot {
            self.write_line(&format!("M135 T{}", self.extruder_nr))?;
        } else {
            self.write_line(&format!("T{}", self.extruder_nr))?;
        }
        let post = self.post_switch_extruder_code.clone();
        self.write_code(&post)?;
        Ok(())
    }

    /// Park the head, emit the end script, and patch header totals.
    pub fn finalize(
        &mut self,
        max_object_height: Coord,
        move_speed: i32,
        end_code: &str,
    ) -> Result<()> {
        self.write_fan_command(0)?;
        self.write_retraction(false)?;
        self.set_z(max_object_height + 5000);
        self.write_move(self.position_xy(), move_speed, 0)?;
        self.write_code(end_code)?;

        info!(
            print_time_s = self.total_print_time() as i64,
            filament_mm = self.total_filament_used(0) as i64,
            filament2_mm = self.total_filament_used(1) as i64,
            "print finished"
        );
        self.sink.log_size();

        if self.flavor == GCodeFlavor::UltiGCode {
            let time = format!("{}", self.total_print_time() as i64);
            self.sink.patch_near_start("<__TIME__>", &time)?;
            let filament = format!("{}", self.total_filament_used(0) as i64);
            self.sink.patch_near_start("<FILAMENT>", &filament)?;
            let filament2 = format!("{}", self.total_filament_used(1) as i64);
            self.sink.patch_near_start("<FILAMEN2>", &filament2)?;
        }
        self.sink.flush()?;
        Ok(())
    }
}

impl Default for GCodeExport {
    fn default() -> Self {
        Self::new()
    }
}
