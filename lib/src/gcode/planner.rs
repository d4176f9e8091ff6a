//! Per-layer path planning.
//!
//! A `GCodePlanner` is created for one layer, filled with travel and
//! extrusion moves grouped into paths, optionally retimed to honour a
//! minimum layer time, replayed into the emitter, and discarded. While
//! accumulating it applies the retraction policy and combing; while
//! replaying it coalesces runs of tiny moves and ramps Z across
//! spiralize perimeters.

use crate::comb::Comb;
use crate::config::PathConfig;
use crate::gcode::GCodeExport;
use crate::geometry::{Point, Polygon};
use crate::order::PolygonOrder;
use crate::{scale, Coord, Error, Result};

/// One group of waypoints sharing a config and an extruder.
///
/// The starting point of a path is the end of the previous path (or
/// the planner's last position); only destinations are stored.
#[derive(Clone, Debug)]
struct GCodePath {
    config: PathConfig,
    extruder: usize,
    retract: bool,
    /// Sealed against further appends.
    done: bool,
    points: Vec<Point>,
}

impl GCodePath {
    fn new(config: PathConfig, extruder: usize) -> Self {
        Self {
            config,
            extruder,
            retract: false,
            done: false,
            points: Vec::new(),
        }
    }
}

/// Accumulates one layer's moves and replays them into an emitter.
pub struct GCodePlanner<'a> {
    gcode: &'a mut GCodeExport,
    travel_config: PathConfig,
    retraction_minimal_distance: Coord,
    paths: Vec<GCodePath>,
    last_position: Point,
    comb: Option<Box<dyn Comb>>,
    current_extruder: usize,
    force_retraction: bool,
    always_retract: bool,
    extrude_speed_factor: i32,
    travel_speed_factor: i32,
    extra_time: f64,
    total_print_time: f64,
}

impl<'a> GCodePlanner<'a> {
    /// Create a planner borrowing `gcode` for this layer.
    ///
    /// `travel_speed` is mm/s; `retraction_minimal_distance` is the
    /// scaled travel length below which no retraction is worth it.
    pub fn new(
        gcode: &'a mut GCodeExport,
        travel_speed: i32,
        retraction_minimal_distance: Coord,
    ) -> Self {
        let last_position = gcode.position_xy();
        let current_extruder = gcode.extruder_nr();
        Self {
            gcode,
            travel_config: PathConfig::travel(travel_speed),
            retraction_minimal_distance,
            paths: Vec::new(),
            last_position,
            comb: None,
            current_extruder,
            force_retraction: false,
            always_retract: false,
            extrude_speed_factor: 100,
            travel_speed_factor: 100,
            extra_time: 0.0,
            total_print_time: 0.0,
        }
    }

    /// Install (or remove) the combing oracle for this layer.
    pub fn set_comb(&mut self, comb: Option<Box<dyn Comb>>) {
        self.comb = comb;
    }

    /// Extruder that newly enqueued paths are stamped with.
    pub fn set_extruder(&mut self, extruder: usize) {
        self.current_extruder = extruder;
    }

    /// Extruder that newly enqueued paths are stamped with.
    pub fn extruder(&self) -> usize {
        self.current_extruder
    }

    /// Retract before every sufficiently long travel move.
    pub fn set_always_retract(&mut self, always_retract: bool) {
        self.always_retract = always_retract;
    }

    /// Force a retraction before the next travel move.
    pub fn force_retract(&mut self) {
        self.force_retraction = true;
    }

    /// Percent scaling applied to extrusion speeds on replay.
    pub fn set_extrude_speed_factor(&mut self, factor: i32) {
        self.extrude_speed_factor = factor.max(1);
    }

    /// Percent scaling applied to extrusion speeds on replay.
    pub fn extrude_speed_factor(&self) -> i32 {
        self.extrude_speed_factor
    }

    /// Percent scaling applied to travel speeds on replay.
    pub fn set_travel_speed_factor(&mut self, factor: i32) {
        self.travel_speed_factor = factor.max(1);
    }

    /// Percent scaling applied to travel speeds on replay.
    pub fn travel_speed_factor(&self) -> i32 {
        self.travel_speed_factor
    }

    /// Leftover dwell needed after slowdown to reach the minimum layer
    /// time.
    pub fn extra_time(&self) -> f64 {
        self.extra_time
    }

    /// Projected duration of this layer after any slowdown.
    pub fn total_print_time(&self) -> f64 {
        self.total_print_time
    }

    /// Seal the trailing path so the next append opens a new one.
    pub fn force_new_path_start(&mut self) {
        if let Some(path) = self.paths.last_mut() {
            path.done = true;
        }
    }

    /// Index of the trailing open path with this config, opening one if
    /// needed.
    fn latest_path_with_config(&mut self, config: &PathConfig) -> usize {
        if let Some(path) = self.paths.last() {
            if path.config == *config && !path.done {
                return self.paths.len() - 1;
            }
        }
        self.paths
            .push(GCodePath::new(config.clone(), self.current_extruder));
        self.paths.len() - 1
    }

    /// Append a travel move to `p`, consulting the retraction policy
    /// and the combing oracle.
    pub fn add_travel(&mut self, p: Point) {
        let travel_config = self.travel_config.clone();
        let idx = self.latest_path_with_config(&travel_config);

        let long_enough = !(self.last_position - p).shorter_than(self.retraction_minimal_distance);
        let mut retract = false;
        let mut combed_points = Vec::new();
        if self.force_retraction {
            if long_enough {
                retract = true;
            }
            self.force_retraction = false;
        } else if let Some(comb) = self.comb.as_deref() {
            // A combed route stays inside the boundary and needs no
            // retraction; without one, fall back to retracting.
            if !comb.calc(self.last_position, p, &mut combed_points) {
                combed_points.clear();
                if long_enough {
                    retract = true;
                }
            }
        } else if self.always_retract && long_enough {
            retract = true;
        }

        let path = &mut self.paths[idx];
        if retract {
            path.retract = true;
        }
        path.points.append(&mut combed_points);
        path.points.push(p);
        self.last_position = p;
    }

    /// Append an extrusion move to `p` with the given config.
    pub fn add_extrusion_move(&mut self, p: Point, config: &PathConfig) {
        let idx = self.latest_path_with_config(config);
        self.paths[idx].points.push(p);
        self.last_position = p;
    }

    /// If the planner sits outside the combing boundary, travel back
    /// inside it before the next path begins.
    ///
    /// The inward move is applied twice to escape tight corners, and
    /// the current path is sealed so any retraction lands after the
    /// correcting travel.
    pub fn move_inside_comb_boundary(&mut self, distance: Coord) {
        let target = {
            let Some(comb) = self.comb.as_deref() else {
                return;
            };
            if comb.inside(self.last_position) {
                return;
            }
            let mut p = self.last_position;
            if !comb.move_inside(&mut p, distance) {
                return;
            }
            comb.move_inside(&mut p, distance);
            if comb.inside(p) {
                Some(p)
            } else {
                None
            }
        };
        if let Some(p) = target {
            self.add_travel(p);
            self.force_new_path_start();
        }
    }

    /// Travel to the ring's start vertex, then extrude around it,
    /// closing the loop when the ring has at least three vertices.
    pub fn add_polygon(&mut self, polygon: &Polygon, start_idx: usize, config: &PathConfig) {
        if polygon.is_empty() {
            return;
        }
        self.add_travel(polygon[start_idx]);
        for i in 1..polygon.len() {
            self.add_extrusion_move(polygon.cyclic(start_idx + i), config);
        }
        if polygon.len() > 2 {
            self.add_extrusion_move(polygon[start_idx], config);
        }
    }

    /// Enqueue a set of rings in the order an optimiser chooses.
    ///
    /// Skin is seeded from the first ring's first vertex instead of the
    /// planner's position, keeping skin print order deterministic
    /// across layers.
    pub fn add_polygons_by_optimizer(
        &mut self,
        polygons: &[Polygon],
        config: &PathConfig,
        optimizer: &mut dyn PolygonOrder,
    ) {
        let mut seed = self.last_position;
        if config.name == "SKIN" {
            if let (Some(first), Some(last)) = (polygons.first(), polygons.last()) {
                if !first.is_empty() && !last.is_empty() {
                    seed = first[0];
                }
            }
        }
        let planned = optimizer.plan(seed, polygons);
        for &nr in &planned.order {
            self.add_polygon(&polygons[nr], planned.starts[nr], config);
        }
    }

    /// Slow extrusion down so the layer takes at least `min_time`
    /// seconds, without dropping any extrusion path below
    /// `minimal_speed` mm/s.
    ///
    /// The factor only ever shrinks: a first-layer slowdown that is
    /// already stricter stays in force. When the clamped slowdown still
    /// cannot fill `min_time`, the difference is recorded as extra time
    /// to be spent dwelling.
    pub fn force_minimal_layer_time(&mut self, min_time: f64, minimal_speed: i32) {
        let mut p0 = self.gcode.position_xy();
        let mut travel_time = 0.0;
        let mut extrude_time = 0.0;
        for path in &self.paths {
            for &point in &path.points {
                let time = (point - p0).vsize_mm() / path.config.speed as f64;
                if path.config.line_width != 0 {
                    extrude_time += time;
                } else {
                    travel_time += time;
                }
                p0 = point;
            }
        }
        let total_time = extrude_time + travel_time;
        if total_time < min_time && extrude_time > 0.0 {
            let min_extrude_time = (min_time - travel_time).max(1.0);
            let mut factor = extrude_time / min_extrude_time;
            for path in &self.paths {
                if path.config.line_width == 0 {
                    continue;
                }
                let speed = (path.config.speed as f64 * factor) as i32;
                if speed < minimal_speed {
                    factor = minimal_speed as f64 / path.config.speed as f64;
                }
            }

            // Only a stricter slowdown than the one already in force
            // (e.g. from the first layer) takes effect.
            if factor * 100.0 < self.extrude_speed_factor as f64 {
                self.set_extrude_speed_factor((factor * 100.0) as i32);
            } else {
                factor = self.extrude_speed_factor as f64 / 100.0;
            }

            if min_time - extrude_time / factor - travel_time > 0.1 {
                self.extra_time = min_time - extrude_time / factor - travel_time;
            }
            self.total_print_time = extrude_time / factor + travel_time;
        } else {
            self.total_print_time = total_time;
        }
    }

    /// Drain the planned paths into the emitter, in order.
    ///
    /// Runs of at least three single-point extrusion paths within two
    /// line widths of each other coalesce into averaged midpoint moves.
    /// A path marked spiralize ramps Z linearly across its length; only
    /// the last spiralize run in the layer actually spirals. When
    /// `lift_head_if_needed` is set and slowdown left extra time, the
    /// head is lifted, jogged aside and dwelled.
    pub fn write_gcode(&mut self, lift_head_if_needed: bool, layer_thickness: Coord) -> Result<()> {
        let gcode = &mut *self.gcode;
        let paths = &self.paths;
        let mut last_config: Option<&PathConfig> = None;
        let mut extruder = gcode.extruder_nr();

        let mut n = 0;
        while n < paths.len() {
            let path = &paths[n];
            if extruder != path.extruder {
                extruder = path.extruder;
                gcode.switch_extruder(extruder)?;
            } else if path.retract {
                gcode.write_retraction(false)?;
            }
            if !path.config.is_travel() && last_config != Some(&path.config) {
                gcode.write_comment(&format!("TYPE:{}", path.config.name))?;
                last_config = Some(&path.config);
            }

            let speed = if path.config.line_width != 0 {
                path.config.speed * self.extrude_speed_factor / 100
            } else {
                path.config.speed * self.travel_speed_factor / 100
            };

            if path.points.len() == 1
                && !path.config.is_travel()
                && (path.points[0] - gcode.position_xy()).shorter_than(path.config.line_width * 2)
            {
                // A run of tiny stabs is better printed as a few
                // midpoint moves with compensated width.
                let mut p0 = path.points[0];
                let mut i = n + 1;
                while i < paths.len()
                    && paths[i].points.len() == 1
                    && (paths[i].points[0] - p0).shorter_than(path.config.line_width * 2)
                {
                    p0 = paths[i].points[0];
                    i += 1;
                }
                if paths[i - 1].config.is_travel() {
                    i -= 1;
                }
                if i > n + 2 {
                    let mut p0 = gcode.position_xy();
                    let mut x = n;
                    while x + 1 < i {
                        let old_len = (paths[x].points[0] - p0).vsize();
                        let new_point = (paths[x].points[0] + paths[x + 1].points[0]) / 2;
                        let new_len = (new_point - gcode.position_xy()).vsize();
                        if new_len > 0 {
                            let width =
                                (path.config.line_width as i64 * old_len / new_len) as Coord;
                            gcode.write_move(new_point, speed, width)?;
                        }
                        p0 = paths[x + 1].points[0];
                        x += 2;
                    }
                    gcode.write_move(paths[i - 1].points[0], speed, path.config.line_width)?;
                    n = i;
                    continue;
                }
            }

            let mut spiralize = path.config.spiralize;
            if spiralize {
                // Only the last spiralize run in the layer spirals.
                for later in &paths[n + 1..] {
                    if later.config.spiralize {
                        spiralize = false;
                    }
                }
            }
            if spiralize {
                let z = gcode.position_z();
                let mut total_length = 0.0;
                let mut p0 = gcode.position_xy();
                for &p1 in &path.points {
                    total_length += (p1 - p0).vsize_mm();
                    p0 = p1;
                }
                if total_length <= 0.0 {
                    return Err(Error::DegenerateSpiral);
                }
                let mut length = 0.0;
                p0 = gcode.position_xy();
                for &p1 in &path.points {
                    length += (p1 - p0).vsize_mm();
                    p0 = p1;
                    gcode.set_z(z + (layer_thickness as f64 * length / total_length) as Coord);
                    gcode.write_move(p1, speed, path.config.line_width)?;
                }
            } else {
                for &point in &path.points {
                    gcode.write_move(point, speed, path.config.line_width)?;
                }
            }
            n += 1;
        }

        gcode.update_total_print_time();
        if lift_head_if_needed && self.extra_time > 0.0 {
            gcode.write_comment(&format!(
                "Small layer, adding delay of {:.6}",
                self.extra_time
            ))?;
            gcode.write_retraction(true)?;
            gcode.set_z(gcode.position_z() + scale(3.0));
            gcode.write_move(gcode.position_xy(), self.travel_config.speed, 0)?;
            let jog = gcode.position_xy() - Point::new(-scale(20.0), 0);
            gcode.write_move(jog, self.travel_config.speed, 0)?;
            gcode.write_delay(self.extra_time)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::Sink;
    use crate::order::SequentialOrder;

    fn memory_emitter() -> GCodeExport {
        let mut gcode = GCodeExport::with_sink(Sink::memory());
        gcode.set_extrusion_per_mm(0.05);
        gcode
    }

    fn emitted(gcode: &GCodeExport) -> Vec<String> {
        let text = String::from_utf8(gcode.output().unwrap().to_vec()).unwrap();
        text.lines()
            .map(|line| match line.rfind(" $") {
                Some(at) if line[at + 2..].parse::<u32>().is_ok() => line[..at].to_string(),
                _ => line.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_consecutive_moves_share_a_path() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        planner.add_extrusion_move(Point::new(1000, 0), &wall);
        planner.add_extrusion_move(Point::new(2000, 0), &wall);
        assert_eq!(planner.paths.len(), 1);
        assert_eq!(planner.paths[0].points.len(), 2);

        planner.force_new_path_start();
        planner.add_extrusion_move(Point::new(3000, 0), &wall);
        assert_eq!(planner.paths.len(), 2);
    }

    #[test]
    fn test_config_change_opens_new_path() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        let fill = PathConfig::new(80, 400, "FILL");
        planner.add_extrusion_move(Point::new(1000, 0), &wall);
        planner.add_extrusion_move(Point::new(2000, 0), &fill);
        assert_eq!(planner.paths.len(), 2);
    }

    #[test]
    fn test_force_retraction_gated_by_distance() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);

        planner.force_retract();
        planner.add_travel(Point::new(1000, 0)); // 1mm < 1.5mm minimum
        assert!(!planner.paths[0].retract);
        // The force flag is consumed either way.
        assert!(!planner.force_retraction);

        planner.force_retract();
        planner.add_travel(Point::new(scale(10.0), 0));
        assert!(planner.paths[0].retract);
    }

    #[test]
    fn test_always_retract() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        planner.set_always_retract(true);
        planner.add_travel(Point::new(scale(10.0), 0));
        assert!(planner.paths[0].retract);
    }

    struct Detour;

    impl Comb for Detour {
        fn calc(&self, from: Point, to: Point, point_list: &mut Vec<Point>) -> bool {
            point_list.push((from + to) / 2 + Point::new(0, scale(5.0)));
            true
        }
        fn inside(&self, p: Point) -> bool {
            p.x >= 0
        }
        fn move_inside(&self, p: &mut Point, distance: Coord) -> bool {
            p.x += distance;
            true
        }
    }

    struct Blocked;

    impl Comb for Blocked {
        fn calc(&self, _from: Point, _to: Point, _point_list: &mut Vec<Point>) -> bool {
            false
        }
        fn inside(&self, _p: Point) -> bool {
            true
        }
        fn move_inside(&self, _p: &mut Point, _distance: Coord) -> bool {
            false
        }
    }

    #[test]
    fn test_combed_travel_inserts_waypoints() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        planner.set_comb(Some(Box::new(Detour)));
        planner.add_travel(Point::new(scale(10.0), 0));
        assert!(!planner.paths[0].retract);
        assert_eq!(planner.paths[0].points.len(), 2);
        assert_eq!(
            planner.paths[0].points[0],
            Point::new(scale(5.0), scale(5.0))
        );
    }

    #[test]
    fn test_blocked_comb_retracts_long_travel() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        planner.set_comb(Some(Box::new(Blocked)));
        planner.add_travel(Point::new(scale(10.0), 0));
        assert!(planner.paths[0].retract);
        assert_eq!(planner.paths[0].points.len(), 1);
    }

    #[test]
    fn test_move_inside_comb_boundary() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        planner.set_comb(Some(Box::new(Detour)));
        // Detour::inside is false for negative x.
        planner.last_position = Point::new(-scale(1.0), 0);
        planner.move_inside_comb_boundary(scale(0.6));
        // Applied twice: -1.0 + 0.6 + 0.6 = 0.2mm.
        assert_eq!(planner.last_position, Point::new(scale(0.2), 0));
        assert!(planner.paths.last().unwrap().done);
    }

    #[test]
    fn test_add_polygon_closes_ring() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        let ring = Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(scale(10.0), 0),
            Point::new(scale(10.0), scale(10.0)),
        ]);
        planner.add_polygon(&ring, 1, &wall);
        // Travel to start vertex, then three extrusion moves back around.
        assert_eq!(planner.paths.len(), 2);
        assert_eq!(planner.paths[0].points, vec![Point::new(scale(10.0), 0)]);
        assert_eq!(
            planner.paths[1].points,
            vec![
                Point::new(scale(10.0), scale(10.0)),
                Point::new(0, 0),
                Point::new(scale(10.0), 0),
            ]
        );
    }

    #[test]
    fn test_two_point_ring_does_not_close() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        let ring = Polygon::from_points(vec![Point::new(0, 0), Point::new(scale(10.0), 0)]);
        planner.add_polygon(&ring, 0, &wall);
        assert_eq!(planner.paths[1].points.len(), 1);
    }

    #[test]
    fn test_optimizer_orders_rings() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let fill = PathConfig::new(80, 400, "FILL");
        let rings = vec![
            Polygon::from_points(vec![
                Point::new(0, 0),
                Point::new(scale(5.0), 0),
                Point::new(scale(5.0), scale(5.0)),
            ]),
            Polygon::from_points(vec![
                Point::new(scale(20.0), 0),
                Point::new(scale(25.0), 0),
                Point::new(scale(25.0), scale(5.0)),
            ]),
        ];
        planner.add_polygons_by_optimizer(&rings, &fill, &mut SequentialOrder);
        // Two rings, each contributing one travel and one extrusion path.
        assert_eq!(planner.paths.len(), 4);
    }

    #[test]
    fn test_minimal_layer_time_factor() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        // 100mm travel at 100mm/s = 1s; 250mm extrusion at 50mm/s = 5s.
        let travel = PathConfig::travel(100);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        planner.travel_config = travel;
        planner.add_travel(Point::new(scale(100.0), 0));
        planner.add_extrusion_move(Point::new(scale(100.0), scale(250.0)), &wall);

        planner.force_minimal_layer_time(10.0, 1);
        assert_eq!(planner.extrude_speed_factor(), 55);
        // 5s / 0.55 + 1s, within rounding of the integer factor.
        assert!((planner.total_print_time() - (5.0 / 0.55 + 1.0)).abs() < 0.2);
    }

    #[test]
    fn test_minimal_layer_time_respects_speed_floor() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        planner.add_extrusion_move(Point::new(scale(50.0), 0), &wall); // 1s
        planner.force_minimal_layer_time(100.0, 25);
        // Unclamped factor would be 1/99; the 25mm/s floor wins.
        assert_eq!(planner.extrude_speed_factor(), 50);
        assert!(planner.extra_time() > 0.0);
    }

    #[test]
    fn test_minimal_layer_time_never_speeds_up() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        planner.add_extrusion_move(Point::new(scale(50.0), 0), &wall);
        planner.set_extrude_speed_factor(30);
        planner.force_minimal_layer_time(2.0, 1);
        // Already slower than the minimum requires: factor stays.
        assert_eq!(planner.extrude_speed_factor(), 30);
    }

    #[test]
    fn test_fast_layer_keeps_full_speed() {
        let mut gcode = memory_emitter();
        let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
        let wall = PathConfig::new(50, 400, "WALL-OUTER");
        planner.add_extrusion_move(Point::new(scale(500.0), 0), &wall); // 10s
        planner.force_minimal_layer_time(5.0, 1);
        assert_eq!(planner.extrude_speed_factor(), 100);
        assert_eq!(planner.total_print_time(), 10.0);
        assert_eq!(planner.extra_time(), 0.0);
    }

    #[test]
    fn test_write_gcode_emits_type_comment_once() {
        let mut gcode = memory_emitter();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let wall = PathConfig::new(50, 400, "WALL-OUTER");
            planner.add_travel(Point::new(scale(5.0), 0));
            planner.add_extrusion_move(Point::new(scale(10.0), 0), &wall);
            planner.force_new_path_start();
            planner.add_extrusion_move(Point::new(scale(15.0), 0), &wall);
            planner.write_gcode(false, 200).unwrap();
        }
        let lines = emitted(&gcode);
        let type_comments: Vec<_> = lines.iter().filter(|l| l.starts_with(";TYPE:")).collect();
        assert_eq!(type_comments, vec![";TYPE:WALL-OUTER"]);
    }

    #[test]
    fn test_write_gcode_scales_extrusion_speed() {
        let mut gcode = memory_emitter();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let wall = PathConfig::new(50, 400, "WALL-OUTER");
            planner.add_extrusion_move(Point::new(scale(10.0), 0), &wall);
            planner.set_extrude_speed_factor(50);
            planner.write_gcode(false, 200).unwrap();
        }
        let lines = emitted(&gcode);
        // 50mm/s at 50% = 25mm/s = F1500.
        assert!(lines.iter().any(|l| l.contains("F1500")));
    }

    #[test]
    fn test_small_move_coalescing() {
        let mut gcode = memory_emitter();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let skin = PathConfig::new(30, 200, "SKIN");
            for step in 1..=5 {
                planner.add_extrusion_move(Point::new(150 * step, 0), &skin);
                planner.force_new_path_start();
            }
            planner.write_gcode(false, 200).unwrap();
        }
        let lines = emitted(&gcode);
        let moves: Vec<_> = lines.iter().filter(|l| l.starts_with("G1")).collect();
        // Five tiny stabs coalesce into three moves: two averaged
        // midpoints and the preserved final point.
        assert_eq!(moves.len(), 3);
        assert!(moves[2].contains("X0.750"));
    }

    #[test]
    fn test_coalescing_skips_short_runs() {
        let mut gcode = memory_emitter();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let skin = PathConfig::new(30, 200, "SKIN");
            for step in 1..=2 {
                planner.add_extrusion_move(Point::new(150 * step, 0), &skin);
                planner.force_new_path_start();
            }
            planner.write_gcode(false, 200).unwrap();
        }
        let lines = emitted(&gcode);
        let moves: Vec<_> = lines.iter().filter(|l| l.starts_with("G1")).collect();
        assert_eq!(moves.len(), 2);
    }

    #[test]
    fn test_spiralize_ramps_z() {
        let mut gcode = memory_emitter();
        gcode.set_z(scale(0.2));
        gcode.write_move(Point::zero(), 150, 0).unwrap();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let wall = PathConfig::new(50, 400, "WALL-OUTER").with_spiralize(true);
            let ring = Polygon::from_points(vec![
                Point::new(0, 0),
                Point::new(scale(10.0), 0),
                Point::new(scale(10.0), scale(10.0)),
                Point::new(0, scale(10.0)),
            ]);
            planner.add_polygon(&ring, 0, &wall);
            planner.write_gcode(false, 200).unwrap();
        }
        let lines = emitted(&gcode);
        let z_values: Vec<f64> = lines
            .iter()
            .filter(|l| l.starts_with("G1") && l.contains(" Z"))
            .map(|l| {
                let at = l.find(" Z").unwrap();
                l[at + 2..]
                    .split_whitespace()
                    .next()
                    .unwrap()
                    .parse()
                    .unwrap()
            })
            .collect();
        // Z rises strictly across the perimeter and ends one layer up.
        assert!(z_values.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*z_values.last().unwrap(), 0.4);
    }

    #[test]
    fn test_only_last_spiralize_run_spirals() {
        let mut gcode = memory_emitter();
        gcode.set_z(scale(0.2));
        gcode.write_move(Point::zero(), 150, 0).unwrap();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let wall = PathConfig::new(50, 400, "WALL-OUTER").with_spiralize(true);
            planner.add_extrusion_move(Point::new(scale(10.0), 0), &wall);
            planner.force_new_path_start();
            planner.add_travel(Point::new(scale(20.0), 0));
            planner.add_extrusion_move(Point::new(scale(30.0), 0), &wall);
            planner.write_gcode(false, 200).unwrap();
        }
        let lines = emitted(&gcode);
        let spiral_moves: Vec<_> = lines
            .iter()
            .filter(|l| l.starts_with("G1") && l.contains(" Z"))
            .collect();
        // The first spiralize path was demoted; only the second ramps Z.
        assert_eq!(spiral_moves.len(), 1);
    }

    #[test]
    fn test_lift_head_spends_extra_time() {
        let mut gcode = memory_emitter();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let wall = PathConfig::new(50, 400, "WALL-OUTER");
            planner.add_extrusion_move(Point::new(scale(5.0), 0), &wall);
            planner.force_minimal_layer_time(30.0, 40);
            assert!(planner.extra_time() > 0.0);
            planner.write_gcode(true, 200).unwrap();
        }
        let lines = emitted(&gcode);
        assert!(lines.iter().any(|l| l.starts_with(";Small layer")));
        assert!(lines.iter().any(|l| l.starts_with("G4 P")));
        // The head lifted by 3mm.
        assert!(lines.iter().any(|l| l.contains("Z3.000")));
    }

    #[test]
    fn test_extruder_change_switches_on_replay() {
        let mut gcode = memory_emitter();
        {
            let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
            let wall = PathConfig::new(50, 400, "WALL-OUTER");
            planner.add_extrusion_move(Point::new(scale(10.0), 0), &wall);
            planner.set_extruder(1);
            planner.force_new_path_start();
            planner.add_extrusion_move(Point::new(scale(20.0), 0), &wall);
            planner.write_gcode(false, 200).unwrap();
        }
        assert_eq!(gcode.extruder_nr(), 1);
        let lines = emitted(&gcode);
        assert!(lines.iter().any(|l| l == "T1"));
    }
}
