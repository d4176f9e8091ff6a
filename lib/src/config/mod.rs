//! Motion-category descriptors.
//!
//! Every planned path carries a [`PathConfig`] naming its motion category
//! (travel, wall, infill, ...) together with the nominal speed and line
//! width used to emit it. Configs are immutable once built and outlive
//! every planner referring to them. A line width of zero marks a travel
//! config: such a path never extrudes.

use crate::Coord;
use serde::{Deserialize, Serialize};

/// Immutable descriptor for one motion category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Nominal speed in mm/s.
    pub speed: i32,
    /// Line width in scaled units. Zero marks a travel config.
    pub line_width: Coord,
    /// Whether paths with this config ramp Z across the perimeter.
    pub spiralize: bool,
    /// Short display name, emitted in `;TYPE:` comments.
    pub name: String,
}

impl PathConfig {
    /// Create a new config.
    pub fn new(speed: i32, line_width: Coord, name: &str) -> Self {
        Self {
            speed,
            line_width,
            spiralize: false,
            name: name.to_string(),
        }
    }

    /// Create a travel config (zero line width) at the given speed.
    pub fn travel(speed: i32) -> Self {
        Self::new(speed, 0, "travel")
    }

    /// Enable spiralize for this config.
    pub fn with_spiralize(mut self, spiralize: bool) -> Self {
        self.spiralize = spiralize;
        self
    }

    /// Whether this config describes pure travel.
    #[inline]
    pub fn is_travel(&self) -> bool {
        self.line_width == 0
    }
}

/// The conventional set of motion categories one layer uses.
///
/// The surrounding slicer builds one of these per print and hands the
/// individual configs to the planner as it enqueues walls, infill, skin
/// and support.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathConfigSet {
    pub travel: PathConfig,
    pub inset0: PathConfig,
    pub inset1: PathConfig,
    pub infill: PathConfig,
    pub skin: PathConfig,
    pub support: PathConfig,
}

impl PathConfigSet {
    /// Build a config set from per-category speeds and a shared line width.
    pub fn new(
        travel_speed: i32,
        outer_wall_speed: i32,
        inner_wall_speed: i32,
        infill_speed: i32,
        skin_speed: i32,
        support_speed: i32,
        line_width: Coord,
    ) -> Self {
        Self {
            travel: PathConfig::travel(travel_speed),
            inset0: PathConfig::new(outer_wall_speed, line_width, "WALL-OUTER"),
            inset1: PathConfig::new(inner_wall_speed, line_width, "WALL-INNER"),
            infill: PathConfig::new(infill_speed, line_width, "FILL"),
            skin: PathConfig::new(skin_speed, line_width, "SKIN"),
            support: PathConfig::new(support_speed, line_width, "SUPPORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_travel_config() {
        let config = PathConfig::travel(150);
        assert!(config.is_travel());
        assert_eq!(config.speed, 150);
        assert_eq!(config.name, "travel");
    }

    #[test]
    fn test_spiralize_builder() {
        let config = PathConfig::new(50, 400, "WALL-OUTER").with_spiralize(true);
        assert!(config.spiralize);
        assert!(!config.is_travel());
    }

    #[test]
    fn test_config_set_names() {
        let set = PathConfigSet::new(150, 50, 60, 80, 30, 60, 400);
        assert_eq!(set.inset0.name, "WALL-OUTER");
        assert_eq!(set.skin.name, "SKIN");
        assert!(set.travel.is_travel());
        assert!(!set.infill.is_travel());
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = PathConfig::new(50, 400, "FILL");
        let json = serde_json::to_string(&config).unwrap();
        let back: PathConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
