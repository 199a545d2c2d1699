//! Tunable constants for simulation and guidance.

use serde::{Deserialize, Serialize};

/// Speed limit shown while driving faster than `above_kmh`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedLimitBand {
    /// Band applies while driving faster than this.
    pub above_kmh: f64,
    /// Speed limit shown inside the band.
    pub limit_kmh: u32,
}

/// Tunables for the motion simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Target speed on straight road.
    pub cruise_speed_kmh: f64,
    /// Target speed when a corner is ahead.
    pub corner_speed_kmh: f64,
    /// Bearing change between consecutive segments that counts as a corner.
    pub corner_threshold_deg: f64,
    /// Number of upcoming polyline vertices checked for corners.
    pub corner_lookahead_vertices: usize,
    /// m/s².
    pub acceleration_mps2: f64,
    /// m/s².
    pub deceleration_mps2: f64,
    /// Ticks spaced further apart than this are skipped.
    pub max_tick_gap_secs: f64,
    /// Remaining distance in a leg at which the vehicle pauses at the stop.
    pub leg_pause_distance_m: f64,
    /// Checked in order, first match wins.
    pub speed_limit_bands: Vec<SpeedLimitBand>,
    /// Speed limit shown when no band matches.
    pub fallback_speed_limit_kmh: u32,
    /// Floor used when estimating time to the next stop.
    pub min_eta_speed_mps: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cruise_speed_kmh: 50.0,
            corner_speed_kmh: 20.0,
            corner_threshold_deg: 20.0,
            corner_lookahead_vertices: 3,
            acceleration_mps2: 2.0,
            deceleration_mps2: 4.0,
            max_tick_gap_secs: 0.5,
            leg_pause_distance_m: 50.0,
            speed_limit_bands: vec![
                SpeedLimitBand {
                    above_kmh: 90.0,
                    limit_kmh: 130,
                },
                SpeedLimitBand {
                    above_kmh: 70.0,
                    limit_kmh: 90,
                },
                SpeedLimitBand {
                    above_kmh: 40.0,
                    limit_kmh: 50,
                },
            ],
            fallback_speed_limit_kmh: 30,
            min_eta_speed_mps: 5.0,
        }
    }
}

impl SimulationConfig {
    /// Cruise speed in meters per second.
    pub fn cruise_speed_mps(&self) -> f64 {
        self.cruise_speed_kmh / 3.6
    }

    /// Corner speed in meters per second.
    pub fn corner_speed_mps(&self) -> f64 {
        self.corner_speed_kmh / 3.6
    }

    /// Cosmetic speed-limit signal derived from the current speed.
    pub fn speed_limit_for(&self, speed_kmh: f64) -> u32 {
        self.speed_limit_bands
            .iter()
            .find(|band| speed_kmh > band.above_kmh)
            .map_or(self.fallback_speed_limit_kmh, |band| band.limit_kmh)
    }
}

/// Distance window in which an instruction is spoken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementBandConfig {
    /// Band name, part of the announcement key.
    pub label: String,
    /// Lower distance bound in meters.
    pub min_m: f64,
    /// Upper distance bound in meters.
    pub max_m: f64,
    /// Near bands say "<action> now" instead of "In N meters".
    #[serde(default)]
    pub immediate: bool,
}

impl AnnouncementBandConfig {
    fn new(label: &str, min_m: f64, max_m: f64, immediate: bool) -> Self {
        Self {
            label: label.to_string(),
            min_m,
            max_m,
            immediate,
        }
    }

    /// Check whether a distance falls inside this band.
    pub fn contains(&self, distance_m: f64) -> bool {
        distance_m >= self.min_m && distance_m <= self.max_m
    }
}

/// Tunables for maneuver detection and voice guidance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Distance bands in which an instruction is spoken.
    pub bands: Vec<AnnouncementBandConfig>,
    /// Same maneuver type is not re-spoken within this distance of a spoken point.
    pub repeat_suppression_m: f64,
    /// "Continue straight" fires only when the next maneuver is further than this.
    pub continue_straight_min_m: f64,
    /// ...and the current leg has more than this left.
    pub continue_leg_min_m: f64,
    /// Synthesize an arrival once the remaining route drops below this.
    pub arrive_threshold_m: f64,
    /// Geometric fallback: bearing change that counts as a turn.
    pub turn_threshold_deg: f64,
    /// Geometric fallback: bearing change that counts as a U-turn.
    pub u_turn_threshold_deg: f64,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                AnnouncementBandConfig::new("far", 550.0, 770.0, false),
                AnnouncementBandConfig::new("mid", 300.0, 520.0, false),
                AnnouncementBandConfig::new("near", 150.0, 270.0, false),
                AnnouncementBandConfig::new("approach", 60.0, 120.0, false),
                AnnouncementBandConfig::new("now", 0.0, 35.0, true),
            ],
            repeat_suppression_m: 80.0,
            continue_straight_min_m: 1000.0,
            continue_leg_min_m: 50.0,
            arrive_threshold_m: 200.0,
            turn_threshold_deg: 20.0,
            u_turn_threshold_deg: 135.0,
        }
    }
}

impl GuidanceConfig {
    /// Band that contains `distance_m`, if any.
    pub fn band_for(&self, distance_m: f64) -> Option<&AnnouncementBandConfig> {
        self.bands.iter().find(|band| band.contains(distance_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_limit_bands() {
        let config = SimulationConfig::default();
        assert_eq!(config.speed_limit_for(95.0), 130);
        assert_eq!(config.speed_limit_for(90.0), 90);
        assert_eq!(config.speed_limit_for(71.0), 90);
        assert_eq!(config.speed_limit_for(50.0), 50);
        assert_eq!(config.speed_limit_for(40.0), 30);
        assert_eq!(config.speed_limit_for(0.0), 30);
    }

    #[test]
    fn test_band_lookup() {
        let config = GuidanceConfig::default();
        assert_eq!(config.band_for(600.0).map(|b| b.label.as_str()), Some("far"));
        assert_eq!(config.band_for(30.0).map(|b| b.label.as_str()), Some("now"));
        assert!(config.band_for(540.0).is_none());
        assert!(config.band_for(40.0).is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() -> Result<(), serde_json::Error> {
        let config: SimulationConfig = serde_json::from_str(r#"{"cruise_speed_kmh": 80.0}"#)?;
        assert!((config.cruise_speed_kmh - 80.0).abs() < f64::EPSILON);
        assert_eq!(config.speed_limit_bands.len(), 3);
        Ok(())
    }
}
