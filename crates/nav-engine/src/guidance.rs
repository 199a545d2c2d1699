//! Voice guidance.
//!
//! [`VoiceGuidance`] is fed the current maneuver every tick and decides,
//! idempotently, whether an instruction should be spoken. Speech itself is
//! delegated to a [`VoiceSink`].

use std::collections::HashSet;

use convoy_schemas::{LatLng, ManeuverType, Modifier};
use tracing::{debug, info};

use crate::config::{AnnouncementBandConfig, GuidanceConfig};
use crate::geo::haversine_m;
use crate::maneuver::{LegProgress, Maneuver};

/// Band label used for "continue straight" announcements.
const CONTINUE_BAND: &str = "continue";

/// Identity of one spoken instruction: maneuver location rounded to ~1 m plus band.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnouncementKey {
    lat_e5: i64,
    lng_e5: i64,
    band: String,
}

impl AnnouncementKey {
    /// Create a key for a maneuver location and band.
    pub fn new(location: LatLng, band: impl Into<String>) -> Self {
        Self {
            lat_e5: (location.latitude * 1e5).round() as i64,
            lng_e5: (location.longitude * 1e5).round() as i64,
            band: band.into(),
        }
    }

    /// Band name of this key.
    pub fn band(&self) -> &str {
        &self.band
    }
}

/// Instruction ready to be spoken.
#[derive(Debug, Clone, PartialEq)]
pub struct Announcement {
    /// Spoken text.
    pub text: String,
    /// Key that marks the announcement as spoken.
    pub key: AnnouncementKey,
    /// Maneuver the announcement describes.
    pub maneuver: ManeuverType,
}

/// Output side of guidance: text-to-speech, a log, a test recorder.
pub trait VoiceSink: Send + Sync {
    fn speak(&self, announcement: &Announcement);
}

/// Writes announcements to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogVoiceSink;

impl VoiceSink for LogVoiceSink {
    fn speak(&self, announcement: &Announcement) {
        info!(band = announcement.key.band(), "{}", announcement.text);
    }
}

#[derive(Debug, Clone)]
struct SpokenPoint {
    maneuver: ManeuverType,
    band: String,
    location: LatLng,
}

/// Announcement state for one navigation session.
#[derive(Debug, Clone)]
pub struct VoiceGuidance {
    config: GuidanceConfig,
    spoken: HashSet<AnnouncementKey>,
    history: Vec<SpokenPoint>,
}

impl Default for VoiceGuidance {
    fn default() -> Self {
        Self::new(GuidanceConfig::default())
    }
}

impl VoiceGuidance {
    /// Create guidance with nothing spoken yet.
    pub fn new(config: GuidanceConfig) -> Self {
        Self {
            config,
            spoken: HashSet::new(),
            history: Vec::new(),
        }
    }

    /// Guidance tunables in use.
    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    /// Forget everything spoken. Called when a navigation session starts.
    pub fn reset(&mut self) {
        self.spoken.clear();
        self.history.clear();
    }

    /// Check whether an announcement key has already been spoken.
    pub fn has_spoken(&self, key: &AnnouncementKey) -> bool {
        self.spoken.contains(key)
    }

    /// Decide whether anything should be spoken for the current tick.
    pub fn update(
        &mut self,
        maneuver: Option<&Maneuver>,
        leg: Option<LegProgress>,
    ) -> Option<Announcement> {
        let maneuver = maneuver?;
        if maneuver.kind == ManeuverType::Depart {
            return None;
        }

        if let Some(band) = self.config.band_for(maneuver.distance_remaining).cloned() {
            return self.announce_band(maneuver, &band);
        }

        let leg_has_room = leg.is_none_or(|leg| leg.remaining_m > self.config.continue_leg_min_m);
        if maneuver.distance_remaining > self.config.continue_straight_min_m && leg_has_room {
            let key = AnnouncementKey::new(maneuver.location, CONTINUE_BAND);
            if self.spoken.insert(key.clone()) {
                return Some(Announcement {
                    text: format!(
                        "Continue straight for {}",
                        format_kilometers(maneuver.distance_remaining)
                    ),
                    key,
                    maneuver: ManeuverType::Continue,
                });
            }
        }
        None
    }

    fn announce_band(
        &mut self,
        maneuver: &Maneuver,
        band: &AnnouncementBandConfig,
    ) -> Option<Announcement> {
        let key = AnnouncementKey::new(maneuver.location, band.label.as_str());
        if !self.spoken.insert(key.clone()) {
            return None;
        }

        let repeat = self.history.iter().any(|point| {
            point.maneuver == maneuver.kind
                && point.band == band.label
                && haversine_m(point.location, maneuver.location) < self.config.repeat_suppression_m
        });
        if repeat {
            debug!(
                maneuver = maneuver.kind.as_str(),
                band = band.label.as_str(),
                "Suppressing repeated instruction"
            );
            return None;
        }

        self.history.push(SpokenPoint {
            maneuver: maneuver.kind,
            band: band.label.clone(),
            location: maneuver.location,
        });

        Some(Announcement {
            text: phrase(maneuver, band),
            key,
            maneuver: maneuver.kind,
        })
    }
}

fn phrase(maneuver: &Maneuver, band: &AnnouncementBandConfig) -> String {
    if band.immediate {
        if maneuver.kind == ManeuverType::Arrive {
            return "You have arrived at your destination".to_string();
        }
        return format!("{} now", capitalize(&action(maneuver)));
    }
    let meters = ((maneuver.distance_remaining / 10.0).round() * 10.0) as u32;
    format!("In {meters} meters, {}", action(maneuver))
}

fn action(maneuver: &Maneuver) -> String {
    let direction = maneuver.modifier.map(Modifier::as_phrase);
    match maneuver.kind {
        ManeuverType::Arrive => "you will arrive at your destination".to_string(),
        kind if kind.is_roundabout() => match maneuver.exit_number {
            Some(exit) => format!("at the roundabout, take the {} exit", ordinal(exit)),
            None => "enter the roundabout".to_string(),
        },
        ManeuverType::ExitRoundabout | ManeuverType::ExitRotary => {
            "exit the roundabout".to_string()
        }
        ManeuverType::TurnRight => "turn right".to_string(),
        ManeuverType::TurnLeft => "turn left".to_string(),
        ManeuverType::UTurn => "make a U-turn".to_string(),
        ManeuverType::Merge => "merge".to_string(),
        ManeuverType::OnRamp => "take the ramp".to_string(),
        ManeuverType::OffRamp => "take the exit".to_string(),
        ManeuverType::Fork => match maneuver.modifier {
            Some(Modifier::Left | Modifier::SlightLeft | Modifier::SharpLeft) => {
                "keep left at the fork".to_string()
            }
            Some(Modifier::Right | Modifier::SlightRight | Modifier::SharpRight) => {
                "keep right at the fork".to_string()
            }
            _ => "continue at the fork".to_string(),
        },
        _ => direction.unwrap_or("continue").to_string(),
    }
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_kilometers(meters: f64) -> String {
    let km = meters / 1000.0;
    let rounded = (km * 10.0).round() / 10.0;
    if (rounded - 1.0).abs() < f64::EPSILON {
        "1 kilometer".to_string()
    } else if rounded.fract().abs() < f64::EPSILON {
        format!("{} kilometers", rounded as u64)
    } else {
        format!("{rounded:.1} kilometers")
    }
}
