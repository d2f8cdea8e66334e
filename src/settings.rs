//! Simulation settings and tunables
//!
//! Loaded from an optional JSON file. Out-of-range values are clamped by
//! [`Settings::sanitized`] rather than rejected so playback never stops on a
//! bad slider value.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{WORLD_HEIGHT, WORLD_WIDTH};

pub const MIN_BPM: f32 = 20.0;
pub const MAX_BPM: f32 = 300.0;
pub const MIN_SPEED_FACTOR: f32 = 0.5;
pub const MAX_SPEED_FACTOR: f32 = 2.0;
pub const MIN_FREQUENCY_RATIO: f32 = 1.0;
pub const MAX_FREQUENCY_RATIO: f32 = 2.0;
pub const MAX_SEGMENTS: usize = 64;

/// Errors raised while reading or writing a settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Clamp `value` into `[min, max]`, keeping `fallback` for NaN
#[inline]
pub fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

/// World extent and agent population options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub width: f32,
    pub height: f32,
    /// Visual diameter of an agent; pointer hits use `agent_size / 2 + 5`
    pub agent_size: f32,
    /// Chance that an agent starts active
    pub initial_active_chance: f32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH,
            height: WORLD_HEIGHT,
            agent_size: 35.0,
            initial_active_chance: 0.4,
        }
    }
}

impl WorldSettings {
    pub fn hit_radius(&self) -> f32 {
        self.agent_size / 2.0 + 5.0
    }
}

/// Tempo controls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoSettings {
    pub bpm: f32,
    /// External tempo multiplier (slider)
    pub speed_factor: f32,
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            speed_factor: 1.0,
        }
    }
}

/// Flocking constants. One canonical set; every value is tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockTuning {
    /// Same-type neighbors closer than this contribute to flocking
    pub perception_radius: f32,
    /// Floor on the separation distance so inverse-square stays finite
    pub min_separation_distance: f32,
    pub cohesion_max_force: f32,
    pub separation_max_force: f32,
    /// Neighbor count that corresponds to a density of 1.0
    pub density_normalizer: f32,
    /// Below this density the home pull is strong
    pub sparse_density: f32,
    /// Above this density a random release impulse is added
    pub dense_density: f32,
    pub sparse_home_pull: f32,
    pub settled_home_pull: f32,
    pub jitter: f32,
    pub drift: f32,
    /// Noise-time advance per elapsed millisecond
    pub drift_time_scale: f32,
    pub center_avoidance: f32,
    /// Blend factor of the steering low-pass filter
    pub smoothing: f32,
    pub heading_smoothing: f32,
    /// Minimum speed for the heading to follow velocity
    pub heading_epsilon: f32,
}

impl Default for FlockTuning {
    fn default() -> Self {
        Self {
            perception_radius: 60.0,
            min_separation_distance: 1.0,
            cohesion_max_force: 0.05,
            separation_max_force: 0.5,
            density_normalizer: 10.0,
            sparse_density: 0.3,
            dense_density: 0.7,
            sparse_home_pull: 0.08,
            settled_home_pull: 0.02,
            jitter: 0.3,
            drift: 0.05,
            drift_time_scale: 0.0003,
            center_avoidance: 0.005,
            smoothing: 0.12,
            heading_smoothing: 0.2,
            heading_epsilon: 0.05,
        }
    }
}

/// One movable trip-line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    pub enabled: bool,
    /// Position of the line as a fraction of the world extent
    pub ratio: f32,
    pub segments: usize,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ratio: 0.5,
            segments: 12,
        }
    }
}

/// Trip-line detector options shared by both orientations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripLineSettings {
    pub vertical: LineSettings,
    pub horizontal: LineSettings,
    /// Frequency of the middle segment (Hz)
    pub reference_frequency: f32,
    /// Frequency ratio between adjacent segments
    pub frequency_ratio: f32,
    /// Agents within this distance of the line on both ends of a step count as dwelling
    pub dwell_band: f32,
    pub intensity: f32,
}

impl Default for TripLineSettings {
    fn default() -> Self {
        Self {
            vertical: LineSettings::default(),
            horizontal: LineSettings::default(),
            reference_frequency: 220.0,
            frequency_ratio: 2f32.powf(1.0 / 12.0),
            dwell_band: 2.0,
            intensity: 0.35,
        }
    }
}

/// Mixed-instrument cluster detection options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    pub radius: f32,
    pub min_members: usize,
    pub min_types: usize,
    /// Dispatch a note when a cluster gains new members
    pub voice: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            radius: 50.0,
            min_members: 3,
            min_types: 2,
            voice: true,
        }
    }
}

/// Particle emission options (visual only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSettings {
    pub enabled: bool,
    pub per_trigger: usize,
    pub per_chord_note: usize,
    pub max: usize,
}

impl Default for ParticleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            per_trigger: 5,
            per_chord_note: 6,
            max: 256,
        }
    }
}

/// All simulation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub world: WorldSettings,
    pub tempo: TempoSettings,
    pub flock: FlockTuning,
    pub trip_lines: TripLineSettings,
    pub clusters: ClusterSettings,
    pub particles: ParticleSettings,
}

impl Settings {
    /// Clamp every value into its usable range
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings::default();

        let w = &mut self.world;
        w.width = clamp_or(w.width, 1.0, f32::MAX, defaults.world.width);
        w.height = clamp_or(w.height, 1.0, f32::MAX, defaults.world.height);
        w.agent_size = clamp_or(w.agent_size, 0.0, w.width.min(w.height), defaults.world.agent_size);
        w.initial_active_chance = clamp_or(w.initial_active_chance, 0.0, 1.0, 0.4);

        let t = &mut self.tempo;
        t.bpm = clamp_or(t.bpm, MIN_BPM, MAX_BPM, defaults.tempo.bpm);
        t.speed_factor = clamp_or(t.speed_factor, MIN_SPEED_FACTOR, MAX_SPEED_FACTOR, 1.0);

        let f = &mut self.flock;
        f.perception_radius = f.perception_radius.max(0.0);
        f.min_separation_distance = f.min_separation_distance.max(1e-3);
        f.density_normalizer = f.density_normalizer.max(1.0);
        f.smoothing = clamp_or(f.smoothing, 0.0, 1.0, defaults.flock.smoothing);
        f.heading_smoothing = clamp_or(f.heading_smoothing, 0.0, 1.0, defaults.flock.heading_smoothing);

        let tl = &mut self.trip_lines;
        for line in [&mut tl.vertical, &mut tl.horizontal] {
            line.ratio = clamp_or(line.ratio, 0.0, 1.0, 0.5);
            line.segments = line.segments.clamp(1, MAX_SEGMENTS);
        }
        tl.reference_frequency = clamp_or(tl.reference_frequency, 20.0, 2000.0, 220.0);
        tl.frequency_ratio = clamp_or(
            tl.frequency_ratio,
            MIN_FREQUENCY_RATIO,
            MAX_FREQUENCY_RATIO,
            defaults.trip_lines.frequency_ratio,
        );
        tl.dwell_band = tl.dwell_band.max(0.0);
        tl.intensity = clamp_or(tl.intensity, 0.0, 1.0, defaults.trip_lines.intensity);

        let c = &mut self.clusters;
        c.radius = c.radius.max(0.0);
        c.min_members = c.min_members.max(1);
        c.min_types = c.min_types.max(1);

        self
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = serde_json::from_str(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings.sanitized())
    }

    /// Load settings, falling back to defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load(p).unwrap_or_else(|err| {
                log::warn!("{err}; using default settings");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }
}
