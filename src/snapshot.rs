//! Read-only view of a tick for renderers and UI
//!
//! A snapshot copies out what a drawing layer needs (agent poses, flashes,
//! particles, lit trip-line segments, clusters, transport state) and is
//! serializable so a headless run can dump it as JSON.

use glam::Vec2;
use rand::Rng;
use serde::Serialize;

use crate::sim::state::{Rgb, VoiceKind};
use crate::sim::tick::{SimEvent, Simulation};
use crate::sim::trip_line::LineOrientation;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentView {
    pub id: u32,
    pub kind: VoiceKind,
    pub column: usize,
    pub pos: Vec2,
    pub heading: f32,
    pub active: bool,
    pub flash: bool,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleView {
    pub pos: Vec2,
    pub color: Rgb,
    /// Opacity in [0, 1]
    pub alpha: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineView {
    pub orientation: LineOrientation,
    pub enabled: bool,
    /// Line coordinate in world units
    pub position: f32,
    pub segments: usize,
    pub active: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterView {
    pub min: Vec2,
    pub max: Vec2,
    pub members: usize,
    pub kinds: Vec<VoiceKind>,
}

/// Everything a frame needs to draw
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub world: Vec2,
    pub playing: bool,
    pub bpm: f32,
    pub speed_factor: f32,
    pub last_step: Option<usize>,
    /// Enabled state per voice, in `VoiceKind::ALL` order
    pub voices: Vec<(VoiceKind, bool)>,
    pub agents: Vec<AgentView>,
    pub particles: Vec<ParticleView>,
    pub lines: Vec<LineView>,
    pub clusters: Vec<ClusterView>,
    pub events: Vec<SimEvent>,
}

impl FrameSnapshot {
    pub fn capture<R: Rng>(sim: &Simulation<R>) -> Self {
        let world = sim.world_extent();
        let clock = &sim.sequencer.clock;

        let agents = sim
            .agents
            .iter()
            .map(|a| AgentView {
                id: a.id,
                kind: a.kind,
                column: a.column,
                pos: a.pos,
                heading: a.heading,
                active: a.active,
                flash: a.flash,
                color: a.display_color(),
            })
            .collect();

        let particles = sim
            .particles
            .iter()
            .map(|p| ParticleView {
                pos: p.pos,
                color: p.color,
                alpha: p.life.clamp(0.0, 1.0),
            })
            .collect();

        let lines = sim
            .lines
            .iter()
            .map(|l| LineView {
                orientation: l.orientation,
                enabled: l.enabled,
                position: l.position(world),
                segments: l.segments(),
                active: l.active_segments(),
            })
            .collect();

        let clusters = sim
            .clusters
            .iter()
            .map(|c| ClusterView {
                min: c.min,
                max: c.max,
                members: c.members.len(),
                kinds: c.kinds.clone(),
            })
            .collect();

        Self {
            tick: sim.time_ticks,
            world,
            playing: clock.is_running(),
            bpm: clock.bpm(),
            speed_factor: clock.speed_factor(),
            last_step: sim.last_step,
            voices: VoiceKind::ALL
                .into_iter()
                .map(|k| (k, sim.toggles.is_enabled(k)))
                .collect(),
            agents,
            particles,
            lines,
            clusters,
            events: sim.events.clone(),
        }
    }

    /// Agents currently lit by the last step
    pub fn flashing(&self) -> impl Iterator<Item = &AgentView> {
        self.agents.iter().filter(|a| a.flash)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SilentInstrument;
    use crate::settings::Settings;
    use crate::sim::tick::{Command, TickInput, tick};

    #[test]
    fn test_capture_mirrors_simulation() {
        let mut sim = Simulation::new(Settings::default(), 11);
        let mut inst = SilentInstrument;
        let input = TickInput {
            commands: vec![Command::TogglePlay, Command::SetVoiceEnabled(VoiceKind::MelodicSustained, false)],
        };
        tick(&mut sim, &input, 16.0, &mut inst);

        let snap = FrameSnapshot::capture(&sim);
        assert_eq!(snap.tick, 1);
        assert!(snap.playing);
        assert_eq!(snap.agents.len(), VoiceKind::population());
        assert_eq!(snap.lines.len(), 2);
        assert_eq!(snap.lines[0].position, 400.0);
        assert_eq!(snap.lines[1].position, 300.0);
        assert_eq!(snap.voices[3], (VoiceKind::MelodicSustained, false));
        assert!(snap.events.contains(&SimEvent::PlayState { playing: true }));
        for (view, agent) in snap.agents.iter().zip(&sim.agents) {
            assert_eq!(view.pos, agent.pos);
            assert_eq!(view.active, agent.active);
        }
    }

    #[test]
    fn test_flash_uses_complementary_color() {
        let mut sim = Simulation::new(Settings::default(), 12);
        sim.agents[0].flash = true;
        sim.agents[0].base_color = [200, 100, 50];
        let snap = FrameSnapshot::capture(&sim);
        assert_eq!(snap.flashing().count(), 1);
        assert_eq!(snap.agents[0].color, [55, 155, 205]);
    }

    #[test]
    fn test_json_has_expected_fields() {
        let sim = Simulation::new(Settings::default(), 13);
        let json = FrameSnapshot::capture(&sim).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["agents"].as_array().map(Vec::len), Some(VoiceKind::population()));
        assert_eq!(value["playing"], serde_json::Value::Bool(false));
        assert_eq!(value["lines"][0]["orientation"], "Vertical");
    }
}
