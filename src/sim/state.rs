//! Sound agents and per-type grouping
//!
//! Agents are created once, grouped by voice, and never destroyed. Only the
//! `active` flag, the transient flash and the continuous motion state change
//! over a session.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::vector::{heading, limit, random_unit, wrap_position};
use crate::lerp_angle;
use crate::settings::{FlockTuning, WorldSettings};

/// Instrument voice an agent belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoiceKind {
    /// Short noise burst (hi-hat)
    PercussiveShort,
    /// Pitched thump (kick)
    PercussiveLong,
    /// Scheduled arpeggio notes (piano)
    MelodicPoly,
    /// Cycle-start chord (bass)
    MelodicSustained,
}

impl VoiceKind {
    pub const ALL: [VoiceKind; 4] = [
        VoiceKind::PercussiveShort,
        VoiceKind::PercussiveLong,
        VoiceKind::MelodicPoly,
        VoiceKind::MelodicSustained,
    ];

    /// Dense index for per-voice arrays
    pub fn index(self) -> usize {
        match self {
            VoiceKind::PercussiveShort => 0,
            VoiceKind::PercussiveLong => 1,
            VoiceKind::MelodicPoly => 2,
            VoiceKind::MelodicSustained => 3,
        }
    }

    /// Sequencer columns, and therefore agents, for this voice
    pub fn column_count(self) -> usize {
        match self {
            VoiceKind::PercussiveShort | VoiceKind::PercussiveLong => 8,
            VoiceKind::MelodicPoly | VoiceKind::MelodicSustained => 7,
        }
    }

    pub fn is_percussive(self) -> bool {
        matches!(self, VoiceKind::PercussiveShort | VoiceKind::PercussiveLong)
    }

    /// Home zone as a fraction of the world extent
    pub fn home_ratio(self) -> Vec2 {
        match self {
            VoiceKind::PercussiveShort => Vec2::new(0.75, 0.25),
            VoiceKind::PercussiveLong => Vec2::new(0.75, 0.75),
            VoiceKind::MelodicPoly => Vec2::new(0.5, 0.5),
            VoiceKind::MelodicSustained => Vec2::new(0.25, 0.75),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceKind::PercussiveShort => "hihat",
            VoiceKind::PercussiveLong => "kick",
            VoiceKind::MelodicPoly => "piano",
            VoiceKind::MelodicSustained => "bass",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hihat" | "hi-hat" | "percussive-short" => Some(VoiceKind::PercussiveShort),
            "kick" | "percussive-long" => Some(VoiceKind::PercussiveLong),
            "piano" | "melodic-poly" => Some(VoiceKind::MelodicPoly),
            "bass" | "melodic-sustained" => Some(VoiceKind::MelodicSustained),
            _ => None,
        }
    }

    /// Total agent count across all voices
    pub fn population() -> usize {
        Self::ALL.iter().map(|k| k.column_count()).sum()
    }
}

/// Global per-voice enable switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceToggles([bool; 4]);

impl Default for VoiceToggles {
    fn default() -> Self {
        Self([true; 4])
    }
}

impl VoiceToggles {
    pub fn is_enabled(&self, kind: VoiceKind) -> bool {
        self.0[kind.index()]
    }

    pub fn set(&mut self, kind: VoiceKind, enabled: bool) {
        self.0[kind.index()] = enabled;
    }

    /// Flip a voice and return its new state
    pub fn toggle(&mut self, kind: VoiceKind) -> bool {
        let slot = &mut self.0[kind.index()];
        *slot = !*slot;
        *slot
    }
}

/// Per-agent constants drawn once at creation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub max_speed: f32,
    pub align_strength: f32,
    pub cohesion_strength: f32,
    pub separation_strength: f32,
    pub dispersion_bias: f32,
    /// Offset into the drift noise field
    pub noise_phase: f32,
}

impl Personality {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            max_speed: rng.random_range(0.8..2.0),
            align_strength: rng.random_range(0.8..1.2),
            cohesion_strength: rng.random_range(0.5..1.0),
            separation_strength: rng.random_range(0.8..1.5),
            dispersion_bias: rng.random_range(0.0..0.03),
            noise_phase: rng.random_range(0.0..1000.0),
        }
    }
}

/// RGB color hint for the renderer
pub type Rgb = [u8; 3];

/// Complementary color, used while an agent is flashing
pub fn complementary(c: Rgb) -> Rgb {
    [255 - c[0], 255 - c[1], 255 - c[2]]
}

/// An autonomous agent that is both a voice slot and a visual subject
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundAgent {
    pub id: u32,
    pub kind: VoiceKind,
    /// Sequencer column in `[0, kind.column_count())`
    pub column: usize,
    pub active: bool,
    pub pos: Vec2,
    pub vel: Vec2,
    pub acc: Vec2,
    /// Low-passed steering force carried between ticks
    pub steering: Vec2,
    /// Smoothed display orientation (radians)
    pub heading: f32,
    /// Anchor point of this agent's voice
    pub home: Vec2,
    pub personality: Personality,
    pub base_color: Rgb,
    /// Set when the agent triggered on the current step
    pub flash: bool,
}

impl SoundAgent {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        id: u32,
        kind: VoiceKind,
        column: usize,
        home: Vec2,
        world: &WorldSettings,
    ) -> Self {
        let personality = Personality::random(rng);
        let pos = Vec2::new(
            rng.random_range(0.0..world.width),
            rng.random_range(0.0..world.height),
        );
        let vel = random_unit(rng) * personality.max_speed * 0.5;
        let active = rng.random_bool(f64::from(world.initial_active_chance));
        let base_color = [
            rng.random_range(50..=255),
            rng.random_range(50..=255),
            rng.random_range(50..=255),
        ];

        Self {
            id,
            kind,
            column,
            active,
            pos,
            vel,
            acc: Vec2::ZERO,
            steering: Vec2::ZERO,
            heading: heading(vel),
            home,
            personality,
            base_color,
            flash: false,
        }
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.vel.length()
    }

    pub fn toggle(&mut self) {
        self.active = !self.active;
    }

    /// Color the renderer should use right now
    pub fn display_color(&self) -> Rgb {
        if self.flash {
            complementary(self.base_color)
        } else {
            self.base_color
        }
    }

    /// Advance motion by `dt` reference frames
    pub fn integrate(&mut self, dt: f32, world: Vec2, tuning: &FlockTuning) {
        self.vel += self.acc * dt;
        self.vel = limit(self.vel, self.personality.max_speed);
        self.pos += self.vel * dt;
        self.acc = Vec2::ZERO;

        if self.vel.length() > tuning.heading_epsilon {
            let blend = (tuning.heading_smoothing * dt).min(1.0);
            self.heading = lerp_angle(self.heading, heading(self.vel), blend);
        }

        self.pos = wrap_position(self.pos, world);
    }
}

/// Build the full population: one agent per (voice, column)
pub fn spawn_population<R: Rng + ?Sized>(rng: &mut R, world: &WorldSettings) -> Vec<SoundAgent> {
    let extent = Vec2::new(world.width, world.height);
    let mut agents = Vec::with_capacity(VoiceKind::population());
    for kind in VoiceKind::ALL {
        let home = kind.home_ratio() * extent;
        for column in 0..kind.column_count() {
            let id = agents.len() as u32;
            agents.push(SoundAgent::new(rng, id, kind, column, home, world));
        }
    }
    agents
}

/// Agent indices partitioned by voice, in column order
#[derive(Debug, Clone, Default)]
pub struct TypeGroups {
    members: [Vec<usize>; 4],
}

impl TypeGroups {
    pub fn partition(agents: &[SoundAgent]) -> Self {
        let mut groups = Self::default();
        for (i, agent) in agents.iter().enumerate() {
            groups.members[agent.kind.index()].push(i);
        }
        for list in &mut groups.members {
            list.sort_by_key(|&i| agents[i].column);
        }
        groups
    }

    pub fn get(&self, kind: VoiceKind) -> &[usize] {
        &self.members[kind.index()]
    }

    /// Index of the agent occupying `(kind, column)`
    pub fn agent_at(&self, agents: &[SoundAgent], kind: VoiceKind, column: usize) -> Option<usize> {
        self.get(kind)
            .iter()
            .copied()
            .find(|&i| agents[i].column == column)
    }
}

/// A short-lived visual spark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    pub pos: Vec2,
    pub vel: Vec2,
    pub color: Rgb,
    /// 1.0 when emitted, removed at 0
    pub life: f32,
}

/// Life lost per reference frame
pub const PARTICLE_FADE: f32 = 10.0 / 255.0;
/// Velocity retained per reference frame
pub const PARTICLE_DRAG: f32 = 0.95;

impl Particle {
    pub fn emit<R: Rng + ?Sized>(rng: &mut R, pos: Vec2, color: Rgb) -> Self {
        Self {
            pos,
            vel: random_unit(rng) * rng.random_range(1.0..3.0),
            color,
            life: 1.0,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.pos += self.vel * dt;
        self.vel *= PARTICLE_DRAG.powf(dt);
        self.life -= PARTICLE_FADE * dt;
    }

    pub fn is_alive(&self) -> bool {
        self.life > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_population_has_one_agent_per_column() {
        let mut rng = Pcg32::seed_from_u64(7);
        let agents = spawn_population(&mut rng, &WorldSettings::default());
        assert_eq!(agents.len(), 30);

        let groups = TypeGroups::partition(&agents);
        for kind in VoiceKind::ALL {
            let mut cols: Vec<usize> = groups.get(kind).iter().map(|&i| agents[i].column).collect();
            cols.sort_unstable();
            assert_eq!(cols, (0..kind.column_count()).collect::<Vec<_>>(), "{kind:?}");
            for &i in groups.get(kind) {
                assert_eq!(agents[i].kind, kind);
            }
        }
    }

    #[test]
    fn test_agent_at_finds_column() {
        let mut rng = Pcg32::seed_from_u64(11);
        let agents = spawn_population(&mut rng, &WorldSettings::default());
        let groups = TypeGroups::partition(&agents);
        let i = groups.agent_at(&agents, VoiceKind::MelodicPoly, 4).unwrap();
        assert_eq!(agents[i].kind, VoiceKind::MelodicPoly);
        assert_eq!(agents[i].column, 4);
        assert!(groups.agent_at(&agents, VoiceKind::MelodicPoly, 7).is_none());
    }

    #[test]
    fn test_home_zones_fixed_per_voice() {
        let mut rng = Pcg32::seed_from_u64(5);
        let agents = spawn_population(&mut rng, &WorldSettings::default());
        for a in &agents {
            assert_eq!(a.home, a.kind.home_ratio() * Vec2::new(800.0, 600.0));
        }
    }

    #[test]
    fn test_integrate_clamps_speed_and_wraps() {
        let mut rng = Pcg32::seed_from_u64(1);
        let world = WorldSettings::default();
        let mut agent = SoundAgent::new(&mut rng, 0, VoiceKind::PercussiveLong, 0, Vec2::ZERO, &world);
        agent.pos = Vec2::new(799.5, 0.2);
        agent.vel = Vec2::new(1.0, -1.0);
        agent.acc = Vec2::new(50.0, -50.0);

        agent.integrate(1.0, Vec2::new(800.0, 600.0), &FlockTuning::default());

        assert!(agent.speed() <= agent.personality.max_speed + 1e-5);
        assert!(agent.pos.x >= 0.0 && agent.pos.x < 800.0);
        assert!(agent.pos.y >= 0.0 && agent.pos.y < 600.0);
        // Crossed both edges, so it lands near the opposite corners
        assert!(agent.pos.x < 10.0);
        assert!(agent.pos.y > 590.0);
        assert_eq!(agent.acc, Vec2::ZERO);
    }

    #[test]
    fn test_heading_holds_at_rest() {
        let mut rng = Pcg32::seed_from_u64(2);
        let world = WorldSettings::default();
        let mut agent = SoundAgent::new(&mut rng, 0, VoiceKind::MelodicPoly, 0, Vec2::ZERO, &world);
        agent.heading = 1.0;
        agent.vel = Vec2::new(0.001, -0.001);
        agent.integrate(1.0, Vec2::new(800.0, 600.0), &FlockTuning::default());
        assert_eq!(agent.heading, 1.0);
    }

    #[test]
    fn test_voice_toggles() {
        let mut t = VoiceToggles::default();
        assert!(t.is_enabled(VoiceKind::MelodicPoly));
        assert!(!t.toggle(VoiceKind::MelodicPoly));
        assert!(!t.is_enabled(VoiceKind::MelodicPoly));
        assert!(t.is_enabled(VoiceKind::MelodicSustained));
    }

    #[test]
    fn test_voice_kind_from_str() {
        assert_eq!(VoiceKind::from_str("Kick"), Some(VoiceKind::PercussiveLong));
        assert_eq!(VoiceKind::from_str("melodic-poly"), Some(VoiceKind::MelodicPoly));
        assert_eq!(VoiceKind::from_str("tuba"), None);
    }

    #[test]
    fn test_particle_fades_out() {
        let mut rng = Pcg32::seed_from_u64(9);
        let mut p = Particle::emit(&mut rng, Vec2::ZERO, [100, 100, 100]);
        let mut frames = 0;
        while p.is_alive() {
            p.update(1.0);
            frames += 1;
        }
        assert!((25..=27).contains(&frames));
    }
}
