//! Per-voice flocking
//!
//! Each agent steers from its same-voice neighbors (alignment, cohesion,
//! inverse-square separation) plus environmental forces that always apply:
//! home pull, density release jitter, coherent drift, dispersion away from
//! home, and a faint push away from the scene center.
//!
//! Forces are computed for a whole group before any agent is touched, so
//! neighbors are read-only to each other during a tick.

use glam::Vec2;
use noise::{NoiseFn, Perlin};
use rand::Rng;

use super::state::SoundAgent;
use super::vector::{from_angle, limit, random_unit, with_magnitude};
use crate::settings::FlockTuning;

/// Breakdown of one agent's steering for a tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SteeringForces {
    pub align: Vec2,
    pub cohesion: Vec2,
    pub separation: Vec2,
    pub environment: Vec2,
    /// Same-voice agents inside the perception radius
    pub neighbors: usize,
}

impl SteeringForces {
    /// Target force the smoothed steering is pulled toward
    pub fn combined(&self) -> Vec2 {
        self.align + self.cohesion + self.separation + self.environment
    }
}

/// Shared per-tick inputs
#[derive(Debug, Clone, Copy)]
pub struct FlockFrame<'a> {
    pub tuning: &'a FlockTuning,
    pub world_center: Vec2,
    /// Session time driving the drift noise
    pub elapsed_ms: f64,
}

/// Flocking engine; owns the coherent noise field used for drift
#[derive(Debug, Clone)]
pub struct FlockEngine {
    noise: Perlin,
}

impl FlockEngine {
    pub fn new(seed: u32) -> Self {
        Self {
            noise: Perlin::new(seed),
        }
    }

    /// Smooth wandering direction for an agent at the given time
    pub fn drift(&self, agent: &SoundAgent, frame: &FlockFrame) -> Vec2 {
        let t = f64::from(agent.personality.noise_phase)
            + frame.elapsed_ms * f64::from(frame.tuning.drift_time_scale);
        let n = self.noise.get([t, 0.5]) as f32;
        from_angle(n * std::f32::consts::TAU) * frame.tuning.drift
    }

    /// Steering for `agents[idx]` given its voice group (which may include itself)
    pub fn steer<R: Rng + ?Sized>(
        &self,
        idx: usize,
        agents: &[SoundAgent],
        group: &[usize],
        frame: &FlockFrame,
        rng: &mut R,
    ) -> SteeringForces {
        let tuning = frame.tuning;
        let me = &agents[idx];
        let p = &me.personality;

        let mut total = 0usize;
        let mut align = Vec2::ZERO;
        let mut cohesion = Vec2::ZERO;
        let mut separation = Vec2::ZERO;

        for &j in group {
            if j == idx {
                continue;
            }
            let other = &agents[j];
            let d = me.pos.distance(other.pos);
            if d < tuning.perception_radius {
                align += other.vel;
                cohesion += other.pos;
                let d = d.max(tuning.min_separation_distance);
                separation += (me.pos - other.pos) / (d * d);
                total += 1;
            }
        }

        if total > 0 {
            let n = total as f32;
            align = with_magnitude(align / n, p.max_speed);
            cohesion = with_magnitude(cohesion / n - me.pos, tuning.cohesion_max_force);
            separation = limit(separation / n, tuning.separation_max_force);
        }

        // Environment
        let density = total as f32 / tuning.density_normalizer;
        let home_pull = if density < tuning.sparse_density {
            tuning.sparse_home_pull
        } else {
            tuning.settled_home_pull
        };
        let mut environment = with_magnitude(me.home - me.pos, home_pull);
        if density > tuning.dense_density {
            environment += random_unit(rng) * tuning.jitter;
        }
        environment += self.drift(me, frame);
        environment += with_magnitude(me.pos - me.home, p.dispersion_bias);
        environment += with_magnitude(me.pos - frame.world_center, tuning.center_avoidance);

        SteeringForces {
            align: align * p.align_strength,
            cohesion: cohesion * p.cohesion_strength,
            separation: separation * p.separation_strength,
            environment,
            neighbors: total,
        }
    }

    /// Compute steering for every agent in `group`, then apply it
    pub fn update_group<R: Rng + ?Sized>(
        &self,
        agents: &mut [SoundAgent],
        group: &[usize],
        frame: &FlockFrame,
        rng: &mut R,
    ) {
        let view: &[SoundAgent] = agents;
        let targets: Vec<Vec2> = group
            .iter()
            .map(|&i| self.steer(i, view, group, frame, rng).combined())
            .collect();

        for (&i, target) in group.iter().zip(targets) {
            apply_steering(&mut agents[i], target, frame.tuning.smoothing);
        }
    }
}

/// Low-pass the agent's steering toward `target` and load it as acceleration
pub fn apply_steering(agent: &mut SoundAgent, target: Vec2, smoothing: f32) {
    agent.steering = agent.steering.lerp(target, smoothing);
    agent.acc += agent.steering;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WorldSettings;
    use crate::sim::state::VoiceKind;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn agent_at(rng: &mut Pcg32, id: u32, pos: Vec2, home: Vec2) -> SoundAgent {
        let mut a = SoundAgent::new(rng, id, VoiceKind::MelodicPoly, id as usize, home, &WorldSettings::default());
        a.pos = pos;
        a.vel = Vec2::new(1.0, 0.0);
        a
    }

    fn frame(tuning: &FlockTuning) -> FlockFrame<'_> {
        FlockFrame {
            tuning,
            world_center: Vec2::new(400.0, 300.0),
            elapsed_ms: 1234.0,
        }
    }

    #[test]
    fn test_lonely_agent_uses_environment_only() {
        let mut rng = Pcg32::seed_from_u64(1);
        let tuning = FlockTuning::default();
        let home = Vec2::new(600.0, 150.0);
        let mut lonely = agent_at(&mut rng, 0, Vec2::new(100.0, 100.0), home);
        lonely.personality.dispersion_bias = 0.0;
        let agents = vec![lonely];
        let engine = FlockEngine::new(3);

        let f = engine.steer(0, &agents, &[0], &frame(&tuning), &mut rng);
        assert_eq!(f.neighbors, 0);
        assert_eq!(f.align, Vec2::ZERO);
        assert_eq!(f.cohesion, Vec2::ZERO);
        assert_eq!(f.separation, Vec2::ZERO);
        assert!(f.environment.is_finite());
        // Sparse agents are pulled home: the environment leans toward home
        assert!(f.environment.dot(home - agents[0].pos) > 0.0);
    }

    #[test]
    fn test_coincident_neighbors_stay_finite() {
        let mut rng = Pcg32::seed_from_u64(2);
        let tuning = FlockTuning::default();
        let home = Vec2::new(400.0, 300.0);
        let p = Vec2::new(200.0, 200.0);
        let agents = vec![agent_at(&mut rng, 0, p, home), agent_at(&mut rng, 1, p, home)];
        let engine = FlockEngine::new(3);

        let f = engine.steer(0, &agents, &[0, 1], &frame(&tuning), &mut rng);
        assert_eq!(f.neighbors, 1);
        assert!(f.combined().is_finite());
    }

    #[test]
    fn test_separation_pushes_apart() {
        let mut rng = Pcg32::seed_from_u64(4);
        let tuning = FlockTuning::default();
        let home = Vec2::new(400.0, 300.0);
        let agents = vec![
            agent_at(&mut rng, 0, Vec2::new(100.0, 100.0), home),
            agent_at(&mut rng, 1, Vec2::new(105.0, 100.0), home),
        ];
        let engine = FlockEngine::new(3);

        let f = engine.steer(0, &agents, &[0, 1], &frame(&tuning), &mut rng);
        assert!(f.separation.x < 0.0);
        assert!(f.cohesion.x > 0.0);
        assert!(f.separation.length() <= tuning.separation_max_force * agents[0].personality.separation_strength + 1e-5);
        assert!(f.cohesion.length() <= tuning.cohesion_max_force * agents[0].personality.cohesion_strength + 1e-5);
        // Alignment is rescaled to the agent's own top speed
        let expected = agents[0].personality.max_speed * agents[0].personality.align_strength;
        assert!((f.align.length() - expected).abs() < 1e-4);
    }

    #[test]
    fn test_far_agents_are_not_neighbors() {
        let mut rng = Pcg32::seed_from_u64(5);
        let tuning = FlockTuning::default();
        let home = Vec2::new(400.0, 300.0);
        let agents = vec![
            agent_at(&mut rng, 0, Vec2::new(100.0, 100.0), home),
            agent_at(&mut rng, 1, Vec2::new(100.0, 100.0 + tuning.perception_radius + 1.0), home),
        ];
        let engine = FlockEngine::new(3);
        let f = engine.steer(0, &agents, &[0, 1], &frame(&tuning), &mut rng);
        assert_eq!(f.neighbors, 0);
    }

    #[test]
    fn test_drift_is_smooth_in_time() {
        let mut rng = Pcg32::seed_from_u64(6);
        let tuning = FlockTuning::default();
        let a = agent_at(&mut rng, 0, Vec2::ZERO, Vec2::ZERO);
        let engine = FlockEngine::new(8);

        let f0 = FlockFrame { elapsed_ms: 1000.0, ..frame(&tuning) };
        let f1 = FlockFrame { elapsed_ms: 1033.0, ..frame(&tuning) };
        let d0 = engine.drift(&a, &f0);
        let d1 = engine.drift(&a, &f1);
        assert!((d0.length() - tuning.drift).abs() < 1e-5);
        // One frame later the heading has barely moved
        assert!(d0.angle_to(d1).abs() < 0.35);
    }

    #[test]
    fn test_apply_steering_is_low_passed() {
        let mut rng = Pcg32::seed_from_u64(7);
        let mut a = agent_at(&mut rng, 0, Vec2::ZERO, Vec2::ZERO);
        apply_steering(&mut a, Vec2::new(1.0, 0.0), 0.12);
        assert!((a.acc.x - 0.12).abs() < 1e-6);
        a.acc = Vec2::ZERO;
        apply_steering(&mut a, Vec2::new(1.0, 0.0), 0.12);
        assert!((a.acc.x - (0.12 + 0.88 * 0.12)).abs() < 1e-6);
    }
}
