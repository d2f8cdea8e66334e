//! Mixed-instrument cluster detection
//!
//! Active agents are linked when closer than the cluster radius. Connected
//! components with enough members and enough distinct voices are reported as
//! clusters. Nothing persists between ticks apart from which agents were
//! clustered last time, used to spot clusters that just gained members.

use std::collections::{HashMap, VecDeque};

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::sequencer::scale_frequency;
use super::state::{SoundAgent, VoiceKind};
use crate::audio::VoiceTrigger;
use crate::consts::SCALE_HZ;
use crate::settings::ClusterSettings;

/// A proximity-connected group spanning several voices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Agent indices, ascending
    pub members: Vec<usize>,
    /// Distinct voices present, ascending
    pub kinds: Vec<VoiceKind>,
    /// Bounding box corners
    pub min: Vec2,
    pub max: Vec2,
}

impl Cluster {
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, agent: usize) -> bool {
        self.members.binary_search(&agent).is_ok()
    }
}

/// Partition `candidates` into proximity components and keep qualifying ones
pub fn detect_clusters(
    agents: &[SoundAgent],
    candidates: &[usize],
    settings: &ClusterSettings,
) -> Vec<Cluster> {
    let radius_sq = settings.radius * settings.radius;
    let mut visited = vec![false; candidates.len()];
    let mut queue = VecDeque::new();
    let mut clusters = Vec::new();

    for start in 0..candidates.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut component = Vec::new();

        while let Some(slot) = queue.pop_front() {
            let here = agents[candidates[slot]].pos;
            component.push(candidates[slot]);
            for (other, seen) in visited.iter_mut().enumerate() {
                if *seen {
                    continue;
                }
                if here.distance_squared(agents[candidates[other]].pos) < radius_sq {
                    *seen = true;
                    queue.push_back(other);
                }
            }
        }

        if component.len() < settings.min_members {
            continue;
        }
        let mut kinds: Vec<VoiceKind> = component.iter().map(|&i| agents[i].kind).collect();
        kinds.sort_unstable();
        kinds.dedup();
        if kinds.len() < settings.min_types {
            continue;
        }

        component.sort_unstable();
        let (min, max) = component.iter().fold(
            (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
            |(lo, hi), &i| (lo.min(agents[i].pos), hi.max(agents[i].pos)),
        );
        clusters.push(Cluster {
            members: component,
            kinds,
            min,
            max,
        });
    }

    clusters
}

/// A member gone for at most this many ticks does not count as new on return
pub const REJOIN_GRACE_TICKS: u64 = 1;

/// Remembers when each agent was last part of a cluster
#[derive(Debug, Clone, Default)]
pub struct ClusterTracker {
    tick: u64,
    last_seen: HashMap<usize, u64>,
}

impl ClusterTracker {
    /// Indices into `clusters` of those that gained a member since last tick
    pub fn observe(&mut self, clusters: &[Cluster]) -> Vec<usize> {
        self.tick += 1;
        let now = self.tick;
        let is_new = |m: &usize| match self.last_seen.get(m) {
            Some(&seen) => now - seen > REJOIN_GRACE_TICKS + 1,
            None => true,
        };
        let grown: Vec<usize> = clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.members.iter().any(|m| is_new(m)))
            .map(|(i, _)| i)
            .collect();

        for &m in clusters.iter().flat_map(|c| c.members.iter()) {
            self.last_seen.insert(m, now);
        }
        self.last_seen.retain(|_, seen| now - *seen <= REJOIN_GRACE_TICKS + 1);
        grown
    }
}

/// Triad voiced when a cluster grows: root follows member count, loudness follows voice count
pub fn cluster_triggers(cluster: &Cluster, beat_seconds: f32) -> Vec<VoiceTrigger> {
    let root = cluster.members.len() % SCALE_HZ.len();
    let intensity = (0.15 * cluster.kinds.len() as f32).min(0.6);
    [0, 2, 4]
        .into_iter()
        .map(|offset| VoiceTrigger {
            voice: VoiceKind::MelodicPoly,
            frequency: Some(scale_frequency(root + offset)),
            duration: beat_seconds,
            intensity,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WorldSettings;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn agent(rng: &mut Pcg32, id: u32, kind: VoiceKind, pos: Vec2) -> SoundAgent {
        let mut a = SoundAgent::new(rng, id, kind, 0, Vec2::ZERO, &WorldSettings::default());
        a.pos = pos;
        a.active = true;
        a
    }

    #[test]
    fn test_mixed_group_forms_one_cluster() {
        let mut rng = Pcg32::seed_from_u64(1);
        let mut agents = Vec::new();
        let near = [
            (VoiceKind::PercussiveShort, Vec2::new(100.0, 100.0)),
            (VoiceKind::PercussiveShort, Vec2::new(110.0, 100.0)),
            (VoiceKind::PercussiveShort, Vec2::new(100.0, 110.0)),
            (VoiceKind::PercussiveShort, Vec2::new(110.0, 110.0)),
            (VoiceKind::PercussiveLong, Vec2::new(105.0, 105.0)),
            (VoiceKind::PercussiveLong, Vec2::new(115.0, 105.0)),
        ];
        for (i, (kind, pos)) in near.into_iter().enumerate() {
            agents.push(agent(&mut rng, i as u32, kind, pos));
        }
        agents.push(agent(&mut rng, 6, VoiceKind::MelodicPoly, Vec2::new(700.0, 500.0)));

        let candidates: Vec<usize> = (0..agents.len()).collect();
        let clusters = detect_clusters(&agents, &candidates, &ClusterSettings::default());

        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.members, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(c.kinds, vec![VoiceKind::PercussiveShort, VoiceKind::PercussiveLong]);
        assert!(!c.contains(6));
        assert_eq!(c.min, Vec2::new(100.0, 100.0));
        assert_eq!(c.max, Vec2::new(115.0, 110.0));
    }

    #[test]
    fn test_single_voice_group_is_not_a_cluster() {
        let mut rng = Pcg32::seed_from_u64(2);
        let agents: Vec<SoundAgent> = (0..5)
            .map(|i| agent(&mut rng, i, VoiceKind::MelodicSustained, Vec2::new(200.0 + i as f32, 200.0)))
            .collect();
        let candidates: Vec<usize> = (0..agents.len()).collect();
        assert!(detect_clusters(&agents, &candidates, &ClusterSettings::default()).is_empty());
    }

    #[test]
    fn test_chain_connects_transitively() {
        let mut rng = Pcg32::seed_from_u64(3);
        // Each link is 40 apart (< 50), ends are 120 apart
        let agents = vec![
            agent(&mut rng, 0, VoiceKind::PercussiveShort, Vec2::new(0.0, 300.0)),
            agent(&mut rng, 1, VoiceKind::MelodicPoly, Vec2::new(40.0, 300.0)),
            agent(&mut rng, 2, VoiceKind::PercussiveShort, Vec2::new(80.0, 300.0)),
            agent(&mut rng, 3, VoiceKind::MelodicPoly, Vec2::new(120.0, 300.0)),
        ];
        let candidates: Vec<usize> = (0..agents.len()).collect();
        let clusters = detect_clusters(&agents, &candidates, &ClusterSettings::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 4);
    }

    #[test]
    fn test_only_candidates_are_considered() {
        let mut rng = Pcg32::seed_from_u64(4);
        let agents = vec![
            agent(&mut rng, 0, VoiceKind::PercussiveShort, Vec2::new(0.0, 0.0)),
            agent(&mut rng, 1, VoiceKind::MelodicPoly, Vec2::new(5.0, 0.0)),
            agent(&mut rng, 2, VoiceKind::PercussiveLong, Vec2::new(10.0, 0.0)),
        ];
        let clusters = detect_clusters(&agents, &[0, 1], &ClusterSettings::default());
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_tracker_reports_growth_once() {
        let cluster = |members: Vec<usize>| Cluster {
            members,
            kinds: vec![VoiceKind::PercussiveShort, VoiceKind::MelodicPoly],
            min: Vec2::ZERO,
            max: Vec2::ONE,
        };
        let mut tracker = ClusterTracker::default();
        assert_eq!(tracker.observe(&[cluster(vec![1, 2, 3])]), vec![0]);
        assert!(tracker.observe(&[cluster(vec![1, 2, 3])]).is_empty());
        // Losing a member is not growth
        assert!(tracker.observe(&[cluster(vec![1, 2])]).is_empty());
        assert_eq!(tracker.observe(&[cluster(vec![1, 2, 9])]), vec![0]);
    }

    #[test]
    fn test_tracker_ignores_flicker_at_the_edge() {
        let cluster = |members: Vec<usize>| Cluster {
            members,
            kinds: vec![VoiceKind::PercussiveLong, VoiceKind::MelodicSustained],
            min: Vec2::ZERO,
            max: Vec2::ONE,
        };
        let mut tracker = ClusterTracker::default();
        assert_eq!(tracker.observe(&[cluster(vec![1, 2, 3])]), vec![0]);
        // 3 drops out for a single tick and comes back
        assert!(tracker.observe(&[cluster(vec![1, 2])]).is_empty());
        assert!(tracker.observe(&[cluster(vec![1, 2, 3])]).is_empty());
        // Away for two ticks: rejoining is growth again
        assert!(tracker.observe(&[cluster(vec![1, 2])]).is_empty());
        assert!(tracker.observe(&[cluster(vec![1, 2])]).is_empty());
        assert_eq!(tracker.observe(&[cluster(vec![1, 2, 3])]), vec![0]);
    }

    #[test]
    fn test_cluster_triad() {
        let c = Cluster {
            members: vec![0, 1, 2],
            kinds: vec![VoiceKind::PercussiveShort, VoiceKind::PercussiveLong],
            min: Vec2::ZERO,
            max: Vec2::ONE,
        };
        let notes = cluster_triggers(&c, 0.5);
        assert_eq!(notes.len(), 3);
        assert_eq!(notes[0].frequency, Some(SCALE_HZ[3]));
        assert!((notes[0].intensity - 0.3).abs() < 1e-6);
    }
}
