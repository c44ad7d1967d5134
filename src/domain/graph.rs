use crate::domain::{CommitRecord, LaneColor, LaneInfo};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Lane slots for one layout sweep. A slot is either free or reserved for the
/// hash of the commit expected to continue that line further down.
#[derive(Debug, Default)]
struct LaneArena {
    slots: Vec<Option<String>>,
}

impl LaneArena {
    fn reserved_by(&self, hash: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_deref() == Some(hash))
    }

    /// First free slot, growing the arena when every slot is taken.
    fn claim_free(&mut self) -> usize {
        match self.slots.iter().position(Option::is_none) {
            Some(lane) => lane,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        }
    }

    fn reserve(&mut self, lane: usize, hash: &str) {
        self.slots[lane] = Some(hash.to_string());
    }

    fn release(&mut self, lane: usize) {
        self.slots[lane] = None;
    }

    fn width(&self) -> usize {
        self.slots.len()
    }
}

/// One counter shared by every allocation in a sweep, so identical input
/// always yields identical colors.
#[derive(Debug, Default)]
struct ColorCycle {
    allocated: usize,
}

impl ColorCycle {
    fn next(&mut self) -> LaneColor {
        let color = LaneColor::from_allocation(self.allocated);
        self.allocated += 1;
        color
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct GraphLayout {
    lanes: HashMap<String, LaneInfo>,
    /// Number of lane columns the sweep ever used.
    pub lane_count: usize,
}

impl GraphLayout {
    pub fn get(&self, hash: &str) -> Option<LaneInfo> {
        self.lanes.get(hash).copied()
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

/// Assign every commit a lane and color in one top-to-bottom sweep.
///
/// `commits` must already be in display order (newest first); the order is
/// taken as the vertical position. Parents outside `commits` are not drawn and
/// are ignored.
pub fn assign_lanes(commits: &[CommitRecord]) -> GraphLayout {
    let known: HashSet<&str> = commits.iter().map(|commit| commit.hash.as_str()).collect();

    let mut lanes: HashMap<String, LaneInfo> = HashMap::new();
    let mut arena = LaneArena::default();
    let mut colors = ColorCycle::default();

    for commit in commits {
        let info = match arena.reserved_by(&commit.hash) {
            Some(lane) => {
                // A child reserved this lane and already recorded the color.
                let color = match lanes.get(&commit.hash) {
                    Some(existing) => existing.color,
                    None => colors.next(),
                };
                LaneInfo { lane, color }
            }
            None => LaneInfo {
                lane: arena.claim_free(),
                color: colors.next(),
            },
        };
        lanes.insert(commit.hash.clone(), info);

        let mut parents = commit
            .parents
            .iter()
            .filter(|parent| known.contains(parent.as_str()));

        let Some(first) = parents.next() else {
            arena.release(info.lane);
            continue;
        };

        arena.reserve(info.lane, first);
        lanes.entry(first.clone()).or_insert(info);

        for parent in parents {
            if lanes.contains_key(parent) {
                continue;
            }
            let lane = match arena.reserved_by(parent) {
                Some(lane) => lane,
                None => {
                    let lane = arena.claim_free();
                    arena.reserve(lane, parent);
                    lane
                }
            };
            lanes.insert(
                parent.clone(),
                LaneInfo {
                    lane,
                    color: colors.next(),
                },
            );
        }
    }

    GraphLayout {
        lanes,
        lane_count: arena.width(),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeShape {
    /// Child and parent share a lane.
    Straight,
    /// The edge bends between two lane columns.
    Curve,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GraphEdge {
    pub child: String,
    pub parent: String,
    pub child_row: usize,
    pub parent_row: usize,
    pub child_lane: usize,
    pub parent_lane: usize,
    /// Edges take the color of the child's lane.
    pub color: LaneColor,
    pub shape: EdgeShape,
}

/// Edges from each commit to each of its parents that is part of `commits`.
pub fn layout_edges(commits: &[CommitRecord], layout: &GraphLayout) -> Vec<GraphEdge> {
    let rows: HashMap<&str, usize> = commits
        .iter()
        .enumerate()
        .map(|(row, commit)| (commit.hash.as_str(), row))
        .collect();

    let mut edges = Vec::new();
    for (child_row, commit) in commits.iter().enumerate() {
        let Some(child) = layout.get(&commit.hash) else {
            continue;
        };
        for parent in &commit.parents {
            let Some(&parent_row) = rows.get(parent.as_str()) else {
                continue;
            };
            let Some(parent_info) = layout.get(parent) else {
                continue;
            };
            let shape = if child.lane == parent_info.lane {
                EdgeShape::Straight
            } else {
                EdgeShape::Curve
            };
            edges.push(GraphEdge {
                child: commit.hash.clone(),
                parent: parent.clone(),
                child_row,
                parent_row,
                child_lane: child.lane,
                parent_lane: parent_info.lane,
                color: child.color,
                shape,
            });
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, parents: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            abbreviated_hash: hash.to_string(),
            parents: parents.iter().map(|p| (*p).to_string()).collect(),
            author: "Ada".to_string(),
            author_email: "ada@example.com".to_string(),
            date: "2026-02-18T10:00:00Z".to_string(),
            subject: hash.to_string(),
            refs: vec![],
            checkpoint_id: None,
            attribution: None,
            session_id: None,
            agent: None,
        }
    }

    fn lane(layout: &GraphLayout, hash: &str) -> usize {
        layout.get(hash).expect("lane").lane
    }

    fn color(layout: &GraphLayout, hash: &str) -> LaneColor {
        layout.get(hash).expect("lane").color
    }

    #[test]
    fn straight_line_stays_in_lane_zero() {
        let commits = vec![commit("c3", &["c2"]), commit("c2", &["c1"]), commit("c1", &[])];
        let layout = assign_lanes(&commits);

        for hash in ["c3", "c2", "c1"] {
            assert_eq!(lane(&layout, hash), 0);
            assert_eq!(color(&layout, hash), LaneColor::Blue);
        }
        assert_eq!(layout.lane_count, 1);
    }

    #[test]
    fn merge_parent_gets_its_own_lane_and_fresh_color() {
        let commits = vec![
            commit("c3", &["c2"]),
            commit("c2", &["c1", "c4"]),
            commit("c4", &[]),
            commit("c1", &[]),
        ];
        let layout = assign_lanes(&commits);

        assert_eq!(lane(&layout, "c3"), 0);
        assert_eq!(lane(&layout, "c2"), 0);
        assert_eq!(lane(&layout, "c1"), 0);
        assert_ne!(lane(&layout, "c4"), 0);
        assert_eq!(color(&layout, "c1"), color(&layout, "c2"));
        assert_eq!(color(&layout, "c4"), LaneColor::Green);
    }

    #[test]
    fn octopus_merge_parents_take_distinct_lanes() {
        let commits = vec![
            commit("m", &["p1", "p2", "p3"]),
            commit("p3", &[]),
            commit("p2", &[]),
            commit("p1", &[]),
        ];
        let layout = assign_lanes(&commits);

        assert_eq!(lane(&layout, "p1"), lane(&layout, "m"));
        assert_eq!(color(&layout, "p1"), color(&layout, "m"));
        let p2 = lane(&layout, "p2");
        let p3 = lane(&layout, "p3");
        assert_ne!(p2, lane(&layout, "m"));
        assert_ne!(p3, lane(&layout, "m"));
        assert_ne!(p2, p3);
        assert_eq!(color(&layout, "p2"), LaneColor::Green);
        assert_eq!(color(&layout, "p3"), LaneColor::Red);
    }

    #[test]
    fn merge_parent_already_placed_keeps_its_lane() {
        // b1 and m both point at base; base is first placed by b1.
        let commits = vec![
            commit("b1", &["base"]),
            commit("m", &["x", "base"]),
            commit("x", &["base"]),
            commit("base", &[]),
        ];
        let layout = assign_lanes(&commits);

        assert_eq!(lane(&layout, "b1"), 0);
        assert_eq!(lane(&layout, "m"), 1);
        assert_eq!(lane(&layout, "base"), 0);
        assert_eq!(color(&layout, "base"), color(&layout, "b1"));
    }

    #[test]
    fn root_commit_frees_lane_for_next_branch_head() {
        let commits = vec![
            commit("a2", &["a1"]),
            commit("a1", &[]),
            commit("b2", &["b1"]),
            commit("b1", &[]),
        ];
        let layout = assign_lanes(&commits);

        assert_eq!(lane(&layout, "a1"), 0);
        assert_eq!(lane(&layout, "b2"), 0);
        assert_eq!(lane(&layout, "b1"), 0);
        assert_eq!(color(&layout, "a1"), LaneColor::Blue);
        assert_eq!(color(&layout, "b2"), LaneColor::Green);
        assert_eq!(layout.lane_count, 1);
    }

    #[test]
    fn parallel_branch_heads_take_separate_lanes() {
        let commits = vec![
            commit("main2", &["base"]),
            commit("feat2", &["feat1"]),
            commit("feat1", &["base"]),
            commit("base", &[]),
        ];
        let layout = assign_lanes(&commits);

        assert_eq!(lane(&layout, "main2"), 0);
        assert_eq!(lane(&layout, "feat2"), 1);
        assert_eq!(lane(&layout, "feat1"), 1);
        assert_eq!(lane(&layout, "base"), 0);
        assert_eq!(layout.lane_count, 2);
    }

    #[test]
    fn parents_outside_window_are_ignored() {
        let commits = vec![commit("c2", &["c1"]), commit("c1", &["outside"])];
        let layout = assign_lanes(&commits);

        assert_eq!(layout.len(), 2);
        assert!(layout.get("outside").is_none());
        assert_eq!(lane(&layout, "c1"), 0);
    }

    #[test]
    fn identical_input_yields_identical_layout() {
        let commits = vec![
            commit("m", &["a", "b"]),
            commit("b", &["base"]),
            commit("a", &["base"]),
            commit("base", &[]),
            commit("other", &[]),
        ];
        let first = assign_lanes(&commits);
        let second = assign_lanes(&commits);
        for c in &commits {
            assert_eq!(first.get(&c.hash), second.get(&c.hash));
        }
    }

    #[test]
    fn every_commit_gets_a_lane() {
        let commits = vec![
            commit("m2", &["m1", "f2"]),
            commit("f2", &["f1"]),
            commit("m1", &["base"]),
            commit("f1", &["base"]),
            commit("base", &[]),
        ];
        let layout = assign_lanes(&commits);
        assert_eq!(layout.len(), commits.len());
        assert!(!layout.is_empty());
        for c in &commits {
            assert!(layout.get(&c.hash).is_some());
        }
    }

    #[test]
    fn edges_are_straight_within_a_lane_and_curved_across() {
        let commits = vec![
            commit("c3", &["c2"]),
            commit("c2", &["c1", "c4"]),
            commit("c4", &[]),
            commit("c1", &["outside"]),
        ];
        let layout = assign_lanes(&commits);
        let edges = layout_edges(&commits, &layout);

        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].shape, EdgeShape::Straight);
        assert_eq!((edges[0].child_row, edges[0].parent_row), (0, 1));
        let merge_edge = edges
            .iter()
            .find(|edge| edge.parent == "c4")
            .expect("merge edge");
        assert_eq!(merge_edge.shape, EdgeShape::Curve);
        assert_eq!(merge_edge.color, color(&layout, "c2"));
        assert_eq!(merge_edge.parent_lane, lane(&layout, "c4"));
    }
}
