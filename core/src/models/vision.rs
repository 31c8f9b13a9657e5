use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Levels of the strategic objective hierarchy, highest first.
///
/// A node's parent must sit at a strictly higher level. Branch-level nodes
/// anchor task trees: a branch objective's id is the branch id tasks carry.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisionLevel {
    Organization,
    Project,
    Branch,
    Task,
}

impl VisionLevel {
    /// Numeric height in the hierarchy; higher level, higher rank
    pub fn height(&self) -> u8 {
        match self {
            VisionLevel::Organization => 3,
            VisionLevel::Project => 2,
            VisionLevel::Branch => 1,
            VisionLevel::Task => 0,
        }
    }

    /// Normalised rank in (0, 1] used by alignment scoring
    pub fn rank(&self) -> f64 {
        match self {
            VisionLevel::Organization => 1.0,
            VisionLevel::Project => 0.75,
            VisionLevel::Branch => 0.5,
            VisionLevel::Task => 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Active,
    Achieved,
    Abandoned,
}

/// Measured target attached to an objective
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetMetric {
    pub name: String,
    pub current: f64,
    pub target: f64,
    pub unit: String,
}

impl TargetMetric {
    /// Fraction of the target reached, clamped to [0, 1]
    pub fn attainment(&self) -> f64 {
        if self.target <= 0.0 {
            return 1.0;
        }
        (self.current / self.target).clamp(0.0, 1.0)
    }
}

/// Node in the organization → project → branch → task objective hierarchy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionObjective {
    pub id: String,
    pub level: VisionLevel,
    pub title: String,
    pub description: String,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metrics: Vec<TargetMetric>,
    pub deadline: Option<DateTime<Utc>>,
    pub status: ObjectiveStatus,
}

impl VisionObjective {
    /// Mean metric attainment; objectives without metrics read as 0
    pub fn metric_attainment(&self) -> f64 {
        if self.metrics.is_empty() {
            return 0.0;
        }
        self.metrics.iter().map(TargetMetric::attainment).sum::<f64>() / self.metrics.len() as f64
    }
}

/// The loaded objective tree, keyed by node id.
///
/// A `BTreeMap` keeps iteration deterministic, which alignment ranking and
/// insight generation rely on.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct VisionHierarchy {
    pub objectives: BTreeMap<String, VisionObjective>,
}

impl VisionHierarchy {
    pub fn get(&self, id: &str) -> Option<&VisionObjective> {
        self.objectives.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    pub fn insert(&mut self, objective: VisionObjective) {
        self.objectives.insert(objective.id.clone(), objective);
    }

    /// Check the structural rules of the tree: every parent link must
    /// resolve, and a parent must sit at a strictly higher level than its
    /// child. Returns the offending node ids.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut offending = Vec::new();
        for node in self.objectives.values() {
            if let Some(parent_id) = node.parent_id.as_deref() {
                match self.get(parent_id) {
                    Some(parent) if parent.level.height() > node.level.height() => {}
                    _ => offending.push(node.id.clone()),
                }
            }
        }
        if offending.is_empty() {
            Ok(())
        } else {
            Err(offending)
        }
    }

    /// Ancestor chain of a node, nearest first, excluding the node itself.
    /// Broken parent links terminate the walk.
    pub fn ancestors(&self, id: &str) -> Vec<&VisionObjective> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(|o| o.parent_id.as_deref());
        while let Some(pid) = current {
            match self.get(pid) {
                Some(parent) => {
                    out.push(parent);
                    current = parent.parent_id.as_deref();
                }
                None => break,
            }
        }
        out
    }

    /// Whether `ancestor_id` is `id` itself or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor_id: &str, id: &str) -> bool {
        if ancestor_id == id {
            return true;
        }
        self.ancestors(id).iter().any(|o| o.id == ancestor_id)
    }

    /// Nearest project-level node at or above the given node
    pub fn project_of(&self, id: &str) -> Option<&VisionObjective> {
        let node = self.get(id)?;
        if node.level == VisionLevel::Project {
            return Some(node);
        }
        self.ancestors(id)
            .into_iter()
            .find(|o| o.level == VisionLevel::Project)
    }

    /// Edge distance between two nodes through their lowest common
    /// ancestor; `None` when the nodes share no ancestry
    pub fn distance(&self, a: &str, b: &str) -> Option<u32> {
        if a == b {
            return Some(0);
        }
        let chain_a = self.path_to_root(a)?;
        let chain_b = self.path_to_root(b)?;
        for (depth_a, id_a) in chain_a.iter().enumerate() {
            if let Some(depth_b) = chain_b.iter().position(|id_b| id_b == id_a) {
                return Some((depth_a + depth_b) as u32);
            }
        }
        None
    }

    /// Aggregate progress of a node: weighted (equal) mean of its direct
    /// children when it has any, metric attainment otherwise
    pub fn aggregate_progress(&self, id: &str) -> Option<f64> {
        let node = self.get(id)?;
        let children: Vec<&VisionObjective> = self
            .objectives
            .values()
            .filter(|o| o.parent_id.as_deref() == Some(id))
            .collect();
        if children.is_empty() {
            return Some(node.metric_attainment());
        }
        let sum: f64 = children
            .iter()
            .filter_map(|c| self.aggregate_progress(&c.id))
            .sum();
        Some(sum / children.len() as f64)
    }

    fn path_to_root(&self, id: &str) -> Option<Vec<String>> {
        self.get(id)?;
        let mut path = vec![id.to_string()];
        path.extend(self.ancestors(id).iter().map(|o| o.id.clone()));
        Some(path)
    }
}

/// How a task contributes to an objective it aligns with
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    Direct,
    Supporting,
    Enabling,
    Exploratory,
    Maintenance,
}

/// One scored task → objective alignment edge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionAlignment {
    pub objective_id: String,
    /// Weighted factor sum, clamped to [0, 1]
    pub score: f64,
    /// Fraction of scoring factors that contributed a non-zero term
    pub confidence: f64,
    pub contribution: ContributionKind,
}

#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    AtRiskObjective,
    AlignmentOpportunity,
    MetricGap,
}

/// Rule-generated strategic observation attached to an enriched response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategicInsight {
    pub kind: InsightKind,
    pub objective_id: String,
    pub message: String,
}

/// Strategic enrichment block returned alongside task data
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisionContext {
    pub task_id: String,
    pub alignments: Vec<VisionAlignment>,
    pub insights: Vec<StrategicInsight>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, level: VisionLevel, parent: Option<&str>) -> VisionObjective {
        VisionObjective {
            id: id.to_string(),
            level,
            title: id.to_string(),
            description: String::new(),
            parent_id: parent.map(str::to_string),
            metrics: vec![],
            deadline: None,
            status: ObjectiveStatus::Active,
        }
    }

    fn sample_hierarchy() -> VisionHierarchy {
        let mut h = VisionHierarchy::default();
        h.insert(node("org", VisionLevel::Organization, None));
        h.insert(node("proj-a", VisionLevel::Project, Some("org")));
        h.insert(node("proj-b", VisionLevel::Project, Some("org")));
        h.insert(node("branch-1", VisionLevel::Branch, Some("proj-a")));
        h.insert(node("branch-2", VisionLevel::Branch, Some("proj-b")));
        h
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let h = sample_hierarchy();
        let chain: Vec<&str> = h.ancestors("branch-1").iter().map(|o| o.id.as_str()).collect();
        assert_eq!(chain, vec!["proj-a", "org"]);
    }

    #[test]
    fn test_distance_through_lowest_common_ancestor() {
        let h = sample_hierarchy();
        assert_eq!(h.distance("branch-1", "branch-1"), Some(0));
        assert_eq!(h.distance("branch-1", "proj-a"), Some(1));
        assert_eq!(h.distance("branch-1", "org"), Some(2));
        // branch-1 -> proj-a -> org -> proj-b -> branch-2
        assert_eq!(h.distance("branch-1", "branch-2"), Some(4));
        assert_eq!(h.distance("branch-1", "missing"), None);
    }

    #[test]
    fn test_project_of() {
        let h = sample_hierarchy();
        assert_eq!(h.project_of("branch-1").map(|o| o.id.as_str()), Some("proj-a"));
        assert_eq!(h.project_of("proj-b").map(|o| o.id.as_str()), Some("proj-b"));
        assert!(h.project_of("org").is_none());
    }

    #[test]
    fn test_validate_rejects_inverted_levels() {
        let mut h = sample_hierarchy();
        assert!(h.validate().is_ok());

        // A project hanging under a branch inverts the levels
        h.insert(node("proj-bad", VisionLevel::Project, Some("branch-1")));
        assert_eq!(h.validate().unwrap_err(), vec!["proj-bad".to_string()]);

        // Dangling parent links are also structural errors
        let mut h = sample_hierarchy();
        h.insert(node("branch-orphan", VisionLevel::Branch, Some("missing")));
        assert!(h.validate().is_err());
    }

    #[test]
    fn test_metric_attainment_clamped() {
        let m = TargetMetric {
            name: "throughput".to_string(),
            current: 150.0,
            target: 100.0,
            unit: "rps".to_string(),
        };
        assert_eq!(m.attainment(), 1.0);

        let m = TargetMetric {
            name: "coverage".to_string(),
            current: 40.0,
            target: 80.0,
            unit: "%".to_string(),
        };
        assert!((m.attainment() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_progress_is_mean_of_children() {
        let mut h = sample_hierarchy();
        let mut leaf_a = node("branch-1", VisionLevel::Branch, Some("proj-a"));
        leaf_a.metrics = vec![TargetMetric {
            name: "m".to_string(),
            current: 50.0,
            target: 100.0,
            unit: "u".to_string(),
        }];
        h.insert(leaf_a);
        let progress = h.aggregate_progress("branch-1").unwrap();
        assert!((progress - 0.5).abs() < f64::EPSILON);
    }
}
