//! Vision enrichment: alignment scoring, contribution classification,
//! strategic insights, and the TTL'd alignment cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use regex::Regex;

use crate::{
    error::{OrchestrationError, Result},
    models::{
        ContributionKind, InsightKind, ObjectiveStatus, Priority, StrategicInsight, Task,
        TaskStatus, VisionAlignment, VisionContext, VisionHierarchy, VisionObjective,
    },
    repository::VisionRepository,
};

/// Factor weights of the alignment score, summing to 1.0
const W_KEYWORD: f64 = 0.30;
const W_BRANCH: f64 = 0.25;
const W_PRIORITY: f64 = 0.15;
const W_PROXIMITY: f64 = 0.20;
const W_STATUS: f64 = 0.10;

/// Per-factor breakdown kept alongside the combined score for the
/// contribution classification rules
#[derive(Debug, Clone, Copy, PartialEq)]
struct FactorSet {
    keyword: f64,
    branch: f64,
    priority: f64,
    proximity: f64,
    status: f64,
}

impl FactorSet {
    fn score(&self) -> f64 {
        (W_KEYWORD * self.keyword
            + W_BRANCH * self.branch
            + W_PRIORITY * self.priority
            + W_PROXIMITY * self.proximity
            + W_STATUS * self.status)
            .clamp(0.0, 1.0)
    }

    fn confidence(&self) -> f64 {
        let nonzero = [
            self.keyword,
            self.branch,
            self.priority,
            self.proximity,
            self.status,
        ]
        .iter()
        .filter(|f| **f > 0.0)
        .count();
        nonzero as f64 / 5.0
    }

    fn all_at_least(&self, floor: f64) -> bool {
        self.keyword >= floor
            && self.branch >= floor
            && self.priority >= floor
            && self.proximity >= floor
            && self.status >= floor
    }
}

struct CacheEntry {
    computed_at: DateTime<Utc>,
    alignments: Arc<Vec<VisionAlignment>>,
}

/// Read-mostly alignment cache. Entries are swapped whole (`Arc` payload)
/// so readers never observe a partially-updated set.
pub struct AlignmentCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl AlignmentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, task_id: &str, now: DateTime<Utc>) -> Option<Arc<Vec<VisionAlignment>>> {
        let entries = self.entries.read();
        let entry = entries.get(task_id)?;
        (now - entry.computed_at <= self.ttl).then(|| entry.alignments.clone())
    }

    pub fn put(&self, task_id: &str, alignments: Arc<Vec<VisionAlignment>>, now: DateTime<Utc>) {
        self.entries.write().insert(
            task_id.to_string(),
            CacheEntry {
                computed_at: now,
                alignments,
            },
        );
    }

    pub fn invalidate(&self, task_id: &str) {
        self.entries.write().remove(task_id);
    }
}

/// Computes how strongly a task advances each vision objective and attaches
/// the ranked result plus strategic insights to responses.
pub struct VisionEnricher {
    vision: Arc<dyn VisionRepository>,
    cache: AlignmentCache,
    token_re: Regex,
    max_alignments: usize,
}

impl VisionEnricher {
    pub fn new(vision: Arc<dyn VisionRepository>, cache_ttl: Duration, max_alignments: usize) -> Self {
        Self {
            vision,
            cache: AlignmentCache::new(cache_ttl),
            // The pattern is a literal; it cannot fail to compile
            token_re: Regex::new(r"[a-z0-9]+").unwrap(),
            max_alignments,
        }
    }

    /// Drop a task's cached alignment set; called when the task or its
    /// context mutates
    pub fn invalidate(&self, task_id: &str) {
        self.cache.invalidate(task_id);
    }

    /// Full enrichment block for a task: ranked alignments and insights
    ///
    /// # Returns
    /// * `Err(OrchestrationError::AlignmentUnavailable)` - When no
    ///   hierarchy is configured
    pub async fn enrich(&self, task: &Task, now: DateTime<Utc>) -> Result<VisionContext> {
        let hierarchy = self.vision.get_hierarchy().await?;
        if hierarchy.is_empty() {
            return Err(OrchestrationError::AlignmentUnavailable(
                "no vision hierarchy is configured".to_string(),
            ));
        }
        let alignments = self.alignments_for(task, &hierarchy, now).await?;
        let insights = self.insights(&hierarchy, &alignments, now);
        Ok(VisionContext {
            task_id: task.id.clone(),
            alignments: alignments.as_ref().clone(),
            insights,
        })
    }

    /// Ranked alignments for a task, served from cache inside the TTL and
    /// materialised to the vision store on recompute
    pub async fn alignments_for(
        &self,
        task: &Task,
        hierarchy: &VisionHierarchy,
        now: DateTime<Utc>,
    ) -> Result<Arc<Vec<VisionAlignment>>> {
        if let Some(cached) = self.cache.get(&task.id, now) {
            return Ok(cached);
        }

        let mut scored: Vec<VisionAlignment> = hierarchy
            .objectives
            .values()
            .map(|objective| {
                let factors = self.factors(task, objective, hierarchy);
                VisionAlignment {
                    objective_id: objective.id.clone(),
                    score: factors.score(),
                    confidence: factors.confidence(),
                    contribution: self.classify(task, &factors),
                }
            })
            .collect();

        // Rank by score x confidence; objective id breaks ties so the
        // ordering is total
        scored.sort_by(|a, b| {
            let ka = a.score * a.confidence;
            let kb = b.score * b.confidence;
            kb.partial_cmp(&ka)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.objective_id.cmp(&b.objective_id))
        });
        scored.truncate(self.max_alignments);

        let alignments = Arc::new(scored);
        self.vision
            .save_alignment(&task.id, alignments.as_ref().clone())
            .await?;
        self.cache.put(&task.id, alignments.clone(), now);
        Ok(alignments)
    }

    fn factors(&self, task: &Task, objective: &VisionObjective, hierarchy: &VisionHierarchy) -> FactorSet {
        FactorSet {
            keyword: self.keyword_overlap(task, objective),
            branch: self.branch_overlap(task, objective, hierarchy),
            priority: priority_compatibility(task, objective),
            proximity: hierarchical_proximity(task, objective, hierarchy),
            status: status_compatibility(task, objective),
        }
    }

    /// Jaccard similarity between the task's title+description tokens and
    /// the objective's title+metric-name tokens
    fn keyword_overlap(&self, task: &Task, objective: &VisionObjective) -> f64 {
        let task_tokens = self.tokens(&format!("{} {}", task.title, task.description));
        let mut objective_text = objective.title.clone();
        for metric in &objective.metrics {
            objective_text.push(' ');
            objective_text.push_str(&metric.name);
        }
        let objective_tokens = self.tokens(&objective_text);

        if task_tokens.is_empty() || objective_tokens.is_empty() {
            return 0.0;
        }
        let intersection = task_tokens.intersection(&objective_tokens).count();
        let union = task_tokens.union(&objective_tokens).count();
        intersection as f64 / union as f64
    }

    /// 1.0 when the task's branch sits under the objective's project
    fn branch_overlap(
        &self,
        task: &Task,
        objective: &VisionObjective,
        hierarchy: &VisionHierarchy,
    ) -> f64 {
        let Some(project) = hierarchy.project_of(&objective.id) else {
            return 0.0;
        };
        if hierarchy.is_ancestor_or_self(&project.id, &task.branch_id) {
            1.0
        } else {
            0.0
        }
    }

    fn tokens(&self, text: &str) -> BTreeSet<String> {
        let lowered = text.to_lowercase();
        self.token_re
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }

    fn classify(&self, task: &Task, factors: &FactorSet) -> ContributionKind {
        if task.is_maintenance() {
            return ContributionKind::Maintenance;
        }
        if factors.all_at_least(0.5) && task.priority >= Priority::High {
            return ContributionKind::Direct;
        }
        if factors.proximity >= 0.5 && factors.keyword < 0.25 {
            return ContributionKind::Supporting;
        }
        if factors.keyword >= 0.5 && factors.proximity < 0.25 {
            return ContributionKind::Exploratory;
        }
        ContributionKind::Enabling
    }

    /// Small rule set over deadline proximity, metric gaps, and alignment
    /// strength; iterates the ranked alignments so the output order is
    /// deterministic
    fn insights(
        &self,
        hierarchy: &VisionHierarchy,
        alignments: &[VisionAlignment],
        now: DateTime<Utc>,
    ) -> Vec<StrategicInsight> {
        let mut out = Vec::new();
        for alignment in alignments {
            let Some(objective) = hierarchy.get(&alignment.objective_id) else {
                continue;
            };
            if objective.status != ObjectiveStatus::Active {
                continue;
            }

            if let Some(deadline) = objective.deadline {
                let remaining = deadline - now;
                if remaining <= Duration::days(14) && objective.metric_attainment() < 0.5 {
                    out.push(StrategicInsight {
                        kind: InsightKind::AtRiskObjective,
                        objective_id: objective.id.clone(),
                        message: format!(
                            "Objective '{}' is at risk: deadline within {} days at {:.0}% of target",
                            objective.title,
                            remaining.num_days().max(0),
                            objective.metric_attainment() * 100.0
                        ),
                    });
                    continue;
                }
            }

            if alignment.score >= 0.6 && alignment.contribution == ContributionKind::Exploratory {
                out.push(StrategicInsight {
                    kind: InsightKind::AlignmentOpportunity,
                    objective_id: objective.id.clone(),
                    message: format!(
                        "New alignment opportunity with '{}' (score {:.2})",
                        objective.title, alignment.score
                    ),
                });
                continue;
            }

            if let Some(metric) = objective
                .metrics
                .iter()
                .find(|m| m.attainment() < 0.25)
            {
                out.push(StrategicInsight {
                    kind: InsightKind::MetricGap,
                    objective_id: objective.id.clone(),
                    message: format!(
                        "Metric '{}' on '{}' sits at {:.0}% of target",
                        metric.name,
                        objective.title,
                        metric.attainment() * 100.0
                    ),
                });
            }
        }
        out
    }
}

/// Drops cached alignments when the aggregates feeding them mutate
pub struct AlignmentInvalidationHandler {
    enricher: Arc<VisionEnricher>,
}

impl AlignmentInvalidationHandler {
    pub fn new(enricher: Arc<VisionEnricher>) -> Self {
        Self { enricher }
    }
}

#[async_trait::async_trait]
impl crate::events::EventHandler for AlignmentInvalidationHandler {
    fn name(&self) -> &'static str {
        "alignment-invalidation"
    }

    fn interested_in(&self, event: &crate::events::DomainEvent) -> bool {
        use crate::events::DomainEvent::*;
        matches!(
            event,
            TaskStatusChanged { .. }
                | TaskCompleted { .. }
                | TaskDeleted { .. }
                | ContextUpdated { .. }
                | ProgressReported { .. }
        )
    }

    async fn handle(
        &self,
        event: &crate::events::DomainEvent,
        _now: DateTime<Utc>,
    ) -> Result<Vec<crate::events::DomainEvent>> {
        use crate::events::DomainEvent::*;
        let task_id = match event {
            TaskStatusChanged { task_id, .. }
            | TaskCompleted { task_id }
            | TaskDeleted { task_id, .. }
            | ContextUpdated { task_id }
            | ProgressReported { task_id, .. } => task_id,
            _ => return Ok(vec![]),
        };
        self.enricher.invalidate(task_id);
        Ok(vec![])
    }
}

/// Higher task priority on a higher-level objective scores higher
fn priority_compatibility(task: &Task, objective: &VisionObjective) -> f64 {
    task.priority.rank() * objective.level.rank()
}

/// 1/(1+d) where d is the tree distance between the objective and the
/// task's branch anchor node; 0 when they share no ancestry
fn hierarchical_proximity(task: &Task, objective: &VisionObjective, hierarchy: &VisionHierarchy) -> f64 {
    match hierarchy.distance(&objective.id, &task.branch_id) {
        Some(d) => 1.0 / (1.0 + d as f64),
        None => 0.0,
    }
}

fn status_compatibility(task: &Task, objective: &VisionObjective) -> f64 {
    if task.is_terminal() || objective.status != ObjectiveStatus::Active {
        return 0.0;
    }
    if task.status == TaskStatus::InProgress {
        1.0
    } else {
        0.5
    }
}
