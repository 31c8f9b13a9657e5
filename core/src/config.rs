use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, Result};

/// Engine tuning knobs.
///
/// Loaded by the server from the `[engine]` configuration table; every field
/// has the documented default so an empty table is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes without a context update before an in-progress task counts
    /// as stale (staleness only ever affects hints, never reads)
    pub staleness_threshold_minutes: u64,
    /// Attach vision enrichment to task reads unless the caller opts out
    pub include_vision_by_default: bool,
    /// Seconds a computed alignment set stays servable from cache
    pub alignment_cache_ttl_seconds: u64,
    /// Upper bound on hints attached to a single response
    pub max_hints_per_response: usize,
    /// Maximum depth of event handler reaction chains
    pub event_depth_limit: usize,
    /// Per-call deadline for ordinary tool invocations, seconds
    pub tool_deadline_seconds: u64,
    /// Per-call deadline for batch-flavoured invocations (list, search), seconds
    pub batch_deadline_seconds: u64,
    /// Informational p95 budget for engine-added work per call, milliseconds
    pub overhead_budget_ms: u64,
    /// Number of ranked objectives returned per alignment view
    pub max_alignments: usize,
    /// Optimistic-lock retries before giving up with CONCURRENT_MODIFICATION
    pub retry_attempts: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            staleness_threshold_minutes: 30,
            include_vision_by_default: true,
            alignment_cache_ttl_seconds: 300,
            max_hints_per_response: 6,
            event_depth_limit: 4,
            tool_deadline_seconds: 5,
            batch_deadline_seconds: 30,
            overhead_budget_ms: 100,
            max_alignments: 5,
            retry_attempts: 5,
        }
    }
}

impl EngineConfig {
    pub fn staleness_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.staleness_threshold_minutes as i64)
    }

    pub fn alignment_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alignment_cache_ttl_seconds as i64)
    }

    pub fn tool_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.tool_deadline_seconds)
    }

    pub fn batch_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.batch_deadline_seconds)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.staleness_threshold_minutes == 0 {
            return Err(OrchestrationError::Validation(
                "staleness_threshold_minutes must be greater than 0".to_string(),
            ));
        }
        if self.max_hints_per_response == 0 {
            return Err(OrchestrationError::Validation(
                "max_hints_per_response must be greater than 0".to_string(),
            ));
        }
        if self.event_depth_limit == 0 {
            return Err(OrchestrationError::Validation(
                "event_depth_limit must be greater than 0".to_string(),
            ));
        }
        if self.tool_deadline_seconds == 0 || self.batch_deadline_seconds == 0 {
            return Err(OrchestrationError::Validation(
                "deadlines must be greater than 0".to_string(),
            ));
        }
        if self.max_alignments == 0 {
            return Err(OrchestrationError::Validation(
                "max_alignments must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.staleness_threshold_minutes, 30);
        assert!(config.include_vision_by_default);
        assert_eq!(config.alignment_cache_ttl_seconds, 300);
        assert_eq!(config.max_hints_per_response, 6);
        assert_eq!(config.event_depth_limit, 4);
        assert_eq!(config.tool_deadline_seconds, 5);
        assert_eq!(config.batch_deadline_seconds, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut config = EngineConfig::default();
        config.max_hints_per_response = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.tool_deadline_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"staleness_threshold_minutes": 45}"#).unwrap();
        assert_eq!(config.staleness_threshold_minutes, 45);
        assert_eq!(config.max_hints_per_response, 6);
    }
}
