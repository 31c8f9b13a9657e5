//! `get_vision_alignment`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::{
    error::Result,
    protocol::{decode_params, GetVisionAlignmentParams},
};

use super::{load_task, EngineDeps, EngineServices, UseCase};

/// Ranked objective alignments and strategic insights for one task
pub struct GetVisionAlignment {
    deps: Arc<EngineDeps>,
    services: Arc<EngineServices>,
}

impl GetVisionAlignment {
    pub fn new(deps: Arc<EngineDeps>, services: Arc<EngineServices>) -> Self {
        Self { deps, services }
    }
}

#[async_trait]
impl UseCase for GetVisionAlignment {
    fn name(&self) -> &'static str {
        "get_vision_alignment"
    }

    async fn execute(&self, raw: Value, now: DateTime<Utc>) -> Result<Value> {
        let params: GetVisionAlignmentParams = decode_params(raw)?;
        let task = load_task(&self.deps, &params.task_id).await?;
        // Unlike task reads, the dedicated alignment view fails loudly when
        // no hierarchy exists
        let vision_context = self.services.enricher.enrich(&task, now).await?;
        Ok(json!({ "vision_context": vision_context }))
    }
}
