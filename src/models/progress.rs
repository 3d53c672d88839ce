use serde::{Deserialize, Serialize};

use super::enums::{GenerationStatus, PlanStage};

/// Background rendering progress, persisted on the presentation row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationProgress {
    pub status: GenerationStatus,
    pub current: i64,
    pub total: i64,
    pub percentage: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationProgress {
    pub fn new(status: GenerationStatus, current: i64, total: i64, error: Option<String>) -> Self {
        let percentage = if total > 0 { current * 100 / total } else { 0 };
        Self {
            status,
            current,
            total,
            percentage,
            error,
        }
    }
}

/// Planning progress, held in memory only and streamed over SSE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProgress {
    pub stage: PlanStage,
    pub label: String,
    pub progress: u8,
}

impl PlanProgress {
    pub fn new(stage: PlanStage, label: impl Into<String>, progress: u8) -> Self {
        Self {
            stage,
            label: label.into(),
            progress,
        }
    }

    /// Payload reported before any plan request has touched a presentation.
    pub fn idle() -> Self {
        Self::new(PlanStage::Idle, "Waiting to start", 0)
    }
}
