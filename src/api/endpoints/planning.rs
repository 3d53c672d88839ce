//! Outline planning and its progress stream.
//!
//! `POST /presentations/:id/plan` runs the multi-agent planner on the
//! blocking pool while `GET /presentations/:id/plan-progress` streams the
//! stage it reports, as server-sent events.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::{Extension, Json};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;

use super::{blocking, owned_presentation};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::core_state::CoreState;
use crate::db::repository::update_presentation;
use crate::models::{PlanProgress, PlanStage, PresentationMode, PresentationPatch};
use crate::pipeline::{PipelineError, PlanRequest, PlannedOutline, Planner};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_PAGE_COUNT: i64 = 50;
pub(crate) const DEFAULT_LANGUAGE: &str = "zh";

fn default_page_count() -> i64 {
    12
}

/// Request value, or `fallback` when it is missing or empty.
pub(crate) fn or_default(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

#[derive(Deserialize)]
pub struct PlanBody {
    pub topic: String,
    #[serde(default = "default_page_count")]
    pub page_count: i64,
    pub context_text: Option<String>,
    pub language: Option<String>,
    pub presentation_mode: Option<String>,
    pub style_preset_id: Option<String>,
    pub audience: Option<String>,
    pub scene: Option<String>,
    pub attention: Option<String>,
    pub purpose: Option<String>,
}

impl PlanBody {
    fn into_request(self) -> PlanRequest {
        PlanRequest {
            topic: self.topic,
            page_count: self.page_count as usize,
            context_text: self.context_text.unwrap_or_default(),
            language: or_default(self.language, DEFAULT_LANGUAGE),
            audience: self.audience.unwrap_or_default(),
            scene: self.scene.unwrap_or_default(),
            attention: self.attention.unwrap_or_default(),
            purpose: self.purpose.unwrap_or_default(),
            presentation_mode: PresentationMode::from_param(
                self.presentation_mode.as_deref().unwrap_or_default(),
            ),
            style_preset_id: self.style_preset_id.filter(|id| !id.is_empty()),
        }
    }
}

fn record_progress(core: &CoreState, presentation_id: &str, progress: PlanProgress) {
    if let Err(e) = core.set_plan_progress(presentation_id, progress) {
        tracing::warn!(presentation_id, error = %e, "Plan progress not recorded");
    }
}

fn plan_outline(
    core: &CoreState,
    presentation_id: &str,
    request: &PlanRequest,
) -> Result<PlannedOutline, PipelineError> {
    let llm = core.ai().llm()?;
    Planner::new(llm.as_ref()).generate_outline(request, |stage, label, progress| {
        record_progress(core, presentation_id, PlanProgress::new(stage, label, progress));
    })
}

async fn auto_title(core: Arc<CoreState>, topic: String) -> Result<String, ApiError> {
    blocking(move || {
        let llm = core.ai().llm()?;
        Ok(Planner::new(llm.as_ref()).generate_short_title(&topic))
    })
    .await
}

/// `POST /presentations/:id/plan`
pub async fn plan(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<UserContext>,
    Path(id): Path<String>,
    Json(body): Json<PlanBody>,
) -> Result<Json<PlannedOutline>, ApiError> {
    if !(1..=MAX_PAGE_COUNT).contains(&body.page_count) {
        return Err(ApiError::BadRequest(format!(
            "page_count must be between 1 and {MAX_PAGE_COUNT}"
        )));
    }
    owned_presentation(&ctx.core.open_db()?, &id, &caller.user.id)?;

    let title = match auto_title(ctx.core.clone(), body.topic.clone()).await {
        Ok(title) => {
            let patch = PresentationPatch {
                title: Some(title.clone()),
                ..Default::default()
            };
            update_presentation(&ctx.core.open_db()?, &id, &patch)?;
            Some(title)
        }
        Err(e) => {
            tracing::warn!(presentation_id = %id, error = %e, "Auto-title failed");
            None
        }
    };

    record_progress(
        &ctx.core,
        &id,
        PlanProgress::new(PlanStage::ParseParams, "Parsing parameters", 10),
    );

    let request = body.into_request();
    let (core, pid) = (ctx.core.clone(), id.clone());
    let (request, planned) = blocking(move || {
        let planned = plan_outline(&core, &pid, &request);
        Ok((request, planned))
    })
    .await?;

    let failed = |message: String| {
        record_progress(
            &ctx.core,
            &id,
            PlanProgress::new(PlanStage::Failed, "Planning failed", 100),
        );
        ApiError::Planning(message)
    };

    let mut outline = match planned {
        Ok(outline) => outline,
        Err(PipelineError::SlideCountMismatch { expected, actual }) => {
            return Err(failed(format!(
                "Plan must return exactly {expected} slides, got {actual}"
            )))
        }
        Err(e) => return Err(failed(e.to_string())),
    };
    if outline.slides.len() != request.page_count {
        return Err(failed(format!(
            "Plan must return exactly {} slides, got {}",
            request.page_count,
            outline.slides.len()
        )));
    }

    let params = json!({
        "language": request.language,
        "presentation_mode": request.presentation_mode.as_str(),
        "style_preset_id": request.style_preset_id.clone().unwrap_or_default(),
        "audience": request.audience,
        "scene": request.scene,
        "attention": request.attention,
        "purpose": request.purpose,
        "page_count": request.page_count,
        "outline": outline.slides,
    });
    let patch = PresentationPatch {
        global_style: Some(outline.global_style_prompt.clone())
            .filter(|style| !style.is_empty()),
        params: Some(params),
        ..Default::default()
    };
    update_presentation(&ctx.core.open_db()?, &id, &patch)?;

    outline.session_title = title;
    record_progress(
        &ctx.core,
        &id,
        PlanProgress::new(PlanStage::Done, "Planning complete", 100),
    );
    tracing::info!(presentation_id = %id, slides = outline.slides.len(), "Plan ready");
    Ok(Json(outline))
}

struct ProgressFeed {
    core: Arc<CoreState>,
    presentation_id: String,
    last_payload: Option<String>,
    finished: bool,
}

/// `GET /presentations/:id/plan-progress`
///
/// Emits a `progress` event whenever the payload changes and a final
/// `done` event once planning has finished or failed.
pub async fn progress_stream(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = ProgressFeed {
        core: ctx.core.clone(),
        presentation_id: id,
        last_payload: None,
        finished: false,
    };

    let events = stream::unfold(feed, |mut feed| async move {
        if feed.finished {
            return None;
        }
        loop {
            let progress = feed
                .core
                .plan_progress(&feed.presentation_id)
                .unwrap_or_else(|_| PlanProgress::idle());
            let payload = serde_json::to_string(&progress).unwrap_or_else(|_| "{}".into());

            if feed.last_payload.as_deref() != Some(payload.as_str()) {
                feed.last_payload = Some(payload.clone());
                let event = Event::default().event("progress").data(payload);
                return Some((Ok(event), feed));
            }
            if progress.stage.is_terminal() {
                feed.finished = true;
                return Some((Ok(Event::default().event("done").data("{}")), feed));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    });

    Sse::new(events)
}
