//! Background rendering job: turns an outline into slide images one by
//! one, charging the owner and recording progress on the presentation.

use rusqlite::Connection;
use serde_json::{Map, Value};

use super::{ImageClient, PipelineError, SlideImager};
use crate::core_state::CoreState;
use crate::db::repository::{
    add_slide_version, charge_slide, get_scores_per_slide, merge_presentation_params,
    update_generation_progress,
};
use crate::models::{GenerationStatus, PresentationMode};

/// Marker set on outline entries whose image is already stored.
pub const GENERATED_MARKER: &str = "_generated";
const PLAN_VERSION_PROMPT: &str = "Generated from plan";

fn text<'a>(slide: &'a Value, key: &str) -> &'a str {
    slide.get(key).and_then(Value::as_str).unwrap_or("")
}

fn is_generated(slide: &Value) -> bool {
    slide
        .get(GENERATED_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Whether an outline entry carries anything an image can be made from.
pub fn is_renderable(slide: &Value) -> bool {
    ["visual_prompt", "prompt", "visual_subject", "global_style_prompt"]
        .iter()
        .any(|key| !text(slide, key).is_empty())
}

pub fn count_renderable(slides: &[Value]) -> i64 {
    slides.iter().filter(|s| is_renderable(s)).count() as i64
}

/// Slides already rendered by an earlier run of the same outline.
pub fn count_generated(slides: &[Value]) -> i64 {
    slides
        .iter()
        .filter(|s| is_renderable(s) && is_generated(s))
        .count() as i64
}

struct Job<'a> {
    conn: &'a Connection,
    core: &'a CoreState,
    presentation_id: &'a str,
    user_id: Option<&'a str>,
    scores_per_slide: i64,
    completed: i64,
    total: i64,
}

impl Job<'_> {
    fn save_outline(&self, slides: &[Value]) -> Result<(), PipelineError> {
        let mut entries = Map::new();
        entries.insert("outline".into(), Value::Array(slides.to_vec()));
        merge_presentation_params(self.conn, self.presentation_id, entries)?;
        Ok(())
    }

    fn progress(&self, status: GenerationStatus, error: Option<&str>) -> Result<(), PipelineError> {
        update_generation_progress(
            self.conn,
            self.presentation_id,
            status,
            self.completed,
            self.total,
            error,
        )?;
        Ok(())
    }

    fn render_all(&mut self, images: &dyn ImageClient, slides: &mut [Value]) -> Result<(), PipelineError> {
        let imager = SlideImager::new(images);
        let mut prev_prompt: Option<String> = None;

        for index in 0..slides.len() {
            let item = &slides[index];
            if is_generated(item) {
                continue;
            }
            let prompt = match text(item, "visual_prompt") {
                "" => text(item, "prompt"),
                p => p,
            }
            .to_string();
            let subject = text(item, "visual_subject").to_string();
            let global_style = text(item, "global_style_prompt");
            let has_plan_fields = !subject.is_empty() || !global_style.is_empty();
            if prompt.is_empty() && !has_plan_fields {
                continue;
            }

            let image = if has_plan_fields {
                let mode = PresentationMode::from_param(text(item, "presentation_mode"));
                imager.generate_slide_image_from_plan(item, global_style, mode)?
            } else {
                imager.generate_slide_image(&prompt, prev_prompt.as_deref())?
            };
            let Some(image) = image else {
                tracing::warn!(presentation_id = self.presentation_id, index, "No image for slide");
                continue;
            };
            let Some(path) = self.core.images().save(&image, self.presentation_id)? else {
                tracing::warn!(presentation_id = self.presentation_id, index, "Slide image not saved");
                continue;
            };

            let version_prompt = if !prompt.is_empty() {
                prompt.clone()
            } else if !subject.is_empty() {
                subject.clone()
            } else {
                PLAN_VERSION_PROMPT.to_string()
            };
            add_slide_version(self.conn, self.presentation_id, index as i64, &path, &version_prompt, None)?;

            if let Some(user_id) = self.user_id {
                if self.scores_per_slide > 0
                    && !charge_slide(self.conn, user_id, self.scores_per_slide, &version_prompt, &path)?
                {
                    tracing::warn!(user_id, "Balance ran out during generation");
                }
            }

            if let Some(obj) = slides[index].as_object_mut() {
                obj.insert(GENERATED_MARKER.into(), Value::Bool(true));
            }
            self.save_outline(slides)?;
            self.completed += 1;
            self.progress(GenerationStatus::Generating, None)?;
            tracing::info!(
                presentation_id = self.presentation_id,
                done = self.completed,
                total = self.total,
                "Slide rendered"
            );

            if !prompt.is_empty() {
                prev_prompt = Some(prompt);
            } else if !subject.is_empty() {
                prev_prompt = Some(subject);
            }
        }
        Ok(())
    }
}

/// Render every pending slide of `slides` for a presentation.
///
/// Blocking; run it through `spawn_blocking`. Failures are recorded on the
/// presentation's progress rather than returned.
pub fn run_generation(core: &CoreState, presentation_id: &str, mut slides: Vec<Value>, user_id: Option<&str>) {
    let conn = match core.open_db() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(presentation_id, error = %e, "Generation job could not open database");
            return;
        }
    };

    let mut job = Job {
        conn: &conn,
        core,
        presentation_id,
        user_id,
        scores_per_slide: 0,
        completed: count_generated(&slides),
        total: count_renderable(&slides),
    };

    let result = (|| -> Result<(), PipelineError> {
        if user_id.is_some() {
            job.scores_per_slide = get_scores_per_slide(&conn)?;
        }
        if !slides.is_empty() {
            job.save_outline(&slides)?;
        }
        if job.total == 0 {
            return job.progress(GenerationStatus::Completed, None);
        }

        let images = core.ai().images()?;
        job.render_all(images.as_ref(), &mut slides)?;

        if job.completed >= job.total {
            tracing::info!(presentation_id, total = job.total, "Generation completed");
            job.progress(GenerationStatus::Completed, None)
        } else {
            tracing::warn!(
                presentation_id,
                done = job.completed,
                total = job.total,
                "Generation finished with missing slides"
            );
            job.progress(GenerationStatus::Failed, Some("Generation interrupted"))
        }
    })();

    if let Err(e) = result {
        tracing::error!(presentation_id, error = %e, "Generation failed");
        let message = e.to_string();
        if let Err(e) = job.progress(GenerationStatus::Failed, Some(&message)) {
            tracing::error!(presentation_id, error = %e, "Could not record generation failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::repository::{
        create_presentation, create_user, find_presentation, get_generation_progress,
        get_user_scores, list_score_logs_by_user, slide_views,
    };
    use crate::pipeline::{MockAiProvider, MockImageClient, MockLlmClient};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        core: CoreState,
        images: MockImageClient,
        pid: String,
        uid: String,
    }

    fn fixture(images: MockImageClient, scores: i64) -> Fixture {
        let dir = TempDir::new().unwrap();
        let provider = MockAiProvider::new(MockLlmClient::new(), images.clone());
        let core = CoreState::with_provider(AppConfig::for_tests(dir.path()), Arc::new(provider));
        core.bootstrap().unwrap();
        let conn = core.open_db().unwrap();
        let user = create_user(&conn, "alice", "hash", scores).unwrap().unwrap();
        let pid = create_presentation(&conn, "Solar", None, Some(&user.id)).unwrap();
        Fixture {
            _dir: dir,
            core,
            images,
            pid,
            uid: user.id,
        }
    }

    fn plan_slides() -> Vec<Value> {
        vec![
            json!({"index": 0, "title": "Cover", "visual_subject": "sunrise", "global_style_prompt": "warm", "presentation_mode": "slides"}),
            json!({"index": 1, "title": "Why", "visual_subject": "panels", "global_style_prompt": "warm", "presentation_mode": "slides"}),
        ]
    }

    #[test]
    fn renderable_counts() {
        let slides = vec![
            json!({"visual_prompt": "a"}),
            json!({"title": "no visuals"}),
            json!({"global_style_prompt": "x", "_generated": true}),
        ];
        assert_eq!(count_renderable(&slides), 2);
        assert_eq!(count_generated(&slides), 1);
    }

    #[test]
    fn plan_slides_render_and_charge() {
        let f = fixture(MockImageClient::default(), 10);
        run_generation(&f.core, &f.pid, plan_slides(), Some(&f.uid));

        let conn = f.core.open_db().unwrap();
        let progress = get_generation_progress(&conn, &f.pid).unwrap().unwrap();
        assert_eq!(progress.status, GenerationStatus::Completed);
        assert_eq!((progress.current, progress.total), (2, 2));

        assert_eq!(slide_views(&conn, &f.pid).unwrap().len(), 2);
        assert_eq!(get_user_scores(&conn, &f.uid).unwrap(), 8);
        let (logs, total) = list_score_logs_by_user(&conn, &f.uid, 0, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(logs.iter().filter(|l| l.prompt.as_deref() == Some("sunrise")).count(), 1);

        let outline = find_presentation(&conn, &f.pid, None).unwrap().unwrap().outline().unwrap();
        assert!(outline.iter().all(|s| s[GENERATED_MARKER] == json!(true)));

        let calls = f.images.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].prompt.contains("SUBJECT: sunrise"));
    }

    #[test]
    fn resume_skips_generated_slides() {
        let f = fixture(MockImageClient::default(), 10);
        let mut slides = plan_slides();
        slides[0][GENERATED_MARKER] = json!(true);
        run_generation(&f.core, &f.pid, slides, Some(&f.uid));

        let conn = f.core.open_db().unwrap();
        let progress = get_generation_progress(&conn, &f.pid).unwrap().unwrap();
        assert_eq!(progress.status, GenerationStatus::Completed);
        assert_eq!(progress.current, 2);
        assert_eq!(f.images.calls().len(), 1);
        assert_eq!(get_user_scores(&conn, &f.uid).unwrap(), 9);
    }

    #[test]
    fn creative_slides_reference_previous_prompt() {
        let f = fixture(MockImageClient::default(), 10);
        let slides = vec![json!({"prompt": "blue cover"}), json!({"visual_prompt": "agenda"})];
        run_generation(&f.core, &f.pid, slides, None);

        let calls = f.images.calls();
        assert!(calls[0].prompt.ends_with("**SLIDE CONTENT**: blue cover"));
        assert!(calls[1].prompt.contains("[[ blue cover ]]"));

        let conn = f.core.open_db().unwrap();
        assert_eq!(get_user_scores(&conn, &f.uid).unwrap(), 10);
    }

    #[test]
    fn missing_images_end_interrupted() {
        let f = fixture(MockImageClient::empty(), 10);
        run_generation(&f.core, &f.pid, plan_slides(), Some(&f.uid));

        let conn = f.core.open_db().unwrap();
        let progress = get_generation_progress(&conn, &f.pid).unwrap().unwrap();
        assert_eq!(progress.status, GenerationStatus::Failed);
        assert_eq!(progress.error.as_deref(), Some("Generation interrupted"));
        assert_eq!(progress.current, 0);
        assert_eq!(get_user_scores(&conn, &f.uid).unwrap(), 10);
    }

    #[test]
    fn nothing_renderable_completes_empty() {
        let f = fixture(MockImageClient::default(), 10);
        run_generation(&f.core, &f.pid, vec![json!({"title": "text only"})], Some(&f.uid));

        let conn = f.core.open_db().unwrap();
        let progress = get_generation_progress(&conn, &f.pid).unwrap().unwrap();
        assert_eq!(progress.status, GenerationStatus::Completed);
        assert_eq!((progress.current, progress.total), (0, 0));
        assert!(f.images.calls().is_empty());
    }

    #[test]
    fn outline_save_keeps_other_params() {
        let f = fixture(MockImageClient::default(), 10);
        let conn = f.core.open_db().unwrap();
        let mut entries = Map::new();
        entries.insert("language".into(), json!("de"));
        merge_presentation_params(&conn, &f.pid, entries).unwrap();

        run_generation(&f.core, &f.pid, plan_slides(), None);

        let params = find_presentation(&conn, &f.pid, None).unwrap().unwrap().params.unwrap();
        assert_eq!(params["language"], "de");
        assert_eq!(params["outline"].as_array().unwrap().len(), 2);
    }
}
