use serde_json::Value;

use super::client::ImageClient;
use super::prompts::{creative_prompt, modification_prompt, plan_prompt};
use crate::db::repository::ContextMessage;
use crate::models::PresentationMode;
use crate::pipeline::PipelineError;

/// Turns slide descriptions into images through an [`ImageClient`].
pub struct SlideImager<'a> {
    client: &'a dyn ImageClient,
}

impl<'a> SlideImager<'a> {
    pub fn new(client: &'a dyn ImageClient) -> Self {
        Self { client }
    }

    /// Creative mode: a free-form prompt, styled after the previous slide
    /// when its prompt is known.
    pub fn generate_slide_image(
        &self,
        prompt: &str,
        reference_style: Option<&str>,
    ) -> Result<Option<String>, PipelineError> {
        self.client.generate(&creative_prompt(prompt, reference_style), None)
    }

    /// Plan mode: render an outline slide with the deck's shared style.
    pub fn generate_slide_image_from_plan(
        &self,
        slide: &Value,
        global_style: &str,
        mode: PresentationMode,
    ) -> Result<Option<String>, PipelineError> {
        self.client.generate(&plan_prompt(slide, global_style, mode), None)
    }

    /// Edit an existing slide image in place.
    pub fn modify_slide_image(
        &self,
        request: &str,
        base_image: &str,
        history: &[ContextMessage],
    ) -> Result<Option<String>, PipelineError> {
        self.client
            .generate(&modification_prompt(request, history), Some(base_image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MockImageClient;
    use serde_json::json;

    #[test]
    fn each_mode_sends_its_prompt() {
        let mock = MockImageClient::default();
        let imager = SlideImager::new(&mock);

        imager.generate_slide_image("Roadmap", Some("cover prompt")).unwrap();
        imager
            .generate_slide_image_from_plan(&json!({"visual_subject": "a map"}), "ink", PresentationMode::Slides)
            .unwrap();
        imager
            .modify_slide_image("red title", "data:image/png;base64,QUJD", &[])
            .unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].prompt.contains("[[ cover prompt ]]"));
        assert!(calls[0].image.is_none());
        assert!(calls[1].prompt.contains("SUBJECT: a map"));
        assert!(calls[2].prompt.contains("precise slide editor"));
        assert_eq!(calls[2].image.as_deref(), Some("data:image/png;base64,QUJD"));
    }
}
