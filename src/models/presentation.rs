use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::GenerationStatus;
use super::slide::SlideView;

/// A presentation row as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub topic: Option<String>,
    pub global_style: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
    pub generation_status: GenerationStatus,
    pub generation_current: i64,
    pub generation_total: i64,
    pub generation_error: Option<String>,
    pub params: Option<Value>,
    pub is_published: bool,
    pub published_at: Option<String>,
}

impl Presentation {
    /// Topic shown to clients: the stored topic, else the title.
    pub fn display_topic(&self) -> String {
        match &self.topic {
            Some(topic) if !topic.is_empty() => topic.clone(),
            _ => self.title.clone(),
        }
    }

    /// The stored outline, if a plan or generation request saved one.
    pub fn outline(&self) -> Option<Vec<Value>> {
        self.params
            .as_ref()
            .and_then(|p| p.get("outline"))
            .and_then(Value::as_array)
            .cloned()
    }
}

/// Partial update applied by `update_presentation`.
#[derive(Debug, Clone, Default)]
pub struct PresentationPatch {
    pub title: Option<String>,
    pub global_style: Option<String>,
    pub params: Option<Value>,
}

/// Item in the owner's presentation list.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationSummary {
    pub id: String,
    pub topic: String,
    pub title: String,
    pub created_at: f64,
    pub preview_image: Option<String>,
    pub generation_status: GenerationStatus,
    pub generation_current: i64,
    pub generation_total: i64,
    pub params: Option<Value>,
    pub user_id: Option<String>,
    pub is_published: i64,
}

/// Full presentation with its visible slides.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationDetail {
    pub id: String,
    pub user_id: Option<String>,
    pub topic: String,
    pub title: String,
    pub global_style: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
    pub slides: Vec<SlideView>,
    pub chat_history: Vec<Value>,
    pub params: Option<Value>,
}

/// Recycle-bin entry.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedPresentation {
    pub id: String,
    pub topic: String,
    pub title: String,
    pub created_at: f64,
    pub deleted_at: f64,
    pub preview_image: Option<String>,
    pub params: Option<Value>,
}

/// Public gallery card.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryItem {
    pub id: String,
    pub topic: String,
    pub title: String,
    pub created_at: f64,
    pub published_at: f64,
    pub preview_image: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
}

/// Published presentation as shown to anonymous viewers. Each slide
/// carries only its active version.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryDetail {
    pub id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub topic: String,
    pub title: String,
    pub global_style: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
    pub published_at: f64,
    pub slides: Vec<SlideView>,
    pub chat_history: Vec<Value>,
    pub params: Option<Value>,
}

/// Row in the admin presentation listing.
#[derive(Debug, Clone, Serialize)]
pub struct AdminPresentationItem {
    pub id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub topic: String,
    pub title: String,
    pub created_at: f64,
    pub preview_image: Option<String>,
    pub generation_status: GenerationStatus,
    pub generation_current: i64,
    pub generation_total: i64,
    pub params: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(topic: Option<&str>, params: Option<Value>) -> Presentation {
        Presentation {
            id: "p1".into(),
            user_id: Some("u1".into()),
            title: "Quarterly review".into(),
            topic: topic.map(String::from),
            global_style: None,
            created_at: String::new(),
            updated_at: String::new(),
            deleted_at: None,
            generation_status: GenerationStatus::Idle,
            generation_current: 0,
            generation_total: 0,
            generation_error: None,
            params,
            is_published: false,
            published_at: None,
        }
    }

    #[test]
    fn display_topic_falls_back_to_title() {
        assert_eq!(sample(None, None).display_topic(), "Quarterly review");
        assert_eq!(sample(Some(""), None).display_topic(), "Quarterly review");
        assert_eq!(sample(Some("Q3"), None).display_topic(), "Q3");
    }

    #[test]
    fn outline_reads_params() {
        let params = serde_json::json!({"outline": [{"title": "a"}, {"title": "b"}]});
        assert_eq!(sample(None, Some(params)).outline().unwrap().len(), 2);
        assert!(sample(None, Some(serde_json::json!({}))).outline().is_none());
    }
}
