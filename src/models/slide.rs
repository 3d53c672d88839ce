use serde::{Deserialize, Serialize};

/// A slide position inside a presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slide {
    pub id: String,
    pub presentation_id: String,
    pub position: i64,
    pub active_version_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

/// One rendered image of a slide. Versions are never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlideVersion {
    pub id: String,
    pub slide_id: String,
    pub image_path: String,
    pub prompt: Option<String>,
    pub base_image_path: Option<String>,
    pub version_number: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionView {
    pub id: String,
    pub image_url: String,
    pub prompt: Option<String>,
    pub base_image_url: Option<String>,
    pub version_number: i64,
    pub timestamp: f64,
}

impl From<&SlideVersion> for VersionView {
    fn from(v: &SlideVersion) -> Self {
        Self {
            id: v.id.clone(),
            image_url: v.image_path.clone(),
            prompt: v.prompt.clone(),
            base_image_url: v.base_image_path.clone(),
            version_number: v.version_number,
            timestamp: crate::db::epoch_seconds(&v.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlideView {
    pub slide_id: String,
    pub index: i64,
    pub position: i64,
    pub active_version_id: Option<String>,
    pub versions: Vec<VersionView>,
}

impl SlideView {
    /// Build the view; a slide without an explicit active version
    /// reports its newest version as active.
    pub fn new(slide: &Slide, versions: &[SlideVersion]) -> Self {
        let active_version_id = slide
            .active_version_id
            .clone()
            .or_else(|| versions.last().map(|v| v.id.clone()));
        Self {
            slide_id: slide.id.clone(),
            index: slide.position,
            position: slide.position,
            active_version_id,
            versions: versions.iter().map(VersionView::from).collect(),
        }
    }
}
