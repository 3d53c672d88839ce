use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use uuid::Uuid;

use crate::pipeline::PipelineError;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Public URL prefix the router serves the images directory under.
pub const IMAGES_URL_PREFIX: &str = "/images";

/// Rendered slide images on disk, one directory per presentation.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

/// A single plain path segment: no separators, no `.` or `..`.
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !segment.contains(['/', '\\'])
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a generated image and return its public URL.
    ///
    /// Accepts a `data:` URL, an http(s) URL or bare base64. Undecodable
    /// payloads and failed downloads give `Ok(None)`.
    pub fn save(&self, image: &str, presentation_id: &str) -> Result<Option<String>, PipelineError> {
        if !is_plain_segment(presentation_id) {
            return Err(PipelineError::ImageSave(format!(
                "invalid presentation id: {presentation_id}"
            )));
        }

        let bytes = if let Some(rest) = image.strip_prefix("data:") {
            let Some((_, encoded)) = rest.split_once(',') else {
                return Ok(None);
            };
            match STANDARD.decode(encoded.trim()) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "Image data URL is not valid base64");
                    return Ok(None);
                }
            }
        } else if image.starts_with("http") {
            match download(image)? {
                Some(bytes) => bytes,
                None => return Ok(None),
            }
        } else {
            match STANDARD.decode(image.trim()) {
                Ok(bytes) => bytes,
                Err(_) => return Ok(None),
            }
        };

        let dir = self.root.join(presentation_id);
        fs::create_dir_all(&dir)?;
        let filename = format!("{}.png", Uuid::new_v4());
        fs::write(dir.join(&filename), bytes)?;

        Ok(Some(format!("{IMAGES_URL_PREFIX}/{presentation_id}/{filename}")))
    }

    /// Resolve an image URL or path to a file inside the store.
    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = if let Some(idx) = url.rfind("/images/") {
            &url[idx + "/images/".len()..]
        } else if let Some(idx) = url.rfind("images/") {
            &url[idx + "images/".len()..]
        } else {
            url
        };
        let relative = relative.trim_start_matches(['/', '\\']);
        if relative.is_empty() {
            return None;
        }

        let path = Path::new(relative);
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            tracing::warn!(url, "Refusing image path outside the store");
            return None;
        }
        Some(self.root.join(path))
    }

    /// Read a stored image back as a `data:` URL, for image editing.
    pub fn encode_local(&self, url: &str) -> Option<String> {
        let path = self.resolve(url)?;
        let mime = mime_guess::from_path(&path).first_raw().unwrap_or("image/png");
        match fs::read(&path) {
            Ok(bytes) => Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes))),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Stored image unreadable");
                None
            }
        }
    }

    /// Delete every image of a presentation. Missing directories are fine.
    pub fn remove_presentation_dir(&self, presentation_id: &str) -> Result<(), PipelineError> {
        if !is_plain_segment(presentation_id) {
            return Err(PipelineError::ImageSave(format!(
                "invalid presentation id: {presentation_id}"
            )));
        }
        let dir = self.root.join(presentation_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Fetch a remote image. A non-200 reply means no image; a transport
/// failure is a save failure like any other.
fn download(url: &str) -> Result<Option<Vec<u8>>, PipelineError> {
    let failed =
        |e: reqwest::Error| PipelineError::ImageSave(format!("image download failed: {e}"));
    let client = reqwest::blocking::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(failed)?;
    let response = client.get(url).send().map_err(failed)?;
    if response.status() != reqwest::StatusCode::OK {
        tracing::warn!(status = %response.status(), "Image download failed");
        return Ok(None);
    }
    let bytes = response.bytes().map_err(failed)?;
    Ok(Some(bytes.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MOCK_PNG_DATA_URL;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store() -> (TempDir, ImageStore) {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::new(dir.path().join("images"));
        (dir, store)
    }

    #[test]
    fn save_data_url_writes_png() {
        let (_dir, store) = store();
        let url = store.save(MOCK_PNG_DATA_URL, "deck-1").unwrap().unwrap();
        assert!(url.starts_with("/images/deck-1/"));
        assert!(url.ends_with(".png"));

        let file = store.root().join(url.trim_start_matches("/images/"));
        let bytes = fs::read(file).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn save_raw_base64_and_rejects_garbage() {
        let (_dir, store) = store();
        assert!(store.save("QUJD", "deck").unwrap().is_some());
        assert!(store.save("%%% not base64 %%%", "deck").unwrap().is_none());
        assert!(store.save("data:image/png;base64,@@@", "deck").unwrap().is_none());
    }

    #[test]
    fn save_rejects_traversal_ids() {
        let (_dir, store) = store();
        assert!(store.save("QUJD", "../escape").is_err());
        assert!(store.save("QUJD", "..").is_err());
        assert!(store.remove_presentation_dir("a/b").is_err());
    }

    #[tokio::test]
    async fn save_downloads_http_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (_dir, store) = store();
        let ok_url = format!("{}/img.png", server.uri());
        let missing_url = format!("{}/missing.png", server.uri());
        let (ok, missing) = tokio::task::spawn_blocking(move || {
            (store.save(&ok_url, "deck").unwrap(), store.save(&missing_url, "deck").unwrap())
        })
        .await
        .unwrap();

        assert!(ok.is_some());
        assert!(missing.is_none());
    }

    #[test]
    fn unreachable_download_is_a_save_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (_dir, store) = store();
        let err = store
            .save(&format!("http://127.0.0.1:{port}/gone.png"), "deck")
            .unwrap_err();
        assert!(matches!(err, PipelineError::ImageSave(_)), "got {err:?}");

        let api: crate::api::error::ApiError = err.into();
        assert_eq!(
            axum::response::IntoResponse::into_response(api).status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn encode_local_round_trips_saved_image() {
        let (_dir, store) = store();
        let url = store.save(MOCK_PNG_DATA_URL, "deck").unwrap().unwrap();
        let encoded = store.encode_local(&url).unwrap();
        let payload = encoded.strip_prefix("data:image/png;base64,").unwrap();
        let file = store.root().join(url.trim_start_matches("/images/"));
        assert_eq!(STANDARD.decode(payload).unwrap(), fs::read(file).unwrap());

        let absolute = format!("http://localhost:8002{url}");
        assert!(store.encode_local(&absolute).is_some());
    }

    #[test]
    fn encode_local_refuses_traversal_and_missing_files() {
        let (dir, store) = store();
        fs::write(dir.path().join("secret.txt"), b"x").unwrap();
        assert!(store.encode_local("/images/../secret.txt").is_none());
        assert!(store.encode_local("/images/deck/nope.png").is_none());
        assert!(store.encode_local("").is_none());
    }

    #[test]
    fn remove_presentation_dir_is_idempotent() {
        let (_dir, store) = store();
        store.save(MOCK_PNG_DATA_URL, "deck").unwrap();
        assert!(store.root().join("deck").exists());
        store.remove_presentation_dir("deck").unwrap();
        assert!(!store.root().join("deck").exists());
        store.remove_presentation_dir("deck").unwrap();
    }
}
