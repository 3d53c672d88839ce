//! HTTP router for the slide API.
//!
//! Route groups and their middleware:
//! - public: health, gallery, plan-progress stream
//! - credentials: register and login, rate limited per client
//! - member routes behind `require_user`
//! - `/admin/*` behind `require_admin`
//!
//! Stored images are served under `/images` with caching disabled.

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::middleware::from_fn;
use axum::routing::{delete, get, patch, post};
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use super::endpoints;
use super::middleware;
use super::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router for a running server.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

#[cfg(test)]
pub(crate) fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    let public = Router::new()
        .route("/", get(endpoints::health::check))
        .route("/gallery", get(endpoints::gallery::list))
        .route("/gallery/:id", get(endpoints::gallery::detail))
        .route(
            "/presentations/:id/plan-progress",
            get(endpoints::planning::progress_stream),
        )
        .with_state(ctx.clone());

    let credentials = Router::new()
        .route("/auth/register", post(endpoints::auth::register))
        .route("/auth/login", post(endpoints::auth::login))
        .route("/admin/auth/login", post(endpoints::auth::admin_login))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::rate::limit))
        .layer(Extension(ctx.clone()));

    let member = member_routes()
        .with_state(ctx.clone())
        .layer(from_fn(middleware::auth::require_user))
        .layer(Extension(ctx.clone()));

    let admin = admin_routes()
        .with_state(ctx.clone())
        .layer(from_fn(middleware::auth::require_admin))
        .layer(Extension(ctx.clone()));

    let images = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .service(ServeDir::new(ctx.core.config.images_dir()));

    Router::new()
        .merge(public)
        .merge(credentials)
        .merge(member)
        .merge(admin)
        .nest_service("/images", images)
        .layer(CorsLayer::permissive())
}

fn member_routes() -> Router<ApiContext> {
    use endpoints::{auth, generation, planning, presentations, slides, upload, user, versions};

    Router::new()
        // Account
        .route("/auth/me", get(auth::me))
        .route("/user/redeem", post(user::redeem))
        .route(
            "/user/invite-codes",
            post(user::create_invite_code).get(user::list_invite_codes),
        )
        .route("/user/me/password", patch(user::change_password))
        .route("/user/score-logs", get(user::score_logs))
        // Presentations
        .route(
            "/presentations",
            get(presentations::list).post(presentations::create),
        )
        .route(
            "/presentations/deleted",
            get(presentations::list_deleted).delete(presentations::clear_deleted),
        )
        .route(
            "/presentations/:id",
            get(presentations::detail)
                .patch(presentations::update)
                .delete(presentations::remove),
        )
        .route("/presentations/:id/restore", post(presentations::restore))
        .route(
            "/presentations/:id/permanent",
            delete(presentations::remove_permanently),
        )
        .route("/presentations/:id/publish", post(presentations::toggle_publish))
        // Planning and rendering
        .route("/presentations/:id/plan", post(planning::plan))
        .route("/presentations/:id/generate", post(generation::generate))
        .route(
            "/presentations/:id/generate-from-outline",
            post(generation::generate_from_outline),
        )
        .route("/presentations/:id/resume-generate", post(generation::resume))
        .route(
            "/presentations/:id/generation-progress",
            get(generation::progress),
        )
        // Slides
        .route("/presentations/:id/slides", post(slides::insert))
        .route(
            "/presentations/:id/slides/insert",
            post(slides::insert_from_outline),
        )
        .route("/presentations/:id/slides/deleted", get(slides::list_deleted))
        .route(
            "/presentations/:id/slides/:slide_id",
            get(slides::detail).delete(slides::remove),
        )
        .route(
            "/presentations/:id/slides/:slide_id/restore",
            post(slides::restore),
        )
        // Versions
        .route(
            "/presentations/:id/slides/:slide_id/versions",
            post(versions::create).get(versions::list),
        )
        .route(
            "/presentations/:id/slides/:slide_id/active-version",
            patch(versions::set_active),
        )
        .route(
            "/presentations/:id/slides/:slide_id/versions/:version_id",
            delete(versions::remove),
        )
        .route("/upload/doc", post(upload::upload_doc))
}

fn admin_routes() -> Router<ApiContext> {
    use endpoints::admin;

    Router::new()
        .route("/admin/me", get(admin::me))
        .route("/admin/me/password", patch(admin::change_password))
        .route(
            "/admin/users",
            get(admin::list_users).post(admin::create_member),
        )
        .route("/admin/presentations", get(admin::list_presentations))
        .route("/admin/presentations/:id", get(admin::presentation_detail))
        .route(
            "/admin/config",
            get(admin::get_pricing).patch(admin::update_pricing),
        )
        .route(
            "/admin/redemption-codes",
            post(admin::create_redemption).get(admin::list_redemption),
        )
        .route(
            "/admin/redemption-codes/:id",
            delete(admin::delete_redemption),
        )
        .route(
            "/admin/invite-codes",
            post(admin::create_invites).get(admin::list_invites),
        )
        .route("/admin/invite-codes/:id", delete(admin::delete_invite))
        .route("/admin/score-logs", get(admin::score_logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::RateLimiter;
    use crate::auth::{hash_password, issue_token, TokenRole};
    use crate::config::AppConfig;
    use crate::db::repository::{
        create_presentation, create_user, get_admin_by_username, get_generation_progress,
        get_user_by_id, merge_presentation_params,
    };
    use crate::models::GenerationStatus;
    use crate::pipeline::{MockAiProvider, MockImageClient, MockLlmClient};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        _dir: TempDir,
        core: Arc<CoreState>,
        router: Router,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_llm(MockLlmClient::new())
        }

        fn with_llm(llm: MockLlmClient) -> Self {
            let dir = TempDir::new().unwrap();
            let core = CoreState::with_provider(
                AppConfig::for_tests(dir.path()),
                Arc::new(MockAiProvider::new(llm, MockImageClient::default())),
            );
            core.bootstrap().unwrap();
            let core = Arc::new(core);
            let router = api_router(core.clone());
            Self {
                _dir: dir,
                core,
                router,
            }
        }

        /// Member with `scores` and a signed token.
        fn member(&self, username: &str, scores: i64) -> (String, String) {
            let conn = self.core.open_db().unwrap();
            let user = create_user(&conn, username, "unused", scores)
                .unwrap()
                .unwrap();
            let token =
                issue_token(&self.core.config.jwt_secret, &user.id, TokenRole::User).unwrap();
            (user.id, token)
        }

        fn admin_token(&self) -> String {
            let conn = self.core.open_db().unwrap();
            let admin = get_admin_by_username(&conn, "admin").unwrap().unwrap();
            issue_token(&self.core.config.jwt_secret, &admin.id, TokenRole::Admin).unwrap()
        }

        fn presentation(&self, owner: &str, topic: &str) -> String {
            let conn = self.core.open_db().unwrap();
            create_presentation(&conn, topic, Some(topic), Some(owner)).unwrap()
        }

        async fn send(&self, req: Request<Body>) -> Response {
            self.router.clone().oneshot(req).await.unwrap()
        }
    }

    fn make_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn response_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn outline_reply(count: usize) -> String {
        let slides: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "index": i,
                    "title": format!("Slide {i}"),
                    "content_summary": "• first point\n• second point",
                    "visual_subject": "a lighthouse at dawn"
                })
            })
            .collect();
        json!({ "slides": slides }).to_string()
    }

    fn planning_mock(pages: usize) -> MockLlmClient {
        MockLlmClient::new()
            .with_reply("concise title", "Solar Pitch")
            .with_reply("keyword extraction assistant", "- sun\n- energy\n- storage")
            .with_reply("Final Integration Agent", &outline_reply(pages))
            .with_reply("Art Director", r#"{"global_style_prompt": "warm golden light", "style_meta": {"mood": "hopeful"}}"#)
            .with_reply("Hook Agent", "Power Without Smoke")
            .with_reply("Structure Agent", "1. Sun\n2. Storage\n3. Scale")
            .with_reply("Content Agent", "refined material")
    }

    fn refiner_mock(pages: usize) -> MockLlmClient {
        MockLlmClient::new().with_reply("outline refiner", &outline_reply(pages))
    }

    async fn wait_for_generation(core: &CoreState, pid: &str) -> GenerationStatus {
        for _ in 0..200 {
            let status = {
                let conn = core.open_db().unwrap();
                get_generation_progress(&conn, pid).unwrap().unwrap().status
            };
            if status != GenerationStatus::Generating {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        GenerationStatus::Generating
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = TestApp::new();
        let response = app.send(make_request("GET", "/", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["status"], "running");
    }

    #[tokio::test]
    async fn member_routes_require_token() {
        let app = TestApp::new();
        let response = app.send(make_request("GET", "/presentations", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = response_json(response).await;
        assert_eq!(body["error"]["code"], "AUTH_REQUIRED");

        let response = app
            .send(make_request("GET", "/auth/me", Some("not-a-token"), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tokens_are_not_interchangeable_between_roles() {
        let app = TestApp::new();
        let (_, user_token) = app.member("dana", 0);
        let admin_token = app.admin_token();

        let response = app
            .send(make_request("GET", "/admin/me", Some(&user_token), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .send(make_request("GET", "/auth/me", Some(&admin_token), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .send(make_request("GET", "/admin/me", Some(&admin_token), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["username"], "admin");
    }

    #[tokio::test]
    async fn register_with_admin_invite_then_login() {
        let app = TestApp::new();
        let admin_token = app.admin_token();

        let response = app
            .send(make_request(
                "POST",
                "/admin/invite-codes",
                Some(&admin_token),
                Some(json!({"count": 1})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let code = response_json(response).await["codes"][0]
            .as_str()
            .unwrap()
            .to_string();

        let register = json!({"invite_code": code, "username": "erin", "password": "pw-123456"});
        let response = app
            .send(make_request("POST", "/auth/register", None, Some(register.clone())))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["user"]["username"], "erin");
        assert_eq!(body["user"]["scores"], 50);

        // The invite is spent.
        let again = json!({"invite_code": code, "username": "frank", "password": "pw"});
        let response = app
            .send(make_request("POST", "/auth/register", None, Some(again)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let login = json!({"username": "erin", "password": "pw-123456"});
        let response = app
            .send(make_request("POST", "/auth/login", None, Some(login)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = response_json(response).await["access_token"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .send(make_request("GET", "/auth/me", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let me = response_json(response).await;
        assert_eq!(me["username"], "erin");
        assert_eq!(me["scores_per_slide"], 1);

        let wrong = json!({"username": "erin", "password": "nope"});
        let response = app
            .send(make_request("POST", "/auth/login", None, Some(wrong)))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn credential_routes_are_rate_limited() {
        let dir = TempDir::new().unwrap();
        let core = CoreState::with_provider(
            AppConfig::for_tests(dir.path()),
            Arc::new(MockAiProvider::default()),
        );
        core.bootstrap().unwrap();
        let ctx = ApiContext {
            core: Arc::new(core),
            rate_limiter: Arc::new(Mutex::new(RateLimiter::with_limits(2, 100))),
        };
        let router = api_router_with_ctx(ctx);

        let login = json!({"username": "ghost", "password": "pw"});
        for _ in 0..2 {
            let response = router
                .clone()
                .oneshot(make_request("POST", "/auth/login", None, Some(login.clone())))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = router
            .clone()
            .oneshot(make_request("POST", "/auth/login", None, Some(login)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key("Retry-After"));

        // Member routes are not limited.
        let response = router
            .oneshot(make_request("GET", "/", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn presentation_lifecycle_through_recycle_bin() {
        let app = TestApp::new();
        let (_, token) = app.member("gina", 0);

        let response = app
            .send(make_request(
                "POST",
                "/presentations",
                Some(&token),
                Some(json!({"topic": "Tidal power"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let pid = response_json(response).await["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .send(make_request(
                "PATCH",
                &format!("/presentations/{pid}"),
                Some(&token),
                Some(json!({"title": "Tides"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(make_request("GET", &format!("/presentations/{pid}"), Some(&token), None))
            .await;
        let detail = response_json(response).await;
        assert_eq!(detail["title"], "Tides");
        assert_eq!(detail["topic"], "Tidal power");

        let response = app
            .send(make_request("DELETE", &format!("/presentations/{pid}"), Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let list = response_json(
            app.send(make_request("GET", "/presentations", Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 0);

        let deleted = response_json(
            app.send(make_request("GET", "/presentations/deleted", Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(deleted["presentations"].as_array().unwrap().len(), 1);

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/restore"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Only recycle-bin entries can be removed permanently.
        let response = app
            .send(make_request(
                "DELETE",
                &format!("/presentations/{pid}/permanent"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        app.send(make_request("DELETE", &format!("/presentations/{pid}"), Some(&token), None))
            .await;
        let response = app
            .send(make_request("DELETE", "/presentations/deleted", Some(&token), None))
            .await;
        assert_eq!(response_json(response).await["deleted_count"], 1);
    }

    #[tokio::test]
    async fn foreign_presentations_are_not_found() {
        let app = TestApp::new();
        let (owner, _) = app.member("hana", 0);
        let (_, intruder) = app.member("ivan", 0);
        let pid = app.presentation(&owner, "Private");

        for (method, uri) in [
            ("GET", format!("/presentations/{pid}")),
            ("DELETE", format!("/presentations/{pid}")),
            ("POST", format!("/presentations/{pid}/publish")),
            ("GET", format!("/presentations/{pid}/generation-progress")),
        ] {
            let response = app.send(make_request(method, &uri, Some(&intruder), None)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn publishing_exposes_presentation_in_gallery() {
        let app = TestApp::new();
        let (owner, token) = app.member("june", 0);
        let pid = app.presentation(&owner, "Open deck");

        let response = app
            .send(make_request("GET", &format!("/gallery/{pid}"), None, None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/publish"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response_json(response).await["is_published"], 1);

        let gallery = response_json(app.send(make_request("GET", "/gallery", None, None)).await).await;
        assert_eq!(gallery["presentations"].as_array().unwrap().len(), 1);
        assert_eq!(gallery["presentations"][0]["username"], "june");

        let response = app
            .send(make_request("GET", &format!("/gallery/{pid}"), None, None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/publish"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response_json(response).await["is_published"], 0);
    }

    #[tokio::test]
    async fn plan_stores_outline_and_streams_completion() {
        let app = TestApp::with_llm(planning_mock(3));
        let (owner, token) = app.member("kai", 0);
        let pid = app.presentation(&owner, "Solar farms");

        let body = json!({"topic": "Solar farms", "page_count": 3, "language": "en"});
        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/plan"),
                Some(&token),
                Some(body),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let outline = response_json(response).await;
        assert_eq!(outline["slides"].as_array().unwrap().len(), 3);
        assert_eq!(outline["global_style_prompt"], "warm golden light");
        assert_eq!(outline["session_title"], "Solar Pitch");

        let detail = response_json(
            app.send(make_request("GET", &format!("/presentations/{pid}"), Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(detail["title"], "Solar Pitch");
        assert_eq!(detail["global_style"], "warm golden light");
        assert_eq!(detail["params"]["outline"].as_array().unwrap().len(), 3);

        let response = app
            .send(make_request(
                "GET",
                &format!("/presentations/{pid}/plan-progress"),
                None,
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16)
            .await
            .unwrap();
        let stream = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(stream.contains("event: progress"));
        assert!(stream.contains("\"stage\":\"done\""));
        assert!(stream.contains("event: done"));
    }

    #[tokio::test]
    async fn plan_rejects_out_of_range_page_count() {
        let app = TestApp::new();
        let (owner, token) = app.member("lena", 0);
        let pid = app.presentation(&owner, "Too long");

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/plan"),
                Some(&token),
                Some(json!({"topic": "Too long", "page_count": 51})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_requires_enough_scores() {
        let app = TestApp::new();
        let (owner, token) = app.member("milo", 1);
        let pid = app.presentation(&owner, "Birds");

        let slides = json!({"slides": [
            {"index": 0, "visual_prompt": "a red fox"},
            {"index": 1, "visual_prompt": "a blue bird"}
        ]});
        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/generate"),
                Some(&token),
                Some(slides),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        let body = response_json(response).await;
        assert_eq!(body["detail"], "Insufficient scores: need 2, have 1");
    }

    #[tokio::test]
    async fn generate_renders_and_charges_in_background() {
        let app = TestApp::new();
        let (owner, token) = app.member("nora", 10);
        let pid = app.presentation(&owner, "Birds");

        let slides = json!({"slides": [
            {"index": 0, "title": "Fox", "visual_prompt": "a red fox"},
            {"index": 1, "title": "Bird", "visual_prompt": "a blue bird"}
        ]});
        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/generate"),
                Some(&token),
                Some(slides),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        assert_eq!(wait_for_generation(&app.core, &pid).await, GenerationStatus::Completed);

        let progress = response_json(
            app.send(make_request(
                "GET",
                &format!("/presentations/{pid}/generation-progress"),
                Some(&token),
                None,
            ))
            .await,
        )
        .await;
        assert_eq!(progress["current"], 2);
        assert_eq!(progress["percentage"], 100);

        let detail = response_json(
            app.send(make_request("GET", &format!("/presentations/{pid}"), Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(detail["slides"].as_array().unwrap().len(), 2);

        let conn = app.core.open_db().unwrap();
        assert_eq!(get_user_by_id(&conn, &owner).unwrap().unwrap().scores, 8);
    }

    #[tokio::test]
    async fn resume_without_outline_is_rejected() {
        let app = TestApp::new();
        let (owner, token) = app.member("omar", 10);
        let pid = app.presentation(&owner, "Empty");

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/resume-generate"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn slide_versions_can_be_added_switched_and_removed() {
        let app = TestApp::new();
        let (owner, token) = app.member("pia", 10);
        let pid = app.presentation(&owner, "Versions");

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/slides"),
                Some(&token),
                Some(json!({"position": 0, "prompt": "a quiet harbour"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let inserted = response_json(response).await;
        let slide_id = inserted["slide_id"].as_str().unwrap().to_string();
        let first_version = inserted["version_id"].as_str().unwrap().to_string();
        assert!(inserted["image_url"]
            .as_str()
            .unwrap()
            .starts_with(&format!("/images/{pid}/")));

        let base = format!("/presentations/{pid}/slides/{slide_id}");
        let response = app
            .send(make_request(
                "DELETE",
                &format!("{base}/versions/{first_version}"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .send(make_request(
                "POST",
                &format!("{base}/versions"),
                Some(&token),
                Some(json!({"prompt": "the harbour at night"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let second_version = response_json(response).await["version_id"]
            .as_str()
            .unwrap()
            .to_string();

        let versions = response_json(
            app.send(make_request("GET", &format!("{base}/versions"), Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(versions["versions"].as_array().unwrap().len(), 2);

        let response = app
            .send(make_request(
                "PATCH",
                &format!("{base}/active-version"),
                Some(&token),
                Some(json!({"version_id": first_version})),
            ))
            .await;
        assert_eq!(response_json(response).await["current_version_id"], first_version.as_str());

        let response = app
            .send(make_request(
                "DELETE",
                &format!("{base}/versions/{second_version}"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        // One charge for the insert, one for the extra version.
        let conn = app.core.open_db().unwrap();
        assert_eq!(get_user_by_id(&conn, &owner).unwrap().unwrap().scores, 8);
    }

    #[tokio::test]
    async fn modification_requires_base_image() {
        let app = TestApp::new();
        let (owner, token) = app.member("quinn", 10);
        let pid = app.presentation(&owner, "Edits");

        let inserted = response_json(
            app.send(make_request(
                "POST",
                &format!("/presentations/{pid}/slides"),
                Some(&token),
                Some(json!({"position": 0, "prompt": "a forest"})),
            ))
            .await,
        )
        .await;
        let slide_id = inserted["slide_id"].as_str().unwrap();

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/slides/{slide_id}/versions"),
                Some(&token),
                Some(json!({"prompt": "add snow", "is_modification": true})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_pricing_update_clamps_values() {
        let app = TestApp::new();
        let token = app.admin_token();

        let response = app
            .send(make_request(
                "PATCH",
                "/admin/config",
                Some(&token),
                Some(json!({"scores_per_slide": 0, "register_bonus_scores": -5})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let config = response_json(
            app.send(make_request("GET", "/admin/config", Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(config["scores_per_slide"], 1);
        assert_eq!(config["register_bonus_scores"], 0);
    }

    #[tokio::test]
    async fn redemption_code_credits_member_once() {
        let app = TestApp::new();
        let admin = app.admin_token();
        let (_, token) = app.member("rosa", 0);

        let created = response_json(
            app.send(make_request(
                "POST",
                "/admin/redemption-codes",
                Some(&admin),
                Some(json!({"scores": 25, "count": 1})),
            ))
            .await,
        )
        .await;
        let code = created["codes"][0].as_str().unwrap().to_string();

        let response = app
            .send(make_request(
                "POST",
                "/user/redeem",
                Some(&token),
                Some(json!({"code": code})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["scores"], 25);
        assert_eq!(body["added"], 25);

        let response = app
            .send(make_request(
                "POST",
                "/user/redeem",
                Some(&token),
                Some(json!({"code": code})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let logs = response_json(
            app.send(make_request("GET", "/user/score-logs", Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(logs["total"], 1);
        assert_eq!(logs["score_logs"][0]["log_type"], "recharge");
    }

    #[tokio::test]
    async fn upload_extracts_plain_text() {
        let app = TestApp::new();
        let (_, token) = app.member("sam", 0);

        let upload = |filename: &str, content: &str| {
            let body = format!(
                "--BOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--BOUNDARY--\r\n"
            );
            Request::builder()
                .method("POST")
                .uri("/upload/doc")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "multipart/form-data; boundary=BOUNDARY")
                .body(Body::from(body))
                .unwrap()
        };

        let response = app.send(upload("notes.txt", "Tides rise twice a day.")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["filename"], "notes.txt");
        assert!(body["extracted_text"]
            .as_str()
            .unwrap()
            .contains("Tides rise twice a day."));

        let response = app.send(upload("tool.exe", "MZ")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Not an OLE compound file: nothing is recovered from the raw bytes.
        let response = app.send(upload("legacy.doc", "Root Entry WordDocument 1Table")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["detail"], "Could not extract text");
    }

    #[tokio::test]
    async fn images_are_served_without_caching() {
        let app = TestApp::new();
        let dir = app.core.config.images_dir().join("deck-1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.png"), b"\x89PNG").unwrap();

        let response = app
            .send(make_request("GET", "/images/deck-1/a.png", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache, no-store, must-revalidate");
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");

        let response = app
            .send(make_request("GET", "/images/deck-1/missing.png", None, None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn insert_from_outline_renders_one_slide_and_charges() {
        let app = TestApp::with_llm(refiner_mock(1));
        let (owner, token) = app.member("uma", 5);
        let pid = app.presentation(&owner, "Harbours");

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/slides/insert"),
                Some(&token),
                Some(json!({
                    "position": 0,
                    "title": "Night shift",
                    "content_summary": "• cranes under lights"
                })),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let inserted = response_json(response).await;
        assert!(inserted["slide_id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(inserted["image_url"]
            .as_str()
            .unwrap()
            .starts_with(&format!("/images/{pid}/")));

        let detail = response_json(
            app.send(make_request("GET", &format!("/presentations/{pid}"), Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(detail["slides"].as_array().unwrap().len(), 1);

        let conn = app.core.open_db().unwrap();
        assert_eq!(get_user_by_id(&conn, &owner).unwrap().unwrap().scores, 4);
    }

    #[tokio::test]
    async fn insert_from_outline_requires_a_slide_worth_of_scores() {
        let app = TestApp::with_llm(refiner_mock(1));
        let (owner, token) = app.member("vera", 0);
        let pid = app.presentation(&owner, "Harbours");

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/slides/insert"),
                Some(&token),
                Some(json!({"position": 0, "title": "Cranes", "content_summary": "steel"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[tokio::test]
    async fn generate_from_outline_stores_enriched_outline_and_renders() {
        let app = TestApp::with_llm(refiner_mock(2));
        let (owner, token) = app.member("wes", 10);
        let pid = app.presentation(&owner, "Lighthouses");

        let body = json!({
            "global_style_prompt": "ink wash on rice paper",
            "language": "en",
            "slides": [
                {"title": "Keepers", "content_summary": "who tended the lamps"},
                {"title": "Lenses", "content_summary": "Fresnel optics"}
            ]
        });
        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/generate-from-outline"),
                Some(&token),
                Some(body),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(wait_for_generation(&app.core, &pid).await, GenerationStatus::Completed);

        let detail = response_json(
            app.send(make_request("GET", &format!("/presentations/{pid}"), Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(detail["global_style"], "ink wash on rice paper");
        let params = &detail["params"];
        assert_eq!(params["page_count"], 2);
        assert_eq!(params["global_style_prompt"], "ink wash on rice paper");
        let outline = params["outline"].as_array().unwrap();
        assert_eq!(outline.len(), 2);
        for (index, slide) in outline.iter().enumerate() {
            assert_eq!(slide["index"], index);
            assert_eq!(slide["visual_subject"], "a lighthouse at dawn");
            assert_eq!(slide["_generated"], true);
        }
        assert_eq!(detail["slides"].as_array().unwrap().len(), 2);

        let conn = app.core.open_db().unwrap();
        assert_eq!(get_user_by_id(&conn, &owner).unwrap().unwrap().scores, 8);
    }

    /// Outline of three prompt slides; the first is already rendered.
    fn partly_rendered_outline(app: &TestApp, pid: &str) {
        let outline = json!([
            {"index": 0, "visual_prompt": "a red fox", "_generated": true},
            {"index": 1, "visual_prompt": "a blue bird"},
            {"index": 2, "visual_prompt": "a green frog"}
        ]);
        let mut params = serde_json::Map::new();
        params.insert("outline".into(), outline);
        let conn = app.core.open_db().unwrap();
        merge_presentation_params(&conn, pid, params).unwrap();
    }

    #[tokio::test]
    async fn resume_charges_only_unrendered_slides() {
        let app = TestApp::new();
        let (owner, token) = app.member("xena", 2);
        let pid = app.presentation(&owner, "Animals");
        partly_rendered_outline(&app, &pid);

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/resume-generate"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(wait_for_generation(&app.core, &pid).await, GenerationStatus::Completed);

        let progress = response_json(
            app.send(make_request(
                "GET",
                &format!("/presentations/{pid}/generation-progress"),
                Some(&token),
                None,
            ))
            .await,
        )
        .await;
        assert_eq!(progress["current"], 3);
        assert_eq!(progress["total"], 3);

        // Only positions 1 and 2 were rendered in this run.
        let detail = response_json(
            app.send(make_request("GET", &format!("/presentations/{pid}"), Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(detail["slides"].as_array().unwrap().len(), 2);

        let conn = app.core.open_db().unwrap();
        assert_eq!(get_user_by_id(&conn, &owner).unwrap().unwrap().scores, 0);
    }

    #[tokio::test]
    async fn resume_balance_check_counts_pending_slides() {
        let app = TestApp::new();
        let (owner, token) = app.member("yuri", 1);
        let pid = app.presentation(&owner, "Animals");
        partly_rendered_outline(&app, &pid);

        let response = app
            .send(make_request(
                "POST",
                &format!("/presentations/{pid}/resume-generate"),
                Some(&token),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            response_json(response).await["detail"],
            "Insufficient scores: need 2, have 1"
        );
    }

    #[tokio::test]
    async fn members_can_hold_three_invite_codes() {
        let app = TestApp::new();
        let (_, token) = app.member("zoe", 0);

        for _ in 0..3 {
            let response = app
                .send(make_request("POST", "/user/invite-codes", Some(&token), None))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response_json(response).await["code"].as_str().is_some());
        }

        let response = app
            .send(make_request("POST", "/user/invite-codes", Some(&token), None))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response_json(response).await["detail"],
            "Maximum 3 invite codes per user"
        );

        let listed = response_json(
            app.send(make_request("GET", "/user/invite-codes", Some(&token), None))
                .await,
        )
        .await;
        assert_eq!(listed["invite_codes"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn member_password_change_checks_current_password() {
        let app = TestApp::new();
        let user = {
            let conn = app.core.open_db().unwrap();
            let hash = hash_password("first-pass", app.core.config.password_iterations);
            create_user(&conn, "abel", &hash, 0).unwrap().unwrap()
        };
        let token = issue_token(&app.core.config.jwt_secret, &user.id, TokenRole::User).unwrap();

        let response = app
            .send(make_request(
                "PATCH",
                "/user/me/password",
                Some(&token),
                Some(json!({"old_password": "guess", "new_password": "second-pass"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .send(make_request(
                "PATCH",
                "/user/me/password",
                Some(&token),
                Some(json!({"old_password": "first-pass", "new_password": "second-pass"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["status"], "success");

        let old = json!({"username": "abel", "password": "first-pass"});
        let response = app
            .send(make_request("POST", "/auth/login", None, Some(old)))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let new = json!({"username": "abel", "password": "second-pass"});
        let response = app
            .send(make_request("POST", "/auth/login", None, Some(new)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_password_change_checks_current_password() {
        let app = TestApp::new();
        let token = app.admin_token();

        let response = app
            .send(make_request(
                "PATCH",
                "/admin/me/password",
                Some(&token),
                Some(json!({"old_password": "letmein", "new_password": "harbour-9"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["detail"], "Wrong current password");

        let response = app
            .send(make_request(
                "PATCH",
                "/admin/me/password",
                Some(&token),
                Some(json!({"old_password": "admin123", "new_password": "harbour-9"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let login = json!({"username": "admin", "password": "harbour-9"});
        let response = app
            .send(make_request("POST", "/admin/auth/login", None, Some(login)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["admin"]["username"], "admin");
    }

    #[tokio::test]
    async fn admin_creates_members_without_invites() {
        let app = TestApp::new();
        let token = app.admin_token();

        let body = json!({"username": "bree", "password": "tide-pools", "initial_scores": 15});
        let response = app
            .send(make_request("POST", "/admin/users", Some(&token), Some(body.clone())))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let created = response_json(response).await;
        assert_eq!(created["username"], "bree");
        assert_eq!(created["scores"], 15);
        assert!(created["id"].as_str().is_some());

        let response = app
            .send(make_request("POST", "/admin/users", Some(&token), Some(body)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_json(response).await["detail"], "Username already exists");

        let login = json!({"username": "bree", "password": "tide-pools"});
        let response = app
            .send(make_request("POST", "/auth/login", None, Some(login)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await["user"]["scores"], 15);
    }
}
