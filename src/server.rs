use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use ntex::http::StatusCode;
use ntex::web;
use ntex_files::NamedFile;
use serde::Serialize;
use serde_json::json;
use spdlog::{error, info};

use crate::config::Config;
use crate::error::ChronicleError;
use crate::post::{PostDraft, PostPatch};
use crate::post_service::PostService;
use crate::post_store::JsonFileStore;
use crate::site::open_service;

const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";

struct AppState {
    service: PostService<JsonFileStore>,
    admin_page: Option<PathBuf>,
}

type SharedState = web::types::State<Arc<Mutex<AppState>>>;

fn with_cors(builder: &mut web::HttpResponseBuilder) -> &mut web::HttpResponseBuilder {
    builder
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
        .header("Access-Control-Allow-Headers", ALLOWED_HEADERS)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> web::HttpResponse {
    with_cors(&mut web::HttpResponse::build(status)).json(body)
}

fn error_response(err: ChronicleError) -> web::HttpResponse {
    let status = match err {
        ChronicleError::NotFound(_) => StatusCode::NOT_FOUND,
        ChronicleError::DuplicateId(_)
        | ChronicleError::InvalidId(_)
        | ChronicleError::InvalidInput(_)
        | ChronicleError::Render { .. } => StatusCode::BAD_REQUEST,
        _ => {
            error!("Admin request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    json_response(status, &json!({ "error": err.to_string() }))
}

fn lock(state: &SharedState) -> Result<MutexGuard<'_, AppState>, web::HttpResponse> {
    state.lock().map_err(|_| {
        error!("Admin state lock is poisoned");
        json_response(StatusCode::INTERNAL_SERVER_ERROR, &json!({ "error": "server state unavailable" }))
    })
}

#[web::get("/admin")]
async fn admin(state: SharedState) -> Result<NamedFile, web::Error> {
    let admin_page = match lock(&state) {
        Ok(state) => state.admin_page.clone(),
        Err(_) => None,
    };

    match admin_page {
        Some(path) => Ok(NamedFile::open(path)?),
        None => Err(web::error::ErrorNotFound("Admin page is not configured").into()),
    }
}

#[web::get("/api/posts")]
async fn list_posts(state: SharedState) -> web::HttpResponse {
    let state = match lock(&state) {
        Ok(state) => state,
        Err(response) => return response,
    };

    match state.service.entries() {
        Ok(entries) => json_response(StatusCode::OK, &entries),
        Err(e) => error_response(e),
    }
}

#[web::post("/api/posts")]
async fn create_post(draft: web::types::Json<PostDraft>, state: SharedState) -> web::HttpResponse {
    let state = match lock(&state) {
        Ok(state) => state,
        Err(response) => return response,
    };

    match state.service.create(draft.into_inner()) {
        Ok(post) => json_response(StatusCode::CREATED, &post),
        Err(e) => error_response(e),
    }
}

#[web::put("/api/posts/{id}")]
async fn update_post(id: web::types::Path<String>, patch: web::types::Json<PostPatch>, state: SharedState) -> web::HttpResponse {
    let state = match lock(&state) {
        Ok(state) => state,
        Err(response) => return response,
    };

    match state.service.update(&id.into_inner(), patch.into_inner()) {
        Ok(post) => json_response(StatusCode::OK, &post),
        Err(e) => error_response(e),
    }
}

#[web::delete("/api/posts/{id}")]
async fn delete_post(id: web::types::Path<String>, state: SharedState) -> web::HttpResponse {
    let state = match lock(&state) {
        Ok(state) => state,
        Err(response) => return response,
    };

    match state.service.delete(&id.into_inner()) {
        Ok(_) => json_response(StatusCode::OK, &json!({ "message": "Post deleted" })),
        Err(e) => error_response(e),
    }
}

async fn preflight() -> web::HttpResponse {
    with_cors(&mut web::HttpResponse::NoContent()).finish()
}

fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(admin)
        .service(list_posts)
        .service(create_post)
        .service(update_post)
        .service(delete_post)
        .service(web::resource("/api/posts").guard(web::guard::Options()).to(preflight))
        .service(web::resource("/api/posts/{id}").guard(web::guard::Options()).to(preflight));
}

pub async fn server_run(config: Config) -> io::Result<()> {
    let service = match open_service(&config) {
        Ok(service) => service,
        Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
    };

    // Pages may be stale after edits made while the server was down
    match service.sync() {
        Ok(report) => info!("Initial page sync: {}", report),
        Err(e) => error!("Initial page sync failed: {}", e),
    }

    let bind_addr = config.server.address.clone();
    let bind_port = config.server.port;
    let app_state = Arc::new(Mutex::new(AppState {
        service,
        admin_page: config.paths.admin_page.clone(),
    }));

    info!("Admin page at http://{}:{}/admin", bind_addr, bind_port);
    web::HttpServer::new(move || {
        web::App::new()
            .state(app_state.clone())
            .configure(configure_routes)
    })
        .bind((bind_addr, bind_port))?
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use ntex::http::Method;
    use ntex::web::test;

    use crate::page_sync::PageSynchronizer;
    use crate::post::Post;
    use crate::post_store::PostStore;
    use crate::test_data::{entries, sample_post, MIXED_STORE_DATA, STORE_DATA};
    use crate::view::post_renderer::PostRenderer;

    use super::*;

    fn app_state(dir: &tempfile::TempDir, posts: &[Post]) -> Arc<Mutex<AppState>> {
        let store = JsonFileStore::new(dir.path().join("blog-posts.json"));
        store.save(&entries(posts)).unwrap();
        let renderer = PostRenderer::builtin(chrono_tz::America::Chicago).unwrap();
        let synchronizer = PageSynchronizer::new(dir.path().join("blog"), renderer);

        let admin_page = dir.path().join("admin.html");
        std::fs::write(&admin_page, "<h1>Admin</h1>").unwrap();

        Arc::new(Mutex::new(AppState {
            service: PostService::new(store, synchronizer),
            admin_page: Some(admin_page),
        }))
    }

    #[ntex::test]
    async fn test_list_posts() {
        let dir = tempfile::tempdir().unwrap();
        let posts: Vec<Post> = serde_json::from_str(STORE_DATA).unwrap();
        let state = app_state(&dir, &posts);
        let app = test::init_service(web::App::new().state(state).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/posts").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");

        let body: Vec<Post> = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body, posts);
    }

    #[ntex::test]
    async fn test_create_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir, &[]);
        let app = test::init_service(web::App::new().state(state).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/posts")
            .set_json(&json!({ "content": "A new chronicle", "date": "2024-02-01" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Post = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(created.content, "A new chronicle");
        assert!(dir.path().join("blog").join(created.id.as_str()).join("index.html").is_file());

        let req = test::TestRequest::put()
            .uri(&format!("/api/posts/{}", created.id))
            .set_json(&json!({ "content": "Edited", "id": "hijack" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated: Post = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.content, "Edited");

        let req = test::TestRequest::delete().uri(&format!("/api/posts/{}", created.id)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body, json!({ "message": "Post deleted" }));
        assert!(!dir.path().join("blog").join(created.id.as_str()).exists());
    }

    #[ntex::test]
    async fn test_missing_post_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir, &[sample_post("42", "x")]);
        let app = test::init_service(web::App::new().state(state).configure(configure_routes)).await;

        let req = test::TestRequest::delete().uri("/api/posts/404").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert!(body["error"].as_str().unwrap().contains("404"));
    }

    #[ntex::test]
    async fn test_preflight_and_admin_page() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir, &[]);
        let app = test::init_service(web::App::new().state(state).configure(configure_routes)).await;

        let req = test::TestRequest::default().method(Method::OPTIONS).uri("/api/posts/1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(resp.headers().get("Access-Control-Allow-Methods").unwrap(), ALLOWED_METHODS);

        let req = test::TestRequest::get().uri("/admin").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&test::read_body(resp).await[..], b"<h1>Admin</h1>");
    }

    #[ntex::test]
    async fn test_malformed_record_is_listed_and_deletable() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir, &[]);
        std::fs::write(dir.path().join("blog-posts.json"), MIXED_STORE_DATA).unwrap();
        let app = test::init_service(web::App::new().state(state).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/posts").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Vec<serde_json::Value> = serde_json::from_slice(&test::read_body(resp).await).unwrap();
        assert_eq!(body.len(), 3);
        assert_eq!(body[1]["date"], "someday");

        let req = test::TestRequest::delete().uri("/api/posts/bad").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(dir.path().join("blog").join("good").join("index.html").is_file());
        assert!(!std::fs::read_to_string(dir.path().join("blog-posts.json")).unwrap().contains("someday"));
    }
}
