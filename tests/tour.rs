//! The tour's routes, driven through the router without a listener.

#[path = "../demos/tour/app.rs"]
mod app;

use std::path::PathBuf;

use kairo::{Method, Request, Response, Service, Status};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use app::Settings;

struct Tour {
    service: Service,
    dir: PathBuf,
}

impl Tour {
    async fn new(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("kairo-tour-{name}-{}", std::process::id()));
        for sub in ["assets", "public", "uploads"] {
            tokio::fs::create_dir_all(dir.join(sub)).await.unwrap();
        }
        tokio::fs::write(dir.join("public/index.html"), "<h1>tour</h1>").await.unwrap();
        tokio::fs::write(dir.join("public/404.html"), "<h1>nothing here</h1>").await.unwrap();

        let settings = Settings {
            assets: dir.join("assets"),
            index: dir.join("public/index.html"),
            uploads: dir.join("uploads"),
            error_pages: dir.join("public"),
        };
        Self { service: app::app(&settings).into_service(), dir }
    }

    async fn get(&self, uri: &str) -> Response {
        self.service.call(Request::builder(Method::Get, uri).build()).await
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response {
        let req = Request::builder(Method::Post, uri)
            .header("content-type", "application/json")
            .body(body.to_string())
            .build();
        self.service.call(req).await
    }

    async fn cleanup(self) {
        tokio::fs::remove_dir_all(&self.dir).await.unwrap();
    }
}

fn json_body(res: &Response) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

#[tokio::test]
async fn search_binds_defaults_and_lists() {
    let tour = Tour::new("search").await;

    let res = tour.get("/api/search").await;
    assert_eq!(json_body(&res), json!({ "ids": [], "active": false, "length": 50 }));

    let res = tour.get("/api/search?ids=1,2&ids=3&active=true&length=5").await;
    assert_eq!(json_body(&res), json!({ "ids": [1, 2, 3], "active": true, "length": 5 }));

    let res = tour.get("/api/search?length=many").await;
    assert_eq!(res.status_code(), Status::BadRequest);

    tour.cleanup().await;
}

#[tokio::test]
async fn user_save_never_trusts_is_admin() {
    let tour = Tour::new("users").await;

    let res = tour
        .post_json("/users", json!({ "name": "Joe", "email": "joe@example.com", "is_admin": true }))
        .await;
    assert_eq!(res.status_code(), Status::Ok);
    assert_eq!(json_body(&res)["is_admin"], json!(false));

    let req = Request::builder(Method::Post, "/users").body("name=Joe").build();
    let res = tour.service.call(req).await;
    assert_eq!(res.status_code(), Status::BadRequest);
    assert_eq!(res.body(), b"bad request");

    tour.cleanup().await;
}

#[tokio::test]
async fn validate_users_rejects_bad_email() {
    let tour = Tour::new("validate").await;

    let res = tour
        .post_json("/validate-users", json!({ "name": "Joe", "email": "not-an-email" }))
        .await;
    assert_eq!(res.status_code(), Status::BadRequest);
    assert!(String::from_utf8_lossy(res.body()).contains("email"));

    let res = tour
        .post_json("/validate-users", json!({ "name": "Joe", "email": "joe@example.com" }))
        .await;
    assert_eq!(json_body(&res)["email"], json!("joe@example.com"));

    tour.cleanup().await;
}

#[tokio::test]
async fn timestamp_is_required_and_echoed() {
    let tour = Tour::new("timestamp").await;

    let res = tour.get("/timestamp?timestamp=2026-10-18T09:15:00Z").await;
    assert_eq!(json_body(&res), json!({ "timestamp": "2026-10-18T09:15:00+00:00" }));

    assert_eq!(tour.get("/timestamp").await.status_code(), Status::BadRequest);
    assert_eq!(tour.get("/timestamp?timestamp=yesterday").await.status_code(), Status::BadRequest);

    tour.cleanup().await;
}

#[tokio::test]
async fn context_finds_the_greeter_extension() {
    let tour = Tour::new("context").await;

    let res = tour.get("/context").await;
    assert_eq!(res.status_code(), Status::Ok);
    assert_eq!(res.body(), b"OK");

    tour.cleanup().await;
}

#[tokio::test]
async fn parallel_context_completes_or_reports_cancellation() {
    let tour = Tour::new("parallel").await;

    assert_eq!(tour.get("/parallel_context").await.body(), b"Result: Hay!");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let req = Request::builder(Method::Get, "/parallel_context").cancellation(cancel).build();
    let res = tour.service.call(req).await;
    assert_eq!(res.status_code(), Status::ServiceUnavailable);

    tour.cleanup().await;
}

#[tokio::test]
async fn save_stores_the_uploaded_avatar() {
    let tour = Tour::new("save").await;

    let req = Request::builder(Method::Post, "/save")
        .header("content-type", "multipart/form-data; boundary=tour")
        .body(
            "--tour\r\n\
             Content-Disposition: form-data; name=\"name\"\r\n\r\n\
             <Joe>\r\n\
             --tour\r\n\
             Content-Disposition: form-data; name=\"avatar\"; filename=\"../../joe.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNG\r\n\
             --tour--\r\n",
        )
        .build();
    let res = tour.service.call(req).await;

    assert_eq!(res.status_code(), Status::Ok);
    assert_eq!(res.body(), b"<b>Thank you! &lt;Joe&gt;</b>");
    let saved = tokio::fs::read(tour.dir.join("uploads/joe.png")).await.unwrap();
    assert_eq!(saved, b"PNG");

    let req = Request::builder(Method::Post, "/save")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("name=Joe")
        .build();
    assert_eq!(tour.service.call(req).await.status_code(), Status::BadRequest);

    tour.cleanup().await;
}

#[tokio::test]
async fn failures_render_error_pages() {
    let tour = Tour::new("errors").await;

    let res = tour.get("/nowhere").await;
    assert_eq!(res.status_code(), Status::NotFound);
    assert_eq!(res.body(), b"<h1>nothing here</h1>");

    // No 401.html: the challenge goes out as produced.
    let res = tour.get("/admin").await;
    assert_eq!(res.status_code(), Status::Unauthorized);
    assert!(res.header("www-authenticate").is_some());

    assert_eq!(tour.get("/").await.body(), b"<h1>tour</h1>");

    tour.cleanup().await;
}
