//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{archives, attachments, thumbnails};
use crate::state::AppState;

/// Create the complete API router
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/attachments", attachments_router())
        .route("/archives", get(archives::download_archive))
}

fn attachments_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(attachments::upload_attachments).get(attachments::list_attachments),
        )
        .route(
            "/:id",
            get(attachments::get_attachment).delete(attachments::delete_attachment),
        )
        .route("/:id/content", get(attachments::get_content))
        .route("/:id/thumbnails/:name", get(thumbnails::get_thumbnail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::Arc;

    use attic_attachments::{AttachmentService, MemoryBlobStore, MemoryMetaStore};
    use attic_thumbnails::{MemoryThumbnailStore, Placeholder, ThumbnailSpec, ThumbnailSpecs};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use image::{ImageFormat, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "attic-test-boundary";

    fn test_app() -> Router {
        let attachments = AttachmentService::new(
            Arc::new(MemoryMetaStore::new()),
            Arc::new(MemoryBlobStore::new()),
        );
        let specs = ThumbnailSpecs::new(vec![
            ThumbnailSpec::new("icon", 100, 0),
            ThumbnailSpec::square("square", 32),
        ])
        .unwrap();
        let state = AppState::new(
            attachments,
            Arc::new(MemoryThumbnailStore::new()),
            specs,
            Placeholder::new(&b"placeholder"[..], "image/png"),
            2_592_000,
        );
        router().with_state(state)
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::from_pixel(width, height, image::Rgb([1, 2, 3]))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn multipart(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (filename, content_type, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/attachments")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(app: &Router, files: &[(&str, &str, &[u8])]) -> Vec<String> {
        let response = app
            .clone()
            .oneshot(multipart(&[("OwnerId", "owner-a"), ("GroupId", "g1")], files))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json(response).await;
        assert!(body["error"].is_null());
        body["attachments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let app = test_app();
        let ids = upload(&app, &[("notes.txt", "text/plain", &b"hello attic"[..])]).await;

        let response = app.clone().oneshot(get(&format!("/attachments/{}", ids[0]))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["filename"], "notes.txt");
        assert_eq!(body["content_length"], 11);
        assert_eq!(
            body["download_url"],
            format!("/attachments/{}/content", ids[0])
        );

        let response = app
            .clone()
            .oneshot(get(&format!("/attachments/{}/content", ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=2592000");
        assert!(response.headers().contains_key(header::EXPIRES));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &b"hello attic"[..]);
    }

    #[tokio::test]
    async fn test_upload_without_owner_is_rejected() {
        let app = test_app();
        let response = app
            .oneshot(multipart(&[], &[("a.txt", "text/plain", &b"x"[..])]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert_eq!(body["error"], "validation_failed");
    }

    #[tokio::test]
    async fn test_delete_then_missing() {
        let app = test_app();
        let ids = upload(&app, &[("a.txt", "text/plain", &b"bye"[..])]).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/attachments/{}?owner_id=owner-a&group_id=g1", ids[0]))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["deleted"], true);

        let response = app
            .clone()
            .oneshot(get(&format!("/attachments/{}/content", ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_without_owner_scoping() {
        let app = test_app();
        let ids = upload(&app, &[("a.txt", "text/plain", &b"solo"[..])]).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/attachments/{}", ids[0]))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["deleted"], true);

        let response = app
            .clone()
            .oneshot(get(&format!("/attachments/{}", ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_files_is_rejected() {
        let app = test_app();
        let response = app
            .oneshot(multipart(&[("OwnerId", "owner-a")], &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json(response).await;
        assert_eq!(body["error"], "validation_failed");
    }

    #[tokio::test]
    async fn test_thumbnail_is_generated() {
        let app = test_app();
        let image = png(200, 100);
        let ids = upload(&app, &[("photo.png", "image/png", image.as_slice())]).await;

        let response = app
            .clone()
            .oneshot(get(&format!("/attachments/{}/thumbnails/icon", ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (100, 50));
    }

    #[tokio::test]
    async fn test_thumbnail_fallbacks() {
        let app = test_app();
        let ids = upload(&app, &[("notes.txt", "text/plain", &b"not an image"[..])]).await;

        let response = app
            .clone()
            .oneshot(get(&format!("/attachments/{}/thumbnails/icon", ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], &b"placeholder"[..]);

        let response = app
            .clone()
            .oneshot(get(&format!("/attachments/{}/thumbnails/giant", ids[0])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(get("/attachments/missing/thumbnails/icon"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_by_owner_and_group() {
        let app = test_app();
        upload(
            &app,
            &[
                ("a.txt", "text/plain", &b"a"[..]),
                ("b.txt", "text/plain", &b"b"[..]),
            ],
        )
        .await;

        let body = json(
            app.clone()
                .oneshot(get("/attachments?owner_ids=owner-a,owner-z"))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["attachments"].as_array().unwrap().len(), 2);

        let body = json(app.clone().oneshot(get("/attachments?group_id=g1")).await.unwrap()).await;
        assert_eq!(body["total"], 2);

        let response = app.clone().oneshot(get("/attachments")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_archive_download() {
        let app = test_app();
        let ids = upload(
            &app,
            &[
                ("a.txt", "text/plain", &b"first"[..]),
                ("a.txt", "text/plain", &b"second"[..]),
                ("b.txt", "text/plain", &b"third"[..]),
            ],
        )
        .await;

        let response = app
            .clone()
            .oneshot(get(&format!("/archives?ids={}", ids.join(","))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(archive.len(), 3);

        let mut first = String::new();
        archive
            .by_name("a.txt")
            .unwrap()
            .read_to_string(&mut first)
            .unwrap();
        assert_eq!(first, "first");

        let response = app.clone().oneshot(get("/archives?ids=nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
