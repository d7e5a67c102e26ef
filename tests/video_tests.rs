//! Tests for video upload and lookup.

mod common;

use axum::http::StatusCode;
use common::{
    MultipartBody, PNG_BYTES, access_cookie, body_json, create_test_app, get_request,
    json_request,
};

const VIDEO_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42";

#[tokio::test]
async fn test_upload_video() {
    let app = create_test_app().await;
    let (access, _) = app.signed_in("alice").await;

    let form = MultipartBody::new()
        .text("title", "  My first video ")
        .file("video", "Clip.MP4", "video/mp4", VIDEO_BYTES)
        .file("thumbnail", "thumb.jpg", "image/jpeg", PNG_BYTES);
    let response = app
        .send(form.into_request("POST", "/videos/upload", Some(&access_cookie(&access))))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["message"], "video uploaded successfully");
    let video = &body["data"];
    assert_eq!(video["title"], "My first video");
    assert_eq!(video["description"], "My first video");
    assert_eq!(video["videoUrl"], "https://media.test/asset-2");
    assert_eq!(video["thumbnailUrl"], "https://media.test/asset-3");
    assert_eq!(video["duration"], 42.5);
    assert_eq!(video["views"], 0);
    assert_eq!(video["isPublished"], true);
    assert_eq!(video["owner"]["username"], "alice");
    assert_eq!(app.staged_file_count(), 0);

    // Same shape from the lookup route
    let id = video["id"].as_str().unwrap().to_string();
    let response = app.send(get_request(&format!("/videos/{}", id), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "video fetched successfully");
    assert_eq!(body["data"]["id"], id.as_str());
}

#[tokio::test]
async fn test_upload_video_with_description() {
    let app = create_test_app().await;
    let (access, _) = app.signed_in("alice").await;

    let form = MultipartBody::new()
        .text("title", "Cats")
        .text("description", "Two cats and a box")
        .file("video", "cats.webm", "video/webm", VIDEO_BYTES)
        .file("thumbnail", "cats.png", "image/png", PNG_BYTES);
    let response = app
        .send(form.into_request("POST", "/videos/upload", Some(&access_cookie(&access))))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["data"]["description"], "Two cats and a box");
    // The fake host only knows durations of mp4 files
    assert_eq!(body["data"]["duration"], 0.0);
}

#[tokio::test]
async fn test_upload_video_validation() {
    let app = create_test_app().await;
    let (access, _) = app.signed_in("alice").await;
    let cookie = access_cookie(&access);

    let cases = [
        (
            MultipartBody::new()
                .file("video", "clip.mp4", "video/mp4", VIDEO_BYTES)
                .file("thumbnail", "thumb.png", "image/png", PNG_BYTES),
            "video title required",
        ),
        (
            MultipartBody::new()
                .text("title", "No video")
                .file("thumbnail", "thumb.png", "image/png", PNG_BYTES),
            "no video uploaded",
        ),
        (
            MultipartBody::new()
                .text("title", "No thumbnail")
                .file("video", "clip.mp4", "video/mp4", VIDEO_BYTES),
            "no thumbnail was uploaded",
        ),
    ];

    for (form, message) in cases {
        let response = app
            .send(form.into_request("POST", "/videos/upload", Some(&cookie)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", message);
        assert_eq!(body_json(response).await["message"], message);
    }

    // A video in the thumbnail slot is the wrong type
    let form = MultipartBody::new()
        .text("title", "Swapped")
        .file("video", "clip.mp4", "video/mp4", VIDEO_BYTES)
        .file("thumbnail", "clip.mp4", "video/mp4", VIDEO_BYTES);
    let response = app
        .send(form.into_request("POST", "/videos/upload", Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Only the avatar from registration was ever uploaded
    assert_eq!(app.media.uploaded(), vec!["asset-1".to_string()]);
    assert_eq!(app.staged_file_count(), 0);
}

#[tokio::test]
async fn test_upload_video_too_long_title() {
    let app = create_test_app().await;
    let (access, _) = app.signed_in("alice").await;

    let form = MultipartBody::new()
        .text("title", &"t".repeat(201))
        .file("video", "clip.mp4", "video/mp4", VIDEO_BYTES)
        .file("thumbnail", "thumb.png", "image/png", PNG_BYTES);
    let response = app
        .send(form.into_request("POST", "/videos/upload", Some(&access_cookie(&access))))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_thumbnail_failure_removes_uploaded_video() {
    let app = create_test_app().await;
    let (access, _) = app.signed_in("alice").await;
    // Upload 1 was the avatar, 2 the video, 3 the thumbnail
    app.media.fail_uploads_from(3);

    let form = MultipartBody::new()
        .text("title", "Doomed")
        .file("video", "clip.mp4", "video/mp4", VIDEO_BYTES)
        .file("thumbnail", "thumb.png", "image/png", PNG_BYTES);
    let response = app
        .send(form.into_request("POST", "/videos/upload", Some(&access_cookie(&access))))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["message"],
        "failed to upload thumbnail"
    );

    assert_eq!(app.media.removed(), vec!["asset-2".to_string()]);
    let alice = app.db.users().get_by_username("alice").await.unwrap().unwrap();
    assert!(app.db.videos().asset_ids_by_owner(alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_non_multipart_body() {
    let app = create_test_app().await;
    let (access, _) = app.signed_in("alice").await;

    let response = app
        .send(json_request(
            "POST",
            "/videos/upload",
            serde_json::json!({ "title": "Not a form" }),
            Some(&access_cookie(&access)),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(app.media.uploaded(), vec!["asset-1".to_string()]);
}

#[tokio::test]
async fn test_upload_requires_session() {
    let app = create_test_app().await;

    let form = MultipartBody::new()
        .text("title", "Anonymous")
        .file("video", "clip.mp4", "video/mp4", VIDEO_BYTES)
        .file("thumbnail", "thumb.png", "image/png", PNG_BYTES);
    let response = app
        .send(form.into_request("POST", "/videos/upload", None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.media.uploaded().is_empty());
}

#[tokio::test]
async fn test_get_video_errors() {
    let app = create_test_app().await;

    let response = app.send(get_request("/videos/not-a-uuid", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Invalid video id");

    let missing = uuid::Uuid::new_v4();
    let response = app
        .send(get_request(&format!("/videos/{}", missing), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "no such video exists");
}
