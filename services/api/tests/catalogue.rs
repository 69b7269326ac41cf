mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn series_listing_is_paged_with_total_headers() {
    let app = common::app();
    let writer = app.register("sho", "Writer").await;
    for title in ["Iron Moon", "Iron Tide", "Paper Crane"] {
        app.create_series(&writer, title).await;
    }

    let (status, headers, body) = app
        .send_raw("GET", "/api/mangaseries?searchTerm=iron&pageSize=1", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-total-count"], "2");
    assert_eq!(headers["x-total-pages"], "2");
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["authorName"], "sho");

    let (status, _) = app
        .send("GET", "/api/mangaseries?tagIds=1,abc", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn series_mutations_follow_ownership() {
    let app = common::app();
    let viewer = app.register("fan", "Viewer").await;
    let owner = app.register("mangaka", "Writer").await;
    let rival = app.register("rival", "Writer").await;
    let admin = app.register("editor", "Admin").await;

    let (status, _) = app
        .send(
            "POST",
            "/api/mangaseries",
            Some(&viewer.token),
            Some(json!({ "title": "Fan Work", "synopsis": "", "coverImageUrl": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let series = app.create_series(&owner, "Original").await;
    let uri = format!("/api/mangaseries/{}", series);
    let update = json!({
        "title": "Original (Revised)",
        "synopsis": "Now longer",
        "coverImageUrl": "https://img.example/v2.png",
        "status": "Completed"
    });

    let (status, _) = app.send("PUT", &uri, Some(&rival.token), Some(update.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("PUT", &uri, Some(&owner.token), Some(update)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, detail) = app.send("GET", &uri, None, None).await;
    assert_eq!(detail["title"], "Original (Revised)");
    assert_eq!(detail["status"], "Completed");
    assert!(detail["updatedAt"].is_string());

    let (status, _) = app.send("DELETE", &uri, Some(&rival.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("DELETE", &uri, Some(&admin.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tags_and_languages_are_curated_by_role() {
    let app = common::app();
    let viewer = app.register("lurker", "Viewer").await;
    let writer = app.register("tagger", "Writer").await;
    let admin = app.register("curator", "Admin").await;

    let (status, _) = app
        .send("POST", "/api/filters/tags", Some(&viewer.token), Some(json!({ "name": "Action" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, tag) = app
        .send("POST", "/api/filters/tags", Some(&writer.token), Some(json!({ "name": "Action" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(tag["name"], "Action");

    let (status, _) = app
        .send("POST", "/api/filters/tags", Some(&writer.token), Some(json!({ "name": "action" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send("POST", "/api/filters/languages", Some(&writer.token), Some(json!({ "name": "Japanese" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("POST", "/api/filters/languages", Some(&admin.token), Some(json!({ "name": "Japanese" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, all) = app.send("GET", "/api/filters/all", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["tags"].as_array().unwrap().len(), 1);
    assert_eq!(all["languages"][0]["name"], "Japanese");
}

#[tokio::test]
async fn trending_tags_count_tagged_series() {
    let app = common::app();
    let writer = app.register("trend", "Writer").await;
    let (_, action) = app
        .send("POST", "/api/filters/tags", Some(&writer.token), Some(json!({ "name": "Action" })))
        .await;
    let (_, romance) = app
        .send("POST", "/api/filters/tags", Some(&writer.token), Some(json!({ "name": "Romance" })))
        .await;

    for (title, tags) in [
        ("A", json!([action["id"]])),
        ("B", json!([action["id"], romance["id"]])),
    ] {
        let (status, _) = app
            .send(
                "POST",
                "/api/mangaseries",
                Some(&writer.token),
                Some(json!({
                    "title": title,
                    "synopsis": "",
                    "coverImageUrl": "https://img.example/c.png",
                    "tagIds": tags
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, trending) = app
        .send("GET", "/api/filters/trending-tags?limit=1", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trending, json!([{ "id": action["id"], "name": "Action", "count": 2 }]));
}

#[tokio::test]
async fn favorites_are_idempotent_and_private() {
    let app = common::app();
    let writer = app.register("maker", "Writer").await;
    let reader = app.register("collector", "Viewer").await;
    let series = app.create_series(&writer, "Keeper").await;

    for _ in 0..2 {
        let (status, _) = app
            .send(
                "POST",
                "/api/favorites",
                Some(&reader.token),
                Some(json!({ "mangaSeriesId": series })),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (_, favorites) = app.send("GET", "/api/favorites", Some(&reader.token), None).await;
    assert_eq!(favorites.as_array().unwrap().len(), 1);
    assert_eq!(favorites[0]["id"], series);

    let (_, others) = app.send("GET", "/api/favorites", Some(&writer.token), None).await;
    assert_eq!(others, json!([]));

    let uri = format!("/api/favorites/{}", series);
    let (status, _) = app.send("DELETE", &uri, Some(&reader.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send("DELETE", &uri, Some(&reader.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send("GET", "/api/favorites", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn opening_a_chapter_records_progress() {
    let app = common::app();
    let admin = app.register("publisher", "Admin").await;
    let reader = app.register("bookworm", "Viewer").await;
    let series = app.create_series(&admin, "Open Book").await;
    let (_, chapter) = app.upload(&admin, series, "Prologue").await;
    let chapter_id = chapter["id"].as_i64().unwrap();

    let progress_uri = format!("/api/readingprogress/chapter/{}", chapter_id);
    let (status, _) = app.send("GET", &progress_uri, Some(&reader.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.send(
        "GET",
        &format!("/api/manga/{}/chapter/{}", series, chapter_id),
        Some(&reader.token),
        None,
    )
    .await;
    let (status, progress) = app.send("GET", &progress_uri, Some(&reader.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["lastReadPage"], 1);

    let (status, _) = app
        .send(
            "POST",
            "/api/readingprogress",
            Some(&reader.token),
            Some(json!({ "chapterId": chapter_id, "pageNumber": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, series_progress) = app
        .send("GET", &format!("/api/readingprogress/{}", series), Some(&reader.token), None)
        .await;
    assert_eq!(series_progress[0]["lastReadPage"], 2);
    assert_eq!(series_progress[0]["chapterNumber"], 1);

    let (status, _) = app
        .send(
            "POST",
            "/api/readingprogress",
            Some(&reader.token),
            Some(json!({ "chapterId": chapter_id, "pageNumber": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn viewer_settings_default_then_persist() {
    let app = common::app();
    let reader = app.register("nightowl", "Viewer").await;

    let (status, defaults) = app
        .send("GET", "/api/viewersettings", Some(&reader.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        defaults,
        json!({ "theme": "Light", "readingMode": "PageFlip", "fitToWidth": true, "zoomLevel": 100 })
    );

    let dark = json!({ "theme": "Dark", "readingMode": "VerticalScroll", "fitToWidth": false, "zoomLevel": 150 });
    let (status, _) = app
        .send("PUT", "/api/viewersettings", Some(&reader.token), Some(dark.clone()))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, stored) = app
        .send("GET", "/api/viewersettings", Some(&reader.token), None)
        .await;
    assert_eq!(stored, dark);

    let (status, _) = app
        .send(
            "PUT",
            "/api/viewersettings",
            Some(&reader.token),
            Some(json!({ "theme": "Dark", "readingMode": "PageFlip", "fitToWidth": true, "zoomLevel": 1000 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_connected_store() {
    let app = common::app();
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "Healthy", "database": "Connected" }));
}
