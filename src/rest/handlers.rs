use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    collection::AddOutcome,
    error::MonetaError,
    storage::Storage,
    types::{ItemDraft, ItemKind, PageRequest},
};

use super::{
    error::ApiError,
    extract::CurrentViewer,
    models::{
        AddedResponse, AvailableQuery, AvailableResponse, DuplicateResponse, ErrorResponse,
        FeaturedResponse, HealthResponse, ItemResponse, MutationResponse, NotesRequest,
        OwnedItemResponse, PageQuery, PageResponse,
    },
    AppState,
};

type ApiResult<T> = Result<T, ApiError>;

fn parse_kind(raw: &str) -> ApiResult<ItemKind> {
    raw.parse::<ItemKind>()
        .map_err(|err| ApiError::from(MonetaError::from(err)))
}

/// Service calls talk to SQLite synchronously and can sit in the busy
/// timeout while another writer holds the lock, so they run on the
/// blocking pool rather than on an executor thread.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T, MonetaError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(work)
        .await
        .context("storage task failed")
        .map_err(MonetaError::Storage)?;
    Ok(result?)
}

pub async fn health<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().map(|d| d.as_secs()).unwrap_or(0);
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            uptime_secs,
        }),
    )
}

pub async fn featured<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
) -> ApiResult<Json<FeaturedResponse>> {
    let catalog = state.catalog.clone();
    let featured = blocking(move || catalog.featured()).await?;
    Ok(Json(FeaturedResponse {
        coins: featured.coins.into_iter().map(Into::into).collect(),
        banknotes: featured.banknotes.into_iter().map(Into::into).collect(),
    }))
}

pub async fn list_catalog<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path(kind): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PageResponse<ItemResponse>>> {
    let kind = parse_kind(&kind)?;
    let page = PageRequest::parse(query.page.as_deref());
    let catalog = state.catalog.clone();
    let page = blocking(move || catalog.list(&viewer, kind, page)).await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn catalog_detail<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Json<ItemResponse>> {
    let item = parse_kind(&kind)?.item_ref(id);
    let catalog = state.catalog.clone();
    let item = blocking(move || catalog.detail(&viewer, item)).await?;
    Ok(Json(item.into()))
}

pub async fn create_item<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path(kind): Path<String>,
    Json(draft): Json<ItemDraft>,
) -> ApiResult<Response> {
    let kind = parse_kind(&kind)?;
    let catalog = state.catalog.clone();
    let item = blocking(move || catalog.create(&viewer, kind, draft)).await?;
    let body = Json(ItemResponse::from(item));
    Ok((StatusCode::CREATED, body).into_response())
}

pub async fn update_item<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path((kind, id)): Path<(String, i64)>,
    Json(draft): Json<ItemDraft>,
) -> ApiResult<Json<ItemResponse>> {
    let item = parse_kind(&kind)?.item_ref(id);
    let catalog = state.catalog.clone();
    let item = blocking(move || catalog.update(&viewer, item, draft)).await?;
    Ok(Json(item.into()))
}

pub async fn delete_item<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path((kind, id)): Path<(String, i64)>,
) -> ApiResult<Json<ItemResponse>> {
    let item = parse_kind(&kind)?.item_ref(id);
    let catalog = state.catalog.clone();
    let item = blocking(move || catalog.delete(&viewer, item)).await?;
    Ok(Json(item.into()))
}

pub async fn my_collection<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<PageResponse<OwnedItemResponse>>> {
    let page = PageRequest::parse(query.page.as_deref());
    let collection = state.collection.clone();
    let page = blocking(move || collection.my_collection(&viewer, page)).await?;
    Ok(Json(PageResponse::from_page(page)))
}

pub async fn available_to_add<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Query(query): Query<AvailableQuery>,
) -> ApiResult<Json<AvailableResponse>> {
    let coin_page = PageRequest::parse(query.coin_page.as_deref());
    let banknote_page = PageRequest::parse(query.banknote_page.as_deref());
    let collection = state.collection.clone();
    let available = blocking(move || {
        collection.list_available_to_add(&viewer, coin_page, banknote_page)
    })
    .await?;
    Ok(Json(AvailableResponse {
        coins: PageResponse::from_page(available.coins),
        banknotes: PageResponse::from_page(available.banknotes),
    }))
}

pub async fn add_to_collection<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path((kind, id)): Path<(String, i64)>,
    body: Option<Json<NotesRequest>>,
) -> ApiResult<Response> {
    let notes = body.map(|Json(request)| request.notes).unwrap_or_default();
    let collection = state.collection.clone();
    let outcome = blocking(move || collection.add(&viewer, &kind, id, &notes)).await?;
    let response = match outcome {
        AddOutcome::Added {
            entry,
            item,
            notice,
        } => (
            StatusCode::CREATED,
            Json(AddedResponse {
                entry: entry.into(),
                item: item.into(),
                notice,
            }),
        )
            .into_response(),
        AddOutcome::Duplicate {
            item,
            notes,
            notice,
        } => (
            StatusCode::OK,
            Json(DuplicateResponse {
                duplicate: true,
                item: item.into(),
                notes,
                notice,
            }),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn edit_entry_notes<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path(entry_id): Path<i64>,
    Json(request): Json<NotesRequest>,
) -> ApiResult<Json<MutationResponse>> {
    let collection = state.collection.clone();
    let notes = request.notes;
    let edited = blocking(move || collection.edit_notes(&viewer, entry_id, &notes)).await?;
    Ok(Json(MutationResponse {
        entry: edited.entry.into(),
        notice: edited.notice,
    }))
}

pub async fn remove_entry<S: Storage + Clone + Send + Sync + 'static>(
    State(state): State<AppState<S>>,
    CurrentViewer(viewer): CurrentViewer,
    Path(entry_id): Path<i64>,
) -> ApiResult<Json<MutationResponse>> {
    let collection = state.collection.clone();
    let removed = blocking(move || collection.remove(&viewer, entry_id)).await?;
    Ok(Json(MutationResponse {
        entry: removed.entry.into(),
        notice: removed.notice,
    }))
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            message: "not found".to_string(),
            redirect: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rest::{extract::USER_ID_HEADER, router};
    use crate::storage::{SqliteStorage, StorageRead, StorageTx, StorageWrite};
    use crate::types::{ItemDetails, UserId};
    use axum::{body::Body, http::Request, Router};
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct TestApp {
        _dir: TempDir,
        storage: SqliteStorage,
        router: Router,
    }

    fn test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(dir.path().join("rest.sqlite"));
        storage.init().unwrap();
        TestApp {
            router: router(AppState::new(storage.clone())),
            storage,
            _dir: dir,
        }
    }

    fn coin_draft(name: &str, published: bool) -> ItemDraft {
        ItemDraft {
            name: name.to_string(),
            description: String::new(),
            year: Some(1961),
            country: "USSR".to_string(),
            category: None,
            denomination: "1".to_string(),
            currency: Some("ruble".to_string()),
            is_published: published,
            is_on_main: true,
            details: ItemDetails::Coin {
                material: Some("copper-nickel".to_string()),
                weight_grams: Some(7.5),
                mint: None,
                diameter_mm: Some(27.0),
            },
        }
    }

    fn seed_coin(app: &TestApp, name: &str, published: bool, author: Option<i64>) -> i64 {
        let tx = app.storage.begin_tx().unwrap();
        let item = tx
            .insert_item(
                &coin_draft(name, published),
                author.map(UserId),
                Utc::now(),
            )
            .unwrap();
        tx.commit().unwrap();
        item.id
    }

    async fn send(
        app: &TestApp,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn add_then_duplicate_returns_soft_warning() {
        let app = test_app();
        let id = seed_coin(&app, "Rouble", true, None);
        let uri = format!("/collection/coin/{id}");

        let (status, body) = send(
            &app,
            "POST",
            &uri,
            Some("1"),
            Some(json!({"notes": "mint state"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["notice"]["level"], "success");
        assert_eq!(
            body["notice"]["message"],
            "\"Rouble\" was added to your collection!"
        );
        assert_eq!(body["entry"]["itemKind"], "coin");
        assert_eq!(body["entry"]["notes"], "mint state");

        let (status, body) = send(
            &app,
            "POST",
            &uri,
            Some("1"),
            Some(json!({"notes": "retry"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate"], true);
        assert_eq!(body["notes"], "retry");
        assert_eq!(body["notice"]["level"], "warning");
        assert_eq!(app.storage.count_entries_for(UserId(1)).unwrap(), 1);
    }

    #[tokio::test]
    async fn add_with_unknown_kind_redirects_to_featured() {
        let app = test_app();
        let (status, body) = send(&app, "POST", "/collection/stamp/1", Some("1"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["redirect"], "/catalog/featured");
    }

    #[tokio::test]
    async fn anonymous_add_is_forbidden() {
        let app = test_app();
        let id = seed_coin(&app, "Hidden", false, Some(1));
        let (status, _) = send(&app, "POST", &format!("/collection/coin/{id}"), None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn add_missing_item_is_404() {
        let app = test_app();
        let (status, _) = send(&app, "POST", "/collection/banknote/77", Some("1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_user_header_is_rejected() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/collection", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "invalid x-user-id header");
    }

    #[tokio::test]
    async fn edit_and_remove_entry() {
        let app = test_app();
        let id = seed_coin(&app, "Rouble", true, None);
        let uri = format!("/collection/coin/{id}");
        let (_, body) = send(&app, "POST", &uri, Some("1"), None).await;
        let entry_id = body["entry"]["id"].as_i64().unwrap();
        let entry_uri = format!("/collection/entries/{entry_id}");

        let (status, _) = send(
            &app,
            "PATCH",
            &entry_uri,
            Some("2"),
            Some(json!({"notes": "not mine"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            "PATCH",
            &entry_uri,
            Some("1"),
            Some(json!({"notes": "cleaned"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entry"]["notes"], "cleaned");
        assert_eq!(body["notice"]["message"], "Notes updated.");

        let (status, body) = send(&app, "DELETE", &entry_uri, Some("1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["notice"]["message"],
            "\"Rouble\" was removed from your collection."
        );

        let (status, _) = send(&app, "DELETE", &entry_uri, Some("1"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn available_to_add_pages_each_kind() {
        let app = test_app();
        for i in 0..7 {
            seed_coin(&app, &format!("coin {i}"), true, None);
        }
        let (status, body) = send(
            &app,
            "GET",
            "/collection/available?coin_page=2&banknote_page=abc",
            Some("1"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coins"]["page"], 2);
        assert_eq!(body["coins"]["numPages"], 2);
        assert_eq!(body["coins"]["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["banknotes"]["page"], 1);
        assert_eq!(body["banknotes"]["items"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn my_collection_requires_sign_in() {
        let app = test_app();
        let (status, _) = send(&app, "GET", "/collection", None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn catalog_hides_unpublished_items_from_others() {
        let app = test_app();
        let public = seed_coin(&app, "Public", true, Some(1));
        let hidden = seed_coin(&app, "Draft", false, Some(1));

        let (_, body) = send(&app, "GET", "/catalog/coin", None, None).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["items"][0]["id"], public);

        let (_, body) = send(&app, "GET", "/catalog/coin", Some("1"), None).await;
        assert_eq!(body["total"], 2);

        let uri = format!("/catalog/coin/{hidden}");
        let (status, _) = send(&app, "GET", &uri, Some("2"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, "GET", &uri, Some("1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isPublished"], false);
        assert_eq!(body["weightGrams"], 7.5);
    }

    #[tokio::test]
    async fn featured_lists_published_main_items() {
        let app = test_app();
        seed_coin(&app, "Main", true, None);
        seed_coin(&app, "Hidden main", false, Some(1));
        let (status, body) = send(&app, "GET", "/catalog/featured", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coins"].as_array().unwrap().len(), 1);
        assert_eq!(body["coins"][0]["name"], "Main");
        assert!(body["banknotes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_update_delete_item_as_author() {
        let app = test_app();
        let draft = json!({
            "kind": "banknote",
            "name": "100 rubles",
            "country": "Russia",
            "denomination": "100",
            "year": 1997,
            "width_mm": 150,
            "height_mm": 65
        });
        let (status, created) = send(
            &app,
            "POST",
            "/catalog/banknote",
            Some("3"),
            Some(draft.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["author"], 3);
        let uri = format!("/catalog/banknote/{}", created["id"]);

        let mut changed = draft.clone();
        changed["name"] = json!("100 rubles (1997)");
        let (status, _) = send(&app, "PUT", &uri, Some("4"), Some(changed.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "PUT", &uri, Some("3"), Some(changed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "100 rubles (1997)");

        let (status, _) = send(&app, "DELETE", &uri, Some("3"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", &uri, Some("3"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_rejects_invalid_item() {
        let app = test_app();
        let draft = json!({
            "kind": "coin",
            "name": "",
            "country": "Russia",
            "denomination": "1"
        });
        let (status, _) = send(&app, "POST", "/catalog/coin", Some("1"), Some(draft)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "not found");
    }

    #[tokio::test]
    async fn health_stays_responsive_while_a_writer_waits_on_the_lock() {
        let app = test_app();
        let id = seed_coin(&app, "Ruble", true, None);

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let storage = app.storage.clone();
        let holder = std::thread::spawn(move || {
            let tx = storage.begin_tx().unwrap();
            locked_tx.send(()).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(1500));
            drop(tx);
        });
        locked_rx.recv().unwrap();

        let router = app.router.clone();
        let add = tokio::spawn(async move {
            let request = Request::builder()
                .method("POST")
                .uri(format!("/collection/coin/{id}"))
                .header(USER_ID_HEADER, "1")
                .body(Body::empty())
                .unwrap();
            router.oneshot(request).await.unwrap().status()
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        let elapsed = started.elapsed();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(
            elapsed < std::time::Duration::from_secs(1),
            "health took {elapsed:?} while a write was blocked"
        );

        assert_eq!(add.await.unwrap(), StatusCode::CREATED);
        holder.join().unwrap();
    }
}
