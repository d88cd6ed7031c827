use std::net::SocketAddr;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::{catalog::CatalogService, collection::CollectionService, storage::Storage};

mod error;
mod extract;
mod handlers;
mod models;

pub use error::{ApiError, INVALID_KIND_REDIRECT};
pub use extract::{CurrentViewer, USER_ID_HEADER};

use handlers::{
    add_to_collection, available_to_add, catalog_detail, create_item, delete_item,
    edit_entry_notes, featured, health, list_catalog, my_collection, not_found, remove_entry,
    update_item,
};

#[derive(Clone)]
pub struct AppState<S: Storage> {
    pub catalog: CatalogService<S>,
    pub collection: CollectionService<S>,
    pub started_at: std::time::SystemTime,
}

impl<S: Storage + Clone> AppState<S> {
    pub fn new(storage: S) -> Self {
        Self {
            catalog: CatalogService::new(storage.clone()),
            collection: CollectionService::new(storage),
            started_at: std::time::SystemTime::now(),
        }
    }
}

pub fn router<S: Storage + Clone + Send + Sync + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/catalog/featured", get(featured::<S>))
        .route(
            "/catalog/:kind",
            get(list_catalog::<S>).post(create_item::<S>),
        )
        .route(
            "/catalog/:kind/:id",
            get(catalog_detail::<S>)
                .put(update_item::<S>)
                .delete(delete_item::<S>),
        )
        .route("/collection", get(my_collection::<S>))
        .route("/collection/available", get(available_to_add::<S>))
        .route(
            "/collection/entries/:id",
            patch(edit_entry_notes::<S>).delete(remove_entry::<S>),
        )
        .route("/collection/:kind/:id", post(add_to_collection::<S>))
        .fallback(not_found)
        .with_state(state)
}

pub async fn serve<S: Storage + Clone + Send + Sync + 'static>(
    addr: SocketAddr,
    storage: S,
    shutdown: tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    log::info!("🌐 REST service on http://{}", addr);

    let app = router(AppState::new(storage));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("🛑 REST shutdown requested");
        })
        .await?;
    log::info!("👋 REST server exited");
    Ok(())
}
