use crate::{
    catalog::CatalogService,
    cli::{self, Command},
    context, rest,
    storage::SqliteStorage,
    types::ItemDraft,
};
use anyhow::{Context as AnyhowContext, Result};
use std::path::Path;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DB_FILE_NAME: &str = "moneta.sqlite";

/// The main application state, decoupled from CLI parsing so tests can
/// build one directly.
pub struct App {
    config: context::Context,
    storage: SqliteStorage,
    shutdown: CancellationToken,
}

impl App {
    /// Build the App from CLI arguments: attach the log file, create the data
    /// directory and open (or reset) the database.
    pub fn from_cli() -> Result<(App, cli::Cli)> {
        let cli = cli::parse();

        crate::tracing::set_log_file(cli.log_file.as_deref().map(Path::new))
            .context("opening log file")?;

        let ctx = context::Context::from_cli(&cli);
        log_startup_info(&ctx);

        let storage = init_storage(&ctx.data_dir, ctx.reset)?;
        Ok((App::new(ctx, storage), cli))
    }

    fn new(config: context::Context, storage: SqliteStorage) -> Self {
        Self {
            config,
            storage,
            shutdown: CancellationToken::new(),
        }
    }

    /// Serve the REST API until Ctrl-C or until the server task dies.
    pub async fn run_daemon(&self) -> Result<()> {
        self.log_runtime_config();

        let mut rest_handle = self.spawn_rest_server();
        self.wait_for_shutdown(&mut rest_handle).await
    }

    /// Run a one-shot subcommand against the opened database.
    pub fn run_command(&self, cmd: &Command) -> Result<()> {
        match cmd {
            Command::Import { file } => {
                let imported = import_file(&self.storage, file)?;
                println!(
                    "Imported {} catalog items from {}",
                    imported,
                    file.display()
                );
                Ok(())
            }
        }
    }

    fn spawn_rest_server(&self) -> JoinHandle<()> {
        let addr = self.config.api_listen;
        let store = self.storage.clone();
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = rest::serve(addr, store, token).await {
                log::error!("REST server failed: {:#}", e);
            }
        })
    }

    async fn wait_for_shutdown(&self, rest_task: &mut JoinHandle<()>) -> Result<()> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("🧨 Ctrl-C received, shutting down..."),
            _ = &mut *rest_task => log::error!("REST task exited unexpectedly"),
        }

        self.shutdown.cancel();

        // Polling a completed JoinHandle again panics.
        if !rest_task.is_finished() {
            let _ = rest_task.await;
        }

        log::info!("✅ Shutdown complete");
        Ok(())
    }

    fn log_runtime_config(&self) {
        log::info!("🌐 REST API: http://{}", self.config.api_listen);
        if let Some(path) = self.config.log_file.as_deref() {
            log::info!("📝 Log file: {}", path.to_string_lossy());
        }
    }
}

fn log_startup_info(ctx: &context::Context) {
    log::info!("🚀 Starting moneta");
    log::info!("📂 Data dir: {}", ctx.data_dir.to_string_lossy());
    if ctx.reset {
        log::warn!("🧹 Reset requested, existing data will be deleted");
    }
}

fn init_storage(data_dir: &Path, reset: bool) -> Result<SqliteStorage> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let sqlite = SqliteStorage::new(data_dir.join(DB_FILE_NAME));
    if reset {
        sqlite.reset_all().context("resetting storage")?;
    }
    sqlite.init().context("initializing storage")?;

    Ok(sqlite)
}

fn import_file(storage: &SqliteStorage, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let drafts: Vec<ItemDraft> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;

    let imported = CatalogService::new(storage.clone())
        .import(&drafts)
        .with_context(|| format!("importing {}", path.display()))?;
    Ok(imported.len())
}

// --- Entry Point ---

pub async fn run() -> Result<()> {
    let (app, cli) = App::from_cli()?;

    if let Some(cmd) = &cli.cmd {
        return app.run_command(cmd);
    }

    app.run_daemon().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ItemQuery, StorageRead};
    use crate::types::{ItemKind, UserId, Viewer};
    use tempfile::TempDir;

    fn make_app(dir: &TempDir, port: u16) -> App {
        let config = context::Context {
            data_dir: dir.path().to_path_buf(),
            reset: false,
            log_file: None,
            api_listen: format!("127.0.0.1:{}", port).parse().unwrap(),
        };
        let storage = init_storage(dir.path(), false).unwrap();
        App::new(config, storage)
    }

    #[test]
    fn init_storage_creates_database_in_data_dir() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let storage = init_storage(&data_dir, false).unwrap();
        assert!(data_dir.join(DB_FILE_NAME).exists());
        assert_eq!(storage.count_entries_for(UserId(1)).unwrap(), 0);
    }

    #[test]
    fn reset_wipes_imported_items() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("items.json");
        std::fs::write(
            &file,
            r#"[{"kind":"coin","name":"1 kopek","country":"USSR","denomination":"1"}]"#,
        )
        .unwrap();

        let storage = init_storage(dir.path(), false).unwrap();
        assert_eq!(import_file(&storage, &file).unwrap(), 1);

        let storage = init_storage(dir.path(), true).unwrap();
        let query = ItemQuery::visible(ItemKind::Coin, Viewer::Anonymous);
        assert_eq!(storage.count_items(&query).unwrap(), 0);
    }

    #[test]
    fn import_is_all_or_nothing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("items.json");
        std::fs::write(
            &file,
            r#"[
                {"kind":"coin","name":"1 kopek","country":"USSR","denomination":"1"},
                {"kind":"banknote","name":"","country":"USSR","denomination":"3"}
            ]"#,
        )
        .unwrap();

        let storage = init_storage(dir.path(), false).unwrap();
        let err = import_file(&storage, &file).unwrap_err();
        assert!(format!("{:#}", err).contains("item #2"));

        let query = ItemQuery::visible(ItemKind::Coin, Viewer::Anonymous);
        assert_eq!(storage.count_items(&query).unwrap(), 0);
    }

    #[test]
    fn import_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("items.json");
        std::fs::write(&file, "{not json").unwrap();
        let storage = init_storage(dir.path(), false).unwrap();
        assert!(import_file(&storage, &file).is_err());
    }

    #[tokio::test]
    async fn wait_for_shutdown_exits_when_task_finishes() {
        let dir = TempDir::new().unwrap();
        let app = make_app(&dir, 0);

        let mut rest_task = tokio::spawn(async {});

        let res = app.wait_for_shutdown(&mut rest_task).await;
        assert!(res.is_ok());
        assert!(app.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn spawn_rest_server_starts_and_serves_health_check() {
        let dir = TempDir::new().unwrap();
        let port = 34578;
        let app = make_app(&dir, port);

        let handle = app.spawn_rest_server();

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        assert!(
            !handle.is_finished(),
            "REST server task finished unexpectedly (likely bind failed)"
        );

        let stream = tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)).await;
        assert!(stream.is_ok(), "Failed to connect to REST server");
        let mut stream = stream.unwrap();

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await.unwrap();
        let response = String::from_utf8_lossy(&buffer);

        assert!(response.contains("200 OK"));
        assert!(response.contains("uptime_secs"));

        app.shutdown.cancel();
        let _ = handle.await;
    }
}
