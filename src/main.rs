#[tokio::main]
async fn main() -> anyhow::Result<()> {
    moneta::tracing::init();
    moneta::app::run().await
}
