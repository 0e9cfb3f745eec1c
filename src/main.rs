use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry LOG_* and RUST_LOG as well.
    dotenvy::dotenv().ok();
    wikichat::logging::init();
    wikichat::run().await
}
