use anyhow::Result;

use playpass::config::AppConfig;
use playpass::{bootstrap, logger};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logger::init_from_env();

    let config = AppConfig::from_env();
    bootstrap::run(config).await
}
