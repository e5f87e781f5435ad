use anyhow::Context;
use cargo_avto_pricing::config::Config;
use cargo_avto_pricing::pipeline::Pipeline;
use cargo_avto_pricing::record::{RecordRepository, SqliteRecordRepository};
use cargo_avto_pricing::wb::{MarketplaceApi, WbClient};
use cargo_avto_pricing::build_client;
use indicatif::ProgressStyle;
use log_error::LogError;
use std::env;
use std::sync::Arc;
use supplier_parser::{HttpPageRenderer, PageRenderer};
use tokio::signal;
use tokio_rusqlite::Connection;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO,html5ever=error,selectors=error");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();

    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => (),
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }

    let config = Config::load()?;
    let api_key = Config::api_key()?;
    let client = build_client(&config.http)?;
    let api: Arc<dyn MarketplaceApi> =
        Arc::new(WbClient::new(client.clone(), &api_key, config.http.clone()));
    let renderer: Arc<dyn PageRenderer> = Arc::new(HttpPageRenderer::new(client));

    if let Some(dir) = std::path::Path::new(&config.db_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Unable to create {}", dir.display()))?;
    }
    let conn = Connection::open(&config.db_path).await?;
    let repo: Arc<dyn RecordRepository> = Arc::new(
        SqliteRecordRepository::init(conn)
            .await
            .with_context(|| format!("Unable to initialize {}", config.db_path))?,
    );

    let token = CancellationToken::new();
    let pb_style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40} {pos:>7}/{len:7} {msg}");
    let pb_style = match pb_style {
        Ok(p) => Some(p.progress_chars("=-")),
        Err(err) => {
            log::warn!("Unable to initialize progress bar: {err}");
            None
        }
    };

    let t = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c()
            .await
            .context("ctrl_c")
            .log_error("Unable to listen for shutdown signal")
            .is_some()
        {
            log::info!("Shutdown requested, stopping after the current card");
            t.cancel();
        }
    });

    log::info!(
        "Pricing categories {:?} into {}",
        config.category_ids,
        config.db_path
    );
    let summary = Pipeline::new(api, renderer, repo, config, token, pb_style)
        .run()
        .await?;
    summary.log();
    Ok(())
}
