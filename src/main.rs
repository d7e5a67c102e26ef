use clap::Parser;
use tracing::{error, info};
use vidshare::cli::{
    Args, build_config, init_logging, load_media_credentials, load_token_settings, open_database,
    open_media_store, prepare_temp_dir,
};
use vidshare::{init_cleanup, run_server};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    // Secrets leave the environment before anything else starts
    let Some(token_settings) = load_token_settings(&args) else {
        std::process::exit(1);
    };

    let Some(media_credentials) = load_media_credentials(&args) else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let Some(media) = open_media_store(&args, media_credentials).await else {
        std::process::exit(1);
    };

    if prepare_temp_dir(&args.temp_dir).await.is_none() {
        std::process::exit(1);
    }

    if args.insecure_cookies {
        info!("Cookies are sent without the Secure attribute");
    }

    let Some(config) = build_config(db, token_settings, media, &args) else {
        std::process::exit(1);
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    init_cleanup(&config.temp_dir).await;

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, "Listening"),
        Err(_) => info!(address = %addr, "Listening"),
    }

    if let Err(e) = run_server(config, listener).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
