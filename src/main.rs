//! blobcore: Azure Blob Storage emulator core.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use blobcore::{Args, BlobServer, Config, DEFAULT_ACCOUNT};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let log_level = if args.debug {
        Level::DEBUG
    } else if args.silent {
        Level::ERROR
    } else {
        Level::INFO
    };

    // RUST_LOG wins over the command-line level when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from(args);
    let server = BlobServer::new(config);

    println!(
        r#"
Blob service is starting at {}

Default account: {}

Connection string:
DefaultEndpointsProtocol=http;AccountName={};AccountKey=<key>;BlobEndpoint={}/{};

Press Ctrl+C to stop the server.
"#,
        server.bind_address(),
        DEFAULT_ACCOUNT,
        DEFAULT_ACCOUNT,
        server.base_url(),
        DEFAULT_ACCOUNT
    );

    server.run().await
}
