/// Amora headless probe - connects a session and logs the event stream
use amora_core::discovery::FixedLocation;
use amora_core::geo::Coordinate;
use amora_core::profile_store::{CurrentUser, ProfileStore, StoredIdentity};
use amora_core::rest::HttpMatchApi;
use amora_core::{Config, Session};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let store = ProfileStore::new(&config.data_dir())
        .map_err(|e| anyhow::anyhow!("Profile store error: {}", e))?;

    // First run: pick the identity up from the environment
    if store.load_identity()?.is_none() {
        let token = env::var("AMORA_TOKEN")
            .map_err(|_| anyhow::anyhow!("No stored identity and AMORA_TOKEN is not set"))?;
        let user_id = env::var("AMORA_USER_ID")
            .map_err(|_| anyhow::anyhow!("No stored identity and AMORA_USER_ID is not set"))?;
        store.save_identity(&StoredIdentity {
            token,
            user: CurrentUser {
                user_id: user_id.clone(),
                display_name: user_id,
                coordinate: None,
            },
        })?;
    }

    let identity = store.load_identity()?.expect("identity just stored");
    let api = Arc::new(HttpMatchApi::new(config.api_base_url.clone(), identity.token.clone()));
    let origin = identity.user.coordinate.unwrap_or(Coordinate::new(0.0, 0.0));
    let location = Arc::new(FixedLocation(origin));

    let session = Session::new(config, &store, api, location)
        .map_err(|e| anyhow::anyhow!("Session error: {}", e))?;

    info!("Starting Amora probe");
    info!("   User ID: {}", session.user().user_id);

    let mut events = session.subscribe();
    session.connect().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => info!("Event: {:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    info!("Probe lagged {} events", n);
                }
                Err(_) => break,
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
