pub mod blacklist;
pub mod bundle;
pub mod config;
pub mod keystore;
pub mod netdb;
pub mod reseeder;
pub mod throttle;
pub mod tls;
pub mod web;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::blacklist::Blacklist;
use crate::config::Config;
use crate::netdb::LocalNetDb;
use crate::reseeder::Reseeder;
use crate::throttle::Throttle;
use crate::web::AppState;

/// Bring up the engine and serve until the listener dies.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let blacklist = Arc::new(Blacklist::new());
    if let Some(path) = &config.blacklist_file {
        let added = blacklist.load_file(path)?;
        info!("loaded {added} blacklist entries from {}", path.display());
    }

    let signing_key = keystore::load_signing_key(&config.signing_key)?;
    let netdb = Arc::new(LocalNetDb::new(&config.netdb_dir));

    let reseeder = Arc::new(
        Reseeder::new(netdb, config.signer_id.as_bytes(), signing_key)?
            .with_num_ri(config.num_ri)
            .with_num_su3(config.num_su3)
            .with_rebuild_interval(config.rebuild_interval),
    );
    let engine_handle = Arc::clone(&reseeder).start().await;

    let state = AppState {
        reseeder,
        throttle: Arc::new(Throttle::per_hour(throttle::DEFAULT_QUOTA_PER_HOUR)),
    };
    let app = web::router(state, &config.prefix, config.trust_proxy);

    let listener = TcpListener::bind(&config.addr).await?;

    let result = match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => {
            let acceptor = tls::build_acceptor(cert, key)?;
            info!("reseed server listening on https://{}", config.addr);
            web::serve_tls(listener, app, blacklist, acceptor).await
        }
        _ => {
            info!("reseed server listening on http://{}", config.addr);
            web::serve_plain(listener, app, blacklist).await
        }
    };

    engine_handle.stop().await;
    result
}
