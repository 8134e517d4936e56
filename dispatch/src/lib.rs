pub mod admin;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod decision;
pub mod errors;
pub mod metrics_defs;
pub mod request;

#[cfg(test)]
mod testutils;

use admin::ReferenceDataAdmin;
use api::{AppState, Settings};
use collaborators::Collaborators;
use config::Config;
use decision::{Dispatcher, Policy};
use errors::DispatchError;
use refdata::ReferenceData;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Runs the public dispatch listener and the admin listener until either fails.
pub async fn run(config: Config, refdata: ReferenceData) -> Result<(), DispatchError> {
    let collaborators = Collaborators::from_config(&config.collaborators)?;
    let dispatcher = Dispatcher::new(
        refdata.campaigns(),
        collaborators,
        Policy::from(&config.policy),
    );

    let state = AppState {
        resolver: refdata.resolver(),
        campaigns: refdata.campaigns(),
        dispatcher,
        settings: Arc::new(Settings::from(&config)),
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Dispatch listening");

    let public = async {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok::<(), DispatchError>(())
    };

    let admin_service =
        AdminService::<DispatchError>::new(Arc::new(ReferenceDataAdmin::new(refdata)));
    let admin = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(public, admin)?;
    Ok(())
}
