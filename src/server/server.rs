//! HTTP server core implementation

use crate::config::ServerConfig;
use crate::server::middleware::AuthGate;
use crate::server::routes;
use crate::server::state::AppState;
use crate::utils::error::{RelayError, Result};
use actix_web::{App, HttpServer as ActixHttpServer, web};
use tracing::info;
use tracing_actix_web::TracingLogger;

/// HTTP server
pub struct RelayServer {
    /// Listener configuration
    config: ServerConfig,
    /// Application state
    state: AppState,
}

impl RelayServer {
    /// Create a new HTTP server around existing state
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Create the Actix-web application
    ///
    /// Public so integration tests can drive the exact production wiring
    /// through `actix_web::test`.
    pub fn create_app(
        state: web::Data<AppState>,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let max_body_size = state.core.load().config.relay.server.max_body_size;

        App::new()
            .app_data(state)
            .app_data(web::PayloadConfig::new(max_body_size))
            .wrap(AuthGate)
            .wrap(TracingLogger::default())
            .configure(routes::configure)
            .default_service(web::route().to(routes::forward::forward_request))
    }

    /// Start the HTTP server
    pub async fn start(self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Starting HTTP server on {}", bind_addr);

        let state = web::Data::new(self.state);

        let server = ActixHttpServer::new(move || Self::create_app(state.clone()))
            .bind(&bind_addr)
            .map_err(|e| {
                RelayError::Config(format!("Failed to bind {}: {}", bind_addr, e))
            })?
            .run();

        info!("HTTP server listening on {}", bind_addr);

        server
            .await
            .map_err(|e| RelayError::Internal(format!("Server error: {}", e)))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
