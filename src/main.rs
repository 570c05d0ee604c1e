use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rust_roster::config::Config;
use rust_roster::credential::Argon2Hasher;
use rust_roster::domain::Backend;
use rust_roster::middleware::AuthLayer;
use rust_roster::proto::auth::auth_service_server::AuthServiceServer;
use rust_roster::proto::health::health_server::HealthServer;
use rust_roster::proto::items::items_service_server::ItemsServiceServer;
use rust_roster::proto::logs::logs_service_server::LogsServiceServer;
use rust_roster::proto::member::member_service_server::MemberServiceServer;
use rust_roster::proto::organization::organization_service_server::OrganizationServiceServer;
use rust_roster::services::{
    AuthServiceImpl, HealthServiceImpl, ItemsServiceImpl, LogsServiceImpl, MemberServiceImpl,
    OrganizationServiceImpl,
};
use rust_roster::store::postgres::{create_pool, run_migrations};
use rust_roster::store::{MemoryStore, PgStore, Store};
use rust_roster::token::JwtCodec;

use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Include file descriptor for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("roster_descriptor");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_roster=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("JWT_SECRET must be set")?;

    tracing::info!("Starting rust-roster gRPC server...");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(url).await?;
            run_migrations(&pool).await?;
            tracing::info!("Database connection established");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    if config.token_ttl().is_none() {
        tracing::warn!("TOKEN_TTL_HOURS is 0, issued tokens never expire");
    }

    let backend = Backend::new(
        store.clone(),
        Arc::new(Argon2Hasher),
        Arc::new(JwtCodec::new(&config.jwt_secret)),
        config.token_ttl(),
    );

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!("Listening on {}", addr);

    // Outermost first; AuthLayer sits next to the routes
    Server::builder()
        .accept_http1(true)
        .layer(TraceLayer::new_for_grpc())
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new())
        .layer(AuthLayer::new(backend.identity.clone()))
        .add_service(reflection_service)
        .add_service(AuthServiceServer::new(AuthServiceImpl::new(
            backend.identity.clone(),
        )))
        .add_service(MemberServiceServer::new(MemberServiceImpl::new(
            backend.members.clone(),
        )))
        .add_service(ItemsServiceServer::new(ItemsServiceImpl::new(
            backend.items.clone(),
        )))
        .add_service(LogsServiceServer::new(LogsServiceImpl::new(
            backend.audit.clone(),
        )))
        .add_service(OrganizationServiceServer::new(OrganizationServiceImpl::new(
            backend.organization.clone(),
        )))
        .add_service(HealthServer::new(HealthServiceImpl::new(store)))
        .serve(addr)
        .await?;

    Ok(())
}
