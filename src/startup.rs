use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;

use crate::auth::TokenIssuer;
use crate::configuration::{DatabaseSettings, JwtSettings};
use crate::domain::Role;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::AuthMiddleware;
use crate::routes::{
    health_check, list_sessions, login, logout, me, method_not_allowed, not_found, register,
    revoke_all, sweep, user_tokens,
};
use crate::session::SessionService;
use crate::store::{
    InMemoryTokenLedger, InMemoryUserStore, PgTokenLedger, PgUserStore, TokenLedger, UserStore,
};

/// The two stores the service runs on
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserStore>,
    pub ledger: Arc<dyn TokenLedger>,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserStore::new()),
            ledger: Arc::new(InMemoryTokenLedger::new()),
        }
    }

    /// Open a pool and bring the schema up to date.
    pub async fn connect(config: &DatabaseSettings) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.connection_string())
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");

        Ok(Self {
            users: Arc::new(PgUserStore::new(pool.clone())),
            ledger: Arc::new(PgTokenLedger::new(pool)),
        })
    }
}

pub fn run(
    listener: TcpListener,
    storage: Storage,
    jwt_config: &JwtSettings,
) -> Result<Server, std::io::Error> {
    let issuer = Arc::new(TokenIssuer::new(jwt_config));
    let sessions = web::Data::new(SessionService::new(
        storage.users.clone(),
        storage.ledger.clone(),
        issuer.clone(),
    ));
    let users: web::Data<dyn UserStore> = web::Data::from(storage.users.clone());
    let ledger = storage.ledger;

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            AppError::from(ValidationError::InvalidPayload(err.to_string())).into()
        });
        let path_config = web::PathConfig::default().error_handler(|err, _req| {
            AppError::from(ValidationError::InvalidParameter(err.to_string())).into()
        });
        let query_config = web::QueryConfig::default().error_handler(|err, _req| {
            AppError::from(ValidationError::InvalidParameter(err.to_string())).into()
        });

        App::new()
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            .app_data(json_config)
            .app_data(path_config)
            .app_data(query_config)
            .app_data(sessions.clone())
            .app_data(users.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/register")
                    .route(web::post().to(register))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/login")
                    .route(web::post().to(login))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/logout")
                    .route(web::post().to(logout))
                    .default_service(web::to(method_not_allowed)),
            )
            // Registered before `/api` so it is matched first
            .service(
                web::scope("/api/admin")
                    .wrap(
                        AuthMiddleware::new(issuer.clone(), ledger.clone())
                            .allow_roles(&[Role::Admin]),
                    )
                    .route("/users/{id}/tokens", web::get().to(user_tokens))
                    .route("/sweep", web::post().to(sweep)),
            )
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(issuer.clone(), ledger.clone()))
                    .route("/me", web::get().to(me))
                    .route("/sessions", web::get().to(list_sessions))
                    .route("/sessions/revoke-all", web::post().to(revoke_all)),
            )
            .default_service(web::to(not_found))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
