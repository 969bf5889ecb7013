use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use mastery_exam_server::{
    app_state::AppState,
    auth::{AuthMiddleware, JwtService},
    config::Config,
    handlers,
    middleware::RequestIdMiddleware,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env();
    if cfg!(not(debug_assertions)) {
        if let Err(e) = config.validate_for_production() {
            log::error!("Refusing to start: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    }

    let jwt_service = web::Data::new(JwtService::new(
        &config.jwt_secret,
        config.jwt_expiration_hours,
    ));
    let bind_address = (config.web_server_host.clone(), config.web_server_port);

    let state = AppState::new(config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let state = web::Data::new(state);

    log::info!(
        "Starting exam server on {}:{}",
        bind_address.0,
        bind_address.1
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(jwt_service.clone())
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .wrap(RequestIdMiddleware)
            .service(handlers::health_check)
            .service(handlers::health_check_ready)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(handlers::configure),
            )
    })
    .bind(bind_address)?
    .run()
    .await
}
