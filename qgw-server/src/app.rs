//! Wires the compiler, the transport, and the shard controller behind an
//! `actix-web` 4 application: one `AppState` holding the shared
//! collaborators, `create_app` wiring them into routes via
//! `App::new().app_data(...)`.

use std::sync::Arc;

use actix_web::{middleware, web, App};

use qgw_core::backend::EsBackend;
use qgw_core::schema::Schema;

use crate::config::Settings;
use crate::handlers;
use crate::saved_queries::SavedQueryStore;

pub struct AppState {
    pub settings: Settings,
    pub schema: Arc<dyn Schema>,
    pub backend: Box<dyn EsBackend>,
    pub saved_queries: Arc<dyn SavedQueryStore>,
}

pub fn create_app(
    state: Arc<AppState>,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(web::Data::from(state))
        .wrap(middleware::Logger::default())
        .wrap(
            middleware::DefaultHeaders::new()
                .add(("Access-Control-Allow-Origin", "*"))
                .add(("Vary", "Accept-Encoding")),
        )
        .route("/query", web::post().to(handlers::query::query_handler))
        .route("/find/{hash}", web::get().to(handlers::find::find_handler))
}
