use actix_cors::Cors;
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, Error, web};

use crate::routes;
use crate::state::AppState;

/// The full application: shared state, CORS and every route
///
/// Any origin may read the API, with any method or header, so a dashboard
/// served from elsewhere can query it from the browser.
pub fn create_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = Error,
    >,
> {
    App::new()
        .app_data(web::Data::new(state))
        .wrap(Cors::permissive())
        .configure(routes::routes)
}
