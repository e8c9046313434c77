use actix_web::web::ServiceConfig;

mod logs;
mod status;

pub fn routes(cfg: &mut ServiceConfig) {
    status::routes(cfg);
    logs::routes(cfg);
}
