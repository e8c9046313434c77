//! Small declarative helpers shared by the HTTP app.

/// Generate a `pub fn routes(cfg: &mut ServiceConfig)` that registers every
/// listed handler.
///
/// ```ignore
/// macros_utils::routes! {
///     route status_route,
///     route history_route,
/// }
///
/// App::new().configure(routes);
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:path),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::__actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}

#[cfg(feature = "actix")]
#[doc(hidden)]
pub use actix_web as __actix_web;
