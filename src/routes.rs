use crate::{
    api::{attendance_mark, attendance_record, attendance_type, employee, position, shift},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

/// Milliseconds between replenished requests for a per-minute budget.
fn replenish_ms(requests_per_min: u32) -> u64 {
    (60_000 / u64::from(requests_per_min.max(1))).max(1)
}

fn build_limiter(requests_per_min: u32) -> Option<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(replenish_ms(requests_per_min))
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

fn limiter(requests_per_min: u32) -> Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    Arc::new(build_limiter(requests_per_min).expect("period and burst are both >= 1"))
}

/// CRUD routes shared by every catalog resource.
macro_rules! crud {
    ($path:literal, $module:ident, $create:ident, $list:ident, $get:ident, $update:ident, $delete:ident, $bulk:ident) => {
        web::scope($path)
            .service(
                web::resource("")
                    .route(web::post().to($module::$create))
                    .route(web::get().to($module::$list)),
            )
            .service(web::resource("/bulk-delete").route(web::post().to($module::$bulk)))
            .service(
                web::resource("/{id}")
                    .route(web::get().to($module::$get))
                    .route(web::put().to($module::$update))
                    .route(web::delete().to($module::$delete)),
            )
    };
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = limiter(config.rate_login_per_min);
    let refresh_limiter = limiter(config.rate_refresh_per_min);
    let protected_limiter = limiter(config.rate_protected_per_min);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter)
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(protected_limiter)
            .service(crud!(
                "/positions",
                position,
                create_position,
                list_positions,
                get_position,
                update_position,
                delete_position,
                bulk_delete_positions
            ))
            .service(crud!(
                "/employees",
                employee,
                create_employee,
                list_employees,
                get_employee,
                update_employee,
                delete_employee,
                bulk_delete_employees
            ))
            .service(crud!(
                "/shifts",
                shift,
                create_shift,
                list_shifts,
                get_shift,
                update_shift,
                delete_shift,
                bulk_delete_shifts
            ))
            .service(crud!(
                "/attendance-types",
                attendance_type,
                create_attendance_type,
                list_attendance_types,
                get_attendance_type,
                update_attendance_type,
                delete_attendance_type,
                bulk_delete_attendance_types
            ))
            .service(
                web::scope("/attendance-records")
                    .service(
                        web::resource("")
                            .route(web::post().to(attendance_record::create_record))
                            .route(web::get().to(attendance_record::list_records)),
                    )
                    .service(
                        web::resource("/bulk-delete")
                            .route(web::post().to(attendance_record::bulk_delete_records)),
                    )
                    .service(
                        web::resource("/export")
                            .route(web::post().to(attendance_record::export_records)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance_record::get_record))
                            .route(web::put().to(attendance_record::update_record))
                            .route(web::delete().to(attendance_record::delete_record)),
                    )
                    // /attendance-records/{id}/marks
                    .service(
                        web::resource("/{id}/marks")
                            .route(web::get().to(attendance_mark::list_marks))
                            .route(web::post().to(attendance_mark::create_mark)),
                    ),
            )
            .service(
                web::resource("/attendance-marks/{id}")
                    .route(web::put().to(attendance_mark::update_mark))
                    .route(web::delete().to(attendance_mark::delete_mark)),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replenish_interval_follows_the_budget() {
        assert_eq!(replenish_ms(60), 1_000);
        assert_eq!(replenish_ms(1000), 60);
        assert_eq!(replenish_ms(0), 60_000);
        assert_eq!(replenish_ms(120_000), 1);
    }

    #[test]
    fn limiters_build_for_any_budget() {
        assert!(build_limiter(0).is_some());
        assert!(build_limiter(30).is_some());
    }
}
