#[macro_use]
extern crate diesel;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use failsafe::backoff::EqualJittered;
use failsafe::failure_policy::{ConsecutiveFailures, OrElse, SuccessRateOverTimeWindow};
use failsafe::{Config, StateMachine};
use r2d2_redis::RedisConnectionManager;

mod auth;
mod error;
mod meals;
mod models;
mod query;
mod restaurants;
mod schema;

use crate::error::ApiError;

pub(crate) type DbPool = r2d2::Pool<ConnectionManager<MysqlConnection>>;
pub(crate) type DbConn = r2d2::PooledConnection<ConnectionManager<MysqlConnection>>;
pub(crate) type RedisPool = r2d2::Pool<RedisConnectionManager>;

const CACHE_POOL_MAX_OPEN: u32 = 16;
const CACHE_POOL_MIN_IDLE: u32 = 8;
const CACHE_POOL_EXPIRE_SECONDS: u64 = 60;

pub(crate) type CircuitBreakerType = StateMachine<
    OrElse<SuccessRateOverTimeWindow<EqualJittered>, ConsecutiveFailures<EqualJittered>>,
    (),
>;

pub(crate) fn db_conn(pool: &DbPool) -> Result<DbConn, ApiError> {
    pool.get().map_err(|err| {
        log::error!("database pool error: {}", err);
        ApiError::Internal
    })
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // set up database connection pool
    let conn_spec = std::env::var("DATABASE_URL").expect("DATABASE_URL");
    let manager = ConnectionManager::<MysqlConnection>::new(conn_spec);
    let pool = r2d2::Pool::builder()
        .build(manager)
        .expect("Failed to create pool.");

    let redis_spec =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let manager = RedisConnectionManager::new(redis_spec.as_str()).expect("invalid REDIS_URL");
    let redis_pool = r2d2::Pool::builder()
        .max_size(CACHE_POOL_MAX_OPEN)
        .max_lifetime(Some(Duration::from_secs(CACHE_POOL_EXPIRE_SECONDS)))
        .min_idle(Some(CACHE_POOL_MIN_IDLE))
        .build(manager)
        .expect("Failed to create redis pool.");

    let circuit_breaker = Config::new().build();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    log::info!("starting HTTP server at http://{}", bind_addr);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            // set up DB pool to be used with web::Data<Pool> extractor
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(redis_pool.clone()))
            .app_data(web::Data::new(circuit_breaker.clone()))
            .wrap(middleware::Logger::default())
            .service(auth::register)
            .service(auth::login)
            .service(meals::create_meal)
            .service(meals::list_meals)
            .service(meals::retrieve_meal)
            .service(meals::rate_meal)
            .service(meals::update_meal_rating)
            .service(meals::favorite_meal)
            .service(meals::unfavorite_meal)
            .service(restaurants::create_restaurant)
            .service(restaurants::list_restaurants)
            .service(restaurants::retrieve_restaurant)
    })
    .bind(bind_addr.as_str())?
    .run()
    .await
}
