use std::ops::DerefMut;

use actix_web::{get, post, web, HttpResponse};
use failsafe::CircuitBreaker;
use r2d2_redis::redis::{Commands, RedisError};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{NewRestaurant, Restaurant};
use crate::{db_conn, query, CircuitBreakerType, DbPool, RedisPool};

const RESTAURANT_CACHE_KEY: &str = "restaurants:all";

const NAME_MAX: usize = 55;
const ADDRESS_MAX: usize = 255;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRestaurantRequest {
    pub name: String,
    pub address: String,
}

fn validate_restaurant(body: &CreateRestaurantRequest) -> Result<(), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Restaurant name must not be empty".into(),
        ));
    }
    if body.name.chars().count() > NAME_MAX {
        return Err(ApiError::BadRequest(format!(
            "Restaurant name must be at most {} characters",
            NAME_MAX
        )));
    }
    if body.address.trim().is_empty() {
        return Err(ApiError::BadRequest("Address must not be empty".into()));
    }
    if body.address.chars().count() > ADDRESS_MAX {
        return Err(ApiError::BadRequest(format!(
            "Address must be at most {} characters",
            ADDRESS_MAX
        )));
    }
    Ok(())
}

/// Loads the listing from MySQL behind the circuit breaker. An open breaker
/// maps to 503 without touching the database.
async fn load_listing_guarded(
    circuit_breaker: web::Data<CircuitBreakerType>,
    pool: web::Data<DbPool>,
) -> Result<Vec<Restaurant>, ApiError> {
    web::block(move || -> Result<Vec<Restaurant>, ApiError> {
        let conn = db_conn(&pool)?;
        match circuit_breaker.call(|| query::find_all_restaurants(&conn)) {
            Ok(listing) => Ok(listing),
            Err(failsafe::Error::Inner(err)) => Err(ApiError::from(err)),
            Err(failsafe::Error::Rejected) => Err(ApiError::Unavailable),
        }
    })
    .await?
}

fn invalidate_listing_cache(redis_pool: &RedisPool) {
    match redis_pool.get() {
        Ok(mut redis_conn) => {
            let deleted: Result<i64, RedisError> =
                redis_conn.deref_mut().del(RESTAURANT_CACHE_KEY);
            if let Err(err) = deleted {
                log::warn!("failed to invalidate restaurant cache: {}", err);
            }
        }
        Err(err) => log::warn!("redis pool unavailable, cache not invalidated: {}", err),
    }
}

#[get("/restaurants")]
pub(crate) async fn list_restaurants(
    _user: AuthUser,
    circuit_breaker: web::Data<CircuitBreakerType>,
    redis_pool: web::Data<RedisPool>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    if !circuit_breaker.is_call_permitted() {
        return Err(ApiError::Unavailable);
    }

    // The listing is user-agnostic, so it is served from Redis when cached.
    match redis_pool.get() {
        Ok(mut redis_conn) => {
            let redis_conn = redis_conn.deref_mut();
            let cached: Result<Vec<u8>, RedisError> = redis_conn.get(RESTAURANT_CACHE_KEY);
            match cached {
                Ok(bytes) if !bytes.is_empty() => match Restaurant::list_from_u8(bytes) {
                    Ok(listing) => return Ok(HttpResponse::Ok().json(listing)),
                    Err(err) => log::warn!("discarding undecodable restaurant cache: {}", err),
                },
                Ok(_) => {}
                Err(err) => log::warn!("redis read failed: {}", err),
            }

            let listing = load_listing_guarded(circuit_breaker, pool).await?;
            match bincode::serialize(&listing) {
                Ok(encoded) => {
                    let stored: Result<bool, RedisError> =
                        redis_conn.set(RESTAURANT_CACHE_KEY, encoded);
                    if let Err(err) = stored {
                        log::warn!("failed to cache restaurant listing: {}", err);
                    }
                }
                Err(err) => log::warn!("failed to encode restaurant listing: {}", err),
            }
            Ok(HttpResponse::Ok().json(listing))
        }
        Err(err) => {
            // Redis is down; serve straight from the database, skip caching.
            log::warn!("redis pool unavailable: {}", err);
            let listing = load_listing_guarded(circuit_breaker, pool).await?;
            Ok(HttpResponse::Ok().json(listing))
        }
    }
}

#[get("/restaurants/{id}")]
pub(crate) async fn retrieve_restaurant(
    _user: AuthUser,
    pool: web::Data<DbPool>,
    restaurant_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let restaurant_id = restaurant_id.into_inner();

    let found = web::block(move || -> Result<Restaurant, ApiError> {
        let conn = db_conn(&pool)?;
        query::find_restaurant(restaurant_id, &conn)?.ok_or(ApiError::NotFound("Restaurant"))
    })
    .await??;

    Ok(HttpResponse::Ok().json(found))
}

#[post("/restaurants")]
pub(crate) async fn create_restaurant(
    _user: AuthUser,
    redis_pool: web::Data<RedisPool>,
    pool: web::Data<DbPool>,
    body: web::Json<CreateRestaurantRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validate_restaurant(&body)?;

    let created = web::block(move || -> Result<Restaurant, ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_restaurant_by_name(&body.name, &conn)?.is_some() {
            return Err(ApiError::BadRequest(
                "Restaurant name already taken".into(),
            ));
        }
        Ok(query::insert_restaurant(
            &NewRestaurant {
                name: &body.name,
                address: &body.address,
            },
            &conn,
        )?)
    })
    .await??;

    invalidate_listing_cache(&redis_pool);

    Ok(HttpResponse::Created().json(created))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, address: &str) -> CreateRestaurantRequest {
        CreateRestaurantRequest {
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn well_formed_restaurants_pass_validation() {
        assert!(validate_restaurant(&req("Taqueria", "100 Main St")).is_ok());
    }

    #[test]
    fn blank_fields_are_rejected() {
        assert!(validate_restaurant(&req("", "100 Main St")).is_err());
        assert!(validate_restaurant(&req("Taqueria", "  ")).is_err());
    }

    #[test]
    fn oversized_fields_are_rejected() {
        assert!(validate_restaurant(&req(&"n".repeat(NAME_MAX + 1), "addr")).is_err());
        assert!(validate_restaurant(&req("Taqueria", &"a".repeat(ADDRESS_MAX + 1))).is_err());
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        assert!(validate_restaurant(&req(&"é".repeat(NAME_MAX), "addr")).is_ok());
        assert!(validate_restaurant(&req("Taqueria", &"é".repeat(ADDRESS_MAX))).is_ok());
    }
}
