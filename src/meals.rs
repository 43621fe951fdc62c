use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{MealDetail, MealRating, NewMeal, NewMealRating};
use crate::{db_conn, query, DbPool};

const MEAL_NAME_MAX: usize = 55;
const RATING_MIN: i32 = 1;
const RATING_MAX: i32 = 5;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateMealRequest {
    pub name: String,
    pub restaurant: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RateRequest {
    pub rating: i32,
}

fn validate_meal_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("Meal name must not be empty".into()));
    }
    if name.chars().count() > MEAL_NAME_MAX {
        return Err(ApiError::BadRequest(format!(
            "Meal name must be at most {} characters",
            MEAL_NAME_MAX
        )));
    }
    Ok(())
}

fn validate_rating(value: i32) -> Result<(), ApiError> {
    if !(RATING_MIN..=RATING_MAX).contains(&value) {
        return Err(ApiError::BadRequest(format!(
            "Rating must be between {} and {}",
            RATING_MIN, RATING_MAX
        )));
    }
    Ok(())
}

/// A PUT to the rate endpoint requires a stored rating; existence comes from
/// the lookup, never from the update's affected-row count.
fn require_existing_rating(existing: Option<MealRating>) -> Result<(), ApiError> {
    if existing.is_none() {
        return Err(ApiError::NotFound("Rating"));
    }
    Ok(())
}

fn rating_insert_outcome(inserted: bool) -> Result<(), ApiError> {
    if inserted {
        Ok(())
    } else {
        Err(ApiError::BadRequest(
            "You have already rated this meal".into(),
        ))
    }
}

#[post("/meals")]
pub(crate) async fn create_meal(
    user: AuthUser,
    pool: web::Data<DbPool>,
    body: web::Json<CreateMealRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    validate_meal_name(&body.name)?;
    let requester = user.0.id;

    let detail = web::block(move || -> Result<MealDetail, ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_restaurant(body.restaurant, &conn)?.is_none() {
            return Err(ApiError::NotFound("Restaurant"));
        }
        let meal = query::insert_meal(
            &NewMeal {
                name: &body.name,
                restaurant_id: body.restaurant,
            },
            &conn,
        )?;
        query::meal_detail(requester, meal.id, &conn)?.ok_or(ApiError::Internal)
    })
    .await??;

    Ok(HttpResponse::Created().json(detail))
}

#[get("/meals")]
pub(crate) async fn list_meals(
    user: AuthUser,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let requester = user.0.id;

    let meals = web::block(move || -> Result<Vec<MealDetail>, ApiError> {
        let conn = db_conn(&pool)?;
        Ok(query::list_meal_details(requester, &conn)?)
    })
    .await??;

    Ok(HttpResponse::Ok().json(meals))
}

#[get("/meals/{id}")]
pub(crate) async fn retrieve_meal(
    user: AuthUser,
    pool: web::Data<DbPool>,
    meal_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let requester = user.0.id;
    let meal_id = meal_id.into_inner();

    let detail = web::block(move || -> Result<MealDetail, ApiError> {
        let conn = db_conn(&pool)?;
        query::meal_detail(requester, meal_id, &conn)?.ok_or(ApiError::NotFound("Meal"))
    })
    .await??;

    Ok(HttpResponse::Ok().json(detail))
}

#[post("/meals/{id}/rate")]
pub(crate) async fn rate_meal(
    user: AuthUser,
    pool: web::Data<DbPool>,
    meal_id: web::Path<i32>,
    body: web::Json<RateRequest>,
) -> Result<HttpResponse, ApiError> {
    let value = body.into_inner().rating;
    validate_rating(value)?;
    let requester = user.0.id;
    let meal_id = meal_id.into_inner();

    web::block(move || -> Result<(), ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_meal(meal_id, &conn)?.is_none() {
            return Err(ApiError::NotFound("Meal"));
        }
        let inserted = query::insert_rating(
            &NewMealRating {
                user_id: requester,
                meal_id,
                rating: value,
            },
            &conn,
        )?;
        rating_insert_outcome(inserted)
    })
    .await??;

    Ok(HttpResponse::Created().json(json!({ "message": "Meal rated" })))
}

#[put("/meals/{id}/rate")]
pub(crate) async fn update_meal_rating(
    user: AuthUser,
    pool: web::Data<DbPool>,
    meal_id: web::Path<i32>,
    body: web::Json<RateRequest>,
) -> Result<HttpResponse, ApiError> {
    let value = body.into_inner().rating;
    validate_rating(value)?;
    let requester = user.0.id;
    let meal_id = meal_id.into_inner();

    web::block(move || -> Result<(), ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_meal(meal_id, &conn)?.is_none() {
            return Err(ApiError::NotFound("Meal"));
        }
        require_existing_rating(query::find_rating(requester, meal_id, &conn)?)?;
        query::update_rating(requester, meal_id, value, &conn)?;
        Ok(())
    })
    .await??;

    Ok(HttpResponse::NoContent().finish())
}

#[post("/meals/{id}/favorite")]
pub(crate) async fn favorite_meal(
    user: AuthUser,
    pool: web::Data<DbPool>,
    meal_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let requester = user.0.id;
    let meal_id = meal_id.into_inner();

    web::block(move || -> Result<(), ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_meal(meal_id, &conn)?.is_none() {
            return Err(ApiError::NotFound("Meal"));
        }
        Ok(query::insert_favorite(requester, meal_id, &conn)?)
    })
    .await??;

    Ok(HttpResponse::Created().json(json!({ "message": "Meal favorited" })))
}

#[delete("/meals/{id}/unfavorite")]
pub(crate) async fn unfavorite_meal(
    user: AuthUser,
    pool: web::Data<DbPool>,
    meal_id: web::Path<i32>,
) -> Result<HttpResponse, ApiError> {
    let requester = user.0.id;
    let meal_id = meal_id.into_inner();

    web::block(move || -> Result<(), ApiError> {
        let conn = db_conn(&pool)?;
        if query::find_meal(meal_id, &conn)?.is_none() {
            return Err(ApiError::NotFound("Meal"));
        }
        Ok(query::delete_favorite(requester, meal_id, &conn)?)
    })
    .await??;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_names_are_validated() {
        assert!(validate_meal_name("Pad Thai").is_ok());
        assert!(validate_meal_name("").is_err());
        assert!(validate_meal_name("  ").is_err());
        assert!(validate_meal_name(&"m".repeat(MEAL_NAME_MAX)).is_ok());
        assert!(validate_meal_name(&"m".repeat(MEAL_NAME_MAX + 1)).is_err());
    }

    #[test]
    fn meal_name_limit_counts_characters_not_bytes() {
        // 55 two-byte characters are within the 55-character limit.
        assert!(validate_meal_name(&"é".repeat(MEAL_NAME_MAX)).is_ok());
        assert!(validate_meal_name(&"é".repeat(MEAL_NAME_MAX + 1)).is_err());
    }

    #[test]
    fn resubmitting_the_stored_value_is_not_a_missing_rating() {
        // An update that matches the stored row but changes nothing must
        // still count as existing.
        let existing = MealRating {
            id: 1,
            user_id: 2,
            meal_id: 3,
            rating: 4,
        };
        assert!(require_existing_rating(Some(existing)).is_ok());
    }

    #[test]
    fn updating_an_absent_rating_is_not_found() {
        assert!(matches!(
            require_existing_rating(None),
            Err(ApiError::NotFound("Rating"))
        ));
    }

    #[test]
    fn duplicate_rating_insert_is_a_bad_request() {
        assert!(rating_insert_outcome(true).is_ok());
        assert!(matches!(
            rating_insert_outcome(false),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn ratings_are_bounded() {
        assert!(validate_rating(1).is_ok());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!(validate_rating(-3).is_err());
    }
}
