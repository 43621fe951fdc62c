use diesel::prelude::*;
use uuid::Uuid;

use crate::models::{
    Meal, MealDetail, MealRating, NewAuthToken, NewFavoriteMeal, NewMeal, NewMealRating,
    NewRestaurant, NewUser, Restaurant, User,
};

pub(crate) type DbError = Box<dyn std::error::Error + Send + Sync>;

no_arg_sql_function!(
    last_insert_id,
    diesel::sql_types::Unsigned<diesel::sql_types::Bigint>
);

/// Average of the stored ratings; 0.0 for an unrated meal.
pub(crate) fn average(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64
}

// ---- users & tokens ----

pub(crate) fn find_user_by_username(
    name: &str,
    conn: &MysqlConnection,
) -> Result<Option<User>, DbError> {
    use crate::schema::user::dsl::*;

    Ok(user.filter(username.eq(name)).first::<User>(conn).optional()?)
}

pub(crate) fn insert_user(name: &str, conn: &MysqlConnection) -> Result<User, DbError> {
    use crate::schema::user::dsl::*;

    diesel::insert_into(user)
        .values(&NewUser { username: name })
        .execute(conn)?;
    let new_id: u64 = diesel::select(last_insert_id).first(conn)?;
    Ok(user.filter(id.eq(new_id as i32)).first::<User>(conn)?)
}

pub(crate) fn issue_token(for_user: i32, conn: &MysqlConnection) -> Result<String, DbError> {
    use crate::schema::auth_token::dsl::*;

    let new_token = Uuid::new_v4().to_string();
    diesel::insert_into(auth_token)
        .values(&NewAuthToken {
            token: &new_token,
            user_id: for_user,
        })
        .execute(conn)?;
    Ok(new_token)
}

pub(crate) fn find_token_for_user(
    for_user: i32,
    conn: &MysqlConnection,
) -> Result<Option<String>, DbError> {
    use crate::schema::auth_token::dsl::*;

    Ok(auth_token
        .filter(user_id.eq(for_user))
        .select(token)
        .first::<String>(conn)
        .optional()?)
}

pub(crate) fn find_user_by_token(
    key: &str,
    conn: &MysqlConnection,
) -> Result<Option<User>, DbError> {
    use crate::schema::{auth_token, user};

    Ok(auth_token::table
        .inner_join(user::table)
        .filter(auth_token::token.eq(key))
        .select((user::id, user::username))
        .first::<User>(conn)
        .optional()?)
}

// ---- restaurants ----

pub(crate) fn find_all_restaurants(conn: &MysqlConnection) -> Result<Vec<Restaurant>, DbError> {
    use crate::schema::restaurant::dsl::*;

    Ok(restaurant.order(name.asc()).load::<Restaurant>(conn)?)
}

pub(crate) fn find_restaurant(
    restaurant_id: i32,
    conn: &MysqlConnection,
) -> Result<Option<Restaurant>, DbError> {
    use crate::schema::restaurant::dsl::*;

    Ok(restaurant
        .filter(id.eq(restaurant_id))
        .first::<Restaurant>(conn)
        .optional()?)
}

pub(crate) fn find_restaurant_by_name(
    restaurant_name: &str,
    conn: &MysqlConnection,
) -> Result<Option<Restaurant>, DbError> {
    use crate::schema::restaurant::dsl::*;

    Ok(restaurant
        .filter(name.eq(restaurant_name))
        .first::<Restaurant>(conn)
        .optional()?)
}

pub(crate) fn insert_restaurant(
    new: &NewRestaurant,
    conn: &MysqlConnection,
) -> Result<Restaurant, DbError> {
    use crate::schema::restaurant::dsl::*;

    diesel::insert_into(restaurant).values(new).execute(conn)?;
    let new_id: u64 = diesel::select(last_insert_id).first(conn)?;
    Ok(restaurant
        .filter(id.eq(new_id as i32))
        .first::<Restaurant>(conn)?)
}

// ---- meals ----

pub(crate) fn insert_meal(new: &NewMeal, conn: &MysqlConnection) -> Result<Meal, DbError> {
    use crate::schema::meal::dsl::*;

    diesel::insert_into(meal).values(new).execute(conn)?;
    let new_id: u64 = diesel::select(last_insert_id).first(conn)?;
    Ok(meal.filter(id.eq(new_id as i32)).first::<Meal>(conn)?)
}

pub(crate) fn find_meal(meal_id: i32, conn: &MysqlConnection) -> Result<Option<Meal>, DbError> {
    use crate::schema::meal::dsl::*;

    Ok(meal.filter(id.eq(meal_id)).first::<Meal>(conn).optional()?)
}

fn find_meal_with_restaurant(
    target: i32,
    conn: &MysqlConnection,
) -> Result<Option<(Meal, Restaurant)>, DbError> {
    use crate::schema::{meal, restaurant};

    Ok(meal::table
        .inner_join(restaurant::table)
        .filter(meal::id.eq(target))
        .first::<(Meal, Restaurant)>(conn)
        .optional()?)
}

// ---- ratings ----

pub(crate) fn find_rating(
    rater: i32,
    target: i32,
    conn: &MysqlConnection,
) -> Result<Option<MealRating>, DbError> {
    use crate::schema::meal_rating::dsl::*;

    Ok(meal_rating
        .filter(user_id.eq(rater).and(meal_id.eq(target)))
        .first::<MealRating>(conn)
        .optional()?)
}

/// Returns false when the user has already rated the meal. The unique
/// `(user_id, meal_id)` key makes INSERT IGNORE skip the duplicate, so two
/// racing requests cannot both insert.
pub(crate) fn insert_rating(new: &NewMealRating, conn: &MysqlConnection) -> Result<bool, DbError> {
    use crate::schema::meal_rating::dsl::*;

    let inserted = diesel::insert_or_ignore_into(meal_rating)
        .values(new)
        .execute(conn)?;
    Ok(inserted > 0)
}

/// Resubmitting the stored value changes no rows on MySQL, so the affected
/// count says nothing about existence; callers check `find_rating` first.
pub(crate) fn update_rating(
    rater: i32,
    target: i32,
    value: i32,
    conn: &MysqlConnection,
) -> Result<(), DbError> {
    use crate::schema::meal_rating::dsl::*;

    diesel::update(meal_rating.filter(user_id.eq(rater).and(meal_id.eq(target))))
        .set(rating.eq(value))
        .execute(conn)?;
    Ok(())
}

fn load_meal_ratings(target: i32, conn: &MysqlConnection) -> Result<Vec<i32>, DbError> {
    use crate::schema::meal_rating::dsl::*;

    Ok(meal_rating
        .filter(meal_id.eq(target))
        .select(rating)
        .load::<i32>(conn)?)
}

fn load_all_ratings(conn: &MysqlConnection) -> Result<Vec<(i32, i32)>, DbError> {
    use crate::schema::meal_rating::dsl::*;

    Ok(meal_rating.select((meal_id, rating)).load::<(i32, i32)>(conn)?)
}

fn load_user_ratings(rater: i32, conn: &MysqlConnection) -> Result<Vec<(i32, i32)>, DbError> {
    use crate::schema::meal_rating::dsl::*;

    Ok(meal_rating
        .filter(user_id.eq(rater))
        .select((meal_id, rating))
        .load::<(i32, i32)>(conn)?)
}

// ---- favorites ----

pub(crate) fn is_favorite(
    owner: i32,
    target: i32,
    conn: &MysqlConnection,
) -> Result<bool, DbError> {
    use crate::schema::favorite_meal::dsl::*;

    let count: i64 = favorite_meal
        .filter(user_id.eq(owner).and(meal_id.eq(target)))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub(crate) fn insert_favorite(owner: i32, target: i32, conn: &MysqlConnection) -> Result<(), DbError> {
    use crate::schema::favorite_meal::dsl::*;

    // Favoriting an already-favorited meal is a no-op: the unique
    // (user_id, meal_id) key turns the duplicate into an ignored insert.
    diesel::insert_or_ignore_into(favorite_meal)
        .values(&NewFavoriteMeal {
            user_id: owner,
            meal_id: target,
        })
        .execute(conn)?;
    Ok(())
}

pub(crate) fn delete_favorite(owner: i32, target: i32, conn: &MysqlConnection) -> Result<(), DbError> {
    use crate::schema::favorite_meal::dsl::*;

    diesel::delete(favorite_meal.filter(user_id.eq(owner).and(meal_id.eq(target))))
        .execute(conn)?;
    Ok(())
}

fn load_user_favorites(owner: i32, conn: &MysqlConnection) -> Result<Vec<i32>, DbError> {
    use crate::schema::favorite_meal::dsl::*;

    Ok(favorite_meal
        .filter(user_id.eq(owner))
        .select(meal_id)
        .load::<i32>(conn)?)
}

// ---- enrichment ----

/// One meal with `avg_rating`, `user_rating` and `is_favorite` computed
/// for the requesting user.
pub(crate) fn meal_detail(
    requester: i32,
    target: i32,
    conn: &MysqlConnection,
) -> Result<Option<MealDetail>, DbError> {
    let (found, owner) = match find_meal_with_restaurant(target, conn)? {
        Some(pair) => pair,
        None => return Ok(None),
    };
    let ratings = load_meal_ratings(target, conn)?;
    let user_rating = find_rating(requester, target, conn)?.map(|r| r.rating);
    let favorite = is_favorite(requester, target, conn)?;
    Ok(Some(MealDetail::new(
        found,
        owner,
        average(&ratings),
        user_rating,
        favorite,
    )))
}

/// Every meal, enriched for the requesting user. Ratings and favorites are
/// loaded once and grouped in memory rather than queried per meal.
pub(crate) fn list_meal_details(
    requester: i32,
    conn: &MysqlConnection,
) -> Result<Vec<MealDetail>, DbError> {
    use std::collections::{HashMap, HashSet};

    use crate::schema::{meal, restaurant};

    let meals = meal::table
        .inner_join(restaurant::table)
        .order(meal::name.asc())
        .load::<(Meal, Restaurant)>(conn)?;

    let mut by_meal: HashMap<i32, Vec<i32>> = HashMap::new();
    for (meal_id, rating) in load_all_ratings(conn)? {
        by_meal.entry(meal_id).or_default().push(rating);
    }
    let own_ratings: HashMap<i32, i32> = load_user_ratings(requester, conn)?.into_iter().collect();
    let favorites: HashSet<i32> = load_user_favorites(requester, conn)?.into_iter().collect();

    Ok(meals
        .into_iter()
        .map(|(found, owner)| {
            let avg = by_meal.get(&found.id).map(|rs| average(rs)).unwrap_or(0.0);
            let user_rating = own_ratings.get(&found.id).copied();
            let favorite = favorites.contains(&found.id);
            MealDetail::new(found, owner, avg, user_rating, favorite)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::average;

    #[test]
    fn average_of_no_ratings_is_zero() {
        assert_eq!(average(&[]), 0.0);
    }

    #[test]
    fn average_is_the_arithmetic_mean() {
        assert_eq!(average(&[3]), 3.0);
        assert_eq!(average(&[3, 4]), 3.5);
        assert_eq!(average(&[1, 2, 5]), 8.0 / 3.0);
    }
}
