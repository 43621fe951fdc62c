use serde::{Deserialize, Serialize};

use crate::schema::{auth_token, favorite_meal, meal, meal_rating, restaurant, user};

#[derive(Debug, Clone, Queryable)]
pub(crate) struct User {
    pub id: i32,
    pub username: String,
}

#[derive(Debug, Insertable)]
#[table_name = "user"]
pub(crate) struct NewUser<'a> {
    pub username: &'a str,
}

#[derive(Debug, Insertable)]
#[table_name = "auth_token"]
pub(crate) struct NewAuthToken<'a> {
    pub token: &'a str,
    pub user_id: i32,
}

#[derive(Debug, Clone, Queryable, Serialize, Deserialize)]
pub(crate) struct Restaurant {
    pub id: i32,
    pub name: String,
    pub address: String,
}

impl Restaurant {
    /// Decodes a bincode-encoded restaurant listing pulled out of Redis.
    pub(crate) fn list_from_u8(bytes: Vec<u8>) -> Result<Vec<Self>, Box<dyn std::error::Error>> {
        Ok(bincode::deserialize(&bytes)?)
    }
}

#[derive(Debug, Insertable)]
#[table_name = "restaurant"]
pub(crate) struct NewRestaurant<'a> {
    pub name: &'a str,
    pub address: &'a str,
}

#[derive(Debug, Clone, Queryable)]
pub(crate) struct Meal {
    pub id: i32,
    pub name: String,
    pub restaurant_id: i32,
}

#[derive(Debug, Insertable)]
#[table_name = "meal"]
pub(crate) struct NewMeal<'a> {
    pub name: &'a str,
    pub restaurant_id: i32,
}

#[derive(Debug, Clone, Queryable)]
pub(crate) struct MealRating {
    pub id: i32,
    pub user_id: i32,
    pub meal_id: i32,
    pub rating: i32,
}

#[derive(Debug, Insertable)]
#[table_name = "meal_rating"]
pub(crate) struct NewMealRating {
    pub user_id: i32,
    pub meal_id: i32,
    pub rating: i32,
}

#[derive(Debug, Insertable)]
#[table_name = "favorite_meal"]
pub(crate) struct NewFavoriteMeal {
    pub user_id: i32,
    pub meal_id: i32,
}

/// Wire shape for a meal: the stored row plus the per-request fields
/// (`avg_rating`, `user_rating`, `is_favorite`) computed for the
/// authenticated user. These are never persisted.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct MealDetail {
    pub id: i32,
    pub name: String,
    pub restaurant: Restaurant,
    pub avg_rating: f64,
    pub user_rating: Option<i32>,
    pub is_favorite: bool,
}

impl MealDetail {
    pub(crate) fn new(
        meal: Meal,
        restaurant: Restaurant,
        avg_rating: f64,
        user_rating: Option<i32>,
        is_favorite: bool,
    ) -> Self {
        MealDetail {
            id: meal.id,
            name: meal.name,
            restaurant,
            avg_rating,
            user_rating,
            is_favorite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restaurant_listing_roundtrips_through_bincode() {
        let listing = vec![Restaurant {
            id: 1,
            name: "Taqueria".to_string(),
            address: "100 Main St".to_string(),
        }];
        let bytes = bincode::serialize(&listing).unwrap();
        let decoded = Restaurant::list_from_u8(bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].name, "Taqueria");
    }

    #[test]
    fn meal_detail_serializes_enrichment_fields() {
        let detail = MealDetail::new(
            Meal {
                id: 7,
                name: "Pad Thai".to_string(),
                restaurant_id: 2,
            },
            Restaurant {
                id: 2,
                name: "Thai Kitchen".to_string(),
                address: "2 Elm".to_string(),
            },
            4.5,
            None,
            true,
        );
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["avg_rating"], 4.5);
        assert_eq!(json["user_rating"], serde_json::Value::Null);
        assert_eq!(json["is_favorite"], true);
        assert_eq!(json["restaurant"]["name"], "Thai Kitchen");
    }
}
