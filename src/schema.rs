table! {
    user (id) {
        id -> Int4,
        username -> Varchar,
    }
}

table! {
    auth_token (token) {
        token -> Varchar,
        user_id -> Int4,
    }
}

table! {
    restaurant (id) {
        id -> Int4,
        name -> Varchar,
        address -> Varchar,
    }
}

table! {
    meal (id) {
        id -> Int4,
        name -> Varchar,
        restaurant_id -> Int4,
    }
}

// unique key on (user_id, meal_id)
table! {
    meal_rating (id) {
        id -> Int4,
        user_id -> Int4,
        meal_id -> Int4,
        rating -> Int4,
    }
}

// unique key on (user_id, meal_id)
table! {
    favorite_meal (id) {
        id -> Int4,
        user_id -> Int4,
        meal_id -> Int4,
    }
}

joinable!(meal -> restaurant (restaurant_id));
joinable!(auth_token -> user (user_id));
joinable!(meal_rating -> meal (meal_id));
joinable!(meal_rating -> user (user_id));
joinable!(favorite_meal -> meal (meal_id));
joinable!(favorite_meal -> user (user_id));

allow_tables_to_appear_in_same_query!(
    user,
    auth_token,
    restaurant,
    meal,
    meal_rating,
    favorite_meal,
);
