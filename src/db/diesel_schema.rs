//! Diesel table definitions for engagement storage
//!
//! SQLite stores timestamps as TEXT (ISO 8601) and booleans as INTEGER.

diesel::table! {
    interaction_records (id) {
        id -> Text,
        identity_key -> Text,
        content_kind -> Text,
        content_id -> Text,
        kind -> Text,
        created_at -> Text,
        duration_ms -> Nullable<BigInt>,
        progress_pct -> Nullable<Integer>,
        is_complete -> Integer,
        first_viewed_at -> Nullable<Text>,
        last_viewed_at -> Nullable<Text>,
    }
}

diesel::table! {
    counter_aggregates (content_kind, content_id) {
        content_kind -> Text,
        content_id -> Text,
        like_count -> BigInt,
        bookmark_count -> BigInt,
        view_count -> BigInt,
        comment_count -> BigInt,
        share_count -> BigInt,
        updated_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(interaction_records, counter_aggregates);
