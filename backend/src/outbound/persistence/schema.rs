//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the database migrations exactly. They are used
//! by Diesel for compile-time query validation and type-safe SQL generation.
//!
//! # Maintenance
//!
//! When migrations change the schema, regenerate this file with
//! `diesel print-schema` against a migrated database.

diesel::table! {
    /// Registered accounts.
    users (id) {
        id -> Uuid,
        /// Unique login name (max 32 characters).
        username -> Varchar,
        /// Unique, lower-cased email address.
        email -> Varchar,
        /// Argon2id PHC string.
        password_hash -> Text,
        /// `user` or `admin`.
        role -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Uploaded VK communities and their validation status.
    groups (id) {
        id -> Uuid,
        vk_group_id -> Nullable<Int8>,
        screen_name -> Varchar,
        name -> Nullable<Text>,
        /// `pending`, `valid`, `invalid` or `duplicate`.
        status -> Varchar,
        status_reason -> Nullable<Text>,
        upload_task_id -> Nullable<Uuid>,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Wall posts seen while collecting comments.
    posts (id) {
        id -> Uuid,
        owner_id -> Int8,
        vk_post_id -> Int8,
        group_id -> Nullable<Uuid>,
        text -> Text,
        comments_count -> Int4,
        published_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Local and ingested comments.
    ///
    /// Exactly one of `author_id` (local) or `vk_author_id` (ingested) is
    /// expected; a check constraint requires at least one.
    comments (id) {
        id -> Uuid,
        text -> Text,
        author_id -> Nullable<Uuid>,
        vk_author_id -> Nullable<Int8>,
        post_id -> Nullable<Uuid>,
        owner_id -> Nullable<Int8>,
        vk_comment_id -> Nullable<Int8>,
        analyzed -> Bool,
        matched_keywords -> Array<Text>,
        published_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Monitored keywords, unique per `(word, category)`.
    keywords (id) {
        id -> Uuid,
        word -> Varchar,
        category -> Varchar,
        is_active -> Bool,
        case_sensitive -> Bool,
        whole_word -> Bool,
        match_count -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Asynchronous tasks; the source of truth for task state.
    tasks (id) {
        id -> Uuid,
        task_type -> Varchar,
        status -> Varchar,
        priority -> Int2,
        progress -> Int2,
        parameters -> Jsonb,
        result -> Nullable<Jsonb>,
        error -> Nullable<Text>,
        created_by -> Nullable<Uuid>,
        created_at -> Timestamptz,
        started_at -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(comments -> posts (post_id));
diesel::joinable!(posts -> groups (group_id));

diesel::allow_tables_to_appear_in_same_query!(comments, groups, keywords, posts, tasks, users);
