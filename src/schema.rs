// Database schema definitions
diesel::table! {
    user_account (user_id) {
        user_id -> Int4,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Varchar,
        is_active -> Bool,
        date_joined -> Timestamp,
        last_login -> Nullable<Timestamp>,
    }
}

diesel::table! {
    profile (user_id) {
        user_id -> Int4,
        role -> Varchar,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    user_session (session_id) {
        session_id -> Uuid,
        user_id -> Int4,
        ip_address -> Nullable<Varchar>,
        user_agent -> Nullable<Varchar>,
        expires_at -> Timestamp,
        created_at -> Timestamp,
        revoked_at -> Nullable<Timestamp>,
    }
}

diesel::table! {
    symptom_log (log_id) {
        log_id -> Int4,
        caregiver_id -> Int4,
        log_date -> Date,
        severity -> Int4,
        communication_rating -> Int4,
        social_interaction_rating -> Int4,
        repetitive_behavior_rating -> Int4,
        sensory_sensitivity_rating -> Int4,
        mood_rating -> Int4,
        description -> Text,
        notes -> Nullable<Text>,
        behaviors_checklist -> Jsonb,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(profile -> user_account (user_id));
diesel::joinable!(user_session -> user_account (user_id));
diesel::joinable!(symptom_log -> user_account (caregiver_id));

diesel::allow_tables_to_appear_in_same_query!(
    user_account, profile, user_session, symptom_log,
);
