use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        password_hash -> Text,
        ip_address -> Nullable<Text>,
        false_report_count -> Integer,
        is_flagged -> Bool,
        created_at -> Timestamptz,
        last_login -> Nullable<Timestamptz>,
    }
}

table! {
    admins (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        password_hash -> Text,
        full_name -> Text,
        role -> Text,
        created_at -> Timestamptz,
        last_login -> Nullable<Timestamptz>,
    }
}

table! {
    incident_reports (id) {
        id -> Integer,
        title -> Text,
        description -> Text,
        latitude -> Double,
        longitude -> Double,
        location_address -> Nullable<Text>,
        category -> Text,
        priority -> Text,
        status -> Text,
        user_id -> Nullable<Integer>,
        ip_address -> Nullable<Text>,
        admin_notes -> Nullable<Text>,
        reported_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
    }
}

table! {
    admin_actions (id) {
        id -> Integer,
        incident_id -> Integer,
        admin_id -> Integer,
        action_type -> Text,
        old_value -> Nullable<Text>,
        new_value -> Nullable<Text>,
        notes -> Nullable<Text>,
        action_timestamp -> Timestamptz,
    }
}

joinable!(incident_reports -> users (user_id));
joinable!(admin_actions -> incident_reports (incident_id));
joinable!(admin_actions -> admins (admin_id));

allow_tables_to_appear_in_same_query!(
    users,
    admins,
    incident_reports,
    admin_actions,
);
