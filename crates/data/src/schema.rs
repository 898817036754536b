// @generated: hand-written to match migrations/ — no diesel print-schema step runs in this workspace.

diesel::table! {
    api_keys (key) {
        key -> Text,
        label -> Nullable<Text>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    whatsapp_sessions (id) {
        id -> Int8,
        api_key -> Text,
        display_name -> Nullable<Text>,
        status -> Text,
        creds -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    whatsapp_credentials (id) {
        id -> Int8,
        session_id -> Int8,
        key_type -> Text,
        key_id -> Text,
        value -> Jsonb,
    }
}

diesel::table! {
    whatsapp_session_locks (api_key) {
        api_key -> Text,
        owner_id -> Text,
        acquired_at -> Timestamptz,
    }
}

diesel::joinable!(whatsapp_sessions -> api_keys (api_key));
diesel::joinable!(whatsapp_session_locks -> api_keys (api_key));

diesel::allow_tables_to_appear_in_same_query!(api_keys, whatsapp_sessions, whatsapp_credentials, whatsapp_session_locks,);
