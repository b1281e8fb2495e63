diesel::table! {
    payment_transactions (id) {
        id -> Uuid,
        user_id -> Uuid,
        payment_config_id -> Nullable<Uuid>,
        related_entity_type -> Nullable<Varchar>,
        related_entity_id -> Nullable<Uuid>,
        amount -> Numeric,
        currency -> Varchar,
        payment_status -> Varchar,
        razorpay_order_id -> Nullable<Varchar>,
        razorpay_payment_id -> Nullable<Varchar>,
        razorpay_signature -> Nullable<Varchar>,
        payment_method -> Nullable<Varchar>,
        failure_reason -> Nullable<Text>,
        metadata -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    payment_tokens (id) {
        id -> Uuid,
        token_hash -> Varchar,
        user_id -> Uuid,
        transaction_id -> Nullable<Uuid>,
        payment_config_id -> Nullable<Uuid>,
        amount -> Numeric,
        currency -> Varchar,
        expires_at -> Timestamptz,
        used -> Bool,
        used_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (id) {
        id -> Uuid,
        full_name -> Nullable<Varchar>,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        registration_payment_status -> Nullable<Varchar>,
        registration_payment_transaction_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    event_registrations (id) {
        id -> Uuid,
        payment_status -> Nullable<Varchar>,
        payment_transaction_id -> Nullable<Uuid>,
        registration_confirmed -> Bool,
    }
}

diesel::table! {
    donations (id) {
        id -> Uuid,
        payment_status -> Nullable<Varchar>,
        payment_transaction_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(payment_tokens -> payment_transactions (transaction_id));

diesel::allow_tables_to_appear_in_same_query!(
    payment_transactions,
    payment_tokens,
    profiles,
    event_registrations,
    donations,
    outbox_events,
);
