diesel::table! {
    otp_codes (id) {
        id -> Uuid,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        otp_hash -> Varchar,
        expires_at -> Timestamptz,
        used -> Bool,
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

diesel::allow_tables_to_appear_in_same_query!(otp_codes, profiles);
