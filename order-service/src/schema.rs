diesel::table! {
    restaurants (id) {
        id -> Int4,
        user_id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    branches (id) {
        id -> Int4,
        restaurant_id -> Int4,
        address -> Varchar,
        city -> Varchar,
        avg_waiting_time -> Int4,
        active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    menus (id) {
        id -> Int4,
        branch_id -> Int4,
        name -> Varchar,
        active -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    menu_items (id) {
        id -> Int4,
        menu_id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        price -> Numeric,
        available -> Bool,
    }
}

diesel::table! {
    orders (id) {
        id -> Int4,
        public_id -> Uuid,
        customer_id -> Int4,
        branch_id -> Int4,
        delivery_address -> Varchar,
        status -> Varchar,
        total -> Numeric,
        payment_method -> Varchar,
        paid -> Bool,
        created_at -> Timestamptz,
        estimated_ready_at -> Timestamptz,
        accepted_at -> Nullable<Timestamptz>,
        prepared_at -> Nullable<Timestamptz>,
        sent_at -> Nullable<Timestamptz>,
        delivered_at -> Nullable<Timestamptz>,
        paid_at -> Nullable<Timestamptz>,
        cancelled_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    order_items (id) {
        id -> Int4,
        order_id -> Int4,
        menu_item_id -> Int4,
        quantity -> Int4,
        unit_price -> Numeric,
    }
}

diesel::table! {
    idempotency_keys (key) {
        key -> Varchar,
        request_hash -> Nullable<Varchar>,
        order_id -> Int4,
        response -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(branches -> restaurants (restaurant_id));
diesel::joinable!(menus -> branches (branch_id));
diesel::joinable!(menu_items -> menus (menu_id));
diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(idempotency_keys -> orders (order_id));

diesel::allow_tables_to_appear_in_same_query!(
    restaurants,
    branches,
    menus,
    menu_items,
    orders,
    order_items,
    idempotency_keys,
);
