mod common;

use coffeeshop_api::{
    dto::orders::{CreateOrderRequest, OrderItemRequest, UpdateOrderRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::OrderStatus,
    routes::params::{OrderListQuery, Pagination},
    services::order_service,
};

use common::{create_category, create_product, create_user, product_stock, setup_state};

// Full order lifecycle: create with two products, cancel, observe stock
// conservation and terminal-state blocking; then admin status updates,
// permission checks and concurrent exhaustion of the last unit.
#[tokio::test]
async fn order_lifecycle_flow() -> anyhow::Result<()> {
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };
    let auth_admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    let category_id = create_category(&state, "Coffee").await?;
    let product_a = create_product(&state, category_id, "Espresso", 15000, 100, true).await?;
    let product_b = create_product(&state, category_id, "Cheesecake", 20000, 100, true).await?;

    // Create: [(A, 2), (B, 1)] -> total 50000, stock 98/99, pending.
    let resp = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            delivery_address: "1 Main St".into(),
            phone: "+1000000".into(),
            notes: Some("no sugar".into()),
            items: vec![
                OrderItemRequest {
                    product_id: product_a,
                    quantity: 2,
                },
                OrderItemRequest {
                    product_id: product_b,
                    quantity: 1,
                },
            ],
        },
    )
    .await?;
    let created = resp.data.unwrap();
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.order.total_amount, 50000);
    assert_eq!(created.items.len(), 2);
    assert_eq!(
        created.order.total_amount,
        created
            .items
            .iter()
            .map(|i| i.price * i.quantity as i64)
            .sum::<i64>()
    );
    assert_eq!(product_stock(&state, product_a).await?, 98);
    assert_eq!(product_stock(&state, product_b).await?, 99);

    // Price snapshot: bumping the catalog price does not touch the order.
    {
        use coffeeshop_api::entity::products::{ActiveModel, Entity as Products};
        use sea_orm::{ActiveModelTrait, EntityTrait, Set};

        let product = Products::find_by_id(product_a)
            .one(&state.orm)
            .await?
            .unwrap();
        let mut active: ActiveModel = product.into();
        active.price = Set(99999);
        active.update(&state.orm).await?;
    }
    let fetched = order_service::get_order(&state, &auth_user, created.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.order.total_amount, 50000);
    assert_eq!(
        fetched
            .items
            .iter()
            .find(|i| i.product_id == product_a)
            .unwrap()
            .price,
        15000
    );

    // Owner may not set the status.
    let err = order_service::update_order(
        &state,
        &auth_user,
        created.order.id,
        UpdateOrderRequest {
            status: Some(OrderStatus::Confirmed),
            delivery_address: None,
            phone: None,
            notes: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Owner may change shipping fields; untouched fields survive.
    let updated = order_service::update_order(
        &state,
        &auth_user,
        created.order.id,
        UpdateOrderRequest {
            status: None,
            delivery_address: Some("2 Side St".into()),
            phone: None,
            notes: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.delivery_address, "2 Side St");
    assert_eq!(updated.phone, "+1000000");

    // Admin sets the status.
    let confirmed = order_service::update_order(
        &state,
        &auth_admin,
        created.order.id,
        UpdateOrderRequest {
            status: Some(OrderStatus::Confirmed),
            delivery_address: None,
            phone: None,
            notes: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    // Cancel restores both stocks and the second attempt is rejected.
    let cancelled = order_service::cancel_order(&state, &auth_user, created.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(product_stock(&state, product_a).await?, 100);
    assert_eq!(product_stock(&state, product_b).await?, 100);

    let err = order_service::cancel_order(&state, &auth_user, created.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrderNotCancellable));
    assert_eq!(product_stock(&state, product_a).await?, 100);
    assert_eq!(product_stock(&state, product_b).await?, 100);

    // Delivered orders cannot be cancelled either.
    let delivered_order = order_service::create_order(
        &state,
        &auth_user,
        CreateOrderRequest {
            delivery_address: "1 Main St".into(),
            phone: "+1000000".into(),
            notes: None,
            items: vec![OrderItemRequest {
                product_id: product_b,
                quantity: 1,
            }],
        },
    )
    .await?
    .data
    .unwrap();
    order_service::update_order(
        &state,
        &auth_admin,
        delivered_order.order.id,
        UpdateOrderRequest {
            status: Some(OrderStatus::Delivered),
            delivery_address: None,
            phone: None,
            notes: None,
        },
    )
    .await?;
    let err = order_service::cancel_order(&state, &auth_admin, delivered_order.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrderNotCancellable));
    assert_eq!(product_stock(&state, product_b).await?, 99);

    // Users see their own orders, admins everything.
    let own = order_service::list_orders(
        &state,
        &auth_user,
        OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            status: None,
            sort_order: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(own.items.len(), 2);

    let cancelled_only = order_service::list_orders(
        &state,
        &auth_admin,
        OrderListQuery {
            pagination: Pagination {
                page: Some(1),
                per_page: Some(20),
            },
            status: Some("cancelled".into()),
            sort_order: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled_only.items.len(), 1);

    // Another user cannot read someone else's order.
    let other_id = create_user(&state, "user", "other@example.com").await?;
    let auth_other = AuthUser {
        user_id: other_id,
        role: "user".into(),
    };
    let err = order_service::get_order(&state, &auth_other, created.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Deletion is admin-only.
    let err = order_service::delete_order(&state, &auth_user, created.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    order_service::delete_order(&state, &auth_admin, created.order.id).await?;
    let err = order_service::get_order(&state, &auth_admin, created.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Concurrent exhaustion: stock 1, two buyers, exactly one success.
    let last_unit = create_product(&state, category_id, "Last Croissant", 5000, 1, true).await?;
    let order_req = |addr: &str| CreateOrderRequest {
        delivery_address: addr.into(),
        phone: "+1000000".into(),
        notes: None,
        items: vec![OrderItemRequest {
            product_id: last_unit,
            quantity: 1,
        }],
    };
    let (first, second) = tokio::join!(
        order_service::create_order(&state, &auth_user, order_req("3 Oak St")),
        order_service::create_order(&state, &auth_other, order_req("4 Elm St")),
    );
    assert!(
        first.is_ok() != second.is_ok(),
        "exactly one of two concurrent orders for the last unit must succeed"
    );
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser.unwrap_err(), AppError::InsufficientStock));
    assert_eq!(product_stock(&state, last_unit).await?, 0);

    Ok(())
}
