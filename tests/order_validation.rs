mod common;

use coffeeshop_api::{
    dto::orders::{CreateOrderRequest, OrderItemRequest},
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::{OrderListQuery, Pagination},
    services::order_service,
};
use uuid::Uuid;

use common::{create_category, create_product, create_user, product_stock, setup_state};

fn request(items: Vec<OrderItemRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        delivery_address: "1 Main St".into(),
        phone: "+1000000".into(),
        notes: None,
        items,
    }
}

// Any invalid line aborts the whole order: no order row, no items, no stock
// change, whichever position the bad line is in.
#[tokio::test]
async fn create_order_is_atomic_across_items() -> anyhow::Result<()> {
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    let user_id = create_user(&state, "user", "user@example.com").await?;
    let auth_user = AuthUser {
        user_id,
        role: "user".into(),
    };

    let category_id = create_category(&state, "Coffee").await?;
    let in_stock = create_product(&state, category_id, "Espresso", 15000, 5, true).await?;
    let unavailable = create_product(&state, category_id, "Seasonal", 18000, 5, false).await?;
    let scarce = create_product(&state, category_id, "Cheesecake", 30000, 1, true).await?;

    // Unknown product id.
    let err = order_service::create_order(
        &state,
        &auth_user,
        request(vec![
            OrderItemRequest {
                product_id: in_stock,
                quantity: 2,
            },
            OrderItemRequest {
                product_id: Uuid::new_v4(),
                quantity: 1,
            },
        ]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProductNotFound));
    assert_eq!(product_stock(&state, in_stock).await?, 5);

    // Product marked unavailable.
    let err = order_service::create_order(
        &state,
        &auth_user,
        request(vec![
            OrderItemRequest {
                product_id: in_stock,
                quantity: 2,
            },
            OrderItemRequest {
                product_id: unavailable,
                quantity: 1,
            },
        ]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::ProductUnavailable));
    assert_eq!(product_stock(&state, in_stock).await?, 5);

    // Not enough stock.
    let err = order_service::create_order(
        &state,
        &auth_user,
        request(vec![
            OrderItemRequest {
                product_id: in_stock,
                quantity: 2,
            },
            OrderItemRequest {
                product_id: scarce,
                quantity: 2,
            },
        ]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock));
    assert_eq!(product_stock(&state, in_stock).await?, 5);
    assert_eq!(product_stock(&state, scarce).await?, 1);

    // The same product twice in one request sees the reduced stock: 5 in
    // stock, 3 + 3 requested, so the second line fails even though each line
    // alone would fit.
    let err = order_service::create_order(
        &state,
        &auth_user,
        request(vec![
            OrderItemRequest {
                product_id: in_stock,
                quantity: 3,
            },
            OrderItemRequest {
                product_id: in_stock,
                quantity: 3,
            },
        ]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock));
    assert_eq!(product_stock(&state, in_stock).await?, 5);

    // A duplicate that fits goes through, with the decrements applied twice.
    let order = order_service::create_order(
        &state,
        &auth_user,
        request(vec![
            OrderItemRequest {
                product_id: in_stock,
                quantity: 2,
            },
            OrderItemRequest {
                product_id: in_stock,
                quantity: 2,
            },
        ]),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(order.order.total_amount, 4 * 15000);
    assert_eq!(product_stock(&state, in_stock).await?, 1);

    // Request-shape validation.
    let err = order_service::create_order(&state, &auth_user, request(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = order_service::create_order(
        &state,
        &auth_user,
        request(vec![OrderItemRequest {
            product_id: in_stock,
            quantity: 0,
        }]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let mut empty_address = request(vec![OrderItemRequest {
        product_id: in_stock,
        quantity: 1,
    }]);
    empty_address.delivery_address = "  ".into();
    let err = order_service::create_order(&state, &auth_user, empty_address)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Exactly one order was persisted by all of the above.
    let orders = order_service::list_orders(
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
    assert_eq!(orders.items.len(), 1);

    Ok(())
}
