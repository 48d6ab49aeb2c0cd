use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderRequest},
    entity::{
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders,
            Model as OrderModel,
        },
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

/// Creates an order from a list of requested items.
///
/// Runs as one transaction: every product row is locked before its stock is
/// checked, the price is captured at that moment, and the stock decrement is
/// applied immediately so a later line for the same product sees the reduced
/// quantity. Any failing line aborts the whole order.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if payload.delivery_address.trim().is_empty() {
        return Err(AppError::BadRequest("delivery_address is required".into()));
    }
    if payload.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone is required".into()));
    }
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("order must contain at least one item".into()));
    }
    for item in &payload.items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be greater than 0".into()));
        }
    }

    let txn = state.orm.begin().await?;

    let mut total_amount: i64 = 0;
    let mut reserved: Vec<(Uuid, i32, i64)> = Vec::with_capacity(payload.items.len());

    for item in &payload.items {
        let product = Products::find_by_id(item.product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or(AppError::ProductNotFound)?;

        if !product.is_available {
            return Err(AppError::ProductUnavailable);
        }
        if product.stock_quantity < item.quantity {
            return Err(AppError::InsufficientStock);
        }

        total_amount += product.price * (item.quantity as i64);
        reserved.push((product.id, item.quantity, product.price));

        // Reserve immediately; a duplicate of this product later in the list
        // must see the reduced stock.
        Products::update_many()
            .col_expr(
                ProdCol::StockQuantity,
                Expr::col(ProdCol::StockQuantity).sub(item.quantity),
            )
            .filter(ProdCol::Id.eq(product.id))
            .exec(&txn)
            .await?;
    }

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending.as_str().into()),
        total_amount: Set(total_amount),
        delivery_address: Set(payload.delivery_address),
        phone: Set(payload.phone),
        notes: Set(payload.notes),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(reserved.len());
    for (product_id, quantity, price) in reserved {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            price: Set(price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total_amount": total_amount })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let order = order_from_entity(order)?;
    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Cancels an order and restores the stock its items reserved.
///
/// A product deleted since the order was placed is skipped: the restore is
/// best-effort and the cancellation still goes through.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if user.role != "admin" && order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let status = parse_status(&order.status)?;
    if status.is_terminal() {
        return Err(AppError::OrderNotCancellable);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;

    for item in &items {
        Products::update_many()
            .col_expr(
                ProdCol::StockQuantity,
                Expr::col(ProdCol::StockQuantity).add(item.quantity),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(&txn)
            .await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let items = items.into_iter().map(order_item_from_entity).collect();
    let order = order_from_entity(order)?;
    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Applies a partial update. Only admins may change the status; no transition
/// graph is enforced beyond the terminal-state rule in [`cancel_order`].
pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if user.role != "admin" && order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    if payload.status.is_some() {
        ensure_admin(user)?;
    }

    let mut active: OrderActive = order.into();
    if let Some(status) = payload.status {
        active.status = Set(status.as_str().into());
    }
    if let Some(delivery_address) = payload.delivery_address {
        if delivery_address.trim().is_empty() {
            return Err(AppError::BadRequest("delivery_address is required".into()));
        }
        active.delivery_address = Set(delivery_address);
    }
    if let Some(phone) = payload.phone {
        if phone.trim().is_empty() {
            return Err(AppError::BadRequest("phone is required".into()));
        }
        active.phone = Set(phone);
    }
    if let Some(notes) = payload.notes {
        active.notes = Set(Some(notes));
    }
    active.updated_at = Set(Utc::now().into());

    let order = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_update",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "status": order.status })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order updated",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if user.role != "admin" {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status = parse_status(status)
            .map_err(|_| AppError::BadRequest("Invalid order status".into()))?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<AppResult<Vec<_>>>()?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if user.role != "admin" && order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let order = order_from_entity(order)?;
    Ok(ApiResponse::success(
        "OK",
        OrderWithItems { order, items },
        Some(Meta::empty()),
    ))
}

/// Deletes an order and its items. Admin only; stock is not restored.
pub async fn delete_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<()> {
    ensure_admin(user)?;
    let result = Orders::delete_by_id(id).exec(&state.orm).await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_delete",
        Some("orders"),
        Some(serde_json::json!({ "order_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(())
}

fn parse_status(status: &str) -> AppResult<OrderStatus> {
    OrderStatus::parse(status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("invalid order status: {status}")))
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        status: parse_status(&model.status)?,
        total_amount: model.total_amount,
        delivery_address: model.delivery_address,
        phone: model.phone,
        notes: model.notes,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
