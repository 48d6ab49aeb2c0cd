#![allow(dead_code)]

use coffeeshop_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    entity::{
        categories::ActiveModel as CategoryActive, products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

/// Connects to the test database, applies migrations and empties every table.
/// Returns `None` (skip) when no database is configured in the environment.
pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration tests."
            );
            return Ok(None);
        }
    };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, products, categories, audit_logs, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(Some(AppState { pool, orm }))
}

pub async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        username: Set(email.split('@').next().unwrap_or(email).to_string()),
        password_hash: Set("dummy".into()),
        full_name: NotSet,
        phone: NotSet,
        address: NotSet,
        role: Set(role.into()),
        is_active: Set(true),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

pub async fn create_category(state: &AppState, name: &str) -> anyhow::Result<Uuid> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: NotSet,
        image_url: NotSet,
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(category.id)
}

pub async fn create_product(
    state: &AppState,
    category_id: Uuid,
    name: &str,
    price: i64,
    stock: i32,
    available: bool,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: NotSet,
        price: Set(price),
        image_url: NotSet,
        is_available: Set(available),
        stock_quantity: Set(stock),
        category_id: Set(category_id),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}

pub async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    use coffeeshop_api::entity::Products;
    use sea_orm::EntityTrait;

    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product not found"))?;
    Ok(product.stock_quantity)
}
