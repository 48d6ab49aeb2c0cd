use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use coffeeshop_api::{config::AppConfig, db::create_pool};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    // Ensure migrations are applied.
    sqlx::migrate!("./migrations").run(&pool).await?;

    let admin_id = ensure_user(&pool, "admin@coffeeshop.dev", "admin", "admin123", "admin").await?;
    let user_id = ensure_user(&pool, "user@coffeeshop.dev", "customer", "user123", "user").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    username: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, username, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(username)
    .bind(password_hash)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    // If user already exists, fetch id
    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = [
        ("Coffee", "Freshly roasted coffee drinks"),
        ("Tea", "Loose-leaf and brewed teas"),
        ("Desserts", "Pastries and sweets"),
    ];

    for (name, desc) in categories {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .execute(pool)
        .await?;
    }

    // Prices in minor units.
    let products = [
        ("Espresso", "Double shot", 15000_i64, 100, "Coffee"),
        ("Cappuccino", "Espresso with steamed milk foam", 20000, 100, "Coffee"),
        ("Latte", "Espresso with steamed milk", 22000, 100, "Coffee"),
        ("Earl Grey", "Bergamot black tea", 12000, 80, "Tea"),
        ("Cheesecake", "Classic baked cheesecake", 30000, 25, "Desserts"),
    ];

    for (name, desc, price, stock, category) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, stock_quantity, category_id)
            SELECT $1, $2, $3, $4, $5, c.id FROM categories c WHERE c.name = $6
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(desc)
        .bind(price)
        .bind(stock)
        .bind(category)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
