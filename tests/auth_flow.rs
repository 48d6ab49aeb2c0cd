mod common;

use coffeeshop_api::{
    dto::auth::{LoginRequest, RegisterRequest},
    dto::users::UpdateUserRequest,
    error::AppError,
    middleware::auth::AuthUser,
    services::{auth_service, user_service},
};

use common::setup_state;

fn register_request(email: &str, username: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.into(),
        username: username.into(),
        password: "secret123".into(),
        full_name: Some("Test User".into()),
        phone: None,
        address: None,
    }
}

#[tokio::test]
async fn register_login_and_profile_flow() -> anyhow::Result<()> {
    let state = match setup_state().await? {
        Some(state) => state,
        None => return Ok(()),
    };

    if std::env::var("JWT_SECRET").is_err() {
        // SAFETY: set before any other thread in this test binary reads it.
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
    }

    let registered = auth_service::register_user(
        &state.pool,
        register_request("alice@example.com", "alice"),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(registered.role, "user");
    assert!(registered.is_active);

    // The password hash must never leave the server.
    let serialized = serde_json::to_value(&registered)?;
    assert!(serialized.get("password_hash").is_none());

    // Duplicate email and duplicate username are both rejected.
    let err = auth_service::register_user(
        &state.pool,
        register_request("alice@example.com", "alice2"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = auth_service::register_user(
        &state.pool,
        register_request("alice2@example.com", "alice"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Wrong password and unknown email both come back as Unauthorized.
    let err = auth_service::login_user(
        &state.pool,
        LoginRequest {
            email: "alice@example.com".into(),
            password: "wrong".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let err = auth_service::login_user(
        &state.pool,
        LoginRequest {
            email: "nobody@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let login = auth_service::login_user(
        &state.pool,
        LoginRequest {
            email: "alice@example.com".into(),
            password: "secret123".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert!(login.token.starts_with("Bearer "));
    assert_eq!(login.user.id, registered.id);

    // Profile self-service: partial update, password rotation.
    let auth_user = AuthUser {
        user_id: registered.id,
        role: "user".into(),
    };
    let me = user_service::get_me(&state.pool, &auth_user)
        .await?
        .data
        .unwrap();
    assert_eq!(me.email, "alice@example.com");

    let updated = user_service::update_me(
        &state.pool,
        &auth_user,
        UpdateUserRequest {
            email: None,
            username: None,
            full_name: Some("Alice Example".into()),
            phone: Some("+1000000".into()),
            address: None,
            password: Some("rotated456".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.full_name.as_deref(), Some("Alice Example"));
    assert_eq!(updated.email, "alice@example.com");

    let relogin = auth_service::login_user(
        &state.pool,
        LoginRequest {
            email: "alice@example.com".into(),
            password: "rotated456".into(),
        },
    )
    .await?;
    assert!(relogin.data.is_some());

    Ok(())
}
