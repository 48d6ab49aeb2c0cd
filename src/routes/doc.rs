use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{CreateOrderRequest, OrderItemRequest, OrderList, OrderWithItems, UpdateOrderRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
        users::{UpdateUserRequest, UserList},
    },
    models::{Category, Order, OrderItem, OrderStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::{auth, categories, health, orders, params, products, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        users::me,
        users::update_me,
        users::list_users,
        users::get_user,
        users::delete_user,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::update_order,
        orders::cancel_order,
        orders::delete_order,
    ),
    components(
        schemas(
            User,
            Category,
            Product,
            Order,
            OrderItem,
            OrderStatus,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UpdateUserRequest,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CreateProductRequest,
            UpdateProductRequest,
            CreateOrderRequest,
            OrderItemRequest,
            UpdateOrderRequest,
            UserList,
            CategoryList,
            ProductList,
            OrderList,
            OrderWithItems,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<Category>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User management endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product endpoints"),
        (name = "Orders", description = "Order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
