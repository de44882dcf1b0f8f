use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get},
    Router,
};
use configuration::{DatabaseSettings, Settings};
use database::{MySqlConnector, Supervisor};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

use crate::error::AppError;

/// The shared application state that all handlers can access.
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    /// The connection target, reported by the health endpoint.
    pub database: DatabaseSettings,
}

impl AppState {
    pub fn new(supervisor: Arc<Supervisor>, database: DatabaseSettings) -> Self {
        Self { supervisor, database }
    }

    /// Fails fast while the database is unavailable, before any query is attempted.
    pub fn ensure_ready(&self) -> Result<(), AppError> {
        if self.supervisor.is_ready() {
            Ok(())
        } else {
            Err(AppError::NotReady)
        }
    }

    pub fn database_status(&self) -> &'static str {
        if self.supervisor.is_ready() {
            "connected"
        } else {
            "disconnected"
        }
    }
}

/// Builds the application routes with their middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route(
            "/api/products",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route("/api/products/:id", delete(handlers::delete_product))
        .with_state(state)
        .layer(cors)
        // This middleware will automatically log information about every incoming request.
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}

/// The main function to configure and run the web server.
///
/// Tracing must already be initialised by the caller.
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let connector = Arc::new(MySqlConnector::new(&settings.database));
    let supervisor = Supervisor::new(connector, &settings.supervisor);
    let lifecycle = supervisor.spawn();

    let app_state = Arc::new(AppState::new(supervisor, settings.database));
    let app = router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server running on port {}", addr.port());
    tracing::info!("Health check: http://localhost:{}/api/health", addr.port());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    lifecycle.abort();
    served?;
    tracing::info!("Server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for the shutdown signal.");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use configuration::SupervisorSettings;
    use database::memory::MemoryStore;
    use database::ConnectionState;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn database_settings() -> DatabaseSettings {
        DatabaseSettings {
            host: "db.test".to_string(),
            port: 3306,
            user: "inventory".to_string(),
            password: "s3cret".to_string(),
            name: "inventory_db".to_string(),
        }
    }

    fn supervisor_settings() -> SupervisorSettings {
        SupervisorSettings {
            startup_delay: Duration::from_secs(3),
            retry_delay: Duration::from_secs(5),
            liveness_interval: Duration::from_secs(30),
        }
    }

    /// A router whose supervisor has not been started, so it never becomes ready.
    fn idle_app(store: &MemoryStore) -> Router {
        let supervisor = Supervisor::new(store.connector(), &supervisor_settings());
        router(Arc::new(AppState::new(supervisor, database_settings())))
    }

    /// A router backed by a connected supervisor.
    async fn connected_app(store: &MemoryStore) -> (Router, Arc<Supervisor>) {
        let supervisor = Supervisor::new(store.connector(), &supervisor_settings());
        supervisor.spawn();
        supervisor
            .subscribe()
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .unwrap();
        let app = router(Arc::new(AppState::new(supervisor.clone(), database_settings())));
        (app, supervisor)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
    }

    async fn send_form(app: &Router, uri: &str, body: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn data_endpoints_are_unavailable_until_connected() {
        let store = MemoryStore::new();
        let app = idle_app(&store);

        let list = send(&app, "GET", "/api/products", None).await;
        assert_eq!(list.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(list).await, json!({ "error": "Database not connected" }));

        let create = send(
            &app,
            "POST",
            "/api/products",
            Some(json!({ "name": "Dune", "price": 9.99, "quantity": 1 })),
        )
        .await;
        assert_eq!(create.status(), StatusCode::SERVICE_UNAVAILABLE);

        let remove = send(&app, "DELETE", "/api/products/1", None).await;
        assert_eq!(remove.status(), StatusCode::SERVICE_UNAVAILABLE);

        let invalid = send(&app, "DELETE", "/api/products/abc", None).await;
        assert_eq!(invalid.status(), StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn health_and_root_always_answer() {
        let store = MemoryStore::new();
        let app = idle_app(&store);

        let health = send(&app, "GET", "/api/health", None).await;
        assert_eq!(health.status(), StatusCode::OK);
        let body = json_body(health).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["database"], "disconnected");
        assert_eq!(
            body["environment"],
            json!({ "host": "db.test", "name": "inventory_db", "user": "inventory" })
        );
        assert!(!body.to_string().contains("s3cret"));
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));

        let root = send(&app, "GET", "/", None).await;
        assert_eq!(root.status(), StatusCode::OK);
        assert_eq!(json_body(root).await["database"], "disconnected");
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_incomplete_products_without_touching_storage() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        for body in [
            json!({ "price": 9.99, "quantity": 1 }),
            json!({ "name": "Dune", "quantity": 1 }),
            json!({ "name": "Dune", "price": 9.99 }),
            json!({ "name": "", "price": 9.99, "quantity": 1 }),
        ] {
            let response = send(&app, "POST", "/api/products", Some(body)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                json_body(response).await,
                json!({ "error": "Name, price, and quantity are required" })
            );
        }

        let malformed = send(
            &app,
            "POST",
            "/api/products",
            Some(json!({ "name": "Dune", "price": 9.99, "quantity": "lots" })),
        )
        .await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_non_numeric_ids_without_touching_storage() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        let response = send(&app, "DELETE", "/api/products/abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({ "error": "Valid product ID is required" }));
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn numeric_ids_no_row_can_carry_are_not_found() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        for id in ["1.5", "99999999999999999999"] {
            let response = send(&app, "DELETE", &format!("/api/products/{id}"), None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{id}");
            assert_eq!(json_body(response).await, json!({ "error": "Product not found" }));
        }
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exponent_ids_resolve_to_integers() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        let created = send(
            &app,
            "POST",
            "/api/products",
            Some(json!({ "name": "Dune", "price": 9.99, "quantity": 1 })),
        )
        .await;
        assert_eq!(json_body(created).await["id"], 1);

        let response = send(&app, "DELETE", "/api/products/1e0", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.products().is_empty());

        let response = send(&app, "DELETE", "/api/products/1e2", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn accepts_urlencoded_products() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        let body = "name=Dune&price=9.99&quantity=0&category=Sci-Fi";
        let response = send_form(&app, "/api/products", body).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            json_body(response).await,
            json!({ "message": "Product added successfully", "id": 1 })
        );

        let stored = store.products();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].quantity, 0);
        assert_eq!(stored[0].price.to_string(), "9.99");
        assert_eq!(stored[0].category.as_deref(), Some("Sci-Fi"));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_incomplete_forms_without_touching_storage() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        let response = send_form(&app, "/api/products", "name=Dune&price=9.99").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "Name, price, and quantity are required" })
        );

        let response =
            send_form(&app, "/api/products", "name=Dune&price=9.99&quantity=lots").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lists_newest_first_regardless_of_insertion_order() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        for name in ["Neuromancer", "Dune", "Hyperion"] {
            let response = send(
                &app,
                "POST",
                "/api/products",
                Some(json!({ "name": name, "price": "12.50", "quantity": 3, "category": "sci-fi" })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = send(&app, "GET", "/api/products", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|product| product["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Hyperion", "Dune", "Neuromancer"]);
        assert_eq!(body[0]["category"], "sci-fi");
        assert_eq!(body[0]["description"], Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_table_lists_as_empty_array() {
        let store = MemoryStore::new();
        let (app, _supervisor) = connected_app(&store).await;

        let response = send(&app, "GET", "/api/products", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failures_pass_the_message_through() {
        let store = MemoryStore::new();
        let (app, supervisor) = connected_app(&store).await;
        store.fail_queries(Some("Table 'inventory_db.products' doesn't exist"));

        let response = send(&app, "GET", "/api/products", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = json_body(response).await["error"].as_str().unwrap().to_string();
        assert!(message.starts_with("Failed to fetch products: "));
        assert!(message.contains("doesn't exist"));

        let response = send(&app, "DELETE", "/api/products/7", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(supervisor.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_query_on_a_lost_connection_fails_then_service_recovers() {
        let store = MemoryStore::new();
        let (app, supervisor) = connected_app(&store).await;
        store.drop_connections();

        let response = send(&app, "GET", "/api/products", None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!supervisor.is_ready());

        supervisor
            .subscribe()
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .unwrap();
        let response = send(&app, "GET", "/api/products", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn dune_round_trip() {
        let store = MemoryStore::new();
        let supervisor = Supervisor::new(store.connector(), &supervisor_settings());
        let app = router(Arc::new(AppState::new(supervisor.clone(), database_settings())));
        supervisor.spawn();

        let health = json_body(send(&app, "GET", "/api/health", None).await).await;
        assert_eq!(health["database"], "disconnected");

        tokio::time::sleep(Duration::from_secs(4)).await;
        let health = json_body(send(&app, "GET", "/api/health", None).await).await;
        assert_eq!(health["database"], "connected");

        let created = send(
            &app,
            "POST",
            "/api/products",
            Some(json!({ "name": "Dune", "price": 9.99, "quantity": 0 })),
        )
        .await;
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = json_body(created).await;
        assert_eq!(created["message"], "Product added successfully");
        let id = created["id"].as_u64().unwrap();

        let listed = json_body(send(&app, "GET", "/api/products", None).await).await;
        assert_eq!(listed[0]["id"].as_u64(), Some(id));
        assert_eq!(listed[0]["name"], "Dune");
        assert_eq!(listed[0]["quantity"], 0);
        assert_eq!(listed[0]["price"], "9.99");

        let uri = format!("/api/products/{}", id);
        let deleted = send(&app, "DELETE", &uri, None).await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(json_body(deleted).await, json!({ "message": "Product deleted successfully" }));

        let again = send(&app, "DELETE", &uri, None).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(again).await, json!({ "error": "Product not found" }));

        let listed = json_body(send(&app, "GET", "/api/products", None).await).await;
        assert_eq!(listed, json!([]));
    }
}
