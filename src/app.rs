use std::{any::Any, net::SocketAddr};

use axum::{
    http::{Method, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{auth, cars, config::AppConfig, error::ApiError, rentals, state::AppState};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(auth::router(&state))
        .merge(cars::router(&state))
        .merge(rentals::router(&state))
        .fallback(not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "BCR API is up and running!",
    }))
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound {
        method: method.to_string(),
        url: uri.to_string(),
    }
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".into());
    ApiError::Internal(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::tests::tamper, config::AdminSeed};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn app_with_admin() -> (Router, String) {
        let state = AppState::fake();
        state
            .seed_admin(&AdminSeed {
                name: "Root".into(),
                email: "admin@bcr.io".into(),
                password: "admin-pass".into(),
            })
            .await
            .unwrap();
        let app = build_app(state);
        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "admin@bcr.io", "password": "admin-pass" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = body["accessToken"].as_str().unwrap().to_string();
        (app, token)
    }

    async fn register(app: &Router, name: &str, email: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({ "name": name, "email": email, "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["accessToken"].as_str().unwrap().to_string()
    }

    async fn create_mazda(app: &Router, admin: &str) -> String {
        let (status, car) = send(
            app,
            Method::POST,
            "/v1/cars",
            Some(admin),
            Some(json!({
                "name": "Mazda RX4",
                "price": "300000",
                "size": "Small",
                "image": "mazda-rx4.jpg",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{car}");
        assert_eq!(car["isCurrentlyRented"], false);
        car["id"].as_str().unwrap().to_string()
    }

    fn rfc3339(t: OffsetDateTime) -> String {
        t.format(&Rfc3339).unwrap()
    }

    #[tokio::test]
    async fn root_reports_status() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, Method::GET, "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "OK", "message": "BCR API is up and running!" }));
    }

    #[tokio::test]
    async fn unknown_route_is_not_found_error() {
        let app = build_app(AppState::fake());
        let (status, body) = send(&app, Method::GET, "/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["name"], "NotFoundError");
        assert_eq!(body["error"]["details"]["method"], "GET");
        assert_eq!(body["error"]["details"]["url"], "/nowhere");
    }

    #[tokio::test]
    async fn register_login_whoami() {
        let app = build_app(AppState::fake());
        register(&app, "Ali", "ali@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "ali@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let token = body["accessToken"].as_str().unwrap();
        assert!(!token.is_empty());

        let (status, me) = send(&app, Method::GET, "/v1/auth/whoami", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["name"], "Ali");
        assert_eq!(me["email"], "ali@x.com");
        assert_eq!(me["role"]["name"], "CUSTOMER");
        assert!(me.get("password_hash").is_none());
        assert!(me.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn auth_errors_use_the_envelope() {
        let app = build_app(AppState::fake());
        register(&app, "Ali", "ali@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/auth/register",
            None,
            Some(json!({ "name": "Ali", "email": "ALI@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "EmailAlreadyTakenError");

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "ghost@x.com", "password": "secret123" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["name"], "EmailNotRegisteredError");
        assert_eq!(body["error"]["details"]["email"], "ghost@x.com");

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "ali@x.com", "password": "pass1238" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["name"], "WrongPasswordError");

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/auth/login",
            None,
            Some(json!({ "email": "ali@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "ValidationError");
    }

    #[tokio::test]
    async fn whoami_rejects_missing_and_tampered_tokens() {
        let app = build_app(AppState::fake());
        let token = register(&app, "Ali", "ali@x.com").await;

        let (status, body) = send(&app, Method::GET, "/v1/auth/whoami", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["name"], "InvalidTokenError");

        let (status, body) =
            send(&app, Method::GET, "/v1/auth/whoami", Some(&tamper(&token)), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["name"], "InvalidTokenError");
    }

    #[tokio::test]
    async fn customers_cannot_manage_cars() {
        let app = build_app(AppState::fake());
        let token = register(&app, "Ali", "ali@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/cars",
            Some(&token),
            Some(json!({ "name": "Mazda RX4", "price": 1, "size": "Small" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["name"], "InsufficientAccessError");
        assert_eq!(body["error"]["details"]["role"], "CUSTOMER");
    }

    #[tokio::test]
    async fn double_booking_is_rejected() {
        let (app, admin) = app_with_admin().await;
        let car_id = create_mazda(&app, &admin).await;
        let customer = register(&app, "Ali", "ali@x.com").await;

        let now = OffsetDateTime::now_utc();
        let (status, rental) = send(
            &app,
            Method::POST,
            &format!("/v1/cars/{car_id}/rent"),
            Some(&customer),
            Some(json!({ "rentStartedAt": rfc3339(now), "rentEndedAt": null })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{rental}");
        assert_eq!(rental["carId"], car_id.as_str());
        assert!(rental["rentEndedAt"].is_string());

        let (_, car) = send(&app, Method::GET, &format!("/v1/cars/{car_id}"), None, None).await;
        assert_eq!(car["isCurrentlyRented"], true);

        let other = register(&app, "Budi", "budi@x.com").await;
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/v1/cars/{car_id}/rent"),
            Some(&other),
            Some(json!({ "rentStartedAt": rfc3339(now + Duration::hours(2)) })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "CarAlreadyRentedError");
        assert_eq!(body["error"]["details"]["car"]["name"], "Mazda RX4");

        // the day after the first booking ends is still free
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/v1/cars/{car_id}/rent"),
            Some(&other),
            Some(json!({ "rentStartedAt": rfc3339(now + Duration::days(1)) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn admins_cannot_rent() {
        let (app, admin) = app_with_admin().await;
        let car_id = create_mazda(&app, &admin).await;
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/v1/cars/{car_id}/rent"),
            Some(&admin),
            Some(json!({ "rentStartedAt": rfc3339(OffsetDateTime::now_utc()) })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["details"]["role"], "ADMIN");
    }

    #[tokio::test]
    async fn renting_unknown_car_is_not_found() {
        let app = build_app(AppState::fake());
        let customer = register(&app, "Ali", "ali@x.com").await;
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/v1/cars/{}/rent", uuid::Uuid::new_v4()),
            Some(&customer),
            Some(json!({ "rentStartedAt": rfc3339(OffsetDateTime::now_utc()) })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["name"], "NotFoundError");
    }

    #[tokio::test]
    async fn rental_at_end_of_calendar_is_unprocessable() {
        let (app, admin) = app_with_admin().await;
        let car_id = create_mazda(&app, &admin).await;
        let customer = register(&app, "Ali", "ali@x.com").await;
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/v1/cars/{car_id}/rent"),
            Some(&customer),
            Some(json!({ "rentStartedAt": "9999-12-31T12:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "ValidationError");
    }

    #[tokio::test]
    async fn huge_page_number_returns_an_empty_page() {
        let (app, admin) = app_with_admin().await;
        create_mazda(&app, &admin).await;
        let (status, body) =
            send(&app, Method::GET, "/v1/cars?page=9223372036854775807", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cars"], json!([]));
        assert_eq!(body["meta"]["pagination"]["count"], 1);
    }

    #[tokio::test]
    async fn car_crud_lifecycle() {
        let (app, admin) = app_with_admin().await;
        let car_id = create_mazda(&app, &admin).await;

        let (status, car) = send(
            &app,
            Method::PUT,
            &format!("/v1/cars/{car_id}"),
            Some(&admin),
            Some(json!({ "name": "Mazda RX4 Wag", "price": 350000, "size": "Medium" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(car["name"], "Mazda RX4 Wag");
        assert_eq!(car["price"], 350000);

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/v1/cars/{}", uuid::Uuid::new_v4()),
            Some(&admin),
            Some(json!({ "name": "Ghost", "price": 1, "size": "Small" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]["name"].is_string());
        assert!(body["error"]["message"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1/cars",
            Some(&admin),
            Some(json!({ "name": "", "price": 1, "size": "Small" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "ValidationError");

        let (status, body) =
            send(&app, Method::DELETE, &format!("/v1/cars/{car_id}"), Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);

        let (status, body) = send(&app, Method::GET, &format!("/v1/cars/{car_id}"), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["name"], "NotFoundError");
    }

    #[tokio::test]
    async fn list_cars_paginates_and_filters() {
        let (app, admin) = app_with_admin().await;
        for _ in 0..3 {
            create_mazda(&app, &admin).await;
        }
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1/cars",
            Some(&admin),
            Some(json!({ "name": "Ford Transit", "price": 900000, "size": "Large" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::GET, "/v1/cars?page=2&pageSize=3", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cars"].as_array().unwrap().len(), 1);
        assert_eq!(
            body["meta"]["pagination"],
            json!({ "page": 2, "pageCount": 2, "pageSize": 3, "count": 4 })
        );

        let (_, body) = send(&app, Method::GET, "/v1/cars?size=Large", None, None).await;
        assert_eq!(body["meta"]["pagination"]["count"], 1);
        assert_eq!(body["cars"][0]["name"], "Ford Transit");

        let (status, body) = send(&app, Method::GET, "/v1/cars?page=abc", None, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["name"], "ValidationError");
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let app = Router::new()
            .route("/boom", get(|| async {
                #[allow(unreachable_code)]
                let out: () = panic!("boom");
                out
            }))
            .layer(CatchPanicLayer::custom(handle_panic));
        let (status, body) = send(&app, Method::GET, "/boom", None, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["name"], "InternalServerError");
        assert!(body["error"]["details"].is_null());
    }
}
