use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, error, info, warn};

use cookbuddy_core::models::{
    Comment, NewPost, Post, PostDetail, PostSort, Recipe, RecipeSummary, ResolvedRecipe,
    SavedRecipeRef, Session, UpdatePost,
};
use cookbuddy_core::resolver::{
    LookupError, RecipeLookup, ResolveError, ResolverConfig, SavedRecipeResolver,
};
use cookbuddy_core::service::{CookbookService, ServiceError};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<CookbookService>>,
    lookup: Arc<dyn RecipeLookup>,
    resolver: ResolverConfig,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, CookbookService> {
        self.svc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Caller identity resolved from the bearer token. `None` for anonymous
/// requests.
#[derive(Clone)]
struct CurrentSession(Option<Session>);

impl CurrentSession {
    fn require(&self) -> Result<&Session, ApiError> {
        self.0
            .as_ref()
            .ok_or_else(|| ApiError::Unauthorized("Sign in required".to_string()))
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct AuthRequest {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct PostsQuery {
    q: Option<String>,
    sort: Option<String>,
}

#[derive(Deserialize)]
struct CreatePostRequest {
    title: String,
    content: Option<String>,
    image_url: Option<String>,
    recipe_id: Option<String>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
#[allow(clippy::option_option)]
struct UpdatePostRequest {
    title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    content: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    image_url: Option<Option<String>>,
    recipe_id: Option<String>,
}

#[derive(Deserialize)]
struct CommentRequest {
    content: String,
}

#[derive(Serialize)]
struct RecipeDetailResponse {
    #[serde(flatten)]
    recipe: Recipe,
    saved: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unavailable(anyhow::Error),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unavailable(err) => {
                warn!("service unavailable: {err:#}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable".to_string(),
                )
            }
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Invalid(msg) => Self::BadRequest(msg),
            ServiceError::Unauthorized(msg) => Self::Unauthorized(msg),
            ServiceError::Forbidden(msg) => Self::Forbidden(msg),
            ServiceError::NotFound(msg) => Self::NotFound(msg),
            ServiceError::Conflict(msg) => Self::Conflict(msg),
            ServiceError::Store(err) => Self::Internal(err),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::StoreUnavailable(store) => Self::Unavailable(store.0),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(id) => Self::NotFound(format!("Recipe '{id}' not found")),
            LookupError::Transport(msg) => {
                Self::Internal(anyhow::anyhow!(msg).context("recipe lookup failed"))
            }
        }
    }
}

// --- Middleware ---

/// Resolve `Authorization: Bearer <token>` into a `CurrentSession`. Requests
/// without the header, or with a token that is no longer valid, continue
/// anonymously; routes that need a session reject them with 401.
async fn resolve_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .map(str::to_string);

    let session = match token {
        None => None,
        Some(token) => match state.svc().session(&token) {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                debug!("unknown session token, continuing anonymously");
                None
            }
            Err(err) => return ApiError::from(err).into_response(),
        },
    };

    request.extensions_mut().insert(CurrentSession(session));
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Accounts ---

async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.svc().sign_up(&req.email, &req.password)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<AuthRequest>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.svc().sign_in(&req.email, &req.password)?))
}

async fn sign_out(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Result<StatusCode, ApiError> {
    let session = current.require()?;
    state.svc().sign_out(&session.token)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Recipes ---

async fn search_recipes(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<RecipeSummary>>, ApiError> {
    let q = query.q.unwrap_or_default();
    Ok(Json(state.lookup.search(&q).await?))
}

async fn get_recipe(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<Json<RecipeDetailResponse>, ApiError> {
    let recipe = state.lookup.lookup(id.trim()).await?;
    let saved = state.svc().is_saved(current.0.as_ref(), &recipe.id)?;
    Ok(Json(RecipeDetailResponse { recipe, saved }))
}

async fn save_recipe(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SavedRecipeRef>), ApiError> {
    let saved = state.svc().save_recipe(current.0.as_ref(), &id)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn unsave_recipe(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.svc().unsave_recipe(current.0.as_ref(), &id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!(
            "Recipe '{}' is not saved",
            id.trim()
        )))
    }
}

async fn list_saved(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Json<Vec<ResolvedRecipe>>, ApiError> {
    let resolved = SavedRecipeResolver::with_config(&*state.lookup, state.resolver)
        .resolve(&*state.svc, current.0.as_ref())
        .await?;
    Ok(Json(resolved))
}

// --- Posts ---

async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostsQuery>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let sort = match query.sort.as_deref() {
        Some(s) => PostSort::parse(s).map_err(|e| ApiError::BadRequest(format!("{e}")))?,
        None => PostSort::default(),
    };
    Ok(Json(state.svc().list_posts(query.q.as_deref(), sort)?))
}

async fn create_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let post = state.svc().create_post(
        current.0.as_ref(),
        NewPost {
            title: req.title,
            content: req.content,
            image_url: req.image_url,
            recipe_id: req.recipe_id,
        },
    )?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.svc().get_post_detail(id)?))
}

async fn update_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<Post>, ApiError> {
    let update = UpdatePost {
        title: req.title,
        content: req.content,
        image_url: req.image_url,
        recipe_id: req.recipe_id,
    };
    Ok(Json(state.svc().update_post(current.0.as_ref(), id, update)?))
}

async fn delete_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.svc().delete_post(current.0.as_ref(), id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upvote_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.svc().upvote_post(id)?))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    Ok(Json(state.svc().list_comments(id)?))
}

async fn add_comment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    Path(id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state
        .svc()
        .add_comment(current.0.as_ref(), id, &req.content)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/recipes/search", get(search_recipes))
        .route("/api/recipes/{id}", get(get_recipe))
        .route(
            "/api/recipes/{id}/save",
            post(save_recipe).delete(unsave_recipe),
        )
        .route("/api/saved", get(list_saved))
        .route("/api/posts", get(list_posts).post(create_post))
        .route(
            "/api/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/api/posts/{id}/upvote", post(upvote_post))
        .route(
            "/api/posts/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: CookbookService,
    lookup: Arc<dyn RecipeLookup>,
    resolver: ResolverConfig,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        lookup,
        resolver,
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can reach this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    info!(bind, port, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    eprintln!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use cookbuddy_core::models::UNKNOWN_RECIPE_TITLE;
    use cookbuddy_core::resolver::{RetryPolicy, SavedRecipeStore, StoreError};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct MockLookup;

    #[async_trait]
    impl RecipeLookup for MockLookup {
        async fn lookup(&self, recipe_id: &str) -> Result<Recipe, LookupError> {
            match recipe_id {
                "52772" => Ok(Recipe {
                    id: "52772".to_string(),
                    title: "Teriyaki Chicken Casserole".to_string(),
                    thumbnail: None,
                    category: Some("Chicken".to_string()),
                    area: Some("Japanese".to_string()),
                    instructions: Some("Preheat oven to 350.".to_string()),
                    tags: None,
                    ingredients: vec![],
                }),
                "500" => Err(LookupError::Transport("HTTP 500 from upstream".to_string())),
                other => Err(LookupError::NotFound(other.to_string())),
            }
        }

        async fn search(&self, query: &str) -> Result<Vec<RecipeSummary>, LookupError> {
            if query.contains("teriyaki") {
                let recipe = self.lookup("52772").await?;
                Ok(vec![RecipeSummary::from(&recipe)])
            } else {
                Ok(vec![])
            }
        }
    }

    fn test_state() -> AppState {
        AppState {
            svc: Arc::new(Mutex::new(CookbookService::new_in_memory().unwrap())),
            lookup: Arc::new(MockLookup),
            resolver: ResolverConfig {
                retry: RetryPolicy::none(),
                ..ResolverConfig::default()
            },
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn sign_up_token(app: &Router, email: &str) -> String {
        let (status, json) = send(
            app,
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "email": email, "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["token"].as_str().unwrap().to_string()
    }

    async fn create_post_id(app: &Router, token: &str, title: &str) -> i64 {
        send(app, "POST", "/api/recipes/52772/save", Some(token), None).await;
        let (status, json) = send(
            app,
            "POST",
            "/api/posts",
            Some(token),
            Some(serde_json::json!({ "title": title, "recipe_id": "52772" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn signup_and_signin() {
        let app = build_router(test_state());
        sign_up_token(&app, "cook@example.com").await;

        let (status, json) = send(
            &app,
            "POST",
            "/api/auth/signin",
            None,
            Some(serde_json::json!({ "email": "cook@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["email"], "cook@example.com");

        let (status, json) = send(
            &app,
            "POST",
            "/api/auth/signin",
            None,
            Some(serde_json::json!({ "email": "cook@example.com", "password": "nope-nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Invalid email or password");
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let app = build_router(test_state());
        sign_up_token(&app, "cook@example.com").await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/signup",
            None,
            Some(serde_json::json!({ "email": "COOK@example.com", "password": "hunter22" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn signout_invalidates_token() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;

        send(&app, "POST", "/api/recipes/52772/save", Some(&token), None).await;
        let (status, _) = send(&app, "POST", "/api/auth/signout", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "POST", "/api/recipes/52772/save", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, "POST", "/api/auth/signout", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stale_token_reads_as_anonymous() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;
        send(&app, "POST", "/api/recipes/52772/save", Some(&token), None).await;
        send(&app, "POST", "/api/auth/signout", Some(&token), None).await;

        let (status, json) = send(&app, "GET", "/api/saved", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));

        let (status, json) = send(&app, "GET", "/api/recipes/52772", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["saved"], false);
    }

    #[tokio::test]
    async fn signout_requires_session() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "POST", "/api/auth/signout", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn saved_without_session_is_empty() {
        let app = build_router(test_state());
        let (status, json) = send(&app, "GET", "/api/saved", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn saved_recipes_resolve_in_order_with_placeholders() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;

        for id in ["52772", "99999", "500"] {
            let (status, _) = send(
                &app,
                "POST",
                &format!("/api/recipes/{id}/save"),
                Some(&token),
                None,
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, json) = send(&app, "GET", "/api/saved", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["recipe_id"], "52772");
        assert_eq!(rows[0]["title"], "Teriyaki Chicken Casserole");
        assert_eq!(rows[0]["found"], true);
        assert_eq!(rows[1]["recipe_id"], "99999");
        assert_eq!(rows[1]["title"], UNKNOWN_RECIPE_TITLE);
        assert_eq!(rows[2]["recipe_id"], "500");
        assert_eq!(rows[2]["found"], false);
    }

    #[tokio::test]
    async fn save_requires_session() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "POST", "/api/recipes/52772/save", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unsave_then_unsave_again() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;
        send(&app, "POST", "/api/recipes/52772/save", Some(&token), None).await;

        let (status, _) = send(&app, "DELETE", "/api/recipes/52772/save", Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", "/api/recipes/52772/save", Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn recipe_detail_includes_saved_flag() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;

        let (status, json) = send(&app, "GET", "/api/recipes/52772", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["title"], "Teriyaki Chicken Casserole");
        assert_eq!(json["saved"], false);

        send(&app, "POST", "/api/recipes/52772/save", Some(&token), None).await;
        let (_, json) = send(&app, "GET", "/api/recipes/52772", Some(&token), None).await;
        assert_eq!(json["saved"], true);
    }

    #[tokio::test]
    async fn recipe_lookup_errors() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "GET", "/api/recipes/99999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = send(&app, "GET", "/api/recipes/500", None, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn search_recipes_endpoint() {
        let app = build_router(test_state());
        let (status, json) = send(&app, "GET", "/api/recipes/search?q=teriyaki", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["id"], "52772");

        let (_, json) = send(&app, "GET", "/api/recipes/search?q=zzz", None, None).await;
        assert_eq!(json, serde_json::json!([]));
    }

    #[tokio::test]
    async fn post_lifecycle_and_ownership() {
        let app = build_router(test_state());
        let owner = sign_up_token(&app, "owner@example.com").await;
        let other = sign_up_token(&app, "other@example.com").await;
        let id = create_post_id(&app, &owner, "Teriyaki night").await;

        let uri = format!("/api/posts/{id}");
        let edit = serde_json::json!({ "title": "Teriyaki night, take two" });

        let (status, _) = send(&app, "PUT", &uri, Some(&other), Some(edit.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "PUT", &uri, None, Some(edit.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = send(&app, "PUT", &uri, Some(&owner), Some(edit)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["title"], "Teriyaki night, take two");

        let (status, _) = send(&app, "DELETE", &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "DELETE", &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_post_can_clear_image() {
        let app = build_router(test_state());
        let owner = sign_up_token(&app, "owner@example.com").await;
        send(&app, "POST", "/api/recipes/52772/save", Some(&owner), None).await;
        let (_, json) = send(
            &app,
            "POST",
            "/api/posts",
            Some(&owner),
            Some(serde_json::json!({
                "title": "Casserole",
                "recipe_id": "52772",
                "image_url": "https://example.com/c.jpg"
            })),
        )
        .await;
        let id = json["id"].as_i64().unwrap();
        assert_eq!(json["image_url"], "https://example.com/c.jpg");

        let (status, json) = send(
            &app,
            "PUT",
            &format!("/api/posts/{id}"),
            Some(&owner),
            Some(serde_json::json!({ "image_url": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["image_url"].is_null());
    }

    #[tokio::test]
    async fn update_post_content_blank_or_null_clears() {
        let app = build_router(test_state());
        let owner = sign_up_token(&app, "owner@example.com").await;
        let id = create_post_id(&app, &owner, "Casserole").await;
        let uri = format!("/api/posts/{id}");

        let (_, json) = send(
            &app,
            "PUT",
            &uri,
            Some(&owner),
            Some(serde_json::json!({ "content": "Crispy on top" })),
        )
        .await;
        assert_eq!(json["content"], "Crispy on top");

        // Omitting the field leaves it alone
        let (_, json) = send(
            &app,
            "PUT",
            &uri,
            Some(&owner),
            Some(serde_json::json!({ "title": "Casserole II" })),
        )
        .await;
        assert_eq!(json["content"], "Crispy on top");

        let (status, json) = send(
            &app,
            "PUT",
            &uri,
            Some(&owner),
            Some(serde_json::json!({ "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["content"].is_null());

        send(
            &app,
            "PUT",
            &uri,
            Some(&owner),
            Some(serde_json::json!({ "content": "Back again" })),
        )
        .await;
        let (_, json) = send(
            &app,
            "PUT",
            &uri,
            Some(&owner),
            Some(serde_json::json!({ "content": null })),
        )
        .await;
        assert!(json["content"].is_null());
    }

    #[tokio::test]
    async fn create_post_rejects_unsaved_recipe() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;

        let (status, json) = send(
            &app,
            "POST",
            "/api/posts",
            Some(&token),
            Some(serde_json::json!({ "title": "Mystery dish", "recipe_id": "77777" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Recipe '77777' is not in your saved recipes");
    }

    #[tokio::test]
    async fn create_post_validation() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;

        let (status, _) = send(
            &app,
            "POST",
            "/api/posts",
            None,
            Some(serde_json::json!({ "title": "Hi", "recipe_id": "52772" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, json) = send(
            &app,
            "POST",
            "/api/posts",
            Some(&token),
            Some(serde_json::json!({ "title": "   ", "recipe_id": "52772" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Post title must not be empty");
    }

    #[tokio::test]
    async fn list_posts_sorting_and_search() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;
        let first = create_post_id(&app, &token, "Teriyaki night").await;
        let second = create_post_id(&app, &token, "Pancake morning").await;
        send(&app, "POST", &format!("/api/posts/{first}/upvote"), None, None).await;

        let (_, json) = send(&app, "GET", "/api/posts", None, None).await;
        assert_eq!(json[0]["id"], second);

        let (_, json) = send(&app, "GET", "/api/posts?sort=upvotes", None, None).await;
        assert_eq!(json[0]["id"], first);

        let (_, json) = send(&app, "GET", "/api/posts?q=pancake", None, None).await;
        assert_eq!(json.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "GET", "/api/posts?sort=oldest", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upvote_increments_by_one() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;
        let id = create_post_id(&app, &token, "Teriyaki night").await;

        let uri = format!("/api/posts/{id}/upvote");
        let (status, json) = send(&app, "POST", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["upvotes"], 1);
        let (_, json) = send(&app, "POST", &uri, None, None).await;
        assert_eq!(json["upvotes"], 2);

        let (status, _) = send(&app, "POST", "/api/posts/9999/upvote", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn comments_flow() {
        let app = build_router(test_state());
        let token = sign_up_token(&app, "cook@example.com").await;
        let id = create_post_id(&app, &token, "Teriyaki night").await;
        let uri = format!("/api/posts/{id}/comments");

        let (status, _) = send(
            &app,
            "POST",
            &uri,
            None,
            Some(serde_json::json!({ "content": "Yum" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            &uri,
            Some(&token),
            Some(serde_json::json!({ "content": "Yum" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = send(&app, "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["content"], "Yum");

        let (_, json) = send(&app, "GET", &format!("/api/posts/{id}"), None, None).await;
        assert_eq!(json["comments"].as_array().unwrap().len(), 1);
        assert_eq!(json["title"], "Teriyaki night");

        let (status, _) = send(&app, "GET", "/api/posts/9999/comments", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = build_router(test_state());

        let response = app
            .oneshot(
                axum::http::Request::get("/api/posts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = build_router(test_state());

        let response = app
            .oneshot(
                axum::http::Request::post("/api/auth/signout")
                    .header("Authorization", "Bearer not-a-session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = build_router(test_state());

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app
            .oneshot(
                axum::http::Request::post("/api/posts")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/.cookbuddy/db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn store_unavailable_maps_to_503() {
        struct DownStore;

        impl SavedRecipeStore for DownStore {
            fn list_saved(&self, _user_id: i64) -> Result<Vec<SavedRecipeRef>, StoreError> {
                Err(StoreError(anyhow::anyhow!("disk I/O error")))
            }
        }

        let session = Session {
            token: "tok".to_string(),
            user_id: 1,
            email: "cook@example.com".to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };
        let err = SavedRecipeResolver::new(&MockLookup)
            .resolve(&DownStore, Some(&session))
            .await
            .unwrap_err();

        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(!json["error"].as_str().unwrap().contains("disk"));
    }
}
