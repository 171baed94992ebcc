//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::{is_valid_username, username_id, CacheManager, Category, Contents, Params, Payload};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::models::{
    HealthResponse, InvalidateResponse, LimitResetResponse, ListQuery, PageQuery, SourceQuery,
    StatsResponse,
};
use crate::ratelimit::LimiterRegistry;
use crate::tasks::{spawn_sweep_task, SweepHandle};
use crate::upstream::{HttpUpstream, Origin, Upstream};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub upstream: Arc<dyn Upstream>,
    pub limiters: Arc<LimiterRegistry>,
}

impl AppState {
    pub fn new(cache: CacheManager, upstream: Arc<dyn Upstream>, limiters: LimiterRegistry) -> Self {
        Self {
            cache: Arc::new(cache),
            upstream,
            limiters: Arc::new(limiters),
        }
    }

    /// Builds caches, limiters and the HTTP upstream from configuration.
    pub fn from_config(config: &Config, clock: SharedClock) -> Result<Self> {
        let cache = CacheManager::new(&config.cache, Arc::clone(&clock))?;
        let limiters = LimiterRegistry::new(&config.rate_limit, clock)?;
        let upstream = HttpUpstream::new(&config.upstream)?;
        Ok(Self::new(cache, Arc::new(upstream), limiters))
    }

    /// Starts one expiry sweep per cache and per limiter counter store.
    pub fn spawn_sweepers(&self, interval: Duration) -> Vec<SweepHandle> {
        self.cache
            .sweep_targets()
            .into_iter()
            .chain(self.limiters.sweep_targets())
            .map(|target| spawn_sweep_task(target, interval))
            .collect()
    }

    /// Serves `resource` from cache or fetches it from upstream and caches
    /// the result along with the sub-entities it embeds.
    ///
    /// The lookup runs on its own task, so a client that disconnects does
    /// not cancel a fetch that other callers may be waiting on.
    async fn read_through(&self, resource: Resource) -> Result<Payload> {
        let cache = Arc::clone(&self.cache);
        let upstream = Arc::clone(&self.upstream);
        let Resource {
            category,
            contents,
            id,
            params,
            origin,
            path,
        } = resource;

        tokio::spawn(async move {
            cache
                .get_or_compute_as(category, contents, &id, &params, || {
                    upstream.fetch(origin, &path, &params)
                })
                .await
        })
        .await
        .map_err(|e| GatewayError::Internal(format!("fetch task failed: {e}")))?
    }
}

/// Where a resource is cached and where it is fetched from.
struct Resource {
    category: Category,
    contents: Contents,
    id: String,
    params: Params,
    origin: Origin,
    path: String,
}

impl Resource {
    /// A JSON API resource cached under `category`.
    fn api(category: Category, id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            category,
            contents: Contents::of(category),
            id: id.into(),
            params: Params::new(),
            origin: Origin::Api,
            path: path.into(),
        }
    }

    fn uploads(category: Category, id: u64, path: String) -> Self {
        Self {
            origin: Origin::Uploads,
            ..Self::api(category, id.to_string(), path)
        }
    }

    fn holding(mut self, contents: Contents) -> Self {
        self.contents = contents;
        self
    }

    fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }
}

// == Validation ==
fn numeric_id(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("'{raw}' is not a numeric id")))
}

fn validate_username(username: &str) -> Result<()> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(GatewayError::InvalidRequest(format!("'{username}' is not a valid username")))
    }
}

fn validate_page(page: &PageQuery) -> Result<()> {
    match page.validate() {
        Some(message) => Err(GatewayError::InvalidRequest(message)),
        None => Ok(()),
    }
}

// == Admin ==
/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let limiters = if state.limiters.enabled() {
        state.limiters.stats()
    } else {
        Vec::new()
    };
    Json(StatsResponse::new(state.cache.stats_all(), limiters))
}

/// Handler for DELETE /cache
pub async fn invalidate_all_handler(State(state): State<AppState>) -> Json<InvalidateResponse> {
    state.cache.invalidate_all();
    Json(InvalidateResponse::new(&Category::ALL))
}

/// Handler for DELETE /cache/:category
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let category: Category = category.parse()?;
    state.cache.invalidate(category);
    Ok(Json(InvalidateResponse::new(&[category])))
}

/// Handler for DELETE /ratelimit/users/:user
pub async fn reset_user_limit_handler(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Json<LimitResetResponse> {
    let reset = state.limiters.reset_user(&user);
    info!(user = %user, reset, "Per-user rate limit reset");
    Json(LimitResetResponse { user, reset })
}

// == Resources ==
/// Handler for GET /api/users/:username
pub async fn user_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Payload> {
    validate_username(&username)?;
    let path = format!("users/{username}/");
    state
        .read_through(Resource::api(Category::Users, username_id(&username), path))
        .await
}

/// Lists hanging off a user, cached in the users category.
async fn user_listing(
    state: AppState,
    username: String,
    list: &str,
    contents: Contents,
    page: PageQuery,
) -> Result<Payload> {
    validate_username(&username)?;
    validate_page(&page)?;
    let id = format!("{}/{list}", username_id(&username));
    let path = format!("users/{username}/{list}");
    state
        .read_through(
            Resource::api(Category::Users, id, path)
                .holding(contents)
                .with_params(page.to_params()),
        )
        .await
}

/// Handler for GET /api/users/:username/projects
pub async fn user_projects_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    user_listing(state, username, "projects", Contents::ProjectList, page).await
}

/// Handler for GET /api/users/:username/favorites
pub async fn user_favorites_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    user_listing(state, username, "favorites", Contents::ProjectList, page).await
}

/// Handler for GET /api/users/:username/following
pub async fn user_following_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    user_listing(state, username, "following", Contents::UserList, page).await
}

/// Handler for GET /api/users/:username/followers
pub async fn user_followers_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    user_listing(state, username, "followers", Contents::UserList, page).await
}

/// Handler for GET /api/projects/:id
pub async fn project_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Payload> {
    let id = numeric_id(&id)?;
    state
        .read_through(Resource::api(Category::Projects, id.to_string(), format!("projects/{id}/")))
        .await
}

/// Handler for GET /api/projects/:id/remixes
pub async fn remixes_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    let id = numeric_id(&id)?;
    validate_page(&page)?;
    let path = format!("projects/{id}/remixes");
    state
        .read_through(Resource::api(Category::Search, path.clone(), path).with_params(page.to_params()))
        .await
}

/// Handler for GET /api/projects/source/:id
///
/// Sources are token-gated and never cached.
pub async fn project_source_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SourceQuery>,
) -> Result<Payload> {
    let id = numeric_id(&id)?;
    state
        .upstream
        .fetch(Origin::Projects, &id.to_string(), &query.to_params())
        .await
}

async fn listing(state: AppState, kind: &str, query: ListQuery) -> Result<Payload> {
    if let Some(message) = query.validate() {
        return Err(GatewayError::InvalidRequest(message));
    }
    state
        .read_through(Resource::api(Category::Search, kind, kind).with_params(query.to_params()))
        .await
}

/// Handler for GET /api/search/projects
pub async fn search_handler(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Payload> {
    listing(state, "search/projects", query).await
}

/// Handler for GET /api/explore/projects
pub async fn explore_handler(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Payload> {
    listing(state, "explore/projects", query).await
}

/// Handler for GET /api/studios/:id
pub async fn studio_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Payload> {
    let id = numeric_id(&id)?;
    state
        .read_through(Resource::api(Category::Studios, id.to_string(), format!("studios/{id}/")))
        .await
}

async fn studio_listing(
    state: AppState,
    id: String,
    list: &str,
    contents: Contents,
    page: PageQuery,
) -> Result<Payload> {
    let id = numeric_id(&id)?;
    validate_page(&page)?;
    let path = format!("studios/{id}/{list}");
    state
        .read_through(
            Resource::api(Category::Studios, format!("{id}/{list}"), path)
                .holding(contents)
                .with_params(page.to_params()),
        )
        .await
}

/// Handler for GET /api/studios/:id/projects
pub async fn studio_projects_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    studio_listing(state, id, "projects", Contents::ProjectList, page).await
}

/// Handler for GET /api/studios/:id/managers
pub async fn studio_managers_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    studio_listing(state, id, "managers", Contents::UserList, page).await
}

/// Handler for GET /api/studios/:id/curators
pub async fn studio_curators_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Payload> {
    studio_listing(state, id, "curators", Contents::UserList, page).await
}

/// Handler for GET /api/thumbnails/:id
pub async fn thumbnail_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Payload> {
    let id = numeric_id(&id)?;
    state
        .read_through(Resource::uploads(
            Category::Thumbnails,
            id,
            format!("projects/thumbnails/{id}.png"),
        ))
        .await
}

/// Handler for GET /api/avatars/:id
pub async fn avatar_handler(State(state): State<AppState>, Path(id): Path<String>) -> Result<Payload> {
    let id = numeric_id(&id)?;
    state
        .read_through(Resource::uploads(Category::Avatars, id, format!("users/avatars/{id}.png")))
        .await
}

/// Handler for GET /api/proxy/featured
pub async fn featured_handler(State(state): State<AppState>) -> Result<Payload> {
    state
        .read_through(Resource::api(Category::Search, "proxy/featured", "proxy/featured").holding(Contents::Opaque))
        .await
}

/// Handler for GET /api/news
pub async fn news_handler(State(state): State<AppState>) -> Result<Payload> {
    state
        .read_through(Resource::api(Category::Search, "news", "news").holding(Contents::Opaque))
        .await
}
