//! One route group per bread, one route per enabled view.

use anyhow::Result;
use axum::extract::{Form, FromRequestParts, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{MethodRouter, get};
use axum::Router;
use bread::access::{Access, Anonymous, Principal, check_access};
use bread::browse::browse;
use bread::core::record::Record;
use bread::form::{self, Submission, unbound};
use bread::read::read_items;
use bread::scaffold::{Bread, ViewKind};
use bread::site::Site;
use minijinja::context;
use tower_http::trace::TraceLayer;

use crate::errors::{AppError, AppResult};
use crate::render::Renderer;
use crate::state::AppState;

/// Header naming the requesting user; absent or unknown means anonymous.
pub const USER_HEADER: &str = "x-bread-user";

#[derive(Debug, Clone, Copy)]
struct Target {
    bread: usize,
    view: ViewKind,
}

/// What every view needs from the request line and headers.
#[derive(Debug)]
pub struct RequestInfo {
    path: String,
    /// Path plus query string, used for the login `next` parameter.
    full_path: String,
    query: Vec<(String, String)>,
    user: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestInfo {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map_err(|err| AppError::bad_request(err.body_text()))?;
        let user = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let path = parts.uri.path().to_string();
        let full_path = parts
            .uri
            .path_and_query()
            .map_or_else(|| path.clone(), |pq| pq.as_str().to_string());
        Ok(Self {
            path,
            full_path,
            query,
            user,
        })
    }
}

/// The full application with state and tracing applied.
pub fn app(site: Site, renderer: Renderer) -> Result<Router> {
    let router = bread_router(&site)?;
    Ok(router
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(site, renderer)))
}

pub fn bread_router(site: &Site) -> Result<Router<AppState>> {
    let mut router = Router::new().route("/health", get(health));
    for (index, bread) in site.breads.iter().enumerate() {
        let mut group = Router::new();
        for pattern in bread.url_patterns(true)? {
            let target = Target {
                bread: index,
                view: pattern.view,
            };
            group = group.route(&pattern.path, view_route(target));
        }
        router = router.merge(group);
    }
    Ok(router)
}

fn view_route(target: Target) -> MethodRouter<AppState> {
    match target.view {
        ViewKind::Browse => get(move |State(state): State<AppState>, info: RequestInfo| {
            browse_view(state, target, info)
        }),
        ViewKind::Read => get(move |State(state): State<AppState>, info: RequestInfo| {
            read_view(state, target, info)
        }),
        ViewKind::Edit | ViewKind::Add => get(
            move |State(state): State<AppState>, info: RequestInfo| form_view(state, target, info),
        )
        .post(
            move |State(state): State<AppState>,
                  info: RequestInfo,
                  Form(data): Form<Vec<(String, String)>>| {
                submit_view(state, target, info, data)
            },
        ),
        ViewKind::Delete => get(move |State(state): State<AppState>, info: RequestInfo| {
            delete_view(state, target, info)
        })
        .post(move |State(state): State<AppState>, info: RequestInfo| {
            delete_submit(state, target, info)
        }),
    }
}

async fn health() -> &'static str {
    "ok"
}

fn principal<'s>(site: &'s Site, info: &RequestInfo) -> &'s dyn Principal {
    match info.user.as_deref().and_then(|name| site.user(name)) {
        Some(user) => user,
        None => &Anonymous,
    }
}

fn authorize<'s>(site: &'s Site, target: Target, info: &RequestInfo) -> AppResult<&'s Bread> {
    let bread = site
        .breads
        .get(target.bread)
        .ok_or_else(|| AppError::not_found("no such bread"))?;
    match check_access(
        bread,
        target.view,
        principal(site, info),
        &info.full_path,
        &site.settings.login_url,
    ) {
        Access::Granted => Ok(bread),
        Access::Login { location } => Err(AppError::found(location)),
        Access::Forbidden => Err(AppError::forbidden(format!(
            "permission {} required",
            bread.permission(target.view)
        ))),
    }
}

/// The `pk` captured from the request path.
fn pk_of(bread: &Bread, target: Target, info: &RequestInfo) -> AppResult<i64> {
    bread
        .pattern(target.view)
        .and_then(|pattern| pattern.matches(&info.path))
        .flatten()
        .ok_or_else(|| AppError::not_found(format!("no {} at {}", bread.model(), info.path)))
}

fn redirect(location: String) -> Response {
    AppError::found(location).into_response()
}

async fn browse_view(state: AppState, target: Target, info: RequestInfo) -> AppResult<Response> {
    let site = state.site.read().await;
    let bread = authorize(&site, target, &info)?;
    let page = browse(bread, &site.store, &info.path, &info.query)?;
    let html = state.renderer.render(
        &bread.template_names(target.view),
        context! {
            bread => bread.context(principal(&site, &info)),
            page => page,
        },
    )?;
    Ok(Html(html).into_response())
}

async fn read_view(state: AppState, target: Target, info: RequestInfo) -> AppResult<Response> {
    let site = state.site.read().await;
    let bread = authorize(&site, target, &info)?;
    let pk = pk_of(bread, target, &info)?;
    let record = site.store.get(bread.model(), pk)?;
    let items = read_items(bread, record.model(), &record)?;
    let html = state.renderer.render(
        &bread.template_names(target.view),
        context! {
            bread => bread.context(principal(&site, &info)),
            object => record.display()?,
            items => items,
            edit_url => bread.url(ViewKind::Edit, Some(pk)),
            delete_url => bread.url(ViewKind::Delete, Some(pk)),
        },
    )?;
    Ok(Html(html).into_response())
}

async fn form_view(state: AppState, target: Target, info: RequestInfo) -> AppResult<Response> {
    let site = state.site.read().await;
    let bread = authorize(&site, target, &info)?;
    let model = site.schema.require(bread.model())?;
    let (form, object) = match target.view {
        ViewKind::Edit => {
            let pk = pk_of(bread, target, &info)?;
            let record = site.store.get(bread.model(), pk)?;
            let form = unbound(&site.store, model, bread.exclude(), Some(&record.row().fields))?;
            (form, Some(record.display()?))
        }
        _ => (unbound(&site.store, model, bread.exclude(), None)?, None),
    };
    let html = state.renderer.render(
        &bread.template_names(target.view),
        context! {
            bread => bread.context(principal(&site, &info)),
            form => form,
            object => object,
            action => info.path,
        },
    )?;
    Ok(Html(html).into_response())
}

async fn submit_view(
    state: AppState,
    target: Target,
    info: RequestInfo,
    data: Vec<(String, String)>,
) -> AppResult<Response> {
    let mut site = state.site.write().await;
    let bread = authorize(&site, target, &info)?.clone();
    let pk = match target.view {
        ViewKind::Edit => Some(pk_of(&bread, target, &info)?),
        _ => None,
    };
    match form::submit(&mut site.store, &bread, pk, &data)? {
        Submission::Saved { location, .. } => Ok(redirect(location)),
        Submission::Invalid(form) => {
            let object = match pk {
                Some(pk) => Some(site.store.get(bread.model(), pk)?.display()?),
                None => None,
            };
            let html = state.renderer.render(
                &bread.template_names(target.view),
                context! {
                    bread => bread.context(principal(&site, &info)),
                    form => form,
                    object => object,
                    action => info.path,
                },
            )?;
            Ok((StatusCode::BAD_REQUEST, Html(html)).into_response())
        }
    }
}

async fn delete_view(state: AppState, target: Target, info: RequestInfo) -> AppResult<Response> {
    let site = state.site.read().await;
    let bread = authorize(&site, target, &info)?;
    let pk = pk_of(bread, target, &info)?;
    let record = site.store.get(bread.model(), pk)?;
    let html = state.renderer.render(
        &bread.template_names(target.view),
        context! {
            bread => bread.context(principal(&site, &info)),
            object => record.display()?,
            action => info.path,
        },
    )?;
    Ok(Html(html).into_response())
}

async fn delete_submit(state: AppState, target: Target, info: RequestInfo) -> AppResult<Response> {
    let mut site = state.site.write().await;
    let bread = authorize(&site, target, &info)?.clone();
    let pk = pk_of(&bread, target, &info)?;
    let location = form::delete(&mut site.store, &bread, pk)?;
    Ok(redirect(location))
}
