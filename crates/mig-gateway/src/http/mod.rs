//! HTTP gateway: API calls, Server-Sent-Events and static files.
//!
//! Paths under `BaseUrl` are served as follows:
//!
//! - `api/<routing string>` is dispatched to the router;
//! - `events` streams buffered router events as `text/event-stream`;
//! - anything else is matched against `UrlAlias.<n>` entries and then served
//!   from `HomePath`.
//!
//! Static requests are also offered to the router as `html/<path>` first so
//! that pre-process hooks can answer them.

pub mod auth;
pub mod cache;
pub mod sse;

use crate::error::GatewayError;
use crate::gateway::{bind, Gateway, ListenerHandle};
use crate::request::{ClientRequest, RequestContext};
use crate::service::Dispatcher;
use crate::Result;
use async_trait::async_trait;
use auth::{AuthMode, Authenticator, UserLookup};
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, IF_MODIFIED_SINCE, LAST_MODIFIED, ORIGIN,
    PRAGMA, WWW_AUTHENTICATE,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::Router;
use cache::{is_text_mime, load_text, FileCache};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::Stream;
use mig_core::command::STATIC_CONTENT_PREFIX;
use mig_core::config::WEB_SERVICE_GATEWAY;
use mig_core::option::parse_bool;
use mig_core::{Command, Event, MigOption, OptionSet, ResponseData};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use sse::EventBuffer;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Realm used when `AuthenticationRealm` is not set.
pub use mig_core::credentials::DEFAULT_REALM;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const LONG_MAX_AGE: &str = "public, max-age=31536000";
const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

const SSE_PADDING: usize = 2048;
const SSE_RETRY: Duration = Duration::from_secs(1);
const SSE_POLL: Duration = Duration::from_secs(1);
const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// A `UrlAlias.<n>` rewrite of a path relative to `BaseUrl`.
///
/// `from:to` matches exactly; `from*:to*` rewrites the prefix and keeps the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlAlias {
    from: String,
    to: String,
}

impl UrlAlias {
    pub fn parse(value: &str) -> Option<Self> {
        let (from, to) = value.split_once(':')?;
        let from = from.trim().trim_start_matches('/');
        let to = to.trim().trim_start_matches('/');
        if from.is_empty() {
            return None;
        }
        Some(Self {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn resolve(&self, path: &str) -> Option<String> {
        match (self.from.strip_suffix('*'), self.to.strip_suffix('*')) {
            (Some(prefix), Some(target)) => path
                .strip_prefix(prefix)
                .map(|rest| format!("{}{}", target, rest)),
            (Some(prefix), None) => path.starts_with(prefix).then(|| self.to.clone()),
            (None, _) => (path == self.from).then(|| self.to.clone()),
        }
    }
}

/// Effective settings derived from the gateway options.
#[derive(Debug, Clone)]
struct HttpSettings {
    base_url: String,
    home_path: PathBuf,
    auth: Authenticator,
    file_caching: bool,
    cors_allow_origin: Option<String>,
    cache_ignore: Vec<Regex>,
    aliases: Vec<UrlAlias>,
}

impl HttpSettings {
    fn defaults(users: &UserLookup) -> Self {
        Self {
            base_url: "/".to_string(),
            home_path: PathBuf::from("html"),
            auth: Authenticator::new(AuthMode::None, DEFAULT_REALM, users.clone()),
            file_caching: true,
            cors_allow_origin: None,
            cache_ignore: Vec::new(),
            aliases: Vec::new(),
        }
    }

    fn from_options(options: &OptionSet, users: &UserLookup) -> Result<Self> {
        let mode: AuthMode = options
            .value("Authentication")
            .parse()
            .map_err(GatewayError::Config)?;
        let realm = match options.value("AuthenticationRealm") {
            "" => DEFAULT_REALM,
            realm => realm,
        };

        let mut cache_ignore = Vec::new();
        let mut aliases = Vec::new();
        for option in options.iter() {
            if option.name.starts_with("HttpCacheIgnore.") && !option.value.is_empty() {
                let regex = Regex::new(&option.value).map_err(|e| {
                    GatewayError::Config(format!("{}: invalid pattern: {}", option.name, e))
                })?;
                cache_ignore.push(regex);
            } else if option.name.starts_with("UrlAlias.") && !option.value.is_empty() {
                let alias = UrlAlias::parse(&option.value).ok_or_else(|| {
                    GatewayError::Config(format!(
                        "{}: expected 'alias:target', got '{}'",
                        option.name, option.value
                    ))
                })?;
                aliases.push(alias);
            }
        }

        let file_caching = match options.get("EnableFileCaching") {
            Some(option) if !option.value.trim().is_empty() => parse_bool(&option.value),
            _ => true,
        };

        Ok(Self {
            base_url: normalize_base_url(options.value("BaseUrl")),
            home_path: match options.value("HomePath") {
                "" => PathBuf::from("html"),
                path => PathBuf::from(path),
            },
            auth: Authenticator::new(mode, realm, users.clone()),
            file_caching,
            cors_allow_origin: Some(options.value("CorsAllowOrigin").trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            cache_ignore,
            aliases,
        })
    }

    fn resolve_alias(&self, path: &str) -> Option<String> {
        self.aliases.iter().find_map(|alias| alias.resolve(path))
    }

    fn ignores_cache(&self, path: &str) -> bool {
        self.cache_ignore.iter().any(|re| re.is_match(path))
    }
}

fn normalize_base_url(value: &str) -> String {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

struct HttpState {
    options: RwLock<OptionSet>,
    settings: RwLock<Arc<HttpSettings>>,
    users: UserLookup,
    events: EventBuffer,
    files: FileCache,
}

impl HttpState {
    fn settings(&self) -> Arc<HttpSettings> {
        self.settings.read().clone()
    }
}

#[derive(Clone)]
struct AppState {
    http: Arc<HttpState>,
    dispatcher: Dispatcher,
    token: CancellationToken,
}

/// The HTTP gateway.
///
/// Option changes apply to new requests immediately, except `Host` and
/// `Port` which take effect on the next start.
pub struct WebServiceGateway {
    state: Arc<HttpState>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Default for WebServiceGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl WebServiceGateway {
    /// Create a gateway with no known users.
    pub fn new() -> Self {
        Self::with_user_lookup(Arc::new(|_: &str| None))
    }

    /// Create a gateway resolving users through `users`.
    pub fn with_user_lookup(users: UserLookup) -> Self {
        let settings = HttpSettings::defaults(&users);
        Self {
            state: Arc::new(HttpState {
                options: RwLock::new(OptionSet::new()),
                settings: RwLock::new(Arc::new(settings)),
                users,
                events: EventBuffer::default(),
                files: FileCache::default(),
            }),
            listener: Mutex::new(None),
        }
    }

    /// Axum router serving this gateway's paths through `dispatcher`.
    pub fn router(&self, dispatcher: Dispatcher) -> Router {
        self.build_router(dispatcher, CancellationToken::new())
    }

    fn build_router(&self, dispatcher: Dispatcher, token: CancellationToken) -> Router {
        let state = AppState {
            http: self.state.clone(),
            dispatcher,
            token,
        };

        Router::new()
            .fallback(handle_request)
            .layer(middleware::from_fn_with_state(state.clone(), authenticate))
            .layer(middleware::from_fn_with_state(state.clone(), cors))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Number of events currently buffered for SSE clients.
    pub fn buffered_events(&self) -> usize {
        self.state.events.len()
    }
}

#[async_trait]
impl Gateway for WebServiceGateway {
    fn name(&self) -> &str {
        WEB_SERVICE_GATEWAY
    }

    async fn start(&self, dispatcher: Dispatcher) -> Result<()> {
        if self.listener.lock().is_some() {
            debug!("HTTP gateway already running");
            return Ok(());
        }

        let options = self.state.options.read().clone();
        let listener = bind(&options, DEFAULT_PORT).await?;
        let local_addr = listener.local_addr()?;

        let token = CancellationToken::new();
        let app = self.build_router(dispatcher, token.clone());
        let shutdown = token.clone();
        let task = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "HTTP server failed");
            }
        });

        info!(
            addr = %local_addr,
            base_url = %self.state.settings().base_url,
            "HTTP gateway listening"
        );
        *self.listener.lock() = Some(ListenerHandle::new(token, local_addr, task));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let handle = self.listener.lock().take();
        if let Some(handle) = handle {
            handle.shutdown(self.name()).await;
        }
        Ok(())
    }

    async fn on_set_option(&self, option: &MigOption) -> Result<()> {
        let mut options = self.state.options.read().clone();
        options.set(option.name.clone(), option.value.clone());
        let settings = HttpSettings::from_options(&options, &self.state.users)?;

        *self.state.options.write() = options;
        *self.state.settings.write() = Arc::new(settings);
        if option.name == "EnableFileCaching" || option.name == "HomePath" {
            self.state.files.clear();
        }
        debug!(option = %option.name, value = %option.value, "HTTP option set");
        Ok(())
    }

    async fn on_interface_property_changed(&self, event: &Event) {
        match event.to_json() {
            Ok(json) => {
                self.state.events.push(json);
            }
            Err(e) => warn!(error = %e, "failed to serialize event"),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().as_ref().map(|h| h.local_addr)
    }
}

async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(allow_origin) = state.http.settings().cors_allow_origin.clone() else {
        return next.run(request).await;
    };

    let origin = request.headers().get(ORIGIN).cloned();
    let credentialed = request.headers().contains_key(AUTHORIZATION);
    let requested_headers = request.headers().get(ACCESS_CONTROL_REQUEST_HEADERS).cloned();
    let preflight = request.method() == Method::OPTIONS;

    let mut response = if preflight {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    match origin {
        Some(origin) if credentialed => {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            headers.insert(
                ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        _ => {
            if let Ok(value) = HeaderValue::from_str(&allow_origin) {
                headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
            }
        }
    }

    if preflight {
        headers.insert(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
        );
        headers.insert(
            ACCESS_CONTROL_ALLOW_HEADERS,
            requested_headers
                .unwrap_or_else(|| HeaderValue::from_static("Content-Type, Authorization")),
        );
        headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("3600"));
    }

    response
}

async fn authenticate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let settings = state.http.settings();
    if settings.auth.mode() == AuthMode::None {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if settings.auth.verify(request.method().as_str(), authorization) {
        return next.run(request).await;
    }

    debug!(path = %request.uri().path(), "authentication required");
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    if let Ok(challenge) = HeaderValue::from_str(&settings.auth.challenge()) {
        response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
    }
    response
}

async fn handle_request(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let settings = state.http.settings();
    let path = uri.path();

    let relative = if format!("{}/", path) == settings.base_url {
        ""
    } else {
        match path.strip_prefix(settings.base_url.as_str()) {
            Some(relative) => relative,
            None => return StatusCode::NOT_FOUND.into_response(),
        }
    };

    let context = RequestContext::new(uuid::Uuid::new_v4().to_string())
        .with_remote_addr(connect_info.map(|ConnectInfo(addr)| addr))
        .with_method(method.as_str());

    if let Some(routing) = relative.strip_prefix("api/") {
        return handle_api(&state, routing, context, body).await;
    }

    if relative == "events" {
        return event_stream(&state, &headers, uri.query()).into_response();
    }

    let relative = settings
        .resolve_alias(relative)
        .unwrap_or_else(|| relative.to_string());

    let command = Command::parse(format!("{}/{}", STATIC_CONTENT_PREFIX, relative));
    let request = ClientRequest::new(WEB_SERVICE_GATEWAY, command, context).with_body(body.to_vec());
    let mut request = state.dispatcher.dispatch(request).await;
    if let Some(response) = request.take_response() {
        return api_response(response);
    }

    serve_file(&state.http, &settings, &relative, &headers).await
}

async fn handle_api(
    state: &AppState,
    routing: &str,
    context: RequestContext,
    body: Bytes,
) -> Response {
    let command = Command::parse(routing);
    let request = ClientRequest::new(WEB_SERVICE_GATEWAY, command, context).with_body(body.to_vec());
    let mut request = state.dispatcher.dispatch(request).await;

    match request.take_response() {
        Some(response) => api_response(response),
        None => {
            debug!(request = %routing, "unhandled API request");
            let mut response = StatusCode::NOT_FOUND.into_response();
            set_no_cache(response.headers_mut());
            response
        }
    }
}

fn api_response(data: ResponseData) -> Response {
    let status = if data.is_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    let content_type = match &data {
        ResponseData::Json(_) => "application/json",
        ResponseData::Text(_) => "text/plain; charset=utf-8",
        ResponseData::Bytes(_) => "application/octet-stream",
    };

    let mut response = (status, data.to_bytes()).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    set_no_cache(response.headers_mut());
    response
}

fn set_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

fn event_stream(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let http = state.http.clone();
    let token = state.token.clone();
    let mut last_id = last_event_id(headers, query).unwrap_or_else(|| http.events.latest_id());

    let stream = async_stream::stream! {
        yield Ok(SseEvent::default().comment(" ".repeat(SSE_PADDING)));
        yield Ok(SseEvent::default().retry(SSE_RETRY));

        let mut last_keep_alive = Instant::now();
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = http.events.notified() => {}
                _ = tokio::time::sleep(SSE_POLL) => {}
            }

            for entry in http.events.find_after(last_id) {
                last_id = entry.id;
                yield Ok(SseEvent::default().id(entry.id.to_string()).data(entry.data));
            }

            if last_keep_alive.elapsed() >= SSE_KEEP_ALIVE_INTERVAL {
                last_keep_alive = Instant::now();
                yield Ok(SseEvent::default().comment("keep-alive"));
            }
        }
    };

    Sse::new(stream)
}

fn last_event_id(headers: &HeaderMap, query: Option<&str>) -> Option<i64> {
    if let Some(id) = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(id);
    }
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "lastEventId")
        .and_then(|(_, value)| value.parse().ok())
}

/// Map a request path onto `home`, refusing anything that leaves it.
fn resolve_static_path(home: &Path, relative: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(relative).ok()?;
    let mut path = home.to_path_buf();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

async fn serve_file(
    http: &HttpState,
    settings: &HttpSettings,
    relative: &str,
    headers: &HeaderMap,
) -> Response {
    let Some(mut path) = resolve_static_path(&settings.home_path, relative) else {
        warn!(path = relative, "rejected path outside home directory");
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };
    if metadata.is_dir() {
        path.push("index.html");
        metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return StatusCode::NOT_FOUND.into_response(),
        };
    }

    let cacheable = settings.file_caching && !settings.ignores_cache(relative);
    let last_modified = metadata.modified().ok().map(http_date);

    if cacheable {
        if let (Some(modified), Some(since)) = (
            metadata.modified().ok(),
            headers
                .get(IF_MODIFIED_SINCE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date),
        ) {
            if truncate_to_secs(modified) <= since {
                let mut response = StatusCode::NOT_MODIFIED.into_response();
                set_file_cache_headers(response.headers_mut(), true, last_modified.as_deref());
                return response;
            }
        }
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let mut response = if is_text_mime(&mime) {
        let text = if settings.file_caching {
            http.files.get_or_load(&path).await.map(|t| t.to_string())
        } else {
            load_text(&path).await
        };
        match text {
            Ok(text) => Response::new(Body::from(text)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                return StatusCode::NOT_FOUND.into_response();
            }
        }
    } else {
        match tokio::fs::File::open(&path).await {
            Ok(file) => Response::new(Body::from_stream(ReaderStream::new(file))),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to open file");
                return StatusCode::NOT_FOUND.into_response();
            }
        }
    };

    let content_type = if is_text_mime(&mime) {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    };
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    set_file_cache_headers(response.headers_mut(), cacheable, last_modified.as_deref());
    response
}

fn set_file_cache_headers(headers: &mut HeaderMap, cacheable: bool, last_modified: Option<&str>) {
    if !cacheable {
        set_no_cache(headers);
        return;
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(LONG_MAX_AGE));
    if let Some(value) = last_modified.and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(LAST_MODIFIED, value);
    }
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}

fn parse_http_date(value: &str) -> Option<SystemTime> {
    let parsed = NaiveDateTime::parse_from_str(value.trim(), HTTP_DATE_FORMAT).ok()?;
    Some(parsed.and_utc().into())
}

fn truncate_to_secs(time: SystemTime) -> SystemTime {
    let secs = time
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}
