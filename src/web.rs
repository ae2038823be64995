use crate::datamuse::{ClientConfig, DatamuseClient, LookupError};
use crate::dispatch::Dispatcher;
use crate::record::QueryMode;
use crate::render::{DisplayItem, Output, QueryView};
use crate::session::{SessionRegistry, SessionSnapshot, generate_session_id};
use askama::Template;
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use cookie::{Cookie, SameSite};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;
const SESSION_COOKIE: &str = "rf_session";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub sessions: SessionRegistry,
    pub theme: WebTheme,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WebTheme {
    #[default]
    Bootstrap,
    Tailwind,
}

impl fmt::Display for WebTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebTheme::Tailwind => write!(f, "tailwind"),
            WebTheme::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTheme(String);

impl fmt::Display for UnknownTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown theme {:?} (expected bootstrap or tailwind)", self.0)
    }
}

impl std::error::Error for UnknownTheme {}

impl FromStr for WebTheme {
    type Err = UnknownTheme;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bootstrap" => Ok(WebTheme::Bootstrap),
            "tailwind" => Ok(WebTheme::Tailwind),
            _ => Err(UnknownTheme(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    use_tailwind: bool,
    use_bootstrap: bool,
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    form_class: &'static str,
    input_class: &'static str,
    button_class: &'static str,
    secondary_button_class: &'static str,
    save_button_class: &'static str,
    heading_class: &'static str,
    alert_class: &'static str,
}

impl Chrome {
    fn new(theme: WebTheme) -> Self {
        match theme {
            WebTheme::Tailwind => Self {
                use_tailwind: true,
                use_bootstrap: false,
                body_class: "bg-slate-50 text-slate-900",
                main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
                card_class: "max-w-3xl w-full space-y-6",
                eyebrow_class: "uppercase tracking-wide text-sm text-slate-500",
                headline_class: "text-4xl font-extrabold tracking-tight",
                lede_class: "text-lg text-slate-600",
                form_class: "flex flex-wrap gap-3",
                input_class: "flex-1 rounded-md border border-slate-300 px-3 py-2",
                button_class: "inline-flex items-center rounded-md bg-slate-900 px-4 py-2 text-white font-semibold shadow hover:bg-slate-800 transition-colors",
                secondary_button_class: "inline-flex items-center rounded-md bg-slate-500 px-4 py-2 text-white font-semibold shadow hover:bg-slate-400 transition-colors",
                save_button_class: "rounded border border-emerald-600 px-2 text-emerald-700 hover:bg-emerald-50",
                heading_class: "text-xl font-semibold mt-4",
                alert_class: "rounded-md bg-red-50 p-3 text-red-700",
            },
            WebTheme::Bootstrap => Self {
                use_tailwind: false,
                use_bootstrap: true,
                body_class: "bg-light text-dark",
                main_class: "container py-5",
                card_class: "mx-auto col-lg-8",
                eyebrow_class: "text-uppercase text-muted mb-2",
                headline_class: "display-5 fw-bold",
                lede_class: "lead mb-4",
                form_class: "input-group mb-4",
                input_class: "form-control",
                button_class: "btn btn-primary",
                secondary_button_class: "btn btn-secondary",
                save_button_class: "btn btn-outline-success btn-sm",
                heading_class: "h4 mt-3",
                alert_class: "alert alert-danger",
            },
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub theme: WebTheme,
    pub base_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            theme: WebTheme::default(),
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Client(LookupError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Client(err) => write!(f, "word service client: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<LookupError> for WebError {
    fn from(value: LookupError) -> Self {
        WebError::Client(value)
    }
}

pub async fn serve(config: WebConfig, client: ClientConfig) -> Result<(), WebError> {
    let source = DatamuseClient::new(client)?;
    let endpoint = source.endpoint().to_string();
    let state = Arc::new(AppState {
        dispatcher: Dispatcher::new(Arc::new(source)),
        sessions: SessionRegistry::new(),
        theme: config.theme,
        base_url: config.base_url.clone(),
    });
    let router = build_router(state);
    info!(
        %config.addr,
        theme = ?config.theme,
        base = %config.base_url,
        %endpoint,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/lookup", get(lookup_html))
        .route("/save", axum::routing::post(save_form))
        .route("/api/lookup", get(api_lookup))
        .route("/api/saved", get(api_saved).post(api_save))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Session id taken from the request cookie, or a freshly minted one.
struct SessionCookie {
    id: String,
    fresh: bool,
}

impl SessionCookie {
    fn from_headers(headers: &HeaderMap) -> Self {
        let existing = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|id| is_valid_session_id(id));
        match existing {
            Some(id) => Self { id, fresh: false },
            None => Self {
                id: generate_session_id(),
                fresh: true,
            },
        }
    }

    /// Attaches `Set-Cookie` when the browser did not send a usable session.
    fn attach(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.fresh {
            let cookie = Cookie::build((SESSION_COOKIE, self.id.clone()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .build();
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "rhyme-finder-web" }))
}

async fn home(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let session = SessionCookie::from_headers(&headers);
    let snapshot = state.sessions.snapshot(&session.id);
    session.attach(Html(render_page(state.theme, &state.base_url, &snapshot)))
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    term: Option<String>,
    mode: Option<String>,
}

fn parse_mode(raw: Option<&str>) -> Result<QueryMode, ApiError> {
    match raw {
        None => Ok(QueryMode::default()),
        Some(value) => value
            .parse()
            .map_err(|err: crate::record::UnknownMode| ApiError::bad_request(err.to_string())),
    }
}

async fn lookup_html(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(params): Query<LookupParams>,
) -> Response {
    let session = SessionCookie::from_headers(&headers);
    let mode = match parse_mode(params.mode.as_deref()) {
        Ok(mode) => mode,
        Err(err) => {
            let page = render_error_page(state.theme, err.message);
            return session.attach((StatusCode::BAD_REQUEST, Html(page)));
        }
    };
    let term = params.term.unwrap_or_default();
    let seq = state.sessions.begin(&session.id, mode, &term);
    let view = state.dispatcher.dispatch(mode, &term).await;
    let snapshot = settle_lookup(&state.sessions, &session.id, seq, view);
    session.attach(Html(render_page(state.theme, &state.base_url, &snapshot)))
}

/// Stores `view` if it is still the latest lookup for the session. A
/// superseded lookup still renders its own result rather than the newer
/// lookup's pending view.
fn settle_lookup(
    sessions: &SessionRegistry,
    session_id: &str,
    seq: u64,
    view: QueryView,
) -> SessionSnapshot {
    if sessions.apply(session_id, seq, view.clone()) {
        return sessions.snapshot(session_id);
    }
    SessionSnapshot {
        view,
        ..sessions.snapshot(session_id)
    }
}

#[derive(Debug, Deserialize)]
struct SaveParams {
    word: String,
}

async fn save_form(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(params): Form<SaveParams>,
) -> Response {
    let session = SessionCookie::from_headers(&headers);
    state.sessions.save_word(&session.id, &params.word);
    session.attach(Redirect::to("/"))
}

async fn api_lookup(
    State(state): State<SharedState>,
    Query(params): Query<LookupParams>,
) -> Result<Response, ApiError> {
    let mode = parse_mode(params.mode.as_deref())?;
    let term = params
        .term
        .ok_or_else(|| ApiError::bad_request("Query parameter `term` is required"))?;
    let view = state.dispatcher.dispatch(mode, &term).await;
    Ok(Json(view).into_response())
}

async fn api_saved(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let session = SessionCookie::from_headers(&headers);
    let snapshot = state.sessions.snapshot(&session.id);
    session.attach(Json(json!({ "saved": snapshot.saved })))
}

async fn api_save(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(params): Json<SaveParams>,
) -> Response {
    let session = SessionCookie::from_headers(&headers);
    let count = state.sessions.save_word(&session.id, &params.word);
    let snapshot = state.sessions.snapshot(&session.id);
    session.attach(Json(json!({ "saved": snapshot.saved, "count": count })))
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn lookup_path(mode: QueryMode, term: &str) -> String {
    format!(
        "/lookup?term={}&mode={}",
        encode_component(term),
        mode.query_value()
    )
}

struct SectionBlock<'a> {
    heading: String,
    items: &'a [DisplayItem],
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Rhyme Finder{% if !term.is_empty() %} • {{ term }}{% endif %}</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    {% endif %}
    <link rel="canonical" href="{{ canonical_url }}">
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }}">
        <p class="{{ chrome.eyebrow_class }}">Rhyme Finder v{{ version }}</p>
        <h1 class="{{ chrome.headline_class }}">Rhyme Finder</h1>
        <p class="{{ chrome.lede_class }}">Saved words: <span id="saved-words">{{ saved }}</span></p>
        <form action="/lookup" method="get" class="{{ chrome.form_class }}">
          <input class="{{ chrome.input_class }}" type="text" name="term" placeholder="Enter a word" value="{{ term }}" autofocus />
          <button type="submit" name="mode" value="rhyme" class="{{ chrome.button_class }}">Show rhyming words</button>
          <button type="submit" name="mode" value="synonym" class="{{ chrome.secondary_button_class }}">Show synonyms</button>
        </form>
        {% if !description.is_empty() %}
        <h2 class="{{ chrome.heading_class }}">{{ description }}</h2>
        {% endif %}
        {% if !alternate_href.is_empty() %}
        <p><a href="{{ alternate_href }}">{{ alternate_label }}</a></p>
        {% endif %}
        <output id="results">
          {% if loading %}<span>loading...</span>{% endif %}
          {% if no_result %}<span>(no result)</span>{% endif %}
          {% if !failure.is_empty() %}<div class="{{ chrome.alert_class }}" role="alert">Lookup failed: {{ failure }}</div>{% endif %}
          {% for section in sections %}
          {% if !section.heading.is_empty() %}<h3 class="{{ chrome.heading_class }}">{{ section.heading }}</h3>{% endif %}
          <ul>
            {% for item in section.items %}
            <li>{{ item.word }}
              <form action="/save" method="post" style="display:inline">
                <input type="hidden" name="word" value="{{ item.word }}" />
                <button type="submit" class="{{ chrome.save_button_class }}">(save)</button>
              </form>
            </li>
            {% endfor %}
          </ul>
          {% endfor %}
        </output>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct PageTemplate<'a> {
    chrome: Chrome,
    version: &'static str,
    canonical_url: String,
    saved: String,
    term: &'a str,
    description: &'a str,
    alternate_href: String,
    alternate_label: String,
    loading: bool,
    no_result: bool,
    failure: String,
    sections: Vec<SectionBlock<'a>>,
}

fn render_page(theme: WebTheme, base_url: &str, snapshot: &SessionSnapshot) -> String {
    let view = &snapshot.view;
    let output = &view.output;
    let canonical_url = match output {
        Output::Idle => format!("{base_url}/"),
        _ => format!("{base_url}{}", lookup_path(view.mode, &view.term)),
    };
    let (alternate_href, alternate_label) = match output {
        Output::Idle => (String::new(), String::new()),
        _ => {
            let other = match view.mode {
                QueryMode::Rhyme => QueryMode::Synonym,
                QueryMode::Synonym => QueryMode::Rhyme,
            };
            (
                lookup_path(other, &view.term),
                other.description(&view.term),
            )
        }
    };
    let failure = match output {
        Output::Failed { message } => message.clone(),
        _ => String::new(),
    };
    let sections = output
        .sections()
        .iter()
        .map(|section| SectionBlock {
            heading: section.heading.clone().unwrap_or_default(),
            items: &section.items,
        })
        .collect();
    let template = PageTemplate {
        chrome: Chrome::new(theme),
        version: env!("CARGO_PKG_VERSION"),
        canonical_url,
        saved: snapshot.saved.to_string(),
        term: &view.term,
        description: &view.description,
        alternate_href,
        alternate_label,
        loading: output.is_loading(),
        no_result: matches!(output, Output::NoResult),
        failure,
        sections,
    };
    template
        .render()
        .unwrap_or_else(|err| render_error_page(theme, err.to_string()))
}

fn render_error_page(theme: WebTheme, message: impl Into<String>) -> String {
    let chrome = Chrome::new(theme);
    let css_tag = match theme {
        WebTheme::Tailwind => {
            r#"<script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>"#
        }
        WebTheme::Bootstrap => {
            r#"<link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">"#
        }
    };
    let message = html_escape(&message.into());
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Rhyme Finder • Error</title>
    {css_tag}
  </head>
  <body class="{body_class}">
    <main class="{main_class}">
      <div class="{card_class}">
        <h1 class="{headline_class}">Something went wrong</h1>
        <p class="{lede_class}">{message}</p>
        <a href="/" class="{button_class}">Back to the finder</a>
      </div>
    </main>
  </body>
</html>"#,
        css_tag = css_tag,
        body_class = chrome.body_class,
        main_class = chrome.main_class,
        card_class = chrome.card_class,
        headline_class = chrome.headline_class,
        lede_class = chrome.lede_class,
        button_class = chrome.button_class,
        message = message,
    )
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
