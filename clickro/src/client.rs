//! ClickHouse client.
use bytes::{Bytes, BytesMut};
use chrono_tz::Tz;
use std::{
    collections::{HashMap, HashSet},
    fmt,
    future::poll_fn,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
};
use url::Url;

use crate::{
    Result, Row, Value,
    common::verbose,
    config::{ClientConfig, ParseError},
    context::{Preferences, QueryContext},
    insert::Insert,
    native::{Format, TypeRegistry},
    query::{Command, Query},
    response::{self, QuerySummary, ServerError},
    row::Table,
    session::{self, SessionGuard, Sessions},
    transport::{
        BodyStream, ConnectionError, HttpRequest, HttpResponse, HttpTransport, Method, RequestBody,
    },
};

/// Transport options forwarded as is.
const FORWARDED: &[&str] = &[
    "buffer_size",
    "quota_key",
    "session_timeout",
    "session_check",
    "role",
    "wait_end_of_query",
];

pub(crate) type SendFuture =
    Pin<Box<dyn Future<Output = Result<HttpResponse, ConnectionError>> + Send>>;

/// Object safe [`HttpTransport`].
trait DynTransport: Send + Sync {
    fn send_boxed(self: Arc<Self>, request: HttpRequest) -> SendFuture;
}

impl<T: HttpTransport> DynTransport for T {
    fn send_boxed(self: Arc<Self>, request: HttpRequest) -> SendFuture {
        Box::pin(async move { self.send(request).await })
    }
}

/// ClickHouse client.
///
/// Client is cheap to clone, clones share the transport, the type cache and
/// the session state.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

struct Shared {
    transport: Arc<dyn DynTransport>,
    config: ClientConfig,
    base_url: Url,
    ping_url: Url,
    registry: Arc<TypeRegistry>,
    sessions: Sessions,
    defaults: Arc<Preferences>,
    session_id: Option<String>,
    readonly: RwLock<HashSet<String>>,
    server_tz: RwLock<Option<Tz>>,
}

/// What the request carries.
pub(crate) enum Payload {
    /// Sql in body, Native response.
    Query,
    /// Sql in body, response body is not decoded.
    Command,
    /// Sql in query string, Native blocks in body.
    Insert { sql: String, body: RequestBody },
}

/// Request ready to send, with the session held busy.
pub(crate) struct Prepared {
    pub(crate) request: HttpRequest,
    pub(crate) guard: Option<SessionGuard>,
    pub(crate) compressed: bool,
    pub(crate) format: Format,
    pub(crate) query_tz: bool,
    pub(crate) settings: HashMap<String, String>,
}

impl Client {
    /// Create client over [`ReqwestTransport`][crate::transport::ReqwestTransport].
    #[cfg(feature = "http")]
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = crate::transport::ReqwestTransport::new(&config)?;
        Self::with_transport(transport, config)
    }

    /// Create client with config from environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    #[cfg(feature = "http")]
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    /// Create client from url.
    ///
    /// See [`ClientConfig::parse`].
    #[cfg(feature = "http")]
    pub fn connect(url: &str) -> Result<Self> {
        Self::new(ClientConfig::parse(url)?)
    }

    /// Create client with custom transport.
    pub fn with_transport(transport: impl HttpTransport, config: ClientConfig) -> Result<Self> {
        let base_url = config.url()?;
        let ping_url = base_url
            .join("ping")
            .map_err(|e| ParseError::new(e.to_string()))?;

        let session_id = match (&config.session_id, config.autogenerate_session_id) {
            (Some(id), _) => Some(id.clone()),
            (None, true) => Some(session::generate_id()),
            (None, false) => None,
        };

        let defaults = Preferences { settings: config.settings.clone(), ..Preferences::default() };

        Ok(Self {
            shared: Arc::new(Shared {
                transport: Arc::new(transport),
                registry: Arc::new(TypeRegistry::new(config.type_cache)),
                base_url,
                ping_url,
                sessions: Sessions::default(),
                defaults: Arc::new(defaults),
                session_id,
                readonly: RwLock::new(HashSet::new()),
                server_tz: RwLock::new(None),
                config,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Type name cache.
    pub fn registry(&self) -> &TypeRegistry {
        &self.shared.registry
    }

    /// Session id attached to every request, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.shared.session_id.as_deref()
    }

    /// Server timezone, as reported by the last response or configured.
    pub fn server_timezone(&self) -> Option<Tz> {
        let observed = *self.shared.server_tz.read().unwrap_or_else(PoisonError::into_inner);
        observed.or(self.shared.config.server_tz)
    }

    /// Settings known to be readonly on the server.
    pub fn readonly_settings(&self) -> HashSet<String> {
        self.shared.readonly.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start a query.
    pub fn query(&self, sql: impl Into<String>) -> Query<Row> {
        Query::new(self.clone(), self.context(sql))
    }

    /// Start a statement whose result is not decoded, e.g. DDL.
    pub fn command(&self, sql: impl Into<String>) -> Command {
        Command::new(self.clone(), self.context(sql))
    }

    /// Start an insert into `table`.
    pub fn insert(&self, table: impl Into<String>) -> Insert {
        Insert::new(self.clone(), table.into(), self.context(String::new()))
    }

    /// Insert rows of a [`Table`].
    pub async fn insert_rows<T: Table>(
        &self,
        rows: impl IntoIterator<Item = T>,
    ) -> Result<QuerySummary> {
        self.insert(T::TABLE)
            .columns(T::COLUMNS.iter().copied())
            .rows(rows.into_iter().map(T::into_values))
            .await
    }

    /// Load the names of settings that are readonly on the server, those are
    /// dropped from subsequent requests.
    ///
    /// Returns the number of readonly settings.
    pub async fn load_server_settings(&self) -> Result<usize> {
        let result = self
            .query("SELECT name FROM system.settings WHERE readonly != 0")
            .execute()
            .await?;

        let names = result
            .rows()
            .filter_map(|row| match row.into_iter().next() {
                Some(Value::String(name)) => Some(name),
                _ => None,
            })
            .collect::<HashSet<_>>();

        let len = names.len();
        *self.shared.readonly.write().unwrap_or_else(PoisonError::into_inner) = names;
        Ok(len)
    }

    /// Check the server is reachable.
    pub async fn ping(&self) -> Result<()> {
        let request = HttpRequest {
            method: Method::Get,
            url: self.shared.ping_url.clone(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        };
        let response = self.send(request).await?;
        let status = response.status;
        let body = collect(response.body).await?;
        if !(200..300).contains(&status) {
            return Err(ServerError::from_body(&body, status, None).into());
        }
        Ok(())
    }

    pub(crate) fn context(&self, sql: impl Into<String>) -> QueryContext {
        QueryContext::new(sql, &self.shared.defaults)
    }

    pub(crate) fn registry_arc(&self) -> Arc<TypeRegistry> {
        self.shared.registry.clone()
    }

    pub(crate) fn send(&self, request: HttpRequest) -> SendFuture {
        self.shared.transport.clone().send_boxed(request)
    }

    pub(crate) fn observe_timezone(&self, tz: Tz) {
        *self.shared.server_tz.write().unwrap_or_else(PoisonError::into_inner) = Some(tz);
    }

    /// Compression toggle for the request, per call setting wins.
    pub(crate) fn compression(&self, ctx: &QueryContext) -> bool {
        let settings = ctx.settings();
        ["compress", "decompress"]
            .iter()
            .find_map(|key| settings.get(key))
            .map(|v| !matches!(v, "0" | "false"))
            .unwrap_or(self.shared.config.compress)
    }

    /// Build request, and mark the session busy.
    pub(crate) fn prepare(&self, ctx: &QueryContext, payload: Payload) -> Result<Prepared> {
        let shared = &self.shared;
        let (sql, params) = ctx.bind()?;

        let parts = {
            let readonly = shared.readonly.read().unwrap_or_else(PoisonError::into_inner);
            ctx.settings().partition(&readonly)
        };
        let compressed = self.compression(ctx);

        let session_id = parts
            .transport
            .get("session_id")
            .or(shared.session_id.as_ref());
        let guard = match session_id {
            Some(id) => Some(shared.sessions.acquire(id)?),
            None => None,
        };

        let mut url = shared.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            if let Some(database) = parts.transport.get("database").or(shared.config.database.as_ref()) {
                query.append_pair("database", database);
            }
            if let Some(id) = session_id {
                query.append_pair("session_id", id);
            }
            if let Some(id) = ctx.query_id().or(parts.transport.get("query_id").map(String::as_str)) {
                query.append_pair("query_id", id);
            }
            for key in FORWARDED {
                if let Some(value) = parts.transport.get(*key) {
                    query.append_pair(key, value);
                }
            }
            match &payload {
                Payload::Query => {
                    if compressed {
                        query.append_pair("compress", "1");
                    }
                    query.append_pair("default_format", "Native");
                }
                Payload::Command => {}
                Payload::Insert { sql, .. } => {
                    if compressed {
                        query.append_pair("decompress", "1");
                    }
                    query.append_pair("query", sql);
                }
            }
            for (key, value) in &params {
                query.append_pair(key, value);
            }
            for (key, value) in &parts.server {
                query.append_pair(key, value);
            }
        }

        let mut headers = vec![("X-ClickHouse-User", shared.config.user.clone())];
        if !shared.config.password.is_empty() {
            headers.push(("X-ClickHouse-Key", shared.config.password.clone()));
        }

        let body = match payload {
            Payload::Query | Payload::Command => RequestBody::Bytes(Bytes::from(sql)),
            Payload::Insert { body, .. } => body,
        };

        verbose!(url = %url, "request prepared");

        Ok(Prepared {
            request: HttpRequest { method: Method::Post, url, headers, body },
            guard,
            compressed,
            format: ctx.format(self.server_timezone()),
            query_tz: ctx.prefs().query_tz.is_some(),
            settings: parts.server.into_iter().collect(),
        })
    }

    /// Send once and read the whole response body.
    pub(crate) async fn round_trip(&self, prepared: Prepared) -> Result<(QuerySummary, Bytes)> {
        let Prepared { request, guard, settings, .. } = prepared;
        let _guard = guard;

        let response = self.send(request).await?;
        let summary = self.summary(&response, settings);
        let status = response.status;
        let code = exception_code(&response);
        let success = response.is_success();

        let body = collect(response.body).await?;
        if !success || response::is_exception(&body) {
            let err = ServerError::from_body(&body, status, code);
            #[cfg(feature = "log")]
            log::warn!("query {} failed: {err}", summary.query_id());
            return Err(err.into());
        }
        Ok((summary, body))
    }

    /// Read response metadata headers.
    pub(crate) fn summary(
        &self,
        response: &HttpResponse,
        settings: HashMap<String, String>,
    ) -> QuerySummary {
        if let Some(tz) = response.header(response::TIMEZONE).and_then(|tz| tz.parse().ok()) {
            self.observe_timezone(tz);
        }
        let mut summary = QuerySummary::from_header(
            response.header(response::QUERY_ID),
            response.header(response::SUMMARY),
        );
        summary.set_settings(settings);
        summary
    }
}

pub(crate) fn exception_code(response: &HttpResponse) -> Option<i32> {
    response.header(response::EXCEPTION_CODE).and_then(|c| c.trim().parse().ok())
}

/// Read the whole body.
pub(crate) async fn collect(mut body: BodyStream) -> Result<Bytes, ConnectionError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = poll_fn(|cx| body.as_mut().poll_next(cx)).await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.shared.base_url.as_str())
            .field("session_id", &self.shared.session_id)
            .finish_non_exhaustive()
    }
}
