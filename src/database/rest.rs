use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use url::Url;

use crate::database::backend::{StoreBackend, Versioned};
use crate::database::error::{
    internal_error, invalid_argument, permission_denied, version_mismatch, DatabaseError,
    DatabaseResult,
};
use crate::database::listeners::{ListenerHub, ListenerId, ValueCallback};
use crate::database::query::QueryParams;
use crate::database::tree::{delete_at_path, join_path, set_at_path, split_path};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("@firebase-bridge/database"));

/// Supplies the ID token appended as `auth=` to each request.
pub type TokenFetcher = Arc<dyn Fn() -> DatabaseResult<Option<String>> + Send + Sync>;

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";
const ETAG_HEADER: &str = "ETag";
const IF_MATCH_HEADER: &str = "if-match";

/// Realtime Database REST API client.
///
/// Values are read and written as `<base>/<path>.json`. Listeners open a
/// server-sent event stream per registration and mirror the streamed node
/// locally.
pub struct RestStoreBackend {
    client: Client,
    stream_client: Client,
    base_url: Url,
    base_query: Vec<(String, String)>,
    auth_token_fetcher: TokenFetcher,
    runtime: Handle,
    listeners: Arc<ListenerHub>,
    streams: Mutex<HashMap<ListenerId, JoinHandle<()>>>,
}

impl RestStoreBackend {
    pub fn new(
        raw_url: &str,
        auth_token_fetcher: TokenFetcher,
        runtime: Handle,
        timeout: Duration,
    ) -> DatabaseResult<Self> {
        let mut url = Url::parse(raw_url)
            .map_err(|err| invalid_argument(format!("Invalid database_url '{raw_url}': {err}")))?;

        if !url.path().ends_with('/') {
            let mut path = url.path().trim_end_matches('/').to_owned();
            path.push('/');
            url.set_path(&path);
        }

        let base_query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| internal_error(format!("Failed to build HTTP client: {err}")))?;
        // Event streams stay open indefinitely, so only the connect phase is bounded.
        let stream_client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|err| internal_error(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            stream_client,
            base_url: url,
            base_query,
            auth_token_fetcher,
            runtime,
            listeners: Arc::new(ListenerHub::new()),
            streams: Mutex::new(HashMap::new()),
        })
    }

    fn url_for_path(&self, path: &[String], query: &[(String, String)]) -> DatabaseResult<Url> {
        let relative = if path.is_empty() {
            ".json".to_string()
        } else {
            format!("{}.json", join_path(path))
        };
        let mut url = self
            .base_url
            .join(&relative)
            .map_err(|err| internal_error(format!("Failed to compose database URL: {err}")))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in self.base_query.iter().chain(query.iter()) {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn query_with_token(&self, query: &[(String, String)]) -> DatabaseResult<Vec<(String, String)>> {
        let mut params = query.to_vec();
        if !params.iter().any(|(key, _)| key == "auth") {
            if let Some(token) = (self.auth_token_fetcher.as_ref())()? {
                params.push(("auth".to_string(), token));
            }
        }
        Ok(params)
    }

    fn request(
        &self,
        client: &Client,
        method: Method,
        path: &[String],
        query: &[(String, String)],
    ) -> DatabaseResult<RequestBuilder> {
        let query = self.query_with_token(query)?;
        let url = self.url_for_path(path, &query)?;
        Ok(client.request(method, url))
    }

    async fn send(&self, request: RequestBuilder) -> DatabaseResult<Response> {
        request.send().await.map_err(handle_reqwest_error)
    }

    async fn write(&self, method: Method, path: &[String], body: Option<&Value>) -> DatabaseResult<()> {
        let silent = [("print".to_string(), "silent".to_string())];
        let mut request = self.request(&self.client, method.clone(), path, &silent)?;
        if let Some(payload) = body {
            request = request.json(payload);
        }
        let response = self.send(request).await?;
        if method == Method::DELETE && response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(response).await.map(|_| ())
    }

    async fn read(&self, path: &[String], query: &[(String, String)]) -> DatabaseResult<Option<Value>> {
        let request = self.request(&self.client, Method::GET, path, query)?;
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|err| internal_error(format!("Failed to decode database response: {err}")))?;
        Ok(present(value))
    }

    async fn open_stream(&self, path: &[String]) -> DatabaseResult<Response> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        let request = self
            .request(&self.stream_client, Method::GET, path, &[])?
            .headers(headers);
        let response = self.send(request).await?;
        ensure_success(response).await
    }
}

#[async_trait]
impl StoreBackend for RestStoreBackend {
    async fn set(&self, path: &[String], value: Value) -> DatabaseResult<()> {
        self.write(Method::PUT, path, Some(&value)).await
    }

    async fn update(&self, path: &[String], updates: Map<String, Value>) -> DatabaseResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        for key in updates.keys() {
            if split_path(key)?.is_empty() {
                return Err(invalid_argument("Database update path cannot be empty"));
            }
        }
        self.write(Method::PATCH, path, Some(&Value::Object(updates)))
            .await
    }

    async fn delete(&self, path: &[String]) -> DatabaseResult<()> {
        self.write(Method::DELETE, path, None).await
    }

    async fn get(&self, path: &[String]) -> DatabaseResult<Option<Value>> {
        self.read(path, &[]).await
    }

    async fn query(&self, path: &[String], params: &QueryParams) -> DatabaseResult<Option<Value>> {
        let rest_params = params.to_rest_params()?;
        self.read(path, &rest_params).await
    }

    async fn get_versioned(&self, path: &[String]) -> DatabaseResult<Versioned> {
        let request = self
            .request(&self.client, Method::GET, path, &[])?
            .header(ETAG_REQUEST_HEADER, "true");
        let response = ensure_success(self.send(request).await?).await?;
        let etag = response
            .headers()
            .get(ETAG_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| internal_error("Database response did not carry an ETag"))?;
        let value: Value = response
            .json()
            .await
            .map_err(|err| internal_error(format!("Failed to decode database response: {err}")))?;
        Ok(Versioned {
            value: present(value),
            etag,
        })
    }

    async fn compare_and_set(
        &self,
        path: &[String],
        expected_etag: &str,
        value: Option<Value>,
    ) -> DatabaseResult<bool> {
        let method = if value.is_some() {
            Method::PUT
        } else {
            Method::DELETE
        };
        let mut request = self
            .request(&self.client, method, path, &[])?
            .header(IF_MATCH_HEADER, expected_etag);
        if let Some(payload) = &value {
            request = request.json(payload);
        }
        let response = self.send(request).await?;
        if response.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(false);
        }
        ensure_success(response).await.map(|_| true)
    }

    async fn listen(&self, path: &[String], callback: ValueCallback) -> DatabaseResult<ListenerId> {
        let response = self.open_stream(path).await?;
        let id = self.listeners.register(path.to_vec(), callback);
        let hub = Arc::clone(&self.listeners);
        let location = join_path(path);
        let task = self.runtime.spawn(async move {
            match pump_events(response.bytes_stream(), &hub, id).await {
                Ok(()) => LOGGER.debug(format!("Event stream for '{location}' closed")),
                Err(err) => LOGGER.warn(format!("Event stream for '{location}' failed: {err}")),
            }
        });
        self.streams.lock().unwrap().insert(id, task);
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) -> bool {
        if let Some(task) = self.streams.lock().unwrap().remove(&id) {
            task.abort();
        }
        self.listeners.remove(id)
    }

    fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Drop for RestStoreBackend {
    fn drop(&mut self) {
        if let Ok(mut streams) = self.streams.lock() {
            for (_, task) in streams.drain() {
                task.abort();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    path: String,
    data: Value,
}

/// Consumes `text/event-stream` frames, applying `put`/`patch` events to a
/// local copy of the listened node and delivering each new state.
async fn pump_events<S, B>(stream: S, hub: &ListenerHub, id: ListenerId) -> DatabaseResult<()>
where
    S: Stream<Item = reqwest::Result<B>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut frames = FrameBuffer::default();
    let mut node = Value::Null;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(handle_reqwest_error)?;
        frames.push(chunk.as_ref());

        while let Some(frame) = frames.next_frame() {
            let Some((event, data)) = parse_frame(&frame) else {
                continue;
            };
            match event.as_str() {
                "put" | "patch" => {
                    let payload: StreamPayload = serde_json::from_str(&data).map_err(|err| {
                        internal_error(format!("Malformed {event} event: {err}"))
                    })?;
                    apply_event(&mut node, &event, payload)?;
                    hub.deliver(id, present(node.clone()));
                }
                "keep-alive" => {}
                "cancel" => return Err(permission_denied("Listener cancelled by the server")),
                "auth_revoked" => return Err(permission_denied("Listener credential revoked")),
                other => LOGGER.debug(format!("Ignoring event stream frame '{other}'")),
            }
        }
    }
    Ok(())
}

/// Raw stream bytes held until a whole frame has arrived. Chunks may end in
/// the middle of a UTF-8 sequence, so text is decoded per frame.
#[derive(Default)]
struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, chunk: &[u8]) {
        self.pending
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));
    }

    fn next_frame(&mut self) -> Option<String> {
        let end = self
            .pending
            .windows(2)
            .position(|pair| pair == b"\n\n")?;
        let frame: Vec<u8> = self.pending.drain(..end + 2).collect();
        Some(String::from_utf8_lossy(&frame).into_owned())
    }
}

fn parse_frame(frame: &str) -> Option<(String, String)> {
    let mut event = None;
    let mut data = Vec::new();
    for line in frame.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.trim_start());
        }
    }
    Some((event?, data.join("\n")))
}

fn apply_event(node: &mut Value, event: &str, payload: StreamPayload) -> DatabaseResult<()> {
    let base = split_path(&payload.path)?;
    if event == "put" {
        if base.is_empty() && payload.data.is_null() {
            *node = Value::Null;
        } else {
            set_at_path(node, &base, payload.data);
        }
        return Ok(());
    }

    let Value::Object(children) = payload.data else {
        return Err(internal_error("patch event data must be an object"));
    };
    for (key, value) in children {
        let mut target = base.clone();
        target.extend(split_path(&key)?);
        if value.is_null() {
            delete_at_path(node, &target);
        } else {
            set_at_path(node, &target, value);
        }
    }
    Ok(())
}

// `null` and `{}` both mean the node does not exist.
fn present(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(ref map) if map.is_empty() => None,
        other => Some(other),
    }
}

async fn ensure_success(response: Response) -> DatabaseResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.ok();
        Err(handle_http_error(status, body))
    }
}

fn handle_reqwest_error(err: reqwest::Error) -> DatabaseError {
    if let Some(status) = err.status() {
        return handle_http_error(status, None);
    }
    internal_error(format!("Database request failed: {err}"))
}

fn handle_http_error(status: StatusCode, body: Option<String>) -> DatabaseError {
    let message = body.as_deref().and_then(extract_error_message);

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            invalid_argument(message.unwrap_or_else(|| "Invalid data payload".to_string()))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            permission_denied(message.unwrap_or_else(|| "Permission denied".to_string()))
        }
        StatusCode::PRECONDITION_FAILED => {
            version_mismatch(message.unwrap_or_else(|| "Node changed concurrently".to_string()))
        }
        _ => internal_error(format!(
            "Database request failed with status {}{}",
            status.as_str(),
            message.map(|b| format!(": {b}")).unwrap_or_default()
        )),
    }
}

fn extract_error_message(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        if let Some(Value::String(message)) = obj.get("error") {
            return Some(message.clone());
        }
    }
    Some(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn static_token(value: &'static str) -> TokenFetcher {
        Arc::new(move || Ok(Some(value.to_string())))
    }

    fn empty_token() -> TokenFetcher {
        Arc::new(|| Ok(None))
    }

    fn backend(server: &MockServer, token: TokenFetcher) -> RestStoreBackend {
        RestStoreBackend::new(
            &server.url("/"),
            token,
            Handle::current(),
            Duration::from_secs(5),
        )
        .expect("rest backend")
    }

    fn segs(path: &str) -> Vec<String> {
        split_path(path).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn get_attaches_auth_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/items.json")
                    .query_param("auth", "id-token");
                then.status(200).body("{\"a\":1}");
            })
            .await;

        let value = backend(&server, static_token("id-token"))
            .get(&segs("items"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value, Some(json!({"a": 1})));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn writes_are_silent_and_skip_missing_tokens() {
        let server = MockServer::start_async().await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/data.json")
                    .query_param("print", "silent")
                    .json_body(json!({"value": true}));
                then.status(204);
            })
            .await;
        let patch = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::PATCH)
                    .path("/data.json")
                    .json_body(json!({"b": 2}));
                then.status(204);
            })
            .await;

        let backend = backend(&server, empty_token());
        backend
            .set(&segs("data"), json!({"value": true}))
            .await
            .unwrap();
        backend
            .update(&segs("data"), json!({"b": 2}).as_object().unwrap().clone())
            .await
            .unwrap();

        put.assert_async().await;
        patch.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_nodes_read_as_none_and_errors_map_to_codes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/empty.json");
                then.status(200).body("null");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/secret.json");
                then.status(401).body("{\"error\":\"Permission denied\"}");
            })
            .await;

        let backend = backend(&server, empty_token());
        assert_eq!(backend.get(&segs("empty")).await.unwrap(), None);
        let err = backend.get(&segs("secret")).await.unwrap_err();
        assert_eq!(err.message(), "Permission denied");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_sends_rest_parameters() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/scores.json")
                    .query_param("orderBy", "\"score\"")
                    .query_param("startAt", "10")
                    .query_param("limitToFirst", "2");
                then.status(200).body("{\"bob\":{\"score\":10}}");
            })
            .await;

        let params = QueryParams::order_by_child("score")
            .unwrap()
            .start_at(10)
            .limit_to_first(2);
        let value = backend(&server, empty_token())
            .query(&segs("scores"), &params)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(value, Some(json!({"bob": {"score": 10}})));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn compare_and_set_uses_etags() {
        let server = MockServer::start_async().await;
        let read = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/counter.json")
                    .header("X-Firebase-ETag", "true");
                then.status(200).header("ETag", "v1").body("3");
            })
            .await;
        let accepted = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/counter.json")
                    .header("if-match", "v1")
                    .body("4");
                then.status(200).body("4");
            })
            .await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/counter.json")
                    .header("if-match", "stale");
                then.status(412).header("ETag", "v2").body("5");
            })
            .await;

        let backend = backend(&server, empty_token());
        let versioned = backend.get_versioned(&segs("counter")).await.unwrap();
        assert_eq!(versioned.etag, "v1");
        assert_eq!(versioned.value, Some(json!(3)));
        assert!(backend
            .compare_and_set(&segs("counter"), "v1", Some(json!(4)))
            .await
            .unwrap());
        assert!(!backend
            .compare_and_set(&segs("counter"), "stale", Some(json!(9)))
            .await
            .unwrap());

        read.assert_async().await;
        accepted.assert_async().await;
        rejected.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn event_stream_updates_listener() {
        let server = MockServer::start_async().await;
        let body = concat!(
            "event: put\n",
            "data: {\"path\":\"/\",\"data\":{\"a\":1}}\n\n",
            "event: keep-alive\n",
            "data: null\n\n",
            "event: patch\n",
            "data: {\"path\":\"/\",\"data\":{\"b\":2}}\n\n",
            "event: put\n",
            "data: {\"path\":\"/a\",\"data\":null}\n\n",
        );
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/room.json")
                    .header("accept", "text/event-stream");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(body);
            })
            .await;

        let backend = backend(&server, empty_token());
        let (tx, rx) = std::sync::mpsc::channel();
        let id = backend
            .listen(
                &segs("room"),
                Arc::new(move |value: Option<&Value>| {
                    let _ = tx.send(value.cloned());
                }),
            )
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Some(json!({"a": 1})),
                Some(json!({"a": 1, "b": 2})),
                Some(json!({"b": 2})),
            ]
        );
        assert_eq!(backend.listener_count(), 1);
        assert!(backend.unlisten(id));
        assert_eq!(backend.listener_count(), 0);
    }

    #[test]
    fn frames_wait_for_split_characters() {
        let text = "event: put\r\ndata: {\"path\":\"/\",\"data\":\"Jos\u{e9}\"}\r\n\r\n";
        let bytes = text.as_bytes();
        let split = text.find('\u{e9}').unwrap() + 1;

        let mut frames = FrameBuffer::default();
        frames.push(&bytes[..split]);
        assert_eq!(frames.next_frame(), None);
        frames.push(&bytes[split..]);
        assert_eq!(
            frames.next_frame().as_deref(),
            Some("event: put\ndata: {\"path\":\"/\",\"data\":\"Jos\u{e9}\"}\n\n")
        );
        assert_eq!(frames.next_frame(), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn multibyte_text_survives_chunk_boundaries() {
        let body = "event: put\ndata: {\"path\":\"/\",\"data\":{\"name\":\"Jos\u{e9}\"}}\n\n";
        let split = body.find('\u{e9}').unwrap() + 1;
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(body.as_bytes()[..split].to_vec()),
            Ok(body.as_bytes()[split..].to_vec()),
        ];

        let hub = ListenerHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = hub.register(
            segs("people/1"),
            Arc::new(move |value: Option<&Value>| sink.lock().unwrap().push(value.cloned())),
        );

        pump_events(futures::stream::iter(chunks), &hub, id)
            .await
            .unwrap();
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[Some(json!({"name": "Jos\u{e9}"}))]
        );
    }

    #[test]
    fn frames_without_event_are_skipped() {
        assert_eq!(parse_frame("data: 1\n\n"), None);
        assert_eq!(
            parse_frame("event: put\ndata: {}\n\n"),
            Some(("put".to_string(), "{}".to_string()))
        );
    }
}
