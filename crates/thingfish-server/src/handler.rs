//! Route handlers.
//!
//! Each handler decodes the request, runs the blocking store work on the
//! blocking pool, and encodes the result. No storage rules live here.

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use thingfish_datastore::DatastoreError;
use thingfish_handler::{
    FetchOutcome, Handler, HandlerError, HandlerResult, Oid, PropertyMap, PropertyValue,
    RequestContext, SearchQuery,
};

use crate::error::{ServerError, ServerResult};

const DEFAULT_FORMAT: &str = "application/octet-stream";

/// Health check handler.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "name": "thingfish",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn blocking<T, F>(handler: &Handler, f: F) -> ServerResult<T>
where
    F: FnOnce(&Handler) -> HandlerResult<T> + Send + 'static,
    T: Send + 'static,
{
    let handler = handler.clone();
    tokio::task::spawn_blocking(move || f(&handler))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {e}")))?
        .map_err(ServerError::from)
}

fn parse_oid(raw: &str) -> ServerResult<Oid> {
    Oid::parse(raw).map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn request_context(
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    length: usize,
) -> RequestContext {
    RequestContext {
        content_type: header_str(headers, header::CONTENT_TYPE),
        content_length: Some(length as u64),
        user_agent: header_str(headers, header::USER_AGENT),
        remote_addr: peer.map(|ConnectInfo(addr)| addr.ip().to_string()),
    }
}

/// Query parameters on an upload become text properties.
fn text_properties(params: BTreeMap<String, String>) -> PropertyMap {
    params
        .into_iter()
        .map(|(k, v)| (k, PropertyValue::text(v)))
        .collect()
}

fn json_properties(body: Map<String, Value>) -> ServerResult<PropertyMap> {
    body.into_iter()
        .map(|(key, value)| {
            PropertyValue::from_json(&value)
                .map(|v| (key.clone(), v))
                .map_err(|e| ServerError::BadRequest(format!("{key}: {e}")))
        })
        .collect()
}

fn properties_json(properties: &PropertyMap) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

fn etag_headers(checksum: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = checksum.and_then(|c| HeaderValue::from_str(&format!("\"{c}\"")).ok()) {
        headers.insert(header::ETAG, value);
    }
    headers
}

// ---- content ----

pub async fn create_object(
    State(state): State<Handler>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let ctx = request_context(&headers, peer, body.len());
    let metadata = text_properties(params);
    let (oid, checksum) = blocking(&state, move |h| {
        let oid = h.store(&mut Cursor::new(body), metadata, &ctx)?;
        Ok((oid, h.proxy(oid).checksum()?))
    })
    .await?;

    let mut headers = etag_headers(checksum.as_deref());
    if let Ok(location) = HeaderValue::from_str(&format!("/{oid}")) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(json!({ "oid": oid }))).into_response())
}

enum Fetched {
    NotModified(String),
    Content {
        data: Vec<u8>,
        format: Option<String>,
        checksum: Option<String>,
    },
}

pub async fn fetch_object(
    State(state): State<Handler>,
    Path(oid): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let oid = parse_oid(&oid)?;
    let tag = header_str(&headers, header::IF_NONE_MATCH);
    let fetched = blocking(&state, move |h| match h.fetch(&oid, tag.as_deref())? {
        FetchOutcome::NotModified { checksum } => Ok(Fetched::NotModified(checksum)),
        FetchOutcome::Content(mut resource) => {
            let mut data = Vec::new();
            resource
                .content
                .read_to_end(&mut data)
                .map_err(|e| HandlerError::from(DatastoreError::from(e)))?;
            Ok(Fetched::Content {
                data,
                format: resource.format(),
                checksum: resource.checksum(),
            })
        }
    })
    .await?;

    Ok(match fetched {
        Fetched::NotModified(checksum) => {
            (StatusCode::NOT_MODIFIED, etag_headers(Some(&checksum))).into_response()
        }
        Fetched::Content { data, format, checksum } => {
            let mut headers = etag_headers(checksum.as_deref());
            let format = format
                .and_then(|f| HeaderValue::from_str(&f).ok())
                .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_FORMAT));
            headers.insert(header::CONTENT_TYPE, format);
            (headers, data).into_response()
        }
    })
}

pub async fn replace_object(
    State(state): State<Handler>,
    Path(oid): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(params): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let oid = parse_oid(&oid)?;
    let ctx = request_context(&headers, peer, body.len());
    let metadata = text_properties(params);
    let checksum = blocking(&state, move |h| {
        h.replace(&oid, &mut Cursor::new(body), metadata, &ctx)?;
        Ok(h.proxy(oid).checksum()?)
    })
    .await?;
    Ok((StatusCode::NO_CONTENT, etag_headers(checksum.as_deref())).into_response())
}

pub async fn delete_object(
    State(state): State<Handler>,
    Path(oid): Path<String>,
) -> ServerResult<StatusCode> {
    let oid = parse_oid(&oid)?;
    blocking(&state, move |h| h.delete(&oid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- metadata ----

pub async fn fetch_metadata(
    State(state): State<Handler>,
    Path(oid): Path<String>,
) -> ServerResult<Json<Value>> {
    let oid = parse_oid(&oid)?;
    let properties = blocking(&state, move |h| h.fetch_metadata(&oid)).await?;
    Ok(Json(properties_json(&properties)))
}

pub async fn merge_metadata(
    State(state): State<Handler>,
    Path(oid): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> ServerResult<StatusCode> {
    let oid = parse_oid(&oid)?;
    let properties = json_properties(body)?;
    blocking(&state, move |h| h.merge_metadata(&oid, properties)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn replace_metadata(
    State(state): State<Handler>,
    Path(oid): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> ServerResult<StatusCode> {
    let oid = parse_oid(&oid)?;
    let properties = json_properties(body)?;
    blocking(&state, move |h| h.replace_metadata(&oid, properties)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_metadata(
    State(state): State<Handler>,
    Path(oid): Path<String>,
) -> ServerResult<StatusCode> {
    let oid = parse_oid(&oid)?;
    blocking(&state, move |h| h.reset_metadata(&oid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_property(
    State(state): State<Handler>,
    Path((oid, key)): Path<(String, String)>,
) -> ServerResult<StatusCode> {
    let oid = parse_oid(&oid)?;
    blocking(&state, move |h| h.remove_property(&oid, &key)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn related(
    State(state): State<Handler>,
    Path(oid): Path<String>,
) -> ServerResult<Json<Vec<Oid>>> {
    let oid = parse_oid(&oid)?;
    Ok(Json(blocking(&state, move |h| h.related(&oid)).await?))
}

// ---- search ----

/// Every query pair is a criterion except `order` (comma-separated keys)
/// and `limit`.
fn search_query(pairs: Vec<(String, String)>) -> ServerResult<SearchQuery> {
    let mut query = SearchQuery::new();
    for (key, value) in pairs {
        match key.as_str() {
            "order" => {
                for field in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                    query = query.order_by(field);
                }
            }
            "limit" => {
                let limit = value
                    .parse()
                    .map_err(|_| ServerError::BadRequest(format!("invalid limit {value:?}")))?;
                query = query.limit(limit);
            }
            _ => query = query.criterion(key, value),
        }
    }
    Ok(query)
}

pub async fn search(
    State(state): State<Handler>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ServerResult<Json<Vec<Oid>>> {
    let query = search_query(pairs)?;
    Ok(Json(blocking(&state, move |h| h.search(&query)).await?))
}
