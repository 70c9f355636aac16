//! Request handlers
//!
//! Decodes each request into the input of an [`ObjectService`] operation and
//! serializes the outcome into the JSON envelopes of [`super::response`].
//!
//! | Route | Input | Success message |
//! |-------|-------|-----------------|
//! | `POST /files` | multipart field `file` | `File uploaded successfully` |
//! | `POST /files/many` | multipart fields `files` | `Files uploaded successfully` |
//! | `GET /files/{id}` | path | `File received successfully` |
//! | `GET /files/many` | `{"objectIDs": [...]}` | `Files received successfully` |
//! | `DELETE /files/{id}` | path | `File deleted successfully` |
//! | `DELETE /files/many` | `{"objectIDs": [...]}` | `Files deleted successfully` |

use crate::batch::BatchError;
use crate::metrics;
use crate::objects::{BulkError, FilePayload, ObjectService};
use crate::router::{RequestRouter, Route};
use crate::server::multipart::{extract_boundary, parse_multipart, MultipartForm};
use crate::server::response::{json_response, route_error_response, success, ApiError, LinkData};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Multipart field carrying the single upload
pub const FILE_FIELD: &str = "file";

/// Multipart field carrying each bulk upload
pub const FILES_FIELD: &str = "files";

/// State shared by every connection
pub struct AppState {
    pub service: ObjectService,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(service: ObjectService, max_body_bytes: usize) -> Self {
        Self {
            service,
            max_body_bytes,
        }
    }
}

/// Body of the bulk fetch and bulk delete routes
#[derive(Debug, Deserialize)]
struct ObjectIdsRequest {
    #[serde(rename = "objectIDs")]
    object_ids: Vec<String>,
}

/// Handle one request; failures become JSON error responses
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("Handling {} {}", method, path);

    let route = match RequestRouter::parse(method.as_str(), &path) {
        Ok(route) => route,
        Err(e) => {
            info!("No route for {} {}: {}", method, path, e);
            return Ok(route_error_response(e));
        }
    };

    let response = match dispatch(route, req, &state).await {
        Ok(response) => response,
        Err(e) => {
            if e.status.is_server_error() {
                warn!(status = %e.status, details = ?e.details, "{} {} failed: {}", method, path, e.message);
            } else {
                info!(status = %e.status, details = ?e.details, "{} {} rejected: {}", method, path, e.message);
            }
            metrics::record_error(e.kind());
            e.into_response()
        }
    };

    Ok(response)
}

async fn dispatch<B>(
    route: Route,
    req: Request<B>,
    state: &AppState,
) -> Result<Response<Full<Bytes>>, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let service = &state.service;

    match route {
        Route::Health => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "ok" }),
        )),

        Route::CreateOne => {
            let form = read_form(req, state.max_body_bytes).await?;
            let file = form
                .file(FILE_FIELD)
                .ok_or_else(|| ApiError::bad_request("No file is received"))?;

            let created = service
                .create_one(file.data.clone())
                .await
                .map_err(|e| ApiError::from_object_error(&e, "Unable to save the file"))?;

            info!(object_id = %created.object_id, "File uploaded");
            Ok(success(
                "File uploaded successfully",
                Some(LinkData::from(created)),
            ))
        }

        Route::CreateMany => {
            let form = read_form(req, state.max_body_bytes).await?;
            let files: Vec<FilePayload> = form
                .into_files(FILES_FIELD)
                .into_iter()
                .filter_map(|part| {
                    Some(FilePayload {
                        filename: part.filename?,
                        data: part.data,
                    })
                })
                .collect();
            if files.is_empty() {
                return Err(ApiError::bad_request("No files are received"));
            }

            let created = service
                .create_many(files)
                .await
                .map_err(|e| bulk_error(&e, "Unable to save the files"))?;

            let data: Vec<LinkData> = created.into_iter().map(LinkData::from).collect();
            Ok(success("Files uploaded successfully", Some(data)))
        }

        Route::GetOne { object_id } => {
            let link = service
                .get_one(&object_id)
                .await
                .map_err(|e| ApiError::from_object_error(&e, "Unable to get the object"))?;

            Ok(success("File received successfully", Some(link.url)))
        }

        Route::GetMany => {
            let request = read_object_ids(req, state.max_body_bytes).await?;
            let links = service
                .get_many(request.object_ids)
                .await
                .map_err(|e| bulk_error(&e, "Unable to get many objects"))?;

            let data: Vec<LinkData> = links.into_iter().map(LinkData::from).collect();
            Ok(success("Files received successfully", Some(data)))
        }

        Route::DeleteOne { object_id } => {
            service
                .delete_one(&object_id)
                .await
                .map_err(|e| ApiError::from_object_error(&e, "Cannot delete the object"))?;

            info!(object_id = %object_id, "File deleted");
            Ok(success::<()>("File deleted successfully", None))
        }

        Route::DeleteMany => {
            let request = read_object_ids(req, state.max_body_bytes).await?;
            let deleted = service
                .delete_many(request.object_ids)
                .await
                .map_err(|e| bulk_error(&e, "Cannot delete many objects"))?;

            info!(count = deleted.len(), "Files deleted");
            Ok(success::<()>("Files deleted successfully", None))
        }
    }
}

/// Map the aggregated failure of a bulk operation
fn bulk_error(err: &BulkError, message: &str) -> ApiError {
    match err {
        BatchError::Item { source, .. } => {
            ApiError::from_object_error(source, message).with_details(err)
        }
        BatchError::Worker(_) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message).with_details(err)
        }
    }
}

/// Collect the body, rejecting anything over `limit` bytes
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
        )
        .with_details(format!("limit is {} bytes", limit))),
        Err(e) => Err(ApiError::bad_request("Failed to read request body").with_details(e)),
    }
}

async fn read_form<B>(req: Request<B>, limit: usize) -> Result<MultipartForm, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let boundary = extract_boundary(&content_type)?;

    let body = read_body(req.into_body(), limit).await?;
    Ok(parse_multipart(&body, &boundary)?)
}

async fn read_object_ids<B>(req: Request<B>, limit: usize) -> Result<ObjectIdsRequest, ApiError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let body = read_body(req.into_body(), limit).await?;
    serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("Invalid request body").with_details(e))
}
