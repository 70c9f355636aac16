//! API Router
//!
//! Maps a request method and path onto a [`Route`]. Static segments win over
//! the `{objectID}` parameter, so `/files/many` never resolves to an object
//! named `many`.

use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteError {
    #[error("No route for {0}")]
    NotFound(String),

    #[error("Method {method} not allowed for {path}")]
    MethodNotAllowed {
        method: String,
        path: String,
        /// Methods the path accepts, formatted for an `Allow` header
        allow: &'static str,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// API operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// GET /health
    Health,
    /// POST /files
    CreateOne,
    /// POST /files/many
    CreateMany,
    /// GET /files/many
    GetMany,
    /// DELETE /files/many
    DeleteMany,
    /// GET /files/{objectID}
    GetOne { object_id: String },
    /// DELETE /files/{objectID}
    DeleteOne { object_id: String },
}

impl Route {
    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Route::Health => "health",
            Route::CreateOne => "create_one",
            Route::CreateMany => "create_many",
            Route::GetMany => "get_many",
            Route::DeleteMany => "delete_many",
            Route::GetOne { .. } => "get_one",
            Route::DeleteOne { .. } => "delete_one",
        }
    }
}

/// Request parser
pub struct RequestRouter;

impl RequestRouter {
    /// Resolve a request to a route
    pub fn parse(method: &str, path: &str) -> Result<Route, RouteError> {
        let not_allowed = |allow| RouteError::MethodNotAllowed {
            method: method.to_string(),
            path: path.to_string(),
            allow,
        };

        if path == "/health" {
            return match method {
                "GET" => Ok(Route::Health),
                _ => Err(not_allowed("GET")),
            };
        }

        let rest = match path.strip_prefix("/files") {
            Some(rest) => rest,
            None => return Err(RouteError::NotFound(path.to_string())),
        };

        match rest {
            "" | "/" => match method {
                "POST" => Ok(Route::CreateOne),
                _ => Err(not_allowed("POST")),
            },
            "/many" | "/many/" => match method {
                "POST" => Ok(Route::CreateMany),
                "GET" => Ok(Route::GetMany),
                "DELETE" => Ok(Route::DeleteMany),
                _ => Err(not_allowed("GET, POST, DELETE")),
            },
            _ => {
                let segment = match rest.strip_prefix('/') {
                    Some(segment) if !segment.contains('/') => segment,
                    _ => return Err(RouteError::NotFound(path.to_string())),
                };
                let object_id = decode_segment(segment)?;

                match method {
                    "GET" => Ok(Route::GetOne { object_id }),
                    "DELETE" => Ok(Route::DeleteOne { object_id }),
                    _ => Err(not_allowed("GET, DELETE")),
                }
            }
        }
    }
}

fn decode_segment(segment: &str) -> Result<String, RouteError> {
    let decoded = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|e| RouteError::InvalidPath(format!("object id is not valid UTF-8: {}", e)))?;

    if decoded.is_empty() {
        return Err(RouteError::InvalidPath("object id must not be empty".into()));
    }

    Ok(decoded.into_owned())
}
