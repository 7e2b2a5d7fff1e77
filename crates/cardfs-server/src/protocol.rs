//! Transport-neutral request, reply and error types.
//!
//! The dispatcher speaks only these types; [`crate::http`] maps them to
//! and from the HTTP server.

use futures::{Stream, StreamExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use thiserror::Error;

use cardfs_kernel::{Download, PathError, TransferError, Upload, VfsError};

use crate::constants::AUTH_REALM;

/// An incoming request, as far as the dispatcher cares.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// URL path, still percent-encoded.
    pub path: String,
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a header; values that are not valid header text are dropped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Declared body length, from `Content-Length`.
    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH)?.trim().parse().ok()
    }

    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A fixed-body reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        self.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn header(&self, name: HeaderName) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// What the dispatcher hands back to the transport.
#[derive(Debug)]
pub enum Outcome {
    /// Send this reply as is.
    Reply(Reply),
    /// Send `200 OK` with these headers and stream the download as body.
    Download { headers: HeaderMap, download: Download },
    /// Feed the request body to the session; it produces the reply.
    Upload(UploadSession),
}

impl Outcome {
    /// Status of a fixed reply, if this is one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Outcome::Reply(reply) => Some(reply.status),
            Outcome::Download { .. } => Some(StatusCode::OK),
            Outcome::Upload(_) => None,
        }
    }
}

/// Per-request failure, classified by the status it produces.
///
/// Messages never carry volume paths; details go to the log.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("authorization required")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed { allow: String },

    #[error("conflict")]
    Conflict,

    #[error("length required")]
    LengthRequired,

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("insufficient storage")]
    InsufficientStorage,

    #[error("internal error")]
    Internal,
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Unauthorized => StatusCode::UNAUTHORIZED,
            DispatchError::Forbidden => StatusCode::FORBIDDEN,
            DispatchError::NotFound => StatusCode::NOT_FOUND,
            DispatchError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            DispatchError::Conflict => StatusCode::CONFLICT,
            DispatchError::LengthRequired => StatusCode::LENGTH_REQUIRED,
            DispatchError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DispatchError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            DispatchError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn into_reply(self) -> Reply {
        let status = self.status();
        let mut reply = Reply::new(status).with_body("text/plain; charset=utf-8", self.to_string());
        match self {
            DispatchError::Unauthorized => {
                let challenge = format!("Basic realm=\"{}\"", AUTH_REALM);
                if let Ok(value) = HeaderValue::from_str(&challenge) {
                    reply.headers.insert(header::WWW_AUTHENTICATE, value);
                }
            }
            DispatchError::MethodNotAllowed { allow } => {
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    reply.headers.insert(header::ALLOW, value);
                }
            }
            _ => {}
        }
        reply
    }

    /// Classify a storage failure where "missing" means 404.
    pub fn from_lookup(err: &VfsError) -> Self {
        if err.is_not_found() {
            DispatchError::NotFound
        } else {
            Self::from_storage(err)
        }
    }

    /// Classify a storage failure with no verb-specific meaning.
    pub fn from_storage(err: &VfsError) -> Self {
        match err {
            VfsError::PermissionDenied(_) | VfsError::ReadOnly | VfsError::PathEscapesRoot(_) => {
                DispatchError::Forbidden
            }
            e if e.is_storage_full() => DispatchError::InsufficientStorage,
            e => {
                tracing::warn!("storage error: {}", e);
                DispatchError::Internal
            }
        }
    }
}

impl From<PathError> for DispatchError {
    fn from(err: PathError) -> Self {
        tracing::debug!("rejected request path: {}", err);
        DispatchError::Forbidden
    }
}

impl From<TransferError> for DispatchError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::InsufficientStorage { .. } | TransferError::ShortWrite { .. } => {
                tracing::debug!("{}", err);
                DispatchError::InsufficientStorage
            }
            // Open failures are server errors unless the medium is full
            TransferError::OpenFailed(e) if e.is_storage_full() => {
                DispatchError::InsufficientStorage
            }
            TransferError::OpenFailed(e) => {
                tracing::warn!("upload open failed: {}", e);
                DispatchError::Internal
            }
            TransferError::Vfs(e) => DispatchError::from_storage(&e),
            other => {
                tracing::warn!("transfer failed: {}", other);
                DispatchError::Internal
            }
        }
    }
}

/// The upload half of a PUT: consumes the body, then yields the reply.
///
/// Exactly one reply comes out of a session: [`finish`] and [`abort`]
/// consume it, and a failed [`push`] returns the error reply to send.
///
/// [`finish`]: UploadSession::finish
/// [`abort`]: UploadSession::abort
/// [`push`]: UploadSession::push
#[derive(Debug)]
pub struct UploadSession {
    upload: Upload,
}

impl UploadSession {
    pub fn new(upload: Upload) -> Self {
        Self { upload }
    }

    pub fn expected(&self) -> u64 {
        self.upload.expected()
    }

    pub fn received(&self) -> u64 {
        self.upload.received()
    }

    /// Store the next piece of body. On error the partial file is already
    /// gone and the returned reply is the response.
    pub async fn push(&mut self, data: &[u8]) -> Result<(), Reply> {
        self.upload
            .push(data)
            .await
            .map_err(|e| DispatchError::from(e).into_reply())
    }

    /// The body ended: `201 Created` if every declared byte arrived.
    pub async fn finish(self) -> Reply {
        match self.upload.finish().await {
            Ok(_) => Reply::new(StatusCode::CREATED),
            Err(e) => DispatchError::from(e).into_reply(),
        }
    }

    /// The client went away or the body failed: remove the partial file.
    pub async fn abort(self) -> Reply {
        self.upload.abort().await;
        DispatchError::Internal.into_reply()
    }

    /// Feed a whole body stream through the session.
    pub async fn drive<S, B, E>(mut self, body: S) -> Reply
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: std::fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    if let Err(reply) = self.push(bytes.as_ref()).await {
                        return reply;
                    }
                }
                Err(e) => {
                    tracing::warn!("upload body failed: {}", e);
                    return self.abort().await;
                }
            }
        }
        self.finish().await
    }
}
