//! Method dispatcher.
//!
//! Every request goes through the same steps: authorize, strip the URL
//! prefix, resolve the path under the served root, then run the verb.
//! Any failure along the way becomes a status code here; nothing below
//! the dispatcher ever reaches the transport as an error.

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;

use cardfs_kernel::{path, walk, Card, Download, FileEntry, TransferError, Upload, VolumeOps};

use crate::auth;
use crate::config::{ConfigError, ServerConfig};
use crate::constants::DAV_COMPLIANCE;
use crate::index;
use crate::multistatus;
use crate::protocol::{DispatchError, Outcome, Reply, Request, UploadSession};

const DEPTH: HeaderName = HeaderName::from_static("depth");
const DAV: HeaderName = HeaderName::from_static("dav");

/// A resolved request target.
#[derive(Debug)]
struct Target {
    /// Absolute path under the mount point.
    absolute: PathBuf,
    /// URL of the target without a trailing slash (empty for `/`).
    href: String,
    /// Decoded path below the served root, for display.
    display: String,
}

/// Routes requests to the card.
#[derive(Debug)]
pub struct Dispatcher {
    card: Arc<Card>,
    config: ServerConfig,
    served_root: PathBuf,
}

impl Dispatcher {
    pub fn new(card: Arc<Card>, config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let served_root = path::resolve(card.mount_point(), &config.root_path)
            .map_err(|e| ConfigError::Invalid(format!("root_path: {}", e)))?;
        Ok(Self {
            card,
            config,
            served_root,
        })
    }

    pub fn card(&self) -> &Arc<Card> {
        &self.card
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Handle one request. Always produces an outcome.
    pub async fn dispatch(&self, req: &Request) -> Outcome {
        match self.handle(req).await {
            Ok(outcome) => {
                if let Some(status) = outcome.status() {
                    tracing::debug!("{} {} -> {}", req.method, req.path, status);
                }
                outcome
            }
            Err(e) => {
                tracing::debug!("{} {} -> {} ({})", req.method, req.path, e.status(), e);
                Outcome::Reply(e.into_reply())
            }
        }
    }

    async fn handle(&self, req: &Request) -> Result<Outcome, DispatchError> {
        if !auth::is_authorized(self.config.credentials.as_ref(), &req.headers) {
            return Err(DispatchError::Unauthorized);
        }

        let target = self.resolve(&req.path)?;

        match req.method.as_str() {
            "OPTIONS" => Ok(Outcome::Reply(self.options())),
            "PROPFIND" => self.propfind(req, &target).await,
            "GET" => self.get(&target).await,
            "PUT" => self.put(req, &target).await,
            "DELETE" => self.delete(&target).await,
            "MKCOL" => self.mkcol(&target).await,
            _ => Err(self.not_allowed()),
        }
    }

    fn resolve(&self, url_path: &str) -> Result<Target, DispatchError> {
        let prefix = self.config.normalized_prefix();
        let rest = strip_url_prefix(prefix, url_path).ok_or(DispatchError::NotFound)?;
        let absolute = path::resolve(&self.served_root, rest)?;
        let display = path::relative_display(&self.served_root, &absolute).unwrap_or_default();
        let href = if display.is_empty() {
            prefix.to_string()
        } else {
            format!("{}/{}", prefix, multistatus::encode_path(&display))
        };
        Ok(Target {
            absolute,
            href,
            display: format!("/{}", display),
        })
    }

    fn route(&self, target: &Target) -> Result<(Arc<dyn VolumeOps>, PathBuf), DispatchError> {
        self.card
            .route(&target.absolute)
            .map_err(|e| DispatchError::from_storage(&e))
    }

    fn allowed_methods(&self) -> Vec<&'static str> {
        let mut methods = vec!["OPTIONS", "PROPFIND", "GET"];
        if self.config.enable_upload {
            methods.extend(["PUT", "MKCOL"]);
        }
        if self.config.enable_deletion {
            methods.push("DELETE");
        }
        methods
    }

    fn not_allowed(&self) -> DispatchError {
        DispatchError::MethodNotAllowed {
            allow: self.allowed_methods().join(", "),
        }
    }

    fn options(&self) -> Reply {
        let mut reply = Reply::new(StatusCode::OK);
        if let Ok(allow) = HeaderValue::from_str(&self.allowed_methods().join(", ")) {
            reply.headers.insert(header::ALLOW, allow);
        }
        reply.with_header(DAV, HeaderValue::from_static(DAV_COMPLIANCE))
    }

    async fn propfind(&self, req: &Request, target: &Target) -> Result<Outcome, DispatchError> {
        let depth = parse_depth(req.header(DEPTH), self.config.max_propfind_depth)?;
        let (volume, relative) = self.route(target)?;
        let attr = volume
            .stat(&relative)
            .await
            .map_err(|e| DispatchError::from_lookup(&e))?;

        let entries = match depth {
            Some(max_depth) if attr.is_dir() => walk(volume.as_ref(), &relative, max_depth)
                .await
                .map_err(|e| DispatchError::from_lookup(&e))?,
            _ => vec![FileEntry::from_attr("", &attr)],
        };

        let body = multistatus::render(&target.href, &entries);
        Ok(Outcome::Reply(
            Reply::new(StatusCode::MULTI_STATUS).with_body("application/xml; charset=utf-8", body),
        ))
    }

    async fn get(&self, target: &Target) -> Result<Outcome, DispatchError> {
        let (volume, relative) = self.route(target)?;
        let attr = volume
            .stat(&relative)
            .await
            .map_err(|e| DispatchError::from_lookup(&e))?;

        if attr.is_dir() {
            let entries = volume
                .list_one_level(&relative)
                .await
                .map_err(|e| DispatchError::from_lookup(&e))?;
            let html = index::render(&target.href, &target.display, &entries);
            return Ok(Outcome::Reply(
                Reply::new(StatusCode::OK).with_body("text/html; charset=utf-8", html),
            ));
        }

        if !self.config.enable_download {
            return Err(self.not_allowed());
        }

        let download = Download::open(volume.as_ref(), &relative)
            .await
            .map_err(|e| match e {
                TransferError::Vfs(e) => DispatchError::from_lookup(&e),
                other => other.into(),
            })?;

        let name = target.display.rsplit('/').next().unwrap_or_default();
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(index::content_type(name).essence_str()) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(download.total_size()));
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
        if let Ok(value) = HeaderValue::from_str(&content_disposition(name)) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }

        tracing::info!("sending {} ({} bytes)", target.display, download.total_size());
        Ok(Outcome::Download { headers, download })
    }

    async fn put(&self, req: &Request, target: &Target) -> Result<Outcome, DispatchError> {
        if !self.config.enable_upload {
            return Err(self.not_allowed());
        }
        let expected = req.content_length().ok_or(DispatchError::LengthRequired)?;
        let (volume, relative) = self.route(target)?;

        if relative.as_os_str().is_empty() {
            return Err(self.not_allowed());
        }
        if volume.read_only() {
            return Err(DispatchError::Forbidden);
        }
        if let Ok(attr) = volume.stat(&relative).await {
            if attr.is_dir() {
                return Err(self.not_allowed());
            }
        }

        let upload = Upload::begin(volume, relative, expected).await?;
        tracing::info!("receiving {} ({} bytes)", target.display, expected);
        Ok(Outcome::Upload(UploadSession::new(upload)))
    }

    async fn delete(&self, target: &Target) -> Result<Outcome, DispatchError> {
        if !self.config.enable_deletion {
            return Err(self.not_allowed());
        }
        let (volume, relative) = self.route(target)?;
        if relative.as_os_str().is_empty() {
            return Err(DispatchError::Forbidden);
        }

        let attr = volume
            .stat(&relative)
            .await
            .map_err(|e| DispatchError::from_lookup(&e))?;
        let removed = if attr.is_dir() {
            volume.rmdir(&relative).await
        } else {
            volume.remove(&relative).await
        };

        match removed {
            Ok(()) => {
                tracing::info!("deleted {}", target.display);
                Ok(Outcome::Reply(Reply::new(StatusCode::NO_CONTENT)))
            }
            Err(e) if e.is_not_found() => Err(DispatchError::NotFound),
            Err(e) => {
                tracing::debug!("delete {} refused: {}", target.display, e);
                Err(DispatchError::Forbidden)
            }
        }
    }

    async fn mkcol(&self, target: &Target) -> Result<Outcome, DispatchError> {
        if !self.config.enable_upload {
            return Err(self.not_allowed());
        }
        let (volume, relative) = self.route(target)?;
        if relative.as_os_str().is_empty() || volume.exists(&relative).await {
            return Err(self.not_allowed());
        }

        match volume.mkdir(&relative).await {
            Ok(()) => {
                tracing::info!("created collection {}", target.display);
                Ok(Outcome::Reply(Reply::new(StatusCode::CREATED)))
            }
            Err(e) if e.is_already_exists() => Err(self.not_allowed()),
            Err(e) => {
                tracing::debug!("mkcol {} failed: {}", target.display, e);
                Err(DispatchError::Conflict)
            }
        }
    }
}

/// The part of `url_path` under `prefix`, or `None` if it lies outside.
fn strip_url_prefix<'a>(prefix: &str, url_path: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(url_path);
    }
    let rest = url_path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

/// Map a `Depth` header to a walker bound.
///
/// `None` lists the target alone. A missing header means `1`: the
/// target's children.
fn parse_depth(header: Option<&str>, max_depth: u32) -> Result<Option<u32>, DispatchError> {
    let Some(value) = header.map(str::trim) else {
        return Ok(Some(0));
    };
    if value.eq_ignore_ascii_case("infinity") {
        return Ok(Some(max_depth));
    }
    match value.parse::<u32>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some((n - 1).min(max_depth))),
        Err(_) => Err(DispatchError::BadRequest("invalid Depth header")),
    }
}

fn content_disposition(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_graphic() || c == ' ') && !name.contains('"') {
        format!("attachment; filename=\"{}\"", name)
    } else {
        format!("attachment; filename*=UTF-8''{}", urlencoding::encode(name))
    }
}
