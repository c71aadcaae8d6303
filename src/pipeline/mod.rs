mod request_ext;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::debug;

pub use request_ext::HeaderExt;

use crate::auth::Identity;

pub type ResponseBody = Full<Bytes>;

/// Per-request state carried through the pipeline stages
pub struct RequestContext {
    pub parts: Parts,
    pub remote_address: Option<SocketAddr>,
    /// Identity accepted by an authentication chain, set at most once
    pub authorized: Option<Identity>,
}

impl RequestContext {
    pub fn new(parts: Parts, remote_address: Option<SocketAddr>) -> Self {
        Self {
            parts,
            remote_address,
            authorized: None,
        }
    }
}

/// What the pipeline does once a stage returns
#[derive(Debug)]
pub enum Flow {
    /// Run the next registered stage
    Continue,
    /// Run the stage following the next `n` stages
    Jump(usize),
    /// Stop processing and answer with this response
    Respond(Response<ResponseBody>),
}

#[async_trait]
pub trait Stage: Send + Sync {
    async fn handle(&self, request: &mut RequestContext) -> Flow;
}

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage and returns its position
    pub fn register_stage(&mut self, stage: Arc<dyn Stage>) -> usize {
        self.stages.push(stage);
        self.stages.len() - 1
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs the stages in registration order.
    ///
    /// Returns the response of the stage that terminated the request, or `None` when every stage
    /// let the request continue to downstream processing.
    pub async fn run(&self, request: &mut RequestContext) -> Option<Response<ResponseBody>> {
        let mut index = 0;
        while let Some(stage) = self.stages.get(index) {
            match stage.handle(request).await {
                Flow::Continue => index += 1,
                Flow::Jump(skipped) => {
                    debug!("Stage {index} skips {skipped} following stage(s)");
                    index += 1 + skipped;
                }
                Flow::Respond(response) => {
                    debug!("Stage {index} terminated the request");
                    return Some(response);
                }
            }
        }

        None
    }
}

pub fn empty_response(status: StatusCode) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
