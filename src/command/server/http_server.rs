use std::convert::Infallible;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::pin;
use tracing::{debug, error, info, instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::auth::mechanism::PeerCertificate;
use crate::command::server::error::Error;
use crate::command::server::ServerContext;
use crate::metrics_provider::{IN_FLIGHT_REQUESTS, METRICS_PROVIDER};
use crate::pipeline::{json_response, RequestContext, ResponseBody};

fn update_in_flight_gauge() {
    METRICS_PROVIDER.metric_http_request_in_flight.set(
        i64::try_from(IN_FLIGHT_REQUESTS.load(Ordering::Relaxed)).unwrap_or(i64::MAX),
    );
}

pub async fn serve_request<S>(
    stream: TokioIo<S>,
    context: Arc<ServerContext>,
    peer_certificate: Option<Vec<u8>>,
    timeouts: Arc<[Duration; 2]>,
    remote_address: SocketAddr,
) where
    S: Unpin + AsyncWrite + AsyncRead + Send + Debug + 'static,
{
    let peer_certificate = peer_certificate.map(|der| PeerCertificate(Arc::new(der)));

    let conn = http1::Builder::new().serve_connection(
        stream,
        service_fn(move |mut request| {
            if let Some(peer_certificate) = &peer_certificate {
                request.extensions_mut().insert(peer_certificate.clone());
            }
            request.extensions_mut().insert(remote_address);
            handle_request(Arc::clone(&context), request)
        }),
    );
    pin!(conn);

    IN_FLIGHT_REQUESTS.fetch_add(1, Ordering::Relaxed);
    update_in_flight_gauge();

    for (iter, sleep_duration) in timeouts.iter().enumerate() {
        debug!("iter = {iter} sleep_duration = {sleep_duration:?}");
        tokio::select! {
            res = conn.as_mut() => {
                match res {
                    Ok(()) => debug!("after polling conn, no error"),
                    Err(error) =>  debug!("error serving connection: {error}"),
                }
                break;
            }
            () = tokio::time::sleep(*sleep_duration) => {
                debug!("iter = {iter} got timeout_interval, calling conn.graceful_shutdown");
                conn.as_mut().graceful_shutdown();
            }
        }
    }

    IN_FLIGHT_REQUESTS.fetch_sub(1, Ordering::Relaxed);
    update_in_flight_gauge();
}

fn current_trace_id() -> Option<String> {
    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();
    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

#[instrument(skip(context, request))]
async fn handle_request<B>(
    context: Arc<ServerContext>,
    request: Request<B>,
) -> Result<Response<ResponseBody>, Infallible> {
    let start_time = Instant::now();
    let method = request.method().to_owned();
    let path = request.uri().path().to_owned();
    let trace_id = current_trace_id();

    let response = match router(&context, request).await {
        Ok(response) => response,
        Err(error) => error_to_response(&error, trace_id.as_ref()),
    };

    #[allow(clippy::cast_precision_loss)]
    let elapsed = start_time.elapsed().as_millis() as f64;
    let status = response.status();

    METRICS_PROVIDER
        .metric_http_request_total
        .with_label_values(&[method.as_str(), status.as_str()])
        .inc();
    METRICS_PROVIDER
        .metric_http_request_duration
        .with_label_values(&[method.as_str()])
        .observe(elapsed);

    let log = if let Some(trace_id) = trace_id {
        format!("{trace_id} {elapsed:?} - {status} {method} {path}")
    } else {
        format!("{elapsed:?} - {status} {method} {path}")
    };

    if status.is_server_error() {
        error!("{log}");
    } else {
        info!("{log}");
    }

    Ok(response)
}

async fn router<B>(
    context: &ServerContext,
    request: Request<B>,
) -> Result<Response<ResponseBody>, Error> {
    let (parts, _) = request.into_parts();

    match (&parts.method, parts.uri.path()) {
        (&Method::GET, "/healthz") => handle_healthz(),
        (&Method::GET, "/metrics") => handle_metrics(),
        _ => Ok(handle_authenticated(context, parts).await),
    }
}

#[instrument(skip_all)]
async fn handle_authenticated(context: &ServerContext, parts: Parts) -> Response<ResponseBody> {
    let remote_address = parts.extensions.get::<SocketAddr>().copied();
    let mut request = RequestContext::new(parts, remote_address);

    if let Some(response) = context.authenticate_request(&mut request).await {
        return response;
    }

    json_response(
        StatusCode::OK,
        &json!({ "authorized": request.authorized }),
    )
}

fn handle_healthz() -> Result<Response<ResponseBody>, Error> {
    Ok(json_response(StatusCode::OK, &json!({ "status": "ok" })))
}

fn handle_metrics() -> Result<Response<ResponseBody>, Error> {
    let (content_type, metrics) = METRICS_PROVIDER.gather()?;
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Full::new(Bytes::from(metrics)));

    match response {
        Ok(resp) => Ok(resp),
        Err(e) => {
            let msg = format!("Failed to build metrics response: {e}");
            Err(Error::Internal(msg))
        }
    }
}

pub fn error_to_response(error: &Error, request_id: Option<&String>) -> Response<ResponseBody> {
    json_response(error.status_code(), &error.as_json(request_id))
}
