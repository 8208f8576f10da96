use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::exporter::Exporter;
use crate::newrelic::Upstream;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bind listener; addr={addr}; err={source}")]
    Bind { addr: SocketAddr, source: std::io::Error },
}

/// Binds `addr` and serves until `cxl` is cancelled.
///
/// Open connections are closed before returning.
///
/// # Errors
///
/// Errors if the listener cannot be bound.
pub async fn run<U>(
    addr: SocketAddr,
    path: String,
    exporter: Arc<Exporter<U>>,
    cxl: CancellationToken,
) -> Result<(), Error>
where
    U: Upstream + 'static,
{
    let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind { addr, source })?;

    serve(listener, path, exporter, cxl).await;

    Ok(())
}

pub(crate) async fn serve<U>(
    listener: TcpListener,
    path: String,
    exporter: Arc<Exporter<U>>,
    cxl: CancellationToken,
) where
    U: Upstream + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, %path, "Serving metrics");
    }

    let path: Arc<str> = path.into();
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            () = cxl.cancelled() => {
                info!("Shutdown signal received, stopping accept loop");
                break;
            }

            incoming = listener.accept() => {
                let (stream, peer) = match incoming {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!(%err, "Failed to accept connection");
                        continue;
                    }
                };
                debug!(%peer, "Accepted connection");

                let path = Arc::clone(&path);
                let exporter = Arc::clone(&exporter);
                connections.spawn(async move {
                    let service = service_fn(move |request: Request<Incoming>| {
                        let path = Arc::clone(&path);
                        let exporter = Arc::clone(&exporter);

                        async move {
                            let method = request.method().clone();
                            let requested = request.uri().path().to_string();

                            Ok::<_, Infallible>(route(&method, &requested, &path, &exporter).await)
                        }
                    });

                    let builder = auto::Builder::new(TokioExecutor::new());
                    if let Err(err) = builder.serve_connection(TokioIo::new(stream), service).await {
                        error!(%peer, %err, "Failed to serve connection");
                    }
                });
            }
        }
    }

    drop(listener);
    // Scrapers hold keep-alive connections open indefinitely.
    connections.shutdown().await;
}

async fn route<U>(
    method: &Method,
    requested: &str,
    path: &str,
    exporter: &Exporter<U>,
) -> Response<Full<Bytes>>
where
    U: Upstream,
{
    match (method, requested) {
        (&Method::GET, requested) if requested == path => {
            respond(StatusCode::OK, TEXT_FORMAT, exporter.scrape().await)
        }
        (&Method::GET, "/") => {
            respond(StatusCode::OK, "text/html; charset=utf-8", landing_page(path))
        }
        _ => respond(StatusCode::NOT_FOUND, "text/plain; charset=utf-8", "Not Found\n".to_string()),
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

    response
}

fn landing_page(path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>NewRelic exporter</title></head>\n\
         <body>\n\
         <h1>NewRelic exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n"
    )
}
