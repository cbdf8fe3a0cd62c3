//! Transport for grid endpoint calls.
//!
//! [`GridProbe`] is the seam between the poller and the network: it fetches
//! one body over HTTP GET. Timeouts are enforced by the caller so a probe
//! implementation never has to.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use tracing::debug;

use crate::error::{PollError, PollResult};

/// Boxed future returned by [`GridProbe::get`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = PollResult<Bytes>> + Send + 'a>>;

/// Fetches `http://{authority}{path}`. Injected for testability.
pub trait GridProbe: Send + Sync {
    fn get<'a>(&'a self, authority: &'a str, path: &'a str) -> ProbeFuture<'a>;
}

/// Plain HTTP/1.1 probe over a fresh TCP connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpProbe;

impl GridProbe for HttpProbe {
    fn get<'a>(&'a self, authority: &'a str, path: &'a str) -> ProbeFuture<'a> {
        Box::pin(http_get(authority, path))
    }
}

/// Perform a GET and return the body of a 2xx answer.
pub async fn http_get(authority: &str, path: &str) -> PollResult<Bytes> {
    let uri = format!("http://{authority}{path}");
    let connect_err = |e: &dyn std::fmt::Display| PollError::Connect {
        uri: uri.clone(),
        reason: e.to_string(),
    };

    let stream = tokio::net::TcpStream::connect(authority).await.map_err(|e| {
        debug!(error = %e, %uri, "grid endpoint connection failed");
        connect_err(&e)
    })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| connect_err(&e))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(path)
        .header("host", authority)
        .header("user-agent", "skygrid-poller/0.1")
        .body(Empty::<Bytes>::new())
        .map_err(|e| connect_err(&e))?;

    let resp = sender.send_request(req).await.map_err(|e| {
        debug!(error = %e, %uri, "grid endpoint request failed");
        connect_err(&e)
    })?;

    if !resp.status().is_success() {
        debug!(status = %resp.status(), %uri, "grid endpoint non-2xx");
        return Err(PollError::Status {
            uri: uri.clone(),
            status: resp.status().as_u16(),
        });
    }

    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| connect_err(&e))?
        .to_bytes();
    Ok(body)
}
