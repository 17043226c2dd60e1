//! HTTP as the last stage of a connection pipeline.
//!
//! [`HttpStage`] serves HTTP/1.1 and HTTP/2 on whatever transport the
//! connection carries when the stage runs. Placed after
//! [`ObservationMiddleware`](crate::middleware::ObservationMiddleware), that
//! is the observed transport, so every request and response byte is reported.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tracing::debug;

use crate::connection::ConnectionContext;
use crate::error::Error;
use crate::handler::{BoxFuture, ConnectionHandler};
use crate::io::TransportIo;

/// A terminal stage answering HTTP requests with `handler`.
///
/// ```rust,no_run
/// use bytes::Bytes;
/// use http_body_util::Full;
/// use conntap::http::HttpStage;
///
/// let stage = HttpStage::new(|_req| async {
///     http::Response::new(Full::new(Bytes::from_static(b"ok")))
/// });
/// # let _ = stage;
/// ```
pub struct HttpStage<F> {
    handler: Arc<F>,
}

impl<F, Fut> HttpStage<F>
where
    F: Fn(http::Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = http::Response<Full<Bytes>>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler: Arc::new(handler) }
    }
}

impl<F, Fut> ConnectionHandler for HttpStage<F>
where
    F: Fn(http::Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = http::Response<Full<Bytes>>> + Send + 'static,
{
    fn on_connection<'a>(
        &'a self,
        conn: &'a mut ConnectionContext,
    ) -> BoxFuture<'a, Result<(), Error>> {
        // TokioIo adapts tokio's AsyncRead/AsyncWrite to the hyper IO traits.
        let io = TokioIo::new(TransportIo::new(conn.transport().clone()));
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            // Called once per request on the connection, not once per connection.
            let svc = service_fn(move |req| {
                let handler = Arc::clone(&handler);
                async move { Ok::<_, Infallible>(handler(req).await) }
            });

            debug!(connection_id = %conn.connection_id(), "serving http");

            // `auto::Builder` handles both HTTP/1.1 and HTTP/2, whatever the
            // client speaks.
            let builder = ConnBuilder::new(TokioExecutor::new());
            builder.serve_connection(io, svc).await.map_err(Error::Stage)
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::transport::DuplexTransport;

    #[tokio::test]
    async fn answers_a_plain_http1_request() {
        let (server, mut client) = tokio::io::duplex(4096);
        let stage = HttpStage::new(|req: http::Request<Incoming>| async move {
            let body = format!("you asked for {}", req.uri().path());
            http::Response::new(Full::new(Bytes::from(body)))
        });

        let serve = tokio::spawn(async move {
            let mut conn = ConnectionContext::new("http-1", DuplexTransport::from_io(server));
            stage.on_connection(&mut conn).await
        });

        client
            .write_all(b"GET /status HTTP/1.1\r\nhost: test\r\nconnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();

        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("you asked for /status"), "{response}");
        serve.await.unwrap().unwrap();
    }
}
