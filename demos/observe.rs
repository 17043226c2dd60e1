//! Plain HTTP with every byte on the wire logged.
//!
//! Run with:
//!   cargo run --example observe
//!
//! Try:
//!   curl http://localhost:3000/anything
//!
//! Each read and write shows up as a `conntap::traffic` debug event with a
//! hex and ASCII dump of the bytes involved.

use std::sync::Arc;

use bytes::Bytes;
use conntap::http::HttpStage;
use conntap::middleware::{ObservationMiddleware, ObservationOptions, TracingSink};
use conntap::{ConnectionContext, ConnectionHandler, DuplexTransport};
use http_body_util::Full;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), conntap::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let hello = HttpStage::new(|req: http::Request<hyper::body::Incoming>| async move {
        let body = format!("hello from {}\n", req.uri().path());
        http::Response::new(Full::new(Bytes::from(body)))
    });
    let pipeline = Arc::new(
        ObservationMiddleware::new(Arc::new(TracingSink))
            .with_options(ObservationOptions::default().with_sample_limit(256))
            .with_next(hello),
    );

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    info!(addr = "127.0.0.1:3000", "observe demo listening");

    let mut tasks = tokio::task::JoinSet::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutting down");
                break;
            }

            res = listener.accept() => {
                let (socket, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };
                let pipeline = Arc::clone(&pipeline);
                tasks.spawn(async move {
                    let transport = DuplexTransport::from_io(socket);
                    let mut conn = ConnectionContext::new(peer.to_string(), transport);
                    if let Err(e) = pipeline.on_connection(&mut conn).await {
                        error!(peer = %peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}
    Ok(())
}
