//! Raw TCP capture listener.
//!
//! One connection is one exchange. Each inbound chunk runs through the
//! active TCP handler (if any); bytes the script queues with `resp.write`
//! go back out on the same socket. The exchange is finalized when the peer
//! disconnects.

use crate::pipeline::Pipeline;
use crate::model::Exchange;
use rhai::Map;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

pub struct TcpCaptureServer {
    addr: SocketAddr,
    chunk_bytes: usize,
    pipeline: Arc<Pipeline>,
}

impl TcpCaptureServer {
    pub fn new(addr: SocketAddr, chunk_bytes: usize, pipeline: Arc<Pipeline>) -> Self {
        Self {
            addr,
            chunk_bytes,
            pipeline,
        }
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("TCP capture listening on {}", self.addr);

        loop {
            let (stream, peer) = listener.accept().await?;
            let pipeline = Arc::clone(&self.pipeline);
            let chunk_bytes = self.chunk_bytes;
            tokio::spawn(async move {
                handle_connection(stream, peer, pipeline, chunk_bytes).await;
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    pipeline: Arc<Pipeline>,
    chunk_bytes: usize,
) {
    let exchange = Exchange::new_tcp(peer.to_string());
    if let Err(e) = pipeline.store().create_exchange(exchange.clone()) {
        error!("could not record tcp connection from {}: {}", peer, e);
        return;
    }
    debug!(exchange = %exchange.id, %peer, "tcp connection opened");

    let mut locals = Map::new();
    let mut sequence = 0i64;
    let mut buf = vec![0u8; chunk_bytes];

    'session: loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(exchange = %exchange.id, "tcp read error: {}", e);
                break;
            }
        };
        let chunk = buf[..n].to_vec();

        if let Err(e) = pipeline.store().append_exchange_data(exchange.id, &chunk) {
            warn!(exchange = %exchange.id, "could not append captured bytes: {}", e);
        }

        let worker = Arc::clone(&pipeline);
        let snapshot = exchange.clone();
        let carried = std::mem::take(&mut locals);
        let outcome = tokio::task::spawn_blocking(move || {
            worker.run_tcp_chunk(&snapshot, chunk, carried, sequence)
        })
        .await;

        let outcome = match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(exchange = %exchange.id, "tcp chunk processing failed: {}", e);
                break;
            }
            Err(e) => {
                error!(exchange = %exchange.id, "tcp worker panicked: {}", e);
                break;
            }
        };
        locals = outcome.locals;
        sequence += 1;

        for data in outcome.writes {
            if let Err(e) = stream.write_all(&data).await {
                debug!(exchange = %exchange.id, "tcp write error: {}", e);
                break 'session;
            }
        }
    }

    if let Err(e) = pipeline.finalize_tcp_exchange(exchange.id) {
        debug!(exchange = %exchange.id, "could not finalize tcp exchange: {}", e);
    }
    debug!(exchange = %exchange.id, %peer, chunks = sequence, "tcp connection closed");
}
