//! Batch streaming server

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use common::{Batch, ErrorExt, Point, Result};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ProducerConfig;

/// How a client connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    /// Writing failed, the client went away
    ClientGone,
    /// The configured batch limit was reached
    LimitReached,
    /// Shutdown was requested
    Shutdown,
}

/// Streams random batches to one client at a time
pub struct Producer {
    /// Bound listener
    listener: TcpListener,
    /// Producer configuration
    config: ProducerConfig,
}

impl Producer {
    /// Validate the configuration and bind the listener
    pub async fn bind(config: ProducerConfig) -> Result<Self> {
        config.validate()?;
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(common::Error::from)
            .with_context(|| format!("binding {}", address))?;
        info!("Producer listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Producer configuration
    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// One batch of uniformly distributed points
    pub fn generate_batch(&self) -> Batch {
        let mut rng = rand::thread_rng();
        (0..self.config.batch_size)
            .map(|_| {
                Point::new(
                    rng.gen_range(self.config.x_range.clone()),
                    rng.gen_range(self.config.y_range.clone()),
                )
            })
            .collect()
    }

    /// Accept clients one after another until `shutdown` completes
    ///
    /// Only one client is served at a time; later clients wait in the accept
    /// backlog until the current one disconnects.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!("Accept failed: {}", err);
                        continue;
                    }
                },
            };

            info!("Connected by {}", peer);
            match self.stream_batches(stream, &mut shutdown).await? {
                ConnectionEnd::Shutdown => break,
                end => info!(?end, "Connection to {} finished", peer),
            }
        }

        info!("Producer shut down");
        Ok(())
    }

    /// Write one batch per interval until the client leaves or we are told to stop
    async fn stream_batches<F>(
        &self,
        mut stream: TcpStream,
        shutdown: &mut Pin<&mut F>,
    ) -> Result<ConnectionEnd>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent: u64 = 0;

        loop {
            if self.config.batch_limit.is_some_and(|limit| sent >= limit) {
                let _ = stream.shutdown().await;
                return Ok(ConnectionEnd::LimitReached);
            }

            tokio::select! {
                _ = shutdown.as_mut() => {
                    let _ = stream.shutdown().await;
                    return Ok(ConnectionEnd::Shutdown);
                }
                _ = ticker.tick() => {}
            }

            let payload = serde_json::to_vec(&self.generate_batch())?;
            if let Err(err) = stream.write_all(&payload).await {
                warn!("Write failed after {} batches: {}", sent, err);
                return Ok(ConnectionEnd::ClientGone);
            }
            sent += 1;
            debug!(batch = sent, bytes = payload.len(), "Batch sent");
        }
    }
}
