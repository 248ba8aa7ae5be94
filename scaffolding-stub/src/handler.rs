use crate::services::{dispatch, ServiceContext};
use bytes::BytesMut;
use scaffolding_proto::{RequestCodec, ScaffoldingError};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

pub struct ConnectionHandler {
    context: Arc<ServiceContext>,
    max_frame_size: u32,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ConnectionHandler {
    pub fn new(
        context: Arc<ServiceContext>,
        max_frame_size: u32,
        read_timeout_secs: u64,
        write_timeout_secs: u64,
    ) -> Self {
        Self {
            context,
            max_frame_size,
            read_timeout: Duration::from_secs(read_timeout_secs),
            write_timeout: Duration::from_secs(write_timeout_secs),
        }
    }

    /// Serves requests on one connection until the peer leaves
    pub async fn handle<S>(&self, mut stream: S, remote_addr: String)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        info!("Connection from {}", remote_addr);

        match self.serve(&mut stream).await {
            Ok(served) => info!("Connection {} closed after {} requests", remote_addr, served),
            Err(e) => warn!("Connection {} dropped: {}", remote_addr, e),
        }
    }

    async fn serve<S>(&self, stream: &mut S) -> Result<usize, ScaffoldingError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut codec = RequestCodec::new(self.max_frame_size);
        let mut inbound = BytesMut::with_capacity(4096);
        let mut outbound = BytesMut::new();
        let mut served = 0;

        loop {
            // Answer every complete request already buffered, in order
            while let Some(request) = codec.decode(&mut inbound)? {
                let response = dispatch(&request.kind, &request.body, &self.context).await;
                debug!("{} -> status {}", request.kind, response.status);

                codec.encode(response, &mut outbound)?;
                self.write_all(stream, &outbound).await?;
                outbound.clear();
                served += 1;
            }

            let read = timeout(self.read_timeout, stream.read_buf(&mut inbound))
                .await
                .map_err(|_| {
                    ScaffoldingError::Connection(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "read timeout",
                    ))
                })??;

            if read == 0 {
                if !inbound.is_empty() {
                    debug!("Peer left with {} unparsed bytes", inbound.len());
                }
                return Ok(served);
            }
        }
    }

    async fn write_all<S>(&self, stream: &mut S, bytes: &[u8]) -> Result<(), ScaffoldingError>
    where
        S: AsyncWrite + Unpin,
    {
        timeout(self.write_timeout, async {
            stream.write_all(bytes).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| {
            ScaffoldingError::Connection(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timeout",
            ))
        })??;
        Ok(())
    }
}
