use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

use crate::error::{GenError, Result};
use crate::pb::stream_service_client::StreamServiceClient;
use crate::pb::Request;
use crate::request::GenRequest;
use crate::stream::{classify_frame, Frame, FrameStream};

/// Opens one server-streaming generation call per turn.
///
/// Implementations own no conversation state; the caller supplies everything
/// the service needs in the request.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn open_stream(&self, request: GenRequest) -> Result<FrameStream>;
}

/// gRPC generation client over a process-wide shared channel.
///
/// The channel is dialed once at startup; each turn borrows it through a
/// cheap call-scoped `StreamServiceClient`, so no turn monopolizes the
/// underlying connection.
#[derive(Clone)]
pub struct GenClient {
    channel: Channel,
}

impl GenClient {
    pub async fn connect(endpoint: &str, connect_timeout: Duration) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.to_string())?
            .connect_timeout(connect_timeout)
            .connect()
            .await?;
        tracing::info!(endpoint, "connected to generation service");
        Ok(Self { channel })
    }

    /// Call-scoped client over the shared channel.
    fn call_client(&self) -> StreamServiceClient<Channel> {
        StreamServiceClient::new(self.channel.clone())
    }
}

#[async_trait]
impl Generator for GenClient {
    async fn open_stream(&self, request: GenRequest) -> Result<FrameStream> {
        let json_data = request.to_json()?;
        let mut client = self.call_client();

        let mut inner = client
            .process_request(Request { json_data })
            .await
            .map_err(GenError::Call)?
            .into_inner();

        let stream = async_stream::stream! {
            loop {
                match inner.message().await {
                    Ok(Some(frame)) => match classify_frame(&frame.data) {
                        Frame::Fragment(text) => yield Ok(text),
                        Frame::Done => break,
                    },
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(GenError::Transport(status));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
