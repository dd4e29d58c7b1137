#![doc = include_str!("../README.md")]

use futures::{StreamExt, stream::BoxStream};
use tidings_core::{
    AuthError, Error, Result,
    proto::{StreamRequest, streaming_service_client::StreamingServiceClient},
    types::AUTHORIZATION_KEY,
};
use tonic::{
    Request,
    codec::CompressionEncoding,
    metadata::MetadataValue,
    transport::{Channel, Endpoint},
};

/// Messages of one call, in the order the server sent them.
///
/// A server-side abort shows up as a final `Err` item.
pub type MessageStream = BoxStream<'static, Result<String>>;

/// Connection to a `tidings.StreamingService` endpoint.
///
/// Cloning is cheap and clones share the underlying channel, so one client can
/// drive several concurrent calls.
#[derive(Clone, Debug)]
pub struct StreamClient {
    inner: StreamingServiceClient<Channel>,
}

impl StreamClient {
    /// Opens a channel to `endpoint`, e.g. `http://127.0.0.1:50051`.
    ///
    /// # Errors
    ///
    /// [`Error::Transport`] if the endpoint is not a valid URI or cannot be
    /// reached.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let channel = Endpoint::from_shared(endpoint.into())?.connect().await?;
        Ok(Self::from_channel(channel))
    }

    pub fn from_channel(channel: Channel) -> Self {
        let inner = StreamingServiceClient::new(channel)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip);
        Self { inner }
    }

    /// Starts a `StreamData` call for `user_id`.
    ///
    /// When `credential` is given it is sent verbatim as the `authorization`
    /// metadata value.
    ///
    /// # Errors
    ///
    /// [`Error::Rpc`] when the server rejects the call outright, for example
    /// with `UNAUTHENTICATED`. Later failures arrive through the stream.
    pub async fn call(&mut self, user_id: &str, credential: Option<&str>) -> Result<MessageStream> {
        let req = stream_request(user_id, credential)?;
        let stream = self.inner.stream_data(req).await?.into_inner();
        Ok(stream
            .map(|item| item.map(|resp| resp.message).map_err(Error::from))
            .boxed())
    }
}

fn stream_request(user_id: &str, credential: Option<&str>) -> Result<Request<StreamRequest>> {
    let mut req = Request::new(StreamRequest {
        user_id: user_id.to_owned(),
    });

    if let Some(token) = credential {
        let value: MetadataValue<_> = token
            .parse()
            .map_err(|_| Error::Auth(AuthError::InvalidToken))?;
        req.metadata_mut().insert(AUTHORIZATION_KEY, value);
    }

    Ok(req)
}
