//! HTTP-to-gRPC transcoding bridge
//!
//! When [`GrpcConfig::transcoding_enabled`](crate::config::GrpcConfig) is set,
//! the gateway exposes select gRPC methods as plain JSON-over-HTTP endpoints.
//! Rather than re-implementing each handler's business logic twice, a
//! transcoded route dials the gateway's own gRPC listener over loopback and
//! proxies the call, the same way an external gRPC client would — the
//! handler never touches application state directly.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::OnceCell;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;

use crate::error::{Error, Result};

/// Lazily-dialed loopback channel to this process's own gRPC listener.
///
/// The channel is established on first use rather than at construction time
/// because the gRPC listener may not be bound yet when the HTTP router is
/// built — both servers are started together by `ActonService::serve`.
#[derive(Clone)]
pub struct TranscodingBridge {
    grpc_addr: String,
    channel: Arc<OnceCell<Channel>>,
}

impl TranscodingBridge {
    /// Create a bridge targeting the gateway's own gRPC address.
    ///
    /// `grpc_addr` is a `http://host:port` URI, typically `127.0.0.1:<grpc
    /// port>` — transcoding always dials loopback, never a remote address.
    #[must_use]
    pub fn new(grpc_addr: impl Into<String>) -> Self {
        Self {
            grpc_addr: grpc_addr.into(),
            channel: Arc::new(OnceCell::new()),
        }
    }

    async fn channel(&self) -> Result<Channel> {
        self.channel
            .get_or_try_init(|| async {
                Channel::from_shared(self.grpc_addr.clone())
                    .map_err(|e| Error::internal(format!("invalid gRPC loopback address: {e}")))?
                    .connect()
                    .await
                    .map_err(|e| Error::internal(format!("failed to dial gRPC loopback: {e}")))
            })
            .await
            .cloned()
    }

    /// Proxy a single unary gRPC call identified by its fully-qualified path
    /// (e.g. `/acton.gateway.v1.Widgets/GetWidget`).
    ///
    /// `Req`/`Resp` are the generated prost message types for the method;
    /// callers typically deserialize the inbound JSON body into `Req` and
    /// serialize the returned `Resp` back to JSON in the axum handler.
    pub async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp>
    where
        Req: prost::Message + Default + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let channel = self.channel().await?;
        let mut client = Grpc::new(channel);
        client
            .ready()
            .await
            .map_err(|e| Error::internal(format!("gRPC loopback channel not ready: {e}")))?;

        let codec = ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(path);
        let response = client
            .unary(tonic::Request::new(request), path, codec)
            .await
            .map_err(Error::from)?;
        Ok(response.into_inner())
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::External(format!("gRPC loopback call failed: {status}"))
    }
}

/// Convenience wrapper tying a JSON request/response pair to a transcoded
/// gRPC method for use directly as an axum handler body.
///
/// ```rust,ignore
/// async fn get_widget(
///     State(bridge): State<TranscodingBridge>,
///     Json(req): Json<GetWidgetRequest>,
/// ) -> Result<Json<Widget>, Error> {
///     transcode(&bridge, "/acton.gateway.v1.Widgets/GetWidget", req).await.map(Json)
/// }
/// ```
pub async fn transcode<Req, Resp>(
    bridge: &TranscodingBridge,
    path: &'static str,
    request: Req,
) -> Result<Resp>
where
    Req: prost::Message + Default + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    bridge.unary(path, request).await
}

/// Marker trait implemented by generated request/response types that are
/// also JSON-serializable, so a single transcoded route can accept and
/// return JSON without the caller restating both bounds each time.
pub trait JsonTranscodable: prost::Message + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> JsonTranscodable for T where T: prost::Message + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_channel_is_lazy() {
        let bridge = TranscodingBridge::new("http://127.0.0.1:50051");
        assert!(!bridge.channel.initialized());
    }
}
