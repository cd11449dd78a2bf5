//! TCP transport: length-prefixed bincode frames, one request per connection.

use crate::message::{Message, Reply};
use crate::transport::{PeerClient, RequestHandler, Result, Transport, TransportError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

/// Largest frame either side will accept.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

async fn send_frame<T: serde::Serialize>(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
    value: &T,
) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    framed.send(Bytes::from(bytes)).await?;
    Ok(())
}

async fn recv_frame<T: serde::de::DeserializeOwned>(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
) -> Result<Option<T>> {
    match framed.next().await {
        Some(frame) => Ok(Some(bincode::deserialize(&frame?)?)),
        None => Ok(None),
    }
}

/// Dials peers over TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    request_timeout: Duration,
}

impl TcpTransport {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Transport for TcpTransport {
    /// Connections are opened per request, so dialing never touches the network.
    fn dial<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<Arc<dyn PeerClient>>> {
        Box::pin(async move {
            let client: Arc<dyn PeerClient> = Arc::new(TcpClient {
                addr: addr.to_string(),
                request_timeout: self.request_timeout,
            });
            Ok(client)
        })
    }
}

struct TcpClient {
    addr: String,
    request_timeout: Duration,
}

impl TcpClient {
    async fn exchange(&self, message: Message) -> Result<Reply> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|_| TransportError::Unreachable(self.addr.clone()))?;
        let mut framed = Framed::new(stream, codec());

        send_frame(&mut framed, &message).await?;
        recv_frame(&mut framed).await?.ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before reply",
            ))
        })
    }
}

impl PeerClient for TcpClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn request(&self, message: Message) -> BoxFuture<'_, Result<Reply>> {
        Box::pin(async move {
            tokio::time::timeout(self.request_timeout, self.exchange(message))
                .await
                .map_err(|_| TransportError::Timeout)?
        })
    }
}

/// Accept connections on `listener` forever, answering each request with `handler`.
pub async fn serve(listener: TcpListener, handler: Arc<dyn RequestHandler>) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "node started");
    loop {
        let (stream, remote) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, remote, handler).await {
                warn!(%remote, error = %err, "connection error");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    handler: Arc<dyn RequestHandler>,
) -> Result<()> {
    let mut framed = Framed::new(stream, codec());
    while let Some(message) = recv_frame::<Message>(&mut framed).await? {
        debug!(%remote, message = message.type_name(), "request");
        let reply = Arc::clone(&handler).handle_request(message).await;
        send_frame(&mut framed, &reply).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Announcement;

    struct Echo;

    impl RequestHandler for Echo {
        fn handle_request(self: Arc<Self>, message: Message) -> BoxFuture<'static, Reply> {
            Box::pin(async move {
                match message {
                    Message::Handshake(announcement) => Reply::Announcement(announcement),
                    _ => Reply::Ack,
                }
            })
        }
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(serve(listener, Arc::new(Echo)));

        let transport = TcpTransport::new(Duration::from_secs(2));
        let client = transport.dial(&addr).await.unwrap();
        let announcement = Announcement {
            version: "test".into(),
            height: 3,
            listen_addr: addr.clone(),
            peers: vec!["127.0.0.1:1".into()],
        };
        assert_eq!(
            client.handshake(announcement.clone()).await.unwrap(),
            announcement
        );
        client
            .handle_transaction(gossipchain_core::Transaction::mint(1, Default::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = TcpTransport::new(Duration::from_secs(2))
            .dial(&addr)
            .await
            .unwrap();
        assert!(matches!(
            client.request(Message::Transaction(gossipchain_core::Transaction::mint(
                1,
                Default::default()
            )))
            .await,
            Err(TransportError::Unreachable(_))
        ));
    }
}
