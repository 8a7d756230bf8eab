//! TCP protocol between a landmark producer (pose-estimation client) and the
//! motion input server.
//!
//! Self-contained: no imports from other motion_input modules.

use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Landmark count of one frame (BlazePose topology).
pub const LANDMARK_COUNT: usize = 33;

// --- Message types ---

/// Client → server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// One frame of landmarks as (x, y, z, visibility) rows, x/y normalised
    /// to the image size.
    Landmarks {
        timestamp_us: u64,
        width: u32,
        height: u32,
        landmarks: Vec<[f32; 4]>,
    },
    SetSendPermission { enabled: bool },
    /// "simple" or "full_body"
    SelectMode { mode: String },
    SelectScheme { name: String },
}

/// Server → client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Ready,
    /// Labels after a landmark frame. `None` means not recognised yet.
    Labels { rule: Option<String>, ml: Option<String> },
    SchemeAck { ok: bool, error: Option<String> },
}

// --- TCP codec helpers ---

pub type MessageStream = Framed<TcpStream, LengthDelimitedCodec>;
pub type MessageSink = SplitSink<MessageStream, Bytes>;

/// Create a framed message stream with length-delimited framing.
pub fn message_stream(stream: TcpStream) -> MessageStream {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(1024 * 1024) // 1MB
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<T: Serialize>(
    stream: &mut MessageStream,
    msg: &T,
) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Same as [`send_message`], for the write half of a split stream.
pub async fn send_to_sink<T: Serialize>(sink: &mut MessageSink, msg: &T) -> anyhow::Result<()> {
    let data = bincode::serialize(msg)?;
    sink.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message.
pub async fn recv_message<T: DeserializeOwned>(
    stream: &mut MessageStream,
) -> anyhow::Result<T> {
    match stream.next().await {
        Some(Ok(bytes)) => Ok(bincode::deserialize(&bytes)?),
        Some(Err(e)) => Err(e.into()),
        None => Err(anyhow::anyhow!("connection closed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_messages_cross_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = message_stream(stream);
            let msg: ClientMessage = recv_message(&mut framed).await.unwrap();
            send_message(&mut framed, &ServerMessage::Ready).await.unwrap();
            msg
        });

        let mut client = message_stream(TcpStream::connect(addr).await.unwrap());
        let sent = ClientMessage::Landmarks {
            timestamp_us: 42,
            width: 640,
            height: 480,
            landmarks: vec![[0.5, 0.25, -0.1, 0.9]; LANDMARK_COUNT],
        };
        send_message(&mut client, &sent).await.unwrap();
        let reply: ServerMessage = recv_message(&mut client).await.unwrap();

        assert_eq!(reply, ServerMessage::Ready);
        assert_eq!(server.await.unwrap(), sent);
    }

    #[tokio::test]
    async fn test_recv_on_closed_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let mut client = message_stream(TcpStream::connect(addr).await.unwrap());
        server.await.unwrap();
        assert!(recv_message::<ServerMessage>(&mut client).await.is_err());
    }
}
