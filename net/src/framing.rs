//! Length-delimited JSON framing shared by the transport client and the
//! daemon's inbound listener. One message per frame.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use ripcord_common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Wrap a byte stream in the wire codec
pub fn frames<T>(io: T) -> Framed<T, LengthDelimitedCodec>
where
    T: AsyncRead + AsyncWrite,
{
    Framed::new(io, LengthDelimitedCodec::new())
}

/// Encode and send a single message
pub async fn send_message<T, M>(framed: &mut Framed<T, LengthDelimitedCodec>, message: &M) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: Serialize,
{
    let encoded = serde_json::to_vec(message)?;
    framed.send(Bytes::from(encoded)).await?;
    Ok(())
}

/// Receive and decode a single message. `None` means the peer closed the
/// stream cleanly.
pub async fn recv_message<T, M>(framed: &mut Framed<T, LengthDelimitedCodec>) -> Result<Option<M>>
where
    T: AsyncRead + AsyncWrite + Unpin,
    M: DeserializeOwned,
{
    match framed.next().await {
        Some(Ok(frame)) => Ok(Some(serde_json::from_slice(&frame)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
