// Copyright ⓒ 2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{fmt::Debug, time::Duration};

use bytes::{BufMut as _, Bytes, BytesMut};
use kafka_protocol::{
    messages::{RequestHeader, ResponseHeader},
    protocol::{Decodable, Encodable, HeaderVersion, Request, StrBytes},
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
    time::timeout,
};
use tracing::{Instrument, Level, debug, span};

use crate::{Error, Result};

/// Largest response accepted from a broker, Kafka's default
/// `socket.request.max.bytes`.
pub const MAX_FRAME_SIZE: usize = 104_857_600;

/// the length of a frame from its size prefix
fn frame_length(size: [u8; 4]) -> Result<usize> {
    let length = i32::from_be_bytes(size);

    usize::try_from(length)
        .ok()
        .filter(|length| *length <= MAX_FRAME_SIZE)
        .ok_or(Error::FrameSize(length))
}

fn protocol(error: impl std::fmt::Display) -> Error {
    Error::Protocol(error.to_string())
}

///  broker connection with a correlation id
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    peer: String,
    correlation_id: i32,
}

impl Connection {
    pub(crate) async fn open(host: &str, port: u16, request_timeout: Duration) -> Result<Self> {
        let peer = format!("{host}:{port}");
        debug!(%peer);

        timeout(request_timeout, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| Error::Timeout(request_timeout))?
            .inspect_err(|err| debug!(%peer, ?err))
            .map(|stream| Self {
                stream,
                peer,
                correlation_id: 0,
            })
            .map_err(Into::into)
    }

    pub(crate) fn peer(&self) -> &str {
        self.peer.as_str()
    }

    /// send a request to the broker, waiting for its response
    pub(crate) async fn call<Q>(
        &mut self,
        req: &Q,
        api_version: i16,
        client_id: Option<&str>,
        request_timeout: Duration,
    ) -> Result<Q::Response>
    where
        Q: Request + Debug,
        Q::Response: Debug,
    {
        let span = span!(Level::DEBUG, "call", api_key = Q::KEY, api_version, peer = %self.peer);

        async move {
            timeout(
                request_timeout,
                self.request_response(req, api_version, client_id),
            )
            .await
            .unwrap_or_else(|_elapsed| Err(Error::Timeout(request_timeout)))
        }
        .instrument(span)
        .await
    }

    async fn request_response<Q>(
        &mut self,
        req: &Q,
        api_version: i16,
        client_id: Option<&str>,
    ) -> Result<Q::Response>
    where
        Q: Request + Debug,
        Q::Response: Debug,
    {
        let correlation_id = self.correlation_id;

        let header = RequestHeader::default()
            .with_request_api_key(Q::KEY)
            .with_request_api_version(api_version)
            .with_correlation_id(correlation_id)
            .with_client_id(client_id.map(ToOwned::to_owned).map(StrBytes::from_string));

        let mut payload = BytesMut::new();
        payload.put_i32(0);
        header
            .encode(&mut payload, <Q as HeaderVersion>::header_version(api_version))
            .map_err(protocol)?;
        req.encode(&mut payload, api_version).map_err(protocol)?;

        let size = i32::try_from(payload.len() - size_of::<i32>())?;
        payload[..size_of::<i32>()].copy_from_slice(&size.to_be_bytes());

        debug!(correlation_id, ?req);

        self.stream
            .write_all(&payload[..])
            .await
            .inspect_err(|err| debug!(?err))?;

        self.correlation_id += 1;

        let mut encoded = self.read_frame().await.inspect_err(|err| debug!(?err))?;

        let header = ResponseHeader::decode(
            &mut encoded,
            <Q::Response as HeaderVersion>::header_version(api_version),
        )
        .map_err(protocol)?;

        if header.correlation_id != correlation_id {
            return Err(Error::CorrelationMismatch {
                expected: correlation_id,
                found: header.correlation_id,
            });
        }

        let response =
            <Q::Response as Decodable>::decode(&mut encoded, api_version).map_err(protocol)?;

        debug!(?response);
        Ok(response)
    }

    async fn read_frame(&mut self) -> Result<Bytes> {
        let mut size = [0u8; 4];
        _ = self.stream.read_exact(&mut size).await?;

        let mut buffer = vec![0u8; frame_length(size)?];
        _ = self.stream.read_exact(&mut buffer[..]).await?;

        Ok(Bytes::from(buffer))
    }

    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        debug!(peer = %self.peer);
        self.stream.shutdown().await.map_err(Into::into)
    }
}
