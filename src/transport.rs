//! Packet framing over a byte stream.
//!
//! The client owns the two halves of a split duplex stream. Reads and
//! writes are whole-packet operations bounded by the caller's deadline;
//! the writer is shared behind a lock so no two packets interleave on the
//! wire.

use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, Packet, PacketType};
use crate::time::Deadline;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) type StreamReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type StreamWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct PacketReader {
    reader: StreamReader,
}

impl PacketReader {
    pub(crate) fn new(reader: StreamReader) -> Self {
        Self { reader }
    }

    async fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte).await?;
        Ok(byte[0])
    }

    /// Reads the remaining-length variable byte integer directly off the
    /// stream, one byte at a time.
    async fn read_remaining_length(&mut self) -> Result<u32> {
        let mut value: u32 = 0;
        let mut shift = 0u32;

        for _ in 0..4 {
            let digit = self.read_byte().await?;
            value |= u32::from(digit & 0x7F) << shift;
            if digit & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }

        Err(MqttError::MalformedPacket(
            "Variable byte integer exceeds four bytes".to_string(),
        ))
    }

    fn parse_header_byte(byte: u8, remaining_length: u32) -> Result<FixedHeader> {
        let packet_type = PacketType::from_u8(byte >> 4)
            .ok_or(MqttError::InvalidPacketType(byte >> 4))?;
        let flags = byte & 0x0F;

        if let Some(required) = packet_type.required_flags() {
            if flags != required {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid {packet_type:?} flags: expected 0x{required:02X}, got 0x{flags:02X}"
                )));
            }
        }

        Ok(FixedHeader {
            packet_type,
            flags,
            remaining_length,
        })
    }

    async fn read_body(&mut self, fixed_header: FixedHeader) -> Result<Packet> {
        let mut body = BytesMut::zeroed(fixed_header.remaining_length as usize);
        self.reader.read_exact(&mut body).await?;

        let mut buf = body.freeze();
        let packet = Packet::decode_body(&mut buf, &fixed_header)?;

        if buf.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{:?} body left {} undecoded bytes",
                fixed_header.packet_type,
                buf.remaining()
            )));
        }
        Ok(packet)
    }

    /// Blocking whole-packet read for direct handshake replies (the
    /// CONNACK wait). EOF surfaces as the transient `ConnectionClosed`
    /// the backoff layer retries on.
    pub(crate) async fn read_packet(&mut self, deadline: &Deadline) -> Result<Packet> {
        deadline
            .bound(async {
                let first = self.read_byte().await?;
                let remaining_length = self.read_remaining_length().await?;
                let fixed_header = Self::parse_header_byte(first, remaining_length)?;
                self.read_body(fixed_header).await
            })
            .await
    }

    /// Single-shot pump read. A deadline that expires before the first
    /// header byte is consumed returns `None` (no progress, no error);
    /// after that the rest of the packet is read under `body_deadline`.
    pub(crate) async fn poll_packet(
        &mut self,
        deadline: &Deadline,
        body_deadline: &Deadline,
    ) -> Result<Option<Packet>> {
        let first = match deadline.bound(self.read_byte()).await {
            Ok(byte) => byte,
            Err(MqttError::Timeout) => return Ok(None),
            Err(e) => return Err(e),
        };

        body_deadline
            .bound(async {
                let remaining_length = self.read_remaining_length().await?;
                let fixed_header = Self::parse_header_byte(first, remaining_length)?;
                self.read_body(fixed_header).await.map(Some)
            })
            .await
    }
}

pub(crate) struct PacketWriter {
    writer: StreamWriter,
}

impl PacketWriter {
    pub(crate) fn new(writer: StreamWriter) -> Self {
        Self { writer }
    }

    /// Encodes and writes one whole packet, then flushes.
    pub(crate) async fn write_packet(&mut self, packet: &Packet, deadline: &Deadline) -> Result<()> {
        let mut buf = BytesMut::new();
        packet.encode(&mut buf)?;

        deadline
            .bound(async {
                self.writer.write_all(&buf).await?;
                self.writer.flush().await?;
                Ok(())
            })
            .await
    }

    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
