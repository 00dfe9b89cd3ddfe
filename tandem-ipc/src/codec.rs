//! Fixed-size packet framing
//!
//! A message is base64-encoded and cut into packets of exactly
//! [`PACKET_SIZE`] bytes. Each packet starts with a [`HEADER_SIZE`]-byte
//! header: the number of packets still to come after this one, as four
//! zero-padded decimal digits, then `:`. The body of the last packet is
//! right-padded with spaces, which never appear in base64 output.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::IpcError;

/// Total size of a packet on the wire
pub const PACKET_SIZE: usize = 1024;

/// Size of the "packets remaining" header
pub const HEADER_SIZE: usize = 5;

/// Payload bytes carried by one packet
pub const BODY_SIZE: usize = PACKET_SIZE - HEADER_SIZE;

/// Four decimal digits in the header
const MAX_PACKETS: usize = 10_000;

/// Render the header announcing `remaining` packets after this one
pub fn header(remaining: usize) -> String {
    format!("{:04}:", remaining)
}

/// Parse a packet header back into its "packets remaining" count
pub fn parse_header(bytes: &[u8]) -> Result<usize, IpcError> {
    if bytes.len() != HEADER_SIZE || bytes[HEADER_SIZE - 1] != b':' {
        return Err(IpcError::InvalidPacket(format!(
            "malformed header {:?}",
            String::from_utf8_lossy(bytes)
        )));
    }

    let digits = &bytes[..HEADER_SIZE - 1];
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(IpcError::InvalidPacket(format!(
            "non-numeric header {:?}",
            String::from_utf8_lossy(bytes)
        )));
    }

    Ok(digits
        .iter()
        .fold(0usize, |count, digit| count * 10 + usize::from(digit - b'0')))
}

/// Number of packets `payload` takes on the wire
pub fn packet_count(payload: &str) -> usize {
    let encoded = payload.len().div_ceil(3) * 4;
    encoded.div_ceil(BODY_SIZE).max(1)
}

/// Fail with [`IpcError::PayloadTooLarge`] when `payload` cannot be framed
pub fn check_size(payload: &str) -> Result<(), IpcError> {
    let packets = packet_count(payload);
    if packets > MAX_PACKETS {
        return Err(IpcError::PayloadTooLarge {
            packets,
            max: MAX_PACKETS,
        });
    }
    Ok(())
}

/// Encode `payload` into the packets to put on the wire
pub fn encode(payload: &str) -> Result<Vec<u8>, IpcError> {
    check_size(payload)?;

    let encoded = STANDARD.encode(payload.as_bytes());
    let mut bodies: Vec<&[u8]> = encoded.as_bytes().chunks(BODY_SIZE).collect();
    if bodies.is_empty() {
        bodies.push(&[]);
    }

    let mut packets = Vec::with_capacity(bodies.len() * PACKET_SIZE);
    for (index, body) in bodies.iter().enumerate() {
        let remaining = bodies.len() - index - 1;
        packets.extend_from_slice(header(remaining).as_bytes());
        packets.extend_from_slice(body);
        packets.resize(packets.len() + BODY_SIZE - body.len(), b' ');
    }

    Ok(packets)
}

/// Decode the concatenated packet bodies of one message
pub fn decode(bodies: &[u8]) -> Result<String, IpcError> {
    let text = std::str::from_utf8(bodies)
        .map_err(|e| IpcError::InvalidPacket(format!("packet body is not ASCII: {}", e)))?;
    let raw = STANDARD
        .decode(text.trim_end_matches(' '))
        .map_err(|e| IpcError::InvalidPayload(format!("invalid base64 payload: {}", e)))?;

    String::from_utf8(raw)
        .map_err(|e| IpcError::InvalidPayload(format!("payload is not UTF-8: {}", e)))
}

/// Write one framed message and flush
pub async fn write_message<W>(writer: &mut W, payload: &str) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
{
    let packets = encode(payload)?;
    writer.write_all(&packets).await?;
    writer.flush().await?;
    Ok(())
}

/// Fill `packet` completely.
///
/// Returns `false` when the stream ended before the first byte, which is how a
/// peer closes the connection between messages.
async fn read_packet<R>(reader: &mut R, packet: &mut [u8; PACKET_SIZE]) -> Result<bool, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < PACKET_SIZE {
        let read = reader.read(&mut packet[filled..]).await?;
        if read == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(IpcError::ConnectionClosed);
        }
        filled += read;
    }
    Ok(true)
}

/// Read one framed message.
///
/// `packet_timeout` bounds the wait for every single packet, so any inbound
/// activity resets it. `Ok(None)` means the peer closed the connection
/// cleanly before a new message started.
pub async fn read_message<R>(
    reader: &mut R,
    packet_timeout: Option<Duration>,
) -> Result<Option<String>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut packet = [0u8; PACKET_SIZE];
    let mut bodies = Vec::with_capacity(BODY_SIZE);
    let mut first = true;

    loop {
        let complete = match packet_timeout {
            Some(window) => tokio::time::timeout(window, read_packet(reader, &mut packet))
                .await
                .map_err(|_| IpcError::Timeout)??,
            None => read_packet(reader, &mut packet).await?,
        };

        if !complete {
            if first {
                return Ok(None);
            }
            return Err(IpcError::ConnectionClosed);
        }
        first = false;

        let remaining = parse_header(&packet[..HEADER_SIZE])?;
        bodies.extend_from_slice(&packet[HEADER_SIZE..]);

        if remaining == 0 {
            break;
        }
    }

    decode(&bodies).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_format() {
        assert_eq!(header(0), "0000:");
        assert_eq!(header(42), "0042:");
        assert_eq!(parse_header(b"0042:").unwrap(), 42);
        assert!(parse_header(b"00a2:").is_err());
        assert!(parse_header(b"00021").is_err());
    }

    #[test]
    fn test_every_packet_has_the_fixed_size() {
        let payload = "x".repeat(3000);
        let packets = encode(&payload).unwrap();

        assert_eq!(packets.len() % PACKET_SIZE, 0);
        let count = packets.len() / PACKET_SIZE;
        for (index, packet) in packets.chunks(PACKET_SIZE).enumerate() {
            let remaining = parse_header(&packet[..HEADER_SIZE]).unwrap();
            assert_eq!(remaining, count - index - 1);
        }
    }

    #[test]
    fn test_packet_count_matches_encoding() {
        for length in [0, 1, 764, 765, 766, 3000] {
            let payload = "x".repeat(length);
            let packets = encode(&payload).unwrap();
            assert_eq!(packet_count(&payload), packets.len() / PACKET_SIZE, "length {}", length);
        }
    }

    #[test]
    fn test_oversized_payload_is_rejected_before_encoding() {
        // 10000 bodies of base64 hold 7_642_500 bytes of payload
        let fits = "x".repeat(7_642_500);
        let too_large = "x".repeat(7_642_501);

        assert!(check_size(&fits).is_ok());
        assert!(matches!(
            encode(&too_large),
            Err(IpcError::PayloadTooLarge { packets: 10_001, max: 10_000 })
        ));
    }

    #[test]
    fn test_empty_payload_is_one_packet() {
        let packets = encode("").unwrap();
        assert_eq!(packets.len(), PACKET_SIZE);
        assert_eq!(&packets[..HEADER_SIZE], b"0000:");
        assert_eq!(decode(&packets[HEADER_SIZE..]).unwrap(), "");
    }

    #[tokio::test]
    async fn test_large_non_ascii_message_over_duplex() {
        let payload = format!("😘{}😘", "a".repeat(1024));
        let (mut client, mut server) = tokio::io::duplex(64);

        let writer = tokio::spawn({
            let payload = payload.clone();
            async move { write_message(&mut client, &payload).await }
        });

        let received = read_message(&mut server, None).await.unwrap();
        writer.await.unwrap().unwrap();
        assert_eq!(received.as_deref(), Some(payload.as_str()));
    }

    #[tokio::test]
    async fn test_messages_are_read_in_order() {
        let (mut client, mut server) = tokio::io::duplex(PACKET_SIZE * 4);
        write_message(&mut client, "first").await.unwrap();
        write_message(&mut client, "second").await.unwrap();

        assert_eq!(read_message(&mut server, None).await.unwrap().unwrap(), "first");
        assert_eq!(read_message(&mut server, None).await.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn test_clean_close_between_messages() {
        let (client, mut server) = tokio::io::duplex(PACKET_SIZE);
        drop(client);

        assert!(read_message(&mut server, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_inside_a_packet_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(PACKET_SIZE);
        client.write_all(b"0000:abc").await.unwrap();
        drop(client);

        let result = read_message(&mut server, None).await;
        assert!(matches!(result, Err(IpcError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_hits_the_packet_timeout() {
        let (_client, mut server) = tokio::io::duplex(PACKET_SIZE);

        let result = read_message(&mut server, Some(Duration::from_millis(500))).await;
        assert!(matches!(result, Err(IpcError::Timeout)));
    }
}
