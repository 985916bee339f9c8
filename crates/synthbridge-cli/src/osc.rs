//! OSC (Open Sound Control) endpoint for the control surface.
//!
//! Requests arrive on a UDP socket bound to the `listen` address; notifications
//! go out to the `reply` address. The socket is non-blocking so the host loop
//! can poll it once per tick.

use anyhow::{Context, Result};
use rosc::{encoder, OscMessage, OscPacket};
use std::net::UdpSocket;

pub struct OscEndpoint {
    sock: UdpSocket,
    /// Target address in "host:port" format
    pub reply: String,
}

impl OscEndpoint {
    /// Bind the listening socket.
    pub fn bind(listen: &str, reply: &str) -> Result<Self> {
        let sock = UdpSocket::bind(listen).with_context(|| format!("Failed to bind OSC socket on {}", listen))?;
        sock.set_nonblocking(true)?;
        log::info!("[OSC] Listening on {}, replying to {}", sock.local_addr()?, reply);
        Ok(Self {
            sock,
            reply: reply.to_string(),
        })
    }

    /// Send an OSC message to the reply address.
    pub fn send(&self, msg: OscMessage) -> Result<()> {
        let buf = encoder::encode(&OscPacket::Message(msg))?;
        self.sock.send_to(&buf, &self.reply)?;
        Ok(())
    }

    /// Try to receive a packet without blocking.
    pub fn try_recv(&self) -> Result<Option<OscPacket>> {
        let mut buf = [0u8; 65536];
        match self.sock.recv_from(&mut buf) {
            Ok((size, _)) => {
                let (_, packet) = rosc::decoder::decode_udp(&buf[..size])
                    .map_err(|e| anyhow::anyhow!("Failed to decode OSC packet: {}", e))?;
                Ok(Some(packet))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(anyhow::anyhow!("Failed to receive OSC message: {}", e)),
        }
    }

    /// Every message received since the last call, bundles flattened.
    pub fn drain(&self) -> Vec<OscMessage> {
        let mut messages = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(packet)) => flatten(packet, &mut messages),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("[OSC] {:#}", e);
                    break;
                }
            }
        }
        messages
    }
}

/// Unpack a packet into its messages, depth first.
pub fn flatten(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(msg),
        OscPacket::Bundle(bundle) => {
            for packet in bundle.content {
                flatten(packet, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscBundle, OscTime};
    use std::time::{Duration, Instant};

    fn msg(addr: &str) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: addr.into(),
            args: vec![],
        })
    }

    #[test]
    fn test_flatten_nested_bundles() {
        let inner = OscPacket::Bundle(OscBundle {
            timetag: OscTime::from((1, 0)),
            content: vec![msg("/b"), msg("/c")],
        });
        let outer = OscPacket::Bundle(OscBundle {
            timetag: OscTime::from((1, 0)),
            content: vec![msg("/a"), inner],
        });
        let mut out = Vec::new();
        flatten(outer, &mut out);
        let addrs: Vec<_> = out.iter().map(|m| m.addr.as_str()).collect();
        assert_eq!(addrs, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_send_and_drain_over_loopback() {
        let receiver = OscEndpoint::bind("127.0.0.1:0", "127.0.0.1:9").unwrap();
        let addr = receiver.sock.local_addr().unwrap().to_string();
        let sender = OscEndpoint::bind("127.0.0.1:0", &addr).unwrap();

        assert!(receiver.drain().is_empty());
        sender
            .send(OscMessage {
                addr: "/preset/request_dump".into(),
                args: vec![],
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut received = Vec::new();
        while received.is_empty() && Instant::now() < deadline {
            received = receiver.drain();
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].addr, "/preset/request_dump");
    }
}
