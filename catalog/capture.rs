// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! A capture thread: one UDP socket, one tracking protocol, one or more devices sharing it.
//!
//! Each thread blocks on `recv` with a bounded timeout so it notices a shutdown signal
//! promptly without busy-polling. Malformed or failed-checksum packets are logged and
//! dropped; they never stop the thread or propagate to the recording session.

use crate::protocol::Protocol;
use crate::sample::{TakeBuffer, TrackingSample};
use base::timecode;
use base::{bail, err, shutdown, Error};
use parking_lot::Mutex;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long `recv` blocks before re-checking the shutdown signal.
const RECV_POLL: Duration = Duration::from_secs(1);

/// A device sharing a capture socket: its config name, and (for multi-device protocols) the
/// key the wire protocol uses to identify which physical unit a packet came from.
#[derive(Clone, Debug)]
pub struct DeviceBinding {
    pub device_name: String,
    pub protocol_key: String,
}

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub bind_addr: SocketAddr,
    pub protocol_id: String,
    pub frame_rate: i64,
    pub devices: Vec<DeviceBinding>,
}

/// A running capture thread. Dropping this does not stop the thread; call [`CaptureThread::join`]
/// after signaling shutdown.
pub struct CaptureThread {
    bind_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl CaptureThread {
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!(addr = %self.bind_addr, "capture thread panicked");
        }
    }
}

/// Binds `config.bind_addr` and spawns a thread that decodes packets into `buffer` until
/// `shutdown` fires. Returns as soon as the socket is bound and the thread is running;
/// capture errors after that point are logged, not returned.
pub fn spawn(
    config: CaptureConfig,
    buffer: Arc<Mutex<TakeBuffer>>,
    shutdown: shutdown::Receiver,
) -> Result<CaptureThread, Error> {
    let protocol = crate::protocol::lookup(&config.protocol_id)?;
    if config.devices.len() > 1 && !protocol.supports_multi_device {
        bail!(
            ConfigError,
            msg(
                "protocol {:?} does not support multiple devices on one port, but {} were configured",
                config.protocol_id,
                config.devices.len()
            )
        );
    }

    let socket = UdpSocket::bind(config.bind_addr)
        .map_err(|e| err!(BindError, msg("binding capture socket {}", config.bind_addr), source(e)))?;
    socket
        .set_read_timeout(Some(RECV_POLL))
        .map_err(|e| err!(BindError, msg("setting capture socket timeout"), source(e)))?;

    let bind_addr = config.bind_addr;
    let frame_rate = config.frame_rate;
    let devices = config.devices;
    let handle = std::thread::Builder::new()
        .name(format!("capture-{bind_addr}"))
        .spawn(move || run(socket, protocol, frame_rate, &devices, buffer, shutdown))
        .map_err(|e| err!(Internal, msg("spawning capture thread for {bind_addr}"), source(e)))?;

    Ok(CaptureThread { bind_addr, handle })
}

fn device_name_for_key<'a>(devices: &'a [DeviceBinding], key: &str) -> Option<&'a str> {
    if devices.len() == 1 {
        return Some(devices[0].device_name.as_str());
    }
    devices
        .iter()
        .find(|d| d.protocol_key == key)
        .map(|d| d.device_name.as_str())
}

fn run(
    socket: UdpSocket,
    protocol: &'static Protocol,
    frame_rate: i64,
    devices: &[DeviceBinding],
    buffer: Arc<Mutex<TakeBuffer>>,
    shutdown: shutdown::Receiver,
) {
    let addr = socket.local_addr().ok();
    info!(?addr, protocol = protocol.id, "capture thread starting");
    let mut recv_buf = vec![0u8; protocol.packet_len.max(1500)];

    while shutdown.check().is_ok() {
        let (n, _peer) = match socket.recv_from(&mut recv_buf) {
            Ok(v) => v,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                warn!(?addr, error = %e, "capture socket recv failed");
                continue;
            }
        };

        let Some(decoded) = protocol.decode(&recv_buf[..n]) else {
            debug!(?addr, "dropping packet that is not a transform message for this protocol");
            continue;
        };
        if !decoded.valid {
            debug!(?addr, key = %decoded.key, "dropping malformed packet");
            continue;
        }

        let Some(device_name) = device_name_for_key(devices, &decoded.key) else {
            debug!(?addr, key = %decoded.key, "packet from unconfigured device, dropping");
            continue;
        };

        let frame = match timecode::system_timecode_as_frames(frame_rate) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "could not derive system timecode, dropping sample");
                continue;
            }
        };
        let smpte = timecode::frames_to_smpte(frame_rate, frame).unwrap_or_default();

        let sample = TrackingSample {
            frame,
            timecode: smpte,
            ..decoded.sample
        };
        buffer.lock().push(device_name, sample);
    }

    info!(?addr, "capture thread stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn freed_packet(camera_id: u8) -> Vec<u8> {
        let mut p = vec![0u8; crate::freed::PACKET_LEN];
        p[0] = 0xD1;
        p[1] = camera_id;
        let mut sum: u8 = 0x40;
        for &b in &p[..p.len() - 1] {
            sum = sum.wrapping_sub(b);
        }
        *p.last_mut().unwrap() = sum;
        p
    }

    #[test]
    fn captures_a_single_device_packet() {
        let (tx, rx) = shutdown::channel();
        let buffer = Arc::new(Mutex::new(TakeBuffer::new()));
        let config = CaptureConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            protocol_id: "freed".to_string(),
            frame_rate: 24,
            devices: vec![DeviceBinding {
                device_name: "cam1".to_string(),
                protocol_key: "0".to_string(),
            }],
        };
        let thread = spawn(config, buffer.clone(), rx).unwrap();
        let bound = thread.bind_addr();

        let sender = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        sender.send_to(&freed_packet(0), bound).unwrap();

        // Poll briefly for the sample to land; the thread wakes at most every RECV_POLL.
        for _ in 0..50 {
            if !buffer.lock().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(buffer.lock().samples("cam1").len(), 1);

        drop(tx);
        thread.join();
    }

    #[test]
    fn multi_device_rejected_for_single_device_protocol_mismatch_is_not_triggered_by_one_device() {
        let (_tx, rx) = shutdown::channel();
        let buffer = Arc::new(Mutex::new(TakeBuffer::new()));
        let config = CaptureConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            protocol_id: "freed".to_string(),
            frame_rate: 24,
            devices: vec![DeviceBinding {
                device_name: "cam1".to_string(),
                protocol_key: "0".to_string(),
            }],
        };
        assert!(spawn(config, buffer, rx).is_ok());
    }
}
