//! UDP listener for sensor datagrams
//!
//! Each datagram is decoded, applied to the registry and answered with a
//! single acknowledgment byte. Malformed datagrams get no answer.

use std::cell::RefCell;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::devices::{Device, DeviceKey, DeviceRegistry};
use crate::protocol::{Ack, Frame};
use crate::Result;

/// Registry handle shared between tasks on the scheduler thread
///
/// `Rc` keeps the registry from ever being sent to another thread.
pub type SharedRegistry = Rc<RefCell<DeviceRegistry>>;

/// Receive buffer size; anything this long is malformed anyway
const MAX_DATAGRAM: usize = 512;

/// Pause after a failed receive so a broken socket cannot spin the loop
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Apply one datagram to the registry
///
/// Returns the reply to send, or `None` if the datagram is dropped
pub fn handle_datagram(
    registry: &mut DeviceRegistry,
    payload: &[u8],
    addr: SocketAddr,
    now: DateTime<Utc>,
) -> Option<Ack> {
    let frame = match Frame::decode(payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::trace!(%addr, error = %e, "dropping malformed datagram");
            return None;
        }
    };

    match frame {
        Frame::Register {
            device_type,
            chip_id,
        } => {
            registry.upsert(Device::registered(chip_id, device_type, addr, now));
            tracing::info!(%addr, %device_type, chip_id, "device registered");
            Some(Ack::Accepted)
        }
        Frame::Update { device_type, value } => {
            let key = DeviceKey::new(addr, device_type);
            if registry.update(&key, value, now) {
                tracing::debug!(%addr, %device_type, value, "device updated");
                Some(Ack::Accepted)
            } else {
                tracing::debug!(%addr, %device_type, "update for unregistered device");
                Some(Ack::Rejected)
            }
        }
    }
}

/// Apply one result of receiving from the socket
///
/// A failed receive is logged and skipped. Returns the reply and its
/// destination, if any.
pub fn handle_received(
    registry: &mut DeviceRegistry,
    received: io::Result<(usize, SocketAddr)>,
    buf: &[u8],
    now: DateTime<Utc>,
) -> Option<(Ack, SocketAddr)> {
    let (len, addr) = match received {
        Ok(received) => received,
        Err(e) => {
            tracing::warn!(error = %e, "receive failed, listener continues");
            return None;
        }
    };

    handle_datagram(registry, &buf[..len], addr, now).map(|ack| (ack, addr))
}

/// Listens for sensor datagrams and keeps the registry current
pub struct DeviceListener {
    socket: UdpSocket,
    registry: SharedRegistry,
}

impl DeviceListener {
    /// Bind the listener socket
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    #[allow(clippy::future_not_send)]
    pub async fn bind(addr: SocketAddr, registry: SharedRegistry) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "device listener bound");
        Ok(Self { socket, registry })
    }

    /// Address the socket is bound to
    ///
    /// # Errors
    ///
    /// Returns error if the socket address cannot be read
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve datagrams until shutdown is signalled
    ///
    /// Datagrams are handled one at a time in arrival order. Socket errors
    /// are logged and the listener keeps serving.
    #[allow(clippy::future_not_send)]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let received = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("device listener stopping");
                    return;
                }
                received = self.socket.recv_from(&mut buf) => received,
            };
            let failed = received.is_err();

            let reply = {
                let mut registry = self.registry.borrow_mut();
                handle_received(&mut registry, received, &buf, Utc::now())
            };

            if let Some((ack, addr)) = reply
                && let Err(e) = self.socket.send_to(&[ack.as_byte()], addr).await
            {
                tracing::warn!(%addr, error = %e, "failed to send acknowledgment");
            }

            if failed {
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
            }
        }
    }
}
