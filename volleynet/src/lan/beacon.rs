//! UDP multicast beacon.
//!
//! Joins the shared discovery group, repeats the sealed self-announcement at
//! a fixed interval and forwards every record observed on the group. The
//! protocol-level filtering (self-echo, foreign tags, missing credentials)
//! happens one layer up in the discovery channel.

use crate::discovery::Beacon;
use crate::error::{Result, VolleyError};
use crate::lan::crypto::{self, discovery_key};
use crate::protocol::announce::Announcement;
use crate::protocol::constants::{ANNOUNCE_INTERVAL, DISCOVERY_GROUP, DISCOVERY_PORT};
use futures::Stream;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Seals an announcement into its discovery frame.
pub fn marshal_announcement(record: &Announcement) -> Result<Vec<u8>> {
    let text = record.marshal()?;
    crypto::seal(text.as_bytes(), discovery_key())
        .map_err(|e| VolleyError::Discovery(e.to_string()))
}

/// Opens a discovery frame back into an announcement.
pub fn unmarshal_announcement(data: &[u8]) -> Result<Announcement> {
    let plaintext = crypto::open(data, discovery_key())
        .map_err(|e| VolleyError::Discovery(e.to_string()))?;
    let text = std::str::from_utf8(&plaintext)
        .map_err(|e| VolleyError::Malformed(format!("invalid UTF-8: {}", e)))?;
    Announcement::unmarshal(text)
}

/// Multicast implementation of the [`Beacon`] contract.
pub struct UdpBeacon {
    socket: Arc<UdpSocket>,
    group: SocketAddr,
    interval: Duration,
    broadcast_task: Mutex<Option<JoinHandle<()>>>,
    listen_task: Mutex<Option<JoinHandle<()>>>,
    record_tx: mpsc::UnboundedSender<Announcement>,
    record_rx: Arc<Mutex<mpsc::UnboundedReceiver<Announcement>>>,
}

impl UdpBeacon {
    /// Binds the group socket with the default announce interval.
    pub async fn bind() -> Result<Self> {
        Self::bind_with(ANNOUNCE_INTERVAL).await
    }

    /// Binds the group socket. Reuse options let several nodes share the
    /// discovery port on one host.
    pub async fn bind_with(interval: Duration) -> Result<Self> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DISCOVERY_PORT);

        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        socket.join_multicast_v4(DISCOVERY_GROUP, Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_loop_v4(true)?;

        let (record_tx, record_rx) = mpsc::unbounded_channel();

        Ok(Self {
            socket: Arc::new(socket),
            group: SocketAddr::new(IpAddr::V4(DISCOVERY_GROUP), DISCOVERY_PORT),
            interval,
            broadcast_task: Mutex::new(None),
            listen_task: Mutex::new(None),
            record_tx,
            record_rx: Arc::new(Mutex::new(record_rx)),
        })
    }
}

impl Beacon for UdpBeacon {
    async fn start_broadcast(&self, record: &Announcement) -> Result<()> {
        let mut task = self.broadcast_task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let frame = marshal_announcement(record)?;
        let socket = self.socket.clone();
        let group = self.group;
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = socket.send_to(&frame, group).await {
                    tracing::debug!("announcement send failed: {}", e);
                }
            }
        }));
        Ok(())
    }

    async fn stop_broadcast(&self) {
        if let Some(task) = self.broadcast_task.lock().await.take() {
            task.abort();
        }
    }

    async fn start_listening(&self) -> Result<()> {
        let mut task = self.listen_task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let socket = self.socket.clone();
        let record_tx = self.record_tx.clone();

        *task = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, _addr)) => match unmarshal_announcement(&buf[..n]) {
                        Ok(record) => {
                            let _ = record_tx.send(record);
                        }
                        // foreign traffic on a shared group is expected
                        Err(e) => tracing::trace!("unreadable discovery frame: {}", e),
                    },
                    Err(e) => {
                        tracing::debug!("discovery socket receive error: {}", e);
                        break;
                    }
                }
            }
        }));
        Ok(())
    }

    async fn stop_listening(&self) {
        if let Some(task) = self.listen_task.lock().await.take() {
            task.abort();
        }
    }

    fn announcements(&self) -> Pin<Box<dyn Stream<Item = Announcement> + Send>> {
        let rx = self.record_rx.clone();
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut locked_rx = rx.lock().await;
            let record = locked_rx.recv().await;
            drop(locked_rx);
            record.map(|r| (r, rx))
        }))
    }
}

impl Drop for UdpBeacon {
    fn drop(&mut self) {
        if let Some(task) = self.broadcast_task.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.listen_task.get_mut().take() {
            task.abort();
        }
    }
}
