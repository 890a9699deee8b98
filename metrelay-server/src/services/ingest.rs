//! The statsd UDP listener.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use metrelay_log::LogError;
use metrelay_statsd::metric;
use parking_lot::Mutex;
use tokio::net::UdpSocket;

use crate::aggregator::SnapshotAggregator;
use crate::protocol::StatsdLine;
use crate::shutdown::ShutdownHandle;
use crate::statsd::ServerCounters;

/// Receives statsd datagrams and records them in the aggregator.
#[derive(Debug)]
pub struct IngestService {
    socket: UdpSocket,
    aggregator: Arc<Mutex<SnapshotAggregator>>,
    max_packet_size: usize,
}

impl IngestService {
    /// Binds the UDP socket.
    pub async fn bind(
        addr: SocketAddr,
        aggregator: Arc<Mutex<SnapshotAggregator>>,
        max_packet_size: usize,
    ) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;

        Ok(Self {
            socket,
            aggregator,
            max_packet_size,
        })
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Parses all lines of a datagram and records the valid ones.
    pub fn handle_packet(&self, data: &[u8]) {
        metric!(counter(ServerCounters::IngestPackets) += 1);

        let mut invalid = 0i64;
        let mut aggregator = self.aggregator.lock();

        for result in StatsdLine::parse_all(data) {
            match result {
                Ok(line) => aggregator.insert(line),
                Err(error) => {
                    invalid += 1;
                    metrelay_log::debug!(
                        line = %String::from_utf8_lossy(error.line()),
                        "dropping statsd line: {}",
                        LogError(&error)
                    );
                }
            }
        }

        metric!(counter(ServerCounters::IngestInvalidLines) += invalid);
    }

    /// Receives datagrams until shutdown.
    pub async fn run(self, mut shutdown: ShutdownHandle) {
        match self.local_addr() {
            Ok(addr) => metrelay_log::info!("statsd listening on udp://{addr}"),
            Err(_) => metrelay_log::info!("statsd listening"),
        }

        let mut buffer = vec![0; self.max_packet_size];

        loop {
            tokio::select! {
                biased;

                _ = shutdown.notified() => break,
                result = self.socket.recv_from(&mut buffer) => match result {
                    Ok((len, _)) => self.handle_packet(&buffer[..len]),
                    Err(error) => {
                        metrelay_log::error!("failed to receive datagram: {}", LogError(&error));
                    }
                },
            }
        }

        metrelay_log::info!("statsd listener stopped");
    }
}
