//! Pipelined transfers: many READ or WRITE packets in flight at once
//!
//! [`TransferWindow`] decides which packets to issue and which completions
//! still count. [`run`] sends packets from its own task, in offset order,
//! and awaits each reply in a tokio task of its own.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, trace};

/// Bytes of WRITE request overhead kept out of each write packet
pub const WRITE_OVERHEAD: u32 = 0x70;

/// One slice of the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet {
    pub offset: u64,
    pub length: u32,
}

impl Packet {
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    /// Packets allowed in flight at once
    pub concurrency: usize,
    pub packet_size: u32,
}

impl TransferLimits {
    pub fn new(concurrency: usize, packet_size: u32) -> Self {
        Self {
            concurrency: concurrency.max(1),
            packet_size: packet_size.max(1),
        }
    }

    /// Reads use the full negotiated size, capped by the configured maximum
    pub fn for_read(concurrency: usize, max_packet_size: u32, max_read_size: u32) -> Self {
        Self::new(concurrency, negotiated(max_packet_size, max_read_size))
    }

    pub fn for_write(concurrency: usize, max_packet_size: u32, max_write_size: u32) -> Self {
        let size = negotiated(max_packet_size, max_write_size);
        Self::new(concurrency, size.saturating_sub(WRITE_OVERHEAD))
    }
}

fn negotiated(configured: u32, server: u32) -> u32 {
    if server == 0 {
        configured
    } else {
        configured.min(server)
    }
}

/// What happened to a finished packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Counted toward the transfer
    Accepted,
    /// Arrived after the transfer had already failed
    Discarded,
    /// This packet failed the transfer
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Accepting,
    Failed,
}

/// Issue/complete bookkeeping for one transfer, independent of any I/O.
///
/// Packets are issued in increasing offset order and may complete in any
/// order. After the first failure no further packets are issued and every
/// later completion is discarded.
#[derive(Debug, Clone)]
pub struct TransferWindow {
    total: u64,
    offset: u64,
    in_flight: usize,
    limits: TransferLimits,
    state: WindowState,
}

impl TransferWindow {
    pub fn new(total: u64, limits: TransferLimits) -> Self {
        Self {
            total,
            offset: 0,
            in_flight: 0,
            limits: TransferLimits::new(limits.concurrency, limits.packet_size),
            state: WindowState::Accepting,
        }
    }

    /// Packets that may be issued now
    pub fn refill(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        if self.state == WindowState::Failed {
            return packets;
        }
        while self.in_flight < self.limits.concurrency && self.offset < self.total {
            let remaining = self.total.saturating_sub(self.offset);
            let length = u64::from(self.limits.packet_size).min(remaining) as u32;
            packets.push(Packet {
                offset: self.offset,
                length,
            });
            self.in_flight += 1;
            self.offset += u64::from(length);
        }
        packets
    }

    /// Record a finished packet
    pub fn on_completion(&mut self, ok: bool) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);
        match (self.state, ok) {
            (WindowState::Failed, _) => Completion::Discarded,
            (WindowState::Accepting, true) => Completion::Accepted,
            (WindowState::Accepting, false) => {
                self.state = WindowState::Failed;
                Completion::Failed
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_failed(&self) -> bool {
        self.state == WindowState::Failed
    }

    pub fn is_done(&self) -> bool {
        self.state == WindowState::Accepting && self.in_flight == 0 && self.offset >= self.total
    }
}

/// Moves packets over the wire in two phases
#[async_trait]
pub trait PacketIo: Send + Sync + 'static {
    /// A sent packet waiting for its reply
    type Pending: Send + 'static;
    type Output: Send + 'static;

    /// Put one packet on the wire. Calls arrive in increasing offset order
    /// and each returns once the request is written.
    async fn send(&self, packet: Packet) -> Result<Self::Pending>;

    /// Wait for the reply to a sent packet
    async fn receive(&self, pending: Self::Pending) -> Result<Self::Output>;
}

type PacketTasks<T> = JoinSet<(Packet, Result<T>)>;

/// Transfer `total` bytes through `io`, handing each packet's output to
/// `accept` as it completes.
///
/// The first error, from `io` or from `accept`, ends the transfer and is the
/// one returned. Packets still in flight at that point are left to finish
/// on their own and their results are dropped.
pub async fn run<I, F>(io: Arc<I>, total: u64, limits: TransferLimits, mut accept: F) -> Result<()>
where
    I: PacketIo,
    F: FnMut(Packet, I::Output) -> Result<()>,
{
    let mut window = TransferWindow::new(total, limits);
    let mut tasks: PacketTasks<I::Output> = JoinSet::new();
    if let Err(e) = issue(&mut window, &mut tasks, &io).await {
        abandon(tasks, window);
        return Err(e);
    }

    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(task_error)
            .and_then(|(packet, result)| result.map(|output| (packet, output)))
            .and_then(|(packet, output)| accept(packet, output));

        if let Err(e) = outcome {
            window.on_completion(false);
            abandon(tasks, window);
            return Err(e);
        }
        window.on_completion(true);
        if window.is_done() {
            break;
        }
        if let Err(e) = issue(&mut window, &mut tasks, &io).await {
            abandon(tasks, window);
            return Err(e);
        }
    }

    if window.is_done() {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "Transfer stopped with {} packets outstanding",
            window.in_flight()
        )))
    }
}

/// Send every packet the window allows, one after another
async fn issue<I: PacketIo>(
    window: &mut TransferWindow,
    tasks: &mut PacketTasks<I::Output>,
    io: &Arc<I>,
) -> Result<()> {
    let packets = window.refill();
    let mut unsent = packets.len();
    for packet in packets {
        unsent -= 1;
        trace!("Issuing packet at {} ({} bytes)", packet.offset, packet.length);
        let pending = match io.send(packet).await {
            Ok(pending) => pending,
            Err(e) => {
                window.on_completion(false);
                // Refilled but never sent
                for _ in 0..unsent {
                    window.on_completion(false);
                }
                return Err(e);
            }
        };
        let io = Arc::clone(io);
        tasks.spawn(async move {
            let result = io.receive(pending).await;
            (packet, result)
        });
    }
    Ok(())
}

/// Let in-flight packets of a failed transfer finish in the background
fn abandon<T: Send + 'static>(mut tasks: PacketTasks<T>, mut window: TransferWindow) {
    if tasks.is_empty() {
        return;
    }
    tokio::spawn(async move {
        let mut abandoned = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let ok = matches!(joined, Ok((_, Ok(_))));
            if window.on_completion(ok) == Completion::Discarded {
                abandoned += 1;
            }
        }
        debug!("Discarded {} packets of a failed transfer", abandoned);
    });
}

fn task_error(e: JoinError) -> Error {
    Error::InvalidState(format!("Packet task did not finish: {}", e))
}

/// Read `total` bytes, placing each packet at its offset
pub async fn read_pipelined<I>(io: Arc<I>, total: u64, limits: TransferLimits) -> Result<Vec<u8>>
where
    I: PacketIo<Output = Bytes>,
{
    let too_large = || Error::InvalidParameter(format!("{} bytes do not fit in memory", total));
    let len = usize::try_from(total).map_err(|_| too_large())?;
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| too_large())?;
    buffer.resize(len, 0);

    run(io, total, limits, |packet, data| {
        if data.len() != packet.length as usize {
            return Err(Error::InvalidMessage(format!(
                "Read at offset {} returned {} of {} bytes",
                packet.offset,
                data.len(),
                packet.length
            )));
        }
        let start = packet.offset as usize;
        buffer[start..start + data.len()].copy_from_slice(&data);
        Ok(())
    })
    .await?;

    Ok(buffer)
}

/// Write `total` bytes; `io` supplies the data for each packet
pub async fn write_pipelined<I>(io: Arc<I>, total: u64, limits: TransferLimits) -> Result<u64>
where
    I: PacketIo<Output = u32>,
{
    let mut written = 0u64;
    run(io, total, limits, |packet, count| {
        if count != packet.length {
            return Err(Error::InvalidMessage(format!(
                "Write at offset {} accepted {} of {} bytes",
                packet.offset, count, packet.length
            )));
        }
        written += u64::from(count);
        Ok(())
    })
    .await?;
    Ok(written)
}
