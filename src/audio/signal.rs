//! Skip/replay mailboxes between command tasks and the playback loop.
//!
//! Each signal kind has its own channel with room for a single pending
//! signal. A sender that finds one already pending waits up to the
//! configured timeout for the loop to consume it, then gives up.

use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::debug;

use crate::error::PlayerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Skip,
    Replay,
}

pub fn signal_channel(timeout: Duration) -> (SignalSender, SignalReceiver) {
    let (skip_tx, skip_rx) = mpsc::channel(1);
    let (replay_tx, replay_rx) = mpsc::channel(1);

    (
        SignalSender {
            skip: skip_tx,
            replay: replay_tx,
            timeout,
        },
        SignalReceiver {
            skip: skip_rx,
            replay: replay_rx,
        },
    )
}

#[derive(Debug, Clone)]
pub struct SignalSender {
    skip: mpsc::Sender<()>,
    replay: mpsc::Sender<()>,
    timeout: Duration,
}

impl SignalSender {
    pub async fn send(&self, signal: Signal) -> Result<(), PlayerError> {
        let tx = match signal {
            Signal::Skip => &self.skip,
            Signal::Replay => &self.replay,
        };

        match tx.send_timeout((), self.timeout).await {
            Ok(()) => {
                debug!("📨 Señal {:?} entregada", signal);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(())) => Err(PlayerError::SignalTimeout(signal, self.timeout)),
            // El receptor vive en el reproductor: si se cerró, nadie va a escuchar
            Err(SendTimeoutError::Closed(())) => Err(PlayerError::Exited),
        }
    }
}

#[derive(Debug)]
pub struct SignalReceiver {
    skip: mpsc::Receiver<()>,
    replay: mpsc::Receiver<()>,
}

impl SignalReceiver {
    /// Waits for the next signal. Skip wins when both are pending.
    ///
    /// Cancel safe: a signal is only taken out of its mailbox when returned.
    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            biased;
            Some(()) = self.skip.recv() => Some(Signal::Skip),
            Some(()) = self.replay.recv() => Some(Signal::Replay),
            else => None,
        }
    }

    /// Descarta señales que quedaron de una reproducción anterior
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.skip.try_recv().is_ok() {
            dropped += 1;
        }
        while self.replay.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_skip_is_delivered() {
        let (tx, mut rx) = signal_channel(Duration::from_millis(50));
        tx.send(Signal::Skip).await.unwrap();
        assert_eq!(rx.recv().await, Some(Signal::Skip));
    }

    #[tokio::test]
    async fn test_skip_wins_over_replay() {
        let (tx, mut rx) = signal_channel(Duration::from_millis(50));
        tx.send(Signal::Replay).await.unwrap();
        tx.send(Signal::Skip).await.unwrap();
        assert_eq!(rx.recv().await, Some(Signal::Skip));
        assert_eq!(rx.recv().await, Some(Signal::Replay));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pending_skip_times_out() {
        let (tx, mut rx) = signal_channel(Duration::from_secs(5));
        tx.send(Signal::Skip).await.unwrap();

        let err = tx.send(Signal::Skip).await.unwrap_err();
        assert!(matches!(err, PlayerError::SignalTimeout(Signal::Skip, _)));

        // Solo una señal pendiente
        assert_eq!(rx.drain(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_skip_does_not_block_replay() {
        let (tx, _rx) = signal_channel(Duration::from_secs(5));
        tx.send(Signal::Skip).await.unwrap();
        tx.send(Signal::Replay).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_receiver_reports_exit() {
        let (tx, rx) = signal_channel(Duration::from_millis(50));
        drop(rx);
        assert!(matches!(tx.send(Signal::Skip).await, Err(PlayerError::Exited)));
    }

    #[tokio::test]
    async fn test_drain_clears_both_mailboxes() {
        let (tx, mut rx) = signal_channel(Duration::from_millis(50));
        tx.send(Signal::Skip).await.unwrap();
        tx.send(Signal::Replay).await.unwrap();
        assert_eq!(rx.drain(), 2);
        assert_eq!(rx.drain(), 0);
    }
}
