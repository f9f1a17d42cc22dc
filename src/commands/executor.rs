//! Command executor
//!
//! Owns the inbound queue and the single worker thread that drains it. One
//! message is processed to completion, mixer round-trips included, before the
//! next one is taken off the queue.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::dispatcher::{DispatchReport, Dispatcher};
use crate::chat::{ChatTransport, InboundMessage};
use crate::mixer::MixerClient;

/// Items on the inbound queue
#[derive(Debug, Clone)]
pub enum Inbound {
    Message(InboundMessage),
    Shutdown,
}

/// Totals reported when the worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub received: usize,
    pub handled: usize,
    pub failed: usize,
}

impl ExecutorStats {
    fn record(&mut self, report: &DispatchReport) {
        self.received += 1;
        match report {
            DispatchReport::Handled(_) => self.handled += 1,
            DispatchReport::Failed(_) | DispatchReport::Aborted => self.failed += 1,
            DispatchReport::Unauthorized | DispatchReport::Unmatched => {}
        }
    }
}

pub struct CommandExecutor<M: MixerClient> {
    inbox_tx: Sender<Inbound>,
    inbox_rx: Receiver<Inbound>,
    dispatcher: Arc<Dispatcher<M>>,
    transport: Arc<dyn ChatTransport>,
}

impl<M: MixerClient + 'static> CommandExecutor<M> {
    pub fn new(dispatcher: Arc<Dispatcher<M>>, transport: Arc<dyn ChatTransport>) -> Self {
        let (tx, rx) = unbounded();

        Self {
            inbox_tx: tx,
            inbox_rx: rx,
            dispatcher,
            transport,
        }
    }

    /// Get a sender for submitting inbound messages
    pub fn sender(&self) -> Sender<Inbound> {
        self.inbox_tx.clone()
    }

    /// Dispatch a message on the calling thread (blocking)
    pub fn execute_sync(&self, message: &InboundMessage) -> DispatchReport {
        self.dispatcher.dispatch(message, self.transport.as_ref())
    }

    /// Queue a message for the worker thread
    pub fn execute(&self, message: InboundMessage) {
        let _ = self.inbox_tx.send(Inbound::Message(message));
    }

    /// Ask the worker to stop once everything queued before is processed
    pub fn shutdown(&self) {
        let _ = self.inbox_tx.send(Inbound::Shutdown);
    }

    /// Start the processing loop in a background thread
    pub fn start_processing(&self) -> JoinHandle<ExecutorStats> {
        let rx = self.inbox_rx.clone();
        let dispatcher = Arc::clone(&self.dispatcher);
        let transport = Arc::clone(&self.transport);

        thread::spawn(move || {
            tracing::info!("Command executor thread started");
            let mut stats = ExecutorStats::default();

            while let Ok(inbound) = rx.recv() {
                match inbound {
                    Inbound::Message(message) => {
                        let report = dispatcher.dispatch(&message, transport.as_ref());
                        tracing::debug!("Message {:?} -> {:?}", message.id, report);
                        stats.record(&report);
                    }
                    Inbound::Shutdown => {
                        tracing::info!("Shutdown requested, stopping executor");
                        break;
                    }
                }
            }

            tracing::info!(
                "Command executor thread stopped ({} received, {} handled, {} failed)",
                stats.received,
                stats.handled,
                stats.failed
            );
            stats
        })
    }
}
