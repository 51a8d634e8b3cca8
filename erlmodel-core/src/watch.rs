//! Background application of workspace deltas to a model
//!
//! Listeners are notified on the watcher thread.

use crate::model::Model;
use crate::workspace::ResourceDelta;
use crossbeam_channel::{Receiver, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct ModelWatcher {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<usize>>,
}

impl ModelWatcher {
    /// Start applying every delta received on `deltas` to `model`
    pub fn spawn(model: Arc<Model>, deltas: Receiver<ResourceDelta>) -> io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("erlmodel-watcher".to_string())
            .spawn(move || {
                let mut applied = 0usize;
                loop {
                    crossbeam_channel::select! {
                        recv(stop_rx) -> _ => break,
                        recv(deltas) -> msg => {
                            let Ok(delta) = msg else {
                                tracing::debug!("delta stream closed");
                                break;
                            };
                            model.apply_delta(&delta);
                            applied += 1;
                        }
                    }
                }
                applied
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the watcher and wait for it; returns the number of deltas applied
    pub fn stop(mut self) -> usize {
        self.shutdown()
    }

    fn shutdown(&mut self) -> usize {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(applied)) => applied,
            Some(Err(_)) => {
                tracing::error!("model watcher thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for ModelWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
