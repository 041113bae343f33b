use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{select, tick, Sender};
use tracing::{debug, warn};

use crate::writer::BatchWriter;

/// Flushes a writer on a fixed interval so that metrics which never fill a
/// batch still get sent. Stopping it flushes one last time.
#[derive(Debug)]
pub struct Flusher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}
impl Flusher {
    pub fn spawn(writer: Arc<BatchWriter>, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let ticker = tick(interval);
        let handle = thread::Builder::new()
            .name("metric-flusher".into())
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => flush(&writer),
                    recv(stopped) -> _ => {
                        flush(&writer);
                        break;
                    }
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the thread after a final flush and waits for it.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("flusher thread panicked");
            }
        }
    }
}
impl Drop for Flusher {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn flush(writer: &BatchWriter) {
    match writer.flush() {
        Ok(()) => debug!("flushed pending samples"),
        Err(e) => warn!("flush incomplete: {e}"),
    }
}
