//! Notification delivery
//!
//! The store calls the reader callback from whichever task raised the
//! notification. The callback only flags the type as pending; the worker
//! flushes pending types between frames.
//!
//! Info, error and alert entries are marked read as soon as they are sent.
//! Data entries stay unread until the server acknowledges them with `h<id>`,
//! so anything unacknowledged is sent again after the next login.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use ovms_core::notify::NotifyCallback;
use ovms_core::{NotifyEntry, NotifyStore, NotifyType, ReaderId};
use tracing::debug;

use crate::codec::mp_encode;
use crate::error::LinkError;
use crate::session::FrameSink;

/// Reader name registered with the notification store
pub const READER_NAME: &str = "ovms-server-v2";

/// Per-type "something to send" flags
#[derive(Debug, Default)]
pub struct PendingNotify {
    flags: [AtomicBool; 4],
}

fn slot(ty: NotifyType) -> usize {
    match ty {
        NotifyType::Info => 0,
        NotifyType::Error => 1,
        NotifyType::Alert => 2,
        NotifyType::Data => 3,
    }
}

impl PendingNotify {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ty: NotifyType) {
        self.flags[slot(ty)].store(true, Ordering::Release);
    }

    pub fn is_set(&self, ty: NotifyType) -> bool {
        self.flags[slot(ty)].load(Ordering::Acquire)
    }

    pub fn take(&self, ty: NotifyType) -> bool {
        self.flags[slot(ty)].swap(false, Ordering::AcqRel)
    }

    pub fn set_all(&self) {
        for ty in NotifyType::ALL {
            self.set(ty);
        }
    }
}

/// Reader callback that flags arrivals and leaves entries unread
///
/// Once the engine is gone the callback consumes everything it is offered.
pub fn reader_callback(pending: Weak<PendingNotify>) -> NotifyCallback {
    Arc::new(move |ty: NotifyType, _entry: &NotifyEntry| match pending.upgrade() {
        Some(pending) => {
            pending.set(ty);
            false
        }
        None => true,
    })
}

/// Frame for one entry
pub fn frame(ty: NotifyType, entry: &NotifyEntry) -> String {
    match ty {
        NotifyType::Info => format!("MP-0 PI{}", mp_encode(&entry.value)),
        // Error payloads are already "<vehicletype>,<code>,<data>"
        NotifyType::Error => format!("MP-0 PE{}", entry.value),
        NotifyType::Alert => format!("MP-0 PA{}", mp_encode(&entry.value)),
        NotifyType::Data => format!(
            "MP-0 h{},{},{}",
            entry.id,
            entry.age().as_secs(),
            entry.first_line()
        ),
    }
}

/// Sends queued notifications for one registered reader
#[derive(Debug)]
pub struct NotificationDelivery {
    store: Arc<NotifyStore>,
    reader: ReaderId,
    pending: Arc<PendingNotify>,
    /// Highest data id sent on this connection
    data_last: u32,
}

impl NotificationDelivery {
    /// Register the reader and return the delivery handle
    pub fn register(store: Arc<NotifyStore>) -> Self {
        let pending = Arc::new(PendingNotify::new());
        let reader = store.register_reader(READER_NAME, reader_callback(Arc::downgrade(&pending)));
        Self {
            store,
            reader,
            pending,
            data_last: 0,
        }
    }

    #[cfg(test)]
    fn pending(&self) -> &Arc<PendingNotify> {
        &self.pending
    }

    /// Fresh login: everything unread is due again, data included
    pub fn reset(&mut self) {
        self.pending.set_all();
        self.data_last = 0;
    }

    /// Send every pending type, in info, error, alert, data order
    pub async fn flush(&mut self, sink: &mut dyn FrameSink) -> Result<(), LinkError> {
        for ty in NotifyType::ALL {
            if !self.pending.take(ty) {
                continue;
            }
            match ty {
                NotifyType::Data => self.flush_data(sink).await?,
                _ => self.flush_read_on_send(ty, sink).await?,
            }
        }
        Ok(())
    }

    async fn flush_read_on_send(
        &mut self,
        ty: NotifyType,
        sink: &mut dyn FrameSink,
    ) -> Result<(), LinkError> {
        while let Some(entry) = self.store.first_unread(ty, self.reader, 0) {
            if let Err(e) = sink.send_frame(&frame(ty, &entry)).await {
                // Still unread; try again next connection
                self.pending.set(ty);
                return Err(e);
            }
            self.store.mark_read(ty, self.reader, entry.id);
        }
        Ok(())
    }

    async fn flush_data(&mut self, sink: &mut dyn FrameSink) -> Result<(), LinkError> {
        while let Some(entry) = self
            .store
            .first_unread(NotifyType::Data, self.reader, self.data_last)
        {
            if let Err(e) = sink.send_frame(&frame(NotifyType::Data, &entry)).await {
                self.pending.set(NotifyType::Data);
                return Err(e);
            }
            self.data_last = entry.id;
        }
        Ok(())
    }

    /// Server acknowledged data entry `id`
    pub fn ack(&self, id: u32) {
        match self.store.find_entry(NotifyType::Data, id) {
            Some(entry) => {
                debug!(id, "Data notification acknowledged");
                self.store.mark_read(NotifyType::Data, self.reader, entry.id);
            }
            None => debug!(id, "Acknowledgement for unknown data notification"),
        }
    }

    /// Unregister the reader
    pub fn unregister(&self) {
        self.store.clear_reader(READER_NAME);
    }
}
