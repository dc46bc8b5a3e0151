mod availability;
mod error;
mod intake;
mod ledger;
mod queries;

pub use availability::{booked_rooms, free_rooms, next_available_date, quote_total};
pub use error::EngineError;
pub use intake::{BookingRequest, NewProperty, PropertyEdit};
pub use ledger::Ledger;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedProperty = Arc<RwLock<Property>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block on the first append, drain whatever else is immediately queued,
/// then flush and fsync the whole batch once.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush what we have before the non-append command.
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes don't
    // leak into the next batch (these callers were already told it failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: inventory map, slug index, and reservation ledger,
/// durably backed by the WAL. One instance per process.
pub struct Engine {
    pub(crate) properties: DashMap<Ulid, SharedProperty>,
    /// slug → property id. Kept in lockstep with the property map.
    pub(crate) slugs: DashMap<String, Ulid>,
    pub(crate) ledger: Ledger,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            properties: DashMap::new(),
            slugs: DashMap::new(),
            ledger: Ledger::new(),
            wal_tx,
            notify,
        };
        for event in &events {
            engine.apply_replayed(event);
        }
        Ok(engine)
    }

    /// Apply one event during replay. We are the sole owner of every Arc at
    /// this point, so try_write always succeeds instantly.
    fn apply_replayed(&self, event: &Event) {
        match event {
            Event::PropertyCreated { property } => {
                self.slugs.insert(property.slug.clone(), property.id);
                self.properties
                    .insert(property.id, Arc::new(RwLock::new(property.clone())));
            }
            Event::PropertyUpdated { property } => {
                if let Some(entry) = self.properties.get(&property.id) {
                    let arc = entry.value().clone();
                    let mut guard = arc.try_write().expect("replay: uncontended write");
                    if guard.slug != property.slug {
                        self.slugs.remove(&guard.slug);
                    }
                    *guard = property.clone();
                }
                self.slugs.insert(property.slug.clone(), property.id);
            }
            Event::PropertyDeleted { id } => {
                if let Some((_, arc)) = self.properties.remove(id) {
                    let guard = arc.try_read().expect("replay: uncontended read");
                    self.slugs.remove(&guard.slug);
                }
            }
            Event::BookingCreated { booking } => {
                self.ledger.insert(booking.clone());
            }
            Event::BookingConfirmed { id, order_id, payment_id } => {
                self.ledger.confirm(id, order_id, payment_id);
            }
            Event::BookingCancelled { id } => {
                self.ledger.cancel(id);
            }
        }
    }

    /// Write an event to the WAL via the background group-commit writer.
    pub(crate) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event: event.clone(), response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_property(&self, id: &Ulid) -> Option<SharedProperty> {
        self.properties.get(id).map(|e| e.value().clone())
    }

    pub fn property_id_by_slug(&self, slug: &str) -> Option<Ulid> {
        self.slugs.get(slug).map(|e| *e.value())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Rewrite the WAL with only the events needed to recreate current state:
    /// one creation event per live property, one per ledger row.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        let arcs: Vec<SharedProperty> =
            self.properties.iter().map(|e| e.value().clone()).collect();
        for arc in arcs {
            let guard = arc.read().await;
            events.push(Event::PropertyCreated { property: guard.clone() });
        }
        for booking in self.ledger.all() {
            events.push(Event::BookingCreated { booking });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Ms
}
