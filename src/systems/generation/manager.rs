// FIFO work queue feeding urban areas through the road network generator, one at a time
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bevy::log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio::sync::Notify;

use crate::config::*;
use crate::systems::city::CityDataModel;
use crate::systems::geometry::Polygon;

use super::RoadNetworkGenerator;

#[derive(Debug, Clone, Copy)]
pub struct ManagerSettings {
    /// Passed to the generator for every area.
    pub cell_size: u32,
    /// Pause between two areas.
    pub delay: Duration,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            cell_size: MANAGER_CELL_SIZE,
            delay: Duration::from_millis(QUEUE_YIELD_MS),
        }
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<Polygon>,
    // a processing loop is running
    processing: bool,
    // held until take_completed drains it
    completed: Vec<Arc<CityDataModel>>,
    failed: usize,
    dequeued: usize,
}

struct Inner {
    state: Mutex<QueueState>,
    generator: Arc<dyn RoadNetworkGenerator>,
    runtime: Handle,
    settings: ManagerSettings,
    idle: Notify,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accepts generation requests without blocking and works through them in FIFO order.
///
/// At most one processing loop runs per manager: the loop is started by the enqueue that finds
/// `processing` unset and ends, clearing the flag, when it finds the queue empty. Both
/// transitions happen under the same lock as the queue itself.
#[derive(Clone)]
pub struct CityGenerationManager {
    inner: Arc<Inner>,
}

impl CityGenerationManager {
    pub fn new(generator: Arc<dyn RoadNetworkGenerator>, runtime: Handle) -> Self {
        Self::with_settings(generator, runtime, ManagerSettings::default())
    }

    pub fn with_settings(generator: Arc<dyn RoadNetworkGenerator>, runtime: Handle, settings: ManagerSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                generator,
                runtime,
                settings,
                idle: Notify::new(),
            }),
        }
    }

    /// Enqueues an area and starts the processing loop if none is running. Returns immediately.
    pub fn queue_area(&self, area: Polygon) {
        let start = {
            let mut state = self.inner.state();
            state.queue.push_back(area);
            !std::mem::replace(&mut state.processing, true)
        };

        if start {
            debug!("starting generation loop");
            self.inner.runtime.spawn(process_queue(self.inner.clone()));
        }
    }

    /// True while a loop is running or areas are waiting.
    pub fn is_processing(&self) -> bool {
        let state = self.inner.state();
        state.processing || !state.queue.is_empty()
    }

    pub fn queue_count(&self) -> usize {
        self.inner.state().queue.len()
    }

    /// Drains the models finished so far. Finished models pile up until a caller drains them,
    /// so long-running callers should take them as they go.
    pub fn take_completed(&self) -> Vec<Arc<CityDataModel>> {
        std::mem::take(&mut self.inner.state().completed)
    }

    /// Number of areas whose generation failed and was skipped.
    pub fn failed_count(&self) -> usize {
        self.inner.state().failed
    }

    /// Resolves once the queue has drained and the loop has stopped.
    pub async fn wait_idle(&self) {
        loop {
            // registered before the check so a drain in between is not missed
            let drained = self.inner.idle.notified();
            if !self.is_processing() {
                return;
            }
            drained.await;
        }
    }
}

async fn process_queue(inner: Arc<Inner>) {
    loop {
        let (index, area) = {
            let mut state = inner.state();
            match state.queue.pop_front() {
                Some(area) => {
                    state.dequeued += 1;
                    (state.dequeued, area)
                }
                None => {
                    state.processing = false;
                    break;
                }
            }
        };

        let generator = inner.generator.clone();
        let cell_size = inner.settings.cell_size;
        let result = tokio::task::spawn_blocking(move || generator.generate_model(&area, cell_size)).await;

        match result {
            Ok(Ok(model)) => {
                debug!(
                    "area #{index} done: {} parcels, {} buildings",
                    model.parcels().len(),
                    model.buildings().len()
                );
                inner.state().completed.push(model);
            }
            Ok(Err(err)) => {
                warn!("area #{index} skipped: {err}");
                inner.state().failed += 1;
            }
            Err(err) => {
                warn!("area #{index} skipped, generator panicked: {err}");
                inner.state().failed += 1;
            }
        }

        tokio::time::sleep(inner.settings.delay).await;
    }

    info!("generation queue drained");
    inner.idle.notify_waiters();
}
