use tokio::sync::broadcast;

use runwatch_domain::{Category, DataPoint, RunDescriptor, RunId, RunUpdate, UpdateKind};

use crate::aggregator::{ErrorAggregator, HealthAggregator, ReconciliationAggregator};

const UPDATE_CAPACITY: usize = 256;

/// The three aggregators owned by one run, all watermarked to its start time.
#[derive(Debug)]
pub struct RunData {
    run_id: RunId,
    pub health: HealthAggregator,
    pub errors: ErrorAggregator,
    pub reconciliation: ReconciliationAggregator,
    updates: broadcast::Sender<RunUpdate>,
}

impl RunData {
    pub fn new(descriptor: &RunDescriptor) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            run_id: descriptor.id,
            health: HealthAggregator::new(Category::Health, descriptor.start_time),
            errors: ErrorAggregator::new(Category::Error, descriptor.start_time),
            reconciliation: ReconciliationAggregator::new(
                Category::Reconciliation,
                descriptor.start_time,
            ),
            updates,
        }
    }

    pub fn ingest(&self, point: DataPoint) {
        let category = point.category();
        match point {
            DataPoint::Health(point) => self.health.ingest(point),
            DataPoint::Error(entry) => self.errors.ingest(entry),
            DataPoint::Reconciliation(record) => self.reconciliation.ingest(record),
        }
        self.publish(UpdateKind::Category(category));
    }

    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Health => self.health.len(),
            Category::Error => self.errors.len(),
            Category::Reconciliation => self.reconciliation.len(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunUpdate> {
        self.updates.subscribe()
    }

    /// Having no subscribers is fine.
    pub fn publish(&self, kind: UpdateKind) {
        let _ = self.updates.send(RunUpdate {
            run_id: self.run_id,
            kind,
        });
    }
}
