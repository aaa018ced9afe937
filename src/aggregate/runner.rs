use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

use crate::aggregate::gate::{Generation, GenerationGate};
use crate::aggregate::roles::AxisRole;
use crate::aggregate::types::AggregateOutput;
use crate::aggregate::Aggregator;
use crate::config::AggregateSettings;
use crate::error::AggregateError;
use crate::store::GroupedStore;

pub type AggregateResult = Result<AggregateOutput, AggregateError>;

/// Runs aggregations in the background; only the latest request may publish.
#[derive(Clone, Default)]
pub struct AggregationRunner {
    gate: Arc<GenerationGate<AggregateResult>>,
}

impl AggregationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an aggregation of `store` and returns its generation.
    ///
    /// The handle resolves to whether the result was published; it is
    /// `false` when a newer request was made before this one finished.
    pub fn request(
        &self,
        store: Arc<GroupedStore>,
        roles: Vec<AxisRole>,
        settings: AggregateSettings,
    ) -> (Generation, JoinHandle<bool>) {
        let generation = self.gate.begin();
        let gate = Arc::clone(&self.gate);
        let span = info_span!("aggregation", generation = generation.value());

        let handle = tokio::spawn(
            async move {
                let result = Aggregator::new(settings).run(&store, &roles).await;
                gate.publish(generation, result)
            }
            .instrument(span),
        );

        (generation, handle)
    }

    /// Latest published result, if any.
    pub fn take(&self) -> Option<(Generation, AggregateResult)> {
        self.gate.take()
    }
}
