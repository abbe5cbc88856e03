//! Testing utilities for Redline workspace
//!
//! Shared contract fixtures, store setup, and canned stages.

#![allow(missing_docs)]

use redline_pipeline::{AnalysisContext, FnStage, Stage, StageFailure};
use redline_store::{NegotiationId, Provenance, Version, VersionStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Our first draft
pub const ACME_V1: &str = "\
1. Services
Provider delivers the platform described in Schedule A.

2. Liability
Each party's liability is capped at 1x annual fees.

3. Term
This agreement runs for one year.
";

/// Counterparty redline raising the cap
pub const ACME_V2: &str = "\
1. Services
Provider delivers the platform described in Schedule A.

2. Liability
Each party's liability is capped at 1.5x annual fees.

3. Term
This agreement runs for one year.
";

/// Counterparty redline adding an uncapped indemnity
pub const ACME_V3: &str = "\
1. Services
Provider delivers the platform described in Schedule A.

2. Liability
Each party's liability is capped at 1.5x annual fees.

3. Indemnity
Provider shall indemnify Customer with unlimited liability for IP claims.

4. Term
This agreement runs for two years.
";

pub fn negotiation_id(id: &str) -> NegotiationId {
    NegotiationId::parse(id).unwrap()
}

pub fn memory_store() -> Arc<VersionStore> {
    Arc::new(VersionStore::in_memory())
}

/// Store holding negotiation `acme` with [`ACME_V1`] (internal) and
/// [`ACME_V2`] (counterparty)
pub async fn seeded_store() -> (Arc<VersionStore>, Vec<Version>) {
    let store = memory_store();
    store.create_negotiation("acme", "Acme MSA").await.unwrap();
    let acme = negotiation_id("acme");

    let v1 = store
        .add_version(&acme, ACME_V1, Provenance::Internal, Some("first draft".into()))
        .await
        .unwrap();
    let v2 = store
        .add_version(&acme, ACME_V2, Provenance::Counterparty, None)
        .await
        .unwrap();
    (store, vec![v1, v2])
}

pub fn constant_stage(name: &str, output: Value) -> Arc<dyn Stage> {
    Arc::new(FnStage::new(name, move |_: &AnalysisContext, _: &Value| {
        Ok(output.clone())
    }))
}

pub fn failing_stage(name: &str, message: &'static str) -> Arc<dyn Stage> {
    Arc::new(FnStage::new(name, move |_: &AnalysisContext, _: &Value| {
        Err(StageFailure::failed(message))
    }))
}

/// Stage that sleeps for `delay` before answering `null`
pub fn slow_stage(name: &str, delay: Duration) -> Arc<dyn Stage> {
    Arc::new(SlowStage {
        name: name.to_string(),
        delay,
    })
}

struct SlowStage {
    name: String,
    delay: Duration,
}

#[async_trait::async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &AnalysisContext, _config: &Value) -> Result<Value, StageFailure> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::Null)
    }
}
