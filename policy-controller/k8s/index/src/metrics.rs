use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct IndexMetrics {
    index_size: Family<IndexLabels, Gauge>,
    reindexes: Counter,
    limiter_updates: Counter,
    unattached_policies: Gauge,
    invalid_policies: Gauge,
    compiled_rules: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();

        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            metrics.index_size.clone(),
        );
        prom.register(
            "reindexes",
            "Count of compilation passes",
            metrics.reindexes.clone(),
        );
        prom.register(
            "limiter_updates",
            "Count of limiter configuration changes",
            metrics.limiter_updates.clone(),
        );
        prom.register(
            "unattached_policies",
            "Gauge of the number of policies whose target is not in the index",
            metrics.unattached_policies.clone(),
        );
        prom.register(
            "invalid_policies",
            "Gauge of the number of policies that could not be converted",
            metrics.invalid_policies.clone(),
        );
        prom.register(
            "compiled_rules",
            "Gauge of the number of compiled proxy filter rules",
            metrics.compiled_rules.clone(),
        );

        metrics
    }

    pub(crate) fn set_size(&self, kind: &'static str, size: usize) {
        self.index_size
            .get_or_create(&IndexLabels {
                kind: kind.to_string(),
            })
            .set(size as i64);
    }

    pub(crate) fn reindexed(&self, unattached: usize, invalid: usize, compiled_rules: usize) {
        self.reindexes.inc();
        self.unattached_policies.set(unattached as i64);
        self.invalid_policies.set(invalid as i64);
        self.compiled_rules.set(compiled_rules as i64);
    }

    pub(crate) fn limiter_updated(&self) {
        self.limiter_updates.inc();
    }
}
