//! Source Registry (C6): a static set of adapters keyed by source id.
//! Initialized once at startup; no mutation after.

use crate::adapters::{
    eq_early_warning::EqEarlyWarningAdapter, forest_fire::ForestFireAdapter,
    quake_bulletin::QuakeBulletinAdapter, regional_notice::RegionalNoticeAdapter,
    text_alert::TextAlertAdapter, weather_warning::WeatherWarningAdapter, SourceAdapter,
};
use crate::config::Config;
use feed_protocol::Source;

pub struct SourceRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(TextAlertAdapter::default()),
            Box::new(QuakeBulletinAdapter::default()),
            Box::new(RegionalNoticeAdapter::default()),
            Box::new(WeatherWarningAdapter::new(config.kma_api_key.clone())),
            Box::new(ForestFireAdapter::default()),
            Box::new(EqEarlyWarningAdapter::new(config.kma_pews_sim.as_ref())),
        ];
        Self { adapters }
    }

    #[must_use]
    pub fn list(&self) -> &[Box<dyn SourceAdapter>] {
        &self.adapters
    }

    #[must_use]
    pub fn get(&self, source: Source) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|adapter| adapter.source_id() == source)
            .map(std::convert::AsRef::as_ref)
    }
}
