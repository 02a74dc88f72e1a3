//! Topic → sensor kind mapping.
//!
//! Exact, case-sensitive match against the configured topic table. No
//! wildcards. The subscription set handed to the broker is built from the
//! same table.

use crate::config::TopicsConf;
use crate::models::SensorKind;
use rumqttc::QoS;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TopicRouter {
    routes: HashMap<String, SensorKind>,
}

/// Topics established at connect time with their requested QoS.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSet {
    entries: Vec<(String, QoS)>,
}

impl TopicRouter {
    pub fn new(topics: &TopicsConf) -> Self {
        let routes = SensorKind::ALL
            .iter()
            .map(|kind| (topics.topic_for(*kind).to_string(), *kind))
            .collect();
        Self { routes }
    }

    /// `None` for anything outside the table, which is normal broker noise.
    pub fn route(&self, topic: &str) -> Option<SensorKind> {
        self.routes.get(topic).copied()
    }

    /// Every routed topic at at-least-once.
    pub fn subscription_set(&self) -> SubscriptionSet {
        let mut entries: Vec<(String, QoS)> = self
            .routes
            .keys()
            .map(|topic| (topic.clone(), QoS::AtLeastOnce))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        SubscriptionSet { entries }
    }
}

impl SubscriptionSet {
    pub fn entries(&self) -> &[(String, QoS)] {
        &self.entries
    }

    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_exact_topics() {
        let router = TopicRouter::new(&TopicsConf::default());
        assert_eq!(router.route("SPO2_Data"), Some(SensorKind::Oxygen));
        assert_eq!(router.route("heartbeat"), Some(SensorKind::Heartbeat));
        assert_eq!(router.route("MQ2 sensor"), Some(SensorKind::GasDetection));
        assert_eq!(router.route("geluid sensor"), Some(SensorKind::Sound));
        assert_eq!(router.route("temperature sensor"), Some(SensorKind::Temperature));
        assert_eq!(router.route("Gps_sensor_lat"), Some(SensorKind::LocationLat));
        assert_eq!(router.route("Gps_sensor_lon"), Some(SensorKind::LocationLon));
    }

    #[test]
    fn test_unknown_and_legacy_topics_are_not_routed() {
        let router = TopicRouter::new(&TopicsConf::default());
        assert_eq!(router.route("foo/bar"), None);
        assert_eq!(router.route("Heartbeat"), None);
        assert_eq!(router.route("heartbeat "), None);
        // legacy wildcard-style names are not part of the table
        assert_eq!(router.route("sensor/temperature"), None);
        assert_eq!(router.route("sensor/#"), None);
        // the outbound topic is never routed back in
        assert_eq!(router.route("Gps_guidance"), None);
    }

    #[test]
    fn test_subscription_set_matches_router() {
        let router = TopicRouter::new(&TopicsConf::default());
        let set = router.subscription_set();
        assert_eq!(set.len(), 7);
        for (topic, qos) in set.entries() {
            assert!(router.route(topic).is_some(), "{topic} subscribed but not routed");
            assert_eq!(*qos, QoS::AtLeastOnce);
        }
    }
}
