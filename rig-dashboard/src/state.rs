use crate::models::SensorKind;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Last raw payload seen for a sensor kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestValue {
    pub raw_payload: String,
    pub received_at: OffsetDateTime,
}

pub type LatestMap = HashMap<SensorKind, LatestValue>;
