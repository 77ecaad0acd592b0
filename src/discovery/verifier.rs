//! Best-effort classification of a host answering on the status endpoint.

use std::time::Duration;

use log::{debug, trace};
use serde_json::{Map, Value};

use crate::utils::DeviceApi;

/// Fields a miner status object is expected to expose.
pub const INDICATOR_FIELDS: [&str; 6] =
    ["version", "ASICModel", "boardVersion", "temp", "hashRate", "power"];

/// Field naming the mining chip.
pub const MODEL_FIELD: &str = "ASICModel";

/// Chip models accepted without looking at the other indicators.
pub const KNOWN_MODELS: [&str; 4] = ["bm1366", "bm1368", "bm1370", "bm1397"];

/// Minimum number of indicator fields for a host without a known model.
const MIN_INDICATORS: usize = 3;

/// Query `address` and tell whether it looks like a miner.
///
/// Any transport failure or non-2xx answer means no.
pub fn verify(api: &dyn DeviceApi, address: &str, timeout: Duration) -> bool {
    match api.system_info(address, timeout) {
        Ok(status) => {
            let verified = classify(&status);
            debug!("{}: verified={}", address, verified);
            verified
        }
        Err(e) => {
            trace!("{}: not a miner ({})", address, e);
            false
        }
    }
}

/// Decide on an already decoded status object.
///
/// A whitelisted model wins outright; otherwise three or more indicator
/// fields, whatever their values, are enough.
pub fn classify(status: &Map<String, Value>) -> bool {
    let model = status
        .get(MODEL_FIELD)
        .and_then(Value::as_str)
        .map(str::to_lowercase);
    if let Some(model) = model {
        if KNOWN_MODELS.contains(&model.as_str()) {
            return true;
        }
    }

    let indicators = INDICATOR_FIELDS
        .iter()
        .filter(|field| status.contains_key(**field))
        .count();
    indicators >= MIN_INDICATORS
}
