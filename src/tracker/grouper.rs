use std::collections::HashMap;

use crate::model::{CanonicalObservation, ObservationGroup};

/// Buckets a batch of raw observations into groups that each represent one
/// physical vehicle performing one journey, keyed by the composite journey
/// identifier. Pure, `O(n)`, and independent of input ordering.
pub fn group_observations(
    observations: Vec<CanonicalObservation>,
) -> HashMap<String, ObservationGroup> {
    let mut groups: HashMap<String, ObservationGroup> = HashMap::new();

    for observation in observations {
        let journey_identifier = observation.journey_identifier();
        groups
            .entry(journey_identifier.clone())
            .or_insert_with(|| ObservationGroup {
                journey_identifier,
                observations: Vec::new(),
            })
            .observations
            .push(observation);
    }

    groups
}
