//! Resolves which scheduled route pattern a grouped set of observations is
//! actually running, and derives the journey's display fields.

use anyhow::Result;
use regex::Regex;
use std::sync::Arc;

use crate::model::{JourneyPathItem, ObservationGroup, OrderedLineRoute, Service, Stop};
use crate::tracker::stop_cache::StopResolutionCache;

/// Sources emit this instead of a real "towards" hint on some services.
const TOWARDS_PLACEHOLDER: &str = "Check Front of Train";

/// Outcome of matching one observation group against a line's candidate
/// route patterns.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    /// Consecutive path segments for the journey. Full route detail when
    /// exactly one pattern matched, otherwise just the observed sequence.
    pub items: Vec<JourneyPathItem>,
    /// How many candidate patterns matched: anything other than one means
    /// the true branch could not be determined.
    pub candidate_count: usize,
    pub destination_display: String,
}

pub struct JourneyMatcher {
    destination_suffix: Regex,
}

impl JourneyMatcher {
    pub fn new() -> Self {
        Self {
            destination_suffix: Regex::new("(.+) (Underground|DLR) Station")
                .expect("destination suffix pattern is valid"),
        }
    }

    /// Matches a group's observed stop order against the candidate routes.
    ///
    /// A route matches when its stop sequence, reduced to only the stops
    /// present in the observed sequence, equals the observed sequence
    /// exactly. One match yields the route's full stop sequence as the
    /// path; zero or several fall back to the raw observed sequence, with
    /// the candidate count annotated on the destination display.
    pub async fn match_route(
        &self,
        group: &ObservationGroup,
        routes: &[OrderedLineRoute],
        stops: &StopResolutionCache,
        service: &Service,
    ) -> Result<ResolvedPath> {
        let sorted = group.sorted_observations();
        let Some(last_observation) = sorted.last().copied() else {
            anyhow::bail!("observation group {} is empty", group.journey_identifier);
        };

        // The observed sequence: canonical stop identifiers in order of
        // expected arrival. Unresolvable stops are skipped.
        let mut observed: Vec<String> = Vec::new();
        for observation in &sorted {
            let Some(stop) = stops.resolve(&observation.stop_ref).await? else {
                continue;
            };
            if !observed.contains(&stop.primary_identifier) {
                observed.push(stop.primary_identifier.clone());
            }
        }

        if observed.is_empty() {
            anyhow::bail!(
                "no resolvable stops in observation group {}",
                group.journey_identifier
            );
        }

        // The final stop is usually absent from the predictions themselves;
        // append the stated destination when it is distinct and resolvable.
        if !last_observation.destination_stop_ref.is_empty() {
            if let Some(destination) = stops
                .resolve(&last_observation.destination_stop_ref)
                .await?
            {
                if observed.last() != Some(&destination.primary_identifier) {
                    observed.push(destination.primary_identifier.clone());
                }
            }
        }

        let mut matched_routes: Vec<&OrderedLineRoute> = Vec::new();
        for route in routes {
            let mut reduced: Vec<String> = Vec::new();
            for stop_ref in &route.stop_refs {
                let Some(stop) = stops.resolve(stop_ref).await? else {
                    continue;
                };
                if observed.contains(&stop.primary_identifier) {
                    reduced.push(stop.primary_identifier.clone());
                }
            }

            if reduced == observed {
                matched_routes.push(route);
            }
        }

        let raw_destination_name = last_observation
            .destination_name
            .clone()
            .unwrap_or_default();
        let towards = last_observation.towards.as_deref().unwrap_or("");

        let mut destination_display = raw_destination_name.clone();
        if destination_display.is_empty() && !towards.is_empty() && towards != TOWARDS_PLACEHOLDER
        {
            destination_display = towards.to_string();
        } else if destination_display.is_empty() {
            destination_display = service.service_name.clone();
        }

        // The suffix strip applies to the untouched source name only.
        if let Some(captures) = self.destination_suffix.captures(&raw_destination_name) {
            destination_display = captures[1].to_string();
        }

        let items = if matched_routes.len() == 1 {
            // Single match: the full scheduled sequence, including stops not
            // directly observed, with resolved stop snapshots.
            let mut resolved_route: Vec<Arc<Stop>> = Vec::new();
            for stop_ref in &matched_routes[0].stop_refs {
                if let Some(stop) = stops.resolve(stop_ref).await? {
                    resolved_route.push(stop);
                }
            }

            resolved_route
                .windows(2)
                .map(|pair| JourneyPathItem {
                    origin_stop_ref: pair[0].primary_identifier.clone(),
                    origin_stop: Some((*pair[0]).clone()),
                    destination_stop_ref: pair[1].primary_identifier.clone(),
                    destination_stop: Some((*pair[1]).clone()),
                    origin_arrival_time: None,
                    origin_departure_time: None,
                })
                .collect()
        } else {
            // The true branch cannot be determined; annotate the display
            // with the candidate count and use the observed sequence as-is.
            destination_display =
                format!("[X-{}] {}", matched_routes.len(), destination_display);

            observed
                .windows(2)
                .map(|pair| JourneyPathItem {
                    origin_stop_ref: pair[0].clone(),
                    origin_stop: None,
                    destination_stop_ref: pair[1].clone(),
                    destination_stop: None,
                    origin_arrival_time: None,
                    origin_departure_time: None,
                })
                .collect()
        };

        Ok(ResolvedPath {
            items,
            candidate_count: matched_routes.len(),
            destination_display,
        })
    }
}
