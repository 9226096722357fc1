//! GTFS-realtime vehicle-position adapter.
//!
//! Decodes the subset of the protobuf feed this importer reads and converts
//! each trip-bearing vehicle position into a [`VehicleLocationEvent`]
//! published onto the queue as JSON.

use anyhow::Result;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use prost::Message;
use std::collections::HashMap;
use tracing::info;

use crate::model::{DataSource, Location, VehicleLocationEvent};
use crate::services::queue::EventQueue;

#[derive(Clone, PartialEq, Message)]
pub struct FeedMessage {
    #[prost(message, optional, tag = "1")]
    pub header: Option<FeedHeader>,
    #[prost(message, repeated, tag = "2")]
    pub entity: Vec<FeedEntity>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FeedHeader {
    #[prost(string, tag = "1")]
    pub gtfs_realtime_version: String,
    #[prost(uint64, optional, tag = "3")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct FeedEntity {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(message, optional, tag = "4")]
    pub vehicle: Option<VehiclePosition>,
}

#[derive(Clone, PartialEq, Message)]
pub struct VehiclePosition {
    #[prost(message, optional, tag = "1")]
    pub trip: Option<TripDescriptor>,
    #[prost(message, optional, tag = "2")]
    pub position: Option<Position>,
    #[prost(uint64, optional, tag = "5")]
    pub timestamp: Option<u64>,
    #[prost(message, optional, tag = "8")]
    pub vehicle: Option<VehicleDescriptor>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TripDescriptor {
    #[prost(string, optional, tag = "1")]
    pub trip_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub start_date: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub route_id: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct VehicleDescriptor {
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Position {
    #[prost(float, tag = "1")]
    pub latitude: f32,
    #[prost(float, tag = "2")]
    pub longitude: f32,
    #[prost(float, optional, tag = "3")]
    pub bearing: Option<f32>,
}

/// Decodes a protobuf-encoded feed from raw bytes.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Converts every trip-bearing vehicle position into a location event and
/// publishes it. Entities without a trip id or position are skipped;
/// processing continues over the rest of the feed.
pub async fn import(
    bytes: &[u8],
    data_source: &DataSource,
    queue: &dyn EventQueue,
) -> Result<()> {
    let feed = parse_feed(bytes)?;

    let total = feed.entity.len();
    let mut with_trip = 0usize;

    for entity in feed.entity {
        let Some(vehicle) = entity.vehicle else {
            continue;
        };
        let Some(position) = vehicle.position else {
            continue;
        };
        let trip = vehicle.trip.unwrap_or_default();
        let Some(trip_id) = trip.trip_id.filter(|id| !id.is_empty()) else {
            continue;
        };
        with_trip += 1;

        let recorded_at: DateTime<Utc> = vehicle
            .timestamp
            .and_then(|seconds| DateTime::from_timestamp(seconds as i64, 0))
            .unwrap_or_else(Utc::now);

        let timeframe = trip
            .start_date
            .as_deref()
            .and_then(|date| NaiveDate::parse_from_str(date, "%Y%m%d").ok())
            .unwrap_or_else(|| recorded_at.date_naive())
            .format("%Y-%m-%d")
            .to_string();

        let event = VehicleLocationEvent {
            local_id: format!("{}-realtime-{}-{}", data_source.dataset, timeframe, trip_id),
            identifying_information: HashMap::from([
                ("TripID".to_string(), trip_id),
                ("RouteID".to_string(), trip.route_id.unwrap_or_default()),
            ]),
            source_type: "GTFS-RT".to_string(),
            location: Location {
                longitude: position.longitude as f64,
                latitude: position.latitude as f64,
            },
            bearing: position.bearing.unwrap_or(0.0) as f64,
            vehicle_ref: vehicle
                .vehicle
                .and_then(|descriptor| descriptor.id)
                .unwrap_or_default(),
            timeframe,
            data_source: data_source.clone(),
            recorded_at,
        };

        queue.publish(Bytes::from(serde_json::to_vec(&event)?)).await?;
    }

    info!(with_trip, total, "submitted vehicle locations");

    Ok(())
}
