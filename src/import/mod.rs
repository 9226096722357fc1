//! Dataset download, unpack, and importer-format dispatch.
//!
//! Formats are a fixed enumerated set dispatched statically — adding a
//! source means adding a variant and its importer module.

pub mod gtfs_rt;

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tracing::info;

use crate::model::DataSource;
use crate::services::queue::EventQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSetFormat {
    GtfsRealtime,
}

impl DataSetFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSetFormat::GtfsRealtime => "gtfs-realtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    None,
    Gz,
}

/// A registered importable dataset.
#[derive(Debug, Clone)]
pub struct DataSet {
    pub identifier: String,
    pub format: DataSetFormat,
    pub provider: String,
    /// HTTP URL or local file path.
    pub source: String,
    pub unpack_bundle: BundleFormat,
}

pub fn registered_datasets() -> Vec<DataSet> {
    vec![DataSet {
        identifier: "gb-bods-gtfs-rt".to_string(),
        format: DataSetFormat::GtfsRealtime,
        provider: "Department for Transport".to_string(),
        source: "https://data.bus-data.dft.gov.uk/avl/download/gtfsrt".to_string(),
        unpack_bundle: BundleFormat::None,
    }]
}

pub fn get_dataset(identifier: &str) -> Result<DataSet> {
    registered_datasets()
        .into_iter()
        .find(|dataset| dataset.identifier == identifier)
        .ok_or_else(|| anyhow::anyhow!("dataset {identifier} is not registered"))
}

/// Imports one dataset: fetch the source, unpack it, and hand the bytes to
/// the format's importer, which publishes canonical location events onto
/// the queue.
pub async fn import_dataset(dataset: &DataSet, queue: &dyn EventQueue) -> Result<()> {
    let data_source = DataSource {
        original_format: dataset.format.as_str().to_string(),
        provider: dataset.provider.clone(),
        dataset: dataset.identifier.clone(),
        identifier: Utc::now().timestamp_micros().to_string(),
    };

    info!(
        dataset = %dataset.identifier,
        format = dataset.format.as_str(),
        provider = %dataset.provider,
        "importing dataset"
    );

    let raw = fetch_source(&dataset.source).await?;
    let bytes = unpack(raw, dataset.unpack_bundle)?;

    match dataset.format {
        DataSetFormat::GtfsRealtime => gtfs_rt::import(&bytes, &data_source, queue).await,
    }
}

/// Loads dataset bytes from a local file path or fetches them over HTTP.
async fn fetch_source(source: &str) -> Result<Vec<u8>> {
    if !source.starts_with("http") {
        return Ok(std::fs::read(source)?);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent("curl/7.54.1")
        .build()?;

    let response = client.get(source).send().await?;
    if !response.status().is_success() {
        return Err(anyhow::anyhow!(
            "dataset download returned status {}",
            response.status()
        ));
    }

    Ok(response.bytes().await?.to_vec())
}

fn unpack(raw: Vec<u8>, bundle: BundleFormat) -> Result<Vec<u8>> {
    match bundle {
        BundleFormat::None => Ok(raw),
        BundleFormat::Gz => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(raw.as_slice());
            let mut decoded = Vec::new();
            decoder.read_to_end(&mut decoded)?;
            Ok(decoded)
        }
    }
}
