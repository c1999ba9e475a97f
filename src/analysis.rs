//! HTTP adapter for the index analysis service.

use chrono::{Days, Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::geometry::{Bounds, Point, Polygon};
use crate::traits::{AnalysisProvider, IndexType};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/ndvi".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("start date {start} is after end date {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive range of ISO dates the analysis covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if start > end {
            return Err(InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`. Negative spans are empty and spans
    /// reaching past the earliest representable date start there.
    pub fn ending_at(end: NaiveDate, days: i64) -> Self {
        let span = Days::new(u64::try_from(days).unwrap_or(0));
        Self {
            start: end.checked_sub_days(span).unwrap_or(NaiveDate::MIN),
            end,
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }
}

impl Default for DateRange {
    /// The last 30 days, ending today.
    fn default() -> Self {
        Self::ending_at(Local::now().date_naive(), 30)
    }
}

/// What an analysis covers: a drawn polygon or a named preset region.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisTarget {
    Polygon(Polygon),
    Region(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub index_type: IndexType,
    pub date_range: DateRange,
    pub target: AnalysisTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Statistics {
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
}

/// Dates the service actually analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnalysisResponse {
    pub tile_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_bounds")]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub center: Option<Point>,
    #[serde(default)]
    pub zoom: Option<f64>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub area_km2: Option<f64>,
}

impl AnalysisResponse {
    /// Fills in statistics fetched separately for a preset region.
    fn merge_region_stats(&mut self, stats: RegionStats) {
        self.statistics = stats.statistics.or(self.statistics.take());
        self.interpretation = stats.interpretation.or(self.interpretation.take());
        self.period = stats.period.or(self.period);
    }
}

/// Summary statistics of a preset study area.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegionStats {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
    #[serde(default)]
    pub interpretation: Option<String>,
}

/// Accepts either a corner pair or a GeoJSON polygon (preset regions report
/// their outline).
fn deserialize_bounds<'de, D>(deserializer: D) -> Result<Option<Bounds>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Corners(Bounds),
        Outline(Polygon),
    }

    Ok(Option::<Repr>::deserialize(deserializer)?.map(|repr| match repr {
        Repr::Corners(bounds) => bounds,
        Repr::Outline(polygon) => polygon.bounds(),
    }))
}

#[derive(Debug, Clone, PartialEq)]
pub struct PixelQuery {
    pub point: Point,
    pub date_range: DateRange,
    pub study_area: String,
    pub index_type: IndexType,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PixelValue {
    pub value: Option<f64>,
    #[serde(default)]
    pub interpretation: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StudyArea {
    pub id: String,
    pub name: String,
    pub center: Point,
    pub zoom: f64,
    pub bounds: Polygon,
}

#[derive(Debug, Serialize)]
struct CustomStatsBody<'a> {
    start_date: NaiveDate,
    end_date: NaiveDate,
    geometry: &'a Polygon,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Deserialize)]
struct StudyAreasBody {
    study_areas: Vec<StudyArea>,
}

#[derive(Debug, Clone)]
pub struct AnalysisClient {
    config: AnalysisConfig,
    client: reqwest::blocking::Client,
}

impl AnalysisClient {
    pub fn new(config: AnalysisConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn pixel_value(&self, query: &PixelQuery) -> Result<PixelValue, AnalysisError> {
        let url = format!("{}/pixel-value", self.base_url());
        let response = self
            .client
            .get(url)
            .query(&[
                ("lng", query.point.lng().to_string()),
                ("lat", query.point.lat().to_string()),
                ("start_date", query.date_range.start().to_string()),
                ("end_date", query.date_range.end().to_string()),
                ("study_area", query.study_area.clone()),
                ("index_type", query.index_type.as_str().to_string()),
            ])
            .send()?;
        read_json(response)
    }

    pub fn study_areas(&self) -> Result<Vec<StudyArea>, AnalysisError> {
        let url = format!("{}/study-areas", self.base_url());
        let body: StudyAreasBody = read_json(self.client.get(url).send()?)?;
        Ok(body.study_areas)
    }

    pub fn region_stats(
        &self,
        index_type: IndexType,
        date_range: DateRange,
        study_area: &str,
    ) -> Result<RegionStats, AnalysisError> {
        let url = self.endpoint(index_type, "stats");
        debug!(%url, index = %index_type, %study_area, "requesting region statistics");
        let response = self
            .client
            .get(url)
            .query(&[
                ("start_date", date_range.start().to_string()),
                ("end_date", date_range.end().to_string()),
                ("study_area", study_area.to_string()),
            ])
            .send()?;
        read_json(response)
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn endpoint(&self, index_type: IndexType, path: &str) -> String {
        endpoint_url(&self.config.base_url, index_type, path)
    }
}

impl AnalysisProvider for AnalysisClient {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        let range = request.date_range;
        let response = match &request.target {
            AnalysisTarget::Polygon(polygon) => {
                let url = self.endpoint(request.index_type, "stats/custom");
                debug!(%url, index = %request.index_type, "requesting custom statistics");
                self.client
                    .post(url)
                    .json(&CustomStatsBody {
                        start_date: range.start(),
                        end_date: range.end(),
                        geometry: polygon,
                    })
                    .send()?
            }
            AnalysisTarget::Region(study_area) => {
                let url = self.endpoint(request.index_type, "map-url");
                debug!(%url, index = %request.index_type, %study_area, "requesting region map");
                self.client
                    .get(url)
                    .query(&[
                        ("start_date", range.start().to_string()),
                        ("end_date", range.end().to_string()),
                        ("study_area", study_area.clone()),
                    ])
                    .send()?
            }
        };

        let mut body: AnalysisResponse = read_json(response)?;
        if let AnalysisTarget::Region(study_area) = &request.target {
            match self.region_stats(request.index_type, range, study_area) {
                Ok(stats) => body.merge_region_stats(stats),
                Err(err) => {
                    warn!(index = %request.index_type, %study_area, error = %err, "region statistics unavailable");
                }
            }
        }
        info!(
            index = %request.index_type,
            has_tiles = body.tile_url.is_some(),
            "analysis response received"
        );
        Ok(body)
    }
}

fn endpoint_url(base_url: &str, index_type: IndexType, path: &str) -> String {
    format!(
        "{}/{}{}",
        base_url.trim_end_matches('/'),
        index_type.path_prefix(),
        path
    )
}

fn read_json<T: DeserializeOwned>(response: reqwest::blocking::Response) -> Result<T, AnalysisError> {
    let status = response.status().as_u16();
    let body = response.text()?;
    decode(status, &body)
}

/// Decodes a success body, or turns a failure into `AnalysisError::Status`
/// using the service's `detail` message when it sent one.
fn decode<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, AnalysisError> {
    if (200..300).contains(&status) {
        return Ok(serde_json::from_str(body)?);
    }
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|error| error.detail)
        .unwrap_or_else(|_| {
            reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or("unknown error")
                .to_string()
        });
    Err(AnalysisError::Status { status, detail })
}
