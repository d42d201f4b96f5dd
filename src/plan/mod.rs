//! Partitions a requested date range into retrieval chunks.
//!
//! Every granularity goes through [`plan`]. Latest-period granularities can
//! also carry backward fallback candidates, used when the provider has not yet
//! published the newest period.

pub mod calendar;

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::{dataset::DatasetKind, error::PlanningError};

/// Point or bounding box, fixed for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialExtent {
    Point {
        lat: f64,
        lon: f64,
    },
    BoundingBox {
        north: f64,
        west: f64,
        south: f64,
        east: f64,
    },
}

impl SpatialExtent {
    pub fn validate(&self) -> Result<(), PlanningError> {
        let invalid = |reason: String| Err(PlanningError::InvalidExtent { reason });

        match *self {
            SpatialExtent::Point { lat, lon } => {
                if !(-90.0..=90.0).contains(&lat) {
                    return invalid(format!("latitude {lat} is outside -90..90"));
                }
                if !(-180.0..=360.0).contains(&lon) {
                    return invalid(format!("longitude {lon} is outside -180..360"));
                }
            }
            SpatialExtent::BoundingBox {
                north,
                west,
                south,
                east,
            } => {
                for lat in [north, south] {
                    if !(-90.0..=90.0).contains(&lat) {
                        return invalid(format!("latitude {lat} is outside -90..90"));
                    }
                }
                for lon in [west, east] {
                    if !(-180.0..=360.0).contains(&lon) {
                        return invalid(format!("longitude {lon} is outside -180..360"));
                    }
                }
                if north < south {
                    return invalid(format!("north {north} is below south {south}"));
                }
            }
        }

        Ok(())
    }

    /// Area as `[north, west, south, east]`; a point collapses to a zero-size box.
    pub fn area(&self) -> [f64; 4] {
        match *self {
            SpatialExtent::Point { lat, lon } => [lat, lon, lat, lon],
            SpatialExtent::BoundingBox {
                north,
                west,
                south,
                east,
            } => [north, west, south, east],
        }
    }

    /// Short tag used in artifact file names.
    pub fn tag(&self) -> String {
        match *self {
            SpatialExtent::Point { lat, lon } => format!("p{lat:.2}_{lon:.2}"),
            SpatialExtent::BoundingBox {
                north,
                west,
                south,
                east,
            } => format!("b{north:.2}_{west:.2}_{south:.2}_{east:.2}"),
        }
    }
}

/// Inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PlanningError> {
        if start > end {
            return Err(PlanningError::EmptyRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Overlap with `[start, end]`, if any.
    pub fn clip(&self, start: NaiveDate, end: NaiveDate) -> Option<DateRange> {
        let start = start.max(self.start);
        let end = end.min(self.end);
        (start <= end).then_some(DateRange { start, end })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Granularity {
    /// The whole range in a single request
    Full,
    /// One request per calendar year
    Yearly,
    /// One request per calendar month
    Monthly,
    /// One request per day
    Daily,
    /// The most recent complete day
    LatestDay,
    /// The most recent complete month
    LatestMonth,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Full => "full",
            Granularity::Yearly => "yearly",
            Granularity::Monthly => "monthly",
            Granularity::Daily => "daily",
            Granularity::LatestDay => "latest-day",
            Granularity::LatestMonth => "latest-month",
        };
        f.write_str(name)
    }
}

/// A single calendar period that can be stepped backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl Period {
    pub fn window(&self) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            Period::Day(date) => Some((date, date)),
            Period::Month { year, month } => calendar::month_window(year, month),
        }
    }

    pub fn previous(&self) -> Option<Period> {
        match *self {
            Period::Day(date) => date.pred_opt().map(Period::Day),
            Period::Month { year, month } => {
                let (year, month) = calendar::previous_month(year, month);
                Some(Period::Month { year, month })
            }
        }
    }

    pub fn label(&self) -> String {
        match *self {
            Period::Day(date) => date.format("%Y-%m-%d").to_string(),
            Period::Month { year, month } => format!("{year}-{month:02}"),
        }
    }
}

/// Candidates stepping backward one period at a time, `start` first.
pub fn plan_with_fallback(start: Period, max_steps: u32) -> Vec<Period> {
    let mut periods = Vec::with_capacity(max_steps as usize);
    let mut current = Some(start);

    while let Some(period) = current {
        if periods.len() >= max_steps as usize {
            break;
        }
        periods.push(period);
        current = period.previous();
    }

    periods
}

/// One bounded retrieval unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub label: String,
    pub variables: Vec<String>,
    pub extent: SpatialExtent,
    pub window: DateRange,
    pub artifact_name: String,
}

impl Chunk {
    pub fn years(&self) -> Vec<i32> {
        (self.window.start.year()..=self.window.end.year()).collect()
    }

    pub fn months(&self) -> Vec<u32> {
        let mut months: Vec<u32> = self.dates().map(|d| d.month()).collect();
        months.sort_unstable();
        months.dedup();
        months
    }

    /// Day-of-month selectors covering the window.
    pub fn days(&self) -> Vec<u32> {
        let mut days: Vec<u32> = self.dates().map(|d| d.day()).collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.window.end;
        self.window.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// A logical request: the primary chunk followed by its fallbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRequest {
    pub candidates: Vec<Chunk>,
}

impl PlannedRequest {
    pub fn primary(&self) -> &Chunk {
        &self.candidates[0]
    }

    pub fn has_fallbacks(&self) -> bool {
        self.candidates.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub requests: Vec<PlannedRequest>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn primaries(&self) -> impl Iterator<Item = &Chunk> {
        self.requests.iter().map(PlannedRequest::primary)
    }
}

/// Everything the planner needs, validated once in [`plan`].
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub dataset: String,
    pub variables: Vec<String>,
    pub extent: SpatialExtent,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub granularity: Granularity,
    pub fallback_depth: Option<u32>,
    /// The day the run was invoked; latest-period plans are relative to it.
    pub today: NaiveDate,
    /// Artifact file extension, without the dot.
    pub extension: String,
}

pub fn plan(request: &PlanRequest) -> Result<Plan, PlanningError> {
    let range = DateRange::new(request.start, request.end)?;
    if request.variables.is_empty() {
        return Err(PlanningError::NoVariables);
    }
    request.extent.validate()?;
    DatasetKind::from_identifier(&request.dataset).check_extent(&request.dataset, &request.extent)?;

    if let Some(depth) = request.fallback_depth {
        if depth == 0 {
            return Err(PlanningError::ZeroFallbackDepth);
        }
        if !matches!(
            request.granularity,
            Granularity::LatestDay | Granularity::LatestMonth
        ) {
            return Err(PlanningError::FallbackNotSupported {
                granularity: request.granularity.to_string(),
            });
        }
    }

    let chunk = |label: String, window: DateRange| make_chunk(request, label, window);

    let requests = match request.granularity {
        Granularity::Full => {
            let label = format!("{}_{}", range.start, range.end);
            vec![single(chunk(label, range))]
        }
        Granularity::Yearly => {
            let mut requests = Vec::new();
            for year in range.start.year()..=range.end.year() {
                let (first, last) = calendar::year_window(year)
                    .ok_or(PlanningError::DateOverflow { near: range.start })?;
                if let Some(window) = range.clip(first, last) {
                    requests.push(single(chunk(year.to_string(), window)));
                }
            }
            requests
        }
        Granularity::Monthly => {
            let mut requests = Vec::new();
            let (mut year, mut month) = (range.start.year(), range.start.month());
            let last = (range.end.year(), range.end.month());
            while (year, month) <= last {
                let period = Period::Month { year, month };
                let (first, end) = period
                    .window()
                    .ok_or(PlanningError::DateOverflow { near: range.end })?;
                if let Some(window) = range.clip(first, end) {
                    requests.push(single(chunk(period.label(), window)));
                }
                (year, month) = calendar::next_month(year, month);
            }
            requests
        }
        Granularity::Daily => range
            .start
            .iter_days()
            .take_while(|d| *d <= range.end)
            .map(|d| {
                let period = Period::Day(d);
                single(chunk(period.label(), DateRange { start: d, end: d }))
            })
            .collect(),
        Granularity::LatestDay | Granularity::LatestMonth => {
            let latest = latest_period(request.granularity, request.today, &range)?;
            let depth = request.fallback_depth.unwrap_or(1);
            let candidates: Vec<Chunk> = plan_with_fallback(latest, depth)
                .into_iter()
                .filter_map(|period| {
                    let (first, last) = period.window()?;
                    range.clip(first, last).map(|w| chunk(period.label(), w))
                })
                .collect();
            vec![PlannedRequest { candidates }]
        }
    };

    Ok(Plan { requests })
}

fn single(chunk: Chunk) -> PlannedRequest {
    PlannedRequest {
        candidates: vec![chunk],
    }
}

fn make_chunk(request: &PlanRequest, label: String, window: DateRange) -> Chunk {
    let artifact_name = format!(
        "{}_{}_{}_{}.{}",
        request.dataset,
        request.extent.tag(),
        window.start.format("%Y%m%d"),
        window.end.format("%Y%m%d"),
        request.extension
    );

    Chunk {
        label,
        variables: request.variables.clone(),
        extent: request.extent,
        window,
        artifact_name,
    }
}

/// The most recent complete period before `today`, capped at the range end.
fn latest_period(
    granularity: Granularity,
    today: NaiveDate,
    range: &DateRange,
) -> Result<Period, PlanningError> {
    let overflow = PlanningError::DateOverflow { near: today };

    let period = match granularity {
        Granularity::LatestMonth => {
            let (year, month) = calendar::previous_month(today.year(), today.month());
            let newest = Period::Month { year, month };
            let (first, _) = newest.window().ok_or(overflow)?;
            if range.end < first {
                Period::Month {
                    year: range.end.year(),
                    month: range.end.month(),
                }
            } else {
                newest
            }
        }
        _ => {
            let yesterday = today.pred_opt().ok_or(overflow)?;
            Period::Day(yesterday.min(range.end))
        }
    };

    let (first, last) = period
        .window()
        .ok_or(PlanningError::DateOverflow { near: today })?;
    if range.clip(first, last).is_none() {
        return Err(PlanningError::LatestOutsideRange {
            period: period.label(),
            start: range.start,
            end: range.end,
        });
    }

    Ok(period)
}

// -- Tests -------------------------------------------------------------------
