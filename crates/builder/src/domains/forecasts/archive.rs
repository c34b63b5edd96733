use crate::{ForecastRecord, GeoPoint};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("Forecast archive unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid archive query: {0}")]
    InvalidQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Geometry {
    /// Matches the grid cell containing the point
    Point(GeoPoint),
    BoundingBox {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidFilter {
    Any,
    At(OffsetDateTime),
    /// Half open, `[start, end)`
    Between(OffsetDateTime, OffsetDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchiveQuery {
    pub geometry: Geometry,
    pub valid: ValidFilter,
    /// Inclusive lower issuance bound
    pub issued_from: Option<OffsetDateTime>,
    /// Exclusive upper issuance bound
    pub issued_before: Option<OffsetDateTime>,
}

impl ArchiveQuery {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            valid: ValidFilter::Any,
            issued_from: None,
            issued_before: None,
        }
    }

    pub fn valid_at(mut self, valid_at: OffsetDateTime) -> Self {
        self.valid = ValidFilter::At(valid_at);
        self
    }

    pub fn valid_between(mut self, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        self.valid = ValidFilter::Between(start, end);
        self
    }

    pub fn issued_from(mut self, from: OffsetDateTime) -> Self {
        self.issued_from = Some(from);
        self
    }

    pub fn issued_before(mut self, before: OffsetDateTime) -> Self {
        self.issued_before = Some(before);
        self
    }

    fn issued_in_range(&self, issued_at: OffsetDateTime) -> bool {
        self.issued_from.map_or(true, |from| issued_at >= from)
            && self.issued_before.map_or(true, |before| issued_at < before)
    }
}

/// Latest forecast run for one location and valid time, issued inside
/// `[issued_from, issued_before)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatestQuery {
    pub location: GeoPoint,
    pub valid_at: OffsetDateTime,
    pub issued_from: Option<OffsetDateTime>,
    pub issued_before: OffsetDateTime,
}

impl From<&LatestQuery> for ArchiveQuery {
    fn from(q: &LatestQuery) -> Self {
        ArchiveQuery {
            geometry: Geometry::Point(q.location),
            valid: ValidFilter::At(q.valid_at),
            issued_from: q.issued_from,
            issued_before: Some(q.issued_before),
        }
    }
}

pub type Records<'a> = Box<dyn Iterator<Item = &'a ForecastRecord> + 'a>;

/// Read-only view over a gridded forecast archive
pub trait ForecastArchive: Send + Sync {
    /// Lazily yields the records matching `query`, in archive order
    fn query<'a>(&'a self, query: &ArchiveQuery) -> Result<Records<'a>, ArchiveError>;

    /// Sorted names of the variables carried by the archive
    fn variables(&self) -> Vec<String>;

    fn latest_issued(&self, query: &LatestQuery) -> Result<Option<ForecastRecord>, ArchiveError> {
        let candidates = self.query(&ArchiveQuery::from(query))?;
        Ok(latest_of(candidates).cloned())
    }
}

/// Record with the greatest issuance time. Among records sharing that time
/// the first one yielded wins.
pub fn latest_of<'a>(
    candidates: impl IntoIterator<Item = &'a ForecastRecord>,
) -> Option<&'a ForecastRecord> {
    candidates
        .into_iter()
        .fold(None, |best: Option<&ForecastRecord>, record| match best {
            Some(current) if current.issued_at >= record.issued_at => Some(current),
            _ => Some(record),
        })
}

/// Immutable snapshot of forecast records on a regular lat/lon grid
#[derive(Debug, Clone)]
pub struct InMemoryArchive {
    resolution: f64,
    records: Vec<ForecastRecord>,
    by_valid: BTreeMap<i64, Vec<usize>>,
    variables: BTreeSet<String>,
}

impl InMemoryArchive {
    /// GFS 0.25 degree grid
    pub const DEFAULT_RESOLUTION: f64 = 0.25;

    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            records: Vec::new(),
            by_valid: BTreeMap::new(),
            variables: BTreeSet::new(),
        }
    }

    pub fn from_records(
        resolution: f64,
        records: impl IntoIterator<Item = ForecastRecord>,
    ) -> Self {
        let mut archive = Self::new(resolution);
        for record in records {
            archive.push(record);
        }
        archive
    }

    pub fn push(&mut self, record: ForecastRecord) {
        let index = self.records.len();
        self.by_valid
            .entry(record.valid_at.unix_timestamp())
            .or_default()
            .push(index);
        self.variables.extend(record.values.keys().cloned());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    fn covers(&self, record: &ForecastRecord, geometry: &Geometry) -> bool {
        match geometry {
            // same cell index as `CachedArchive` keys on, so a boundary point
            // never sees two cells
            Geometry::Point(point) => {
                record.location.cell(self.resolution) == point.cell(self.resolution)
            }
            Geometry::BoundingBox {
                south,
                west,
                north,
                east,
            } => {
                (*south..=*north).contains(&record.location.latitude)
                    && (*west..=*east).contains(&record.location.longitude)
            }
        }
    }
}

impl Default for InMemoryArchive {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RESOLUTION)
    }
}

impl ForecastArchive for InMemoryArchive {
    fn query<'a>(&'a self, query: &ArchiveQuery) -> Result<Records<'a>, ArchiveError> {
        let query = *query;
        let indices: Box<dyn Iterator<Item = usize> + 'a> = match query.valid {
            ValidFilter::Any => Box::new(0..self.records.len()),
            ValidFilter::At(valid_at) => Box::new(
                self.by_valid
                    .get(&valid_at.unix_timestamp())
                    .into_iter()
                    .flatten()
                    .copied(),
            ),
            ValidFilter::Between(start, end) => {
                if end < start {
                    return Err(ArchiveError::InvalidQuery(format!(
                        "valid range ends ({}) before it starts ({})",
                        end, start
                    )));
                }
                Box::new(
                    self.by_valid
                        .range(start.unix_timestamp()..end.unix_timestamp())
                        .flat_map(|(_, indices)| indices.iter().copied()),
                )
            }
        };

        Ok(Box::new(
            indices
                .map(move |index| &self.records[index])
                .filter(move |record| {
                    query.issued_in_range(record.issued_at) && self.covers(record, &query.geometry)
                }),
        ))
    }

    fn variables(&self) -> Vec<String> {
        self.variables.iter().cloned().collect()
    }
}

type CacheKey = ((i64, i64), i64, Option<i64>, i64);

/// Memoises latest-issuance lookups for the duration of one run. Nearby
/// samples resolve the same (cell, valid time, cutoff) triples over and over.
pub struct CachedArchive<A> {
    inner: A,
    resolution: f64,
    cache: Mutex<HashMap<CacheKey, Option<ForecastRecord>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<A: ForecastArchive> CachedArchive<A> {
    pub fn new(inner: A, resolution: f64) -> Self {
        Self {
            inner,
            resolution,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn key(&self, query: &LatestQuery) -> CacheKey {
        (
            query.location.cell(self.resolution),
            query.valid_at.unix_timestamp(),
            query.issued_from.map(|t| t.unix_timestamp()),
            query.issued_before.unix_timestamp(),
        )
    }
}

impl<A: ForecastArchive> ForecastArchive for CachedArchive<A> {
    fn query<'a>(&'a self, query: &ArchiveQuery) -> Result<Records<'a>, ArchiveError> {
        self.inner.query(query)
    }

    fn variables(&self) -> Vec<String> {
        self.inner.variables()
    }

    fn latest_issued(&self, query: &LatestQuery) -> Result<Option<ForecastRecord>, ArchiveError> {
        let key = self.key(query);
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }

        // errors are not cached so a later call can still succeed
        let resolved = self.inner.latest_issued(query)?;
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key, resolved.clone());
        Ok(resolved)
    }
}
