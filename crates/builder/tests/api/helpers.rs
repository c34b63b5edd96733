use async_trait::async_trait;
use builder::{
    ExportError, ExportJob, ExportService, ForecastRecord, GeoPoint, InMemoryArchive, JobState,
    LongTable,
};
use mockall::mock;
use slog::{o, Discard, Logger};
use time::{macros::datetime, Duration};

mock! {
    pub Job {}

    #[async_trait]
    impl ExportJob for Job {
        fn id(&self) -> String;
        async fn status(&self) -> Result<JobState, ExportError>;
    }
}

mock! {
    pub Service {}

    #[async_trait]
    impl ExportService for Service {
        async fn submit(
            &self,
            table: &LongTable,
            destination: &str,
        ) -> Result<Box<dyn ExportJob>, ExportError>;
    }
}

pub fn logger() -> Logger {
    Logger::root(Discard, o!())
}

/// Job that reports `states` in order, then keeps repeating the last one
pub fn job_reporting(states: Vec<JobState>) -> MockJob {
    let mut job = MockJob::new();
    job.expect_id().return_const("export-1".to_string());
    let mut calls = 0;
    job.expect_status().returning(move || {
        let state = states[calls.min(states.len() - 1)];
        calls += 1;
        Ok(state)
    });
    job
}

pub const POND: GeoPoint = GeoPoint {
    latitude: 16.5,
    longitude: 80.5,
};

/// A single run issued 2024-06-11 00:00 UTC with hourly `rain` of 0.5 from
/// June 5th to June 17th
pub fn hourly_archive() -> InMemoryArchive {
    let issued = datetime!(2024-06-11 0:00 UTC);
    let start = datetime!(2024-06-05 0:00 UTC);
    InMemoryArchive::from_records(
        InMemoryArchive::DEFAULT_RESOLUTION,
        (0..12 * 24).map(|h| {
            ForecastRecord::new(issued, start + Duration::hours(h), POND).with_value("rain", 0.5)
        }),
    )
}
