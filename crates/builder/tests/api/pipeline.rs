use crate::helpers::{hourly_archive, job_reporting, logger, MockService, POND};
use builder::{
    create_dataset, dataset_key, export_key, DatasetOutcome, ExportJob, FeatureConfig, JobOutcome,
    JobState, LocalObjectStore, ObjectStore, ObjectStoreExport, PipelineConfig, PollSettings,
    Sample, Value,
};
use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};
use time::macros::datetime;
use tokio_util::sync::CancellationToken;

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        features: FeatureConfig {
            timezone: "UTC".into(),
            valid_time_shift_minutes: 0,
            ..Default::default()
        },
        poll: PollSettings {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        },
        download_dir: root.join("downloads"),
        output_dir: root.join("output"),
        range_labels: true,
    }
}

fn samples() -> Vec<Sample> {
    vec![
        Sample::new(0, POND, datetime!(2024-06-15 9:00 UTC))
            .with_pond("AR01")
            .with_attribute("do_mg_per_L", Value::Number(2.5)),
        Sample::new(1, POND, datetime!(2024-06-15 16:00 UTC)).with_pond("AR01"),
    ]
}

fn read_rows(path: &Path) -> Vec<HashMap<String, String>> {
    let mut rdr = csv::Reader::from_path(path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    rdr.records()
        .map(|record| {
            let record = record.unwrap();
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn builds_and_publishes_the_feature_table() {
    let root = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> =
        Arc::new(LocalObjectStore::new(root.path().join("store"), logger()));
    let export = ObjectStoreExport::new(store.clone(), logger());
    let config = config(root.path());

    let outcome = create_dataset(
        "june",
        &samples(),
        &hourly_archive(),
        &config,
        &export,
        store.as_ref(),
        &CancellationToken::new(),
        &logger(),
    )
    .await
    .unwrap();

    let DatasetOutcome::Created { path, rows } = outcome else {
        panic!("expected a dataset, got {:?}", outcome);
    };
    assert_eq!(rows, 2);
    assert_eq!(path, root.path().join("output/june_predict_df.csv"));
    assert_eq!(store.list(&export_key("june")).await.unwrap().len(), 1);
    assert_eq!(store.list(&dataset_key("june")).await.unwrap().len(), 1);

    let table = read_rows(&path);
    assert_eq!(table.len(), 2);
    let first = &table[0];
    assert_eq!(first["sample_idx"], "0");
    assert_eq!(first["pond_id"], "AR01");
    assert_eq!(first["n_forecasts_8"], "1");
    assert_eq!(first["rain_8"].parse::<f64>().unwrap(), 0.5);
    // 00:00 through 09:00
    assert_eq!(first["n_forecasts_same_day_sum"], "10");
    assert_eq!(first["rain_same_day_sum"].parse::<f64>().unwrap(), 5.0);
    assert_eq!(first["do_mg_per_L_status"], "below");
    assert_eq!(first["morning"], "true");

    let second = &table[1];
    assert_eq!(second["n_forecasts_same_day_sum"], "17");
    assert_eq!(second["morning"], "false");
    assert_eq!(second["do_mg_per_L_status"], "");
}

#[tokio::test]
async fn ignores_exports_of_similarly_named_datasets() {
    let root = tempfile::tempdir().unwrap();
    let store: Arc<dyn ObjectStore> =
        Arc::new(LocalObjectStore::new(root.path().join("store"), logger()));
    store
        .put(
            "exports/june_gfs_v2.csv",
            b"sample_idx,forecast_time,forecast_creation_dt,forecast_hour,n_forecasts,wind\n"
                .to_vec(),
        )
        .await
        .unwrap();
    let export = ObjectStoreExport::new(store.clone(), logger());
    let config = config(root.path());

    let outcome = create_dataset(
        "june",
        &samples(),
        &hourly_archive(),
        &config,
        &export,
        store.as_ref(),
        &CancellationToken::new(),
        &logger(),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, DatasetOutcome::Created { rows: 2, .. }));
    assert!(config.download_dir.join("june_gfs.csv").exists());
    assert!(!config.download_dir.join("june_gfs_v2.csv").exists());
}

#[tokio::test(start_paused = true)]
async fn failed_export_stops_before_download() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(root.path().join("store"), logger());
    let config = config(root.path());

    let mut export = MockService::new();
    export
        .expect_submit()
        .withf(|_, destination| destination.to_string() == "exports/june_gfs.csv")
        .times(1)
        .returning(|_, _| {
            let job: Box<dyn ExportJob> =
                Box::new(job_reporting(vec![JobState::Pending, JobState::Failure]));
            Ok(job)
        });

    let outcome = create_dataset(
        "june",
        &samples(),
        &hourly_archive(),
        &config,
        &export,
        &store,
        &CancellationToken::new(),
        &logger(),
    )
    .await
    .unwrap();

    assert_eq!(outcome, DatasetOutcome::ExportFailed(JobOutcome::Failed));
    assert!(!config.download_dir.exists());
    assert!(!config.output_dir.exists());
}

#[tokio::test]
async fn rejects_an_empty_sample_list() {
    let root = tempfile::tempdir().unwrap();
    let store = LocalObjectStore::new(root.path().join("store"), logger());
    let export = MockService::new();

    let result = create_dataset(
        "empty",
        &[],
        &hourly_archive(),
        &config(root.path()),
        &export,
        &store,
        &CancellationToken::new(),
        &logger(),
    )
    .await;
    assert!(result.is_err());
}
