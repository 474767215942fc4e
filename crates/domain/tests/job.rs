use std::sync::Arc;

use chrono::NaiveDate;

use flightcrawl_core::CrawlerError;
use flightcrawl_domain::{
    JobContext, JobOptions, RequestCreate, RequestRepository, RequestStatus, SortOption,
};
use flightcrawl_testing_utils::{sample_request_create, MockRequestRepository};

fn repository() -> Arc<dyn RequestRepository> {
    Arc::new(MockRequestRepository::new())
}

#[tokio::test]
async fn create_stages_skeleton_and_snapshot() {
    let data_root = tempfile::tempdir().unwrap();
    let job = JobContext::create(
        repository(),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    assert!(job.save_path().join(JobContext::COMPLETED_DIR).is_dir());
    assert!(job.save_path().join(JobContext::FAILED_DIR).is_dir());
    assert!(job.save_path().join(JobContext::REQUEST_FILE).is_file());
    assert!(job
        .save_path()
        .ends_with("2025-06-01/LHR-IST-2025-06-01-price-id1"));
}

#[tokio::test]
async fn setup_path_is_idempotent() {
    let data_root = tempfile::tempdir().unwrap();
    let job = JobContext::create(
        repository(),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    let snapshot_path = job.save_path().join(JobContext::REQUEST_FILE);
    let before = std::fs::read(&snapshot_path).unwrap();

    job.setup_path().await.unwrap();
    job.setup_path().await.unwrap();

    assert_eq!(std::fs::read(&snapshot_path).unwrap(), before);
}

#[tokio::test]
async fn staging_path_is_deterministic_across_constructions() {
    let data_root = tempfile::tempdir().unwrap();
    let repository = repository();

    let first = JobContext::create(
        Arc::clone(&repository),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();
    let second = JobContext::attach(
        repository,
        data_root.path(),
        first.request().id,
        JobOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(first.save_path(), second.save_path());
}

#[tokio::test]
async fn from_dir_recovers_the_request_id() {
    let data_root = tempfile::tempdir().unwrap();
    let repository = repository();

    let job = JobContext::create(
        Arc::clone(&repository),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    let recovered = JobContext::from_dir(repository, job.save_path())
        .await
        .unwrap();

    assert_eq!(recovered.request().id, job.request().id);
    assert_eq!(recovered.save_path(), job.save_path());
}

#[tokio::test]
async fn success_writes_status_through_the_store() {
    let data_root = tempfile::tempdir().unwrap();
    let repository = repository();

    let mut job = JobContext::create(
        Arc::clone(&repository),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    job.success().await.unwrap();

    let stored = repository.get_by_id(job.request().id).await.unwrap().unwrap();
    assert_eq!(stored.status, Some(RequestStatus::Finished));
    assert_eq!(job.get_status().await.unwrap(), Some(RequestStatus::Finished));
    assert_eq!(job.request().status, Some(RequestStatus::Finished));
}

#[tokio::test]
async fn fail_marks_the_request_failed() {
    let data_root = tempfile::tempdir().unwrap();
    let repository = repository();

    let mut job = JobContext::create(
        Arc::clone(&repository),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    job.fail().await.unwrap();

    assert_eq!(job.get_status().await.unwrap(), Some(RequestStatus::Failed));
}

#[tokio::test]
async fn reset_removes_previous_contents() {
    let data_root = tempfile::tempdir().unwrap();
    let repository = repository();

    let job = JobContext::create(
        Arc::clone(&repository),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    let leftover = job.save_path().join(JobContext::COMPLETED_DIR).join("page1.html");
    std::fs::write(&leftover, b"stale crawl output").unwrap();

    let job = JobContext::attach(
        repository,
        data_root.path(),
        job.request().id,
        JobOptions {
            reset: true,
            save_path: None,
        },
    )
    .await
    .unwrap();

    assert!(!leftover.exists());
    assert!(job.save_path().join(JobContext::COMPLETED_DIR).is_dir());
    assert!(job.save_path().join(JobContext::REQUEST_FILE).is_file());
}

#[tokio::test]
async fn attach_to_unknown_id_is_fatal() {
    let data_root = tempfile::tempdir().unwrap();

    let result = JobContext::attach(
        repository(),
        data_root.path(),
        999,
        JobOptions::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(CrawlerError::RequestNotFound { id: 999 })
    ));
}

#[tokio::test]
async fn invalid_parameters_never_reach_the_store() {
    let data_root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockRequestRepository::new());

    let create = RequestCreate {
        dep_port: "LHR".to_string(),
        arr_port: "IST".to_string(),
        dep_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
        ret_date: NaiveDate::from_ymd_opt(2025, 6, 1),
        flex_option: 0,
        sorted_by: SortOption::Price,
        direct: false,
    };

    let result = JobContext::create(
        Arc::clone(&mock) as Arc<dyn RequestRepository>,
        data_root.path(),
        create,
        JobOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(CrawlerError::InvalidRequest(_))));
    assert_eq!(mock.count(), 0);
}

#[tokio::test]
async fn snapshot_reads_back_the_persisted_request() {
    let data_root = tempfile::tempdir().unwrap();
    let job = JobContext::create(
        repository(),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    let snapshot = job.snapshot_from_file().await.unwrap();
    assert_eq!(&snapshot, job.request());
}

#[tokio::test]
async fn remove_path_deletes_the_staging_tree() {
    let data_root = tempfile::tempdir().unwrap();
    let job = JobContext::create(
        repository(),
        data_root.path(),
        sample_request_create(),
        JobOptions::default(),
    )
    .await
    .unwrap();

    job.remove_path().await.unwrap();
    assert!(!job.save_path().exists());

    // removing an already-absent path is fine
    job.remove_path().await.unwrap();
}
