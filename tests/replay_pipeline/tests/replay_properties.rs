use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use ingestion_corpus::CorpusIndexer;
use ingestion_dispatch::Dispatcher;
use ingestion_scheduling::{BatchScheduler, SchedulerError, Transition};
use runtime_cadence::CadenceDriver;
use storage_sink::FsSink;
use tempfile::tempdir;

fn seed(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(
            dir.join(name),
            format!("OrderID,ProductID,ProductName,Amount,Price,Discount\n1,1,{name},1,1,0\n"),
        )
        .unwrap();
    }
}

fn destination(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            (
                entry.file_name().to_string_lossy().into_owned(),
                fs::read(entry.path()).unwrap(),
            )
        })
        .collect()
}

#[test]
fn two_by_two_corpus_replays_in_order_then_wraps() -> Result<()> {
    let source = tempdir()?;
    seed(
        source.path(),
        &[
            "Shard-2-20210101-01.csv",
            "Shard-1-20210101-00.csv",
            "Shard-1-20210101-01.csv",
            "Shard-2-20210101-00.csv",
        ],
    );
    let corpus = CorpusIndexer::default().index(source.path())?;
    let mut scheduler = BatchScheduler::new(corpus, 2);

    let names = |scheduler: &mut BatchScheduler| -> Vec<String> {
        let batch = scheduler.next_batch().unwrap();
        assert!(batch.is_aligned());
        batch.artifacts().iter().map(|a| a.file_name.clone()).collect()
    };
    let t0 = vec!["Shard-1-20210101-00.csv", "Shard-2-20210101-00.csv"];
    let t1 = vec!["Shard-1-20210101-01.csv", "Shard-2-20210101-01.csv"];
    assert_eq!(names(&mut scheduler), t0);
    assert_eq!(names(&mut scheduler), t1);
    assert_eq!(names(&mut scheduler), t0);
    Ok(())
}

#[test]
fn odd_corpus_drops_its_tail_each_cycle() -> Result<()> {
    let source = tempdir()?;
    seed(
        source.path(),
        &[
            "Shard-1-20210101-00.csv",
            "Shard-2-20210101-00.csv",
            "Shard-1-20210101-01.csv",
            "Shard-2-20210101-01.csv",
            "Shard-1-20210101-02.csv",
        ],
    );
    let corpus = CorpusIndexer::default().index(source.path())?;
    let mut scheduler = BatchScheduler::new(corpus, 2);

    let mut dispatched = Vec::new();
    for _ in 0..2 {
        let batch = scheduler.next_batch()?;
        dispatched.extend(batch.artifacts().iter().map(|a| a.file_name.clone()));
    }
    let wrapped = scheduler.next_batch()?;
    assert_eq!(wrapped.transition(), Transition::Wrapped { dropped_tail: 1 });
    assert_eq!(wrapped.artifacts()[0].file_name, "Shard-1-20210101-00.csv");
    assert!(!dispatched.iter().any(|name| name == "Shard-1-20210101-02.csv"));
    Ok(())
}

#[test]
fn corpus_with_only_malformed_names_cannot_be_scheduled() -> Result<()> {
    let source = tempdir()?;
    seed(source.path(), &["Shard-abc-20210101-00.csv"]);
    let corpus = CorpusIndexer::default().index(source.path())?;
    assert!(corpus.is_empty());
    let mut scheduler = BatchScheduler::new(corpus, 1);
    assert_eq!(scheduler.next_batch().unwrap_err(), SchedulerError::EmptyCorpus);
    Ok(())
}

#[tokio::test]
async fn replaying_a_full_cycle_twice_leaves_destination_unchanged() -> Result<()> {
    let source = tempdir()?;
    let dest = tempdir()?;
    seed(
        source.path(),
        &[
            "Shard-1-20210101-00.csv",
            "Shard-2-20210101-00.csv",
            "Shard-1-20210101-01.csv",
            "Shard-2-20210101-01.csv",
        ],
    );
    let corpus = CorpusIndexer::default().index(source.path())?;
    let sink = Arc::new(FsSink::open(dest.path())?);
    let mut driver = CadenceDriver::new(
        BatchScheduler::new(corpus, 2),
        Dispatcher::new(sink),
        std::time::Duration::from_millis(1),
    );

    driver.run_once().await?;
    driver.run_once().await?;
    let after_first_cycle = destination(dest.path());
    assert_eq!(after_first_cycle.len(), 4);

    driver.run_once().await?;
    driver.run_once().await?;
    assert_eq!(destination(dest.path()), after_first_cycle);
    assert_eq!(driver.scheduler().cycle(), 1);
    Ok(())
}

#[tokio::test]
async fn partial_batch_reports_one_of_two() -> Result<()> {
    let source = tempdir()?;
    let dest = tempdir()?;
    seed(
        source.path(),
        &["Shard-1-20210101-00.csv", "Shard-2-20210101-00.csv"],
    );
    let corpus = CorpusIndexer::default().index(source.path())?;
    fs::remove_file(source.path().join("Shard-2-20210101-00.csv"))?;

    let sink = Arc::new(FsSink::open(dest.path())?);
    let mut driver = CadenceDriver::new(
        BatchScheduler::new(corpus, 2),
        Dispatcher::new(sink),
        std::time::Duration::from_millis(1),
    );
    let outcome = driver.run_once().await?;
    assert_eq!((outcome.succeeded, outcome.total), (1, 2));

    // Next tick still runs.
    let outcome = driver.run_once().await?;
    assert_eq!(outcome.total, 2);
    Ok(())
}
