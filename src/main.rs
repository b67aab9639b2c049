//! heapdb workload driver - concurrent insert transactions against one table

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use heapdb::access::{Field, FieldType, HeapFile, Tuple, TupleDesc};
use heapdb::database::Database;
use heapdb::storage::wal::{FileLog, LogFile, MemoryLog, WalConfig};
use heapdb::storage::{BufferPoolConfig, StorageResult};
use log::{debug, info, warn};
use rand::Rng;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Runs concurrent insert transactions through the buffer pool and checks
/// that exactly the committed rows are visible afterwards
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short = 'D', long, default_value = "./heapdb_data")]
    data_dir: PathBuf,

    /// Buffer pool capacity in pages
    #[arg(short, long, default_value = "50")]
    pool_pages: usize,

    /// Concurrent worker threads
    #[arg(short, long, default_value = "4")]
    threads: usize,

    /// Transactions per thread
    #[arg(short = 'n', long, default_value = "20")]
    transactions: usize,

    /// Rows inserted by each transaction
    #[arg(short, long, default_value = "10")]
    rows: usize,

    /// Fraction of transactions that deliberately abort
    #[arg(short, long, default_value = "0.1")]
    abort_ratio: f64,

    /// Write the log to a file in the data directory instead of memory
    #[arg(long)]
    wal: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Default)]
struct Stats {
    committed_rows: AtomicUsize,
    committed: AtomicUsize,
    aborted: AtomicUsize,
    retries: AtomicUsize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if !(0.0..=1.0).contains(&args.abort_ratio) {
        bail!("--abort-ratio must be between 0 and 1, got {}", args.abort_ratio);
    }

    std::fs::create_dir_all(&args.data_dir).context("Failed to create data directory")?;
    let table_path = args.data_dir.join("rows.dat");
    if table_path.exists() {
        std::fs::remove_file(&table_path).context("Failed to remove previous table file")?;
    }

    let wal: Arc<dyn LogFile> = if args.wal {
        let config = WalConfig {
            path: args.data_dir.join("heapdb.log"),
            ..Default::default()
        };
        info!("Writing log to {}", config.path.display());
        Arc::new(FileLog::create(config).context("Failed to create log file")?)
    } else {
        Arc::new(MemoryLog::new())
    };

    let config = BufferPoolConfig::default().with_num_pages(args.pool_pages);
    let db = Database::new(config, wal);
    let desc = Arc::new(TupleDesc::new(
        &[FieldType::Int, FieldType::Int, FieldType::Str],
        &["worker", "seq", "payload"],
    )?);
    let table = db.create_table(&table_path, Arc::clone(&desc))?;
    info!(
        "Table {} at {} ({} threads x {} transactions x {} rows)",
        table.table_id(),
        table_path.display(),
        args.threads,
        args.transactions,
        args.rows
    );

    let stats = Stats::default();
    thread::scope(|scope| {
        for worker in 0..args.threads {
            let (db, table, desc, stats, args) = (&db, &table, &desc, &stats, &args);
            scope.spawn(move || run_worker(worker, db, table, desc, stats, args));
        }
    });

    let expected = stats.committed_rows.load(Ordering::SeqCst);
    let found = count_rows(&db, &table)?;
    println!(
        "committed {} / aborted {} transactions ({} lock-timeout retries)",
        stats.committed.load(Ordering::SeqCst),
        stats.aborted.load(Ordering::SeqCst),
        stats.retries.load(Ordering::SeqCst)
    );
    println!(
        "{} rows on {} pages, {} expected",
        found,
        table.num_pages()?,
        expected
    );

    if found != expected {
        bail!("Row count mismatch: found {}, expected {}", found, expected);
    }
    Ok(())
}

fn run_worker(
    worker: usize,
    db: &Database,
    table: &HeapFile,
    desc: &Arc<TupleDesc>,
    stats: &Stats,
    args: &Args,
) {
    let mut rng = rand::thread_rng();

    for seq in 0..args.transactions {
        loop {
            let txn = db.begin();
            let outcome = insert_rows(db, table, desc, txn.id(), worker, seq, args.rows);

            match outcome {
                Ok(()) if rng.gen_bool(args.abort_ratio) => {
                    debug!("{} aborting on purpose", txn.id());
                    if let Err(e) = txn.abort() {
                        warn!("worker {} abort failed: {}", worker, e);
                    }
                    stats.aborted.fetch_add(1, Ordering::SeqCst);
                    break;
                }
                Ok(()) => match txn.commit() {
                    Ok(()) => {
                        stats.committed.fetch_add(1, Ordering::SeqCst);
                        stats.committed_rows.fetch_add(args.rows, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        warn!("worker {} commit failed: {}", worker, e);
                        stats.aborted.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                },
                Err(e) if e.is_abort() => {
                    // Dropping the handle rolls the transaction back
                    debug!("worker {} retrying: {}", worker, e);
                    drop(txn);
                    stats.retries.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    warn!("worker {} giving up on transaction {}: {}", worker, seq, e);
                    stats.aborted.fetch_add(1, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

fn insert_rows(
    db: &Database,
    table: &HeapFile,
    desc: &Arc<TupleDesc>,
    tid: heapdb::transaction::TransactionId,
    worker: usize,
    seq: usize,
    rows: usize,
) -> StorageResult<()> {
    for row in 0..rows {
        let tuple = Tuple::new(
            Arc::clone(desc),
            vec![
                Field::Int(worker as i32),
                Field::Int(seq as i32),
                Field::Str(format!("w{worker}-t{seq}-r{row}")),
            ],
        )?;
        db.buffer_pool().insert_tuple(tid, table.table_id(), tuple)?;
    }
    Ok(())
}

fn count_rows(db: &Database, table: &HeapFile) -> Result<usize> {
    let txn = db.begin();
    let mut scan = db.scan(table.table_id(), txn.id())?;
    scan.open()?;

    let mut count = 0;
    for tuple in &mut scan {
        tuple?;
        count += 1;
    }
    txn.commit()?;
    Ok(count)
}
