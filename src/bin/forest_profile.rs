//! Forest profile: timings and RSS at various tree sizes.
//!
//! Loads one pre-numbered tree of 1K, 10K and 100K nodes into the memory
//! and file stores, then times single-node inserts and a subtree move on
//! top of it. Prints a table to stdout.
//!
//! Run: cargo run --release --bin forest_profile
//! Logs: RUST_LOG=nestset=debug

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nestset::{FileStore, InsertMode, MemoryStore, NodeRecord, NodeStore, StoreConfig, TreeEngine};
use sysinfo::{ProcessRefreshKind, RefreshKind, System};
use tracing_subscriber::EnvFilter;

const FANOUT: usize = 8;
const SINGLE_INSERTS: usize = 200;

// ── Temp directory ─────────────────────────────────────────────────────

static COUNTER: AtomicUsize = AtomicUsize::new(0);

struct TmpDir(PathBuf);

impl TmpDir {
    fn new() -> Result<Self> {
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let path = std::env::temp_dir().join(format!("nestset-profile-{}-{}", pid, id));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

// ── Tree generator ─────────────────────────────────────────────────────

/// Complete `FANOUT`-ary tree in heap layout, numbered depth-first.
fn make_tree(count: usize) -> Vec<NodeRecord<u64, String>> {
    let mut nodes: Vec<NodeRecord<u64, String>> = (0..count)
        .map(|i| NodeRecord::new(format!("node_{}", i)))
        .collect();

    let mut counter = 0;
    // (index, level, children visited)
    let mut stack = vec![(0usize, 0i32, false)];
    while let Some((idx, level, visited)) = stack.pop() {
        counter += 1;
        if visited {
            nodes[idx].right = counter;
            continue;
        }
        nodes[idx].left = counter;
        nodes[idx].level = level;
        stack.push((idx, level, true));
        let first = idx * FANOUT + 1;
        for child in (first..(first + FANOUT).min(count)).rev() {
            stack.push((child, level + 1, false));
        }
    }
    nodes
}

// ── RSS measurement ────────────────────────────────────────────────────

fn get_process_rss() -> u64 {
    let mut sys = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::everything()),
    );
    sys.refresh_all();
    sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid).map(|p| p.memory()))
        .unwrap_or(0)
}

struct Sample {
    load: Duration,
    inserts: Duration,
    moved: Duration,
    rss: u64,
}

fn profile<S>(mut engine: TreeEngine<S>, size: usize) -> Result<Sample>
where
    S: NodeStore<Key = u64, Data = String>,
{
    // Let OS settle RSS from prior allocations
    std::thread::sleep(Duration::from_millis(100));
    let baseline = get_process_rss();

    let start = Instant::now();
    let tree = engine.insert_root_batch(make_tree(size))?;
    let load = start.elapsed();

    let root = tree[0].id.context("root has no id")?;
    let start = Instant::now();
    for i in 0..SINGLE_INSERTS {
        engine.insert_below(root, NodeRecord::new(format!("extra_{}", i)), InsertMode::Right)?;
    }
    let inserts = start.elapsed() / SINGLE_INSERTS as u32;

    let children = engine.get_immediate_children(root)?;
    let first = children.first().and_then(|n| n.id).context("root has no children")?;
    let last = children.last().and_then(|n| n.id).context("root has no children")?;
    let start = Instant::now();
    engine.move_to_parent(first, last, InsertMode::Right)?;
    let moved = start.elapsed();

    let violations = engine.verify(root)?;
    anyhow::ensure!(violations.is_empty(), "tree broken after profiling: {:?}", violations.first());

    let rss = get_process_rss().saturating_sub(baseline);
    drop(engine);

    Ok(Sample { load, inserts, moved, rss })
}

fn print_row(label: &str, size: usize, sample: &Sample) {
    println!(
        "{:<8} {:<10} {:>12.1?} {:>14.1?} {:>12.1?} {:>10.1}",
        label,
        size,
        sample.load,
        sample.inserts,
        sample.moved,
        sample.rss as f64 / (1024.0 * 1024.0)
    );
}

// ── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    println!("nestset Forest Profile");
    println!("======================");
    println!();
    println!(
        "{:<8} {:<10} {:>12} {:>14} {:>12} {:>10}",
        "Store", "Nodes", "Load", "Insert (avg)", "Move", "RSS (MB)"
    );
    println!("{:-<71}", "");

    for size in [1_000, 10_000, 100_000] {
        eprint!("Measuring {}... ", size);

        let memory = profile(TreeEngine::new(MemoryStore::<String>::new()), size)?;
        print_row("memory", size, &memory);

        let dir = TmpDir::new()?;
        let config = StoreConfig { sync_on_commit: false, ..StoreConfig::default() };
        let store = FileStore::<String>::create(dir.path(), config)?;
        let file = profile(TreeEngine::new(store), size)?;
        print_row("file", size, &file);

        eprintln!("done");
    }

    println!();
    println!("Note: file store rewrites its snapshot on every commit;");
    println!("      insert timings include that write.");
    Ok(())
}
