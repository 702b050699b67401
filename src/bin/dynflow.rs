//! dynflow CLI: workload simulation driver for the orchestration engine.
//!
//! Spins up producer threads that generate synthetic workflows (randomly
//! chained tasks spread over the queues) and processor threads that poll
//! dequeue, simulate work, and report completion. None of this affects
//! engine correctness; it exists to exercise the engine under real
//! thread contention.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use dynflow::Database;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dynflow", about = "In-memory workflow orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workload simulation
    Demo {
        /// Number of queues
        #[arg(long, default_value_t = 5)]
        queues: usize,
        /// Queue-processor threads polling for work
        #[arg(long, default_value_t = 10)]
        processors: usize,
        /// Workflow-producer threads
        #[arg(long, default_value_t = 2)]
        producers: usize,
        /// Tasks per generated workflow
        #[arg(long, default_value_t = 5)]
        tasks: usize,
        /// Processor poll interval in milliseconds
        #[arg(long, default_value_t = 1000)]
        poll_ms: u64,
        /// Simulated task processing time in milliseconds
        #[arg(long, default_value_t = 4000)]
        work_ms: u64,
        /// Workflow creation interval in milliseconds
        #[arg(long, default_value_t = 1500)]
        spawn_ms: u64,
        /// Random variance applied to every interval, in milliseconds
        #[arg(long, default_value_t = 200)]
        jitter_ms: u64,
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(long)]
        duration: Option<u64>,
        /// Dump the engine event stream as JSON lines on exit
        #[arg(long)]
        events: bool,
    },
}

#[derive(Clone)]
struct DemoOpts {
    tasks: usize,
    poll_ms: u64,
    work_ms: u64,
    spawn_ms: u64,
    jitter_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo {
            queues,
            processors,
            producers,
            tasks,
            poll_ms,
            work_ms,
            spawn_ms,
            jitter_ms,
            duration,
            events,
        } => run_demo(
            queues,
            processors,
            producers,
            DemoOpts {
                tasks,
                poll_ms,
                work_ms,
                spawn_ms,
                jitter_ms,
            },
            duration,
            events,
        ),
    }
}

fn run_demo(
    queues: usize,
    processors: usize,
    producers: usize,
    opts: DemoOpts,
    duration: Option<u64>,
    dump_events: bool,
) -> anyhow::Result<()> {
    let db = Arc::new(Database::new());
    let queue_names: Vec<String> = (1..=queues).map(|i| format!("queue-{i}")).collect();
    for name in &queue_names {
        db.create_queue(name)?;
    }

    let stopping = Arc::new(AtomicBool::new(false));
    let workflows_created = Arc::new(AtomicUsize::new(0));
    let tasks_completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..processors {
        let db = db.clone();
        let queue = queue_names[i % queue_names.len()].clone();
        let stopping = stopping.clone();
        let completed = tasks_completed.clone();
        let opts = opts.clone();
        handles.push(thread::spawn(move || {
            queue_processor(&db, &queue, &stopping, &completed, &opts);
        }));
    }
    for _ in 0..producers {
        let db = db.clone();
        let queue_names = queue_names.clone();
        let stopping = stopping.clone();
        let created = workflows_created.clone();
        let opts = opts.clone();
        handles.push(thread::spawn(move || {
            workflow_producer(&db, &queue_names, &stopping, &created, &opts);
        }));
    }

    let started = Instant::now();
    while !stopping.load(Ordering::Relaxed) {
        print_overview(&db, &queue_names, &workflows_created, &tasks_completed);
        if let Some(secs) = duration {
            if started.elapsed() >= Duration::from_secs(secs) {
                stopping.store(true, Ordering::Relaxed);
            }
        }
        thread::sleep(Duration::from_millis(200));
    }
    for handle in handles {
        let _ = handle.join();
    }
    print_overview(&db, &queue_names, &workflows_created, &tasks_completed);

    if dump_events {
        for event in db.events_since(0) {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}

fn print_overview(
    db: &Database,
    queue_names: &[String],
    created: &AtomicUsize,
    completed: &AtomicUsize,
) {
    println!(
        "{} workflows created, {} tasks completed",
        created.load(Ordering::Relaxed),
        completed.load(Ordering::Relaxed),
    );
    for name in queue_names {
        let queued = db.queued_count(name).unwrap_or(0);
        let running = db.running_count(name).unwrap_or(0);
        println!("  {name}: running {running}; queued {queued}");
    }
}

/// Generate a workflow of randomly chained tasks and resume it.
fn workflow_producer(
    db: &Database,
    queue_names: &[String],
    stopping: &AtomicBool,
    created: &AtomicUsize,
    opts: &DemoOpts,
) {
    let mut rng = rand::thread_rng();
    while !stopping.load(Ordering::Relaxed) {
        let n = created.fetch_add(1, Ordering::Relaxed);
        let workflow = format!("workflow-{n}");
        if let Err(e) = build_workflow(db, &workflow, queue_names, opts.tasks, &mut rng) {
            warn!(workflow = %workflow, error = %e, "producer failed");
        }
        thread::sleep(jittered(opts.spawn_ms, opts.jitter_ms, &mut rng));
    }
}

fn build_workflow(
    db: &Database,
    workflow: &str,
    queue_names: &[String],
    tasks: usize,
    rng: &mut impl Rng,
) -> dynflow::Result<()> {
    db.create_workflow(workflow)?;
    for i in 0..tasks {
        db.create_task(
            workflow,
            &format!("task-{}", i + 1),
            &queue_names[i % queue_names.len()],
        )?;
    }

    // Chain the tasks in a shuffled order, like real pipelines with
    // arbitrary hand-off points.
    let mut order: Vec<usize> = (1..=tasks).collect();
    order.shuffle(rng);
    for pair in order.windows(2) {
        db.add_dependency(
            workflow,
            &format!("task-{}", pair[0]),
            &format!("task-{}", pair[1]),
        )?;
    }

    db.resume_workflow(workflow)
}

/// Poll one queue for work: dequeue, simulate processing, complete.
fn queue_processor(
    db: &Database,
    queue: &str,
    stopping: &AtomicBool,
    completed: &AtomicUsize,
    opts: &DemoOpts,
) {
    let mut rng = rand::thread_rng();
    while !stopping.load(Ordering::Relaxed) {
        thread::sleep(jittered(opts.poll_ms, opts.jitter_ms, &mut rng));
        match db.dequeue(queue) {
            Ok(Some(task)) => {
                thread::sleep(jittered(opts.work_ms, opts.jitter_ms, &mut rng));
                match db.complete_task(&task.workflow, &task.task) {
                    Ok(()) => {
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => warn!(queue, error = %e, "completion failed"),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(queue, error = %e, "dequeue failed"),
        }
    }
}

fn jittered(base_ms: u64, jitter_ms: u64, rng: &mut impl Rng) -> Duration {
    let low = base_ms.saturating_sub(jitter_ms);
    let span = 2 * jitter_ms + 1;
    Duration::from_millis(low + rng.gen_range(0..span))
}
