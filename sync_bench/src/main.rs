use clap::{App, Arg, ArgMatches};
use jvm_sync::runtime::inflate::monitors_in_use;
use jvm_sync::{JavaThread, Object, ObjectSynchronizer, SyncConfig, SyncResult};
use log::{error, info, LevelFilter};
use pretty_env_logger::env_logger::Target;
use std::process::exit;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

fn main() {
    let app = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true)
                .default_value("4")
                .help("Number of attached threads competing for the objects"),
        )
        .arg(
            Arg::with_name("iterations")
                .short("n")
                .long("iterations")
                .takes_value(true)
                .default_value("100000")
                .help("Synchronized blocks entered by each thread"),
        )
        .arg(
            Arg::with_name("objects")
                .short("o")
                .long("objects")
                .takes_value(true)
                .default_value("1")
                .help("Number of shared objects to spread the locking across"),
        )
        .arg(
            Arg::with_name("flags")
                .short("X")
                .long("flags")
                .takes_value(true)
                .allow_hyphen_values(true)
                .help("Lock options, e.g. \"-XX:-UseBiasedLocking -XX:SpinLimit=0\""),
        )
        .arg(
            Arg::with_name("json")
                .long("json")
                .help("Print lock statistics as JSON"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log lock protocol events"),
        )
        .get_matches();

    pretty_env_logger::formatted_builder()
        .target(Target::Stdout)
        .filter_level(match app.is_present("verbose") {
            true => LevelFilter::Debug,
            false => LevelFilter::Warn,
        })
        .init();

    let threads: usize = numeric_arg(&app, "threads");
    let iterations: usize = numeric_arg(&app, "iterations");
    let objects: usize = numeric_arg(&app, "objects");
    if threads == 0 || objects == 0 {
        eprintln!("At least one thread and one object are required");
        exit(1);
    }

    let config = SyncConfig::from_env()
        .and_then(|config| config.apply_flags(app.value_of("flags").unwrap_or("")));
    let config = match config {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}", e);
            exit(1);
        }
    };

    let sync = ObjectSynchronizer::new(config);
    let klass = sync.new_klass("sync_bench/Counter");
    let objects: Vec<Object> = (0..objects).map(|_| Object::new(&klass)).collect();
    let counts: Vec<AtomicUsize> = (0..objects.len()).map(|_| AtomicUsize::new(0)).collect();
    let barrier = Barrier::new(threads);

    info!("Running {} threads x {} iterations over {} objects", threads, iterations, objects.len());
    let start = Instant::now();

    let failures = thread::scope(|s| {
        let workers: Vec<_> = (0..threads)
            .map(|id| {
                let (sync, objects, counts, barrier) = (&sync, &objects, &counts, &barrier);
                s.spawn(move || worker(id, sync, objects, counts, iterations, barrier))
            })
            .collect();

        workers
            .into_iter()
            .map(|handle| handle.join())
            .filter(|result| !matches!(result, Ok(Ok(()))))
            .count()
    });

    let elapsed = start.elapsed();
    let total: usize = counts.iter().map(|x| x.load(Ordering::SeqCst)).sum();

    if failures != 0 || total != threads * iterations {
        error!("{} workers failed, counted {} of {} increments", failures, total, threads * iterations);
        exit(1);
    }

    let stats = sync.statistics();
    if app.is_present("json") {
        match serde_json::to_string_pretty(&stats) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Unable to serialize statistics: {}", e);
                exit(1);
            }
        }
        return;
    }

    println!("{} synchronized blocks in {:?} ({:.1} ns/op)", total, elapsed, elapsed.as_nanos() as f64 / total.max(1) as f64);
    println!("Monitors in use: {}", monitors_in_use());
    println!("{:#?}", stats);
}

fn numeric_arg<T: FromStr>(app: &ArgMatches, name: &str) -> T {
    let value = app.value_of(name).unwrap_or_default();
    match value.parse() {
        Ok(x) => x,
        Err(_) => {
            eprintln!("Invalid value for --{}: {:?}", name, value);
            exit(1);
        }
    }
}

fn worker(
    id: usize,
    sync: &ObjectSynchronizer,
    objects: &[Object],
    counts: &[AtomicUsize],
    iterations: usize,
    barrier: &Barrier,
) -> SyncResult<()> {
    barrier.wait();
    let thread = JavaThread::attach(format!("worker-{}", id))?;

    for i in 0..iterations {
        let idx = (i + id) % objects.len();
        sync.synchronized(&objects[idx], &thread, |_| {
            let value = counts[idx].load(Ordering::Relaxed);
            counts[idx].store(value + 1, Ordering::Relaxed);
        })?;
    }

    JavaThread::detach()
}
