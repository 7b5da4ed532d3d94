//! Demo host program
//!
//! Three tasks share the thread: two tickers sleeping at different rates
//! and an echo task reading stdin until it sees `q`. Main waits for all of
//! them. Set `SPINDLE_LOG=debug` to watch every switch.

use log::{LevelFilter, Log, Metadata, Record};
use spindle::platform::StdinInput;
use spindle::{Builder, SchedConfig, Scheduler, Shutdown, TaskId, current, join, now_ms, read_char, sleep};

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging() {
    let level = std::env::var("SPINDLE_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn ticker(label: &'static str, period_ms: u64, rounds: u32) -> impl FnOnce() + 'static {
    move || {
        for i in 1..=rounds {
            if sleep(period_ms).is_err() {
                return;
            }
            let now = now_ms().unwrap_or_default();
            println!("[{:>6}ms] {} tick {}/{}", now, label, i, rounds);
        }
    }
}

fn echo() {
    let me = current().unwrap_or(TaskId::MAIN);
    println!("{} echoing stdin, type q to stop", me);
    loop {
        match read_char() {
            Ok('q') | Err(_) => break,
            Ok('\n') => {}
            Ok(ch) => println!("read {:?}", ch),
        }
    }
    println!("echo done");
}

fn main() {
    init_logging();

    let config = match SchedConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    let input = match StdinInput::spawn() {
        Ok(input) => input,
        Err(e) => {
            eprintln!("cannot read stdin: {}", e);
            std::process::exit(2);
        }
    };

    let result = Scheduler::with_config(config).input(input).run(|| {
        let spawned = [
            Builder::new().name("fast").spawn(ticker("fast", 250, 8)),
            Builder::new().name("slow").spawn(ticker("slow", 700, 3)),
            Builder::new().name("echo").spawn(echo),
        ];
        for task in spawned {
            match task {
                Ok(id) => {
                    if let Err(e) = join(id) {
                        eprintln!("join {}: {}", id, e);
                    }
                }
                Err(e) => eprintln!("spawn failed: {}", e),
            }
        }
    });

    match result {
        Ok(report) => {
            eprintln!("{}", report.stats);
            if let Shutdown::NoRunnableTasks { blocked } = &report.outcome {
                eprintln!("stopped with blocked tasks: {:?}", blocked);
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("scheduler error: {}", e);
            std::process::exit(1);
        }
    }
}
