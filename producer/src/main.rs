use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;

use tachyon::{MpscQueue, Pool, SegmentConfig};

#[derive(Parser)]
struct Opts {
    #[arg(short = 'c', long = "config", default_value = "tachyon-producer.toml")]
    config: String,
    /// Segment offset of the queue, as printed by the consumer on startup.
    #[arg(long = "offset", default_value_t = 0)]
    offset: usize,
    /// How many items to enqueue before exiting.
    #[arg(long = "count", default_value_t = 1_000_000)]
    count: u64,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ProducerConfig {
    segment: SegmentConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts = Opts::parse();
    let cfg: ProducerConfig = confy::load_path(&opts.config)?;

    let closing = Arc::new(AtomicBool::new(false));
    let mut signals = Signals::new([SIGHUP, SIGINT, SIGQUIT, SIGTERM])?;
    {
        let closing = Arc::clone(&closing);
        thread::spawn(move || {
            for _ in signals.forever() {
                closing.store(true, Ordering::SeqCst);
            }
        });
    }

    let pool = Arc::new(Pool::open(&cfg.segment)?);
    let queue = MpscQueue::<u64>::load(&pool, opts.offset);

    run(&queue, opts.count, &closing)
}

fn run(queue: &MpscQueue<u64>, count: u64, closing: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();

    let mut sent = 0u64;
    while sent < count && !closing.load(Ordering::Relaxed) {
        // Stay on the non-blocking path so a shutdown signal is noticed.
        if queue.enqueue(sent) {
            sent += 1;
            if sent % 500_000 == 0 {
                eprint!("\rTotal {} ops", sent);
            }
        } else {
            thread::yield_now();
        }
    }

    let duration = start.elapsed();
    let iops = ((sent as f64) / (duration.as_millis().max(1) as f64)) * 1_000f64;
    println!(
        "\nIOPS : {:#?}K, time: {:#?}",
        (iops / 1000f64) as u64,
        duration
    );
    Ok(())
}
