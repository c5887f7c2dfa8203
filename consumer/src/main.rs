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
    #[arg(short = 'c', long = "config", default_value = "tachyon-consumer.toml")]
    config: String,
    /// Queue capacity; must be a power of two.
    #[arg(long = "capacity", default_value_t = 64)]
    capacity: u32,
    /// How many items to drain before exiting.
    #[arg(long = "count", default_value_t = 1_000_000)]
    count: u64,
}

#[derive(Default, Debug, Serialize, Deserialize)]
struct ConsumerConfig {
    segment: SegmentConfig,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts = Opts::parse();
    let cfg: ConsumerConfig = confy::load_path(&opts.config)?;

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

    let pool = Arc::new(Pool::create(&cfg.segment)?);
    let mut queue = MpscQueue::<u64>::create(&pool, opts.capacity)?;
    println!("queue ready at offset {}", queue.get_offset());

    run(&mut queue, opts.count, &closing)
}

fn run(
    queue: &mut MpscQueue<u64>,
    count: u64,
    closing: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();

    let mut received = 0u64;
    while received < count && !closing.load(Ordering::Relaxed) {
        // Stay on the non-blocking path so a shutdown signal is noticed.
        match queue.dequeue_next() {
            Some(value) => {
                received += 1;
                if received % 500_000 == 0 {
                    eprint!("\rTotal {} ops (current value: {})", received, value);
                }
            }
            None => thread::yield_now(),
        }
    }

    let duration = start.elapsed();
    let iops = ((received as f64) / (duration.as_millis().max(1) as f64)) * 1_000f64;
    println!(
        "\nIOPS : {:#?}K, time: {:#?}",
        (iops / 1000f64) as u64,
        duration
    );
    Ok(())
}
