use std::ptr::NonNull;
use std::time::Instant;

use blockpool::{HeaderConfig, ObjectAllocator, PoolConfig, PoolError};
use log::{error, info};
use rand::{Rng, SeedableRng, rngs::SmallRng};

const DEFAULT_ITERATIONS: usize = 100_000;
const DEFAULT_SEED: u64 = 0x5EED;

fn parse_header(value: &str) -> Option<HeaderConfig> {
    match value.split_once(':') {
        Some(("extended", additional)) => additional.parse().ok().map(HeaderConfig::extended),
        Some(_) => None,
        None => match value {
            "none" => Some(HeaderConfig::none()),
            "basic" => Some(HeaderConfig::basic()),
            "extended" => Some(HeaderConfig::extended(0)),
            "external" => Some(HeaderConfig::external()),
            _ => None,
        },
    }
}

fn usage() -> ! {
    eprintln!(
        "Usage: {} <object_size> <objects_per_page> <max_pages> <none|basic|extended[:N]|external> <pad_bytes> [iterations] [seed]",
        std::env::args()
            .next()
            .unwrap_or_else(|| "blockpool-stress".to_string())
    );
    std::process::exit(1);
}

fn arg<T: std::str::FromStr>(index: usize) -> Option<T> {
    std::env::args().nth(index).and_then(|value| value.parse().ok())
}

fn main() {
    env_logger::init();

    if std::env::args().len() < 6 {
        usage();
    }

    let (Some(object_size), Some(objects_per_page), Some(max_pages), Some(pad_bytes)) =
        (arg(1), arg(2), arg(3), arg(5))
    else {
        usage();
    };
    let Some(header) = std::env::args().nth(4).as_deref().and_then(parse_header) else {
        usage();
    };
    let iterations = arg(6).unwrap_or(DEFAULT_ITERATIONS);
    let seed = arg(7).unwrap_or(DEFAULT_SEED);

    let config = PoolConfig::default()
        .with_objects_per_page(objects_per_page)
        .with_max_pages(max_pages)
        .with_pad_bytes(pad_bytes)
        .with_header(header)
        .with_debug(true);

    let mut allocator = match ObjectAllocator::new(object_size, config) {
        Ok(allocator) => allocator,
        Err(err) => {
            error!("Failed to create the pool: {err}");
            std::process::exit(1);
        }
    };

    println!("Object size: {}", object_size);
    println!("Block size: {}", allocator.layout().block_size);
    println!(
        "Page size: {}",
        humanize_bytes::humanize_bytes_binary!(allocator.layout().page_size)
    );

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut live: Vec<NonNull<u8>> = Vec::new();
    let mut exhausted = 0usize;
    let now = Instant::now();

    for step in 0..iterations {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("churn_step");

        if !live.is_empty() && rng.random_bool(0.5) {
            let object = live.swap_remove(rng.random_range(0..live.len()));
            // SAFETY: object came from this allocator and is still live
            if let Err(err) = unsafe { allocator.free(object) } {
                error!("Free of {:p} failed: {err}", object);
                std::process::exit(1);
            }
            continue;
        }

        let label = format!("step-{step}");
        match allocator.allocate(Some(&label)) {
            Ok(object) => {
                // SAFETY: object spans object_size bytes
                unsafe { std::ptr::write_bytes(object.as_ptr(), step as u8, object_size) };
                live.push(object);
            }
            Err(PoolError::OutOfPages { .. }) => exhausted += 1,
            Err(err) => {
                error!("Allocation failed: {err}");
                std::process::exit(1);
            }
        }
    }

    info!("Churn of {} steps took {:?}", iterations, now.elapsed());

    let in_use = allocator.dump_memory_in_use(|_, _| {});
    let corrupted = allocator.validate_pages(|object, size| {
        println!(" Corrupted block {:p} ({} bytes)", object, size);
    });

    let stats = allocator.stats();
    println!("Pages in use: {}", stats.pages_in_use);
    println!(
        "Memory budget: {}",
        humanize_bytes::humanize_bytes_binary!(stats.memory_budget())
    );
    println!(
        "Allocations: {}",
        humanize_bytes::humanize_quantity!(stats.allocations as usize)
    );
    println!(
        "Deallocations: {}",
        humanize_bytes::humanize_quantity!(stats.deallocations as usize)
    );
    println!("Objects in use: {} (dump reports {})", stats.objects_in_use, in_use);
    println!("Most objects: {}", stats.most_objects);
    println!("Utilization: {:.1}%", stats.utilization() * 100.0);
    println!("Out of pages: {}", exhausted);
    println!("Corrupted blocks: {}", corrupted);
    println!("Took {:?}", now.elapsed());

    if corrupted > 0 {
        std::process::exit(2);
    }
}
