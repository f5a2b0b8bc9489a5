//! # Producer/Consumer Workload
//!
//! The producer asks for a span, writes a pseudo-random number of bytes
//! into it (`can - rand % can`, so never zero) and publishes them. The
//! consumer drains whole spans and checks each byte against its own copy
//! of the data generator.

use crate::lcg::Lcg;
use crate::process::HostSys;
use anyhow::{bail, Context, Result};
use magring::host::HostKernel;
use magring::RING_REGION_PAGES;
use magring_user::sys::{read_user, write_user};
use magring_user::{RingDesc, RingTable};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Workload parameters
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Bytes to stream
    pub total_bytes: usize,
    /// Seed of the byte generator, shared by both sides
    pub data_seed: u32,
    /// Seed of the producer's write-size generator
    pub send_seed: u32,
    /// Ring name both processes attach to
    pub name: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            total_bytes: 100 * 1024 * 1024,
            data_seed: 12,
            send_seed: 555,
            name: String::from("magic!"),
        }
    }
}

/// Outcome of one run
#[derive(Debug, Clone)]
pub struct Report {
    /// Bytes streamed and verified
    pub bytes: usize,
    /// Spans the producer published
    pub writes: usize,
    /// Spans the consumer drained
    pub reads: usize,
    /// Wall time from both attached to both done
    pub elapsed: Duration,
}

impl Report {
    /// Throughput in MiB per second
    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return f64::INFINITY;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in {:.3?} ({} writes, {} reads): {:.1} MiB/s",
            self.bytes,
            self.elapsed,
            self.writes,
            self.reads,
            self.mib_per_sec()
        )
    }
}

/// Boot a host kernel with room for one ring and run the workload on it
pub fn run(config: &BenchConfig) -> Result<Report> {
    let kernel = HostKernel::new(RING_REGION_PAGES).context("booting host kernel")?;

    let mut producer = RingTable::new(HostSys(kernel.spawn()));
    let mut consumer = RingTable::new(HostSys(kernel.spawn()));
    let name = config.name.as_bytes();
    let tx = producer.attach(name).context("producer attach")?;
    let rx = consumer.attach(name).context("consumer attach")?;
    log::info!("ring {:?} attached by both processes", config.name);

    let abort = AtomicBool::new(false);
    let start = Instant::now();
    let (writes, reads) = thread::scope(|s| -> Result<(usize, usize)> {
        let abort = &abort;
        let producer = s.spawn(move || {
            let mut table = producer;
            let result = produce(&table, tx, config, abort);
            if result.is_err() {
                abort.store(true, Ordering::Relaxed);
            }
            if let Err(e) = table.detach(tx) {
                log::warn!("producer detach: {}", e);
            }
            result
        });
        let consumer = s.spawn(move || {
            let mut table = consumer;
            let result = consume(&table, rx, config, abort);
            if result.is_err() {
                abort.store(true, Ordering::Relaxed);
            }
            if let Err(e) = table.detach(rx) {
                log::warn!("consumer detach: {}", e);
            }
            result
        });
        let writes = join(producer, "producer");
        let reads = join(consumer, "consumer");
        Ok((writes?, reads?))
    })?;
    let elapsed = start.elapsed();

    Ok(Report {
        bytes: config.total_bytes,
        writes,
        reads,
        elapsed,
    })
}

fn join(handle: thread::ScopedJoinHandle<'_, Result<usize>>, side: &str) -> Result<usize> {
    match handle.join() {
        Ok(result) => result.with_context(|| format!("{} failed", side)),
        Err(_) => bail!("{} thread panicked", side),
    }
}

fn produce(table: &RingTable<HostSys>, desc: RingDesc, config: &BenchConfig, abort: &AtomicBool) -> Result<usize> {
    let ring = table.ring(desc)?;
    let mut sizes = Lcg::new(config.send_seed);
    let mut data = Lcg::new(config.data_seed);
    let mut chunk = vec![0u8; ring.capacity()];

    let mut sent = 0;
    let mut writes = 0;
    while sent < config.total_bytes {
        let span = ring.begin_write();
        if span.is_empty() {
            if abort.load(Ordering::Relaxed) {
                bail!("consumer gave up after {} bytes", sent);
            }
            std::hint::spin_loop();
            continue;
        }

        let can = span.len.min(config.total_bytes - sent);
        let n = can - (sizes.sample() as usize % can);
        for b in &mut chunk[..n] {
            *b = data.letter();
        }
        write_user(table.sys(), span.addr, &chunk[..n])?;
        ring.finish_write(n)?;
        sent += n;
        writes += 1;
    }

    log::debug!("producer: {} bytes in {} writes", sent, writes);
    Ok(writes)
}

fn consume(table: &RingTable<HostSys>, desc: RingDesc, config: &BenchConfig, abort: &AtomicBool) -> Result<usize> {
    let ring = table.ring(desc)?;
    let mut data = Lcg::new(config.data_seed);
    let mut chunk = vec![0u8; ring.capacity()];

    let mut received = 0;
    let mut reads = 0;
    while received < config.total_bytes {
        let span = ring.begin_read();
        if span.is_empty() {
            if abort.load(Ordering::Relaxed) {
                bail!("producer gave up after {} bytes", received);
            }
            std::hint::spin_loop();
            continue;
        }

        let buf = &mut chunk[..span.len];
        read_user(table.sys(), span.addr, buf)?;
        for (i, &got) in buf.iter().enumerate() {
            let expected = data.letter();
            if got != expected {
                bail!(
                    "byte {}: expected {:?}, got {:?}",
                    received + i,
                    expected as char,
                    got as char
                );
            }
        }
        ring.finish_read(span.len)?;
        received += span.len;
        reads += 1;
    }

    log::debug!("consumer: {} bytes in {} reads", received, reads);
    Ok(reads)
}
