//! evring End-to-End Smoke Test
//!
//! Drives ring and perf buffers over `SoftEngine`:
//!   Part A — Ordering: records arrive in submission order
//!   Part B — Shutdown: stop with no reader, double stop, close twice
//!   Part C — Restart: a second run delivers on fresh channels
//!   Part D — Perf: lost counts, module-owned buffers
//!   Part E — Slots: capacity boundary of the process-wide table
//!
//! Run: RUST_LOG=evring_module=debug ./target/release/evring-smoke

use evring_core::{BufferError, BufferKind, BufferState, EngineConfig};
use evring_module::{event_slots, EventChannel, Module, PerfBuffer, RingBuffer, SoftEngine};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(2);

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn config() -> EngineConfig {
    EngineConfig::from_env().poll_timeout(Duration::from_millis(50))
}

// ════════════════════════════════════════════════════════════
// Part A: Ordering
// ════════════════════════════════════════════════════════════

fn test_ordering(t: &mut TestRunner, engine: &Arc<SoftEngine>) {
    t.section("Part A: Ordering");

    let map = engine.create_map(BufferKind::Ring, 1024);
    let rb = match RingBuffer::new(Arc::clone(engine), map.fd(), EventChannel::bounded(8), &config()) {
        Ok(rb) => rb,
        Err(e) => {
            t.fail("ring buffer init", &e.to_string());
            return;
        }
    };
    t.pass("ring buffer init");

    let events = match rb.events() {
        Ok(rx) => rx,
        Err(e) => {
            t.fail("events receiver", &e.to_string());
            return;
        }
    };
    t.check("start", rb.start().is_ok(), "start failed");

    let producer = map.clone();
    let handle = thread::spawn(move || {
        for i in 0..500u32 {
            while !producer.submit(&i.to_le_bytes()) {
                thread::yield_now();
            }
        }
    });

    let mut in_order = true;
    let mut received = 0u32;
    for expected in 0..500u32 {
        match events.recv_timeout(WAIT) {
            Ok(record) if record == expected.to_le_bytes() => received += 1,
            _ => {
                in_order = false;
                break;
            }
        }
    }
    let _ = handle.join();
    t.check(&format!("500 records in order ({} received)", received), in_order, "gap or reorder");

    let stats = rb.stats();
    t.check(
        &format!("stats: {} records, {} bytes", stats.records, stats.bytes),
        stats.records == 500 && stats.bytes == 2000,
        "counter mismatch",
    );
    t.check("stop", rb.stop().is_ok(), "stop failed");
}

// ════════════════════════════════════════════════════════════
// Part B: Shutdown
// ════════════════════════════════════════════════════════════

fn test_shutdown(t: &mut TestRunner, engine: &Arc<SoftEngine>) {
    t.section("Part B: Shutdown");

    let map = engine.create_map(BufferKind::Ring, 256);
    let rb = match RingBuffer::new(Arc::clone(engine), map.fd(), EventChannel::bounded(4), &config()) {
        Ok(rb) => rb,
        Err(e) => {
            t.fail("ring buffer init", &e.to_string());
            return;
        }
    };
    let _ = rb.start();
    for i in 0..200u32 {
        map.submit(&i.to_le_bytes());
    }
    thread::sleep(Duration::from_millis(50));

    let begin = Instant::now();
    let stopped = rb.stop().is_ok();
    let elapsed = begin.elapsed();
    t.check(
        &format!("stop with no reader ({:?})", elapsed),
        stopped && elapsed < WAIT,
        "stop hung or failed",
    );

    let begin = Instant::now();
    let again = rb.stop().is_ok();
    t.check("second stop is immediate", again && begin.elapsed() < WAIT, "second stop misbehaved");
    t.check("state = stopped", rb.state() == BufferState::Stopped, &rb.state().to_string());

    let slot = rb.slot();
    rb.close();
    rb.close();
    t.check("close twice", rb.state() == BufferState::Closed, &rb.state().to_string());
    t.check("slot released", event_slots().try_lookup(slot).is_none(), "slot still live");
    t.check(
        "start after close -> Closed",
        rb.start() == Err(BufferError::Closed),
        "expected Closed",
    );
}

// ════════════════════════════════════════════════════════════
// Part C: Restart
// ════════════════════════════════════════════════════════════

fn test_restart(t: &mut TestRunner, engine: &Arc<SoftEngine>) {
    t.section("Part C: Restart");

    let map = engine.create_map(BufferKind::Ring, 64);
    let rb = match RingBuffer::new(Arc::clone(engine), map.fd(), EventChannel::bounded(4), &config()) {
        Ok(rb) => rb,
        Err(e) => {
            t.fail("ring buffer init", &e.to_string());
            return;
        }
    };

    for run in 1..=2 {
        let _ = rb.start();
        let events = match rb.events() {
            Ok(rx) => rx,
            Err(e) => {
                t.fail(&format!("run {} receiver", run), &e.to_string());
                return;
            }
        };
        let payload = format!("run-{}", run);
        map.submit(payload.as_bytes());
        let got = events.recv_timeout(WAIT).ok();
        t.check(
            &format!("run {} delivers", run),
            got.as_deref() == Some(payload.as_bytes()),
            &format!("{:?}", got),
        );
        t.check(&format!("run {} stop", run), rb.stop().is_ok(), "stop failed");
        t.check(
            &format!("run {} channel closed", run),
            events.recv_timeout(WAIT).is_err(),
            "channel still open",
        );
    }
}

// ════════════════════════════════════════════════════════════
// Part D: Perf
// ════════════════════════════════════════════════════════════

fn test_perf(t: &mut TestRunner, engine: &Arc<SoftEngine>) {
    t.section("Part D: Perf buffers");

    let map = engine.create_map(BufferKind::Perf, 4);
    let pb = match PerfBuffer::new(
        Arc::clone(engine),
        map.fd(),
        EventChannel::bounded(16),
        Some(EventChannel::bounded(16)),
        8,
        &config(),
    ) {
        Ok(pb) => pb,
        Err(e) => {
            t.fail("perf buffer init", &e.to_string());
            return;
        }
    };
    t.pass("perf buffer init");

    // Overflow the map before polling: 4 kept, 6 lost
    for i in 0..10u8 {
        map.submit(&[i]);
    }
    let lost = pb.lost().ok().flatten();
    let _ = pb.start();
    let got = lost.and_then(|rx| rx.recv_timeout(WAIT).ok());
    t.check(&format!("lost count = {:?}", got), got == Some(6), "expected 6");

    map.report_lost(42);
    let mut total = 0;
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline && total != 48 {
        total = pb.stats().lost;
        thread::sleep(Duration::from_millis(5));
    }
    t.check(&format!("lost total = {}", total), total == 48, "expected 48");
    pb.close();

    t.check(
        "page count 3 rejected",
        matches!(
            PerfBuffer::new(Arc::clone(engine), map.fd(), EventChannel::bounded(1), None, 3, &config()),
            Err(BufferError::InvalidArgument(_))
        ),
        "expected InvalidArgument",
    );

    let mut module = match Module::new(Arc::clone(engine), config()) {
        Ok(m) => m,
        Err(e) => {
            t.fail("module init", &e.to_string());
            return;
        }
    };
    let samples = engine.create_map(BufferKind::Perf, 64);
    module.register_map("samples", samples.fd());
    match module.init_perf_buf("samples", EventChannel::bounded(8), None, Some(4)) {
        Ok(pb) => {
            let events = pb.events();
            let _ = pb.start();
            samples.submit(b"module");
            let got = events.ok().and_then(|rx| rx.recv_timeout(WAIT).ok());
            t.check("module perf buffer delivers", got.as_deref() == Some(&b"module"[..]), "no record");
            module.close();
            t.check("module close closes child", pb.state() == BufferState::Closed, &pb.state().to_string());
        }
        Err(e) => t.fail("module perf buffer", &e.to_string()),
    }
}

// ════════════════════════════════════════════════════════════
// Part E: Slots
// ════════════════════════════════════════════════════════════

fn test_slots(t: &mut TestRunner, engine: &Arc<SoftEngine>) {
    t.section("Part E: Slot table");

    let capacity = event_slots().capacity();

    let before = event_slots().len();
    let rejected = RingBuffer::new(Arc::clone(engine), 99_999, EventChannel::bounded(1), &config());
    t.check(
        "failed init -> ForeignAllocationFailed",
        matches!(rejected, Err(BufferError::ForeignAllocationFailed { .. })),
        "expected ForeignAllocationFailed",
    );
    t.check(
        "failed init releases its slot",
        event_slots().len() == before,
        &format!("{} live before, {} after", before, event_slots().len()),
    );

    let free = capacity - event_slots().len();
    let map = engine.create_map(BufferKind::Ring, 1);
    let mut bufs = Vec::new();
    let mut overflow = None;
    for _ in 0..=capacity {
        match RingBuffer::new(Arc::clone(engine), map.fd(), EventChannel::bounded(1), &config()) {
            Ok(rb) => bufs.push(rb),
            Err(e) => {
                overflow = Some(e);
                break;
            }
        }
    }
    t.check(
        &format!("{} of {} buffers fit", bufs.len(), capacity),
        bufs.len() == free,
        &format!("expected {}", free),
    );
    t.check(
        "one past capacity -> CapacityExceeded",
        matches!(overflow, Some(BufferError::CapacityExceeded { .. })),
        &format!("{:?}", overflow),
    );

    let mut slots: Vec<u32> = bufs.iter().map(|rb| rb.slot().as_u32()).collect();
    slots.sort_unstable();
    slots.dedup();
    t.check("slots unique", slots.len() == bufs.len(), "duplicate slot");

    let earlier_ok = bufs.iter().all(|rb| event_slots().try_lookup(rb.slot()).is_some());
    t.check("earlier slots stay valid", earlier_ok, "slot lost");

    drop(bufs);
    t.check("all slots released", event_slots().is_empty(), &event_slots().len().to_string());
}

// ════════════════════════════════════════════════════════════

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_thread_names(true)
        .init();

    println!("=== evring End-to-End Smoke Test ===");
    println!("    slots: {}", event_slots().capacity());

    let engine = Arc::new(SoftEngine::new());
    let mut t = TestRunner::new();

    test_ordering(&mut t, &engine);
    test_shutdown(&mut t, &engine);
    test_restart(&mut t, &engine);
    test_perf(&mut t, &engine);
    test_slots(&mut t, &engine);

    t.summary();
    tracing::info!(passed = t.passed, failed = t.failed, "smoke finished");
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
