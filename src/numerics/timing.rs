#![allow(unused)]
use std::cell::RefCell;
use std::time::Duration;

/// Wall-clock breakdown of one `newton_solve` call, collected when the
/// `timing` feature is enabled.
#[derive(Default, Clone)]
pub struct TimingStats {
    pub hessian_times: Vec<Duration>,
    pub sensitivity_times: Vec<Duration>,
    pub riesz_times: Vec<Duration>,
    pub total_time: Duration,
}

fn total_ms(times: &[Duration]) -> f64 {
    times.iter().sum::<Duration>().as_secs_f64() * 1000.0
}

fn avg_ms(times: &[Duration]) -> f64 {
    if times.is_empty() {
        0.0
    } else {
        total_ms(times) / times.len() as f64
    }
}

impl TimingStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "timing")]
    pub fn log_summary(&self) {
        if self.hessian_times.is_empty() {
            return;
        }

        let accounted: Duration = self.hessian_times.iter().sum();
        let overhead = self.total_time.saturating_sub(accounted);

        log::info!(
            "newton_solve: {:.3}s total, {} Hessian applications ({:.3}ms avg), overhead {:.3}ms",
            self.total_time.as_secs_f64(),
            self.hessian_times.len(),
            avg_ms(&self.hessian_times),
            overhead.as_secs_f64() * 1000.0
        );
        log::info!(
            "  sensitivity solves: {} ({:.3}ms total, {:.3}ms avg)",
            self.sensitivity_times.len(),
            total_ms(&self.sensitivity_times),
            avg_ms(&self.sensitivity_times)
        );
        log::info!(
            "  Riesz projections:  {} ({:.3}ms total, {:.3}ms avg)",
            self.riesz_times.len(),
            total_ms(&self.riesz_times),
            avg_ms(&self.riesz_times)
        );
    }

    #[cfg(not(feature = "timing"))]
    pub fn log_summary(&self) {}
}

#[cfg(feature = "timing")]
thread_local! {
    static TIMING_STATS: RefCell<TimingStats> = RefCell::new(TimingStats::new());
}

#[cfg(feature = "timing")]
pub fn reset_timing() {
    TIMING_STATS.with(|stats| {
        *stats.borrow_mut() = TimingStats::new();
    });
}

#[cfg(not(feature = "timing"))]
pub fn reset_timing() {}

#[cfg(feature = "timing")]
fn record<F, R>(f: F, push: fn(&mut TimingStats, Duration)) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    TIMING_STATS.with(|stats| push(&mut stats.borrow_mut(), elapsed));
    result
}

#[cfg(feature = "timing")]
pub fn record_hessian_application<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    record(f, |s, d| s.hessian_times.push(d))
}

#[cfg(not(feature = "timing"))]
pub fn record_hessian_application<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_sensitivity_solve<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    record(f, |s, d| s.sensitivity_times.push(d))
}

#[cfg(not(feature = "timing"))]
pub fn record_sensitivity_solve<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_riesz_projection<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    record(f, |s, d| s.riesz_times.push(d))
}

#[cfg(not(feature = "timing"))]
pub fn record_riesz_projection<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn finalize_timing(total_time: Duration) -> TimingStats {
    TIMING_STATS.with(|stats| {
        let mut s = stats.borrow_mut();
        s.total_time = total_time;
        s.clone()
    })
}

#[cfg(not(feature = "timing"))]
pub fn finalize_timing(_total_time: Duration) -> TimingStats {
    TimingStats::new()
}

pub fn finalize_and_log(total_time: Duration) {
    finalize_timing(total_time).log_summary();
}
