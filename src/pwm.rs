//! Software PWM engine.
//!
//! Emulates PWM by toggling a pin from a dedicated worker thread: each
//! cycle the pin is driven high for `period * duty/100`, then low for the
//! remainder. Phase deadlines are computed from the cycle-start instant, so
//! scheduler jitter in one phase does not accumulate across cycles.
//!
//! The worker knows nothing about register maps: it drives the pin through
//! the [`PinDriver`] delegate, which keeps the engine independently
//! testable (a recording delegate in the tests, the live register map in
//! the context).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::error::{PwmError, Result};

/// Longest single sleep slice. Stop requests and teardown are observed at
/// least this often even on very slow channels.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// Delegate boundary
// ---------------------------------------------------------------------------

/// Sink for the worker's level writes.
pub(crate) trait PinDriver: Send + 'static {
    /// Drive the pin level. Returns `false` when the backing registers are
    /// gone, which terminates the worker with a fault.
    fn write_level(&self, pin: u8, high: bool) -> bool;
}

// ---------------------------------------------------------------------------
// Channel state
// ---------------------------------------------------------------------------

/// Tunable waveform parameters, re-read by the worker once per cycle so
/// updates land on the next cycle boundary without mid-cycle glitches.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PwmParams {
    pub duty_cycle: f32,
    pub frequency_hz: f32,
}

/// State shared between the channel handle and its worker thread.
pub(crate) struct ChannelShared {
    params: Mutex<PwmParams>,
    stop: AtomicBool,
    fault: AtomicBool,
}

impl ChannelShared {
    fn snapshot(&self) -> PwmParams {
        *self.params.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_alive(&self) -> Result<()> {
        if self.fault.load(Ordering::Acquire) {
            return Err(PwmError::WorkerFault.into());
        }
        Ok(())
    }

    /// Set the duty cycle in percent; effective at the next cycle boundary.
    pub(crate) fn set_duty_cycle(&self, percent: f32) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(PwmError::DutyCycleOutOfRange.into());
        }
        self.check_alive()?;
        self.params
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .duty_cycle = percent;
        Ok(())
    }

    /// Set the frequency in Hz; effective at the next cycle boundary.
    pub(crate) fn set_frequency(&self, hz: f32) -> Result<()> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(PwmError::FrequencyOutOfRange.into());
        }
        self.check_alive()?;
        self.params
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frequency_hz = hz;
        Ok(())
    }
}

/// A live channel: shared state plus the worker's join handle. Dropping the
/// channel signals the worker and joins it; the worker observes the stop
/// flag at every phase boundary, so the join is bounded by roughly one
/// cycle.
pub(crate) struct PwmChannel {
    shared: Arc<ChannelShared>,
    worker: Option<JoinHandle<()>>,
}

impl PwmChannel {
    /// Claims nothing and configures nothing; callers own pin bookkeeping.
    /// Spawns the worker with duty 0 (constant low) at `frequency_hz`.
    pub(crate) fn start(pin: u8, frequency_hz: f32, driver: impl PinDriver) -> Self {
        let shared = Arc::new(ChannelShared {
            params: Mutex::new(PwmParams {
                duty_cycle: 0.0,
                frequency_hz,
            }),
            stop: AtomicBool::new(false),
            fault: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(format!("soft-pwm-{pin}"))
            .spawn(move || run_worker(pin, &worker_shared, &driver))
            .expect("soft-pwm: thread creation failed");

        info!("pwm: channel on pin {pin} at {frequency_hz} Hz");
        Self {
            shared,
            worker: Some(worker),
        }
    }

    pub(crate) fn shared(&self) -> &ChannelShared {
        &self.shared
    }
}

impl Drop for PwmChannel {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

fn run_worker(pin: u8, shared: &ChannelShared, driver: &dyn PinDriver) {
    let mut cycle_start = Instant::now();
    // Last level actually driven; suppresses redundant edge writes so duty
    // 0 / 100 hold a constant level.
    let mut driven: Option<bool> = None;

    while !shared.stop.load(Ordering::Acquire) {
        let params = shared.snapshot();
        let period = Duration::from_secs_f64(1.0 / f64::from(params.frequency_hz));
        let high_time = period.mul_f64(f64::from(params.duty_cycle) / 100.0);

        if params.duty_cycle > 0.0 && !drive(driver, pin, true, &mut driven, shared) {
            return;
        }
        if !sleep_until(shared, cycle_start + high_time) {
            break;
        }

        if params.duty_cycle < 100.0 && !drive(driver, pin, false, &mut driven, shared) {
            return;
        }
        if !sleep_until(shared, cycle_start + period) {
            break;
        }

        cycle_start += period;
        // After a long stall (suspend, debugger) restart the cycle clock
        // instead of emitting a burst of catch-up cycles.
        let now = Instant::now();
        if now > cycle_start + period {
            cycle_start = now;
        }
    }

    // Park the pin low on the way out.
    let _ = driver.write_level(pin, false);
}

fn drive(
    driver: &dyn PinDriver,
    pin: u8,
    high: bool,
    driven: &mut Option<bool>,
    shared: &ChannelShared,
) -> bool {
    if *driven == Some(high) {
        return true;
    }
    if !driver.write_level(pin, high) {
        shared.fault.store(true, Ordering::Release);
        warn!("pwm: worker for pin {pin} lost its register map, terminating");
        return false;
    }
    *driven = Some(high);
    true
}

/// Sliced sleep toward `deadline`; returns `false` when a stop request was
/// observed.
fn sleep_until(shared: &ChannelShared, deadline: Instant) -> bool {
    loop {
        if shared.stop.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(MAX_SLEEP_SLICE));
    }
}
