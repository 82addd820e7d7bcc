//! Progress reporting and cooperative cancellation.
//!
//! Long stages report through an injected callback; nothing in the library
//! writes to the terminal directly. The bundled [`terminal_progress`] sink
//! renders a carriage-return thermometer bar for the CLI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Phases of the slicing pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicePhase {
    Perimeters,
    Support,
    Adhesion,
    Fill,
    Pathing,
    Gcode,
}

impl SlicePhase {
    pub fn description(&self) -> &'static str {
        match self {
            SlicePhase::Perimeters => "Perimeters",
            SlicePhase::Support => "Support",
            SlicePhase::Adhesion => "Raft, Brim, and Skirt",
            SlicePhase::Fill => "Infill",
            SlicePhase::Pathing => "Pathing",
            SlicePhase::Gcode => "Writing GCode",
        }
    }
}

/// A progress sample delivered to the callback.
#[derive(Debug, Clone)]
pub struct SliceProgress {
    pub phase: SlicePhase,
    /// Progress within the phase, 0.0 to 1.0.
    pub progress: f32,
    pub current_layer: Option<u32>,
    pub total_layers: Option<u32>,
}

/// Callback for monitoring slicing operations.
pub type ProgressCallback = Arc<dyn Fn(SliceProgress) + Send + Sync>;

/// Cooperative cancellation flag, checked at stage boundaries and between
/// layers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

const SPIN_CHARS: [char; 4] = ['/', '-', '\\', '|'];

struct ThermometerState {
    last_phase: Option<SlicePhase>,
    last_draw: Instant,
    spin: usize,
}

/// A terminal progress sink: prints each phase name once and keeps a
/// 50-column thermometer bar updated on stderr, at most twice a second.
pub fn terminal_progress() -> ProgressCallback {
    let state = Mutex::new(ThermometerState {
        last_phase: None,
        last_draw: Instant::now() - Duration::from_secs(1),
        spin: 0,
    });
    Arc::new(move |progress: SliceProgress| {
        let Ok(mut state) = state.lock() else {
            return;
        };
        if state.last_phase != Some(progress.phase) {
            eprintln!("\r{:78}\r{}", "", progress.phase.description());
            state.last_phase = Some(progress.phase);
            state.last_draw = Instant::now() - Duration::from_secs(1);
        }
        if state.last_draw.elapsed() < Duration::from_millis(500) {
            return;
        }
        state.last_draw = Instant::now();
        state.spin = (state.spin + 1) % SPIN_CHARS.len();
        let pct = (progress.progress.clamp(0.0, 1.0) * 100.0) as f64;
        let filled = (pct / 2.0) as usize;
        let spin = if pct >= 100.0 {
            String::new()
        } else {
            SPIN_CHARS[state.spin].to_string()
        };
        eprint!("\r  [{:50}] {:.1}%", format!("{}{}", "=".repeat(filled), spin), pct);
    })
}
