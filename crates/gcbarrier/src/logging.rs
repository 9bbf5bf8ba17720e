//! Collector Event Log
//!
//! Records structured events from collections and the store buffer so
//! callers can inspect what a heap did, and optionally echoes them to the
//! console as text or JSON lines.
//!
//! Log Levels:
//! - WARN: Unique-id registry exhausted
//! - INFO: Collection results, store buffer overflows
//! - DEBUG: Collection starts
//!
//! Diagnostic text goes through the `log` facade; this module keeps the
//! machine-readable history.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Log level for collector events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Collector event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GcEvent {
    /// Minor collection started
    MinorCollectionStart { cycle: u64, reason: String },

    /// Minor collection completed
    MinorCollectionEnd {
        cycle: u64,
        promoted: usize,
        freed: usize,
        duration_ms: f64,
    },

    /// A zone's store buffer hit capacity
    StoreBufferOverflow { zone: u32, entries: usize },

    /// Incremental marking started
    MarkingStart { cycle: u64, zones: usize },

    /// Marking completed, sweeping begins
    MarkingEnd { cycle: u64, marked: u64, dead: usize },

    /// Major collection swept and freed
    SweepEnd {
        cycle: u64,
        freed: usize,
        freed_bytes: usize,
        ids_removed: usize,
    },

    /// Compaction completed
    CompactionEnd {
        moved: usize,
        bytes_moved: usize,
        duration_ms: f64,
    },

    /// Unique id could not be assigned
    UniqueIdExhausted { zone: u32, entries: usize },
}

impl GcEvent {
    /// Level the event is logged at
    pub fn level(&self) -> LogLevel {
        match self {
            GcEvent::UniqueIdExhausted { .. } => LogLevel::Warn,
            GcEvent::MinorCollectionEnd { .. }
            | GcEvent::StoreBufferOverflow { .. }
            | GcEvent::MarkingEnd { .. }
            | GcEvent::SweepEnd { .. }
            | GcEvent::CompactionEnd { .. } => LogLevel::Info,
            GcEvent::MinorCollectionStart { .. } | GcEvent::MarkingStart { .. } => LogLevel::Debug,
        }
    }
}

/// Event log configuration
#[derive(Debug, Clone)]
pub struct GcLoggerConfig {
    /// Minimum level recorded
    pub level: LogLevel,

    /// Echo events to stdout
    pub console: bool,

    /// Echo as JSON lines instead of text
    pub json: bool,

    /// Prefix console lines with wall-clock time
    pub timestamps: bool,
}

impl Default for GcLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Debug,
            console: false,
            json: false,
            timestamps: true,
        }
    }
}

/// GcLogger - per-heap event history
pub struct GcLogger {
    config: GcLoggerConfig,
    events: Mutex<Vec<(Instant, GcEvent)>>,
    enabled: AtomicBool,
}

impl GcLogger {
    pub fn new(config: GcLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record an event
    pub fn log(&self, event: GcEvent) {
        if !self.is_enabled() || event.level() > self.config.level {
            return;
        }

        if self.config.console {
            self.output_console(&event);
        }
        self.events.lock().push((Instant::now(), event));
    }

    fn output_console(&self, event: &GcEvent) {
        let prefix = if self.config.timestamps {
            format!("[{}] ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
        } else {
            String::new()
        };

        if self.config.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}{}", prefix, line),
                Err(err) => log::warn!("failed to serialize event {:?}: {}", event, err),
            }
        } else {
            println!("{}{}", prefix, Self::human(event));
        }
    }

    fn human(event: &GcEvent) -> String {
        match event {
            GcEvent::MinorCollectionStart { cycle, reason } => {
                format!("[GC] Minor #{} started ({})", cycle, reason)
            },
            GcEvent::MinorCollectionEnd {
                cycle,
                promoted,
                freed,
                duration_ms,
            } => format!(
                "[GC] Minor #{} completed ({:.2}ms, promoted {}, freed {})",
                cycle, duration_ms, promoted, freed
            ),
            GcEvent::StoreBufferOverflow { zone, entries } => {
                format!("[GC] Zone {} store buffer full ({} entries)", zone, entries)
            },
            GcEvent::MarkingStart { cycle, zones } => {
                format!("[GC] Major #{} marking {} zone(s)", cycle, zones)
            },
            GcEvent::MarkingEnd {
                cycle,
                marked,
                dead,
            } => format!(
                "[GC] Major #{} marking done ({} marked, {} dead)",
                cycle, marked, dead
            ),
            GcEvent::SweepEnd {
                cycle,
                freed,
                freed_bytes,
                ids_removed,
            } => format!(
                "[GC] Major #{} swept {} cells ({} bytes), {} unique ids dropped",
                cycle, freed, freed_bytes, ids_removed
            ),
            GcEvent::CompactionEnd {
                moved,
                bytes_moved,
                duration_ms,
            } => format!(
                "[GC] Compaction moved {} cells ({} bytes, {:.2}ms)",
                moved, bytes_moved, duration_ms
            ),
            GcEvent::UniqueIdExhausted { zone, entries } => format!(
                "[GC] Zone {} unique-id registry exhausted at {} entries",
                zone, entries
            ),
        }
    }

    /// Recorded events, oldest first
    pub fn get_events(&self) -> Vec<(Instant, GcEvent)> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for GcLogger {
    fn default() -> Self {
        Self::new(GcLoggerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_logger_basic() {
        let logger = GcLogger::default();

        logger.log(GcEvent::MinorCollectionStart {
            cycle: 1,
            reason: "explicit".to_string(),
        });

        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_gc_logger_disable() {
        let logger = GcLogger::default();

        logger.disable();
        logger.log(GcEvent::StoreBufferOverflow {
            zone: 1,
            entries: 4,
        });

        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_level_filter() {
        let logger = GcLogger::new(GcLoggerConfig {
            level: LogLevel::Warn,
            ..Default::default()
        });

        logger.log(GcEvent::MarkingStart { cycle: 1, zones: 2 });
        logger.log(GcEvent::UniqueIdExhausted {
            zone: 1,
            entries: 8,
        });

        let events = logger.get_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].1, GcEvent::UniqueIdExhausted { .. }));
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(GcEvent::SweepEnd {
            cycle: 2,
            freed: 3,
            freed_bytes: 96,
            ids_removed: 1,
        })
        .unwrap();

        assert_eq!(json["type"], "sweep_end");
        assert_eq!(json["freed_bytes"], 96);
    }
}
