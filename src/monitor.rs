//! Long-running queue watcher.
//!
//! Collects the pending worklist on a fixed interval and reports whether the
//! backlog has crossed the warning or critical threshold. With auto-clean
//! enabled, a critical backlog triggers the failure filter so hopeless
//! entries stop counting against the queue.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{info, warn};

use crate::app::{AppContext, FairwayError, Result};
use crate::collector::CollectedUrls;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between checks (default: 300)
    pub interval_secs: u64,
    /// Pending URLs at which the queue is reported as warning (default: 50)
    pub warning_threshold: usize,
    /// Pending URLs at which the queue is reported as critical (default: 200)
    pub critical_threshold: usize,
    /// Run the failure filter when the queue turns critical (default: false)
    pub auto_clean: bool,
    /// Append monitor output here instead of stdout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            warning_threshold: 50,
            critical_threshold: 200,
            auto_clean: false,
            log_file: None,
        }
    }
}

impl MonitorConfig {
    /// Parse interval string like "5m", "1h", "30s", "1d"
    pub fn parse_interval(s: &str) -> std::result::Result<u64, String> {
        let s = s.trim().to_lowercase();

        if let Some(hours) = s.strip_suffix('h') {
            hours
                .parse::<u64>()
                .map(|h| h * 3600)
                .map_err(|_| format!("Invalid hours: {}", hours))
        } else if let Some(minutes) = s.strip_suffix('m') {
            minutes
                .parse::<u64>()
                .map(|m| m * 60)
                .map_err(|_| format!("Invalid minutes: {}", minutes))
        } else if let Some(days) = s.strip_suffix('d') {
            days.parse::<u64>()
                .map(|d| d * 86400)
                .map_err(|_| format!("Invalid days: {}", days))
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map_err(|_| format!("Invalid seconds: {}", secs))
        } else {
            s.parse::<u64>()
                .map_err(|_| format!("Invalid interval: {}. Use format like '5m', '1h', '1d'", s))
        }
    }

    pub fn format_interval(secs: u64) -> String {
        if secs >= 86400 && secs.is_multiple_of(86400) {
            format!("{}d", secs / 86400)
        } else if secs >= 3600 && secs.is_multiple_of(3600) {
            format!("{}h", secs / 3600)
        } else if secs >= 60 && secs.is_multiple_of(60) {
            format!("{}m", secs / 60)
        } else {
            format!("{}s", secs)
        }
    }

    pub fn level(&self, pending: usize) -> QueueLevel {
        if pending >= self.critical_threshold {
            QueueLevel::Critical
        } else if pending >= self.warning_threshold {
            QueueLevel::Warning
        } else {
            QueueLevel::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueLevel {
    Ok,
    Warning,
    Critical,
}

impl QueueLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// One observation of the queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub retries: usize,
    pub never_processed: usize,
    pub escalations: usize,
    pub level: QueueLevel,
}

impl QueueStatus {
    pub fn from_collected(collected: &CollectedUrls, config: &MonitorConfig) -> Self {
        let retries = collected
            .items
            .iter()
            .filter(|i| i.category.is_retry())
            .count();
        Self {
            pending: collected.total_count,
            retries,
            never_processed: collected.total_count - retries,
            escalations: collected.escalations.len(),
            level: config.level(collected.total_count),
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "Queue {}: {} pending ({} retries, {} new), {} awaiting escalation",
            self.level.as_str(),
            self.pending,
            self.retries,
            self.never_processed,
            self.escalations
        )
    }
}

pub struct Monitor {
    ctx: Arc<AppContext>,
    config: MonitorConfig,
    pid_file: Option<PathBuf>,
    running: Arc<AtomicBool>,
}

impl Monitor {
    pub fn new(ctx: Arc<AppContext>, config: MonitorConfig) -> Self {
        Self {
            ctx,
            config,
            pid_file: Self::pid_file_path(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get the PID file path
    pub fn pid_file_path() -> Option<PathBuf> {
        dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .map(|d| d.join("fairway").join("monitor.pid"))
    }

    /// Check if another monitor is already running
    pub fn is_running() -> bool {
        Self::pid_file_path()
            .and_then(|path| read_pid(&path))
            .is_some_and(process_exists)
    }

    fn write_pid_file(&self) -> std::io::Result<()> {
        if let Some(pid_path) = &self.pid_file {
            if let Some(parent) = pid_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::File::create(pid_path)?;
            writeln!(file, "{}", std::process::id())?;
        }
        Ok(())
    }

    fn remove_pid_file(&self) {
        if let Some(pid_path) = &self.pid_file {
            let _ = fs::remove_file(pid_path);
        }
    }

    /// Log a message with timestamp
    fn log(&self, msg: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] {}", timestamp, msg);

        if let Some(ref log_path) = self.config.log_file {
            if let Ok(mut file) = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
            {
                let _ = writeln!(file, "{}", line);
            }
        } else {
            println!("{}", line);
        }
    }

    pub async fn run(&self) -> Result<()> {
        if Self::is_running() {
            return Err(FairwayError::Other(
                "Another monitor instance is already running".to_string(),
            ));
        }

        self.write_pid_file()
            .map_err(|e| FairwayError::Other(format!("Failed to write PID file: {}", e)))?;

        let running = self.running.clone();

        #[cfg(unix)]
        {
            let running_clone = running.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                let (mut sigterm, mut sigint) =
                    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                        (Ok(term), Ok(int)) => (term, int),
                        (Err(e), _) | (_, Err(e)) => {
                            warn!("Failed to install signal handlers: {}", e);
                            return;
                        }
                    };

                tokio::select! {
                    _ = sigterm.recv() => {},
                    _ = sigint.recv() => {},
                }
                running_clone.store(false, Ordering::SeqCst);
            });
        }

        #[cfg(windows)]
        {
            let running_clone = running.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                running_clone.store(false, Ordering::SeqCst);
            });
        }

        self.log(&format!(
            "Fairway monitor started (interval: {}, warning: {}, critical: {}, auto-clean: {}, PID: {})",
            MonitorConfig::format_interval(self.config.interval_secs),
            self.config.warning_threshold,
            self.config.critical_threshold,
            self.config.auto_clean,
            std::process::id()
        ));

        self.check().await;

        let mut timer = interval(Duration::from_secs(self.config.interval_secs.max(1)));
        timer.tick().await; // Skip the first immediate tick

        while self.running.load(Ordering::SeqCst) {
            timer.tick().await;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.check().await;
        }

        self.log("Monitor shutting down...");
        self.remove_pid_file();

        Ok(())
    }

    /// One observation, plus auto-clean when critical.
    pub async fn check(&self) -> Option<QueueStatus> {
        let start = Utc::now();
        let collected = match self.ctx.collect() {
            Ok(collected) => collected,
            Err(e) => {
                self.log(&format!("Failed to collect pending URLs: {}", e));
                return None;
            }
        };
        let status = QueueStatus::from_collected(&collected, &self.config);
        self.log(&status.summary_line());
        info!(
            pending = status.pending,
            level = status.level.as_str(),
            "Queue checked"
        );

        if status.level == QueueLevel::Critical && self.config.auto_clean {
            self.log("Queue critical, running failure filter...");
            match self.ctx.clean(&collected).await {
                Ok(report) => self.log(&format!(
                    "Auto-clean: {} newly permanent, {} still retryable",
                    report.newly_permanent, report.retryable
                )),
                Err(e) => self.log(&format!("Auto-clean failed: {}", e)),
            }
        }

        let elapsed = Utc::now().signed_duration_since(start);
        self.log(&format!(
            "Check complete ({:.1}s)",
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
        Some(status)
    }
}

fn read_pid(path: &std::path::Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(windows)]
fn process_exists(pid: u32) -> bool {
    use std::process::Command;
    Command::new("tasklist")
        .args(["/FI", &format!("PID eq {}", pid)])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Stop a running monitor by reading PID file and sending signal
pub fn stop_monitor() -> std::result::Result<(), String> {
    let pid_path =
        Monitor::pid_file_path().ok_or_else(|| "Could not determine PID file path".to_string())?;

    if !pid_path.exists() {
        return Err("No monitor is running (PID file not found)".to_string());
    }

    let pid = read_pid(&pid_path).ok_or_else(|| "Invalid PID in PID file".to_string())?;

    #[cfg(unix)]
    let status = std::process::Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .map_err(|e| format!("Failed to send signal: {}", e))?;

    #[cfg(windows)]
    let status = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()
        .map_err(|e| format!("Failed to stop process: {}", e))?;

    if status.success() {
        let _ = fs::remove_file(&pid_path);
        Ok(())
    } else {
        Err(format!("Failed to stop monitor (PID {})", pid))
    }
}

pub fn monitor_status() -> String {
    match Monitor::pid_file_path().and_then(|path| read_pid(&path)) {
        Some(pid) if process_exists(pid) => format!("Monitor is running (PID: {})", pid),
        Some(_) => "Monitor is not running (stale PID file)".to_string(),
        None => "Monitor is not running".to_string(),
    }
}
