use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use aemcheck_domain::{AuditResult, DiskDescriptor, SlaProfile, VerificationResult};
use aemcheck_engine::{HostColor, HostStyle, OutputSink};
use colored::{ColoredString, Colorize};

/// Terminal sink: host output on stdout, everything else on stderr. Any
/// error marks the run as failed.
pub struct ConsoleSink {
    verbose: bool,
    failed: AtomicBool,
}

impl ConsoleSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose, failed: AtomicBool::new(false) }
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl OutputSink for ConsoleSink {
    fn host(&self, message: &str, style: HostStyle) {
        let text = paint(message, style.color);
        if style.new_line {
            println!("{}", text);
        } else {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
    }

    fn verbose(&self, message: &str) {
        if self.verbose {
            eprintln!("{} {}", "VERBOSE:".dimmed(), message);
        }
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {}", "WARNING:".yellow().bold(), message);
    }

    fn error(&self, message: &str) {
        self.failed.store(true, Ordering::SeqCst);
        eprintln!("{} {}", "ERROR:".red().bold(), message);
    }
}

fn paint(message: &str, color: HostColor) -> ColoredString {
    match color {
        HostColor::Default => message.normal(),
        HostColor::Green => message.green(),
        HostColor::Red => message.red(),
        HostColor::Yellow => message.yellow(),
    }
}

// ── Renderers ────────────────────────────────────────────────────────────────

fn sla_text(sla: &SlaProfile) -> String {
    if sla.has_sla {
        format!("IOPS {}, throughput {} MB/s", sla.iops, sla.throughput)
    } else {
        "no SLA".to_string()
    }
}

/// VM line followed by one indented line per disk.
pub fn render_sla(vm_name: &str, vm_size: &str, vm_sla: &SlaProfile, disks: &[(DiskDescriptor, SlaProfile)]) -> String {
    let mut out = format!("VM {} ({}): {}\n", vm_name, vm_size, sla_text(vm_sla));
    for (disk, sla) in disks {
        out.push_str(&format!("  {}: {}\n", disk.backing_uri, sla_text(sla)));
    }
    out
}

pub fn render_verification(result: &VerificationResult) -> String {
    let mut out = String::new();
    for outcome in &result.per_table {
        let state = if outcome.found { "data found" } else { "no data" };
        out.push_str(&format!("  {}: {}\n", outcome.table, state));
    }
    let summary = if result.succeeded { "succeeded" } else { "failed" };
    out.push_str(&format!("Diagnostics verification {}\n", summary));
    out
}

pub fn render_audit(result: &AuditResult) -> String {
    let passed = result.partial_results.iter().filter(|p| p.passed).count();
    let status = if result.passed && result.all_partials_passed() { "OK" } else { "NOT OK" };
    format!(
        "{}: {} ({}/{} checks passed)",
        result.label,
        status,
        passed,
        result.partial_results.len()
    )
}
