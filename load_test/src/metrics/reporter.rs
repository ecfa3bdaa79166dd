//! Console reporter for run metrics with real-time updates

use super::collector::ResultAggregator;
use super::types::{LatencyStats, RunReport};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tokio::time::{interval, Duration};

/// Start periodic metrics reporting (every N seconds)
pub async fn start_periodic_reporter(aggregator: ResultAggregator, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        ticker.tick().await;

        // Update system metrics before printing
        aggregator.update_system_metrics();

        print_live_metrics(&aggregator.snapshot());
    }
}

fn latency_line(stats: &LatencyStats) -> String {
    format!(
        "│  Min: {:>7.1}  P50: {:>7.1}  P95: {:>7.1}  P99: {:>7.1}  Max: {:>7.1} │",
        stats.min, stats.p50, stats.p95, stats.p99, stats.max
    )
}

/// Print live metrics (clears screen and updates in place)
pub fn print_live_metrics(report: &RunReport) {
    // Clear screen and move cursor to top
    print!("\x1B[2J\x1B[1;1H");

    let elapsed = report.elapsed_secs as u64;

    println!("╔════════════════════════════════════════════════════════════════╗");
    println!("║               Surge Load Test - Live Metrics                   ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    println!(
        "\n⏱️  Elapsed Time: {:02}:{:02}:{:02}",
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60
    );

    println!("\n┌─ OPERATIONS ────────────────────────────────────────────────┐");
    println!(
        "│  Started:      {:>8}    In-Flight:  {:>8}              │",
        report.started, report.in_flight
    );
    println!(
        "│  Ok:           {:>8}    Overload:   {:>8}              │",
        report.counts.ok, report.counts.overload
    );
    println!(
        "│  Timeout:      {:>8}    Error:      {:>8}              │",
        report.counts.timeout, report.counts.error
    );
    if report.total > 0 {
        println!(
            "│  Success Rate: {:>7.2}%    Throughput: {:>7.2}/sec        │",
            report.success_rate(),
            report.throughput
        );
    }
    println!(
        "│  Peak Admitted: {:>7}                                     │",
        report.peak_in_flight
    );
    println!("└─────────────────────────────────────────────────────────────┘");

    if report.latency.count > 0 {
        println!("\n┌─ LATENCY (ms) ──────────────────────────────────────────────┐");
        println!("{}", latency_line(&report.latency));
        println!(
            "│  Mean: {:>8.2} ms    Count: {:>10}                    │",
            report.latency.mean, report.latency.count
        );
        println!("└─────────────────────────────────────────────────────────────┘");
    }

    println!("\n┌─ SYSTEM ────────────────────────────────────────────────────┐");
    println!(
        "│  CPU Usage:    {:>6.1}%    Memory: {:>6} / {:>6} MB       │",
        report.system.cpu_usage, report.system.memory_used_mb, report.system.memory_total_mb
    );
    println!("└─────────────────────────────────────────────────────────────┘");

    println!("\n  [Press Ctrl+C to stop test]");

    // Flush stdout to ensure immediate display
    let _ = io::stdout().flush();
}

fn print_latency(title: &str, stats: &LatencyStats) {
    if stats.count == 0 {
        return;
    }
    println!("\n📈 {}", title);
    println!("   Min:                  {:>10.2} ms", stats.min);
    println!("   P50 (Median):         {:>10.2} ms", stats.p50);
    println!("   P95:                  {:>10.2} ms", stats.p95);
    println!("   P99:                  {:>10.2} ms", stats.p99);
    println!("   Max:                  {:>10.2} ms", stats.max);
    println!("   Mean:                 {:>10.2} ms", stats.mean);
}

/// Print final summary report
pub fn print_final_report(report: &RunReport) {
    println!("\n╔════════════════════════════════════════════════════════════════╗");
    println!("║                    FINAL TEST REPORT                           ║");
    println!("╚════════════════════════════════════════════════════════════════╝");

    println!("\n📊 OPERATIONS");
    println!("   Total Started:        {:>10}", report.started);
    println!("   Total Completed:      {:>10}", report.total);
    println!("   Ok:                   {:>10}", report.counts.ok);
    println!("   Overload:             {:>10}", report.counts.overload);
    println!("   Timeout:              {:>10}", report.counts.timeout);
    println!("   Error:                {:>10}", report.counts.error);
    if report.abandoned > 0 {
        println!("   Abandoned:            {:>10}", report.abandoned);
    }
    println!("   Peak Admitted:        {:>10}", report.peak_in_flight);

    if report.elapsed_secs > 0.0 {
        println!(
            "   Throughput:           {:>10.2} ops/sec",
            report.throughput
        );
        println!(
            "   Ok Throughput:        {:>10.2} ops/sec",
            report.ok_throughput
        );
    }
    println!("   Bytes Written:        {:>10}", report.bytes_written);

    if report.total > 0 {
        println!("   Success Rate:         {:>10.2}%", report.success_rate());
    }

    print_latency("LATENCY (all outcomes)", &report.latency);
    print_latency("LATENCY (ok only)", &report.ok_latency);
    print_latency("ADMISSION WAIT", &report.admission_wait);

    println!("\n⏱️  Test Duration: {:.2} seconds", report.elapsed_secs);
    println!("════════════════════════════════════════════════════════════════\n");
}

/// Write the report as pretty JSON
pub fn write_json_report(report: &RunReport, path: impl AsRef<Path>) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
