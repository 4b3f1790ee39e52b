use std::io::{self, Write};

use crossbeam_channel::RecvTimeoutError;
use log::{error, info, warn};

use packet_peek::live_capture::list_interfaces;
use packet_peek::{
    format_byte_count, spawn_ingest, CaptureConfig, CaptureController, CaptureEvent, PacketSource,
    PeekError, ProtocolAnalyzer, SourceConfig, StatKind, Subscription,
};

const TOP_TALKERS: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = CaptureConfig::from_env()?;
    if let SourceConfig::Live { interface: None } = config.source {
        config.source = SourceConfig::Live {
            interface: Some(prompt_for_interface()?),
        };
    }

    // Ctrl+C only wakes the report loop; shutdown is driven from there.
    let (interrupt_tx, interrupt_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        println!("\nCtrl+C received, stopping capture...");
        let _ = interrupt_tx.try_send(());
    })?;

    let controller = CaptureController::from_config(&config)?;
    let analyzer = ProtocolAnalyzer::default();
    let feed = controller.subscribe(config.subscriber_capacity)?;
    let source = config.source.open()?;

    println!("Capturing from {}... Press Ctrl+C to stop", source.describe());
    controller.start();

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let ingest = spawn_ingest(
        controller.clone(),
        source,
        stop_rx,
        config.max_consecutive_errors,
    )?;

    loop {
        match interrupt_rx.recv_timeout(config.report_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                print_report(&controller, &analyzer, &feed);
                if ingest.is_finished() {
                    info!("Ingest thread finished on its own");
                    break;
                }
            }
        }
    }

    controller.stop();
    drop(stop_tx);
    match ingest.join() {
        Ok(Ok(report)) => println!(
            "Ingest summary: {} pulled, {} accepted, {} evicted, {} dropped, {} source errors",
            report.pulled, report.accepted, report.evictions, report.dropped, report.errors
        ),
        Ok(Err(e)) => error!("Ingest failed: {}", e),
        Err(_) => error!("Ingest thread panicked"),
    }

    print_report(&controller, &analyzer, &feed);
    println!("Capture stopped. Exiting.");
    Ok(())
}

fn prompt_for_interface() -> Result<String, PeekError> {
    let interfaces = list_interfaces();
    if interfaces.is_empty() {
        return Err(PeekError::ConfigError(
            "no network interfaces available".to_string(),
        ));
    }

    println!("Available Network Interfaces:");
    for (i, iface) in interfaces.iter().enumerate() {
        let ips = if iface.ipv4.is_empty() {
            "No IPv4 assigned".to_string()
        } else {
            iface.ipv4.join(", ")
        };
        let mut notes = Vec::new();
        if !iface.is_up {
            notes.push("down");
        }
        if iface.is_loopback {
            notes.push("loopback");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };
        println!("[{}] {} - IPs: {}{}", i, iface.name, ips, notes);
    }

    print!("Enter interface index to capture on: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let index: usize = input.trim().parse()?;

    interfaces
        .into_iter()
        .nth(index)
        .map(|iface| iface.name)
        .ok_or_else(|| PeekError::ConfigError(format!("invalid interface index {}", index)))
}

fn print_report(controller: &CaptureController, analyzer: &ProtocolAnalyzer, feed: &Subscription) {
    let events = feed.drain();
    let latest = events.iter().rev().find_map(|event| match event {
        CaptureEvent::Ingested { packet, .. } => Some(packet.summary().to_string()),
        CaptureEvent::StateChanged { .. } => None,
    });
    if feed.overflowed() > 0 {
        warn!("Report feed has skipped {} events so far", feed.overflowed());
    }

    let status = controller.status();
    let (_, stats) = controller.consistent_snapshot();

    println!(
        "\n=== {} | {}/{} buffered | {} seen | progress {}% ===",
        status.state, status.buffered, status.capacity, status.total_ever_seen, status.progress
    );
    println!(
        "Data: {} total, {:.1} bytes average, {} new since last report",
        format_byte_count(stats.total_bytes),
        stats.average_packet_size(),
        events.len()
    );
    if let Some(summary) = latest {
        println!("Latest: {}", summary);
    }
    if stats.is_empty() {
        return;
    }

    println!("Protocols:");
    for share in analyzer.per_protocol_breakdown(&stats) {
        println!(
            "  {:<6} {:>5} ({:>5.1}%)  {} security, port {}  {}",
            share.protocol,
            share.count,
            share.percentage,
            share.profile.tier,
            share.profile.port,
            share.profile.description
        );
    }

    let talkers = [
        ("Top sources", StatKind::Source),
        ("Top destinations", StatKind::Destination),
    ];
    for (label, kind) in talkers {
        let entries: Vec<String> = controller
            .top_n(kind, TOP_TALKERS)
            .into_iter()
            .map(|entry| format!("{} ({})", entry.key, entry.count))
            .collect();
        println!("{}: {}", label, entries.join(", "));
    }

    let tiers: Vec<String> = analyzer
        .tier_breakdown(&stats)
        .into_iter()
        .map(|(tier, count)| format!("{}={}", tier, count))
        .collect();
    let overview = analyzer.security_overview(&stats);
    println!(
        "Security: {}/{} encrypted ({:.1}%), tiers: {}",
        overview.encrypted_count,
        overview.total_count,
        overview.encrypted_percentage(),
        tiers.join(" ")
    );
    for advisory in analyzer.recommendations(&stats) {
        println!("  [{:?}] {}", advisory.severity(), advisory);
    }

    let _ = io::stdout().flush();
}
