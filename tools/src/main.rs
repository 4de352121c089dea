use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tools::{
    capture_stats, classify, read_capture, scan_client_tags, scan_server_tags, DatagramKind,
    TagScan,
};

#[derive(Parser)]
#[command(
    name = "slipgate-tools",
    version,
    about = "slipgate capture inspection tools"
)]
struct Cli {
    /// Enable diagnostic logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print per-datagram channel headers and message tags.
    Dump {
        /// Path to the capture file.
        capture_path: PathBuf,
        /// The capture holds client-to-server datagrams (with qports).
        #[arg(long)]
        to_server: bool,
        /// Emit machine-readable JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Summarize sequence gaps and reliable traffic.
    Stats {
        /// Path to the capture file.
        capture_path: PathBuf,
        /// The capture holds client-to-server datagrams (with qports).
        #[arg(long)]
        to_server: bool,
        /// Emit machine-readable JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct DumpRecord {
    index: usize,
    #[serde(flatten)]
    kind: DatagramKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    scan: Option<TagScan>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    match cli.command {
        Command::Dump {
            capture_path,
            to_server,
            json,
        } => {
            let datagrams = load_capture(&capture_path)?;
            let records: Vec<DumpRecord> = datagrams
                .iter()
                .enumerate()
                .map(|(index, datagram)| dump_record(index, datagram, to_server))
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print_record(record);
                }
            }
        }
        Command::Stats {
            capture_path,
            to_server,
            json,
        } => {
            let datagrams = load_capture(&capture_path)?;
            let stats = capture_stats(&datagrams, to_server);

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("datagrams:         {}", stats.datagrams);
                println!("out of band:       {}", stats.out_of_band);
                println!("runts:             {}", stats.runts);
                println!("total bytes:       {}", stats.total_bytes);
                println!(
                    "sequence range:    {}..={}",
                    stats.first_sequence, stats.last_sequence
                );
                println!("sequence gaps:     {}", stats.gaps);
                println!("stale records:     {}", stats.stale);
                println!("reliable carried:  {}", stats.reliable_carried);
                println!("reliable runs:     {}", stats.reliable_runs);
                println!("retransmissions:   <= {}", stats.retransmissions());
            }
        }
    }

    Ok(())
}

fn load_capture(path: &PathBuf) -> Result<Vec<Vec<u8>>> {
    let bytes = fs::read(path).with_context(|| format!("read capture {}", path.display()))?;
    let datagrams = read_capture(&bytes).with_context(|| format!("parse {}", path.display()))?;
    log::debug!("{}: {} datagrams", path.display(), datagrams.len());
    Ok(datagrams)
}

fn dump_record(index: usize, datagram: &[u8], to_server: bool) -> DumpRecord {
    let kind = classify(datagram, to_server);
    let scan = match &kind {
        DatagramKind::InBand { header } => {
            let payload = &datagram[datagram.len() - header.payload_len..];
            Some(if to_server {
                scan_client_tags(payload)
            } else {
                scan_server_tags(payload)
            })
        }
        _ => None,
    };
    DumpRecord { index, kind, scan }
}

fn print_record(record: &DumpRecord) {
    match &record.kind {
        DatagramKind::OutOfBand { text } => {
            println!("#{:04} out-of-band {:?}", record.index, text.trim_end());
        }
        DatagramKind::Runt { len } => {
            println!("#{:04} runt ({len} bytes)", record.index);
        }
        DatagramKind::InBand { header } => {
            let mut line = format!(
                "#{:04} seq {}{} ack {}{}",
                record.index,
                header.sequence,
                if header.reliable { "*" } else { "" },
                header.ack_sequence,
                if header.reliable_ack { "*" } else { "" },
            );
            if let Some(qport) = header.qport {
                line.push_str(&format!(" qport {qport}"));
            }
            line.push_str(&format!(" payload {}", header.payload_len));

            if let Some(scan) = &record.scan {
                line.push_str(" | ");
                line.push_str(&scan.tags.join(" "));
                if let Some(err) = &scan.error {
                    line.push_str(&format!(" [{err}]"));
                }
            }
            println!("{line}");
        }
    }
}
