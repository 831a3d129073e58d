use clap::{Parser, Subcommand};
use crossbeam::channel;
use serde::Serialize;
use serplot::text::{LineEnding, StreamParser};
use serplot::worker::Worker;
use serplot_tools::{init_logging, Event, SourceOpts, ToolError};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "serplot",
    version,
    about = "Decode, log and talk to text-printing serial devices"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports
    Ports {
        /// Include ports that are not USB devices
        #[arg(short = 'a', long)]
        all: bool,

        /// Print the list as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Print decoded records as they arrive
    Dump {
        #[command(flatten)]
        src: SourceOpts,

        /// Prefix every record with the local time
        #[arg(short = 't', long)]
        timestamps: bool,
    },

    /// Log decoded values to a CSV file (time, record, name, value)
    LogCsv {
        #[command(flatten)]
        src: SourceOpts,

        /// Path of file where to log the data
        #[arg(short = 'f', default_value_t = default_log_path())]
        file: String,

        /// Unbuffered output (flush every record)
        #[arg(short = 'u')]
        unbuffered: bool,
    },

    /// Send a message to the device
    Send {
        #[command(flatten)]
        src: SourceOpts,

        /// Text to send
        message: String,

        /// Line ending appended to the message (none, lf, cr, crlf)
        #[arg(short = 'e', long = "line-ending", default_value_t = LineEnding::Lf)]
        line_ending: LineEnding,
    },

    /// Print the default configuration as YAML
    Config,
}

fn default_log_path() -> String {
    chrono::Local::now()
        .format("plot.%Y%m%d-%H%M%S.csv")
        .to_string()
}

#[derive(Debug, Serialize)]
struct PortInfo {
    url: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    product: Option<String>,
}

fn enum_ports(all: bool) -> Result<Vec<PortInfo>, ToolError> {
    let mut ports = Vec::new();
    for p in serialport::available_ports()? {
        let url = format!("serial://{}", p.port_name);
        let info = match p.port_type {
            serialport::SerialPortType::UsbPort(usb) => PortInfo {
                url,
                kind: "usb",
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                product: usb.product,
            },
            _ if !all => continue,
            other => PortInfo {
                url,
                kind: match other {
                    serialport::SerialPortType::PciPort => "pci",
                    serialport::SerialPortType::BluetoothPort => "bluetooth",
                    _ => "unknown",
                },
                vid: None,
                pid: None,
                product: None,
            },
        };
        ports.push(info);
    }
    Ok(ports)
}

fn list_ports(all: bool, yaml: bool) -> Result<(), ToolError> {
    let ports = enum_ports(all)?;
    if yaml {
        print!("{}", to_yaml(&ports)?);
        return Ok(());
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.url,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}  {}", port.url, port.kind),
        }
    }
    Ok(())
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String, ToolError> {
    Ok(serde_yaml::to_string(value)?)
}

fn dump(src: &SourceOpts, timestamps: bool) -> Result<(), ToolError> {
    let config = src.load_config()?;
    let worker = Worker::new(&config.parser)?;
    let (events_send, events) = channel::unbounded::<Event>();
    let _reader = src.source()?.spawn(events_send);

    let mut finished = false;
    loop {
        crossbeam::select! {
            recv(events) -> event => match event {
                Ok(Event::Connected) => {
                    let _ = worker.cleanup();
                }
                Ok(Event::Data(text)) => {
                    let _ = worker.send_data(vec![text]);
                }
                Ok(Event::Disconnected(reason)) => eprintln!("Disconnected: {}", reason),
                Ok(Event::Finished) | Err(_) => {
                    finished = true;
                    break;
                }
            },
            recv(worker.receiver()) -> parsed => {
                let Ok(parsed) = parsed else { break };
                print_records(&parsed.records, timestamps);
            }
        }
    }

    if finished {
        // Records the worker is still parsing.
        while let Ok(parsed) = worker.recv_timeout(Duration::from_millis(200)) {
            print_records(&parsed.records, timestamps);
        }
    }
    Ok(())
}

fn print_records(records: &[serplot::text::DecodedRecord], timestamps: bool) {
    for record in records {
        if timestamps {
            println!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), record);
        } else {
            println!("{}", record);
        }
    }
}

fn log_csv(src: &SourceOpts, path: String, unbuffered: bool) -> Result<(), ToolError> {
    let config = src.load_config()?;
    let mut parser = StreamParser::new(&config.parser)?;
    let (events_send, events) = channel::unbounded::<Event>();
    let _reader = src.source()?.spawn(events_send);

    let mut file = BufWriter::new(File::create(&path)?);
    writeln!(file, "time,record,name,value")?;
    println!("Logging to {}", path);

    let mut n: u64 = 0;
    for event in events.iter() {
        match event {
            Event::Connected => parser.reset(),
            Event::Data(text) => {
                let now = chrono::Local::now().to_rfc3339();
                for record in parser.parse_str(&text).records {
                    for (name, value) in record.iter() {
                        writeln!(file, "{},{},{},{}", now, n, csv_field(name), value)?;
                    }
                    n += 1;
                    if unbuffered {
                        file.flush()?;
                    }
                }
            }
            Event::Disconnected(reason) => eprintln!("Disconnected: {}", reason),
            Event::Finished => break,
        }
    }
    file.flush()?;
    println!("Logged {} records", n);
    Ok(())
}

fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn send(src: &SourceOpts, message: &str, line_ending: LineEnding) -> Result<(), ToolError> {
    let mut writer = src.source()?.open_writer()?;
    writer.write_all(line_ending.terminate(message).as_bytes())?;
    writer.flush()?;
    println!("OK");
    Ok(())
}

fn print_config() -> Result<(), ToolError> {
    print!("{}", to_yaml(&serplot::PlotterConfig::default())?);
    Ok(())
}

fn main() -> ExitCode {
    init_logging("warn");
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ports { all, yaml } => list_ports(all, yaml),
        Commands::Dump { src, timestamps } => dump(&src, timestamps),
        Commands::LogCsv {
            src,
            file,
            unbuffered,
        } => log_csv(&src, file, unbuffered),
        Commands::Send {
            src,
            message,
            line_ending,
        } => send(&src, &message, line_ending),
        Commands::Config => print_config(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
