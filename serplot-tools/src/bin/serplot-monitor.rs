use clap::Parser;
use crossbeam::channel;
use serplot::data::Series;
use serplot::Session;
use serplot_tools::{init_logging, Event, SourceOpts, ToolError};

use std::io::{stdout, Stdout, Write};
use std::process::ExitCode;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::{
    cursor::*,
    event::{self, KeyCode},
    style::*,
    terminal::*,
};

/// Screen refresh period, also the keyboard poll timeout.
const FRAME: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    name = "serplot-monitor",
    version,
    about = "Live table of the series printed by a device"
)]
struct Cli {
    #[command(flatten)]
    src: SourceOpts,
}

struct Status {
    source: String,
    connected: bool,
    message: String,
    records: u64,
}

fn draw(stdout: &mut Stdout, session: &Session, status: &Status) -> std::io::Result<()> {
    stdout.execute(MoveTo(0, 0))?;
    stdout.execute(Clear(ClearType::All))?;

    let state = match (status.connected, session.is_paused()) {
        (false, _) => "disconnected",
        (true, true) => "paused",
        (true, false) => "running",
    };
    print!(
        "\r{}  [{}]  records: {}  {}\r\n",
        status.source, state, status.records, status.message
    );
    print!("\r q: quit   p: pause/resume   r: clear series\r\n\r\n");

    let buffer = session.buffer();
    let width = buffer.dataset_names().map(str::len).max().unwrap_or(0).max(4);
    print!(
        "\r {:<width$}  {:>12} {:>12} {:>12} {:>7}\r\n",
        "name", "last", "min", "max", "points"
    );
    for series in buffer.series() {
        let color = series.color();
        stdout.execute(SetForegroundColor(Color::Rgb {
            r: color.r,
            g: color.g,
            b: color.b,
        }))?;
        print!(" \u{25A0}");
        stdout.execute(ResetColor)?;
        let (min, max) = range(series);
        print!(
            " {:<width$} {:>12} {:>12} {:>12} {:>7}\r\n",
            series.name(),
            series.last().map(|p| fmt_value(p.y)).unwrap_or_default(),
            fmt_value(min),
            fmt_value(max),
            series.len(),
        );
    }
    stdout.flush()
}

fn range(series: &Series) -> (f64, f64) {
    series
        .points()
        .iter()
        .fold((f64::NAN, f64::NAN), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)))
}

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "-".to_string()
    } else {
        format!("{:.3}", v)
    }
}

fn run_monitor(cli: &Cli, stdout: &mut Stdout) -> Result<(), ToolError> {
    let config = cli.src.load_config()?;
    let mut session = Session::new(&config)?;
    let source = cli.src.source()?;
    let mut status = Status {
        source: source.to_string(),
        connected: false,
        message: String::new(),
        records: 0,
    };

    let (events_send, events) = channel::unbounded::<Event>();
    let _reader = source.spawn(events_send);

    'drawing: loop {
        // Everything received since the last frame goes into one feed.
        let mut chunks: Vec<String> = Vec::new();
        loop {
            match events.try_recv() {
                Ok(Event::Data(text)) => chunks.push(text),
                Ok(Event::Connected) => {
                    if !chunks.is_empty() {
                        status.records += session.feed(&chunks) as u64;
                        chunks.clear();
                    }
                    session.reconnect();
                    status.connected = true;
                    status.message.clear();
                }
                Ok(Event::Disconnected(reason)) => {
                    status.connected = false;
                    status.message = reason;
                }
                Ok(Event::Finished) => {
                    status.connected = false;
                    status.message = "end of input".to_string();
                }
                Err(_) => break,
            }
        }
        if !chunks.is_empty() {
            status.records += session.feed(&chunks) as u64;
        }

        draw(stdout, &session, &status)?;

        if event::poll(FRAME)? {
            if let event::Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break 'drawing,
                    KeyCode::Char('p') => session.set_paused(!session.is_paused()),
                    KeyCode::Char('r') => session.clear_series(),
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn setup_terminal(stdout: &mut Stdout) -> std::io::Result<()> {
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(Hide)?;
    Ok(())
}

fn main() -> ExitCode {
    init_logging("off");
    let cli = Cli::parse();
    let mut stdout = stdout();

    if let Err(e) = setup_terminal(&mut stdout) {
        eprintln!("Failed to set up terminal: {}", e);
        return ExitCode::FAILURE;
    }

    let result = run_monitor(&cli, &mut stdout);

    //clean up terminal on end
    _ = stdout.execute(LeaveAlternateScreen);
    _ = stdout.execute(Show);
    _ = disable_raw_mode();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
