use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use futures::StreamExt;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use zbmon_client::client::{ClientState, StatsClient};
use zbmon_client::projection::{DisplayRow, Severity, project};
use zbmon_client::settings::SettingsStore;

const CHANNEL_MIN: i32 = 11;
const CHANNEL_MAX: i32 = 26;

#[derive(Parser, Debug)]
#[command(name = "zbmon-tui")]
#[command(about = "Terminal monitor for 802.15.4 per-channel packet-loss and link-quality stats")]
struct Args {
    /// Stats service address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    address: String,

    /// Path to the persisted settings file
    #[arg(long, short = 's', default_value = "zbmon.toml")]
    settings: String,

    /// Poll period in seconds
    #[arg(long, short = 'i', default_value_t = 30)]
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = Arc::new(SettingsStore::load(&args.settings));
    let client = StatsClient::connect(&args.address, settings.clone())?;

    let mut terminal = ratatui::init();
    let result = run(
        &mut terminal,
        &client,
        &settings,
        Duration::from_secs(args.interval),
    )
    .await;
    ratatui::restore();

    client.close();
    result
}

async fn run(
    terminal: &mut ratatui::DefaultTerminal,
    client: &StatsClient,
    settings: &Arc<SettingsStore>,
    period: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = EventStream::new();
    let mut state_rx = client.subscribe();
    let mut channel_rx = settings.subscribe_channel();

    loop {
        let state = client.state();
        terminal.draw(|frame| draw(frame, &state, settings))?;

        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        match key.code {
                            KeyCode::Char('q') | KeyCode::Esc => break,
                            KeyCode::Char(' ') => {
                                if client.state().is_polling {
                                    client.stop_repeating();
                                } else {
                                    client.start_repeating(period);
                                }
                            }
                            KeyCode::Up => {
                                settings.set_channel((settings.channel() + 1).min(CHANNEL_MAX));
                            }
                            KeyCode::Down => {
                                settings.set_channel((settings.channel() - 1).max(CHANNEL_MIN));
                            }
                            _ => {}
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                }
            }
            _ = state_rx.changed() => {}
            _ = channel_rx.changed() => {}
        }
    }

    Ok(())
}

fn draw(frame: &mut ratatui::Frame, state: &ClientState, settings: &SettingsStore) {
    let [status_area, table_area, help_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let status_style = if state.is_error {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let status = format!(
        "{} | channel {} | min LQI {:.0} | last {} min | {}",
        if state.is_polling { "polling" } else { "idle" },
        settings.channel(),
        settings.min_lqi(),
        settings.lookback_minutes(),
        state.last_message,
    );
    frame.render_widget(
        Paragraph::new(status).style(status_style).block(
            Block::default()
                .borders(Borders::ALL)
                .title("zbmon"),
        ),
        status_area,
    );

    let rows: Vec<Row> = project(&state.last_reply).iter().map(table_row).collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Length(26),
            Constraint::Length(22),
            Constraint::Length(7),
        ],
    )
    .header(Row::new(["Channel", "Loss", "LQI", "Time"]).style(Style::default().add_modifier(Modifier::BOLD)));
    frame.render_widget(table, table_area);

    frame.render_widget(
        Paragraph::new("q quit | space start/stop polling | up/down channel"),
        help_area,
    );
}

fn table_row(row: &DisplayRow) -> Row<'static> {
    Row::new(vec![
        Cell::from(row.channel_label.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(row.loss_text.clone()).style(Style::default().fg(severity_color(row.loss_severity))),
        Cell::from(row.lqi_text.clone().unwrap_or_default())
            .style(Style::default().fg(severity_color(row.lqi_severity))),
        Cell::from(row.time_label.clone()),
    ])
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Normal => Color::Reset,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    }
}
