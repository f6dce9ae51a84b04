mod dashboard_state;

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use dashboard_state::{
    fetch_snapshot, format_time, truncate, ConnectionStatus, Counters, DashboardState, Period,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame, Terminal,
};
use tokio::sync::{watch, Notify};
use tokio::time::interval;

type SharedState = Arc<Mutex<DashboardState>>;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let poll_every = std::env::var("POLL_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(60);
    let period = Period::parse(&std::env::var("PERIOD").unwrap_or_default());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(io::Error::other)?;

    // `dashboard --once`: one poll, one summary line, no terminal UI.
    if std::env::args().any(|a| a == "--once") {
        return match fetch_snapshot(&client, &base_url, period).await {
            Ok(snapshot) => {
                let mut state = DashboardState::new(base_url, period);
                state.apply_snapshot(snapshot);
                println!("{}", summary_line(period, &state.counters(), &state.degraded()));
                Ok(())
            }
            Err(e) => Err(io::Error::other(e)),
        };
    }

    let state: SharedState = Arc::new(Mutex::new(DashboardState::new(base_url, period)));
    let (period_tx, period_rx) = watch::channel(period);
    let refresh = Arc::new(Notify::new());

    let poller = tokio::spawn(poll_loop(
        Arc::clone(&state),
        client,
        period_rx,
        Arc::clone(&refresh),
        Duration::from_secs(poll_every),
    ));

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &state, &period_tx, &refresh, poll_every);

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    poller.abort();

    result
}

fn lock(state: &SharedState) -> MutexGuard<'_, DashboardState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Polls on every tick, on every period change and on manual refresh.
async fn poll_loop(
    state: SharedState,
    client: reqwest::Client,
    mut period_rx: watch::Receiver<Period>,
    refresh: Arc<Notify>,
    every: Duration,
) {
    let mut ticker = interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = period_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = refresh.notified() => {}
        }
        let period = *period_rx.borrow_and_update();
        poll_once(&state, &client, period).await;
    }
}

async fn poll_once(state: &SharedState, client: &reqwest::Client, period: Period) {
    let base_url = {
        let mut s = lock(state);
        s.set_period(period);
        if !s.begin_refresh() {
            return;
        }
        s.base_url.clone()
    };

    let result = fetch_snapshot(client, &base_url, period).await;

    let mut s = lock(state);
    match result {
        Ok(snapshot) => s.apply_snapshot(snapshot),
        Err(e) => s.record_error(e),
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &SharedState,
    period_tx: &watch::Sender<Period>,
    refresh: &Notify,
    poll_every: u64,
) -> io::Result<()> {
    loop {
        {
            let s = lock(state);
            terminal.draw(|f| render(f, &s, poll_every))?;
        }

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let selected = match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        refresh.notify_one();
                        None
                    }
                    KeyCode::Char('1') => Some(Period::Day),
                    KeyCode::Char('2') => Some(Period::Week),
                    KeyCode::Char('3') => Some(Period::Month),
                    KeyCode::Char('4') => Some(Period::All),
                    _ => None,
                };
                if let Some(p) = selected {
                    period_tx.send_if_modified(|current| {
                        let changed = *current != p;
                        *current = p;
                        changed
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &DashboardState, poll_every: u64) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // counters
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_counters(f, &app.counters(), chunks[1]);
    render_body(f, app, chunks[2]);
    render_footer(f, poll_every, chunks[3]);
}

fn render_header(f: &mut Frame, app: &DashboardState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected if app.is_refreshing() => ("⟳ refreshing".to_string(), Color::Yellow),
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };
    let refreshed = app
        .last_refresh
        .map_or("never".to_string(), |t| format!("{}s ago", t.elapsed().as_secs()));
    let degraded = app.degraded();
    let (degraded_text, degraded_color) = if degraded.is_empty() {
        ("all datasets fresh".to_string(), Color::DarkGray)
    } else {
        (format!("degraded: {}", degraded.join(", ")), Color::Red)
    };

    let line = Line::from(vec![
        Span::styled(
            " NFT Activity Monitor  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("period {}", app.period().as_str()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  │  "),
        Span::styled(format!("refreshed {refreshed}"), Style::default().fg(Color::White)),
        Span::raw("  │  "),
        Span::styled(degraded_text, Style::default().fg(degraded_color)),
    ]);
    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_counters(f: &mut Frame, c: &Counters, area: Rect) {
    let item = |label: &str, value: String| {
        vec![
            Span::styled(format!(" {label} "), Style::default().fg(Color::DarkGray)),
            Span::styled(value, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw("  "),
        ]
    };
    let spans: Vec<Span> = [
        item("trades", c.trades.to_string()),
        item("burns", c.burns.to_string()),
        item("crafts", c.crafts.to_string()),
        item("morphs", format!("{} ({} cards)", c.morphs, c.morphed_cards)),
        item("giftz", c.giftz_sales.to_string()),
        item("users", format!("{} ardor / {} polygon", c.ardor_users, c.polygon_users)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &DashboardState, area: Rect) {
    // Horizontal split: trades (55%) | burns, crafts, morphs (45%)
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(34),
            Constraint::Percentage(33),
            Constraint::Percentage(33),
        ])
        .split(halves[1]);

    render_trades_table(f, app, halves[0]);

    let s = &app.snapshot;
    let burns = s.burns.records.iter().map(|b| {
        [format_time(&b.timestamp), truncate(&b.card_name, 16), b.quantity.to_string(), truncate(&b.sender, 14)]
    });
    render_simple_table(f, " BURNS ", ["Time", "Card", "Qty", "Sender"], burns, right[0]);

    let crafts = s.crafts.records.iter().map(|c| {
        [format_time(&c.timestamp), truncate(&c.card_name, 16), String::new(), truncate(&c.recipient, 14)]
    });
    render_simple_table(f, " CRAFTS ", ["Time", "Card", "", "Crafter"], crafts, right[1]);

    let morphs = s.morphs.records.iter().map(|m| {
        [
            format_time(&m.timestamp),
            format!("{} → {}", truncate(&m.from_card, 8), truncate(&m.to_card, 8)),
            m.quantity.to_string(),
            truncate(&m.morpher, 14),
        ]
    });
    render_simple_table(f, " MORPHS ", ["Time", "Cards", "Qty", "Morpher"], morphs, right[2]);
}

fn header_row<'a>(labels: impl IntoIterator<Item = &'a str>) -> Row<'a> {
    Row::new(
        labels
            .into_iter()
            .map(|h| Cell::from(h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .height(1)
}

fn titled_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ))
}

fn render_trades_table(f: &mut Frame, app: &DashboardState, area: Rect) {
    let rows: Vec<Row> = app
        .snapshot
        .trades
        .records
        .iter()
        .map(|t| {
            let chain_color = if t.chain == "polygon" { Color::Magenta } else { Color::Cyan };
            Row::new(vec![
                Cell::from(format_time(&t.timestamp)).style(Style::default().fg(Color::DarkGray)),
                Cell::from(truncate(&t.chain, 7)).style(Style::default().fg(chain_color)),
                Cell::from(truncate(&t.card_name, 18)),
                Cell::from(format!("{} {}", t.price, t.currency)).style(Style::default().fg(Color::Green)),
                Cell::from(t.quantity.to_string()),
                Cell::from(format!("{} → {}", truncate(&t.seller, 10), truncate(&t.buyer, 10))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Length(16),
            Constraint::Length(4),
            Constraint::Length(23),
        ],
    )
    .header(header_row(["Time", "Chain", "Card", "Price", "Qty", "Seller → Buyer"]))
    .block(titled_block(" RECENT TRADES "));

    f.render_widget(table, area);
}

fn render_simple_table(
    f: &mut Frame,
    title: &str,
    headers: [&str; 4],
    rows: impl Iterator<Item = [String; 4]>,
    area: Rect,
) {
    let rows: Vec<Row> = rows
        .map(|[time, a, b, c]| {
            Row::new(vec![
                Cell::from(time).style(Style::default().fg(Color::DarkGray)),
                Cell::from(a),
                Cell::from(b).style(Style::default().fg(Color::Cyan)),
                Cell::from(c),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(11),
            Constraint::Min(10),
            Constraint::Length(4),
            Constraint::Length(15),
        ],
    )
    .header(header_row(headers))
    .block(titled_block(title));
    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, poll_every: u64, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[1-4] ", Style::default().fg(Color::Yellow)),
        Span::raw("period 24h/7d/30d/all  "),
        Span::styled(format!("auto-refresh: {poll_every}s"), Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}

/// One-line counters summary for `--once`.
fn summary_line(period: Period, c: &Counters, degraded: &[&str]) -> String {
    let mut line = format!(
        "period={} trades={} burns={} crafts={} morphs={} morphed_cards={} giftz={} ardor_users={} polygon_users={}",
        period.as_str(),
        c.trades,
        c.burns,
        c.crafts,
        c.morphs,
        c.morphed_cards,
        c.giftz_sales,
        c.ardor_users,
        c.polygon_users,
    );
    if !degraded.is_empty() {
        line.push_str(&format!(" degraded={}", degraded.join(",")));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_lists_degraded_datasets() {
        let c = Counters {
            trades: 4,
            morphs: 1,
            morphed_cards: 3,
            ..Counters::default()
        };
        let line = summary_line(Period::Week, &c, &["burns"]);
        assert!(line.starts_with("period=7d trades=4 "));
        assert!(line.contains("morphed_cards=3"));
        assert!(line.ends_with("degraded=burns"));
    }
}
