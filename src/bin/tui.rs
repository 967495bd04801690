//! Shelf TUI - Live monitoring dashboard for the shelf sentinel server
//!
//! Polls the HTTP API and displays:
//! - Per-shelf stock (fused count, status, raw distance and weight)
//! - Alert journal (newest first)
//! - Potential thefts
//! - Sales rates

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Shelf TUI - live dashboard over the shelf sentinel HTTP API
#[derive(Parser, Debug)]
#[command(name = "shelf-tui", version, about)]
struct Args {
    /// Base URL of the shelf sentinel server
    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,

    /// Poll interval in milliseconds
    #[arg(short, long, default_value_t = 2000)]
    interval_ms: u64,
}

const MAX_ALERTS_SHOWN: usize = 20;

#[derive(Debug, Clone, Deserialize)]
struct StatusEntry {
    objects_count: u32,
    status: String,
    product_name: String,
    #[serde(default)]
    height: Option<i64>,
    #[serde(default)]
    weight: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SensorDataResponse {
    shelf_status: BTreeMap<String, StatusEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShelfConfigEntry {
    force_sensor: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ShelfConfigResponse {
    shelves: BTreeMap<String, ShelfConfigEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct AlertEntry {
    title: String,
    message: String,
    severity: String,
    timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TheftEntry {
    sale_id: String,
    shelf_id: String,
    items_removed: u32,
    timestamp: String,
    product_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TheftsResponse {
    thefts: Vec<TheftEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SalesResponse {
    total_sales: usize,
    hourly_rate: usize,
    daily_rate: usize,
    #[serde(default)]
    last_sale: Option<String>,
}

/// One row of the shelf table, joined from config and status
#[derive(Debug, Clone)]
struct ShelfRow {
    shelf_id: String,
    product: String,
    count: u32,
    status: String,
    distance: i64,
    weight: i64,
}

#[derive(Debug, Default)]
struct DashboardState {
    shelves: Vec<ShelfRow>,
    alerts: Vec<AlertEntry>,
    thefts: Vec<TheftEntry>,
    sales: SalesResponse,
    connected: bool,
    last_error: Option<String>,
    last_update: Option<Instant>,
    polls: u64,
}

impl DashboardState {
    fn apply_status(&mut self, config: &ShelfConfigResponse, status: &SensorDataResponse) {
        self.shelves = config
            .shelves
            .iter()
            .filter_map(|(shelf_id, cfg)| {
                let d = status.shelf_status.get(shelf_id)?;
                let f = status.shelf_status.get(&cfg.force_sensor);
                Some(ShelfRow {
                    shelf_id: shelf_id.clone(),
                    product: d.product_name.clone(),
                    count: d.objects_count,
                    status: d.status.clone(),
                    distance: d.height.unwrap_or(0),
                    weight: f.and_then(|f| f.weight).unwrap_or(0),
                })
            })
            .collect();
    }
}

type SharedState = Arc<Mutex<DashboardState>>;

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    base: &str,
    path: &str,
) -> Result<T, String> {
    let resp = client.get(format!("{base}{path}")).send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("{path}: HTTP {}", resp.status().as_u16()));
    }
    let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| format!("{path}: {e}"))
}

async fn poll_once(client: &reqwest::Client, base: &str, state: &SharedState) -> Result<(), String> {
    let config: ShelfConfigResponse = get_json(client, base, "/get_shelf_config").await?;
    let status: SensorDataResponse = get_json(client, base, "/get_sensor_data").await?;
    let alerts: Vec<AlertEntry> = get_json(client, base, "/get_alerts").await?;
    let thefts: TheftsResponse = get_json(client, base, "/get_potential_thefts").await?;
    let sales: SalesResponse = get_json(client, base, "/get_sales_data").await?;

    let mut s = state.lock().await;
    s.apply_status(&config, &status);
    s.alerts = alerts.into_iter().take(MAX_ALERTS_SHOWN).collect();
    s.thefts = thefts.thefts;
    s.sales = sales;
    s.polls += 1;
    Ok(())
}

async fn run_poller(base: String, interval: Duration, state: SharedState) {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(5)).build() {
        Ok(c) => c,
        Err(e) => {
            state.lock().await.last_error = Some(e.to_string());
            return;
        }
    };
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        let result = poll_once(&client, &base, &state).await;
        let mut s = state.lock().await;
        match result {
            Ok(()) => {
                s.connected = true;
                s.last_error = None;
                s.last_update = Some(Instant::now());
            }
            Err(e) => {
                s.connected = false;
                s.last_error = Some(e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let base = args.url.trim_end_matches('/').to_string();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let state = Arc::new(Mutex::new(DashboardState::default()));

    let poll_state = state.clone();
    let poll_handle = tokio::spawn(run_poller(
        base.clone(),
        Duration::from_millis(args.interval_ms.max(200)),
        poll_state,
    ));

    let result = run_ui(&mut terminal, state, &base).await;

    poll_handle.abort();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn run_ui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: SharedState,
    base: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        let s = state.lock().await;
        terminal.draw(|f| draw_ui(f, &s, base))?;
        drop(s);

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn draw_ui(f: &mut Frame, state: &DashboardState, base: &str) {
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                                  // Header
            Constraint::Length(state.shelves.len() as u16 + 3),     // Shelves
            Constraint::Min(0),                                     // Bottom panels
        ])
        .split(f.area());

    draw_header(f, main_chunks[0], state, base);
    draw_shelf_panel(f, main_chunks[1], state);

    let bottom_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45), // Alerts
            Constraint::Percentage(35), // Thefts
            Constraint::Percentage(20), // Sales
        ])
        .split(main_chunks[2]);

    draw_alert_panel(f, bottom_chunks[0], state);
    draw_theft_panel(f, bottom_chunks[1], state);
    draw_sales_panel(f, bottom_chunks[2], state);
}

fn draw_header(f: &mut Frame, area: Rect, state: &DashboardState, base: &str) {
    let status_color = if state.connected { Color::Green } else { Color::Red };
    let status_text = if state.connected { "CONNECTED" } else { "DISCONNECTED" };

    let last = state
        .last_update
        .map(|t| format!("{}s ago", t.elapsed().as_secs()))
        .unwrap_or_else(|| "never".to_string());

    let mut spans = vec![
        Span::styled("Shelf TUI ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!("{base} | ")),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(format!(" | Last: {last} | Polls: {}", state.polls)),
        Span::raw(" | Press 'q' to quit"),
    ];
    if let Some(err) = &state.last_error {
        spans.push(Span::styled(format!(" | {err}"), Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn status_color(status: &str) -> Color {
    match status {
        "empty" => Color::Red,
        "low" => Color::Yellow,
        _ => Color::Green,
    }
}

fn draw_shelf_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let rows: Vec<Row> = state
        .shelves
        .iter()
        .map(|shelf| {
            Row::new(vec![
                shelf.shelf_id.clone(),
                shelf.product.clone(),
                shelf.count.to_string(),
                shelf.status.to_uppercase(),
                shelf.distance.to_string(),
                shelf.weight.to_string(),
            ])
            .style(Style::default().fg(status_color(&shelf.status)))
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(8),  // Shelf
            Constraint::Length(20), // Product
            Constraint::Length(7),  // Count
            Constraint::Length(8),  // Status
            Constraint::Length(10), // Distance
            Constraint::Length(10), // Weight
        ],
    )
    .header(
        Row::new(vec!["Shelf", "Product", "Count", "Status", "Distance", "Weight"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
    )
    .block(
        Block::default()
            .title(" Shelves ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );

    f.render_widget(table, area);
}

fn draw_alert_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let items: Vec<ListItem> = state
        .alerts
        .iter()
        .map(|a| {
            let color = if a.severity == "high" { Color::Red } else { Color::Yellow };
            // HH:MM:SS out of the RFC 3339 timestamp
            let time = a.timestamp.get(11..19).unwrap_or(&a.timestamp);
            ListItem::new(Line::from(vec![
                Span::styled(format!("{time} "), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("{} ", a.title), Style::default().fg(color)),
                Span::raw(a.message.clone()),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Alerts ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(list, area);
}

fn draw_theft_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let items: Vec<ListItem> = state
        .thefts
        .iter()
        .rev()
        .map(|t| {
            let time = t.timestamp.get(11..19).unwrap_or(&t.timestamp);
            let short_id = t.sale_id.get(..8).unwrap_or(&t.sale_id);
            ListItem::new(Line::from(vec![
                Span::styled("✗ ", Style::default().fg(Color::Red)),
                Span::raw(format!("{time} {} x{} ", t.shelf_id, t.items_removed)),
                Span::styled(
                    format!("{} ({short_id})", t.product_name),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(format!(" Potential Thefts ({}) ", state.thefts.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );
    f.render_widget(list, area);
}

fn draw_sales_panel(f: &mut Frame, area: Rect, state: &DashboardState) {
    let last = state
        .sales
        .last_sale
        .as_deref()
        .and_then(|ts| ts.get(11..19))
        .unwrap_or("-")
        .to_string();

    let lines = vec![
        Line::from(vec![Span::raw("Pending:   "), Span::styled(state.sales.total_sales.to_string(), Style::default().fg(Color::Cyan))]),
        Line::from(vec![Span::raw("Last hour: "), Span::raw(state.sales.hourly_rate.to_string())]),
        Line::from(vec![Span::raw("Last day:  "), Span::raw(state.sales.daily_rate.to_string())]),
        Line::from(vec![Span::raw("Last sale: "), Span::raw(last)]),
    ];

    let panel = Paragraph::new(lines).block(
        Block::default()
            .title(" Sales ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(panel, area);
}
