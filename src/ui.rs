use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot_manager::{InvoiceDetail, LotSnapshot, ParkingLot, Space, SqliteStore};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table},
    Frame, Terminal,
};
use std::io;

const MAX_PLATE_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Entry,
    Exit,
}

impl Mode {
    pub fn toggle(&self) -> Self {
        match self {
            Mode::Entry => Mode::Exit,
            Mode::Exit => Mode::Entry,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Mode::Entry => "Entry",
            Mode::Exit => "Exit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

impl StatusLevel {
    fn color(&self) -> Color {
        match self {
            StatusLevel::Info => Color::Cyan,
            StatusLevel::Success => Color::Green,
            StatusLevel::Error => Color::Red,
        }
    }
}

pub struct App {
    lot: ParkingLot<SqliteStore>,
    pub snapshot: LotSnapshot,
    pub input: String,
    pub mode: Mode,
    pub status: Option<(StatusLevel, String)>,
    pub last_invoice: Option<InvoiceDetail>,
}

impl App {
    pub fn new(lot: ParkingLot<SqliteStore>) -> Result<Self> {
        let snapshot = lot.allocation.snapshot()?;
        Ok(Self {
            lot,
            snapshot,
            input: String::new(),
            mode: Mode::Entry,
            status: None,
            last_invoice: None,
        })
    }

    pub fn refresh(&mut self) {
        match self.lot.allocation.snapshot() {
            Ok(snapshot) => self.snapshot = snapshot,
            Err(e) => self.set_status(StatusLevel::Error, format!("Refresh failed: {}", e)),
        }
    }

    pub fn toggle_mode(&mut self) {
        self.mode = self.mode.toggle();
    }

    /// Any printable character; plates are matched uppercased like the registry does
    pub fn push_char(&mut self, c: char) {
        if !c.is_control() && self.input.chars().count() < MAX_PLATE_LEN {
            self.input.extend(c.to_uppercase());
        }
    }

    pub fn pop_char(&mut self) {
        self.input.pop();
    }

    fn set_status(&mut self, level: StatusLevel, message: String) {
        self.status = Some((level, message));
    }

    /// Run the current mode's action for the typed plate
    pub fn submit(&mut self) {
        let plate = self.input.trim().to_string();
        if plate.is_empty() {
            self.set_status(StatusLevel::Error, "Type a plate first".to_string());
            return;
        }

        match self.mode {
            Mode::Entry => match self.lot.allocation.register_entry(&plate) {
                Ok(outcome) => {
                    let level = if outcome.is_parked() {
                        StatusLevel::Success
                    } else {
                        StatusLevel::Info
                    };
                    self.set_status(level, outcome.to_string());
                }
                Err(e) => self.set_status(StatusLevel::Error, format!("Error: {}", e)),
            },
            Mode::Exit => self.checkout(&plate),
        }

        self.input.clear();
        self.refresh();
    }

    fn checkout(&mut self, plate: &str) {
        let exit = match self.lot.allocation.register_exit(plate) {
            Ok(exit) => exit,
            Err(e) => {
                self.set_status(StatusLevel::Error, format!("Error: {}", e));
                return;
            }
        };

        let invoice = self
            .lot
            .billing
            .generate_invoice(&exit.plate)
            .and_then(|id| self.lot.billing.get_invoice(id));

        match invoice {
            Ok(Some(detail)) => {
                self.set_status(
                    StatusLevel::Success,
                    format!("{} Invoice #{} issued.", exit, detail.id),
                );
                self.last_invoice = Some(detail);
            }
            Ok(None) => self.set_status(
                StatusLevel::Error,
                format!("{} Invoice was issued but could not be read back.", exit),
            ),
            Err(e) => self.set_status(
                StatusLevel::Error,
                format!("{} Error generating invoice: {}", exit, e),
            ),
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return Ok(()),
                KeyCode::Tab => app.toggle_mode(),
                KeyCode::Enter => app.submit(),
                KeyCode::Backspace => app.pop_char(),
                KeyCode::F(5) => app.refresh(),
                KeyCode::Char(c) => app.push_char(c),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Grid + side panel
            Constraint::Length(3), // Plate input
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
        .split(chunks[1]);
    render_grid(f, body[0], app);

    let side = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(body[1]);
    render_wait_queue(f, side[0], app);
    render_invoice(f, side[1], app);

    render_input(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let snapshot = &app.snapshot;
    let spans = vec![
        Span::styled(
            "Parking Lot",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Occupied: {}/{}", snapshot.occupied(), snapshot.capacity()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Free: {}", snapshot.grid.free_count()),
            Style::default().fg(Color::Green),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Waiting: {}", snapshot.wait_queue.len()),
            Style::default().fg(Color::Magenta),
        ),
        Span::raw("  |  "),
        Span::styled(
            format!("Rate: {:.2}/min", app.lot.billing.rate_per_minute()),
            Style::default().fg(Color::DarkGray),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_grid(f: &mut Frame, area: Rect, app: &App) {
    let layout = app.snapshot.layout;

    let header_cells = std::iter::once(Cell::from(""))
        .chain((0..layout.columns).map(|c| {
            Cell::from(format!("C{}", c + 1)).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        }));
    let header = Row::new(header_cells).height(1).bottom_margin(1);

    let rows = (0..layout.rows).map(|row| {
        let label = Cell::from(format!("F{}", row + 1))
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        let cells = (0..layout.columns).map(|column| {
            match app.snapshot.grid.get(Space::new(row, column)) {
                Some(plate) => Cell::from(plate.to_string()).style(Style::default().fg(Color::Red)),
                None => Cell::from("·").style(Style::default().fg(Color::Green)),
            }
        });
        Row::new(std::iter::once(label).chain(cells)).height(1)
    });

    let widths: Vec<Constraint> = std::iter::once(Constraint::Length(4))
        .chain((0..layout.columns).map(|_| Constraint::Length(MAX_PLATE_LEN as u16 / 2 + 2)))
        .collect();

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Lot"));

    f.render_widget(table, area);
}

fn render_wait_queue(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .snapshot
        .wait_queue
        .iter()
        .enumerate()
        .map(|(i, plate)| ListItem::new(format!("{}. {}", i + 1, plate)))
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Waiting list")
            .border_style(Style::default().fg(Color::Magenta)),
    );
    f.render_widget(list, area);
}

fn render_invoice(f: &mut Frame, area: Rect, app: &App) {
    let lines = match &app.last_invoice {
        Some(inv) => vec![
            Line::from(Span::styled(
                format!("Invoice #{}", inv.id),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("Plate:  {}", inv.plate)),
            Line::from(format!("Owner:  {} ({})", inv.owner_name, inv.owner_id)),
            Line::from(format!("Space:  {}", inv.space.as_deref().unwrap_or("-"))),
            Line::from(format!("In:     {}", inv.entry_time)),
            Line::from(format!("Out:    {}", inv.exit_time.as_deref().unwrap_or("-"))),
            Line::from(format!("Time:   {:.2} min", inv.minutes)),
            Line::from(Span::styled(
                format!("Amount: ${:.2}", inv.amount),
                Style::default().fg(Color::Green),
            )),
        ],
        None => vec![Line::from(Span::styled(
            "No invoice yet",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Last invoice")
            .border_style(Style::default().fg(Color::Green)),
    );
    f.render_widget(panel, area);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let mode_color = match app.mode {
        Mode::Entry => Color::Green,
        Mode::Exit => Color::Red,
    };
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", app.mode.title()),
            Style::default().fg(Color::Black).bg(mode_color),
        ),
        Span::raw(" Plate: "),
        Span::styled(app.input.as_str(), Style::default().fg(Color::White)),
        Span::styled("_", Style::default().fg(Color::DarkGray)),
    ]);

    let input = Paragraph::new(vec![line]).block(Block::default().borders(Borders::ALL));
    f.render_widget(input, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some((level, message)) = &app.status {
        status_spans.push(Span::styled(
            format!(" {} ", message),
            Style::default().fg(level.color()),
        ));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Submit | "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Entry/Exit | "));
    status_spans.push(Span::styled("F5", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Refresh | "));
    status_spans.push(Span::styled("Esc", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}
