use anyhow::Result;
use commander_tierlist::{
    AggregateResult, Fingerprinter, RankableUnit, SummaryStats, Tier, TierListClient, TierStore,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    MyTierList,
    Community,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::MyTierList => Page::Community,
            Page::Community => Page::MyTierList,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::MyTierList => "My Tier List",
            Page::Community => "Community Consensus",
        }
    }
}

pub struct App<S: TierStore, F: Fingerprinter> {
    pub client: TierListClient<S, F>,
    pub current_page: Page,
    pub state: TableState,
    pub show_detail: bool,
    pub consensus: Option<(AggregateResult, SummaryStats)>,
    pub status: String,
    pub status_is_warning: bool,
}

impl<S: TierStore, F: Fingerprinter> App<S, F> {
    pub fn new(client: TierListClient<S, F>) -> Self {
        let mut state = TableState::default();
        if client.state().total_units() > 0 {
            state.select(Some(0));
        }

        let status = if client.is_returning_visitor() {
            "Welcome back! Your previous rankings were restored.".to_string()
        } else {
            "Use 1-6 to place the selected commander.".to_string()
        };

        Self {
            client,
            current_page: Page::MyTierList,
            state,
            show_detail: false,
            consensus: None,
            status,
            status_is_warning: false,
        }
    }

    /// Every unit in tier order, as rendered
    pub fn rows(&self) -> Vec<(Tier, RankableUnit)> {
        Tier::ALL
            .iter()
            .flat_map(|tier| {
                self.client
                    .state()
                    .units_in(*tier)
                    .iter()
                    .map(move |unit| (*tier, *unit))
            })
            .collect()
    }

    pub fn selected_unit(&self) -> Option<RankableUnit> {
        let rows = self.rows();
        self.state
            .selected()
            .and_then(|i| rows.get(i))
            .map(|(_, unit)| *unit)
    }

    /// Keyboard drag: move the selected unit and keep it selected
    pub fn move_selected(&mut self, tier: Tier) {
        let Some(unit) = self.selected_unit() else {
            return;
        };
        let label = self.client.catalog().describe(&unit);

        match self.client.move_to(unit, tier) {
            Ok(report) => {
                match report.warning {
                    Some(warning) => {
                        self.status = format!("{} → {} (not synced: {})", label, tier, warning);
                        self.status_is_warning = warning.is_user_visible();
                    }
                    None => {
                        self.status = format!("{} → {}", label, tier);
                        self.status_is_warning = false;
                    }
                }
                let position = self.rows().iter().position(|(_, u)| *u == unit);
                self.state.select(position);
                self.consensus = None;
            }
            Err(rejected) => {
                self.status = format!("{}: {}", label, rejected);
                self.status_is_warning = false;
            }
        }
    }

    pub fn submit_all(&mut self) {
        match self.client.submit_all() {
            Ok(rows) => {
                self.status = format!("Submitted {} rankings", rows);
                self.status_is_warning = false;
            }
            Err(e) => {
                self.status = format!("Submit failed: {}", e);
                self.status_is_warning = true;
            }
        }
    }

    pub fn refresh_consensus(&mut self) {
        let computed = self
            .client
            .consensus()
            .and_then(|result| self.client.summary().map(|stats| (result, stats)));

        match computed {
            Ok(pair) => self.consensus = Some(pair),
            Err(e) => {
                self.status = format!("Could not load consensus: {}", e);
                self.status_is_warning = true;
            }
        }
    }

    pub fn toggle_detail(&mut self) {
        self.show_detail = !self.show_detail;
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        if self.current_page == Page::Community && self.consensus.is_none() {
            self.refresh_consensus();
        }
    }

    pub fn next(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }
}

pub fn run_ui<S: TierStore, F: Fingerprinter>(app: &mut App<S, F>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

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

fn run_app<B: ratatui::backend::Backend, S: TierStore, F: Fingerprinter>(
    terminal: &mut Terminal<B>,
    app: &mut App<S, F>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Tab => app.next_page(),
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Char('r') if app.current_page == Page::Community => {
                    app.refresh_consensus()
                }
                KeyCode::Char('s') if app.current_page == Page::MyTierList => app.submit_all(),
                KeyCode::Char(c @ '1'..='6') if app.current_page == Page::MyTierList => {
                    let index = c as usize - '1' as usize;
                    if let Some(tier) = Tier::from_index(index) {
                        app.move_selected(tier);
                    }
                }
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Home => app.state.select(Some(0)),
                _ => {}
            }
        }
    }
}

fn ui<S: TierStore, F: Fingerprinter>(f: &mut Frame, app: &mut App<S, F>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::MyTierList if app.show_detail => {
            let content_chunks = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);

            render_my_list(f, content_chunks[0], app);
            render_detail_panel(f, content_chunks[1], app);
        }
        Page::MyTierList => render_my_list(f, chunks[1], app),
        Page::Community => render_community(f, chunks[1], app),
    }

    render_status_bar(f, chunks[2], app);
}

fn tier_color(tier: Tier) -> Color {
    match tier {
        Tier::T1 => Color::Magenta,
        Tier::T2 => Color::Red,
        Tier::T3 => Color::Yellow,
        Tier::T4 => Color::Green,
        Tier::T5 => Color::Blue,
        Tier::Unranked => Color::DarkGray,
    }
}

fn render_header<S: TierStore, F: Fingerprinter>(f: &mut Frame, area: Rect, app: &App<S, F>) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::MyTierList, Page::Community].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    for tier in Tier::ALL {
        let count = app.client.state().units_in(tier).len();
        tab_spans.push(Span::styled(
            format!("{} {}  ", tier.code(), count),
            Style::default().fg(tier_color(tier)),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });
    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn render_my_list<S: TierStore, F: Fingerprinter>(f: &mut Frame, area: Rect, app: &mut App<S, F>) {
    let catalog = app.client.catalog().clone();

    let rows: Vec<Row> = app
        .rows()
        .into_iter()
        .map(|(tier, unit)| {
            let faction = catalog
                .commander(unit.commander_id)
                .map(|c| c.faction.as_str())
                .unwrap_or("");
            Row::new(vec![
                Cell::from(tier.display_name()).style(Style::default().fg(tier_color(tier))),
                Cell::from(truncate(&catalog.describe(&unit), 40)),
                Cell::from(faction),
            ])
            .height(1)
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(42),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Tier", "Commander", "Faction"]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(" Your Rankings "),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_community<S: TierStore, F: Fingerprinter>(f: &mut Frame, area: Rect, app: &App<S, F>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(" Community Consensus ");

    let Some((result, stats)) = &app.consensus else {
        f.render_widget(Paragraph::new("  Loading consensus...").block(block), area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let catalog = app.client.catalog();
    let name_of = |unit: Option<RankableUnit>| {
        unit.map(|u| catalog.describe(&u))
            .unwrap_or_else(|| "N/A".to_string())
    };

    let stats_line = Line::from(vec![
        Span::styled("  Submissions: ", Style::default().fg(Color::Cyan)),
        Span::raw(stats.total_submissions.to_string()),
        Span::raw("  |  "),
        Span::styled("Highest: ", Style::default().fg(Color::Cyan)),
        Span::styled(name_of(stats.top_unit), Style::default().fg(Color::Green)),
        Span::raw("  |  "),
        Span::styled("Lowest: ", Style::default().fg(Color::Cyan)),
        Span::styled(name_of(stats.bottom_unit), Style::default().fg(Color::Red)),
    ]);
    f.render_widget(
        Paragraph::new(stats_line).block(Block::default().borders(Borders::ALL)),
        chunks[0],
    );

    let rows: Vec<Row> = result
        .entries(catalog)
        .into_iter()
        .map(|entry| {
            Row::new(vec![
                Cell::from(entry.tier.display_name())
                    .style(Style::default().fg(tier_color(entry.tier))),
                Cell::from(truncate(&entry.commander_name, 40)),
                Cell::from(format!("{}/{}", entry.votes, entry.total_votes)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(42),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Tier", "Commander", "Votes"]))
    .block(block);

    f.render_widget(table, chunks[1]);
}

fn render_status_bar<S: TierStore, F: Fingerprinter>(f: &mut Frame, area: Rect, app: &App<S, F>) {
    let status_color = if app.status_is_warning {
        Color::Red
    } else {
        Color::Green
    };

    let mut status_spans = vec![
        Span::styled(format!(" {} ", app.status), Style::default().fg(status_color)),
        Span::raw(" | "),
    ];

    match app.current_page {
        Page::MyTierList => {
            status_spans.push(Span::styled("1-6", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Place | "));
            status_spans.push(Span::styled("s", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Submit all | "));
            status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Details | "));
        }
        Page::Community => {
            status_spans.push(Span::styled("r", Style::default().fg(Color::Yellow)));
            status_spans.push(Span::raw(" Refresh | "));
        }
    }

    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Page | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn render_detail_panel<S: TierStore, F: Fingerprinter>(f: &mut Frame, area: Rect, app: &App<S, F>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Commander Details ");

    let Some(unit) = app.selected_unit() else {
        f.render_widget(Paragraph::new("No commander selected").block(block), area);
        return;
    };

    let catalog = app.client.catalog();
    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let section = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD | Modifier::UNDERLINED);

    let mut content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Commander: ", label),
            Span::raw(catalog.describe(&unit)),
        ]),
    ];

    if let Some(commander) = catalog.commander(unit.commander_id) {
        content.push(Line::from(vec![
            Span::styled("  Faction: ", label),
            Span::raw(commander.faction.as_str()),
        ]));
    }

    if let Some(tier) = app.client.state().tier_of(&unit) {
        content.push(Line::from(vec![
            Span::styled("  Your tier: ", label),
            Span::styled(tier.display_name(), Style::default().fg(tier_color(tier))),
        ]));
    }

    if let Some(prestige) = catalog.prestige(&unit) {
        content.push(Line::from(""));
        content.push(Line::from(Span::styled("  ADVANTAGES", section)));
        content.push(Line::from(format!("  {}", wrap_text(&prestige.advantages, 35))));
        content.push(Line::from(""));
        content.push(Line::from(Span::styled("  DISADVANTAGES", section)));
        content.push(Line::from(format!("  {}", wrap_text(&prestige.disadvantages, 35))));
    }

    content.push(Line::from(""));
    content.push(Line::from(Span::styled(
        "  Press Enter to close",
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    )));

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if !current_line.is_empty() && current_line.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current_line));
        }
        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines.join("\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use commander_tierlist::{
        Catalog, Commander, DeviceInfo, Faction, IdentityResolver, KnownFingerprint,
        SessionContext, SqliteStore, SyncProtocol,
    };

    fn app() -> App<SqliteStore, KnownFingerprint> {
        let store = SqliteStore::open_in_memory().unwrap();
        let catalog = Catalog::new(vec![
            Commander::new(1, "Raynor", Faction::Terran, ""),
            Commander::new(2, "Zagara", Faction::Zerg, ""),
        ]);
        store.import_catalog(&catalog).unwrap();

        let client = TierListClient::load(
            store,
            IdentityResolver::new(
                KnownFingerprint(Some("fp-tui".to_string())),
                "tui",
                DeviceInfo::default(),
            ),
            SessionContext::ephemeral(),
            SyncProtocol::default(),
        )
        .unwrap();
        App::new(client)
    }

    #[test]
    fn test_keyboard_move_keeps_selection_on_unit() {
        let mut app = app();
        app.next();
        assert_eq!(app.selected_unit(), Some(RankableUnit::bare(2)));

        app.move_selected(Tier::T1);

        assert_eq!(app.rows()[0], (Tier::T1, RankableUnit::bare(2)));
        assert_eq!(app.selected_unit(), Some(RankableUnit::bare(2)));
        assert!(!app.status_is_warning);
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = app();
        app.previous();
        assert_eq!(app.state.selected(), Some(1));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[test]
    fn test_community_page_loads_consensus() {
        let mut app = app();
        app.move_selected(Tier::T3);
        app.next_page();

        let (result, stats) = app.consensus.as_ref().unwrap();
        assert_eq!(result.tier_of(&RankableUnit::bare(1)), Some(Tier::T3));
        assert_eq!(stats.total_submissions, 1);
    }

    #[test]
    fn test_wrap_and_truncate() {
        assert_eq!(wrap_text("one two three", 7), "one two\n  three");
        assert_eq!(truncate("Kerrigan (Queen of Blades)", 10), "Kerriga...");
        assert_eq!(truncate("Raynor", 10), "Raynor");
    }
}
