use crate::db::repository;
use crate::error::{AppError, AppResult};
use crate::models::transaction::Transaction;
use crate::money::format_money;
use crate::operations::budget::{BudgetHealth, BudgetStatus};
use crate::operations::report::{category_label, category_names};
use crate::operations::savings::GoalProgress;
use chrono::{Duration, NaiveDate};
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::{Alignment, Color, Constraint, Direction, Layout, Modifier, Rect, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::canvas::{Canvas, Points};
use ratatui::widgets::{Block, Borders, Paragraph};
use rusqlite::Connection;
use std::collections::HashMap;
use std::io;

/// Everything the dashboard shows besides the spending chart, computed by the
/// caller for the chosen scenario and goals.
pub struct DashboardPanels {
    pub budget_health: Vec<BudgetHealth>,
    pub savings: Vec<GoalProgress>,
    pub currency_symbol: String,
}

struct SpendingData {
    buckets: Vec<Bucket>,
    category_totals: Vec<(String, i64)>,
    category_colors: HashMap<String, Color>,
    total_spend: i64,
}

struct Bucket {
    start: NaiveDate,
    end: NaiveDate,
    totals: Vec<(String, i64)>,
    total: i64,
}

fn terminal_error(action: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Terminal(format!("Failed to {}: {}", action, e))
}

/// Bucket width in days: daily for a week, weekly up to a quarter,
/// fortnightly up to a year, else about twenty buckets.
fn bucket_days_for(total_days: i64) -> i64 {
    if total_days <= 7 {
        1
    } else if total_days <= 90 {
        7
    } else if total_days <= 365 {
        14
    } else {
        (total_days + 19) / 20
    }
}

pub fn run_dashboard(
    conn: &Connection,
    start_date: NaiveDate,
    end_date: NaiveDate,
    panels: &DashboardPanels,
) -> AppResult<()> {
    if start_date > end_date {
        return Err(AppError::validation("Start date must be before end date."));
    }

    let total_days = (end_date - start_date).num_days() + 1;
    let bucket_days = bucket_days_for(total_days);
    let title = format!(
        "{} - {} ({}-day buckets)",
        start_date.format("%d.%m.%Y"),
        end_date.format("%d.%m.%Y"),
        bucket_days
    );

    let expenses = repository::get_expense_transactions_in_range(conn, start_date, end_date)?;
    let names = category_names(conn)?;
    let data = build_spending(&expenses, &names, start_date, end_date, total_days, bucket_days);

    render(&title, &data, panels)
}

fn build_spending(
    transactions: &[Transaction],
    names: &HashMap<String, String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_days: i64,
    bucket_days: i64,
) -> SpendingData {
    let bucket_count = (total_days.max(1) as usize).div_ceil(bucket_days as usize).max(1);

    let mut bucket_maps: Vec<HashMap<String, i64>> = vec![HashMap::new(); bucket_count];
    let mut category_totals: HashMap<String, i64> = HashMap::new();

    for transaction in transactions {
        let idx = bucket_index(start_date, transaction.date, bucket_days, bucket_count);
        let category = category_label(names, transaction);
        *bucket_maps[idx].entry(category.clone()).or_insert(0) += transaction.amount_cents;
        *category_totals.entry(category).or_insert(0) += transaction.amount_cents;
    }

    let mut categories: Vec<String> = category_totals.keys().cloned().collect();
    categories.sort();
    let category_colors = assign_colors(&categories);

    let buckets = bucket_maps
        .into_iter()
        .enumerate()
        .map(|(i, map)| {
            let start = start_date + Duration::days(i as i64 * bucket_days);
            let end = (start + Duration::days(bucket_days - 1)).min(end_date);
            let mut totals: Vec<(String, i64)> = map.into_iter().collect();
            totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let total = totals.iter().map(|(_, v)| v).sum();
            Bucket {
                start,
                end,
                totals,
                total,
            }
        })
        .collect();

    let mut category_totals: Vec<(String, i64)> = category_totals.into_iter().collect();
    category_totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let total_spend = category_totals.iter().map(|(_, v)| v).sum();

    SpendingData {
        buckets,
        category_totals,
        category_colors,
        total_spend,
    }
}

fn bucket_index(start_date: NaiveDate, date: NaiveDate, bucket_days: i64, bucket_count: usize) -> usize {
    if date < start_date {
        return 0;
    }
    let idx = ((date - start_date).num_days() / bucket_days) as usize;
    idx.min(bucket_count.saturating_sub(1))
}

fn assign_colors(categories: &[String]) -> HashMap<String, Color> {
    const PALETTE: [Color; 11] = [
        Color::Cyan,
        Color::Magenta,
        Color::Yellow,
        Color::Green,
        Color::Blue,
        Color::Red,
        Color::LightCyan,
        Color::LightMagenta,
        Color::LightYellow,
        Color::LightGreen,
        Color::LightBlue,
    ];
    categories
        .iter()
        .enumerate()
        .map(|(idx, category)| (category.clone(), PALETTE[idx % PALETTE.len()]))
        .collect()
}

fn render(title: &str, data: &SpendingData, panels: &DashboardPanels) -> AppResult<()> {
    enable_raw_mode().map_err(|e| terminal_error("enable raw mode", e))?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).map_err(|e| terminal_error("enter alternate screen", e))?;

    let result = event_loop(title, data, panels);

    disable_raw_mode().map_err(|e| terminal_error("disable raw mode", e))?;
    execute!(io::stdout(), LeaveAlternateScreen).map_err(|e| terminal_error("leave alternate screen", e))?;

    result
}

fn event_loop(title: &str, data: &SpendingData, panels: &DashboardPanels) -> AppResult<()> {
    let backend = ratatui::backend::CrosstermBackend::new(io::stdout());
    let mut terminal = ratatui::Terminal::new(backend).map_err(|e| terminal_error("initialize terminal", e))?;

    loop {
        terminal
            .draw(|frame| {
                let rows = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                    .split(frame.area());

                render_bar_chart(frame, rows[0], title, data);

                let bottom = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([
                        Constraint::Percentage(30),
                        Constraint::Percentage(30),
                        Constraint::Percentage(40),
                    ])
                    .split(rows[1]);
                render_pie_chart(frame, bottom[0], data);
                render_category_table(frame, bottom[1], data, &panels.currency_symbol);

                let side = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
                    .split(bottom[2]);
                render_budget_health(frame, side[0], panels);
                render_savings(frame, side[1], panels);
            })
            .map_err(|e| terminal_error("draw terminal UI", e))?;

        if event::poll(std::time::Duration::from_millis(250)).map_err(|e| terminal_error("poll input", e))? {
            match event::read().map_err(|e| terminal_error("read input", e))? {
                Event::Key(key) if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) => break,
                _ => {}
            }
        }
    }
    Ok(())
}

fn render_bar_chart(frame: &mut ratatui::Frame, area: Rect, title: &str, data: &SpendingData) {
    let inner = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(area);

    let block = Block::default()
        .title(Line::from(vec![Span::styled(
            format!("{}  (press q to exit)", title),
            Style::default().fg(Color::White),
        )]))
        .borders(Borders::ALL);
    let chart_area = block.inner(inner[0]);
    frame.render_widget(block, inner[0]);

    let bar_height = chart_area.height.saturating_sub(1) as usize;
    if bar_height == 0 || data.buckets.is_empty() {
        return;
    }

    let bucket_width = std::cmp::max(1, chart_area.width as usize / data.buckets.len());
    let max_total = data.buckets.iter().map(|b| b.total).max().unwrap_or(0).max(1) as f64;

    let mut lines: Vec<Line> = Vec::new();
    for row in 0..bar_height {
        let level = bar_height - row;
        let mut spans: Vec<Span> = Vec::new();

        for bucket in &data.buckets {
            let scaled_height = (bucket.total as f64 / max_total * bar_height as f64).ceil() as usize;
            if bucket.total <= 0 || level > scaled_height {
                spans.push(Span::raw(" ".repeat(bucket_width)));
                continue;
            }

            let mut stacked = 0usize;
            let mut color = Color::DarkGray;
            for (category, height) in category_heights(&bucket.totals, bucket.total, scaled_height) {
                stacked += height;
                if level <= stacked {
                    color = data.category_colors.get(&category).copied().unwrap_or(Color::White);
                    break;
                }
            }
            spans.push(Span::styled("█".repeat(bucket_width), Style::default().fg(color)));
        }
        lines.push(Line::from(spans));
    }
    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Left), chart_area);

    let labels = bucket_labels(&data.buckets, chart_area.width as usize, bucket_width);
    frame.render_widget(Paragraph::new(labels).alignment(Alignment::Left), inner[1]);
}

fn bucket_labels(buckets: &[Bucket], width: usize, bucket_width: usize) -> Vec<Line<'static>> {
    if bucket_width < 4 {
        return vec![Line::from(" ".repeat(width))];
    }
    let spans: Vec<Span> = buckets
        .iter()
        .map(|bucket| {
            let mut label = bucket.start.format("%m-%d").to_string();
            label.truncate(bucket_width);
            Span::raw(format!("{:width$}", label, width = bucket_width))
        })
        .collect();
    vec![Line::from(spans)]
}

/// Splits `bar_height` rows between categories by largest remainder.
fn category_heights(totals: &[(String, i64)], bucket_total: i64, bar_height: usize) -> Vec<(String, usize)> {
    if bucket_total <= 0 {
        return totals.iter().map(|(c, _)| (c.clone(), 0)).collect();
    }

    let mut heights: Vec<(String, usize, f64)> = totals
        .iter()
        .map(|(c, v)| {
            let exact = *v as f64 / bucket_total as f64 * bar_height as f64;
            let floor = exact.floor() as usize;
            (c.clone(), floor, exact - floor as f64)
        })
        .collect();

    let used: usize = heights.iter().map(|(_, h, _)| *h).sum();
    let mut remaining = bar_height.saturating_sub(used);
    heights.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    for entry in heights.iter_mut() {
        if remaining == 0 {
            break;
        }
        entry.1 += 1;
        remaining -= 1;
    }

    heights.into_iter().map(|(c, h, _)| (c, h)).collect()
}

fn render_pie_chart(frame: &mut ratatui::Frame, area: Rect, data: &SpendingData) {
    let block = Block::default().title("Category Share").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if data.total_spend <= 0 {
        frame.render_widget(Paragraph::new("No expenses in this range").alignment(Alignment::Center), inner);
        return;
    }

    let total = data.total_spend as f64;
    let mut slices = Vec::new();
    let mut start_angle = 0.0_f64;
    for (category, amount) in &data.category_totals {
        let sweep = *amount as f64 / total * std::f64::consts::TAU;
        slices.push((start_angle, start_angle + sweep, category.clone()));
        start_angle += sweep;
    }

    let canvas = Canvas::default()
        .x_bounds([-1.0, 1.0])
        .y_bounds([-1.0, 1.0])
        .paint(|ctx| {
            for (start, end, category) in &slices {
                let color = data.category_colors.get(category).copied().unwrap_or(Color::White);
                let mut points = Vec::new();
                let mut r = 0.0;
                while r <= 1.0 {
                    let mut angle = *start;
                    while angle <= *end {
                        points.push((r * angle.cos(), r * angle.sin()));
                        angle += 0.05;
                    }
                    r += 0.04;
                }
                if !points.is_empty() {
                    ctx.draw(&Points { coords: &points, color });
                }
            }
        });
    frame.render_widget(canvas, inner);
}

fn bold_white() -> Style {
    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
}

fn render_category_table(frame: &mut ratatui::Frame, area: Rect, data: &SpendingData, symbol: &str) {
    let block = Block::default().title("Category Spend").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if data.category_totals.is_empty() {
        frame.render_widget(Paragraph::new("No expenses in this range").alignment(Alignment::Center), inner);
        return;
    }

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{:15}", "Category"), bold_white()),
        Span::raw("  "),
        Span::styled(format!("{:>12}", "Amount"), bold_white()),
    ])];
    for (category, amount) in &data.category_totals {
        let style = Style::default().fg(data.category_colors.get(category).copied().unwrap_or(Color::White));
        lines.push(Line::from(vec![
            Span::styled(format!("{:15}", category), style),
            Span::raw("  "),
            Span::styled(format!("{:>12}", format_money(*amount, symbol)), style),
        ]));
    }
    frame.render_widget(Paragraph::new(lines), inner);
}

fn status_color(status: BudgetStatus) -> Color {
    match status {
        BudgetStatus::Under => Color::Green,
        BudgetStatus::Near => Color::Yellow,
        BudgetStatus::Over => Color::Red,
    }
}

fn render_budget_health(frame: &mut ratatui::Frame, area: Rect, panels: &DashboardPanels) {
    let block = Block::default().title("Budget Health").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if panels.budget_health.is_empty() {
        frame.render_widget(Paragraph::new("No budgets set").alignment(Alignment::Center), inner);
        return;
    }
    let lines: Vec<Line> = panels
        .budget_health
        .iter()
        .map(|item| {
            Line::from(vec![
                Span::raw(format!("{:15}", item.category_name)),
                Span::styled(
                    format!(
                        "{:>6}% {}/{}",
                        item.percent_used,
                        format_money(item.spent_cents, &panels.currency_symbol),
                        format_money(item.rule.amount_cents, &panels.currency_symbol)
                    ),
                    Style::default().fg(status_color(item.status)),
                ),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_savings(frame: &mut ratatui::Frame, area: Rect, panels: &DashboardPanels) {
    let block = Block::default().title("Savings Goals").borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if panels.savings.is_empty() {
        frame.render_widget(Paragraph::new("No savings goals").alignment(Alignment::Center), inner);
        return;
    }
    let lines: Vec<Line> = panels
        .savings
        .iter()
        .map(|item| {
            let style = if item.goal.is_emergency_fund {
                Style::default().fg(Color::LightCyan)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{:15}", item.goal.name), style),
                Span::raw(format!(
                    "{:>6}% of {}",
                    item.percent_complete,
                    format_money(item.goal.target_amount_cents, &panels.currency_symbol)
                )),
            ])
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::TransactionType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn expense(day: NaiveDate, category: &str, cents: i64) -> Transaction {
        Transaction::new(format!("{}-{}", day, category), day, "x".to_string(), cents, TransactionType::Expense)
            .with_category(category)
    }

    #[test]
    fn test_bucket_days_for_ranges() {
        assert_eq!(bucket_days_for(5), 1);
        assert_eq!(bucket_days_for(31), 7);
        assert_eq!(bucket_days_for(365), 14);
        assert_eq!(bucket_days_for(730), 37);
    }

    #[test]
    fn test_build_spending_buckets_and_totals() {
        let names: HashMap<String, String> =
            [("food".to_string(), "Food".to_string()), ("fun".to_string(), "Fun".to_string())].into();
        let transactions = vec![
            expense(date(2025, 1, 1), "food", 1000),
            expense(date(2025, 1, 9), "fun", 3000),
            expense(date(2025, 1, 10), "food", 500),
        ];
        let data = build_spending(&transactions, &names, date(2025, 1, 1), date(2025, 1, 14), 14, 7);

        assert_eq!(data.buckets.len(), 2);
        assert_eq!(data.buckets[0].total, 1000);
        assert_eq!(data.buckets[1].total, 3500);
        assert_eq!(data.buckets[1].end, date(2025, 1, 14));
        assert_eq!(data.category_totals[0], ("Fun".to_string(), 3000));
        assert_eq!(data.total_spend, 4500);
        assert_ne!(data.category_colors["Food"], data.category_colors["Fun"]);
    }

    #[test]
    fn test_category_heights_fill_bar() {
        let totals = vec![("a".to_string(), 2), ("b".to_string(), 1)];
        let heights = category_heights(&totals, 3, 10);
        assert_eq!(heights.iter().map(|(_, h)| h).sum::<usize>(), 10);
    }

    #[test]
    fn test_bucket_index_clamps() {
        assert_eq!(bucket_index(date(2025, 1, 1), date(2024, 12, 31), 7, 3), 0);
        assert_eq!(bucket_index(date(2025, 1, 1), date(2025, 3, 1), 7, 3), 2);
    }
}
