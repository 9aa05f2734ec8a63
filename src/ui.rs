use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use typetrail::evaluator::Outcome;
use typetrail::session::LifecycleState;
use unicode_width::UnicodeWidthStr;

use crate::App;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 2;
const STATUS_ROWS: u16 = 3;

struct Styles {
    bold: Style,
    green_bold: Style,
    red_bold: Style,
    dim_bold: Style,
    underlined_dim_bold: Style,
    italic: Style,
    status: Style,
}

impl Styles {
    fn new() -> Self {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let dim_bold = Style::default().patch(bold).add_modifier(Modifier::DIM);
        Self {
            bold,
            green_bold: Style::default().patch(bold).fg(Color::Green),
            red_bold: Style::default().patch(bold).fg(Color::Red),
            dim_bold,
            underlined_dim_bold: Style::default()
                .patch(dim_bold)
                .add_modifier(Modifier::UNDERLINED),
            italic: Style::default().add_modifier(Modifier::ITALIC),
            status: Style::default()
                .fg(Color::Gray)
                .add_modifier(Modifier::ITALIC),
        }
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let styles = Styles::new();
        if let Some(draft) = &self.participant_draft {
            render_participant_prompt(draft, &styles, area, buf);
        } else if self.engine.lifecycle().state().is_terminal() {
            render_results(self, &styles, area, buf);
        } else {
            render_typing(self, &styles, area, buf);
        }
    }
}

fn header_line(app: &App) -> String {
    let ctx = app.engine.ctx();
    let session = app.engine.lifecycle().session();
    format!(
        "{} · participant: {} · session {}",
        session.mode,
        ctx.participant.as_deref().unwrap_or("-"),
        session.reference()
    )
}

fn status_widget<'a>(app: &'a App, styles: &Styles) -> Paragraph<'a> {
    let lines = app
        .engine
        .status()
        .latest(STATUS_ROWS as usize)
        .iter()
        .map(|l| Line::from(Span::styled(l.as_str(), styles.status)))
        .collect::<Vec<Line>>();
    Paragraph::new(lines)
}

fn sentence_spans<'a>(target: &str, input: &str, outcomes: &[Outcome], styles: &Styles) -> Vec<Span<'a>> {
    let target_chars: Vec<char> = target.chars().collect();
    let mut spans = input
        .chars()
        .zip(outcomes)
        .enumerate()
        .map(|(idx, (typed, outcome))| match outcome {
            Outcome::Incorrect => Span::styled(
                match typed {
                    ' ' => "·".to_owned(),
                    c => c.to_string(),
                },
                styles.red_bold,
            ),
            Outcome::Correct => Span::styled(target_chars[idx].to_string(), styles.green_bold),
        })
        .collect::<Vec<Span>>();

    let cursor = outcomes.len().min(target_chars.len());
    if let Some(c) = target_chars.get(cursor) {
        spans.push(Span::styled(c.to_string(), styles.underlined_dim_bold));
    }
    let rest: String = target_chars.iter().skip(cursor + 1).collect();
    if !rest.is_empty() {
        spans.push(Span::styled(rest, styles.dim_bold));
    }
    spans
}

fn render_typing(app: &App, styles: &Styles, area: Rect, buf: &mut Buffer) {
    let lifecycle = app.engine.lifecycle();
    let target = lifecycle.current_target().unwrap_or_default();

    let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
    let prompt_lines = if target.width() <= max_chars_per_line as usize {
        1
    } else {
        ((target.width() as f64 / max_chars_per_line as f64).ceil() + 1.0) as u16
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Length(1),            // header
                Constraint::Min(1),               // padding
                Constraint::Length(2),            // countdown
                Constraint::Length(prompt_lines), // sentence
                Constraint::Length(2),            // progress and live metrics
                Constraint::Min(1),               // padding
                Constraint::Length(STATUS_ROWS),  // status line
                Constraint::Length(1),            // legend
            ]
            .as_ref(),
        )
        .split(area);

    Paragraph::new(Span::styled(header_line(app), styles.italic))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let countdown = if lifecycle.state() == LifecycleState::Idle {
        format!("{}s · start typing to begin", lifecycle.timer().remaining_secs())
    } else {
        format!("{}s", lifecycle.timer().remaining_secs())
    };
    Paragraph::new(Span::styled(countdown, styles.dim_bold))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    let spans = sentence_spans(target, lifecycle.input(), &lifecycle.outcomes(), styles);
    Paragraph::new(Line::from(spans))
        .alignment(if prompt_lines == 1 {
            Alignment::Center
        } else {
            Alignment::Left
        })
        .wrap(Wrap { trim: true })
        .render(chunks[3], buf);

    let snapshot = app.engine.snapshot();
    let sequencer = lifecycle.sequencer();
    let progress = format!(
        "sentence {}/{}   {} wpm   {}% acc   {} errors",
        (sequencer.current_index() + 1).min(sequencer.len()),
        sequencer.len(),
        snapshot.wpm,
        snapshot.accuracy,
        snapshot.errors
    );
    Paragraph::new(Span::styled(progress, styles.bold))
        .alignment(Alignment::Center)
        .render(chunks[4], buf);

    status_widget(app, styles).render(chunks[6], buf);

    Paragraph::new(Span::styled(
        "(tab) start / (^r) reset / (^e) export log / (^p) participant / (esc)ape",
        styles.italic,
    ))
    .render(chunks[7], buf);
}

fn render_results(app: &App, styles: &Styles, area: Rect, buf: &mut Buffer) {
    let lifecycle = app.engine.lifecycle();
    let snapshot = app.engine.snapshot();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints(
            [
                Constraint::Length(1),           // header
                Constraint::Length(1),           // outcome
                Constraint::Length(1),           // stats
                Constraint::Length(1),           // padding
                Constraint::Min(1),              // attempts
                Constraint::Length(STATUS_ROWS), // status line
                Constraint::Length(1),           // legend
            ]
            .as_ref(),
        )
        .split(area);

    Paragraph::new(Span::styled(header_line(app), styles.italic))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    let outcome = match lifecycle.state() {
        LifecycleState::Completed => "all sentences done",
        _ => "time up",
    };
    Paragraph::new(Span::styled(
        format!(
            "{outcome} · {}/{} sentences",
            lifecycle.sequencer().completed(),
            lifecycle.sequencer().len()
        ),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    Paragraph::new(Span::styled(
        format!(
            "{} wpm   {} cpm   {}% acc   {} errors   {:.1}s",
            snapshot.wpm, snapshot.cpm, snapshot.accuracy, snapshot.errors, snapshot.elapsed_secs
        ),
        styles.bold,
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    let attempts = lifecycle
        .session()
        .attempts
        .iter()
        .map(|a| {
            let style = if a.errors == 0 {
                styles.green_bold
            } else {
                styles.red_bold
            };
            Line::from(vec![
                Span::styled(a.typed.clone(), style),
                Span::styled(format!("  ({} errors)", a.errors), styles.dim_bold),
            ])
        })
        .collect::<Vec<Line>>();
    Paragraph::new(attempts)
        .wrap(Wrap { trim: true })
        .render(chunks[4], buf);

    status_widget(app, styles).render(chunks[5], buf);

    Paragraph::new(Span::styled(
        "(r)eset / (e)xport log / (s)ummary export / (p)articipant / (esc)ape",
        styles.italic,
    ))
    .render(chunks[6], buf);
}

fn render_participant_prompt(draft: &str, styles: &Styles, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    Paragraph::new(Line::from(vec![
        Span::styled("participant: ", styles.bold),
        Span::styled(draft.to_string(), styles.green_bold),
        Span::styled(" ", styles.underlined_dim_bold),
    ]))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    Paragraph::new(Span::styled("(enter) save / (esc) cancel", styles.italic))
        .alignment(Alignment::Center)
        .render(chunks[2], buf);
}
