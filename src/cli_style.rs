use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Attribute, Color as CtColor, Stylize};
use unicode_width::UnicodeWidthStr;

use crate::catalog::{Card, CatalogSource, PageView};
use crate::playback::{PlayerState, PlayerStatus};
use crate::session::Capabilities;

// ═══════════════════════════════════════════════════════════════════════════════
// Clap Styles
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_styles() -> Styles {
    clap::builder::Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Magenta))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Magenta))),
        )
        .literal(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Color Palette
// ═══════════════════════════════════════════════════════════════════════════════

pub mod colors {
    use crossterm::style::Color;

    pub const VIOLET: Color = Color::Rgb {
        r: 167,
        g: 139,
        b: 250,
    };
    pub const PINK: Color = Color::Rgb {
        r: 244,
        g: 114,
        b: 182,
    };
    pub const GREEN: Color = Color::Rgb {
        r: 52,
        g: 211,
        b: 153,
    };
    pub const ORANGE: Color = Color::Rgb {
        r: 251,
        g: 146,
        b: 60,
    };
    pub const RED: Color = Color::Rgb {
        r: 248,
        g: 113,
        b: 113,
    };
    pub const DIM: Color = Color::Rgb {
        r: 128,
        g: 128,
        b: 128,
    };
    pub const WHITE: Color = Color::Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
}

pub mod box_chars {
    pub const ROUND_TOP_LEFT: &str = "╭";
    pub const ROUND_TOP_RIGHT: &str = "╮";
    pub const ROUND_BOTTOM_LEFT: &str = "╰";
    pub const ROUND_BOTTOM_RIGHT: &str = "╯";
    pub const HORIZONTAL: &str = "─";
    pub const VERTICAL: &str = "│";

    pub const PLAY: &str = "▶";
    pub const PAUSE: &str = "⏸";
    pub const STOP: &str = "■";
    pub const NOTE: &str = "♪";
    pub const BULLET: &str = "●";
    pub const BULLET_EMPTY: &str = "○";
    pub const CHECK: &str = "✓";
    pub const CROSS_MARK: &str = "✗";
    pub const BAR_FULL: &str = "━";
    pub const BAR_EMPTY: &str = "┄";
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status Indicators
// ═══════════════════════════════════════════════════════════════════════════════

pub fn print_success(message: &str) {
    println!(
        " {} {}",
        box_chars::CHECK.to_string().with(colors::GREEN).bold(),
        message.with(colors::GREEN)
    );
}

pub fn print_error(message: &str) {
    println!(
        " {} {}",
        box_chars::CROSS_MARK.to_string().with(colors::RED).bold(),
        message.with(colors::RED)
    );
}

pub fn print_warning(message: &str) {
    println!(
        " {} {}",
        "⚠".with(colors::ORANGE).bold(),
        message.with(colors::ORANGE)
    );
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        box_chars::BULLET.with(colors::VIOLET),
        format!("{}:", key).with(colors::DIM),
        value.with(colors::WHITE)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Layout helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Cut `text` to at most `width` columns, marking the cut with an ellipsis.
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

/// Left-align `text` in `width` columns.
pub fn pad(text: &str, width: usize) -> String {
    let text = truncate(text, width);
    let padding = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(padding))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cards
// ═══════════════════════════════════════════════════════════════════════════════

const CARD_WIDTH: usize = 34;

/// Plain text lines of one card, each exactly `CARD_WIDTH` columns wide.
pub fn card_lines(card: &Card) -> Vec<String> {
    let inner = CARD_WIDTH - 4;
    let mut lines = Vec::with_capacity(4);
    lines.push(format!(
        "{}{}{}",
        box_chars::ROUND_TOP_LEFT,
        box_chars::HORIZONTAL.repeat(CARD_WIDTH - 2),
        box_chars::ROUND_TOP_RIGHT
    ));

    let marker = if card.playable {
        box_chars::PLAY
    } else {
        " "
    };
    let title = format!("{} #{} {}", marker, card.index, card.title);
    let detail = match card.similarity {
        Some(similarity) => format!("{} · {:.1}%", card.singer, similarity),
        None => format!("{} · {}", card.singer, card.genre),
    };
    for body in [title, detail] {
        lines.push(format!(
            "{} {} {}",
            box_chars::VERTICAL,
            pad(&body, inner),
            box_chars::VERTICAL
        ));
    }

    lines.push(format!(
        "{}{}{}",
        box_chars::ROUND_BOTTOM_LEFT,
        box_chars::HORIZONTAL.repeat(CARD_WIDTH - 2),
        box_chars::ROUND_BOTTOM_RIGHT
    ));
    lines
}

/// Page header: source, query time and the "Showing" summary.
pub fn page_header(page: &PageView) -> String {
    match page.source {
        CatalogSource::Mapper => format!("Catalog · {}", page.summary),
        CatalogSource::SearchResults { query_time } => {
            format!("Results in {:.3}s · {}", query_time, page.summary)
        }
    }
}

/// `« 1 2 [3] 4 5 »`, with the arrows only where there is a page to go to.
pub fn pagination_line(page: &PageView) -> String {
    let mut parts = Vec::with_capacity(page.window.len() + 2);
    parts.push(if page.has_previous { "«" } else { " " }.to_string());
    for n in &page.window {
        if *n == page.page {
            parts.push(format!("[{}]", n));
        } else {
            parts.push(n.to_string());
        }
    }
    parts.push(if page.has_next { "»" } else { " " }.to_string());
    parts.join(" ")
}

pub fn print_page(page: &PageView, columns: usize) {
    println!();
    println!("  {}", page_header(page).with(colors::VIOLET).bold());

    if page.cards.is_empty() {
        println!(
            "  {} {}",
            box_chars::BULLET_EMPTY.with(colors::DIM),
            "Nothing to show".with(colors::DIM).attribute(Attribute::Italic)
        );
        return;
    }

    for row in page.cards.chunks(columns.max(1)) {
        let rendered: Vec<Vec<String>> = row.iter().map(card_lines).collect();
        for line in 0..rendered[0].len() {
            let joined = rendered
                .iter()
                .map(|lines| lines[line].as_str())
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {}", joined.with(colors::WHITE));
        }
    }

    if page.total_pages > 1 {
        println!("  {}", pagination_line(page).with(colors::PINK));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════════

const BAR_WIDTH: usize = 24;

pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!(
        "{}{}",
        box_chars::BAR_FULL.repeat(filled),
        box_chars::BAR_EMPTY.repeat(width - filled)
    )
}

/// One line describing the player: state, song, progress and volume.
pub fn transport_line(status: &PlayerStatus) -> String {
    let icon = match status.state {
        PlayerState::Playing => box_chars::PLAY,
        PlayerState::Paused => box_chars::PAUSE,
        PlayerState::Loading => box_chars::NOTE,
        PlayerState::Ready | PlayerState::Idle => box_chars::STOP,
    };
    let title = match &status.song {
        Some(song) => match &song.singer {
            Some(singer) => format!("{} · {}", song.title, singer),
            None => song.title.clone(),
        },
        None => "No song".to_string(),
    };
    format!(
        "{} {} {} {} / {} vol {:.0}%",
        icon,
        pad(&title, 28),
        progress_bar(status.fraction(), BAR_WIDTH),
        status.elapsed_label(),
        status.total_label(),
        status.volume * 100.0
    )
}

pub fn print_transport(status: &PlayerStatus) {
    let color: CtColor = match status.state {
        PlayerState::Playing => colors::GREEN,
        PlayerState::Paused => colors::ORANGE,
        _ => colors::DIM,
    };
    println!("  {}", transport_line(status).with(color));
}

pub fn print_capabilities(caps: &Capabilities) {
    let flag = |on: bool| {
        if on {
            box_chars::CHECK
        } else {
            box_chars::CROSS_MARK
        }
    };
    print_key_value("View", &caps.view.to_string());
    print_key_value(
        "Can",
        &format!(
            "dataset {}  query file {}  record {}  search {}  play {}",
            flag(caps.upload_dataset),
            flag(caps.upload_content),
            flag(caps.record),
            flag(caps.query),
            flag(caps.play)
        ),
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// Prompt, Welcome, Goodbye
// ═══════════════════════════════════════════════════════════════════════════════

pub fn get_prompt() -> String {
    format!(
        "{}{} ",
        box_chars::NOTE.with(colors::PINK).bold(),
        "❯".with(colors::VIOLET).bold(),
    )
}

pub fn print_welcome(backend_url: &str) {
    println!();
    println!(
        "  {} {}",
        box_chars::NOTE.with(colors::PINK).bold(),
        "HUMMIFY".with(colors::VIOLET).bold()
    );
    print_key_value("Backend", backend_url);
    print_key_value("Version", env!("CARGO_PKG_VERSION"));
    println!(
        "  {}",
        "Type 'help' for available commands".with(colors::DIM)
    );
    println!();
}

pub fn print_goodbye() {
    println!();
    println!("  {}", "Goodbye!".with(colors::VIOLET).bold());
    println!();
}
