// =============================================================================
// Subscriber message rendering (Telegram HTML)
// =============================================================================

use std::fmt::Write;

use crate::analysis::Signal;
use crate::types::Side;

const DISCLAIMER: &str = "Not financial advice";

pub fn confidence_label(confidence: u8) -> &'static str {
    match confidence {
        90.. => "HIGH",
        80..=89 => "MEDIUM",
        _ => "LOW",
    }
}

/// Two decimals for regular prices, six for sub-unit coins.
pub fn format_price(price: f64) -> String {
    if price.abs() >= 1.0 {
        format!("{price:.2}")
    } else {
        format!("{price:.6}")
    }
}

/// Escape the three characters Telegram's HTML mode treats specially.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

pub fn format_signal(signal: &Signal) -> String {
    let marker = match signal.side {
        Side::Long => "🟢",
        Side::Short => "🔴",
    };

    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{marker} <b>{} — {}</b>", escape_html(&signal.symbol), signal.side);
    out.push('\n');

    out.push_str("<b>Logic:</b>\n");
    for condition in &signal.satisfied_conditions {
        let _ = writeln!(out, "• ✅ {}", condition.label());
    }
    out.push('\n');

    let (entry_low, entry_high) = signal.entry_zone;
    let _ = writeln!(
        out,
        "🎯 <b>Entry:</b> {} - {}",
        format_price(entry_low),
        format_price(entry_high)
    );
    out.push_str("🎯 <b>Targets:</b>\n");
    let _ = writeln!(out, "TP1: {}", format_price(signal.take_profit_1));
    let _ = writeln!(out, "TP2: {}", format_price(signal.take_profit_2));
    let _ = writeln!(out, "TP3: {}", format_price(signal.take_profit_3));
    let _ = writeln!(out, "🛡 <b>Stop:</b> {}", format_price(signal.stop_loss));
    out.push('\n');

    let _ = writeln!(out, "💰 <b>Position size:</b> {}", signal.position_size);
    let _ = writeln!(out, "📊 <b>Confidence:</b> {}", confidence_label(signal.confidence));
    out.push('\n');
    let _ = write!(out, "⚠️ <i>{DISCLAIMER}</i>");

    out
}
