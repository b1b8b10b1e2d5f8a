use chrono::NaiveDate;

pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

/// Slack emoji marking a day-over-day increase (or no change).
pub const INCREASE_MARKER: &str = ":large_red_square:";
/// Slack emoji marking a day-over-day decrease.
pub const DECREASE_MARKER: &str = ":large_green_square:";

/// Round to two decimal places.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Returns "DD/MM/YYYY".
pub fn format_display_date(date: &NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

/// Returns "12.34€" (symbol appended).
pub fn format_cost(amount: f64, currency_symbol: &str) -> String {
    format!("{:.2}{}", amount, currency_symbol)
}

/// Returns "+5.00€" for non-negative differences, "-3.00€" otherwise.
pub fn format_signed_delta(diff: f64, currency_symbol: &str) -> String {
    let sign = if diff >= 0.0 { "+" } else { "" };
    format!("{}{:.2}{}", sign, diff, currency_symbol)
}

pub fn delta_marker(diff: f64) -> &'static str {
    if diff >= 0.0 {
        INCREASE_MARKER
    } else {
        DECREASE_MARKER
    }
}
