//! Display formatting for amounts, counts, and chart labels (en-US, USD).

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::discount::DiscountKind;

/// `$1,234.5`, `$2`, `-$0.25`. At most two fraction digits, none forced.
pub fn format_currency(amount: Decimal) -> String {
    let rounded =
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero).normalize();
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let digits = rounded.abs().to_string();

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (digits.as_str(), None),
    };

    match fraction {
        Some(fraction) => format!("{sign}${}.{fraction}", group_thousands(whole)),
        None => format!("{sign}${}", group_thousands(whole)),
    }
}

/// Cents to dollars without rounding.
pub fn cents_to_major(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn format_cents(cents: i64) -> String {
    format_currency(cents_to_major(cents))
}

/// `1,234,567`
pub fn format_number(value: i64) -> String {
    let grouped = group_thousands(&value.unsigned_abs().to_string());
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// `25%` for percentage codes, `$2` for fixed codes.
pub fn format_discount(kind: &DiscountKind) -> String {
    match kind {
        DiscountKind::Percentage(points) => {
            let whole = points.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
            format!("{}%", whole.normalize())
        }
        DiscountKind::Fixed(dollars) => format_currency(*dollars),
    }
}

/// `Oct 16, 2026`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %-d, %Y").to_string()
}

/// `October 2026`
pub fn format_month(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

/// `2026`
pub fn format_year(date: NaiveDate) -> String {
    date.format("%Y").to_string()
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{
        cents_to_major, format_cents, format_currency, format_date, format_discount, format_month,
        format_number, format_year,
    };
    use crate::domain::discount::DiscountKind;

    #[test]
    fn currency_drops_trailing_zeros() {
        assert_eq!(format_currency(Decimal::from(2)), "$2");
        assert_eq!(format_currency(Decimal::new(750, 2)), "$7.5");
        assert_eq!(format_currency(Decimal::new(1_234_567, 2)), "$12,345.67");
        assert_eq!(format_currency(Decimal::new(-25, 2)), "-$0.25");
        assert_eq!(format_currency(Decimal::new(12_345, 4)), "$1.23");
        assert_eq!(format_currency(Decimal::ZERO), "$0");
    }

    #[test]
    fn cents_convert_exactly() {
        assert_eq!(cents_to_major(199), Decimal::new(199, 2));
        assert_eq!(format_cents(100_000), "$1,000");
    }

    #[test]
    fn numbers_are_grouped() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(-1_234_567), "-1,234,567");
    }

    #[test]
    fn discount_labels() {
        assert_eq!(format_discount(&DiscountKind::Percentage(Decimal::from(25))), "25%");
        assert_eq!(format_discount(&DiscountKind::Fixed(Decimal::from(2))), "$2");
    }

    #[test]
    fn date_labels() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 6).expect("date");
        assert_eq!(format_date(date), "Oct 6, 2026");
        assert_eq!(format_month(date), "October 2026");
        assert_eq!(format_year(date), "2026");
    }
}
