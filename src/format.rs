//! Display formatting for phones, prices, sizes and counts

/// `+7 (999) 123-45-67`; input that is not a Russian number is returned as is
pub fn format_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    let normalized = match digits.strip_prefix('8') {
        Some(rest) => format!("7{}", rest),
        None => digits,
    };

    if normalized.len() != 11 {
        return phone.to_string();
    }

    format!(
        "+7 ({}) {}-{}-{}",
        &normalized[1..4],
        &normalized[4..7],
        &normalized[7..9],
        &normalized[9..11]
    )
}

/// `+7 (***) ***-45-67`
pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 11 {
        return phone.to_string();
    }
    let last_four = &digits[digits.len() - 4..];
    format!("+7 (***) ***-{}-{}", &last_four[..2], &last_four[2..])
}

fn group_thousands(value: u64) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3 * 2);
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push('\u{a0}');
        }
        out.push(ch);
    }
    out
}

/// Rubles with ru-RU grouping, e.g. `1 290 ₽`
pub fn format_price(amount: u64, show_currency: bool) -> String {
    let formatted = group_thousands(amount);
    if show_currency {
        format!("{}\u{a0}₽", formatted)
    } else {
        formatted
    }
}

/// Human-readable size in Russian units (`2.4 ГБ`)
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Б", "КБ", "МБ", "ГБ", "ТБ"];

    if bytes == 0 {
        return "0 Б".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if size >= 10.0 {
        format!("{:.0} {}", size, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Discount in percent as `−15%`; empty for no discount
pub fn format_discount(percent: u32) -> String {
    if percent == 0 {
        String::new()
    } else {
        format!("\u{2212}{}%", percent)
    }
}

/// Pick the Russian plural form: `[one, few, many]`
pub fn pluralize<'a>(count: i64, forms: [&'a str; 3]) -> &'a str {
    let abs = count.unsigned_abs();
    let mod10 = abs % 10;
    let mod100 = abs % 100;

    if mod10 == 1 && mod100 != 11 {
        forms[0]
    } else if (2..=4).contains(&mod10) && !(10..20).contains(&mod100) {
        forms[1]
    } else {
        forms[2]
    }
}
