use chrono::NaiveDateTime;
use rand::Rng;
use rocket::request::FlashMessage;
use ui::FlashKind;
use uuid::Uuid;

/// A fresh time-ordered public identifier.
pub fn public_id() -> String {
    Uuid::now_v7().to_string()
}

/// Six decimal digits, zero padded.
pub fn otp_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Parses the value of an `<input type="datetime-local">`.
pub fn parse_datetime_local(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// e.g. `05/03/2025 3:07 PM`
pub fn format_when(at: &NaiveDateTime) -> String {
    at.format("%d/%m/%Y %-I:%M %p").to_string()
}

/// The `Starts: … • Ends: …` line shown under a poll's title. Empty when
/// neither end of the range is known.
pub fn format_date_range(
    starts: Option<&NaiveDateTime>,
    ends: Option<&NaiveDateTime>,
) -> String {
    match (starts.map(format_when), ends.map(format_when)) {
        (Some(a), Some(b)) => format!("Starts: {a} • Ends: {b}"),
        (Some(a), None) => format!("Starts: {a}"),
        (None, Some(b)) => format!("Ends: {b}"),
        (None, None) => String::new(),
    }
}

/// Treats blank form fields as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn flash_of(flash: Option<FlashMessage<'_>>) -> Option<(FlashKind, String)> {
    flash.map(|f| (FlashKind::from_flash(f.kind()), f.message().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let code = otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn date_range_formatting() {
        let start = parse_datetime_local("2025-03-05T15:07").unwrap();
        let end = parse_datetime_local("2025-03-06T09:00:00").unwrap();
        assert_eq!(
            format_date_range(Some(&start), Some(&end)),
            "Starts: 05/03/2025 3:07 PM • Ends: 06/03/2025 9:00 AM"
        );
        assert_eq!(format_date_range(None, Some(&end)), "Ends: 06/03/2025 9:00 AM");
        assert_eq!(format_date_range(None, None), "");
    }

    #[test]
    fn blank_fields_are_absent() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" x ".to_string())), Some("x".to_string()));
    }
}
