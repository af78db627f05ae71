use chrono::{Datelike, NaiveDate};

/// Appends `text` stamped with `today` as `M/D/YYYY: text`. Returns `None` if `text` is blank.
pub fn add_reflection(reflections: &[String], text: &str, today: NaiveDate) -> Option<Vec<String>> {
    if text.trim().is_empty() {
        return None;
    }
    let mut reflections = reflections.to_vec();
    reflections.push(format!(
        "{}/{}/{}: {text}",
        today.month(),
        today.day(),
        today.year()
    ));
    Some(reflections)
}
